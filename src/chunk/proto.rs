//! In-progress chunk that advances through generation stages

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{PoisonError, RwLock};

use crate::chunk::ChunkAccess;
use crate::core::types::{BlockPos, BlockState, ChunkPos};
use crate::holder::status::Stage;

/// A chunk still being generated.
///
/// One `ProtoChunk` is shared by every stage future of a holder; each stage
/// mutates it in place on a worker and then advances [`ProtoChunk::stage`].
#[derive(Debug)]
pub struct ProtoChunk {
    pos: ChunkPos,
    stage: AtomicU8,
    blocks: RwLock<HashMap<BlockPos, BlockState>>,
    block_entities: RwLock<HashMap<BlockPos, serde_json::Value>>,
    unsaved: AtomicBool,
}

impl ProtoChunk {
    /// Create an empty chunk at `pos`
    pub fn new(pos: ChunkPos) -> Self {
        Self {
            pos,
            stage: AtomicU8::new(Stage::Empty.index() as u8),
            blocks: RwLock::new(HashMap::new()),
            block_entities: RwLock::new(HashMap::new()),
            unsaved: AtomicBool::new(false),
        }
    }

    /// Record that `stage` has completed. Stages never move backwards.
    pub fn advance_to(&self, stage: Stage) {
        self.stage.fetch_max(stage.index() as u8, Ordering::AcqRel);
        self.set_unsaved(true);
    }

    /// Set a block, returning the previous state
    pub fn set_block(&self, pos: BlockPos, state: BlockState) -> BlockState {
        let mut blocks = self.blocks.write().unwrap_or_else(PoisonError::into_inner);
        let previous = if state == BlockState::AIR {
            blocks.remove(&pos)
        } else {
            blocks.insert(pos, state)
        };
        previous.unwrap_or(BlockState::AIR)
    }

    /// Attach a block entity payload to `pos`
    pub fn set_block_entity(&self, pos: BlockPos, payload: serde_json::Value) {
        self.block_entities
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(pos, payload);
    }

    /// Copy of the blocks and block entities written so far
    pub(crate) fn contents(
        &self,
    ) -> (HashMap<BlockPos, BlockState>, HashMap<BlockPos, serde_json::Value>) {
        let blocks = self.blocks.read().unwrap_or_else(PoisonError::into_inner).clone();
        let entities = self
            .block_entities
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        (blocks, entities)
    }

    /// Number of non-air blocks
    pub fn block_count(&self) -> usize {
        self.blocks.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl ChunkAccess for ProtoChunk {
    fn pos(&self) -> ChunkPos {
        self.pos
    }

    fn stage(&self) -> Stage {
        Stage::from_index(self.stage.load(Ordering::Acquire) as usize).unwrap_or(Stage::Empty)
    }

    fn block_state(&self, pos: BlockPos) -> BlockState {
        self.blocks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&pos)
            .copied()
            .unwrap_or(BlockState::AIR)
    }

    fn block_entity(&self, pos: BlockPos) -> Option<serde_json::Value> {
        self.block_entities
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&pos)
            .cloned()
    }

    fn set_unsaved(&self, unsaved: bool) {
        self.unsaved.store(unsaved, Ordering::Release);
    }

    fn is_unsaved(&self) -> bool {
        self.unsaved.load(Ordering::Acquire)
    }
}
