//! Finalized chunk produced once generation reaches the full stage

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

use crate::chunk::{ChunkAccess, ProtoChunk};
use crate::core::types::{BlockPos, BlockState, ChunkPos};
use crate::holder::status::Stage;

/// The finalized unit for a column.
///
/// It has a distinct identity from the [`ProtoChunk`] it was built from, so
/// holders can tell intermediate results apart and swap them out.
#[derive(Debug)]
pub struct LevelChunk {
    pos: ChunkPos,
    blocks: RwLock<HashMap<BlockPos, BlockState>>,
    block_entities: RwLock<HashMap<BlockPos, serde_json::Value>>,
    unsaved: AtomicBool,
}

impl LevelChunk {
    /// Build the finalized chunk from a copy of the proto chunk's contents.
    ///
    /// The proto chunk is left intact; saves already holding it still see
    /// every block it had.
    pub fn from_proto(proto: &ProtoChunk) -> Self {
        let (blocks, block_entities) = proto.contents();
        Self {
            pos: proto.pos(),
            blocks: RwLock::new(blocks),
            block_entities: RwLock::new(block_entities),
            unsaved: AtomicBool::new(true),
        }
    }

    /// Set a block, returning the previous state
    pub fn set_block(&self, pos: BlockPos, state: BlockState) -> BlockState {
        let mut blocks = self.blocks.write().unwrap_or_else(PoisonError::into_inner);
        let previous = if state == BlockState::AIR {
            blocks.remove(&pos)
        } else {
            blocks.insert(pos, state)
        };
        self.set_unsaved(true);
        previous.unwrap_or(BlockState::AIR)
    }

    /// Attach or clear a block entity
    pub fn set_block_entity(&self, pos: BlockPos, payload: Option<serde_json::Value>) {
        let mut entities = self.block_entities.write().unwrap_or_else(PoisonError::into_inner);
        match payload {
            Some(payload) => entities.insert(pos, payload),
            None => entities.remove(&pos),
        };
        self.set_unsaved(true);
    }
}

impl ChunkAccess for LevelChunk {
    fn pos(&self) -> ChunkPos {
        self.pos
    }

    fn stage(&self) -> Stage {
        Stage::Full
    }

    fn is_finalized(&self) -> bool {
        true
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

#[cfg(test)]
mod tests {
    use super::*;
    use glam::IVec3;
    use serde_json::json;

    #[test]
    fn test_from_proto_copies_contents() {
        let proto = ProtoChunk::new(ChunkPos::new(2, 3));
        let pos = IVec3::new(33, 70, 50);
        proto.set_block(pos, BlockState(4));
        proto.set_block_entity(pos, json!({ "id": "chest" }));

        let level = LevelChunk::from_proto(&proto);
        assert_eq!(level.pos(), ChunkPos::new(2, 3));
        assert_eq!(level.block_state(pos), BlockState(4));
        assert_eq!(level.block_entity(pos), Some(json!({ "id": "chest" })));
        assert_eq!(proto.block_state(pos), BlockState(4));
        assert_eq!(proto.block_entity(pos), Some(json!({ "id": "chest" })));

        level.set_block(pos, BlockState::AIR);
        assert_eq!(proto.block_state(pos), BlockState(4));
        assert!(level.is_finalized());
        assert_eq!(level.stage(), Stage::Full);
    }

    #[test]
    fn test_edits_mark_unsaved() {
        let level = LevelChunk::from_proto(&ProtoChunk::new(ChunkPos::new(0, 0)));
        level.set_unsaved(false);

        level.set_block(IVec3::new(1, 1, 1), BlockState(2));
        assert!(level.is_unsaved());
    }
}
