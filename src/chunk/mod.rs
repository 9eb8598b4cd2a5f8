//! Chunk units as seen by the loading core
//!
//! The core never inspects chunk contents beyond what [`ChunkAccess`] exposes:
//! the stage a unit has reached, whether it is the finalized unit, block reads
//! for outgoing updates and the unsaved flag.

pub mod proto;
pub mod level;

use std::fmt;
use std::sync::Arc;

use crate::core::types::{BlockPos, BlockState, ChunkPos};
use crate::holder::status::Stage;

pub use level::LevelChunk;
pub use proto::ProtoChunk;

/// Read access to a chunk at any stage of loading.
pub trait ChunkAccess: Send + Sync + fmt::Debug {
    /// Column this chunk occupies
    fn pos(&self) -> ChunkPos;

    /// Most advanced stage this unit has completed
    fn stage(&self) -> Stage;

    /// True for the finalized unit that replaces in-progress ones
    fn is_finalized(&self) -> bool {
        false
    }

    /// Block state at an absolute position inside this chunk
    fn block_state(&self, pos: BlockPos) -> BlockState;

    /// Block entity payload at `pos`, if one exists
    fn block_entity(&self, pos: BlockPos) -> Option<serde_json::Value>;

    /// Flag the chunk as needing a save
    fn set_unsaved(&self, unsaved: bool);

    fn is_unsaved(&self) -> bool;
}

/// Shared handle to a chunk unit. Identity is pointer identity.
pub type ChunkRef = Arc<dyn ChunkAccess>;

/// Whether two handles refer to the same unit
pub fn same_unit(a: &ChunkRef, b: &ChunkRef) -> bool {
    Arc::ptr_eq(a, b)
}

/// Ordering key for "more advanced": finalized units beat in-progress ones,
/// then higher stages win.
pub fn advancement(unit: &ChunkRef) -> (bool, Stage) {
    (unit.is_finalized(), unit.stage())
}
