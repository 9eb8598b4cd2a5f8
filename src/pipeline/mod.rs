//! Collaborators that produce chunk content and assign ticket levels
//!
//! Holders only ever talk to these through traits: a [`StagePipeline`] turns
//! stage requests into futures, a [`LevelTracker`] is told each cycle how far a
//! holder has converged toward its ticket level.

pub mod worker;
pub mod flat;

use crate::chunk::{ChunkRef, ProtoChunk};
use crate::core::error::LoadError;
use crate::core::types::ChunkPos;
use crate::holder::status::{Stage, StageResult, Tier};
use crate::holder::promise::Promise;

pub use flat::FlatGenerator;
pub use worker::WorkerPipeline;

/// Future of a stage or tier result
pub type StageFuture = Promise<StageResult>;

/// Produces chunk units at requested stages.
///
/// Implementations resolve the returned futures from any thread. A failed
/// production resolves [`StageResult::Unloaded`] and is logged by the
/// implementation, once.
pub trait StagePipeline: Send + Sync {
    /// Produce the unit at `pos` up to `stage`. `parent` is the holder's
    /// future for the preceding stage, `None` for [`Stage::Empty`].
    fn request_stage(&self, pos: ChunkPos, stage: Stage, parent: Option<&StageFuture>) -> StageFuture;

    /// Make the fully generated unit accessible, given its full-stage future
    fn request_accessible(&self, pos: ChunkPos, full: &StageFuture) -> StageFuture;

    /// Prepare block ticking, given the accessible future
    fn request_ticking(&self, pos: ChunkPos, accessible: &StageFuture) -> StageFuture;

    /// Prepare entity ticking, given the ticking future
    fn request_entity_ticking(&self, pos: ChunkPos, ticking: &StageFuture) -> StageFuture;

    /// Called when a unit that had reached `tier` is demoted out of it
    fn teardown(&self, pos: ChunkPos, tier: Tier, unit: &ChunkRef);

    /// Finalized units produced since the last call, to be swapped into
    /// their holders on the tick thread
    fn drain_finalized(&self) -> Vec<ChunkRef> {
        Vec::new()
    }

    /// The holder at `pos` was retired; cached state for it may be dropped
    fn release(&self, _pos: ChunkPos) {}
}

/// Receives each holder's progress once per tick.
pub trait LevelTracker {
    /// `completed_level` is how far the holder has converged; the tracker may
    /// move it toward `target_level` through `set_completed`.
    fn update_level(
        &mut self,
        pos: ChunkPos,
        completed_level: u32,
        target_level: u32,
        set_completed: &mut dyn FnMut(u32),
    );
}

/// Tracker that converges immediately
#[derive(Debug, Default)]
pub struct ImmediateTracker {
    updates: usize,
}

impl ImmediateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of updates received
    pub fn updates(&self) -> usize {
        self.updates
    }
}

impl LevelTracker for ImmediateTracker {
    fn update_level(
        &mut self,
        _pos: ChunkPos,
        completed_level: u32,
        target_level: u32,
        set_completed: &mut dyn FnMut(u32),
    ) {
        self.updates += 1;
        if completed_level != target_level {
            set_completed(target_level);
        }
    }
}

/// Computes the content of a chunk for one stage. Runs on worker threads.
pub trait StageGenerator: Send + Sync + 'static {
    fn generate(&self, chunk: &ProtoChunk, stage: Stage) -> Result<(), LoadError>;
}
