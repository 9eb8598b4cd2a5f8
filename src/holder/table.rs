//! Per-stage futures of one holder

use crate::chunk::ChunkRef;
use crate::core::types::ChunkPos;
use crate::holder::promise::Promise;
use crate::holder::saving::SavingFuture;
use crate::holder::status::{Stage, StageResult};
use crate::pipeline::{StageFuture, StagePipeline};

/// A future that is already resolved as unloaded
pub fn unloaded_future() -> StageFuture {
    Promise::completed(StageResult::Unloaded)
}

fn supports(supported: Option<Stage>, stage: Stage) -> bool {
    supported.is_some_and(|s| s.is_or_after(stage))
}

/// One slot per stage, written only by the tick-owning thread.
///
/// `supported` arguments are the stage the holder's current level allows,
/// `None` once the level is in the unloaded band.
#[derive(Debug)]
pub struct StatusFutureTable {
    pos: ChunkPos,
    slots: [Option<StageFuture>; Stage::COUNT],
}

impl StatusFutureTable {
    pub fn new(pos: ChunkPos) -> Self {
        Self {
            pos,
            slots: std::array::from_fn(|_| None),
        }
    }

    /// Stored future for `stage`, or a resolved unloaded future
    pub fn get(&self, stage: Stage) -> StageFuture {
        self.slots[stage.index()].clone().unwrap_or_else(unloaded_future)
    }

    /// Like [`get`](Self::get), but unloaded when the level does not support `stage`
    pub fn get_if_supported(&self, stage: Stage, supported: Option<Stage>) -> StageFuture {
        if supports(supported, stage) {
            self.get(stage)
        } else {
            unloaded_future()
        }
    }

    /// Stored future if pending or loaded; otherwise request it from the
    /// pipeline when supported, parents first.
    pub fn get_or_request(
        &mut self,
        stage: Stage,
        supported: Option<Stage>,
        pipeline: &dyn StagePipeline,
        saving: &mut SavingFuture,
    ) -> StageFuture {
        if let Some(existing) = &self.slots[stage.index()] {
            match existing.peek() {
                None | Some(StageResult::Loaded(_)) => return existing.clone(),
                Some(StageResult::Unloaded) => {}
            }
        }
        if !supports(supported, stage) {
            return unloaded_future();
        }

        let parent = stage
            .parent()
            .map(|parent| self.get_or_request(parent, supported, pipeline, saving));
        let future = pipeline.request_stage(self.pos, stage, parent.as_ref());
        log::trace!("Requested {:?} for {:?}", stage, self.pos);

        saving.fold(&future);
        self.slots[stage.index()] = Some(future.clone());
        future
    }

    /// Unload every stage above `supported`.
    ///
    /// Pending futures are force-completed, which turns a late worker result
    /// into a no-op; loaded ones are swapped for a resolved unloaded future.
    /// Returns the number of slots affected.
    pub fn force_unload_above(&mut self, supported: Option<Stage>) -> usize {
        let start = supported.map_or(0, |stage| stage.index() + 1);
        let mut unloaded = 0;
        for slot in &mut self.slots[start..] {
            let Some(future) = slot else {
                continue;
            };
            if future.complete(StageResult::Unloaded) {
                unloaded += 1;
            } else if future.peek().is_some_and(|result| result.is_loaded()) {
                *slot = Some(unloaded_future());
                unloaded += 1;
            }
        }
        unloaded
    }

    /// Swap every loaded intermediate unit for `finalized`
    pub fn replace_intermediate(&mut self, finalized: &ChunkRef) -> usize {
        let mut replaced = 0;
        for slot in &mut self.slots {
            let intermediate = slot
                .as_ref()
                .and_then(Promise::peek)
                .is_some_and(|result| matches!(result, StageResult::Loaded(unit) if !unit.is_finalized()));
            if intermediate {
                *slot = Some(Promise::completed(StageResult::Loaded(finalized.clone())));
                replaced += 1;
            }
        }
        replaced
    }

    /// Unit of the most advanced loaded stage
    pub fn latest_available(&self) -> Option<ChunkRef> {
        self.slots
            .iter()
            .rev()
            .flatten()
            .find_map(|future| match future.peek() {
                Some(StageResult::Loaded(unit)) => Some(unit),
                _ => None,
            })
    }

    /// Stages whose futures are currently loaded, in order
    pub fn loaded_stages(&self) -> Vec<Stage> {
        Stage::ALL
            .iter()
            .copied()
            .filter(|stage| {
                self.slots[stage.index()]
                    .as_ref()
                    .and_then(Promise::peek)
                    .is_some_and(|result| result.is_loaded())
            })
            .collect()
    }

    /// Whether every stored future has resolved
    pub fn is_settled(&self) -> bool {
        self.slots.iter().flatten().all(Promise::is_done)
    }
}
