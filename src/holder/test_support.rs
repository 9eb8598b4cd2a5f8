//! Pipeline and tracker doubles that let tests resolve futures by hand

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::chunk::{ChunkAccess, ChunkRef, ProtoChunk};
use crate::core::error::LoadError;
use crate::core::types::{BlockPos, BlockState, ChunkPos, IVec3};
use crate::holder::promise::Promise;
use crate::holder::status::{Stage, StageResult, Tier};
use crate::pipeline::{LevelTracker, StageFuture, StageGenerator, StagePipeline};

/// One call made into the pipeline
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    Stage(Stage),
    Accessible,
    Ticking,
    EntityTicking,
    Teardown(Tier),
}

/// Records every request and keeps the promises it hands out unresolved
/// until the test completes them.
pub struct ManualPipeline {
    unit: Arc<ProtoChunk>,
    calls: Mutex<Vec<Call>>,
    stages: Mutex<Vec<(Stage, StageFuture)>>,
    tiers: Mutex<Vec<(Tier, StageFuture)>>,
    finalized: Mutex<Vec<ChunkRef>>,
}

impl ManualPipeline {
    pub fn new() -> Self {
        Self {
            unit: Arc::new(ProtoChunk::new(ChunkPos::new(0, 0))),
            calls: Mutex::new(Vec::new()),
            stages: Mutex::new(Vec::new()),
            tiers: Mutex::new(Vec::new()),
            finalized: Mutex::new(Vec::new()),
        }
    }

    /// The intermediate unit every stage resolves with
    pub fn unit(&self) -> ChunkRef {
        self.unit.clone()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn latest_stage(&self, stage: Stage) -> Option<StageFuture> {
        self.stages
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(s, _)| *s == stage)
            .map(|(_, future)| future.clone())
    }

    /// Resolve the latest request for `stage` with the shared unit
    pub fn complete_stage(&self, stage: Stage) -> bool {
        let Some(future) = self.latest_stage(stage) else {
            return false;
        };
        self.unit.advance_to(stage);
        future.complete(StageResult::Loaded(self.unit()))
    }

    /// Resolve the latest request for `stage` as a failure
    pub fn fail_stage(&self, stage: Stage) -> bool {
        self.latest_stage(stage)
            .is_some_and(|future| future.complete(StageResult::Unloaded))
    }

    pub fn complete_all_stages(&self) {
        for stage in Stage::ALL {
            self.complete_stage(stage);
        }
    }

    /// Latest raw future handed out for `tier`
    pub fn tier_future(&self, tier: Tier) -> Option<StageFuture> {
        self.tiers
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(t, _)| *t == tier)
            .map(|(_, future)| future.clone())
    }

    pub fn complete_tier(&self, tier: Tier, unit: &ChunkRef) -> bool {
        self.tier_future(tier)
            .is_some_and(|future| future.complete(StageResult::Loaded(unit.clone())))
    }

    pub fn push_finalized(&self, unit: ChunkRef) {
        self.finalized.lock().unwrap().push(unit);
    }

    fn record_tier(&self, call: Call, tier: Tier) -> StageFuture {
        self.calls.lock().unwrap().push(call);
        let future = Promise::new();
        self.tiers.lock().unwrap().push((tier, future.clone()));
        future
    }
}

impl StagePipeline for ManualPipeline {
    fn request_stage(&self, _pos: ChunkPos, stage: Stage, _parent: Option<&StageFuture>) -> StageFuture {
        self.calls.lock().unwrap().push(Call::Stage(stage));
        let future = Promise::new();
        self.stages.lock().unwrap().push((stage, future.clone()));
        future
    }

    fn request_accessible(&self, _pos: ChunkPos, _full: &StageFuture) -> StageFuture {
        self.record_tier(Call::Accessible, Tier::Border)
    }

    fn request_ticking(&self, _pos: ChunkPos, _accessible: &StageFuture) -> StageFuture {
        self.record_tier(Call::Ticking, Tier::Ticking)
    }

    fn request_entity_ticking(&self, _pos: ChunkPos, _ticking: &StageFuture) -> StageFuture {
        self.record_tier(Call::EntityTicking, Tier::EntityTicking)
    }

    fn teardown(&self, _pos: ChunkPos, tier: Tier, _unit: &ChunkRef) {
        self.calls.lock().unwrap().push(Call::Teardown(tier));
    }

    fn drain_finalized(&self) -> Vec<ChunkRef> {
        std::mem::take(&mut *self.finalized.lock().unwrap())
    }
}

/// Tracker that converges immediately and remembers every update
#[derive(Debug, Default)]
pub struct RecordingTracker {
    pub updates: Vec<(ChunkPos, u32, u32)>,
}

impl LevelTracker for RecordingTracker {
    fn update_level(
        &mut self,
        pos: ChunkPos,
        completed_level: u32,
        target_level: u32,
        set_completed: &mut dyn FnMut(u32),
    ) {
        self.updates.push((pos, completed_level, target_level));
        set_completed(target_level);
    }
}

/// Block every ungated stage writes
pub const MARKER: BlockState = BlockState(7);

/// Generator that writes [`MARKER`] at every stage except `gated`, which
/// blocks its worker until [`GatedGenerator::open`] is called.
pub struct GatedGenerator {
    gated: Stage,
    entered: AtomicBool,
    open: AtomicBool,
}

impl GatedGenerator {
    pub fn new(gated: Stage) -> Self {
        Self {
            gated,
            entered: AtomicBool::new(false),
            open: AtomicBool::new(false),
        }
    }

    /// Position of the marker block inside the chunk at `pos`
    pub fn marker_pos(pos: ChunkPos) -> BlockPos {
        let (min_x, min_z) = pos.min_block();
        IVec3::new(min_x + 1, 64, min_z + 1)
    }

    /// Whether a worker is waiting inside the gated stage
    pub fn entered(&self) -> bool {
        self.entered.load(Ordering::Acquire)
    }

    pub fn open(&self) {
        self.open.store(true, Ordering::Release);
    }
}

impl StageGenerator for GatedGenerator {
    fn generate(&self, chunk: &ProtoChunk, stage: Stage) -> Result<(), LoadError> {
        if stage != self.gated {
            chunk.set_block(Self::marker_pos(chunk.pos()), MARKER);
            return Ok(());
        }
        self.entered.store(true, Ordering::Release);
        wait_until(|| self.open.load(Ordering::Acquire));
        Ok(())
    }
}

/// Poll `condition` until it holds, panicking after five seconds
pub fn wait_until(mut condition: impl FnMut() -> bool) {
    let start = Instant::now();
    while !condition() {
        assert!(start.elapsed() < Duration::from_secs(5), "condition not reached in time");
        std::thread::sleep(Duration::from_millis(2));
    }
}
