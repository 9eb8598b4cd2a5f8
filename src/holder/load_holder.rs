//! The per-chunk loading state machine

use std::sync::Arc;

use crate::chunk::ChunkRef;
use crate::core::config::LoadConfig;
use crate::core::error::LoadError;
use crate::core::types::{BlockPos, ChunkPos};
use crate::holder::batcher::{LightChannel, UpdateBatcher};
use crate::holder::ladder::AccessibilityLadder;
use crate::holder::promise::Promise;
use crate::holder::saving::SavingFuture;
use crate::holder::status::{check_level, Stage, StageResult, Tier, UNLOADED_LEVEL};
use crate::holder::table::StatusFutureTable;
use crate::net::watch::WatchSet;
use crate::pipeline::{LevelTracker, StageFuture, StagePipeline};

/// Drives one chunk through its stages and tiers as its ticket level changes.
///
/// The tracker sets `level`; each [`tick`](LoadHolder::tick) reconciles the
/// futures with the change since the previous tick. All methods run on the
/// tick-owning thread.
pub struct LoadHolder {
    pos: ChunkPos,
    /// Ticket level assigned by the tracker
    level: u32,
    /// Level the tracker reports as reached
    completed_level: u32,
    /// `level` as of the previous tick
    last_tick_level: u32,
    /// One future per stage
    table: StatusFutureTable,
    /// Border, Ticking and EntityTicking futures
    ladder: AccessibilityLadder,
    /// Most advanced unit, for the chunk writer
    saving: SavingFuture,
    /// Changes waiting for the next flush
    batcher: UpdateBatcher,
    pipeline: Arc<dyn StagePipeline>,
}

impl LoadHolder {
    /// Create a holder that will load toward `level` on its first tick
    pub fn new(
        pos: ChunkPos,
        level: u32,
        pipeline: Arc<dyn StagePipeline>,
        config: &LoadConfig,
    ) -> Result<Self, LoadError> {
        Ok(Self {
            pos,
            level: check_level(level)?,
            completed_level: UNLOADED_LEVEL,
            last_tick_level: UNLOADED_LEVEL,
            table: StatusFutureTable::new(pos),
            ladder: AccessibilityLadder::new(pos),
            saving: SavingFuture::new(),
            batcher: UpdateBatcher::new(pos, config),
            pipeline,
        })
    }

    pub fn pos(&self) -> ChunkPos {
        self.pos
    }

    /// Ticket level assigned by the tracker
    pub fn level(&self) -> u32 {
        self.level
    }

    /// Level the tracker considers reached
    pub fn completed_level(&self) -> u32 {
        self.completed_level
    }

    /// Level as of the previous tick
    pub fn last_tick_level(&self) -> u32 {
        self.last_tick_level
    }

    /// Assign a new ticket level, applied on the next tick
    pub fn set_level(&mut self, level: u32) -> Result<(), LoadError> {
        self.level = check_level(level)?;
        Ok(())
    }

    /// Stage the current level supports
    pub fn stage(&self) -> Option<Stage> {
        Stage::from_level(self.level)
    }

    /// Tier of the current level
    pub fn tier(&self) -> Tier {
        Tier::from_level(self.level)
    }

    pub fn get(&self, stage: Stage) -> StageFuture {
        self.table.get(stage)
    }

    pub fn get_if_supported(&self, stage: Stage) -> StageFuture {
        self.table.get_if_supported(stage, self.stage())
    }

    /// Future for `stage`, scheduling work when the level allows it
    pub fn get_or_request(&mut self, stage: Stage) -> StageFuture {
        let supported = self.stage();
        self.table
            .get_or_request(stage, supported, self.pipeline.as_ref(), &mut self.saving)
    }

    pub fn accessible_future(&self) -> &StageFuture {
        self.ladder.accessible()
    }

    pub fn ticking_future(&self) -> &StageFuture {
        self.ladder.ticking()
    }

    pub fn entity_ticking_future(&self) -> &StageFuture {
        self.ladder.entity_ticking()
    }

    /// Future of the most advanced unit, for the chunk writer
    pub fn saving_future(&self) -> Promise<Option<ChunkRef>> {
        self.saving.promise()
    }

    pub fn was_accessible_ever(&self) -> bool {
        self.ladder.accessible_ever()
    }

    /// Highest tier whose future has loaded
    pub fn loaded_tier(&self) -> Tier {
        self.ladder.loaded_tier()
    }

    /// Stages whose futures are currently loaded
    pub fn loaded_stages(&self) -> Vec<Stage> {
        self.table.loaded_stages()
    }

    pub fn tier_nesting_holds(&self) -> bool {
        self.ladder.nesting_holds()
    }

    /// Unit of the most advanced loaded stage
    pub fn latest_available(&self) -> Option<ChunkRef> {
        self.table.latest_available()
    }

    /// The unit, once it has reached the Ticking tier
    pub fn ticking_unit(&self) -> Option<ChunkRef> {
        match self.ladder.ticking().peek() {
            Some(StageResult::Loaded(unit)) => Some(unit),
            _ => None,
        }
    }

    /// Whether every future this holder owns has resolved
    pub fn is_settled(&self) -> bool {
        self.table.is_settled() && self.ladder.is_settled() && self.saving.is_done()
    }

    /// Reconcile futures with the level change since the last tick.
    ///
    /// Stage regression is handled first, then tier crossings, then the
    /// tracker is told the completed level. A tick with no stage or tier
    /// change touches no futures.
    pub fn tick(&mut self, tracker: &mut dyn LevelTracker) {
        let old_stage = Stage::from_level(self.last_tick_level);
        let new_stage = Stage::from_level(self.level);
        let old_tier = Tier::from_level(self.last_tick_level);
        let new_tier = Tier::from_level(self.level);

        if new_stage < old_stage {
            let unloaded = self.table.force_unload_above(new_stage);
            log::trace!(
                "{:?} regressed {:?} -> {:?}, unloaded {} stages",
                self.pos, old_stage, new_stage, unloaded
            );
        }

        if new_tier != old_tier {
            self.ladder.transition(
                old_tier,
                new_tier,
                &mut self.table,
                new_stage,
                &self.pipeline,
                &mut self.saving,
            );
        }

        let mut completed = self.completed_level;
        tracker.update_level(self.pos, self.completed_level, self.level, &mut |level| {
            completed = level;
        });
        assert!(completed <= UNLOADED_LEVEL, "tracker set completed level {completed}");
        self.completed_level = completed;

        self.last_tick_level = self.level;
    }

    /// Swap intermediate units for the finalized one and record it for saving
    pub fn finalize(&mut self, finalized: ChunkRef) {
        let replaced = self.table.replace_intermediate(&finalized);
        self.saving
            .fold(&Promise::completed(StageResult::Loaded(finalized)));
        log::debug!("{:?} finalized, replaced {} intermediate stages", self.pos, replaced);
    }

    /// Record a changed block for the next flush
    pub fn block_changed(&mut self, pos: BlockPos) -> bool {
        self.batcher.mark_block(pos)
    }

    /// Record a changed light section for the next flush
    pub fn light_changed(&mut self, channel: LightChannel, section_y: i32) -> bool {
        let backing = self.table.latest_available();
        self.batcher.mark_light(channel, section_y, backing.as_ref())
    }

    pub fn has_pending_changes(&self) -> bool {
        self.batcher.has_pending()
    }

    /// Flush batched changes to watchers once the unit is ticking
    pub fn broadcast_changes<W: WatchSet>(&mut self, watchers: &W) -> usize {
        let unit = self.ticking_unit();
        self.batcher.flush(unit.as_ref(), watchers)
    }
}
