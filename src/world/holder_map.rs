//! Holder registry driven by the tick thread

use std::collections::HashMap;
use std::sync::Arc;

use crate::chunk::ChunkRef;
use crate::core::config::LoadConfig;
use crate::core::error::LoadError;
use crate::core::types::{BlockPos, ChunkPos};
use crate::holder::batcher::LightChannel;
use crate::holder::load_holder::LoadHolder;
use crate::holder::promise::Promise;
use crate::holder::status::{check_level, Stage, UNLOADED_LEVEL};
use crate::holder::table::unloaded_future;
use crate::net::watch::WatchSet;
use crate::pipeline::{LevelTracker, StageFuture, StagePipeline};

/// A holder removed after unloading, with the future a writer should save
pub struct RetiredHolder {
    pub pos: ChunkPos,
    /// Resolves with the most advanced unit the holder ever loaded
    pub saving: Promise<Option<ChunkRef>>,
    /// Whether the holder ever reached the Border tier
    pub accessible_ever: bool,
}

/// What one [`HolderMap::tick`] did
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickStats {
    /// Holders ticked
    pub ticked: usize,
    /// Finalized units handed to a holder
    pub finalized: usize,
    /// Holders removed after unloading
    pub retired: usize,
}

/// Owns every [`LoadHolder`] and the pipeline they share.
pub struct HolderMap {
    /// Validated config every holder is created with
    config: LoadConfig,
    /// Pipeline shared by all holders
    pipeline: Arc<dyn StagePipeline>,
    /// Live holders by column
    holders: HashMap<ChunkPos, LoadHolder>,
    /// Holders retired since the last `drain_retired`
    retired: Vec<RetiredHolder>,
    /// Ticks run so far
    tick_count: u64,
}

impl HolderMap {
    /// Create an empty map. Fails if `config` does not validate.
    pub fn new(config: LoadConfig, pipeline: Arc<dyn StagePipeline>) -> Result<Self, LoadError> {
        config.validate()?;
        Ok(Self {
            config,
            pipeline,
            holders: HashMap::new(),
            retired: Vec::new(),
            tick_count: 0,
        })
    }

    pub fn config(&self) -> &LoadConfig {
        &self.config
    }

    pub fn holder(&self, pos: ChunkPos) -> Option<&LoadHolder> {
        self.holders.get(&pos)
    }

    pub fn holder_mut(&mut self, pos: ChunkPos) -> Option<&mut LoadHolder> {
        self.holders.get_mut(&pos)
    }

    /// Positions of every holder, sorted
    pub fn positions(&self) -> Vec<ChunkPos> {
        let mut positions: Vec<ChunkPos> = self.holders.keys().copied().collect();
        positions.sort_unstable();
        positions
    }

    pub fn len(&self) -> usize {
        self.holders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.holders.is_empty()
    }

    /// Ticks run so far
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Assign a ticket level. The first loaded level for a position creates
    /// its holder; unloaded levels for unknown positions are ignored.
    pub fn set_level(&mut self, pos: ChunkPos, level: u32) -> Result<(), LoadError> {
        let level = check_level(level)?;
        if let Some(holder) = self.holders.get_mut(&pos) {
            return holder.set_level(level);
        }
        if level >= UNLOADED_LEVEL {
            return Ok(());
        }

        let holder = LoadHolder::new(pos, level, Arc::clone(&self.pipeline), &self.config)?;
        self.holders.insert(pos, holder);
        log::trace!("Created holder {:?} at level {}", pos, level);
        Ok(())
    }

    /// Future for `stage` at `pos`, requesting work if the level allows
    pub fn request_stage(&mut self, pos: ChunkPos, stage: Stage) -> StageFuture {
        match self.holders.get_mut(&pos) {
            Some(holder) => holder.get_or_request(stage),
            None => unloaded_future(),
        }
    }

    /// Record a changed block. Returns `false` if no holder covers it.
    pub fn block_changed(&mut self, pos: BlockPos) -> bool {
        self.holders
            .get_mut(&ChunkPos::from_block(pos))
            .is_some_and(|holder| holder.block_changed(pos))
    }

    pub fn light_changed(&mut self, pos: ChunkPos, channel: LightChannel, section_y: i32) -> bool {
        self.holders
            .get_mut(&pos)
            .is_some_and(|holder| holder.light_changed(channel, section_y))
    }

    /// Hand a finalized unit to its holder. Returns `false` if it has none.
    pub fn finalize(&mut self, unit: ChunkRef) -> bool {
        match self.holders.get_mut(&unit.pos()) {
            Some(holder) => {
                holder.finalize(unit);
                true
            }
            None => false,
        }
    }

    /// Run one cycle: apply finalized units, tick every holder in position
    /// order, then retire unloaded holders whose futures have all resolved.
    pub fn tick(&mut self, tracker: &mut dyn LevelTracker) -> TickStats {
        let mut stats = TickStats::default();

        for unit in self.pipeline.drain_finalized() {
            if self.finalize(unit) {
                stats.finalized += 1;
            }
        }

        let positions = self.positions();
        for pos in &positions {
            if let Some(holder) = self.holders.get_mut(pos) {
                holder.tick(tracker);
                stats.ticked += 1;
            }
        }

        for pos in positions {
            let retire = self.holders.get(&pos).is_some_and(|holder| {
                holder.level() == UNLOADED_LEVEL
                    && holder.last_tick_level() == UNLOADED_LEVEL
                    && holder.is_settled()
            });
            if !retire {
                continue;
            }
            if let Some(holder) = self.holders.remove(&pos) {
                self.pipeline.release(pos);
                self.retired.push(RetiredHolder {
                    pos,
                    saving: holder.saving_future(),
                    accessible_ever: holder.was_accessible_ever(),
                });
                stats.retired += 1;
            }
        }

        self.tick_count += 1;
        log::trace!(
            "Tick {}: {} ticked, {} finalized, {} retired",
            self.tick_count, stats.ticked, stats.finalized, stats.retired
        );
        stats
    }

    /// Flush every holder's pending changes. Returns messages emitted.
    pub fn broadcast_changes<W: WatchSet>(&mut self, watchers: &W) -> usize {
        self.holders
            .values_mut()
            .map(|holder| holder.broadcast_changes(watchers))
            .sum()
    }

    /// Holders retired since the last call
    pub fn drain_retired(&mut self) -> Vec<RetiredHolder> {
        std::mem::take(&mut self.retired)
    }
}
