//! Accessibility tiers: Border, Ticking and EntityTicking futures
//!
//! Tiers nest strictly. Each tier future is gated on the one below it, so a
//! tier can only resolve loaded after its prerequisite has. Promotions run
//! bottom-up and demotions top-down within a single transition.

use std::sync::Arc;

use crate::core::types::ChunkPos;
use crate::holder::saving::SavingFuture;
use crate::holder::status::{Stage, StageResult, Tier};
use crate::holder::table::{unloaded_future, StatusFutureTable};
use crate::pipeline::{StageFuture, StagePipeline};

const PROMOTION_ORDER: [Tier; 3] = [Tier::Border, Tier::Ticking, Tier::EntityTicking];
const DEMOTION_ORDER: [Tier; 3] = [Tier::EntityTicking, Tier::Ticking, Tier::Border];

/// Loaded only when `prerequisite` resolved loaded; `requested` supplies the value.
fn gate(prerequisite: &StageFuture, requested: &StageFuture) -> StageFuture {
    prerequisite.combine(requested, |prerequisite, requested| {
        if prerequisite.is_loaded() {
            requested.clone()
        } else {
            StageResult::Unloaded
        }
    })
}

fn is_loaded(future: &StageFuture) -> bool {
    future.peek().is_some_and(|result| result.is_loaded())
}

#[derive(Debug)]
pub struct AccessibilityLadder {
    pos: ChunkPos,
    accessible: StageFuture,
    ticking: StageFuture,
    entity_ticking: StageFuture,
    accessible_ever: bool,
}

impl AccessibilityLadder {
    pub fn new(pos: ChunkPos) -> Self {
        Self {
            pos,
            accessible: unloaded_future(),
            ticking: unloaded_future(),
            entity_ticking: unloaded_future(),
            accessible_ever: false,
        }
    }

    pub fn accessible(&self) -> &StageFuture {
        &self.accessible
    }

    pub fn ticking(&self) -> &StageFuture {
        &self.ticking
    }

    pub fn entity_ticking(&self) -> &StageFuture {
        &self.entity_ticking
    }

    /// Whether the unit has ever been promoted to Border
    pub fn accessible_ever(&self) -> bool {
        self.accessible_ever
    }

    /// Future for `tier`; Inaccessible has none and is always unloaded
    pub fn future(&self, tier: Tier) -> StageFuture {
        match tier {
            Tier::Inaccessible => unloaded_future(),
            Tier::Border => self.accessible.clone(),
            Tier::Ticking => self.ticking.clone(),
            Tier::EntityTicking => self.entity_ticking.clone(),
        }
    }

    fn slot_mut(&mut self, tier: Tier) -> Option<&mut StageFuture> {
        match tier {
            Tier::Inaccessible => None,
            Tier::Border => Some(&mut self.accessible),
            Tier::Ticking => Some(&mut self.ticking),
            Tier::EntityTicking => Some(&mut self.entity_ticking),
        }
    }

    /// Highest tier whose future is currently loaded
    pub fn loaded_tier(&self) -> Tier {
        if is_loaded(&self.entity_ticking) {
            Tier::EntityTicking
        } else if is_loaded(&self.ticking) {
            Tier::Ticking
        } else if is_loaded(&self.accessible) {
            Tier::Border
        } else {
            Tier::Inaccessible
        }
    }

    /// EntityTicking loaded implies Ticking loaded implies Border loaded.
    pub fn nesting_holds(&self) -> bool {
        // Read top-down: a loaded future never changes, so a lower tier read
        // afterwards cannot have been demoted in between.
        let entity_ticking = is_loaded(&self.entity_ticking);
        let ticking = is_loaded(&self.ticking);
        let accessible = is_loaded(&self.accessible);
        (!entity_ticking || ticking) && (!ticking || accessible)
    }

    /// Whether every tier future has resolved
    pub fn is_settled(&self) -> bool {
        self.accessible.is_done() && self.ticking.is_done() && self.entity_ticking.is_done()
    }

    /// Move from `old_tier` to `new_tier`, requesting or force-completing
    /// tier futures. Equal tiers do nothing.
    pub fn transition(
        &mut self,
        old_tier: Tier,
        new_tier: Tier,
        table: &mut StatusFutureTable,
        supported: Option<Stage>,
        pipeline: &Arc<dyn StagePipeline>,
        saving: &mut SavingFuture,
    ) {
        if new_tier < old_tier {
            for tier in DEMOTION_ORDER {
                if old_tier >= tier && new_tier < tier {
                    self.demote(tier, pipeline);
                }
            }
        } else if new_tier > old_tier {
            for tier in PROMOTION_ORDER {
                if old_tier < tier && new_tier >= tier {
                    self.promote(tier, table, supported, pipeline, saving);
                }
            }
        }
    }

    fn promote(
        &mut self,
        tier: Tier,
        table: &mut StatusFutureTable,
        supported: Option<Stage>,
        pipeline: &Arc<dyn StagePipeline>,
        saving: &mut SavingFuture,
    ) {
        let current = self.future(tier);
        if !matches!(current.peek(), Some(StageResult::Unloaded)) {
            panic!("{:?} promoted to {:?} twice", self.pos, tier);
        }

        let promoted = match tier {
            Tier::Inaccessible => return,
            Tier::Border => {
                let full = table.get_or_request(Stage::Full, supported, pipeline.as_ref(), saving);
                let requested = pipeline.request_accessible(self.pos, &full);
                self.accessible_ever = true;
                gate(&full, &requested)
            }
            Tier::Ticking => {
                let requested = pipeline.request_ticking(self.pos, &self.accessible);
                gate(&self.accessible, &requested)
            }
            Tier::EntityTicking => {
                let requested = pipeline.request_entity_ticking(self.pos, &self.ticking);
                gate(&self.ticking, &requested)
            }
        };

        saving.fold(&promoted);
        if let Some(slot) = self.slot_mut(tier) {
            *slot = promoted;
        }
        log::debug!("{:?} promoted to {:?}", self.pos, tier);
    }

    fn demote(&mut self, tier: Tier, pipeline: &Arc<dyn StagePipeline>) {
        let pos = self.pos;
        let Some(slot) = self.slot_mut(tier) else {
            return;
        };
        let prior = std::mem::replace(slot, unloaded_future());
        prior.complete(StageResult::Unloaded);

        let pipeline = Arc::clone(pipeline);
        prior.on_complete(move |result| {
            if let StageResult::Loaded(unit) = result {
                pipeline.teardown(pos, tier, unit);
            }
        });
        log::debug!("{:?} demoted from {:?}", pos, tier);
    }
}
