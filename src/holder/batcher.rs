//! Per-cycle batching of block and light changes for one chunk
//!
//! Changes are coalesced between flushes: block positions per section as
//! packed local keys, light changes as one bit per light section. A flush turns
//! the accumulated state into the fewest messages that describe it.

use std::collections::{BTreeMap, BTreeSet};

use crate::chunk::ChunkRef;
use crate::core::config::LoadConfig;
use crate::core::types::{BlockPos, ChunkPos, SectionPos};
use crate::net::protocol::ClientMessage;
use crate::net::watch::{broadcast, WatchSet};

/// Light channel whose section data changed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LightChannel {
    Sky,
    Block,
}

/// Accumulates dirty block positions and light sections between flushes.
#[derive(Debug)]
pub struct UpdateBatcher {
    pos: ChunkPos,
    config: LoadConfig,
    /// Section y -> packed local positions changed this cycle
    changed_blocks: BTreeMap<i32, BTreeSet<u16>>,
    has_changed_sections: bool,
    sky_changed: u64,
    block_changed: u64,
}

impl UpdateBatcher {
    pub fn new(pos: ChunkPos, config: &LoadConfig) -> Self {
        Self {
            pos,
            config: config.clone(),
            changed_blocks: BTreeMap::new(),
            has_changed_sections: false,
            sky_changed: 0,
            block_changed: 0,
        }
    }

    /// Record a changed block. Returns `false` if `pos` is outside the world height.
    pub fn mark_block(&mut self, pos: BlockPos) -> bool {
        let section_y = SectionPos::block_to_section(pos.y);
        if self.config.section_index(section_y).is_none() {
            return false;
        }

        let keys = self.changed_blocks.entry(section_y).or_default();
        if keys.is_empty() {
            self.has_changed_sections = true;
        }
        keys.insert(SectionPos::pack_local(pos));
        true
    }

    /// Record a changed light section and flag the backing unit for saving.
    ///
    /// Sections outside the light range are ignored and return `false`.
    pub fn mark_light(&mut self, channel: LightChannel, section_y: i32, backing: Option<&ChunkRef>) -> bool {
        if let Some(unit) = backing {
            unit.set_unsaved(true);
        }

        let index = section_y - self.config.min_light_section();
        if index < 0 || index as u32 >= self.config.light_section_count() {
            return false;
        }

        let Some(bit) = 1u64.checked_shl(index as u32) else {
            return false;
        };
        match channel {
            LightChannel::Sky => self.sky_changed |= bit,
            LightChannel::Block => self.block_changed |= bit,
        }
        true
    }

    /// Whether anything is waiting to be flushed
    pub fn has_pending(&self) -> bool {
        self.has_changed_sections || self.sky_changed != 0 || self.block_changed != 0
    }

    /// Total changed positions across all sections
    pub fn pending_block_count(&self) -> usize {
        self.changed_blocks.values().map(BTreeSet::len).sum()
    }

    pub fn light_masks(&self) -> (u64, u64) {
        (self.sky_changed, self.block_changed)
    }

    /// Emit pending changes to the watchers of this chunk and clear them.
    ///
    /// Does nothing while `unit` is absent; pending changes are kept for a
    /// later flush. Returns the number of messages emitted.
    pub fn flush<W: WatchSet>(&mut self, unit: Option<&ChunkRef>, watchers: &W) -> usize {
        let Some(unit) = unit else {
            return 0;
        };
        if !self.has_pending() {
            return 0;
        }

        let suppress_light_updates = self.pending_block_count() >= self.config.suppress_light_threshold;
        let mut sent = 0;

        if self.sky_changed != 0 || self.block_changed != 0 {
            let message = ClientMessage::LightUpdate {
                chunk: self.pos,
                sky_mask: self.sky_changed,
                block_mask: self.block_changed,
                suppress_light_updates,
            };
            broadcast(watchers, self.pos, !suppress_light_updates, &message);
            sent += 1;
            self.sky_changed = 0;
            self.block_changed = 0;
        }

        for (section_y, keys) in std::mem::take(&mut self.changed_blocks) {
            let section = SectionPos::of_chunk(self.pos, section_y);
            if keys.len() == 1 {
                if let Some(&key) = keys.first() {
                    let pos = section.unpack_local(key);
                    let message = ClientMessage::BlockUpdate {
                        pos,
                        state: unit.block_state(pos),
                    };
                    broadcast(watchers, self.pos, false, &message);
                    sent += 1;
                    sent += self.broadcast_block_entity(unit, pos, watchers);
                }
            } else {
                let changes = keys
                    .iter()
                    .map(|&key| (key, unit.block_state(section.unpack_local(key))))
                    .collect();
                let message = ClientMessage::SectionBlocksUpdate {
                    section,
                    changes,
                    suppress_light_updates,
                };
                broadcast(watchers, self.pos, false, &message);
                sent += 1;
                for &key in &keys {
                    sent += self.broadcast_block_entity(unit, section.unpack_local(key), watchers);
                }
            }
        }

        self.has_changed_sections = false;
        log::trace!("Flushed {} messages for {:?}", sent, self.pos);
        sent
    }

    fn broadcast_block_entity<W: WatchSet>(&self, unit: &ChunkRef, pos: BlockPos, watchers: &W) -> usize {
        match unit.block_entity(pos) {
            Some(payload) => {
                broadcast(watchers, self.pos, false, &ClientMessage::BlockEntityUpdate { pos, payload });
                1
            }
            None => 0,
        }
    }
}
