//! Message contracts for chunk changes sent to watching clients
//!
//! Only the shape of each message is defined here; framing and encoding on the
//! wire belong to the network layer.

use serde::{Deserialize, Serialize};

use crate::core::types::{BlockPos, BlockState, ChunkPos, SectionPos};

/// Messages emitted when a holder flushes its pending changes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ClientMessage {
    /// A single block changed
    BlockUpdate { pos: BlockPos, state: BlockState },
    /// Several blocks in one section changed; keys are section-local packed positions
    SectionBlocksUpdate {
        section: SectionPos,
        changes: Vec<(u16, BlockState)>,
        suppress_light_updates: bool,
    },
    /// Block entity data at a changed position
    BlockEntityUpdate { pos: BlockPos, payload: serde_json::Value },
    /// Light sections changed in the given channels
    LightUpdate {
        chunk: ChunkPos,
        sky_mask: u64,
        block_mask: u64,
        suppress_light_updates: bool,
    },
}

impl ClientMessage {
    /// Whether this message carries the new state of `pos`
    pub fn covers(&self, pos: BlockPos) -> bool {
        match self {
            ClientMessage::BlockUpdate { pos: p, .. } => *p == pos,
            ClientMessage::SectionBlocksUpdate { section, changes, .. } => {
                SectionPos::from_block(pos) == *section
                    && changes.iter().any(|(key, _)| *key == SectionPos::pack_local(pos))
            }
            ClientMessage::BlockEntityUpdate { .. } | ClientMessage::LightUpdate { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::IVec3;

    #[test]
    fn test_serialized_shape() {
        let message = ClientMessage::LightUpdate {
            chunk: ChunkPos::new(1, -1),
            sky_mask: 0b101,
            block_mask: 0,
            suppress_light_updates: true,
        };
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["type"], "LightUpdate");
        assert_eq!(json["data"]["sky_mask"], 5);
        assert_eq!(json["data"]["chunk"]["z"], -1);
    }

    #[test]
    fn test_covers_section_update() {
        let pos = IVec3::new(17, 5, -2);
        let message = ClientMessage::SectionBlocksUpdate {
            section: SectionPos::from_block(pos),
            changes: vec![(SectionPos::pack_local(pos), BlockState(3))],
            suppress_light_updates: false,
        };
        assert!(message.covers(pos));
        assert!(!message.covers(pos + IVec3::X));
    }
}
