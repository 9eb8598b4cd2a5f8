//! Flat-world stage generator

use serde_json::json;

use crate::chunk::{ChunkAccess, ProtoChunk};
use crate::core::config::LoadConfig;
use crate::core::error::LoadError;
use crate::core::types::{BlockState, IVec3, CHUNK_WIDTH, SECTION_HEIGHT};
use crate::holder::status::Stage;
use crate::pipeline::StageGenerator;

/// Filler below the surface
pub const STONE: BlockState = BlockState(1);
/// Top layer
pub const GRASS: BlockState = BlockState(2);
/// One chest per column, placed by the features stage
pub const CHEST: BlockState = BlockState(54);

/// Depth of filler placed under the surface
const FILLER_DEPTH: i32 = 3;

/// Generates a flat column: stone at the noise stage, grass at the surface
/// stage and a chest with a block entity at the features stage. Every other
/// stage is a no-op.
#[derive(Debug, Clone)]
pub struct FlatGenerator {
    ground_height: i32,
}

impl FlatGenerator {
    /// Generator whose surface sits at `ground_height`, which must lie inside the world
    pub fn new(config: &LoadConfig, ground_height: i32) -> Result<Self, LoadError> {
        let min_y = config.min_section * SECTION_HEIGHT;
        let max_y = min_y + config.section_count as i32 * SECTION_HEIGHT;
        if ground_height - FILLER_DEPTH < min_y || ground_height >= max_y {
            return Err(LoadError::InvalidConfig(format!(
                "ground height {ground_height} outside world [{min_y}, {max_y})"
            )));
        }
        Ok(Self { ground_height })
    }

    pub fn ground_height(&self) -> i32 {
        self.ground_height
    }

    fn fill_layer(chunk: &ProtoChunk, y: i32, state: BlockState) {
        let (min_x, min_z) = chunk.pos().min_block();
        for x in 0..CHUNK_WIDTH {
            for z in 0..CHUNK_WIDTH {
                chunk.set_block(IVec3::new(min_x + x, y, min_z + z), state);
            }
        }
    }
}

impl StageGenerator for FlatGenerator {
    fn generate(&self, chunk: &ProtoChunk, stage: Stage) -> Result<(), LoadError> {
        match stage {
            Stage::Noise => {
                for y in self.ground_height - FILLER_DEPTH..self.ground_height {
                    Self::fill_layer(chunk, y, STONE);
                }
            }
            Stage::Surface => Self::fill_layer(chunk, self.ground_height, GRASS),
            Stage::Features => {
                let (min_x, min_z) = chunk.pos().min_block();
                let pos = IVec3::new(min_x + CHUNK_WIDTH / 2, self.ground_height + 1, min_z + CHUNK_WIDTH / 2);
                chunk.set_block(pos, CHEST);
                chunk.set_block_entity(pos, json!({ "id": "chest", "items": [] }));
            }
            _ => {}
        }
        log::trace!("Generated {:?} for {:?}", stage, chunk.pos());
        Ok(())
    }
}
