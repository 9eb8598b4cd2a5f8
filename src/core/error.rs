//! Error types for the loading core

use thiserror::Error;

use crate::core::types::ChunkPos;
use crate::holder::status::Stage;

/// Main error type for the crate
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("ticket level {level} out of range (max {max})")]
    LevelOutOfRange { level: u32, max: u32 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Generation of {stage:?} failed at {pos:?}: {reason}")]
    Generation {
        pos: ChunkPos,
        stage: Stage,
        reason: String,
    },
}
