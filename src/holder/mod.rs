//! Per-chunk loading holders
//!
//! A [`LoadHolder`] owns one future per generation stage and one per
//! accessibility tier. Each tick it compares the ticket level against the
//! previous tick's and requests, reuses or force-completes futures to match.

pub mod status;
pub mod promise;
pub mod table;
pub mod saving;
pub mod ladder;
pub mod batcher;
pub mod load_holder;

#[cfg(test)]
pub(crate) mod test_support;

pub use batcher::{LightChannel, UpdateBatcher};
pub use load_holder::LoadHolder;
pub use promise::Promise;
pub use saving::SavingFuture;
pub use status::{
    Stage, StageResult, Tier, ENTITY_TICKING_LEVEL, FULL_LEVEL, MAX_LEVEL, TICKING_LEVEL,
    UNLOADED_LEVEL,
};
