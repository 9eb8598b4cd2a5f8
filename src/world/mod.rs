//! All holders of a world, ticked together

pub mod holder_map;

pub use holder_map::{HolderMap, RetiredHolder, TickStats};
