//! Stagehold - staged chunk loading driven by ticket levels

pub mod core;
pub mod chunk;
pub mod holder;
pub mod pipeline;
pub mod net;
pub mod world;
