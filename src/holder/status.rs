//! Completion stages, accessibility tiers and their mapping from ticket levels
//!
//! Lower ticket levels mean more work is wanted. Both mappings are pure,
//! monotonic lookups into small breakpoint tables.

use serde::{Deserialize, Serialize};

use crate::chunk::ChunkRef;
use crate::core::error::LoadError;

/// Highest level at which entities tick
pub const ENTITY_TICKING_LEVEL: u32 = 31;
/// Highest level at which blocks tick
pub const TICKING_LEVEL: u32 = 32;
/// Highest level at which the chunk is fully generated and accessible
pub const FULL_LEVEL: u32 = 33;
/// Highest level that still supports any stage
pub const MAX_LEVEL: u32 = 39;
/// Level of a unit nobody wants loaded
pub const UNLOADED_LEVEL: u32 = MAX_LEVEL + 1;

/// Ordered generation stages a chunk passes through.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Stage {
    Empty,
    StructureStarts,
    StructureReferences,
    Biomes,
    Noise,
    Surface,
    Carvers,
    Features,
    Light,
    Spawn,
    Full,
}

impl Stage {
    /// Number of stages
    pub const COUNT: usize = 11;

    /// All stages in order
    pub const ALL: [Stage; Stage::COUNT] = [
        Stage::Empty,
        Stage::StructureStarts,
        Stage::StructureReferences,
        Stage::Biomes,
        Stage::Noise,
        Stage::Surface,
        Stage::Carvers,
        Stage::Features,
        Stage::Light,
        Stage::Spawn,
        Stage::Full,
    ];

    /// Stable index of this stage
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Stage> {
        Stage::ALL.get(index).copied()
    }

    /// Stage that must complete before this one
    pub fn parent(self) -> Option<Stage> {
        self.index().checked_sub(1).and_then(Stage::from_index)
    }

    /// Whether this stage is at least as complete as `other`
    pub fn is_or_after(self, other: Stage) -> bool {
        self >= other
    }

    /// Most advanced stage supported at `level`, `None` once unloaded.
    pub fn from_level(level: u32) -> Option<Stage> {
        STAGE_BREAKPOINTS
            .iter()
            .find(|(max_level, _)| level <= *max_level)
            .map(|(_, stage)| *stage)
    }
}

/// `(highest level, stage)` pairs, ascending by level
const STAGE_BREAKPOINTS: [(u32, Stage); 7] = [
    (FULL_LEVEL, Stage::Full),
    (FULL_LEVEL + 1, Stage::Features),
    (FULL_LEVEL + 2, Stage::Carvers),
    (FULL_LEVEL + 3, Stage::Surface),
    (FULL_LEVEL + 4, Stage::Noise),
    (FULL_LEVEL + 5, Stage::Biomes),
    (MAX_LEVEL, Stage::StructureStarts),
];

/// Coarse accessibility tiers layered on top of stages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Tier {
    Inaccessible,
    Border,
    Ticking,
    EntityTicking,
}

impl Tier {
    /// Tier reached at `level`
    pub fn from_level(level: u32) -> Tier {
        TIER_BREAKPOINTS
            .iter()
            .find(|(max_level, _)| level <= *max_level)
            .map(|(_, tier)| *tier)
            .unwrap_or(Tier::Inaccessible)
    }
}

const TIER_BREAKPOINTS: [(u32, Tier); 3] = [
    (ENTITY_TICKING_LEVEL, Tier::EntityTicking),
    (TICKING_LEVEL, Tier::Ticking),
    (FULL_LEVEL, Tier::Border),
];

/// Reject levels outside `[0, UNLOADED_LEVEL]`.
pub fn check_level(level: u32) -> Result<u32, LoadError> {
    if level > UNLOADED_LEVEL {
        return Err(LoadError::LevelOutOfRange { level, max: UNLOADED_LEVEL });
    }
    Ok(level)
}

/// Outcome of a stage or tier future.
#[derive(Clone, Debug)]
pub enum StageResult {
    /// The unit reached the requested stage
    Loaded(ChunkRef),
    /// Not available: never produced, failed, or demoted away
    Unloaded,
}

impl StageResult {
    pub fn is_loaded(&self) -> bool {
        matches!(self, StageResult::Loaded(_))
    }

    /// The loaded unit, if any
    pub fn unit(&self) -> Option<&ChunkRef> {
        match self {
            StageResult::Loaded(unit) => Some(unit),
            StageResult::Unloaded => None,
        }
    }
}
