//! Core type aliases and world coordinates

pub use glam::IVec3;
use serde::{Deserialize, Serialize};

/// Absolute block position in the world
pub type BlockPos = IVec3;

/// Width of a chunk (and a section) along x and z, in blocks
pub const CHUNK_WIDTH: i32 = 16;

/// Height of a section in blocks
pub const SECTION_HEIGHT: i32 = 16;

/// Column coordinate identifying a chunk in the world grid
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkPos {
    pub x: i32,
    pub z: i32,
}

impl ChunkPos {
    /// Create a new chunk position
    pub fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Chunk containing the given block
    pub fn from_block(pos: BlockPos) -> Self {
        Self {
            x: pos.x.div_euclid(CHUNK_WIDTH),
            z: pos.z.div_euclid(CHUNK_WIDTH),
        }
    }

    /// Minimum block x/z of this chunk
    pub fn min_block(&self) -> (i32, i32) {
        (self.x * CHUNK_WIDTH, self.z * CHUNK_WIDTH)
    }

    /// Chebyshev distance between two chunk columns
    pub fn chessboard_distance(&self, other: ChunkPos) -> u32 {
        self.x.abs_diff(other.x).max(self.z.abs_diff(other.z))
    }
}

/// A 16x16x16 section of a chunk, addressed by section coordinates
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SectionPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl SectionPos {
    /// Create a new section position
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Section of `chunk` at vertical section coordinate `y`
    pub fn of_chunk(chunk: ChunkPos, y: i32) -> Self {
        Self { x: chunk.x, y, z: chunk.z }
    }

    /// Section containing the given block
    pub fn from_block(pos: BlockPos) -> Self {
        Self {
            x: pos.x.div_euclid(CHUNK_WIDTH),
            y: pos.y.div_euclid(SECTION_HEIGHT),
            z: pos.z.div_euclid(CHUNK_WIDTH),
        }
    }

    /// Vertical section coordinate of a block y
    pub fn block_to_section(y: i32) -> i32 {
        y.div_euclid(SECTION_HEIGHT)
    }

    /// Pack a block's position inside its section into 12 bits: `x << 8 | z << 4 | y`
    pub fn pack_local(pos: BlockPos) -> u16 {
        let x = pos.x.rem_euclid(CHUNK_WIDTH) as u16;
        let y = pos.y.rem_euclid(SECTION_HEIGHT) as u16;
        let z = pos.z.rem_euclid(CHUNK_WIDTH) as u16;
        (x << 8) | (z << 4) | y
    }

    /// Absolute block position of a packed local key inside this section
    pub fn unpack_local(&self, local: u16) -> BlockPos {
        let x = ((local >> 8) & 0xF) as i32;
        let z = ((local >> 4) & 0xF) as i32;
        let y = (local & 0xF) as i32;
        IVec3::new(
            self.x * CHUNK_WIDTH + x,
            self.y * SECTION_HEIGHT + y,
            self.z * CHUNK_WIDTH + z,
        )
    }

    /// Chunk column this section belongs to
    pub fn chunk(&self) -> ChunkPos {
        ChunkPos::new(self.x, self.z)
    }
}

/// Numeric block state id, opaque to the loading core
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockState(pub u32);

impl BlockState {
    pub const AIR: BlockState = BlockState(0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_from_block_negative() {
        assert_eq!(ChunkPos::from_block(IVec3::new(-1, 64, -17)), ChunkPos::new(-1, -2));
        assert_eq!(ChunkPos::from_block(IVec3::new(15, 0, 16)), ChunkPos::new(0, 1));
    }

    #[test]
    fn test_pack_local() {
        let pos = IVec3::new(-3, -60, 35);
        let section = SectionPos::from_block(pos);
        assert_eq!(section, SectionPos::new(-1, -4, 2));

        let local = SectionPos::pack_local(pos);
        assert_eq!(section.unpack_local(local), pos);
    }

    #[test]
    fn test_pack_local_layout() {
        // x in the high nibble, then z, then y
        assert_eq!(SectionPos::pack_local(IVec3::new(1, 2, 3)), 0x132);
    }

    #[test]
    fn test_chessboard_distance() {
        let a = ChunkPos::new(0, 0);
        assert_eq!(a.chessboard_distance(ChunkPos::new(3, -5)), 5);
    }
}
