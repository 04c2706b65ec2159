//! Coordinate spaces and conversions.
//!
//! Four spaces are in play: world (signed, unbounded), chunk column (x,z),
//! sub-chunk (column + vertical index), and local (within one sub-chunk).
//! Conversions use arithmetic shifts and positive modulo so negative world
//! coordinates behave.

use serde::{Deserialize, Serialize};
use std::fmt;

pub use slopworld_core::{CHUNK_SHIFT, COL_H, SUB_COUNT, SUB_H, SUB_VOLUME, SX, SZ};

/// Absolute block position in world space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorldPos {
    pub x: i64,
    pub y: i64,
    pub z: i64,
}

impl WorldPos {
    pub const fn new(x: i64, y: i64, z: i64) -> Self {
        Self { x, y, z }
    }

    /// The column containing this position.
    pub const fn chunk(self) -> ChunkPos {
        ChunkPos::new(self.x >> CHUNK_SHIFT, self.z >> CHUNK_SHIFT)
    }

    /// Position offset by a face direction.
    pub fn offset(self, dx: i64, dy: i64, dz: i64) -> Self {
        Self::new(self.x + dx, self.y + dy, self.z + dz)
    }

    /// True when `y` lies inside the column height range.
    pub const fn in_world_height(self) -> bool {
        self.y >= 0 && self.y < COL_H as i64
    }

    /// Local X within the containing column.
    pub const fn local_x(self) -> usize {
        (self.x & (SX as i64 - 1)) as usize
    }

    /// Local Z within the containing column.
    pub const fn local_z(self) -> usize {
        (self.z & (SZ as i64 - 1)) as usize
    }
}

impl fmt::Display for WorldPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Chunk-column coordinate (X,Z) in chunk space.
///
/// Implements Ord for deterministic iteration in BTreeMap/BTreeSet.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ChunkPos {
    pub x: i64,
    pub z: i64,
}

impl ChunkPos {
    pub const fn new(x: i64, z: i64) -> Self {
        Self { x, z }
    }

    /// World-space origin of this column.
    pub const fn origin(self) -> (i64, i64) {
        (self.x << CHUNK_SHIFT, self.z << CHUNK_SHIFT)
    }

    /// Offset by whole chunks.
    pub const fn offset(self, dx: i64, dz: i64) -> Self {
        Self::new(self.x + dx, self.z + dz)
    }

    /// The four cardinal neighbors.
    pub const fn cardinal_neighbors(self) -> [ChunkPos; 4] {
        [
            self.offset(1, 0),
            self.offset(-1, 0),
            self.offset(0, 1),
            self.offset(0, -1),
        ]
    }

    /// Chebyshev-adjacent neighbors including diagonals.
    pub fn ring_neighbors(self) -> [ChunkPos; 8] {
        [
            self.offset(1, 0),
            self.offset(-1, 0),
            self.offset(0, 1),
            self.offset(0, -1),
            self.offset(1, 1),
            self.offset(1, -1),
            self.offset(-1, 1),
            self.offset(-1, -1),
        ]
    }

    /// Euclidean distance in chunk units.
    pub fn distance_to(self, other: ChunkPos) -> f64 {
        let dx = (self.x - other.x) as f64;
        let dz = (self.z - other.z) as f64;
        (dx * dx + dz * dz).sqrt()
    }
}

impl fmt::Display for ChunkPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.z)
    }
}

/// Address of one sub-chunk: a column plus its vertical slot.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct SubChunkPos {
    pub chunk: ChunkPos,
    pub sub_y: u8,
}

impl SubChunkPos {
    pub const fn new(chunk: ChunkPos, sub_y: u8) -> Self {
        Self { chunk, sub_y }
    }

    /// World-space Y of this sub-chunk's bottom layer.
    pub const fn base_y(self) -> i64 {
        self.sub_y as i64 * SUB_H as i64
    }
}

impl fmt::Display for SubChunkPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.chunk, self.sub_y)
    }
}

/// Position within one sub-chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LocalPos {
    pub x: usize,
    pub y: usize,
    pub z: usize,
}

impl LocalPos {
    pub const fn new(x: usize, y: usize, z: usize) -> Self {
        Self { x, y, z }
    }

    /// Linear index into the dense sub-chunk arrays.
    ///
    /// Y-major layout keeps horizontal slices contiguous for scans.
    pub fn index(self) -> usize {
        debug_assert!(self.x < SX);
        debug_assert!(self.y < SUB_H);
        debug_assert!(self.z < SZ);
        self.y * SX * SZ + self.z * SX + self.x
    }
}

/// World block coordinate → chunk coordinate along one axis.
///
/// Arithmetic right shift, so negative coordinates land in the right chunk.
pub const fn world_to_chunk_axis(v: i64) -> i64 {
    v >> CHUNK_SHIFT
}

/// World block coordinate → local coordinate along one horizontal axis.
pub const fn world_to_local_axis(v: i64) -> usize {
    (v & (SX as i64 - 1)) as usize
}

/// World Y → (sub-chunk slot, local Y), or None outside the column height.
pub const fn world_y_to_sub(y: i64) -> Option<(usize, usize)> {
    if y < 0 || y >= COL_H as i64 {
        return None;
    }
    let y = y as usize;
    Some((y / SUB_H, y % SUB_H))
}

/// (sub-chunk slot, local Y) → world Y.
pub const fn sub_to_world_y(sub_y: usize, local_y: usize) -> i64 {
    (sub_y * SUB_H + local_y) as i64
}
