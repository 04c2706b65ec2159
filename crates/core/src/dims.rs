//! Voxel grid dimensions shared by every layer.

/// Sub-chunk width along X in voxels.
pub const SX: usize = 32;
/// Sub-chunk depth along Z in voxels.
pub const SZ: usize = 32;
/// Sub-chunk height along Y in voxels.
pub const SUB_H: usize = 64;
/// Sub-chunks stacked per column.
pub const SUB_COUNT: usize = 16;
/// Total column height in voxels.
pub const COL_H: usize = SUB_H * SUB_COUNT;
/// Voxels per sub-chunk.
pub const SUB_VOLUME: usize = SX * SZ * SUB_H;

/// log2 of the horizontal chunk size, for shift-based conversion.
pub const CHUNK_SHIFT: u32 = 5;

const _: () = assert!(SX == 1 << CHUNK_SHIFT);
const _: () = assert!(SZ == 1 << CHUNK_SHIFT);
const _: () = assert!(COL_H == SUB_H * SUB_COUNT);
