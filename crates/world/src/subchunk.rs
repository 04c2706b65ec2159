//! Dense voxel storage for one 32×32×64 sub-chunk.
//!
//! Blocks are a flat `u16` array; light is one byte per cell with the
//! skylight in the high nibble and block light in the low nibble.

use crate::coords::{LocalPos, SUB_H, SUB_VOLUME, SX, SZ};
use slopworld_core::{BlockId, BlockRegistry, BLOCK_AIR};

/// Maximum light level for either channel.
pub const MAX_LIGHT: u8 = 15;

bitflags::bitflags! {
    /// Dirty flags set whenever sub-chunk data changes.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct DirtyFlags: u8 {
        const MESH = 0b0000_0001;
        const LIGHT = 0b0000_0010;
    }
}

impl Default for DirtyFlags {
    fn default() -> Self {
        DirtyFlags::empty()
    }
}

/// Lifecycle state of a sub-chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubChunkState {
    /// Slot exists but holds no generated data yet.
    Empty,
    /// A generation job is in flight.
    Generating,
    /// Block data is final; lighting/meshing still pending.
    Generated,
    /// A mesh job is in flight.
    Meshing,
    /// Blocks, light, and mesh are mutually consistent.
    Ready,
    /// Edited since last mesh/light pass.
    Dirty,
}

/// One 32×32×64 voxel volume.
pub struct SubChunk {
    blocks: Box<[BlockId]>,
    /// Packed light nibbles: high = sky, low = block.
    light: Box<[u8]>,
    state: SubChunkState,
    dirty: DirtyFlags,
    fully_opaque: bool,
}

impl SubChunk {
    /// Fresh sub-chunk filled with air.
    pub fn new() -> Self {
        Self {
            blocks: vec![BLOCK_AIR; SUB_VOLUME].into_boxed_slice(),
            light: vec![0u8; SUB_VOLUME].into_boxed_slice(),
            state: SubChunkState::Empty,
            dirty: DirtyFlags::empty(),
            fully_opaque: false,
        }
    }

    /// Rebuild a sub-chunk from persisted arrays.
    ///
    /// Returns None when the array lengths do not match the volume.
    pub fn from_parts(blocks: Vec<BlockId>, light: Option<Vec<u8>>) -> Option<Self> {
        if blocks.len() != SUB_VOLUME {
            return None;
        }
        let light = match light {
            Some(light) if light.len() == SUB_VOLUME => light,
            Some(_) => return None,
            None => vec![0u8; SUB_VOLUME],
        };
        Some(Self {
            blocks: blocks.into_boxed_slice(),
            light: light.into_boxed_slice(),
            state: SubChunkState::Generated,
            dirty: DirtyFlags::all(),
            fully_opaque: false,
        })
    }

    fn in_range(x: usize, y: usize, z: usize) -> bool {
        x < SX && y < SUB_H && z < SZ
    }

    /// Block at a local position; AIR when out of range.
    pub fn block(&self, x: usize, y: usize, z: usize) -> BlockId {
        if !Self::in_range(x, y, z) {
            return BLOCK_AIR;
        }
        self.blocks[LocalPos::new(x, y, z).index()]
    }

    /// Write a block.
    ///
    /// Returns false when out of range or unchanged; a real change marks the
    /// sub-chunk dirty for meshing and lighting.
    pub fn set_block(&mut self, x: usize, y: usize, z: usize, id: BlockId) -> bool {
        if !Self::in_range(x, y, z) {
            return false;
        }
        let idx = LocalPos::new(x, y, z).index();
        if self.blocks[idx] == id {
            return false;
        }
        self.blocks[idx] = id;
        self.mark_dirty(DirtyFlags::MESH | DirtyFlags::LIGHT);
        true
    }

    /// Skylight nibble at a local position; 0 when out of range.
    pub fn sky_light(&self, x: usize, y: usize, z: usize) -> u8 {
        if !Self::in_range(x, y, z) {
            return 0;
        }
        self.light[LocalPos::new(x, y, z).index()] >> 4
    }

    /// Block-light nibble at a local position; 0 when out of range.
    pub fn block_light(&self, x: usize, y: usize, z: usize) -> u8 {
        if !Self::in_range(x, y, z) {
            return 0;
        }
        self.light[LocalPos::new(x, y, z).index()] & 0x0F
    }

    /// Write the skylight nibble, clamped to 0..15.
    pub fn set_sky_light(&mut self, x: usize, y: usize, z: usize, level: u8) {
        if !Self::in_range(x, y, z) {
            return;
        }
        let idx = LocalPos::new(x, y, z).index();
        let level = level.min(MAX_LIGHT);
        let packed = (level << 4) | (self.light[idx] & 0x0F);
        if self.light[idx] != packed {
            self.light[idx] = packed;
            self.mark_dirty(DirtyFlags::MESH);
        }
    }

    /// Write the block-light nibble, clamped to 0..15.
    pub fn set_block_light(&mut self, x: usize, y: usize, z: usize, level: u8) {
        if !Self::in_range(x, y, z) {
            return;
        }
        let idx = LocalPos::new(x, y, z).index();
        let level = level.min(MAX_LIGHT);
        let packed = (self.light[idx] & 0xF0) | level;
        if self.light[idx] != packed {
            self.light[idx] = packed;
            self.mark_dirty(DirtyFlags::MESH);
        }
    }

    /// Fill the whole volume with one block id.
    pub fn fill(&mut self, id: BlockId) {
        self.blocks.fill(id);
        self.mark_dirty(DirtyFlags::MESH | DirtyFlags::LIGHT);
    }

    /// Fill one horizontal layer with one block id.
    pub fn fill_layer(&mut self, y: usize, id: BlockId) {
        if y >= SUB_H {
            return;
        }
        let start = y * SX * SZ;
        self.blocks[start..start + SX * SZ].fill(id);
        self.mark_dirty(DirtyFlags::MESH | DirtyFlags::LIGHT);
    }

    /// Topmost non-air local Y in the (x,z) column, if any.
    pub fn highest_at(&self, x: usize, z: usize) -> Option<usize> {
        for y in (0..SUB_H).rev() {
            if self.block(x, y, z) != BLOCK_AIR {
                return Some(y);
            }
        }
        None
    }

    /// Topmost local Y of the contiguous non-air run rooted at y=0, if the
    /// bottom cell is non-air.
    pub fn highest_grounded_at(&self, x: usize, z: usize) -> Option<usize> {
        if self.block(x, 0, z) == BLOCK_AIR {
            return None;
        }
        let mut top = 0;
        for y in 1..SUB_H {
            if self.block(x, y, z) == BLOCK_AIR {
                break;
            }
            top = y;
        }
        Some(top)
    }

    /// Whether every cell in the volume is opaque.
    pub fn compute_fully_opaque(&self, registry: &BlockRegistry) -> bool {
        self.blocks.iter().all(|&id| registry.is_opaque(id))
    }

    /// Cached fully-opaque flag, computed at generation time.
    pub fn fully_opaque(&self) -> bool {
        self.fully_opaque
    }

    pub fn set_fully_opaque(&mut self, value: bool) {
        self.fully_opaque = value;
    }

    pub fn state(&self) -> SubChunkState {
        self.state
    }

    pub fn set_state(&mut self, state: SubChunkState) {
        self.state = state;
    }

    /// Set dirty flags; a Ready sub-chunk transitions to Dirty so that
    /// `Ready` always implies a clean sub-chunk.
    pub fn mark_dirty(&mut self, flags: DirtyFlags) {
        self.dirty.insert(flags);
        if self.state == SubChunkState::Ready {
            self.state = SubChunkState::Dirty;
        }
    }

    pub fn dirty_flags(&self) -> DirtyFlags {
        self.dirty
    }

    /// Consume and return the current dirty flags.
    pub fn take_dirty_flags(&mut self) -> DirtyFlags {
        let flags = self.dirty;
        self.dirty = DirtyFlags::empty();
        flags
    }

    /// Clear specific dirty flags (e.g. MESH when a mesh job is dispatched).
    pub fn clear_dirty(&mut self, flags: DirtyFlags) {
        self.dirty.remove(flags);
    }

    /// Raw block array (y-major), for meshing snapshots and persistence.
    pub fn blocks(&self) -> &[BlockId] {
        &self.blocks
    }

    /// Raw packed-light array, for meshing snapshots and persistence.
    pub fn light(&self) -> &[u8] {
        &self.light
    }

    /// Replace the packed-light array wholesale (background re-light apply).
    pub fn replace_light(&mut self, light: &[u8]) -> bool {
        if light.len() != SUB_VOLUME {
            return false;
        }
        if self.light.as_ref() == light {
            return false;
        }
        self.light.copy_from_slice(light);
        self.mark_dirty(DirtyFlags::MESH);
        true
    }
}

impl Default for SubChunk {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slopworld_core::BLOCK_STONE;

    #[test]
    fn out_of_range_reads_are_air_and_dark() {
        let sub = SubChunk::new();
        assert_eq!(sub.block(SX, 0, 0), BLOCK_AIR);
        assert_eq!(sub.block(0, SUB_H, 0), BLOCK_AIR);
        assert_eq!(sub.sky_light(0, 0, SZ), 0);
        assert_eq!(sub.block_light(99, 99, 99), 0);
    }

    #[test]
    fn out_of_range_writes_return_false() {
        let mut sub = SubChunk::new();
        assert!(!sub.set_block(SX, 0, 0, BLOCK_STONE));
        assert!(!sub.set_block(0, SUB_H, 0, BLOCK_STONE));
    }

    #[test]
    fn set_block_is_idempotent() {
        let mut sub = SubChunk::new();
        assert!(sub.set_block(1, 2, 3, BLOCK_STONE));
        assert!(!sub.set_block(1, 2, 3, BLOCK_STONE));
        assert_eq!(sub.block(1, 2, 3), BLOCK_STONE);
    }

    #[test]
    fn change_marks_dirty_and_leaves_ready() {
        let mut sub = SubChunk::new();
        sub.set_state(SubChunkState::Ready);
        sub.take_dirty_flags();
        assert!(sub.set_block(0, 0, 0, BLOCK_STONE));
        assert_eq!(sub.state(), SubChunkState::Dirty);
        assert!(sub
            .dirty_flags()
            .contains(DirtyFlags::MESH | DirtyFlags::LIGHT));
    }

    #[test]
    fn light_nibbles_are_independent_and_clamped() {
        let mut sub = SubChunk::new();
        sub.set_sky_light(4, 5, 6, 200);
        sub.set_block_light(4, 5, 6, 9);
        assert_eq!(sub.sky_light(4, 5, 6), MAX_LIGHT);
        assert_eq!(sub.block_light(4, 5, 6), 9);
        sub.set_sky_light(4, 5, 6, 3);
        assert_eq!(sub.sky_light(4, 5, 6), 3);
        assert_eq!(sub.block_light(4, 5, 6), 9);
    }

    #[test]
    fn fill_layer_touches_exactly_one_slice() {
        let mut sub = SubChunk::new();
        sub.fill_layer(10, BLOCK_STONE);
        for x in 0..SX {
            for z in 0..SZ {
                assert_eq!(sub.block(x, 10, z), BLOCK_STONE);
                assert_eq!(sub.block(x, 9, z), BLOCK_AIR);
                assert_eq!(sub.block(x, 11, z), BLOCK_AIR);
            }
        }
    }

    #[test]
    fn highest_scans() {
        let mut sub = SubChunk::new();
        assert_eq!(sub.highest_at(0, 0), None);
        sub.set_block(0, 0, 0, BLOCK_STONE);
        sub.set_block(0, 1, 0, BLOCK_STONE);
        sub.set_block(0, 5, 0, BLOCK_STONE);
        assert_eq!(sub.highest_at(0, 0), Some(5));
        // Grounded run stops at the first air gap.
        assert_eq!(sub.highest_grounded_at(0, 0), Some(1));
        assert_eq!(sub.highest_grounded_at(1, 0), None);
    }

    #[test]
    fn from_parts_validates_lengths() {
        assert!(SubChunk::from_parts(vec![0; 10], None).is_none());
        let sub = SubChunk::from_parts(vec![BLOCK_STONE; SUB_VOLUME], None);
        assert!(sub.is_some());
        assert_eq!(sub.map(|s| s.block(0, 0, 0)), Some(BLOCK_STONE));
    }

    #[test]
    fn replace_light_diffs() {
        let mut sub = SubChunk::new();
        let same = vec![0u8; SUB_VOLUME];
        assert!(!sub.replace_light(&same));
        let mut changed = vec![0u8; SUB_VOLUME];
        changed[0] = 0xF0;
        assert!(sub.replace_light(&changed));
        assert_eq!(sub.sky_light(0, 0, 0), 15);
    }
}
