//! Chunk columns: vertical stacks of sub-chunks plus per-column metadata.
//!
//! The column owns its sub-chunk slots exclusively, the sampled heightmap
//! (surface + grounded, maintained jointly), the cave-entrance flag, and the
//! liquid-position index scanned by the liquid engine.

use crate::coords::{world_y_to_sub, ChunkPos, COL_H, SUB_COUNT, SUB_H, SX, SZ};
use crate::subchunk::{SubChunk, SubChunkState};
use slopworld_core::{BlockId, BlockRegistry, BLOCK_AIR};

/// Edge length of one heightmap sample footprint, in cells.
pub const HEIGHT_SAMPLE: usize = 8;
/// Heightmap samples along X.
pub const SAMPLES_X: usize = SX / HEIGHT_SAMPLE;
/// Heightmap samples along Z.
pub const SAMPLES_Z: usize = SZ / HEIGHT_SAMPLE;

/// Sentinel height for a column of pure air.
pub const NO_HEIGHT: i32 = -1;

/// One heightmap sample: both fields cover the same 8×8 footprint and are
/// always recomputed together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeightSample {
    /// Topmost non-air Y over the footprint (ray target).
    pub surface: i32,
    /// Tallest gap-free run rooted at y=0 over the footprint (ray blocker).
    pub grounded: i32,
}

impl Default for HeightSample {
    fn default() -> Self {
        Self {
            surface: NO_HEIGHT,
            grounded: NO_HEIGHT,
        }
    }
}

/// Sampled column heightmap (4×4 samples of 8×8 cells each).
#[derive(Debug, Clone, Default)]
pub struct ColumnHeightmap {
    samples: [[HeightSample; SAMPLES_X]; SAMPLES_Z],
}

impl ColumnHeightmap {
    /// Sample covering the given local cell.
    pub fn sample_at(&self, x: usize, z: usize) -> HeightSample {
        debug_assert!(x < SX && z < SZ);
        self.samples[z / HEIGHT_SAMPLE][x / HEIGHT_SAMPLE]
    }

    /// Surface height for the sample covering the cell.
    pub fn surface_at(&self, x: usize, z: usize) -> i32 {
        self.sample_at(x, z).surface
    }

    /// Grounded height for the sample covering the cell.
    pub fn grounded_at(&self, x: usize, z: usize) -> i32 {
        self.sample_at(x, z).grounded
    }

    fn set_sample(&mut self, sx: usize, sz: usize, sample: HeightSample) {
        self.samples[sz][sx] = sample;
    }
}

/// Entry in the liquid-position index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiquidCell {
    pub x: u8,
    pub y: u16,
    pub z: u8,
}

/// A vertical stack of sub-chunks sharing one (x,z) chunk coordinate.
pub struct ChunkColumn {
    pos: ChunkPos,
    subs: Vec<Option<Box<SubChunk>>>,
    heightmap: ColumnHeightmap,
    /// Cave entrances are attempted once per column.
    pub entrances_generated: bool,
    /// Column-level finalize (entrances, decorations, heightmap, light
    /// seed) has run.
    pub finalized: bool,
    /// The speculative skylight seed has run at least once, so the
    /// column's sub-chunks are meshable.
    pub light_seeded: bool,
    /// At least one sub-chunk came from the persistence backend.
    pub loaded_from_store: bool,
    liquid_index: Vec<LiquidCell>,
    /// Set when the index must be rebuilt from block data before use.
    liquid_index_stale: bool,
    /// Millisecond timestamp of the last liquid tick for this column.
    pub last_liquid_tick_ms: u64,
}

impl ChunkColumn {
    pub fn new(pos: ChunkPos) -> Self {
        let mut subs = Vec::with_capacity(SUB_COUNT);
        subs.resize_with(SUB_COUNT, || None);
        Self {
            pos,
            subs,
            heightmap: ColumnHeightmap::default(),
            entrances_generated: false,
            finalized: false,
            light_seeded: false,
            loaded_from_store: false,
            liquid_index: Vec::new(),
            liquid_index_stale: false,
            last_liquid_tick_ms: 0,
        }
    }

    pub fn pos(&self) -> ChunkPos {
        self.pos
    }

    pub fn sub(&self, sub_y: usize) -> Option<&SubChunk> {
        self.subs.get(sub_y).and_then(|slot| slot.as_deref())
    }

    pub fn sub_mut(&mut self, sub_y: usize) -> Option<&mut SubChunk> {
        self.subs.get_mut(sub_y).and_then(|slot| slot.as_deref_mut())
    }

    /// Install a generated sub-chunk into its slot, replacing any previous.
    pub fn insert_sub(&mut self, sub_y: usize, sub: Box<SubChunk>) {
        if sub_y < SUB_COUNT {
            self.subs[sub_y] = Some(sub);
        }
    }

    /// Drop a sub-chunk (partial unload outside the interest sphere).
    pub fn remove_sub(&mut self, sub_y: usize) -> Option<Box<SubChunk>> {
        self.subs.get_mut(sub_y).and_then(|slot| slot.take())
    }

    /// Get or create the sub-chunk slot.
    pub fn ensure_sub(&mut self, sub_y: usize) -> &mut SubChunk {
        debug_assert!(sub_y < SUB_COUNT);
        let slot = &mut self.subs[sub_y];
        slot.get_or_insert_with(|| Box::new(SubChunk::new()))
    }

    /// All sixteen slots hold at least Generated data.
    pub fn is_fully_generated(&self) -> bool {
        self.is_generated_through(SUB_COUNT - 1)
    }

    /// Slots `0..=top_sub` all hold at least Generated data.
    pub fn is_generated_through(&self, top_sub: usize) -> bool {
        self.subs.iter().take(top_sub + 1).all(|slot| {
            slot.as_deref().is_some_and(|sub| {
                !matches!(sub.state(), SubChunkState::Empty | SubChunkState::Generating)
            })
        })
    }

    /// Block at (local x, world y, local z); AIR when the slot is missing or
    /// y is outside the column.
    pub fn block_at(&self, x: usize, world_y: i64, z: usize) -> BlockId {
        match world_y_to_sub(world_y) {
            Some((sub_y, local_y)) => self
                .sub(sub_y)
                .map_or(BLOCK_AIR, |sub| sub.block(x, local_y, z)),
            None => BLOCK_AIR,
        }
    }

    /// Write a block at (local x, world y, local z); creates the slot.
    pub fn set_block_at(&mut self, x: usize, world_y: i64, z: usize, id: BlockId) -> bool {
        match world_y_to_sub(world_y) {
            Some((sub_y, local_y)) => self.ensure_sub(sub_y).set_block(x, local_y, z, id),
            None => false,
        }
    }

    pub fn sky_light_at(&self, x: usize, world_y: i64, z: usize) -> u8 {
        match world_y_to_sub(world_y) {
            Some((sub_y, local_y)) => self
                .sub(sub_y)
                .map_or(0, |sub| sub.sky_light(x, local_y, z)),
            None => 0,
        }
    }

    pub fn block_light_at(&self, x: usize, world_y: i64, z: usize) -> u8 {
        match world_y_to_sub(world_y) {
            Some((sub_y, local_y)) => self
                .sub(sub_y)
                .map_or(0, |sub| sub.block_light(x, local_y, z)),
            None => 0,
        }
    }

    pub fn set_sky_light_at(&mut self, x: usize, world_y: i64, z: usize, level: u8) {
        if let Some((sub_y, local_y)) = world_y_to_sub(world_y) {
            self.ensure_sub(sub_y).set_sky_light(x, local_y, z, level);
        }
    }

    pub fn set_block_light_at(&mut self, x: usize, world_y: i64, z: usize, level: u8) {
        if let Some((sub_y, local_y)) = world_y_to_sub(world_y) {
            self.ensure_sub(sub_y).set_block_light(x, local_y, z, level);
        }
    }

    /// Direct scan: topmost non-air Y in the cell's full column.
    pub fn surface_height_scan(&self, x: usize, z: usize) -> i32 {
        for sub_y in (0..SUB_COUNT).rev() {
            if let Some(sub) = self.sub(sub_y) {
                if let Some(local_y) = sub.highest_at(x, z) {
                    return (sub_y * SUB_H + local_y) as i32;
                }
            }
        }
        NO_HEIGHT
    }

    /// Direct scan: topmost Y of the gap-free run rooted at y=0.
    pub fn grounded_height_scan(&self, x: usize, z: usize) -> i32 {
        let mut top = NO_HEIGHT;
        for sub_y in 0..SUB_COUNT {
            let Some(sub) = self.sub(sub_y) else {
                return top;
            };
            match sub.highest_grounded_at(x, z) {
                Some(local_top) => {
                    top = (sub_y * SUB_H + local_top) as i32;
                    if local_top + 1 < SUB_H {
                        // The run ended inside this sub-chunk.
                        return top;
                    }
                }
                None => return top,
            }
        }
        top
    }

    /// Topmost opaque Y in the cell's column, for skylight seeding.
    pub fn highest_opaque_scan(&self, x: usize, z: usize, registry: &BlockRegistry) -> i32 {
        for sub_y in (0..SUB_COUNT).rev() {
            if let Some(sub) = self.sub(sub_y) {
                for local_y in (0..SUB_H).rev() {
                    if registry.is_opaque(sub.block(x, local_y, z)) {
                        return (sub_y * SUB_H + local_y) as i32;
                    }
                }
            }
        }
        NO_HEIGHT
    }

    pub fn heightmap(&self) -> &ColumnHeightmap {
        &self.heightmap
    }

    /// Recompute one heightmap sample from block data.
    ///
    /// Surface and grounded are always refreshed together; the surface field
    /// takes the footprint maximum (any ray into the footprint can hit that
    /// high), the grounded field the minimum (a ray is only blocked when
    /// every cell blocks).
    pub fn recompute_height_sample(&mut self, sample_x: usize, sample_z: usize) {
        debug_assert!(sample_x < SAMPLES_X && sample_z < SAMPLES_Z);
        let mut surface = NO_HEIGHT;
        let mut grounded = i32::MAX;
        for dz in 0..HEIGHT_SAMPLE {
            for dx in 0..HEIGHT_SAMPLE {
                let x = sample_x * HEIGHT_SAMPLE + dx;
                let z = sample_z * HEIGHT_SAMPLE + dz;
                surface = surface.max(self.surface_height_scan(x, z));
                grounded = grounded.min(self.grounded_height_scan(x, z));
            }
        }
        if grounded == i32::MAX {
            grounded = NO_HEIGHT;
        }
        self.heightmap
            .set_sample(sample_x, sample_z, HeightSample { surface, grounded });
    }

    /// Recompute every heightmap sample.
    pub fn recompute_heightmap(&mut self) {
        for sz in 0..SAMPLES_Z {
            for sx in 0..SAMPLES_X {
                self.recompute_height_sample(sx, sz);
            }
        }
    }

    /// Recompute only the sample covering one edited cell.
    pub fn refresh_height_at(&mut self, x: usize, z: usize) {
        self.recompute_height_sample(x / HEIGHT_SAMPLE, z / HEIGHT_SAMPLE);
    }

    /// Liquid-position index, rebuilt from block data when stale.
    pub fn liquid_cells(&mut self, registry: &BlockRegistry) -> &[LiquidCell] {
        if self.liquid_index_stale {
            self.rebuild_liquid_index(registry);
        }
        &self.liquid_index
    }

    /// Track a block write's effect on the liquid index.
    pub fn note_liquid_cell(&mut self, x: usize, world_y: i64, z: usize, is_liquid: bool) {
        if world_y < 0 || world_y >= COL_H as i64 {
            return;
        }
        let cell = LiquidCell {
            x: x as u8,
            y: world_y as u16,
            z: z as u8,
        };
        let found = self.liquid_index.iter().position(|&c| c == cell);
        match (is_liquid, found) {
            (true, None) => self.liquid_index.push(cell),
            (false, Some(idx)) => {
                self.liquid_index.swap_remove(idx);
            }
            _ => {}
        }
    }

    /// Drop a stale entry discovered during a liquid tick.
    pub fn drop_liquid_cell(&mut self, cell: LiquidCell) {
        if let Some(idx) = self.liquid_index.iter().position(|&c| c == cell) {
            self.liquid_index.swap_remove(idx);
        }
    }

    /// Mark the index for a lazy rebuild (used after loading from disk).
    pub fn invalidate_liquid_index(&mut self) {
        self.liquid_index_stale = true;
    }

    fn rebuild_liquid_index(&mut self, registry: &BlockRegistry) {
        self.liquid_index.clear();
        let mut found = Vec::new();
        for sub_y in 0..SUB_COUNT {
            let Some(sub) = self.sub(sub_y) else { continue };
            for local_y in 0..SUB_H {
                for z in 0..SZ {
                    for x in 0..SX {
                        if registry.is_liquid(sub.block(x, local_y, z)) {
                            found.push(LiquidCell {
                                x: x as u8,
                                y: (sub_y * SUB_H + local_y) as u16,
                                z: z as u8,
                            });
                        }
                    }
                }
            }
        }
        self.liquid_index.extend(found);
        self.liquid_index_stale = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slopworld_core::{BLOCK_STONE, BLOCK_WATER};

    fn registry() -> BlockRegistry {
        BlockRegistry::with_defaults()
    }

    #[test]
    fn block_routing_across_sub_boundaries() {
        let mut column = ChunkColumn::new(ChunkPos::new(0, 0));
        assert!(column.set_block_at(0, 63, 0, BLOCK_STONE));
        assert!(column.set_block_at(0, 64, 0, BLOCK_STONE));
        assert_eq!(column.block_at(0, 63, 0), BLOCK_STONE);
        assert_eq!(column.block_at(0, 64, 0), BLOCK_STONE);
        assert_eq!(column.block_at(0, 65, 0), BLOCK_AIR);
        assert_eq!(column.block_at(0, -1, 0), BLOCK_AIR);
        assert_eq!(column.block_at(0, COL_H as i64, 0), BLOCK_AIR);
    }

    #[test]
    fn missing_sub_reads_air() {
        let column = ChunkColumn::new(ChunkPos::new(0, 0));
        assert_eq!(column.block_at(5, 500, 5), BLOCK_AIR);
        assert_eq!(column.sky_light_at(5, 500, 5), 0);
    }

    #[test]
    fn heightmap_sample_tracks_surface_and_grounded_jointly() {
        let mut column = ChunkColumn::new(ChunkPos::new(0, 0));
        // Fill a grounded slab y=0..=9 over the whole sample footprint.
        for y in 0..10i64 {
            for z in 0..HEIGHT_SAMPLE {
                for x in 0..HEIGHT_SAMPLE {
                    column.set_block_at(x, y, z, BLOCK_STONE);
                }
            }
        }
        // One floating block above a gap.
        column.set_block_at(0, 40, 0, BLOCK_STONE);
        column.recompute_height_sample(0, 0);
        let sample = column.heightmap().sample_at(0, 0);
        assert_eq!(sample.surface, 40);
        assert_eq!(sample.grounded, 9);
        assert!(sample.grounded <= sample.surface);
    }

    #[test]
    fn grounded_scan_crosses_sub_boundary() {
        let mut column = ChunkColumn::new(ChunkPos::new(0, 0));
        for y in 0..70i64 {
            column.set_block_at(3, y, 3, BLOCK_STONE);
        }
        assert_eq!(column.grounded_height_scan(3, 3), 69);
        assert_eq!(column.surface_height_scan(3, 3), 69);
    }

    #[test]
    fn grounded_scan_stops_at_missing_sub() {
        let mut column = ChunkColumn::new(ChunkPos::new(0, 0));
        // Fill the whole bottom sub-chunk column; slot 1 is never created.
        for y in 0..SUB_H as i64 {
            column.set_block_at(0, y, 0, BLOCK_STONE);
        }
        assert_eq!(column.grounded_height_scan(0, 0), SUB_H as i32 - 1);
    }

    #[test]
    fn liquid_index_tracks_edits() {
        let registry = registry();
        let mut column = ChunkColumn::new(ChunkPos::new(0, 0));
        column.set_block_at(1, 10, 1, BLOCK_WATER);
        column.note_liquid_cell(1, 10, 1, true);
        assert_eq!(column.liquid_cells(&registry).len(), 1);
        column.set_block_at(1, 10, 1, BLOCK_AIR);
        column.note_liquid_cell(1, 10, 1, false);
        assert!(column.liquid_cells(&registry).is_empty());
    }

    #[test]
    fn stale_liquid_index_rebuilds_from_blocks() {
        let registry = registry();
        let mut column = ChunkColumn::new(ChunkPos::new(0, 0));
        column.set_block_at(2, 20, 2, BLOCK_WATER);
        column.set_block_at(3, 21, 3, BLOCK_WATER);
        column.invalidate_liquid_index();
        let cells = column.liquid_cells(&registry);
        assert_eq!(cells.len(), 2);
    }

    #[test]
    fn fully_generated_requires_all_slots() {
        let mut column = ChunkColumn::new(ChunkPos::new(0, 0));
        assert!(!column.is_fully_generated());
        for sub_y in 0..SUB_COUNT {
            let sub = column.ensure_sub(sub_y);
            sub.set_state(SubChunkState::Generated);
        }
        assert!(column.is_fully_generated());
    }
}
