//! Terrain generation pipeline.
//!
//! Per sub-chunk: terrain fill (with biome border blending) → water fill →
//! features in declared order → cave carving. Per column, once every slot is
//! generated: entrance shafts, surface decorations, heightmap, and the
//! skylight seed. Everything here is a pure function of seed and coordinate.

use crate::biome::{BiomeConfig, BiomeMap};
use crate::caves::CaveCarver;
use crate::column::ChunkColumn;
use crate::coords::{ChunkPos, SubChunkPos, COL_H, SUB_H, SX, SZ};
use crate::features::{apply_decorations, FeatureConfig, HeightGrid};
use crate::noise::{FractalNoise, NoiseConfig};
use crate::subchunk::{SubChunk, SubChunkState};
use slopworld_core::{BLOCK_AIR, BLOCK_WATER};
use tracing::{debug, instrument};

/// Seeded generator shared (read-only) between the tick thread and workers.
pub struct WorldGenerator {
    world_seed: u64,
    sea_level: i64,
    biomes: BiomeMap,
    height_noise: FractalNoise,
    carver: CaveCarver,
}

impl WorldGenerator {
    pub fn new(world_seed: u64, sea_level: i64) -> Self {
        let height_config = NoiseConfig {
            octaves: 4,
            lacunarity: 2.0,
            persistence: 0.5,
            frequency: 0.004,
            seed: (world_seed ^ 0x1111_1111) as u32,
        };
        Self {
            world_seed,
            sea_level,
            biomes: BiomeMap::new(world_seed),
            height_noise: FractalNoise::new(height_config),
            carver: CaveCarver::new(world_seed),
        }
    }

    pub fn world_seed(&self) -> u64 {
        self.world_seed
    }

    pub fn sea_level(&self) -> i64 {
        self.sea_level
    }

    pub fn biomes(&self) -> &BiomeMap {
        &self.biomes
    }

    /// Terrain surface height at a world cell: `offset + amplitude · noise`,
    /// with offset and amplitude blended across region borders.
    pub fn terrain_height(&self, world_x: i64, world_z: i64) -> i64 {
        let (offset, amplitude) = self.biomes.blended_height_params(world_x, world_z);
        let noise = self
            .height_noise
            .sample_2d(world_x as f64, world_z as f64);
        let height = offset + amplitude * noise;
        (height as i64).clamp(1, COL_H as i64 - 2)
    }

    /// Terrain heights for every column of a chunk, indexed `[z][x]`.
    pub fn height_grid(&self, chunk: ChunkPos) -> HeightGrid {
        let (origin_x, origin_z) = chunk.origin();
        let mut grid = [[0i64; SX]; SZ];
        for (z, row) in grid.iter_mut().enumerate() {
            for (x, cell) in row.iter_mut().enumerate() {
                *cell = self.terrain_height(origin_x + x as i64, origin_z + z as i64);
            }
        }
        grid
    }

    /// Highest sub-chunk slot that can contain terrain (including cliff
    /// overlays and the sea surface) for a chunk. Slots above it hold only
    /// air; a column is operationally complete once everything up to this
    /// slot is generated.
    pub fn terrain_top_sub(&self, chunk: ChunkPos) -> usize {
        let grid = self.height_grid(chunk);
        let mut top = self.sea_level;
        for row in &grid {
            for &h in row {
                top = top.max(h);
            }
        }
        let config = BiomeConfig::get(self.biomes.biome_at_chunk(chunk));
        for feature in &config.features {
            if let FeatureConfig::Cliff { max_height, .. } = feature {
                top = top.max(*max_height);
            }
        }
        (top.clamp(0, COL_H as i64 - 1) as usize) / SUB_H
    }

    /// Generate one sub-chunk's block data.
    #[instrument(skip(self), fields(pos = %pos))]
    pub fn generate_sub(&self, pos: SubChunkPos) -> SubChunk {
        let config = BiomeConfig::get(self.biomes.biome_at_chunk(pos.chunk));
        let heights = self.height_grid(pos.chunk);
        let mut sub = SubChunk::new();
        let base_y = pos.base_y();

        // Terrain fill: base up to the subsurface band, subsurface beneath
        // the surface cell, surface on top; then flood air below sea level.
        for z in 0..SZ {
            for x in 0..SX {
                let h = heights[z][x];
                for local_y in 0..SUB_H {
                    let world_y = base_y + local_y as i64;
                    let id = if world_y < h - config.subsurface_depth {
                        config.base_block
                    } else if world_y < h {
                        config.subsurface_block
                    } else if world_y == h {
                        config.surface_block
                    } else if world_y < self.sea_level {
                        BLOCK_WATER
                    } else {
                        BLOCK_AIR
                    };
                    if id != BLOCK_AIR {
                        sub.set_block(x, local_y, z, id);
                    }
                }
            }
        }

        // Feature pass, in the biome's declared order.
        for feature in &config.features {
            feature.apply(self.world_seed, pos, &mut sub, &heights, config.base_block);
        }

        // Cave pass.
        self.carver
            .carve_sub(&config.caves, pos, &mut sub, self.sea_level);

        sub.take_dirty_flags();
        sub.set_state(SubChunkState::Generated);
        sub
    }

    /// Column-level passes that need the whole stack: entrance shafts,
    /// decorations, and the heightmap. Runs on the tick thread once every
    /// slot holds generated data; entrances are guarded by the per-column
    /// flag.
    pub fn finalize_column(&self, column: &mut ChunkColumn) {
        let config = BiomeConfig::get(self.biomes.biome_at_chunk(column.pos()));
        if !column.entrances_generated {
            let carved = self.carver.carve_entrances(&config.caves, column);
            column.entrances_generated = true;
            if carved {
                debug!(chunk = %column.pos(), "carved cave entrance");
            }
        }
        apply_decorations(self.world_seed, &config, column);
        column.recompute_heightmap();
        column.invalidate_liquid_index();
    }
}
