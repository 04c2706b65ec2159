//! Biome-scoped feature passes: cliff overlays, ore veins, and surface
//! decorations.
//!
//! Features are pure block writes inside the generating column; anything a
//! feature would place past the column's XZ bounds is dropped.

use crate::biome::BiomeConfig;
use crate::column::ChunkColumn;
use crate::coords::{ChunkPos, SubChunkPos, COL_H, SUB_H, SX, SZ};
use crate::noise::{FractalNoise, NoiseConfig};
use crate::subchunk::SubChunk;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use slopworld_core::{
    BlockId, BLOCK_AIR, BLOCK_COAL_ORE, BLOCK_DIAMOND_ORE, BLOCK_GOLD_ORE, BLOCK_IRON_ORE,
    BLOCK_STONE,
};

/// Terrain heights for each column of a chunk, indexed `[z][x]`.
pub type HeightGrid = [[i64; SX]; SZ];

/// A block-writing pass that runs after terrain fill, in declared order.
#[derive(Debug, Clone)]
pub enum FeatureConfig {
    /// Overlays additional stone above the terrain surface where a 2D noise
    /// exceeds its threshold, capped at `max_height`.
    Cliff {
        max_height: i64,
        threshold: f64,
        frequency: f64,
        seed_salt: u64,
    },
    /// Replaces the biome base block with an ore wherever 3D noise exceeds
    /// the threshold inside the allowed Y range.
    Ore {
        block: BlockId,
        threshold: f64,
        min_y: i64,
        max_y: i64,
        frequency: f64,
        seed_salt: u64,
    },
}

impl FeatureConfig {
    /// The default ore ladder: commoner ores higher, richer ores deeper.
    pub fn standard_ores() -> Vec<FeatureConfig> {
        vec![
            FeatureConfig::Ore {
                block: BLOCK_COAL_ORE,
                threshold: 0.74,
                min_y: 8,
                max_y: 320,
                frequency: 0.09,
                seed_salt: 0xC0A1,
            },
            FeatureConfig::Ore {
                block: BLOCK_IRON_ORE,
                threshold: 0.78,
                min_y: 8,
                max_y: 256,
                frequency: 0.10,
                seed_salt: 0x1207,
            },
            FeatureConfig::Ore {
                block: BLOCK_GOLD_ORE,
                threshold: 0.82,
                min_y: 8,
                max_y: 128,
                frequency: 0.11,
                seed_salt: 0x601D,
            },
            FeatureConfig::Ore {
                block: BLOCK_DIAMOND_ORE,
                threshold: 0.86,
                min_y: 8,
                max_y: 64,
                frequency: 0.12,
                seed_salt: 0xD1A5,
            },
        ]
    }

    /// Mountain cliff overlay.
    pub fn cliffs() -> FeatureConfig {
        FeatureConfig::Cliff {
            max_height: 420,
            threshold: 0.45,
            frequency: 0.012,
            seed_salt: 0xC11F,
        }
    }

    /// Apply this feature to one sub-chunk.
    pub fn apply(
        &self,
        world_seed: u64,
        pos: SubChunkPos,
        sub: &mut SubChunk,
        heights: &HeightGrid,
        base_block: BlockId,
    ) {
        match *self {
            FeatureConfig::Cliff {
                max_height,
                threshold,
                frequency,
                seed_salt,
            } => {
                let noise = FractalNoise::new(NoiseConfig {
                    octaves: 3,
                    frequency,
                    seed: (world_seed ^ seed_salt) as u32,
                    ..Default::default()
                });
                let (origin_x, origin_z) = pos.chunk.origin();
                for z in 0..SZ {
                    for x in 0..SX {
                        let world_x = origin_x + x as i64;
                        let world_z = origin_z + z as i64;
                        let value = noise.sample_2d(world_x as f64, world_z as f64);
                        if value <= threshold {
                            continue;
                        }
                        let h = heights[z][x];
                        let strength = (value - threshold) / (1.0 - threshold);
                        let top = h + (strength * (max_height - h).max(0) as f64) as i64;
                        let top = top.min(max_height).min(COL_H as i64 - 1);
                        for world_y in (h + 1)..=top {
                            let local = world_y - pos.base_y();
                            if (0..SUB_H as i64).contains(&local) {
                                sub.set_block(x, local as usize, z, BLOCK_STONE);
                            }
                        }
                    }
                }
            }
            FeatureConfig::Ore {
                block,
                threshold,
                min_y,
                max_y,
                frequency,
                seed_salt,
            } => {
                let noise = FractalNoise::new(NoiseConfig {
                    octaves: 2,
                    frequency,
                    seed: (world_seed ^ seed_salt) as u32,
                    ..Default::default()
                });
                let lo = min_y.max(pos.base_y());
                let hi = max_y.min(pos.base_y() + SUB_H as i64 - 1);
                if lo > hi {
                    return;
                }
                let (origin_x, origin_z) = pos.chunk.origin();
                for world_y in lo..=hi {
                    let local_y = (world_y - pos.base_y()) as usize;
                    for z in 0..SZ {
                        for x in 0..SX {
                            if sub.block(x, local_y, z) != base_block {
                                continue;
                            }
                            let world_x = origin_x + x as i64;
                            let world_z = origin_z + z as i64;
                            let value = noise.sample_3d(
                                world_x as f64,
                                world_y as f64,
                                world_z as f64,
                            );
                            if value > threshold {
                                sub.set_block(x, local_y, z, block);
                            }
                        }
                    }
                }
            }
        }
    }
}

/// Surface scatter placed after terrain and caves.
#[derive(Debug, Clone)]
pub struct DecorationConfig {
    pub block: BlockId,
    /// Random placement attempts per chunk column.
    pub attempts_per_chunk: u32,
    /// Surface blocks this decoration may stand on.
    pub surfaces: &'static [BlockId],
}

/// Deterministic per-chunk RNG seed, independent of generation order.
fn decoration_seed(world_seed: u64, chunk: ChunkPos) -> u64 {
    world_seed
        ^ (chunk.x as u64).wrapping_mul(0xC0FF_EE00_D00D_BAAD)
        ^ (chunk.z as u64).wrapping_mul(0x5EED_CAFE_1234_5678)
        ^ 0x4445_434F_5241_5445 // "DECORATE"
}

/// Scatter a biome's decorations over a fully generated column.
pub fn apply_decorations(world_seed: u64, config: &BiomeConfig, column: &mut ChunkColumn) {
    if config.decorations.is_empty() {
        return;
    }
    let mut rng = StdRng::seed_from_u64(decoration_seed(world_seed, column.pos()));
    for decoration in &config.decorations {
        for _ in 0..decoration.attempts_per_chunk {
            let x = rng.gen_range(0..SX);
            let z = rng.gen_range(0..SZ);
            let surface = column.surface_height_scan(x, z);
            if surface < 0 || surface + 1 >= COL_H as i32 {
                continue;
            }
            let ground = column.block_at(x, surface as i64, z);
            if !decoration.surfaces.contains(&ground) {
                continue;
            }
            let above = surface as i64 + 1;
            if column.block_at(x, above, z) == BLOCK_AIR {
                column.set_block_at(x, above, z, decoration.block);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::biome::BiomeId;
    use crate::coords::SUB_COUNT;
    use slopworld_core::BLOCK_GRASS;

    fn heights_flat(h: i64) -> HeightGrid {
        [[h; SX]; SZ]
    }

    #[test]
    fn ore_replaces_only_base_block() {
        let pos = SubChunkPos::new(ChunkPos::new(0, 0), 0);
        let mut sub = SubChunk::new();
        for z in 0..SZ {
            for x in 0..SX {
                for y in 0..SUB_H {
                    sub.set_block(x, y, z, BLOCK_STONE);
                }
            }
        }
        // A few grass intruders must survive the ore pass.
        sub.set_block(0, 10, 0, BLOCK_GRASS);
        sub.set_block(5, 20, 5, BLOCK_GRASS);

        let feature = FeatureConfig::Ore {
            block: BLOCK_COAL_ORE,
            threshold: 0.3,
            min_y: 0,
            max_y: 63,
            frequency: 0.2,
            seed_salt: 0xC0A1,
        };
        feature.apply(1, pos, &mut sub, &heights_flat(63), BLOCK_STONE);

        assert_eq!(sub.block(0, 10, 0), BLOCK_GRASS);
        assert_eq!(sub.block(5, 20, 5), BLOCK_GRASS);
        let ore_count = (0..SUB_H)
            .flat_map(|y| (0..SZ).flat_map(move |z| (0..SX).map(move |x| (x, y, z))))
            .filter(|&(x, y, z)| sub.block(x, y, z) == BLOCK_COAL_ORE)
            .count();
        assert!(ore_count > 0, "low threshold should place some ore");
    }

    #[test]
    fn ore_respects_y_range() {
        let pos = SubChunkPos::new(ChunkPos::new(0, 0), 1); // world y 64..127
        let mut sub = SubChunk::new();
        sub.fill(BLOCK_STONE);
        let feature = FeatureConfig::Ore {
            block: BLOCK_COAL_ORE,
            threshold: -1.1, // would replace everything allowed
            min_y: 0,
            max_y: 63, // entirely below this sub-chunk
            frequency: 0.2,
            seed_salt: 1,
        };
        feature.apply(1, pos, &mut sub, &heights_flat(200), BLOCK_STONE);
        for y in 0..SUB_H {
            assert_eq!(sub.block(0, y, 0), BLOCK_STONE);
        }
    }

    #[test]
    fn feature_application_is_deterministic() {
        let pos = SubChunkPos::new(ChunkPos::new(3, -2), 2);
        let feature = FeatureConfig::Ore {
            block: BLOCK_IRON_ORE,
            threshold: 0.5,
            min_y: 0,
            max_y: COL_H as i64,
            frequency: 0.1,
            seed_salt: 0x1207,
        };
        let mut a = SubChunk::new();
        let mut b = SubChunk::new();
        a.fill(BLOCK_STONE);
        b.fill(BLOCK_STONE);
        feature.apply(99, pos, &mut a, &heights_flat(500), BLOCK_STONE);
        feature.apply(99, pos, &mut b, &heights_flat(500), BLOCK_STONE);
        assert_eq!(a.blocks(), b.blocks());
    }

    #[test]
    fn decorations_sit_on_allowed_surfaces() {
        let world_seed = 7;
        let config = BiomeConfig::get(BiomeId::Plains);
        let mut column = ChunkColumn::new(ChunkPos::new(0, 0));
        for sub_y in 0..SUB_COUNT {
            column.ensure_sub(sub_y);
        }
        // Grass plateau at y=100.
        for z in 0..SZ {
            for x in 0..SX {
                column.set_block_at(x, 100, z, BLOCK_GRASS);
            }
        }
        apply_decorations(world_seed, &config, &mut column);
        let mut placed = 0;
        for z in 0..SZ {
            for x in 0..SX {
                let above = column.block_at(x, 101, z);
                if above != BLOCK_AIR {
                    placed += 1;
                    assert_eq!(column.block_at(x, 100, z), BLOCK_GRASS);
                }
            }
        }
        assert!(placed > 0, "plains should scatter some decorations");
    }

    #[test]
    fn decorations_are_order_independent() {
        let config = BiomeConfig::get(BiomeId::Plains);
        let build = || {
            let mut column = ChunkColumn::new(ChunkPos::new(5, 5));
            for z in 0..SZ {
                for x in 0..SX {
                    column.set_block_at(x, 50, z, BLOCK_GRASS);
                }
            }
            apply_decorations(123, &config, &mut column);
            let mut cells = Vec::new();
            for z in 0..SZ {
                for x in 0..SX {
                    cells.push(column.block_at(x, 51, z));
                }
            }
            cells
        };
        assert_eq!(build(), build());
    }
}
