//! Biome model: region assignment and per-biome terrain recipes.
//!
//! Biome regions are 16×16 chunks. A region's biome comes from a
//! deterministic hash of its coordinates and the world seed, so neighbors
//! can be answered without generating anything.

use crate::coords::{ChunkPos, SX, SZ};
use crate::features::{DecorationConfig, FeatureConfig};
use serde::{Deserialize, Serialize};
use slopworld_core::{
    BlockId, BLOCK_DIRT, BLOCK_FLOWER, BLOCK_GRASS, BLOCK_GRAVEL, BLOCK_SAND, BLOCK_SNOW,
    BLOCK_STONE, BLOCK_TALL_GRASS,
};

/// Edge length of a biome region, in chunks.
pub const REGION_CHUNKS: i64 = 16;

/// Edge length of a biome region, in cells.
pub const REGION_CELLS: i64 = REGION_CHUNKS * SX as i64;

/// Fraction of a region's width over which neighboring biomes blend.
const BLEND_MARGIN: f64 = 0.125;

/// Biome identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BiomeId {
    Plains,
    Forest,
    Desert,
    Mountains,
    Snowfield,
    Swamp,
}

impl BiomeId {
    /// Canonical lowercase string key for configs/logging.
    pub const fn as_str(self) -> &'static str {
        match self {
            BiomeId::Plains => "plains",
            BiomeId::Forest => "forest",
            BiomeId::Desert => "desert",
            BiomeId::Mountains => "mountains",
            BiomeId::Snowfield => "snowfield",
            BiomeId::Swamp => "swamp",
        }
    }

    /// All biome IDs (for iteration and hashing).
    pub const fn all() -> &'static [BiomeId] {
        &[
            BiomeId::Plains,
            BiomeId::Forest,
            BiomeId::Desert,
            BiomeId::Mountains,
            BiomeId::Snowfield,
            BiomeId::Swamp,
        ]
    }
}

/// Per-biome cave parameters. Each sub-pass is gated by its own flag.
#[derive(Debug, Clone)]
pub struct CaveSettings {
    pub enabled: bool,
    pub spaghetti: bool,
    /// Band half-width on the ridged tunnel noise; narrower = thinner tunnels.
    pub spaghetti_threshold: f64,
    /// Vertical center of the tunnel band.
    pub spaghetti_center_y: f64,
    /// Vertical half-extent of the tunnel band.
    pub spaghetti_half_height: f64,
    pub cheese: bool,
    pub cheese_threshold: f64,
    pub cheese_min_y: i64,
    pub cheese_max_y: i64,
    pub entrances: bool,
    pub entrance_min_width: usize,
}

impl CaveSettings {
    /// Standard underground cave layout.
    pub fn standard() -> Self {
        Self {
            enabled: true,
            spaghetti: true,
            spaghetti_threshold: 0.08,
            spaghetti_center_y: 160.0,
            spaghetti_half_height: 140.0,
            cheese: true,
            cheese_threshold: 0.62,
            cheese_min_y: 16,
            cheese_max_y: 200,
            entrances: true,
            entrance_min_width: 2,
        }
    }

    /// No carving at all.
    pub fn none() -> Self {
        Self {
            enabled: false,
            spaghetti: false,
            spaghetti_threshold: 0.0,
            spaghetti_center_y: 0.0,
            spaghetti_half_height: 0.0,
            cheese: false,
            cheese_threshold: 0.0,
            cheese_min_y: 0,
            cheese_max_y: 0,
            entrances: false,
            entrance_min_width: 0,
        }
    }
}

/// Terrain recipe for one biome. Shared across all columns in a region.
#[derive(Debug, Clone)]
pub struct BiomeConfig {
    pub id: BiomeId,
    pub surface_block: BlockId,
    pub subsurface_block: BlockId,
    pub base_block: BlockId,
    /// Layers of subsurface block beneath the surface cell.
    pub subsurface_depth: i64,
    /// Terrain height = offset + amplitude · noise.
    pub amplitude: f64,
    pub offset: f64,
    pub features: Vec<FeatureConfig>,
    pub caves: CaveSettings,
    pub decorations: Vec<DecorationConfig>,
}

impl BiomeConfig {
    /// (offset, amplitude) for a biome without building the full recipe.
    /// Hot path for per-cell border blending.
    pub const fn height_params(id: BiomeId) -> (f64, f64) {
        match id {
            BiomeId::Plains => (280.0, 12.0),
            BiomeId::Forest => (286.0, 18.0),
            BiomeId::Desert => (276.0, 9.0),
            BiomeId::Mountains => (320.0, 56.0),
            BiomeId::Snowfield => (290.0, 14.0),
            BiomeId::Swamp => (258.0, 5.0),
        }
    }

    /// Recipe for a biome id.
    pub fn get(id: BiomeId) -> Self {
        let (offset, amplitude) = Self::height_params(id);
        match id {
            BiomeId::Plains => Self {
                id,
                surface_block: BLOCK_GRASS,
                subsurface_block: BLOCK_DIRT,
                base_block: BLOCK_STONE,
                subsurface_depth: 3,
                amplitude,
                offset,
                features: FeatureConfig::standard_ores(),
                caves: CaveSettings::standard(),
                decorations: vec![
                    DecorationConfig {
                        block: BLOCK_TALL_GRASS,
                        attempts_per_chunk: 24,
                        surfaces: &[BLOCK_GRASS],
                    },
                    DecorationConfig {
                        block: BLOCK_FLOWER,
                        attempts_per_chunk: 6,
                        surfaces: &[BLOCK_GRASS],
                    },
                ],
            },
            BiomeId::Forest => Self {
                id,
                surface_block: BLOCK_GRASS,
                subsurface_block: BLOCK_DIRT,
                base_block: BLOCK_STONE,
                subsurface_depth: 4,
                amplitude,
                offset,
                features: FeatureConfig::standard_ores(),
                caves: CaveSettings::standard(),
                decorations: vec![DecorationConfig {
                    block: BLOCK_TALL_GRASS,
                    attempts_per_chunk: 16,
                    surfaces: &[BLOCK_GRASS],
                }],
            },
            BiomeId::Desert => Self {
                id,
                surface_block: BLOCK_SAND,
                subsurface_block: BLOCK_SAND,
                base_block: BLOCK_STONE,
                subsurface_depth: 5,
                amplitude,
                offset,
                features: FeatureConfig::standard_ores(),
                caves: CaveSettings::standard(),
                decorations: Vec::new(),
            },
            BiomeId::Mountains => Self {
                id,
                surface_block: BLOCK_STONE,
                subsurface_block: BLOCK_STONE,
                base_block: BLOCK_STONE,
                subsurface_depth: 2,
                amplitude,
                offset,
                features: {
                    let mut features = vec![FeatureConfig::cliffs()];
                    features.extend(FeatureConfig::standard_ores());
                    features
                },
                caves: CaveSettings::standard(),
                decorations: Vec::new(),
            },
            BiomeId::Snowfield => Self {
                id,
                surface_block: BLOCK_SNOW,
                subsurface_block: BLOCK_DIRT,
                base_block: BLOCK_STONE,
                subsurface_depth: 3,
                amplitude,
                offset,
                features: FeatureConfig::standard_ores(),
                caves: CaveSettings::standard(),
                decorations: Vec::new(),
            },
            BiomeId::Swamp => Self {
                id,
                surface_block: BLOCK_GRASS,
                subsurface_block: BLOCK_DIRT,
                base_block: BLOCK_STONE,
                subsurface_depth: 4,
                amplitude,
                offset,
                features: FeatureConfig::standard_ores(),
                caves: {
                    // Waterlogged ground; tunnels stay off but chambers remain.
                    let mut caves = CaveSettings::standard();
                    caves.spaghetti = false;
                    caves.entrances = false;
                    caves
                },
                decorations: vec![DecorationConfig {
                    block: BLOCK_TALL_GRASS,
                    attempts_per_chunk: 12,
                    surfaces: &[BLOCK_GRASS, BLOCK_GRAVEL],
                }],
            },
        }
    }
}

/// Region → biome assignment for one seeded world.
#[derive(Debug, Clone, Copy)]
pub struct BiomeMap {
    seed: u64,
}

impl BiomeMap {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Region containing a chunk.
    pub fn region_of(chunk: ChunkPos) -> (i64, i64) {
        (
            chunk.x.div_euclid(REGION_CHUNKS),
            chunk.z.div_euclid(REGION_CHUNKS),
        )
    }

    /// Deterministic biome pick for a region.
    pub fn biome_for_region(&self, region_x: i64, region_z: i64) -> BiomeId {
        let mut h = self.seed ^ 0x9E37_79B9_7F4A_7C15;
        h = h.wrapping_add((region_x as u64).wrapping_mul(0xC0FF_EE00_D00D_BAAD));
        h = h.wrapping_add((region_z as u64).wrapping_mul(0x5EED_CAFE_1234_5678));
        // splitmix64 finalizer.
        h ^= h >> 30;
        h = h.wrapping_mul(0xBF58_476D_1CE4_E5B9);
        h ^= h >> 27;
        h = h.wrapping_mul(0x94D0_49BB_1331_11EB);
        h ^= h >> 31;
        let all = BiomeId::all();
        all[(h % all.len() as u64) as usize]
    }

    /// Biome for the region containing a chunk.
    pub fn biome_at_chunk(&self, chunk: ChunkPos) -> BiomeId {
        let (rx, rz) = Self::region_of(chunk);
        self.biome_for_region(rx, rz)
    }

    /// Biome for the region containing a world cell.
    pub fn biome_at_world(&self, world_x: i64, world_z: i64) -> BiomeId {
        self.biome_at_chunk(ChunkPos::new(
            world_x.div_euclid(SX as i64),
            world_z.div_euclid(SZ as i64),
        ))
    }

    /// The 3×3 neighborhood of region biomes around a chunk's region,
    /// indexed `[dz + 1][dx + 1]`.
    pub fn neighborhood(&self, chunk: ChunkPos) -> [[BiomeId; 3]; 3] {
        let (rx, rz) = Self::region_of(chunk);
        let mut grid = [[BiomeId::Plains; 3]; 3];
        for dz in -1i64..=1 {
            for dx in -1i64..=1 {
                grid[(dz + 1) as usize][(dx + 1) as usize] =
                    self.biome_for_region(rx + dx, rz + dz);
            }
        }
        grid
    }

    /// Height parameters at a world cell, blended across region borders.
    ///
    /// Within `BLEND_MARGIN` of a border the offset and amplitude ramp
    /// linearly toward the neighboring region's values; elsewhere the home
    /// region wins outright. Surface/subsurface blocks never blend.
    pub fn blended_height_params(&self, world_x: i64, world_z: i64) -> (f64, f64) {
        let neighborhood = {
            let chunk = ChunkPos::new(
                world_x.div_euclid(SX as i64),
                world_z.div_euclid(SZ as i64),
            );
            self.neighborhood(chunk)
        };

        let fx = world_x.rem_euclid(REGION_CELLS) as f64 / REGION_CELLS as f64;
        let fz = world_z.rem_euclid(REGION_CELLS) as f64 / REGION_CELLS as f64;

        let wx = axis_weights(fx);
        let wz = axis_weights(fz);

        let mut offset = 0.0;
        let mut amplitude = 0.0;
        for (iz, &weight_z) in wz.iter().enumerate() {
            if weight_z == 0.0 {
                continue;
            }
            for (ix, &weight_x) in wx.iter().enumerate() {
                let weight = weight_x * weight_z;
                if weight == 0.0 {
                    continue;
                }
                let (home_offset, home_amplitude) =
                    BiomeConfig::height_params(neighborhood[iz][ix]);
                offset += home_offset * weight;
                amplitude += home_amplitude * weight;
            }
        }
        (offset, amplitude)
    }
}

/// Per-axis blend weights `[toward negative neighbor, home, toward positive]`.
fn axis_weights(fraction: f64) -> [f64; 3] {
    if fraction < BLEND_MARGIN {
        let t = fraction / BLEND_MARGIN;
        let outer = 0.5 * (1.0 - t);
        [outer, 1.0 - outer, 0.0]
    } else if fraction > 1.0 - BLEND_MARGIN {
        let t = (1.0 - fraction) / BLEND_MARGIN;
        let outer = 0.5 * (1.0 - t);
        [0.0, 1.0 - outer, outer]
    } else {
        [0.0, 1.0, 0.0]
    }
}
