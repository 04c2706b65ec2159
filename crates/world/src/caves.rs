//! Cave carving: spaghetti tunnels, cheese chambers, and surface entrances.
//!
//! Tunnels and chambers are pure noise functions of seed and coordinates, so
//! any sub-chunk carves identically no matter when it is generated.
//! Entrances are a column-level pass and run once per column.

use crate::biome::CaveSettings;
use crate::column::ChunkColumn;
use crate::coords::{SubChunkPos, SUB_H, SX, SZ};
use crate::noise::{FractalNoise, NoiseConfig, SimplexNoise};
use crate::subchunk::SubChunk;
use slopworld_core::{BlockId, BLOCK_AIR, BLOCK_WATER};

/// Entrance scan threshold; higher = rarer shafts.
const ENTRANCE_THRESHOLD: f64 = 0.93;

/// Entrances give up below this depth if they never meet carved air.
const ENTRANCE_FLOOR_Y: i64 = 24;

/// Noise-driven cave carver for one seeded world.
pub struct CaveCarver {
    tunnel_a: FractalNoise,
    tunnel_b: FractalNoise,
    cheese: FractalNoise,
    entrance: SimplexNoise,
}

impl CaveCarver {
    pub fn new(world_seed: u64) -> Self {
        let tunnel_a = FractalNoise::new(NoiseConfig {
            octaves: 2,
            frequency: 0.015,
            seed: (world_seed ^ 0x5A01) as u32,
            ..Default::default()
        });
        let tunnel_b = FractalNoise::new(NoiseConfig {
            octaves: 2,
            frequency: 0.015,
            seed: (world_seed ^ 0x5A02) as u32,
            ..Default::default()
        });
        let cheese = FractalNoise::new(NoiseConfig {
            octaves: 3,
            frequency: 0.008,
            seed: (world_seed ^ 0xC4EE) as u32,
            ..Default::default()
        });
        let entrance = SimplexNoise::new((world_seed ^ 0xE47A) as u32);
        Self {
            tunnel_a,
            tunnel_b,
            cheese,
            entrance,
        }
    }

    /// Whether the spaghetti pass carves this cell.
    ///
    /// Two independent ridged layers must both sit on a crest; the allowed
    /// band narrows with vertical distance from the tunnel center so
    /// tunnels thin out and vanish at the band edges.
    fn tunnel_at(&self, settings: &CaveSettings, x: f64, y: f64, z: f64) -> bool {
        let vertical = ((y - settings.spaghetti_center_y) / settings.spaghetti_half_height).abs();
        if vertical >= 1.0 {
            return false;
        }
        let band = settings.spaghetti_threshold * (1.0 - vertical * vertical);
        self.tunnel_a.ridged_3d(x, y, z) > 1.0 - band
            && self.tunnel_b.ridged_3d(x, y, z) > 1.0 - band
    }

    /// Whether the cheese pass carves this cell.
    fn chamber_at(&self, settings: &CaveSettings, x: f64, y: f64, z: f64) -> bool {
        let world_y = y as i64;
        if world_y < settings.cheese_min_y || world_y > settings.cheese_max_y {
            return false;
        }
        self.cheese.sample_3d(x, y, z) > settings.cheese_threshold
    }

    /// Carve tunnels and chambers out of one sub-chunk.
    ///
    /// Carved cells below sea level flood with water so the water-table
    /// invariant survives the cave pass.
    pub fn carve_sub(
        &self,
        settings: &CaveSettings,
        pos: SubChunkPos,
        sub: &mut SubChunk,
        sea_level: i64,
    ) {
        if !settings.enabled || (!settings.spaghetti && !settings.cheese) {
            return;
        }
        let (origin_x, origin_z) = pos.chunk.origin();
        let base_y = pos.base_y();
        for local_y in 0..SUB_H {
            let world_y = base_y + local_y as i64;
            for z in 0..SZ {
                for x in 0..SX {
                    let current = sub.block(x, local_y, z);
                    if current == BLOCK_AIR || current == BLOCK_WATER {
                        continue;
                    }
                    let wx = (origin_x + x as i64) as f64;
                    let wy = world_y as f64;
                    let wz = (origin_z + z as i64) as f64;
                    let carved = (settings.spaghetti && self.tunnel_at(settings, wx, wy, wz))
                        || (settings.cheese && self.chamber_at(settings, wx, wy, wz));
                    if carved {
                        let replacement: BlockId = if world_y < sea_level {
                            BLOCK_WATER
                        } else {
                            BLOCK_AIR
                        };
                        sub.set_block(x, local_y, z, replacement);
                    }
                }
            }
        }
    }

    /// Carve at most one vertical entrance shaft for a column.
    ///
    /// The scan is a pure function of seed and world coordinates: the first
    /// (x,z) whose surface noise clears the threshold wins. The shaft drops
    /// from the surface until it meets carved air, widened to the configured
    /// minimum width. The caller flips `entrances_generated`.
    pub fn carve_entrances(&self, settings: &CaveSettings, column: &mut ChunkColumn) -> bool {
        if !settings.enabled || !settings.entrances {
            return false;
        }
        let (origin_x, origin_z) = column.pos().origin();
        for z in 0..SZ {
            for x in 0..SX {
                let wx = (origin_x + x as i64) as f64;
                let wz = (origin_z + z as i64) as f64;
                if self.entrance.sample_2d(wx * 0.11, wz * 0.11) <= ENTRANCE_THRESHOLD {
                    continue;
                }
                let surface = column.surface_height_scan(x, z);
                if surface <= ENTRANCE_FLOOR_Y as i32 {
                    continue;
                }
                self.carve_shaft(settings, column, x, z, surface as i64);
                return true;
            }
        }
        false
    }

    fn carve_shaft(
        &self,
        settings: &CaveSettings,
        column: &mut ChunkColumn,
        x: usize,
        z: usize,
        surface_y: i64,
    ) {
        let width = settings.entrance_min_width.max(1);
        let mut y = surface_y;
        while y > ENTRANCE_FLOOR_Y {
            // Met already-carved air below the surface: the shaft connects.
            if y < surface_y && column.block_at(x, y, z) == BLOCK_AIR {
                break;
            }
            for dz in 0..width {
                for dx in 0..width {
                    let sx = x + dx;
                    let sz = z + dz;
                    if sx < SX && sz < SZ {
                        column.set_block_at(sx, y, sz, BLOCK_AIR);
                    }
                }
            }
            y -= 1;
        }
    }
}
