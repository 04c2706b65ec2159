//! Seeded simplex noise for terrain generation.
//!
//! 2D and 3D simplex with a permutation table built by a seeded
//! Fisher–Yates shuffle, so every sample is a pure function of seed and
//! coordinates. Fractal sums layer octaves the usual way.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// The 8 standard 2D gradient vectors.
const GRAD2: [[f64; 2]; 8] = [
    [1.0, 1.0],
    [-1.0, 1.0],
    [1.0, -1.0],
    [-1.0, -1.0],
    [1.0, 0.0],
    [-1.0, 0.0],
    [0.0, 1.0],
    [0.0, -1.0],
];

/// The 12 standard 3D gradient vectors (edge midpoints of a cube).
const GRAD3: [[f64; 3]; 12] = [
    [1.0, 1.0, 0.0],
    [-1.0, 1.0, 0.0],
    [1.0, -1.0, 0.0],
    [-1.0, -1.0, 0.0],
    [1.0, 0.0, 1.0],
    [-1.0, 0.0, 1.0],
    [1.0, 0.0, -1.0],
    [-1.0, 0.0, -1.0],
    [0.0, 1.0, 1.0],
    [0.0, -1.0, 1.0],
    [0.0, 1.0, -1.0],
    [0.0, -1.0, -1.0],
];

// Skew/unskew factors.
const F2: f64 = 0.366_025_403_784_438_6; // (sqrt(3) - 1) / 2
const G2: f64 = 0.211_324_865_405_187_1; // (3 - sqrt(3)) / 6
const F3: f64 = 1.0 / 3.0;
const G3: f64 = 1.0 / 6.0;

/// Seeded simplex noise source.
///
/// Output is in [-1, 1] (up to rounding); callers that need [0, 1] remap
/// explicitly via [`remap01`].
pub struct SimplexNoise {
    /// Seeded permutation of 0..=255, duplicated to 512 entries.
    perm: [u8; 512],
}

impl SimplexNoise {
    pub fn new(seed: u32) -> Self {
        let mut table: [u8; 256] = [0; 256];
        for (i, slot) in table.iter_mut().enumerate() {
            *slot = i as u8;
        }
        let mut rng = StdRng::seed_from_u64(seed as u64);
        table.shuffle(&mut rng);

        let mut perm = [0u8; 512];
        for i in 0..512 {
            perm[i] = table[i & 255];
        }
        Self { perm }
    }

    #[inline]
    fn perm(&self, idx: usize) -> usize {
        self.perm[idx] as usize
    }

    /// Raw 2D simplex sample in [-1, 1].
    pub fn sample_2d(&self, x: f64, y: f64) -> f64 {
        // Skew input to the simplex grid.
        let s = (x + y) * F2;
        let i = (x + s).floor() as i64;
        let j = (y + s).floor() as i64;
        let t = (i + j) as f64 * G2;
        let x0 = x - (i as f64 - t);
        let y0 = y - (j as f64 - t);

        // Which triangle of the skewed cell are we in?
        let (i1, j1) = if x0 > y0 { (1usize, 0usize) } else { (0, 1) };

        let x1 = x0 - i1 as f64 + G2;
        let y1 = y0 - j1 as f64 + G2;
        let x2 = x0 - 1.0 + 2.0 * G2;
        let y2 = y0 - 1.0 + 2.0 * G2;

        let ii = (i & 255) as usize;
        let jj = (j & 255) as usize;
        let gi0 = self.perm(ii + self.perm(jj)) % 8;
        let gi1 = self.perm(ii + i1 + self.perm(jj + j1)) % 8;
        let gi2 = self.perm(ii + 1 + self.perm(jj + 1)) % 8;

        let mut total = 0.0;
        for (&[gx, gy], (cx, cy)) in [
            (&GRAD2[gi0], (x0, y0)),
            (&GRAD2[gi1], (x1, y1)),
            (&GRAD2[gi2], (x2, y2)),
        ] {
            let falloff = 0.5 - cx * cx - cy * cy;
            if falloff > 0.0 {
                let falloff = falloff * falloff;
                total += falloff * falloff * (gx * cx + gy * cy);
            }
        }

        70.0 * total
    }

    /// Raw 3D simplex sample in [-1, 1].
    pub fn sample_3d(&self, x: f64, y: f64, z: f64) -> f64 {
        let s = (x + y + z) * F3;
        let i = (x + s).floor() as i64;
        let j = (y + s).floor() as i64;
        let k = (z + s).floor() as i64;
        let t = (i + j + k) as f64 * G3;
        let x0 = x - (i as f64 - t);
        let y0 = y - (j as f64 - t);
        let z0 = z - (k as f64 - t);

        // Rank the offsets to pick the simplex (tetrahedron) traversal order.
        let (i1, j1, k1, i2, j2, k2) = if x0 >= y0 {
            if y0 >= z0 {
                (1, 0, 0, 1, 1, 0)
            } else if x0 >= z0 {
                (1, 0, 0, 1, 0, 1)
            } else {
                (0, 0, 1, 1, 0, 1)
            }
        } else if y0 < z0 {
            (0, 0, 1, 0, 1, 1)
        } else if x0 < z0 {
            (0, 1, 0, 0, 1, 1)
        } else {
            (0, 1, 0, 1, 1, 0)
        };

        let x1 = x0 - i1 as f64 + G3;
        let y1 = y0 - j1 as f64 + G3;
        let z1 = z0 - k1 as f64 + G3;
        let x2 = x0 - i2 as f64 + 2.0 * G3;
        let y2 = y0 - j2 as f64 + 2.0 * G3;
        let z2 = z0 - k2 as f64 + 2.0 * G3;
        let x3 = x0 - 1.0 + 3.0 * G3;
        let y3 = y0 - 1.0 + 3.0 * G3;
        let z3 = z0 - 1.0 + 3.0 * G3;

        let ii = (i & 255) as usize;
        let jj = (j & 255) as usize;
        let kk = (k & 255) as usize;
        let gi0 = self.perm(ii + self.perm(jj + self.perm(kk))) % 12;
        let gi1 = self.perm(ii + i1 + self.perm(jj + j1 + self.perm(kk + k1))) % 12;
        let gi2 = self.perm(ii + i2 + self.perm(jj + j2 + self.perm(kk + k2))) % 12;
        let gi3 = self.perm(ii + 1 + self.perm(jj + 1 + self.perm(kk + 1))) % 12;

        let mut total = 0.0;
        for (&[gx, gy, gz], (cx, cy, cz)) in [
            (&GRAD3[gi0], (x0, y0, z0)),
            (&GRAD3[gi1], (x1, y1, z1)),
            (&GRAD3[gi2], (x2, y2, z2)),
            (&GRAD3[gi3], (x3, y3, z3)),
        ] {
            let falloff = 0.6 - cx * cx - cy * cy - cz * cz;
            if falloff > 0.0 {
                let falloff = falloff * falloff;
                total += falloff * falloff * (gx * cx + gy * cy + gz * cz);
            }
        }

        32.0 * total
    }
}

/// Configuration for multi-octave noise generation.
#[derive(Debug, Clone)]
pub struct NoiseConfig {
    /// Number of octaves (layers of detail).
    pub octaves: u32,
    /// Frequency multiplier between octaves.
    pub lacunarity: f64,
    /// Amplitude multiplier between octaves.
    pub persistence: f64,
    /// Base frequency (scale).
    pub frequency: f64,
    /// Seed for deterministic generation.
    pub seed: u32,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            octaves: 4,
            lacunarity: 2.0,
            persistence: 0.5,
            frequency: 1.0,
            seed: 0,
        }
    }
}

/// Multi-octave simplex sampler.
pub struct FractalNoise {
    simplex: SimplexNoise,
    config: NoiseConfig,
}

impl FractalNoise {
    pub fn new(config: NoiseConfig) -> Self {
        Self {
            simplex: SimplexNoise::new(config.seed),
            config,
        }
    }

    /// Octave-summed 2D sample, normalized back to [-1, 1].
    pub fn sample_2d(&self, x: f64, y: f64) -> f64 {
        let mut value = 0.0;
        let mut amplitude = 1.0;
        let mut frequency = self.config.frequency;
        let mut max_value = 0.0;

        for _ in 0..self.config.octaves {
            value += self.simplex.sample_2d(x * frequency, y * frequency) * amplitude;
            max_value += amplitude;
            amplitude *= self.config.persistence;
            frequency *= self.config.lacunarity;
        }

        value / max_value
    }

    /// Octave-summed 3D sample, normalized back to [-1, 1].
    pub fn sample_3d(&self, x: f64, y: f64, z: f64) -> f64 {
        let mut value = 0.0;
        let mut amplitude = 1.0;
        let mut frequency = self.config.frequency;
        let mut max_value = 0.0;

        for _ in 0..self.config.octaves {
            value += self
                .simplex
                .sample_3d(x * frequency, y * frequency, z * frequency)
                * amplitude;
            max_value += amplitude;
            amplitude *= self.config.persistence;
            frequency *= self.config.lacunarity;
        }

        value / max_value
    }

    /// Ridged 3D sample in [0, 1]: 1 at the noise zero-crossings, falling
    /// away on both sides. The cave tunnels carve along the ridge crests.
    pub fn ridged_3d(&self, x: f64, y: f64, z: f64) -> f64 {
        1.0 - self.sample_3d(x, y, z).abs()
    }
}

/// Remap a [-1, 1] sample to [0, 1].
pub fn remap01(value: f64) -> f64 {
    (value + 1.0) * 0.5
}
