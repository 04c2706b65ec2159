//! World subsystem configuration.
//!
//! Everything tunable lives here; the defaults carry the standard values
//! and a TOML file can override any subset of fields.

use crate::liquid::DEFAULT_UPDATE_INTERVAL_MS;
use crate::scheduler::FrameBudget;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Horizontal view distance in chunks.
    pub view_distance: u32,
    /// Columns farther than `view_distance * unload_factor` unload.
    pub unload_factor: f64,
    /// World-space sea level; air below it floods during generation.
    pub sea_level: i64,
    /// Fraction of the average frame granted to background tasks.
    pub budget_ratio: f64,
    pub min_budget_ms: f64,
    pub max_budget_ms: f64,
    /// Blend factor for frame-time measurements.
    pub adaptation_rate: f64,
    /// Minimum interval between liquid ticks of one column.
    pub liquid_interval_ms: u64,
    /// Worker threads for generation/meshing/re-light jobs.
    pub worker_threads: usize,
    /// Weight on the vertical component of sub-chunk priority distances.
    pub vertical_weight: f64,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            view_distance: 8,
            unload_factor: 1.5,
            sea_level: 256,
            budget_ratio: 0.25,
            min_budget_ms: 1.0,
            max_budget_ms: 8.0,
            adaptation_rate: 0.1,
            liquid_interval_ms: DEFAULT_UPDATE_INTERVAL_MS,
            worker_threads: 4,
            vertical_weight: 1.5,
        }
    }
}

impl WorldConfig {
    /// Parse a TOML document; missing fields keep their defaults.
    pub fn from_toml_str(input: &str) -> Result<Self> {
        toml::from_str(input).context("parsing world config")
    }

    /// Load a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_toml_str(&text)
    }

    /// Columns beyond this horizontal chunk distance unload.
    pub fn unload_distance(&self) -> f64 {
        self.view_distance as f64 * self.unload_factor
    }

    /// Scheduler budget built from the configured policy values.
    pub fn frame_budget(&self) -> FrameBudget {
        FrameBudget::with_policy(
            self.budget_ratio,
            self.min_budget_ms,
            self.max_budget_ms,
            self.adaptation_rate,
        )
    }
}
