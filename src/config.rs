use std::{fs, path::Path};

use anyhow::Context;
use bilevel::SolverSpec;
use serde::{Deserialize, Serialize};

/// The settings of one benchmark run, read from a json file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    /// Samples of the training set, seen by the inner problem.
    pub n_train: usize,
    /// Samples of the validation set, seen by the outer problem.
    pub n_val: usize,
    pub n_features: usize,
    /// Standard deviation of the label noise.
    pub noise: f64,
    pub data_seed: u64,
    pub solver: SolverSpec,
    /// Minimum relative decrease of the validation loss between blocks.
    pub eps: f64,
    pub patience: usize,
    pub max_runs: usize,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            n_train: 1000,
            n_val: 500,
            n_features: 20,
            noise: 0.5,
            data_seed: 0,
            solver: SolverSpec::default(),
            eps: 1e-4,
            patience: 10,
            max_runs: 100,
        }
    }
}

impl BenchConfig {
    /// Reads a config, missing fields take their default.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;

        serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse config {}", path.display()))
    }
}
