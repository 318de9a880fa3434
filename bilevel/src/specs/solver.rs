use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};

use super::ExecutionSpec;
use crate::{
    Result,
    hessian::NeumannEstimator,
    sampling::BatchSize,
    solvers::{BSA_EXPONENTS, SUSTAIN_EXPONENTS, TWO_LOOPS_EXPONENTS},
};

const DEFAULT_STEPS: NonZeroUsize = NonZeroUsize::new(10).unwrap();
const DEFAULT_EVAL_FREQ: NonZeroUsize = NonZeroUsize::new(128).unwrap();
const DEFAULT_CG_MAX_ITER: NonZeroUsize = NonZeroUsize::new(50).unwrap();

fn default_n_inner_steps() -> usize {
    DEFAULT_STEPS.get()
}

fn default_n_hia_steps() -> NonZeroUsize {
    DEFAULT_STEPS
}

fn default_eta() -> f64 {
    0.5
}

fn default_cg_max_iter() -> NonZeroUsize {
    DEFAULT_CG_MAX_ITER
}

fn default_cg_tol() -> f64 {
    1e-6
}

fn bsa_exponents() -> [f64; 3] {
    BSA_EXPONENTS
}

fn sustain_exponents() -> [f64; 4] {
    SUSTAIN_EXPONENTS
}

fn two_loops_exponents() -> [f64; 2] {
    TWO_LOOPS_EXPONENTS
}

fn default_step_size() -> f64 {
    0.1
}

fn default_outer_ratio() -> f64 {
    1.
}

fn default_eval_freq() -> NonZeroUsize {
    DEFAULT_EVAL_FREQ
}

fn default_random_state() -> Option<u64> {
    Some(1)
}

/// The specification of the bilevel algorithm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlgorithmSpec {
    Bsa {
        #[serde(default = "default_n_inner_steps")]
        n_inner_steps: usize,
        #[serde(default = "default_n_hia_steps")]
        n_hia_steps: NonZeroUsize,
        #[serde(default)]
        estimator: NeumannEstimator,
        /// Decay of `[inner, hia, outer]`.
        #[serde(default = "bsa_exponents")]
        exponents: [f64; 3],
    },
    Sustain {
        #[serde(default = "default_n_hia_steps")]
        n_hia_steps: NonZeroUsize,
        #[serde(default = "default_eta")]
        eta: f64,
        #[serde(default)]
        estimator: NeumannEstimator,
        /// Decay of `[inner, hia, eta, outer]`.
        #[serde(default = "sustain_exponents")]
        exponents: [f64; 4],
    },
    TwoLoops {
        #[serde(default = "default_n_inner_steps")]
        n_inner_steps: usize,
        #[serde(default = "default_cg_max_iter")]
        cg_max_iter: NonZeroUsize,
        #[serde(default = "default_cg_tol")]
        cg_tol: f64,
        /// Decay of `[inner, outer]`.
        #[serde(default = "two_loops_exponents")]
        exponents: [f64; 2],
    },
}

impl AlgorithmSpec {
    /// BSA with its default hyperparameters.
    pub fn bsa() -> Self {
        Self::Bsa {
            n_inner_steps: default_n_inner_steps(),
            n_hia_steps: default_n_hia_steps(),
            estimator: NeumannEstimator::default(),
            exponents: BSA_EXPONENTS,
        }
    }

    /// SUSTAIN with its default hyperparameters.
    pub fn sustain() -> Self {
        Self::Sustain {
            n_hia_steps: default_n_hia_steps(),
            eta: default_eta(),
            estimator: NeumannEstimator::default(),
            exponents: SUSTAIN_EXPONENTS,
        }
    }

    /// Two loops with its default hyperparameters.
    pub fn two_loops() -> Self {
        Self::TwoLoops {
            n_inner_steps: default_n_inner_steps(),
            cg_max_iter: default_cg_max_iter(),
            cg_tol: default_cg_tol(),
            exponents: TWO_LOOPS_EXPONENTS,
        }
    }
}

impl Default for AlgorithmSpec {
    fn default() -> Self {
        Self::bsa()
    }
}

/// The specification of a bilevel solver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverSpec {
    #[serde(default)]
    pub algorithm: AlgorithmSpec,
    /// The base step size of the inner variable and of the Neumann series.
    #[serde(default = "default_step_size")]
    pub step_size: f64,
    /// The outer step size is `step_size / outer_ratio`.
    #[serde(default = "default_outer_ratio")]
    pub outer_ratio: f64,
    #[serde(default)]
    pub batch_size: BatchSize,
    /// The amount of iterations per run block.
    #[serde(default = "default_eval_freq")]
    pub eval_freq: NonZeroUsize,
    /// `None` seeds from the OS, making the run impossible to reproduce.
    #[serde(default = "default_random_state")]
    pub random_state: Option<u64>,
    #[serde(default)]
    pub execution: ExecutionSpec,
}

impl SolverSpec {
    /// Creates a spec for `algorithm` with every other setting at its default.
    pub fn new(algorithm: AlgorithmSpec) -> Self {
        Self {
            algorithm,
            step_size: default_step_size(),
            outer_ratio: default_outer_ratio(),
            batch_size: BatchSize::default(),
            eval_freq: default_eval_freq(),
            random_state: default_random_state(),
            execution: ExecutionSpec::default(),
        }
    }

    /// Parses a spec from json, missing fields take their default.
    ///
    /// # Returns
    /// The spec or `BilevelErr::InvalidSpec` if the json is malformed.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl Default for SolverSpec {
    fn default() -> Self {
        Self::new(AlgorithmSpec::default())
    }
}
