use std::num::NonZeroUsize;

use log::{info, warn};
use ndarray::Array1;
use rand::{SeedableRng, rngs::StdRng};

use crate::{
    BilevelErr, Result,
    execution::Executor,
    hessian::{ConjugateGradient, Neumann},
    oracles::{InnerOracle, OuterOracle},
    sampling::MinibatchSampler,
    schedule::LearningRateScheduler,
    solvers::{
        Bsa, BsaState, Driver, Iterate, Memory, Solver, Sustain, SustainState, TwoLoops,
        TwoLoopsState,
    },
    specs::{AlgorithmSpec, SolverSpec},
};

/// The pieces every algorithm's state is made of.
struct Common {
    iterate: Iterate,
    inner_sampler: MinibatchSampler,
    outer_sampler: MinibatchSampler,
    rng: StdRng,
    executor: Executor,
    step_size: f64,
    outer_step_size: f64,
}

/// Builds new `Solver`s given a specification.
///
/// Every configuration error is reported here, a built solver never fails.
#[derive(Debug, Default)]
pub struct SolverBuilder;

impl SolverBuilder {
    /// Creates a new `SolverBuilder`.
    pub fn new() -> Self {
        Self
    }

    /// Builds a solver following a spec.
    ///
    /// # Arguments
    /// * `spec` - The specification of the solver.
    /// * `inner_oracle` - The inner objective.
    /// * `outer_oracle` - The outer objective.
    /// * `inner_var0` - The starting inner variable, copied into the solver.
    /// * `outer_var0` - The starting outer variable, copied into the solver.
    ///
    /// # Returns
    /// A new solver or an error if the spec doesn't fit the problem.
    pub fn build<I, G>(
        &self,
        spec: SolverSpec,
        inner_oracle: I,
        outer_oracle: G,
        inner_var0: Array1<f64>,
        outer_var0: Array1<f64>,
    ) -> Result<Box<dyn Solver>>
    where
        I: InnerOracle + 'static,
        G: OuterOracle + 'static,
    {
        self.check_dims(&inner_oracle, &outer_oracle, &inner_var0, &outer_var0)?;

        let common =
            self.resolve_common(&spec, &inner_oracle, &outer_oracle, inner_var0, outer_var0)?;

        info!(
            inner_batch = common.inner_sampler.batch_size(),
            outer_batch = common.outer_sampler.batch_size(),
            parallel = common.executor.is_parallel();
            "building solver {:?}", spec.algorithm
        );

        match spec.algorithm {
            AlgorithmSpec::Bsa {
                n_inner_steps,
                n_hia_steps,
                estimator,
                exponents,
            } => self.resolve_bsa(
                common,
                inner_oracle,
                outer_oracle,
                n_inner_steps,
                Neumann {
                    n_steps: n_hia_steps,
                    estimator,
                },
                exponents,
            ),
            AlgorithmSpec::Sustain {
                n_hia_steps,
                eta,
                estimator,
                exponents,
            } => self.resolve_sustain(
                common,
                inner_oracle,
                outer_oracle,
                eta,
                Neumann {
                    n_steps: n_hia_steps,
                    estimator,
                },
                exponents,
            ),
            AlgorithmSpec::TwoLoops {
                n_inner_steps,
                cg_max_iter,
                cg_tol,
                exponents,
            } => self.resolve_two_loops(
                common,
                inner_oracle,
                outer_oracle,
                n_inner_steps,
                (cg_max_iter, cg_tol),
                exponents,
            ),
        }
    }

    /// Checks the starting variables against both oracles.
    fn check_dims<I, G>(
        &self,
        inner_oracle: &I,
        outer_oracle: &G,
        inner_var0: &Array1<f64>,
        outer_var0: &Array1<f64>,
    ) -> Result<()>
    where
        I: InnerOracle,
        G: OuterOracle,
    {
        let checks = [
            ("inner_var0", "inner oracle", inner_var0.len(), inner_oracle.inner_dim()),
            ("outer_var0", "inner oracle", outer_var0.len(), inner_oracle.outer_dim()),
            ("inner_var0", "outer oracle", inner_var0.len(), outer_oracle.inner_dim()),
            ("outer_var0", "outer oracle", outer_var0.len(), outer_oracle.outer_dim()),
        ];

        for (a, b, got, expected) in checks {
            if got != expected {
                return Err(BilevelErr::SizeMismatch {
                    a,
                    b,
                    got,
                    expected,
                });
            }
        }

        Ok(())
    }

    /// Generates a random number generator given (or not) a seed.
    fn generate_rng(&self, seed: Option<u64>) -> StdRng {
        match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => {
                warn!("no random state given, seeding from the OS, this run can't be reproduced");
                StdRng::from_os_rng()
            }
        }
    }

    /// Validates the shared settings and resolves the samplers, the generator and the executor.
    fn resolve_common<I, G>(
        &self,
        spec: &SolverSpec,
        inner_oracle: &I,
        outer_oracle: &G,
        inner_var0: Array1<f64>,
        outer_var0: Array1<f64>,
    ) -> Result<Common>
    where
        I: InnerOracle,
        G: OuterOracle,
    {
        if !spec.step_size.is_finite() || spec.step_size < 0. {
            return Err(BilevelErr::InvalidHyperparameter {
                name: "step_size",
                value: spec.step_size,
            });
        }

        if !spec.outer_ratio.is_finite() || spec.outer_ratio <= 0. {
            return Err(BilevelErr::InvalidHyperparameter {
                name: "outer_ratio",
                value: spec.outer_ratio,
            });
        }

        let mut rng = self.generate_rng(spec.random_state);

        let inner_sampler = MinibatchSampler::new(
            "inner",
            inner_oracle.n_samples(),
            spec.batch_size,
            MinibatchSampler::fork_rng(&mut rng),
        )?;

        let outer_sampler = MinibatchSampler::new(
            "outer",
            outer_oracle.n_samples(),
            spec.batch_size,
            MinibatchSampler::fork_rng(&mut rng),
        )?;

        let executor = Executor::from_spec(spec.execution)?;

        Ok(Common {
            iterate: Iterate::new(inner_var0, outer_var0),
            inner_sampler,
            outer_sampler,
            rng,
            executor,
            step_size: spec.step_size,
            outer_step_size: spec.step_size / spec.outer_ratio,
        })
    }

    fn resolve_bsa<I, G>(
        &self,
        common: Common,
        inner_oracle: I,
        outer_oracle: G,
        n_inner_steps: usize,
        neumann: Neumann,
        exponents: [f64; 3],
    ) -> Result<Box<dyn Solver>>
    where
        I: InnerOracle + 'static,
        G: OuterOracle + 'static,
    {
        let Common {
            iterate,
            inner_sampler,
            outer_sampler,
            rng,
            step_size,
            outer_step_size,
            ..
        } = common;

        let scheduler =
            LearningRateScheduler::new([step_size, step_size, outer_step_size], exponents)?;

        let algorithm = Bsa::new(inner_oracle, outer_oracle, n_inner_steps, step_size, neumann);
        let state = BsaState {
            iterate,
            scheduler,
            inner_sampler,
            outer_sampler,
            rng,
        };

        Ok(Box::new(Driver::new(algorithm, state)))
    }

    fn resolve_sustain<I, G>(
        &self,
        common: Common,
        inner_oracle: I,
        outer_oracle: G,
        eta: f64,
        neumann: Neumann,
        exponents: [f64; 4],
    ) -> Result<Box<dyn Solver>>
    where
        I: InnerOracle + 'static,
        G: OuterOracle + 'static,
    {
        if !eta.is_finite() || eta <= 0. || eta > 1. {
            return Err(BilevelErr::InvalidHyperparameter { name: "eta", value: eta });
        }

        let Common {
            iterate,
            inner_sampler,
            outer_sampler,
            rng,
            executor,
            step_size,
            outer_step_size,
        } = common;

        let scheduler = LearningRateScheduler::new(
            [step_size, step_size, eta, outer_step_size],
            exponents,
        )?;

        let memory_inner = Memory::zeros(iterate.inner_var.len());
        let memory_outer = Memory::zeros(iterate.outer_var.len());

        let algorithm = Sustain::new(inner_oracle, outer_oracle, neumann, executor);
        let state = SustainState {
            iterate,
            memory_inner,
            memory_outer,
            scheduler,
            inner_sampler,
            outer_sampler,
            rng,
        };

        Ok(Box::new(Driver::new(algorithm, state)))
    }

    fn resolve_two_loops<I, G>(
        &self,
        common: Common,
        inner_oracle: I,
        outer_oracle: G,
        n_inner_steps: usize,
        (cg_max_iter, cg_tol): (NonZeroUsize, f64),
        exponents: [f64; 2],
    ) -> Result<Box<dyn Solver>>
    where
        I: InnerOracle + 'static,
        G: OuterOracle + 'static,
    {
        if !cg_tol.is_finite() || cg_tol <= 0. {
            return Err(BilevelErr::InvalidHyperparameter {
                name: "cg_tol",
                value: cg_tol,
            });
        }

        let Common {
            iterate,
            inner_sampler,
            outer_sampler,
            step_size,
            outer_step_size,
            ..
        } = common;

        let scheduler = LearningRateScheduler::new([step_size, outer_step_size], exponents)?;

        let cg = ConjugateGradient::new(cg_max_iter, cg_tol);
        let algorithm = TwoLoops::new(inner_oracle, outer_oracle, n_inner_steps, step_size, cg);
        let state = TwoLoopsState {
            iterate,
            scheduler,
            inner_sampler,
            outer_sampler,
        };

        Ok(Box::new(Driver::new(algorithm, state)))
    }
}
