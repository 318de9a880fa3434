use std::num::NonZeroUsize;

use log::trace;
use ndarray::{Array1, ArrayView1};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{execution::Executor, oracles::InnerOracle, sampling::MinibatchSampler};

/// How the truncated Neumann series `lr * sum_{k<n} (I - lr H)^k v` is estimated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NeumannEstimator {
    /// Chains the products and sums every partial term, the full truncated series.
    #[default]
    Averaged,
    /// Chains a uniformly random amount of products and rescales the last term by `n`.
    RandomTruncation,
}

/// The point at which a Hessian is evaluated.
#[derive(Debug, Clone, Copy)]
pub struct HessianAt<'a> {
    pub inner: ArrayView1<'a, f64>,
    pub outer: ArrayView1<'a, f64>,
}

impl<'a> HessianAt<'a> {
    pub fn new(inner: ArrayView1<'a, f64>, outer: ArrayView1<'a, f64>) -> Self {
        Self { inner, outer }
    }
}

/// The settings shared by every Neumann approximation of one solver.
#[derive(Debug, Clone, Copy)]
pub struct Neumann {
    pub n_steps: NonZeroUsize,
    pub estimator: NeumannEstimator,
}

impl Neumann {
    /// Draws how many Hessian products this call applies.
    fn n_products<R: Rng>(&self, rng: &mut R) -> usize {
        let n = self.n_steps.get();

        match self.estimator {
            NeumannEstimator::Averaged => n - 1,
            NeumannEstimator::RandomTruncation => rng.random_range(0..n),
        }
    }

    /// Approximates `H^-1 v` with a stochastic Neumann series, where `H` is the Hessian of the
    /// inner objective at `at`.
    ///
    /// # Arguments
    /// * `oracle` - The inner objective.
    /// * `at` - Where the Hessian is evaluated.
    /// * `v` - The vector to multiply.
    /// * `lr` - The step of the series, it should be below `1 / L` for it to converge.
    /// * `sampler` - Draws a fresh inner batch for each Hessian product.
    /// * `rng` - Only consumed by `NeumannEstimator::RandomTruncation`.
    ///
    /// # Returns
    /// The approximation of `H^-1 v`.
    pub fn hia<O, R>(
        &self,
        oracle: &O,
        at: HessianAt<'_>,
        v: ArrayView1<f64>,
        lr: f64,
        sampler: &mut MinibatchSampler,
        rng: &mut R,
    ) -> Array1<f64>
    where
        O: InnerOracle + ?Sized,
        R: Rng,
    {
        let n_products = self.n_products(rng);
        trace!(n_products = n_products, lr = lr; "running hia");

        let mut p = v.to_owned();
        let mut sum = p.clone();

        for _ in 0..n_products {
            let batch = sampler.next_batch();
            let hp = oracle.hvp(at.inner, at.outer, p.view(), &batch.indices);
            p.scaled_add(-lr, &hp);

            if self.estimator == NeumannEstimator::Averaged {
                sum += &p;
            }
        }

        self.finish(sum, p, lr)
    }

    /// Approximates `H^-1 v` and `H'^-1 v'` at two points using the same batches for both
    /// series, so their sampling noise is shared.
    ///
    /// # Arguments
    /// * `oracle` - The inner objective.
    /// * `at` - Where `H` is evaluated.
    /// * `v` - The vector multiplied by `H^-1`.
    /// * `at_old` - Where `H'` is evaluated.
    /// * `v_old` - The vector multiplied by `H'^-1`.
    /// * `lr` - The step of both series.
    /// * `sampler` - Draws a fresh inner batch for each pair of Hessian products.
    /// * `rng` - Only consumed by `NeumannEstimator::RandomTruncation`.
    /// * `executor` - Runs the two products of every step.
    ///
    /// # Returns
    /// Both approximations, in argument order.
    #[allow(clippy::too_many_arguments)]
    pub fn joint_hia<O, R>(
        &self,
        oracle: &O,
        at: HessianAt<'_>,
        v: ArrayView1<f64>,
        at_old: HessianAt<'_>,
        v_old: ArrayView1<f64>,
        lr: f64,
        sampler: &mut MinibatchSampler,
        rng: &mut R,
        executor: &Executor,
    ) -> (Array1<f64>, Array1<f64>)
    where
        O: InnerOracle + ?Sized,
        R: Rng,
    {
        let n_products = self.n_products(rng);
        trace!(n_products = n_products, lr = lr; "running joint hia");

        let mut p = v.to_owned();
        let mut p_old = v_old.to_owned();
        let mut sum = p.clone();
        let mut sum_old = p_old.clone();

        for _ in 0..n_products {
            let batch = sampler.next_batch();
            let indices = &batch.indices;

            let (hp, hp_old) = executor.join(
                || oracle.hvp(at.inner, at.outer, p.view(), indices),
                || oracle.hvp(at_old.inner, at_old.outer, p_old.view(), indices),
            );

            p.scaled_add(-lr, &hp);
            p_old.scaled_add(-lr, &hp_old);

            if self.estimator == NeumannEstimator::Averaged {
                sum += &p;
                sum_old += &p_old;
            }
        }

        (self.finish(sum, p, lr), self.finish(sum_old, p_old, lr))
    }

    fn finish(&self, sum: Array1<f64>, last: Array1<f64>, lr: f64) -> Array1<f64> {
        match self.estimator {
            NeumannEstimator::Averaged => sum * lr,
            NeumannEstimator::RandomTruncation => last * (self.n_steps.get() as f64 * lr),
        }
    }
}
