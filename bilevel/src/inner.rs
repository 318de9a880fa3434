use ndarray::{Array1, ArrayView1};

use crate::{oracles::InnerOracle, sampling::MinibatchSampler};

/// Plain stochastic gradient descent on the inner variable, with the outer variable fixed.
#[derive(Debug, Clone, Copy)]
pub struct InnerSgd {
    step_size: f64,
    n_steps: usize,
}

impl InnerSgd {
    /// Creates a new `InnerSgd`.
    ///
    /// # Arguments
    /// * `step_size` - The learning rate of every step.
    /// * `n_steps` - The amount of minibatch steps per run.
    ///
    /// # Returns
    /// A new `InnerSgd` instance.
    pub fn new(step_size: f64, n_steps: usize) -> Self {
        Self { step_size, n_steps }
    }

    /// Updates `inner` in place, drawing one batch from `sampler` per step.
    pub fn run<O>(
        &self,
        oracle: &O,
        inner: &mut Array1<f64>,
        outer: ArrayView1<f64>,
        sampler: &mut MinibatchSampler,
    ) where
        O: InnerOracle + ?Sized,
    {
        let lr = self.step_size;

        for _ in 0..self.n_steps {
            let batch = sampler.next_batch();
            let grad = oracle.grad_inner_var(inner.view(), outer, &batch.indices);

            inner.zip_mut_with(&grad, |z, g| *z -= lr * g);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;

    use ndarray::{Array2, array};
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::{oracles::Quadratic, sampling::BatchSize};

    fn oracle() -> Quadratic {
        let hessian = array![[2., 0.], [0., 4.]];
        let cross = array![[1.], [1.]];
        Quadratic::noiseless(hessian, cross, array![-2., -4.], 16).unwrap()
    }

    #[test]
    fn converges_to_the_inner_minimizer() {
        let oracle = oracle();
        let mut sampler =
            MinibatchSampler::new("inner", 16, BatchSize::Full, StdRng::seed_from_u64(42)).unwrap();
        let mut z = array![10., -10.];
        let x = array![2.];

        InnerSgd::new(0.2, 200).run(&oracle, &mut z, x.view(), &mut sampler);

        // H z + C x + b = 0
        let expected = array![0., 0.5];
        assert!((&z - &expected).mapv(f64::abs).sum() < 1e-10);
    }

    #[test]
    fn zero_steps_leaves_the_variable_and_sampler_untouched() {
        let oracle = oracle();
        let size = BatchSize::Size(NonZeroUsize::new(4).unwrap());
        let mut sampler =
            MinibatchSampler::new("inner", 16, size, StdRng::seed_from_u64(42)).unwrap();
        let mut z = array![1., 2.];

        InnerSgd::new(0.1, 0).run(&oracle, &mut z, Array1::zeros(1).view(), &mut sampler);

        assert_eq!(z, array![1., 2.]);
        assert_eq!(sampler.cursor(), 0);
    }

    #[test]
    fn one_step_follows_the_gradient() {
        let oracle = Quadratic::new(
            Array2::eye(2),
            Array2::zeros((2, 1)),
            array![[1., 0.], [0., 1.]],
        )
        .unwrap();
        let mut sampler =
            MinibatchSampler::new("inner", 2, BatchSize::Full, StdRng::seed_from_u64(0)).unwrap();
        let mut z = array![1., 1.];

        InnerSgd::new(0.5, 1).run(&oracle, &mut z, array![0.].view(), &mut sampler);

        // grad = z + mean(b) = (1.5, 1.5)
        assert_eq!(z, array![0.25, 0.25]);
    }
}
