use log::trace;
use rand::rngs::StdRng;

use super::{Algorithm, Iterate, SolverState};
use crate::{
    hessian::{HessianAt, Neumann},
    inner::InnerSgd,
    oracles::{InnerOracle, OuterOracle},
    sampling::MinibatchSampler,
    schedule::LearningRateScheduler,
};

/// The decay exponents of the inner, HIA and outer learning rates.
pub const BSA_EXPONENTS: [f64; 3] = [0.5, 0., 0.5];

/// Everything that changes across BSA iterations.
#[derive(Debug, Clone)]
pub struct BsaState {
    pub iterate: Iterate,
    /// Yields `[inner_lr, hia_lr, outer_lr]`.
    pub scheduler: LearningRateScheduler<3>,
    pub inner_sampler: MinibatchSampler,
    pub outer_sampler: MinibatchSampler,
    pub rng: StdRng,
}

impl SolverState for BsaState {
    fn iterate(&self) -> &Iterate {
        &self.iterate
    }

    fn iterations(&self) -> usize {
        self.scheduler.iteration()
    }
}

/// Two timescale stochastic approximation.
///
/// Every iteration moves the outer variable along an implicit gradient estimated with a
/// Neumann series and then re-solves the inner problem with a few SGD steps.
#[derive(Debug, Clone)]
pub struct Bsa<I, G> {
    inner_oracle: I,
    outer_oracle: G,
    n_inner_steps: usize,
    warm_up_step: f64,
    neumann: Neumann,
}

impl<I, G> Bsa<I, G>
where
    I: InnerOracle,
    G: OuterOracle,
{
    /// Creates a new `Bsa`.
    ///
    /// # Arguments
    /// * `inner_oracle` - The inner objective.
    /// * `outer_oracle` - The outer objective.
    /// * `n_inner_steps` - The amount of SGD steps on the inner variable per iteration.
    /// * `warm_up_step` - The step size of the inner solve that runs before the first iteration.
    /// * `neumann` - The inverse Hessian approximation settings.
    pub fn new(
        inner_oracle: I,
        outer_oracle: G,
        n_inner_steps: usize,
        warm_up_step: f64,
        neumann: Neumann,
    ) -> Self {
        Self {
            inner_oracle,
            outer_oracle,
            n_inner_steps,
            warm_up_step,
            neumann,
        }
    }
}

impl<I, G> Algorithm for Bsa<I, G>
where
    I: InnerOracle,
    G: OuterOracle,
{
    type State = BsaState;

    fn name(&self) -> &'static str {
        "BSA"
    }

    fn has_warm_up(&self) -> bool {
        true
    }

    fn warm_up(&self, state: &mut BsaState) {
        let Iterate {
            inner_var,
            outer_var,
        } = &mut state.iterate;

        InnerSgd::new(self.warm_up_step, self.n_inner_steps).run(
            &self.inner_oracle,
            inner_var,
            outer_var.view(),
            &mut state.inner_sampler,
        );
    }

    fn step(&self, state: &mut BsaState) {
        let BsaState {
            iterate,
            scheduler,
            inner_sampler,
            outer_sampler,
            rng,
        } = state;

        let [inner_lr, hia_lr, outer_lr] = scheduler.next_lr();
        trace!(inner_lr = inner_lr, hia_lr = hia_lr, outer_lr = outer_lr; "bsa step");

        let outer_batch = outer_sampler.next_batch();
        let (grad_in, grad_out) = self.outer_oracle.grad(
            iterate.inner_var.view(),
            iterate.outer_var.view(),
            &outer_batch.indices,
        );

        let at = HessianAt::new(iterate.inner_var.view(), iterate.outer_var.view());
        let ihvp = self.neumann.hia(
            &self.inner_oracle,
            at,
            grad_in.view(),
            hia_lr,
            inner_sampler,
            rng,
        );

        let inner_batch = inner_sampler.next_batch();
        let implicit_grad = self.inner_oracle.cross(
            iterate.inner_var.view(),
            iterate.outer_var.view(),
            ihvp.view(),
            &inner_batch.indices,
        );

        iterate
            .outer_var
            .iter_mut()
            .zip(grad_out.iter().zip(&implicit_grad))
            .for_each(|(x, (g, ig))| *x -= outer_lr * (g - ig));

        InnerSgd::new(inner_lr, self.n_inner_steps).run(
            &self.inner_oracle,
            &mut iterate.inner_var,
            iterate.outer_var.view(),
            inner_sampler,
        );
    }
}
