use log::trace;

use super::{Algorithm, Iterate, SolverState};
use crate::{
    hessian::{ConjugateGradient, HessianAt},
    inner::InnerSgd,
    oracles::{InnerOracle, OuterOracle},
    sampling::MinibatchSampler,
    schedule::LearningRateScheduler,
};

/// The decay exponents of the inner and outer learning rates.
pub const TWO_LOOPS_EXPONENTS: [f64; 2] = [0., 0.];

/// Everything that changes across two loops iterations.
#[derive(Debug, Clone)]
pub struct TwoLoopsState {
    pub iterate: Iterate,
    /// Yields `[inner_lr, outer_lr]`.
    pub scheduler: LearningRateScheduler<2>,
    pub inner_sampler: MinibatchSampler,
    pub outer_sampler: MinibatchSampler,
}

impl SolverState for TwoLoopsState {
    fn iterate(&self) -> &Iterate {
        &self.iterate
    }

    fn iterations(&self) -> usize {
        self.scheduler.iteration()
    }
}

/// Nested loops where the inverse Hessian product is solved on one inner batch with
/// conjugate gradient.
#[derive(Debug, Clone)]
pub struct TwoLoops<I, G> {
    inner_oracle: I,
    outer_oracle: G,
    n_inner_steps: usize,
    warm_up_step: f64,
    cg: ConjugateGradient,
}

impl<I, G> TwoLoops<I, G>
where
    I: InnerOracle,
    G: OuterOracle,
{
    pub fn new(
        inner_oracle: I,
        outer_oracle: G,
        n_inner_steps: usize,
        warm_up_step: f64,
        cg: ConjugateGradient,
    ) -> Self {
        Self {
            inner_oracle,
            outer_oracle,
            n_inner_steps,
            warm_up_step,
            cg,
        }
    }
}

impl<I, G> Algorithm for TwoLoops<I, G>
where
    I: InnerOracle,
    G: OuterOracle,
{
    type State = TwoLoopsState;

    fn name(&self) -> &'static str {
        "two-loops"
    }

    fn has_warm_up(&self) -> bool {
        true
    }

    fn warm_up(&self, state: &mut TwoLoopsState) {
        InnerSgd::new(self.warm_up_step, self.n_inner_steps).run(
            &self.inner_oracle,
            &mut state.iterate.inner_var,
            state.iterate.outer_var.view(),
            &mut state.inner_sampler,
        );
    }

    fn step(&self, state: &mut TwoLoopsState) {
        let TwoLoopsState {
            iterate,
            scheduler,
            inner_sampler,
            outer_sampler,
        } = state;

        let [inner_lr, outer_lr] = scheduler.next_lr();
        trace!(inner_lr = inner_lr, outer_lr = outer_lr; "two loops step");

        let outer_batch = outer_sampler.next_batch();
        let (grad_in, grad_out) = self.outer_oracle.grad(
            iterate.inner_var.view(),
            iterate.outer_var.view(),
            &outer_batch.indices,
        );

        let inner_batch = inner_sampler.next_batch();
        let at = HessianAt::new(iterate.inner_var.view(), iterate.outer_var.view());
        let ihvp = self
            .cg
            .solve(&self.inner_oracle, at, grad_in.view(), &inner_batch.indices);
        let implicit_grad = self
            .inner_oracle
            .cross(at.inner, at.outer, ihvp.view(), &inner_batch.indices);

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
