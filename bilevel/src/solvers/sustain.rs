use log::trace;
use ndarray::{Array1, Zip};
use rand::rngs::StdRng;

use super::{Algorithm, Iterate, SolverState};
use crate::{
    execution::Executor,
    hessian::{HessianAt, Neumann},
    oracles::{InnerOracle, OuterOracle},
    sampling::MinibatchSampler,
    schedule::LearningRateScheduler,
};

/// The decay exponents of the inner learning rate, the HIA learning rate, the momentum
/// coefficient and the outer learning rate.
pub const SUSTAIN_EXPONENTS: [f64; 4] = [1. / 3., 0., 2. / 3., 1. / 3.];

/// The variance reduction buffers of one variable.
#[derive(Debug, Clone, PartialEq)]
pub struct Memory {
    /// The variable at the previous iteration.
    pub snapshot: Array1<f64>,
    /// The recursive momentum direction.
    pub direction: Array1<f64>,
}

impl Memory {
    pub fn zeros(dim: usize) -> Self {
        Self {
            snapshot: Array1::zeros(dim),
            direction: Array1::zeros(dim),
        }
    }

    /// Applies `d = eta * g + (1 - eta) * (d + g - g_old)`.
    fn update_direction(&mut self, eta: f64, grad: &Array1<f64>, grad_old: &Array1<f64>) {
        Zip::from(&mut self.direction)
            .and(grad)
            .and(grad_old)
            .for_each(|d, &g, &g_old| *d = eta * g + (1. - eta) * (*d + g - g_old));
    }
}

/// Everything that changes across SUSTAIN iterations.
#[derive(Debug, Clone)]
pub struct SustainState {
    pub iterate: Iterate,
    pub memory_inner: Memory,
    pub memory_outer: Memory,
    /// Yields `[inner_lr, hia_lr, eta, outer_lr]`.
    pub scheduler: LearningRateScheduler<4>,
    pub inner_sampler: MinibatchSampler,
    pub outer_sampler: MinibatchSampler,
    pub rng: StdRng,
}

impl SolverState for SustainState {
    fn iterate(&self) -> &Iterate {
        &self.iterate
    }

    fn iterations(&self) -> usize {
        self.scheduler.iteration()
    }
}

/// Single loop stochastic bilevel optimization with recursive momentum on both variables.
#[derive(Debug, Clone)]
pub struct Sustain<I, G> {
    inner_oracle: I,
    outer_oracle: G,
    neumann: Neumann,
    executor: Executor,
}

impl<I, G> Sustain<I, G>
where
    I: InnerOracle,
    G: OuterOracle,
{
    /// Creates a new `Sustain`.
    ///
    /// # Arguments
    /// * `inner_oracle` - The inner objective.
    /// * `outer_oracle` - The outer objective.
    /// * `neumann` - The joint inverse Hessian approximation settings.
    /// * `executor` - Runs the evaluations at the iterate and at the snapshot.
    pub fn new(inner_oracle: I, outer_oracle: G, neumann: Neumann, executor: Executor) -> Self {
        Self {
            inner_oracle,
            outer_oracle,
            neumann,
            executor,
        }
    }
}

impl<I, G> Algorithm for Sustain<I, G>
where
    I: InnerOracle,
    G: OuterOracle,
{
    type State = SustainState;

    fn name(&self) -> &'static str {
        "SUSTAIN"
    }

    fn step(&self, state: &mut SustainState) {
        let SustainState {
            iterate,
            memory_inner,
            memory_outer,
            scheduler,
            inner_sampler,
            outer_sampler,
            rng,
        } = state;

        let inner = &self.inner_oracle;
        let outer = &self.outer_oracle;

        let [inner_lr, hia_lr, eta, outer_lr] = scheduler.next_lr();
        trace!(inner_lr = inner_lr, hia_lr = hia_lr, eta = eta, outer_lr = outer_lr; "sustain step");

        let at = HessianAt::new(iterate.inner_var.view(), iterate.outer_var.view());
        let at_old = HessianAt::new(memory_inner.snapshot.view(), memory_outer.snapshot.view());

        let inner_batch = inner_sampler.next_batch();
        let inner_indices = &inner_batch.indices;
        let (grad, grad_old) = self.executor.join(
            || inner.grad_inner_var(at.inner, at.outer, inner_indices),
            || inner.grad_inner_var(at_old.inner, at_old.outer, inner_indices),
        );

        let outer_batch = outer_sampler.next_batch();
        let outer_indices = &outer_batch.indices;
        let ((grad_in, mut implicit_grad), (grad_in_old, mut implicit_grad_old)) = self
            .executor
            .join(
                || outer.grad(at.inner, at.outer, outer_indices),
                || outer.grad(at_old.inner, at_old.outer, outer_indices),
            );

        let (ihvp, ihvp_old) = self.neumann.joint_hia(
            inner,
            at,
            grad_in.view(),
            at_old,
            grad_in_old.view(),
            hia_lr,
            inner_sampler,
            rng,
            &self.executor,
        );

        // The cross terms reuse the batch of the inner gradients.
        let (cross, cross_old) = self.executor.join(
            || inner.cross(at.inner, at.outer, ihvp.view(), inner_indices),
            || inner.cross(at_old.inner, at_old.outer, ihvp_old.view(), inner_indices),
        );
        implicit_grad -= &cross;
        implicit_grad_old -= &cross_old;

        memory_inner.update_direction(eta, &grad, &grad_old);
        memory_outer.update_direction(eta, &implicit_grad, &implicit_grad_old);

        memory_inner.snapshot.assign(&iterate.inner_var);
        memory_outer.snapshot.assign(&iterate.outer_var);

        iterate
            .inner_var
            .scaled_add(-inner_lr, &memory_inner.direction);
        iterate
            .outer_var
            .scaled_add(-outer_lr, &memory_outer.direction);
    }
}
