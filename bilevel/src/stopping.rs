use log::{info, warn};

use crate::solvers::Iterate;

/// Decides, between run blocks, whether a solver should keep iterating.
pub trait StoppingCriterion {
    /// Returns `true` to run another block from `iterate`.
    fn should_continue(&mut self, iterate: &Iterate) -> bool;
}

impl<F> StoppingCriterion for F
where
    F: FnMut(&Iterate) -> bool,
{
    fn should_continue(&mut self, iterate: &Iterate) -> bool {
        self(iterate)
    }
}

/// Stops once an objective stops improving.
///
/// Every consultation evaluates the objective. A call whose relative improvement over the
/// best value seen is below `eps` counts towards `patience`, any better call resets the
/// count. A non finite objective stops the run right away.
#[derive(Debug, Clone)]
pub struct SufficientProgress<F> {
    objective: F,
    eps: f64,
    patience: usize,
    max_runs: usize,
    best: f64,
    stalled: usize,
    history: Vec<f64>,
}

impl<F> SufficientProgress<F>
where
    F: FnMut(&Iterate) -> f64,
{
    /// Creates a new `SufficientProgress` criterion.
    ///
    /// # Arguments
    /// * `objective` - The value to minimize, evaluated on every call.
    /// * `eps` - The minimum relative improvement that counts as progress.
    /// * `patience` - The amount of consecutive calls without progress before stopping.
    /// * `max_runs` - The maximum amount of calls that may continue. Solvers that warm up
    ///   spend one of them on the call before the warm up, so they run `max_runs - 1`
    ///   blocks while the others run `max_runs`.
    pub fn new(objective: F, eps: f64, patience: usize, max_runs: usize) -> Self {
        Self {
            objective,
            eps,
            patience,
            max_runs,
            best: f64::INFINITY,
            stalled: 0,
            history: Vec::new(),
        }
    }

    /// The objective values of every call so far, in order.
    pub fn history(&self) -> &[f64] {
        &self.history
    }

    /// The best objective value seen so far.
    pub fn best(&self) -> f64 {
        self.best
    }

    fn made_progress(&self, value: f64) -> bool {
        if self.best.is_infinite() {
            return true;
        }

        let improvement = (self.best - value) / self.best.abs().max(f64::MIN_POSITIVE);
        improvement >= self.eps
    }
}

impl<F> StoppingCriterion for SufficientProgress<F>
where
    F: FnMut(&Iterate) -> f64,
{
    fn should_continue(&mut self, iterate: &Iterate) -> bool {
        let value = (self.objective)(iterate);
        let call = self.history.len();
        self.history.push(value);

        if !value.is_finite() {
            warn!(call = call, objective = value; "the objective diverged, stopping");
            return false;
        }

        if self.made_progress(value) {
            self.stalled = 0;
        } else {
            self.stalled += 1;
        }

        self.best = self.best.min(value);

        if self.stalled >= self.patience {
            info!(call = call, best = self.best; "no sufficient progress, stopping");
            return false;
        }

        // The first call happens before any block ran.
        if call >= self.max_runs {
            info!(call = call, best = self.best; "reached the maximum amount of runs");
            return false;
        }

        true
    }
}
