use std::num::NonZeroUsize;

use log::{debug, info, warn};
use ndarray::Array1;

use crate::stopping::StoppingCriterion;

/// The pair of variables of a bilevel problem.
#[derive(Debug, Clone, PartialEq)]
pub struct Iterate {
    pub inner_var: Array1<f64>,
    pub outer_var: Array1<f64>,
}

impl Iterate {
    pub fn new(inner_var: Array1<f64>, outer_var: Array1<f64>) -> Self {
        Self {
            inner_var,
            outer_var,
        }
    }

    /// Returns `true` if no entry of either variable is `NaN` or infinite.
    pub fn is_finite(&self) -> bool {
        self.inner_var.iter().chain(&self.outer_var).all(|v| v.is_finite())
    }
}

/// A bilevel solver whose concrete algorithm was chosen at build time.
pub trait Solver {
    /// The name of the algorithm.
    fn name(&self) -> &'static str;

    /// The current iterate.
    fn iterate(&self) -> &Iterate;

    /// The amount of outer iterations run so far, warm up excluded.
    fn iterations(&self) -> usize;

    /// Returns `true` if the solver still has to seed the inner variable before iterating.
    fn has_warm_up(&self) -> bool;

    /// Seeds the inner variable, does nothing if there's no warm up pending.
    fn warm_up(&mut self);

    /// Runs `max_iter` outer iterations.
    fn run_block(&mut self, max_iter: usize);

    /// Runs blocks of `eval_freq` iterations until `criterion` says to stop.
    ///
    /// If the solver warms up, `criterion` is also consulted once right before it.
    ///
    /// # Arguments
    /// * `eval_freq` - The amount of iterations between two consultations of `criterion`.
    /// * `criterion` - Decides whether to keep iterating given the current iterate.
    ///
    /// # Returns
    /// The last iterate.
    fn run(&mut self, eval_freq: NonZeroUsize, criterion: &mut dyn StoppingCriterion) -> Iterate {
        info!(solver = self.name(), eval_freq = eval_freq.get(); "starting run");

        if self.has_warm_up() {
            if !criterion.should_continue(self.iterate()) {
                return self.iterate().clone();
            }

            self.warm_up();
        }

        while criterion.should_continue(self.iterate()) {
            self.run_block(eval_freq.get());
        }

        info!(solver = self.name(), iterations = self.iterations(); "run stopped");
        self.iterate().clone()
    }
}

/// The explicit state threaded through every iteration of an algorithm.
pub trait SolverState: Clone {
    fn iterate(&self) -> &Iterate;

    /// The amount of `step`s applied to this state.
    fn iterations(&self) -> usize;
}

/// One bilevel algorithm as a pure transition over its state.
pub trait Algorithm {
    type State: SolverState;

    fn name(&self) -> &'static str;

    /// Returns `true` if the algorithm runs `warm_up` once before its first iteration.
    fn has_warm_up(&self) -> bool {
        false
    }

    fn warm_up(&self, _state: &mut Self::State) {}

    /// Runs a single outer iteration.
    fn step(&self, state: &mut Self::State);
}

/// Drives an `Algorithm` over an owned state, exposing it as a `Solver`.
#[derive(Debug, Clone)]
pub struct Driver<A: Algorithm> {
    algorithm: A,
    state: A::State,
    warmed_up: bool,
}

impl<A: Algorithm> Driver<A> {
    /// Creates a new `Driver`.
    ///
    /// # Arguments
    /// * `algorithm` - The algorithm and the oracles it queries.
    /// * `state` - The initial state.
    pub fn new(algorithm: A, state: A::State) -> Self {
        Self {
            algorithm,
            state,
            warmed_up: false,
        }
    }

    pub fn algorithm(&self) -> &A {
        &self.algorithm
    }

    pub fn state(&self) -> &A::State {
        &self.state
    }

    /// Consumes the driver, returning its state.
    pub fn into_state(self) -> A::State {
        self.state
    }
}

impl<A: Algorithm> Solver for Driver<A> {
    fn name(&self) -> &'static str {
        self.algorithm.name()
    }

    fn iterate(&self) -> &Iterate {
        self.state.iterate()
    }

    fn iterations(&self) -> usize {
        self.state.iterations()
    }

    fn has_warm_up(&self) -> bool {
        self.algorithm.has_warm_up() && !self.warmed_up
    }

    fn warm_up(&mut self) {
        if !self.has_warm_up() {
            return;
        }

        self.algorithm.warm_up(&mut self.state);
        self.warmed_up = true;
        debug!(solver = self.name(); "warmed up the inner variable");
    }

    fn run_block(&mut self, max_iter: usize) {
        for _ in 0..max_iter {
            self.algorithm.step(&mut self.state);
        }

        let iterations = self.iterations();
        debug!(solver = self.name(), iterations = iterations; "finished run block");

        if !self.iterate().is_finite() {
            warn!(solver = self.name(), iterations = iterations; "the iterate diverged");
        }
    }
}
