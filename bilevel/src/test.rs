#![cfg(test)]

use std::num::NonZeroUsize;

use ndarray::{Array1, Array2, array};
use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::{
    AlgorithmSpec, Iterate, Solver, SolverBuilder, SolverSpec, SufficientProgress,
    execution::Executor,
    hessian::{Neumann, NeumannEstimator},
    oracles::{InnerOracle, Quadratic, QuadraticOuter},
    sampling::{BatchSize, MinibatchSampler},
    schedule::LearningRateScheduler,
    solvers::{
        Algorithm, Bsa, BsaState, Driver, Memory, SUSTAIN_EXPONENTS, Sustain, SustainState,
    },
    specs::ExecutionSpec,
};

const X_STAR: f64 = -0.75 / 0.4125;

/// `h = 1/2 z'diag(2, 4)z + x(z_1 + z_2)` and `g = 1/2 |z - (1, 1)|^2 + 0.05 x^2`, whose
/// solution is `x* = -0.75 / 0.4125` and `z* = (-x*/2, -x*/4)`.
fn analytic_problem(n_samples: usize) -> (Quadratic, QuadraticOuter) {
    let inner = Quadratic::noiseless(
        array![[2., 0.], [0., 4.]],
        array![[1.], [1.]],
        array![0., 0.],
        n_samples,
    )
    .unwrap();
    let outer = QuadraticOuter::new(Array2::ones((n_samples, 2)), 1, 0.1);
    (inner, outer)
}

/// The same problem with zero mean noise on every sample.
fn noisy_problem(n_samples: usize, seed: u64) -> (Quadratic, QuadraticOuter) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut noise = |n: usize| {
        let mut rows: Array2<f64> = Array2::from_shape_fn((n, 2), |_| rng.random_range(-0.5..0.5));
        let mean = rows.mean_axis(ndarray::Axis(0)).unwrap();
        rows -= &mean;
        rows
    };

    let offsets = noise(n_samples);
    let targets = noise(n_samples) + 1.;

    let inner =
        Quadratic::new(array![[2., 0.], [0., 4.]], array![[1.], [1.]], offsets).unwrap();
    let outer = QuadraticOuter::new(targets, 1, 0.1);
    (inner, outer)
}

fn full_batch_spec(algorithm: AlgorithmSpec) -> SolverSpec {
    let mut spec = SolverSpec::new(algorithm);
    spec.batch_size = BatchSize::Full;
    spec.eval_freq = NonZeroUsize::new(100).unwrap();
    spec
}

/// Warms up and runs exactly `blocks` blocks of `eval_freq` iterations.
fn run_blocks(solver: &mut dyn Solver, eval_freq: usize, blocks: usize) -> Iterate {
    solver.warm_up();

    let mut remaining = blocks;
    let eval_freq = NonZeroUsize::new(eval_freq).unwrap();
    solver.run(eval_freq, &mut |_: &Iterate| {
        let go_on = remaining > 0;
        remaining = remaining.saturating_sub(1);
        go_on
    })
}

fn assert_solved(iterate: &Iterate, tol: f64) {
    let x = iterate.outer_var[0];
    let z = &iterate.inner_var;

    assert!((x - X_STAR).abs() < tol, "outer {x} far from {X_STAR}");
    assert!((z[0] + X_STAR / 2.).abs() < tol, "inner {z}");
    assert!((z[1] + X_STAR / 4.).abs() < tol, "inner {z}");
}

#[test]
fn bsa_converges_on_the_analytic_problem() {
    let (inner, outer) = analytic_problem(16);
    let algorithm = AlgorithmSpec::Bsa {
        n_inner_steps: 10,
        n_hia_steps: NonZeroUsize::new(100).unwrap(),
        estimator: NeumannEstimator::Averaged,
        exponents: [0.; 3],
    };

    let mut solver = SolverBuilder::new()
        .build(full_batch_spec(algorithm), inner, outer, Array1::zeros(2), Array1::zeros(1))
        .unwrap();

    let iterate = run_blocks(solver.as_mut(), 100, 15);

    assert_eq!(solver.iterations(), 1500);
    assert_solved(&iterate, 1e-6);
}

#[test]
fn sustain_converges_on_the_analytic_problem() {
    for eta in [0.5, 1.] {
        let (inner, outer) = analytic_problem(16);
        let algorithm = AlgorithmSpec::Sustain {
            n_hia_steps: NonZeroUsize::new(100).unwrap(),
            eta,
            estimator: NeumannEstimator::Averaged,
            exponents: [0.; 4],
        };

        let mut solver = SolverBuilder::new()
            .build(full_batch_spec(algorithm), inner, outer, Array1::zeros(2), Array1::zeros(1))
            .unwrap();

        let iterate = run_blocks(solver.as_mut(), 100, 15);
        assert_solved(&iterate, 1e-6);
    }
}

#[test]
fn two_loops_converges_on_the_analytic_problem() {
    let (inner, outer) = analytic_problem(16);
    let algorithm = AlgorithmSpec::TwoLoops {
        n_inner_steps: 10,
        cg_max_iter: NonZeroUsize::new(10).unwrap(),
        cg_tol: 1e-12,
        exponents: [0.; 2],
    };

    let mut solver = SolverBuilder::new()
        .build(full_batch_spec(algorithm), inner, outer, Array1::zeros(2), Array1::zeros(1))
        .unwrap();

    let iterate = run_blocks(solver.as_mut(), 100, 15);
    assert_solved(&iterate, 1e-6);
}

#[test]
fn bsa_with_minibatches_approaches_the_solution() {
    let (inner, outer) = noisy_problem(64, 3);
    let mut spec = SolverSpec::new(AlgorithmSpec::Bsa {
        n_inner_steps: 10,
        n_hia_steps: NonZeroUsize::new(50).unwrap(),
        estimator: NeumannEstimator::Averaged,
        exponents: [0.5, 0., 0.5],
    });
    spec.batch_size = BatchSize::Size(NonZeroUsize::new(16).unwrap());
    spec.step_size = 0.2;

    let mut solver = SolverBuilder::new()
        .build(spec, inner, outer, Array1::zeros(2), Array1::zeros(1))
        .unwrap();

    let iterate = run_blocks(solver.as_mut(), 100, 30);
    assert!((iterate.outer_var[0] - X_STAR).abs() < 0.1, "{iterate:?}");
}

/// The inner minimizer at `x = 0` is `(1, 1)`, exactly the outer targets, so every gradient
/// vanishes there.
fn fixed_point_state(outer_lr: f64) -> (Bsa<Quadratic, QuadraticOuter>, BsaState) {
    let hessian = array![[2., 0.], [0., 4.]];
    let inner = Quadratic::noiseless(hessian, array![[1.], [1.]], array![-2., -4.], 32).unwrap();
    let outer = QuadraticOuter::new(Array2::ones((32, 2)), 1, 0.5);

    let neumann = Neumann {
        n_steps: NonZeroUsize::new(10).unwrap(),
        estimator: NeumannEstimator::RandomTruncation,
    };
    let algorithm = Bsa::new(inner, outer, 5, 0.1, neumann);

    let mut rng = StdRng::seed_from_u64(11);
    let size = BatchSize::Size(NonZeroUsize::new(8).unwrap());
    let inner_rng = MinibatchSampler::fork_rng(&mut rng);
    let outer_rng = MinibatchSampler::fork_rng(&mut rng);

    let state = BsaState {
        iterate: Iterate::new(array![1., 1.], array![0.]),
        scheduler: LearningRateScheduler::new([0.1, 0.1, outer_lr], [0.5, 0., 0.5]).unwrap(),
        inner_sampler: MinibatchSampler::new("inner", 32, size, inner_rng).unwrap(),
        outer_sampler: MinibatchSampler::new("outer", 32, size, outer_rng).unwrap(),
        rng,
    };

    (algorithm, state)
}

#[test]
fn bsa_keeps_the_fixed_point() {
    for outer_lr in [0., 0.1] {
        let (algorithm, state) = fixed_point_state(outer_lr);
        let start = state.iterate.clone();
        let mut solver = Driver::new(algorithm, state);

        solver.warm_up();
        solver.run_block(50);

        assert_eq!(solver.iterate(), &start);
        assert_eq!(solver.iterations(), 50);
    }
}

#[test]
fn a_cloned_state_replays_the_same_trajectory() {
    let (algorithm, mut state) = fixed_point_state(0.1);
    state.iterate = Iterate::new(array![-3., 2.], array![4.]);

    let mut solver = Driver::new(algorithm, state);
    solver.warm_up();
    solver.run_block(10);

    let mut replay = Driver::new(solver.algorithm().clone(), solver.state().clone());
    solver.run_block(25);
    replay.run_block(25);

    let state = solver.into_state();
    assert_eq!(state.iterate, replay.iterate().clone());
    assert_eq!(state.scheduler.iteration(), 35);
    assert_eq!(replay.iterations(), 35);
}

#[test]
fn zero_outer_learning_rate_freezes_the_outer_variable() {
    let (algorithm, mut state) = fixed_point_state(0.);
    state.iterate = Iterate::new(array![-3., 2.], array![4.]);

    let mut solver = Driver::new(algorithm, state);
    solver.run_block(20);

    assert_eq!(solver.iterate().outer_var, array![4.]);
    assert_ne!(solver.iterate().inner_var, array![-3., 2.]);
}

#[test]
fn sustain_with_unit_eta_starts_with_the_plain_gradient() {
    let (inner, outer) = noisy_problem(10, 5);
    let z0 = array![0.3, -0.2];
    let x0 = array![0.7];

    let neumann = Neumann {
        n_steps: NonZeroUsize::new(5).unwrap(),
        estimator: NeumannEstimator::Averaged,
    };
    let algorithm = Sustain::new(inner.clone(), outer, neumann, Executor::Sequential);

    let rng = StdRng::seed_from_u64(1);
    let full = |what| {
        MinibatchSampler::new(what, 10, BatchSize::Full, StdRng::seed_from_u64(2)).unwrap()
    };

    let mut state = SustainState {
        iterate: Iterate::new(z0.clone(), x0.clone()),
        memory_inner: Memory::zeros(2),
        memory_outer: Memory::zeros(1),
        scheduler: LearningRateScheduler::new([0.1, 0.1, 1., 0.1], SUSTAIN_EXPONENTS).unwrap(),
        inner_sampler: full("inner"),
        outer_sampler: full("outer"),
        rng,
    };

    algorithm.step(&mut state);

    let indices: Vec<usize> = (0..10).collect();
    let grad = inner.grad_inner_var(z0.view(), x0.view(), &indices);

    assert_eq!(state.memory_inner.direction, grad);
    assert_eq!(state.memory_inner.snapshot, z0);
    assert_eq!(state.memory_outer.snapshot, x0);
    let expected = &z0 - &(&grad * 0.1);
    assert!((&state.iterate.inner_var - &expected).mapv(f64::abs).sum() < 1e-15);
}

fn noisy_run(spec: SolverSpec, blocks: usize) -> Iterate {
    let (inner, outer) = noisy_problem(64, 9);
    let mut solver = SolverBuilder::new()
        .build(spec, inner, outer, array![0.5, -0.5], array![0.25])
        .unwrap();

    run_blocks(solver.as_mut(), 7, blocks)
}

fn minibatch_spec(algorithm: AlgorithmSpec, seed: u64) -> SolverSpec {
    let mut spec = SolverSpec::new(algorithm);
    spec.batch_size = BatchSize::Size(NonZeroUsize::new(8).unwrap());
    spec.random_state = Some(seed);
    spec
}

#[test]
fn same_seed_reproduces_the_trajectory() {
    let algorithms = [
        AlgorithmSpec::Bsa {
            n_inner_steps: 3,
            n_hia_steps: NonZeroUsize::new(6).unwrap(),
            estimator: NeumannEstimator::RandomTruncation,
            exponents: [0.5, 0., 0.5],
        },
        AlgorithmSpec::Sustain {
            n_hia_steps: NonZeroUsize::new(6).unwrap(),
            eta: 0.5,
            estimator: NeumannEstimator::RandomTruncation,
            exponents: [1. / 3., 0., 2. / 3., 1. / 3.],
        },
        AlgorithmSpec::two_loops(),
    ];

    for algorithm in algorithms {
        let first = noisy_run(minibatch_spec(algorithm.clone(), 4), 3);
        let second = noisy_run(minibatch_spec(algorithm.clone(), 4), 3);
        let other = noisy_run(minibatch_spec(algorithm, 5), 3);

        assert_eq!(first, second);
        assert_ne!(first, other);
    }
}

#[test]
fn parallel_execution_matches_sequential() {
    let mut spec = minibatch_spec(AlgorithmSpec::sustain(), 8);
    let sequential = noisy_run(spec.clone(), 4);

    spec.execution = ExecutionSpec::Parallel {
        threads: NonZeroUsize::new(2),
    };
    let parallel = noisy_run(spec, 4);

    assert_eq!(sequential, parallel);
}

#[test]
fn criterion_is_consulted_before_the_warm_up() {
    let (inner, outer) = analytic_problem(16);
    let spec = full_batch_spec(AlgorithmSpec::bsa());
    let mut solver = SolverBuilder::new()
        .build(spec, inner, outer, Array1::zeros(2), Array1::zeros(1))
        .unwrap();

    let mut calls = 0;
    let iterate = solver.run(NonZeroUsize::new(5).unwrap(), &mut |_: &Iterate| {
        calls += 1;
        false
    });

    assert_eq!(calls, 1);
    assert_eq!(iterate, Iterate::new(Array1::zeros(2), Array1::zeros(1)));
    assert_eq!(solver.iterations(), 0);
    assert!(solver.has_warm_up());
}

#[test]
fn max_runs_includes_the_call_before_the_warm_up() {
    for (algorithm, blocks) in [(AlgorithmSpec::bsa(), 2), (AlgorithmSpec::sustain(), 3)] {
        let (inner, outer) = analytic_problem(16);
        let spec = full_batch_spec(algorithm);
        let mut solver = SolverBuilder::new()
            .build(spec, inner, outer, Array1::zeros(2), Array1::zeros(1))
            .unwrap();

        let mut value = 1.;
        let mut criterion = SufficientProgress::new(
            move |_: &Iterate| {
                value /= 2.;
                value
            },
            1e-3,
            5,
            3,
        );

        solver.run(NonZeroUsize::new(5).unwrap(), &mut criterion);

        assert_eq!(criterion.history().len(), 4);
        assert_eq!(solver.iterations(), blocks * 5);
    }
}

#[test]
fn criterion_sees_every_block() {
    for (algorithm, extra_calls) in [(AlgorithmSpec::bsa(), 1), (AlgorithmSpec::sustain(), 0)] {
        let (inner, outer) = analytic_problem(16);
        let spec = full_batch_spec(algorithm);
        let mut solver = SolverBuilder::new()
            .build(spec, inner, outer, Array1::zeros(2), Array1::zeros(1))
            .unwrap();

        let mut seen = Vec::new();
        solver.run(NonZeroUsize::new(5).unwrap(), &mut |it: &Iterate| {
            seen.push(it.clone());
            seen.len() < 4 + extra_calls
        });

        assert_eq!(seen.len(), 4 + extra_calls);
        assert_eq!(solver.iterations(), 15);
        assert!(!solver.has_warm_up());
        assert_eq!(seen.last(), Some(solver.iterate()));
    }
}
