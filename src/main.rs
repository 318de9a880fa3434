use std::{env, path::Path};

use bilevel::{Iterate, SolverBuilder, SufficientProgress};
use log::info;
use ndarray::Array1;
use serde::Serialize;

mod config;
mod data;
mod problems;

use config::BenchConfig;
use problems::{RidgeInner, ValidationLoss};

/// What a run prints once it stops.
#[derive(Debug, Serialize)]
struct Report {
    solver: &'static str,
    iterations: usize,
    validation_loss: f64,
    history: Vec<f64>,
    regularization: Vec<f64>,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config = match env::args().nth(1) {
        Some(path) => BenchConfig::from_file(Path::new(&path))?,
        None => BenchConfig::default(),
    };

    let (train, val) = data::linear_regression(&config)?;
    info!(
        n_train = train.n_samples(),
        n_val = val.n_samples(),
        n_features = config.n_features;
        "generated the dataset"
    );

    let inner = RidgeInner::new(train);
    let outer = ValidationLoss::new(val);
    let evaluator = outer.clone();

    let eval_freq = config.solver.eval_freq;
    let mut solver = SolverBuilder::new().build(
        config.solver,
        inner,
        outer,
        Array1::zeros(config.n_features),
        Array1::zeros(config.n_features),
    )?;

    let mut block = 0;
    let objective = |it: &Iterate| {
        let loss = evaluator.full(it.inner_var.view());
        info!(block = block, validation_loss = loss; "evaluated");
        block += 1;
        loss
    };

    let mut criterion =
        SufficientProgress::new(objective, config.eps, config.patience, config.max_runs);
    let iterate = solver.run(eval_freq, &mut criterion);

    let report = Report {
        solver: solver.name(),
        iterations: solver.iterations(),
        validation_loss: evaluator.full(iterate.inner_var.view()),
        history: criterion.history().to_vec(),
        regularization: iterate.outer_var.to_vec(),
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
