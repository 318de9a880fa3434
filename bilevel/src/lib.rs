pub mod builder;
pub mod error;
pub mod execution;
pub mod hessian;
pub mod inner;
pub mod oracles;
pub mod sampling;
pub mod schedule;
pub mod solvers;
pub mod specs;
pub mod stopping;
mod test;

pub use builder::SolverBuilder;
pub use error::{BilevelErr, Result};
pub use solvers::{Iterate, Solver};
pub use specs::{AlgorithmSpec, SolverSpec};
pub use stopping::{StoppingCriterion, SufficientProgress};
