mod execution;
mod solver;

pub use execution::ExecutionSpec;
pub use solver::{AlgorithmSpec, SolverSpec};
