mod bsa;
mod solver;
mod sustain;
mod two_loops;

pub use bsa::{BSA_EXPONENTS, Bsa, BsaState};
pub use solver::{Algorithm, Driver, Iterate, Solver, SolverState};
pub use sustain::{Memory, SUSTAIN_EXPONENTS, Sustain, SustainState};
pub use two_loops::{TWO_LOOPS_EXPONENTS, TwoLoops, TwoLoopsState};
