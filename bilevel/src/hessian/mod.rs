mod conjugate_gradient;
mod neumann;

pub use conjugate_gradient::ConjugateGradient;
pub use neumann::{HessianAt, Neumann, NeumannEstimator};
