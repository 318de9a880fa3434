mod oracle;
mod quadratic;

pub use oracle::{InnerOracle, OuterOracle};
pub use quadratic::{Quadratic, QuadraticOuter};
