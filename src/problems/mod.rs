mod ridge;

pub use ridge::{RidgeInner, ValidationLoss};
