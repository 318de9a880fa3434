use std::{
    error::Error,
    fmt::{self, Display},
};

use rayon::ThreadPoolBuildError;

/// The result type used in the entire bilevel crate.
pub type Result<T> = std::result::Result<T, BilevelErr>;

/// The bilevel crate's error type.
///
/// Every variant is a setup-time failure, solvers never produce errors once they
/// started iterating.
#[derive(Debug)]
pub enum BilevelErr {
    SizeMismatch {
        a: &'static str,
        b: &'static str,
        got: usize,
        expected: usize,
    },
    EmptyDataset {
        what: &'static str,
    },
    BatchSizeTooLarge {
        what: &'static str,
        batch_size: usize,
        n_samples: usize,
    },
    InvalidHyperparameter {
        name: &'static str,
        value: f64,
    },
    InvalidSpec(serde_json::Error),
    ThreadPool(ThreadPoolBuildError),
}

impl Display for BilevelErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BilevelErr::SizeMismatch {
                a,
                b,
                got,
                expected,
            } => write!(
                f,
                "There's a size mismatch between {a} and {b}, got {got} and expected {expected}"
            ),
            BilevelErr::EmptyDataset { what } => {
                write!(f, "The {what} dataset has no samples to draw batches from")
            }
            BilevelErr::BatchSizeTooLarge {
                what,
                batch_size,
                n_samples,
            } => write!(
                f,
                "The {what} batch size {batch_size} exceeds the amount of samples {n_samples}"
            ),
            BilevelErr::InvalidHyperparameter { name, value } => {
                write!(f, "The hyperparameter {name} has an invalid value {value}")
            }
            BilevelErr::InvalidSpec(e) => write!(f, "Failed to parse the solver spec: {e}"),
            BilevelErr::ThreadPool(e) => write!(f, "Failed to build the thread pool: {e}"),
        }
    }
}

impl Error for BilevelErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            BilevelErr::InvalidSpec(e) => Some(e),
            BilevelErr::ThreadPool(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for BilevelErr {
    fn from(value: serde_json::Error) -> Self {
        Self::InvalidSpec(value)
    }
}

impl From<ThreadPoolBuildError> for BilevelErr {
    fn from(value: ThreadPoolBuildError) -> Self {
        Self::ThreadPool(value)
    }
}
