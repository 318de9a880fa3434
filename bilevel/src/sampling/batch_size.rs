use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};

use crate::{BilevelErr, Result};

/// The amount of samples drawn on every minibatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchSize {
    /// Every batch is the whole dataset.
    Full,
    /// Batches of a fixed amount of samples.
    Size(NonZeroUsize),
}

impl BatchSize {
    /// Resolves the concrete batch size for a dataset of `n_samples` samples.
    ///
    /// # Arguments
    /// * `what` - The dataset being resolved, used for error reporting.
    /// * `n_samples` - The amount of samples in the dataset.
    ///
    /// # Returns
    /// The batch size or an error if the dataset is empty or smaller than the batch.
    pub fn resolve(self, what: &'static str, n_samples: usize) -> Result<usize> {
        if n_samples == 0 {
            return Err(BilevelErr::EmptyDataset { what });
        }

        match self {
            BatchSize::Full => Ok(n_samples),
            BatchSize::Size(size) if size.get() > n_samples => Err(BilevelErr::BatchSizeTooLarge {
                what,
                batch_size: size.get(),
                n_samples,
            }),
            BatchSize::Size(size) => Ok(size.get()),
        }
    }
}

const DEFAULT_BATCH_SIZE: NonZeroUsize = NonZeroUsize::new(64).unwrap();

impl Default for BatchSize {
    fn default() -> Self {
        Self::Size(DEFAULT_BATCH_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_resolves_to_the_dataset_size() {
        assert_eq!(BatchSize::Full.resolve("inner", 17).unwrap(), 17);
    }

    #[test]
    fn larger_than_dataset_fails() {
        let size = BatchSize::Size(NonZeroUsize::new(101).unwrap());
        let err = size.resolve("outer", 100).unwrap_err();

        assert!(matches!(
            err,
            BilevelErr::BatchSizeTooLarge {
                what: "outer",
                batch_size: 101,
                n_samples: 100
            }
        ));
    }

    #[test]
    fn empty_dataset_fails() {
        let err = BatchSize::Full.resolve("inner", 0).unwrap_err();
        assert!(matches!(err, BilevelErr::EmptyDataset { what: "inner" }));
    }

    #[test]
    fn parses_from_json() {
        let full: BatchSize = serde_json::from_str(r#""full""#).unwrap();
        let sized: BatchSize = serde_json::from_str(r#"{"size": 32}"#).unwrap();

        assert_eq!(full, BatchSize::Full);
        assert_eq!(sized, BatchSize::Size(NonZeroUsize::new(32).unwrap()));
        assert!(serde_json::from_str::<BatchSize>(r#"{"size": 0}"#).is_err());
    }
}
