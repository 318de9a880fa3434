use std::sync::Arc;

use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::{Result, specs::ExecutionSpec};

/// Runs the independent halves of paired computations, like the gradients at the current
/// iterate and at the snapshot.
///
/// Both strategies return the same values, the closures are deterministic and their results
/// are always combined in the same order.
#[derive(Debug, Clone, Default)]
pub enum Executor {
    #[default]
    Sequential,
    Parallel(Arc<ThreadPool>),
}

impl Executor {
    /// Creates a new `Executor` following a spec.
    ///
    /// # Arguments
    /// * `spec` - The execution specification.
    ///
    /// # Returns
    /// A new executor or an error if the thread pool couldn't be built.
    pub fn from_spec(spec: ExecutionSpec) -> Result<Self> {
        match spec {
            ExecutionSpec::Sequential => Ok(Self::Sequential),
            ExecutionSpec::Parallel { threads } => {
                let mut builder =
                    ThreadPoolBuilder::new().thread_name(|i| format!("bilevel-worker-{i}"));

                if let Some(threads) = threads {
                    builder = builder.num_threads(threads.get());
                }

                Ok(Self::Parallel(Arc::new(builder.build()?)))
            }
        }
    }

    /// Runs both closures, possibly in parallel, and returns their results in order.
    pub fn join<A, B, RA, RB>(&self, a: A, b: B) -> (RA, RB)
    where
        A: FnOnce() -> RA + Send,
        B: FnOnce() -> RB + Send,
        RA: Send,
        RB: Send,
    {
        match self {
            Self::Sequential => (a(), b()),
            Self::Parallel(pool) => pool.join(a, b),
        }
    }

    pub fn is_parallel(&self) -> bool {
        matches!(self, Self::Parallel(_))
    }
}
