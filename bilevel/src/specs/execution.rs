use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};

/// The specification for the `Executor`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionSpec {
    #[default]
    Sequential,
    Parallel {
        #[serde(default)]
        threads: Option<NonZeroUsize>,
    },
}
