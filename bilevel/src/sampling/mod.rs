mod batch_size;
mod sampler;

pub use batch_size::BatchSize;
pub use sampler::{Batch, MinibatchSampler};
