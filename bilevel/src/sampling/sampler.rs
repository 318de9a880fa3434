use rand::{Rng, SeedableRng, rngs::StdRng, seq::SliceRandom};

use super::BatchSize;
use crate::Result;

/// A minibatch of sample indices.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// The distinct indices of the samples in this batch.
    pub indices: Vec<usize>,
    /// The scaling that makes a batch sum an unbiased estimate of the dataset sum.
    pub weight: f64,
}

impl Batch {
    /// Returns the amount of samples in the batch.
    #[inline]
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Cyclic minibatch sampler over the indices of a dataset of fixed size.
///
/// Each pass walks a random permutation of `0..n_samples`. A batch that would overrun
/// the pass takes what is left, reshuffles and completes itself from the next pass,
/// so every index is visited exactly once per pass.
///
/// When the batch size equals the amount of samples, the sampler never shuffles and
/// always yields `0..n_samples` in order.
#[derive(Debug, Clone)]
pub struct MinibatchSampler {
    n_samples: usize,
    batch_size: usize,
    cursor: usize,
    permutation: Vec<usize>,
    rng: StdRng,
}

impl MinibatchSampler {
    /// Creates a new `MinibatchSampler`.
    ///
    /// # Arguments
    /// * `what` - The name of the dataset, used for error reporting.
    /// * `n_samples` - The amount of samples in the dataset.
    /// * `batch_size` - The requested batch size.
    /// * `rng` - The random number generator owned by this sampler.
    ///
    /// # Returns
    /// A new sampler or an error if the batch size doesn't fit the dataset.
    pub fn new(
        what: &'static str,
        n_samples: usize,
        batch_size: BatchSize,
        mut rng: StdRng,
    ) -> Result<Self> {
        let batch_size = batch_size.resolve(what, n_samples)?;
        let mut permutation: Vec<usize> = (0..n_samples).collect();

        if batch_size < n_samples {
            permutation.shuffle(&mut rng);
        }

        Ok(Self {
            n_samples,
            batch_size,
            cursor: 0,
            permutation,
            rng,
        })
    }

    #[inline]
    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    #[inline]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// The position in the current pass where the next batch starts.
    #[inline]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Returns `true` if every batch is the whole dataset.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.batch_size == self.n_samples
    }

    /// Draws the next minibatch.
    ///
    /// # Returns
    /// `batch_size` distinct indices and the weight `n_samples / batch_size`.
    pub fn next_batch(&mut self) -> Batch {
        if self.is_full() {
            return Batch {
                indices: self.permutation.clone(),
                weight: 1.0,
            };
        }

        let end = (self.cursor + self.batch_size).min(self.n_samples);
        let mut indices = Vec::with_capacity(self.batch_size);
        indices.extend_from_slice(&self.permutation[self.cursor..end]);

        let missing = self.batch_size - indices.len();
        self.cursor = end;

        if self.cursor == self.n_samples {
            self.reshuffle(&indices, missing);
            indices.extend_from_slice(&self.permutation[..missing]);
            self.cursor = missing;
        }

        Batch {
            indices,
            weight: self.n_samples as f64 / self.batch_size as f64,
        }
    }

    /// Starts a new pass with a fresh permutation whose first `head` indices don't
    /// collide with the ones in `leftover`.
    fn reshuffle(&mut self, leftover: &[usize], head: usize) {
        self.permutation.shuffle(&mut self.rng);

        if leftover.is_empty() || head == 0 {
            return;
        }

        let mut taken = vec![false; self.n_samples];
        for &idx in leftover {
            taken[idx] = true;
        }

        // There are `n_samples - leftover.len() >= head` free indices, so a swap
        // partner always exists past the head.
        let mut partner = head;
        for i in 0..head {
            if !taken[self.permutation[i]] {
                continue;
            }

            while taken[self.permutation[partner]] {
                partner += 1;
            }

            self.permutation.swap(i, partner);
            partner += 1;
        }
    }

    /// Derives an independent generator for a new sampler from a master generator.
    pub fn fork_rng<R: Rng>(rng: &mut R) -> StdRng {
        StdRng::seed_from_u64(rng.random())
    }
}
