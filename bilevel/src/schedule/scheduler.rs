use crate::{BilevelErr, Result};

/// Generates `N` coupled learning rates that decay in lockstep.
///
/// On its `k`-th call (starting at `k = 0`) the scheduler yields
/// `step_sizes[i] / (k + 1)^exponents[i]` for every schedule `i`.
#[derive(Debug, Clone, PartialEq)]
pub struct LearningRateScheduler<const N: usize> {
    step_sizes: [f64; N],
    exponents: [f64; N],
    iteration: usize,
}

impl<const N: usize> LearningRateScheduler<N> {
    /// Creates a new `LearningRateScheduler`.
    ///
    /// # Arguments
    /// * `step_sizes` - The base step size of each schedule.
    /// * `exponents` - The decay exponent of each schedule, `0` keeps it constant.
    ///
    /// # Returns
    /// A new scheduler or an error if a step size is negative or any value isn't finite.
    pub fn new(step_sizes: [f64; N], exponents: [f64; N]) -> Result<Self> {
        for &step_size in &step_sizes {
            if !step_size.is_finite() || step_size < 0. {
                return Err(BilevelErr::InvalidHyperparameter {
                    name: "step_size",
                    value: step_size,
                });
            }
        }

        if let Some(&exponent) = exponents.iter().find(|e| !e.is_finite()) {
            return Err(BilevelErr::InvalidHyperparameter {
                name: "exponent",
                value: exponent,
            });
        }

        Ok(Self {
            step_sizes,
            exponents,
            iteration: 0,
        })
    }

    /// Composes several `(step_size, exponent)` pairs into one scheduler sharing a
    /// single iteration counter.
    pub fn from_pairs(pairs: [(f64, f64); N]) -> Result<Self> {
        let step_sizes = pairs.map(|(step_size, _)| step_size);
        let exponents = pairs.map(|(_, exponent)| exponent);
        Self::new(step_sizes, exponents)
    }

    /// The amount of times `next_lr` has been called.
    #[inline]
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// Returns the learning rates for the current iteration and advances the counter.
    pub fn next_lr(&mut self) -> [f64; N] {
        let k = (self.iteration + 1) as f64;
        self.iteration += 1;

        let mut lrs = self.step_sizes;
        for (lr, exponent) in lrs.iter_mut().zip(self.exponents) {
            if exponent != 0. {
                *lr /= k.powf(exponent);
            }
        }

        lrs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_call_is_the_base_step_size() {
        let mut scheduler = LearningRateScheduler::new([0.1, 0.2], [0.5, 1.]).unwrap();

        assert_eq!(scheduler.next_lr(), [0.1, 0.2]);
        assert_eq!(scheduler.iteration(), 1);
    }

    #[test]
    fn follows_the_power_law() {
        let mut scheduler = LearningRateScheduler::new([1.], [0.5]).unwrap();

        for k in 0..10 {
            let [lr] = scheduler.next_lr();
            let expected = 1. / ((k + 1) as f64).sqrt();
            assert!((lr - expected).abs() < 1e-12);
        }
    }

    #[test]
    fn positive_exponent_is_strictly_decreasing() {
        let mut scheduler = LearningRateScheduler::new([0.1], [1. / 3.]).unwrap();
        let mut prev = f64::INFINITY;

        for _ in 0..100 {
            let [lr] = scheduler.next_lr();
            assert!(lr < prev);
            prev = lr;
        }
    }

    #[test]
    fn zero_exponent_is_constant() {
        let mut scheduler = LearningRateScheduler::new([0.3], [0.]).unwrap();

        for _ in 0..100 {
            assert_eq!(scheduler.next_lr(), [0.3]);
        }
    }

    #[test]
    fn composed_schedules_share_the_counter() {
        let mut scheduler =
            LearningRateScheduler::from_pairs([(1., 0.5), (0.5, 0.), (2., 1.)]).unwrap();

        scheduler.next_lr();
        scheduler.next_lr();
        scheduler.next_lr();
        let [a, b, c] = scheduler.next_lr();

        assert!((a - 0.5).abs() < 1e-12);
        assert_eq!(b, 0.5);
        assert!((c - 0.5).abs() < 1e-12);
        assert_eq!(scheduler.iteration(), 4);
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(LearningRateScheduler::new([-0.1], [0.]).is_err());
        assert!(LearningRateScheduler::new([f64::NAN], [0.]).is_err());
        assert!(LearningRateScheduler::new([0.1], [f64::INFINITY]).is_err());
    }
}
