use ndarray::{Array1, Array2, s};
use ndarray_rand::{RandomExt, rand_distr::StandardNormal};
use rand::{SeedableRng, rngs::StdRng};
use rand_distr::Normal;

use crate::config::BenchConfig;

/// A labelled set of samples, one row per sample.
#[derive(Debug, Clone)]
pub struct Split {
    pub features: Array2<f64>,
    pub labels: Array1<f64>,
}

impl Split {
    pub fn n_samples(&self) -> usize {
        self.labels.len()
    }
}

/// Draws a noisy linear regression dataset and splits it in train and validation.
///
/// # Returns
/// `(train, validation)` or an error if the noise isn't a valid standard deviation.
pub fn linear_regression(config: &BenchConfig) -> anyhow::Result<(Split, Split)> {
    anyhow::ensure!(
        config.noise.is_finite() && config.noise >= 0.,
        "noise must be a non-negative standard deviation, got {}",
        config.noise
    );

    let mut rng = StdRng::seed_from_u64(config.data_seed);
    let n = config.n_train + config.n_val;

    let weights: Array1<f64> = Array1::random_using(config.n_features, StandardNormal, &mut rng);
    let features: Array2<f64> =
        Array2::random_using((n, config.n_features), StandardNormal, &mut rng);
    let noise = Array1::random_using(n, Normal::new(0., config.noise)?, &mut rng);
    let labels = features.dot(&weights) + noise;

    let train = Split {
        features: features.slice(s![..config.n_train, ..]).to_owned(),
        labels: labels.slice(s![..config.n_train]).to_owned(),
    };

    let val = Split {
        features: features.slice(s![config.n_train.., ..]).to_owned(),
        labels: labels.slice(s![config.n_train..]).to_owned(),
    };

    Ok((train, val))
}
