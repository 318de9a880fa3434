use bilevel::oracles::{InnerOracle, OuterOracle};
use ndarray::{Array1, ArrayView1, Axis};

use crate::data::Split;

/// Least squares residuals `A_B z - y_B` of the samples in `batch`.
fn residuals(split: &Split, inner: ArrayView1<f64>, batch: &[usize]) -> Array1<f64> {
    let features = split.features.select(Axis(0), batch);
    let labels = split.labels.select(Axis(0), batch);
    features.dot(&inner) - labels
}

/// `A_B' r / |B|`, the gradient of the mean squared loss given its residuals.
fn backprop(split: &Split, residuals: &Array1<f64>, batch: &[usize]) -> Array1<f64> {
    let features = split.features.select(Axis(0), batch);
    features.t().dot(residuals) / batch.len() as f64
}

/// Ridge regression on the training set with one log regularization weight per feature.
///
/// `h(z, x) = mean_i 1/2 (a_i'z - y_i)^2 + 1/2 sum_j exp(x_j) z_j^2`
#[derive(Debug, Clone)]
pub struct RidgeInner {
    train: Split,
}

impl RidgeInner {
    pub fn new(train: Split) -> Self {
        Self { train }
    }
}

impl InnerOracle for RidgeInner {
    fn n_samples(&self) -> usize {
        self.train.n_samples()
    }

    fn inner_dim(&self) -> usize {
        self.train.features.ncols()
    }

    fn outer_dim(&self) -> usize {
        self.train.features.ncols()
    }

    fn value(&self, inner: ArrayView1<f64>, outer: ArrayView1<f64>, batch: &[usize]) -> f64 {
        let r = residuals(&self.train, inner, batch);
        let penalty: f64 = inner.iter().zip(&outer).map(|(z, x)| x.exp() * z * z).sum();
        0.5 * r.dot(&r) / batch.len() as f64 + 0.5 * penalty
    }

    fn grad_inner_var(
        &self,
        inner: ArrayView1<f64>,
        outer: ArrayView1<f64>,
        batch: &[usize],
    ) -> Array1<f64> {
        let r = residuals(&self.train, inner, batch);
        backprop(&self.train, &r, batch) + outer.mapv(f64::exp) * inner
    }

    fn hvp(
        &self,
        _inner: ArrayView1<f64>,
        outer: ArrayView1<f64>,
        v: ArrayView1<f64>,
        batch: &[usize],
    ) -> Array1<f64> {
        let features = self.train.features.select(Axis(0), batch);
        let av = features.dot(&v);
        features.t().dot(&av) / batch.len() as f64 + outer.mapv(f64::exp) * v
    }

    fn cross(
        &self,
        inner: ArrayView1<f64>,
        outer: ArrayView1<f64>,
        v: ArrayView1<f64>,
        _batch: &[usize],
    ) -> Array1<f64> {
        outer.mapv(f64::exp) * inner * v
    }
}

/// Mean squared error on the validation set, it doesn't depend on the regularization.
#[derive(Debug, Clone)]
pub struct ValidationLoss {
    val: Split,
}

impl ValidationLoss {
    pub fn new(val: Split) -> Self {
        Self { val }
    }

    /// The loss over the whole validation set.
    pub fn full(&self, inner: ArrayView1<f64>) -> f64 {
        let everything: Vec<usize> = (0..self.val.n_samples()).collect();
        let r = residuals(&self.val, inner, &everything);
        0.5 * r.dot(&r) / everything.len().max(1) as f64
    }
}

impl OuterOracle for ValidationLoss {
    fn n_samples(&self) -> usize {
        self.val.n_samples()
    }

    fn inner_dim(&self) -> usize {
        self.val.features.ncols()
    }

    fn outer_dim(&self) -> usize {
        self.val.features.ncols()
    }

    fn value(&self, inner: ArrayView1<f64>, _outer: ArrayView1<f64>, batch: &[usize]) -> f64 {
        let r = residuals(&self.val, inner, batch);
        0.5 * r.dot(&r) / batch.len() as f64
    }

    fn grad(
        &self,
        inner: ArrayView1<f64>,
        _outer: ArrayView1<f64>,
        batch: &[usize],
    ) -> (Array1<f64>, Array1<f64>) {
        let r = residuals(&self.val, inner, batch);
        let grad_inner = backprop(&self.val, &r, batch);
        (grad_inner, Array1::zeros(self.outer_dim()))
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{Array2, array};

    use super::*;

    const EPS: f64 = 1e-6;

    fn split() -> Split {
        Split {
            features: array![[1., 2., 0.], [0., -1., 3.], [2., 1., 1.], [-1., 0., 2.]],
            labels: array![1., -2., 0.5, 3.],
        }
    }

    fn basis(dim: usize, j: usize) -> Array1<f64> {
        let mut e = Array1::zeros(dim);
        e[j] = 1.;
        e
    }

    #[test]
    fn inner_gradient_matches_finite_differences() {
        let oracle = RidgeInner::new(split());
        let z = array![0.3, -0.2, 0.5];
        let x = array![0.1, -1., 0.5];
        let batch = [0, 2, 3];

        let grad = oracle.grad_inner_var(z.view(), x.view(), &batch);

        for j in 0..3 {
            let e = basis(3, j) * EPS;
            let fd = (oracle.value((&z + &e).view(), x.view(), &batch)
                - oracle.value((&z - &e).view(), x.view(), &batch))
                / (2. * EPS);

            assert!((fd - grad[j]).abs() < 1e-6, "{fd} != {}", grad[j]);
        }
    }

    #[test]
    fn hvp_matches_finite_differences_of_the_gradient() {
        let oracle = RidgeInner::new(split());
        let z = array![0.3, -0.2, 0.5];
        let x = array![0.1, -1., 0.5];
        let v = array![1., 0.5, -2.];
        let batch = [1, 2];

        let hvp = oracle.hvp(z.view(), x.view(), v.view(), &batch);
        let step = &v * EPS;
        let fd = (oracle.grad_inner_var((&z + &step).view(), x.view(), &batch)
            - oracle.grad_inner_var((&z - &step).view(), x.view(), &batch))
            / (2. * EPS);

        assert!((&fd - &hvp).mapv(f64::abs).sum() < 1e-6);
    }

    #[test]
    fn cross_matches_finite_differences_wrt_the_outer_variable() {
        let oracle = RidgeInner::new(split());
        let z = array![0.3, -0.2, 0.5];
        let x = array![0.1, -1., 0.5];
        let v = array![1., 0.5, -2.];
        let batch = [0, 1, 2, 3];

        let cross = oracle.cross(z.view(), x.view(), v.view(), &batch);

        for j in 0..3 {
            let e = basis(3, j) * EPS;
            let inner_product = |x: Array1<f64>| {
                oracle
                    .grad_inner_var(z.view(), x.view(), &batch)
                    .dot(&v)
            };
            let fd = (inner_product(&x + &e) - inner_product(&x - &e)) / (2. * EPS);

            assert!((fd - cross[j]).abs() < 1e-6, "{fd} != {}", cross[j]);
        }
    }

    #[test]
    fn validation_gradient_matches_finite_differences() {
        let oracle = ValidationLoss::new(split());
        let z = array![0.3, -0.2, 0.5];
        let x = Array1::zeros(3);
        let batch = [0, 3];

        let (grad_inner, grad_outer) = oracle.grad(z.view(), x.view(), &batch);
        assert_eq!(grad_outer, Array1::<f64>::zeros(3));

        for j in 0..3 {
            let e = basis(3, j) * EPS;
            let fd = (oracle.value((&z + &e).view(), x.view(), &batch)
                - oracle.value((&z - &e).view(), x.view(), &batch))
                / (2. * EPS);

            assert!((fd - grad_inner[j]).abs() < 1e-6);
        }
    }

    #[test]
    fn full_loss_is_the_mean_over_every_sample() {
        let val = Split {
            features: Array2::eye(2),
            labels: array![1., 3.],
        };
        let oracle = ValidationLoss::new(val);

        // residuals (-1, -3)
        assert_eq!(oracle.full(array![0., 0.].view()), 2.5);
    }
}
