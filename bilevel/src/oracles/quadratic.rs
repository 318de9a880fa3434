use ndarray::{Array1, Array2, ArrayView1, Axis};

use super::{InnerOracle, OuterOracle};
use crate::{BilevelErr, Result};

/// Averages the rows of `rows` selected by `batch`.
fn batch_mean(rows: &Array2<f64>, batch: &[usize]) -> Array1<f64> {
    let mut mean = Array1::zeros(rows.ncols());
    if batch.is_empty() {
        return mean;
    }

    for &i in batch {
        mean += &rows.row(i);
    }

    mean / batch.len() as f64
}

/// A quadratic inner objective with a constant Hessian.
///
/// Sample `i` contributes `1/2 z'Hz + z'Cx + b_i'z`, where `z` is the inner variable,
/// `x` the outer one and `b_i` the `i`-th row of the offsets.
#[derive(Debug, Clone)]
pub struct Quadratic {
    hessian: Array2<f64>,
    cross: Array2<f64>,
    offsets: Array2<f64>,
}

impl Quadratic {
    /// Creates a new `Quadratic`.
    ///
    /// # Arguments
    /// * `hessian` - The symmetric positive definite Hessian `H`, `(dz, dz)`.
    /// * `cross` - The coupling matrix `C`, `(dz, dx)`.
    /// * `offsets` - The per sample linear terms, `(n_samples, dz)`.
    ///
    /// # Returns
    /// A new oracle or an error if the shapes don't agree.
    pub fn new(hessian: Array2<f64>, cross: Array2<f64>, offsets: Array2<f64>) -> Result<Self> {
        let dz = hessian.nrows();

        check_dim("hessian columns", "hessian rows", hessian.ncols(), dz)?;
        check_dim("cross rows", "hessian rows", cross.nrows(), dz)?;
        check_dim("offsets columns", "hessian rows", offsets.ncols(), dz)?;

        Ok(Self {
            hessian,
            cross,
            offsets,
        })
    }

    /// Creates a `Quadratic` where every sample shares the same offset, so minibatches
    /// carry no noise.
    pub fn noiseless(
        hessian: Array2<f64>,
        cross: Array2<f64>,
        offset: Array1<f64>,
        n_samples: usize,
    ) -> Result<Self> {
        let offsets = offset
            .insert_axis(Axis(0))
            .broadcast((n_samples, hessian.nrows()))
            .map(|view| view.to_owned())
            .ok_or(BilevelErr::SizeMismatch {
                a: "offset",
                b: "hessian rows",
                got: 0,
                expected: hessian.nrows(),
            })?;

        Self::new(hessian, cross, offsets)
    }

    pub fn hessian(&self) -> &Array2<f64> {
        &self.hessian
    }
}

impl InnerOracle for Quadratic {
    fn n_samples(&self) -> usize {
        self.offsets.nrows()
    }

    fn inner_dim(&self) -> usize {
        self.hessian.nrows()
    }

    fn outer_dim(&self) -> usize {
        self.cross.ncols()
    }

    fn value(&self, inner: ArrayView1<f64>, outer: ArrayView1<f64>, batch: &[usize]) -> f64 {
        let offset = batch_mean(&self.offsets, batch);
        0.5 * inner.dot(&self.hessian.dot(&inner)) + inner.dot(&self.cross.dot(&outer))
            + inner.dot(&offset)
    }

    fn grad_inner_var(
        &self,
        inner: ArrayView1<f64>,
        outer: ArrayView1<f64>,
        batch: &[usize],
    ) -> Array1<f64> {
        self.hessian.dot(&inner) + self.cross.dot(&outer) + batch_mean(&self.offsets, batch)
    }

    fn hvp(
        &self,
        _inner: ArrayView1<f64>,
        _outer: ArrayView1<f64>,
        v: ArrayView1<f64>,
        _batch: &[usize],
    ) -> Array1<f64> {
        self.hessian.dot(&v)
    }

    fn cross(
        &self,
        _inner: ArrayView1<f64>,
        _outer: ArrayView1<f64>,
        v: ArrayView1<f64>,
        _batch: &[usize],
    ) -> Array1<f64> {
        self.cross.t().dot(&v)
    }
}

/// A quadratic outer objective, a regularized distance to per sample targets.
///
/// Sample `i` contributes `1/2 |z - t_i|^2 + reg/2 |x|^2`.
#[derive(Debug, Clone)]
pub struct QuadraticOuter {
    targets: Array2<f64>,
    outer_dim: usize,
    reg: f64,
}

impl QuadraticOuter {
    /// Creates a new `QuadraticOuter`.
    ///
    /// # Arguments
    /// * `targets` - The per sample targets for the inner variable, `(n_samples, dz)`.
    /// * `outer_dim` - The length of the outer variable.
    /// * `reg` - The weight of the outer variable's squared norm.
    pub fn new(targets: Array2<f64>, outer_dim: usize, reg: f64) -> Self {
        Self {
            targets,
            outer_dim,
            reg,
        }
    }
}

impl OuterOracle for QuadraticOuter {
    fn n_samples(&self) -> usize {
        self.targets.nrows()
    }

    fn inner_dim(&self) -> usize {
        self.targets.ncols()
    }

    fn outer_dim(&self) -> usize {
        self.outer_dim
    }

    fn value(&self, inner: ArrayView1<f64>, outer: ArrayView1<f64>, batch: &[usize]) -> f64 {
        let distance: f64 = batch
            .iter()
            .map(|&i| {
                let diff = &inner - &self.targets.row(i);
                diff.dot(&diff)
            })
            .sum();

        let distance = distance / batch.len().max(1) as f64;
        0.5 * distance + 0.5 * self.reg * outer.dot(&outer)
    }

    fn grad(
        &self,
        inner: ArrayView1<f64>,
        outer: ArrayView1<f64>,
        batch: &[usize],
    ) -> (Array1<f64>, Array1<f64>) {
        let grad_inner = &inner - &batch_mean(&self.targets, batch);
        let grad_outer = &outer * self.reg;
        (grad_inner, grad_outer)
    }
}

fn check_dim(a: &'static str, b: &'static str, got: usize, expected: usize) -> Result<()> {
    if got != expected {
        return Err(BilevelErr::SizeMismatch {
            a,
            b,
            got,
            expected,
        });
    }

    Ok(())
}
