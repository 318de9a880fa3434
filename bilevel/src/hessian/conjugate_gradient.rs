use std::num::NonZeroUsize;

use log::trace;
use ndarray::{Array1, ArrayView1};

use super::HessianAt;
use crate::oracles::InnerOracle;

/// Solves `H w = v` on a single inner batch with the conjugate gradient method, using only
/// Hessian vector products.
#[derive(Debug, Clone, Copy)]
pub struct ConjugateGradient {
    pub max_iter: NonZeroUsize,
    /// Relative tolerance, the solve stops once `|r| <= tol * |v|`.
    pub tol: f64,
}

impl ConjugateGradient {
    /// Creates a new `ConjugateGradient`.
    ///
    /// # Arguments
    /// * `max_iter` - The maximum amount of Hessian vector products.
    /// * `tol` - The relative tolerance on the residual.
    pub fn new(max_iter: NonZeroUsize, tol: f64) -> Self {
        Self { max_iter, tol }
    }

    /// Approximates `H^-1 v`, where `H` is the Hessian of the inner objective at `at` on `batch`.
    ///
    /// # Returns
    /// The approximate solution, starting from zero.
    pub fn solve<O>(
        &self,
        oracle: &O,
        at: HessianAt<'_>,
        v: ArrayView1<f64>,
        batch: &[usize],
    ) -> Array1<f64>
    where
        O: InnerOracle + ?Sized,
    {
        let mut w = Array1::zeros(v.len());
        let mut r = v.to_owned();
        let mut p = r.clone();
        let mut rs = r.dot(&r);
        let threshold = self.tol * self.tol * rs;

        let mut iterations = 0;
        while iterations < self.max_iter.get() && rs > threshold {
            let hp = oracle.hvp(at.inner, at.outer, p.view(), batch);
            let curvature = p.dot(&hp);

            // Not positive definite along `p`, keep what we have.
            if curvature.is_nan() || curvature <= 0. {
                break;
            }

            let alpha = rs / curvature;
            w.scaled_add(alpha, &p);
            r.scaled_add(-alpha, &hp);

            let rs_next = r.dot(&r);
            let beta = rs_next / rs;
            rs = rs_next;

            p *= beta;
            p += &r;
            iterations += 1;
        }

        trace!(iterations = iterations, residual = rs.sqrt(); "finished conjugate gradient");
        w
    }
}
