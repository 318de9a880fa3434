use ndarray::{Array1, ArrayView1};

/// First and second order information about the inner objective `h(inner, outer)`.
///
/// The objective is a finite sum over `n_samples` samples. Every method evaluates the
/// average over the samples listed in `batch`. An `InnerOracle` does not:
/// - own the iterates,
/// - draw its own batches,
/// - validate shapes (the solver builder does it once at setup).
pub trait InnerOracle: Send + Sync {
    /// Returns the amount of samples in the finite sum.
    fn n_samples(&self) -> usize;

    /// Returns the length of the inner variable.
    fn inner_dim(&self) -> usize;

    /// Returns the length of the outer variable.
    fn outer_dim(&self) -> usize;

    /// Evaluates the objective on a batch.
    fn value(&self, inner: ArrayView1<f64>, outer: ArrayView1<f64>, batch: &[usize]) -> f64;

    /// Computes the gradient with respect to the inner variable.
    fn grad_inner_var(
        &self,
        inner: ArrayView1<f64>,
        outer: ArrayView1<f64>,
        batch: &[usize],
    ) -> Array1<f64>;

    /// Computes the product of the Hessian with respect to the inner variable and `v`.
    fn hvp(
        &self,
        inner: ArrayView1<f64>,
        outer: ArrayView1<f64>,
        v: ArrayView1<f64>,
        batch: &[usize],
    ) -> Array1<f64>;

    /// Computes the cross term `d/d_outer <grad_inner_var(inner, outer), v>`, that is, the
    /// mixed second derivative contracted with `v`. The result has the outer variable's shape.
    fn cross(
        &self,
        inner: ArrayView1<f64>,
        outer: ArrayView1<f64>,
        v: ArrayView1<f64>,
        batch: &[usize],
    ) -> Array1<f64>;
}

/// First order information about the outer objective `g(inner, outer)`.
///
/// Like `InnerOracle`, every method averages over the samples in `batch`.
pub trait OuterOracle: Send + Sync {
    /// Returns the amount of samples in the finite sum.
    fn n_samples(&self) -> usize;

    /// Returns the length of the inner variable.
    fn inner_dim(&self) -> usize;

    /// Returns the length of the outer variable.
    fn outer_dim(&self) -> usize;

    /// Evaluates the objective on a batch.
    fn value(&self, inner: ArrayView1<f64>, outer: ArrayView1<f64>, batch: &[usize]) -> f64;

    /// Computes the gradients with respect to the inner and outer variables.
    ///
    /// # Returns
    /// A tuple `(grad_wrt_inner, grad_wrt_outer)`.
    fn grad(
        &self,
        inner: ArrayView1<f64>,
        outer: ArrayView1<f64>,
        batch: &[usize],
    ) -> (Array1<f64>, Array1<f64>);
}
