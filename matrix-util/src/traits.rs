use rand::Rng;

/// Normalize, clamp, or summarize rows/columns of a dense matrix
pub trait MatOps {
    type Mat;
    type Scalar;
    type DVec;

    /// Divide each row by its sum so that the result is row-stochastic.
    /// Fails on a row whose sum is not positive and finite.
    fn normalize_rows(&self) -> anyhow::Result<Self::Mat>;

    /// Divide each row by its sum in place
    fn normalize_rows_inplace(&mut self) -> anyhow::Result<()>;

    /// A copy with every entry below `floor` replaced by `floor`
    fn clamp_min(&self, floor: Self::Scalar) -> Self::Mat;

    /// Column sums, e.g., total assignment mass per cluster
    fn column_sums(&self) -> Self::DVec;
}

/// Operations to sample random matrices from an explicit generator so
/// that results are reproducible per caller-held seed
pub trait SampleOps {
    type Mat;
    type Scalar;

    /// Sample a matrix from a uniform distribution `U(0,1)`
    fn runif_with<R: Rng>(rng: &mut R, nrow: usize, ncol: usize) -> anyhow::Result<Self::Mat>;
}

/// Operations on `(sites × clusters × states)` probability tensors
pub trait ProfileOps {
    type Scalar;

    /// Mean absolute elementwise difference between cluster `i` of
    /// `self` and cluster `j` of `other`
    ///
    /// $$d(i,j) = \frac{1}{S G} \sum_{s,g} |x_{s i g} - z_{s j g}|$$
    ///
    /// Fails if either index is out of range or the two slices differ
    /// in shape.
    fn mean_abs_diff_slices(
        &self,
        i: usize,
        other: &Self,
        j: usize,
    ) -> anyhow::Result<Self::Scalar>;

    /// Sum over states for every `(site, cluster)` slice
    fn state_sums(&self) -> ndarray::Array2<Self::Scalar>;
}
