pub use ndarray::prelude::*;
pub use rand::Rng;

use crate::traits::*;
use num_traits::{Float, FromPrimitive};
use rand::distr::uniform::SampleUniform;
use rand::distr::Uniform;

impl<T> SampleOps for Array2<T>
where
    T: Float + SampleUniform,
{
    type Mat = Self;
    type Scalar = T;

    fn runif_with<R: Rng>(
        rng: &mut R,
        nrow: usize,
        ncol: usize,
    ) -> anyhow::Result<Self::Mat> {
        let u01 = Uniform::new(T::zero(), T::one())?;
        Ok(Array2::from_shape_fn((nrow, ncol), |_| rng.sample(&u01)))
    }
}

impl<T> MatOps for Array2<T>
where
    T: Float + std::fmt::Display,
{
    type Mat = Self;
    type Scalar = T;
    type DVec = Array1<T>;

    fn normalize_rows(&self) -> anyhow::Result<Self::Mat> {
        let mut xx = self.clone();
        xx.normalize_rows_inplace()?;
        Ok(xx)
    }

    fn normalize_rows_inplace(&mut self) -> anyhow::Result<()> {
        for (i, mut x_i) in self.rows_mut().into_iter().enumerate() {
            let denom = x_i.sum();
            if !(denom > T::zero() && denom.is_finite()) {
                anyhow::bail!("row {} has non-positive sum {}", i, denom);
            }
            x_i.mapv_inplace(|x| x / denom);
        }
        Ok(())
    }

    fn clamp_min(&self, floor: T) -> Self::Mat {
        self.mapv(|x| if x < floor { floor } else { x })
    }

    fn column_sums(&self) -> Self::DVec {
        self.sum_axis(Axis(0))
    }
}

impl<T> ProfileOps for Array3<T>
where
    T: Float + FromPrimitive,
{
    type Scalar = T;

    fn mean_abs_diff_slices(&self, i: usize, other: &Self, j: usize) -> anyhow::Result<T> {
        let (n_x, n_z) = (self.len_of(Axis(1)), other.len_of(Axis(1)));
        if i >= n_x || j >= n_z {
            anyhow::bail!(
                "slice pair ({}, {}) out of range for {} and {} slices",
                i,
                j,
                n_x,
                n_z
            );
        }

        let x_i = self.index_axis(Axis(1), i);
        let z_j = other.index_axis(Axis(1), j);
        if x_i.dim() != z_j.dim() {
            anyhow::bail!("slice shapes differ: {:?} vs {:?}", x_i.dim(), z_j.dim());
        }

        let tot = x_i
            .iter()
            .zip(z_j.iter())
            .fold(T::zero(), |acc, (&x, &z)| acc + (x - z).abs());

        let nn = T::from_usize(x_i.len().max(1)).unwrap_or_else(T::one);
        Ok(tot / nn)
    }

    fn state_sums(&self) -> Array2<T> {
        self.sum_axis(Axis(2))
    }
}
