//! Allele depth (AD) and total depth (DP) count matrices

use crate::common::*;
use nalgebra_sparse::coo::CooMatrix;

/// A validated pair of sites × cells count matrices with `AD <= DP`
/// elementwise
#[derive(Debug, Clone)]
pub struct AlleleCounts {
    ad: CscMat,
    dp: CscMat,
}

impl AlleleCounts {
    /// Pair up `ad` and `dp` after checking shapes and `0 <= AD <= DP`
    pub fn new(ad: CscMat, dp: CscMat) -> anyhow::Result<Self> {
        if ad.nrows() != dp.nrows() || ad.ncols() != dp.ncols() {
            anyhow::bail!(
                "AD ({} x {}) and DP ({} x {}) shapes differ",
                ad.nrows(),
                ad.ncols(),
                dp.nrows(),
                dp.ncols()
            );
        }

        if let Some((i, j, &d)) = dp.triplet_iter().find(|(_, _, &d)| !(d >= 0.0)) {
            anyhow::bail!("negative or invalid DP[{}, {}] = {}", i, j, d);
        }

        for (i, j, &a) in ad.triplet_iter() {
            let d = dp
                .get_entry(i, j)
                .map(|x| x.into_value())
                .unwrap_or(0.0);
            if !(a >= 0.0 && a <= d) {
                anyhow::bail!("AD[{}, {}] = {} is outside [0, DP = {}]", i, j, a, d);
            }
        }

        Ok(Self { ad, dp })
    }

    /// Build from `(site, cell, count)` triplets; duplicates are summed
    pub fn from_triplets(
        n_sites: usize,
        n_cells: usize,
        ad: &[(usize, usize, f32)],
        dp: &[(usize, usize, f32)],
    ) -> anyhow::Result<Self> {
        Self::new(
            triplets_to_csc(n_sites, n_cells, ad)?,
            triplets_to_csc(n_sites, n_cells, dp)?,
        )
    }

    pub fn ad(&self) -> &CscMat {
        &self.ad
    }

    pub fn dp(&self) -> &CscMat {
        &self.dp
    }

    pub fn num_sites(&self) -> usize {
        self.ad.nrows()
    }

    pub fn num_cells(&self) -> usize {
        self.ad.ncols()
    }
}

fn triplets_to_csc(
    nrow: usize,
    ncol: usize,
    triplets: &[(usize, usize, f32)],
) -> anyhow::Result<CscMat> {
    let rows = triplets.iter().map(|t| t.0).collect::<Vec<_>>();
    let cols = triplets.iter().map(|t| t.1).collect::<Vec<_>>();
    let vals = triplets.iter().map(|t| t.2).collect::<Vec<_>>();
    let coo = CooMatrix::try_from_triplets(nrow, ncol, rows, cols, vals)
        .map_err(|e| anyhow::anyhow!("invalid count triplets: {}", e))?;
    Ok(CscMat::from(&coo))
}
