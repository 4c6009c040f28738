//! Per-cluster genotype probability profiles (`GT_prob`, `GT_prior`)

use crate::common::*;

const SUM_TOLERANCE: f64 = 1e-6;

/// A `(sites × clusters × states)` tensor whose `(site, cluster)` slices
/// are categorical distributions over genotype states
#[derive(Debug, Clone, PartialEq)]
pub struct GenotypeProfiles {
    probs: GenoTensor,
}

impl GenotypeProfiles {
    /// Wrap `probs` after checking it is non-empty, non-negative, and
    /// sums to one over the state axis
    pub fn new(probs: GenoTensor) -> anyhow::Result<Self> {
        let (n_sites, n_clusters, n_states) = probs.dim();
        if n_sites == 0 || n_clusters == 0 || n_states == 0 {
            anyhow::bail!(
                "empty genotype tensor ({} sites, {} clusters, {} states)",
                n_sites,
                n_clusters,
                n_states
            );
        }

        if probs.iter().any(|&p| !(p >= 0.0 && p.is_finite())) {
            anyhow::bail!("genotype probabilities must be finite and non-negative");
        }

        let sums = probs.state_sums();
        if let Some(((s, k), tot)) = sums
            .indexed_iter()
            .find(|(_, &tot)| (tot - 1.0).abs() > SUM_TOLERANCE)
        {
            anyhow::bail!(
                "genotype probabilities at site {}, cluster {} sum to {}",
                s,
                k,
                tot
            );
        }

        Ok(Self { probs })
    }

    pub fn probs(&self) -> &GenoTensor {
        &self.probs
    }

    pub fn into_inner(self) -> GenoTensor {
        self.probs
    }

    pub fn num_sites(&self) -> usize {
        self.probs.dim().0
    }

    pub fn num_clusters(&self) -> usize {
        self.probs.dim().1
    }

    pub fn num_states(&self) -> usize {
        self.probs.dim().2
    }

    /// Keep the clusters listed in `clusters`, in that order
    pub fn select_clusters(&self, clusters: &[usize]) -> anyhow::Result<Self> {
        if let Some(&k) = clusters.iter().find(|&&k| k >= self.num_clusters()) {
            anyhow::bail!(
                "cluster {} out of range for {} clusters",
                k,
                self.num_clusters()
            );
        }
        Ok(Self {
            probs: self.probs.select(Axis(1), clusters),
        })
    }

    /// Mean absolute difference between cluster `i` here and cluster `j`
    /// of `other`
    pub fn distance(&self, i: usize, other: &Self, j: usize) -> anyhow::Result<f64> {
        self.probs.mean_abs_diff_slices(i, &other.probs, j)
    }

    /// `self clusters × other clusters` matrix of [`Self::distance`]
    pub fn distance_matrix(&self, other: &Self) -> anyhow::Result<Mat> {
        self.check_compatible(other)?;
        let mut dist = Mat::zeros((self.num_clusters(), other.num_clusters()));
        for ((i, j), d_ij) in dist.indexed_iter_mut() {
            *d_ij = self.distance(i, other, j)?;
        }
        Ok(dist)
    }

    /// Fail unless `other` shares the site and state axes
    pub fn check_compatible(&self, other: &Self) -> anyhow::Result<()> {
        if self.num_sites() != other.num_sites() || self.num_states() != other.num_states() {
            anyhow::bail!(
                "genotype tensors disagree: {:?} vs {:?}",
                self.probs.dim(),
                other.probs.dim()
            );
        }
        Ok(())
    }
}
