//! The variational inference engine, seen from the outside
//!
//! Any engine that fits a soft cell-to-donor assignment and per-donor
//! genotype profiles can drive the restart search by implementing
//! [`InferenceOracle`].

use crate::common::*;
use crate::counts::AlleleCounts;
use crate::genotype::GenotypeProfiles;

/// One call into the inference engine
#[derive(Debug, Clone, Copy)]
pub struct OracleRequest<'a> {
    /// Number of clusters; `None` means take it from `genotype_prior`
    pub n_donor: Option<usize>,
    pub genotype_prior: Option<&'a GenotypeProfiles>,
    /// Initial cells × clusters soft assignment
    pub id_prob_init: Option<&'a Mat>,
    pub min_iter: usize,
    pub max_iter: usize,
    pub verbose: bool,
    pub check_doublet: bool,
}

impl OracleRequest<'_> {
    /// The cluster count the engine is expected to fit
    pub fn expected_clusters(&self) -> Option<usize> {
        self.n_donor
            .or_else(|| self.genotype_prior.map(|gt| gt.num_clusters()))
    }
}

/// Result of one converged inference run
#[derive(Debug, Clone)]
pub struct OracleFit {
    /// cells × clusters, rows sum to one
    pub id_prob: Mat,
    pub gt_prob: GenotypeProfiles,
    /// evidence lower bound per iteration, non-decreasing
    pub lb_list: Vec<f64>,
    /// fitted shape parameters of the binomial rate prior (states × 2)
    pub theta_shapes: Option<Mat>,
}

impl OracleFit {
    /// The last evidence lower bound, used as the run's fitness
    pub fn final_lower_bound(&self) -> anyhow::Result<f64> {
        self.lb_list
            .last()
            .copied()
            .ok_or_else(|| anyhow::anyhow!("empty evidence lower bound trace"))
    }

    pub fn num_iterations(&self) -> usize {
        self.lb_list.len()
    }

    pub fn num_clusters(&self) -> usize {
        self.id_prob.ncols()
    }

    /// Total assignment mass per cluster
    pub fn donor_mass(&self) -> DVec {
        self.id_prob.column_sums()
    }

    /// Check the fit against what `request` asked for on `counts`
    pub fn check_shape(
        &self,
        counts: &AlleleCounts,
        request: &OracleRequest,
    ) -> anyhow::Result<()> {
        if self.lb_list.is_empty() {
            anyhow::bail!("empty evidence lower bound trace");
        }

        let (n_cells, n_clusters) = self.id_prob.dim();
        if n_cells != counts.num_cells() {
            anyhow::bail!(
                "assignment has {} cells, expected {}",
                n_cells,
                counts.num_cells()
            );
        }

        if let Some(kk) = request.expected_clusters() {
            if n_clusters != kk {
                anyhow::bail!("assignment has {} clusters, expected {}", n_clusters, kk);
            }
        }

        if self.gt_prob.num_clusters() != n_clusters
            || self.gt_prob.num_sites() != counts.num_sites()
        {
            anyhow::bail!(
                "genotype tensor {:?} does not match {} sites x {} clusters",
                self.gt_prob.probs().dim(),
                counts.num_sites(),
                n_clusters
            );
        }
        Ok(())
    }
}

/// An inference engine that fits donor clusters to allele counts
///
/// Implementations must be shareable across threads: warm-up restarts
/// call `run` concurrently on the same counts.
pub trait InferenceOracle: Sync {
    /// Engine-specific settings passed through untouched
    type Options: Sync;

    fn run(
        &self,
        counts: &AlleleCounts,
        request: &OracleRequest,
        options: &Self::Options,
    ) -> anyhow::Result<OracleFit>;
}
