//! Prune an over-provisioned set of clusters down to the donors to keep

use crate::common::*;
use crate::genotype::GenotypeProfiles;

/// How to choose which clusters survive
#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SelectMode {
    /// keep the clusters with the most assigned cells
    Size,
    /// keep clusters whose genotypes differ the most from each other
    #[default]
    Distance,
}

/// Outcome of a donor selection
#[derive(Debug, Clone)]
pub struct DonorSelection {
    /// Clusters in the order they were ranked; only the first `n_donor`
    /// are kept
    pub ranking: Vec<usize>,
    /// Total assignment mass of every input cluster
    pub mass: DVec,
    /// Assignment restricted to the kept clusters, floored at
    /// [`MIN_ID_PROB`]
    pub id_prob: Mat,
    pub n_donor: usize,
}

impl DonorSelection {
    /// The kept cluster indices
    pub fn selected(&self) -> &[usize] {
        &self.ranking[..self.n_donor]
    }

    /// Ranked cluster labels over their rounded assignment mass
    pub fn summary(&self) -> String {
        donor_mass_table(&self.ranking, &self.mass)
    }
}

/// Select `n_donor` of the clusters in `gt_prob` / `id_prob`
///
/// * `gt_prob` - sites × K × states profiles
/// * `id_prob` - cells × K soft assignment
pub fn select_donors(
    gt_prob: &GenotypeProfiles,
    id_prob: &Mat,
    n_donor: usize,
    mode: SelectMode,
) -> anyhow::Result<DonorSelection> {
    let kk = id_prob.ncols();
    if gt_prob.num_clusters() != kk {
        anyhow::bail!(
            "genotype tensor has {} clusters but the assignment has {}",
            gt_prob.num_clusters(),
            kk
        );
    }
    if n_donor == 0 || n_donor > kk {
        anyhow::bail!("cannot select {} donors out of {} clusters", n_donor, kk);
    }

    let mass = id_prob.column_sums();

    let ranking = match mode {
        SelectMode::Size => rank_by_size(&mass),
        SelectMode::Distance => rank_by_diversity(gt_prob, &mass)?,
    };

    let id_prob = id_prob
        .select(Axis(1), &ranking[..n_donor])
        .clamp_min(MIN_ID_PROB);

    Ok(DonorSelection {
        ranking,
        mass,
        id_prob,
        n_donor,
    })
}

/// All clusters by descending mass, ties in index order
pub fn rank_by_size(mass: &DVec) -> Vec<usize> {
    argsort_descending(&mass.to_vec())
}

/// Greedy max-min diversification over all clusters
///
/// Starts from the heaviest cluster, then repeatedly appends the
/// remaining cluster whose smallest distance to the clusters chosen so
/// far is largest.
pub fn rank_by_diversity(
    gt_prob: &GenotypeProfiles,
    mass: &DVec,
) -> anyhow::Result<Vec<usize>> {
    let kk = gt_prob.num_clusters();
    let Some(first) = argmax(&mass.to_vec()) else {
        return Ok(vec![]);
    };

    let dist = gt_prob.distance_matrix(gt_prob)?;

    let mut ranking = vec![first];
    let mut remaining: Vec<usize> = (0..kk).filter(|&k| k != first).collect();

    // closest chosen cluster for each remaining one
    let mut min_dist: Vec<f64> = remaining.iter().map(|&k| dist[(first, k)]).collect();

    while !remaining.is_empty() {
        let Some(pos) = argmax(&min_dist) else {
            break;
        };
        let chosen = remaining.remove(pos);
        min_dist.remove(pos);
        ranking.push(chosen);

        for (d, &k) in min_dist.iter_mut().zip(remaining.iter()) {
            *d = d.min(dist[(chosen, k)]);
        }
    }

    Ok(ranking)
}
