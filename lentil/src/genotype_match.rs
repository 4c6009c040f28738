//! Greedy one-to-one alignment of two sets of genotype profiles
//!
//! The assignment repeatedly takes the globally closest remaining
//! (reference, candidate) pair and retires both. It never revisits an
//! earlier choice, so the total cost is not guaranteed to be minimal.

use crate::common::*;
use crate::genotype::GenotypeProfiles;

/// `reference clusters × candidate clusters` matrix of mean absolute
/// differences between profiles
pub fn profile_distance_matrix(
    reference: &GenotypeProfiles,
    candidate: &GenotypeProfiles,
) -> anyhow::Result<Mat> {
    reference.distance_matrix(candidate)
}

/// Map each reference cluster to a distinct candidate cluster
///
/// Returns `assignment` with `assignment[i]` the candidate matched to
/// reference cluster `i`. Ties between equally close pairs resolve to
/// the first one in row-major order.
pub fn greedy_match(
    reference: &GenotypeProfiles,
    candidate: &GenotypeProfiles,
) -> anyhow::Result<Vec<usize>> {
    let (n_ref, n_cand) = (reference.num_clusters(), candidate.num_clusters());
    if n_cand < n_ref {
        anyhow::bail!(
            "cannot match {} reference clusters to only {} candidates",
            n_ref,
            n_cand
        );
    }

    let cost = profile_distance_matrix(reference, candidate)?;
    Ok(greedy_assign(&cost))
}

/// Greedy assignment on a precomputed cost matrix with `nrows <= ncols`
pub fn greedy_assign(cost: &Mat) -> Vec<usize> {
    let (n_ref, n_cand) = cost.dim();
    debug_assert!(n_ref <= n_cand);

    // retired rows and columns are pushed above every real cost
    let sentinel = cost.iter().copied().fold(f64::NEG_INFINITY, f64::max) + 1.0;
    let mut masked = cost.clone();
    let mut assignment: Vec<Option<usize>> = vec![None; n_ref];

    for _ in 0..n_ref {
        let mut best = (0, 0);
        let mut best_cost = f64::INFINITY;
        for ((i, j), &c) in masked.indexed_iter() {
            if c < best_cost {
                best_cost = c;
                best = (i, j);
            }
        }

        let (i, j) = best;
        assignment[i] = Some(j);
        masked.row_mut(i).fill(sentinel);
        masked.column_mut(j).fill(sentinel);
    }

    assignment.into_iter().flatten().collect()
}
