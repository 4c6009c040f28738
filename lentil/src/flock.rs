//! Multi-restart search over the inference engine
//!
//! Finds a clustering of exactly `n_donor` donors when the donor count,
//! the genotype prior, or both are uncertain:
//!
//! 1. **warm-up** (no prior, or fewer prior donors than `n_donor`):
//!    `n_init` random restarts with `n_extra_donor` spare clusters; the
//!    restart with the highest evidence bound is pruned to `n_donor`
//!    clusters and becomes the warm start.
//! 2. **narrowing** (more prior donors than `n_donor`): keep the prior
//!    donors that attract the most cells.
//! 3. **widening** (fewer prior donors than `n_donor`): fit without the
//!    prior, align the known donors to the inferred ones, and fill the
//!    remaining slots from inference.
//! 4. **final**: one run with the reconciled prior and the warm start.

use crate::common::*;
use crate::counts::AlleleCounts;
use crate::donor_select::{select_donors, DonorSelection, SelectMode};
use crate::genotype::GenotypeProfiles;
use crate::genotype_match::greedy_match;
use crate::oracle::{InferenceOracle, OracleFit, OracleRequest};

use anyhow::Context;
use clap::Args;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const N_EXTRA_DONOR: usize = 2;
const N_INIT: usize = 20;
const WARMUP_MIN_ITER: usize = 5;
const WARMUP_MAX_ITER: usize = 15;
const MIN_ITER: usize = 20;
const MAX_ITER: usize = 200;

#[derive(Args, Debug, Clone, PartialEq)]
pub struct FlockArgs {
    #[arg(
        short = 'N',
        long,
        help = "Number of donors",
        long_help = "Number of donors to report. \n\
		     Defaults to the number of donors in the genotype prior."
    )]
    pub n_donor: Option<usize>,

    #[arg(
        long,
        default_value_t = N_EXTRA_DONOR,
        help = "Extra clusters during warm-up",
        long_help = "Number of spare clusters fitted on top of `n_donor` during the warm-up. \n\
		     The spares are pruned away before the main run."
    )]
    pub n_extra_donor: usize,

    #[arg(
        long,
        value_enum,
        default_value = "distance",
        help = "How to prune the spare clusters (size, distance)",
        long_help = "How to prune the spare clusters after the warm-up. \n\
		     size: keep the clusters with the most cells; \n\
		     distance: keep the clusters with the most different genotypes."
    )]
    pub extra_donor_mode: SelectMode,

    #[arg(
        long,
        default_value_t = N_INIT,
        help = "Number of random initializations",
        long_help = "Number of random restarts in the warm-up. \n\
		     The restart with the highest evidence lower bound wins."
    )]
    pub n_init: usize,

    #[arg(
        long,
        default_value_t = WARMUP_MIN_ITER,
        help = "Minimum iterations per warm-up restart"
    )]
    pub warmup_min_iter: usize,

    #[arg(
        long,
        default_value_t = WARMUP_MAX_ITER,
        help = "Maximum iterations per warm-up restart"
    )]
    pub warmup_max_iter: usize,

    #[arg(
        long,
        default_value_t = MIN_ITER,
        help = "Minimum iterations of the main runs"
    )]
    pub min_iter: usize,

    #[arg(
        long,
        default_value_t = MAX_ITER,
        help = "Maximum iterations of the main runs"
    )]
    pub max_iter: usize,

    #[arg(
        long,
        help = "Random seed",
        long_help = "Random seed for the warm-up restarts. \n\
		     A seed is drawn (and logged) when omitted."
    )]
    pub seed: Option<u64>,

    #[arg(
        long,
        default_value_t = true,
        action = clap::ArgAction::Set,
        help = "Detect doublets in the main run"
    )]
    pub check_doublet: bool,

    #[arg(long, default_value_t = false, help = "Verbose inference output")]
    pub verbose: bool,
}

impl Default for FlockArgs {
    fn default() -> Self {
        Self {
            n_donor: None,
            n_extra_donor: N_EXTRA_DONOR,
            extra_donor_mode: SelectMode::Distance,
            n_init: N_INIT,
            warmup_min_iter: WARMUP_MIN_ITER,
            warmup_max_iter: WARMUP_MAX_ITER,
            min_iter: MIN_ITER,
            max_iter: MAX_ITER,
            seed: None,
            check_doublet: true,
            verbose: false,
        }
    }
}

/// Stage of the search, used to tag logs and errors
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    WarmUp,
    Narrowing,
    Widening,
    Final,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::WarmUp => "warm-up",
            Phase::Narrowing => "narrowing",
            Phase::Widening => "widening",
            Phase::Final => "final",
        };
        write!(f, "{}", name)
    }
}

/// What happened along the way to the final fit
#[derive(Debug, Clone)]
pub struct FlockReport {
    /// base seed of the warm-up restarts
    pub seed: u64,
    pub n_donor: usize,
    /// phases in execution order
    pub phases: Vec<Phase>,
    /// final evidence bound of every warm-up restart
    pub warmup_lower_bounds: Vec<f64>,
    pub warmup_winner: Option<usize>,
    /// pruning of the winning restart
    pub selection: Option<DonorSelection>,
    /// prior donors by mass (narrowing) or matched-then-unmatched
    /// inferred clusters (widening)
    pub prior_order: Option<Vec<usize>>,
    /// genotype prior handed to the final run
    pub reconciled_prior: Option<GenotypeProfiles>,
}

#[derive(Debug, Clone)]
pub struct FlockOutcome {
    pub fit: OracleFit,
    pub report: FlockReport,
}

/// Run the warm-up, prior reconciliation, and final fit
///
/// * `oracle` - inference engine
/// * `counts` - allele and total depth (sites × cells)
/// * `genotype_prior` - known donor genotypes (sites × donors × states)
/// * `args` - search settings
/// * `options` - engine settings passed through to every call
pub fn run_flock<O: InferenceOracle>(
    oracle: &O,
    counts: &AlleleCounts,
    genotype_prior: Option<&GenotypeProfiles>,
    args: &FlockArgs,
    options: &O::Options,
) -> anyhow::Result<FlockOutcome> {
    let n_donor = resolve_n_donor(args.n_donor, genotype_prior)?;

    if n_donor == 0 {
        anyhow::bail!("n_donor must be positive");
    }

    if let Some(prior) = genotype_prior {
        if prior.num_sites() != counts.num_sites() {
            anyhow::bail!(
                "genotype prior has {} sites but the counts have {}",
                prior.num_sites(),
                counts.num_sites()
            );
        }
    }

    let seed = args.seed.unwrap_or_else(|| rand::rng().random());
    info!("seed: {}", seed);

    let mut report = FlockReport {
        seed,
        n_donor,
        phases: vec![],
        warmup_lower_bounds: vec![],
        warmup_winner: None,
        selection: None,
        prior_order: None,
        reconciled_prior: None,
    };

    let n_prior = genotype_prior.map(|gt| gt.num_clusters());

    ////////////////////////////////////////////////
    // 1. warm-up with spare clusters if needed   //
    ////////////////////////////////////////////////

    let id_prob_init = if n_prior.map_or(true, |kk| n_donor > kk) {
        let warm = warm_up(oracle, counts, n_donor, seed, args, options)?;
        let id_prob = warm.selection.id_prob.clone();
        report.phases.push(Phase::WarmUp);
        report.warmup_lower_bounds = warm.lower_bounds;
        report.warmup_winner = Some(warm.winner);
        report.selection = Some(warm.selection);
        Some(id_prob)
    } else {
        None
    };

    ////////////////////////////////////////////////
    // 2-3. reconcile the prior with n_donor      //
    ////////////////////////////////////////////////

    let prior_use = match genotype_prior {
        Some(prior) if n_donor < prior.num_clusters() => {
            let (narrowed, order) =
                narrow_prior(oracle, counts, prior, n_donor, id_prob_init.as_ref(), args, options)?;
            report.phases.push(Phase::Narrowing);
            report.prior_order = Some(order);
            Some(narrowed)
        }
        Some(prior) if n_donor > prior.num_clusters() => {
            let (widened, order) =
                widen_prior(oracle, counts, prior, n_donor, id_prob_init.as_ref(), args, options)?;
            report.phases.push(Phase::Widening);
            report.prior_order = Some(order);
            Some(widened)
        }
        Some(prior) => Some(prior.clone()),
        None => None,
    };

    ////////////////////////////////////////////////
    // 4. main run                                //
    ////////////////////////////////////////////////

    info!("main run with warm initials and tuned genotype prior ...");

    let request = OracleRequest {
        n_donor: Some(n_donor),
        genotype_prior: prior_use.as_ref(),
        id_prob_init: id_prob_init.as_ref(),
        min_iter: args.min_iter,
        max_iter: args.max_iter,
        verbose: args.verbose,
        check_doublet: args.check_doublet,
    };

    let fit = call_oracle(oracle, counts, &request, options, Phase::Final)?;
    report.phases.push(Phase::Final);
    report.reconciled_prior = prior_use;

    info!(
        "main run: {} iterations; lower bound {:.1}",
        fit.num_iterations(),
        fit.final_lower_bound()?
    );

    if let Some(shapes) = fit.theta_shapes.as_ref() {
        debug!("beta parameters for binomial rate:\n{:.2}", shapes);
    }

    Ok(FlockOutcome { fit, report })
}

/// Donor count from the arguments, else from the prior's cluster axis
pub fn resolve_n_donor(
    n_donor: Option<usize>,
    genotype_prior: Option<&GenotypeProfiles>,
) -> anyhow::Result<usize> {
    match (n_donor, genotype_prior) {
        (Some(n), _) => Ok(n),
        (None, Some(prior)) => Ok(prior.num_clusters()),
        (None, None) => anyhow::bail!("donor clustering requires n_donor or a genotype prior"),
    }
}

fn call_oracle<O: InferenceOracle>(
    oracle: &O,
    counts: &AlleleCounts,
    request: &OracleRequest,
    options: &O::Options,
    phase: Phase,
) -> anyhow::Result<OracleFit> {
    let fit = oracle
        .run(counts, request, options)
        .with_context(|| format!("{} phase: inference failed", phase))?;

    fit.check_shape(counts, request)
        .with_context(|| format!("{} phase: unexpected inference output", phase))?;

    Ok(fit)
}

struct WarmUp {
    lower_bounds: Vec<f64>,
    winner: usize,
    selection: DonorSelection,
}

fn warm_up<O: InferenceOracle>(
    oracle: &O,
    counts: &AlleleCounts,
    n_donor: usize,
    seed: u64,
    args: &FlockArgs,
    options: &O::Options,
) -> anyhow::Result<WarmUp> {
    if args.n_init == 0 {
        anyhow::bail!("warm-up needs at least one random initialization");
    }

    let n_run = n_donor + args.n_extra_donor;
    let n_cells = counts.num_cells();

    info!(
        "warm-up: {} random initializations for {} clusters...",
        args.n_init, n_run
    );

    // restart `r` draws from its own generator, so the outcome does not
    // depend on how rayon schedules the restarts
    let fits = (0..args.n_init)
        .into_par_iter()
        .progress_count(args.n_init as u64)
        .map(|r| -> anyhow::Result<OracleFit> {
            let mut rng = StdRng::seed_from_u64(seed.wrapping_add(r as u64));
            let id_prob_init = Mat::runif_with(&mut rng, n_cells, n_run)?.normalize_rows()?;

            let request = OracleRequest {
                n_donor: Some(n_run),
                genotype_prior: None,
                id_prob_init: Some(&id_prob_init),
                min_iter: args.warmup_min_iter,
                max_iter: args.warmup_max_iter,
                verbose: false,
                check_doublet: false,
            };

            call_oracle(oracle, counts, &request, options, Phase::WarmUp)
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let lower_bounds = fits
        .iter()
        .map(|fit| fit.final_lower_bound())
        .collect::<anyhow::Result<Vec<_>>>()?;

    let winner = argmax(&lower_bounds)
        .ok_or_else(|| anyhow::anyhow!("warm-up phase: no restart finished"))?;

    let best = &fits[winner];
    let selection = select_donors(&best.gt_prob, &best.id_prob, n_donor, args.extra_donor_mode)
        .context("warm-up phase: donor selection failed")?;

    info!(
        "warm-up: kept {} of {} clusters from restart {}\n{}",
        n_donor,
        n_run,
        winner,
        selection.summary()
    );

    let lb_min = lower_bounds.iter().copied().fold(f64::INFINITY, f64::min);
    let lb_max = lower_bounds[winner];
    let lb_median = median(&lower_bounds).unwrap_or(lb_max);
    info!(
        "warm-up: lower bound ranges [{:.1}, {:.1}, {:.1}]",
        lb_min, lb_median, lb_max
    );

    Ok(WarmUp {
        lower_bounds,
        winner,
        selection,
    })
}

/// Keep the `n_donor` prior donors with the most assigned cells
fn narrow_prior<O: InferenceOracle>(
    oracle: &O,
    counts: &AlleleCounts,
    prior: &GenotypeProfiles,
    n_donor: usize,
    id_prob_init: Option<&Mat>,
    args: &FlockArgs,
    options: &O::Options,
) -> anyhow::Result<(GenotypeProfiles, Vec<usize>)> {
    info!(
        "pre-run: finding {} from {} donors with genotype prior ...",
        n_donor,
        prior.num_clusters()
    );

    let request = OracleRequest {
        n_donor: None,
        genotype_prior: Some(prior),
        id_prob_init,
        min_iter: args.min_iter,
        max_iter: args.max_iter,
        verbose: args.verbose,
        check_doublet: false,
    };

    let fit = call_oracle(oracle, counts, &request, options, Phase::Narrowing)?;

    let mass = fit.donor_mass();
    let order = argsort_descending(&mass.to_vec());
    info!("pre-run:\n{}", donor_mass_table(&order, &mass));

    let narrowed = prior
        .select_clusters(&order[..n_donor])
        .context("narrowing phase")?;

    Ok((narrowed, order))
}

/// Complete a partial prior with inferred donors
///
/// The known donors come first, in their original order, followed by
/// the inferred clusters that no known donor was matched to.
fn widen_prior<O: InferenceOracle>(
    oracle: &O,
    counts: &AlleleCounts,
    prior: &GenotypeProfiles,
    n_donor: usize,
    id_prob_init: Option<&Mat>,
    args: &FlockArgs,
    options: &O::Options,
) -> anyhow::Result<(GenotypeProfiles, Vec<usize>)> {
    info!(
        "pre-run: finding {} from {} donors without genotype prior ...",
        n_donor - prior.num_clusters(),
        n_donor
    );

    let request = OracleRequest {
        n_donor: Some(n_donor),
        genotype_prior: None,
        id_prob_init,
        min_iter: args.min_iter,
        max_iter: args.max_iter,
        verbose: args.verbose,
        check_doublet: args.check_doublet,
    };

    let fit = call_oracle(oracle, counts, &request, options, Phase::Widening)?;

    let matched = greedy_match(prior, &fit.gt_prob).context("widening phase")?;
    let (widened, order) =
        merge_matched_prior(prior, &fit.gt_prob, &matched).context("widening phase")?;

    let mass = fit.donor_mass();
    info!("pre-run:\n{}", donor_mass_table(&order, &mass));

    Ok((widened, order))
}

/// Overwrite inferred cluster `matched[i]` with known donor `i`, then
/// put the matched clusters first followed by the rest in index order
fn merge_matched_prior(
    prior: &GenotypeProfiles,
    inferred: &GenotypeProfiles,
    matched: &[usize],
) -> anyhow::Result<(GenotypeProfiles, Vec<usize>)> {
    prior.check_compatible(inferred)?;
    let kk = inferred.num_clusters();
    if matched.len() != prior.num_clusters() || matched.iter().any(|&j| j >= kk) {
        anyhow::bail!(
            "invalid match {:?} of {} known donors into {} clusters",
            matched,
            prior.num_clusters(),
            kk
        );
    }

    let mut merged = inferred.probs().clone();
    for (i, &j) in matched.iter().enumerate() {
        merged
            .index_axis_mut(Axis(1), j)
            .assign(&prior.probs().index_axis(Axis(1), i));
    }

    let order: Vec<usize> = matched
        .iter()
        .copied()
        .chain((0..kk).filter(|k| !matched.contains(k)))
        .collect();

    Ok((GenotypeProfiles::new(merged.select(Axis(1), &order))?, order))
}
