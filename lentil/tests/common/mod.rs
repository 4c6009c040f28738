#![allow(dead_code)]

use lentil::common::{GenoTensor, Mat};
use lentil::{AlleleCounts, GenotypeProfiles, InferenceOracle, OracleFit, OracleRequest};
use ndarray::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Binomial, Distribution};
use std::sync::Mutex;

/// alternative allele rate of each genotype state (ref/ref, ref/alt, alt/alt)
pub const THETA: [f64; 3] = [0.01, 0.5, 0.99];

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// What the engine was asked to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRecord {
    pub n_donor: Option<usize>,
    pub prior_clusters: Option<usize>,
    pub init_clusters: Option<usize>,
    pub min_iter: usize,
    pub max_iter: usize,
    pub verbose: bool,
    pub check_doublet: bool,
}

impl From<&OracleRequest<'_>> for CallRecord {
    fn from(request: &OracleRequest<'_>) -> Self {
        Self {
            n_donor: request.n_donor,
            prior_clusters: request.genotype_prior.map(|gt| gt.num_clusters()),
            init_clusters: request.id_prob_init.map(|id| id.ncols()),
            min_iter: request.min_iter,
            max_iter: request.max_iter,
            verbose: request.verbose,
            check_doublet: request.check_doublet,
        }
    }
}

#[derive(Default)]
pub struct MockOptions {
    /// fail any call matching this predicate
    pub fail_when: Option<fn(&CallRecord) -> bool>,
    /// report this many clusters more than requested
    pub extra_clusters: usize,
}

/// A small binomial mixture fitted by alternating updates, recording
/// every request it receives
#[derive(Default)]
pub struct MockOracle {
    calls: Mutex<Vec<CallRecord>>,
    fitted: Mutex<Vec<(CallRecord, GenotypeProfiles)>>,
}

impl MockOracle {
    pub fn calls(&self) -> Vec<CallRecord> {
        self.calls.lock().expect("poisoned call log").clone()
    }

    /// Genotypes returned by every successful call, in completion order
    pub fn fitted(&self) -> Vec<(CallRecord, GenotypeProfiles)> {
        self.fitted.lock().expect("poisoned fit log").clone()
    }
}

impl InferenceOracle for MockOracle {
    type Options = MockOptions;

    fn run(
        &self,
        counts: &AlleleCounts,
        request: &OracleRequest,
        options: &MockOptions,
    ) -> anyhow::Result<OracleFit> {
        let record = CallRecord::from(request);
        self.calls
            .lock()
            .expect("poisoned call log")
            .push(record.clone());

        if let Some(fail) = options.fail_when {
            if fail(&record) {
                anyhow::bail!("simulated non-convergence");
            }
        }

        let kk = request
            .expected_clusters()
            .ok_or_else(|| anyhow::anyhow!("no cluster count"))?;

        let mut fit = fit_binomial_mixture(counts, kk, request)?;
        if options.extra_clusters > 0 {
            let n_cells = fit.id_prob.nrows();
            let wider = kk + options.extra_clusters;
            fit.id_prob = Mat::from_elem((n_cells, wider), 1.0 / wider as f64);
        }

        self.fitted
            .lock()
            .expect("poisoned fit log")
            .push((record, fit.gt_prob.clone()));
        Ok(fit)
    }
}

fn dense(csc: &nalgebra_sparse::CscMatrix<f32>) -> Mat {
    let mut out = Mat::zeros((csc.nrows(), csc.ncols()));
    for (i, j, &v) in csc.triplet_iter() {
        out[(i, j)] += v as f64;
    }
    out
}

fn log_sum_exp(xx: ArrayView1<f64>) -> f64 {
    let mx = xx.fold(f64::NEG_INFINITY, |a, &b| a.max(b));
    mx + xx.mapv(|x| (x - mx).exp()).sum().ln()
}

fn fit_binomial_mixture(
    counts: &AlleleCounts,
    kk: usize,
    request: &OracleRequest,
) -> anyhow::Result<OracleFit> {
    let ad = dense(counts.ad());
    let bd = dense(counts.dp()) - &ad;
    let (n_sites, n_cells) = ad.dim();
    let n_states = THETA.len();

    let ln_theta = Array1::from_iter(THETA.iter().map(|t| t.ln()));
    let ln_theta_c = Array1::from_iter(THETA.iter().map(|t| (1.0 - t).ln()));

    let log_prior = match request.genotype_prior {
        Some(prior) => prior.probs().mapv(|p| p.max(1e-10).ln()),
        None => GenoTensor::from_elem((n_sites, kk, n_states), -(n_states as f64).ln()),
    };

    let mut gt = log_prior.mapv(f64::exp);
    let mut id = match request.id_prob_init {
        Some(init) => init.clone(),
        None => Mat::from_elem((n_cells, kk), 1.0 / kk as f64),
    };

    // without a warm start, begin from the prior genotypes
    let mut skip_m_step = request.id_prob_init.is_none();
    let mut lb_list: Vec<f64> = vec![];

    for iter in 0..request.max_iter.max(1) {
        if !skip_m_step {
            let e_alt = ad.dot(&id);
            let e_ref = bd.dot(&id);
            for s in 0..n_sites {
                for k in 0..kk {
                    let mut log_post = Array1::<f64>::zeros(n_states);
                    for g in 0..n_states {
                        log_post[g] = log_prior[(s, k, g)]
                            + e_alt[(s, k)] * ln_theta[g]
                            + e_ref[(s, k)] * ln_theta_c[g];
                    }
                    let lse = log_sum_exp(log_post.view());
                    for g in 0..n_states {
                        gt[(s, k, g)] = (log_post[g] - lse).exp();
                    }
                }
            }
        }
        skip_m_step = false;

        let w_alt = Mat::from_shape_fn((n_sites, kk), |(s, k)| {
            (0..n_states).map(|g| gt[(s, k, g)] * ln_theta[g]).sum::<f64>()
        });
        let w_ref = Mat::from_shape_fn((n_sites, kk), |(s, k)| {
            (0..n_states).map(|g| gt[(s, k, g)] * ln_theta_c[g]).sum::<f64>()
        });
        let loglik = ad.t().dot(&w_alt) + bd.t().dot(&w_ref) - (kk as f64).ln();

        let mut lb = 0.0;
        for (c, ll_c) in loglik.rows().into_iter().enumerate() {
            let lse = log_sum_exp(ll_c);
            lb += lse;
            for k in 0..kk {
                id[(c, k)] = (ll_c[k] - lse).exp();
            }
        }

        // the trace reports the best bound so far
        let prev = lb_list.last().copied();
        lb_list.push(prev.map_or(lb, |p| p.max(lb)));

        if iter + 1 >= request.min_iter {
            if let Some(p) = prev {
                if (lb - p).abs() < 1e-6 {
                    break;
                }
            }
        }
    }

    Ok(OracleFit {
        id_prob: id,
        gt_prob: GenotypeProfiles::new(gt)?,
        lb_list,
        theta_shapes: Some(array![[0.3, 29.7], [3.0, 3.0], [29.7, 0.3]]),
    })
}

/// Simulated pool of cells from donors with random genotypes
pub struct Simulated {
    pub counts: AlleleCounts,
    /// one-hot true genotypes (sites × donors × states)
    pub genotypes: GenotypeProfiles,
    pub donor_of_cell: Vec<usize>,
}

/// Simulate `cells_per_donor[d]` cells from each donor `d`
pub fn simulate(
    n_sites: usize,
    cells_per_donor: &[usize],
    depth: u64,
    seed: u64,
) -> anyhow::Result<Simulated> {
    let mut rng = StdRng::seed_from_u64(seed);
    let n_donors = cells_per_donor.len();

    let mut genotypes = GenoTensor::zeros((n_sites, n_donors, THETA.len()));
    let mut state = vec![vec![0; n_donors]; n_sites];
    for (s, state_s) in state.iter_mut().enumerate() {
        for (d, g) in state_s.iter_mut().enumerate() {
            *g = rng.random_range(0..THETA.len());
            genotypes[(s, d, *g)] = 1.0;
        }
    }

    let donor_of_cell: Vec<usize> = cells_per_donor
        .iter()
        .enumerate()
        .flat_map(|(d, &n)| std::iter::repeat(d).take(n))
        .collect();

    let mut ad = vec![];
    let mut dp = vec![];
    for (c, &d) in donor_of_cell.iter().enumerate() {
        for (s, state_s) in state.iter().enumerate() {
            let total = rng.random_range(1..=depth);
            let alt = Binomial::new(total, THETA[state_s[d]])?.sample(&mut rng);
            dp.push((s, c, total as f32));
            if alt > 0 {
                ad.push((s, c, alt as f32));
            }
        }
    }

    Ok(Simulated {
        counts: AlleleCounts::from_triplets(n_sites, donor_of_cell.len(), &ad, &dp)?,
        genotypes: GenotypeProfiles::new(genotypes)?,
        donor_of_cell,
    })
}
