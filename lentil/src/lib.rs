//! Robust donor clustering on top of a variational inference engine
//!
//! Cells from pooled samples are assigned to donors by an external
//! inference engine ([`oracle::InferenceOracle`]). This crate decides
//! how to drive that engine when the number of donors, their known
//! genotypes, or both are uncertain:
//!
//! - [`flock`]: random restarts with spare clusters, prior
//!   reconciliation, and the final run
//! - [`genotype_match`]: greedy one-to-one alignment of genotype profiles
//! - [`donor_select`]: pruning an over-provisioned cluster set

pub mod common;

/// Validated allele depth / total depth count matrices
pub mod counts;

/// Per-cluster genotype probability tensors
pub mod genotype;

/// Interface to the inference engine
pub mod oracle;

pub mod donor_select;
pub mod flock;
pub mod genotype_match;

pub use counts::AlleleCounts;
pub use donor_select::{select_donors, DonorSelection, SelectMode};
pub use flock::{run_flock, FlockArgs, FlockOutcome, FlockReport, Phase};
pub use genotype::GenotypeProfiles;
pub use genotype_match::greedy_match;
pub use oracle::{InferenceOracle, OracleFit, OracleRequest};
