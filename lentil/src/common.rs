pub use log::{debug, info};

pub use ndarray::prelude::*;
pub use rayon::prelude::*;

pub use indicatif::ParallelProgressIterator;

pub use matrix_util::traits::{MatOps, ProfileOps, SampleOps};
pub use matrix_util::utils::{argmax, argsort_descending, median};

/// cells × clusters soft assignment (`ID_prob`)
pub type Mat = Array2<f64>;
pub type DVec = Array1<f64>;

/// sites × clusters × genotype states
pub type GenoTensor = Array3<f64>;

/// sites × cells allele depth counts
pub type CscMat = nalgebra_sparse::CscMatrix<f32>;

/// Floor for assignment probabilities handed back to the oracle
pub const MIN_ID_PROB: f64 = 1e-10;

/// Render `donor{k}` labels and rounded masses as two tab-separated lines
pub fn donor_mass_table(order: &[usize], mass: &DVec) -> String {
    let labels = order
        .iter()
        .map(|k| format!("donor{}", k))
        .collect::<Vec<_>>()
        .join("\t");
    let counts = order
        .iter()
        .map(|&k| format!("{:.0}", mass[k]))
        .collect::<Vec<_>>()
        .join("\t");
    format!("{}\n{}", labels, counts)
}
