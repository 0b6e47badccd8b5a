//! In-cluster distribution fitting.
//!
//! Moments are computed from the nonzero entries of each gene only; the
//! implicit zeros are accounted for from the in-group size.

use crate::error::SpecificityError;
use crate::testing::GeneFit;
use crate::testing::utils::{ClusterPartition, GeneRows};
use nalgebra_sparse::CscMatrix;
use rayon::iter::IntoParallelIterator;
use rayon::iter::ParallelIterator;
use single_utilities::traits::FloatOpsTS;

/// Relative floor of the variance over the mean, keeping the negative binomial
/// success probability inside (0, 1).
pub const VARIANCE_FLOOR_RATIO: f64 = 1e-5;

/// Fit the in-cluster mean and variance of every gene.
///
/// # Arguments
///
/// * `matrix` - Sparse count matrix (genes × cells)
/// * `partition` - In/out membership of the cells for the target cluster
///
/// # Returns
///
/// One `GeneFit` per gene. Fails when the cluster has fewer than two cells.
pub fn fit_cluster_distribution<T>(
    matrix: &CscMatrix<T>,
    partition: &ClusterPartition,
) -> anyhow::Result<Vec<GeneFit>>
where
    T: FloatOpsTS,
{
    if matrix.ncols() != partition.n_cells() {
        return Err(SpecificityError::DimensionMismatch {
            what: "cluster assignment",
            expected: matrix.ncols(),
            actual: partition.n_cells(),
        }
        .into());
    }

    let rows = GeneRows::from_csc(matrix)?;
    fit_gene_rows(&rows, partition)
}

pub(crate) fn fit_gene_rows(
    rows: &GeneRows,
    partition: &ClusterPartition,
) -> anyhow::Result<Vec<GeneFit>> {
    if partition.total_in <= 1 {
        return Err(SpecificityError::DegenerateCluster {
            cluster_id: partition.cluster_id,
            cells: partition.total_in,
        }
        .into());
    }

    let fits = (0..rows.n_genes())
        .into_par_iter()
        .map(|gene| {
            let (cells, values) = rows.gene(gene);
            fit_gene(cells, values, partition)
        })
        .collect();

    Ok(fits)
}

/// Fit one gene from its nonzero entries. Requires `partition.total_in >= 2`.
pub fn fit_gene(cells: &[usize], values: &[f64], partition: &ClusterPartition) -> GeneFit {
    let total_in = partition.total_in as f64;

    let mut sum = 0.0;
    let mut observed = 0usize;
    for (&cell, &value) in cells.iter().zip(values) {
        if partition.is_in(cell) {
            sum += value;
            observed += 1;
        }
    }
    let mean = sum / total_in;

    let mut sum_sq_dev = 0.0;
    for (&cell, &value) in cells.iter().zip(values) {
        if partition.is_in(cell) {
            sum_sq_dev += (value - mean) * (value - mean);
        }
    }
    let implicit_zeros = (partition.total_in - observed) as f64;
    sum_sq_dev += implicit_zeros * mean * mean;

    let mut variance = sum_sq_dev / (total_in - 1.0);
    let floor = mean * (1.0 + VARIANCE_FLOOR_RATIO);
    if variance < floor {
        variance = floor;
    }

    GeneFit { mean, variance }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::utils::ClusterAssignment;
    use approx::assert_relative_eq;
    use nalgebra_sparse::CooMatrix;

    fn dense_to_csc(rows: &[Vec<f64>]) -> CscMatrix<f64> {
        let n_cells = rows[0].len();
        let mut coo = CooMatrix::new(rows.len(), n_cells);
        for (g, row) in rows.iter().enumerate() {
            for (c, &v) in row.iter().enumerate() {
                if v != 0.0 {
                    coo.push(g, c, v);
                }
            }
        }
        CscMatrix::from(&coo)
    }

    #[test]
    fn test_fit_matches_dense_sample_variance() {
        // in-group: cells 0..5
        let matrix = dense_to_csc(&[
            vec![0.0, 3.0, 0.0, 5.0, 1.0, 9.0, 9.0],
            vec![2.0, 0.0, 8.0, 0.0, 0.0, 0.0, 1.0],
        ]);
        let clusters = ClusterAssignment::new(vec![1, 1, 1, 1, 1, 0, -1]);
        let partition = clusters.partition(1).unwrap();

        let fits = fit_cluster_distribution(&matrix, &partition).unwrap();
        assert_eq!(fits.len(), 2);

        // gene 0: [0, 3, 0, 5, 1] -> mean 1.8, var 4.7
        assert_relative_eq!(fits[0].mean, 1.8, epsilon = 1e-12);
        assert_relative_eq!(fits[0].variance, 4.7, epsilon = 1e-12);

        // gene 1: [2, 0, 8, 0, 0] -> mean 2.0, var 12.0
        assert_relative_eq!(fits[1].mean, 2.0, epsilon = 1e-12);
        assert_relative_eq!(fits[1].variance, 12.0, epsilon = 1e-12);
    }

    #[test]
    fn test_fit_clamps_underdispersed_variance() {
        // constant in-group counts have zero sample variance
        let matrix = dense_to_csc(&[vec![4.0, 4.0, 4.0, 0.0], vec![0.0, 0.0, 0.0, 2.0]]);
        let clusters = ClusterAssignment::new(vec![2, 2, 2, 3]);
        let partition = clusters.partition(2).unwrap();

        let fits = fit_cluster_distribution(&matrix, &partition).unwrap();
        assert_relative_eq!(fits[0].mean, 4.0);
        assert_relative_eq!(fits[0].variance, 4.0 * (1.0 + VARIANCE_FLOOR_RATIO));
        assert!(fits[0].variance >= fits[0].mean * (1.0 + VARIANCE_FLOOR_RATIO));

        // gene absent from the cluster
        assert_eq!(fits[1].mean, 0.0);
        assert_eq!(fits[1].variance, 0.0);
        assert!(fits[1].model().is_degenerate());
    }

    #[test]
    fn test_fit_rejects_single_cell_cluster() {
        let matrix = dense_to_csc(&[vec![1.0, 2.0, 3.0]]);
        let clusters = ClusterAssignment::new(vec![0, 1, 1]);
        let partition = clusters.partition(0).unwrap();

        let err = fit_cluster_distribution(&matrix, &partition).unwrap_err();
        assert_eq!(
            err.downcast_ref::<SpecificityError>(),
            Some(&SpecificityError::DegenerateCluster {
                cluster_id: 0,
                cells: 1
            })
        );
    }

    #[test]
    fn test_fit_rejects_mismatched_assignment() {
        let matrix = dense_to_csc(&[vec![1.0, 2.0, 3.0]]);
        let clusters = ClusterAssignment::new(vec![0, 0, 1, 1]);
        let partition = clusters.partition(0).unwrap();
        assert!(fit_cluster_distribution(&matrix, &partition).is_err());
    }
}
