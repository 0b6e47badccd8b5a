use crate::error::SpecificityError;
use nalgebra_sparse::CscMatrix;
use single_utilities::traits::FloatOpsTS;
use std::cmp::Ordering;

/// Label used for cells without a cluster.
pub const UNASSIGNED: i64 = -1;

/// Largest count value accepted in the matrix. Histograms are dense up to the
/// largest count of a gene.
pub const MAX_COUNT: usize = 1 << 20;

/// Cluster label per cell, in matrix column order.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterAssignment {
    labels: Vec<i64>,
}

impl ClusterAssignment {
    pub fn new(labels: Vec<i64>) -> Self {
        ClusterAssignment { labels }
    }

    /// All cells start out unassigned.
    pub fn unassigned(n_cells: usize) -> Self {
        ClusterAssignment {
            labels: vec![UNASSIGNED; n_cells],
        }
    }

    pub fn set(&mut self, cell: usize, cluster_id: i64) {
        self.labels[cell] = cluster_id;
    }

    pub fn labels(&self) -> &[i64] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Sorted, de-duplicated cluster ids, excluding unassigned cells.
    pub fn cluster_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self
            .labels
            .iter()
            .copied()
            .filter(|&l| l != UNASSIGNED)
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// Split cells into the target cluster and everything else.
    ///
    /// Unassigned cells belong to the out-group. Both groups must be non-empty.
    pub fn partition(&self, cluster_id: i64) -> anyhow::Result<ClusterPartition> {
        let in_group: Vec<bool> = self.labels.iter().map(|&l| l == cluster_id).collect();
        let total_in = in_group.iter().filter(|&&b| b).count();
        let total_out = in_group.len() - total_in;

        if total_in == 0 {
            return Err(SpecificityError::EmptyGroup {
                cluster_id,
                group: "in",
            }
            .into());
        }
        if total_out == 0 {
            return Err(SpecificityError::EmptyGroup {
                cluster_id,
                group: "out",
            }
            .into());
        }

        Ok(ClusterPartition {
            cluster_id,
            in_group,
            total_in,
            total_out,
        })
    }
}

/// In/out membership of every cell for one target cluster.
#[derive(Debug, Clone)]
pub struct ClusterPartition {
    pub cluster_id: i64,
    in_group: Vec<bool>,
    pub total_in: usize,
    pub total_out: usize,
}

impl ClusterPartition {
    #[inline]
    pub fn is_in(&self, cell: usize) -> bool {
        self.in_group[cell]
    }

    pub fn n_cells(&self) -> usize {
        self.in_group.len()
    }
}

/// Histogram bucket of a count value; fractional counts truncate.
pub fn count_bucket(gene: usize, cell: usize, value: f64) -> Result<usize, SpecificityError> {
    if !(0.0..=MAX_COUNT as f64).contains(&value) {
        return Err(SpecificityError::InvalidCount {
            gene,
            cell,
            value,
            max: MAX_COUNT,
        });
    }
    Ok(value as usize)
}

/// Gene-major copy of a cells-by-column sparse matrix, so each gene can be
/// reduced on its own without scattering into shared per-gene buffers.
#[derive(Debug, Clone)]
pub(crate) struct GeneRows {
    offsets: Vec<usize>,
    cells: Vec<usize>,
    values: Vec<f64>,
}

impl GeneRows {
    /// Fails with `InvalidCount` on entries that are not finite, negative, or
    /// above `MAX_COUNT`.
    pub(crate) fn from_csc<T>(matrix: &CscMatrix<T>) -> Result<Self, SpecificityError>
    where
        T: FloatOpsTS,
    {
        let n_genes = matrix.nrows();
        let nnz = matrix.nnz();

        let mut offsets = vec![0usize; n_genes + 1];
        for &gene in matrix.row_indices() {
            offsets[gene + 1] += 1;
        }
        for g in 0..n_genes {
            offsets[g + 1] += offsets[g];
        }

        let mut next = offsets.clone();
        let mut cells = vec![0usize; nnz];
        let mut values = vec![0.0f64; nnz];
        for (cell, col) in matrix.col_iter().enumerate() {
            for (&gene, value) in col.row_indices().iter().zip(col.values()) {
                let value = value.to_f64().unwrap_or(f64::NAN);
                count_bucket(gene, cell, value)?;
                let slot = next[gene];
                cells[slot] = cell;
                values[slot] = value;
                next[gene] += 1;
            }
        }

        Ok(GeneRows {
            offsets,
            cells,
            values,
        })
    }

    pub(crate) fn n_genes(&self) -> usize {
        self.offsets.len() - 1
    }

    /// Cells and values of the nonzero entries of `gene`, in ascending cell order.
    #[inline]
    pub(crate) fn gene(&self, gene: usize) -> (&[usize], &[f64]) {
        let range = self.offsets[gene]..self.offsets[gene + 1];
        (&self.cells[range.clone()], &self.values[range])
    }
}

/// Indices sorted ascending by value. NaN sorts after every number and ties
/// keep index order, so the result is deterministic.
pub fn ascending_order(values: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| compare_nan_last(values[a], values[b]));
    order
}

fn compare_nan_last(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.total_cmp(&b),
    }
}
