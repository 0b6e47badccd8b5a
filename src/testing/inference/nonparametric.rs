//! Adaptive-binning specificity test.
//!
//! Each gene's counts are histogrammed separately for in-cluster and
//! out-of-cluster cells. Consecutive count values are merged until the fitted
//! negative binomial assigns enough probability mass to the merged bin, and
//! the observed fractions in each bin are compared with harmonic means.

use crate::error::SpecificityError;
use crate::testing::inference::discrete::NegBinomialModel;
use crate::testing::utils::{ClusterPartition, GeneRows, count_bucket};
use crate::testing::{GeneFit, SpecificityResult};
use nalgebra_sparse::CscMatrix;
use rayon::iter::IntoParallelIterator;
use rayon::iter::ParallelIterator;
use single_utilities::traits::FloatOpsTS;
use statrs::distribution::{Beta, ContinuousCDF};

/// Operands below this make the harmonic mean zero.
pub const HARMONIC_EPS: f64 = 1e-50;

/// Run the specificity test for every gene.
///
/// # Arguments
///
/// * `matrix` - Sparse count matrix (genes × cells)
/// * `partition` - In/out membership of the cells for the target cluster
/// * `fits` - In-cluster fits, one per gene
///
/// # Returns
///
/// Vector of `SpecificityResult`, one per gene.
pub fn specificity_test_matrix<T>(
    matrix: &CscMatrix<T>,
    partition: &ClusterPartition,
    fits: &[GeneFit],
) -> anyhow::Result<Vec<SpecificityResult>>
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
    test_gene_rows(&rows, partition, fits)
}

pub(crate) fn test_gene_rows(
    rows: &GeneRows,
    partition: &ClusterPartition,
    fits: &[GeneFit],
) -> anyhow::Result<Vec<SpecificityResult>> {
    if fits.len() != rows.n_genes() {
        return Err(SpecificityError::DimensionMismatch {
            what: "gene fits",
            expected: rows.n_genes(),
            actual: fits.len(),
        }
        .into());
    }

    let thresholds = BinThresholds::new(partition.total_in, partition.total_out);

    (0..rows.n_genes())
        .into_par_iter()
        .map(|gene| -> anyhow::Result<SpecificityResult> {
            let (cells, values) = rows.gene(gene);
            let histogram = CountHistogram::from_entries(gene, cells, values, partition)?;
            Ok(specificity_test_gene(&histogram, &thresholds, fits[gene].model()))
        })
        .collect()
}

/// Per-gene histogram of count values, split by group.
///
/// `bins()[v]` holds the number of in-group and out-group cells with count `v`.
#[derive(Debug, Clone, PartialEq)]
pub struct CountHistogram {
    bins: Vec<(usize, usize)>,
    total_in: usize,
    total_out: usize,
}

impl CountHistogram {
    /// Build from the nonzero entries of `gene`; the zero bin is derived from the group sizes.
    ///
    /// Values outside `[0, MAX_COUNT]` or not finite are rejected with `InvalidCount`.
    pub fn from_entries(
        gene: usize,
        cells: &[usize],
        values: &[f64],
        partition: &ClusterPartition,
    ) -> Result<Self, SpecificityError> {
        let mut bins: Vec<(usize, usize)> = vec![(0, 0)];

        for (&cell, &value) in cells.iter().zip(values) {
            let count = count_bucket(gene, cell, value)?;
            if count == 0 {
                continue;
            }
            if count >= bins.len() {
                bins.resize(count + 1, (0, 0));
            }
            if partition.is_in(cell) {
                bins[count].0 += 1;
            } else {
                bins[count].1 += 1;
            }
        }

        let (nonzero_in, nonzero_out) = bins[1..]
            .iter()
            .fold((0, 0), |(a, b), &(i, o)| (a + i, b + o));
        bins[0] = (
            partition.total_in.saturating_sub(nonzero_in),
            partition.total_out.saturating_sub(nonzero_out),
        );

        Ok(CountHistogram {
            bins,
            total_in: partition.total_in,
            total_out: partition.total_out,
        })
    }

    pub fn bins(&self) -> &[(usize, usize)] {
        &self.bins
    }

    pub fn max_count(&self) -> usize {
        self.bins.len() - 1
    }

    pub fn totals(&self) -> (usize, usize) {
        (self.total_in, self.total_out)
    }
}

/// Minimum model mass a merged bin needs before it closes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BinThresholds {
    pub in_group: f64,
    pub out_group: f64,
    pub combined: f64,
}

impl BinThresholds {
    pub fn new(total_in: usize, total_out: usize) -> Self {
        let in_group = bin_threshold(total_in);
        let out_group = bin_threshold(total_out);
        BinThresholds {
            in_group,
            out_group,
            combined: in_group.max(out_group),
        }
    }
}

/// `max(min(n, 5), n^0.6) / n`: larger groups tolerate finer bins.
pub fn bin_threshold(n: usize) -> f64 {
    let n = n as f64;
    n.min(5.0).max(n.powf(0.6)) / n
}

/// `2ab / (a + b)`, or zero when either operand is below `HARMONIC_EPS`.
#[inline]
pub fn harmonic_mean(a: f64, b: f64) -> f64 {
    if a.min(b) < HARMONIC_EPS {
        return 0.0;
    }
    2.0 * a * b / (a + b)
}

/// Running sums of one bin that is still open.
#[derive(Debug, Default)]
struct OpenBin {
    first: f64,
    second: f64,
    mass: f64,
}

impl OpenBin {
    /// Close the bin comparing the two observed fractions.
    fn take(&mut self) -> f64 {
        let value = harmonic_mean(self.first, self.second);
        *self = OpenBin::default();
        value
    }

    /// Close the bin comparing the observed fraction with the model mass.
    fn take_against_model(&mut self) -> f64 {
        let value = harmonic_mean(self.first, self.mass);
        *self = OpenBin::default();
        value
    }
}

/// Compute the three divergences and the null p-value of one gene.
pub fn specificity_test_gene(
    histogram: &CountHistogram,
    thresholds: &BinThresholds,
    model: NegBinomialModel,
) -> SpecificityResult {
    let (total_in, total_out) = histogram.totals();
    let n_in = total_in as f64;
    let n_out = total_out as f64;
    let bins = histogram.bins();
    // one value past the largest observed count
    let prob = model.pmf(histogram.max_count() + 2);

    // in-group vs model, out-group vs model, in-group vs out-group
    let mut side_in = OpenBin::default();
    let mut side_out = OpenBin::default();
    let mut both = OpenBin::default();

    let mut stat_in = 0.0;
    let mut stat_out = 0.0;
    let mut stat_combined = 0.0;
    let mut bin_count = 0usize;

    for (j, &(count_in, count_out)) in bins.iter().enumerate() {
        let frac_in = count_in as f64 / n_in;
        let frac_out = count_out as f64 / n_out;

        side_in.first += frac_in;
        side_out.first += frac_out;
        both.first += frac_in;
        both.second += frac_out;

        side_in.mass += prob[j];
        side_out.mass += prob[j];
        both.mass += prob[j];

        if side_in.mass >= thresholds.in_group {
            stat_in += side_in.take_against_model();
        }
        if side_out.mass >= thresholds.out_group {
            stat_out += side_out.take_against_model();
        }
        if both.mass > thresholds.combined {
            stat_combined += both.take();
            bin_count += 1;
        }
    }

    stat_in += side_in.take_against_model();
    stat_out += side_out.take_against_model();
    stat_combined += both.take();

    let p_value = beta_null_p_value(stat_combined, bin_count, total_in, total_out);

    SpecificityResult {
        stat_in,
        stat_out,
        stat_combined,
        p_value,
        bin_count,
        model,
    }
}

/// Moment-matched Beta parameters of `stat_combined` under equal in/out
/// distributions, or `None` when they do not define a Beta distribution.
pub fn beta_null_shapes(bin_count: usize, total_in: usize, total_out: usize) -> Option<(f64, f64)> {
    if bin_count == 0 {
        return None;
    }

    let bins = bin_count as f64;
    let inv_sizes = 1.0 / total_in as f64 + 1.0 / total_out as f64;
    let mean = 0.25 * bins * inv_sizes;
    let var = 0.125 * bins * inv_sizes * inv_sizes;

    let scale = mean * (1.0 - mean) / var - 1.0;
    let shape1 = (1.0 - mean) * scale;
    let shape2 = mean * scale;

    if shape1.is_finite() && shape2.is_finite() && shape1 > 0.0 && shape2 > 0.0 {
        Some((shape1, shape2))
    } else {
        None
    }
}

/// `P(Beta(shape1, shape2) <= stat_combined)`. Without a usable null (no closed
/// bins, or moments outside the Beta family) the p-value is 1.
pub fn beta_null_p_value(
    stat_combined: f64,
    bin_count: usize,
    total_in: usize,
    total_out: usize,
) -> f64 {
    let Some((shape1, shape2)) = beta_null_shapes(bin_count, total_in, total_out) else {
        return 1.0;
    };

    match Beta::new(shape1, shape2) {
        Ok(beta) => beta.cdf(stat_combined.clamp(0.0, 1.0)),
        Err(_) => 1.0,
    }
}
