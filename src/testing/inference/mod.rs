use crate::testing::ranking::rank_genes;
use crate::testing::utils::{ClusterAssignment, GeneRows};
use crate::testing::{ClusterSpecificityResults, GeneFit, SpecificityConfig, SpecificityResult};
use nalgebra_sparse::CscMatrix;
use single_utilities::traits::FloatOpsTS;

pub mod discrete;

pub mod parametric;

pub mod nonparametric;

/// Cluster-specificity tests on a genes × cells matrix.
pub trait MatrixSpecificityTests<T>
where
    T: FloatOpsTS,
{
    /// In-cluster mean and variance of every gene.
    fn fit_distribution(
        &self,
        clusters: &ClusterAssignment,
        cluster_id: i64,
    ) -> anyhow::Result<Vec<GeneFit>>;

    /// Adaptive-binning specificity statistics of every gene.
    fn specificity_test(
        &self,
        clusters: &ClusterAssignment,
        cluster_id: i64,
        fits: &[GeneFit],
    ) -> anyhow::Result<Vec<SpecificityResult>>;

    /// Fit, test and rank in one pass.
    fn cluster_specificity(
        &self,
        clusters: &ClusterAssignment,
        config: &SpecificityConfig,
    ) -> anyhow::Result<ClusterSpecificityResults>;
}

impl<T> MatrixSpecificityTests<T> for CscMatrix<T>
where
    T: FloatOpsTS,
{
    fn fit_distribution(
        &self,
        clusters: &ClusterAssignment,
        cluster_id: i64,
    ) -> anyhow::Result<Vec<GeneFit>> {
        let partition = clusters.partition(cluster_id)?;
        parametric::fit_cluster_distribution(self, &partition)
    }

    fn specificity_test(
        &self,
        clusters: &ClusterAssignment,
        cluster_id: i64,
        fits: &[GeneFit],
    ) -> anyhow::Result<Vec<SpecificityResult>> {
        let partition = clusters.partition(cluster_id)?;
        nonparametric::specificity_test_matrix(self, &partition, fits)
    }

    fn cluster_specificity(
        &self,
        clusters: &ClusterAssignment,
        config: &SpecificityConfig,
    ) -> anyhow::Result<ClusterSpecificityResults> {
        if clusters.len() != self.ncols() {
            return Err(crate::error::SpecificityError::DimensionMismatch {
                what: "cluster assignment",
                expected: self.ncols(),
                actual: clusters.len(),
            }
            .into());
        }

        let partition = clusters.partition(config.cluster_id)?;
        log::info!(
            "Cluster {}: {} cells in, {} cells out, {} genes",
            config.cluster_id,
            partition.total_in,
            partition.total_out,
            self.nrows()
        );

        let rows = GeneRows::from_csc(self)?;

        let fits = parametric::fit_gene_rows(&rows, &partition)?;
        log::info!("Fitted in-cluster distributions");

        let results = nonparametric::test_gene_rows(&rows, &partition, &fits)?;
        let degenerate = results.iter().filter(|r| !r.is_informative()).count();
        log::debug!(
            "{} of {} genes fell back to the degenerate model",
            degenerate,
            results.len()
        );
        log::info!("Computed specificity statistics");

        let ranking = rank_genes(&results, config.score_mode, config.adjustment)?;
        log::info!("Ranked genes by {} score", config.score_mode);

        Ok(ClusterSpecificityResults {
            cluster_id: config.cluster_id,
            total_in: partition.total_in,
            total_out: partition.total_out,
            fits,
            results,
            ranking,
            global_metadata: Default::default(),
        }
        .with_global_metadata("test_type", "adaptive_binning_specificity")
        .with_global_metadata("score_mode", config.score_mode.name())
        .with_global_metadata("adjustment", &format!("{:?}", config.adjustment)))
    }
}
