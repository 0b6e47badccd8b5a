//! Rank genes by how specifically they are expressed in one cluster.

use clap::{Parser, ValueEnum};
use single_specificity::io::{MatrixDir, read_cluster_assignment, write_report_file};
use single_specificity::testing::inference::MatrixSpecificityTests;
use single_specificity::testing::{PValueAdjustment, ScoreMode, SpecificityConfig};
use std::path::PathBuf;

/// CLI-friendly adjustment enum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliAdjustment {
    /// Running maximum over ascending rank (compatible with earlier reports)
    StepUp,
    /// Benjamini-Hochberg
    Bh,
}

impl From<CliAdjustment> for PValueAdjustment {
    fn from(adjustment: CliAdjustment) -> Self {
        match adjustment {
            CliAdjustment::StepUp => PValueAdjustment::StepUpRunningMax,
            CliAdjustment::Bh => PValueAdjustment::BenjaminiHochberg,
        }
    }
}

/// Cluster-specificity test for single-cell count matrices
#[derive(Parser)]
#[command(name = "single-specificity")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory with matrix.mtx, barcodes.tsv and genes.tsv
    #[arg(short, long)]
    matrix_dir: PathBuf,

    /// Cluster table: header line, then `barcode cluster` pairs
    #[arg(short, long)]
    clusters: PathBuf,

    /// Target cluster id
    #[arg(short = 'k', long, allow_negative_numbers = true)]
    cluster_id: i64,

    /// Score used for ordering: 1-6 or bounded, error-bounded, ratio, raw-out, nonparametric, p-value
    #[arg(long, default_value = "5")]
    mode: ScoreMode,

    /// Multiple testing adjustment
    #[arg(long, value_enum, default_value = "step-up")]
    adjustment: CliAdjustment,

    /// Output report path
    #[arg(short, long)]
    output: PathBuf,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let data = MatrixDir::load(&cli.matrix_dir)?;
    let clusters = read_cluster_assignment(&cli.clusters, &data.barcodes)?;
    log::info!(
        "Read cluster assignment: {} clusters over {} cells",
        clusters.cluster_ids().len(),
        clusters.len()
    );

    let config = SpecificityConfig::new(cli.cluster_id)
        .with_score_mode(cli.mode)
        .with_adjustment(cli.adjustment.into());

    let results = data.matrix.cluster_specificity(&clusters, &config)?;
    log::info!(
        "{} genes significant at adjusted p < 0.05",
        results.num_significant(0.05)
    );

    write_report_file(&cli.output, &data.genes, &results)?;
    Ok(())
}
