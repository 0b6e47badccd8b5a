//! Plain-text inputs and the ranked report.
//!
//! A matrix directory holds `matrix.mtx` (Matrix Market, genes × cells),
//! `barcodes.tsv` (one cell per line) and `genes.tsv` (one gene per line, in
//! matrix row order). The cluster table is a separate file with one header
//! line followed by whitespace-separated `barcode cluster` pairs.

use crate::error::SpecificityError;
use crate::testing::ClusterSpecificityResults;
use crate::testing::utils::ClusterAssignment;
use anyhow::{Context, anyhow};
use nalgebra_sparse::{CooMatrix, CscMatrix};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

pub const MATRIX_FILE: &str = "matrix.mtx";
pub const BARCODES_FILE: &str = "barcodes.tsv";
pub const GENES_FILE: &str = "genes.tsv";
/// Newer 10x releases name the gene list `features.tsv`.
pub const FEATURES_FILE: &str = "features.tsv";

fn open(path: &Path) -> anyhow::Result<BufReader<File>> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    Ok(BufReader::new(file))
}

/// Barcodes truncated at their first `-`, in file order. Blank lines are skipped.
pub fn parse_barcodes<R: BufRead>(reader: R) -> anyhow::Result<Vec<String>> {
    let mut barcodes = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        let barcode = match line.find('-') {
            Some(pos) => &line[..pos],
            None => line,
        };
        barcodes.push(barcode.to_string());
    }
    Ok(barcodes)
}

pub fn read_barcodes<P: AsRef<Path>>(path: P) -> anyhow::Result<Vec<String>> {
    let path = path.as_ref();
    parse_barcodes(open(path)?).with_context(|| format!("Failed to read barcodes from {}", path.display()))
}

/// Assign clusters to `barcodes` from a cluster table.
///
/// The first line is a header. Barcodes missing from `barcodes` are ignored
/// and cells never mentioned stay unassigned. When a barcode occurs twice in
/// `barcodes`, the later cell receives the cluster.
pub fn parse_cluster_assignment<R: BufRead>(
    reader: R,
    barcodes: &[String],
) -> anyhow::Result<ClusterAssignment> {
    let mut index: HashMap<&str, usize> = HashMap::with_capacity(barcodes.len());
    for (cell, barcode) in barcodes.iter().enumerate() {
        if index.insert(barcode.as_str(), cell).is_some() {
            log::warn!("Duplicate barcode {}; using its last occurrence", barcode);
        }
    }

    let lines: Vec<String> = reader.lines().skip(1).collect::<Result<_, _>>()?;

    let mut clusters = ClusterAssignment::unassigned(barcodes.len());
    let mut pending: Option<(&str, usize)> = None;
    let mut matched = 0usize;

    for (line_no, line) in lines.iter().enumerate() {
        for token in line.split_whitespace() {
            match pending.take() {
                None => pending = Some((token, line_no + 2)),
                Some((barcode, _)) => {
                    let cluster_id: i64 = token.parse().map_err(|_| SpecificityError::Parse {
                        line: line_no + 2,
                        reason: format!("invalid cluster id '{}' for barcode {}", token, barcode),
                    })?;
                    if let Some(&cell) = index.get(barcode) {
                        clusters.set(cell, cluster_id);
                        matched += 1;
                    }
                }
            }
        }
    }

    if let Some((barcode, line)) = pending {
        return Err(SpecificityError::Parse {
            line,
            reason: format!("barcode {} has no cluster id", barcode),
        }
        .into());
    }

    log::debug!("Matched {} cluster entries to {} barcodes", matched, barcodes.len());
    Ok(clusters)
}

pub fn read_cluster_assignment<P: AsRef<Path>>(
    path: P,
    barcodes: &[String],
) -> anyhow::Result<ClusterAssignment> {
    let path = path.as_ref();
    parse_cluster_assignment(open(path)?, barcodes)
        .with_context(|| format!("Failed to read clusters from {}", path.display()))
}

/// Gene names, one per line; the whole line is the name.
pub fn parse_genes<R: BufRead>(reader: R) -> anyhow::Result<Vec<String>> {
    let mut genes = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        genes.push(line.to_string());
    }
    Ok(genes)
}

pub fn read_genes<P: AsRef<Path>>(path: P) -> anyhow::Result<Vec<String>> {
    let path = path.as_ref();
    parse_genes(open(path)?).with_context(|| format!("Failed to read genes from {}", path.display()))
}

/// Load a Matrix Market coordinate file as a genes × cells matrix.
///
/// Both `real` files and the `integer` files written by Cell Ranger are
/// accepted; integer entries are converted to `f64`.
pub fn read_matrix_market<P: AsRef<Path>>(path: P) -> anyhow::Result<CscMatrix<f64>> {
    let path = path.as_ref();
    let load_error = |e: nalgebra_sparse::io::MatrixMarketError| anyhow!("Failed to load matrix from {}: {}", path.display(), e);

    let coo = match matrix_market_field(path)?.as_str() {
        "integer" => {
            let counts = nalgebra_sparse::io::load_coo_from_matrix_market_file::<i64, _>(path)
                .map_err(load_error)?;
            let mut coo = CooMatrix::new(counts.nrows(), counts.ncols());
            for (row, col, &value) in counts.triplet_iter() {
                coo.push(row, col, value as f64);
            }
            coo
        }
        _ => nalgebra_sparse::io::load_coo_from_matrix_market_file::<f64, _>(path).map_err(load_error)?,
    };

    Ok(CscMatrix::from(&coo))
}

/// Lowercased field type (`real`, `integer`, ...) from the `%%MatrixMarket` banner.
fn matrix_market_field(path: &Path) -> anyhow::Result<String> {
    let mut banner = String::new();
    open(path)?
        .read_line(&mut banner)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let field = banner
        .split_whitespace()
        .nth(3)
        .ok_or_else(|| SpecificityError::Parse {
            line: 1,
            reason: format!("malformed Matrix Market banner in {}", path.display()),
        })?;
    Ok(field.to_ascii_lowercase())
}

/// Matrix, barcodes and genes of one matrix directory.
#[derive(Debug, Clone)]
pub struct MatrixDir {
    pub matrix: CscMatrix<f64>,
    pub barcodes: Vec<String>,
    pub genes: Vec<String>,
}

impl MatrixDir {
    /// Load `dir` and check that barcodes and genes match the matrix shape.
    pub fn load<P: AsRef<Path>>(dir: P) -> anyhow::Result<Self> {
        let dir = dir.as_ref();

        let matrix = read_matrix_market(dir.join(MATRIX_FILE))?;
        let barcodes = read_barcodes(dir.join(BARCODES_FILE))?;
        let genes = read_genes(gene_list_path(dir))?;

        if barcodes.len() != matrix.ncols() {
            return Err(SpecificityError::DimensionMismatch {
                what: "barcodes",
                expected: matrix.ncols(),
                actual: barcodes.len(),
            }
            .into());
        }
        if genes.len() != matrix.nrows() {
            return Err(SpecificityError::DimensionMismatch {
                what: "genes",
                expected: matrix.nrows(),
                actual: genes.len(),
            }
            .into());
        }

        log::info!(
            "Loaded {} genes x {} cells ({} nonzero) from {}",
            matrix.nrows(),
            matrix.ncols(),
            matrix.nnz(),
            dir.display()
        );

        Ok(MatrixDir {
            matrix,
            barcodes,
            genes,
        })
    }
}

fn gene_list_path(dir: &Path) -> PathBuf {
    let genes = dir.join(GENES_FILE);
    if genes.exists() {
        genes
    } else {
        dir.join(FEATURES_FILE)
    }
}

/// Write one line per gene in score order:
/// `gene score mean variance stat_in stat_out stat_combined p_value adjusted_p_value`.
pub fn write_report<W: Write>(
    writer: &mut W,
    genes: &[String],
    results: &ClusterSpecificityResults,
) -> anyhow::Result<()> {
    if genes.len() != results.n_genes() {
        return Err(SpecificityError::DimensionMismatch {
            what: "genes",
            expected: results.n_genes(),
            actual: genes.len(),
        }
        .into());
    }

    let ranking = &results.ranking;
    for &gene in &ranking.score_order {
        let fit = &results.fits[gene];
        let res = &results.results[gene];
        writeln!(
            writer,
            "{} {} {} {} {} {} {} {} {}",
            genes[gene],
            ranking.scores[gene],
            fit.mean,
            fit.variance,
            res.stat_in,
            res.stat_out,
            res.stat_combined,
            res.p_value,
            ranking.adjusted_p_values[gene]
        )?;
    }
    Ok(())
}

pub fn write_report_file<P: AsRef<Path>>(
    path: P,
    genes: &[String],
    results: &ClusterSpecificityResults,
) -> anyhow::Result<()> {
    let path = path.as_ref();
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    write_report(&mut writer, genes, results)?;
    writer.flush()?;
    log::info!("Wrote {} genes to {}", genes.len(), path.display());
    Ok(())
}
