//! # single-specificity
//!
//! Cluster-specificity testing for single-cell data, part of the single-rust ecosystem.
//!
//! For every gene of a sparse genes × cells count matrix this crate asks whether the counts
//! inside one cluster are distributed differently from the counts in all other cells. The
//! in-cluster counts are fitted with a negative binomial, count values are merged into bins
//! holding enough model probability mass, and the binned in/out histograms are compared with
//! harmonic means. The resulting divergence is calibrated against a moment-matched Beta null.
//!
//! ## Core Features
//!
//! - **Distribution fitting**: in-cluster mean and variance from sparse entries only
//! - **Adaptive-binning test**: three divergence statistics and a Beta-null p-value per gene
//! - **Ranking**: six score modes, stable orderings and step-up p-value adjustment
//! - **Sparse Matrix Support**: works on `CscMatrix` from nalgebra-sparse, parallel across genes
//!
//! ## Quick Start
//!
//! Use the [`testing::inference::MatrixSpecificityTests`] trait on a `CscMatrix` together with a
//! [`testing::utils::ClusterAssignment`], or run the `single-specificity` binary on a matrix
//! directory.
//!
//! ## Module Organization
//!
//! - **[`testing`]**: Fitting, the specificity test, scores, ranking and p-value adjustment
//! - **[`io`]**: Barcode, cluster and gene readers, matrix loading and the report writer
//! - **[`error`]**: Error taxonomy

pub mod error;
pub mod io;
pub mod testing;
