use crate::error::SpecificityError;
use crate::testing::inference::discrete::NegBinomialModel;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

pub mod correction;
pub mod effect;
pub mod inference;
pub mod ranking;

pub mod utils;

/// How a gene's specificity score is derived from its test statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScoreMode {
    /// `1 - max(0, sqrt(1 - stat_in) - sqrt(1 - stat_out))^2`, an upper bound.
    Bounded,
    /// `1 - stat_in + stat_out`, not a metric but with bounded error.
    ErrorBounded,
    /// `stat_out / stat_in`, unbounded.
    Ratio,
    /// `stat_out` as is.
    RawOut,
    /// `stat_combined`, the cross-group divergence.
    Nonparametric,
    /// The raw p-value.
    PValue,
}

impl ScoreMode {
    pub const ALL: [ScoreMode; 6] = [
        ScoreMode::Bounded,
        ScoreMode::ErrorBounded,
        ScoreMode::Ratio,
        ScoreMode::RawOut,
        ScoreMode::Nonparametric,
        ScoreMode::PValue,
    ];

    /// Map the numeric ordering codes 1..=6 onto modes.
    pub fn from_code(code: i64) -> anyhow::Result<Self> {
        ScoreMode::ALL
            .iter()
            .copied()
            .find(|mode| mode.code() == code)
            .ok_or_else(|| SpecificityError::InvalidScoreMode(code.to_string()).into())
    }

    pub fn code(self) -> i64 {
        match self {
            ScoreMode::Bounded => 1,
            ScoreMode::ErrorBounded => 2,
            ScoreMode::Ratio => 3,
            ScoreMode::RawOut => 4,
            ScoreMode::Nonparametric => 5,
            ScoreMode::PValue => 6,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ScoreMode::Bounded => "bounded",
            ScoreMode::ErrorBounded => "error-bounded",
            ScoreMode::Ratio => "ratio",
            ScoreMode::RawOut => "raw-out",
            ScoreMode::Nonparametric => "nonparametric",
            ScoreMode::PValue => "p-value",
        }
    }
}

impl fmt::Display for ScoreMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ScoreMode {
    type Err = SpecificityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(code) = s.parse::<i64>() {
            return ScoreMode::from_code(code)
                .map_err(|_| SpecificityError::InvalidScoreMode(s.to_string()));
        }
        ScoreMode::ALL
            .iter()
            .copied()
            .find(|mode| mode.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| SpecificityError::InvalidScoreMode(s.to_string()))
    }
}

/// Multiple testing adjustment applied to the raw p-values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PValueAdjustment {
    /// `min(1, p * n / rank)` carried forward as a running maximum over
    /// ascending p-value rank. Adjusted values never decrease with rank.
    /// This is not Benjamini-Hochberg; it is kept for output compatibility.
    #[default]
    StepUpRunningMax,
    /// Conventional Benjamini-Hochberg: running minimum from the largest rank down.
    BenjaminiHochberg,
}

/// Fitted in-cluster moments of one gene.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeneFit {
    pub mean: f64,
    /// Sample variance, clamped to at least `mean * (1 + 1e-5)`.
    pub variance: f64,
}

impl GeneFit {
    pub fn model(&self) -> NegBinomialModel {
        NegBinomialModel::from_moments(self.mean, self.variance)
    }
}

/// Specificity statistics of one gene.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpecificityResult {
    /// Divergence between the in-group histogram and the fitted model.
    pub stat_in: f64,
    /// Divergence between the out-group histogram and the fitted model.
    pub stat_out: f64,
    /// Divergence between the in-group and out-group histograms.
    pub stat_combined: f64,
    /// `P(Beta(shape1, shape2) <= stat_combined)` under the moment-matched null.
    pub p_value: f64,
    /// Number of closed combined bins.
    pub bin_count: usize,
    /// Model the bins were weighted by.
    pub model: NegBinomialModel,
}

impl SpecificityResult {
    /// Whether the fitted model was usable; degenerate genes collapse to a point mass at 0.
    pub fn is_informative(&self) -> bool {
        !self.model.is_degenerate()
    }
}

/// Scores, orderings and adjusted p-values across all genes.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedGenes {
    pub mode: ScoreMode,
    pub adjustment: PValueAdjustment,
    /// Score per gene, in gene order.
    pub scores: Vec<f64>,
    /// Gene indices sorted ascending by score, ties by gene index.
    pub score_order: Vec<usize>,
    /// Gene indices sorted ascending by raw p-value, ties by gene index.
    pub p_value_order: Vec<usize>,
    /// Adjusted p-value per gene, in gene order.
    pub adjusted_p_values: Vec<f64>,
}

/// Parameters of one specificity run.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecificityConfig {
    pub cluster_id: i64,
    pub score_mode: ScoreMode,
    pub adjustment: PValueAdjustment,
}

impl SpecificityConfig {
    pub fn new(cluster_id: i64) -> Self {
        SpecificityConfig {
            cluster_id,
            score_mode: ScoreMode::Nonparametric,
            adjustment: PValueAdjustment::default(),
        }
    }

    pub fn with_score_mode(mut self, score_mode: ScoreMode) -> Self {
        self.score_mode = score_mode;
        self
    }

    pub fn with_adjustment(mut self, adjustment: PValueAdjustment) -> Self {
        self.adjustment = adjustment;
        self
    }
}

/// Everything one run produces: fits, per-gene statistics and the ranking.
#[derive(Debug, Clone)]
pub struct ClusterSpecificityResults {
    pub cluster_id: i64,
    pub total_in: usize,
    pub total_out: usize,
    pub fits: Vec<GeneFit>,
    pub results: Vec<SpecificityResult>,
    pub ranking: RankedGenes,
    /// Global metadata about the run
    pub global_metadata: HashMap<String, String>,
}

impl ClusterSpecificityResults {
    pub fn n_genes(&self) -> usize {
        self.results.len()
    }

    pub fn p_values(&self) -> Vec<f64> {
        self.results.iter().map(|r| r.p_value).collect()
    }

    pub fn with_global_metadata(mut self, key: &str, value: &str) -> Self {
        self.global_metadata
            .insert(key.to_string(), value.to_string());
        self
    }

    /// Gene indices whose adjusted p-value is below `alpha`, in gene order.
    pub fn significant_indices(&self, alpha: f64) -> Vec<usize> {
        self.ranking
            .adjusted_p_values
            .iter()
            .enumerate()
            .filter_map(|(i, &p)| if p < alpha { Some(i) } else { None })
            .collect()
    }

    pub fn num_significant(&self, alpha: f64) -> usize {
        self.significant_indices(alpha).len()
    }

    /// Genes whose fitted model collapsed to a point mass.
    pub fn degenerate_indices(&self) -> Vec<usize> {
        self.results
            .iter()
            .enumerate()
            .filter_map(|(i, r)| if r.is_informative() { None } else { Some(i) })
            .collect()
    }

    /// First `n` genes of the score order.
    pub fn top_features(&self, n: usize) -> Vec<usize> {
        self.ranking.score_order.iter().take(n).copied().collect()
    }
}
