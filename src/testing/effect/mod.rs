use crate::testing::{ScoreMode, SpecificityResult};

/// Specificity score of one gene under `mode`. Lower scores rank first.
pub fn specificity_score(result: &SpecificityResult, mode: ScoreMode) -> f64 {
    let stat_in = result.stat_in;
    let stat_out = result.stat_out;

    match mode {
        ScoreMode::Bounded => {
            let gap = ((1.0 - stat_in).sqrt() - (1.0 - stat_out).sqrt()).max(0.0);
            1.0 - gap * gap
        }
        ScoreMode::ErrorBounded => 1.0 - stat_in + stat_out,
        ScoreMode::Ratio => stat_out / stat_in,
        ScoreMode::RawOut => stat_out,
        ScoreMode::Nonparametric => result.stat_combined,
        ScoreMode::PValue => result.p_value,
    }
}

/// Scores of all genes, in gene order.
pub fn specificity_scores(results: &[SpecificityResult], mode: ScoreMode) -> Vec<f64> {
    results
        .iter()
        .map(|r| specificity_score(r, mode))
        .collect()
}
