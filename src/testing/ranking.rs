use crate::testing::correction::adjust_p_values;
use crate::testing::effect::specificity_scores;
use crate::testing::utils::ascending_order;
use crate::testing::{PValueAdjustment, RankedGenes, ScoreMode, SpecificityResult};

/// Score, order and adjust all genes.
///
/// `score_order` and `p_value_order` are ascending with ties broken by gene
/// index, so identical inputs always give identical rankings.
pub fn rank_genes(
    results: &[SpecificityResult],
    mode: ScoreMode,
    adjustment: PValueAdjustment,
) -> anyhow::Result<RankedGenes> {
    let scores = specificity_scores(results, mode);
    let p_values: Vec<f64> = results.iter().map(|r| r.p_value).collect();

    let score_order = ascending_order(&scores);
    let p_value_order = ascending_order(&p_values);
    // a matrix without genes ranks to empty vectors
    let adjusted_p_values = if p_values.is_empty() {
        Vec::new()
    } else {
        adjust_p_values(&p_values, adjustment)?
    };

    Ok(RankedGenes {
        mode,
        adjustment,
        scores,
        score_order,
        p_value_order,
        adjusted_p_values,
    })
}
