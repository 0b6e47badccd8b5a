//! Multiple testing adjustments of the per-gene p-values.
//!
//! Both procedures rank p-values ascending with ties broken by gene index and
//! return adjusted values in the original gene order.

use crate::testing::PValueAdjustment;
use crate::testing::utils::ascending_order;
use anyhow::{Result, anyhow};

/// Apply the selected adjustment.
pub fn adjust_p_values(p_values: &[f64], adjustment: PValueAdjustment) -> Result<Vec<f64>> {
    match adjustment {
        PValueAdjustment::StepUpRunningMax => step_up_running_max(p_values),
        PValueAdjustment::BenjaminiHochberg => benjamini_hochberg_correction(p_values),
    }
}

fn validate(p_values: &[f64]) -> Result<()> {
    if p_values.is_empty() {
        return Err(anyhow!("Empty p-value array"));
    }

    for (i, &p) in p_values.iter().enumerate() {
        if !(0.0..=1.0).contains(&p) {
            return Err(anyhow!("Invalid p-value at index {}: {}", i, p));
        }
    }
    Ok(())
}

/// Step-up adjustment with a running maximum over ascending rank.
///
/// For rank `i` (0-based) the candidate is `min(1, p * n / (i + 1))`; the
/// adjusted value is the largest candidate seen so far. Adjusted values are
/// therefore non-decreasing with rank and never below the raw p-value.
///
/// This differs from Benjamini-Hochberg, which carries a running minimum from
/// the largest rank downwards; see [`benjamini_hochberg_correction`].
///
/// # Example
/// ```
/// use single_specificity::testing::correction::step_up_running_max;
/// let adjusted = step_up_running_max(&[0.04, 0.01, 0.03]).unwrap();
/// assert!((adjusted[1] - 0.03).abs() < 1e-12);
/// // 0.04 at rank 3 is raised to the 0.045 of rank 2
/// assert!((adjusted[0] - 0.045).abs() < 1e-12);
/// ```
pub fn step_up_running_max(p_values: &[f64]) -> Result<Vec<f64>> {
    validate(p_values)?;

    let n = p_values.len();
    let order = ascending_order(p_values);
    let mut adjusted_p_values = vec![0.0; n];
    let mut running_max = 0.0;

    for (i, &gene) in order.iter().enumerate() {
        let candidate = (p_values[gene] * n as f64 / (i + 1) as f64).min(1.0);
        if candidate >= running_max {
            running_max = candidate;
        }
        adjusted_p_values[gene] = running_max;
    }

    Ok(adjusted_p_values)
}

/// Apply Benjamini-Hochberg (BH) procedure for controlling false discovery rate
///
/// The BH procedure controls the false discovery rate (FDR), which is the expected
/// proportion of false positives among all rejected null hypotheses.
///
/// # Example
/// ```
/// use single_specificity::testing::correction::benjamini_hochberg_correction;
/// let adjusted = benjamini_hochberg_correction(&[0.01, 0.03, 0.05]).unwrap();
/// assert!((adjusted[0] - 0.03).abs() < 1e-12);
/// ```
pub fn benjamini_hochberg_correction(p_values: &[f64]) -> Result<Vec<f64>> {
    validate(p_values)?;

    let n = p_values.len();
    let order = ascending_order(p_values);
    let mut adjusted_p_values = vec![0.0; n];
    let mut current_min = 1.0;

    // Process from largest to smallest p-value
    for i in (0..n).rev() {
        let gene = order[i];
        let rank = i + 1;

        let adjustment = (p_values[gene] * n as f64 / rank as f64).min(1.0);
        current_min = adjustment.min(current_min);
        adjusted_p_values[gene] = current_min;
    }

    Ok(adjusted_p_values)
}
