//! Negative binomial count model fitted by the method of moments.

/// Negative binomial model of one gene's counts.
///
/// Moments that cannot be expressed as a negative binomial (variance not above
/// the mean, zero mean, non-finite values) yield `Degenerate`, which behaves as
/// a point mass at zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NegBinomialModel {
    Fitted {
        /// Dispersion (number of failures).
        r: f64,
        /// Success probability.
        p: f64,
    },
    Degenerate,
}

impl NegBinomialModel {
    pub fn from_moments(mean: f64, variance: f64) -> Self {
        let p = 1.0 - mean / variance;
        let r = (1.0 / p - 1.0) * mean;

        if !p.is_finite() || p <= 0.0 || p > 1.0 || r <= 0.0 || !r.is_finite() {
            return NegBinomialModel::Degenerate;
        }

        NegBinomialModel::Fitted { r, p }
    }

    /// `(r, p)`, with `(0, 0)` for the degenerate model.
    pub fn params(&self) -> (f64, f64) {
        match *self {
            NegBinomialModel::Fitted { r, p } => (r, p),
            NegBinomialModel::Degenerate => (0.0, 0.0),
        }
    }

    pub fn is_degenerate(&self) -> bool {
        matches!(self, NegBinomialModel::Degenerate)
    }

    /// Probability mass of the counts `0..k`.
    pub fn pmf(&self, k: usize) -> Vec<f64> {
        let (r, p) = self.params();
        negative_binomial_pmf(r, p, k)
    }
}

/// First `k` terms of the negative binomial pmf, `prob[i] = P(X = i)`.
///
/// Uses the recurrence `prob[i] = prob[i-1] * (i + r - 1) / i * p` from
/// `prob[0] = (1 - p)^r`. With `(r, p) = (0, 0)` all mass sits at 0.
pub fn negative_binomial_pmf(r: f64, p: f64, k: usize) -> Vec<f64> {
    let mut prob = Vec::with_capacity(k);
    if k == 0 {
        return prob;
    }

    prob.push((1.0 - p).powf(r));
    for i in 1..k {
        let i_f = i as f64;
        let next = prob[i - 1] * (i_f + r - 1.0) / i_f * p;
        prob.push(next);
    }
    prob
}
