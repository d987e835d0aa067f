use serde::Serialize;

use crate::error::{EngineError, EngineResult};

/// Historical tail risk of one return series at a confidence level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TailRisk {
    pub confidence: f64,
    pub var: f64,
    pub cvar: f64,
}

/// Absorbs rounding in (1 - c) * T before taking the ceiling, so 5% of 20
/// observations is one and not two.
const TAIL_ROUNDING: f64 = 1e-9;

/// Number of worst observations in the tail: ceil((1 - c) * T), at least one.
fn tail_len(n: usize, confidence: f64) -> usize {
    let k = ((1.0 - confidence) * n as f64 - TAIL_ROUNDING).ceil() as usize;
    k.clamp(1, n)
}

fn sorted_returns(returns: &[f64], confidence: f64) -> EngineResult<Vec<f64>> {
    if returns.is_empty() {
        return Err(EngineError::insufficient_data(
            "no returns to compute tail risk from",
        ));
    }
    if !(confidence > 0.0 && confidence < 1.0) {
        return Err(EngineError::insufficient_data(format!(
            "confidence must lie in (0, 1), got {}",
            confidence
        )));
    }
    let mut sorted = returns.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    Ok(sorted)
}

/// Historical value at risk: the return at the edge of the worst
/// `1 - confidence` share of observations. Reported as a return, so losses
/// come out negative.
pub fn historical_var(returns: &[f64], confidence: f64) -> EngineResult<f64> {
    let sorted = sorted_returns(returns, confidence)?;
    Ok(sorted[tail_len(sorted.len(), confidence) - 1])
}

/// Expected shortfall: mean of the returns at or below the VaR cut-off.
pub fn historical_cvar(returns: &[f64], confidence: f64) -> EngineResult<f64> {
    let sorted = sorted_returns(returns, confidence)?;
    let tail = &sorted[..tail_len(sorted.len(), confidence)];
    Ok(tail.iter().sum::<f64>() / tail.len() as f64)
}

pub fn tail_risk(returns: &[f64], confidence: f64) -> EngineResult<TailRisk> {
    Ok(TailRisk {
        confidence,
        var: historical_var(returns, confidence)?,
        cvar: historical_cvar(returns, confidence)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn series() -> Vec<f64> {
        // -0.10, -0.09, ..., 0.09
        (0..20).map(|i| (i as f64 - 10.0) / 100.0).rev().collect()
    }

    #[test]
    fn var_is_the_cutoff_of_the_worst_tail() {
        // 5% of 20 observations is the single worst one
        assert_relative_eq!(historical_var(&series(), 0.95).unwrap(), -0.10);
        // 10% of 20 -> second worst
        assert_relative_eq!(historical_var(&series(), 0.90).unwrap(), -0.09);
    }

    #[test]
    fn cvar_averages_the_tail() {
        assert_relative_eq!(historical_cvar(&series(), 0.90).unwrap(), -0.095, epsilon = 1e-12);
        let t = tail_risk(&series(), 0.80).unwrap();
        assert!(t.cvar <= t.var);
        assert_relative_eq!(t.var, -0.07, epsilon = 1e-12);
    }

    #[test]
    fn short_series_still_has_a_tail() {
        assert_eq!(historical_var(&[0.02, -0.01], 0.99).unwrap(), -0.01);
        assert_eq!(historical_cvar(&[0.02, -0.01], 0.99).unwrap(), -0.01);
    }

    #[test]
    fn rejects_empty_series_and_bad_confidence() {
        assert!(historical_var(&[], 0.95).is_err());
        assert!(historical_cvar(&[0.01], 1.0).is_err());
        assert!(historical_cvar(&[0.01], f64::NAN).is_err());
    }
}
