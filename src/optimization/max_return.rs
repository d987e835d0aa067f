use crate::error::{EngineError, EngineResult};
use crate::moments::MomentEstimate;
use crate::portfolio::{Portfolio, WeightVector};

/// Maximum expected return: max mean'w s.t. Σw = 1, 0 <= w <= 1.
///
/// The objective is linear and the feasible set is the probability simplex,
/// whose vertices are the single-asset portfolios, so the linear program is
/// solved exactly by enumerating them. Ties go to the lowest asset index.
pub fn max_return(moments: &MomentEstimate) -> EngineResult<Portfolio> {
    let n = moments.n_assets();
    if n < 2 {
        return Err(EngineError::insufficient_data(format!(
            "need at least 2 assets, got {}",
            n
        )));
    }

    let mut best = 0;
    for (i, &mu) in moments.mean.iter().enumerate() {
        if !mu.is_finite() {
            return Err(EngineError::insufficient_data(format!(
                "mean return of asset {} is {}",
                i, mu
            )));
        }
        if mu > moments.mean[best] {
            best = i;
        }
    }

    Ok(Portfolio::evaluate(
        WeightVector::single_asset(n, best),
        moments,
    ))
}
