use crate::error::{EngineError, EngineResult};
use crate::moments::MomentEstimate;
use crate::portfolio::{Portfolio, WeightVector};

/// 1/N baseline used as a comparison anchor.
pub fn equal_weight(moments: &MomentEstimate) -> EngineResult<Portfolio> {
    let n = moments.n_assets();
    if n < 2 {
        return Err(EngineError::insufficient_data(format!(
            "need at least 2 assets, got {}",
            n
        )));
    }
    Ok(Portfolio::evaluate(WeightVector::equal(n), moments))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn return_is_average_of_means() {
        let m = MomentEstimate::from_parts(
            array![0.01, 0.02, 0.06],
            array![[0.04, 0.0, 0.0], [0.0, 0.01, 0.0], [0.0, 0.0, 0.09]],
        )
        .unwrap();
        let p = equal_weight(&m).unwrap();
        assert!(p.weights.as_array().iter().all(|&w| w == 1.0 / 3.0));
        assert_relative_eq!(p.point.expected_return, 0.03, epsilon = 1e-15);
        assert_relative_eq!(p.point.risk, (0.14_f64 / 9.0).sqrt(), epsilon = 1e-15);
    }
}
