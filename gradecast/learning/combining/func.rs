/// Normalizes meta-model coefficients into shares of absolute weight that add
/// up to one. All-zero input yields all-zero shares.
#[must_use]
pub fn normalize_weights(coef: &[f64]) -> Vec<f64> {
    let total: f64 = coef.iter().map(|c| c.abs()).sum();
    if total < f64::EPSILON {
        return vec![0.0; coef.len()];
    }
    coef.iter().map(|c| c.abs() / total).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_weights_sets_unit_sum() {
        let shares = normalize_weights(&[0.6, -0.2, 0.2]);
        let sum: f64 = shares.iter().sum();
        assert!((sum - 1.0).abs() < 1e-12);
        assert!((shares[0] - 0.6).abs() < 1e-12);
        assert_eq!(normalize_weights(&[0.0, 0.0]), vec![0.0, 0.0]);
    }
}
