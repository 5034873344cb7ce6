//! Returns, rate of change and rolling beta against a benchmark.

/// One-period percentage change; NaN at index 0 or across missing values.
pub fn pct_change(values: &[f64]) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    for i in 1..values.len() {
        let (prev, curr) = (values[i - 1], values[i]);
        if prev.is_finite() && curr.is_finite() && prev != 0.0 {
            out[i] = curr / prev - 1.0;
        }
    }
    out
}

/// Rate of change over `period` bars, as a fraction.
pub fn roc_of_series(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    for i in period..values.len() {
        let (prev, curr) = (values[i - period], values[i]);
        if prev.is_finite() && curr.is_finite() && prev != 0.0 {
            out[i] = curr / prev - 1.0;
        }
    }
    out
}

/// Rolling beta of `asset` returns against `benchmark` returns.
///
/// Both slices must be aligned to the same dates. Windows containing any
/// missing return, or a benchmark with zero variance, yield NaN.
pub fn rolling_beta(asset: &[f64], benchmark: &[f64], period: usize) -> Vec<f64> {
    assert_eq!(asset.len(), benchmark.len(), "beta inputs must be aligned");
    let ra = pct_change(asset);
    let rb = pct_change(benchmark);
    let n = ra.len();
    let mut out = vec![f64::NAN; n];
    if period < 2 {
        return out;
    }
    for i in period..n {
        let a = &ra[i + 1 - period..=i];
        let b = &rb[i + 1 - period..=i];
        if a.iter().chain(b).any(|v| !v.is_finite()) {
            continue;
        }
        let k = period as f64;
        let mean_a = a.iter().sum::<f64>() / k;
        let mean_b = b.iter().sum::<f64>() / k;
        let cov: f64 = a
            .iter()
            .zip(b)
            .map(|(x, y)| (x - mean_a) * (y - mean_b))
            .sum();
        let var: f64 = b.iter().map(|y| (y - mean_b).powi(2)).sum();
        if var > 0.0 {
            out[i] = cov / var;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, DEFAULT_EPSILON};

    #[test]
    fn pct_change_basic() {
        let out = pct_change(&[100.0, 110.0, 99.0]);
        assert!(out[0].is_nan());
        assert_approx(out[1], 0.1, DEFAULT_EPSILON);
        assert_approx(out[2], -0.1, DEFAULT_EPSILON);
    }

    #[test]
    fn roc_over_two_bars() {
        let out = roc_of_series(&[100.0, 50.0, 120.0], 2);
        assert_approx(out[2], 0.2, DEFAULT_EPSILON);
    }

    #[test]
    fn beta_of_doubled_returns_is_two() {
        let bench = [100.0, 101.0, 99.0, 102.0, 103.0, 101.0];
        let rb = pct_change(&bench);
        let mut asset = vec![100.0];
        for r in rb.iter().skip(1) {
            let last = *asset.last().unwrap();
            asset.push(last * (1.0 + 2.0 * r));
        }
        let beta = rolling_beta(&asset, &bench, 4);
        assert!(beta[3].is_nan());
        assert_approx(beta[5], 2.0, 1e-9);
    }

    #[test]
    fn flat_benchmark_gives_nan() {
        let beta = rolling_beta(&[1.0, 2.0, 3.0, 4.0], &[5.0; 4], 2);
        assert!(beta.iter().all(|v| v.is_nan()));
    }
}
