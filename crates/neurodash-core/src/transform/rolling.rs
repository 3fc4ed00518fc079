//! Trailing moving averages.

/// Window used to smooth daily series.
pub const ROLLING_WINDOW: usize = 7;

/// Trailing mean over `window` samples. The first `window - 1` positions
/// have too few samples and are `None`.
pub fn rolling_mean(values: &[f64], window: usize) -> Vec<Option<f64>> {
    let window = window.max(1);
    let mut out = Vec::with_capacity(values.len());
    let mut sum = 0.0;
    for (i, x) in values.iter().enumerate() {
        sum += x;
        if i >= window {
            sum -= values[i - window];
        }
        out.push((i + 1 >= window).then(|| sum / window as f64));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leading_samples_undefined() {
        let out = rolling_mean(&[1.0, 2.0, 3.0, 4.0], 3);
        assert_eq!(out, vec![None, None, Some(2.0), Some(3.0)]);
    }

    #[test]
    fn test_weekly_window() {
        let values: Vec<f64> = (1..=8).map(f64::from).collect();
        let out = rolling_mean(&values, ROLLING_WINDOW);
        assert!(out[..6].iter().all(Option::is_none));
        assert_eq!(out[6], Some(4.0));
        assert_eq!(out[7], Some(5.0));
    }

    #[test]
    fn test_short_series() {
        assert_eq!(rolling_mean(&[1.0, 2.0], ROLLING_WINDOW), vec![None, None]);
        assert!(rolling_mean(&[], ROLLING_WINDOW).is_empty());
    }
}
