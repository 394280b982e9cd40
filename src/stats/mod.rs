//! Confidence statistics over a metric window.

use crate::wire::ConfidenceReport;

/// Compute the confidence statistics for one window.
///
/// The mean and the population dispersion are accumulated with per-element
/// `value / n` weighting rather than a running sum, which keeps the
/// intermediate magnitudes bounded for very large windows. All four fields
/// are rounded to two decimals. An empty window yields all zeros.
pub fn confidence(window: &[i64]) -> ConfidenceReport {
    if window.is_empty() {
        return ConfidenceReport {
            average: 0.0,
            sq_standard_deviation: 0.0,
            standard_deviation: 0.0,
            dispersion: 0.0,
        };
    }

    let n = window.len() as f64;

    let mut average = 0.0;
    for &v in window {
        average += v as f64 / n;
    }

    let mut dispersion = 0.0;
    for &v in window {
        let d = v as f64 - average;
        dispersion += d * d / n;
    }

    let standard_deviation = dispersion.sqrt();

    // sq_standard_deviation never grew semantics of its own in the wire
    // protocol; it stays an exact alias of standard_deviation.
    ConfidenceReport {
        average: round2(average),
        sq_standard_deviation: round2(standard_deviation),
        standard_deviation: round2(standard_deviation),
        dispersion: round2(dispersion),
    }
}

/// Round to two decimal places, half away from zero.
fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_window_is_all_zeros() {
        let report = confidence(&[]);
        assert_eq!(report.average, 0.0);
        assert_eq!(report.dispersion, 0.0);
        assert_eq!(report.standard_deviation, 0.0);
        assert_eq!(report.sq_standard_deviation, 0.0);
    }

    #[test]
    fn test_single_sample() {
        let report = confidence(&[5]);
        assert_eq!(report.average, 5.0);
        assert_eq!(report.dispersion, 0.0);
        assert_eq!(report.standard_deviation, 0.0);
    }

    #[test]
    fn test_known_window() {
        let report = confidence(&[1, 2, 3, 4]);
        assert_eq!(report.average, 2.5);
        assert_eq!(report.dispersion, 1.25);
        // sqrt(1.25) = 1.118..., rounded to 1.12.
        assert_eq!(report.standard_deviation, 1.12);
        assert_eq!(report.sq_standard_deviation, 1.12);
    }

    #[test]
    fn test_alias_always_matches_standard_deviation() {
        for window in [&[3i64, 7, 11][..], &[0, 0, 0][..], &[-4, 4][..], &[1000000, 1][..]] {
            let report = confidence(window);
            assert_eq!(report.sq_standard_deviation, report.standard_deviation);
        }
    }

    #[test]
    fn test_constant_window_has_zero_spread() {
        let report = confidence(&[9, 9, 9, 9, 9]);
        assert_eq!(report.average, 9.0);
        assert_eq!(report.dispersion, 0.0);
        assert_eq!(report.standard_deviation, 0.0);
    }

    #[test]
    fn test_negative_samples() {
        let report = confidence(&[-1, -2, -3, -4]);
        assert_eq!(report.average, -2.5);
        assert_eq!(report.dispersion, 1.25);
        assert_eq!(report.standard_deviation, 1.12);
    }

    #[test]
    fn test_rounding_to_two_decimals() {
        // mean = 1/3 = 0.333..., rounds to 0.33.
        let report = confidence(&[0, 0, 1]);
        assert_eq!(report.average, 0.33);
    }
}
