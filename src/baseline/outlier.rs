//! Outlier rejection for monthly samples
//!
//! A month is kept when its consumption lies within a relative band around
//! the mean of all months. The mean is computed once; removing outliers does
//! not trigger another pass.

use crate::core::{mean_kwh, Error, MonthSample, Result};

/// Default relative band around the mean (±20%)
pub const DEFAULT_THRESHOLD_PCT: f64 = 0.20;

/// Single-pass, mean-relative outlier filter
#[derive(Debug, Clone, Copy)]
pub struct OutlierFilter {
    threshold_pct: f64,
}

impl OutlierFilter {
    /// Create a filter with a custom threshold
    pub fn new(threshold_pct: f64) -> Result<Self> {
        if !threshold_pct.is_finite() || threshold_pct < 0.0 {
            return Err(Error::InvalidInput(format!(
                "outlier threshold must be a non-negative number, got {}",
                threshold_pct
            )));
        }
        Ok(Self { threshold_pct })
    }

    pub fn threshold_pct(&self) -> f64 {
        self.threshold_pct
    }

    /// Inclusive bounds for the given samples, `None` when there are none
    pub fn bounds(&self, samples: &[MonthSample]) -> Option<(f64, f64)> {
        let mean = mean_kwh(samples)?;
        Some((mean * (1.0 - self.threshold_pct), mean * (1.0 + self.threshold_pct)))
    }

    /// Keep samples inside the bounds, preserving their order
    pub fn filter(&self, samples: &[MonthSample]) -> Vec<MonthSample> {
        let Some((lower, upper)) = self.bounds(samples) else {
            return Vec::new();
        };

        let kept: Vec<MonthSample> = samples
            .iter()
            .filter(|s| lower <= s.kwh && s.kwh <= upper)
            .cloned()
            .collect();

        if kept.len() < samples.len() {
            log::debug!(
                "Outlier filter dropped {} of {} samples (bounds {:.2}..={:.2})",
                samples.len() - kept.len(),
                samples.len(),
                lower,
                upper
            );
        }
        kept
    }
}

impl Default for OutlierFilter {
    fn default() -> Self {
        Self {
            threshold_pct: DEFAULT_THRESHOLD_PCT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples(values: &[f64]) -> Vec<MonthSample> {
        values
            .iter()
            .enumerate()
            .map(|(i, kwh)| MonthSample::new(&format!("2024-{:02}", i + 1), *kwh))
            .collect()
    }

    #[test]
    fn test_single_spike_is_removed() {
        let mut values = vec![100.0; 11];
        values.push(1000.0);
        let input = samples(&values);

        // Mean 175, band [140, 210]
        let filter = OutlierFilter::default();
        let (lower, upper) = filter.bounds(&input).unwrap();
        assert!((lower - 140.0).abs() < 1e-9);
        assert!((upper - 210.0).abs() < 1e-9);

        // The spike drags the mean so far that the regular months fall out too
        assert!(filter.filter(&input).is_empty());

        // A wider band keeps the regular months and still drops the spike
        let kept = OutlierFilter::new(0.5).unwrap().filter(&input);
        assert_eq!(kept.len(), 11);
        assert!(kept.iter().all(|s| s.kwh == 100.0));
    }

    #[test]
    fn test_preserves_order_and_subset() {
        let input = samples(&[100.0, 95.0, 300.0, 105.0, 10.0, 98.0]);
        let kept = OutlierFilter::new(0.5).unwrap().filter(&input);

        // Mean 118, band [59, 177]
        let periods: Vec<&str> = kept.iter().map(|s| s.period.as_str()).collect();
        assert_eq!(periods, vec!["2024-01", "2024-02", "2024-04", "2024-06"]);
        assert!(kept.iter().all(|k| input.contains(k)));
    }

    #[test]
    fn test_bounds_are_inclusive() {
        // Mean 100, band [50, 150] with both edges present
        let input = samples(&[50.0, 150.0, 100.0]);
        let kept = OutlierFilter::new(0.5).unwrap().filter(&input);
        assert_eq!(kept.len(), 3);
    }

    #[test]
    fn test_empty_input() {
        assert!(OutlierFilter::default().filter(&[]).is_empty());
        assert!(OutlierFilter::default().bounds(&[]).is_none());
    }

    #[test]
    fn test_everything_filtered() {
        // Mean 500, band [400, 600]: neither month survives
        let input = samples(&[0.0, 1000.0]);
        assert!(OutlierFilter::default().filter(&input).is_empty());
    }

    #[test]
    fn test_not_iterative() {
        // Mean 180, band [144, 216]. A second pass over the survivors
        // (mean ~168.3) would also drop 215; a single pass keeps it.
        let input = samples(&[145.0, 145.0, 215.0, 95.0, 300.0]);
        let kept = OutlierFilter::default().filter(&input);
        let values: Vec<f64> = kept.iter().map(|s| s.kwh).collect();
        assert_eq!(values, vec![145.0, 145.0, 215.0]);
    }

    #[test]
    fn test_rejects_bad_threshold() {
        assert!(OutlierFilter::new(-0.1).is_err());
        assert!(OutlierFilter::new(f64::INFINITY).is_err());
        assert_eq!(OutlierFilter::new(0.0).unwrap().threshold_pct(), 0.0);
    }
}
