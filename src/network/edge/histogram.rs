//! Fixed-bin activation histograms recorded during forward passes.
//!
//! These hold visualization *data* only - rendering belongs to the host. Bins
//! decay exponentially on every record so the picture tracks recent activity:
//! output histograms decay fast, because parameter updates change the output
//! distribution continuously, while input histograms decay slowly, because the
//! input distribution is mostly stationary.

use serde::{Deserialize, Serialize};

/// number of bins in every activation histogram
pub const HISTOGRAM_BIN_COUNT: usize = 20;
/// per-record decay multiplier for input-activation histograms
pub const INPUT_HISTOGRAM_DECAY: f64 = 0.999;
/// per-record decay multiplier for output-activation histograms
pub const OUTPUT_HISTOGRAM_DECAY: f64 = 0.95;
/// fraction of the observed span added on each side by [`ActivationHistogram::recalibrate`]
const ADAPTIVE_RANGE_PADDING: f64 = 0.1;

/// A fixed-bin histogram with exponential decay and a recalibratable display range.
///
/// Values are mapped into the display range without pre-clamping; out-of-range
/// values land in the edge bins. The observed min/max are tracked separately
/// from the display range so a host can opt in to adaptive-range recalibration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivationHistogram {
    bins: Vec<f64>,
    range_min: f64,
    range_max: f64,
    decay: f64,
    observed_min: f64,
    observed_max: f64,
}

impl ActivationHistogram {
    pub(crate) fn new(bin_count: usize, range_min: f64, range_max: f64, decay: f64) -> Self {
        ActivationHistogram {
            bins: vec![0.0; bin_count],
            range_min,
            range_max,
            decay,
            observed_min: f64::INFINITY,
            observed_max: f64::NEG_INFINITY,
        }
    }

    /// decay every bin, then increment the bin the value maps to. The bin
    /// index - not the value - is clamped into range, so out-of-range values
    /// accumulate in the first and last bins
    pub(crate) fn record(&mut self, value: f64) {
        for bin in self.bins.iter_mut() {
            *bin *= self.decay;
        }
        self.observed_min = self.observed_min.min(value);
        self.observed_max = self.observed_max.max(value);
        let relative = (value - self.range_min) / (self.range_max - self.range_min);
        let index = ((relative * self.bins.len() as f64) as isize)
            .clamp(0, self.bins.len() as isize - 1) as usize;
        self.bins[index] += 1.0;
    }

    /// the bin weights scaled to sum to 1.0, or all zeros if nothing has been recorded
    pub fn normalized(&self) -> Vec<f64> {
        let total: f64 = self.bins.iter().sum();
        if total > 0.0 {
            self.bins.iter().map(|bin| bin / total).collect()
        } else {
            vec![0.0; self.bins.len()]
        }
    }

    /// the raw (decayed) bin weights
    pub fn bins(&self) -> &[f64] {
        &self.bins
    }

    /// the fixed display range values are binned against
    pub fn range(&self) -> (f64, f64) {
        (self.range_min, self.range_max)
    }

    /// the extremes of every value recorded since the last reset, or `None` if
    /// nothing has been recorded
    pub fn observed_range(&self) -> Option<(f64, f64)> {
        if self.observed_min <= self.observed_max {
            Some((self.observed_min, self.observed_max))
        } else {
            None
        }
    }

    /// widen the display range to the observed range plus 10% padding on each
    /// side. No-op until at least two distinct values have been observed
    pub(crate) fn recalibrate(&mut self) {
        if let Some((low, high)) = self.observed_range() {
            if high > low {
                let padding = (high - low) * ADAPTIVE_RANGE_PADDING;
                self.range_min = low - padding;
                self.range_max = high + padding;
            }
        }
    }

    /// zero every bin and forget the observed range. The display range is untouched
    pub(crate) fn reset(&mut self) {
        for bin in self.bins.iter_mut() {
            *bin = 0.0;
        }
        self.observed_min = f64::INFINITY;
        self.observed_max = f64::NEG_INFINITY;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_test_histogram() -> ActivationHistogram {
        ActivationHistogram::new(10, -1.0, 1.0, 1.0)
    }

    #[test]
    fn test_record_lands_in_expected_bin() {
        let mut histogram = build_test_histogram();
        histogram.record(-1.0); // bottom of range -> bin 0
        histogram.record(0.0); // middle of range -> bin 5
        histogram.record(0.99); // top of range -> bin 9
        assert_eq!(histogram.bins()[0], 1.0);
        assert_eq!(histogram.bins()[5], 1.0);
        assert_eq!(histogram.bins()[9], 1.0);
        assert_eq!(histogram.bins().iter().sum::<f64>(), 3.0);
    }

    #[test]
    fn test_out_of_range_values_clamp_to_edge_bins() {
        let mut histogram = build_test_histogram();
        histogram.record(-50.0);
        histogram.record(50.0);
        assert_eq!(histogram.bins()[0], 1.0);
        assert_eq!(histogram.bins()[9], 1.0);
        assert_eq!(histogram.observed_range(), Some((-50.0, 50.0)));
    }

    #[test]
    fn test_decay_applies_before_each_increment() {
        let mut histogram = ActivationHistogram::new(10, -1.0, 1.0, 0.5);
        histogram.record(-1.0);
        histogram.record(-1.0);
        histogram.record(0.99);
        // bin 0 was decayed twice after its first increment and once after its second
        assert_eq!(histogram.bins()[0], 1.0 * 0.25 + 1.0 * 0.5);
        assert_eq!(histogram.bins()[9], 1.0);
    }

    #[test]
    fn test_normalized_sums_to_one() {
        let mut histogram = build_test_histogram();
        for value in [-0.8, -0.8, 0.1, 0.4, 0.4, 0.4] {
            histogram.record(value);
        }
        let normalized = histogram.normalized();
        let total: f64 = normalized.iter().sum();
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_normalized_of_empty_histogram_is_zeros() {
        let histogram = build_test_histogram();
        assert_eq!(histogram.normalized(), vec![0.0; 10]);
        assert_eq!(histogram.observed_range(), None);
    }

    #[test]
    fn test_recalibrate_widens_to_observed_range() {
        let mut histogram = build_test_histogram();
        histogram.record(-4.0);
        histogram.record(6.0);
        histogram.recalibrate();
        assert_eq!(histogram.range(), (-5.0, 7.0)); // observed span 10, padded by 1.0 each side
    }

    #[test]
    fn test_recalibrate_without_observations_is_a_no_op() {
        let mut histogram = build_test_histogram();
        histogram.recalibrate();
        assert_eq!(histogram.range(), (-1.0, 1.0));
    }

    #[test]
    fn test_reset_clears_bins_and_observations_but_not_range() {
        let mut histogram = build_test_histogram();
        histogram.record(0.5);
        histogram.record(-3.0);
        histogram.recalibrate();
        let recalibrated_range = histogram.range();
        histogram.reset();
        assert_eq!(histogram.bins(), vec![0.0; 10].as_slice());
        assert_eq!(histogram.observed_range(), None);
        assert_eq!(histogram.range(), recalibrated_range);
    }
}
