use crate::stats::mean_and_std;
use flocking_common::error::{AnalysisError, Result};
use flocking_common::RunSeries;
use log::trace;
use serde::Serialize;

/// Where a series becomes stationary, and its statistics from there to the end.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StationarityResult {
    /// Index of the first value of the stable window, or 0 on fallback.
    pub onset: usize,
    /// Time of the onset sample.
    pub onset_time: f64,
    /// `true` when a stable window was found, `false` when the whole series was used.
    pub found: bool,
    /// Mean of `values[onset..]`.
    pub mean: f64,
    /// Population std of `values[onset..]`.
    pub std: f64,
}

/// Finds the first window of `min_stable_run` consecutive step-to-step changes below `threshold`.
///
/// Thresholds are supplied by the caller; there is no built-in default.
#[derive(Debug, Clone, Copy)]
pub struct StationarityDetector {
    threshold: f64,
    min_stable_run: usize,
}

impl StationarityDetector {
    pub fn new(threshold: f64, min_stable_run: usize) -> Result<Self> {
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(AnalysisError::InvalidArgument(format!(
                "threshold must be finite and non-negative, got {}",
                threshold
            )));
        }
        if min_stable_run == 0 {
            return Err(AnalysisError::InvalidArgument(
                "min_stable_run must be at least 1".to_string(),
            ));
        }
        Ok(StationarityDetector { threshold, min_stable_run })
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn min_stable_run(&self) -> usize {
        self.min_stable_run
    }

    pub fn detect(&self, series: &RunSeries) -> Result<StationarityResult> {
        let values = series.values();
        if values.is_empty() {
            return Err(AnalysisError::InvalidArgument(
                "cannot detect stationarity of an empty series".to_string(),
            ));
        }

        let onset = self.find_onset(values);
        let start = onset.unwrap_or(0);
        let (mean, std) = mean_and_std(&values[start..]);
        Ok(StationarityResult {
            onset: start,
            onset_time: series.times()[start],
            found: onset.is_some(),
            mean,
            std,
        })
    }

    /// Index of the first value of the first stable window.
    ///
    /// A window of `min_stable_run` differences spans `min_stable_run + 1` values;
    /// any difference at or above the threshold resets the count.
    fn find_onset(&self, values: &[f64]) -> Option<usize> {
        let mut count = 0;
        for i in 1..values.len() {
            if (values[i] - values[i - 1]).abs() < self.threshold {
                count += 1;
                if count == self.min_stable_run {
                    trace!("Stable window of {} differences ends at index {}", count, i);
                    return Some(i - self.min_stable_run);
                }
            } else {
                count = 0;
            }
        }
        None
    }
}

/// Convenience wrapper: builds a detector and runs it once.
pub fn detect(
    series: &RunSeries,
    threshold: f64,
    min_stable_run: usize,
) -> Result<StationarityResult> {
    StationarityDetector::new(threshold, min_stable_run)?.detect(series)
}
