use crate::stats::mean_and_std;
use flocking_common::error::{AnalysisError, Result};
use flocking_common::{AggregatedSeries, RunSeries};
use log::debug;

/// Combines repeated runs into a per-step cross-run mean and population std.
///
/// Every series must have the same length and exactly the same time axis; nothing is
/// truncated or interpolated. The result is unclamped, use
/// [`AggregatedSeries::error_band`] to clip for display.
pub fn aggregate(series_list: &[RunSeries]) -> Result<AggregatedSeries> {
    let Some(reference) = series_list.first() else {
        return Err(AnalysisError::Alignment("no series to aggregate".to_string()));
    };

    for (i, series) in series_list.iter().enumerate().skip(1) {
        if series.len() != reference.len() {
            return Err(AnalysisError::Alignment(format!(
                "series {} has {} samples, series 0 has {}",
                i,
                series.len(),
                reference.len()
            )));
        }
        if let Some(step) = (0..series.len()).find(|&s| series.times()[s] != reference.times()[s]) {
            return Err(AnalysisError::Alignment(format!(
                "series {} has t={} at index {}, series 0 has t={}",
                i,
                series.times()[step],
                step,
                reference.times()[step]
            )));
        }
    }

    let mut mean = Vec::with_capacity(reference.len());
    let mut std = Vec::with_capacity(reference.len());
    let mut column = Vec::with_capacity(series_list.len());
    for step in 0..reference.len() {
        column.clear();
        column.extend(series_list.iter().map(|s| s.values()[step]));
        let (m, s) = mean_and_std(&column);
        mean.push(m);
        std.push(s);
    }

    debug!("Aggregated {} runs of {} samples", series_list.len(), reference.len());
    Ok(AggregatedSeries {
        times: reference.times().to_vec(),
        mean,
        std,
        run_count: series_list.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(times: &[f64], values: &[f64]) -> RunSeries {
        RunSeries::new(times.to_vec(), values.to_vec()).unwrap()
    }

    #[test]
    fn identical_runs_have_zero_spread() {
        let run = series(&[0.0, 1.0, 2.0], &[0.2, 0.6, 0.8]);
        let agg = aggregate(&[run.clone(), run.clone()]).unwrap();

        assert_eq!(agg.mean, run.values());
        assert!(agg.std.iter().all(|&s| s == 0.0));
        assert_eq!(agg.times, run.times());
        assert_eq!(agg.run_count, 2);
    }

    #[test]
    fn computes_cross_run_statistics_per_step() {
        let a = series(&[0.0, 1.0], &[0.0, 0.5]);
        let b = series(&[0.0, 1.0], &[1.0, 0.5]);
        let agg = aggregate(&[a, b]).unwrap();

        assert_eq!(agg.mean, vec![0.5, 0.5]);
        assert_eq!(agg.std, vec![0.5, 0.0]);
    }

    #[test]
    fn mismatched_lengths_fail() {
        let a = series(&[0.0, 1.0, 2.0], &[0.1, 0.2, 0.3]);
        let b = series(&[0.0, 1.0], &[0.1, 0.2]);
        assert!(matches!(aggregate(&[a, b]), Err(AnalysisError::Alignment(_))));
    }

    #[test]
    fn mismatched_time_axes_fail() {
        let a = series(&[0.0, 1.0], &[0.1, 0.2]);
        let b = series(&[0.0, 2.0], &[0.1, 0.2]);
        assert!(matches!(aggregate(&[a, b]), Err(AnalysisError::Alignment(_))));
    }

    #[test]
    fn empty_input_fails() {
        assert!(matches!(aggregate(&[]), Err(AnalysisError::Alignment(_))));
    }

    #[test]
    fn stored_series_is_not_clamped() {
        let runs = [series(&[0.0], &[0.0]), series(&[0.0], &[0.0]), series(&[0.0], &[0.6])];
        let agg = aggregate(&runs).unwrap();

        assert!(agg.mean[0] - agg.std[0] < 0.0);
        assert_eq!(agg.error_band(0.0, 1.0)[0].0, 0.0);
        assert!((agg.std[0] - 0.08f64.sqrt()).abs() < 1e-12);
    }
}
