use crate::error::{AnalysisError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Header of the per-run time-series artifact.
pub const RUN_SERIES_HEADER: [&str; 2] = ["t", "v_a"];
/// Header of the aggregated time-series artifact.
pub const AGGREGATED_HEADER: [&str; 3] = ["t", "va_mean", "va_std"];

/// Decimal places used when no precision is configured.
pub const DEFAULT_PRECISION: usize = 6;

/// Scalar observable of one run, sampled once per snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSeries {
    times: Vec<f64>,
    values: Vec<f64>,
}

impl RunSeries {
    /// Builds a series. Both columns must have the same length and times must be finite
    /// and strictly increasing.
    pub fn new(times: Vec<f64>, values: Vec<f64>) -> Result<Self> {
        if times.len() != values.len() {
            return Err(AnalysisError::InvalidArgument(format!(
                "series has {} times but {} values",
                times.len(),
                values.len()
            )));
        }
        if let Some(i) = times.iter().position(|t| !t.is_finite()) {
            return Err(AnalysisError::InvalidArgument(format!(
                "series time t[{}]={} is not finite",
                i, times[i]
            )));
        }
        if let Some(i) = (1..times.len()).find(|&i| times[i] <= times[i - 1]) {
            return Err(AnalysisError::InvalidArgument(format!(
                "series times must strictly increase (t[{}]={} after t[{}]={})",
                i,
                times[i],
                i - 1,
                times[i - 1]
            )));
        }
        Ok(RunSeries { times, values })
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn points(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.times.iter().copied().zip(self.values.iter().copied())
    }

    /// Writes the series as `t,v_a` rows with `precision` decimals.
    pub fn write_csv<P: AsRef<Path>>(&self, path: P, precision: usize) -> Result<()> {
        let columns: [&[f64]; 2] = [&self.times, &self.values];
        write_columns(path.as_ref(), &RUN_SERIES_HEADER, &columns, precision)
    }

    /// Reads a two-column series artifact. Columns are taken by position; the header is only
    /// checked for width.
    pub fn read_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut columns = read_columns(path, RUN_SERIES_HEADER.len())?;
        let values = columns.pop().unwrap_or_default();
        let times = columns.pop().unwrap_or_default();
        RunSeries::new(times, values).map_err(|e| AnalysisError::malformed(path, e.to_string()))
    }
}

/// Cross-run mean and population std of the observable, per shared step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedSeries {
    pub times: Vec<f64>,
    pub mean: Vec<f64>,
    pub std: Vec<f64>,
    /// Number of runs that were combined.
    pub run_count: usize,
}

impl AggregatedSeries {
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// The mean column as a series of its own, e.g. for stationarity detection.
    pub fn mean_series(&self) -> Result<RunSeries> {
        RunSeries::new(self.times.clone(), self.mean.clone())
    }

    /// `[mean - std, mean + std]` per step, clipped to `[lower, upper]` for display.
    ///
    /// The stored series is left untouched.
    pub fn error_band(&self, lower: f64, upper: f64) -> Vec<(f64, f64)> {
        self.mean
            .iter()
            .zip(&self.std)
            .map(|(&m, &s)| ((m - s).max(lower), (m + s).min(upper)))
            .collect()
    }

    /// Writes the series as `t,va_mean,va_std` rows with `precision` decimals.
    pub fn write_csv<P: AsRef<Path>>(&self, path: P, precision: usize) -> Result<()> {
        let columns: [&[f64]; 3] = [&self.times, &self.mean, &self.std];
        write_columns(path.as_ref(), &AGGREGATED_HEADER, &columns, precision)
    }

    /// Reads an aggregated artifact back. The run count is not stored and reads as 0.
    pub fn read_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut columns = read_columns(path, AGGREGATED_HEADER.len())?.into_iter();
        let times = columns.next().unwrap_or_default();
        let mean = columns.next().unwrap_or_default();
        let std = columns.next().unwrap_or_default();
        Ok(AggregatedSeries { times, mean, std, run_count: 0 })
    }
}

fn write_columns(path: &Path, header: &[&str], columns: &[&[f64]], precision: usize) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(header)?;
    let rows = columns.first().map_or(0, |c| c.len());
    for i in 0..rows {
        writer.write_record(columns.iter().map(|c| format!("{:.*}", precision, c[i])))?;
    }
    writer.flush()?;
    Ok(())
}

fn read_columns(path: &Path, width: usize) -> Result<Vec<Vec<f64>>> {
    if !path.is_file() {
        return Err(AnalysisError::not_found("series artifact", path));
    }
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_path(path)?;
    let header_width = reader.headers()?.len();
    if header_width != width {
        return Err(AnalysisError::malformed(
            path,
            format!("expected {} columns, header has {}", width, header_width),
        ));
    }

    let mut columns = vec![Vec::new(); width];
    for (row, record) in reader.records().enumerate() {
        let record = record?;
        for (column, raw) in columns.iter_mut().zip(record.iter()) {
            let value: f64 = raw.parse().map_err(|_| {
                let reason = format!("row {}: '{}' is not a number", row + 1, raw);
                AnalysisError::malformed(path, reason)
            })?;
            column.push(value);
        }
    }
    Ok(columns)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_increasing_times() {
        let result = RunSeries::new(vec![0.0, 1.0, 1.0], vec![0.1, 0.2, 0.3]);
        assert!(matches!(result, Err(AnalysisError::InvalidArgument(_))));
    }

    #[test]
    fn rejects_non_finite_times() {
        // NaN compares false both ways, so it would slip past the ordering check.
        for times in [vec![0.0, f64::NAN, 2.0], vec![f64::NAN], vec![0.0, f64::INFINITY]] {
            let values = vec![0.5; times.len()];
            let result = RunSeries::new(times, values);
            assert!(matches!(result, Err(AnalysisError::InvalidArgument(_))));
        }
    }

    #[test]
    fn run_series_survives_a_write_read_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("polarization.csv");
        let series = RunSeries::new(vec![0.0, 2.0, 4.0], vec![0.123456, 0.5, 0.987654]).unwrap();

        series.write_csv(&path, DEFAULT_PRECISION).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("t,v_a\n0.000000,0.123456\n"));

        assert_eq!(RunSeries::read_csv(&path).unwrap(), series);
    }

    #[test]
    fn error_band_is_clipped_without_touching_series() {
        let agg = AggregatedSeries {
            times: vec![0.0, 1.0],
            mean: vec![0.05, 0.95],
            std: vec![0.1, 0.1],
            run_count: 2,
        };
        let band = agg.error_band(0.0, 1.0);
        assert_eq!(band[0].0, 0.0);
        assert_eq!(band[1].1, 1.0);
        assert!((band[0].1 - 0.15).abs() < 1e-12);
        assert_eq!(agg.mean, vec![0.05, 0.95]);
    }

    #[test]
    fn reading_a_missing_series_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let result = RunSeries::read_csv(dir.path().join("nope.csv"));
        assert!(matches!(result, Err(AnalysisError::NotFound { .. })));
    }
}
