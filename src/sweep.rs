use crate::stats::{mean_and_std, sample_std};
use flocking_common::error::{AnalysisError, Result};
use flocking_common::params::OBSERVABLE_FIELDS;
use flocking_common::series::DEFAULT_PRECISION;
use flocking_common::ParameterSet;
use log::debug;
use std::fs::{self, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// One line of the sweep dataset: a flattened ParameterSet plus its derived observable.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepRow {
    pub fields: Vec<(String, f64)>,
    pub observable_mean: f64,
    pub observable_std: f64,
}

impl SweepRow {
    pub fn new(params: &ParameterSet, observable_mean: f64, observable_std: f64) -> Self {
        SweepRow { fields: params.fields(), observable_mean, observable_std }
    }

    /// Column names of this row: parameter fields, then the two observable columns.
    pub fn header(&self) -> Vec<String> {
        self.fields
            .iter()
            .map(|(name, _)| name.clone())
            .chain(OBSERVABLE_FIELDS.iter().map(|name| name.to_string()))
            .collect()
    }

    pub fn field(&self, name: &str) -> Option<f64> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| *v)
    }
}

/// Appends rows to the shared sweep dataset.
///
/// The dataset is append-only: rows are never rewritten, and reprocessing a parameter
/// set adds another row. The header is fixed by the first append. Each append holds
/// an exclusive lock on the dataset file from the header check until its row is
/// written, so appenders in other threads, other accumulators or other processes
/// never see a half-written file.
#[derive(Debug, Clone)]
pub struct SweepAccumulator {
    path: PathBuf,
    precision: usize,
}

impl SweepAccumulator {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self::with_precision(path, DEFAULT_PRECISION)
    }

    /// `precision` applies to the observable columns.
    /// Parameter fields keep their shortest exact form.
    pub fn with_precision<P: Into<PathBuf>>(path: P, precision: usize) -> Self {
        SweepAccumulator { path: path.into(), precision }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(
        &self,
        params: &ParameterSet,
        observable_mean: f64,
        observable_std: f64,
    ) -> Result<()> {
        self.append_row(&SweepRow::new(params, observable_mean, observable_std))
    }

    pub fn append_row(&self, row: &SweepRow) -> Result<()> {
        let header = row.header();

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).read(true).append(true).open(&self.path)?;
        let mut lock = fd_lock::RwLock::new(file);
        let mut file = lock.write()?;

        let needs_header = file.metadata()?.len() == 0;
        if !needs_header {
            file.seek(SeekFrom::Start(0))?;
            let existing = header_from_reader(&mut *file)?;
            if existing != header {
                return Err(AnalysisError::SchemaMismatch {
                    path: self.path.clone(),
                    expected: existing,
                    found: header,
                });
            }
        }

        let mut writer = csv::Writer::from_writer(Vec::new());
        if needs_header {
            writer.write_record(&header)?;
        }
        writer.write_record(
            row.fields
                .iter()
                .map(|(_, value)| value.to_string())
                .chain([
                    format!("{:.*}", self.precision, row.observable_mean),
                    format!("{:.*}", self.precision, row.observable_std),
                ]),
        )?;
        let bytes = writer
            .into_inner()
            .map_err(|e| AnalysisError::Io(e.into_error()))?;
        // Append mode: the write lands at the end whatever the read position.
        file.write_all(&bytes)?;
        file.flush()?;

        debug!("Appended sweep row to {} (header written: {})", self.path.display(), needs_header);
        Ok(())
    }
}

fn header_from_reader<R: Read>(reader: R) -> Result<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    Ok(reader.headers()?.iter().map(str::to_string).collect())
}

fn read_header(path: &Path) -> Result<Vec<String>> {
    header_from_reader(fs::File::open(path)?)
}

/// Reads every row of a sweep dataset, duplicates included.
pub fn read_rows<P: AsRef<Path>>(path: P) -> Result<Vec<SweepRow>> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(AnalysisError::not_found("sweep dataset", path));
    }
    let header = read_header(path)?;
    let field_count = header.len().saturating_sub(OBSERVABLE_FIELDS.len());
    if header.len() < OBSERVABLE_FIELDS.len() || header[field_count..] != OBSERVABLE_FIELDS {
        return Err(AnalysisError::malformed(
            path,
            format!("header must end with {}", OBSERVABLE_FIELDS.join(",")),
        ));
    }

    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_path(path)?;
    let mut rows = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record?;
        let mut values = Vec::with_capacity(record.len());
        for raw in record.iter() {
            let value: f64 = raw.parse().map_err(|_| {
                let reason = format!("row {}: '{}' is not a number", line + 1, raw);
                AnalysisError::malformed(path, reason)
            })?;
            values.push(value);
        }
        rows.push(SweepRow {
            fields: header[..field_count]
                .iter()
                .cloned()
                .zip(values[..field_count].iter().copied())
                .collect(),
            observable_mean: values[field_count],
            observable_std: values[field_count + 1],
        });
    }
    Ok(rows)
}

/// Summary of all rows sharing one value of the swept field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSummary {
    pub value: f64,
    /// Number of rows with this value.
    pub count: usize,
    /// Mean of `observable_mean` over those rows.
    pub mean: f64,
    /// Sample std (n - 1) of `observable_mean` over those rows; NaN for a single row.
    pub spread: f64,
    /// Mean of `observable_std` over those rows.
    pub mean_std: f64,
}

/// Relative/absolute tolerance used when matching fixed parameter values.
fn is_close(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-8 + 1e-5 * b.abs()
}

/// Reduces sweep rows to one summary per distinct value of `field`, sorted by that value.
///
/// Only rows matching every entry of `fixed` are used; a fixed field a row lacks is not
/// applied. Rows without `field` are skipped.
pub fn summarize_by(rows: &[SweepRow], field: &str, fixed: &[(&str, f64)]) -> Vec<FieldSummary> {
    let mut selected: Vec<(f64, &SweepRow)> = rows
        .iter()
        .filter(|row| {
            fixed
                .iter()
                .all(|(name, wanted)| row.field(name).map_or(true, |v| is_close(v, *wanted)))
        })
        .filter_map(|row| row.field(field).map(|v| (v, row)))
        .collect();
    selected.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut summaries = Vec::new();
    for group in selected.chunk_by(|a, b| a.0 == b.0) {
        let means: Vec<f64> = group.iter().map(|(_, row)| row.observable_mean).collect();
        let stds: Vec<f64> = group.iter().map(|(_, row)| row.observable_std).collect();
        let (mean, _) = mean_and_std(&means);
        let (mean_std, _) = mean_and_std(&stds);
        summaries.push(FieldSummary {
            value: group[0].0,
            count: group.len(),
            mean,
            spread: sample_std(&means),
            mean_std,
        });
    }
    summaries
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};

    fn params(eta: f64, extra: &[(&str, f64)]) -> ParameterSet {
        let named =
            [("N", 100.0), ("L", 5.0), ("v", 0.03), ("eta", eta), ("r", 1.0), ("steps", 10.0)];
        let fields: Vec<(String, f64)> = named
            .iter()
            .chain(extra.iter())
            .map(|(k, v)| (k.to_string(), *v))
            .collect();
        ParameterSet::from_fields(&fields, Path::new("params.csv")).unwrap()
    }

    #[test]
    fn first_append_writes_header_once() {
        let dir = tempfile::tempdir().unwrap();
        let sweep = SweepAccumulator::new(dir.path().join("out").join("sweep.csv"));
        sweep.append(&params(0.1, &[]), 0.9, 0.01).unwrap();
        sweep.append(&params(0.5, &[]), 0.7, 0.02).unwrap();

        let text = fs::read_to_string(sweep.path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "N,L,rho,v,eta,r,steps,save_every,observable_mean,observable_std");
        assert_eq!(lines[1], "100,5,4,0.03,0.1,1,10,1,0.900000,0.010000");
    }

    #[test]
    fn repeated_parameter_sets_are_not_deduplicated() {
        let dir = tempfile::tempdir().unwrap();
        let sweep = SweepAccumulator::new(dir.path().join("sweep.csv"));
        let p = params(0.1, &[]);
        sweep.append(&p, 0.9, 0.01).unwrap();
        sweep.append(&p, 0.9, 0.01).unwrap();

        let rows = read_rows(sweep.path()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], rows[1]);
        assert_eq!(rows[0].field("eta"), Some(0.1));
    }

    #[test]
    fn differing_field_set_is_a_schema_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let sweep = SweepAccumulator::new(dir.path().join("sweep.csv"));
        sweep.append(&params(0.1, &[]), 0.9, 0.01).unwrap();
        let before = fs::read_to_string(sweep.path()).unwrap();

        let result = sweep.append(&params(0.1, &[("M", 5.0)]), 0.9, 0.01);
        assert!(matches!(result, Err(AnalysisError::SchemaMismatch { .. })));
        assert_eq!(fs::read_to_string(sweep.path()).unwrap(), before);
    }

    #[test]
    fn concurrent_appends_produce_whole_rows() {
        let dir = tempfile::tempdir().unwrap();
        let sweep = Arc::new(SweepAccumulator::new(dir.path().join("sweep.csv")));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let sweep = Arc::clone(&sweep);
                std::thread::spawn(move || {
                    for i in 0..25 {
                        sweep.append(&params(t as f64 * 0.1, &[]), i as f64 / 25.0, 0.0).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let rows = read_rows(sweep.path()).unwrap();
        assert_eq!(rows.len(), 200);
        let text = fs::read_to_string(sweep.path()).unwrap();
        assert_eq!(text.lines().filter(|l| l.starts_with("N,")).count(), 1);
    }

    #[test]
    fn separate_accumulators_on_a_new_file_write_one_header() {
        const APPENDERS: usize = 4;

        for trial in 0..50 {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join(format!("sweep_{}.csv", trial));
            let barrier = Arc::new(Barrier::new(APPENDERS));

            let handles: Vec<_> = (0..APPENDERS)
                .map(|t| {
                    let sweep = SweepAccumulator::new(&path);
                    let barrier = Arc::clone(&barrier);
                    std::thread::spawn(move || {
                        barrier.wait();
                        sweep.append(&params(t as f64 * 0.1, &[]), 0.5, 0.01).unwrap();
                    })
                })
                .collect();
            for handle in handles {
                handle.join().unwrap();
            }

            let text = fs::read_to_string(&path).unwrap();
            assert_eq!(text.lines().filter(|l| l.starts_with("N,")).count(), 1);
            assert_eq!(read_rows(&path).unwrap().len(), APPENDERS);
        }
    }

    #[test]
    fn summarize_groups_by_field_under_fixed_parameters() {
        let rows = vec![
            SweepRow::new(&params(0.5, &[]), 0.6, 0.02),
            SweepRow::new(&params(0.1, &[]), 0.9, 0.01),
            SweepRow::new(&params(0.1, &[]), 0.8, 0.03),
            SweepRow {
                fields: vec![("eta".to_string(), 0.1), ("L".to_string(), 20.0)],
                observable_mean: 0.1,
                observable_std: 0.0,
            },
        ];

        let summary = summarize_by(&rows, "eta", &[("L", 5.0)]);
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].value, 0.1);
        assert_eq!(summary[0].count, 2);
        assert!((summary[0].mean - 0.85).abs() < 1e-12);
        // Sample std of [0.9, 0.8], as pandas' groupby std.
        assert!((summary[0].spread - 0.005f64.sqrt()).abs() < 1e-12);
        assert!((summary[0].mean_std - 0.02).abs() < 1e-12);
        assert_eq!(summary[1].value, 0.5);
        assert!(summary[1].spread.is_nan());
    }
}
