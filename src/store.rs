use flocking_common::error::{AnalysisError, Result};
use flocking_common::{ParameterSet, ParticleRecord, RunSeries, Snapshot};
use log::{debug, trace};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const PARAMS_FILE: &str = "params.csv";
pub const RUNS_DIR: &str = "sims";
pub const RUN_PREFIX: &str = "sim_";
pub const STEPS_DIR: &str = "steps";
pub const STEP_PREFIX: &str = "step_";
pub const STEP_EXTENSION: &str = "csv";
pub const SERIES_FILE: &str = "polarization.csv";

/// Columns every per-step artifact must carry.
const REQUIRED_COLUMNS: [&str; 4] = ["x", "y", "vx", "vy"];

/// A directory of repeated runs that share one ParameterSet.
#[derive(Debug, Clone)]
pub struct RunGroup {
    pub dir: PathBuf,
    pub params: ParameterSet,
}

/// Handle to one simulation run inside a group.
#[derive(Debug, Clone)]
pub struct RunHandle {
    /// Token after `sim_` in the run directory name.
    pub id: String,
    pub dir: PathBuf,
    pub params: ParameterSet,
}

impl RunHandle {
    pub fn steps_dir(&self) -> PathBuf {
        self.dir.join(STEPS_DIR)
    }

    pub fn series_path(&self) -> PathBuf {
        self.dir.join(SERIES_FILE)
    }
}

/// Reads simulator output from disk. Holds no mutable state, so one store can serve many threads.
#[derive(Debug, Clone, Default)]
pub struct SnapshotStore {
    allow_particle_count_change: bool,
}

impl SnapshotStore {
    pub fn new(allow_particle_count_change: bool) -> Self {
        SnapshotStore { allow_particle_count_change }
    }

    /// Opens a parameter group directory and loads its `params.csv`.
    pub fn open_group<P: AsRef<Path>>(&self, dir: P) -> Result<RunGroup> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(AnalysisError::not_found("parameter group directory", dir));
        }
        let params = ParameterSet::load(dir.join(PARAMS_FILE))?;
        Ok(RunGroup { dir: dir.to_path_buf(), params })
    }

    /// Lists the runs of a group, ordered by the numeric token of `sim_<token>`.
    ///
    /// Tokens that are not integers sort before numeric ones, lexically among themselves.
    pub fn list_runs(&self, group: &RunGroup) -> Result<Vec<RunHandle>> {
        let runs_dir = group.dir.join(RUNS_DIR);
        if !runs_dir.is_dir() {
            return Err(AnalysisError::not_found("runs directory", runs_dir));
        }

        let mut runs = Vec::new();
        for entry in fs::read_dir(&runs_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some(id) = name.strip_prefix(RUN_PREFIX) {
                runs.push(RunHandle {
                    id: id.to_string(),
                    dir: entry.path(),
                    params: group.params.clone(),
                });
            }
        }
        if runs.is_empty() {
            return Err(AnalysisError::not_found("run directories (sim_*)", runs_dir));
        }

        runs.sort_by(|a, b| {
            (a.id.parse::<u64>().ok(), &a.id).cmp(&(b.id.parse::<u64>().ok(), &b.id))
        });
        debug!("Found {} runs in {}", runs.len(), runs_dir.display());
        Ok(runs)
    }

    /// Loads every saved step of a run, ordered by the step index parsed from each artifact name.
    ///
    /// The artifacts must be exactly `0, save_every, ..., <= steps`: a missing one is
    /// `NotFound`, an extra one is `MalformedData`.
    pub fn load_run(&self, run: &RunHandle) -> Result<Vec<Snapshot>> {
        if !run.dir.is_dir() {
            let what = format!("run directory for run {}", run.id);
            return Err(AnalysisError::not_found(what, &run.dir));
        }
        let steps_dir = run.steps_dir();
        let artifacts = list_step_artifacts(&steps_dir)?;

        let params = &run.params;
        if let Some(missing) = params.expected_step_indices().find(|i| !artifacts.contains_key(i)) {
            return Err(AnalysisError::not_found(
                format!("artifact for step {}", missing),
                steps_dir.join(format!("{}{:03}.{}", STEP_PREFIX, missing, STEP_EXTENSION)),
            ));
        }
        // Times are derived from the save grid, so every artifact must sit on it.
        if let Some((step, path)) = artifacts
            .iter()
            .find(|&(&step, _)| step % params.save_every != 0 || step > params.steps)
        {
            return Err(AnalysisError::malformed(
                path,
                format!(
                    "step {} is off the save grid (every {} steps up to {})",
                    step, params.save_every, params.steps
                ),
            ));
        }

        let mut snapshots: Vec<Snapshot> = Vec::with_capacity(artifacts.len());
        let mut reference: Option<(PathBuf, csv::StringRecord)> = None;
        for (&step, path) in &artifacts {
            let (headers, snapshot) = read_step(path, step)?;

            if reference.is_none() {
                reference = Some((path.clone(), headers.clone()));
            }
            if let Some((first_path, first_headers)) = &reference {
                if headers != *first_headers {
                    return Err(AnalysisError::malformed(
                        path,
                        format!(
                            "columns {:?} differ from {:?} in {}",
                            headers,
                            first_headers,
                            first_path.display()
                        ),
                    ));
                }
            }

            if let Some(first) = snapshots.first() {
                let count_changed = snapshot.particle_count() != first.particle_count();
                if count_changed && !self.allow_particle_count_change {
                    return Err(AnalysisError::malformed(
                        path,
                        format!(
                            "step {} has {} particles, step {} has {}",
                            step,
                            snapshot.particle_count(),
                            first.step,
                            first.particle_count()
                        ),
                    ));
                }
            }
            snapshots.push(snapshot);
        }

        debug!("Loaded {} snapshots for run {}", snapshots.len(), run.id);
        Ok(snapshots)
    }

    /// Reads the run's per-run series artifact back.
    pub fn load_series(&self, run: &RunHandle) -> Result<RunSeries> {
        RunSeries::read_csv(run.series_path())
    }

    pub fn write_series(
        &self,
        run: &RunHandle,
        series: &RunSeries,
        precision: usize,
    ) -> Result<PathBuf> {
        let path = run.series_path();
        series.write_csv(&path, precision)?;
        Ok(path)
    }
}

/// Parses the step index out of a `step_<digits>.csv` file name.
pub fn parse_step_index(file_name: &str) -> Option<u64> {
    let digits = file_name
        .strip_prefix(STEP_PREFIX)?
        .strip_suffix(STEP_EXTENSION)?
        .strip_suffix('.')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

fn list_step_artifacts(steps_dir: &Path) -> Result<BTreeMap<u64, PathBuf>> {
    if !steps_dir.is_dir() {
        return Err(AnalysisError::not_found("steps directory", steps_dir));
    }

    let mut artifacts = BTreeMap::new();
    for entry in fs::read_dir(steps_dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let Some(step) = parse_step_index(&name) else {
            trace!("Ignoring {} in {}", name, steps_dir.display());
            continue;
        };
        if let Some(previous) = artifacts.insert(step, entry.path()) {
            return Err(AnalysisError::malformed(
                steps_dir,
                format!("step {} appears twice ({} and {})", step, previous.display(), name),
            ));
        }
    }
    if artifacts.is_empty() {
        return Err(AnalysisError::not_found("step artifacts", steps_dir));
    }
    Ok(artifacts)
}

fn read_step(path: &Path, step: u64) -> Result<(csv::StringRecord, Snapshot)> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_path(path)?;
    let headers = reader.headers()?.clone();
    if let Some(column) = REQUIRED_COLUMNS.iter().find(|c| !headers.iter().any(|h| h == **c)) {
        return Err(AnalysisError::malformed(path, format!("missing column '{}'", column)));
    }

    let records = reader
        .deserialize::<ParticleRecord>()
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| AnalysisError::malformed(path, e.to_string()))?;
    Ok((headers, Snapshot::from_records(step, &records)))
}
