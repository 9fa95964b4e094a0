use crate::aggregate::aggregate;
use crate::order_parameter;
use crate::stationarity::{StationarityDetector, StationarityResult};
use crate::store::{RunHandle, SnapshotStore};
use crate::sweep::SweepAccumulator;
use anyhow::{Context, Result};
use flocking_common::{AggregatedSeries, AnalysisConfig, ParameterSet, RunSeries};
use log::{debug, error, info, warn};
use rayon::prelude::*;
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::Instant;

pub const AGGREGATED_FILE: &str = "polarization_avg.csv";
pub const REPORT_FILE: &str = "stationary.json";

/// Outcome of analysing one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub samples: usize,
    /// Number of samples outside `[0, 1]`.
    pub consistency_warnings: usize,
    pub stationarity: StationarityResult,
}

/// Outcome of analysing one parameter group; also written as `stationary.json`.
#[derive(Debug, Clone, Serialize)]
pub struct GroupReport {
    pub group: PathBuf,
    pub params: ParameterSet,
    pub threshold: f64,
    pub min_stable_run: usize,
    pub runs: Vec<RunReport>,
    pub failed_runs: Vec<String>,
    /// Stationarity of the cross-run mean; its mean/std are the sweep observable.
    pub aggregate: StationarityResult,
}

/// Counts returned by [`process_sweep`].
#[derive(Debug, Clone, Default)]
pub struct SweepSummary {
    pub processed: usize,
    pub failed: Vec<(PathBuf, String)>,
}

struct RunAnalysis {
    series: RunSeries,
    report: RunReport,
}

/// Load, reduce and analyse a single run.
fn process_run(
    store: &SnapshotStore,
    run: &RunHandle,
    detector: &StationarityDetector,
    config: &AnalysisConfig,
) -> Result<RunAnalysis> {
    let snapshots = store.load_run(run)?;
    let computed = order_parameter::compute(&snapshots, &run.params)?;
    for warning in &computed.warnings {
        warn!("Run {}: {}", run.id, warning);
    }

    if config.output.write_run_series {
        let path = store.write_series(run, &computed.series, config.output.precision)?;
        debug!("Run {}: series saved to {}", run.id, path.display());
    }

    let stationarity = detector.detect(&computed.series)?;
    if stationarity.found {
        info!(
            "Run {}: stationary from sample {} (t={}), <v_a> = {:.6} +- {:.6}",
            run.id, stationarity.onset, stationarity.onset_time, stationarity.mean, stationarity.std
        );
    } else {
        warn!(
            "Run {}: no stable window found, using whole series, <v_a> = {:.6} +- {:.6}",
            run.id, stationarity.mean, stationarity.std
        );
    }

    Ok(RunAnalysis {
        report: RunReport {
            run_id: run.id.clone(),
            samples: computed.series.len(),
            consistency_warnings: computed.warnings.len(),
            stationarity,
        },
        series: computed.series,
    })
}

/// Runs the whole pipeline for one parameter group and appends its row to the sweep dataset.
///
/// Runs are processed in parallel. A failing run is logged and left out of the
/// aggregate; the group fails only if no run succeeds or a group-level step fails.
pub fn process_group(
    dir: &Path,
    config: &AnalysisConfig,
    sweep: &SweepAccumulator,
) -> Result<GroupReport> {
    let start_time = Instant::now();
    let store = SnapshotStore::new(config.snapshots.allow_particle_count_change);
    let detector = StationarityDetector::new(
        config.stationarity.threshold,
        config.stationarity.min_stable_run,
    )?;

    let group = store
        .open_group(dir)
        .with_context(|| format!("Failed to open parameter group '{}'", dir.display()))?;
    let runs = store.list_runs(&group)?;
    info!("Processing {} runs in {}", runs.len(), group.dir.display());

    let results: Vec<(&RunHandle, Result<RunAnalysis>)> = runs
        .par_iter()
        .map(|run| (run, process_run(&store, run, &detector, config)))
        .collect();

    let mut series = Vec::with_capacity(results.len());
    let mut reports = Vec::with_capacity(results.len());
    let mut failed_runs = Vec::new();
    for (run, result) in results {
        match result {
            Ok(analysis) => {
                series.push(analysis.series);
                reports.push(analysis.report);
            }
            Err(e) => {
                error!("Run {} in {} failed: {:#}", run.id, group.dir.display(), e);
                failed_runs.push(run.id.clone());
            }
        }
    }
    if series.is_empty() {
        anyhow::bail!("No run in '{}' could be processed.", group.dir.display());
    }

    let aggregated: AggregatedSeries = aggregate(&series)
        .with_context(|| format!("Failed to aggregate runs of '{}'", group.dir.display()))?;
    let aggregated_path = group.dir.join(AGGREGATED_FILE);
    aggregated.write_csv(&aggregated_path, config.output.precision)?;
    info!("Average of {} runs saved to {}", aggregated.run_count, aggregated_path.display());

    let stationarity = detector.detect(&aggregated.mean_series()?)?;
    let report = GroupReport {
        group: group.dir.clone(),
        params: group.params.clone(),
        threshold: detector.threshold(),
        min_stable_run: detector.min_stable_run(),
        runs: reports,
        failed_runs,
        aggregate: stationarity,
    };

    if config.output.write_report {
        let report_path = group.dir.join(REPORT_FILE);
        let file = File::create(&report_path)
            .with_context(|| format!("Failed to create report '{}'", report_path.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &report)?;
        debug!("Stationarity report saved to {}", report_path.display());
    }

    sweep
        .append(&group.params, stationarity.mean, stationarity.std)
        .with_context(|| {
            format!("Failed to append '{}' to {}", group.dir.display(), sweep.path().display())
        })?;

    info!(
        "Group {} done in {:.2} s: <v_a> = {:.6} +- {:.6} (stationary from t={}{})",
        group.dir.display(),
        start_time.elapsed().as_secs_f64(),
        stationarity.mean,
        stationarity.std,
        stationarity.onset_time,
        if stationarity.found { "" } else { ", fallback" }
    );
    Ok(report)
}

/// Processes every group in parallel. Failures are logged and collected, never fatal for
/// other groups.
pub fn process_sweep(
    groups: &[PathBuf],
    config: &AnalysisConfig,
    sweep: &SweepAccumulator,
) -> SweepSummary {
    let outcomes: Vec<(&PathBuf, Result<GroupReport>)> = groups
        .par_iter()
        .map(|dir| (dir, process_group(dir, config, sweep)))
        .collect();

    let mut summary = SweepSummary::default();
    for (dir, outcome) in outcomes {
        match outcome {
            Ok(_) => summary.processed += 1,
            Err(e) => {
                error!("Group {} failed: {:#}", dir.display(), e);
                summary.failed.push((dir.clone(), format!("{:#}", e)));
            }
        }
    }
    summary
}
