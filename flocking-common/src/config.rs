use crate::error::{AnalysisError, Result};
use crate::series::DEFAULT_PRECISION;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// Where to find the parameter groups to analyse
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct InputConfig {
    /// Parameter group directories, each holding `params.csv` and `sims/sim_*` runs.
    #[serde(default)]
    pub groups: Vec<PathBuf>,
}

// Stationary-state detection policy. No defaults: the caller must choose them.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct StationarityConfig {
    pub threshold: f64,
    pub min_stable_run: usize,
}

// Bounds used to clip the error band for display
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct AggregationConfig {
    #[serde(default = "default_lower_bound")]
    pub lower_bound: f64,
    #[serde(default = "default_upper_bound")]
    pub upper_bound: f64,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct SnapshotConfig {
    /// Accept runs whose particle count changes between steps.
    #[serde(default)]
    pub allow_particle_count_change: bool,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct OutputConfig {
    #[serde(default = "default_sweep_path")]
    pub sweep_path: PathBuf,
    #[serde(default = "default_precision")]
    pub precision: usize,
    #[serde(default = "default_true")]
    pub write_run_series: bool,
    #[serde(default = "default_true")]
    pub write_report: bool,
}

fn default_lower_bound() -> f64 {
    0.0
}

fn default_upper_bound() -> f64 {
    1.0 // Normalized order parameter
}

fn default_sweep_path() -> PathBuf {
    PathBuf::from("input_vs_output/input_vs_observable.csv")
}

fn default_precision() -> usize {
    DEFAULT_PRECISION
}

fn default_true() -> bool {
    true
}

impl Default for AggregationConfig {
    fn default() -> Self {
        AggregationConfig {
            lower_bound: default_lower_bound(),
            upper_bound: default_upper_bound(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            sweep_path: default_sweep_path(),
            precision: default_precision(),
            write_run_series: true,
            write_report: true,
        }
    }
}

// Main analysis configuration structure, loaded from a TOML file.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct AnalysisConfig {
    #[serde(default)]
    pub input: InputConfig,
    pub stationarity: StationarityConfig,
    #[serde(default)]
    pub aggregation: AggregationConfig,
    #[serde(default)]
    pub snapshots: SnapshotConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl AnalysisConfig {
    /// Loads the analysis configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();

        if !path_ref.is_file() {
            return Err(AnalysisError::not_found("config file", path_ref));
        }
        let config_str = std::fs::read_to_string(path_ref)?;
        let config: AnalysisConfig = toml::from_str(&config_str)
            .map_err(|e| {
                AnalysisError::malformed(path_ref, format!("failed to parse TOML: {}", e))
            })?;

        config.validate().map_err(|e| AnalysisError::malformed(path_ref, e.to_string()))?;
        Ok(config)
    }

    /// Checks value ranges. Group list emptiness is checked by the caller, since the CLI may
    /// supply groups.
    pub fn validate(&self) -> Result<()> {
        let threshold = self.stationarity.threshold;
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(AnalysisError::InvalidArgument(format!(
                "stationarity.threshold must be finite and non-negative, got {}",
                threshold
            )));
        }
        if self.stationarity.min_stable_run == 0 {
            return Err(AnalysisError::InvalidArgument(
                "stationarity.min_stable_run must be at least 1".to_string(),
            ));
        }
        if !(self.aggregation.lower_bound < self.aggregation.upper_bound) {
            return Err(AnalysisError::InvalidArgument(format!(
                "aggregation.lower_bound ({}) must be below upper_bound ({})",
                self.aggregation.lower_bound, self.aggregation.upper_bound
            )));
        }
        Ok(())
    }
}
