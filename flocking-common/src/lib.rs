pub mod config;
pub mod error;
pub mod params;
pub mod series;
pub mod snapshot;
pub mod vecmath;

// Re-export key types for easier use by dependent crates
pub use config::{
    AggregationConfig, AnalysisConfig, InputConfig, OutputConfig, SnapshotConfig,
    StationarityConfig,
};
pub use error::{AnalysisError, Result};
pub use params::ParameterSet;
pub use series::{AggregatedSeries, RunSeries};
pub use snapshot::{ParticleRecord, Snapshot};
pub use vecmath::Vec2;
