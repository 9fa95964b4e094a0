//! Observable pipeline for flocking simulations: snapshots to order parameter,
//! stationary-state detection, cross-run aggregation and sweep accumulation.

pub mod aggregate;
pub mod order_parameter;
pub mod pipeline;
pub mod stationarity;
pub mod stats;
pub mod store;
pub mod sweep;

pub use aggregate::aggregate;
pub use order_parameter::{ConsistencyWarning, OrderParameterSeries};
pub use stationarity::{StationarityDetector, StationarityResult};
pub use store::{RunGroup, RunHandle, SnapshotStore};
pub use sweep::{SweepAccumulator, SweepRow};
