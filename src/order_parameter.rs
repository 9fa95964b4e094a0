use flocking_common::error::{AnalysisError, Result};
use flocking_common::{ParameterSet, RunSeries, Snapshot};

/// An order-parameter value outside `[0, 1]`.
///
/// Usually means the configured speed `v` does not match the units of the
/// snapshot velocities. The value is kept as computed.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsistencyWarning {
    pub step: u64,
    pub time: f64,
    pub value: f64,
}

impl std::fmt::Display for ConsistencyWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "order parameter {:.6} at step {} (t={}) is outside [0, 1]; \
             check that v matches the snapshot velocity units",
            self.value,
            self.step,
            self.time
        )
    }
}

/// Per-run order-parameter series together with any out-of-range samples.
#[derive(Debug, Clone)]
pub struct OrderParameterSeries {
    pub series: RunSeries,
    pub warnings: Vec<ConsistencyWarning>,
}

/// Normalized net velocity of one snapshot: `|sum v_i| / (N * v0)`.
///
/// `N` and `v0` come from the configuration, not from the snapshot.
pub fn polarization(snapshot: &Snapshot, n: u32, v0: f64) -> f64 {
    snapshot.net_velocity().length() / (n as f64 * v0)
}

/// Reduces the snapshots of one run to its order-parameter time series.
///
/// Sample `i` is placed at `t = i * save_every`, and snapshot `i` must have been saved
/// at step `i * save_every`; anything else would mislabel the time axis.
pub fn compute(snapshots: &[Snapshot], params: &ParameterSet) -> Result<OrderParameterSeries> {
    let save_every = params.save_every as f64;
    let mut times = Vec::with_capacity(snapshots.len());
    let mut values = Vec::with_capacity(snapshots.len());
    let mut warnings = Vec::new();

    for (i, snapshot) in snapshots.iter().enumerate() {
        let expected_step = i as u64 * params.save_every;
        if snapshot.step != expected_step {
            return Err(AnalysisError::InvalidArgument(format!(
                "snapshot {} was saved at step {}, expected step {} (save_every = {})",
                i, snapshot.step, expected_step, params.save_every
            )));
        }
        let time = i as f64 * save_every;
        let value = polarization(snapshot, params.n, params.v);
        if !(0.0..=1.0).contains(&value) {
            warnings.push(ConsistencyWarning { step: snapshot.step, time, value });
        }
        times.push(time);
        values.push(value);
    }

    Ok(OrderParameterSeries { series: RunSeries::new(times, values)?, warnings })
}

#[cfg(test)]
mod tests {
    use super::*;
    use flocking_common::vecmath::polar;
    use std::path::Path;

    fn params(n: u32, v: f64, save_every: u64) -> ParameterSet {
        let fields: Vec<(String, f64)> = [
            ("N", n as f64),
            ("L", 10.0),
            ("v", v),
            ("eta", 0.1),
            ("r", 1.0),
            ("steps", 100.0),
            ("save_every", save_every as f64),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), *v))
        .collect();
        ParameterSet::from_fields(&fields, Path::new("params.csv")).unwrap()
    }

    fn snapshot(step: u64, velocities: &[(f64, f64)]) -> Snapshot {
        Snapshot {
            step,
            x: vec![0.0; velocities.len()],
            y: vec![0.0; velocities.len()],
            vx: velocities.iter().map(|v| v.0).collect(),
            vy: velocities.iter().map(|v| v.1).collect(),
        }
    }

    #[test]
    fn aligned_particles_give_unit_order() {
        let v0 = 0.03;
        let heading = polar(0.7, v0);
        let snapshots: Vec<Snapshot> =
            (0..5).map(|s| snapshot(s, &[(heading.x, heading.y); 50])).collect();

        let result = compute(&snapshots, &params(50, v0, 1)).unwrap();
        assert!(result.series.values().iter().all(|va| (va - 1.0).abs() < 1e-9));
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn opposing_pairs_give_zero_order() {
        let snapshots = vec![
            snapshot(0, &[(0.03, 0.0), (-0.03, 0.0)]),
            snapshot(1, &[(0.0, 0.03), (0.0, -0.03), (0.021, 0.021), (-0.021, -0.021)]),
        ];
        let result = compute(&snapshots, &params(4, 0.03, 1)).unwrap();
        assert!(result.series.values().iter().all(|va| va.abs() < 1e-12));
    }

    #[test]
    fn times_follow_save_interval() {
        let snapshots: Vec<Snapshot> = (0..4).map(|s| snapshot(s * 5, &[(0.03, 0.0)])).collect();
        let result = compute(&snapshots, &params(1, 0.03, 5)).unwrap();
        assert_eq!(result.series.times(), &[0.0, 5.0, 10.0, 15.0]);
    }

    #[test]
    fn snapshot_off_the_save_grid_is_rejected() {
        // save_every = 2 but a step 3 snapshot sits between steps 2 and 4.
        let snapshots: Vec<Snapshot> =
            [0, 2, 3, 4].iter().map(|&s| snapshot(s, &[(0.03, 0.0)])).collect();
        let result = compute(&snapshots, &params(1, 0.03, 2));
        assert!(matches!(result, Err(AnalysisError::InvalidArgument(_))));
    }

    #[test]
    fn uses_configured_particle_count() {
        // Two particles on disk, four configured: alignment is halved.
        let snapshots = vec![snapshot(0, &[(0.03, 0.0), (0.03, 0.0)])];
        let result = compute(&snapshots, &params(4, 0.03, 1)).unwrap();
        assert!((result.series.values()[0] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn unit_mismatch_is_reported_not_clamped() {
        // Velocities in different units than v.
        let snapshots = vec![snapshot(0, &[(3.0, 0.0), (3.0, 0.0)])];
        let result = compute(&snapshots, &params(2, 0.03, 1)).unwrap();

        assert_eq!(result.warnings.len(), 1);
        assert!((result.series.values()[0] - 100.0).abs() < 1e-9);
        assert_eq!(result.warnings[0].value, result.series.values()[0]);
    }
}
