use crate::vecmath::Vec2;
use serde::{Deserialize, Serialize};

/// One saved simulation step: per-particle positions and velocities.
///
/// Stored as a struct of arrays; `x`, `y`, `vx` and `vy` always have the same length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Step index the simulator saved this state at.
    pub step: u64,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub vx: Vec<f64>,
    pub vy: Vec<f64>,
}

/// One row of a per-step artifact. The simulator also writes an `id` column, which is ignored.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ParticleRecord {
    pub x: f64,
    pub y: f64,
    pub vx: f64,
    pub vy: f64,
}

impl Snapshot {
    pub fn from_records(step: u64, records: &[ParticleRecord]) -> Self {
        Snapshot {
            step,
            x: records.iter().map(|p| p.x).collect(),
            y: records.iter().map(|p| p.y).collect(),
            vx: records.iter().map(|p| p.vx).collect(),
            vy: records.iter().map(|p| p.vy).collect(),
        }
    }

    /// Number of particles present in this snapshot.
    pub fn particle_count(&self) -> usize {
        self.vx.len()
    }

    pub fn velocities(&self) -> impl Iterator<Item = Vec2> + '_ {
        self.vx.iter().zip(&self.vy).map(|(&vx, &vy)| Vec2::new(vx, vy))
    }

    /// Sum of all particle velocities.
    pub fn net_velocity(&self) -> Vec2 {
        self.velocities().sum()
    }
}
