use serde::{Deserialize, Serialize};
use std::iter::Sum;
use std::ops::{Add, AddAssign};

/// A simple 2D vector struct, used for particle velocities and their sums.
#[derive(Debug, Copy, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    /// Creates a new Vec2.
    pub fn new(x: f64, y: f64) -> Self {
        Vec2 { x, y }
    }

    /// Creates a zero vector.
    pub fn zero() -> Self {
        Vec2 { x: 0.0, y: 0.0 }
    }

    /// Calculates the squared length (magnitude) of the vector.
    pub fn length_squared(&self) -> f64 {
        self.x * self.x + self.y * self.y
    }

    /// Calculates the length (magnitude) of the vector.
    pub fn length(&self) -> f64 {
        self.length_squared().sqrt()
    }
}

// Implement standard operators for convenience
impl Add for Vec2 {
    type Output = Self;
    fn add(self, other: Self) -> Self {
        Self { x: self.x + other.x, y: self.y + other.y }
    }
}

impl AddAssign for Vec2 {
    fn add_assign(&mut self, other: Self) {
        self.x += other.x;
        self.y += other.y;
    }
}

impl Sum for Vec2 {
    fn sum<I: Iterator<Item = Vec2>>(iter: I) -> Self {
        iter.fold(Vec2::zero(), |acc, v| acc + v)
    }
}

/// Converts an angle (in radians) to a vector of the given length.
pub fn polar(angle_rad: f64, length: f64) -> Vec2 {
    Vec2::new(angle_rad.cos() * length, angle_rad.sin() * length)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sum_of_opposing_vectors_is_zero() {
        let total: Vec2 = [Vec2::new(0.3, -0.1), Vec2::new(-0.3, 0.1)].into_iter().sum();
        assert_eq!(total, Vec2::zero());
        assert_eq!(total.length(), 0.0);
    }

    #[test]
    fn polar_preserves_length() {
        let v = polar(1.234, 0.03);
        assert!((v.length() - 0.03).abs() < 1e-12);
    }
}
