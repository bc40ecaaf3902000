//! Angle helpers for the internal (normalized) coordinate space.
//!
//! Internal rotations are radians, counter-clockwise positive, and always
//! live in the half-open interval `(-π, π]`. Sensor rotations use the
//! clockwise screen convention; the coordinate converter is the only place
//! where the two conventions meet.

use nalgebra::{Rotation2, Vector2};
use std::f64::consts::TAU;

/// Map `a` into `(-π, π]`.
///
/// `+π` is kept, `-π` maps to `+π`. Values already in range are returned
/// unchanged, so repeated application is exact. Non-finite input is passed
/// through.
#[inline]
pub fn normalize_angle(a: f64) -> f64 {
    reduce_by_symmetry(a, TAU)
}

/// Rotate `v` by `a` radians (counter-clockwise positive).
#[inline]
pub fn rotate_vector(v: Vector2<f64>, a: f64) -> Vector2<f64> {
    Rotation2::new(a) * v
}

/// Reduce `angle` modulo `period` into `(-period/2, period/2]`.
///
/// A non-positive or non-finite period leaves the angle untouched.
pub fn reduce_by_symmetry(angle: f64, period: f64) -> f64 {
    if !angle.is_finite() || !period.is_finite() || period <= 0.0 {
        return angle;
    }
    let half = 0.5 * period;
    if angle > -half && angle <= half {
        return angle;
    }
    let mut r = angle.rem_euclid(period);
    if r > half {
        r -= period;
    }
    // rem_euclid can round up to exactly `period`, which lands on -half.
    if r <= -half {
        r += period;
    }
    r
}

/// Smallest absolute difference between two internal angles.
#[inline]
pub fn angle_distance(a: f64, b: f64) -> f64 {
    normalize_angle(a - b).abs()
}

/// Convert sensor degrees into normalized radians.
#[inline]
pub fn degrees_to_internal(deg: f64) -> f64 {
    normalize_angle(deg.to_radians())
}
