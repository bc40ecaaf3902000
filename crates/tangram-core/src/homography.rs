use nalgebra::{Matrix3, Point2, Vector3};
use serde::{Deserialize, Serialize};

/// Smallest perspective divisor accepted by [`Homography::apply`].
pub const MIN_PERSPECTIVE_W: f64 = 1e-12;

/// 3×3 projective transform in sensor pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Homography {
    pub h: Matrix3<f64>,
}

impl Homography {
    pub fn new(h: Matrix3<f64>) -> Self {
        Self { h }
    }

    pub fn identity() -> Self {
        Self::new(Matrix3::identity())
    }

    pub fn from_array(rows: [[f64; 3]; 3]) -> Self {
        Self::new(Matrix3::from_row_slice(&[
            rows[0][0], rows[0][1], rows[0][2], rows[1][0], rows[1][1], rows[1][2], rows[2][0],
            rows[2][1], rows[2][2],
        ]))
    }

    pub fn to_array(&self) -> [[f64; 3]; 3] {
        [
            [self.h[(0, 0)], self.h[(0, 1)], self.h[(0, 2)]],
            [self.h[(1, 0)], self.h[(1, 1)], self.h[(1, 2)]],
            [self.h[(2, 0)], self.h[(2, 1)], self.h[(2, 2)]],
        ]
    }

    /// Homogeneous product followed by the perspective divide.
    ///
    /// Returns `None` when the divisor vanishes (point on the line at infinity).
    #[inline]
    pub fn apply(&self, p: Point2<f64>) -> Option<Point2<f64>> {
        let v = self.h * Vector3::new(p.x, p.y, 1.0);
        let w = v[2];
        if !w.is_finite() || w.abs() < MIN_PERSPECTIVE_W {
            return None;
        }
        Some(Point2::new(v[0] / w, v[1] / w))
    }

    pub fn inverse(&self) -> Option<Self> {
        self.h.try_inverse().map(Self::new)
    }

    /// Whether every entry of the scale-normalized matrix is within `eps` of identity.
    ///
    /// Informational only: callers must not use it to skip the transform.
    pub fn is_near_identity(&self, eps: f64) -> bool {
        let s = self.h[(2, 2)];
        if s.abs() < MIN_PERSPECTIVE_W {
            return false;
        }
        let n = self.h / s;
        (n - Matrix3::identity()).iter().all(|v| v.abs() <= eps)
    }
}
