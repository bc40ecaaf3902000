//! Small polygon utilities shared by calibration and canonicalization.
//!
//! All functions work in sensor pixel space with the screen convention
//! (Y grows downwards), so a positive shoelace area means the vertices run
//! clockwise on screen.

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Default relative tolerance for deciding that the two longest triangle
/// edges are too close to tell the hypotenuse apart.
pub const DEFAULT_AMBIGUITY_REL_TOL: f64 = 0.05;

const MIN_AREA: f64 = 1e-9;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolygonError {
    #[error("need {needed} vertices, got {found}")]
    InsufficientVertices { needed: usize, found: usize },
    #[error("two longest edges are near-equal, right angle is ambiguous")]
    AmbiguousRightAngle,
    #[error("polygon has zero area or non-finite coordinates")]
    DegenerateShape,
}

/// Length of edge `i -> i+1` (wrapping), one per vertex.
pub fn edge_lengths(vertices: &[Point2<f64>]) -> Vec<f64> {
    let n = vertices.len();
    (0..n)
        .map(|i| (vertices[(i + 1) % n] - vertices[i]).norm())
        .collect()
}

/// Shoelace area; positive for clockwise-on-screen order.
pub fn signed_area(vertices: &[Point2<f64>]) -> f64 {
    let n = vertices.len();
    if n < 3 {
        return 0.0;
    }
    let mut acc = 0.0;
    for i in 0..n {
        let a = vertices[i];
        let b = vertices[(i + 1) % n];
        acc += a.x * b.y - b.x * a.y;
    }
    0.5 * acc
}

#[inline]
pub fn is_clockwise(vertices: &[Point2<f64>]) -> bool {
    signed_area(vertices) >= 0.0
}

pub fn centroid(vertices: &[Point2<f64>]) -> Option<Point2<f64>> {
    if vertices.is_empty() {
        return None;
    }
    let n = vertices.len() as f64;
    let (sx, sy) = vertices
        .iter()
        .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
    Some(Point2::new(sx / n, sy / n))
}

/// Index of the right-angle vertex of a triangle.
///
/// The hypotenuse is the longest edge; the right angle sits on the vertex that
/// is not one of its endpoints. Two longest edges within `ambiguity_rel_tol`
/// of each other make the choice ambiguous.
pub fn right_angle_vertex(
    vertices: &[Point2<f64>],
    ambiguity_rel_tol: f64,
) -> Result<usize, PolygonError> {
    if vertices.len() < 3 {
        return Err(PolygonError::InsufficientVertices {
            needed: 3,
            found: vertices.len(),
        });
    }
    let tri = &vertices[..3];
    if tri.iter().any(|p| !p.x.is_finite() || !p.y.is_finite())
        || signed_area(tri).abs() < MIN_AREA
    {
        return Err(PolygonError::DegenerateShape);
    }

    let lengths = edge_lengths(tri);
    let mut order = [0usize, 1, 2];
    order.sort_by(|&a, &b| lengths[b].total_cmp(&lengths[a]));
    let longest = lengths[order[0]];
    let second = lengths[order[1]];
    if longest - second <= ambiguity_rel_tol * longest {
        return Err(PolygonError::AmbiguousRightAngle);
    }

    // Edge i joins vertex i and i+1, the opposite vertex is i+2.
    Ok((order[0] + 2) % 3)
}

/// Mean length of the two legs meeting at the right angle.
pub fn triangle_leg_length(
    vertices: &[Point2<f64>],
    ambiguity_rel_tol: f64,
) -> Result<f64, PolygonError> {
    let apex = right_angle_vertex(vertices, ambiguity_rel_tol)?;
    let a = vertices[apex];
    let b = vertices[(apex + 1) % 3];
    let c = vertices[(apex + 2) % 3];
    Ok(0.5 * ((b - a).norm() + (c - a).norm()))
}

/// Reduce a contour to `target` vertices.
///
/// Repeatedly drops the vertex whose removal changes the enclosed area least,
/// which keeps the true corners of a convex piece outline.
pub fn simplify_to(vertices: &[Point2<f64>], target: usize) -> Vec<Point2<f64>> {
    let mut out = vertices.to_vec();
    if target < 3 {
        return out;
    }
    while out.len() > target {
        let n = out.len();
        let weakest = (0..n)
            .map(|i| {
                let prev = out[(i + n - 1) % n];
                let cur = out[i];
                let next = out[(i + 1) % n];
                (i, signed_area(&[prev, cur, next]).abs())
            })
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, _)| i);
        match weakest {
            Some(i) => {
                out.remove(i);
            }
            None => break,
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn pts(raw: &[(f64, f64)]) -> Vec<Point2<f64>> {
        raw.iter().map(|&(x, y)| Point2::new(x, y)).collect()
    }

    #[test]
    fn screen_clockwise_has_positive_area() {
        // right, down, left: clockwise when Y points down
        let cw = pts(&[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)]);
        assert_relative_eq!(signed_area(&cw), 100.0);
        assert!(is_clockwise(&cw));
        let ccw: Vec<_> = cw.iter().rev().copied().collect();
        assert_relative_eq!(signed_area(&ccw), -100.0);
    }

    #[test]
    fn right_angle_found_opposite_hypotenuse() {
        let tri = pts(&[(0.0, 0.0), (100.0, 0.0), (0.0, 100.0)]);
        assert_eq!(right_angle_vertex(&tri, DEFAULT_AMBIGUITY_REL_TOL), Ok(0));
        let tri = pts(&[(100.0, 0.0), (0.0, 100.0), (0.0, 0.0)]);
        assert_eq!(right_angle_vertex(&tri, DEFAULT_AMBIGUITY_REL_TOL), Ok(2));
        assert_relative_eq!(
            triangle_leg_length(&tri, DEFAULT_AMBIGUITY_REL_TOL).expect("leg"),
            100.0
        );
    }

    #[test]
    fn equilateral_triangle_is_ambiguous() {
        let h = 3f64.sqrt() * 50.0;
        let tri = pts(&[(0.0, 0.0), (100.0, 0.0), (50.0, h)]);
        assert_eq!(
            right_angle_vertex(&tri, DEFAULT_AMBIGUITY_REL_TOL),
            Err(PolygonError::AmbiguousRightAngle)
        );
    }

    #[test]
    fn collinear_points_are_degenerate() {
        let tri = pts(&[(0.0, 0.0), (1.0, 1.0), (2.0, 2.0)]);
        assert_eq!(
            right_angle_vertex(&tri, DEFAULT_AMBIGUITY_REL_TOL),
            Err(PolygonError::DegenerateShape)
        );
    }

    #[test]
    fn simplify_drops_midpoints_first() {
        let contour = pts(&[
            (0.0, 0.0),
            (50.0, 0.3),
            (100.0, 0.0),
            (100.0, 100.0),
            (50.0, 100.2),
            (0.0, 100.0),
        ]);
        let simplified = simplify_to(&contour, 4);
        assert_eq!(
            simplified,
            pts(&[(0.0, 0.0), (100.0, 0.0), (100.0, 100.0), (0.0, 100.0)])
        );
    }
}
