//! Vertex canonicalization.
//!
//! Sensor vertex lists start anywhere and may run either way. The canonical
//! form runs clockwise on screen (Y down) and starts at a vertex chosen from
//! the geometry alone:
//! - square / parallelogram: smallest Y, ties broken by smallest X,
//! - triangles: the right-angle vertex.
//!
//! Parallelogram flip is read from the winding of the *raw* list, so it must
//! be computed before reordering.

use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use tangram_core::{right_angle_vertex, signed_area, simplify_to, PolygonError, ShapeClass};

const TIE_EPS: f64 = 1e-9;
const MIN_AREA: f64 = 1e-9;

/// Canonical outline of one piece.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CanonicalPolygon {
    pub vertices: Vec<Point2<f64>>,
    /// Only ever `true` for parallelograms.
    pub flipped: bool,
}

#[inline]
pub fn required_vertices(shape: ShapeClass) -> usize {
    shape.vertex_count()
}

/// Canonicalize `raw` for a piece of `shape`.
///
/// Longer contours are simplified down to the piece's vertex count first.
pub fn canonicalize(
    raw: &[Point2<f64>],
    shape: ShapeClass,
    ambiguity_rel_tol: f64,
) -> Result<CanonicalPolygon, PolygonError> {
    let needed = required_vertices(shape);
    if raw.len() < needed {
        return Err(PolygonError::InsufficientVertices {
            needed,
            found: raw.len(),
        });
    }
    if raw.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
        return Err(PolygonError::DegenerateShape);
    }

    let mut vertices = if raw.len() > needed {
        simplify_to(raw, needed)
    } else {
        raw.to_vec()
    };

    let area = signed_area(&vertices);
    if area.abs() < MIN_AREA {
        return Err(PolygonError::DegenerateShape);
    }
    let counter_clockwise = area < 0.0;
    if counter_clockwise {
        vertices.reverse();
    }

    let start = if shape.is_triangle() {
        right_angle_vertex(&vertices, ambiguity_rel_tol)?
    } else {
        top_left_vertex(&vertices)
    };
    vertices.rotate_left(start);

    Ok(CanonicalPolygon {
        vertices,
        flipped: shape == ShapeClass::Parallelogram && counter_clockwise,
    })
}

fn top_left_vertex(vertices: &[Point2<f64>]) -> usize {
    let mut best = 0;
    for (i, p) in vertices.iter().enumerate().skip(1) {
        let b = vertices[best];
        if p.y < b.y - TIE_EPS || ((p.y - b.y).abs() <= TIE_EPS && p.x < b.x) {
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use tangram_core::DEFAULT_AMBIGUITY_REL_TOL as TOL;

    fn pts(raw: &[(f64, f64)]) -> Vec<Point2<f64>> {
        raw.iter().map(|&(x, y)| Point2::new(x, y)).collect()
    }

    fn parallelogram() -> Vec<Point2<f64>> {
        // clockwise on screen, starting mid-list
        pts(&[(150.0, 50.0), (50.0, 50.0), (0.0, 0.0), (100.0, 0.0)])
    }

    #[test]
    fn square_starts_top_left_and_runs_clockwise() {
        let raw = pts(&[(0.0, 100.0), (100.0, 100.0), (100.0, 0.0), (0.0, 0.0)]);
        let c = canonicalize(&raw, ShapeClass::Square, TOL).expect("canonical");
        assert_eq!(
            c.vertices,
            pts(&[(0.0, 0.0), (100.0, 0.0), (100.0, 100.0), (0.0, 100.0)])
        );
        assert!(!c.flipped);
    }

    #[test]
    fn triangle_starts_at_right_angle() {
        let raw = pts(&[(100.0, 0.0), (0.0, 100.0), (0.0, 0.0)]);
        let c = canonicalize(&raw, ShapeClass::LargeTriangle, TOL).expect("canonical");
        assert_eq!(c.vertices[0], Point2::new(0.0, 0.0));
        assert!(signed_area(&c.vertices) > 0.0);
        assert!(!c.flipped);
    }

    #[test]
    fn canonicalization_is_idempotent() {
        let inputs = [
            (parallelogram(), ShapeClass::Parallelogram),
            (
                parallelogram().into_iter().rev().collect::<Vec<_>>(),
                ShapeClass::Parallelogram,
            ),
            (
                pts(&[(5.0, 5.0), (5.0, 55.0), (55.0, 55.0), (55.0, 5.0)]),
                ShapeClass::Square,
            ),
            (
                pts(&[(0.0, 70.0), (70.0, 0.0), (0.0, 0.0)]),
                ShapeClass::MediumTriangle,
            ),
        ];
        for (raw, shape) in inputs {
            let once = canonicalize(&raw, shape, TOL).expect("once");
            let twice = canonicalize(&once.vertices, shape, TOL).expect("twice");
            assert_eq!(once.vertices, twice.vertices);
        }
    }

    #[test]
    fn parallelogram_flip_follows_raw_winding() {
        let cw = parallelogram();
        let ccw: Vec<_> = cw.iter().rev().copied().collect();
        let again: Vec<_> = ccw.iter().rev().copied().collect();

        assert!(!canonicalize(&cw, ShapeClass::Parallelogram, TOL).expect("cw").flipped);
        assert!(canonicalize(&ccw, ShapeClass::Parallelogram, TOL).expect("ccw").flipped);
        assert!(!canonicalize(&again, ShapeClass::Parallelogram, TOL).expect("again").flipped);
    }

    #[test]
    fn reversed_square_never_reports_flip() {
        let raw = pts(&[(0.0, 0.0), (0.0, 10.0), (10.0, 10.0), (10.0, 0.0)]);
        let c = canonicalize(&raw, ShapeClass::Square, TOL).expect("canonical");
        assert!(!c.flipped);
        assert_eq!(c.vertices[1], Point2::new(10.0, 0.0));
    }

    #[test]
    fn too_few_vertices_are_rejected() {
        let raw = pts(&[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0)]);
        assert_eq!(
            canonicalize(&raw, ShapeClass::Square, TOL),
            Err(PolygonError::InsufficientVertices {
                needed: 4,
                found: 3
            })
        );
    }

    #[test]
    fn dense_contour_is_simplified() {
        let raw = pts(&[
            (0.0, 0.0),
            (40.0, 0.1),
            (80.0, 0.0),
            (80.0, 80.0),
            (0.0, 80.0),
            (0.1, 40.0),
        ]);
        let c = canonicalize(&raw, ShapeClass::Square, TOL).expect("canonical");
        assert_eq!(c.vertices.len(), 4);
        assert_eq!(c.vertices[0], Point2::new(0.0, 0.0));
    }
}
