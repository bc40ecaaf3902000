//! Scale calibration: pixels per square side from whatever pieces are visible.
//!
//! Estimators are tried in a fixed priority order (square, large, medium,
//! small triangle). Within one level every matching object is tried in frame
//! order before the next level is consulted; the first finite, positive
//! estimate wins.

use crate::canonical::required_vertices;
use log::debug;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use std::f64::consts::SQRT_2;
use tangram_core::{edge_lengths, triangle_leg_length, PolygonError, ShapeClass};

/// Calibration failures.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CalibrationError {
    #[error("no piece in the frame can calibrate the scale")]
    NoCalibrationSource,
    #[error(transparent)]
    Polygon(#[from] PolygonError),
}

/// Calibration parameters.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationParams {
    /// Relative tolerance below which the two longest triangle edges count as equal.
    pub ambiguity_rel_tol: f64,
}

impl Default for CalibrationParams {
    fn default() -> Self {
        Self {
            ambiguity_rel_tol: tangram_core::DEFAULT_AMBIGUITY_REL_TOL,
        }
    }
}

/// A piece outline offered to the calibrator.
#[derive(Clone, Copy, Debug)]
pub struct CalibrationSample<'a> {
    pub shape: ShapeClass,
    pub vertices: &'a [Point2<f64>],
}

type EstimateFn = fn(&[Point2<f64>], &CalibrationParams) -> Result<f64, PolygonError>;

/// One entry of the fallback chain.
#[derive(Clone, Copy)]
pub struct ScaleEstimator {
    pub name: &'static str,
    pub accepts: fn(ShapeClass) -> bool,
    pub estimate: EstimateFn,
}

impl std::fmt::Debug for ScaleEstimator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScaleEstimator")
            .field("name", &self.name)
            .finish()
    }
}

fn check_count(vertices: &[Point2<f64>], shape: ShapeClass) -> Result<(), PolygonError> {
    let needed = required_vertices(shape);
    if vertices.len() != needed {
        return Err(PolygonError::InsufficientVertices {
            needed,
            found: vertices.len(),
        });
    }
    Ok(())
}

fn square_side(vertices: &[Point2<f64>], _: &CalibrationParams) -> Result<f64, PolygonError> {
    check_count(vertices, ShapeClass::Square)?;
    let edges = edge_lengths(vertices);
    Ok(edges.iter().sum::<f64>() / edges.len() as f64)
}

fn large_triangle(vertices: &[Point2<f64>], p: &CalibrationParams) -> Result<f64, PolygonError> {
    check_count(vertices, ShapeClass::LargeTriangle)?;
    triangle_leg_length(vertices, p.ambiguity_rel_tol)
}

fn medium_triangle(vertices: &[Point2<f64>], p: &CalibrationParams) -> Result<f64, PolygonError> {
    check_count(vertices, ShapeClass::MediumTriangle)?;
    // leg = side / √2
    Ok(triangle_leg_length(vertices, p.ambiguity_rel_tol)? * SQRT_2)
}

fn small_triangle(vertices: &[Point2<f64>], p: &CalibrationParams) -> Result<f64, PolygonError> {
    check_count(vertices, ShapeClass::SmallTriangle)?;
    // leg = side / 2
    Ok(triangle_leg_length(vertices, p.ambiguity_rel_tol)? * 2.0)
}

/// Default fallback chain, highest priority first.
pub const DEFAULT_ESTIMATORS: [ScaleEstimator; 4] = [
    ScaleEstimator {
        name: "square",
        accepts: |s| s == ShapeClass::Square,
        estimate: square_side,
    },
    ScaleEstimator {
        name: "large_triangle",
        accepts: |s| s == ShapeClass::LargeTriangle,
        estimate: large_triangle,
    },
    ScaleEstimator {
        name: "medium_triangle",
        accepts: |s| s == ShapeClass::MediumTriangle,
        estimate: medium_triangle,
    },
    ScaleEstimator {
        name: "small_triangle",
        accepts: |s| s == ShapeClass::SmallTriangle,
        estimate: small_triangle,
    },
];

/// Scale calibrator running an ordered estimator chain.
#[derive(Clone, Debug)]
pub struct ScaleCalibrator {
    params: CalibrationParams,
    chain: Vec<ScaleEstimator>,
}

impl Default for ScaleCalibrator {
    fn default() -> Self {
        Self::new(CalibrationParams::default())
    }
}

impl ScaleCalibrator {
    pub fn new(params: CalibrationParams) -> Self {
        Self {
            params,
            chain: DEFAULT_ESTIMATORS.to_vec(),
        }
    }

    /// Replace the estimator chain (priority = slice order).
    pub fn with_chain(mut self, chain: Vec<ScaleEstimator>) -> Self {
        self.chain = chain;
        self
    }

    pub fn params(&self) -> &CalibrationParams {
        &self.params
    }

    /// Estimate the scale from the given samples.
    pub fn calibrate(&self, samples: &[CalibrationSample<'_>]) -> Result<f64, CalibrationError> {
        for estimator in &self.chain {
            for sample in samples.iter().filter(|s| (estimator.accepts)(s.shape)) {
                match (estimator.estimate)(sample.vertices, &self.params) {
                    Ok(scale) if scale.is_finite() && scale > 0.0 => {
                        debug!("scale {scale:.3} from {}", estimator.name);
                        return Ok(scale);
                    }
                    Ok(scale) => {
                        debug!("{} produced unusable scale {scale}", estimator.name);
                    }
                    Err(err) => {
                        debug!("{} rejected a sample: {err}", estimator.name);
                    }
                }
            }
        }
        Err(CalibrationError::NoCalibrationSource)
    }
}
