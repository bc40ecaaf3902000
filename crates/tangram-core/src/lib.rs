//! Core types and geometry for the tangram bridge.
//!
//! This crate is intentionally small and purely geometric: angle helpers,
//! the perspective transform, polygon utilities, and the data model shared by
//! the converter and the session (sensor frames, pieces, targets). It does
//! *not* know about calibration caches or piece lifecycles.

mod angle;
mod frame;
mod homography;
mod logger;
mod piece;
mod polygon;

pub use angle::{
    angle_distance, degrees_to_internal, normalize_angle, reduce_by_symmetry, rotate_vector,
};
pub use frame::{CvFrame, CvObject};
pub use homography::{Homography, MIN_PERSPECTIVE_W};
pub use piece::{
    InternalPiece, InternalPuzzleState, PiecePose, PieceType, ShapeClass, TargetPiece,
    SCHEMA_VERSION,
};
pub use polygon::{
    centroid, edge_lengths, is_clockwise, right_angle_vertex, signed_area, simplify_to,
    triangle_leg_length, PolygonError, DEFAULT_AMBIGUITY_REL_TOL,
};

#[cfg(feature = "tracing")]
pub use logger::{init_tracing, DEFAULT_TRACING_FILTER};

pub use logger::init_with_level;
