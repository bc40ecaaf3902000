//! Coordinate conversion pipeline.
//!
//! Wires together homography correction, scale calibration, vertex
//! canonicalization and pose derivation, turning one sensor frame into an
//! [`InternalPuzzleState`](tangram_core::InternalPuzzleState).

mod error;
mod normalize;
mod params;
mod pipeline;
mod result;

pub use error::{ConvertError, ObjectError};
pub use params::ConverterParams;
pub use pipeline::CoordinateConverter;
pub use result::{FrameConversion, SkippedObject};
