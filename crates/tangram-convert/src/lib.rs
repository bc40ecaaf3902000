//! Sensor-to-model conversion for tangram pieces.
//!
//! Current focus:
//! - scale calibration with a square-first fallback chain,
//! - deterministic vertex canonicalization,
//! - frame conversion into the normalized internal model,
//! - calibration persistence and YOLO label import.
//!
//! Geometry primitives and the data model live in `tangram-core`.

mod calibration;
mod canonical;
mod converter;
mod io;
mod labels;
mod store;

pub use calibration::{
    CalibrationError, CalibrationParams, CalibrationSample, ScaleCalibrator, ScaleEstimator,
    DEFAULT_ESTIMATORS,
};
pub use canonical::{canonicalize, required_vertices, CanonicalPolygon};
pub use converter::{
    ConvertError, ConverterParams, CoordinateConverter, FrameConversion, ObjectError,
    SkippedObject,
};
pub use io::{load_frames, load_json, write_json, IoError};
pub use labels::{frame_from_labels, load_labels, object_from_polygon, parse_labels, LabelPolygon};
pub use store::{
    CalibrationRecord, CalibrationStore, JsonCalibrationStore, MemoryCalibrationStore, StoreError,
};

pub use tangram_core::{CvFrame, CvObject, InternalPuzzleState, PieceType};
