use serde::{Deserialize, Serialize};
use tangram_core::PolygonError;

/// Why a single object was dropped from a frame.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectError {
    #[error("perspective divisor vanished")]
    DegenerateTransform,
    #[error("translation or rotation is not finite")]
    NonFinitePose,
    #[error("unknown piece label {0:?}")]
    UnknownPieceLabel(String),
    #[error("confidence {confidence} below {min}")]
    LowConfidence { confidence: f32, min: f32 },
    #[error("another object already claimed piece {0}")]
    DuplicatePiece(String),
    #[error(transparent)]
    Polygon(#[from] PolygonError),
}

/// Frame-level failure: the frame yields an empty state.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConvertError {
    #[error("no cached scale and no piece in the frame can calibrate")]
    NoCalibrationSource,
}
