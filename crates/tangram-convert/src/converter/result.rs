use super::error::{ConvertError, ObjectError};
use serde::{Deserialize, Serialize};
use tangram_core::InternalPuzzleState;

/// An object that did not make it into the internal state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SkippedObject {
    /// Index in the frame's object list.
    pub index: usize,
    pub label: String,
    pub reason: ObjectError,
}

/// Output of converting one frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrameConversion {
    pub state: InternalPuzzleState,
    pub skipped: Vec<SkippedObject>,
    /// Frame-level diagnostic; set only when the whole frame was dropped.
    #[serde(default)]
    pub error: Option<ConvertError>,
}

impl FrameConversion {
    pub fn uncalibrated(skipped: Vec<SkippedObject>) -> Self {
        Self {
            state: InternalPuzzleState::empty(),
            skipped,
            error: Some(ConvertError::NoCalibrationSource),
        }
    }

    pub fn is_calibrated(&self) -> bool {
        self.error.is_none()
    }
}
