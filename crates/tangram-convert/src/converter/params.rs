use crate::calibration::CalibrationParams;
use serde::{Deserialize, Serialize};

/// Configuration for the coordinate converter.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ConverterParams {
    /// Scale calibration settings (also used for right-angle detection).
    pub calibration: CalibrationParams,
    /// Objects reporting a confidence below this are skipped.
    ///
    /// Objects without a confidence always pass.
    pub min_confidence: f32,
    /// Resolve unknown labels through the segmentation class id.
    pub class_id_fallback: bool,
    /// Tolerance for the informational near-identity check on homographies.
    pub identity_eps: f64,
}

impl Default for ConverterParams {
    fn default() -> Self {
        Self {
            calibration: CalibrationParams::default(),
            min_confidence: 0.0,
            class_id_fallback: false,
            identity_eps: 1e-9,
        }
    }
}
