use crate::Homography;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// One object reported by the detector, in sensor pixel space.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CvObject {
    pub label: String,
    #[serde(default)]
    pub class_id: i32,
    /// Sensor rotation in degrees (clockwise on screen).
    #[serde(default)]
    pub rotation_deg: f64,
    pub translation: Point2<f64>,
    pub vertices: Vec<Point2<f64>>,
    #[serde(default)]
    pub stable_id: Option<String>,
    #[serde(default)]
    pub confidence: Option<f32>,
}

impl CvObject {
    pub fn new(
        label: impl Into<String>,
        translation: Point2<f64>,
        rotation_deg: f64,
        vertices: Vec<Point2<f64>>,
    ) -> Self {
        Self {
            label: label.into(),
            class_id: -1,
            rotation_deg,
            translation,
            vertices,
            stable_id: None,
            confidence: None,
        }
    }
}

/// One sensor frame.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CvFrame {
    /// Row-major 3×3 perspective correction.
    #[serde(default)]
    pub homography: Option<[[f64; 3]; 3]>,
    /// The sensor already applied `homography` to the coordinates below.
    #[serde(default)]
    pub homography_applied: bool,
    #[serde(default)]
    pub objects: Vec<CvObject>,
    /// Frame clock in seconds.
    #[serde(default)]
    pub timestamp: f64,
}

impl CvFrame {
    pub fn new(timestamp: f64, objects: Vec<CvObject>) -> Self {
        Self {
            homography: None,
            homography_applied: false,
            objects,
            timestamp,
        }
    }

    pub fn with_homography(mut self, h: Homography, applied: bool) -> Self {
        self.homography = Some(h.to_array());
        self.homography_applied = applied;
        self
    }

    /// The matrix still to be applied, if any.
    pub fn pending_homography(&self) -> Option<Homography> {
        if self.homography_applied {
            return None;
        }
        self.homography.map(Homography::from_array)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_json_fills_defaults() {
        let raw = r#"{"objects":[{"label":"square","translation":[10.0,20.0],"vertices":[[0,0],[1,0],[1,1],[0,1]]}]}"#;
        let frame: CvFrame = serde_json::from_str(raw).expect("parse");
        assert!(frame.homography.is_none());
        assert!(!frame.homography_applied);
        assert_eq!(frame.timestamp, 0.0);
        assert_eq!(frame.objects[0].rotation_deg, 0.0);
        assert_eq!(frame.objects[0].translation, Point2::new(10.0, 20.0));
        assert!(frame.objects[0].confidence.is_none());
    }

    #[test]
    fn applied_flag_suppresses_pending_homography() {
        let frame = CvFrame::new(0.0, Vec::new()).with_homography(Homography::identity(), true);
        assert!(frame.pending_homography().is_none());
        let frame = CvFrame::new(0.0, Vec::new()).with_homography(Homography::identity(), false);
        assert!(frame.pending_homography().is_some());
    }
}
