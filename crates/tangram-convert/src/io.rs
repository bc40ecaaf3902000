//! JSON helpers shared by configs, frame sequences and reports.

use serde::{de::DeserializeOwned, Serialize};
use std::{fs, path::Path};
use tangram_core::CvFrame;

#[derive(thiserror::Error, Debug)]
pub enum IoError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("line {line}: {message}")]
    Label { line: usize, message: String },
}

/// Load any JSON document from disk.
pub fn load_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T, IoError> {
    let raw = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

/// Write a value to disk as pretty JSON.
pub fn write_json<T: Serialize + ?Sized>(value: &T, path: impl AsRef<Path>) -> Result<(), IoError> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json)?;
    Ok(())
}

/// Load a recorded frame sequence (a JSON array of frames).
pub fn load_frames(path: impl AsRef<Path>) -> Result<Vec<CvFrame>, IoError> {
    load_json(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point2;
    use tangram_core::CvObject;

    #[test]
    fn frames_round_trip_through_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("frames.json");
        let frames = vec![
            CvFrame::new(0.0, vec![]),
            CvFrame::new(
                0.05,
                vec![CvObject::new("square", Point2::new(1.0, 2.0), 15.0, vec![])],
            ),
        ];
        write_json(&frames, &path).expect("write");
        let loaded = load_frames(&path).expect("load");
        assert_eq!(loaded, frames);
    }

    #[test]
    fn minimal_frame_json_uses_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("frames.json");
        fs::write(
            &path,
            r#"[{"objects":[{"label":"square","translation":[10,20],"vertices":[]}]}]"#,
        )
        .expect("write");
        let frames = load_frames(&path).expect("load");
        assert_eq!(frames[0].timestamp, 0.0);
        assert!(!frames[0].homography_applied);
        assert_eq!(frames[0].objects[0].stable_id, None);
        assert_eq!(frames[0].objects[0].translation, Point2::new(10.0, 20.0));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = load_frames("/nonexistent/frames.json").unwrap_err();
        assert!(matches!(err, IoError::Io(_)));
    }
}
