use crate::{convert, session};
use std::path::Path;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Errors produced by the high-level facade helpers.
#[derive(thiserror::Error, Debug)]
pub enum RunError {
    #[error("invalid image size {width}x{height}")]
    InvalidImageSize { width: u32, height: u32 },

    #[error(transparent)]
    Io(#[from] convert::IoError),

    #[error(transparent)]
    Session(#[from] session::SessionError),
}

/// Load a session config and a frame sequence, then run every frame.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip_all, fields(config = %config.as_ref().display()))
)]
pub fn run_files(
    config: impl AsRef<Path>,
    frames: impl AsRef<Path>,
) -> Result<session::SessionReport, RunError> {
    let config = session::SessionConfig::load_json(config)?;
    let frames = convert::load_frames(frames)?;
    let mut puzzle = config.build_session()?;
    Ok(session::run_session(&mut puzzle, &frames))
}

/// Turn a YOLO polygon label file into one sensor frame at `timestamp`.
pub fn labels_to_frame(
    labels: impl AsRef<Path>,
    width: u32,
    height: u32,
    timestamp: f64,
) -> Result<crate::CvFrame, RunError> {
    if width == 0 || height == 0 {
        return Err(RunError::InvalidImageSize { width, height });
    }
    Ok(convert::frame_from_labels(labels, width, height, timestamp)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_sized_image_is_rejected() {
        let err = labels_to_frame("missing.txt", 0, 480, 0.0).unwrap_err();
        assert!(matches!(
            err,
            RunError::InvalidImageSize {
                width: 0,
                height: 480
            }
        ));
    }

    #[test]
    fn missing_config_is_an_io_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = run_files(dir.path().join("nope.json"), dir.path().join("frames.json"))
            .unwrap_err();
        assert!(matches!(err, RunError::Io(convert::IoError::Io(_))));
    }
}
