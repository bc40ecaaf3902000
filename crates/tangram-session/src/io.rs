//! JSON configuration and report helpers for puzzle sessions.

use crate::{FrameReport, PuzzleSession, SessionParams};
use log::info;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tangram_convert::{
    load_json, write_json, CalibrationStore, IoError, JsonCalibrationStore,
    MemoryCalibrationStore, StoreError,
};
use tangram_core::{CvFrame, TargetPiece};

#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Io(#[from] IoError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Configuration of a session run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub params: SessionParams,
    pub targets: Vec<TargetPiece>,
    /// Persisted calibration file; an in-memory cache when absent.
    #[serde(default)]
    pub calibration_path: Option<PathBuf>,
    /// Overrides the persisted camera-inversion flag.
    #[serde(default)]
    pub camera_inverted: Option<bool>,
}

impl SessionConfig {
    /// Load a JSON config from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, IoError> {
        load_json(path)
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), IoError> {
        write_json(self, path)
    }

    /// Build a session, opening the calibration file when one is configured.
    pub fn build_session(
        &self,
    ) -> Result<PuzzleSession<Box<dyn CalibrationStore + Send>>, SessionError> {
        let mut store: Box<dyn CalibrationStore + Send> = match &self.calibration_path {
            Some(path) => Box::new(JsonCalibrationStore::open(path)?),
            None => Box::new(MemoryCalibrationStore::new()),
        };
        if let Some(inverted) = self.camera_inverted {
            store.set_camera_inverted(inverted);
        }
        Ok(PuzzleSession::new(
            self.targets.clone(),
            self.params.clone(),
            store,
        ))
    }
}

/// Report of a whole run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    pub frames: Vec<FrameReport>,
    pub complete: bool,
    /// Targets held by a Validated piece at the end of the run.
    pub validated: usize,
    pub targets: usize,
}

impl SessionReport {
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, IoError> {
        load_json(path)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), IoError> {
        write_json(self, path)
    }
}

/// Feed every frame through a session and collect the reports.
pub fn run_session<S: CalibrationStore>(
    session: &mut PuzzleSession<S>,
    frames: &[CvFrame],
) -> SessionReport {
    let reports: Vec<FrameReport> = frames.iter().map(|f| session.process_frame(f)).collect();
    let report = SessionReport {
        frames: reports,
        complete: session.is_complete(),
        validated: session.validated_count(),
        targets: session.targets().len(),
    };
    info!(
        "{} frames processed, {}/{} targets validated",
        report.frames.len(),
        report.validated,
        report.targets
    );
    report
}
