//! Calibration persistence collaborator.
//!
//! The converter never touches global state: it reads the cached scale and
//! the camera-inversion flag through a [`CalibrationStore`]. Stores are
//! written from the frame thread, so persistence must not block it;
//! [`JsonCalibrationStore`] hands every change to a background writer.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

/// Values persisted between sessions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrationRecord {
    #[serde(default)]
    pub scale: Option<f64>,
    #[serde(default)]
    pub camera_inverted: bool,
}

/// Storage for the calibration cache.
pub trait CalibrationStore {
    /// Cached pixels-per-square-side, if any.
    fn scale(&self) -> Option<f64>;
    /// Cache a new scale. Non-positive or non-finite values are ignored.
    fn set_scale(&mut self, scale: f64);
    /// Drop the cached scale so the next frame recalibrates.
    fn invalidate(&mut self);
    fn camera_inverted(&self) -> bool;
    fn set_camera_inverted(&mut self, inverted: bool);

    fn record(&self) -> CalibrationRecord {
        CalibrationRecord {
            scale: self.scale(),
            camera_inverted: self.camera_inverted(),
        }
    }
}

#[inline]
fn valid_scale(scale: f64) -> bool {
    scale.is_finite() && scale > 0.0
}

/// In-memory store; the default for tests and single-shot conversions.
#[derive(Clone, Debug, Default)]
pub struct MemoryCalibrationStore {
    record: CalibrationRecord,
}

impl MemoryCalibrationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_record(record: CalibrationRecord) -> Self {
        let mut store = Self::default();
        if let Some(scale) = record.scale {
            store.set_scale(scale);
        }
        store.record.camera_inverted = record.camera_inverted;
        store
    }
}

impl CalibrationStore for MemoryCalibrationStore {
    fn scale(&self) -> Option<f64> {
        self.record.scale
    }

    fn set_scale(&mut self, scale: f64) {
        if valid_scale(scale) {
            self.record.scale = Some(scale);
        }
    }

    fn invalidate(&mut self) {
        self.record.scale = None;
    }

    fn camera_inverted(&self) -> bool {
        self.record.camera_inverted
    }

    fn set_camera_inverted(&mut self, inverted: bool) {
        self.record.camera_inverted = inverted;
    }
}

/// Serialized access for several streams sharing one cache.
impl<S: CalibrationStore> CalibrationStore for Arc<Mutex<S>> {
    fn scale(&self) -> Option<f64> {
        self.lock().unwrap_or_else(PoisonError::into_inner).scale()
    }

    fn set_scale(&mut self, scale: f64) {
        self.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .set_scale(scale)
    }

    fn invalidate(&mut self) {
        self.lock().unwrap_or_else(PoisonError::into_inner).invalidate()
    }

    fn camera_inverted(&self) -> bool {
        self.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .camera_inverted()
    }

    fn set_camera_inverted(&mut self, inverted: bool) {
        self.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .set_camera_inverted(inverted)
    }
}

impl<S: CalibrationStore + ?Sized> CalibrationStore for Box<S> {
    fn scale(&self) -> Option<f64> {
        (**self).scale()
    }

    fn set_scale(&mut self, scale: f64) {
        (**self).set_scale(scale)
    }

    fn invalidate(&mut self) {
        (**self).invalidate()
    }

    fn camera_inverted(&self) -> bool {
        (**self).camera_inverted()
    }

    fn set_camera_inverted(&mut self, inverted: bool) {
        (**self).set_camera_inverted(inverted)
    }
}

/// Errors raised while opening a persisted store.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Store backed by a JSON file, written out-of-band on every change.
///
/// Reads are served from memory. Writes go through a channel to a dedicated
/// thread; failures there are logged and otherwise ignored.
pub struct JsonCalibrationStore {
    path: PathBuf,
    memory: MemoryCalibrationStore,
    writer: Option<(Sender<CalibrationRecord>, JoinHandle<()>)>,
}

impl JsonCalibrationStore {
    /// Open `path`, loading the previous session's values when the file exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let record = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            serde_json::from_str::<CalibrationRecord>(&raw)?
        } else {
            CalibrationRecord::default()
        };
        info!(
            "calibration store {}: scale={:?} inverted={}",
            path.display(),
            record.scale,
            record.camera_inverted
        );

        let (tx, rx) = mpsc::channel::<CalibrationRecord>();
        let target = path.clone();
        let handle = std::thread::Builder::new()
            .name("calibration-writer".into())
            .spawn(move || {
                while let Ok(mut record) = rx.recv() {
                    // coalesce bursts, only the newest value matters
                    while let Ok(newer) = rx.try_recv() {
                        record = newer;
                    }
                    if let Err(err) = write_record(&target, &record) {
                        warn!("calibration write to {} failed: {err}", target.display());
                    }
                }
            })?;

        Ok(Self {
            path,
            memory: MemoryCalibrationStore::from_record(record),
            writer: Some((tx, handle)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self) {
        if let Some((tx, _)) = &self.writer {
            if tx.send(self.memory.record()).is_err() {
                warn!("calibration writer is gone, change not persisted");
            } else {
                debug!("calibration change queued for {}", self.path.display());
            }
        }
    }
}

fn write_record(path: &Path, record: &CalibrationRecord) -> Result<(), StoreError> {
    let json = serde_json::to_string_pretty(record)?;
    fs::write(path, json)?;
    Ok(())
}

impl CalibrationStore for JsonCalibrationStore {
    fn scale(&self) -> Option<f64> {
        self.memory.scale()
    }

    fn set_scale(&mut self, scale: f64) {
        if !valid_scale(scale) || self.memory.scale() == Some(scale) {
            return;
        }
        self.memory.set_scale(scale);
        self.persist();
    }

    fn invalidate(&mut self) {
        if self.memory.scale().is_none() {
            return;
        }
        self.memory.invalidate();
        self.persist();
    }

    fn camera_inverted(&self) -> bool {
        self.memory.camera_inverted()
    }

    fn set_camera_inverted(&mut self, inverted: bool) {
        if self.memory.camera_inverted() == inverted {
            return;
        }
        self.memory.set_camera_inverted(inverted);
        self.persist();
    }
}

impl Drop for JsonCalibrationStore {
    fn drop(&mut self) {
        if let Some((tx, handle)) = self.writer.take() {
            drop(tx);
            let _ = handle.join();
        }
    }
}

impl std::fmt::Debug for JsonCalibrationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonCalibrationStore")
            .field("path", &self.path)
            .field("record", &self.memory.record())
            .finish()
    }
}
