use super::normalize::normalize_homography;
use super::{ConverterParams, FrameConversion, ObjectError, SkippedObject};
use crate::calibration::{CalibrationSample, ScaleCalibrator};
use crate::canonical::{canonicalize, required_vertices};
use crate::store::{CalibrationStore, MemoryCalibrationStore};
use log::{debug, info, warn};
use nalgebra::Point2;
use std::collections::HashMap;
use std::f64::consts::PI;
use tangram_core::{
    degrees_to_internal, normalize_angle, simplify_to, CvFrame, CvObject, InternalPiece,
    InternalPuzzleState, PieceType, SCHEMA_VERSION,
};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Turns raw sensor frames into [`InternalPuzzleState`]s.
///
/// The converter owns the calibration store; scale and camera inversion are
/// read from it on every frame.
pub struct CoordinateConverter<S: CalibrationStore = MemoryCalibrationStore> {
    params: ConverterParams,
    calibrator: ScaleCalibrator,
    store: S,
}

impl Default for CoordinateConverter<MemoryCalibrationStore> {
    fn default() -> Self {
        Self::new(MemoryCalibrationStore::new(), ConverterParams::default())
    }
}

/// An object that survived label lookup and the confidence gate.
struct Candidate {
    index: usize,
    piece_type: PieceType,
    object: CvObject,
}

impl<S: CalibrationStore> CoordinateConverter<S> {
    pub fn new(store: S, params: ConverterParams) -> Self {
        let calibrator = ScaleCalibrator::new(params.calibration);
        Self {
            params,
            calibrator,
            store,
        }
    }

    /// Replace the calibrator, e.g. to use a custom estimator chain.
    pub fn with_calibrator(mut self, calibrator: ScaleCalibrator) -> Self {
        self.calibrator = calibrator;
        self
    }

    #[inline]
    pub fn params(&self) -> &ConverterParams {
        &self.params
    }

    #[inline]
    pub fn store(&self) -> &S {
        &self.store
    }

    #[inline]
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Forget the cached scale; the next frame recalibrates.
    pub fn invalidate_calibration(&mut self) {
        info!("calibration invalidated");
        self.store.invalidate();
    }

    /// Convert one frame.
    ///
    /// Per-object failures land in [`FrameConversion::skipped`]. The frame
    /// only comes back empty when there is no cached scale and nothing in it
    /// can calibrate.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip(self, frame), fields(objects = frame.objects.len(), timestamp = frame.timestamp))
    )]
    pub fn convert_to_internal(&mut self, frame: &CvFrame) -> FrameConversion {
        let normalized = normalize_homography(frame, self.params.identity_eps);
        let mut skipped = normalized.skipped;

        let mut candidates = Vec::with_capacity(normalized.objects.len());
        for (index, object) in normalized.objects {
            match self.classify(&object) {
                Ok(piece_type) => candidates.push(Candidate {
                    index,
                    piece_type,
                    object,
                }),
                Err(reason) => skipped.push(skip(index, &object, reason)),
            }
        }

        let Some(scale) = self.resolve_scale(&candidates) else {
            warn!(
                "frame at t={:.3}s dropped: no cached scale and no calibration source",
                frame.timestamp
            );
            sort_skipped(&mut skipped);
            return FrameConversion::uncalibrated(skipped);
        };

        let inverted = self.store.camera_inverted();
        let mut pieces: Vec<InternalPiece> = Vec::with_capacity(candidates.len());
        // piece id -> (slot in `pieces`, confidence, frame index, label)
        let mut claimed: HashMap<String, (usize, f32, usize, String)> = HashMap::new();

        for candidate in candidates {
            let Candidate {
                index,
                piece_type,
                object,
            } = candidate;
            let canonical = match canonicalize(
                &object.vertices,
                piece_type.shape(),
                self.params.calibration.ambiguity_rel_tol,
            ) {
                Ok(c) => c,
                Err(err) => {
                    skipped.push(skip(index, &object, err.into()));
                    continue;
                }
            };

            let piece = to_piece(&object, piece_type, canonical.flipped, scale, inverted);
            let confidence = object.confidence.unwrap_or(0.0);

            match claimed.get_mut(&piece.id) {
                None => {
                    claimed.insert(
                        piece.id.clone(),
                        (pieces.len(), confidence, index, object.label.clone()),
                    );
                    pieces.push(piece);
                }
                Some(entry) if confidence > entry.1 => {
                    let (slot, _, prev_index, prev_label) = entry.clone();
                    skipped.push(SkippedObject {
                        index: prev_index,
                        label: prev_label,
                        reason: ObjectError::DuplicatePiece(piece.id.clone()),
                    });
                    debug!("object {prev_index} replaced by {index} for piece {}", piece.id);
                    *entry = (slot, confidence, index, object.label.clone());
                    pieces[slot] = piece;
                }
                Some(_) => {
                    let reason = ObjectError::DuplicatePiece(piece.id.clone());
                    skipped.push(skip(index, &object, reason));
                }
            }
        }

        sort_skipped(&mut skipped);
        FrameConversion {
            state: InternalPuzzleState {
                pieces,
                schema_version: SCHEMA_VERSION,
                scale: Some(scale),
            },
            skipped,
            error: None,
        }
    }

    fn classify(&self, object: &CvObject) -> Result<PieceType, ObjectError> {
        let t = object.translation;
        if !(t.x.is_finite() && t.y.is_finite() && object.rotation_deg.is_finite()) {
            return Err(ObjectError::NonFinitePose);
        }
        if let Some(confidence) = object.confidence {
            if confidence < self.params.min_confidence {
                return Err(ObjectError::LowConfidence {
                    confidence,
                    min: self.params.min_confidence,
                });
            }
        }
        PieceType::from_label(&object.label)
            .or_else(|| {
                self.params
                    .class_id_fallback
                    .then(|| PieceType::from_class_id(object.class_id))
                    .flatten()
            })
            .ok_or_else(|| ObjectError::UnknownPieceLabel(object.label.clone()))
    }

    fn resolve_scale(&mut self, candidates: &[Candidate]) -> Option<f64> {
        if let Some(scale) = self.store.scale() {
            return Some(scale);
        }

        let outlines: Vec<(PieceType, Vec<Point2<f64>>)> = candidates
            .iter()
            .map(|c| {
                let needed = required_vertices(c.piece_type.shape());
                let vertices = if c.object.vertices.len() > needed {
                    simplify_to(&c.object.vertices, needed)
                } else {
                    c.object.vertices.clone()
                };
                (c.piece_type, vertices)
            })
            .collect();
        let samples: Vec<CalibrationSample<'_>> = outlines
            .iter()
            .map(|(t, v)| CalibrationSample {
                shape: t.shape(),
                vertices: v,
            })
            .collect();

        match self.calibrator.calibrate(&samples) {
            Ok(scale) => {
                info!("calibrated scale: {scale:.3} px per square side");
                self.store.set_scale(scale);
                Some(scale)
            }
            Err(err) => {
                debug!("calibration failed: {err}");
                None
            }
        }
    }
}

fn to_piece(
    object: &CvObject,
    piece_type: PieceType,
    flipped: bool,
    scale: f64,
    inverted: bool,
) -> InternalPiece {
    let mut position = Point2::new(object.translation.x / scale, object.translation.y / scale);
    let mut rotation = degrees_to_internal(object.rotation_deg);
    if inverted {
        rotation = normalize_angle(rotation + PI);
        position = Point2::new(-position.x, -position.y);
    }
    InternalPiece {
        id: object
            .stable_id
            .clone()
            .unwrap_or_else(|| piece_type.name().to_string()),
        piece_type,
        position,
        rotation,
        flipped,
    }
}

fn skip(index: usize, object: &CvObject, reason: ObjectError) -> SkippedObject {
    debug!("object {index} ({}) skipped: {reason}", object.label);
    SkippedObject {
        index,
        label: object.label.clone(),
        reason,
    }
}

fn sort_skipped(skipped: &mut [SkippedObject]) {
    skipped.sort_by_key(|s| s.index);
}
