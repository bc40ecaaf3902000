use super::error::ObjectError;
use super::result::SkippedObject;
use log::debug;
use tangram_core::{CvFrame, CvObject, Homography};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Objects of a frame expressed in corrected sensor coordinates.
#[derive(Clone, Debug)]
pub(crate) struct NormalizedObjects {
    /// `(frame index, corrected object)`, in frame order.
    pub objects: Vec<(usize, CvObject)>,
    pub skipped: Vec<SkippedObject>,
}

/// Apply the frame's pending homography to every vertex and translation.
///
/// Frames whose homography is absent or already applied pass through. An
/// object hitting a vanishing divisor is skipped; the rest of the frame is
/// unaffected.
#[cfg_attr(feature = "tracing", instrument(level = "debug", skip(frame), fields(objects = frame.objects.len())))]
pub(crate) fn normalize_homography(frame: &CvFrame, identity_eps: f64) -> NormalizedObjects {
    let Some(h) = frame.pending_homography() else {
        return NormalizedObjects {
            objects: frame.objects.iter().cloned().enumerate().collect(),
            skipped: Vec::new(),
        };
    };

    if h.is_near_identity(identity_eps) {
        debug!("near-identity homography without applied flag, applying anyway");
    }

    let mut objects = Vec::with_capacity(frame.objects.len());
    let mut skipped = Vec::new();
    for (index, obj) in frame.objects.iter().enumerate() {
        match transform_object(&h, obj) {
            Some(corrected) => objects.push((index, corrected)),
            None => {
                debug!("object {index} ({}) skipped: degenerate transform", obj.label);
                skipped.push(SkippedObject {
                    index,
                    label: obj.label.clone(),
                    reason: ObjectError::DegenerateTransform,
                });
            }
        }
    }
    NormalizedObjects { objects, skipped }
}

fn transform_object(h: &Homography, obj: &CvObject) -> Option<CvObject> {
    let translation = h.apply(obj.translation)?;
    let vertices = obj
        .vertices
        .iter()
        .map(|&v| h.apply(v))
        .collect::<Option<Vec<_>>>()?;
    Some(CvObject {
        translation,
        vertices,
        ..obj.clone()
    })
}
