//! YOLO polygon label import.
//!
//! One object per line: `class_id x1 y1 x2 y2 ...`, coordinates normalized to
//! `[0, 1]` and scaled by the image size into pixels. Blank lines and lines
//! starting with `#` are ignored.

use crate::canonical::canonicalize;
use crate::io::IoError;
use log::debug;
use nalgebra::Point2;
use std::{fs, path::Path};
use tangram_core::{centroid, CvFrame, CvObject, PieceType, DEFAULT_AMBIGUITY_REL_TOL};

/// One parsed label line.
#[derive(Clone, Debug, PartialEq)]
pub struct LabelPolygon {
    pub class_id: i32,
    /// Pixel coordinates.
    pub vertices: Vec<Point2<f64>>,
}

/// Parse label text for an image of `width` × `height` pixels.
pub fn parse_labels(text: &str, width: u32, height: u32) -> Result<Vec<LabelPolygon>, IoError> {
    let (w, h) = (f64::from(width), f64::from(height));
    let mut out = Vec::new();
    for (i, raw) in text.lines().enumerate() {
        let line = i + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let err = |message: String| IoError::Label { line, message };

        let mut fields = trimmed.split_whitespace();
        let class_field = fields.next().unwrap_or_default();
        let class_id: i32 = class_field
            .parse()
            .map_err(|_| err(format!("bad class id {class_field:?}")))?;

        let coords = fields
            .map(|f| {
                f.parse::<f64>()
                    .ok()
                    .filter(|v| v.is_finite() && (0.0..=1.0).contains(v))
                    .ok_or_else(|| err(format!("bad coordinate {f:?}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        if coords.len() % 2 != 0 {
            return Err(err(format!("odd number of coordinates ({})", coords.len())));
        }
        if coords.len() < 6 {
            return Err(err(format!("need at least 3 points, got {}", coords.len() / 2)));
        }

        let vertices = coords
            .chunks_exact(2)
            .map(|xy| Point2::new(xy[0] * w, xy[1] * h))
            .collect();
        out.push(LabelPolygon { class_id, vertices });
    }
    Ok(out)
}

/// Load a label file from disk.
pub fn load_labels(
    path: impl AsRef<Path>,
    width: u32,
    height: u32,
) -> Result<Vec<LabelPolygon>, IoError> {
    let text = fs::read_to_string(path)?;
    parse_labels(&text, width, height)
}

/// Build a sensor object from a labelled polygon.
///
/// Translation is the vertex centroid; rotation is the direction of the
/// first canonical edge in screen degrees. Polygons that cannot be
/// canonicalized fall back to their raw first edge.
pub fn object_from_polygon(polygon: &LabelPolygon) -> CvObject {
    let piece_type = PieceType::from_class_id(polygon.class_id);
    let label = piece_type
        .map(|t| t.model_name().to_string())
        .unwrap_or_else(|| format!("class_{}", polygon.class_id));

    let canonical = piece_type
        .and_then(|t| canonicalize(&polygon.vertices, t.shape(), DEFAULT_AMBIGUITY_REL_TOL).ok())
        .map(|c| c.vertices);
    let outline = canonical.as_deref().unwrap_or(&polygon.vertices);
    let rotation_deg = match outline {
        [a, b, ..] => (b.y - a.y).atan2(b.x - a.x).to_degrees(),
        _ => 0.0,
    };

    let translation = centroid(&polygon.vertices).unwrap_or_else(Point2::origin);
    let mut object = CvObject::new(label, translation, rotation_deg, polygon.vertices.clone());
    object.class_id = polygon.class_id;
    object
}

/// Turn a label file into a frame with no homography.
pub fn frame_from_labels(
    path: impl AsRef<Path>,
    width: u32,
    height: u32,
    timestamp: f64,
) -> Result<CvFrame, IoError> {
    let polygons = load_labels(path, width, height)?;
    debug!("loaded {} labelled polygons", polygons.len());
    Ok(CvFrame::new(
        timestamp,
        polygons.iter().map(object_from_polygon).collect(),
    ))
}
