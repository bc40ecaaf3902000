//! Canonical tangram pieces and the internal puzzle model.

use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, PI, TAU};

/// Version tag written into every [`InternalPuzzleState`].
pub const SCHEMA_VERSION: u32 = 1;

/// The seven physical pieces of a tangram set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PieceType {
    #[serde(rename = "large_triangle_1")]
    LargeTriangle1,
    #[serde(rename = "large_triangle_2")]
    LargeTriangle2,
    #[serde(rename = "medium_triangle")]
    MediumTriangle,
    #[serde(rename = "small_triangle_1")]
    SmallTriangle1,
    #[serde(rename = "small_triangle_2")]
    SmallTriangle2,
    #[serde(rename = "square")]
    Square,
    #[serde(rename = "parallelogram")]
    Parallelogram,
}

/// Geometric family of a piece. Pieces of one class are interchangeable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeClass {
    LargeTriangle,
    MediumTriangle,
    SmallTriangle,
    Square,
    Parallelogram,
}

impl ShapeClass {
    #[inline]
    pub fn is_triangle(self) -> bool {
        matches!(
            self,
            ShapeClass::LargeTriangle | ShapeClass::MediumTriangle | ShapeClass::SmallTriangle
        )
    }

    /// Number of polygon vertices.
    #[inline]
    pub fn vertex_count(self) -> usize {
        if self.is_triangle() {
            3
        } else {
            4
        }
    }

    /// Rotation period used when comparing feature angles.
    pub fn symmetry_period(self) -> f64 {
        match self {
            ShapeClass::Square => FRAC_PI_2,
            ShapeClass::LargeTriangle | ShapeClass::MediumTriangle | ShapeClass::SmallTriangle => {
                PI
            }
            ShapeClass::Parallelogram => TAU,
        }
    }
}

impl PieceType {
    pub const ALL: [PieceType; 7] = [
        PieceType::LargeTriangle1,
        PieceType::LargeTriangle2,
        PieceType::MediumTriangle,
        PieceType::SmallTriangle1,
        PieceType::SmallTriangle2,
        PieceType::Square,
        PieceType::Parallelogram,
    ];

    #[inline]
    pub fn shape(self) -> ShapeClass {
        match self {
            PieceType::LargeTriangle1 | PieceType::LargeTriangle2 => ShapeClass::LargeTriangle,
            PieceType::MediumTriangle => ShapeClass::MediumTriangle,
            PieceType::SmallTriangle1 | PieceType::SmallTriangle2 => ShapeClass::SmallTriangle,
            PieceType::Square => ShapeClass::Square,
            PieceType::Parallelogram => ShapeClass::Parallelogram,
        }
    }

    /// Canonical snake-case name, also used as the default piece id.
    pub fn name(self) -> &'static str {
        match self {
            PieceType::LargeTriangle1 => "large_triangle_1",
            PieceType::LargeTriangle2 => "large_triangle_2",
            PieceType::MediumTriangle => "medium_triangle",
            PieceType::SmallTriangle1 => "small_triangle_1",
            PieceType::SmallTriangle2 => "small_triangle_2",
            PieceType::Square => "square",
            PieceType::Parallelogram => "parallelogram",
        }
    }

    /// Model name used by the segmentation pipeline.
    pub fn model_name(self) -> &'static str {
        match self {
            PieceType::LargeTriangle1 => "tangram_triangle_large_1",
            PieceType::LargeTriangle2 => "tangram_triangle_large_2",
            PieceType::MediumTriangle => "tangram_triangle_medium",
            PieceType::SmallTriangle1 => "tangram_triangle_small_1",
            PieceType::SmallTriangle2 => "tangram_triangle_small_2",
            PieceType::Square => "tangram_square",
            PieceType::Parallelogram => "tangram_parallelogram",
        }
    }

    /// Look up a sensor label in the static label table (case-insensitive).
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        Self::ALL.into_iter().find(|t| {
            label.eq_ignore_ascii_case(t.name()) || label.eq_ignore_ascii_case(t.model_name())
        })
    }

    /// Segmentation class id ordering.
    pub fn from_class_id(class_id: i32) -> Option<Self> {
        usize::try_from(class_id)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
    }

    pub fn class_id(self) -> i32 {
        Self::ALL.iter().position(|&t| t == self).unwrap_or(0) as i32
    }
}

impl std::fmt::Display for PieceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Planar pose in normalized units (one unit = one square side).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PiecePose {
    pub position: Point2<f64>,
    /// Radians in `(-π, π]`, counter-clockwise positive.
    pub rotation: f64,
    #[serde(default)]
    pub flipped: bool,
}

impl PiecePose {
    pub fn new(x: f64, y: f64, rotation: f64) -> Self {
        Self {
            position: Point2::new(x, y),
            rotation,
            flipped: false,
        }
    }

    pub fn with_flip(mut self, flipped: bool) -> Self {
        self.flipped = flipped;
        self
    }

    #[inline]
    pub fn distance_to(&self, other: &PiecePose) -> f64 {
        (self.position - other.position).norm()
    }

    #[inline]
    pub fn offset_to(&self, other: &PiecePose) -> Vector2<f64> {
        other.position - self.position
    }
}

/// One converted piece in the internal model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InternalPiece {
    pub id: String,
    pub piece_type: PieceType,
    pub position: Point2<f64>,
    pub rotation: f64,
    pub flipped: bool,
}

impl InternalPiece {
    pub fn pose(&self) -> PiecePose {
        PiecePose {
            position: self.position,
            rotation: self.rotation,
            flipped: self.flipped,
        }
    }

    pub fn with_pose(&self, pose: PiecePose) -> Self {
        Self {
            id: self.id.clone(),
            piece_type: self.piece_type,
            position: pose.position,
            rotation: pose.rotation,
            flipped: pose.flipped,
        }
    }
}

/// Snapshot of the puzzle built from one frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InternalPuzzleState {
    pub pieces: Vec<InternalPiece>,
    pub schema_version: u32,
    /// Pixels per square side used for this frame, `None` when uncalibrated.
    pub scale: Option<f64>,
}

impl InternalPuzzleState {
    pub fn empty() -> Self {
        Self {
            pieces: Vec::new(),
            schema_version: SCHEMA_VERSION,
            scale: None,
        }
    }

    pub fn piece(&self, id: &str) -> Option<&InternalPiece> {
        self.pieces.iter().find(|p| p.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.pieces.is_empty()
    }
}

/// Target slot of the puzzle being assembled.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TargetPiece {
    pub id: String,
    pub piece_type: PieceType,
    pub pose: PiecePose,
}

impl TargetPiece {
    pub fn new(id: impl Into<String>, piece_type: PieceType, pose: PiecePose) -> Self {
        Self {
            id: id.into(),
            piece_type,
            pose,
        }
    }

    #[inline]
    pub fn shape(&self) -> ShapeClass {
        self.piece_type.shape()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_table_accepts_model_and_short_names() {
        assert_eq!(PieceType::from_label("tangram_square"), Some(PieceType::Square));
        assert_eq!(
            PieceType::from_label("Tangram_Triangle_Large_2"),
            Some(PieceType::LargeTriangle2)
        );
        assert_eq!(
            PieceType::from_label(" small_triangle_1 "),
            Some(PieceType::SmallTriangle1)
        );
        assert_eq!(PieceType::from_label("hexagon"), None);
    }

    #[test]
    fn class_ids_cover_all_types() {
        for t in PieceType::ALL {
            assert_eq!(PieceType::from_class_id(t.class_id()), Some(t));
        }
        assert_eq!(PieceType::from_class_id(7), None);
        assert_eq!(PieceType::from_class_id(-1), None);
    }

    #[test]
    fn duplicates_share_shape_class() {
        assert_eq!(
            PieceType::LargeTriangle1.shape(),
            PieceType::LargeTriangle2.shape()
        );
        assert_ne!(PieceType::SmallTriangle1.shape(), PieceType::MediumTriangle.shape());
        assert_eq!(ShapeClass::Square.vertex_count(), 4);
        assert_eq!(ShapeClass::SmallTriangle.vertex_count(), 3);
    }

    #[test]
    fn piece_type_serializes_with_canonical_name() {
        let json = serde_json::to_string(&PieceType::SmallTriangle2).expect("serialize");
        assert_eq!(json, "\"small_triangle_2\"");
        let back: PieceType = serde_json::from_str("\"parallelogram\"").expect("deserialize");
        assert_eq!(back, PieceType::Parallelogram);
    }
}
