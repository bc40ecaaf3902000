//! High-level facade crate for the `tangram-*` workspace.
//!
//! This crate provides:
//! - stable, convenient re-exports of the underlying crates
//! - file-level helpers that run a whole recorded session or import a YOLO
//!   label file, as used by the `tangram` CLI
//!
//! ## Quickstart
//!
//! ```no_run
//! use tangram::session::{PuzzleSession, SessionParams};
//! use tangram::core::{PiecePose, PieceType, TargetPiece};
//!
//! let targets = vec![TargetPiece::new(
//!     "square",
//!     PieceType::Square,
//!     PiecePose::new(0.0, 0.0, 0.0),
//! )];
//! let mut session = PuzzleSession::with_targets(targets, SessionParams::default());
//! let frames = tangram::convert::load_frames("frames.json").unwrap_or_default();
//! for frame in &frames {
//!     let report = session.process_frame(frame);
//!     println!("{:.3}s complete={}", report.timestamp, report.complete);
//! }
//! ```
//!
//! ## API map
//! - `tangram::core`: angles, homography, polygons, pieces and frames.
//! - `tangram::convert`: scale calibration, canonicalization, conversion.
//! - `tangram::session`: lifecycle, groups, validation and the session.
//! - `tangram::run`: end-to-end helpers over JSON and label files.

pub use tangram_convert as convert;
pub use tangram_core as core;
pub use tangram_session as session;

pub use tangram_convert::{CoordinateConverter, FrameConversion};
pub use tangram_core::{CvFrame, CvObject, InternalPiece, InternalPuzzleState, TargetPiece};
pub use tangram_session::{
    FrameReport, PuzzleSession, SessionConfig, SessionParams, SessionReport,
};

pub mod run;
