//! Frame-driven tangram puzzle session.
//!
//! Current focus:
//! - per-piece lifecycle (detected, moved, placed, validated),
//! - construction groups with anchor-relative validation,
//! - feature-angle pose matching with one-to-one target binding.
//!
//! Sensor conversion lives in `tangram-convert`, geometry and the data model
//! in `tangram-core`.

mod groups;
mod io;
mod lifecycle;
mod params;
mod session;
mod validator;

pub use groups::{ConstructionGroup, GroupFrame, GroupManager};
pub use io::{run_session, SessionConfig, SessionError, SessionReport};
pub use lifecycle::{LifecycleTracker, PieceRecord, PieceState, PieceStatus, PieceTransition};
pub use params::{GroupingParams, LifecycleParams, SessionParams, ValidationGate, ValidationParams};
pub use session::{FrameReport, PuzzleSession};
pub use validator::{
    FeatureOffsets, MismatchReason, ValidationRequest, ValidationResult, Validator,
};
