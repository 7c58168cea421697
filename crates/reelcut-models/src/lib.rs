//! Shared data models for the reelcut highlight pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Segments, signal bundles and scored segments
//! - Highlight selections
//! - Output presets and encoder profiles
//! - Job records, progress snapshots and error detail

pub mod encoding;
pub mod job;
pub mod job_status;
pub mod preset;
pub mod segment;
pub mod selection;

// Re-export common types
pub use encoding::EncodingProfile;
pub use job::{HighlightJob, JobId};
pub use job_status::{
    ErrorCategory, ErrorDetail, InvalidTransition, JobProgress, JobRecord, JobStatus, JobUpdate,
};
pub use preset::{Preset, PresetParseError};
pub use segment::{DetectedEvent, ScoredSegment, Segment, SignalBundle, MIN_SEGMENT_SECS};
pub use selection::{Selection, SelectionEntry};
