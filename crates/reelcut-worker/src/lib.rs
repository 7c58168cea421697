//! Highlight pipeline worker.
//!
//! This crate provides:
//! - The job orchestrator (collect, preprocess, detect, render, music,
//!   profanity, mix, upload) with persisted progress
//! - A queue executor with crash recovery and dead-lettering
//! - Per-job logging, retry helpers and Prometheus metrics

pub mod backend;
pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod progress;
pub mod retry;
pub mod stages;

pub use backend::{FfmpegBackend, MediaBackend, PreparedSource};
pub use config::{JobStoreKind, StorageBackend, WorkerConfig};
pub use error::{WorkerError, WorkerResult};
pub use executor::JobExecutor;
pub use logging::JobLogger;
pub use pipeline::{HighlightPipeline, PipelineSettings};
pub use progress::ProgressReporter;
pub use stages::{StageDescriptor, StageError};
