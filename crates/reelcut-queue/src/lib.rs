//! Redis Streams job queue and job-state store.
//!
//! This crate provides:
//! - Job submission (PENDING record + stream entry)
//! - Worker consumption with DLQ and reclaim of abandoned jobs
//! - The `JobStore` contract with in-memory and Redis implementations

pub mod error;
pub mod queue;
pub mod store;

pub use error::{QueueError, QueueResult};
pub use queue::{validate_job, JobQueue, QueueConfig, QueuedJob};
pub use store::{JobStore, MemoryJobStore, RedisJobStore};
