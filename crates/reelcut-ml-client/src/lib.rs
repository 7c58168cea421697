//! Client for the optional gameplay event-detection service.
//!
//! Detected events feed the event bonus of segment scoring.

pub mod client;
pub mod error;

pub use client::{EventDetectorConfig, HttpEventDetector};
pub use error::{MlClientError, MlClientResult};
