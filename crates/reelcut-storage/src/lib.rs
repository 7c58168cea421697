//! Blob storage for rendered highlights.
//!
//! This crate provides:
//! - The `BlobStore` contract used by the worker upload stage
//! - A local-disk store (the stored path is the public reference)
//! - A Cloudflare R2 store over the S3 API with presigned URLs

pub mod blob;
pub mod client;
pub mod error;

pub use blob::{BlobStore, LocalBlobStore, R2BlobStore, DEFAULT_URL_EXPIRY};
pub use client::{R2Client, R2Config};
pub use error::{StorageError, StorageResult};
