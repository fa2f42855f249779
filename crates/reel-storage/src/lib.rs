//! Object storage for source media and rendered clips.
//!
//! This crate provides:
//! - File upload/download against any S3-compatible endpoint
//! - Cross-bucket reads of `s3://bucket/key` references
//! - Presigned GET URLs for client retrieval
//! - Object deletion and connectivity checks

pub mod client;
pub mod error;
pub mod object;

pub use client::{ObjectStore, StorageConfig, MAX_PRESIGN_EXPIRY};
pub use error::{StorageError, StorageResult};
pub use object::{content_type_for, ObjectRef};
