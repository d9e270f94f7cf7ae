//! Storage module for photo blobs
//!
//! Local filesystem or any S3-compatible backend (MinIO, Cloudflare R2,
//! Backblaze B2, AWS S3).

mod blob;
mod s3_client;
mod types;

pub use blob::{
    blob_key, compute_hash, extension_for, BlobStorage, LocalBlobStorage, S3BlobStorage,
};
pub use s3_client::S3Client;
pub use types::*;

#[cfg(test)]
pub(crate) use blob::FlakyBlobStorage;
