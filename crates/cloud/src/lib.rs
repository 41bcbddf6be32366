//! Cloud blob storage providers.

pub mod s3;

pub use s3::{S3BlobConfig, S3BlobStorage};
