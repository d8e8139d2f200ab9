//! S3 client module with AWS SigV4 signing
//!
//! This module provides:
//! - AWS Signature Version 4 signing with an injectable clock
//! - The bucket and object requests used by the upload workflow
//! - Bucket policy and outcome types

pub mod client;
pub mod clock;
pub mod signer;
pub mod types;

// Re-export main types for convenience
pub use client::{Result, S3Client, S3Error};
pub use clock::{Clock, FixedClock, SystemClock};
pub use signer::S3SignerV4;
pub use types::{BucketPolicy, BucketStatus};
