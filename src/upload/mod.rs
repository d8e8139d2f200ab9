//! Upload workflow: make sure the bucket exists and is public, then upload
//! a batch of files one by one, recording a result per file.

pub mod batch;
pub mod object;
pub mod provision;

pub use batch::{BatchReport, BatchRunner, UploadResult};
pub use object::{object_key, upload_file, KeyAllocator, UploadError};
pub use provision::{ensure_bucket, set_public, ProvisionError};
