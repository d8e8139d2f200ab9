//! s3pub - publish files to an S3-compatible object store under public-read URLs

pub mod cli;
pub mod config;
pub mod core;
pub mod s3;
pub mod upload;

pub use config::{Config, Credentials};
pub use core::Core;
pub use upload::{BatchReport, BatchRunner, UploadResult};
