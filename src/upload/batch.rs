//! Batch runner: provision once, then upload each file independently

use crate::s3::clock::Clock;
use crate::s3::S3Client;
use crate::upload::object::{upload_file, KeyAllocator};
use crate::upload::provision::{ensure_bucket, set_public};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome for one input file
///
/// Serializes as `{file, url, key}`, `{file, error}` or
/// `{file, error, skipped: true}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum UploadResult {
    Uploaded {
        file: String,
        url: String,
        key: String,
    },
    Failed {
        file: String,
        error: String,
    },
    Skipped {
        file: String,
        error: String,
        skipped: bool,
    },
}

impl UploadResult {
    fn skipped(file: String, reason: &str) -> Self {
        UploadResult::Skipped {
            file,
            error: reason.to_string(),
            skipped: true,
        }
    }

    pub fn file(&self) -> &str {
        match self {
            UploadResult::Uploaded { file, .. }
            | UploadResult::Failed { file, .. }
            | UploadResult::Skipped { file, .. } => file,
        }
    }

    pub fn is_uploaded(&self) -> bool {
        matches!(self, UploadResult::Uploaded { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, UploadResult::Failed { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, UploadResult::Skipped { .. })
    }
}

/// Per-file results in input order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct BatchReport {
    results: Vec<UploadResult>,
}

impl BatchReport {
    pub fn results(&self) -> &[UploadResult] {
        &self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn uploaded(&self) -> usize {
        self.results.iter().filter(|r| r.is_uploaded()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.iter().filter(|r| r.is_failed()).count()
    }

    pub fn skipped(&self) -> usize {
        self.results.iter().filter(|r| r.is_skipped()).count()
    }

    fn push(&mut self, result: UploadResult) {
        self.results.push(result);
    }
}

impl IntoIterator for BatchReport {
    type Item = UploadResult;
    type IntoIter = std::vec::IntoIter<UploadResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.into_iter()
    }
}

/// Uploads a list of files to the client's bucket
pub struct BatchRunner {
    client: S3Client,
    clock: Arc<dyn Clock>,
    prefix: Option<String>,
}

impl BatchRunner {
    pub fn new(client: S3Client, clock: Arc<dyn Clock>) -> Self {
        Self {
            client,
            clock,
            prefix: None,
        }
    }

    /// Object key prefix for every upload of this runner
    pub fn with_prefix(mut self, prefix: Option<String>) -> Self {
        self.prefix = prefix;
        self
    }

    /// Run the batch.
    ///
    /// The bucket is provisioned and made public exactly once, even when no
    /// file exists. Missing files are reported as skipped. A failed upload
    /// is recorded and the remaining files are still attempted.
    pub async fn run<P: AsRef<Path>>(&self, files: &[P]) -> BatchReport {
        let present: Vec<bool> = files.iter().map(|f| f.as_ref().is_file()).collect();

        let bucket = self.client.bucket();
        match ensure_bucket(&self.client).await {
            Ok(status) => info!(%bucket, ?status, "bucket ready"),
            Err(e) => warn!(%bucket, error = %e, "bucket provisioning failed, continuing"),
        }
        if let Err(e) = set_public(&self.client).await {
            warn!(%bucket, error = %e, "could not set public-read policy, continuing");
        }

        let mut keys = KeyAllocator::new(self.prefix.clone());
        let mut report = BatchReport::default();

        for (file, present) in files.iter().zip(present) {
            let path: &Path = file.as_ref();
            if !present {
                warn!(file = %path.display(), "skipping missing file");
                report.push(UploadResult::skipped(
                    path.display().to_string(),
                    "file not found",
                ));
                continue;
            }

            let file = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            let key = keys.allocate(&file, self.clock.now());

            match upload_file(&self.client, path, &key).await {
                Ok(url) => {
                    info!(%file, %url, "uploaded");
                    report.push(UploadResult::Uploaded { file, url, key });
                }
                Err(e) => {
                    warn!(%file, %key, error = %e, "upload failed");
                    report.push(UploadResult::Failed {
                        file,
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            uploaded = report.uploaded(),
            failed = report.failed(),
            skipped = report.skipped(),
            "batch finished"
        );
        report
    }
}
