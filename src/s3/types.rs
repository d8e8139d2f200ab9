//! S3 request payloads and outcome types

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Error code a store returns when the caller already owns the bucket it tried to create
pub const BUCKET_ALREADY_OWNED: &str = "BucketAlreadyOwnedByYou";

/// Content type used for requests without a meaningful body
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Result of making sure the target bucket exists
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketStatus {
    /// The existence probe did not report 404
    Exists,
    /// The bucket was created by this run
    Created,
    /// Creation was refused because we already own the bucket
    AlreadyOwned,
}

/// Bucket policy document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BucketPolicy {
    pub version: String,
    pub statement: Vec<PolicyStatement>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyStatement {
    pub effect: String,
    pub principal: Principal,
    pub action: Vec<String>,
    pub resource: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    #[serde(rename = "AWS")]
    pub aws: Vec<String>,
}

impl BucketPolicy {
    /// Anonymous `s3:GetObject` on every object in `bucket`
    pub fn public_read(bucket: &str) -> Self {
        Self {
            version: "2012-10-17".to_string(),
            statement: vec![PolicyStatement {
                effect: "Allow".to_string(),
                principal: Principal {
                    aws: vec!["*".to_string()],
                },
                action: vec!["s3:GetObject".to_string()],
                resource: vec![format!("arn:aws:s3:::{}/*", bucket)],
            }],
        }
    }

    pub fn to_json_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

/// Guess a content type from the file extension, falling back to octet-stream
pub fn content_type_for(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}
