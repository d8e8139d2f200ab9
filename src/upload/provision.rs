//! Bucket provisioning and public-read policy

use crate::s3::types::{BucketPolicy, BucketStatus, BUCKET_ALREADY_OWNED};
use crate::s3::{S3Client, S3Error};
use hyper::StatusCode;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("bucket existence check failed: {0}")]
    Probe(#[source] S3Error),

    #[error("bucket creation failed: {0}")]
    Create(#[source] S3Error),
}

/// Make sure the client's bucket exists, creating it when the probe says 404.
///
/// Any probe status other than 404 counts as "exists", including errors
/// such as 403. A creation refusal carrying `BucketAlreadyOwnedByYou` is a
/// success. Safe to call repeatedly.
pub async fn ensure_bucket(client: &S3Client) -> Result<BucketStatus, ProvisionError> {
    let bucket = client.bucket();

    let status = client.head_bucket().await.map_err(ProvisionError::Probe)?;
    if status != StatusCode::NOT_FOUND {
        debug!(%bucket, status = status.as_u16(), "bucket present");
        return Ok(BucketStatus::Exists);
    }

    match client.create_bucket().await {
        Ok(()) => {
            info!(%bucket, "bucket created");
            Ok(BucketStatus::Created)
        }
        Err(S3Error::S3Response { message, .. }) if message.contains(BUCKET_ALREADY_OWNED) => {
            debug!(%bucket, "bucket already owned");
            Ok(BucketStatus::AlreadyOwned)
        }
        Err(e) => Err(ProvisionError::Create(e)),
    }
}

/// Grant anonymous read on every object in the bucket.
///
/// Callers treat failure as non-fatal; a store may refuse policy writes.
pub async fn set_public(client: &S3Client) -> Result<(), S3Error> {
    let policy = BucketPolicy::public_read(client.bucket());
    client.put_bucket_policy(&policy).await?;
    debug!(bucket = %client.bucket(), "public-read policy applied");
    Ok(())
}
