use crate::config::{Config, Credentials};
use crate::s3::{Clock, S3Client, SystemClock};
use crate::upload::BatchRunner;
use anyhow::{Context, Result};
use std::sync::Arc;

/// Shared state for one run: validated credentials, the S3 client and the clock
///
/// The S3Client is created once; clones share its HTTP connection pool.
#[derive(Clone)]
pub struct Core {
    pub config: Arc<Config>,
    credentials: Arc<Credentials>,
    clock: Arc<dyn Clock>,
    s3_client_shared: S3Client,
}

impl Core {
    /// Build the core from a loaded configuration
    ///
    /// Fails before any network call when the profile is missing or incomplete.
    pub fn new(config: Config, profile: Option<&str>, bucket_override: Option<&str>) -> Result<Self> {
        Self::with_clock(config, profile, bucket_override, Arc::new(SystemClock))
    }

    /// Same as [`Core::new`] with an explicit time source
    pub fn with_clock(
        config: Config,
        profile: Option<&str>,
        bucket_override: Option<&str>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let config = Arc::new(config);

        let profile = config
            .get_profile(profile)
            .ok_or_else(|| anyhow::anyhow!("No profile found in configuration"))?;

        let credentials = Arc::new(
            profile
                .credentials(bucket_override)
                .context("Invalid object store profile")?,
        );

        let s3_client_shared = S3Client::new(Arc::clone(&credentials), Arc::clone(&clock))
            .context("Failed to build S3 client")?
            .with_timeout(config.upload.timeout())
            .with_max_retries(config.upload.max_retries);

        tracing::debug!(
            endpoint = %credentials.endpoint,
            bucket = %credentials.bucket,
            secure = credentials.secure,
            "core initialised"
        );

        Ok(Self {
            config,
            credentials,
            clock,
            s3_client_shared,
        })
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Get a clone of the shared S3 client (shares connection pool)
    pub fn s3_client(&self) -> S3Client {
        self.s3_client_shared.clone()
    }

    /// Batch runner using `prefix`, or the configured default prefix when `None`
    pub fn runner(&self, prefix: Option<String>) -> BatchRunner {
        let prefix = prefix.or_else(|| self.config.upload.prefix.clone());
        BatchRunner::new(self.s3_client(), Arc::clone(&self.clock)).with_prefix(prefix)
    }
}
