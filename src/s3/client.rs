//! S3 client for the upload workflow
//!
//! Issues the four request types the workflow needs (HEAD bucket, PUT bucket,
//! PUT bucket policy, PUT object), each signed with SigV4 over the real
//! SHA256 of its body.
//!
//! - HTTP/1.1 hyper client, TCP_NODELAY, native-tls for https endpoints
//! - Bounded per-request timeout covering send and body collection
//! - Automatic retry with jitter for 429/503 responses, re-signed per attempt

use crate::config::Credentials;
use crate::s3::clock::Clock;
use crate::s3::signer::{payload_hash, S3SignerV4};
use crate::s3::types::{BucketPolicy, OCTET_STREAM};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Method, Request, StatusCode};
use hyper_tls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client as HyperClient;
use hyper_util::rt::TokioExecutor;
use native_tls::TlsConnector;
use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Hex lookup table for URI encoding
static HEX_UPPER: &[u8; 16] = b"0123456789ABCDEF";

/// S3 client errors
#[derive(Error, Debug)]
pub enum S3Error {
    #[error("HTTP error: {0}")]
    Http(#[from] hyper::http::Error),

    #[error("Hyper error: {0}")]
    Hyper(#[from] hyper::Error),

    #[error("Request failed: {0}")]
    Client(#[from] hyper_util::client::legacy::Error),

    #[error("TLS error: {0}")]
    Tls(#[from] native_tls::Error),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP {}: {message}", .status.as_u16())]
    S3Response { status: StatusCode, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl S3Error {
    /// Status code of an error response, if the store answered
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            S3Error::S3Response { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, S3Error>;

/// Simple pseudo-random jitter (0.0 - 1.0) without pulling in rand crate.
/// Uses current time nanoseconds as entropy source.
fn rand_jitter() -> f64 {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    (nanos % 1000) as f64 / 1000.0
}

/// S3 client bound to one endpoint and bucket
///
/// Clone is cheap - the underlying HTTP client uses Arc internally.
#[derive(Clone)]
pub struct S3Client {
    client: HyperClient<HttpsConnector<HttpConnector>, Full<Bytes>>,
    signer: S3SignerV4,
    credentials: Arc<Credentials>,
    timeout: Duration,
    max_retries: u32,
}

impl S3Client {
    /// Create a client for `credentials`, signing with readings from `clock`
    pub fn new(credentials: Arc<Credentials>, clock: Arc<dyn Clock>) -> Result<Self> {
        let mut http = HttpConnector::new();
        http.set_nodelay(true);
        http.enforce_http(false);
        http.set_connect_timeout(Some(Duration::from_secs(10)));

        let tls = if credentials.insecure_tls {
            tracing::warn!("INSECURE TLS MODE ENABLED: Certificate verification is disabled!");
            TlsConnector::builder()
                .danger_accept_invalid_certs(true)
                .danger_accept_invalid_hostnames(true)
                .build()?
        } else {
            TlsConnector::new()?
        };

        let https = HttpsConnector::from((http, tls.into()));

        let client = HyperClient::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(90))
            .set_host(true)
            .build(https);

        let signer = S3SignerV4::new(&credentials, clock);

        Ok(Self {
            client,
            signer,
            credentials,
            timeout: Duration::from_secs(30),
            max_retries: 2,
        })
    }

    /// Set request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set how many times a throttled request is retried
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn bucket(&self) -> &str {
        &self.credentials.bucket
    }

    /// `scheme://host/bucket`
    pub fn bucket_url(&self) -> String {
        format!("{}/{}", self.credentials.base_url(), self.credentials.bucket)
    }

    /// `scheme://host/bucket/key`, with the key URI-encoded
    pub fn object_url(&self, key: &str) -> String {
        format!("{}/{}", self.bucket_url(), Self::encode_s3_key(key))
    }

    /// Encode an S3 key, preserving forward slashes
    /// Returns Cow::Borrowed when no encoding is needed
    fn encode_s3_key(key: &str) -> Cow<str> {
        let needs_encoding = key.bytes().any(|b| {
            !matches!(b, b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/')
        });

        if !needs_encoding {
            return Cow::Borrowed(key);
        }

        let mut result = String::with_capacity(key.len() + 32);
        for byte in key.bytes() {
            match byte {
                b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                    result.push(byte as char);
                }
                _ => {
                    result.push('%');
                    result.push(HEX_UPPER[(byte >> 4) as usize] as char);
                    result.push(HEX_UPPER[(byte & 0xf) as usize] as char);
                }
            }
        }
        Cow::Owned(result)
    }

    /// Send a signed request, retrying 429/503 responses and transport errors.
    ///
    /// The payload hash is computed once; the signature is recomputed on every
    /// attempt because it embeds the current time.
    async fn request_with_retry(
        &self,
        method: Method,
        url: &str,
        content_type: &str,
        body: Bytes,
    ) -> Result<(StatusCode, Bytes)> {
        let hash = payload_hash(&body);

        let mut attempt = 0;
        loop {
            match self.request_once(&method, url, content_type, &hash, body.clone()).await {
                Ok((status, body_bytes)) => {
                    let is_retryable = status == StatusCode::TOO_MANY_REQUESTS
                        || status == StatusCode::SERVICE_UNAVAILABLE;

                    if is_retryable && attempt < self.max_retries {
                        let base_ms = 100u64 * (1 << attempt);
                        let jitter = (base_ms as f64 * 0.2 * rand_jitter()) as u64;
                        tracing::debug!(%url, status = status.as_u16(), attempt, "retrying throttled request");
                        tokio::time::sleep(Duration::from_millis(base_ms + jitter)).await;
                        attempt += 1;
                        continue;
                    }

                    return Ok((status, body_bytes));
                }
                Err(S3Error::Timeout(t)) => return Err(S3Error::Timeout(t)),
                Err(e) if attempt < self.max_retries => {
                    tracing::debug!(%url, error = %e, attempt, "retrying failed request");
                    let base_ms = 100u64 * (1 << attempt);
                    tokio::time::sleep(Duration::from_millis(base_ms)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Sign and send a single request, bounded by the client timeout.
    async fn request_once(
        &self,
        method: &Method,
        url: &str,
        content_type: &str,
        hash: &str,
        body: Bytes,
    ) -> Result<(StatusCode, Bytes)> {
        let signed_headers = self.signer.sign(method.as_str(), url, content_type, hash);

        let mut req = Request::builder().method(method.clone()).uri(url);
        for (key, value) in signed_headers.iter() {
            req = req.header(key, value);
        }
        let request = req.body(Full::new(body))?;

        let exchange = async {
            let response = self.client.request(request).await?;
            let status = response.status();
            // Always drain body to return connection to pool
            let body_bytes = response.collect().await?.to_bytes();
            Ok::<_, S3Error>((status, body_bytes))
        };

        tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| S3Error::Timeout(self.timeout))?
    }

    /// Probe the bucket (HEAD bucket) and return the response status.
    ///
    /// Any HTTP status is returned as `Ok`; only transport failures are errors.
    pub async fn head_bucket(&self) -> Result<StatusCode> {
        let url = self.bucket_url();
        let (status, _) = self
            .request_with_retry(Method::HEAD, &url, OCTET_STREAM, Bytes::new())
            .await?;
        Ok(status)
    }

    /// Create the bucket (PUT bucket)
    pub async fn create_bucket(&self) -> Result<()> {
        let url = self.bucket_url();
        let (status, body_bytes) = self
            .request_with_retry(Method::PUT, &url, OCTET_STREAM, Bytes::new())
            .await?;

        if !status.is_success() {
            let message = String::from_utf8_lossy(&body_bytes).to_string();
            return Err(S3Error::S3Response { status, message });
        }

        Ok(())
    }

    /// Write a bucket policy (PUT bucket?policy)
    pub async fn put_bucket_policy(&self, policy: &BucketPolicy) -> Result<()> {
        let url = format!("{}?policy", self.bucket_url());
        let body = Bytes::from(policy.to_json_bytes()?);

        let (status, body_bytes) = self
            .request_with_retry(Method::PUT, &url, "application/json", body)
            .await?;

        if !status.is_success() {
            let message = String::from_utf8_lossy(&body_bytes).to_string();
            return Err(S3Error::S3Response { status, message });
        }

        Ok(())
    }

    /// Put object to S3 and return its URL
    ///
    /// The body is hashed with SHA256 and the digest is both signed and sent
    /// as `x-amz-content-sha256`, so the store can verify the bytes.
    pub async fn put_object(&self, key: &str, data: Bytes, content_type: &str) -> Result<String> {
        let url = self.object_url(key);

        let (status, body_bytes) = self
            .request_with_retry(Method::PUT, &url, content_type, data)
            .await?;

        if !status.is_success() {
            let message = String::from_utf8_lossy(&body_bytes).to_string();
            return Err(S3Error::S3Response { status, message });
        }

        Ok(url)
    }
}
