//! AWS Signature Version 4 signer for S3 requests
//!
//! Signs with a fixed header set: `content-type`, `host`,
//! `x-amz-content-sha256` and `x-amz-date`. The payload hash is always the
//! real SHA-256 of the body, never `UNSIGNED-PAYLOAD`.
//!
//! - Pre-computed AWS4+secret_key bytes
//! - Daily signing key cache (avoids 4 HMAC operations per request)
//! - Constant empty payload hash
//! - Injectable clock so signatures can be reproduced byte for byte

use crate::config::Credentials;
use crate::s3::clock::Clock;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};

type HmacSha256 = Hmac<Sha256>;

/// Hex lookup table for zero-allocation percent encoding
static HEX_UPPER: &[u8; 16] = b"0123456789ABCDEF";

/// SHA256 of the empty payload (bucket HEAD/PUT)
pub const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

pub const ALGORITHM: &str = "AWS4-HMAC-SHA256";

const SERVICE: &str = "s3";

/// Signed header names, lower-cased and in canonical order
pub const SIGNED_HEADERS: &str = "content-type;host;x-amz-content-sha256;x-amz-date";

/// Hex SHA256 of a payload
pub fn payload_hash(payload: &[u8]) -> String {
    if payload.is_empty() {
        EMPTY_SHA256.to_string()
    } else {
        hex::encode(Sha256::digest(payload))
    }
}

/// AWS Signature Version 4 signer
pub struct S3SignerV4 {
    access_key: String,
    region: String,
    /// Host header value, `host:port` exactly as configured
    host: String,
    /// Pre-computed "AWS4" + secret_key as bytes
    aws4_key: Vec<u8>,
    clock: Arc<dyn Clock>,
    /// Cached signing key per day: (date_stamp, derived_key)
    cached_signing_key: Mutex<Option<(String, [u8; 32])>>,
}

impl Clone for S3SignerV4 {
    fn clone(&self) -> Self {
        Self {
            access_key: self.access_key.clone(),
            region: self.region.clone(),
            host: self.host.clone(),
            aws4_key: self.aws4_key.clone(),
            clock: Arc::clone(&self.clock),
            // Each clone gets its own cache (populated on first use)
            cached_signing_key: Mutex::new(None),
        }
    }
}

impl fmt::Debug for S3SignerV4 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3SignerV4")
            .field("access_key", &self.access_key)
            .field("region", &self.region)
            .field("host", &self.host)
            .finish_non_exhaustive()
    }
}

impl S3SignerV4 {
    /// Create a signer for the given credentials
    pub fn new(credentials: &Credentials, clock: Arc<dyn Clock>) -> Self {
        Self {
            access_key: credentials.access_key.clone(),
            region: credentials.region.clone(),
            host: credentials.endpoint.clone(),
            aws4_key: format!("AWS4{}", credentials.secret_key).into_bytes(),
            clock,
            cached_signing_key: Mutex::new(None),
        }
    }

    /// Sign a request at the current clock reading
    ///
    /// Returns the four canonical headers plus `authorization`, keyed by
    /// lower-case header name.
    pub fn sign(
        &self,
        method: &str,
        url: &str,
        content_type: &str,
        payload_hash: &str,
    ) -> BTreeMap<String, String> {
        self.sign_at(method, url, content_type, payload_hash, self.clock.now())
    }

    /// Sign a request at a given instant
    pub fn sign_at(
        &self,
        method: &str,
        url: &str,
        content_type: &str,
        payload_hash: &str,
        now: DateTime<Utc>,
    ) -> BTreeMap<String, String> {
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date_stamp = now.format("%Y%m%d").to_string();

        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), content_type.to_string());
        headers.insert("host".to_string(), self.host.clone());
        headers.insert("x-amz-content-sha256".to_string(), payload_hash.to_string());
        headers.insert("x-amz-date".to_string(), amz_date.clone());

        let canonical_request = Self::canonical_request(method, url, &headers, payload_hash);

        let credential_scope = format!("{}/{}/{}/aws4_request", date_stamp, self.region, SERVICE);
        let string_to_sign = Self::string_to_sign(&amz_date, &credential_scope, &canonical_request);

        tracing::trace!(
            method,
            url,
            canonical_request = %canonical_request,
            string_to_sign = %string_to_sign,
            "sigv4"
        );

        let signature = self.calculate_signature(&date_stamp, &string_to_sign);

        let authorization = format!(
            "{} Credential={}/{}, SignedHeaders={}, Signature={}",
            ALGORITHM, self.access_key, credential_scope, SIGNED_HEADERS, signature
        );
        headers.insert("authorization".to_string(), authorization);

        headers
    }

    /// Build the canonical request from the four signed headers
    ///
    /// `headers` is sorted by the BTreeMap, which yields the canonical
    /// `content-type, host, x-amz-content-sha256, x-amz-date` order.
    pub fn canonical_request(
        method: &str,
        url: &str,
        headers: &BTreeMap<String, String>,
        payload_hash: &str,
    ) -> String {
        let (path, query) = Self::parse_url_fast(url);
        let canonical_query = Self::create_canonical_query_string(query);
        let canonical_headers = Self::create_canonical_headers(headers);

        // Path is used as-is: object keys are URI-encoded when the URL is built
        format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            method, path, canonical_query, canonical_headers, SIGNED_HEADERS, payload_hash
        )
    }

    fn string_to_sign(amz_date: &str, credential_scope: &str, canonical_request: &str) -> String {
        let canonical_request_hash = hex::encode(Sha256::digest(canonical_request.as_bytes()));
        format!(
            "{}\n{}\n{}\n{}",
            ALGORITHM, amz_date, credential_scope, canonical_request_hash
        )
    }

    /// Extract (path, query) from a URL without allocating.
    ///
    /// An empty path becomes `/`.
    fn parse_url_fast(url: &str) -> (&str, &str) {
        let after_scheme = if let Some(rest) = url.strip_prefix("https://") {
            rest
        } else if let Some(rest) = url.strip_prefix("http://") {
            rest
        } else {
            url
        };

        let path_and_query = match after_scheme.find('/') {
            Some(pos) => &after_scheme[pos..],
            None => match after_scheme.find('?') {
                Some(pos) => &after_scheme[pos..],
                None => "",
            },
        };

        let (path, query) = match path_and_query.find('?') {
            Some(pos) => (&path_and_query[..pos], &path_and_query[pos + 1..]),
            None => (path_and_query, ""),
        };

        let path = if path.is_empty() { "/" } else { path };

        (path, query)
    }

    /// Create canonical query string (sorted by parameter name)
    ///
    /// Valueless parameters such as `policy` become `policy=`.
    fn create_canonical_query_string(query: &str) -> String {
        if query.is_empty() {
            return String::new();
        }

        let mut params: Vec<(String, String)> = query
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| {
                let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
                let key = urlencoding::decode(key).unwrap_or_else(|_| key.into());
                let value = urlencoding::decode(value).unwrap_or_else(|_| value.into());
                (Self::uri_encode(&key, true), Self::uri_encode(&value, true))
            })
            .collect();

        params.sort_unstable();

        params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Create canonical headers, one `name:value\n` line per header, values verbatim
    fn create_canonical_headers(headers: &BTreeMap<String, String>) -> String {
        let mut result = String::with_capacity(headers.len() * 64);
        for (k, v) in headers {
            result.push_str(k);
            result.push(':');
            result.push_str(v);
            result.push('\n');
        }
        result
    }

    /// Calculate the signature with daily signing key cache
    fn calculate_signature(&self, date_stamp: &str, string_to_sign: &str) -> String {
        let signing_key = {
            let mut cache = self
                .cached_signing_key
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            match cache.as_ref() {
                Some((cached_date, cached_key)) if cached_date == date_stamp => *cached_key,
                _ => {
                    let key =
                        Self::derive_signing_key(&self.aws4_key, date_stamp, &self.region, SERVICE);
                    *cache = Some((date_stamp.to_string(), key));
                    key
                }
            }
        };

        hex::encode(Self::hmac_sha256(&signing_key, string_to_sign.as_bytes()))
    }

    /// Derive signing key (4 chained HMAC operations)
    fn derive_signing_key(aws4_key: &[u8], date_stamp: &str, region: &str, service: &str) -> [u8; 32] {
        let k_date = Self::hmac_sha256(aws4_key, date_stamp.as_bytes());
        let k_region = Self::hmac_sha256(&k_date, region.as_bytes());
        let k_service = Self::hmac_sha256(&k_region, service.as_bytes());
        Self::hmac_sha256(&k_service, b"aws4_request")
    }

    /// HMAC-SHA256 returning fixed-size array
    fn hmac_sha256(key: &[u8], msg: &[u8]) -> [u8; 32] {
        let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
        mac.update(msg);
        let result = mac.finalize().into_bytes();
        let mut output = [0u8; 32];
        output.copy_from_slice(&result);
        output
    }

    /// URI encode a string (RFC 3986) using hex lookup table
    pub(crate) fn uri_encode(s: &str, encode_slash: bool) -> String {
        let mut result = String::with_capacity(s.len() + 16);
        for byte in s.bytes() {
            match byte {
                b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                    result.push(byte as char);
                }
                b'/' if !encode_slash => {
                    result.push('/');
                }
                _ => {
                    result.push('%');
                    result.push(HEX_UPPER[(byte >> 4) as usize] as char);
                    result.push(HEX_UPPER[(byte & 0xf) as usize] as char);
                }
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::s3::clock::{FixedClock, SystemClock};
    use chrono::TimeZone;

    fn credentials() -> Credentials {
        Credentials {
            endpoint: "store.local:9000".to_string(),
            region: "us-east-1".to_string(),
            access_key: "AK".to_string(),
            secret_key: "SK".to_string(),
            secure: false,
            insecure_tls: false,
            bucket: "collections".to_string(),
        }
    }

    fn instant() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 19, 8, 30, 5).unwrap()
    }

    fn signer() -> S3SignerV4 {
        S3SignerV4::new(&credentials(), Arc::new(FixedClock::new(instant())))
    }

    #[test]
    fn test_uri_encode() {
        assert_eq!(S3SignerV4::uri_encode("hello world", true), "hello%20world");
        assert_eq!(S3SignerV4::uri_encode("hello/world", true), "hello%2Fworld");
        assert_eq!(S3SignerV4::uri_encode("hello/world", false), "hello/world");
    }

    #[test]
    fn test_canonical_query_string() {
        assert_eq!(S3SignerV4::create_canonical_query_string(""), "");
        assert_eq!(S3SignerV4::create_canonical_query_string("policy"), "policy=");
        assert_eq!(
            S3SignerV4::create_canonical_query_string("zebra=1&alpha=2"),
            "alpha=2&zebra=1"
        );
    }

    #[test]
    fn test_parse_url_fast() {
        assert_eq!(
            S3SignerV4::parse_url_fast("http://store.local:9000/collections/2026/test.png"),
            ("/collections/2026/test.png", "")
        );
        assert_eq!(
            S3SignerV4::parse_url_fast("https://store.local:9000/collections?policy"),
            ("/collections", "policy")
        );
        assert_eq!(S3SignerV4::parse_url_fast("http://store.local:9000"), ("/", ""));
    }

    #[test]
    fn test_empty_sha256_constant() {
        assert_eq!(EMPTY_SHA256, hex::encode(Sha256::digest(b"")));
        assert_eq!(payload_hash(b""), EMPTY_SHA256);
    }

    #[test]
    fn test_payload_hash_known_vector() {
        assert_eq!(
            payload_hash(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_signing_key_derivation_known_vector() {
        // Published SigV4 key derivation example (service "iam")
        let aws4_key = b"AWS4wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY";
        let key = S3SignerV4::derive_signing_key(aws4_key, "20120215", "us-east-1", "iam");
        assert_eq!(
            hex::encode(key),
            "f4780e2d9f65fa895f9c67b32ce1baf0b0d8a43505a000a1a9e090d414db404d"
        );
    }

    #[test]
    fn test_canonical_request_layout() {
        let headers = signer().sign_at(
            "PUT",
            "http://store.local:9000/collections/2026/test.png",
            "image/png",
            &payload_hash(b"abc"),
            instant(),
        );
        let mut signed: BTreeMap<String, String> = headers;
        signed.remove("authorization");

        let canonical = S3SignerV4::canonical_request(
            "PUT",
            "http://store.local:9000/collections/2026/test.png",
            &signed,
            &payload_hash(b"abc"),
        );

        let expected = "PUT\n\
            /collections/2026/test.png\n\
            \n\
            content-type:image/png\n\
            host:store.local:9000\n\
            x-amz-content-sha256:ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad\n\
            x-amz-date:20260219T083005Z\n\
            \n\
            content-type;host;x-amz-content-sha256;x-amz-date\n\
            ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";
        assert_eq!(canonical, expected);
    }

    #[test]
    fn test_canonical_headers_order_ignores_insertion_order() {
        let mut headers = BTreeMap::new();
        headers.insert("x-amz-date".to_string(), "d".to_string());
        headers.insert("host".to_string(), "h".to_string());
        headers.insert("x-amz-content-sha256".to_string(), "s".to_string());
        headers.insert("content-type".to_string(), "c".to_string());

        assert_eq!(
            S3SignerV4::create_canonical_headers(&headers),
            "content-type:c\nhost:h\nx-amz-content-sha256:s\nx-amz-date:d\n"
        );
    }

    #[test]
    fn test_sign_headers() {
        let headers = signer().sign(
            "PUT",
            "http://store.local:9000/collections/2026/test.png",
            "image/png",
            &payload_hash(b"abc"),
        );

        let names: Vec<&str> = headers.keys().map(String::as_str).collect();
        assert_eq!(
            names,
            vec!["authorization", "content-type", "host", "x-amz-content-sha256", "x-amz-date"]
        );
        assert_eq!(headers["host"], "store.local:9000");
        assert_eq!(headers["x-amz-date"], "20260219T083005Z");
        assert_eq!(
            headers["x-amz-content-sha256"],
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );

        let auth = &headers["authorization"];
        let prefix = "AWS4-HMAC-SHA256 Credential=AK/20260219/us-east-1/s3/aws4_request, \
                      SignedHeaders=content-type;host;x-amz-content-sha256;x-amz-date, Signature=";
        assert!(auth.starts_with(prefix), "{}", auth);
        let signature = &auth[prefix.len()..];
        assert_eq!(signature.len(), 64);
        assert!(signature.bytes().all(|b| b.is_ascii_hexdigit()));
    }

    #[test]
    fn test_signature_matches_manual_derivation() {
        let url = "http://store.local:9000/collections";
        let headers = signer().sign("HEAD", url, "application/octet-stream", EMPTY_SHA256);

        let mut signed = headers.clone();
        signed.remove("authorization");
        let canonical = S3SignerV4::canonical_request("HEAD", url, &signed, EMPTY_SHA256);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n20260219T083005Z\n20260219/us-east-1/s3/aws4_request\n{}",
            hex::encode(Sha256::digest(canonical.as_bytes()))
        );

        let k_date = S3SignerV4::hmac_sha256(b"AWS4SK", b"20260219");
        let k_region = S3SignerV4::hmac_sha256(&k_date, b"us-east-1");
        let k_service = S3SignerV4::hmac_sha256(&k_region, b"s3");
        let k_signing = S3SignerV4::hmac_sha256(&k_service, b"aws4_request");
        let expected = hex::encode(S3SignerV4::hmac_sha256(&k_signing, string_to_sign.as_bytes()));

        assert!(headers["authorization"].ends_with(&format!("Signature={}", expected)));
    }

    #[test]
    fn test_signature_is_deterministic() {
        let signer = signer();
        let url = "http://store.local:9000/collections?policy";
        let a = signer.sign("PUT", url, "application/json", &payload_hash(b"{}"));
        let b = signer.sign("PUT", url, "application/json", &payload_hash(b"{}"));
        assert_eq!(a, b);

        // A fresh signer (empty key cache) agrees byte for byte
        let c = signer.clone().sign("PUT", url, "application/json", &payload_hash(b"{}"));
        assert_eq!(a["authorization"], c["authorization"]);
    }

    #[test]
    fn test_signature_depends_on_inputs() {
        let signer = signer();
        let url = "http://store.local:9000/collections/a.png";
        let base = signer.sign("PUT", url, "image/png", &payload_hash(b"abc"));
        let other_body = signer.sign("PUT", url, "image/png", &payload_hash(b"abd"));
        let other_type = signer.sign("PUT", url, "image/jpeg", &payload_hash(b"abc"));
        let next_day = signer.sign_at(
            "PUT",
            url,
            "image/png",
            &payload_hash(b"abc"),
            instant() + chrono::Duration::days(1),
        );

        assert_ne!(base["authorization"], other_body["authorization"]);
        assert_ne!(base["authorization"], other_type["authorization"]);
        assert_ne!(base["authorization"], next_day["authorization"]);
    }

    #[test]
    fn test_signing_key_cache() {
        let signer = S3SignerV4::new(&credentials(), Arc::new(SystemClock));

        let sig1 = signer.calculate_signature("20260101", "test");
        let sig2 = signer.calculate_signature("20260101", "test");
        assert_eq!(sig1, sig2);

        let sig3 = signer.calculate_signature("20260102", "test");
        assert_ne!(sig1, sig3);
    }

    #[test]
    fn test_empty_secret_still_signs() {
        let mut creds = credentials();
        creds.secret_key.clear();
        let signer = S3SignerV4::new(&creds, Arc::new(FixedClock::new(instant())));
        let headers = signer.sign(
            "HEAD",
            "http://store.local:9000/collections",
            "application/octet-stream",
            EMPTY_SHA256,
        );
        assert!(headers["authorization"].contains("Signature="));
    }
}
