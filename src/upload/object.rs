//! Single-object upload and object key derivation

use crate::s3::types::content_type_for;
use crate::s3::{S3Client, S3Error};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// UTC timestamp prepended to every object name, second granularity
pub const KEY_TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    S3(#[from] S3Error),
}

/// `<prefix>/<YYYYmmdd-HHMMSS>-<basename>`, or without the prefix when none is set.
///
/// Slashes around the prefix are trimmed so the key never starts with `/`
/// or contains `//`.
pub fn object_key(prefix: Option<&str>, basename: &str, at: DateTime<Utc>) -> String {
    let name = format!("{}-{}", at.format(KEY_TIMESTAMP_FORMAT), basename);
    match prefix.map(|p| p.trim_matches('/')).filter(|p| !p.is_empty()) {
        Some(prefix) => format!("{}/{}", prefix, name),
        None => name,
    }
}

/// Split `name.ext` into (`name`, `.ext`); dotfiles keep their leading dot in the stem.
fn split_extension(basename: &str) -> (&str, &str) {
    match basename.rfind('.') {
        Some(pos) if pos > 0 => basename.split_at(pos),
        _ => (basename, ""),
    }
}

/// Hands out object keys that are unique within one run.
///
/// Two files with the same basename in the same second would get the same
/// key; the second one gets a `-1`, `-2`, ... suffix on its stem.
#[derive(Debug, Default)]
pub struct KeyAllocator {
    prefix: Option<String>,
    issued: HashSet<String>,
}

impl KeyAllocator {
    pub fn new(prefix: Option<String>) -> Self {
        Self {
            prefix,
            issued: HashSet::new(),
        }
    }

    pub fn allocate(&mut self, basename: &str, at: DateTime<Utc>) -> String {
        let key = object_key(self.prefix.as_deref(), basename, at);
        if self.issued.insert(key.clone()) {
            return key;
        }

        let (stem, ext) = split_extension(basename);
        let mut n = 1u32;
        loop {
            let candidate = object_key(
                self.prefix.as_deref(),
                &format!("{}-{}{}", stem, n, ext),
                at,
            );
            if self.issued.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }
}

/// Read a file and PUT it under `key`, returning the object's URL.
///
/// The whole file is read into memory; uploads are single-shot.
pub async fn upload_file(client: &S3Client, path: &Path, key: &str) -> Result<String, UploadError> {
    let data = tokio::fs::read(path).await.map_err(|source| UploadError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let content_type = content_type_for(path);
    let url = client.put_object(key, Bytes::from(data), &content_type).await?;
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 19, 8, 30, 5).unwrap()
    }

    #[test]
    fn test_object_key_with_prefix() {
        assert_eq!(
            object_key(Some("xiaohongshu/2026-02-19"), "shot.png", at()),
            "xiaohongshu/2026-02-19/20260219-083005-shot.png"
        );
    }

    #[test]
    fn test_object_key_without_prefix() {
        assert_eq!(object_key(None, "shot.png", at()), "20260219-083005-shot.png");
        assert_eq!(object_key(Some(""), "shot.png", at()), "20260219-083005-shot.png");
        assert_eq!(object_key(Some("/"), "shot.png", at()), "20260219-083005-shot.png");
    }

    #[test]
    fn test_object_key_trims_prefix_slashes() {
        assert_eq!(
            object_key(Some("/notes/"), "a.jpg", at()),
            "notes/20260219-083005-a.jpg"
        );
    }

    #[test]
    fn test_split_extension() {
        assert_eq!(split_extension("shot.png"), ("shot", ".png"));
        assert_eq!(split_extension("archive.tar.gz"), ("archive.tar", ".gz"));
        assert_eq!(split_extension(".env"), (".env", ""));
        assert_eq!(split_extension("README"), ("README", ""));
    }

    #[test]
    fn test_allocator_distinct_seconds() {
        let mut keys = KeyAllocator::new(Some("p".to_string()));
        let a = keys.allocate("shot.png", at());
        let b = keys.allocate("shot.png", at() + chrono::Duration::seconds(1));
        assert_eq!(a, "p/20260219-083005-shot.png");
        assert_eq!(b, "p/20260219-083006-shot.png");
    }

    #[test]
    fn test_allocator_same_second_collision() {
        let mut keys = KeyAllocator::new(None);
        assert_eq!(keys.allocate("shot.png", at()), "20260219-083005-shot.png");
        assert_eq!(keys.allocate("shot.png", at()), "20260219-083005-shot-1.png");
        assert_eq!(keys.allocate("shot.png", at()), "20260219-083005-shot-2.png");
        assert_eq!(keys.allocate("other.png", at()), "20260219-083005-other.png");
    }
}
