use std::fmt;

use crate::types::error::S3mvError;

const S3_SCHEME: &str = "s3://";
const S3A_SCHEME: &str = "s3a://";

/// Addressing schemes a storage path can be written in.
///
/// Resolved once while the configuration is validated and used to pick the
/// storage backend; it is never re-evaluated per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageScheme {
    /// `s3://bucket/key` or `s3a://bucket/key`.
    S3,
}

impl StorageScheme {
    pub fn from_uri(uri: &str) -> Result<Self, S3mvError> {
        if uri.starts_with(S3_SCHEME) || uri.starts_with(S3A_SCHEME) {
            Ok(StorageScheme::S3)
        } else {
            Err(S3mvError::InvalidUri(format!(
                "{uri}: only Amazon S3 paths (s3://<BUCKET>[/key]) are supported"
            )))
        }
    }
}

/// An object location: `bucket + key`.
///
/// Immutable. Two paths are equal iff bucket and key match exactly. A root
/// path is treated as a directory: its listing prefix always ends with `/`
/// unless the key is empty.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StoragePath {
    bucket: String,
    key: String,
}

impl StoragePath {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Parse `s3://bucket/key` (or `s3a://`).
    ///
    /// # Example
    ///
    /// ```
    /// use s3mv_rs::types::storage_path::StoragePath;
    ///
    /// let path = StoragePath::parse("s3://my-bucket/prefix/").unwrap();
    /// assert_eq!(path.bucket(), "my-bucket");
    /// assert_eq!(path.key(), "prefix/");
    /// ```
    pub fn parse(uri: &str) -> Result<Self, S3mvError> {
        let StorageScheme::S3 = StorageScheme::from_uri(uri)?;

        let without_scheme = uri
            .strip_prefix(S3_SCHEME)
            .or_else(|| uri.strip_prefix(S3A_SCHEME))
            .unwrap_or(uri);

        let (bucket, key) = match without_scheme.find('/') {
            Some(idx) => (&without_scheme[..idx], &without_scheme[idx + 1..]),
            None => (without_scheme, ""),
        };

        if bucket.is_empty() || bucket.chars().any(char::is_whitespace) {
            return Err(S3mvError::InvalidUri(format!(
                "{uri}: bucket name is missing or malformed"
            )));
        }

        Ok(Self::new(bucket, key))
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Listing prefix for this path when used as a root.
    pub fn prefix(&self) -> String {
        if self.key.is_empty() || self.key.ends_with('/') {
            self.key.clone()
        } else {
            format!("{}/", self.key)
        }
    }

    /// Path of `suffix` under this root, in the same bucket.
    ///
    /// Exactly one `/` separates a non-empty key from the suffix.
    pub fn join(&self, suffix: &str) -> StoragePath {
        let suffix = suffix.trim_start_matches('/');
        let key = if self.key.is_empty() {
            suffix.to_string()
        } else if suffix.is_empty() {
            self.key.clone()
        } else {
            format!("{}{}", self.prefix(), suffix)
        };

        StoragePath::new(self.bucket.clone(), key)
    }

    /// Strip this root's prefix from `key`.
    ///
    /// Keys outside the root are returned unchanged, so applying it twice is
    /// the same as applying it once for any key that does not repeat the
    /// prefix.
    pub fn relative_key<'a>(&self, key: &'a str) -> &'a str {
        strip_key_prefix(key, &self.key)
    }
}

/// Strip `prefix` (directory semantics) from the front of `key`.
pub fn strip_key_prefix<'a>(key: &'a str, prefix: &str) -> &'a str {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return key.trim_start_matches('/');
    }

    match key.strip_prefix(prefix) {
        Some(rest) if rest.starts_with('/') => rest.trim_start_matches('/'),
        _ => key,
    }
}

impl fmt::Display for StoragePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{S3_SCHEME}{}/{}", self.bucket, self.key)
    }
}
