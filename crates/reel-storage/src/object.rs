//! Object references.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{StorageError, StorageResult};

/// A bucket-qualified object, written as `s3://bucket/key`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    pub bucket: String,
    pub key: String,
}

impl ObjectRef {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Parse an `s3://bucket/key` URI.
    pub fn parse(uri: &str) -> StorageResult<Self> {
        let url = Url::parse(uri).map_err(|e| StorageError::invalid_reference(format!("{}: {}", uri, e)))?;
        if url.scheme() != "s3" {
            return Err(StorageError::invalid_reference(format!(
                "{}: expected s3:// scheme",
                uri
            )));
        }

        let bucket = url
            .host_str()
            .filter(|b| !b.is_empty())
            .ok_or_else(|| StorageError::invalid_reference(format!("{}: missing bucket", uri)))?;
        let key = url.path().trim_start_matches('/');
        if key.is_empty() {
            return Err(StorageError::invalid_reference(format!("{}: missing key", uri)));
        }

        let key = urlencoding::decode(key)
            .map(|k| k.into_owned())
            .map_err(|e| StorageError::invalid_reference(format!("{}: {}", uri, e)))?;
        Ok(Self::new(bucket, key))
    }

    /// Whether `source` looks like an object reference rather than a web URL.
    pub fn is_object_uri(source: &str) -> bool {
        source.starts_with("s3://")
    }

    /// File name component of the key.
    pub fn file_name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

impl FromStr for ObjectRef {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// MIME type for an upload, from the file extension.
pub fn content_type_for(path: impl AsRef<Path>) -> &'static str {
    match path
        .as_ref()
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("mp4") => "video/mp4",
        Some("mov") => "video/quicktime",
        Some("webm") => "video/webm",
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("json") => "application/json",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_object_uri() {
        let r = ObjectRef::parse("s3://uploads/user-1/raw/talk.mp4").unwrap();
        assert_eq!(r.bucket, "uploads");
        assert_eq!(r.key, "user-1/raw/talk.mp4");
        assert_eq!(r.file_name(), "talk.mp4");
        assert_eq!(r.to_string(), "s3://uploads/user-1/raw/talk.mp4");
    }

    #[test]
    fn test_parse_decodes_key() {
        let r = ObjectRef::parse("s3://b/my%20talk.mp4").unwrap();
        assert_eq!(r.key, "my talk.mp4");
    }

    #[test]
    fn test_parse_rejects_bad_uris() {
        assert!(ObjectRef::parse("https://example.com/a.mp4").is_err());
        assert!(ObjectRef::parse("s3://bucket-only").is_err());
        assert!(ObjectRef::parse("s3://bucket/").is_err());
        assert!(ObjectRef::parse("not a uri").is_err());
    }

    #[test]
    fn test_is_object_uri() {
        assert!(ObjectRef::is_object_uri("s3://a/b"));
        assert!(!ObjectRef::is_object_uri("https://youtube.com/watch?v=x"));
    }

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for("clip.MP4"), "video/mp4");
        assert_eq!(content_type_for("audio.mp3"), "audio/mpeg");
        assert_eq!(content_type_for("blob"), "application/octet-stream");
    }
}
