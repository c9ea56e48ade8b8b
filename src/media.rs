//! Media ingest: uploaded images and audio persisted on local disk.
//!
//! Stored files are served back under `/uploads/<name>`, and audio requests
//! may reference them by that path.

use crate::error::GatewayError;
use crate::model::ModelClass;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Maximum accepted upload size (25 MiB).
pub const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

/// Path prefix under which stored media is served.
pub const UPLOADS_PREFIX: &str = "/uploads/";

const MAX_NAME_LEN: usize = 100;

/// A file written by [`MediaStore::store`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMedia {
    pub filename: String,
    pub content_type: String,
    pub size: usize,
}

impl StoredMedia {
    /// Server-relative reference, e.g. `/uploads/1700000000000-ab12cd34-cat.png`.
    pub fn reference(&self) -> String {
        format!("{}{}", UPLOADS_PREFIX, self.filename)
    }

    /// Absolute reference under `base` (scheme and authority, no trailing slash).
    pub fn public_url(&self, base: &str) -> String {
        format!("{}{}", base.trim_end_matches('/'), self.reference())
    }
}

/// Reduce an uploaded file name to a safe single path component.
pub fn sanitize_filename(name: &str) -> String {
    static UNSAFE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[^A-Za-z0-9._-]").expect("valid regex"));

    // Browsers on some platforms send the full client path.
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned = UNSAFE.replace_all(base, "_");
    let cleaned = cleaned.trim_start_matches('.');
    let truncated: String = cleaned.chars().take(MAX_NAME_LEN).collect();

    if truncated.is_empty() {
        "upload".to_string()
    } else {
        truncated
    }
}

/// Check a declared content type against the class the upload is meant for.
pub fn check_content_type(content_type: &str, target: Option<ModelClass>) -> Result<(), GatewayError> {
    let Some(class) = target else {
        return Ok(());
    };
    match class.accepted_media_prefix() {
        Some(prefix) if !content_type.starts_with(prefix) => {
            let kind = prefix.trim_end_matches('/');
            Err(GatewayError::InvalidRequest(format!(
                "Only {} files are allowed for {} models",
                kind, class
            )))
        }
        _ => Ok(()),
    }
}

/// Upload directory on local disk.
#[derive(Debug, Clone)]
pub struct MediaStore {
    dir: PathBuf,
}

impl MediaStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the upload directory if it does not exist yet.
    pub async fn ensure_dir(&self) -> Result<(), GatewayError> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            GatewayError::Internal(format!(
                "cannot create upload directory {}: {}",
                self.dir.display(),
                e
            ))
        })
    }

    /// Validate and persist an upload.
    ///
    /// A missing content type is guessed from the file extension.
    pub async fn store(
        &self,
        bytes: &[u8],
        original_name: &str,
        content_type: Option<&str>,
        target: Option<ModelClass>,
    ) -> Result<StoredMedia, GatewayError> {
        if bytes.is_empty() {
            return Err(GatewayError::InvalidRequest("Uploaded file is empty".to_string()));
        }
        if bytes.len() > MAX_UPLOAD_BYTES {
            return Err(GatewayError::InvalidRequest(format!(
                "File exceeds the {} MiB upload limit",
                MAX_UPLOAD_BYTES / (1024 * 1024)
            )));
        }

        let content_type = match content_type {
            Some(ct) if !ct.is_empty() => ct.to_string(),
            _ => mime_guess::from_path(original_name)
                .first_or_octet_stream()
                .to_string(),
        };
        check_content_type(&content_type, target)?;

        let short_id = uuid::Uuid::new_v4().simple().to_string();
        let filename = format!(
            "{}-{}-{}",
            chrono::Utc::now().timestamp_millis(),
            &short_id[..8],
            sanitize_filename(original_name)
        );

        self.ensure_dir().await?;
        tokio::fs::write(self.dir.join(&filename), bytes)
            .await
            .map_err(|e| GatewayError::Internal(format!("Error processing upload: {}", e)))?;

        tracing::info!(
            filename = %filename,
            content_type = %content_type,
            size = bytes.len(),
            "Stored upload"
        );

        Ok(StoredMedia {
            filename,
            content_type,
            size: bytes.len(),
        })
    }

    /// Resolve an `/uploads/<name>` reference to its bytes and file name.
    pub async fn read(&self, reference: &str) -> Result<(Vec<u8>, String), GatewayError> {
        let name = reference
            .strip_prefix(UPLOADS_PREFIX)
            .filter(|name| !name.is_empty() && sanitize_filename(name) == *name)
            .ok_or_else(|| GatewayError::InvalidRequest("Invalid media URL format".to_string()))?;

        match tokio::fs::read(self.dir.join(name)).await {
            Ok(bytes) => Ok((bytes, name.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(
                GatewayError::InvalidRequest(format!("Uploaded media not found: {}", name)),
            ),
            Err(e) => Err(GatewayError::Internal(format!("cannot read {}: {}", name, e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn sanitize_keeps_safe_names() {
        assert_eq!(sanitize_filename("cat-photo_01.png"), "cat-photo_01.png");
    }

    #[test]
    fn sanitize_replaces_unsafe_characters() {
        assert_eq!(sanitize_filename("my song (live).mp3"), "my_song__live_.mp3");
    }

    #[test]
    fn sanitize_strips_directories_and_leading_dots() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\Users\\me\\clip.wav"), "clip.wav");
        assert_eq!(sanitize_filename(".hidden"), "hidden");
        assert_eq!(sanitize_filename(".."), "upload");
    }

    #[test]
    fn content_type_must_match_target_class() {
        assert!(check_content_type("image/png", Some(ModelClass::Vision)).is_ok());
        assert!(check_content_type("audio/mpeg", Some(ModelClass::Audio)).is_ok());

        let err = check_content_type("audio/mpeg", Some(ModelClass::Vision)).unwrap_err();
        assert_eq!(err.to_string(), "Only image files are allowed for vision models");

        let err = check_content_type("image/png", Some(ModelClass::Audio)).unwrap_err();
        assert_eq!(err.to_string(), "Only audio files are allowed for audio models");
    }

    #[test]
    fn content_type_unchecked_without_media_class() {
        assert!(check_content_type("application/pdf", None).is_ok());
        assert!(check_content_type("application/pdf", Some(ModelClass::General)).is_ok());
    }

    #[tokio::test]
    async fn store_writes_file_and_read_resolves_it() {
        let dir = tempfile::tempdir().unwrap();
        let store = MediaStore::new(dir.path().join("uploads"));

        let stored = store
            .store(b"RIFFdata", "clip.wav", Some("audio/wav"), Some(ModelClass::Audio))
            .await
            .unwrap();

        assert!(stored.filename.ends_with("-clip.wav"));
        assert_eq!(stored.size, 8);
        assert!(store.dir().join(&stored.filename).exists());

        let (bytes, name) = store.read(&stored.reference()).await.unwrap();
        assert_eq!(bytes, b"RIFFdata".to_vec());
        assert_eq!(name, stored.filename);
    }

    #[tokio::test]
    async fn store_guesses_missing_content_type() {
        let dir = tempfile::tempdir().unwrap();
        let store = MediaStore::new(dir.path());

        let stored = store
            .store(b"\x89PNG", "cat.png", None, Some(ModelClass::Vision))
            .await
            .unwrap();
        assert_eq!(stored.content_type, "image/png");

        let err = store
            .store(b"\x89PNG", "cat.png", None, Some(ModelClass::Audio))
            .await
            .unwrap_err();
        assert_eq!(err.error_type(), "invalid_request");
    }

    #[tokio::test]
    async fn store_rejects_empty_and_oversized_payloads() {
        let dir = tempfile::tempdir().unwrap();
        let store = MediaStore::new(dir.path());

        assert!(store.store(b"", "a.png", Some("image/png"), None).await.is_err());

        let big = vec![0u8; MAX_UPLOAD_BYTES + 1];
        let err = store
            .store(&big, "big.png", Some("image/png"), None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("25 MiB"));
    }

    #[tokio::test]
    async fn read_rejects_traversal_and_foreign_references() {
        let dir = tempfile::tempdir().unwrap();
        let store = MediaStore::new(dir.path());

        for reference in ["/uploads/../secret", "/uploads/", "/etc/passwd", "uploads/a.mp3"] {
            let err = store.read(reference).await.unwrap_err();
            assert_eq!(err.to_string(), "Invalid media URL format", "{}", reference);
        }
    }

    #[tokio::test]
    async fn read_reports_missing_upload() {
        let dir = tempfile::tempdir().unwrap();
        let store = MediaStore::new(dir.path());

        let err = store.read("/uploads/nope.mp3").await.unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn public_url_joins_base_and_reference() {
        let stored = StoredMedia {
            filename: "1-abc-cat.png".to_string(),
            content_type: "image/png".to_string(),
            size: 1,
        };
        assert_eq!(
            stored.public_url("http://localhost:3000/"),
            "http://localhost:3000/uploads/1-abc-cat.png"
        );
    }
}
