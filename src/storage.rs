//! Local-disk file bucket for attachments. Objects live at
//! `<root>/<bucket>/<key>`; keys are generated here, never taken from the
//! client.

use std::{
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
};

use crate::errors::AppError;

pub const ATTACHMENTS_BUCKET: &str = "attachments";
const MAX_FILENAME_LEN: usize = 120;

static KEY_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Storage { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, AppError> {
        if !is_safe_segment(bucket) || !is_safe_segment(key) {
            return Err(AppError::StorageError(format!(
                "refusing object path {bucket}/{key}"
            )));
        }
        Ok(self.root.join(bucket).join(key))
    }

    /// Writes `bytes` under a fresh key and returns the key.
    pub async fn put(&self, bucket: &str, filename: &str, bytes: &[u8]) -> Result<String, AppError> {
        let key = generate_key(filename);
        let path = self.object_path(bucket, &key)?;
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                log::error!("Failed to create bucket dir {}: {}", dir.display(), e);
                AppError::StorageError(e.to_string())
            })?;
        }
        tokio::fs::write(&path, bytes).await.map_err(|e| {
            log::error!("Failed to write {}: {}", path.display(), e);
            AppError::StorageError(e.to_string())
        })?;
        log::info!("Stored {} bytes as {}/{}", bytes.len(), bucket, key);
        Ok(key)
    }

    /// Path of an existing object, for streaming it back with `NamedFile`.
    pub fn path_of(&self, bucket: &str, key: &str) -> Result<PathBuf, AppError> {
        self.object_path(bucket, key)
    }

    /// Removes an object. A missing file is not an error.
    pub async fn remove(&self, bucket: &str, key: &str) -> Result<(), AppError> {
        let path = self.object_path(bucket, key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                log::info!("Removed {}/{}", bucket, key);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::warn!("Object {}/{} was already gone", bucket, key);
                Ok(())
            }
            Err(e) => {
                log::error!("Failed to remove {}: {}", path.display(), e);
                Err(AppError::StorageError(e.to_string()))
            }
        }
    }
}

fn is_safe_segment(s: &str) -> bool {
    !s.is_empty()
        && s != "."
        && s != ".."
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Reduces a client-supplied filename to a safe display/storage name.
pub fn sanitize_filename(name: &str) -> String {
    // browsers on Windows may send a full path
    let base = name.rsplit(&['/', '\\'][..]).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_FILENAME_LEN)
        .collect();
    let trimmed = cleaned.trim_start_matches('.');
    if trimmed.is_empty() {
        "file".to_owned()
    } else {
        trimmed.to_owned()
    }
}

fn generate_key(filename: &str) -> String {
    let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let seq = KEY_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{nanos:x}-{seq:x}-{}", sanitize_filename(filename))
}

/// Guesses a MIME type from the file extension, `application/octet-stream`
/// when unknown.
pub fn content_type_for(filename: &str) -> String {
    let ext = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    actix_files::file_extension_to_mime(&ext).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_root(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("worktrack-storage-{name}-{}", std::process::id()))
    }

    #[test]
    fn filenames_are_sanitized() {
        assert_eq!(sanitize_filename("report.pdf"), "report.pdf");
        assert_eq!(sanitize_filename("C:\\Users\\me\\plan v2.pdf"), "plan_v2.pdf");
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename(".."), "file");
        assert_eq!(sanitize_filename(".env"), "env");
        assert_eq!(sanitize_filename(""), "file");
    }

    #[test]
    fn content_types() {
        assert_eq!(content_type_for("a.PDF"), "application/pdf");
        assert_eq!(content_type_for("photo.jpeg"), "image/jpeg");
        assert_eq!(content_type_for("noext"), "application/octet-stream");
        assert_eq!(content_type_for("notes.txt"), "text/plain");
        assert_eq!(content_type_for("drawing.svg"), "image/svg+xml");
        assert_eq!(content_type_for("archive.unknown-ext"), "application/octet-stream");
    }

    #[test]
    fn unsafe_paths_are_refused() {
        let storage = Storage::new("/tmp/unused");
        assert!(storage.path_of("attachments", "../x").is_err());
        assert!(storage.path_of("..", "x").is_err());
        assert!(storage.path_of("attachments", "ok-1.txt").is_ok());
    }

    #[actix_web::test]
    async fn put_then_remove() {
        let root = temp_root("put");
        let storage = Storage::new(&root);
        let key = storage
            .put(ATTACHMENTS_BUCKET, "notes.txt", b"hello")
            .await
            .unwrap();
        assert!(key.ends_with("-notes.txt"));

        let path = storage.path_of(ATTACHMENTS_BUCKET, &key).unwrap();
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"hello");

        storage.remove(ATTACHMENTS_BUCKET, &key).await.unwrap();
        assert!(!path.exists());
        // second removal is tolerated
        storage.remove(ATTACHMENTS_BUCKET, &key).await.unwrap();

        let _ = std::fs::remove_dir_all(root);
    }

    #[test]
    fn keys_are_unique() {
        assert_ne!(generate_key("a.txt"), generate_key("a.txt"));
    }
}
