use std::path::{Path, PathBuf};

use anyhow::Context;
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Folder for indicator evidence files.
pub const EVIDENCE_DIR: &str = "medios_verificacion";
/// Folder for consolidated report documents.
pub const REPORTS_DIR: &str = "reportes_consolidados";

#[derive(Debug, Clone)]
pub struct StoredAttachment {
    pub content_hash: String,
    pub relative_path: PathBuf,
    pub absolute_path: PathBuf,
    pub byte_size: usize,
    pub deduplicated: bool,
}

impl StoredAttachment {
    /// Path as recorded on the owning entity, always `/`-separated.
    pub fn recorded_path(&self) -> String {
        self.relative_path
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }
}

/// Immutable, content-addressed file store for uploaded documents.
#[derive(Debug, Clone)]
pub struct AttachmentStore {
    root: PathBuf,
}

impl AttachmentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn sha256_hex(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        hex::encode(hasher.finalize())
    }

    /// Extension taken from an uploaded file name, reduced to ASCII alphanumerics.
    pub fn extension_of(filename: &str) -> String {
        let ext = Path::new(filename)
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        let ext: String = ext.chars().filter(char::is_ascii_alphanumeric).take(10).collect();
        if ext.is_empty() {
            "bin".to_string()
        } else {
            ext
        }
    }

    pub fn relative_path(&self, folder: &str, content_hash: &str, filename: &str) -> PathBuf {
        PathBuf::from(folder).join(format!(
            "{content_hash}.{}",
            Self::extension_of(filename)
        ))
    }

    /// Store bytes under a hash-addressed path using a temp file and atomic rename.
    pub async fn store_bytes(
        &self,
        folder: &str,
        filename: &str,
        bytes: &[u8],
    ) -> anyhow::Result<StoredAttachment> {
        let content_hash = Self::sha256_hex(bytes);
        let relative_path = self.relative_path(folder, &content_hash, filename);
        let absolute_path = self.root.join(&relative_path);
        let parent = absolute_path
            .parent()
            .map(Path::to_path_buf)
            .with_context(|| format!("attachment path {} has no parent", absolute_path.display()))?;

        fs::create_dir_all(&parent)
            .await
            .with_context(|| format!("creating attachment directory {}", parent.display()))?;

        let stored = |deduplicated| StoredAttachment {
            content_hash: content_hash.clone(),
            relative_path: relative_path.clone(),
            absolute_path: absolute_path.clone(),
            byte_size: bytes.len(),
            deduplicated,
        };

        if fs::try_exists(&absolute_path)
            .await
            .with_context(|| format!("checking attachment path {}", absolute_path.display()))?
        {
            return Ok(stored(true));
        }

        let temp_path = parent.join(format!(".{}.{}.tmp", Uuid::new_v4(), bytes.len()));
        let mut file = fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp_path)
            .await
            .with_context(|| format!("opening temp attachment file {}", temp_path.display()))?;
        file.write_all(bytes)
            .await
            .with_context(|| format!("writing temp attachment file {}", temp_path.display()))?;
        file.flush()
            .await
            .with_context(|| format!("flushing temp attachment file {}", temp_path.display()))?;
        drop(file);

        match fs::rename(&temp_path, &absolute_path).await {
            Ok(()) => Ok(stored(false)),
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                let _ = fs::remove_file(&temp_path).await;
                Ok(stored(true))
            }
            Err(err) => {
                let _ = fs::remove_file(&temp_path).await;
                Err(err).with_context(|| {
                    format!(
                        "atomically renaming temp attachment {} -> {}",
                        temp_path.display(),
                        absolute_path.display()
                    )
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn attachment_hashing_is_stable() {
        let hash = AttachmentStore::sha256_hex(b"hello world");
        assert_eq!(
            hash,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn extensions_are_sanitized() {
        assert_eq!(AttachmentStore::extension_of("informe.PDF"), "pdf");
        assert_eq!(AttachmentStore::extension_of("acta"), "bin");
        assert_eq!(AttachmentStore::extension_of("x.p/d f"), "bin");
        assert_eq!(AttachmentStore::extension_of("foto.jp g"), "jpg");
    }

    #[tokio::test]
    async fn atomic_writes_deduplicate_by_hash_path() {
        let dir = tempdir().expect("tempdir");
        let store = AttachmentStore::new(dir.path());

        let first = store
            .store_bytes(EVIDENCE_DIR, "acta.pdf", b"%PDF-1.4 same")
            .await
            .expect("first store");
        let second = store
            .store_bytes(EVIDENCE_DIR, "acta-copia.pdf", b"%PDF-1.4 same")
            .await
            .expect("second store");

        assert!(!first.deduplicated);
        assert!(second.deduplicated);
        assert_eq!(first.content_hash, second.content_hash);
        assert_eq!(first.relative_path, second.relative_path);
        assert!(first.absolute_path.exists());
        assert_eq!(
            first.recorded_path(),
            format!("medios_verificacion/{}.pdf", first.content_hash)
        );
    }
}
