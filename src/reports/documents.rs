use sha2::{Digest, Sha256};
use std::path::{Component, Path, PathBuf};
use uuid::Uuid;

use super::error::ReportError;

/// Result of writing a document to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    /// Path relative to the store root, as recorded in `documents.storage_path`.
    pub storage_path: String,
    pub size_bytes: i64,
    pub sha256: String,
}

/// Filesystem store for generated documents, laid out as `<root>/<org_id>/<document_id>/<file_name>`.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    root: PathBuf,
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_matches('.');
    if trimmed.is_empty() {
        "document".to_string()
    } else {
        trimmed.to_string()
    }
}

impl DocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves a stored relative path, refusing anything that escapes the root.
    fn resolve(&self, storage_path: &str) -> Result<PathBuf, ReportError> {
        let relative = Path::new(storage_path);
        let safe = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if !safe || storage_path.is_empty() {
            return Err(ReportError::Storage(format!(
                "Refusing storage path {storage_path:?}"
            )));
        }
        Ok(self.root.join(relative))
    }

    pub async fn save(
        &self,
        org_id: Uuid,
        document_id: Uuid,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<StoredFile, ReportError> {
        let storage_path = format!(
            "{}/{}/{}",
            org_id,
            document_id,
            sanitize_file_name(file_name)
        );
        let path = self.resolve(&storage_path)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;

        Ok(StoredFile {
            storage_path,
            size_bytes: bytes.len() as i64,
            sha256: sha256_hex(bytes),
        })
    }

    pub async fn read(&self, storage_path: &str) -> Result<Vec<u8>, ReportError> {
        let path = self.resolve(storage_path)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ReportError::NotFound(
                "Document file is missing from storage".to_string(),
            )),
            Err(e) => Err(e.into()),
        }
    }

    /// Reads and checks the content against the recorded digest.
    pub async fn read_verified(
        &self,
        storage_path: &str,
        expected_sha256: &str,
    ) -> Result<Vec<u8>, ReportError> {
        let bytes = self.read(storage_path).await?;
        if sha256_hex(&bytes) != expected_sha256 {
            return Err(ReportError::Storage(format!(
                "Checksum mismatch for {storage_path}"
            )));
        }
        Ok(bytes)
    }

    pub async fn remove(&self, storage_path: &str) -> Result<(), ReportError> {
        let path = self.resolve(storage_path)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = DocumentStore::new(dir.path());
        let org = Uuid::new_v4();
        let doc = Uuid::new_v4();

        let stored = store
            .save(org, doc, "risk register.pdf", b"%PDF-1.4 test")
            .await
            .unwrap();
        assert_eq!(stored.size_bytes, 13);
        assert!(stored.storage_path.ends_with("risk_register.pdf"));
        assert_eq!(stored.sha256, sha256_hex(b"%PDF-1.4 test"));

        let bytes = store
            .read_verified(&stored.storage_path, &stored.sha256)
            .await
            .unwrap();
        assert_eq!(bytes, b"%PDF-1.4 test");

        store.remove(&stored.storage_path).await.unwrap();
        assert!(matches!(
            store.read(&stored.storage_path).await,
            Err(ReportError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_rejects_escaping_paths() {
        let dir = tempfile::tempdir().unwrap();
        let store = DocumentStore::new(dir.path());
        assert!(store.read("../etc/passwd").await.is_err());
        assert!(store.read("/etc/passwd").await.is_err());
    }

    #[tokio::test]
    async fn test_detects_tampering() {
        let dir = tempfile::tempdir().unwrap();
        let store = DocumentStore::new(dir.path());
        let stored = store
            .save(Uuid::new_v4(), Uuid::new_v4(), "a.pdf", b"original")
            .await
            .unwrap();
        tokio::fs::write(dir.path().join(&stored.storage_path), b"changed")
            .await
            .unwrap();
        assert!(store
            .read_verified(&stored.storage_path, &stored.sha256)
            .await
            .is_err());
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("../../x.pdf"), "_.._x.pdf");
        assert_eq!(sanitize_file_name(".."), "document");
    }
}
