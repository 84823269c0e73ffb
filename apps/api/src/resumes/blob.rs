use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use crate::errors::AppError;
use crate::store::fs::write_atomic;

/// Where resume file bytes live. Manifests only hold the returned path.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores `bytes` under the relative `key` and returns the managed path.
    async fn put(&self, key: &str, bytes: Bytes) -> Result<String, AppError>;

    async fn get(&self, managed_path: &str) -> Result<Bytes, AppError>;

    /// Removing a path that is already gone is not an error.
    async fn delete(&self, managed_path: &str) -> Result<(), AppError>;
}

/// Plain files under `DATA_DIR/resumes`.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub async fn open(root: impl AsRef<Path>) -> Result<Self, AppError> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    fn resolve(&self, key: &str) -> Result<PathBuf, AppError> {
        let rel = Path::new(key);
        if key.is_empty() || !rel.components().all(|c| matches!(c, Component::Normal(_))) {
            return Err(AppError::Validation(format!("Invalid managed file key '{key}'")));
        }
        Ok(self.root.join(rel))
    }

    fn owned(&self, managed_path: &str) -> Result<PathBuf, AppError> {
        let path = PathBuf::from(managed_path);
        if !path.starts_with(&self.root) {
            return Err(AppError::Validation(format!(
                "Path '{managed_path}' is outside the managed resume folder"
            )));
        }
        Ok(path)
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, key: &str, bytes: Bytes) -> Result<String, AppError> {
        let path = self.resolve(key)?;
        write_atomic(&path, bytes.to_vec()).await?;
        debug!("Stored {} bytes at {}", bytes.len(), path.display());
        Ok(path.to_string_lossy().into_owned())
    }

    async fn get(&self, managed_path: &str) -> Result<Bytes, AppError> {
        let path = self.owned(managed_path)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(AppError::NotFound(
                format!("Resume file {managed_path} is missing"),
            )),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, managed_path: &str) -> Result<(), AppError> {
        let path = self.owned(managed_path)?;
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
    async fn test_put_get_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::open(dir.path()).await.unwrap();
        let path = store
            .put("job/Acme_SWE_2024-01-01.pdf", Bytes::from_static(b"%PDF"))
            .await
            .unwrap();
        assert_eq!(store.get(&path).await.unwrap(), Bytes::from_static(b"%PDF"));

        store.delete(&path).await.unwrap();
        store.delete(&path).await.unwrap();
        assert!(matches!(store.get(&path).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_rejects_escaping_keys_and_paths() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::open(dir.path().join("resumes")).await.unwrap();
        assert!(matches!(
            store.put("../outside.pdf", Bytes::new()).await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            store.get("/etc/passwd").await,
            Err(AppError::Validation(_))
        ));
    }
}
