use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::errors::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Jobs,
    Manifests,
}

impl Collection {
    pub fn dir_name(self) -> &'static str {
        match self {
            Collection::Jobs => "jobs",
            Collection::Manifests => "manifests",
        }
    }
}

/// One JSON file per document, keyed by uuid, under `root/<collection>/`.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    root: PathBuf,
}

impl DocumentStore {
    pub async fn open(root: impl AsRef<Path>) -> Result<Self, AppError> {
        let root = root.as_ref().to_path_buf();
        for c in [Collection::Jobs, Collection::Manifests] {
            tokio::fs::create_dir_all(root.join(c.dir_name())).await?;
        }
        info!("Document store opened at {}", root.display());
        Ok(Self { root })
    }

    fn doc_path(&self, collection: Collection, id: Uuid) -> PathBuf {
        self.root
            .join(collection.dir_name())
            .join(format!("{id}.json"))
    }

    pub fn sidecar_path(&self, collection: Collection, id: Uuid, ext: &str) -> PathBuf {
        self.root
            .join(collection.dir_name())
            .join(format!("{id}.{ext}"))
    }

    pub async fn read<T: DeserializeOwned>(
        &self,
        collection: Collection,
        id: Uuid,
    ) -> Result<Option<T>, AppError> {
        match tokio::fs::read(self.doc_path(collection, id)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn write<T: Serialize>(
        &self,
        collection: Collection,
        id: Uuid,
        doc: &T,
    ) -> Result<(), AppError> {
        let bytes = serde_json::to_vec_pretty(doc)?;
        write_atomic(&self.doc_path(collection, id), bytes).await?;
        debug!("Wrote {}/{id}", collection.dir_name());
        Ok(())
    }

    /// Returns whether a document was actually removed.
    pub async fn remove(&self, collection: Collection, id: Uuid) -> Result<bool, AppError> {
        match tokio::fs::remove_file(self.doc_path(collection, id)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Ids present at call time, sorted for deterministic iteration.
    pub async fn list_ids(&self, collection: Collection) -> Result<Vec<Uuid>, AppError> {
        let mut ids = Vec::new();
        let mut dir = tokio::fs::read_dir(self.root.join(collection.dir_name())).await?;
        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(stem) = name.strip_suffix(".json") {
                if let Ok(id) = Uuid::parse_str(stem) {
                    ids.push(id);
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}

/// Writes `bytes` to a temp file beside `path`, syncs, then renames over `path`.
/// Readers see either the old file or the new one, never a torn write.
pub async fn write_atomic(path: &Path, bytes: Vec<u8>) -> io::Result<()> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let dir = path
            .parent()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no parent"))?;
        std::fs::create_dir_all(dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| e.error)?;
        Ok(())
    })
    .await
    .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Doc {
        name: String,
    }

    #[tokio::test]
    async fn test_write_then_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = DocumentStore::open(dir.path()).await.unwrap();
        let id = Uuid::new_v4();
        store
            .write(Collection::Jobs, id, &Doc { name: "a".into() })
            .await
            .unwrap();
        let back: Option<Doc> = store.read(Collection::Jobs, id).await.unwrap();
        assert_eq!(back, Some(Doc { name: "a".into() }));
        assert_eq!(store.list_ids(Collection::Jobs).await.unwrap(), vec![id]);
    }

    #[tokio::test]
    async fn test_missing_document_is_none_and_remove_is_false() {
        let dir = tempfile::tempdir().unwrap();
        let store = DocumentStore::open(dir.path()).await.unwrap();
        let id = Uuid::new_v4();
        let missing: Option<Doc> = store.read(Collection::Manifests, id).await.unwrap();
        assert!(missing.is_none());
        assert!(!store.remove(Collection::Manifests, id).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_ignores_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = DocumentStore::open(dir.path()).await.unwrap();
        std::fs::write(dir.path().join("jobs").join("notes.txt"), b"x").unwrap();
        std::fs::write(dir.path().join("jobs").join("bad.json"), b"{}").unwrap();
        assert!(store.list_ids(Collection::Jobs).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_write_atomic_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("file.bin");
        write_atomic(&path, b"first".to_vec()).await.unwrap();
        write_atomic(&path, b"second".to_vec()).await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"second");
        // Only the target file remains; the temp file was renamed away.
        assert_eq!(std::fs::read_dir(path.parent().unwrap()).unwrap().count(), 1);
    }
}
