use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::sync::RwLock;

use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::StoreConfig;
use crate::errors::AppError;
use crate::models::job::{JobRecord, ListFilter};
use crate::models::resume::ResumeManifestEntry;
use crate::store::fs::{write_atomic, Collection, DocumentStore};
use crate::store::locks::LockTable;

/// A persisted, revisioned document.
pub trait Document: Serialize + DeserializeOwned + Clone + Send + Sync {
    const COLLECTION: Collection;
    const KIND: &'static str;

    fn id(&self) -> Uuid;
    fn revision(&self) -> u64;
    fn set_revision(&mut self, revision: u64);

    /// Derived-field maintenance run on every commit.
    fn before_commit(&mut self) {}

    /// Moves the repository's secondary index entry from `old` to `new`.
    fn reindex(repo: &Repository, old: Option<&Self>, new: Option<&Self>);
}

impl Document for JobRecord {
    const COLLECTION: Collection = Collection::Jobs;
    const KIND: &'static str = "Job";

    fn id(&self) -> Uuid {
        self.uuid
    }
    fn revision(&self) -> u64 {
        self.revision
    }
    fn set_revision(&mut self, revision: u64) {
        self.revision = revision;
    }
    fn before_commit(&mut self) {
        self.refresh_hash();
    }
    fn reindex(repo: &Repository, old: Option<&Self>, new: Option<&Self>) {
        repo.reindex_job(old, new);
    }
}

impl Document for ResumeManifestEntry {
    const COLLECTION: Collection = Collection::Manifests;
    const KIND: &'static str = "Resume manifest";

    fn id(&self) -> Uuid {
        self.id
    }
    fn revision(&self) -> u64 {
        self.revision
    }
    fn set_revision(&mut self, revision: u64) {
        self.revision = revision;
    }
    fn reindex(repo: &Repository, old: Option<&Self>, new: Option<&Self>) {
        repo.reindex_manifest(old, new);
    }
}

/// Canonical owner of job records and resume manifests.
///
/// Single-record writes are atomic file replacements guarded by a per-id
/// write lock; secondary indexes change under the same lock. `update` is optimistic: it mutates a copy outside the lock and
/// commits only if the stored revision is unchanged, retrying a bounded
/// number of times.
pub struct Repository {
    docs: DocumentStore,
    locks: LockTable,
    hash_index: RwLock<HashMap<String, BTreeSet<Uuid>>>,
    manifest_index: RwLock<HashMap<Uuid, Vec<Uuid>>>,
    conflict_retries: u32,
}

impl Repository {
    pub async fn open(root: impl AsRef<Path>, config: &StoreConfig) -> Result<Self, AppError> {
        let docs = DocumentStore::open(root).await?;
        let repo = Self {
            docs,
            locks: LockTable::new(),
            hash_index: RwLock::new(HashMap::new()),
            manifest_index: RwLock::new(HashMap::new()),
            conflict_retries: config.conflict_retries.max(1),
        };
        repo.rebuild_indexes().await?;
        Ok(repo)
    }

    async fn rebuild_indexes(&self) -> Result<(), AppError> {
        let mut jobs = 0usize;
        for id in self.docs.list_ids(Collection::Jobs).await? {
            if let Some(job) = self.docs.read::<JobRecord>(Collection::Jobs, id).await? {
                self.reindex_job(None, Some(&job));
                jobs += 1;
            }
        }
        let mut manifests = 0usize;
        for id in self.docs.list_ids(Collection::Manifests).await? {
            if let Some(m) = self
                .docs
                .read::<ResumeManifestEntry>(Collection::Manifests, id)
                .await?
            {
                self.reindex_manifest(None, Some(&m));
                manifests += 1;
            }
        }
        info!("Repository indexes rebuilt: {jobs} jobs, {manifests} manifests");
        Ok(())
    }

    // ── Generic document path ──────────────────────────────────────────────

    async fn load<T: Document>(&self, id: Uuid) -> Result<Option<T>, AppError> {
        let _guard = self.locks.read(id).await;
        self.docs.read(T::COLLECTION, id).await
    }

    async fn fetch<T: Document>(&self, id: Uuid) -> Result<T, AppError> {
        self.load(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("{} {id} not found", T::KIND)))
    }

    async fn insert<T: Document>(&self, mut doc: T) -> Result<T, AppError> {
        let id = doc.id();
        let _guard = self.locks.write(id).await;
        if self.docs.read::<T>(T::COLLECTION, id).await?.is_some() {
            return Err(AppError::Conflict(format!("{} {id} already exists", T::KIND)));
        }
        doc.before_commit();
        doc.set_revision(1);
        self.docs.write(T::COLLECTION, id, &doc).await?;
        T::reindex(self, None, Some(&doc));
        Ok(doc)
    }

    /// Commits `doc` only if the stored revision still equals `doc.revision()`.
    async fn compare_and_put<T: Document>(&self, mut doc: T) -> Result<T, AppError> {
        let id = doc.id();
        let _guard = self.locks.write(id).await;
        let current: T = self
            .docs
            .read(T::COLLECTION, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("{} {id} not found", T::KIND)))?;
        if current.revision() != doc.revision() {
            return Err(AppError::Conflict(format!(
                "{} {id} changed concurrently (expected revision {}, found {})",
                T::KIND,
                doc.revision(),
                current.revision()
            )));
        }
        doc.before_commit();
        doc.set_revision(current.revision() + 1);
        self.docs.write(T::COLLECTION, id, &doc).await?;
        T::reindex(self, Some(&current), Some(&doc));
        Ok(doc)
    }

    async fn modify<T, F>(&self, id: Uuid, mutation: F) -> Result<T, AppError>
    where
        T: Document,
        F: Fn(&mut T) -> Result<(), AppError>,
    {
        let mut last_conflict = None;
        for attempt in 1..=self.conflict_retries {
            let base: T = self.fetch(id).await?;
            let mut next = base.clone();
            mutation(&mut next)?;
            if next.id() != id {
                return Err(AppError::Validation(format!(
                    "{} identity is immutable",
                    T::KIND
                )));
            }
            next.set_revision(base.revision());
            match self.compare_and_put(next).await {
                Ok(committed) => return Ok(committed),
                Err(AppError::Conflict(msg)) => {
                    debug!("Update conflict on {} {id} (attempt {attempt}): {msg}", T::KIND);
                    last_conflict = Some(msg);
                }
                Err(e) => return Err(e),
            }
        }
        warn!("Giving up on {} {id} after {} conflicting attempts", T::KIND, self.conflict_retries);
        Err(AppError::Conflict(last_conflict.unwrap_or_else(|| {
            format!("{} {id} could not be updated", T::KIND)
        })))
    }

    async fn remove<T: Document>(&self, id: Uuid) -> Result<T, AppError> {
        let _guard = self.locks.write(id).await;
        let current: T = self
            .docs
            .read(T::COLLECTION, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("{} {id} not found", T::KIND)))?;
        self.docs.remove(T::COLLECTION, id).await?;
        T::reindex(self, Some(&current), None);
        Ok(current)
    }

    // ── Job records ────────────────────────────────────────────────────────

    pub async fn create(&self, record: JobRecord) -> Result<Uuid, AppError> {
        if record.text.trim().is_empty() {
            return Err(AppError::Validation("Job text must not be empty".to_string()));
        }
        let stored = self.insert(record).await?;
        info!("Created job {} ({})", stored.uuid, stored.label());
        Ok(stored.uuid)
    }

    pub async fn get(&self, uuid: Uuid) -> Result<JobRecord, AppError> {
        self.fetch(uuid).await
    }

    /// Applies `mutation` to the record; `content_hash` is recomputed on commit.
    pub async fn update<F>(&self, uuid: Uuid, mutation: F) -> Result<JobRecord, AppError>
    where
        F: Fn(&mut JobRecord) -> Result<(), AppError>,
    {
        let new = self.modify::<JobRecord, _>(uuid, mutation).await?;
        debug!("Updated job {uuid} to revision {}", new.revision);
        Ok(new)
    }

    pub async fn delete(&self, uuid: Uuid) -> Result<(), AppError> {
        let removed: JobRecord = self.remove(uuid).await?;
        if removed.source_html_path.is_some() {
            let sidecar = self.docs.sidecar_path(Collection::Jobs, uuid, "html");
            if let Err(e) = tokio::fs::remove_file(&sidecar).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Could not remove source HTML for {uuid}: {e}");
                }
            }
        }
        info!("Deleted job {uuid}");
        Ok(())
    }

    /// Lazy, restartable cursor over records present when the call is made.
    /// A content-hash filter is answered from the hash index.
    pub async fn list(&self, filter: ListFilter) -> Result<JobCursor<'_>, AppError> {
        let ids = match &filter.content_hash {
            Some(hash) => self.find_by_content_hash(hash),
            None => self.docs.list_ids(Collection::Jobs).await?,
        };
        Ok(JobCursor {
            repo: self,
            ids,
            pos: 0,
            yielded: 0,
            filter,
        })
    }

    /// Matching records, newest capture first, truncated to the filter's limit.
    pub async fn list_recent(&self, filter: ListFilter) -> Result<Vec<JobRecord>, AppError> {
        let limit = filter.limit;
        let mut cursor = self
            .list(ListFilter {
                limit: None,
                ..filter
            })
            .await?;
        let mut jobs = cursor.collect_all().await?;
        jobs.sort_by(|a, b| b.effective_timestamp().cmp(&a.effective_timestamp()));
        if let Some(limit) = limit {
            jobs.truncate(limit);
        }
        Ok(jobs)
    }

    pub fn find_by_content_hash(&self, hash: &str) -> Vec<Uuid> {
        let index = self.hash_index.read().unwrap_or_else(|e| e.into_inner());
        index
            .get(hash)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Writes captured page HTML next to the record and returns its path.
    pub async fn store_source_html(&self, uuid: Uuid, html: &str) -> Result<String, AppError> {
        let path = self.docs.sidecar_path(Collection::Jobs, uuid, "html");
        write_atomic(&path, html.as_bytes().to_vec()).await?;
        Ok(path.to_string_lossy().into_owned())
    }

    /// Locks every listed record, applies `mutation` to all of them, and
    /// commits all or nothing. If a write fails midway the records already
    /// written are restored from their pre-images.
    pub async fn apply_batch<F>(&self, ids: &[Uuid], mutation: F) -> Result<Vec<JobRecord>, AppError>
    where
        F: FnOnce(&mut BTreeMap<Uuid, JobRecord>) -> Result<(), AppError>,
    {
        let _guards = self.locks.write_many(ids.iter().copied()).await;

        let mut before = BTreeMap::new();
        for &id in ids {
            let job: JobRecord = self
                .docs
                .read(Collection::Jobs, id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Job {id} not found")))?;
            before.insert(id, job);
        }

        let mut after = before.clone();
        mutation(&mut after)?;
        if after.keys().ne(before.keys()) || after.iter().any(|(id, j)| j.uuid != *id) {
            return Err(AppError::Validation(
                "Batch mutation may not add, remove or re-key records".to_string(),
            ));
        }

        let mut written: Vec<Uuid> = Vec::new();
        for (id, job) in after.iter_mut() {
            job.before_commit();
            job.set_revision(before[id].revision + 1);
            if let Err(e) = self.docs.write(Collection::Jobs, *id, job).await {
                warn!("Batch write failed on job {id}; restoring {} records", written.len());
                for done in &written {
                    if let Err(restore_err) =
                        self.docs.write(Collection::Jobs, *done, &before[done]).await
                    {
                        warn!("Failed to restore job {done}: {restore_err}");
                    }
                }
                return Err(e);
            }
            written.push(*id);
        }

        for (id, job) in &after {
            self.reindex_job(before.get(id), Some(job));
        }
        Ok(after.into_values().collect())
    }

    fn reindex_job(&self, old: Option<&JobRecord>, new: Option<&JobRecord>) {
        let mut index = self.hash_index.write().unwrap_or_else(|e| e.into_inner());
        if let Some(old) = old {
            if let Some(set) = index.get_mut(&old.content_hash) {
                set.remove(&old.uuid);
                if set.is_empty() {
                    index.remove(&old.content_hash);
                }
            }
        }
        if let Some(new) = new {
            index
                .entry(new.content_hash.clone())
                .or_default()
                .insert(new.uuid);
        }
    }

    // ── Resume manifests ──────────────────────────────────────────────────

    pub async fn get_manifest(&self, id: Uuid) -> Result<ResumeManifestEntry, AppError> {
        self.fetch(id).await
    }

    pub fn manifest_ids_for_job(&self, job_uuid: Uuid) -> Vec<Uuid> {
        let index = self.manifest_index.read().unwrap_or_else(|e| e.into_inner());
        index.get(&job_uuid).cloned().unwrap_or_default()
    }

    pub async fn manifests_for_job(
        &self,
        job_uuid: Uuid,
    ) -> Result<Vec<ResumeManifestEntry>, AppError> {
        let mut out = Vec::new();
        for id in self.manifest_ids_for_job(job_uuid) {
            if let Some(m) = self.load::<ResumeManifestEntry>(id).await? {
                out.push(m);
            }
        }
        Ok(out)
    }

    pub async fn create_manifest(
        &self,
        manifest: ResumeManifestEntry,
    ) -> Result<ResumeManifestEntry, AppError> {
        self.insert(manifest).await
    }

    /// Compare-and-swap write: fails with `Conflict` if the manifest changed
    /// since `manifest` was read. Never retried, since the caller may have
    /// stored a file based on the old state.
    pub async fn put_manifest(
        &self,
        manifest: ResumeManifestEntry,
    ) -> Result<ResumeManifestEntry, AppError> {
        self.compare_and_put(manifest).await
    }

    pub async fn update_manifest<F>(
        &self,
        id: Uuid,
        mutation: F,
    ) -> Result<ResumeManifestEntry, AppError>
    where
        F: Fn(&mut ResumeManifestEntry) -> Result<(), AppError>,
    {
        self.modify(id, mutation).await
    }

    pub async fn delete_manifest(&self, id: Uuid) -> Result<ResumeManifestEntry, AppError> {
        self.remove(id).await
    }

    fn reindex_manifest(
        &self,
        old: Option<&ResumeManifestEntry>,
        new: Option<&ResumeManifestEntry>,
    ) {
        let mut index = self.manifest_index.write().unwrap_or_else(|e| e.into_inner());
        if let Some(old) = old {
            if let Some(ids) = index.get_mut(&old.job_uuid) {
                ids.retain(|id| *id != old.id);
                if ids.is_empty() {
                    index.remove(&old.job_uuid);
                }
            }
        }
        if let Some(new) = new {
            let ids = index.entry(new.job_uuid).or_default();
            if !ids.contains(&new.id) {
                ids.push(new.id);
            }
        }
    }
}

/// Finite, restartable cursor produced by [`Repository::list`].
///
/// Records deleted after the listing started are skipped; records created
/// afterwards are not visited.
pub struct JobCursor<'a> {
    repo: &'a Repository,
    ids: Vec<Uuid>,
    pos: usize,
    yielded: usize,
    filter: ListFilter,
}

impl<'a> JobCursor<'a> {
    pub async fn next(&mut self) -> Result<Option<JobRecord>, AppError> {
        if self.filter.limit.is_some_and(|l| self.yielded >= l) {
            return Ok(None);
        }
        while self.pos < self.ids.len() {
            let id = self.ids[self.pos];
            self.pos += 1;
            let Some(job) = self.repo.load::<JobRecord>(id).await? else {
                continue;
            };
            if self.filter.matches(&job) {
                self.yielded += 1;
                return Ok(Some(job));
            }
        }
        Ok(None)
    }

    /// Starts over from the first record of the original snapshot.
    pub fn rewind(&mut self) {
        self.pos = 0;
        self.yielded = 0;
    }

    pub async fn collect_all(&mut self) -> Result<Vec<JobRecord>, AppError> {
        let mut out = Vec::new();
        while let Some(job) = self.next().await? {
            out.push(job);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::content_hash;
    use crate::models::job::{ApplicationStatus, CaptureMethod};
    use std::sync::Arc;

    async fn open_repo(dir: &tempfile::TempDir) -> Repository {
        Repository::open(dir.path(), &StoreConfig::default())
            .await
            .unwrap()
    }

    fn job(text: &str) -> JobRecord {
        JobRecord::new(text, CaptureMethod::Manual)
            .with_company_role(Some("Acme".into()), Some("SWE".into()))
    }

    #[tokio::test]
    async fn test_create_get_delete() {
        let dir = tempfile::tempdir().unwrap();
        let repo = open_repo(&dir).await;
        let uuid = repo.create(job("Build things")).await.unwrap();

        let stored = repo.get(uuid).await.unwrap();
        assert_eq!(stored.revision, 1);
        assert_eq!(stored.company.as_deref(), Some("Acme"));

        repo.delete(uuid).await.unwrap();
        assert!(matches!(repo.get(uuid).await, Err(AppError::NotFound(_))));
        assert!(matches!(repo.delete(uuid).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_create_rejects_blank_text() {
        let dir = tempfile::tempdir().unwrap();
        let repo = open_repo(&dir).await;
        assert!(matches!(
            repo.create(job("   \n")).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_update_recomputes_hash_and_reindexes() {
        let dir = tempfile::tempdir().unwrap();
        let repo = open_repo(&dir).await;
        let uuid = repo.create(job("original text")).await.unwrap();

        let updated = repo
            .update(uuid, |j| {
                j.text = "Rewritten   TEXT".to_string();
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(updated.content_hash, content_hash("rewritten text"));
        assert_eq!(updated.revision, 2);
        assert!(repo.find_by_content_hash(&content_hash("original text")).is_empty());
        assert_eq!(
            repo.find_by_content_hash(&content_hash("rewritten text")),
            vec![uuid]
        );
    }

    #[tokio::test]
    async fn test_update_cannot_change_identity() {
        let dir = tempfile::tempdir().unwrap();
        let repo = open_repo(&dir).await;
        let uuid = repo.create(job("text")).await.unwrap();
        let result = repo
            .update(uuid, |j| {
                j.uuid = Uuid::new_v4();
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_concurrent_updates_to_same_record_all_apply() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Arc::new(
            Repository::open(
                dir.path(),
                &StoreConfig {
                    conflict_retries: 50,
                    ..Default::default()
                },
            )
            .await
            .unwrap(),
        );
        let uuid = repo.create(job("counter")).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..8 {
            let repo = repo.clone();
            handles.push(tokio::spawn(async move {
                repo.update(uuid, move |j| {
                    j.merged_from.insert(Uuid::from_u128(i + 1));
                    Ok(())
                })
                .await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }

        let stored = repo.get(uuid).await.unwrap();
        assert_eq!(stored.merged_from.len(), 8);
        assert_eq!(stored.revision, 9);
    }

    #[tokio::test]
    async fn test_list_is_lazy_filtered_and_restartable() {
        let dir = tempfile::tempdir().unwrap();
        let repo = open_repo(&dir).await;
        let a = repo.create(job("a")).await.unwrap();
        let b = repo.create(job("b")).await.unwrap();
        repo.update(b, |j| {
            j.archived = true;
            Ok(())
        })
        .await
        .unwrap();

        let mut cursor = repo.list(ListFilter::default()).await.unwrap();
        let first = cursor.collect_all().await.unwrap();
        assert_eq!(first.iter().map(|j| j.uuid).collect::<Vec<_>>(), vec![a]);

        cursor.rewind();
        let again = cursor.collect_all().await.unwrap();
        assert_eq!(again.len(), 1);

        // Archived records stay retrievable by uuid.
        assert!(repo.get(b).await.unwrap().archived);
    }

    #[tokio::test]
    async fn test_list_filters_by_status_and_limit() {
        let dir = tempfile::tempdir().unwrap();
        let repo = open_repo(&dir).await;
        for text in ["one", "two", "three"] {
            let id = repo.create(job(text)).await.unwrap();
            repo.update(id, |j| {
                j.application_status = ApplicationStatus::Applied;
                Ok(())
            })
            .await
            .unwrap();
        }
        repo.create(job("four")).await.unwrap();

        let applied = repo
            .list_recent(ListFilter {
                status: Some(ApplicationStatus::Applied),
                limit: Some(2),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(applied.len(), 2);
        assert!(applied
            .iter()
            .all(|j| j.application_status == ApplicationStatus::Applied));
    }

    #[tokio::test]
    async fn test_list_by_content_hash_uses_index() {
        let dir = tempfile::tempdir().unwrap();
        let repo = open_repo(&dir).await;
        let a = repo.create(job("Build the thing")).await.unwrap();
        let b = repo.create(job("build   THE thing")).await.unwrap();
        repo.create(job("something else")).await.unwrap();
        repo.update(b, |j| {
            j.archived = true;
            Ok(())
        })
        .await
        .unwrap();

        let filter = ListFilter {
            content_hash: Some(content_hash("BUILD the thing")),
            ..Default::default()
        };
        let live = repo.list_recent(filter.clone()).await.unwrap();
        assert_eq!(live.iter().map(|j| j.uuid).collect::<Vec<_>>(), vec![a]);

        let all = repo
            .list_recent(ListFilter {
                include_archived: true,
                ..filter
            })
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_hash_index_tracks_concurrent_text_rewrites() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Arc::new(
            Repository::open(
                dir.path(),
                &StoreConfig {
                    conflict_retries: 200,
                    ..Default::default()
                },
            )
            .await
            .unwrap(),
        );
        let uuid = repo.create(job("draft 0")).await.unwrap();

        let mut handles = Vec::new();
        for i in 1..=16 {
            let repo = repo.clone();
            handles.push(tokio::spawn(async move {
                repo.update(uuid, move |j| {
                    j.text = format!("draft {i}");
                    Ok(())
                })
                .await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }

        let stored = repo.get(uuid).await.unwrap();
        assert_eq!(repo.find_by_content_hash(&stored.content_hash), vec![uuid]);
        for i in 0..=16 {
            let hash = content_hash(&format!("draft {i}"));
            if hash != stored.content_hash {
                assert!(repo.find_by_content_hash(&hash).is_empty(), "stale entry for draft {i}");
            }
        }
    }

    #[tokio::test]
    async fn test_indexes_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let uuid = {
            let repo = open_repo(&dir).await;
            let uuid = repo.create(job("persisted")).await.unwrap();
            let manifest = ResumeManifestEntry::new(
                uuid,
                "Acme_SWE".into(),
                crate::models::resume::FilenameComponents {
                    company: "Acme".into(),
                    role: "SWE".into(),
                    date: "2024-01-01".into(),
                },
            );
            repo.create_manifest(manifest).await.unwrap();
            uuid
        };

        let reopened = open_repo(&dir).await;
        assert_eq!(
            reopened.find_by_content_hash(&content_hash("persisted")),
            vec![uuid]
        );
        assert_eq!(reopened.manifest_ids_for_job(uuid).len(), 1);
    }

    #[tokio::test]
    async fn test_put_manifest_detects_stale_revision() {
        let dir = tempfile::tempdir().unwrap();
        let repo = open_repo(&dir).await;
        let manifest = repo
            .create_manifest(ResumeManifestEntry::new(
                Uuid::new_v4(),
                "X".into(),
                crate::models::resume::FilenameComponents {
                    company: "X".into(),
                    role: "Y".into(),
                    date: "2024-01-01".into(),
                },
            ))
            .await
            .unwrap();

        let stale = manifest.clone();
        let mut fresh = manifest;
        fresh.keep_original = false;
        repo.put_manifest(fresh).await.unwrap();

        assert!(matches!(
            repo.put_manifest(stale).await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_apply_batch_is_all_or_nothing_on_mutation_error() {
        let dir = tempfile::tempdir().unwrap();
        let repo = open_repo(&dir).await;
        let a = repo.create(job("a")).await.unwrap();
        let b = repo.create(job("b")).await.unwrap();

        let result = repo
            .apply_batch(&[a, b], |jobs| {
                for j in jobs.values_mut() {
                    j.archived = true;
                }
                Err(AppError::Validation("abort".into()))
            })
            .await;
        assert!(result.is_err());
        assert!(!repo.get(a).await.unwrap().archived);
        assert!(!repo.get(b).await.unwrap().archived);
    }

    #[tokio::test]
    async fn test_apply_batch_missing_record_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let repo = open_repo(&dir).await;
        let a = repo.create(job("a")).await.unwrap();
        let result = repo.apply_batch(&[a, Uuid::new_v4()], |_| Ok(())).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_source_html_sidecar_removed_with_record() {
        let dir = tempfile::tempdir().unwrap();
        let repo = open_repo(&dir).await;
        let mut record = job("with html");
        let path = repo
            .store_source_html(record.uuid, "<html></html>")
            .await
            .unwrap();
        record.source_html_path = Some(path.clone());
        let uuid = repo.create(record).await.unwrap();
        assert!(Path::new(&path).exists());

        repo.delete(uuid).await.unwrap();
        assert!(!Path::new(&path).exists());
    }
}
