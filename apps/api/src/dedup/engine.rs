use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::DedupConfig;
use crate::dedup::grouping::components;
use crate::dedup::scoring::{Fingerprint, SimilarityScorer};
use crate::errors::AppError;
use crate::models::job::{JobRecord, ListFilter, MergeAction, MergeEvent};
use crate::store::Repository;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GroupMember {
    pub uuid: Uuid,
    /// Direct score against the group's primary; may be below the scan
    /// threshold for members that joined transitively.
    pub similarity_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateGroup {
    pub id: Uuid,
    pub primary_uuid: Uuid,
    pub members: Vec<GroupMember>,
    pub max_similarity: f64,
    pub created_at: DateTime<Utc>,
}

impl DuplicateGroup {
    pub fn all_uuids(&self) -> Vec<Uuid> {
        std::iter::once(self.primary_uuid)
            .chain(self.members.iter().map(|m| m.uuid))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeduplicationResult {
    pub duplicate_groups: Vec<DuplicateGroup>,
    pub total_duplicates_found: usize,
    pub threshold_used: f64,
    pub processed_at: DateTime<Utc>,
    pub scorer_backend: String,
}

/// Groups every non-archived candidate whose pairwise score reaches
/// `threshold`, transitively. Pair scoring runs in parallel on rayon.
pub fn find_duplicate_groups(
    candidates: &[JobRecord],
    threshold: f64,
    scorer: &dyn SimilarityScorer,
) -> Vec<DuplicateGroup> {
    let active: Vec<&JobRecord> = candidates.iter().filter(|j| !j.archived).collect();
    let fingerprints: Vec<Fingerprint> = active.par_iter().map(|j| Fingerprint::of(j)).collect();
    let n = fingerprints.len();

    let edges: Vec<(usize, usize, f64)> = (0..n)
        .into_par_iter()
        .flat_map_iter(|i| {
            let fps = &fingerprints;
            (i + 1..n).filter_map(move |j| {
                let s = scorer.score(&fps[i], &fps[j]);
                (s >= threshold).then_some((i, j, s))
            })
        })
        .collect();

    let now = Utc::now();
    let mut groups: Vec<DuplicateGroup> = components(n, edges.iter().map(|&(a, b, _)| (a, b)))
        .into_iter()
        .filter_map(|component| {
            let primary_idx = *component
                .iter()
                .min_by_key(|&&i| (active[i].effective_timestamp(), active[i].uuid))?;

            let in_group: BTreeSet<usize> = component.iter().copied().collect();
            let max_similarity = edges
                .iter()
                .filter(|(a, b, _)| in_group.contains(a) && in_group.contains(b))
                .map(|&(_, _, s)| s)
                .fold(0.0_f64, f64::max);

            let mut members: Vec<GroupMember> = component
                .iter()
                .filter(|&&i| i != primary_idx)
                .map(|&i| GroupMember {
                    uuid: active[i].uuid,
                    similarity_score: scorer.score(&fingerprints[primary_idx], &fingerprints[i]),
                })
                .collect();
            members.sort_by(|a, b| {
                b.similarity_score
                    .total_cmp(&a.similarity_score)
                    .then(a.uuid.cmp(&b.uuid))
            });

            Some(DuplicateGroup {
                id: Uuid::new_v4(),
                primary_uuid: active[primary_idx].uuid,
                members,
                max_similarity,
                created_at: now,
            })
        })
        .collect();

    groups.sort_by(|a, b| {
        b.max_similarity
            .total_cmp(&a.max_similarity)
            .then(a.primary_uuid.cmp(&b.primary_uuid))
    });
    groups
}

fn missing_from_batch(id: Uuid) -> AppError {
    AppError::Internal(anyhow::anyhow!("job {id} missing from merge batch"))
}

/// Runs scans over repository snapshots and keeps the latest groups so a
/// caller can merge one of them by id.
pub struct DuplicateEngine {
    repo: Arc<Repository>,
    scorer: Arc<dyn SimilarityScorer>,
    config: DedupConfig,
    last_scan: Mutex<HashMap<Uuid, DuplicateGroup>>,
}

impl DuplicateEngine {
    pub fn new(repo: Arc<Repository>, scorer: Arc<dyn SimilarityScorer>, config: DedupConfig) -> Self {
        Self {
            repo,
            scorer,
            config,
            last_scan: Mutex::new(HashMap::new()),
        }
    }

    /// Scans all non-archived records. Reflects state at scan start, not a
    /// live view.
    pub async fn scan_all(&self, threshold: Option<f64>) -> Result<DeduplicationResult, AppError> {
        let threshold = threshold.unwrap_or(self.config.similarity_threshold);
        if !(0.0..=1.0).contains(&threshold) {
            return Err(AppError::Validation(format!(
                "Threshold must be within [0, 1], got {threshold}"
            )));
        }

        let snapshot = self.repo.list(ListFilter::default()).await?.collect_all().await?;
        let scanned = snapshot.len();
        let scorer = self.scorer.clone();
        let groups = tokio::task::spawn_blocking(move || {
            find_duplicate_groups(&snapshot, threshold, scorer.as_ref())
        })
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("duplicate scan task failed: {e}")))?;

        let total_duplicates_found = groups.iter().map(|g| g.members.len()).sum();
        {
            let mut cache = self.last_scan.lock().unwrap_or_else(|e| e.into_inner());
            *cache = groups.iter().map(|g| (g.id, g.clone())).collect();
        }
        info!(
            "Duplicate scan over {scanned} records at threshold {threshold}: {} groups, {total_duplicates_found} duplicates",
            groups.len()
        );

        Ok(DeduplicationResult {
            duplicate_groups: groups,
            total_duplicates_found,
            threshold_used: threshold,
            processed_at: Utc::now(),
            scorer_backend: self.scorer.backend().to_string(),
        })
    }

    pub fn cached_group(&self, group_id: Uuid) -> Option<DuplicateGroup> {
        let cache = self.last_scan.lock().unwrap_or_else(|e| e.into_inner());
        cache.get(&group_id).cloned()
    }

    /// Folds every other member of the group into `surviving_uuid`: lineage
    /// is unioned, one `merge` event is appended to the survivor, the rest
    /// are archived. All records change together or none do.
    pub async fn merge(
        &self,
        group_id: Uuid,
        surviving_uuid: Uuid,
        actor_note: Option<String>,
    ) -> Result<JobRecord, AppError> {
        let group = self
            .cached_group(group_id)
            .ok_or_else(|| AppError::NotFound(format!("Duplicate group {group_id} not found; rescan first")))?;
        let ids = group.all_uuids();
        if !ids.contains(&surviving_uuid) {
            return Err(AppError::Validation(format!(
                "Record {surviving_uuid} is not a member of group {group_id}"
            )));
        }

        let now = Utc::now();
        let merged = self
            .repo
            .apply_batch(&ids, |jobs| {
                if let Some(archived) = jobs.values().find(|j| j.archived) {
                    return Err(AppError::Conflict(format!(
                        "Record {} was archived after the scan; rescan before merging",
                        archived.uuid
                    )));
                }

                let absorbed: BTreeSet<Uuid> =
                    ids.iter().copied().filter(|id| *id != surviving_uuid).collect();
                let mut lineage = absorbed.clone();
                for id in &absorbed {
                    let job = jobs.get_mut(id).ok_or_else(|| missing_from_batch(*id))?;
                    lineage.extend(job.merged_from.iter().copied());
                    job.archived = true;
                    job.archived_at = Some(now);
                    job.merge_history.push(MergeEvent {
                        timestamp: now,
                        action: MergeAction::Archive,
                        source_uuids: BTreeSet::from([surviving_uuid]),
                        actor_note: Some(format!("merged into {surviving_uuid}")),
                    });
                }

                let survivor = jobs
                    .get_mut(&surviving_uuid)
                    .ok_or_else(|| missing_from_batch(surviving_uuid))?;
                survivor.merged_from.extend(lineage);
                survivor.merge_history.push(MergeEvent {
                    timestamp: now,
                    action: MergeAction::Merge,
                    source_uuids: absorbed,
                    actor_note: actor_note.clone(),
                });
                survivor.last_updated = Some(now);
                Ok(())
            })
            .await?;

        {
            let mut cache = self.last_scan.lock().unwrap_or_else(|e| e.into_inner());
            cache.remove(&group_id);
        }
        info!(
            "Merged group {group_id}: {} records folded into {surviving_uuid}",
            ids.len() - 1
        );

        merged
            .into_iter()
            .find(|j| j.uuid == surviving_uuid)
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("survivor missing from batch result")))
    }

    /// Merges every cached group whose `max_similarity` reaches the
    /// auto-merge threshold, keeping each group's primary.
    pub async fn auto_merge(&self) -> Result<Vec<JobRecord>, AppError> {
        let candidates: Vec<DuplicateGroup> = {
            let cache = self.last_scan.lock().unwrap_or_else(|e| e.into_inner());
            cache
                .values()
                .filter(|g| g.max_similarity >= self.config.auto_merge_threshold)
                .cloned()
                .collect()
        };

        let mut survivors = Vec::with_capacity(candidates.len());
        for group in candidates {
            match self
                .merge(group.id, group.primary_uuid, Some("auto-merge".to_string()))
                .await
            {
                Ok(job) => survivors.push(job),
                Err(e) => warn!("Auto-merge skipped group {}: {e}", group.id),
            }
        }
        Ok(survivors)
    }

    /// Rescans on a fixed interval until the task is aborted.
    pub fn spawn_scheduled(self: Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        info!("Scheduled duplicate scans every {interval:?}");
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = self.scan_all(None).await {
                    warn!("Scheduled duplicate scan failed: {e}");
                }
            }
        })
    }
}
