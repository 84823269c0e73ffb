//! Similarity Scoring: pluggable scorer comparing two job records.
//!
//! Default: `WeightedJaccardScorer` (content-hash short-circuit, token-set
//! Jaccard of the description, exact company/role bonuses).
//!
//! `DuplicateEngine` holds an `Arc<dyn SimilarityScorer>`, so tests and
//! future backends can swap the scoring without touching grouping or merge.

use std::collections::BTreeSet;

use uuid::Uuid;

use crate::config::DedupConfig;
use crate::hashing::{jaccard, normalize, tokenize};
use crate::models::job::JobRecord;

/// Pre-computed comparison inputs for one record.
#[derive(Debug, Clone)]
pub struct Fingerprint {
    pub uuid: Uuid,
    pub content_hash: String,
    pub tokens: BTreeSet<String>,
    pub company: Option<String>,
    pub role: Option<String>,
}

impl Fingerprint {
    pub fn of(job: &JobRecord) -> Self {
        Self {
            uuid: job.uuid,
            content_hash: job.content_hash.clone(),
            tokens: tokenize(&job.text),
            company: normalized_field(job.company.as_deref()),
            role: normalized_field(job.role.as_deref()),
        }
    }
}

fn normalized_field(value: Option<&str>) -> Option<String> {
    value.map(normalize).filter(|v| !v.is_empty())
}

/// The scorer trait. Scores are in `[0, 1]` and symmetric.
pub trait SimilarityScorer: Send + Sync {
    fn score(&self, a: &Fingerprint, b: &Fingerprint) -> f64;

    /// Label reported alongside scan results.
    fn backend(&self) -> &'static str;
}

#[derive(Debug, Clone)]
pub struct WeightedJaccardScorer {
    pub token_weight: f64,
    pub company_bonus: f64,
    pub role_bonus: f64,
}

impl WeightedJaccardScorer {
    pub fn from_config(config: &DedupConfig) -> Self {
        Self {
            token_weight: config.token_weight,
            company_bonus: config.company_bonus,
            role_bonus: config.role_bonus,
        }
    }
}

impl Default for WeightedJaccardScorer {
    fn default() -> Self {
        Self::from_config(&DedupConfig::default())
    }
}

impl SimilarityScorer for WeightedJaccardScorer {
    /// 1.0 on equal content hash; otherwise
    /// `token_weight * jaccard + company_bonus? + role_bonus?`, capped at 1.0.
    fn score(&self, a: &Fingerprint, b: &Fingerprint) -> f64 {
        if a.content_hash == b.content_hash {
            return 1.0;
        }
        let mut score = self.token_weight * jaccard(&a.tokens, &b.tokens);
        if matches!((&a.company, &b.company), (Some(x), Some(y)) if x == y) {
            score += self.company_bonus;
        }
        if matches!((&a.role, &b.role), (Some(x), Some(y)) if x == y) {
            score += self.role_bonus;
        }
        score.clamp(0.0, 1.0)
    }

    fn backend(&self) -> &'static str {
        "weighted_jaccard"
    }
}
