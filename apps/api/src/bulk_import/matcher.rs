use std::collections::BTreeSet;

use uuid::Uuid;

use crate::hashing::{jaccard, tokenize};
use crate::models::job::JobRecord;

/// Filename words that say nothing about the job.
const NOISE_TOKENS: &[&str] = &["resume", "cv", "final", "draft", "copy", "updated", "new"];

#[derive(Debug, Clone)]
pub struct JobCandidate {
    pub uuid: Uuid,
    pub tokens: BTreeSet<String>,
}

impl JobCandidate {
    /// `None` for records with neither company nor role.
    pub fn of(job: &JobRecord) -> Option<Self> {
        let label = format!(
            "{} {}",
            job.company.as_deref().unwrap_or_default(),
            job.role.as_deref().unwrap_or_default()
        );
        let tokens = tokenize(&label);
        (!tokens.is_empty()).then_some(Self {
            uuid: job.uuid,
            tokens,
        })
    }
}

/// Tokens of a file's stem with extension and noise words removed.
pub fn filename_tokens(filename: &str) -> BTreeSet<String> {
    let stem = filename
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .filter(|s| !s.is_empty())
        .unwrap_or(filename);
    tokenize(stem)
        .into_iter()
        .filter(|t| !NOISE_TOKENS.contains(&t.as_str()))
        .collect()
}

/// Best-scoring candidate at or above `threshold`. Ties go to the first
/// candidate in the given order.
pub fn best_match(
    filename: &str,
    candidates: &[JobCandidate],
    threshold: f64,
) -> Option<(Uuid, f64)> {
    let tokens = filename_tokens(filename);
    if tokens.is_empty() {
        return None;
    }
    let mut best: Option<(Uuid, f64)> = None;
    for c in candidates {
        let score = jaccard(&tokens, &c.tokens);
        if score >= threshold && best.map_or(true, |(_, s)| score > s) {
            best = Some((c.uuid, score));
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::job::CaptureMethod;

    fn candidate(company: &str, role: &str) -> JobCandidate {
        let job = JobRecord::new("text", CaptureMethod::Manual)
            .with_company_role(Some(company.into()), Some(role.into()));
        JobCandidate::of(&job).unwrap()
    }

    #[test]
    fn test_filename_tokens_strip_extension_and_noise() {
        let tokens = filename_tokens("Acme_SWE_Resume_final.pdf");
        assert_eq!(
            tokens.into_iter().collect::<Vec<_>>(),
            vec!["acme".to_string(), "swe".to_string()]
        );
    }

    #[test]
    fn test_exact_company_role_filename_matches() {
        let acme = candidate("Acme", "SWE");
        let other = candidate("Globex", "Data Scientist");
        let got = best_match("Acme_SWE.pdf", &[other, acme.clone()], 0.5);
        assert_eq!(got, Some((acme.uuid, 1.0)));
    }

    #[test]
    fn test_unrelated_filename_has_no_match() {
        let acme = candidate("Acme", "SWE");
        assert_eq!(best_match("random.pdf", &[acme], 0.5), None);
    }

    #[test]
    fn test_prefers_higher_overlap() {
        let broad = candidate("Acme", "Engineer");
        let exact = candidate("Acme", "Platform Engineer");
        let got = best_match("acme-platform-engineer.docx", &[broad, exact.clone()], 0.5);
        assert_eq!(got.map(|(id, _)| id), Some(exact.uuid));
    }

    #[test]
    fn test_job_without_labels_is_not_a_candidate() {
        let job = JobRecord::new("text", CaptureMethod::Manual);
        assert!(JobCandidate::of(&job).is_none());
    }
}
