use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Application configuration loaded from environment variables.
/// Every variable is optional; missing ones fall back to the defaults below.
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub port: u16,
    pub rust_log: String,
    pub dedup: DedupConfig,
    pub resume: ResumeConfig,
    pub import: ImportConfig,
    pub store: StoreConfig,
}

/// Similarity weights and thresholds for duplicate detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupConfig {
    pub similarity_threshold: f64,
    pub auto_merge_threshold: f64,
    pub token_weight: f64,
    pub company_bonus: f64,
    pub role_bonus: f64,
    /// Background rescan interval. `None` disables scheduled scans.
    pub schedule_interval: Option<Duration>,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.8,
            auto_merge_threshold: 0.95,
            token_weight: 0.7,
            company_bonus: 0.15,
            role_bonus: 0.15,
            schedule_interval: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamingFormat {
    CompanyRoleDate,
    CompanyRoleDateTime,
}

impl FromStr for NamingFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "company_role_date" => Ok(NamingFormat::CompanyRoleDate),
            "company_role_date_time" => Ok(NamingFormat::CompanyRoleDateTime),
            other => anyhow::bail!("unknown naming format '{other}'"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumeConfig {
    /// Lower-case extensions including the leading dot.
    pub supported_file_types: Vec<String>,
    pub max_file_bytes: u64,
    pub keep_original_default: bool,
    pub naming_format: NamingFormat,
}

impl Default for ResumeConfig {
    fn default() -> Self {
        Self {
            supported_file_types: [".pdf", ".doc", ".docx", ".txt", ".rtf"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_file_bytes: 10 * 1024 * 1024,
            keep_original_default: true,
            naming_format: NamingFormat::CompanyRoleDate,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportConfig {
    /// Minimum filename-vs-job token similarity for an automatic mapping.
    pub mapping_threshold: f64,
    pub execute_timeout: Duration,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            mapping_threshold: 0.5,
            execute_timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Attempts made by `Repository::update` before a conflict is surfaced.
    pub conflict_retries: u32,
    /// Number of operation-log entries retained after compaction.
    pub oplog_retention: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            conflict_retries: 3,
            oplog_retention: 500,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let dedup_defaults = DedupConfig::default();
        let resume_defaults = ResumeConfig::default();
        let import_defaults = ImportConfig::default();
        let store_defaults = StoreConfig::default();

        let schedule_interval = optional_env::<u64>("DEDUP_SCHEDULE_MINUTES")?
            .filter(|m| *m > 0)
            .map(|m| Duration::from_secs(m * 60));

        let supported_file_types = match std::env::var("RESUME_EXTENSIONS") {
            Ok(raw) => parse_extensions(&raw),
            Err(_) => resume_defaults.supported_file_types,
        };

        Ok(Config {
            data_dir: std::env::var("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data")),
            port: env_or("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            dedup: DedupConfig {
                similarity_threshold: env_or(
                    "SIMILARITY_THRESHOLD",
                    dedup_defaults.similarity_threshold,
                )?,
                auto_merge_threshold: env_or(
                    "AUTO_MERGE_THRESHOLD",
                    dedup_defaults.auto_merge_threshold,
                )?,
                token_weight: env_or("TOKEN_WEIGHT", dedup_defaults.token_weight)?,
                company_bonus: env_or("COMPANY_BONUS", dedup_defaults.company_bonus)?,
                role_bonus: env_or("ROLE_BONUS", dedup_defaults.role_bonus)?,
                schedule_interval,
            },
            resume: ResumeConfig {
                supported_file_types,
                max_file_bytes: env_or("RESUME_MAX_BYTES", resume_defaults.max_file_bytes)?,
                keep_original_default: env_or(
                    "KEEP_ORIGINAL_DEFAULT",
                    resume_defaults.keep_original_default,
                )?,
                naming_format: env_or("RESUME_NAMING", resume_defaults.naming_format)?,
            },
            import: ImportConfig {
                mapping_threshold: env_or(
                    "IMPORT_MAPPING_THRESHOLD",
                    import_defaults.mapping_threshold,
                )?,
                execute_timeout: Duration::from_secs(env_or(
                    "IMPORT_TIMEOUT_SECS",
                    import_defaults.execute_timeout.as_secs(),
                )?),
            },
            store: StoreConfig {
                conflict_retries: env_or("CONFLICT_RETRIES", store_defaults.conflict_retries)?,
                oplog_retention: env_or("OPLOG_RETENTION", store_defaults.oplog_retention)?,
            },
        })
    }
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    Ok(optional_env(key)?.unwrap_or(default))
}

fn optional_env<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("{e}"))
            .with_context(|| format!("Environment variable '{key}' has an invalid value")),
        Err(_) => Ok(None),
    }
}

/// Parses a comma-separated extension list, normalising to `.ext` lower case.
pub fn parse_extensions(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|s| !s.is_empty())
        .map(|s| format!(".{s}"))
        .collect()
}
