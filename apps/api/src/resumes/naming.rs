use chrono::{DateTime, Utc};

use crate::config::NamingFormat;
use crate::models::resume::{FilenameComponents, ResumeVersion};

const MAX_TOKEN_LEN: usize = 64;

/// Reduces free text to a filesystem-safe token: ASCII alphanumerics kept,
/// every other run of characters collapsed to a single `-`.
pub fn sanitize_token(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len().min(MAX_TOKEN_LEN));
    let mut pending_sep = false;
    for c in raw.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('-');
            }
            pending_sep = false;
            out.push(c);
            if out.len() >= MAX_TOKEN_LEN {
                break;
            }
        } else {
            pending_sep = true;
        }
    }
    if out.is_empty() {
        "Unknown".to_string()
    } else {
        out
    }
}

pub fn components_for(
    company: Option<&str>,
    role: Option<&str>,
    at: DateTime<Utc>,
    format: NamingFormat,
) -> FilenameComponents {
    let date = match format {
        NamingFormat::CompanyRoleDate => at.format("%Y-%m-%d").to_string(),
        NamingFormat::CompanyRoleDateTime => at.format("%Y-%m-%d_%H%M%S").to_string(),
    };
    FilenameComponents {
        company: sanitize_token(company.unwrap_or_default()),
        role: sanitize_token(role.unwrap_or_default()),
        date,
    }
}

pub fn base_filename(components: &FilenameComponents) -> String {
    format!("{}_{}_{}", components.company, components.role, components.date)
}

/// `""` for the first version, then `_v1`, `_v2`, ... one past the highest
/// suffix still present.
pub fn next_suffix(versions: &[ResumeVersion]) -> String {
    if versions.is_empty() {
        return String::new();
    }
    let highest = versions
        .iter()
        .map(|v| suffix_number(&v.version_suffix))
        .max()
        .unwrap_or(0);
    format!("_v{}", highest + 1)
}

fn suffix_number(suffix: &str) -> u32 {
    suffix
        .strip_prefix("_v")
        .and_then(|n| n.parse().ok())
        .unwrap_or(0)
}

/// Lower-cased extension with its leading dot, or `None` if the name has none.
pub fn extension_of(filename: &str) -> Option<String> {
    let name = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(format!(".{}", ext.to_ascii_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn version(suffix: &str) -> ResumeVersion {
        ResumeVersion {
            version_id: Uuid::new_v4(),
            version_suffix: suffix.to_string(),
            managed_path: String::new(),
            file_checksum: String::new(),
            upload_timestamp: Utc::now(),
            original_path: None,
            original_filename: "r.pdf".to_string(),
            is_active: false,
            extracted_text: None,
            extraction_status: None,
            extraction_error: None,
        }
    }

    #[test]
    fn test_sanitize_collapses_separators() {
        assert_eq!(sanitize_token("  Acme, Inc. "), "Acme-Inc");
        assert_eq!(sanitize_token("Sr. Software / Platform"), "Sr-Software-Platform");
        assert_eq!(sanitize_token("../../etc"), "etc");
        assert_eq!(sanitize_token("  "), "Unknown");
    }

    #[test]
    fn test_base_filename_formats() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 6).unwrap();
        let date_only = components_for(Some("Acme"), Some("SWE"), at, NamingFormat::CompanyRoleDate);
        assert_eq!(base_filename(&date_only), "Acme_SWE_2024-03-09");

        let with_time = components_for(None, Some("SWE"), at, NamingFormat::CompanyRoleDateTime);
        assert_eq!(base_filename(&with_time), "Unknown_SWE_2024-03-09_140506");
    }

    #[test]
    fn test_suffix_sequence() {
        assert_eq!(next_suffix(&[]), "");
        assert_eq!(next_suffix(&[version("")]), "_v1");
        assert_eq!(next_suffix(&[version(""), version("_v1")]), "_v2");
        // A gap left by a deleted version is never reused.
        assert_eq!(next_suffix(&[version("_v2")]), "_v3");
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("Resume.PDF").as_deref(), Some(".pdf"));
        assert_eq!(extension_of("dir/cv.docx").as_deref(), Some(".docx"));
        assert_eq!(extension_of("README"), None);
        assert_eq!(extension_of(".hidden"), None);
    }
}
