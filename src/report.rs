//! Catalog image diagnostics.
//!
//! Classifies each record's current image field without re-fetching
//! anything, so a health endpoint can serve the report cheaply. A record
//! sitting on the placeholder counts as `blocked` only when it also
//! exposes the URL it was healed away from; without provenance it is just
//! another placeholder.

use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use crate::ImageHealer;
use crate::types::ImageRecord;

/// Snapshot of catalog image health.
#[derive(Debug, Clone, Serialize)]
pub struct ImageReport {
    /// RFC 3339 generation time.
    pub generated_at: String,
    /// Number of records surveyed.
    pub total: usize,
    pub stats: ImageReportStats,
    pub security: SecuritySummary,
    pub issues: Vec<ImageIssue>,
}

/// Per-bucket record counts. Buckets are disjoint; they sum to `total`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImageReportStats {
    /// Records carrying a real, non-placeholder URL.
    pub valid: usize,
    /// Records currently showing a placeholder, local or external.
    pub placeholders: usize,
    /// Records with no image URL at all.
    pub missing: usize,
    /// Records healed away from a URL that failed validation.
    pub blocked: usize,
}

/// The security posture the report was generated under.
#[derive(Debug, Clone, Serialize)]
pub struct SecuritySummary {
    pub trusted_cdn_domains: usize,
    pub probe_timeout_ms: u64,
    pub max_response_size_mb: u64,
}

/// One record needing attention.
#[derive(Debug, Clone, Serialize)]
pub struct ImageIssue {
    /// Position of the record in the surveyed slice.
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub kind: IssueKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    MissingImage,
    BlockedBySecurity,
}

pub(crate) fn generate<R: ImageRecord>(healer: &ImageHealer, items: &[R]) -> ImageReport {
    let config = &healer.config;
    let mut stats = ImageReportStats::default();
    let mut issues = Vec::new();

    for (index, item) in items.iter().enumerate() {
        match item.image_url() {
            None => {
                stats.missing += 1;
                issues.push(ImageIssue {
                    index,
                    url: None,
                    kind: IssueKind::MissingImage,
                });
            }
            Some(url) if url.trim().is_empty() => {
                stats.missing += 1;
                issues.push(ImageIssue {
                    index,
                    url: Some(url.to_string()),
                    kind: IssueKind::MissingImage,
                });
            }
            Some(url) if url == config.placeholder_url && has_provenance(item) => {
                stats.blocked += 1;
                issues.push(ImageIssue {
                    index,
                    url: item.original_image_url().map(String::from),
                    kind: IssueKind::BlockedBySecurity,
                });
            }
            Some(url) if url == config.placeholder_url || url.contains("placeholder") => {
                stats.placeholders += 1;
            }
            Some(_) => stats.valid += 1,
        }
    }

    ImageReport {
        generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        total: items.len(),
        stats,
        security: SecuritySummary {
            trusted_cdn_domains: config.trusted_cdn_domains.len(),
            probe_timeout_ms: config.probe_timeout.as_millis() as u64,
            max_response_size_mb: config.max_response_bytes / (1024 * 1024),
        },
        issues,
    }
}

fn has_provenance<R: ImageRecord>(item: &R) -> bool {
    item.original_image_url()
        .is_some_and(|url| !url.trim().is_empty())
}
