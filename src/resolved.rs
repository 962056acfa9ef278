//! Resolved runtime configuration.
//!
//! [`HealerConfig`] is Option-laden so hosts can set only what they need.
//! Resolving it once at construction gives the rest of the pipeline plain
//! values and a normalized allowlist to work with; nothing mutates it
//! afterwards.

use std::time::Duration;

use crate::types::{DEFAULT_TRUSTED_CDN_DOMAINS, HealerConfig};

#[derive(Debug, Clone)]
pub(crate) struct ResolvedConfig {
    pub placeholder_url: String,
    /// Lowercased, deduplicated suffix allowlist.
    pub trusted_cdn_domains: Vec<String>,
    pub user_agent: String,
    pub probe_timeout: Duration,
    pub dns_timeout: Duration,
    pub max_response_bytes: u64,
    /// Clamped to at least 1.
    pub max_concurrent: usize,
    pub chunk_delay: Duration,
    pub allow_loopback: bool,
}

impl ResolvedConfig {
    pub(crate) fn from_config(config: &HealerConfig) -> Self {
        let trusted_cdn_domains = match &config.trusted_cdn_domains {
            Some(domains) => normalize_domains(domains.iter().map(String::as_str)),
            None => normalize_domains(DEFAULT_TRUSTED_CDN_DOMAINS.iter().copied()),
        };
        Self {
            placeholder_url: config.placeholder_url().to_string(),
            trusted_cdn_domains,
            user_agent: config.user_agent().to_string(),
            probe_timeout: Duration::from_millis(config.probe_timeout_ms()),
            dns_timeout: Duration::from_millis(config.dns_timeout_ms()),
            max_response_bytes: config.max_response_bytes(),
            max_concurrent: config.max_concurrent().max(1),
            chunk_delay: Duration::from_millis(config.chunk_delay_ms()),
            allow_loopback: config.allow_loopback,
        }
    }
}

fn normalize_domains<'a>(domains: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut normalized: Vec<String> = domains
        .map(|domain| domain.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|domain| !domain.is_empty())
        .collect();
    normalized.sort_unstable();
    normalized.dedup();
    normalized
}
