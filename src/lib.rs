//! SSRF-safe validation and healing for untrusted product image URLs.
//!
//! Catalog records arrive with image URLs supplied by merchants, feed
//! imports, and scrapers. Fetching them blindly turns the storefront into
//! a proxy for whoever wrote the URL; this crate decides whether a
//! candidate may be rendered directly or must be replaced with a
//! known-safe placeholder. Unusable candidates are not errors: every path
//! converges to a well-formed [`ImageValidation`] carrying either the
//! original URL or the placeholder, and the pipeline never panics, never
//! hangs past its deadlines, and never surfaces a failure to the caller.
//!
//! # Pipeline
//!
//! 1. **Admission** — missing candidates substitute the placeholder
//!    benignly; application-local placeholder paths are trusted outright;
//!    external URLs posing as placeholders are rejected.
//! 2. **Scheme check** — only `http` and `https` survive.
//! 3. **Host check** — literal addresses classify against the restricted
//!    ranges; trusted CDN hosts skip DNS; every other hostname resolves
//!    fail-closed, with each answer classified before use.
//! 4. **Probe** — a HEAD request that follows no redirects, pinned to the
//!    vetted addresses, requiring an `image/*` content type and a bounded
//!    declared size, all under one absolute deadline.
//!
//! # Modules
//!
//! | Module     | Purpose                                            |
//! |------------|----------------------------------------------------|
//! | `ip`       | Pure private/restricted range classification       |
//! | `security` | Scheme, hostname, and fail-closed DNS checks       |
//! | `probe`    | Non-redirecting HEAD probe with pinned connections |
//! | `batch`    | Chunked healing with bounded concurrency           |
//! | `report`   | Catalog image diagnostics                          |
//! | `selftest` | Adversarial verification of the block rules        |
//!
//! # Example
//!
//! ```no_run
//! use imgheal::{HealerConfig, ImageHealer};
//!
//! # async fn example() {
//! let healer = ImageHealer::new(HealerConfig::default());
//! let outcome = healer
//!     .validate_and_heal(Some("http://169.254.169.254/latest/meta-data/"))
//!     .await;
//! assert!(outcome.was_healed);
//! assert_eq!(outcome.url, healer.placeholder_url());
//! # }
//! ```

mod batch;
mod ip;
mod probe;
mod report;
mod resolved;
mod security;
mod selftest;
mod types;

use std::time::Duration;

use url::Url;

use crate::resolved::ResolvedConfig;
use crate::security::HostCheck;

pub use crate::ip::is_private_or_restricted;
pub use crate::report::{ImageIssue, ImageReport, ImageReportStats, IssueKind, SecuritySummary};
pub use crate::selftest::{SelfTestCase, SelfTestReport};
pub use crate::types::{
    BlockReason, DEFAULT_TRUSTED_CDN_DOMAINS, HealerConfig, ImageRecord, ImageValidation,
    LOCAL_PLACEHOLDER_PREFIX, SecurityValidation, TRUSTED_PLACEHOLDER_DOMAIN,
};

/// Validates untrusted image URLs and heals the unusable ones.
///
/// Construct once with the desired [`HealerConfig`] and share freely; the
/// resolved configuration is immutable and every method takes `&self`.
#[derive(Debug, Clone)]
pub struct ImageHealer {
    pub(crate) config: ResolvedConfig,
}

/// Pre-probe disposition of one candidate. Shared between healing and the
/// self-test harness so both judge candidates identically.
#[derive(Debug)]
pub(crate) enum Admission {
    /// No usable candidate; substitute the placeholder benignly.
    MissingInput { original: Option<String> },
    /// Application-local placeholder; trusted without network access.
    TrustedLocal { url: String },
    /// Rejected before any probe.
    Denied { url: String, reason: BlockReason },
    /// Passed every static check; safe to probe.
    Probe {
        raw: String,
        url: Url,
        check: HostCheck,
    },
}

impl ImageHealer {
    #[must_use]
    pub fn new(config: HealerConfig) -> Self {
        Self {
            config: ResolvedConfig::from_config(&config),
        }
    }

    /// The placeholder URL unusable candidates heal to.
    #[must_use]
    pub fn placeholder_url(&self) -> &str {
        &self.config.placeholder_url
    }

    /// Checks a bare hostname (or literal address) against the restricted
    /// ranges, the trusted-CDN allowlist, and fail-closed DNS resolution.
    pub async fn validate_hostname(&self, hostname: &str) -> SecurityValidation {
        security::validate_hostname(hostname, &self.config).await
    }

    /// Vets a full candidate URL (scheme plus host safety) without
    /// issuing any probe.
    pub async fn validate_url_security(&self, url: &str) -> SecurityValidation {
        security::validate_url_security(url, &self.config).await
    }

    /// Validates one candidate end to end, healing anything unusable to
    /// the placeholder. Uses the configured probe deadline.
    pub async fn validate_and_heal(&self, candidate: Option<&str>) -> ImageValidation {
        self.validate_and_heal_with_timeout(candidate, self.config.probe_timeout)
            .await
    }

    /// Like [`Self::validate_and_heal`] with an explicit probe budget.
    /// The budget covers every connection attempt for the candidate; DNS
    /// resolution runs under its own configured deadline.
    pub async fn validate_and_heal_with_timeout(
        &self,
        candidate: Option<&str>,
        probe_budget: Duration,
    ) -> ImageValidation {
        match self.admit(candidate).await {
            Admission::MissingInput { original } => {
                ImageValidation::missing(&self.config.placeholder_url, original)
            }
            Admission::TrustedLocal { url } => ImageValidation::passed(url),
            Admission::Denied { url, reason } => {
                tracing::warn!(url = %url, reason = %reason, "blocked unsafe image URL");
                ImageValidation::healed(&self.config.placeholder_url, url)
            }
            Admission::Probe { raw, url, check } => {
                match probe::probe(&url, &check, &self.config, probe_budget).await {
                    Ok(()) => ImageValidation::passed(raw),
                    Err(reason) => {
                        tracing::warn!(
                            url = %raw,
                            reason = %reason,
                            "image probe failed, healing to placeholder"
                        );
                        ImageValidation::healed(&self.config.placeholder_url, raw)
                    }
                }
            }
        }
    }

    /// Heals a whole batch with the configured concurrency and pacing.
    /// Output length and order always match the input.
    pub async fn heal_many<R: ImageRecord>(&self, items: Vec<R>) -> Vec<R> {
        batch::heal_many(self, items, self.config.max_concurrent).await
    }

    /// Like [`Self::heal_many`] with an explicit chunk size.
    pub async fn heal_many_with_limit<R: ImageRecord>(
        &self,
        items: Vec<R>,
        max_concurrent: usize,
    ) -> Vec<R> {
        batch::heal_many(self, items, max_concurrent).await
    }

    /// Classifies the current state of a record set without re-fetching
    /// anything.
    #[must_use]
    pub fn report<R: ImageRecord>(&self, items: &[R]) -> ImageReport {
        report::generate(self, items)
    }

    /// Runs the adversarial vector table against this healer's rules.
    pub async fn self_test(&self) -> SelfTestReport {
        selftest::run(self).await
    }

    /// Decides what may happen to a candidate before any probe traffic.
    pub(crate) async fn admit(&self, candidate: Option<&str>) -> Admission {
        let Some(raw) = candidate else {
            return Admission::MissingInput { original: None };
        };
        if raw.trim().is_empty() {
            // Whitespace still counts as provenance; empty does not.
            return Admission::MissingInput {
                original: (!raw.is_empty()).then(|| raw.to_string()),
            };
        }
        if raw.starts_with(LOCAL_PLACEHOLDER_PREFIX) || raw == self.config.placeholder_url {
            return Admission::TrustedLocal {
                url: raw.to_string(),
            };
        }
        // Blunt on purpose: anything calling itself a placeholder that is
        // not our own asset or the one trusted service gets no benefit of
        // the doubt.
        if raw.contains("placeholder") && !raw.contains(TRUSTED_PLACEHOLDER_DOMAIN) {
            return Admission::Denied {
                url: raw.to_string(),
                reason: BlockReason::UntrustedPlaceholder,
            };
        }
        match security::admit_url(raw, &self.config).await {
            Ok((url, check)) => Admission::Probe {
                raw: raw.to_string(),
                url,
                check,
            },
            Err(reason) => Admission::Denied {
                url: raw.to_string(),
                reason,
            },
        }
    }
}
