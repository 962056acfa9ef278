//! Domain types for image-URL validation and healing.
//!
//! Contains the configuration surface, the validation outcomes, the block
//! reason taxonomy, and the capability trait batch healing uses to read and
//! write a record's image field.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Prefix that marks a URL as an application-local placeholder asset,
/// trusted without any network probe.
pub const LOCAL_PLACEHOLDER_PREFIX: &str = "/api/placeholder";

/// The one external placeholder service exempt from the spoofed-placeholder
/// heuristic.
pub const TRUSTED_PLACEHOLDER_DOMAIN: &str = "via.placeholder.com";

/// Hosts (and their subdomains) trusted to serve product imagery without a
/// DNS safety check.
pub const DEFAULT_TRUSTED_CDN_DOMAINS: &[&str] = &[
    "images.unsplash.com",
    "via.placeholder.com",
    "cdn.shopify.com",
    "img.freepik.com",
    "images.pexels.com",
    "s3.amazonaws.com",
    "cloudfront.net",
    "googleapis.com",
    "gstatic.com",
];

/// Configuration for [`crate::ImageHealer`].
///
/// Every knob is optional; unset fields fall back to the compiled-in
/// defaults, so `HealerConfig::default()` is a fully working production
/// setup. Maps to an `[images]` table in a host application's config file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HealerConfig {
    /// Safe placeholder substituted for unusable image URLs.
    pub placeholder_url: Option<String>,

    /// Trusted CDN domains (replaces the built-in allowlist).
    pub trusted_cdn_domains: Option<Vec<String>>,

    /// User-Agent string for probe requests.
    pub user_agent: Option<String>,

    /// Per-candidate probe deadline in milliseconds. Default: 3000.
    pub probe_timeout_ms: Option<u64>,

    /// DNS resolution deadline in milliseconds. Default: 3000.
    pub dns_timeout_ms: Option<u64>,

    /// Largest acceptable declared Content-Length in bytes. Default: 10 MiB.
    pub max_response_bytes: Option<u64>,

    /// Concurrent validations per batch chunk. Default: 5.
    pub max_concurrent: Option<usize>,

    /// Pause between batch chunks in milliseconds. Default: 100.
    pub chunk_delay_ms: Option<u64>,

    /// Allow probing loopback addresses (local testing only).
    ///
    /// This does **not** disable protections for non-loopback private
    /// addresses.
    #[serde(default)]
    pub allow_loopback: bool,
}

impl HealerConfig {
    /// Default placeholder URL.
    pub const DEFAULT_PLACEHOLDER_URL: &'static str = "/api/placeholder/300/200";

    /// Default User-Agent for probe requests.
    pub const DEFAULT_USER_AGENT: &'static str = "imgheal/1.0";

    /// Default probe deadline in milliseconds.
    pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 3000;

    /// Default DNS deadline in milliseconds.
    pub const DEFAULT_DNS_TIMEOUT_MS: u64 = 3000;

    /// Default Content-Length cap in bytes.
    pub const DEFAULT_MAX_RESPONSE_BYTES: u64 = 10 * 1024 * 1024;

    /// Default batch chunk size.
    pub const DEFAULT_MAX_CONCURRENT: usize = 5;

    /// Default pause between batch chunks in milliseconds.
    pub const DEFAULT_CHUNK_DELAY_MS: u64 = 100;

    #[must_use]
    pub fn placeholder_url(&self) -> &str {
        self.placeholder_url
            .as_deref()
            .unwrap_or(Self::DEFAULT_PLACEHOLDER_URL)
    }

    #[must_use]
    pub fn user_agent(&self) -> &str {
        self.user_agent.as_deref().unwrap_or(Self::DEFAULT_USER_AGENT)
    }

    #[must_use]
    pub fn probe_timeout_ms(&self) -> u64 {
        self.probe_timeout_ms
            .unwrap_or(Self::DEFAULT_PROBE_TIMEOUT_MS)
    }

    #[must_use]
    pub fn dns_timeout_ms(&self) -> u64 {
        self.dns_timeout_ms.unwrap_or(Self::DEFAULT_DNS_TIMEOUT_MS)
    }

    #[must_use]
    pub fn max_response_bytes(&self) -> u64 {
        self.max_response_bytes
            .unwrap_or(Self::DEFAULT_MAX_RESPONSE_BYTES)
    }

    #[must_use]
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent.unwrap_or(Self::DEFAULT_MAX_CONCURRENT)
    }

    #[must_use]
    pub fn chunk_delay_ms(&self) -> u64 {
        self.chunk_delay_ms.unwrap_or(Self::DEFAULT_CHUNK_DELAY_MS)
    }
}

/// Why a candidate URL was rejected.
///
/// Every member is recovered locally: healing substitutes the placeholder
/// and logs the reason, so none of these ever reach a caller as an error.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
    /// Candidate could not be parsed as an absolute URL.
    #[error("invalid URL format")]
    ParseError,

    /// Scheme outside the http/https allowlist.
    #[error("unsupported protocol: {scheme}")]
    SchemeRejected { scheme: String },

    /// Host is, or resolves to, a private or otherwise restricted address.
    #[error("private or restricted address: {ip}")]
    HostnameBlocked {
        ip: IpAddr,
        /// Set when the address came from DNS rather than a literal host.
        hostname: Option<String>,
    },

    /// DNS produced no usable answer; unverified hosts are blocked.
    #[error("DNS resolution failed for {hostname}: {message}")]
    DnsResolutionFailed { hostname: String, message: String },

    /// Connection failure, probe timeout, or a non-success status.
    #[error("probe failed: {message}")]
    NetworkError { message: String },

    /// Probe answered with a redirect; redirects are never followed.
    #[error("redirect response ({status}) not followed")]
    RedirectBlocked { status: u16 },

    /// Response is not declared as an image.
    #[error("invalid content type: {}", .content_type.as_deref().unwrap_or("missing"))]
    ContentTypeInvalid { content_type: Option<String> },

    /// Declared Content-Length exceeds the response cap.
    #[error("content length {length} exceeds limit")]
    ContentTooLarge { length: u64 },

    /// External URL posing as a placeholder.
    #[error("untrusted placeholder URL")]
    UntrustedPlaceholder,

    /// Failure that fits no other member.
    #[error("validation failed")]
    UnknownFailure,
}

/// Outcome of scheme and host safety checks for one candidate.
#[derive(Debug, Clone, Serialize)]
pub struct SecurityValidation {
    /// Whether rendering code may fetch from this host.
    pub is_allowed: bool,

    /// Why the candidate was rejected, when it was.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<BlockReason>,

    /// Hostname the decision was made for, when the candidate named one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,

    /// Literal or resolved address behind the decision, when one exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<IpAddr>,
}

impl SecurityValidation {
    pub(crate) fn allowed(hostname: Option<String>, ip: Option<IpAddr>) -> Self {
        Self {
            is_allowed: true,
            reason: None,
            hostname,
            ip,
        }
    }

    /// Builds a blocked outcome, lifting hostname/address context out of
    /// the reason payload.
    pub(crate) fn from_block(reason: BlockReason) -> Self {
        let (hostname, ip) = match &reason {
            BlockReason::HostnameBlocked { ip, hostname } => (hostname.clone(), Some(*ip)),
            BlockReason::DnsResolutionFailed { hostname, .. } => (Some(hostname.clone()), None),
            _ => (None, None),
        };
        Self {
            is_allowed: false,
            reason: Some(reason),
            hostname,
            ip,
        }
    }
}

/// Outcome of validating (and possibly healing) one candidate image URL.
///
/// `was_healed` marks substitution: when set, `url` is the configured
/// placeholder and `original_url` records whatever text was replaced (when
/// there was any). When clear, `url` is byte-identical to the input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageValidation {
    /// URL rendering code should use.
    pub url: String,

    /// False when the candidate was actively rejected (blocked or failed
    /// its probe); true both for usable URLs and for benign placeholder
    /// substitutions of missing input.
    pub is_valid: bool,

    /// Whether the placeholder was substituted for the candidate.
    pub was_healed: bool,

    /// Pre-heal candidate text, for provenance.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_url: Option<String>,
}

impl ImageValidation {
    /// Candidate survived every check; pass it through untouched.
    pub(crate) fn passed(url: String) -> Self {
        Self {
            url,
            is_valid: true,
            was_healed: false,
            original_url: None,
        }
    }

    /// Nothing usable was provided; substitute the placeholder benignly.
    pub(crate) fn missing(placeholder: &str, original: Option<String>) -> Self {
        Self {
            url: placeholder.to_string(),
            is_valid: true,
            was_healed: true,
            original_url: original,
        }
    }

    /// Candidate was rejected; substitute the placeholder and keep the
    /// original for reporting.
    pub(crate) fn healed(placeholder: &str, original: String) -> Self {
        Self {
            url: placeholder.to_string(),
            is_valid: false,
            was_healed: true,
            original_url: Some(original),
        }
    }
}

/// Capability handed to batch healing for reading and writing a record's
/// image field.
///
/// Implemented once per concrete record type; the pipeline never inspects
/// any other field, so unrelated data passes through batches untouched.
pub trait ImageRecord {
    /// Best-available image URL for this record, if it has one.
    fn image_url(&self) -> Option<&str>;

    /// Overwrite the record's image field with the healed URL.
    fn set_image_url(&mut self, url: String);

    /// Pre-heal URL, for record types that track provenance.
    ///
    /// Powers the `blocked` bucket in [`crate::ImageReport`]: a record
    /// whose current URL is the placeholder *and* whose original is known
    /// was healed away from something unsafe. Types without provenance use
    /// the default and simply never land in that bucket.
    fn original_image_url(&self) -> Option<&str> {
        None
    }
}
