//! Scheme, hostname, and DNS safety checks.
//!
//! The decision order mirrors the probe pipeline: scheme allowlist first,
//! then literal-address classification, then the trusted-CDN short-circuit,
//! and only then DNS resolution. Resolution is fail-closed: a timeout, a
//! resolver error, or an empty answer set all block, and every returned
//! address is classified before any connection is attempted so a hostname
//! cannot smuggle in a private address.

use std::net::IpAddr;

use tokio::net::lookup_host;
use tokio::time::timeout;
use url::{Host, Url};

use crate::ip;
use crate::resolved::ResolvedConfig;
use crate::types::{BlockReason, SecurityValidation};

/// Schemes a candidate URL may use.
const ALLOWED_SCHEMES: &[&str] = &["http", "https"];

/// Port used when checking a bare hostname outside any URL.
const DEFAULT_PORT: u16 = 80;

/// How a host passed validation; decides what the probe may pin to.
#[derive(Debug, Clone)]
pub(crate) enum HostCheck {
    /// Host was a literal, non-restricted address; connect directly.
    LiteralIp(IpAddr),
    /// Host matched the trusted CDN allowlist; no DNS check performed.
    TrustedCdn { host: String },
    /// Host resolved publicly; probe connections pin to these addresses.
    Resolved { host: String, ips: Vec<IpAddr> },
}

/// Parses and fully vets a candidate URL, returning the parsed form plus
/// the host disposition the probe needs.
pub(crate) async fn admit_url(
    raw: &str,
    config: &ResolvedConfig,
) -> Result<(Url, HostCheck), BlockReason> {
    let url = Url::parse(raw).map_err(|_| BlockReason::ParseError)?;
    if !ALLOWED_SCHEMES.contains(&url.scheme()) {
        return Err(BlockReason::SchemeRejected {
            scheme: url.scheme().to_string(),
        });
    }
    let Some(host) = url.host().map(|host| host.to_owned()) else {
        return Err(BlockReason::ParseError);
    };
    let port = url.port_or_known_default().unwrap_or(DEFAULT_PORT);
    let check = check_host(host, port, config).await?;
    Ok((url, check))
}

/// Vets a bare hostname (or bracketed/literal address) outside any URL.
pub(crate) async fn validate_hostname(
    hostname: &str,
    config: &ResolvedConfig,
) -> SecurityValidation {
    let trimmed = hostname.trim();
    let bare = trimmed
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .unwrap_or(trimmed);
    let host = match bare.parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => Host::Ipv4(v4),
        Ok(IpAddr::V6(v6)) => Host::Ipv6(v6),
        Err(_) => Host::Domain(bare.to_ascii_lowercase()),
    };
    match check_host(host, DEFAULT_PORT, config).await {
        Ok(check) => SecurityValidation::allowed(check.hostname().map(String::from), check.ip()),
        Err(reason) => SecurityValidation::from_block(reason),
    }
}

/// Vets a full candidate URL and reports the outcome without probing.
pub(crate) async fn validate_url_security(
    raw: &str,
    config: &ResolvedConfig,
) -> SecurityValidation {
    match admit_url(raw, config).await {
        Ok((_, check)) => {
            SecurityValidation::allowed(check.hostname().map(String::from), check.ip())
        }
        Err(reason) => SecurityValidation::from_block(reason),
    }
}

impl HostCheck {
    fn hostname(&self) -> Option<&str> {
        match self {
            HostCheck::LiteralIp(_) => None,
            HostCheck::TrustedCdn { host } | HostCheck::Resolved { host, .. } => Some(host),
        }
    }

    fn ip(&self) -> Option<IpAddr> {
        match self {
            HostCheck::LiteralIp(ip) => Some(*ip),
            HostCheck::TrustedCdn { .. } | HostCheck::Resolved { .. } => None,
        }
    }
}

async fn check_host(
    host: Host<String>,
    port: u16,
    config: &ResolvedConfig,
) -> Result<HostCheck, BlockReason> {
    match host {
        Host::Ipv4(v4) => check_literal(IpAddr::V4(v4), config),
        Host::Ipv6(v6) => check_literal(IpAddr::V6(v6), config),
        Host::Domain(name) => {
            if is_trusted_cdn(&name, config) {
                return Ok(HostCheck::TrustedCdn { host: name });
            }
            let ips = resolve_host(&name, port, config).await?;
            for &ip in &ips {
                if is_blocked_ip(ip, config) {
                    tracing::warn!(
                        hostname = %name,
                        %ip,
                        "hostname resolves into a restricted range"
                    );
                    return Err(BlockReason::HostnameBlocked {
                        ip,
                        hostname: Some(name),
                    });
                }
            }
            Ok(HostCheck::Resolved { host: name, ips })
        }
    }
}

fn check_literal(ip: IpAddr, config: &ResolvedConfig) -> Result<HostCheck, BlockReason> {
    if is_blocked_ip(ip, config) {
        return Err(BlockReason::HostnameBlocked { ip, hostname: None });
    }
    Ok(HostCheck::LiteralIp(ip))
}

/// Classification with the loopback test exemption applied.
fn is_blocked_ip(ip: IpAddr, config: &ResolvedConfig) -> bool {
    if config.allow_loopback && ip::is_loopback(ip) {
        return false;
    }
    ip::is_private_or_restricted(ip)
}

/// Exact or dot-separated-suffix match against the trusted allowlist, so
/// `foo.cloudfront.net` matches `cloudfront.net` but `evilcloudfront.net`
/// does not.
fn is_trusted_cdn(host: &str, config: &ResolvedConfig) -> bool {
    config.trusted_cdn_domains.iter().any(|domain| {
        host == domain
            || host
                .strip_suffix(domain.as_str())
                .is_some_and(|prefix| prefix.ends_with('.'))
    })
}

/// A and AAAA resolution under the DNS deadline. Unresolvable hosts block;
/// an unverified host is an unsafe host.
async fn resolve_host(
    host: &str,
    port: u16,
    config: &ResolvedConfig,
) -> Result<Vec<IpAddr>, BlockReason> {
    let addrs = match timeout(config.dns_timeout, lookup_host((host, port))).await {
        Err(_) => {
            return Err(BlockReason::DnsResolutionFailed {
                hostname: host.to_string(),
                message: "lookup timed out".to_string(),
            });
        }
        Ok(Err(e)) => {
            return Err(BlockReason::DnsResolutionFailed {
                hostname: host.to_string(),
                message: e.to_string(),
            });
        }
        Ok(Ok(addrs)) => addrs,
    };
    let mut ips: Vec<IpAddr> = addrs.map(|addr| addr.ip()).collect();
    if ips.is_empty() {
        return Err(BlockReason::DnsResolutionFailed {
            hostname: host.to_string(),
            message: "no addresses returned".to_string(),
        });
    }
    ips.sort_unstable();
    ips.dedup();
    Ok(ips)
}
