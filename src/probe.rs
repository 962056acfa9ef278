//! Non-redirecting HEAD probe with pinned connections.
//!
//! One absolute deadline covers every connection attempt for a candidate.
//! Hosts that passed DNS validation are probed with the connection pinned
//! to an already-vetted address, so the probe cannot re-resolve the name to
//! something different from what was checked.

use std::net::SocketAddr;
use std::time::Duration;

use reqwest::header::{ACCEPT, CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::redirect::Policy;
use reqwest::{Client, Response};
use tokio::time::{Instant, timeout};
use url::Url;

use crate::resolved::ResolvedConfig;
use crate::security::HostCheck;
use crate::types::BlockReason;

/// Cap on pinned connection attempts per probe.
const MAX_CONNECT_ATTEMPTS: usize = 3;

/// Fallback port when the URL scheme has no default.
const DEFAULT_PORT: u16 = 80;

/// Issues the HEAD probe and evaluates the answer. `Ok(())` means the
/// candidate may be rendered as-is.
pub(crate) async fn probe(
    url: &Url,
    check: &HostCheck,
    config: &ResolvedConfig,
    budget: Duration,
) -> Result<(), BlockReason> {
    let deadline = Instant::now() + budget;
    let mut last_error = None;

    for pin in connection_attempts(url, check) {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(last_error.unwrap_or_else(timed_out));
        }
        let client = match build_client(config, pin) {
            Ok(client) => client,
            Err(e) => {
                return Err(BlockReason::NetworkError {
                    message: format!("client construction failed: {e}"),
                });
            }
        };
        match timeout(remaining, client.head(url.clone()).send()).await {
            Err(_) => return Err(timed_out()),
            Ok(Err(e)) if e.is_timeout() => return Err(timed_out()),
            Ok(Err(e)) => {
                tracing::debug!(url = %url, error = %e, "probe connection attempt failed");
                last_error = Some(BlockReason::NetworkError {
                    message: e.to_string(),
                });
            }
            Ok(Ok(response)) => return evaluate_response(&response, config),
        }
    }

    Err(last_error.unwrap_or_else(|| BlockReason::NetworkError {
        message: "no connection attempt succeeded".to_string(),
    }))
}

/// Literal and trusted-CDN hosts connect directly; resolved hosts get one
/// pinned attempt per vetted address, capped.
fn connection_attempts(url: &Url, check: &HostCheck) -> Vec<Option<(String, SocketAddr)>> {
    match check {
        HostCheck::LiteralIp(_) | HostCheck::TrustedCdn { .. } => vec![None],
        HostCheck::Resolved { host, ips } => {
            let port = url.port_or_known_default().unwrap_or(DEFAULT_PORT);
            ips.iter()
                .take(MAX_CONNECT_ATTEMPTS)
                .map(|&ip| Some((host.clone(), SocketAddr::new(ip, port))))
                .collect()
        }
    }
}

fn build_client(
    config: &ResolvedConfig,
    pin: Option<(String, SocketAddr)>,
) -> reqwest::Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("image/*"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));

    let mut builder = Client::builder()
        .user_agent(config.user_agent.clone())
        .default_headers(headers)
        .redirect(Policy::none())
        .no_proxy();
    if let Some((host, addr)) = pin {
        builder = builder.resolve(&host, addr);
    }
    builder.build()
}

fn timed_out() -> BlockReason {
    BlockReason::NetworkError {
        message: "probe timed out".to_string(),
    }
}

fn evaluate_response(response: &Response, config: &ResolvedConfig) -> Result<(), BlockReason> {
    let status = response.status();
    if status.is_redirection() {
        return Err(BlockReason::RedirectBlocked {
            status: status.as_u16(),
        });
    }
    if !status.is_success() {
        return Err(BlockReason::NetworkError {
            message: format!("HTTP {status}"),
        });
    }

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::trim);
    if !content_type.is_some_and(is_image_content_type) {
        return Err(BlockReason::ContentTypeInvalid {
            content_type: content_type.map(String::from),
        });
    }

    if let Some(length) = declared_length(response) {
        if length > config.max_response_bytes {
            return Err(BlockReason::ContentTooLarge { length });
        }
    }
    Ok(())
}

fn is_image_content_type(value: &str) -> bool {
    value.len() >= 6 && value.as_bytes()[..6].eq_ignore_ascii_case(b"image/")
}

fn declared_length(response: &Response) -> Option<u64> {
    response
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
}
