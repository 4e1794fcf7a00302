// ABOUTME: Network guards and body decoding for the HTTP backend.
// ABOUTME: Private-address detection for SSRF protection plus charset-aware body decoding.

use std::net::{IpAddr, ToSocketAddrs};

use ipnet::{Ipv4Net, Ipv6Net};
use once_cell::sync::Lazy;
use url::Url;

use crate::error::ScrapeError;

/// Maximum accepted response body (10 MB).
pub const MAX_CONTENT_LENGTH: usize = 10 * 1024 * 1024;

static PRIVATE_V4: Lazy<Vec<Ipv4Net>> = Lazy::new(|| {
    [
        "10.0.0.0/8",
        "172.16.0.0/12",
        "192.168.0.0/16",
        "127.0.0.0/8",
        "169.254.0.0/16",
        "100.64.0.0/10",
        "0.0.0.0/8",
    ]
    .iter()
    .map(|net| net.parse().unwrap())
    .collect()
});

static PRIVATE_V6: Lazy<Vec<Ipv6Net>> = Lazy::new(|| {
    ["fc00::/7", "fe80::/10"]
        .iter()
        .map(|net| net.parse().unwrap())
        .collect()
});

/// True for loopback, RFC1918, link-local, CGNAT and unique-local addresses.
pub fn is_private_ip(addr: &IpAddr) -> bool {
    match addr {
        IpAddr::V4(ip) => PRIVATE_V4.iter().any(|net| net.contains(ip)),
        IpAddr::V6(ip) => {
            if ip.is_loopback() || ip.is_unspecified() {
                return true;
            }
            if let Some(v4) = ip.to_ipv4_mapped() {
                return is_private_ip(&IpAddr::V4(v4));
            }
            PRIVATE_V6.iter().any(|net| net.contains(ip))
        }
    }
}

fn default_port(url: &Url) -> u16 {
    url.port_or_known_default().unwrap_or(80)
}

/// Parses and validates a scrape target: absolute http(s) URL with a host.
pub fn parse_target(url: &str, op: &str) -> Result<Url, ScrapeError> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return Err(ScrapeError::invalid_request(
            url,
            op,
            Some(anyhow::anyhow!("empty URL")),
        ));
    }
    let parsed = Url::parse(trimmed).map_err(|e| {
        ScrapeError::invalid_request(url, op, Some(anyhow::anyhow!("invalid URL: {}", e)))
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ScrapeError::invalid_request(
            url,
            op,
            Some(anyhow::anyhow!("scheme must be http or https")),
        ));
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(ScrapeError::invalid_request(
            url,
            op,
            Some(anyhow::anyhow!("URL has no host")),
        ));
    }
    Ok(parsed)
}

/// Refuses targets whose host is, or resolves to, a private address.
pub async fn ensure_public(target: &Url, url: &str, op: &str) -> Result<(), ScrapeError> {
    let host = match target.host_str() {
        Some(h) => h.trim_start_matches('[').trim_end_matches(']'),
        None => return Ok(()),
    };

    if let Ok(ip) = host.parse::<IpAddr>() {
        if is_private_ip(&ip) {
            return Err(ScrapeError::ssrf(
                url,
                op,
                Some(anyhow::anyhow!("private IP addresses are not allowed")),
            ));
        }
        return Ok(());
    }

    let addrs = tokio::net::lookup_host((host, default_port(target)))
        .await
        .map_err(|e| {
            ScrapeError::fetch(url, op, Some(anyhow::anyhow!("DNS lookup failed: {}", e)))
        })?;
    for socket_addr in addrs {
        if is_private_ip(&socket_addr.ip()) {
            return Err(ScrapeError::ssrf(
                url,
                op,
                Some(anyhow::anyhow!("{} resolves to a private address", host)),
            ));
        }
    }
    Ok(())
}

/// Error raised by [`redirect_policy`] when a hop targets a private address.
#[derive(Debug, thiserror::Error)]
#[error("redirect to private address blocked: {host}")]
pub struct PrivateRedirect {
    pub host: String,
}

/// True when `err` or anything in its source chain is a [`PrivateRedirect`].
pub fn is_private_redirect(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if e.downcast_ref::<PrivateRedirect>().is_some() {
            return true;
        }
        current = e.source();
    }
    false
}

/// Redirect policy that refuses hops to private addresses.
///
/// Redirect callbacks are synchronous, so resolution here uses the blocking resolver.
pub fn redirect_policy(allow_private: bool) -> reqwest::redirect::Policy {
    reqwest::redirect::Policy::custom(move |attempt| {
        if attempt.previous().len() >= 10 {
            return attempt.error("too many redirects");
        }
        if allow_private {
            return attempt.follow();
        }
        let next = attempt.url().clone();
        let host = match next.host_str() {
            Some(h) => h.trim_start_matches('[').trim_end_matches(']').to_string(),
            None => return attempt.follow(),
        };
        if let Ok(ip) = host.parse::<IpAddr>() {
            if is_private_ip(&ip) {
                return attempt.error(PrivateRedirect { host });
            }
            return attempt.follow();
        }
        let resolved = (host.as_str(), default_port(&next)).to_socket_addrs();
        match resolved {
            Ok(mut addrs) => {
                if addrs.any(|sa| is_private_ip(&sa.ip())) {
                    attempt.error(PrivateRedirect { host })
                } else {
                    attempt.follow()
                }
            }
            Err(_) => attempt.error("DNS lookup failed during redirect"),
        }
    })
}

/// Decodes body bytes using the Content-Type charset, else a detected encoding.
pub fn decode_body(body: &[u8], content_type: Option<&str>) -> String {
    if let Some(encoding) = content_type
        .and_then(extract_charset)
        .and_then(|cs| encoding_rs::Encoding::for_label(cs.as_bytes()))
    {
        let (decoded, _, _) = encoding.decode(body);
        return decoded.into_owned();
    }

    let mut detector = chardetng::EncodingDetector::new();
    detector.feed(body, true);
    let encoding = detector.guess(None, true);
    let (decoded, _, _) = encoding.decode(body);
    decoded.into_owned()
}

/// Extracts the charset parameter from a Content-Type header value.
pub fn extract_charset(content_type: &str) -> Option<String> {
    content_type
        .to_lowercase()
        .split(';')
        .find_map(|part| part.trim().strip_prefix("charset=").map(str::to_string))
        .map(|cs| cs.trim_matches('"').trim_matches('\'').to_string())
        .filter(|cs| !cs.is_empty())
}
