//! Client IP extraction from HTTP headers with trust validation
//!
//! Forwarding headers are only believed in `Standard` / `Cloudflare` proxy
//! modes. In `Standard` mode with a configured CIDR list, the chain is walked
//! right to left and the first hop outside the trusted ranges is taken.

use axum::http::HeaderMap;
use ipnet::IpNet;
use std::net::{IpAddr, Ipv4Addr};
use tracing::debug;

use crate::config::{AnalyticsConfig, IpMode, TrustedProxyMode};

/// Address to store on a click event, after trust and privacy rules.
/// `None` when the configuration omits addresses.
pub fn client_ip(
    headers: &HeaderMap,
    socket_addr: IpAddr,
    config: &AnalyticsConfig,
) -> Option<String> {
    let ip = extract_client_ip(headers, socket_addr, config);

    match config.ip_mode {
        IpMode::Full => Some(ip.to_string()),
        IpMode::Anonymize => Some(anonymize_ip(ip).to_string()),
        IpMode::Omit => None,
    }
}

/// Extract the client IP address according to the proxy trust configuration
pub fn extract_client_ip(
    headers: &HeaderMap,
    socket_addr: IpAddr,
    config: &AnalyticsConfig,
) -> IpAddr {
    match config.trusted_proxy_mode {
        TrustedProxyMode::Cloudflare => extract_cloudflare_ip(headers).unwrap_or_else(|| {
            debug!("CF-Connecting-IP header missing in Cloudflare mode, using socket address");
            socket_addr
        }),
        TrustedProxyMode::Standard => {
            if !is_trusted(socket_addr, &config.trusted_proxies) {
                // Peer is not one of our proxies; its headers are client-controlled
                return socket_addr;
            }
            extract_standard_ip(headers, &config.trusted_proxies).unwrap_or(socket_addr)
        }
        TrustedProxyMode::None => socket_addr,
    }
}

/// An empty list trusts every hop, matching a single well-known proxy setup
fn is_trusted(ip: IpAddr, trusted: &[IpNet]) -> bool {
    trusted.is_empty() || trusted.iter().any(|net| net.contains(&ip))
}

fn extract_cloudflare_ip(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get("cf-connecting-ip")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.trim().parse::<IpAddr>().ok())
}

/// Prefer RFC 7239 Forwarded, fall back to X-Forwarded-For
fn extract_standard_ip(headers: &HeaderMap, trusted: &[IpNet]) -> Option<IpAddr> {
    let chain = forwarded_chain(headers)
        .filter(|chain| !chain.is_empty())
        .or_else(|| x_forwarded_for_chain(headers))?;

    pick_from_chain(&chain, trusted)
}

/// Walk the chain from the nearest hop outward and return the first address
/// that is not a trusted proxy. With no trust list the nearest hop is used.
fn pick_from_chain(chain: &[IpAddr], trusted: &[IpNet]) -> Option<IpAddr> {
    if trusted.is_empty() {
        return chain.last().copied();
    }

    chain
        .iter()
        .rev()
        .find(|ip| !trusted.iter().any(|net| net.contains(*ip)))
        .or_else(|| chain.first())
        .copied()
}

fn forwarded_chain(headers: &HeaderMap) -> Option<Vec<IpAddr>> {
    let mut chain = Vec::new();

    for value in headers.get_all("forwarded") {
        let Ok(value) = value.to_str() else {
            continue;
        };

        // Forwarded: for=192.0.2.60;proto=http, for="[2001:db8::1]:4711"
        for element in value.split(',') {
            for param in element.split(';') {
                let param = param.trim();
                let Some((key, raw)) = param.split_once('=') else {
                    continue;
                };
                if !key.trim().eq_ignore_ascii_case("for") {
                    continue;
                }
                if let Some(ip) = parse_forwarded_node(raw.trim()) {
                    chain.push(ip);
                }
            }
        }
    }

    if headers.contains_key("forwarded") {
        Some(chain)
    } else {
        None
    }
}

fn parse_forwarded_node(raw: &str) -> Option<IpAddr> {
    let node = raw.trim_matches('"');

    if let Some(rest) = node.strip_prefix('[') {
        // Bracketed IPv6, optionally followed by :port
        let (addr, _) = rest.split_once(']')?;
        return addr.parse().ok();
    }

    if let Ok(ip) = node.parse::<IpAddr>() {
        return Some(ip);
    }

    // IPv4 with port
    let (addr, _) = node.rsplit_once(':')?;
    addr.parse::<Ipv4Addr>().ok().map(IpAddr::V4)
}

fn x_forwarded_for_chain(headers: &HeaderMap) -> Option<Vec<IpAddr>> {
    let xff = headers.get("x-forwarded-for")?.to_str().ok()?;

    let chain: Vec<IpAddr> = xff
        .split(',')
        .filter_map(|s| s.trim().parse::<IpAddr>().ok())
        .collect();

    if chain.is_empty() {
        None
    } else {
        Some(chain)
    }
}

/// Keep only the enclosing /24 (IPv4) or /48 (IPv6) network
pub fn anonymize_ip(ip: IpAddr) -> IpAddr {
    let prefix = if ip.is_ipv4() { 24 } else { 48 };
    IpNet::new(ip, prefix).map_or(ip, |net| net.network())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn config(mode: TrustedProxyMode, trusted: &[&str]) -> AnalyticsConfig {
        AnalyticsConfig {
            ip_mode: IpMode::Full,
            trusted_proxy_mode: mode,
            trusted_proxies: trusted.iter().map(|s| s.parse().unwrap()).collect(),
        }
    }

    fn socket() -> IpAddr {
        "10.0.0.1".parse().unwrap()
    }

    #[test]
    fn test_none_mode_ignores_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.9"));

        let ip = extract_client_ip(&headers, socket(), &config(TrustedProxyMode::None, &[]));
        assert_eq!(ip, socket());
    }

    #[test]
    fn test_cloudflare_header() {
        let mut headers = HeaderMap::new();
        headers.insert("cf-connecting-ip", HeaderValue::from_static("198.51.100.7"));

        let ip = extract_client_ip(
            &headers,
            socket(),
            &config(TrustedProxyMode::Cloudflare, &[]),
        );
        assert_eq!(ip, "198.51.100.7".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_xff_skips_trusted_hops() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("1.1.1.1, 203.0.113.9, 10.0.0.5"),
        );

        let ip = extract_client_ip(
            &headers,
            socket(),
            &config(TrustedProxyMode::Standard, &["10.0.0.0/8"]),
        );
        assert_eq!(ip, "203.0.113.9".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_untrusted_peer_headers_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.9"));

        let peer: IpAddr = "192.0.2.44".parse().unwrap();
        let ip = extract_client_ip(
            &headers,
            peer,
            &config(TrustedProxyMode::Standard, &["10.0.0.0/8"]),
        );
        assert_eq!(ip, peer);
    }

    #[test]
    fn test_forwarded_header_preferred() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "forwarded",
            HeaderValue::from_static("for=\"[2001:db8::1]:4711\";proto=https, for=10.0.0.3"),
        );
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.9"));

        let ip = extract_client_ip(
            &headers,
            socket(),
            &config(TrustedProxyMode::Standard, &["10.0.0.0/8"]),
        );
        assert_eq!(ip, "2001:db8::1".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_ip_modes() {
        let headers = HeaderMap::new();
        let peer: IpAddr = "203.0.113.77".parse().unwrap();

        let mut cfg = config(TrustedProxyMode::None, &[]);
        assert_eq!(
            client_ip(&headers, peer, &cfg).as_deref(),
            Some("203.0.113.77")
        );

        cfg.ip_mode = IpMode::Anonymize;
        assert_eq!(
            client_ip(&headers, peer, &cfg).as_deref(),
            Some("203.0.113.0")
        );

        cfg.ip_mode = IpMode::Omit;
        assert_eq!(client_ip(&headers, peer, &cfg), None);
    }

    #[test]
    fn test_anonymize_ipv6() {
        let ip: IpAddr = "2001:db8:abcd:1234::1".parse().unwrap();
        assert_eq!(
            anonymize_ip(ip),
            "2001:db8:abcd::".parse::<IpAddr>().unwrap()
        );
    }
}
