//! SSRF defense for URL-bearing steps.
//!
//! URLs are parsed with the WHATWG rules (`url::Url`) — the same
//! normalization a browser applies before navigating, including stripping
//! ASCII tab/newline from the input. Classifying anything less normalized
//! would let an obfuscated literal like `http://127.0.0.<TAB>1/` slip past
//! the range checks. `file://` schemes are rejected outright; for http(s)
//! targets, literal IP hosts are classified directly and hostnames are
//! resolved with every resolved address classified. A hostname that fails
//! to resolve is allowed through — the target may only be reachable from
//! the egress network, so resolution failure here is not proof of a bad URL.

use std::net::{IpAddr, Ipv4Addr};

use tracing::debug;
use url::{Host, Url};

/// Why a URL was refused. The message is safe to surface to the caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UrlPolicyError {
    #[error("file:// URLs are not allowed")]
    FileScheme,
    #[error("URL scheme must be http or https")]
    UnsupportedScheme,
    #[error("invalid URL format")]
    Malformed,
    #[error("internal/private IP addresses are not allowed")]
    PrivateAddress,
    #[error("hostname resolves to internal/private IP address")]
    ResolvesToPrivateAddress,
}

/// Check a step URL against the SSRF policy.
///
/// Performs a DNS lookup for non-literal hostnames, so this is async and
/// belongs after the cheap structural checks.
pub async fn check_url(raw: &str) -> Result<(), UrlPolicyError> {
    let url = Url::parse(raw).map_err(|_| UrlPolicyError::Malformed)?;
    match url.scheme() {
        "http" | "https" => {}
        "file" => return Err(UrlPolicyError::FileScheme),
        _ => return Err(UrlPolicyError::UnsupportedScheme),
    }

    match url.host() {
        Some(Host::Ipv4(ip)) => {
            if is_private_or_reserved(IpAddr::V4(ip)) {
                return Err(UrlPolicyError::PrivateAddress);
            }
            Ok(())
        }
        Some(Host::Ipv6(ip)) => {
            if is_private_or_reserved(IpAddr::V6(ip)) {
                return Err(UrlPolicyError::PrivateAddress);
            }
            Ok(())
        }
        Some(Host::Domain(host)) => match tokio::net::lookup_host((host, 80)).await {
            Ok(addrs) => {
                for addr in addrs {
                    if is_private_or_reserved(addr.ip()) {
                        return Err(UrlPolicyError::ResolvesToPrivateAddress);
                    }
                }
                Ok(())
            }
            Err(e) => {
                // Unresolvable from here — allowed to proceed by policy.
                debug!(host = %host, err = %e, "DNS resolution failed; allowing URL through");
                Ok(())
            }
        },
        None => Err(UrlPolicyError::Malformed),
    }
}

/// Address ranges a workflow must never reach: loopback, RFC1918, link-local,
/// "this network" (0.0.0.0/8), multicast (224.0.0.0/4), reserved
/// (240.0.0.0/4), and their IPv6 equivalents.
pub fn is_private_or_reserved(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_private_or_reserved_v4(v4),
        IpAddr::V6(v6) => {
            if let Some(mapped) = v6.to_ipv4_mapped() {
                return is_private_or_reserved_v4(mapped);
            }
            v6.is_loopback()
                || v6.is_unspecified()
                || v6.is_multicast()
                // fe80::/10 link-local
                || (v6.segments()[0] & 0xffc0) == 0xfe80
                // fc00::/7 unique-local
                || (v6.segments()[0] & 0xfe00) == 0xfc00
        }
    }
}

fn is_private_or_reserved_v4(ip: Ipv4Addr) -> bool {
    let [a, b, _, _] = ip.octets();
    a == 127                      // loopback
        || a == 10                // 10.0.0.0/8
        || (a == 172 && (16..=31).contains(&b)) // 172.16.0.0/12
        || (a == 192 && b == 168) // 192.168.0.0/16
        || (a == 169 && b == 254) // link-local
        || a == 0                 // 0.0.0.0/8
        || (224..=239).contains(&a) // multicast
        || a >= 240               // reserved
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_v4_ranges() {
        for ip in ["127.0.0.1", "10.1.2.3", "172.16.0.1", "172.31.255.255", "192.168.1.1", "169.254.0.9", "0.1.2.3", "224.0.0.1", "239.255.255.255", "240.0.0.1", "255.255.255.255"] {
            assert!(is_private_or_reserved(ip.parse().unwrap()), "{ip} should be blocked");
        }
        for ip in ["8.8.8.8", "93.184.216.34", "172.15.0.1", "172.32.0.1", "1.1.1.1", "223.255.255.255"] {
            assert!(!is_private_or_reserved(ip.parse().unwrap()), "{ip} should be allowed");
        }
    }

    #[test]
    fn classifies_v6_ranges() {
        for ip in ["::1", "::", "fe80::1", "fc00::1", "fd12::34", "ff02::1", "::ffff:10.0.0.1", "::ffff:127.0.0.1"] {
            assert!(is_private_or_reserved(ip.parse().unwrap()), "{ip} should be blocked");
        }
        assert!(!is_private_or_reserved("2606:4700::1111".parse().unwrap()));
    }

    #[tokio::test]
    async fn rejects_file_scheme_and_literals() {
        assert_eq!(check_url("file:///etc/passwd").await, Err(UrlPolicyError::FileScheme));
        assert_eq!(check_url("FILE://share/secret").await, Err(UrlPolicyError::FileScheme));
        assert_eq!(check_url("http://127.0.0.1/admin").await, Err(UrlPolicyError::PrivateAddress));
        assert_eq!(check_url("http://10.0.0.5/").await, Err(UrlPolicyError::PrivateAddress));
        assert_eq!(check_url("http://[::1]/").await, Err(UrlPolicyError::PrivateAddress));
        assert_eq!(check_url("gopher://example.com").await, Err(UrlPolicyError::UnsupportedScheme));
        assert_eq!(check_url("not a url").await, Err(UrlPolicyError::Malformed));
    }

    #[tokio::test]
    async fn whitespace_obfuscated_literals_are_still_classified() {
        // WHATWG parsing strips ASCII tab/newline before interpreting the
        // host — an obfuscated loopback literal must classify as loopback,
        // not fall through to lenient DNS handling.
        assert_eq!(
            check_url("http://127.0.0.\t1/admin").await,
            Err(UrlPolicyError::PrivateAddress)
        );
        assert_eq!(
            check_url("http://192.168.\n1.1/").await,
            Err(UrlPolicyError::PrivateAddress)
        );
        assert_eq!(check_url("http://8.8.\t8.8/").await, Ok(()));
    }

    #[tokio::test]
    async fn normalizes_host_forms_before_classifying() {
        // Userinfo, ports, and mixed case don't disturb host extraction.
        assert_eq!(
            check_url("https://user:pw@127.0.0.1:8443/x").await,
            Err(UrlPolicyError::PrivateAddress)
        );
        assert_eq!(
            check_url("HTTP://10.1.1.1/").await,
            Err(UrlPolicyError::PrivateAddress)
        );
        // Decimal-integer host form normalizes to an IPv4 literal.
        assert_eq!(
            check_url("http://2130706433/").await,
            Err(UrlPolicyError::PrivateAddress)
        );
    }

    #[tokio::test]
    async fn allows_public_literals() {
        assert_eq!(check_url("http://93.184.216.34/").await, Ok(()));
        assert_eq!(check_url("https://8.8.8.8:443/dns").await, Ok(()));
    }
}
