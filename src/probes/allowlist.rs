//! SSRF allow-list: blocks probes from targeting loopback, link-local,
//! private, CGNAT, documentation, benchmarking and multicast/reserved
//! ranges, and restricts ports to {80, 443} ∪ [1024, 65535] (spec §4.2).

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowlistError {
    BlockedHost(String),
    BlockedAddress(IpAddr),
    BlockedPort(u16),
    ResolutionFailed(String),
}

impl std::fmt::Display for AllowlistError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AllowlistError::BlockedHost(h) => write!(f, "blocked hostname: {h}"),
            AllowlistError::BlockedAddress(a) => write!(f, "blocked address: {a}"),
            AllowlistError::BlockedPort(p) => write!(f, "blocked port: {p}"),
            AllowlistError::ResolutionFailed(e) => write!(f, "resolution failed: {e}"),
        }
    }
}

fn port_allowed(port: u16) -> bool {
    port == 80 || port == 443 || (1024..=65535).contains(&port)
}

fn ipv4_blocked(ip: Ipv4Addr) -> bool {
    let o = ip.octets();
    o[0] == 0
        || o[0] == 10
        || (o[0] == 100 && (64..=127).contains(&o[1]))
        || o[0] == 127
        || (o[0] == 169 && o[1] == 254)
        || (o[0] == 172 && (16..=31).contains(&o[1]))
        || (o[0] == 192 && o[1] == 168)
        || (o[0] == 192 && o[1] == 0 && o[2] == 2)
        || (o[0] == 198 && (18..=19).contains(&o[1]))
        || o[0] >= 224
}

fn ipv6_blocked(ip: Ipv6Addr) -> bool {
    if ip.is_unspecified() || ip.is_loopback() {
        return true;
    }
    let seg = ip.segments();
    // fe80::/10
    if (seg[0] & 0xffc0) == 0xfe80 {
        return true;
    }
    // fc00::/7
    if (seg[0] & 0xfe00) == 0xfc00 {
        return true;
    }
    if let Some(v4) = ip.to_ipv4_mapped() {
        return ipv4_blocked(v4);
    }
    false
}

fn ip_blocked(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => ipv4_blocked(v4),
        IpAddr::V6(v6) => ipv6_blocked(v6),
    }
}

/// Resolve `host` and check every resolved address plus the port against
/// the allow-list. Literal `localhost` is rejected outright regardless of
/// whether it resolves.
pub async fn is_target_allowed(host: &str, port: u16) -> Result<(), AllowlistError> {
    if !port_allowed(port) {
        return Err(AllowlistError::BlockedPort(port));
    }
    if host.eq_ignore_ascii_case("localhost") {
        return Err(AllowlistError::BlockedHost(host.to_string()));
    }

    if let Ok(ip) = host.parse::<IpAddr>() {
        return if ip_blocked(ip) {
            Err(AllowlistError::BlockedAddress(ip))
        } else {
            Ok(())
        };
    }

    // Resolve the hostname; block if any resolved address is disallowed.
    let lookup = format!("{host}:{port}");
    match tokio::net::lookup_host(lookup).await {
        Ok(addrs) => {
            let mut any = false;
            for addr in addrs {
                any = true;
                if ip_blocked(addr.ip()) {
                    return Err(AllowlistError::BlockedAddress(addr.ip()));
                }
            }
            if !any {
                Err(AllowlistError::ResolutionFailed(format!("no addresses for {host}")))
            } else {
                Ok(())
            }
        }
        Err(e) => Err(AllowlistError::ResolutionFailed(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_loopback_v4() {
        assert!(ipv4_blocked("127.0.0.1".parse().unwrap()));
    }

    #[test]
    fn blocks_private_ranges() {
        assert!(ipv4_blocked("10.0.0.5".parse().unwrap()));
        assert!(ipv4_blocked("172.16.0.1".parse().unwrap()));
        assert!(ipv4_blocked("192.168.1.1".parse().unwrap()));
        assert!(ipv4_blocked("169.254.1.1".parse().unwrap()));
        assert!(ipv4_blocked("100.64.0.1".parse().unwrap()));
    }

    #[test]
    fn allows_public_v4() {
        assert!(!ipv4_blocked("93.184.216.34".parse().unwrap()));
        assert!(!ipv4_blocked("8.8.8.8".parse().unwrap()));
    }

    #[test]
    fn blocks_ipv6_loopback_and_link_local() {
        assert!(ipv6_blocked("::1".parse().unwrap()));
        assert!(ipv6_blocked("::".parse().unwrap()));
        assert!(ipv6_blocked("fe80::1".parse().unwrap()));
        assert!(ipv6_blocked("fc00::1".parse().unwrap()));
    }

    #[test]
    fn port_allowlist_covers_http_https_and_high_ports() {
        assert!(port_allowed(80));
        assert!(port_allowed(443));
        assert!(port_allowed(8080));
        assert!(!port_allowed(22));
        assert!(!port_allowed(1023));
    }

    #[tokio::test]
    async fn literal_localhost_is_rejected() {
        let res = is_target_allowed("localhost", 8080).await;
        assert!(matches!(res, Err(AllowlistError::BlockedHost(_))));
    }

    #[tokio::test]
    async fn literal_loopback_ip_is_rejected() {
        let res = is_target_allowed("127.0.0.1", 8080).await;
        assert!(matches!(res, Err(AllowlistError::BlockedAddress(_))));
    }
}
