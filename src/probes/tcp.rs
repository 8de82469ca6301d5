//! TCP probe executor. Grounded in the teacher's `checker.rs::execute_tcp_check`,
//! generalized with `[host]:port` IPv6 parsing and the shared SSRF allow-list.

use std::time::Duration;

use tokio::net::TcpStream;

use super::{is_target_allowed, CheckOutcome, CheckStatus};

/// Split `host:port` or `[addr]:port` into its parts.
fn split_target(target: &str) -> Option<(&str, u16)> {
    if let Some(rest) = target.strip_prefix('[') {
        let (host, after) = rest.split_once(']')?;
        let port_str = after.strip_prefix(':')?;
        let port: u16 = port_str.parse().ok()?;
        return Some((host, port));
    }
    let (host, port_str) = target.rsplit_once(':')?;
    let port: u16 = port_str.parse().ok()?;
    Some((host, port))
}

pub async fn execute(target: &str, timeout_ms: u32) -> CheckOutcome {
    let (host, port) = match split_target(target) {
        Some(hp) => hp,
        None => return CheckOutcome::config_error(format!("invalid tcp target: {target}")),
    };

    if let Err(e) = is_target_allowed(host, port).await {
        return CheckOutcome { status: CheckStatus::Down, latency_ms: None, http_status: None, error: Some(e.to_string()), attempts: 1 };
    }

    let dial_target = if host.contains(':') { format!("[{host}]:{port}") } else { format!("{host}:{port}") };
    let start = std::time::Instant::now();
    let result = tokio::time::timeout(Duration::from_millis(timeout_ms as u64), TcpStream::connect(&dial_target)).await;
    let elapsed_ms = start.elapsed().as_millis() as u32;

    match result {
        Ok(Ok(_stream)) => CheckOutcome { status: CheckStatus::Up, latency_ms: Some(elapsed_ms), http_status: None, error: None, attempts: 1 },
        Ok(Err(e)) => {
            let reason = if e.kind() == std::io::ErrorKind::ConnectionRefused {
                "connection refused".to_string()
            } else {
                format!("connect failed: {e}")
            };
            CheckOutcome { status: CheckStatus::Down, latency_ms: None, http_status: None, error: Some(reason), attempts: 1 }
        }
        Err(_) => CheckOutcome { status: CheckStatus::Down, latency_ms: None, http_status: None, error: Some("timeout".to_string()), attempts: 1 },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_host_port() {
        assert_eq!(split_target("example.com:443"), Some(("example.com", 443)));
    }

    #[test]
    fn parses_bracketed_ipv6() {
        assert_eq!(split_target("[::1]:8080"), Some(("::1", 8080)));
    }

    #[test]
    fn rejects_missing_port() {
        assert_eq!(split_target("example.com"), None);
    }

    #[tokio::test]
    async fn blocked_target_reports_down() {
        let outcome = execute("127.0.0.1:9999", 500).await;
        assert_eq!(outcome.status, CheckStatus::Down);
    }
}
