//! HTTP probe executor. Grounded in the teacher's `checker.rs::execute_http_check`,
//! generalized with the SSRF allow-list, redirect cap, and keyword matching
//! from spec §4.2.

use std::time::Duration;

use super::{is_target_allowed, CheckOutcome, CheckStatus};

pub struct HttpProbeInput<'a> {
    pub url: &'a str,
    pub method: &'a str,
    pub headers: Option<&'a serde_json::Value>,
    pub body: Option<&'a str>,
    pub timeout_ms: u32,
    pub expected_status: Option<&'a [u16]>,
    pub response_keyword: Option<&'a str>,
    pub response_forbidden_keyword: Option<&'a str>,
}

const MAX_REDIRECTS: usize = 5;

fn classify_status(expected: Option<&[u16]>, code: u16) -> bool {
    match expected {
        Some(set) => set.contains(&code),
        None => (200..300).contains(&code),
    }
}

/// Run one HTTP check under `input.timeout_ms`. Never panics or bubbles
/// network errors up as exceptions — they become `down` outcomes.
pub async fn execute(input: HttpProbeInput<'_>) -> CheckOutcome {
    let parsed = match reqwest::Url::parse(input.url) {
        Ok(u) => u,
        Err(e) => return CheckOutcome::config_error(format!("invalid url: {e}")),
    };

    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return CheckOutcome::config_error(format!("unsupported scheme: {}", parsed.scheme()));
    }
    let host = match parsed.host_str() {
        Some(h) if !h.is_empty() => h,
        _ => return CheckOutcome::config_error("empty hostname"),
    };
    let port = parsed.port_or_known_default().unwrap_or(80);

    if let Err(e) = is_target_allowed(host, port).await {
        return CheckOutcome { status: CheckStatus::Down, latency_ms: None, http_status: None, error: Some(e.to_string()), attempts: 1 };
    }

    let method = match input.method.to_uppercase().as_str() {
        "GET" => reqwest::Method::GET,
        "HEAD" => reqwest::Method::HEAD,
        "POST" => reqwest::Method::POST,
        other => return CheckOutcome::config_error(format!("unsupported method: {other}")),
    };

    let redirect_policy = if method == reqwest::Method::HEAD {
        reqwest::redirect::Policy::none()
    } else {
        reqwest::redirect::Policy::limited(MAX_REDIRECTS)
    };

    let client = match reqwest::Client::builder()
        .redirect(redirect_policy)
        .timeout(Duration::from_millis(input.timeout_ms as u64))
        .build()
    {
        Ok(c) => c,
        Err(e) => return CheckOutcome::config_error(format!("failed to build http client: {e}")),
    };

    let mut req = client.request(method, parsed.clone());
    if let Some(headers) = input.headers {
        if let Some(obj) = headers.as_object() {
            for (k, v) in obj {
                if let Some(val) = v.as_str() {
                    req = req.header(k.as_str(), val);
                }
            }
        }
    }
    if let Some(body) = input.body {
        req = req.body(body.to_string());
    }

    let start = std::time::Instant::now();
    let result = req.send().await;
    let elapsed_ms = start.elapsed().as_millis() as u32;

    match result {
        Err(e) => {
            let reason = if e.is_timeout() {
                "timeout".to_string()
            } else if e.is_connect() {
                "connection refused".to_string()
            } else if e.is_redirect() {
                format!("redirect error: {e}")
            } else {
                format!("request failed: {e}")
            };
            CheckOutcome { status: CheckStatus::Down, latency_ms: None, http_status: None, error: Some(reason), attempts: 1 }
        }
        Ok(resp) => {
            let code = resp.status().as_u16();
            if !classify_status(input.expected_status, code) {
                return CheckOutcome {
                    status: CheckStatus::Down,
                    latency_ms: None,
                    http_status: Some(code),
                    error: Some(format!("status {code}")),
                    attempts: 1,
                };
            }

            let needs_body = input.response_keyword.is_some() || input.response_forbidden_keyword.is_some();
            if needs_body {
                let text = match resp.text().await {
                    Ok(t) => t,
                    Err(e) => {
                        return CheckOutcome {
                            status: CheckStatus::Down,
                            latency_ms: None,
                            http_status: Some(code),
                            error: Some(format!("failed to read body: {e}")),
                            attempts: 1,
                        }
                    }
                };
                if let Some(kw) = input.response_keyword {
                    if !text.contains(kw) {
                        return CheckOutcome {
                            status: CheckStatus::Down,
                            latency_ms: None,
                            http_status: Some(code),
                            error: Some("missing keyword".to_string()),
                            attempts: 1,
                        };
                    }
                }
                if let Some(kw) = input.response_forbidden_keyword {
                    if text.contains(kw) {
                        return CheckOutcome {
                            status: CheckStatus::Down,
                            latency_ms: None,
                            http_status: Some(code),
                            error: Some("forbidden keyword present".to_string()),
                            attempts: 1,
                        };
                    }
                }
            }

            CheckOutcome { status: CheckStatus::Up, latency_ms: Some(elapsed_ms), http_status: Some(code), error: None, attempts: 1 }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_status_defaults_to_2xx() {
        assert!(classify_status(None, 200));
        assert!(classify_status(None, 299));
        assert!(!classify_status(None, 300));
        assert!(!classify_status(None, 199));
    }

    #[test]
    fn classify_status_matches_expected_literal() {
        assert!(classify_status(Some(&[404]), 404));
        assert!(!classify_status(Some(&[404]), 200));
        assert!(classify_status(Some(&[200, 301]), 301));
    }

    #[tokio::test]
    async fn invalid_scheme_is_a_config_error() {
        let input = HttpProbeInput {
            url: "ftp://example.com",
            method: "GET",
            headers: None,
            body: None,
            timeout_ms: 1000,
            expected_status: None,
            response_keyword: None,
            response_forbidden_keyword: None,
        };
        let outcome = execute(input).await;
        assert_eq!(outcome.status, CheckStatus::Unknown);
    }

    #[tokio::test]
    async fn blocked_target_is_reported_down_not_unknown() {
        let input = HttpProbeInput {
            url: "http://127.0.0.1:8080/",
            method: "GET",
            headers: None,
            body: None,
            timeout_ms: 1000,
            expected_status: None,
            response_keyword: None,
            response_forbidden_keyword: None,
        };
        let outcome = execute(input).await;
        assert_eq!(outcome.status, CheckStatus::Down);
        assert!(outcome.error.unwrap().contains("blocked"));
    }
}
