//! URL fetch server — `scrape_url` with strict safety limits.
//!
//! Safety properties:
//! - http/https schemes only
//! - every resolved address must be public: loopback, RFC 1918 (plus the
//!   whole 172/8 block), link-local/metadata, CGNAT, and unspecified
//!   ranges are rejected before any request is made
//! - hard response-size and extracted-text caps
//! - redirect limit (5 hops)

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, ToSocketAddrs};
use std::time::Duration;

use futures_util::StreamExt;
use serde_json::{json, Value};

use trellis_domain::config::FetchConfig;
use trellis_domain::error::{Error, Result};
use trellis_domain::tool::{CommandPattern, ToolDescriptor, ToolResult};

use crate::server::{CallContext, ToolServer};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SSRF validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Returns `true` for addresses in private, loopback, link-local, or
/// otherwise non-public ranges.
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()                        // 127.0.0.0/8
                || v4.is_private()                  // 10/8, 172.16/12, 192.168/16
                || v4.octets()[0] == 172            // the full 172/8 block is off-limits
                || v4.is_link_local()               // 169.254/16 (cloud metadata)
                || v4.is_broadcast()
                || v4.is_unspecified()
                || is_v4_shared_address(v4)         // 100.64/10 (CGNAT)
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unspecified()
                || is_v6_unique_local(v6)           // fc00::/7
                || is_v6_link_local(v6)             // fe80::/10
        }
    }
}

/// 100.64.0.0/10 — shared address space (RFC 6598 / CGNAT).
fn is_v4_shared_address(ip: &Ipv4Addr) -> bool {
    let octets = ip.octets();
    octets[0] == 100 && (octets[1] & 0xC0) == 64
}

fn is_v6_unique_local(ip: &Ipv6Addr) -> bool {
    (ip.segments()[0] & 0xFE00) == 0xFC00
}

fn is_v6_link_local(ip: &Ipv6Addr) -> bool {
    (ip.segments()[0] & 0xFFC0) == 0xFE80
}

/// Validate a URL before making a request.
///
/// Rejects non-http(s) schemes, hostless URLs, and hosts whose resolved
/// addresses include anything non-public. No network I/O happens for a
/// rejected URL beyond DNS resolution itself.
pub fn validate_url(raw_url: &str) -> std::result::Result<(), String> {
    let parsed = reqwest::Url::parse(raw_url).map_err(|e| format!("invalid URL: {e}"))?;

    match parsed.scheme() {
        "http" | "https" => {}
        other => return Err(format!("blocked scheme: {other}:// (only http/https allowed)")),
    }

    let host = parsed
        .host_str()
        .ok_or_else(|| "URL has no host".to_string())?;
    let port = parsed.port_or_known_default().unwrap_or(80);

    // Literal IPs skip DNS.
    if let Ok(ip) = host.trim_matches(['[', ']']).parse::<IpAddr>() {
        if is_private_ip(&ip) {
            return Err(format!("blocked request to private/internal address: {ip}"));
        }
        return Ok(());
    }

    let addrs: Vec<_> = format!("{host}:{port}")
        .to_socket_addrs()
        .map_err(|e| format!("DNS resolution failed for {host}: {e}"))?
        .collect();

    if addrs.is_empty() {
        return Err(format!("DNS resolution returned no addresses for {host}"));
    }

    for addr in &addrs {
        if is_private_ip(&addr.ip()) {
            return Err(format!(
                "blocked request to private/internal address: {host} resolves to {}",
                addr.ip()
            ));
        }
    }

    Ok(())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// HTML → text
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Strip tags, drop script/style bodies, decode common entities, and
/// collapse whitespace. Bounded by `max_chars`.
fn html_to_text(html: &str, max_chars: usize) -> String {
    let mut out = String::new();
    let mut in_tag = false;
    let mut in_script = false;
    let mut in_style = false;
    let mut tag_buf = String::new();

    for ch in html.chars() {
        if out.chars().count() >= max_chars {
            break;
        }

        match ch {
            '<' => {
                in_tag = true;
                tag_buf.clear();
            }
            '>' if in_tag => {
                in_tag = false;
                let tag_lower = tag_buf.to_lowercase();

                if tag_lower.starts_with("script") {
                    in_script = true;
                } else if tag_lower.starts_with("/script") {
                    in_script = false;
                } else if tag_lower.starts_with("style") {
                    in_style = true;
                } else if tag_lower.starts_with("/style") {
                    in_style = false;
                }

                if tag_lower.starts_with('/')
                    && matches!(
                        tag_lower.trim_start_matches('/'),
                        "p" | "div" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6"
                            | "li" | "tr" | "article" | "section" | "blockquote"
                    )
                {
                    if !out.ends_with('\n') {
                        out.push('\n');
                    }
                } else if tag_lower == "br" || tag_lower == "br/" {
                    out.push('\n');
                }

                tag_buf.clear();
            }
            _ if in_tag => tag_buf.push(ch),
            _ if in_script || in_style => {}
            _ => out.push(ch),
        }
    }

    let out = out
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ");

    let mut result = String::new();
    let mut prev_blank = false;
    for line in out.lines() {
        let trimmed = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if trimmed.is_empty() {
            if !prev_blank {
                result.push('\n');
                prev_blank = true;
            }
        } else {
            result.push_str(&trimmed);
            result.push('\n');
            prev_blank = false;
        }
    }

    result.trim().to_string()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Server
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The `fetch` tool server, owning one tool: `scrape_url`.
pub struct FetchServer {
    client: reqwest::Client,
    config: FetchConfig,
}

impl FetchServer {
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| Error::Http(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    async fn scrape(&self, url: &str) -> Result<ToolResult> {
        if let Err(reason) = validate_url(url) {
            return Ok(ToolResult::error(format!("URL rejected: {reason}")));
        }

        let resp = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, "trellis/0.1 (+orchestrator)")
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = resp.status().as_u16();
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        // Stream the body with a hard byte cap.
        let mut stream = resp.bytes_stream();
        let mut buf: Vec<u8> = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| Error::Http(e.to_string()))?;
            if buf.len() + chunk.len() > self.config.max_bytes {
                return Ok(ToolResult::error(format!(
                    "response exceeded {} byte limit",
                    self.config.max_bytes
                )));
            }
            buf.extend_from_slice(&chunk);
        }

        let body = String::from_utf8_lossy(&buf);
        let text = if content_type.contains("html") {
            html_to_text(&body, self.config.max_text_chars)
        } else {
            body.chars().take(self.config.max_text_chars).collect()
        };

        Ok(ToolResult::text(text).with_metadata(json!({
            "url": url,
            "status": status,
            "content_type": content_type,
            "bytes": buf.len(),
        })))
    }
}

#[async_trait::async_trait]
impl ToolServer for FetchServer {
    fn name(&self) -> &str {
        "fetch"
    }

    fn descriptors(&self) -> Vec<ToolDescriptor> {
        vec![ToolDescriptor {
            name: "scrape_url".into(),
            description: "Fetch a public http(s) URL and return its readable text.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "url": { "type": "string", "description": "URL to fetch" }
                },
                "required": ["url"]
            }),
        }]
    }

    fn patterns(&self) -> Vec<CommandPattern> {
        vec![CommandPattern {
            id: "scrape-url".into(),
            pattern: r"^scrape\s+(https?://\S+)$".into(),
            flags: "i".into(),
            tool: "scrape_url".into(),
            parameter_mapping: std::collections::HashMap::from([("url".into(), 1)]),
            description: "Fetch a page when the message is exactly 'scrape <url>'".into(),
            examples: vec!["scrape https://example.com/page".into()],
            confidence: 0.85,
            server: String::new(),
        }]
    }

    fn call_timeout(&self, _tool: &str) -> Duration {
        Duration::from_secs(self.config.timeout_secs + 3)
    }

    async fn call(&self, tool: &str, args: &Value, _ctx: &CallContext) -> Result<ToolResult> {
        match tool {
            "scrape_url" => {
                let url = args["url"].as_str().unwrap_or_default();
                self.scrape(url).await
            }
            other => Err(Error::Validation(format!("fetch server has no tool {other}"))),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    // ── SSRF validation ────────────────────────────────────────────

    #[test]
    fn rejects_loopback_v4() {
        assert!(is_private_ip(&"127.0.0.1".parse::<IpAddr>().unwrap()));
        let err = validate_url("http://127.0.0.1:8080/x").unwrap_err();
        assert!(err.contains("private"));
    }

    #[test]
    fn rejects_rfc1918_ranges() {
        assert!(is_private_ip(&"10.0.0.1".parse::<IpAddr>().unwrap()));
        assert!(is_private_ip(&"192.168.1.1".parse::<IpAddr>().unwrap()));
        assert!(is_private_ip(&"172.16.0.1".parse::<IpAddr>().unwrap()));
    }

    #[test]
    fn rejects_entire_172_block() {
        assert!(is_private_ip(&"172.5.0.1".parse::<IpAddr>().unwrap()));
        assert!(is_private_ip(&"172.200.1.1".parse::<IpAddr>().unwrap()));
    }

    #[test]
    fn rejects_metadata_and_cgnat() {
        assert!(is_private_ip(&"169.254.169.254".parse::<IpAddr>().unwrap()));
        assert!(is_private_ip(&"100.64.0.1".parse::<IpAddr>().unwrap()));
    }

    #[test]
    fn rejects_v6_internal_ranges() {
        assert!(is_private_ip(&"::1".parse::<IpAddr>().unwrap()));
        assert!(is_private_ip(&"fd12:3456:789a::1".parse::<IpAddr>().unwrap()));
        assert!(is_private_ip(&"fe80::1".parse::<IpAddr>().unwrap()));
    }

    #[test]
    fn allows_public_addresses() {
        assert!(!is_private_ip(&"8.8.8.8".parse::<IpAddr>().unwrap()));
        assert!(!is_private_ip(&"1.1.1.1".parse::<IpAddr>().unwrap()));
        assert!(!is_private_ip(
            &"2607:f8b0:4004:800::200e".parse::<IpAddr>().unwrap()
        ));
    }

    #[test]
    fn rejects_non_http_schemes() {
        for url in [
            "file:///etc/passwd",
            "ftp://example.com/file",
            "gopher://evil.com/",
            "data:text/html,<h1>hi</h1>",
        ] {
            let err = validate_url(url).unwrap_err();
            assert!(err.contains("blocked scheme"), "url {url}: {err}");
        }
    }

    #[test]
    fn rejects_localhost_hostname() {
        let err = validate_url("http://localhost/admin").unwrap_err();
        assert!(err.contains("private") || err.contains("blocked"));
    }

    #[test]
    fn rejects_ipv6_loopback_literal() {
        let err = validate_url("http://[::1]/admin").unwrap_err();
        assert!(err.contains("private"));
    }

    #[test]
    fn rejects_garbage_urls() {
        assert!(validate_url("not a url at all").is_err());
        assert!(validate_url("http:///path").is_err());
    }

    // ── Scrape behavior ────────────────────────────────────────────

    #[tokio::test]
    async fn scrape_of_blocked_url_makes_no_request_and_errors() {
        let server = FetchServer::new(FetchConfig::default()).unwrap();
        let result = server.scrape("http://127.0.0.1:8080/x").await.unwrap();
        assert!(result.is_error);
        assert!(result.joined_text().contains("URL rejected"));
    }

    // ── HTML extraction ────────────────────────────────────────────

    #[test]
    fn html_to_text_strips_tags_and_scripts() {
        let html =
            "<html><body><h1>Hello</h1><p>World</p><script>var x=1;</script></body></html>";
        let text = html_to_text(html, 10_000);
        assert!(text.contains("Hello"));
        assert!(text.contains("World"));
        assert!(!text.contains("var x=1"));
    }

    #[test]
    fn html_to_text_decodes_entities() {
        let text = html_to_text("<p>A &amp; B &lt; C</p>", 10_000);
        assert!(text.contains("A & B < C"));
    }

    #[test]
    fn html_to_text_respects_char_limit() {
        let text = html_to_text("<p>This is a very long text that should be cut</p>", 10);
        assert!(text.chars().count() <= 15);
    }
}
