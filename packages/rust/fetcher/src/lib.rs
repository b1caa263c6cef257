//! HTTP page fetcher for candidate sources.
//!
//! Fetches a single URL, refuses private/loopback targets, enforces a body
//! size limit while streaming, and normalizes the body to Markdown text via
//! `webresolve-markdown`. Every failure surfaces as
//! [`WebResolveError::Fetch`] so the resolution loop can skip the candidate.

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, instrument, warn};
use url::Url;

use webresolve_shared::{FetchConfig, PageFetcher, Result, WebResolveError};

// ---------------------------------------------------------------------------
// FetchedPage
// ---------------------------------------------------------------------------

/// A fetched page and its normalized text.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// URL after redirects.
    pub final_url: String,
    /// HTTP status code.
    pub status_code: u16,
    /// `Content-Type` header, if any.
    pub content_type: Option<String>,
    /// Page title, when the body was HTML.
    pub title: Option<String>,
    /// Normalized text handed to the evaluator.
    pub text: String,
}

// ---------------------------------------------------------------------------
// HttpPageFetcher
// ---------------------------------------------------------------------------

/// Fetches pages over HTTP(S) with reqwest.
pub struct HttpPageFetcher {
    client: Client,
    max_response_bytes: u64,
    /// Allow localhost/private IPs (for integration tests with mock servers).
    allow_private_hosts: bool,
}

impl HttpPageFetcher {
    /// Create a new fetcher with the given configuration.
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let allow_private_hosts = config.allow_private_hosts;
        let max_redirects = config.max_redirects;

        // Redirects are re-checked so a public URL cannot bounce into a private network.
        let redirect_policy = reqwest::redirect::Policy::custom(move |attempt| {
            if attempt.previous().len() >= max_redirects {
                attempt.error("too many redirects")
            } else if !allow_private_hosts && is_ssrf_target(attempt.url()) {
                attempt.error("redirect to a private address blocked")
            } else {
                attempt.follow()
            }
        });

        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .redirect(redirect_policy)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| WebResolveError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            max_response_bytes: config.max_response_bytes,
            allow_private_hosts,
        })
    }

    /// Fetch `url` and normalize its body.
    #[instrument(skip(self))]
    pub async fn fetch_page(&self, url: &str) -> Result<FetchedPage> {
        let parsed =
            Url::parse(url).map_err(|e| WebResolveError::fetch(url, format!("invalid URL: {e}")))?;

        if !self.allow_private_hosts && is_ssrf_target(&parsed) {
            warn!(%url, "SSRF protection: blocked");
            return Err(WebResolveError::fetch(url, "private or non-HTTP address blocked"));
        }

        debug!(%url, "fetching page");

        let response = self
            .client
            .get(parsed.as_str())
            .send()
            .await
            .map_err(|e| WebResolveError::fetch(url, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(WebResolveError::fetch(url, format!("HTTP {status}")));
        }

        if let Some(len) = response.content_length() {
            if len > self.max_response_bytes {
                return Err(WebResolveError::fetch(
                    url,
                    format!("response too large ({len} bytes, max {})", self.max_response_bytes),
                ));
            }
        }

        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_ascii_lowercase());

        if let Some(ct) = content_type.as_deref() {
            if is_binary_content_type(ct) {
                return Err(WebResolveError::fetch(
                    url,
                    format!("unsupported content type: {ct}"),
                ));
            }
        }

        let body = read_capped_body(url, response, self.max_response_bytes).await?;

        let is_html = content_type.as_deref().is_some_and(|ct| ct.contains("html"))
            || webresolve_markdown::looks_like_html(&body);

        let (text, title) = if is_html {
            let page = webresolve_markdown::html_to_markdown(&body, Some(&final_url))
                .map_err(|e| WebResolveError::fetch(url, e.to_string()))?;
            (page.markdown, page.title)
        } else {
            (body, None)
        };

        if text.trim().is_empty() {
            return Err(WebResolveError::fetch(url, "page has no text content"));
        }

        debug!(%url, status = status.as_u16(), text_len = text.len(), "page fetched");

        Ok(FetchedPage {
            final_url,
            status_code: status.as_u16(),
            content_type,
            title,
            text,
        })
    }
}

/// Read the body chunk by chunk, failing as soon as it exceeds `limit` bytes.
///
/// `Content-Length` is only a hint; chunked responses carry none.
async fn read_capped_body(
    url: &str,
    mut response: reqwest::Response,
    limit: u64,
) -> Result<String> {
    let mut buf: Vec<u8> = Vec::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| WebResolveError::fetch(url, format!("body read failed: {e}")))?
    {
        let read = (buf.len() + chunk.len()) as u64;
        if read > limit {
            return Err(WebResolveError::fetch(
                url,
                format!("response too large (over {limit} bytes after {read} read)"),
            ));
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        Ok(self.fetch_page(url).await?.text)
    }
}

/// Content types that cannot be turned into text.
fn is_binary_content_type(content_type: &str) -> bool {
    let mime = content_type.split(';').next().unwrap_or("").trim();
    mime.starts_with("image/")
        || mime.starts_with("audio/")
        || mime.starts_with("video/")
        || matches!(
            mime,
            "application/pdf" | "application/octet-stream" | "application/zip"
        )
}

// ---------------------------------------------------------------------------
// SSRF protection
// ---------------------------------------------------------------------------

/// Check if a URL targets a potentially dangerous resource.
fn is_ssrf_target(url: &Url) -> bool {
    match url.scheme() {
        "http" | "https" => {}
        _ => return true,
    }

    match url.host() {
        Some(url::Host::Ipv4(v4)) => is_private_ip(&IpAddr::V4(v4)),
        Some(url::Host::Ipv6(v6)) => is_private_ip(&IpAddr::V6(v6)),
        Some(url::Host::Domain(host)) => {
            host == "localhost"
                || host.ends_with(".localhost")
                || host.ends_with(".local")
                || host.ends_with(".internal")
        }
        None => true,
    }
}

/// Check if an IP is in a private/reserved range.
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                // 100.64.0.0/10 (Carrier-grade NAT)
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xC0) == 64)
                // 192.0.0.0/24
                || (v4.octets()[0] == 192 && v4.octets()[1] == 0 && v4.octets()[2] == 0)
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unspecified()
                // fc00::/7 (unique local)
                || (v6.segments()[0] & 0xfe00) == 0xfc00
                // fe80::/10 (link local)
                || (v6.segments()[0] & 0xffc0) == 0xfe80
                || v6.to_ipv4_mapped().is_some_and(|v4| is_private_ip(&IpAddr::V4(v4)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_fetcher() -> HttpPageFetcher {
        let config = FetchConfig {
            timeout_secs: 5,
            allow_private_hosts: true,
            ..FetchConfig::default()
        };
        HttpPageFetcher::new(&config).unwrap()
    }

    #[test]
    fn ssrf_protection_blocks_file() {
        let url = Url::parse("file:///etc/passwd").unwrap();
        assert!(is_ssrf_target(&url));
    }

    #[test]
    fn ssrf_protection_blocks_private_ip() {
        for raw in [
            "http://192.168.1.1/admin",
            "http://10.0.0.1/",
            "http://127.0.0.1:8080/",
            "http://[::1]/",
            "http://[fd00::1]/",
            "http://100.64.0.1/",
        ] {
            let url = Url::parse(raw).unwrap();
            assert!(is_ssrf_target(&url), "{raw} should be blocked");
        }
    }

    #[test]
    fn ssrf_blocks_localhost() {
        let url = Url::parse("http://localhost:3000/api").unwrap();
        assert!(is_ssrf_target(&url));
    }

    #[test]
    fn ssrf_protection_allows_public() {
        let url = Url::parse("https://en.wikipedia.org/wiki/Mercedes_Sosa").unwrap();
        assert!(!is_ssrf_target(&url));
    }

    #[test]
    fn binary_content_types() {
        assert!(is_binary_content_type("application/pdf"));
        assert!(is_binary_content_type("image/png"));
        assert!(is_binary_content_type("application/octet-stream; charset=binary"));
        assert!(!is_binary_content_type("text/html; charset=utf-8"));
        assert!(!is_binary_content_type("application/json"));
    }

    #[tokio::test]
    async fn fetch_html_is_normalized() {
        let server = MockServer::start().await;
        let page = r#"<html><head><title>Discography</title></head><body>
            <nav><a href="/">Home</a></nav>
            <main><h1>Studio albums</h1><p>Between 2000 and 2009 she released 3 albums.</p></main>
        </body></html>"#;

        Mock::given(method("GET"))
            .and(path("/discography"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html; charset=utf-8")
                    .set_body_string(page),
            )
            .mount(&server)
            .await;

        let fetcher = test_fetcher();
        let fetched = fetcher
            .fetch_page(&format!("{}/discography", server.uri()))
            .await
            .unwrap();

        assert_eq!(fetched.status_code, 200);
        assert_eq!(fetched.title.as_deref(), Some("Discography"));
        assert!(fetched.text.contains("# Studio albums"));
        assert!(fetched.text.contains("released 3 albums"));
        assert!(!fetched.text.contains("<p>"));
    }

    #[tokio::test]
    async fn fetch_plain_text_passes_through() {
        let server = MockServer::start().await;
        Mock::given(path("/notes.txt"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/plain")
                    .set_body_string("The answer is 42."),
            )
            .mount(&server)
            .await;

        let text = test_fetcher()
            .fetch(&format!("{}/notes.txt", server.uri()))
            .await
            .unwrap();
        assert_eq!(text, "The answer is 42.");
    }

    #[tokio::test]
    async fn non_success_status_is_fetch_error() {
        let server = MockServer::start().await;
        Mock::given(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = test_fetcher()
            .fetch(&format!("{}/missing", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, WebResolveError::Fetch { .. }));
        assert!(err.to_string().contains("404"));
        assert!(err.is_recoverable());
    }

    #[tokio::test]
    async fn binary_body_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(path("/paper.pdf"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/pdf")
                    .set_body_bytes(b"%PDF-1.7".to_vec()),
            )
            .mount(&server)
            .await;

        let err = test_fetcher()
            .fetch(&format!("{}/paper.pdf", server.uri()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unsupported content type"));
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(path("/huge"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(2048)))
            .mount(&server)
            .await;

        let config = FetchConfig {
            max_response_bytes: 1024,
            allow_private_hosts: true,
            ..FetchConfig::default()
        };
        let err = HttpPageFetcher::new(&config)
            .unwrap()
            .fetch(&format!("{}/huge", server.uri()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("too large"));
    }

    /// Serve one chunked response without `Content-Length` on a raw socket.
    async fn serve_chunked(chunks: usize, chunk_size: usize) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await;

            let head = "HTTP/1.1 200 OK\r\ncontent-type: text/plain\r\ntransfer-encoding: chunked\r\nconnection: close\r\n\r\n";
            if socket.write_all(head.as_bytes()).await.is_err() {
                return;
            }
            let chunk = format!("{chunk_size:x}\r\n{}\r\n", "y".repeat(chunk_size));
            for _ in 0..chunks {
                if socket.write_all(chunk.as_bytes()).await.is_err() {
                    return;
                }
            }
            let _ = socket.write_all(b"0\r\n\r\n").await;
        });
        format!("http://{addr}/stream")
    }

    fn capped_fetcher(max_response_bytes: u64) -> HttpPageFetcher {
        let config = FetchConfig {
            max_response_bytes,
            allow_private_hosts: true,
            timeout_secs: 5,
            ..FetchConfig::default()
        };
        HttpPageFetcher::new(&config).unwrap()
    }

    #[tokio::test]
    async fn chunked_body_over_limit_is_rejected() {
        let url = serve_chunked(8, 512).await;

        let err = capped_fetcher(1024).fetch(&url).await.unwrap_err();

        assert!(matches!(err, WebResolveError::Fetch { .. }));
        assert!(err.to_string().contains("too large"));
    }

    #[tokio::test]
    async fn chunked_body_within_limit_is_read() {
        let url = serve_chunked(2, 100).await;

        let text = capped_fetcher(1024).fetch(&url).await.unwrap();

        assert_eq!(text, "y".repeat(200));
    }

    #[tokio::test]
    async fn empty_page_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(path("/blank"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html")
                    .set_body_string("<html><body><script>app()</script></body></html>"),
            )
            .mount(&server)
            .await;

        let err = test_fetcher()
            .fetch(&format!("{}/blank", server.uri()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no text content"));
    }

    #[tokio::test]
    async fn private_hosts_blocked_by_default() {
        let server = MockServer::start().await;
        let fetcher = HttpPageFetcher::new(&FetchConfig::default()).unwrap();

        let err = fetcher.fetch(&server.uri()).await.unwrap_err();
        assert!(err.to_string().contains("blocked"));
        // The request never reached the server.
        assert!(server.received_requests().await.unwrap_or_default().is_empty());
    }

    #[tokio::test]
    async fn invalid_url_is_fetch_error() {
        let err = test_fetcher().fetch("not a url").await.unwrap_err();
        assert!(matches!(err, WebResolveError::Fetch { .. }));
    }
}
