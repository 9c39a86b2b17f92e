//! HTTP seam shared by the gateway and the fetcher.
//!
//! Everything that touches the network goes through [`HttpTransport`], so the
//! fallback chains can be exercised against [`MockTransport`] without sockets.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Head,
    Put,
    Delete,
}

impl HttpMethod {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => Self::GET,
            HttpMethod::Head => Self::HEAD,
            HttpMethod::Put => Self::PUT,
            HttpMethod::Delete => Self::DELETE,
        }
    }
}

/// Ordered header pairs; lookups ignore ASCII case.
pub type HttpHeaders = Vec<(String, String)>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: HttpHeaders,
    pub body: Vec<u8>,
}

impl HttpRequest {
    #[must_use]
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HttpHeaders::new(),
            body: Vec::new(),
        }
    }

    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    #[must_use]
    pub fn head(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Head, url)
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HttpHeaders,
    pub body: Vec<u8>,
}

impl HttpResponse {
    #[must_use]
    pub fn with_status(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: HttpHeaders::new(),
            body: body.into(),
        }
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        header_get(&self.headers, name)
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body as text; invalid UTF-8 is replaced rather than rejected.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("network error: {0}")]
    Network(String),

    #[error("no route for {method} {url}")]
    Unrouted { method: String, url: String },
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError>;
}

/// First value for `name`, compared without regard to ASCII case.
#[must_use]
pub fn header_get<'a>(headers: &'a HttpHeaders, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find_map(|(key, value)| key.eq_ignore_ascii_case(name).then_some(value.as_str()))
}

/// Append `t=<millis>` so CDN and proxy caches are bypassed.
#[must_use]
pub fn cache_busted(url: &str) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}t={}", chrono::Utc::now().timestamp_millis())
}

/// Inverse of [`cache_busted`]: drops `t=` pairs and keeps the rest of the query.
#[must_use]
pub fn strip_cache_buster(url: &str) -> String {
    let Some((base, query)) = url.split_once('?') else {
        return url.to_string();
    };
    let rest = query
        .split('&')
        .filter(|pair| !pair.starts_with("t="))
        .collect::<Vec<_>>()
        .join("&");
    if rest.is_empty() {
        base.to_string()
    } else {
        format!("{base}?{rest}")
    }
}

/// Percent-encode a value for use inside a query string.
#[must_use]
pub fn encode_component(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// Production transport.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Client with an overall per-request timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self, HttpError> {
        reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map(Self::new)
            .map_err(network)
    }
}

fn network(err: reqwest::Error) -> HttpError {
    HttpError::Network(err.to_string())
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        let HttpRequest {
            method,
            url,
            headers,
            body,
        } = request;

        let mut outgoing = headers
            .iter()
            .fold(self.client.request(method.into(), &url), |req, (k, v)| {
                req.header(k.as_str(), v.as_str())
            });
        if !body.is_empty() {
            outgoing = outgoing.body(body);
        }

        let response = outgoing.send().await.map_err(network)?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.to_string(), value.to_string()))
            })
            .collect();
        let body = response.bytes().await.map_err(network)?.to_vec();

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(any(test, feature = "test-util"))]
pub use mock::MockTransport;

#[cfg(any(test, feature = "test-util"))]
mod mock {
    use std::collections::{HashMap, VecDeque};
    use std::sync::{Arc, Mutex, MutexGuard};

    use super::*;

    type RouteKey = (HttpMethod, String);

    /// Scripted transport for tests.
    ///
    /// Responses are queued per method and URL, with the `t=` cache buster
    /// ignored on both sides. A request with nothing queued fails the same
    /// way an unreachable host would.
    #[derive(Clone, Default)]
    pub struct MockTransport {
        state: Arc<Mutex<Script>>,
    }

    #[derive(Default)]
    struct Script {
        queued: HashMap<RouteKey, VecDeque<HttpResponse>>,
        sent: Vec<HttpRequest>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        fn script(&self) -> MutexGuard<'_, Script> {
            self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
        }

        /// Queue `response` behind any already queued for the same route.
        pub fn push_response(&self, method: HttpMethod, url: impl Into<String>, response: HttpResponse) {
            let key = (method, strip_cache_buster(&url.into()));
            self.script().queued.entry(key).or_default().push_back(response);
        }

        pub fn push_json(&self, method: HttpMethod, url: impl Into<String>, status: u16, body: &serde_json::Value) {
            self.push_response(method, url, HttpResponse::with_status(status, body.to_string()));
        }

        /// Every request sent so far.
        #[must_use]
        pub fn requests(&self) -> Vec<HttpRequest> {
            self.script().sent.clone()
        }

        #[must_use]
        pub fn requests_with(&self, method: HttpMethod) -> Vec<HttpRequest> {
            self.script()
                .sent
                .iter()
                .filter(|r| r.method == method)
                .cloned()
                .collect()
        }
    }

    #[async_trait]
    impl HttpTransport for MockTransport {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
            let mut script = self.script();
            let (method, url) = (request.method, strip_cache_buster(&request.url));
            script.sent.push(request);

            script
                .queued
                .get_mut(&(method, url.clone()))
                .and_then(VecDeque::pop_front)
                .ok_or_else(|| HttpError::Unrouted {
                    method: method.as_str().to_string(),
                    url,
                })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_headers_match_in_any_case() {
        let headers: HttpHeaders = vec![
            ("X-RateLimit-Reset".to_string(), "1700000000".to_string()),
            ("x-ratelimit-reset".to_string(), "1".to_string()),
        ];
        assert_eq!(header_get(&headers, "x-ratelimit-reset"), Some("1700000000"));
        assert_eq!(header_get(&headers, "etag"), None);
    }

    #[test]
    fn head_requests_carry_no_body() {
        let request = HttpRequest::head("https://raw.test/clash/Neat_config1.yml");
        assert_eq!(request.method.as_str(), "HEAD");
        assert!(request.body.is_empty());
        assert_eq!(reqwest::Method::from(request.method), reqwest::Method::HEAD);
    }

    #[test]
    fn cache_buster_separator_depends_on_existing_query() {
        assert!(cache_busted("https://sub.test/clash.yaml").starts_with("https://sub.test/clash.yaml?t="));
        assert!(cache_busted("https://sub.test/api?token=1").starts_with("https://sub.test/api?token=1&t="));
    }

    #[test]
    fn stripping_the_cache_buster_keeps_other_parameters() {
        assert_eq!(strip_cache_buster("https://sub.test/x?t=123"), "https://sub.test/x");
        assert_eq!(
            strip_cache_buster("https://sub.test/x?token=1&t=123"),
            "https://sub.test/x?token=1"
        );
        assert_eq!(
            strip_cache_buster("https://relay.test/raw?url=abc"),
            "https://relay.test/raw?url=abc"
        );
    }

    #[test]
    fn relay_targets_are_fully_encoded() {
        assert_eq!(
            encode_component("https://sub.test/x?y=1"),
            "https%3A%2F%2Fsub.test%2Fx%3Fy%3D1"
        );
    }

    #[test]
    fn only_2xx_counts_as_success() {
        assert!(HttpResponse::with_status(201, Vec::new()).is_success());
        assert!(!HttpResponse::with_status(304, Vec::new()).is_success());
        assert!(!HttpResponse::with_status(409, Vec::new()).is_success());
    }

    #[tokio::test]
    async fn queued_responses_are_served_once_in_order() {
        let transport = MockTransport::new();
        let url = "https://sub.test/clash.yaml";
        transport.push_response(HttpMethod::Get, url, HttpResponse::with_status(500, "busy"));
        transport.push_response(HttpMethod::Get, url, HttpResponse::with_status(200, "proxies: []"));

        let first = transport.send(HttpRequest::get(cache_busted(url))).await.unwrap();
        let second = transport.send(HttpRequest::get(cache_busted(url))).await.unwrap();
        let third = transport.send(HttpRequest::get(url)).await;

        assert_eq!(first.status, 500);
        assert_eq!(second.text(), "proxies: []");
        assert!(matches!(third, Err(HttpError::Unrouted { .. })));
        assert_eq!(transport.requests().len(), 3);
    }

    #[tokio::test]
    async fn unrouted_requests_name_method_and_url() {
        let transport = MockTransport::new();
        let err = transport
            .send(HttpRequest::new(HttpMethod::Delete, "https://api.test/gone?t=5"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "no route for DELETE https://api.test/gone");
        assert_eq!(transport.requests_with(HttpMethod::Delete).len(), 1);
        assert!(transport.requests_with(HttpMethod::Get).is_empty());
    }

    #[tokio::test]
    async fn malformed_urls_surface_as_network_errors() {
        let transport = ReqwestTransport::with_timeout(Duration::from_millis(50)).unwrap();
        let err = transport.send(HttpRequest::get("not a url")).await.unwrap_err();
        assert!(matches!(err, HttpError::Network(_)));
    }
}
