//! The REST client.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Client, ClientBuilder, Method};
use serde::Deserialize;
use tracing::{debug, info, warn};

use qgate_core::{ApiError, ApiResult, BotIdentity, IdentitySource};

use super::{ApiRequest, ApiResponse, RequestBody, RetryPolicy};
use crate::queue::RequestQueue;

/// Production API base URL.
pub const API_BASE: &str = "https://api.sgroup.qq.com";

/// Sandbox API base URL.
pub const SANDBOX_API_BASE: &str = "https://sandbox.api.sgroup.qq.com";

const MAX_ATTEMPTS: u32 = 2;

// =============================================================================
// Configuration
// =============================================================================

/// Settings for [`HttpClient`].
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Base URL requests are resolved against.
    pub base_url: String,
    /// Bot application id.
    pub app_id: String,
    /// Bot token.
    pub token: String,
    /// Overall timeout of one attempt.
    pub timeout: Duration,
    /// Retry and logging rules.
    pub retry: RetryPolicy,
}

impl HttpConfig {
    /// Creates a config against the production API.
    pub fn new(app_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: API_BASE.to_string(),
            app_id: app_id.into(),
            token: token.into(),
            timeout: Duration::from_secs(20),
            retry: RetryPolicy::default(),
        }
    }

    /// Switches between the sandbox and production base URLs.
    pub fn sandbox(mut self, sandbox: bool) -> Self {
        self.base_url = if sandbox { SANDBOX_API_BASE } else { API_BASE }.to_string();
        self
    }

    /// Overrides the base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Sets the per-attempt timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The credential used for both REST calls and the gateway handshake.
    pub fn authorization(&self) -> String {
        format!("Bot {}.{}", self.app_id, self.token)
    }

    fn url(&self, target: &str) -> String {
        if target.starts_with("http://") || target.starts_with("https://") {
            target.to_string()
        } else {
            format!(
                "{}/{}",
                self.base_url.trim_end_matches('/'),
                target.trim_start_matches('/')
            )
        }
    }
}

/// Result of `GET /gateway/bot`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GatewayInfo {
    /// WebSocket URL to connect to.
    pub url: String,
    /// Recommended number of shards.
    #[serde(default = "default_shards")]
    pub shards: u32,
}

fn default_shards() -> u32 {
    1
}

// =============================================================================
// Client
// =============================================================================

/// REST client shared by the gateway and by bot code.
///
/// Cloning is cheap; clones share the connection pool and the queue.
#[derive(Clone)]
pub struct HttpClient {
    inner: Arc<Inner>,
}

struct Inner {
    config: HttpConfig,
    queue: RequestQueue,
    pool: RwLock<Option<Client>>,
}

impl HttpClient {
    /// Creates a client. The connection pool is built on first use.
    pub fn new(config: HttpConfig, queue: RequestQueue) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                queue,
                pool: RwLock::new(None),
            }),
        }
    }

    /// Client settings.
    pub fn config(&self) -> &HttpConfig {
        &self.inner.config
    }

    /// The admission queue all calls go through.
    pub fn queue(&self) -> &RequestQueue {
        &self.inner.queue
    }

    /// Whether the connection pool currently exists.
    pub fn is_open(&self) -> bool {
        self.inner.pool.read().is_some()
    }

    /// Tears the connection pool down. The next call builds a new one.
    pub fn close(&self) {
        if self.inner.pool.write().take().is_some() {
            debug!("HTTP connection pool closed");
        }
    }

    /// Returns the open pool, building it if it was never created or closed.
    fn ensure_session(&self) -> ApiResult<Client> {
        if let Some(client) = self.inner.pool.read().as_ref() {
            return Ok(client.clone());
        }
        let mut pool = self.inner.pool.write();
        if let Some(client) = pool.as_ref() {
            return Ok(client.clone());
        }
        let client = build_client(&self.inner.config)?;
        debug!(base_url = %self.inner.config.base_url, "HTTP connection pool created");
        *pool = Some(client.clone());
        Ok(client)
    }

    // -------------------------------------------------------------------------
    // Verbs
    // -------------------------------------------------------------------------

    /// `GET target`.
    pub async fn get(&self, target: &str) -> ApiResult<ApiResponse> {
        self.request(ApiRequest::new(Method::GET, target)).await
    }

    /// `POST target` with a body.
    pub async fn post(&self, target: &str, body: impl Into<RequestBody>) -> ApiResult<ApiResponse> {
        self.request(ApiRequest::new(Method::POST, target).body(body))
            .await
    }

    /// `PUT target` with a body.
    pub async fn put(&self, target: &str, body: impl Into<RequestBody>) -> ApiResult<ApiResponse> {
        self.request(ApiRequest::new(Method::PUT, target).body(body))
            .await
    }

    /// `PATCH target` with a body.
    pub async fn patch(&self, target: &str, body: impl Into<RequestBody>) -> ApiResult<ApiResponse> {
        self.request(ApiRequest::new(Method::PATCH, target).body(body))
            .await
    }

    /// `DELETE target`.
    pub async fn delete(&self, target: &str) -> ApiResult<ApiResponse> {
        self.request(ApiRequest::new(Method::DELETE, target)).await
    }

    /// Issues a request, retrying once when the policy says so.
    ///
    /// Non-2xx responses are returned, not turned into errors. `Err` is only
    /// produced when no response was received at all.
    pub async fn request(&self, request: ApiRequest) -> ApiResult<ApiResponse> {
        let policy = &self.inner.config.retry;
        let url = self.inner.config.url(&request.target);
        let mut attempt = 1;

        loop {
            let response = self
                .inner
                .queue
                .run(self.send_once(&request, &url))
                .await?;
            if response.is_success() {
                return Ok(response);
            }

            let is_retry = attempt > 1;
            let logged = policy.log_errors && (!policy.enabled || is_retry);
            if logged {
                log_failure(&request, &url, &response);
            }

            if attempt < MAX_ATTEMPTS && policy.should_retry(&response) {
                debug!(
                    method = %request.method,
                    url = %url,
                    code = ?response.error_code(),
                    "Retrying API call"
                );
                attempt += 1;
                continue;
            }

            if policy.log_errors && !logged {
                log_failure(&request, &url, &response);
            }
            return Ok(response);
        }
    }

    /// One attempt with its own timeout window.
    async fn send_once(&self, request: &ApiRequest, url: &str) -> ApiResult<ApiResponse> {
        let client = self.ensure_session()?;
        let builder = client
            .request(request.method.clone(), url)
            .query(&request.query);
        let builder = request.body.apply(builder);

        let call = async {
            let response = builder.send().await?;
            ApiResponse::read(response).await
        };
        match tokio::time::timeout(self.inner.config.timeout, call).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) if e.is_timeout() => Err(ApiError::Timeout),
            Ok(Err(e)) if e.is_builder() => Err(ApiError::InvalidRequest(e.to_string())),
            Ok(Err(e)) => Err(ApiError::Http(e.to_string())),
            Err(_) => Err(ApiError::Timeout),
        }
    }

    // -------------------------------------------------------------------------
    // Gateway support
    // -------------------------------------------------------------------------

    /// Resolves the gateway URL and recommended shard count.
    pub async fn gateway_info(&self) -> ApiResult<GatewayInfo> {
        let response = self.get("/gateway/bot").await?;
        if !response.is_success() {
            return Err(ApiError::Http(format!(
                "gateway lookup failed with status {}",
                response.status()
            )));
        }
        let info: GatewayInfo = response.json()?;
        info!(url = %info.url, shards = info.shards, "Gateway resolved");
        Ok(info)
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("base_url", &self.inner.config.base_url)
            .field("open", &self.is_open())
            .field("queue", &self.inner.queue)
            .finish()
    }
}

#[async_trait]
impl IdentitySource for HttpClient {
    async fn fetch_identity(&self) -> ApiResult<BotIdentity> {
        let response = self.get("/users/@me").await?;
        if !response.is_success() {
            return Err(ApiError::Http(format!(
                "identity lookup failed with status {}",
                response.status()
            )));
        }
        response.json()
    }
}

fn build_client(config: &HttpConfig) -> ApiResult<Client> {
    let mut headers = HeaderMap::new();
    let authorization = HeaderValue::from_str(&config.authorization())
        .map_err(|e| ApiError::InvalidRequest(format!("invalid credentials: {e}")))?;
    headers.insert(AUTHORIZATION, authorization);
    headers.insert(
        USER_AGENT,
        HeaderValue::from_static(concat!("qgate/", env!("CARGO_PKG_VERSION"))),
    );

    ClientBuilder::new()
        .default_headers(headers)
        .timeout(config.timeout)
        .build()
        .map_err(|e| ApiError::Http(e.to_string()))
}

fn log_failure(request: &ApiRequest, url: &str, response: &ApiResponse) {
    warn!(
        method = %request.method,
        url = %url,
        status = response.status().as_u16(),
        body = %response.text(),
        trace_id = ?response.trace_id(),
        "API call failed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::runtime::Handle;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, retry: RetryPolicy) -> HttpClient {
        let config = HttpConfig::new("1", "secret")
            .with_base_url(server.uri())
            .with_timeout(Duration::from_secs(5))
            .with_retry(retry);
        HttpClient::new(config, RequestQueue::new(Handle::current(), 4))
    }

    #[test]
    fn urls_and_credentials() {
        let config = HttpConfig::new("1", "secret");
        assert_eq!(config.authorization(), "Bot 1.secret");
        assert_eq!(config.url("/users/@me"), "https://api.sgroup.qq.com/users/@me");
        assert_eq!(config.url("https://example.com/x"), "https://example.com/x");

        let sandbox = config.sandbox(true);
        assert_eq!(sandbox.url("gateway"), "https://sandbox.api.sgroup.qq.com/gateway");
    }

    #[tokio::test]
    async fn retryable_code_is_retried_exactly_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/guilds/1"))
            .and(header("Authorization", "Bot 1.secret"))
            .respond_with(
                ResponseTemplate::new(429)
                    .set_body_json(json!({"code": 11298, "message": "busy"}))
                    .insert_header("X-Tps-Trace-Id", "trace-9"),
            )
            .expect(2)
            .mount(&server)
            .await;

        let client = client_for(&server, RetryPolicy::default().with_codes([11298]));
        let response = client.get("/guilds/1").await.unwrap();

        assert_eq!(response.status().as_u16(), 429);
        assert_eq!(response.error_code(), Some(11298));
        assert_eq!(response.trace_id(), Some("trace-9"));
    }

    #[tokio::test]
    async fn retry_can_succeed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/channels/9/messages"))
            .and(body_json(json!({"content": "hi"})))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({"code": 11298})))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/channels/9/messages"))
            .and(body_json(json!({"content": "hi"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "m1"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, RetryPolicy::default().with_codes([11298]));
        let response = client
            .post("/channels/9/messages", json!({"content": "hi"}))
            .await
            .unwrap();

        assert!(response.is_success());
        assert_eq!(response.json::<serde_json::Value>().unwrap()["id"], "m1");
    }

    #[tokio::test]
    async fn other_failures_are_returned_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/json"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({"code": 10001})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/text"))
            .respond_with(ResponseTemplate::new(502).set_body_string(r#"{"code":11298}"#))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, RetryPolicy::default().with_codes([11298]));
        assert_eq!(client.delete("/json").await.unwrap().status().as_u16(), 400);
        assert_eq!(client.delete("/text").await.unwrap().status().as_u16(), 502);
    }

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<parking_lot::Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    async fn failure_warnings(server: &MockServer, retry: RetryPolicy) -> usize {
        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        client_for(server, retry).get("/guilds/1").await.unwrap();
        String::from_utf8_lossy(&logs.0.lock())
            .lines()
            .filter(|line| line.contains("WARN") && line.contains("API call failed"))
            .count()
    }

    #[tokio::test]
    async fn non_retryable_failure_logging_follows_log_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/guilds/1"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({"code": 10001})))
            .expect(2)
            .mount(&server)
            .await;

        let policy = RetryPolicy::default().with_codes([11298]);
        assert_eq!(failure_warnings(&server, policy.clone()).await, 1);

        let silent = RetryPolicy {
            log_errors: false,
            ..policy
        };
        assert_eq!(failure_warnings(&server, silent).await, 0);
    }

    #[tokio::test]
    async fn disabled_policy_never_retries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({"code": 11298})))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, RetryPolicy::disabled().with_codes([11298]));
        assert_eq!(client.get("/x").await.unwrap().status().as_u16(), 429);
    }

    #[tokio::test]
    async fn query_parameters_are_sent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/guilds/1/members"))
            .and(query_param("limit", "100"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, RetryPolicy::default());
        let request = ApiRequest::new(Method::GET, "/guilds/1/members").query("limit", 100);
        assert!(client.request(request).await.unwrap().is_success());
    }

    #[tokio::test]
    async fn closed_pool_is_recreated() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(204))
            .expect(2)
            .mount(&server)
            .await;

        let client = client_for(&server, RetryPolicy::default());
        assert!(!client.is_open());
        client.get("/a").await.unwrap();
        assert!(client.is_open());

        client.close();
        assert!(!client.is_open());
        client.get("/b").await.unwrap();
        assert!(client.is_open());
    }

    #[tokio::test]
    async fn slow_call_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let config = HttpConfig::new("1", "secret")
            .with_base_url(server.uri())
            .with_timeout(Duration::from_millis(100));
        let client = HttpClient::new(config, RequestQueue::new(Handle::current(), 1));
        assert!(matches!(client.get("/slow").await, Err(ApiError::Timeout)));
    }

    #[tokio::test]
    async fn identity_and_gateway_lookup() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/@me"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"id": "42", "username": "bot", "avatar": "a.png"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/gateway/bot"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"url": "wss://gw.example", "shards": 2})),
            )
            .mount(&server)
            .await;

        let client = client_for(&server, RetryPolicy::default());
        let identity = client.fetch_identity().await.unwrap();
        assert_eq!(identity.id, "42");
        assert_eq!(identity.mention(), "<@!42>");

        let gateway = client.gateway_info().await.unwrap();
        assert_eq!(
            gateway,
            GatewayInfo {
                url: "wss://gw.example".into(),
                shards: 2
            }
        );
    }
}
