//! Common HTTP code

use std::{
    fmt,
    num::NonZeroUsize,
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::Context as _;
use const_format::formatcp;
use parking_lot::Mutex;
use reqwest::{
    StatusCode, Url,
    header::{HeaderMap, HeaderName, HeaderValue},
};

#[cfg(test)]
pub(crate) mod testing;

/// Default user agent unless overriden by client
pub(crate) const USER_AGENT: &str = formatcp!(
    "{}/{} (music artist aggregator)",
    env!("CARGO_PKG_NAME"),
    env!("CARGO_PKG_VERSION")
);

/// Timeout for cheap lookups (tokens, listener counts, encyclopedia)
pub(crate) const LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);
/// Timeout for geocoding requests
pub(crate) const GEOCODE_TIMEOUT: Duration = Duration::from_secs(6);
/// Timeout for search and listing requests
pub(crate) const LISTING_TIMEOUT: Duration = Duration::from_secs(8);

/// Upstream error body fragments meaning the requested entity does not exist
const NOT_FOUND_MARKERS: &[&str] = &["not found", "unknown id", "invalid id"];

/// Error returned by all upstream calls
#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    /// Required credentials are missing, no request was sent
    #[error("Missing configuration: {0}")]
    Config(&'static str),
    /// Upstream says the entity does not exist
    #[error("Not found: {0}")]
    NotFound(String),
    /// Upstream answered with a non success status
    #[error("HTTP status {status} for URL {url:?}")]
    Status {
        /// Response status
        status: StatusCode,
        /// Request URL
        url: String,
    },
    /// Request did not complete in time
    #[error("Request timed out for URL {0:?}")]
    Timeout(String),
    /// Connection or protocol failure
    #[error("Network error for URL {url:?}: {message}")]
    Network {
        /// Request URL
        url: String,
        /// Error chain
        message: String,
    },
    /// Response body is not the expected JSON
    #[error("Failed to decode response from URL {url:?}: {source}")]
    Decode {
        /// Request URL
        url: String,
        /// Parse error
        #[source]
        source: serde_json::Error,
    },
    /// Upstream answered, but the answer is unusable
    #[error("Upstream error: {0}")]
    Upstream(String),
}

impl FetchError {
    /// Return true if the requested entity does not exist upstream
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Return true if retrying later may succeed
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Network { .. } => true,
            Self::Status { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            Self::Config(_) | Self::NotFound(_) | Self::Decode { .. } | Self::Upstream(_) => false,
        }
    }

    /// Build error from a `reqwest` one
    fn from_reqwest(url: &Url, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(url.to_string())
        } else {
            Self::Network {
                url: url.to_string(),
                message: format!("{:#}", anyhow::Error::new(err)),
            }
        }
    }
}

/// HTTP method
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Method {
    /// GET
    Get,
    /// POST
    Post,
}

/// Request handed to a [`Transport`]
#[derive(Debug, Clone)]
pub struct Request {
    /// Method
    pub method: Method,
    /// Full URL including query string
    pub url: Url,
    /// Extra headers
    pub headers: HeaderMap,
    /// URL encoded form body, sent if not empty
    pub form: Vec<(String, String)>,
    /// HTTP basic auth credentials
    pub basic_auth: Option<(String, String)>,
    /// Bearer token
    pub bearer: Option<String>,
    /// Total timeout
    pub timeout: Duration,
}

impl Request {
    /// Set form body
    #[must_use]
    pub fn form<K, V>(mut self, pairs: &[(K, V)]) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        self.form = pairs
            .iter()
            .map(|(k, v)| (k.as_ref().to_owned(), v.as_ref().to_owned()))
            .collect();
        self
    }

    /// Set basic auth credentials
    #[must_use]
    pub fn basic_auth(mut self, user: &str, password: &str) -> Self {
        self.basic_auth = Some((user.to_owned(), password.to_owned()));
        self
    }

    /// Set bearer token
    #[must_use]
    pub fn bearer(mut self, token: &str) -> Self {
        self.bearer = Some(token.to_owned());
        self
    }

    /// Get a query parameter value
    #[must_use]
    pub fn query_param(&self, name: &str) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    }
}

/// Raw response returned by a [`Transport`]
#[derive(Debug, Clone)]
pub struct Response {
    /// Status
    pub status: StatusCode,
    /// Undecoded body
    pub body: Vec<u8>,
}

/// Something that can send HTTP requests
#[async_trait::async_trait]
pub trait Transport: Sync + Send {
    /// Send request and read whole response
    async fn execute(&self, request: Request) -> Result<Response, FetchError>;
}

/// Transport backed by a shared `reqwest` client
pub struct ReqwestTransport {
    /// Client
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Create a new transport
    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: Request) -> Result<Response, FetchError> {
        let url = request.url;
        let mut builder = match request.method {
            Method::Get => self.client.get(url.clone()),
            Method::Post => self.client.post(url.clone()),
        }
        .headers(request.headers)
        .timeout(request.timeout);
        if let Some((user, password)) = &request.basic_auth {
            builder = builder.basic_auth(user, Some(password));
        }
        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }
        if !request.form.is_empty() {
            builder = builder.form(&request.form);
        }

        let response = builder
            .send()
            .await
            .map_err(|err| FetchError::from_reqwest(&url, err))?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|err| FetchError::from_reqwest(&url, err))?;
        Ok(Response {
            status,
            body: body.into(),
        })
    }
}

/// How to rate limit the requests sent by a client
pub(crate) struct RateLimit {
    /// Duration on which to apply the limit
    pub time: Duration,
    /// Maximum count of request during the time window
    pub max_count: NonZeroUsize,
}

/// Per upstream HTTP interface
pub(crate) struct HttpClient {
    /// Shared transport
    transport: Arc<dyn Transport>,
    /// Upstream name, for logs
    name: &'static str,
    /// Default timeout
    timeout: Duration,
    /// Headers sent with every request
    headers: HeaderMap,
    /// Rate limit state
    rate_limit: RateLimitState,
}

impl fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClient")
            .field("name", &self.name)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl HttpClient {
    /// Create a new HTTP client for an upstream
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        name: &'static str,
        timeout: Duration,
        rate_limit: Option<&RateLimit>,
    ) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("accept"),
            HeaderValue::from_static("application/json"),
        );
        headers.insert(
            HeaderName::from_static("user-agent"),
            HeaderValue::from_static(USER_AGENT),
        );

        let rate_limit_state = match rate_limit {
            Some(RateLimit { time, max_count }) => {
                RateLimitState::Window(Mutex::new(RateLimitWindow {
                    start: Instant::now(),
                    length: *time,
                    count: 0,
                    limit: *max_count,
                }))
            }
            None => RateLimitState::None,
        };

        Self {
            transport,
            name,
            timeout,
            headers,
            rate_limit: rate_limit_state,
        }
    }

    /// Build a GET request with client defaults
    pub(crate) fn get(&self, url: Url) -> Request {
        self.request(Method::Get, url)
    }

    /// Build a POST request with client defaults
    pub(crate) fn post(&self, url: Url) -> Request {
        self.request(Method::Post, url)
    }

    fn request(&self, method: Method, url: Url) -> Request {
        Request {
            method,
            url,
            headers: self.headers.clone(),
            form: Vec::new(),
            basic_auth: None,
            bearer: None,
            timeout: self.timeout,
        }
    }

    /// Wait if needed to respect rate limit
    async fn wait(&self) {
        while let Some(time_to_sleep) = self.rate_limit.wait_for() {
            log::debug!(
                "Waiting for {:.3}s because of {} rate limit",
                time_to_sleep.as_secs_f64(),
                self.name
            );
            tokio::time::sleep(time_to_sleep).await;
        }
    }

    /// Send request, and return body of successful responses
    pub(crate) async fn fetch(&self, request: Request) -> Result<Vec<u8>, FetchError> {
        self.wait().await;
        let url = request.url.clone();
        log::trace!("{} {:?} {url}", self.name, request.method);
        let response = self.transport.execute(request).await?;
        check_status(&url, response)
    }

    /// GET URL and parse response as JSON
    pub(crate) async fn get_json<R>(&self, url: Url) -> Result<R, FetchError>
    where
        R: serde::de::DeserializeOwned,
    {
        let request = self.get(url);
        self.send_json(request).await
    }

    /// Send request and parse response as JSON
    pub(crate) async fn send_json<R>(&self, request: Request) -> Result<R, FetchError>
    where
        R: serde::de::DeserializeOwned,
    {
        let url = request.url.clone();
        let data = self.fetch(request).await?;
        decode(&url, &data)
    }
}

/// Parse JSON body
pub(crate) fn decode<R>(url: &Url, data: &[u8]) -> Result<R, FetchError>
where
    R: serde::de::DeserializeOwned,
{
    log::trace!("{}", String::from_utf8_lossy(data));
    serde_json::from_slice(data).map_err(|source| FetchError::Decode {
        url: url.to_string(),
        source,
    })
}

/// Map response status to error, tagging not found responses
fn check_status(url: &Url, response: Response) -> Result<Vec<u8>, FetchError> {
    let status = response.status;
    if status.is_success() {
        return Ok(response.body);
    }
    log::debug!(
        "HTTP {status} for {url}: {}",
        String::from_utf8_lossy(&response.body)
    );
    if status == StatusCode::NOT_FOUND
        || (status.is_client_error() && body_means_not_found(&response.body))
    {
        Err(FetchError::NotFound(url.to_string()))
    } else {
        Err(FetchError::Status {
            status,
            url: url.to_string(),
        })
    }
}

/// Return true if an upstream error message says the entity does not exist
pub(crate) fn body_means_not_found(body: &[u8]) -> bool {
    let text = String::from_utf8_lossy(body).to_lowercase();
    NOT_FOUND_MARKERS.iter().any(|m| text.contains(m))
}

/// Build URL with query parameters
pub(crate) fn api_url<I, K, V>(base: &str, params: I) -> Url
where
    I: IntoIterator,
    I::Item: std::borrow::Borrow<(K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    #[expect(clippy::unwrap_used)] // base URL is absolute
    let mut url = Url::parse_with_params(base, params).unwrap();
    if url.query() == Some("") {
        url.set_query(None);
    }
    url
}

/// Query parameters for URLs that have none
pub(crate) const NO_PARAMS: [(&str, &str); 0] = [];

/// Build URL by appending escaped path segments to a base URL
pub(crate) fn api_path_url<I, K, V>(base: &str, segments: &[&str], params: I) -> Url
where
    I: IntoIterator,
    I::Item: std::borrow::Borrow<(K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut url = api_url(base, params);
    #[expect(clippy::unwrap_used)] // base URL is absolute
    url.path_segments_mut().unwrap().pop_if_empty().extend(segments);
    url
}

/// Parse a constant URL
pub(crate) fn static_url(s: &'static str) -> Url {
    #[expect(clippy::unwrap_used)] // URL constants are absolute
    s.parse().unwrap()
}

/// Current state of http rate limit for a client
enum RateLimitState {
    /// No limit to enforce
    None,
    /// Current time window state and limits
    Window(Mutex<RateLimitWindow>),
}

/// Current rate limit state
struct RateLimitWindow {
    /// Start of the time window
    start: Instant,
    /// Duration of each time window
    length: Duration,
    /// Current count of requests made in the time window
    count: usize,
    /// Maximum request count to make in each time window
    limit: NonZeroUsize,
}

impl RateLimitState {
    /// Update rate limit state, and return None if request can be sent, or duration to wait
    /// If a duration is returned, this must be called again before sending any request
    fn wait_for(&self) -> Option<Duration> {
        match self {
            RateLimitState::None => None,
            RateLimitState::Window(state) => {
                let mut window_state = state.lock();
                let now = Instant::now();
                if now.saturating_duration_since(window_state.start) > window_state.length {
                    // Reset
                    window_state.start = now;
                    window_state.count = 1;
                    None
                } else if window_state.count < window_state.limit.get() {
                    window_state.count += 1;
                    None
                } else {
                    let time_to_wait =
                        (window_state.start + window_state.length).saturating_duration_since(now);
                    Some(time_to_wait)
                }
            }
        }
    }
}
