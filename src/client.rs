use std::env;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::Stream;
use futures::stream::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, Response, header};
use serde::Deserialize;
use url::Url;

use crate::client_logger::ClientLogger;
use crate::error::{Error, Result};
use crate::observability::{
    CLIENT_REQUEST_DURATION, CLIENT_REQUEST_ERRORS, CLIENT_REQUEST_RETRIES, CLIENT_REQUESTS,
    CLIENT_RETRY_BACKOFF, STREAM_CHUNKS,
};
use crate::sse::process_sse;
use crate::types::{GenerateContentRequest, GenerateContentResponse, Model};

const DEFAULT_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta/";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);
const DEFAULT_MAX_RETRIES: u32 = 2;
const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Environment variables consulted, in order, when no API key is given explicitly.
pub const API_KEY_ENV_VARS: [&str; 2] = ["GEMINUS_API_KEY", "GEMINI_API_KEY"];

/// A boxed stream of response chunks.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<GenerateContentResponse>> + Send>>;

/// Resolve the API key from an explicit value or the environment.
///
/// An empty or all-whitespace key counts as missing.
pub fn resolve_api_key(api_key: Option<String>) -> Result<String> {
    let key = api_key
        .or_else(|| {
            API_KEY_ENV_VARS
                .iter()
                .find_map(|var| env::var(var).ok().filter(|v| !v.trim().is_empty()))
        })
        .ok_or_else(|| {
            Error::authentication(format!(
                "API key not provided and none of {} is set",
                API_KEY_ENV_VARS.join(", ")
            ))
        })?;
    if key.trim().is_empty() {
        return Err(Error::authentication("API key is empty"));
    }
    Ok(key.trim().to_string())
}

/////////////////////////////////////////// ChatBackend ///////////////////////////////////////////

/// The remote capability the chat session depends on: given a conversation,
/// return one reply or fail.
#[async_trait::async_trait]
pub trait ChatBackend: Send + Sync {
    /// Generate one complete reply.
    async fn generate(
        &self,
        model: &Model,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse>;

    /// Generate one reply as a stream of chunks.
    ///
    /// The default implementation yields the complete reply as a single chunk.
    async fn generate_streaming(
        &self,
        model: &Model,
        request: &GenerateContentRequest,
    ) -> Result<ChunkStream> {
        let response = self.generate(model, request).await?;
        Ok(Box::pin(futures::stream::iter(vec![Ok(response)])))
    }
}

////////////////////////////////////////////// Gemini //////////////////////////////////////////////

/// Client for the Gemini `generateContent` API.
#[derive(Clone)]
pub struct Gemini {
    api_key: String,
    client: ReqwestClient,
    base_url: Url,
    timeout: Duration,
    max_retries: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
    logger: Option<Arc<dyn ClientLogger>>,
}

impl fmt::Debug for Gemini {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gemini")
            .field("base_url", &self.base_url.as_str())
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .field("initial_backoff", &self.initial_backoff)
            .field("max_backoff", &self.max_backoff)
            .field("logger", &self.logger.is_some())
            .finish()
    }
}

impl Gemini {
    /// Create a new Gemini client.
    ///
    /// The API key can be provided directly or read from the GEMINUS_API_KEY
    /// or GEMINI_API_KEY environment variables.
    pub fn new(api_key: Option<String>) -> Result<Self> {
        Self::with_options(api_key, None, None)
    }

    /// Create a new client with custom settings.
    pub fn with_options(
        api_key: Option<String>,
        base_url: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let api_key = resolve_api_key(api_key)?;
        HeaderValue::from_str(&api_key)
            .map_err(|_| Error::authentication("API key contains invalid characters"))?;

        let mut base_url = base_url.unwrap_or_else(|| DEFAULT_API_URL.to_string());
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        let base_url = Url::parse(&base_url)?;

        let timeout = timeout.unwrap_or(DEFAULT_TIMEOUT);
        let client = build_http_client(timeout)?;

        Ok(Self {
            api_key,
            client,
            base_url,
            timeout,
            max_retries: DEFAULT_MAX_RETRIES,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
            logger: None,
        })
    }

    /// Set how many times a retryable failure is retried before giving up.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the first backoff delay and the cap for exponential backoff.
    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max.max(initial);
        self
    }

    /// Attach a logger that observes every request and response.
    pub fn with_logger(mut self, logger: Arc<dyn ClientLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Create and return default headers for API requests.
    fn default_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            "x-goog-api-key",
            HeaderValue::from_str(&self.api_key)
                .map_err(|_| Error::authentication("API key contains invalid characters"))?,
        );
        Ok(headers)
    }

    /// Build the URL of a model method such as `generateContent`.
    fn endpoint(&self, model: &Model, method: &str) -> Result<Url> {
        Ok(self.base_url.join(&format!("models/{model}:{method}"))?)
    }

    /// The delay before retry number `attempt` (zero-based).
    fn backoff_delay(&self, attempt: u32, retry_after: Option<u64>) -> Duration {
        if let Some(secs) = retry_after {
            return Duration::from_secs(secs).min(self.max_backoff);
        }
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// Run `attempt` until it succeeds, fails with a non-retryable error, or
    /// the retry budget is spent.
    async fn with_retries<T, F, Fut>(&self, mut attempt: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut retries = 0;
        loop {
            CLIENT_REQUESTS.click();
            let start = Instant::now();
            let result = attempt().await;
            CLIENT_REQUEST_DURATION.add(start.elapsed().as_secs_f64());
            match result {
                Ok(value) => return Ok(value),
                Err(err) => {
                    CLIENT_REQUEST_ERRORS.click();
                    if retries >= self.max_retries || !err.is_retryable() {
                        return Err(err);
                    }
                    let delay = self.backoff_delay(retries, err.retry_after());
                    CLIENT_REQUEST_RETRIES.click();
                    CLIENT_RETRY_BACKOFF.add(delay.as_secs_f64());
                    if let Some(logger) = &self.logger {
                        logger.log_retry(retries + 1, &err, delay);
                    }
                    tokio::time::sleep(delay).await;
                    retries += 1;
                }
            }
        }
    }

    /// POST `request` to `url` and return the successful response.
    async fn post(
        &self,
        url: Url,
        headers: HeaderMap,
        request: &GenerateContentRequest,
        model: &Model,
    ) -> Result<Response> {
        let response = self
            .client
            .post(url)
            .headers(headers)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::timeout(
                        format!("Request timed out: {e}"),
                        Some(self.timeout.as_secs_f64()),
                    )
                } else if e.is_connect() {
                    Error::connection(format!("Connection error: {e}"), Some(Box::new(e)))
                } else {
                    Error::http_client(format!("Request failed: {e}"), Some(Box::new(e)))
                }
            })?;

        if !response.status().is_success() {
            return Err(process_error_response(response, model).await);
        }
        Ok(response)
    }

    /// Send a conversation to the API and get a complete reply.
    pub async fn generate_content(
        &self,
        model: &Model,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse> {
        let url = self.endpoint(model, "generateContent")?;
        if let Some(logger) = &self.logger {
            logger.log_request(model, request);
        }

        let response = self
            .with_retries(|| {
                let url = url.clone();
                async move {
                    let response = self
                        .post(url, self.default_headers()?, request, model)
                        .await?;
                    response
                        .json::<GenerateContentResponse>()
                        .await
                        .map_err(|e| {
                            Error::serialization(
                                format!("Failed to parse response: {e}"),
                                Some(Box::new(e)),
                            )
                        })
                }
            })
            .await?;

        if let Some(logger) = &self.logger {
            logger.log_response(&response);
        }
        Ok(response)
    }

    /// Send a conversation to the API and get the reply as a stream of chunks.
    ///
    /// Only establishing the stream is retried; a failure in the middle of a
    /// stream is surfaced as an item of the stream.
    pub async fn stream_generate_content(
        &self,
        model: &Model,
        request: &GenerateContentRequest,
    ) -> Result<ChunkStream> {
        let mut url = self.endpoint(model, "streamGenerateContent")?;
        url.set_query(Some("alt=sse"));
        if let Some(logger) = &self.logger {
            logger.log_request(model, request);
        }

        let response = self
            .with_retries(|| {
                let url = url.clone();
                async move {
                    let mut headers = self.default_headers()?;
                    headers.insert(
                        header::ACCEPT,
                        HeaderValue::from_static("text/event-stream"),
                    );
                    self.post(url, headers, request, model).await
                }
            })
            .await?;

        let logger = self.logger.clone();
        let stream = process_sse(response.bytes_stream()).map(move |chunk| {
            STREAM_CHUNKS.click();
            if let (Ok(chunk), Some(logger)) = (&chunk, &logger) {
                logger.log_stream_chunk(chunk);
            }
            chunk
        });
        Ok(Box::pin(stream))
    }
}

#[async_trait::async_trait]
impl ChatBackend for Gemini {
    async fn generate(
        &self,
        model: &Model,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse> {
        self.generate_content(model, request).await
    }

    async fn generate_streaming(
        &self,
        model: &Model,
        request: &GenerateContentRequest,
    ) -> Result<ChunkStream> {
        self.stream_generate_content(model, request).await
    }
}

fn build_http_client(timeout: Duration) -> Result<ReqwestClient> {
    ReqwestClient::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| {
            Error::http_client(
                format!("Failed to build HTTP client: {e}"),
                Some(Box::new(e)),
            )
        })
}

/// Process API response errors and convert to our Error type
async fn process_error_response(response: Response, model: &Model) -> Error {
    let status_code = response.status().as_u16();
    let retry_after = response
        .headers()
        .get("retry-after")
        .and_then(|val| val.to_str().ok())
        .and_then(|val| val.parse::<u64>().ok());

    let error_body = match response.text().await {
        Ok(body) => body,
        Err(e) => {
            return Error::http_client(
                format!("Failed to read error response: {e}"),
                Some(Box::new(e)),
            );
        }
    };
    error_from_body(status_code, retry_after, &error_body, model)
}

/// Map an HTTP status and error body to the appropriate error type.
fn error_from_body(
    status_code: u16,
    retry_after: Option<u64>,
    body: &str,
    model: &Model,
) -> Error {
    #[derive(Deserialize)]
    struct ErrorResponse {
        error: Option<ErrorDetail>,
    }

    #[derive(Deserialize)]
    struct ErrorDetail {
        message: Option<String>,
        status: Option<String>,
    }

    let detail = serde_json::from_str::<ErrorResponse>(body)
        .ok()
        .and_then(|e| e.error);
    let status = detail.as_ref().and_then(|d| d.status.clone());
    let message = detail
        .and_then(|d| d.message)
        .unwrap_or_else(|| body.to_string());

    match status_code {
        400 => Error::bad_request(message),
        401 => Error::authentication(message),
        403 => Error::permission(message),
        404 => Error::not_found(message, Some(model.to_string())),
        408 => Error::timeout(message, None),
        429 => Error::rate_limit(message, retry_after),
        500 => Error::internal_server(message),
        502..=504 => Error::service_unavailable(message, retry_after),
        _ => Error::api(status_code, status, message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::KnownModel;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn client() -> Gemini {
        Gemini::new(Some("test-key".to_string())).unwrap()
    }

    #[test]
    fn test_client_creation() {
        let client = client();
        assert_eq!(client.api_key, "test-key");
        assert_eq!(client.base_url.as_str(), DEFAULT_API_URL);
        assert_eq!(client.timeout, DEFAULT_TIMEOUT);
        assert_eq!(client.max_retries, DEFAULT_MAX_RETRIES);

        let client = Gemini::with_options(
            Some("test-key".to_string()),
            Some("https://custom-api.example.com/v1".to_string()),
            Some(Duration::from_secs(30)),
        )
        .unwrap();
        assert_eq!(client.base_url.as_str(), "https://custom-api.example.com/v1/");
        assert_eq!(client.timeout, Duration::from_secs(30));
    }

    #[test]
    fn empty_key_is_rejected() {
        let err = Gemini::new(Some("   ".to_string())).unwrap_err();
        assert!(err.is_authentication());
    }

    #[test]
    fn debug_hides_key() {
        let debug = format!("{:?}", client());
        assert!(!debug.contains("test-key"));
    }

    #[test]
    fn endpoints() {
        let client = client();
        let model = Model::Known(KnownModel::Gemini25Flash);
        assert_eq!(
            client.endpoint(&model, "generateContent").unwrap().as_str(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }

    #[test]
    fn backoff_grows_and_caps() {
        let client = client().with_backoff(Duration::from_secs(1), Duration::from_secs(5));
        assert_eq!(client.backoff_delay(0, None), Duration::from_secs(1));
        assert_eq!(client.backoff_delay(1, None), Duration::from_secs(2));
        assert_eq!(client.backoff_delay(2, None), Duration::from_secs(4));
        assert_eq!(client.backoff_delay(3, None), Duration::from_secs(5));
        assert_eq!(client.backoff_delay(40, None), Duration::from_secs(5));
        assert_eq!(client.backoff_delay(0, Some(3)), Duration::from_secs(3));
        assert_eq!(client.backoff_delay(0, Some(60)), Duration::from_secs(5));
    }

    #[test]
    fn error_mapping() {
        let model = Model::Known(KnownModel::Gemini25Flash);
        let body = r#"{"error":{"code":429,"message":"Quota exceeded","status":"RESOURCE_EXHAUSTED"}}"#;
        let err = error_from_body(429, Some(12), body, &model);
        assert!(err.is_rate_limit());
        assert_eq!(err.retry_after(), Some(12));
        assert!(err.to_string().contains("Quota exceeded"));

        let err = error_from_body(404, None, "not json", &model);
        assert!(err.is_not_found());
        assert!(err.to_string().contains("not json"));

        let body = r#"{"error":{"code":499,"message":"cancelled","status":"CANCELLED"}}"#;
        let err = error_from_body(499, None, body, &model);
        assert_eq!(err.status_code(), Some(499));
        assert_eq!(err.to_string(), "CANCELLED (499): cancelled");
    }

    #[tokio::test(start_paused = true)]
    async fn retries_retryable_errors() {
        let client = client().with_max_retries(3);
        let calls = &AtomicU32::new(0);
        let result = client
            .with_retries(|| async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(Error::service_unavailable("busy", None))
                } else {
                    Ok(7)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_budget() {
        let client = client().with_max_retries(1);
        let calls = &AtomicU32::new(0);
        let result: Result<()> = client
            .with_retries(|| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Error::rate_limit("quota", None))
            })
            .await;
        assert!(result.unwrap_err().is_rate_limit());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn does_not_retry_permanent_errors() {
        let client = client().with_max_retries(5);
        let calls = &AtomicU32::new(0);
        let result: Result<()> = client
            .with_retries(|| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Error::bad_request("nope"))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    #[ignore] // Ignore by default as this requires a real API key
    async fn test_live_generate() {
        let Ok(client) = Gemini::new(None) else {
            println!("Skipping test_live_generate: no API key set");
            return;
        };
        let request = GenerateContentRequest::new(vec![crate::types::Content::user(
            "Reply with the single word: pong",
        )]);
        let response = client
            .generate_content(&Model::Known(KnownModel::Gemini25Flash), &request)
            .await
            .unwrap();
        assert!(!response.text().unwrap().is_empty());
    }
}
