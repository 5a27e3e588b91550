use chain_core::ProviderError;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

const MAX_ATTEMPTS: u32 = 3;
const RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(15);

/// Sliding-window rate limiter: at most `max_requests` per `window` duration.
#[derive(Clone)]
pub(crate) struct RateLimiter {
    timestamps: Arc<Mutex<VecDeque<Instant>>>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    pub(crate) fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            timestamps: Arc::new(Mutex::new(VecDeque::new())),
            max_requests: max_requests.max(1),
            window,
        }
    }

    pub(crate) async fn acquire(&self) {
        loop {
            let mut ts = self.timestamps.lock().await;
            let now = Instant::now();

            // Remove timestamps outside the window
            while let Some(&front) = ts.front() {
                if now.duration_since(front) >= self.window {
                    ts.pop_front();
                } else {
                    break;
                }
            }

            if ts.len() < self.max_requests {
                ts.push_back(now);
                return;
            }

            // Wait until the oldest request falls out of the window
            let sleep_dur = match ts.front() {
                Some(&oldest) => (oldest + self.window).saturating_duration_since(now) + Duration::from_millis(50),
                None => Duration::from_millis(50),
            };
            drop(ts);
            tracing::debug!("Rate limiter: waiting {:.1}s for API slot", sleep_dur.as_secs_f64());
            tokio::time::sleep(sleep_dur).await;
        }
    }
}

fn is_rate_limited(status: u16) -> bool {
    status == 429
}

/// Shared HTTP plumbing for one provider: timeout, optional rate limit,
/// 429 retry, and status classification into [`ProviderError`].
#[derive(Clone)]
pub struct HttpFetcher {
    provider: &'static str,
    client: Client,
    timeout: Duration,
    rate_limiter: Option<RateLimiter>,
    retry_backoff: Duration,
}

impl HttpFetcher {
    pub fn new(provider: &'static str, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("options-gex/0.1")
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            provider,
            client,
            timeout,
            rate_limiter: None,
            retry_backoff: RATE_LIMIT_BACKOFF,
        }
    }

    /// Limit to `per_minute` requests in any rolling 60 second window.
    pub fn with_rate_limit(mut self, per_minute: usize) -> Self {
        self.rate_limiter = Some(RateLimiter::new(per_minute, Duration::from_secs(60)));
        self
    }

    /// Wait between 429 retries.
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    fn transport_error(&self, e: reqwest::Error) -> ProviderError {
        if e.is_timeout() {
            ProviderError::Timeout(self.timeout)
        } else {
            ProviderError::Transport(format!("{}: {}", self.provider, e))
        }
    }

    /// Send with rate limiting and automatic 429 retry.
    async fn send(&self, builder: RequestBuilder) -> Result<Response, ProviderError> {
        let request = builder.build().map_err(|e| self.transport_error(e))?;

        for attempt in 0..MAX_ATTEMPTS {
            if let Some(limiter) = &self.rate_limiter {
                limiter.acquire().await;
            }
            let req_clone = request.try_clone().ok_or_else(|| {
                ProviderError::Transport(format!("{}: cannot clone request", self.provider))
            })?;
            let response = self
                .client
                .execute(req_clone)
                .await
                .map_err(|e| self.transport_error(e))?;

            if !is_rate_limited(response.status().as_u16()) {
                return Ok(response);
            }

            tracing::warn!(
                "{} 429 rate limited, waiting {}s before retry {}/{}",
                self.provider,
                self.retry_backoff.as_secs(),
                attempt + 1,
                MAX_ATTEMPTS
            );
            tokio::time::sleep(self.retry_backoff).await;
        }

        Err(ProviderError::Transport(format!(
            "Rate limited by {} after {} retries",
            self.provider, MAX_ATTEMPTS
        )))
    }

    /// Send and decode a JSON body, classifying non-success statuses.
    pub async fn get_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ProviderError> {
        let response = self.send(builder).await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(self.provider, status.as_u16(), &body));
        }

        let bytes = response.bytes().await.map_err(|e| self.transport_error(e))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| ProviderError::Malformed(format!("{}: {}", self.provider, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn test_rate_limiter_admits_up_to_limit() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        tokio_test::block_on(async {
            limiter.acquire().await;
            limiter.acquire().await;
            limiter.acquire().await;
            assert_eq!(limiter.timestamps.lock().await.len(), 3);
        });
    }

    #[test]
    fn test_rate_limiter_zero_is_clamped() {
        let limiter = RateLimiter::new(0, Duration::from_secs(60));
        assert_eq!(limiter.max_requests, 1);
    }

    /// Serve `status` with `body` to every connection, counting requests.
    async fn serve(status: &'static str, body: &'static str) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });
        (format!("http://{}/", addr), hits)
    }

    fn fetcher() -> HttpFetcher {
        HttpFetcher::new("test", Duration::from_secs(5)).with_retry_backoff(Duration::ZERO)
    }

    #[tokio::test]
    async fn test_429_retried_then_transport_error() {
        let (url, hits) = serve("429 Too Many Requests", "").await;
        let http = fetcher();
        let err = http
            .get_json::<serde_json::Value>(http.client().get(&url))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Transport(ref m) if m.contains("Rate limited")));
        assert_eq!(hits.load(Ordering::SeqCst), MAX_ATTEMPTS as usize);
    }

    #[tokio::test]
    async fn test_status_classification() {
        let http = fetcher();

        let (url, hits) = serve("401 Unauthorized", r#"{"error": "bad key"}"#).await;
        let err = http.get_json::<serde_json::Value>(http.client().get(&url)).await.unwrap_err();
        assert!(err.is_auth());
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        let (url, _) = serve("404 Not Found", "").await;
        let err = http.get_json::<serde_json::Value>(http.client().get(&url)).await.unwrap_err();
        assert!(matches!(err, ProviderError::NotFound(_)));

        let (url, _) = serve("503 Service Unavailable", "").await;
        let err = http.get_json::<serde_json::Value>(http.client().get(&url)).await.unwrap_err();
        assert!(matches!(err, ProviderError::Transport(_)));
    }

    #[tokio::test]
    async fn test_decodes_json_and_flags_garbage() {
        let http = fetcher();

        let (url, _) = serve("200 OK", r#"{"price": 42.5}"#).await;
        let value: serde_json::Value = http.get_json(http.client().get(&url)).await.unwrap();
        assert_eq!(value["price"], 42.5);

        let (url, _) = serve("200 OK", "<html>maintenance</html>").await;
        let err = http.get_json::<serde_json::Value>(http.client().get(&url)).await.unwrap_err();
        assert!(matches!(err, ProviderError::Malformed(_)));
    }

    #[test]
    fn test_only_429_is_retried() {
        assert!(is_rate_limited(429));
        for status in [200, 401, 403, 404, 500, 503] {
            assert!(!is_rate_limited(status));
        }
    }
}
