//! Retry-capable request client for the scrape provider.
//!
//! Every call to the provider goes through [`ScrapeClient::request`], which
//! runs a bounded attempt loop with exponential backoff. The retry schedule is
//! a plain [`RetryPolicy`] value so it can be inspected and tested on its own.

use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use livecourses_shared::{LiveCoursesError, PipelineConfig, Result};

/// User-Agent string for provider requests.
pub(crate) const USER_AGENT: &str = concat!("LiveCourses/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

/// Attempt count and backoff schedule for a provider request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, first try included.
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub base_delay: Duration,
    /// Ceiling for any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(5000),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after failed attempt number `attempt` (1-based):
    /// `min(base * 2^(attempt-1), max)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Full backoff schedule for `max_attempts`, one entry per retry.
    pub fn schedule(&self) -> Vec<Duration> {
        (1..self.max_attempts).map(|a| self.delay_for(a)).collect()
    }
}

impl From<&PipelineConfig> for RetryPolicy {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: config.backoff_base,
            max_delay: config.backoff_cap,
        }
    }
}

// ---------------------------------------------------------------------------
// ScrapeClient
// ---------------------------------------------------------------------------

/// Authenticated JSON client for the scrape provider.
#[derive(Debug, Clone)]
pub struct ScrapeClient {
    client: Client,
    base_url: String,
    api_key: String,
    policy: RetryPolicy,
}

impl ScrapeClient {
    /// Build a client for `base_url` with a per-request timeout.
    pub fn new(
        base_url: &str,
        api_key: &str,
        request_timeout: Duration,
        policy: RetryPolicy,
    ) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(request_timeout)
            .build()
            .map_err(|e| {
                LiveCoursesError::Network(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            policy,
        })
    }

    /// Build a client from runtime config. Fails with a config error when no
    /// API key is available.
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        let api_key = config.require_api_key()?;
        Self::new(
            &config.base_url,
            api_key,
            config.request_timeout,
            RetryPolicy::from(config),
        )
    }

    /// The retry policy used by [`Self::send`].
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// `request` with the client's configured attempt count.
    pub async fn send(&self, endpoint: &str, payload: &Value) -> Result<Value> {
        self.request(endpoint, payload, self.policy.max_attempts)
            .await
    }

    /// POST `payload` to `endpoint`, retrying up to `max_attempts` times.
    ///
    /// An attempt succeeds on a 2xx response whose body parses as JSON and
    /// does not report `"success": false`. Anything else is retried after
    /// the policy's backoff delay. When attempts run out, the last error is
    /// returned wrapped in [`LiveCoursesError::RetriesExhausted`].
    #[instrument(skip(self, payload), fields(endpoint = %endpoint))]
    pub async fn request(
        &self,
        endpoint: &str,
        payload: &Value,
        max_attempts: u32,
    ) -> Result<Value> {
        let max_attempts = max_attempts.max(1);
        let url = format!("{}{}", self.base_url, endpoint);
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            match self.attempt(&url, endpoint, payload).await {
                Ok(body) => {
                    debug!(attempt, "provider request succeeded");
                    return Ok(body);
                }
                Err(e) => {
                    last_error = e.to_string();
                    if attempt < max_attempts {
                        let delay = self.policy.delay_for(attempt);
                        warn!(
                            attempt,
                            max_attempts,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "provider request failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    } else {
                        warn!(attempt, error = %e, "provider request failed, no attempts left");
                    }
                }
            }
        }

        Err(LiveCoursesError::RetriesExhausted {
            endpoint: endpoint.to_string(),
            attempts: max_attempts,
            last_error,
        })
    }

    /// One HTTP round trip.
    async fn attempt(&self, url: &str, endpoint: &str, payload: &Value) -> Result<Value> {
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(payload)
            .send()
            .await
            .map_err(|e| LiveCoursesError::Network(format!("{endpoint}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LiveCoursesError::Http {
                status: status.as_u16(),
                endpoint: endpoint.to_string(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| LiveCoursesError::Network(format!("{endpoint}: body read failed: {e}")))?;

        let value: Value = serde_json::from_str(&body).map_err(|e| {
            let snippet: String = body.chars().take(200).collect();
            LiveCoursesError::parse(format!("{endpoint}: invalid JSON: {e} (got: {snippet})"))
        })?;

        if value.get("success").and_then(Value::as_bool) == Some(false) {
            let reason = value
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("provider reported failure");
            return Err(LiveCoursesError::Network(format!("{endpoint}: {reason}")));
        }

        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
        }
    }

    fn client_for(server: &MockServer, max_attempts: u32) -> ScrapeClient {
        ScrapeClient::new(
            &server.uri(),
            "test-key",
            Duration::from_secs(5),
            fast_policy(max_attempts),
        )
        .unwrap()
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(4000));
        assert_eq!(policy.delay_for(4), Duration::from_millis(5000));
        assert_eq!(policy.delay_for(40), Duration::from_millis(5000));
    }

    #[test]
    fn schedule_has_one_delay_per_retry() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.schedule(),
            vec![Duration::from_millis(1000), Duration::from_millis(2000)]
        );
    }

    #[tokio::test]
    async fn success_returns_immediately() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/scrape"))
            .and(header("authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true, "data": {}})))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, 3);
        let body = client
            .request("/v1/scrape", &json!({"url": "https://example.com"}), 3)
            .await
            .unwrap();
        assert_eq!(body["success"], true);
    }

    #[tokio::test]
    async fn retries_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/scrape"))
            .respond_with(ResponseTemplate::new(502))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/scrape"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"ok": 1}})))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, 3);
        let body = client.send("/v1/scrape", &json!({})).await.unwrap();
        assert_eq!(body["data"]["ok"], 1);
    }

    #[tokio::test]
    async fn exhausted_attempts_report_endpoint_and_count() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/scrape"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let client = client_for(&server, 3);
        let err = client
            .request("/v1/scrape", &json!({}), 3)
            .await
            .unwrap_err();

        match err {
            LiveCoursesError::RetriesExhausted {
                endpoint,
                attempts,
                last_error,
            } => {
                assert_eq!(endpoint, "/v1/scrape");
                assert_eq!(attempts, 3);
                assert!(last_error.contains("HTTP 500"));
            }
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unparseable_body_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .expect(2)
            .mount(&server)
            .await;

        let client = client_for(&server, 2);
        let err = client.request("/v1/scrape", &json!({}), 2).await.unwrap_err();
        assert!(err.to_string().contains("invalid JSON"));
    }

    #[tokio::test]
    async fn provider_reported_failure_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"success": false, "error": "blocked by target"})),
            )
            .expect(2)
            .mount(&server)
            .await;

        let client = client_for(&server, 2);
        let err = client.request("/v1/scrape", &json!({}), 2).await.unwrap_err();
        assert!(err.to_string().contains("blocked by target"));
    }

    #[tokio::test]
    async fn zero_attempts_still_tries_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, 1);
        let err = client.request("/x", &json!({}), 0).await.unwrap_err();
        assert!(matches!(
            err,
            LiveCoursesError::RetriesExhausted { attempts: 1, .. }
        ));
    }

    #[test]
    fn from_config_requires_api_key() {
        let mut app = livecourses_shared::AppConfig::default();
        app.provider.api_key_env = "LC_TEST_CLIENT_MISSING_KEY_987".into();
        let config = PipelineConfig::from(&app);
        let err = ScrapeClient::from_config(&config).unwrap_err();
        assert!(matches!(err, LiveCoursesError::Config { .. }));
    }
}
