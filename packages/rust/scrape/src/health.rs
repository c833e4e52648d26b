//! Provider availability probe.
//!
//! Used once at the start of a run as a fail-fast gate: a cheap `HEAD`
//! against the provider's base URL with a short timeout.

use std::time::Duration;

use reqwest::Client;
use tracing::{debug, info, instrument, warn};

use livecourses_shared::{LiveCoursesError, PipelineConfig, Result};

use crate::client::USER_AGENT;

/// Default probe timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 5;

/// Pings the scrape provider and reports whether it is reachable.
#[derive(Debug, Clone)]
pub struct HealthProber {
    client: Client,
    target: String,
}

impl HealthProber {
    /// Build a prober for `base_url` with the given timeout.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| {
                LiveCoursesError::Network(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            target: base_url.to_string(),
        })
    }

    /// Build a prober from runtime config.
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        let timeout = if config.health_timeout.is_zero() {
            Duration::from_secs(DEFAULT_TIMEOUT_SECS)
        } else {
            config.health_timeout
        };
        Self::new(&config.base_url, timeout)
    }

    /// `true` when the provider answers the probe with a 2xx status.
    ///
    /// Network errors, timeouts and non-2xx statuses all yield `false`.
    #[instrument(skip_all, fields(target = %self.target))]
    pub async fn is_available(&self) -> bool {
        match self.client.head(&self.target).send().await {
            Ok(response) if response.status().is_success() => {
                debug!(status = %response.status(), "provider is up");
                true
            }
            Ok(response) => {
                warn!(status = %response.status(), "provider health check failed");
                false
            }
            Err(e) if e.is_timeout() => {
                warn!("provider health check timed out");
                false
            }
            Err(e) => {
                info!(error = %e, "provider unreachable");
                false
            }
        }
    }
}
