//! End-to-end search pipeline: health check → listing → enrich → dedupe → envelope.
//!
//! The staged run is raced against a wall-clock budget with
//! `tokio::time::timeout`; if the budget wins, the in-flight future is dropped
//! and a timeout envelope is returned instead.

use std::time::{Duration, Instant};

use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use livecourses_scrape::{HealthProber, ScrapeClient};
use livecourses_shared::{
    LiveCoursesError, PipelineConfig, ResultEnvelope, RunStatus, SearchCriteria,
};

use crate::dedupe::dedupe;
use crate::enrichment::DetailEnricher;
use crate::envelope;
use crate::listing::fetch_listing;

/// Stages of a run, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    HealthCheck,
    Listing,
    Enriching,
    Deduping,
}

impl PipelineStage {
    pub fn label(self) -> &'static str {
        match self {
            Self::HealthCheck => "Checking scrape provider",
            Self::Listing => "Fetching course listing",
            Self::Enriching => "Enriching course details",
            Self::Deduping => "Removing duplicates",
        }
    }
}

/// Result of [`Pipeline::run`].
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    /// Identifier for correlating log lines of one run.
    pub run_id: Uuid,
    pub status: RunStatus,
    pub envelope: ResultEnvelope,
    pub elapsed: Duration,
}

impl PipelineOutcome {
    /// HTTP-equivalent status code for the caller.
    pub fn http_status(&self) -> u16 {
        self.status.http_status()
    }
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new stage.
    fn phase(&self, stage: PipelineStage);
    /// Called before each candidate is considered for enrichment.
    fn candidate_progress(&self, title: &str, current: usize, total: usize);
    /// Called once the run has an outcome.
    fn done(&self, outcome: &PipelineOutcome);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _stage: PipelineStage) {}
    fn candidate_progress(&self, _title: &str, _current: usize, _total: usize) {}
    fn done(&self, _outcome: &PipelineOutcome) {}
}

/// Live course search orchestrator.
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run one search. Always returns an envelope; failures are classified
    /// into its `status`.
    #[instrument(skip_all, fields(keywords = %criteria.keywords, location = %criteria.location))]
    pub async fn run(
        &self,
        criteria: SearchCriteria,
        progress: &dyn ProgressReporter,
    ) -> PipelineOutcome {
        let start = Instant::now();
        let run_id = Uuid::now_v7();
        let budget = self.config.global_timeout;

        info!(%run_id, budget_ms = budget.as_millis() as u64, "starting course search");

        let raced = tokio::time::timeout(budget, self.run_stages(&criteria, progress)).await;

        let envelope = match raced {
            Ok(Ok(envelope)) => envelope,
            Ok(Err(e)) => {
                error!(%run_id, error = %e, "pipeline failed unexpectedly");
                envelope::failure(RunStatus::Error, criteria, Vec::new(), e.to_string())
            }
            Err(_) => {
                let timeout = LiveCoursesError::Timeout {
                    elapsed_ms: start.elapsed().as_millis() as u64,
                };
                warn!(%run_id, error = %timeout, "pipeline exceeded its time budget");
                envelope::failure(
                    RunStatus::Timeout,
                    criteria,
                    vec![envelope::source_failed(
                        &self.config.source_name,
                        timeout.to_string(),
                    )],
                    timeout.to_string(),
                )
            }
        };

        let outcome = PipelineOutcome {
            run_id,
            status: envelope.status,
            envelope,
            elapsed: start.elapsed(),
        };

        info!(
            %run_id,
            status = %outcome.status,
            http_status = outcome.http_status(),
            courses = outcome.envelope.total,
            elapsed_ms = outcome.elapsed.as_millis() as u64,
            "course search finished"
        );
        progress.done(&outcome);

        outcome
    }

    /// The stages under the time budget. `Err` is reserved for failures that
    /// fit no other status.
    async fn run_stages(
        &self,
        criteria: &SearchCriteria,
        progress: &dyn ProgressReporter,
    ) -> livecourses_shared::Result<ResultEnvelope> {
        let source = self.config.source_name.as_str();

        // --- Configuration ---
        let client = match ScrapeClient::from_config(&self.config) {
            Ok(client) => client,
            Err(e @ LiveCoursesError::Config { .. }) => {
                error!(error = %e, "scrape provider is not configured");
                return Ok(envelope::failure(
                    RunStatus::ConfigError,
                    criteria.clone(),
                    Vec::new(),
                    e.to_string(),
                ));
            }
            Err(e) => return Err(e),
        };

        // --- Stage 0: Health check ---
        progress.phase(PipelineStage::HealthCheck);
        let prober = HealthProber::from_config(&self.config)?;
        if !prober.is_available().await {
            let e = LiveCoursesError::Unavailable(format!(
                "health check against {} failed",
                self.config.base_url
            ));
            warn!(error = %e, "skipping search");
            return Ok(envelope::failure(
                RunStatus::Unavailable,
                criteria.clone(),
                vec![envelope::source_failed(source, e.to_string())],
                e.to_string(),
            ));
        }

        // --- Stage 1: Listing ---
        progress.phase(PipelineStage::Listing);
        let candidates = match fetch_listing(&client, &self.config, criteria).await {
            Ok(candidates) => candidates,
            Err(e) => {
                error!(error = %e, "listing stage failed");
                return Ok(envelope::failure(
                    RunStatus::ListingFailed,
                    criteria.clone(),
                    vec![envelope::source_failed(source, e.to_string())],
                    e.to_string(),
                ));
            }
        };
        let source_result = envelope::source_ok(source, candidates.len());

        // --- Stage 2: Enrichment ---
        progress.phase(PipelineStage::Enriching);
        let enricher = DetailEnricher::new(&client, &self.config);
        let batch = enricher
            .enrich(candidates, self.config.enrichment_limit, progress)
            .await;

        // --- Stage 3: Dedupe ---
        progress.phase(PipelineStage::Deduping);
        let deduped = dedupe(batch.records);
        info!(
            unique = deduped.unique.len(),
            removed = deduped.removed_count,
            "deduplication complete"
        );

        Ok(envelope::success(
            criteria.clone(),
            vec![source_result],
            deduped,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};
    use std::sync::Mutex;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(server: &MockServer) -> PipelineConfig {
        let mut app = livecourses_shared::AppConfig::default();
        app.provider.base_url = server.uri();
        app.provider.listing_url_template =
            "https://courses.example.com/search?q={keywords}&l={location}".into();
        app.provider.source_name = "example".into();
        let mut config = PipelineConfig::from(&app);
        config.api_key = Some("test-key".into());
        config.pacing = Duration::ZERO;
        config.max_attempts = 2;
        config.backoff_base = Duration::from_millis(1);
        config.backoff_cap = Duration::from_millis(2);
        config.global_timeout = Duration::from_secs(10);
        config
    }

    fn listing_body(courses: Value) -> Value {
        json!({ "success": true, "data": { "json": { "courses": courses } } })
    }

    async fn mount_health(server: &MockServer, status: u16) {
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(status))
            .mount(server)
            .await;
    }

    async fn mount_listing(server: &MockServer, response: ResponseTemplate) {
        Mock::given(method("POST"))
            .and(path("/v1/scrape"))
            .and(body_partial_json(json!({ "waitFor": 2000 })))
            .respond_with(response)
            .mount(server)
            .await;
    }

    #[derive(Default)]
    struct RecordingProgress {
        phases: Mutex<Vec<PipelineStage>>,
        done: Mutex<Option<RunStatus>>,
    }

    impl ProgressReporter for RecordingProgress {
        fn phase(&self, stage: PipelineStage) {
            self.phases.lock().unwrap().push(stage);
        }
        fn candidate_progress(&self, _title: &str, _current: usize, _total: usize) {}
        fn done(&self, outcome: &PipelineOutcome) {
            *self.done.lock().unwrap() = Some(outcome.status);
        }
    }

    #[tokio::test]
    async fn full_run_enriches_and_dedupes() {
        let server = MockServer::start().await;
        mount_health(&server, 200).await;
        mount_listing(
            &server,
            ResponseTemplate::new(200).set_body_json(listing_body(json!([
                { "title": "AM2 Prep", "provider": "Acme", "detailsUrl": "/c/am2" },
                { "title": "am2  prep", "provider": "ACME" },
                { "title": "Solar PV Install", "provider": "Green Skills", "detailsUrl": "/c/pv" }
            ]))),
        )
        .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "url": "https://courses.example.com/c/am2" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": { "json": { "futureScope": "Demand rising, 5/5", "duration": "4 days" } }
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "url": "https://courses.example.com/c/pv" })))
            .respond_with(ResponseTemplate::new(500))
            .expect(2)
            .mount(&server)
            .await;

        let pipeline = Pipeline::new(test_config(&server));
        let progress = RecordingProgress::default();
        let outcome = pipeline.run(SearchCriteria::default(), &progress).await;

        assert_eq!(outcome.status, RunStatus::Success);
        assert_eq!(outcome.http_status(), 200);

        let env = &outcome.envelope;
        assert_eq!(env.summary.original_courses, 3);
        assert_eq!(env.summary.total_courses, 2);
        assert_eq!(env.summary.duplicates_removed, 1);
        assert_eq!(env.summary.enriched_courses, 1);
        assert_eq!(env.summary.source_breakdown.get("example"), Some(&2));
        assert!(env.is_live_data);
        assert!(!env.processing);
        assert_eq!(env.source_results.len(), 1);
        assert!(env.source_results[0].success);
        assert_eq!(env.source_results[0].course_count, 3);

        let am2 = &env.courses[0];
        assert_eq!(am2.course.title, "AM2 Prep");
        assert!(am2.has_detailed_info);
        assert_eq!(am2.future_proofing, 5);
        assert_eq!(am2.course.duration, "4 days");
        assert!(!env.courses[1].has_detailed_info);

        assert_eq!(
            *progress.phases.lock().unwrap(),
            vec![
                PipelineStage::HealthCheck,
                PipelineStage::Listing,
                PipelineStage::Enriching,
                PipelineStage::Deduping,
            ]
        );
        assert_eq!(*progress.done.lock().unwrap(), Some(RunStatus::Success));
    }

    #[tokio::test]
    async fn unavailable_provider_makes_no_requests() {
        let server = MockServer::start().await;
        mount_health(&server, 503).await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let pipeline = Pipeline::new(test_config(&server));
        let outcome = pipeline.run(SearchCriteria::default(), &SilentProgress).await;

        assert_eq!(outcome.status, RunStatus::Unavailable);
        assert_eq!(outcome.http_status(), 503);
        assert!(outcome.envelope.courses.is_empty());
        assert!(outcome.envelope.error.is_some());
        assert!(outcome.envelope.technical_error.is_some());
        assert_ne!(outcome.envelope.error, outcome.envelope.technical_error);
    }

    #[tokio::test]
    async fn listing_failure_is_not_retried_again() {
        let server = MockServer::start().await;
        mount_health(&server, 200).await;
        // max_attempts = 2 inside the client, nothing more from the orchestrator.
        mount_listing(&server, ResponseTemplate::new(502)).await;

        let pipeline = Pipeline::new(test_config(&server));
        let outcome = pipeline.run(SearchCriteria::default(), &SilentProgress).await;

        assert_eq!(outcome.status, RunStatus::ListingFailed);
        assert_eq!(outcome.http_status(), 503);
        let env = &outcome.envelope;
        assert!(env.courses.is_empty());
        assert_eq!(env.source_results.len(), 1);
        assert!(!env.source_results[0].success);
        assert!(env.source_results[0].error.as_deref().unwrap().contains("2 attempt(s)"));

        let posts = server
            .received_requests()
            .await
            .unwrap()
            .into_iter()
            .filter(|r| r.method.as_str() == "POST")
            .count();
        assert_eq!(posts, 2);
    }

    #[tokio::test]
    async fn empty_listing_is_success() {
        let server = MockServer::start().await;
        mount_health(&server, 200).await;
        mount_listing(
            &server,
            ResponseTemplate::new(200).set_body_json(listing_body(json!([]))),
        )
        .await;

        let pipeline = Pipeline::new(test_config(&server));
        let outcome = pipeline.run(SearchCriteria::default(), &SilentProgress).await;

        assert_eq!(outcome.status, RunStatus::Success);
        assert_eq!(outcome.envelope.total, 0);
        assert!(outcome.envelope.error.is_none());
    }

    #[tokio::test]
    async fn missing_credential_fails_before_network() {
        let server = MockServer::start().await;
        Mock::given(wiremock::matchers::any())
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let mut config = test_config(&server);
        config.api_key = None;
        let outcome = Pipeline::new(config)
            .run(SearchCriteria::default(), &SilentProgress)
            .await;

        assert_eq!(outcome.status, RunStatus::ConfigError);
        assert_eq!(outcome.http_status(), 503);
        assert!(
            outcome
                .envelope
                .technical_error
                .as_deref()
                .unwrap()
                .contains("FIRECRAWL_API_KEY")
        );
    }

    #[tokio::test]
    async fn global_timeout_wins_the_race() {
        let server = MockServer::start().await;
        mount_health(&server, 200).await;
        mount_listing(
            &server,
            ResponseTemplate::new(200)
                .set_body_json(listing_body(json!([])))
                .set_delay(Duration::from_millis(200)),
        )
        .await;

        let mut config = test_config(&server);
        config.global_timeout = Duration::from_millis(50);
        let pipeline = Pipeline::new(config);

        let started = Instant::now();
        let outcome = pipeline.run(SearchCriteria::default(), &SilentProgress).await;
        let took = started.elapsed();

        assert_eq!(outcome.status, RunStatus::Timeout);
        assert_eq!(outcome.http_status(), 408);
        assert!(took < Duration::from_millis(190), "took {took:?}");
        assert!(!outcome.envelope.processing);
        assert!(outcome.envelope.courses.is_empty());
        assert!(outcome.envelope.error.as_deref().unwrap().contains("too long"));
    }
}
