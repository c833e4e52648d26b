//! Stage 2: per-course detail enrichment with a circuit breaker.
//!
//! Candidates are processed strictly one at a time, in listing order. Only
//! the first `limit` candidates get a detail fetch. Each failed fetch feeds
//! a [`CircuitBreaker`]; once it opens, the rest of the batch falls back to
//! empty enrichment without touching the network.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info, instrument, warn};

use livecourses_scrape::{ScrapeClient, ScrapeRequest, extracted_json};
use livecourses_shared::{
    CandidateRecord, DEFAULT_FUTURE_PROOFING, EnrichedRecord, EnrichmentFields,
    LiveCoursesError, PipelineConfig, Result,
};

use crate::listing::{parse_rating, value_text};
use crate::pipeline::ProgressReporter;

const DETAIL_PROMPT: &str = "Extract the full details of this training course: \
entry requirements or prerequisites, the course outline or modules, assessment \
methods, whether assessment is continuous, accreditations or awarding bodies, \
learning outcomes, upcoming start dates, venues or locations, whether employer \
funding or support is available, and the industry outlook for this skill, \
rated as X/5 where possible. Also return description, duration, level, format \
and price if shown.";

// ---------------------------------------------------------------------------
// Circuit breaker
// ---------------------------------------------------------------------------

/// Failure counter for one enrichment batch.
///
/// Open once `failures >= threshold`; never closes again within the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreaker {
    failures: u32,
    threshold: u32,
}

impl CircuitBreaker {
    pub fn new(threshold: u32) -> Self {
        Self {
            failures: 0,
            threshold: threshold.max(1),
        }
    }

    pub fn record_failure(&mut self) {
        self.failures += 1;
    }

    pub fn is_open(&self) -> bool {
        self.failures >= self.threshold
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }
}

// ---------------------------------------------------------------------------
// Batch results
// ---------------------------------------------------------------------------

/// Per-batch counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnrichmentStats {
    /// Detail fetches issued (each may include retries).
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Skipped because the breaker was open.
    pub short_circuited: usize,
    /// Skipped because they were past the limit.
    pub beyond_limit: usize,
    /// Skipped because they had no details link.
    pub no_details: usize,
}

/// Everything one enrichment pass produces.
#[derive(Debug, Clone)]
pub struct EnrichmentBatch {
    /// One record per candidate, in input order.
    pub records: Vec<EnrichedRecord>,
    /// Breaker state at the end of the batch.
    pub breaker: CircuitBreaker,
    pub stats: EnrichmentStats,
}

// ---------------------------------------------------------------------------
// Enricher
// ---------------------------------------------------------------------------

/// Fetches and merges course details through the retrying client.
pub struct DetailEnricher<'a> {
    client: &'a ScrapeClient,
    endpoint: String,
    failure_threshold: u32,
    pacing: Duration,
}

impl<'a> DetailEnricher<'a> {
    pub fn new(client: &'a ScrapeClient, config: &PipelineConfig) -> Self {
        Self {
            client,
            endpoint: config.scrape_endpoint.clone(),
            failure_threshold: config.failure_threshold,
            pacing: config.pacing,
        }
    }

    /// Enrich `candidates`, fetching details for at most the first `limit`.
    #[instrument(skip_all, fields(candidates = candidates.len(), limit = limit))]
    pub async fn enrich(
        &self,
        candidates: Vec<CandidateRecord>,
        limit: usize,
        progress: &dyn ProgressReporter,
    ) -> EnrichmentBatch {
        let total = candidates.len();
        let mut breaker = CircuitBreaker::new(self.failure_threshold);
        let mut stats = EnrichmentStats::default();
        let mut records = Vec::with_capacity(total);

        for (idx, candidate) in candidates.into_iter().enumerate() {
            progress.candidate_progress(&candidate.title, idx + 1, total);

            if idx >= limit {
                stats.beyond_limit += 1;
                records.push(unenriched(candidate));
                continue;
            }

            if breaker.is_open() {
                stats.short_circuited += 1;
                records.push(unenriched(candidate));
                continue;
            }

            let Some(details_url) = candidate.details_url.clone() else {
                stats.no_details += 1;
                records.push(unenriched(candidate));
                continue;
            };

            stats.attempted += 1;
            match self.fetch_details(&details_url).await {
                Ok(details) => {
                    stats.succeeded += 1;
                    debug!(title = %candidate.title, "course enriched");
                    records.push(merge_details(candidate, details));

                    if !self.pacing.is_zero() {
                        tokio::time::sleep(self.pacing).await;
                    }
                }
                Err(e) => {
                    stats.failed += 1;
                    breaker.record_failure();
                    warn!(
                        title = %candidate.title,
                        url = %details_url,
                        failures = breaker.failures(),
                        error = %e,
                        "detail fetch failed, using basic info"
                    );
                    if breaker.is_open() {
                        warn!(
                            threshold = breaker.threshold(),
                            "circuit breaker open, skipping remaining detail fetches"
                        );
                    }
                    records.push(unenriched(candidate));
                }
            }
        }

        info!(
            attempted = stats.attempted,
            succeeded = stats.succeeded,
            failed = stats.failed,
            short_circuited = stats.short_circuited,
            beyond_limit = stats.beyond_limit,
            "enrichment complete"
        );

        EnrichmentBatch {
            records,
            breaker,
            stats,
        }
    }

    async fn fetch_details(&self, details_url: &str) -> Result<DetailResponse> {
        let payload = ScrapeRequest::extract(details_url, DETAIL_PROMPT, detail_schema())
            .to_payload()?;
        let body = self.client.send(&self.endpoint, &payload).await?;
        let extracted = extracted_json(body)?;

        serde_json::from_value(extracted)
            .map_err(|e| LiveCoursesError::parse(format!("{details_url}: bad detail shape: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Merging
// ---------------------------------------------------------------------------

/// Detail-page extraction. Fields shared with the listing override the
/// candidate only when non-empty. Values stay raw so that one field of an
/// unexpected type is dropped on its own instead of failing the response.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DetailResponse {
    pub description: Option<Value>,
    pub duration: Option<Value>,
    pub level: Option<Value>,
    pub format: Option<Value>,
    pub price: Option<Value>,
    pub category: Option<Value>,
    pub rating: Option<Value>,
    pub prerequisites: Option<Value>,
    pub course_outline: Option<Value>,
    pub assessment_method: Option<Value>,
    pub continuous_assessment: Option<Value>,
    pub accreditation: Option<Value>,
    pub learning_outcomes: Option<Value>,
    pub upcoming_dates: Option<Value>,
    pub locations: Option<Value>,
    pub employer_support: Option<Value>,
    pub future_scope: Option<Value>,
}

/// JSON schema the provider fills for a detail page.
pub fn detail_schema() -> Value {
    let list = json!({ "type": "array", "items": { "type": "string" } });
    json!({
        "type": "object",
        "properties": {
            "description": { "type": "string" },
            "duration": { "type": "string" },
            "level": { "type": "string" },
            "format": { "type": "string" },
            "price": { "type": "string" },
            "category": { "type": "string" },
            "rating": { "type": "number" },
            "prerequisites": list,
            "courseOutline": list,
            "assessmentMethod": list,
            "continuousAssessment": { "type": "boolean" },
            "accreditation": list,
            "learningOutcomes": list,
            "upcomingDates": list,
            "locations": list,
            "employerSupport": { "type": "boolean" },
            "futureScope": { "type": "string" }
        }
    })
}

/// Candidate passed through with the empty enrichment shape.
pub fn unenriched(course: CandidateRecord) -> EnrichedRecord {
    let details = EnrichmentFields::empty();
    EnrichedRecord {
        future_proofing: future_proofing_score(&details.future_scope),
        course,
        details,
        has_detailed_info: false,
    }
}

/// Build a new record from `course` with `detail` layered on top.
pub fn merge_details(mut course: CandidateRecord, detail: DetailResponse) -> EnrichedRecord {
    override_text(&mut course.description, detail.description);
    override_text(&mut course.duration, detail.duration);
    override_text(&mut course.level, detail.level);
    override_text(&mut course.format, detail.format);
    override_text(&mut course.price, detail.price);
    override_text(&mut course.category, detail.category);
    if let Some(rating) = detail
        .rating
        .as_ref()
        .and_then(parse_rating)
        .filter(|r| *r > 0.0)
    {
        course.rating = Some(rating);
    }

    let details = EnrichmentFields {
        prerequisites: clean_list(detail.prerequisites),
        course_outline: clean_list(detail.course_outline),
        assessment_method: clean_list(detail.assessment_method),
        continuous_assessment: flag(detail.continuous_assessment),
        accreditation: clean_list(detail.accreditation),
        learning_outcomes: clean_list(detail.learning_outcomes),
        upcoming_dates: clean_list(detail.upcoming_dates),
        locations: clean_list(detail.locations),
        employer_support: flag(detail.employer_support),
        future_scope: detail
            .future_scope
            .as_ref()
            .and_then(value_text)
            .unwrap_or_default(),
    };

    EnrichedRecord {
        future_proofing: future_proofing_score(&details.future_scope),
        course,
        details,
        has_detailed_info: true,
    }
}

fn override_text(slot: &mut String, incoming: Option<Value>) {
    if let Some(value) = incoming.as_ref().and_then(value_text) {
        *slot = value;
    }
}

/// A list field; a lone scalar counts as a one-item list.
fn clean_list(items: Option<Value>) -> Vec<String> {
    match items {
        Some(Value::Array(items)) => items.iter().filter_map(value_text).collect(),
        Some(other) => value_text(&other).into_iter().collect(),
        None => Vec::new(),
    }
}

/// A yes/no field given as a bool, a number or a word.
fn flag(value: Option<Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
        Some(Value::String(s)) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "true" | "yes" | "y" | "available"
        ),
        _ => false,
    }
}

/// Score 1–5 taken from the first `X/5` in `text`; 3 when absent or out of range.
pub fn future_proofing_score(text: &str) -> u8 {
    static SCORE_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(\d+(?:\.\d+)?)\s*/\s*5(?:\D|$)").expect("valid regex")
    });

    SCORE_RE
        .captures(text)
        .and_then(|caps| caps[1].parse::<f32>().ok())
        .map(f32::round)
        .filter(|score| (1.0..=5.0).contains(score))
        .map(|score| score as u8)
        .unwrap_or(DEFAULT_FUTURE_PROOFING)
}
