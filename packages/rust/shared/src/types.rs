//! Core domain types for course aggregation runs.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::DefaultsConfig;

/// Placeholder used for any optional text field the listing did not supply.
pub const NOT_SPECIFIED: &str = "Not specified";

/// Future-proofing score used when the outlook text carries no `X/5` rating.
pub const DEFAULT_FUTURE_PROOFING: u8 = 3;

// ---------------------------------------------------------------------------
// Search input
// ---------------------------------------------------------------------------

/// Resolved search parameters for one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchCriteria {
    pub keywords: String,
    pub location: String,
}

impl Default for SearchCriteria {
    fn default() -> Self {
        let defaults = DefaultsConfig::default();
        Self {
            keywords: defaults.keywords,
            location: defaults.location,
        }
    }
}

/// Raw caller request body: `{ keywords?: string, location?: string }`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub keywords: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
}

impl SearchRequest {
    /// Fill absent or blank fields from `defaults`.
    pub fn resolve(self, defaults: &DefaultsConfig) -> SearchCriteria {
        fn pick(value: Option<String>, fallback: &str) -> String {
            match value {
                Some(v) if !v.trim().is_empty() => v.trim().to_string(),
                _ => fallback.to_string(),
            }
        }

        SearchCriteria {
            keywords: pick(self.keywords, &defaults.keywords),
            location: pick(self.location, &defaults.location),
        }
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A course known only from the listing stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateRecord {
    /// Stable id derived from the identity key.
    pub id: String,
    pub title: String,
    pub provider: String,
    pub description: String,
    pub duration: String,
    pub level: String,
    pub format: String,
    /// Price or price range, as displayed by the source.
    pub price: String,
    /// Locator of the course detail page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details_url: Option<String>,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f32>,
    /// Listing source this record came from.
    pub source: String,
}

/// Secondary fields fetched by the detail stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichmentFields {
    pub prerequisites: Vec<String>,
    pub course_outline: Vec<String>,
    pub assessment_method: Vec<String>,
    pub continuous_assessment: bool,
    pub accreditation: Vec<String>,
    pub learning_outcomes: Vec<String>,
    pub upcoming_dates: Vec<String>,
    pub locations: Vec<String>,
    pub employer_support: bool,
    /// Free-text industry outlook; may contain an `X/5` rating.
    pub future_scope: String,
}

impl EnrichmentFields {
    /// The one fallback shape used whenever enrichment is skipped or fails.
    pub fn empty() -> Self {
        Self::default()
    }
}

/// A candidate after the detail stage, whether or not enrichment succeeded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedRecord {
    #[serde(flatten)]
    pub course: CandidateRecord,
    #[serde(flatten)]
    pub details: EnrichmentFields,
    /// 1–5 score parsed from `future_scope`.
    pub future_proofing: u8,
    pub has_detailed_info: bool,
}

// ---------------------------------------------------------------------------
// Result envelope
// ---------------------------------------------------------------------------

/// Terminal state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Unavailable,
    ListingFailed,
    Timeout,
    ConfigError,
    Error,
}

impl RunStatus {
    /// HTTP-equivalent status code reported to the caller.
    pub fn http_status(self) -> u16 {
        match self {
            Self::Success => 200,
            Self::Unavailable | Self::ListingFailed | Self::ConfigError => 503,
            Self::Timeout => 408,
            Self::Error => 500,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Unavailable => "unavailable",
            Self::ListingFailed => "listing_failed",
            Self::Timeout => "timeout",
            Self::ConfigError => "config_error",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of querying one listing source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceResult {
    pub source: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub course_count: usize,
    pub timestamp: DateTime<Utc>,
}

/// Aggregate counts and echoes carried in the envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeSummary {
    pub total_courses: usize,
    pub original_courses: usize,
    pub duplicates_removed: usize,
    /// Courses whose detail fetch succeeded.
    pub enriched_courses: usize,
    pub live_courses: usize,
    /// Course count per source, after deduplication.
    pub source_breakdown: BTreeMap<String, usize>,
    pub search_criteria: SearchCriteria,
    pub last_updated: DateTime<Utc>,
}

/// The single structured response of a run, in success and failure alike.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultEnvelope {
    pub courses: Vec<EnrichedRecord>,
    pub total: usize,
    pub summary: EnvelopeSummary,
    pub source_results: Vec<SourceResult>,
    pub is_live_data: bool,
    /// Always `false` once an envelope is handed to the caller.
    pub processing: bool,
    pub status: RunStatus,
    /// Human-readable failure message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Diagnostic detail for logs and support.
    #[serde(
        rename = "technical_error",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub technical_error: Option<String>,
}
