//! Result envelope assembly.
//!
//! Every terminal state of a run goes through one of these constructors, so
//! the caller always gets the same structure whether the run succeeded or not.

use std::collections::BTreeMap;

use chrono::Utc;

use livecourses_shared::{
    EnvelopeSummary, ResultEnvelope, RunStatus, SearchCriteria, SourceResult,
};

use crate::dedupe::Deduplicated;

/// Message shown to end users for a non-success status.
pub fn user_message(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Success => "",
        RunStatus::Unavailable => {
            "Live course search is temporarily unavailable. Please try again later."
        }
        RunStatus::ListingFailed => {
            "We couldn't fetch live courses right now. Please try again in a few minutes."
        }
        RunStatus::Timeout => {
            "The course search took too long. Try narrowing your keywords or location."
        }
        RunStatus::ConfigError => "Live course search is not configured on this server.",
        RunStatus::Error => "An unexpected error occurred while searching for courses.",
    }
}

/// Outcome record for a source that answered.
pub fn source_ok(source: &str, course_count: usize) -> SourceResult {
    SourceResult {
        source: source.to_string(),
        success: true,
        error: None,
        course_count,
        timestamp: Utc::now(),
    }
}

/// Outcome record for a source that failed.
pub fn source_failed(source: &str, error: impl Into<String>) -> SourceResult {
    SourceResult {
        source: source.to_string(),
        success: false,
        error: Some(error.into()),
        course_count: 0,
        timestamp: Utc::now(),
    }
}

/// Envelope for a completed run.
pub fn success(
    criteria: SearchCriteria,
    source_results: Vec<SourceResult>,
    deduped: Deduplicated,
) -> ResultEnvelope {
    let courses = deduped.unique;
    let total = courses.len();
    let original_courses = total + deduped.removed_count;

    let mut source_breakdown: BTreeMap<String, usize> = BTreeMap::new();
    for course in &courses {
        *source_breakdown.entry(course.course.source.clone()).or_default() += 1;
    }

    let enriched_courses = courses.iter().filter(|c| c.has_detailed_info).count();

    ResultEnvelope {
        summary: EnvelopeSummary {
            total_courses: total,
            original_courses,
            duplicates_removed: deduped.removed_count,
            enriched_courses,
            live_courses: total,
            source_breakdown,
            search_criteria: criteria,
            last_updated: Utc::now(),
        },
        courses,
        total,
        source_results,
        is_live_data: true,
        processing: false,
        status: RunStatus::Success,
        error: None,
        technical_error: None,
    }
}

/// Empty envelope for any non-success terminal state.
pub fn failure(
    status: RunStatus,
    criteria: SearchCriteria,
    source_results: Vec<SourceResult>,
    technical_error: impl Into<String>,
) -> ResultEnvelope {
    ResultEnvelope {
        courses: Vec::new(),
        total: 0,
        summary: EnvelopeSummary {
            total_courses: 0,
            original_courses: 0,
            duplicates_removed: 0,
            enriched_courses: 0,
            live_courses: 0,
            source_breakdown: BTreeMap::new(),
            search_criteria: criteria,
            last_updated: Utc::now(),
        },
        source_results,
        is_live_data: false,
        processing: false,
        status,
        error: Some(user_message(status).to_string()),
        technical_error: Some(technical_error.into()),
    }
}
