//! Shared types, error model, and configuration for LiveCourses.
//!
//! This crate is the foundation depended on by all other LiveCourses crates.
//! It provides:
//! - [`LiveCoursesError`]: the unified error type
//! - Domain types ([`SearchCriteria`], [`CandidateRecord`], [`EnrichedRecord`], [`ResultEnvelope`])
//! - Configuration ([`AppConfig`], [`PipelineConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DefaultsConfig, PipelineConfig, PipelineLimitsConfig, ProviderConfig, config_dir,
    config_file_path, init_config, load_config, load_config_from, validate_config,
};
pub use error::{LiveCoursesError, Result};
pub use types::{
    CandidateRecord, DEFAULT_FUTURE_PROOFING, EnrichedRecord, EnrichmentFields, EnvelopeSummary,
    NOT_SPECIFIED, ResultEnvelope, RunStatus, SearchCriteria, SearchRequest, SourceResult,
};
