//! Live course aggregation: listing, enrichment, deduplication, and the
//! orchestrating pipeline.
//!
//! This crate ties the scrape provider client into one end-to-end search
//! (`Pipeline::run`) that always produces a [`ResultEnvelope`].
//!
//! [`ResultEnvelope`]: livecourses_shared::ResultEnvelope

pub mod dedupe;
pub mod enrichment;
pub mod envelope;
pub mod listing;
pub mod pipeline;

pub use dedupe::{Deduplicated, dedupe, identity_key};
pub use enrichment::{CircuitBreaker, DetailEnricher, EnrichmentBatch, future_proofing_score};
pub use pipeline::{Pipeline, PipelineOutcome, PipelineStage, ProgressReporter, SilentProgress};
