//! Scrape provider access: health probe, retrying client, and wire format.
//!
//! This crate provides:
//! - [`health`]: [`HealthProber`], the fail-fast availability gate
//! - [`client`]: [`ScrapeClient`] with bounded exponential-backoff retries
//! - [`provider`]: request/response shapes of the extraction endpoint

pub mod client;
pub mod health;
pub mod provider;

pub use client::{RetryPolicy, ScrapeClient};
pub use health::HealthProber;
pub use provider::{ScrapeRequest, extracted_json};
