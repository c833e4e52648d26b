//! Wire format of the provider's structured-extraction endpoint.
//!
//! A request names a page URL plus a prompt and JSON schema; the provider
//! renders the page and answers with `{ success, data: { json, metadata } }`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use livecourses_shared::{LiveCoursesError, Result};

/// Provider-side render timeout sent with each request, in ms.
pub const PROVIDER_TIMEOUT_MS: u64 = 30_000;

/// Body of a structured-extraction request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeRequest {
    pub url: String,
    pub formats: Vec<String>,
    pub only_main_content: bool,
    pub json_options: JsonOptions,
    pub timeout: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wait_for: Option<u64>,
}

/// Extraction instructions.
#[derive(Debug, Clone, Serialize)]
pub struct JsonOptions {
    pub prompt: String,
    pub schema: Value,
}

impl ScrapeRequest {
    /// JSON extraction of `url` guided by `prompt` and `schema`.
    pub fn extract(url: impl Into<String>, prompt: impl Into<String>, schema: Value) -> Self {
        Self {
            url: url.into(),
            formats: vec!["json".into()],
            only_main_content: true,
            json_options: JsonOptions {
                prompt: prompt.into(),
                schema,
            },
            timeout: PROVIDER_TIMEOUT_MS,
            wait_for: None,
        }
    }

    /// Ask the provider to wait for client-side rendering before extracting.
    pub fn wait_for(mut self, ms: u64) -> Self {
        self.wait_for = Some(ms);
        self
    }

    pub fn to_payload(&self) -> Result<Value> {
        serde_json::to_value(self)
            .map_err(|e| LiveCoursesError::parse(format!("failed to serialize request: {e}")))
    }
}

/// Response envelope of the extraction endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ScrapeResponse {
    #[serde(default = "default_success")]
    pub success: bool,
    #[serde(default)]
    pub data: Option<ScrapeData>,
    #[serde(default)]
    pub error: Option<String>,
}

fn default_success() -> bool {
    true
}

/// `data` member of a [`ScrapeResponse`].
#[derive(Debug, Clone, Deserialize)]
pub struct ScrapeData {
    #[serde(default)]
    pub json: Option<Value>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

/// Pull the extracted JSON object out of a raw response body.
pub fn extracted_json(body: Value) -> Result<Value> {
    let response: ScrapeResponse = serde_json::from_value(body)
        .map_err(|e| LiveCoursesError::parse(format!("unexpected provider response: {e}")))?;

    if !response.success {
        return Err(LiveCoursesError::parse(
            response
                .error
                .unwrap_or_else(|| "provider reported failure".into()),
        ));
    }

    response
        .data
        .and_then(|d| d.json)
        .ok_or_else(|| LiveCoursesError::parse("provider response has no data.json"))
}
