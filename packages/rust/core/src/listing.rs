//! Stage 1: extract candidate courses from the listing page.

use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info, instrument};
use url::Url;
use url::form_urlencoded::byte_serialize;

use livecourses_scrape::{ScrapeClient, ScrapeRequest, extracted_json};
use livecourses_shared::{
    CandidateRecord, LiveCoursesError, NOT_SPECIFIED, PipelineConfig, Result, SearchCriteria,
};

use crate::dedupe::identity_key;

/// Give client-rendered listing pages time to populate.
const LISTING_WAIT_MS: u64 = 2_000;

const LISTING_PROMPT: &str = "Extract every training course listed on this page. \
For each course return its title, the training provider, a short description, \
duration, level, delivery format, price or price range, the link to the course \
detail page, category, and rating if shown. Leave a field out if it is not shown.";

/// JSON schema the provider fills for a listing page.
pub fn listing_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "courses": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "title": { "type": "string" },
                        "provider": { "type": "string" },
                        "description": { "type": "string" },
                        "duration": { "type": "string" },
                        "level": { "type": "string" },
                        "format": { "type": "string" },
                        "price": { "type": "string" },
                        "detailsUrl": { "type": "string" },
                        "category": { "type": "string" },
                        "rating": { "type": "number" }
                    },
                    "required": ["title", "provider"]
                }
            }
        },
        "required": ["courses"]
    })
}

/// Fill the listing URL template with URL-encoded criteria.
pub fn listing_url(template: &str, criteria: &SearchCriteria) -> Result<Url> {
    let encode = |s: &str| byte_serialize(s.as_bytes()).collect::<String>();
    let filled = template
        .replace("{keywords}", &encode(&criteria.keywords))
        .replace("{location}", &encode(&criteria.location));

    Url::parse(&filled).map_err(|e| {
        LiveCoursesError::validation(format!("invalid listing URL '{filled}': {e}"))
    })
}

/// Build the extraction request for the listing page.
pub fn listing_request(listing: &Url) -> ScrapeRequest {
    ScrapeRequest::extract(listing.as_str(), LISTING_PROMPT, listing_schema())
        .wait_for(LISTING_WAIT_MS)
}

/// Run the listing stage: one retried provider call, then parsing.
#[instrument(skip_all, fields(keywords = %criteria.keywords, location = %criteria.location))]
pub async fn fetch_listing(
    client: &ScrapeClient,
    config: &PipelineConfig,
    criteria: &SearchCriteria,
) -> Result<Vec<CandidateRecord>> {
    let listing = listing_url(&config.listing_url_template, criteria)?;
    info!(url = %listing, "requesting course listing");

    let payload = listing_request(&listing).to_payload()?;
    let body = client.send(&config.scrape_endpoint, &payload).await?;
    let extracted = extracted_json(body)?;

    let candidates = parse_candidates(&extracted, &config.source_name, &listing);
    info!(candidates = candidates.len(), "listing parsed");
    Ok(candidates)
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// One course as the provider extracted it. Every field may be missing or
/// carry an unexpected JSON type, so values stay raw until converted.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCourse {
    #[serde(default)]
    title: Option<Value>,
    #[serde(default, alias = "providerName")]
    provider: Option<Value>,
    #[serde(default)]
    description: Option<Value>,
    #[serde(default)]
    duration: Option<Value>,
    #[serde(default)]
    level: Option<Value>,
    #[serde(default)]
    format: Option<Value>,
    #[serde(default, alias = "priceRange")]
    price: Option<Value>,
    #[serde(default, alias = "url", alias = "link")]
    details_url: Option<Value>,
    #[serde(default)]
    category: Option<Value>,
    #[serde(default)]
    rating: Option<Value>,
}

/// Convert extracted JSON into candidates.
///
/// Accepts `{ "courses": [...] }` or a bare array. Entries without a title
/// or provider are dropped; relative detail links are resolved against the
/// listing URL.
pub fn parse_candidates(extracted: &Value, source: &str, listing: &Url) -> Vec<CandidateRecord> {
    let items = match extracted {
        Value::Array(items) => items.as_slice(),
        Value::Object(map) => match map.get("courses") {
            Some(Value::Array(items)) => items.as_slice(),
            _ => &[],
        },
        _ => &[],
    };

    let mut candidates = Vec::with_capacity(items.len());
    for item in items {
        let raw: RawCourse = match serde_json::from_value(item.clone()) {
            Ok(raw) => raw,
            Err(e) => {
                debug!(error = %e, "skipping malformed listing entry");
                continue;
            }
        };

        let (Some(title), Some(provider)) = (text(raw.title), text(raw.provider)) else {
            debug!("skipping listing entry without title or provider");
            continue;
        };

        candidates.push(CandidateRecord {
            id: slug(&identity_key(&title, &provider)),
            description: or_placeholder(raw.description),
            duration: or_placeholder(raw.duration),
            level: or_placeholder(raw.level),
            format: or_placeholder(raw.format),
            price: or_placeholder(raw.price),
            details_url: text(raw.details_url).and_then(|u| resolve_link(listing, &u)),
            category: or_placeholder(raw.category),
            rating: raw.rating.as_ref().and_then(parse_rating),
            source: source.to_string(),
            title,
            provider,
        });
    }

    candidates
}

/// Text form of an extracted scalar. Numbers and booleans are stringified;
/// blanks, placeholders, arrays and objects yield `None`.
pub(crate) fn value_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!text.is_empty() && text != NOT_SPECIFIED).then_some(text)
}

fn text(value: Option<Value>) -> Option<String> {
    value.as_ref().and_then(value_text)
}

fn or_placeholder(value: Option<Value>) -> String {
    text(value).unwrap_or_else(|| NOT_SPECIFIED.to_string())
}

/// Ratings come back as numbers or strings like `"4.5/5"`.
pub(crate) fn parse_rating(value: &Value) -> Option<f32> {
    let rating = match value {
        Value::Number(n) => n.as_f64()? as f32,
        Value::String(s) => s.split('/').next()?.trim().parse::<f32>().ok()?,
        _ => return None,
    };
    (rating.is_finite() && rating >= 0.0).then_some(rating)
}

fn resolve_link(listing: &Url, link: &str) -> Option<String> {
    let resolved = listing.join(link).ok()?;
    matches!(resolved.scheme(), "http" | "https").then(|| resolved.to_string())
}

fn slug(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut last_dash = false;
    for c in key.chars() {
        if c.is_alphanumeric() {
            out.push(c);
            last_dash = false;
        } else if !last_dash && !out.is_empty() {
            out.push('-');
            last_dash = true;
        }
    }
    out.trim_end_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing() -> Url {
        Url::parse("https://courses.example.com/search?q=am2").unwrap()
    }

    #[test]
    fn template_encodes_criteria() {
        let criteria = SearchCriteria {
            keywords: "18th edition & AM2".into(),
            location: "United Kingdom".into(),
        };
        let url = listing_url(
            "https://courses.example.com/search?q={keywords}&location={location}",
            &criteria,
        )
        .unwrap();
        assert_eq!(
            url.as_str(),
            "https://courses.example.com/search?q=18th+edition+%26+AM2&location=United+Kingdom"
        );
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs[0].1, "18th edition & AM2");
    }

    #[test]
    fn bad_template_is_validation_error() {
        let err = listing_url("not a url {keywords}", &SearchCriteria::default()).unwrap_err();
        assert!(matches!(err, LiveCoursesError::Validation { .. }));
    }

    #[test]
    fn request_asks_for_json_extraction() {
        let payload = listing_request(&listing()).to_payload().unwrap();
        assert_eq!(payload["url"], "https://courses.example.com/search?q=am2");
        assert_eq!(payload["formats"], json!(["json"]));
        assert_eq!(payload["waitFor"], LISTING_WAIT_MS);
        assert!(payload["jsonOptions"]["schema"]["properties"]["courses"].is_object());
    }

    #[test]
    fn parses_courses_with_placeholders() {
        let extracted = json!({
            "courses": [
                {
                    "title": "AM2 Assessment Prep",
                    "provider": "Acme Training",
                    "duration": "5 days",
                    "price": "£450 - £600",
                    "detailsUrl": "/courses/am2-prep",
                    "rating": "4.7/5"
                },
                {
                    "title": "Inspection & Testing",
                    "provider": "Volt Academy",
                    "description": "  ",
                    "url": "https://volt.example.com/2391",
                    "rating": 4
                }
            ]
        });

        let out = parse_candidates(&extracted, "example", &listing());
        assert_eq!(out.len(), 2);

        let am2 = &out[0];
        assert_eq!(am2.id, "am2-assessment-prep-acme-training");
        assert_eq!(am2.description, NOT_SPECIFIED);
        assert_eq!(am2.price, "£450 - £600");
        assert_eq!(
            am2.details_url.as_deref(),
            Some("https://courses.example.com/courses/am2-prep")
        );
        assert_eq!(am2.rating, Some(4.7));
        assert_eq!(am2.source, "example");

        let volt = &out[1];
        assert_eq!(volt.description, NOT_SPECIFIED);
        assert_eq!(volt.details_url.as_deref(), Some("https://volt.example.com/2391"));
        assert_eq!(volt.rating, Some(4.0));
    }

    #[test]
    fn drops_entries_without_identity() {
        let extracted = json!([
            { "title": "No provider" },
            { "provider": "No title" },
            { "title": "Not specified", "provider": "Acme" },
            { "title": "Kept", "provider": "Acme" },
            "garbage"
        ]);
        let out = parse_candidates(&extracted, "example", &listing());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].title, "Kept");
        assert!(out[0].details_url.is_none());
    }

    #[test]
    fn numeric_fields_are_kept_as_text() {
        let extracted = json!({
            "courses": [
                { "title": "AM2 Prep", "provider": "Acme", "price": 450 },
                { "title": "Solar PV", "provider": "Green", "duration": 3, "level": ["L3"] }
            ]
        });
        let out = parse_candidates(&extracted, "example", &listing());
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].price, "450");
        assert_eq!(out[1].duration, "3");
        assert_eq!(out[1].level, NOT_SPECIFIED);
    }

    #[test]
    fn non_http_links_are_dropped() {
        let extracted = json!([
            { "title": "Mail", "provider": "Acme", "detailsUrl": "mailto:info@acme.example" }
        ]);
        let out = parse_candidates(&extracted, "example", &listing());
        assert!(out[0].details_url.is_none());
    }

    #[test]
    fn unexpected_shape_yields_nothing() {
        assert!(parse_candidates(&json!({"items": []}), "x", &listing()).is_empty());
        assert!(parse_candidates(&json!("text"), "x", &listing()).is_empty());
    }
}
