//! Collapse records that describe the same course.

use std::collections::HashMap;

use livecourses_shared::EnrichedRecord;

/// Output of [`dedupe`].
#[derive(Debug, Clone)]
pub struct Deduplicated {
    /// Surviving records, in first-seen key order.
    pub unique: Vec<EnrichedRecord>,
    /// Number of records dropped.
    pub removed_count: usize,
}

/// Lowercase, trim, and collapse internal whitespace runs to one space.
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Identity key of a course: `normalize(title) + "-" + normalize(provider)`.
pub fn identity_key(title: &str, provider: &str) -> String {
    format!("{}-{}", normalize(title), normalize(provider))
}

/// Keep one record per identity key.
///
/// The first record seen for a key holds its slot. A later duplicate takes
/// over that slot only when it has detailed info and the held record does
/// not; otherwise it is discarded.
pub fn dedupe(records: Vec<EnrichedRecord>) -> Deduplicated {
    let original = records.len();
    let mut slots: HashMap<String, usize> = HashMap::with_capacity(original);
    let mut unique: Vec<EnrichedRecord> = Vec::with_capacity(original);

    for record in records {
        let key = identity_key(&record.course.title, &record.course.provider);
        match slots.get(&key) {
            Some(&idx) => {
                if record.has_detailed_info && !unique[idx].has_detailed_info {
                    unique[idx] = record;
                }
            }
            None => {
                slots.insert(key, unique.len());
                unique.push(record);
            }
        }
    }

    Deduplicated {
        removed_count: original - unique.len(),
        unique,
    }
}
