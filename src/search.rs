//! Query bodies for the `assignee_references` search index.

use crate::error::{ExtractError, Result};
use serde_json::{json, Value};

pub const DEFAULT_INDEX: &str = "assignee_references";

/// Searchable fields, keyed by the short names the labeling UI offers.
pub const SEARCH_FIELDS: [(&str, &str); 3] = [
    ("organization", "assignees.assignee_organization"),
    ("first-name", "assignees.assignee_individual_name_first"),
    ("last-name", "assignees.assignee_individual_name_last"),
];

pub fn field_path(short_name: &str) -> Option<&'static str> {
    SEARCH_FIELDS
        .iter()
        .find(|(name, _)| *name == short_name)
        .map(|(_, path)| *path)
}

/// Wraps a fuzzy match on `full_path` in one `nested` clause per leading
/// segment of `field`.
fn nested_match(field: &str, full_path: &str, query: &Value) -> Value {
    match field.split_once('.') {
        Some((head, rest)) => json!({
            "nested": {
                "path": head,
                "query": nested_match(rest, full_path, query),
            }
        }),
        None => json!({ "match": { full_path: query } }),
    }
}

/// `bool.should` over a fuzzy match per field.
pub fn build_match_query(user_query: &str, fields: &[&str], fuzziness: u8) -> Result<Value> {
    if fuzziness > 2 {
        return Err(ExtractError::InvalidFuzziness(fuzziness));
    }
    let query = json!({ "query": user_query, "fuzziness": fuzziness });
    let should: Vec<Value> = fields
        .iter()
        .map(|field| nested_match(field, field, &query))
        .collect();
    Ok(json!({ "bool": { "should": should } }))
}

pub fn search_body(user_query: &str, fields: &[&str], fuzziness: u8, size: usize) -> Result<Value> {
    Ok(json!({
        "aggregations": {},
        "size": size,
        "query": build_match_query(user_query, fields, fuzziness)?,
    }))
}

/// Splits a comma-separated list, trimming blanks.
pub fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
