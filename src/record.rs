//! Typed shapes of the patent records returned by the search API.
//!
//! Every sub-entity list defaults to empty, so a dimension the API omitted
//! and one it returned as `[]` or `null` look the same downstream.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Patent {
    pub patent_id: String,
    #[serde(default, deserialize_with = "nullable")]
    pub patent_title: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub patent_abstract: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub patent_date: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub patent_type: Option<String>,
    #[serde(default, deserialize_with = "list")]
    pub assignees: Vec<RawAssignee>,
    #[serde(default, deserialize_with = "list")]
    pub inventors: Vec<RawInventor>,
    #[serde(default, deserialize_with = "list")]
    pub cpc_current: Vec<RawCpc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawAssignee {
    /// Reference URL wrapping the disambiguated assignee id.
    #[serde(default, deserialize_with = "nullable")]
    pub assignee: Option<String>,
    #[serde(default, deserialize_with = "code")]
    pub assignee_sequence: Option<u32>,
    #[serde(default, deserialize_with = "type_code")]
    pub assignee_type: Option<u32>,
    #[serde(default, deserialize_with = "nullable")]
    pub assignee_individual_name_first: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub assignee_individual_name_last: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub assignee_organization: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub assignee_city: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub assignee_state: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub assignee_country: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawInventor {
    #[serde(default, deserialize_with = "nullable")]
    pub inventor: Option<String>,
    #[serde(default, deserialize_with = "code")]
    pub inventor_sequence: Option<u32>,
    #[serde(default, deserialize_with = "nullable")]
    pub inventor_name_first: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub inventor_name_last: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub inventor_city: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub inventor_state: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub inventor_country: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawCpc {
    #[serde(default, deserialize_with = "code")]
    pub cpc_sequence: Option<u32>,
    #[serde(default, deserialize_with = "nullable")]
    pub cpc_subclass_id: Option<String>,
    /// Reference URL; only consulted when `cpc_subclass_id` is absent.
    #[serde(default, deserialize_with = "nullable")]
    pub cpc_subclass: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub cpc_group_id: Option<String>,
}

fn list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Accepts strings, numbers and booleans; empty strings become `None`.
fn nullable<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    })
}

/// The API is inconsistent about sending small integers as numbers or as
/// strings ("2"). Anything that is not a non-negative integer becomes `None`.
fn code<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
        Value::String(s) => s.trim().parse::<u32>().ok(),
        _ => None,
    })
}

/// Code used for a present but unreadable assignee type. It has no entry
/// in the type table, so it is labeled "Unknown".
pub const UNREADABLE_TYPE_CODE: u32 = 0;

/// Like `code`, but a non-null value that is not an integer (`"2.0"`,
/// `"abc"`) becomes [`UNREADABLE_TYPE_CODE`] instead of `None`.
fn type_code<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::Number(n) => Some(n.as_u64().and_then(|v| u32::try_from(v).ok()).unwrap_or(UNREADABLE_TYPE_CODE)),
        Value::String(s) => Some(s.trim().parse::<u32>().unwrap_or(UNREADABLE_TYPE_CODE)),
        _ => Some(UNREADABLE_TYPE_CODE),
    })
}
