use crate::error::{ExtractError, Result};
use lazy_static::lazy_static;
use regex::Regex;
use std::fmt;
use std::str::FromStr;

lazy_static! {
    static ref MENTION_ID_RE: Regex = Regex::new(r"^US([A-Z]{0,2}\d+)-(\d+)$").unwrap();
}

pub const REFERENCE_BASE: &str = "https://search.patentsview.org/api/v1/";

/// One occurrence of an assignee on one patent, written `US<patent_id>-<sequence>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MentionId {
    pub patent_id: String,
    pub sequence: u32,
}

impl MentionId {
    pub fn new(patent_id: impl Into<String>, sequence: u32) -> Self {
        Self { patent_id: patent_id.into(), sequence }
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let caps = MENTION_ID_RE
            .captures(trimmed)
            .ok_or_else(|| ExtractError::InvalidMentionId(raw.to_string()))?;
        let sequence = caps[2]
            .parse::<u32>()
            .map_err(|_| ExtractError::InvalidMentionId(raw.to_string()))?;
        Ok(Self { patent_id: caps[1].to_string(), sequence })
    }

    pub fn patentsview_url(&self) -> String {
        format!("https://datatool.patentsview.org/#detail/patent/{}/", self.patent_id)
    }

    pub fn google_patents_url(&self) -> String {
        format!("https://patents.google.com/patent/US{}/", self.patent_id)
    }
}

impl fmt::Display for MentionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "US{}-{}", self.patent_id, self.sequence)
    }
}

impl FromStr for MentionId {
    type Err = ExtractError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Which API collection an embedded reference URL points into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    Assignee,
    Inventor,
    CpcSubclass,
}

impl ReferenceKind {
    pub fn segment(self) -> &'static str {
        match self {
            ReferenceKind::Assignee => "assignee",
            ReferenceKind::Inventor => "inventor",
            ReferenceKind::CpcSubclass => "cpc_subclass",
        }
    }
}

/// Strips `https://search.patentsview.org/api/v1/<kind>/` and the trailing
/// slash from a reference, rejecting anything that does not have exactly
/// that shape.
pub fn unwrap_reference(kind: ReferenceKind, value: &str) -> Result<String> {
    let malformed = || ExtractError::MalformedReference {
        kind: kind.segment(),
        value: value.to_string(),
    };

    let inner = value
        .strip_prefix(REFERENCE_BASE)
        .and_then(|rest| rest.strip_prefix(kind.segment()))
        .and_then(|rest| rest.strip_prefix('/'))
        .and_then(|rest| rest.strip_suffix('/'))
        .ok_or_else(malformed)?;

    if inner.is_empty() || inner.contains('/') {
        return Err(malformed());
    }
    Ok(inner.to_string())
}
