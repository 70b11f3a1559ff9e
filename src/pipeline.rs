use crate::assemble::{assemble, headers, ExtractionMode, GroupBlock, SIMPLIFIED_COLUMNS};
use crate::error::Result;
use crate::fetch::{
    PageRequest, PagedFetcher, ReqwestTransport, Sleeper, ThreadSleeper, Transport, DEFAULT_BASE_URL,
    DEFAULT_PAGE_SIZE,
};
use crate::ids::MentionId;
use crate::lookup::ClassificationTitles;
use crate::normalize::{AssigneeSelection, Normalizer};
use crate::record::Patent;
use crate::writer::open_output;
use log::{info, warn};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

const PATENT_FIELDS: [&str; 5] = [
    "patent_id",
    "patent_title",
    "patent_abstract",
    "patent_date",
    "patent_type",
];

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub api_key: String,
    pub base_url: String,
    pub page_size: usize,
    pub max_retries: Option<u32>,
    pub timeout: Duration,
}

impl ApiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            max_retries: None,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn fetcher(&self) -> Result<PagedFetcher<ReqwestTransport, ThreadSleeper>> {
        let transport = ReqwestTransport::new(self.api_key.clone(), self.timeout)?;
        Ok(PagedFetcher::new(transport, ThreadSleeper, self.base_url.clone(), self.page_size)
            .with_max_retries(self.max_retries))
    }
}

#[derive(Debug, Clone)]
pub struct ExtractionSummary {
    pub output_path: PathBuf,
    pub patents: usize,
    pub groups: usize,
    pub rows: usize,
    pub elapsed: Duration,
}

fn patents_request(query: Value, mode: ExtractionMode) -> PageRequest {
    let mut fields: Vec<String> = PATENT_FIELDS.iter().map(|f| f.to_string()).collect();
    fields.push("assignees".to_string());
    if mode == ExtractionMode::Complex {
        fields.push("inventors".to_string());
        fields.push("cpc_current".to_string());
    }
    PageRequest {
        endpoint: "patent".to_string(),
        collection: "patents".to_string(),
        query,
        fields,
        sort_key: "patent_id".to_string(),
    }
}

fn build_blocks(
    records: Vec<Value>,
    normalizer: &Normalizer<'_>,
    mode: ExtractionMode,
) -> Result<(usize, Vec<GroupBlock>)> {
    let mut blocks = Vec::new();
    let patents = records.len();
    for record in records {
        let patent: Patent = serde_json::from_value(record)?;
        let normalized = normalizer.normalize(&patent)?;
        blocks.extend(assemble(&normalized, mode));
    }
    blocks.sort_by(|a, b| a.key.cmp(&b.key));
    Ok((patents, blocks))
}

/// Fetches every patent mentioning one of `assignee_ids` and writes the
/// flattened rows to `output_path` (`.csv` or `.xlsx`).
pub fn extract_with<T: Transport, S: Sleeper>(
    fetcher: &PagedFetcher<T, S>,
    titles: &ClassificationTitles,
    assignee_ids: &[String],
    output_path: &Path,
    mode: ExtractionMode,
) -> Result<ExtractionSummary> {
    let start = Instant::now();
    info!(
        "Extracting {} disambiguated assignee(s) in {:?} mode",
        assignee_ids.len(),
        mode
    );

    let request = patents_request(json!({ "assignees.assignee_id": assignee_ids }), mode);
    let records = fetcher.fetch_all(&request)?;

    let selection = AssigneeSelection::by_ids(assignee_ids.iter().cloned());
    let normalizer = Normalizer::new(titles, &selection);
    let (patents, blocks) = build_blocks(records, &normalizer, mode)?;

    let columns = headers(mode);
    let mut output = open_output(output_path, &columns)?;
    for block in &blocks {
        output.append_group(block)?;
    }
    output.finish()?;

    let summary = ExtractionSummary {
        output_path: output_path.to_path_buf(),
        patents,
        groups: blocks.len(),
        rows: output.rows_written(),
        elapsed: start.elapsed(),
    };
    info!(
        "Wrote {} rows in {} groups from {} patents to {}",
        summary.rows,
        summary.groups,
        summary.patents,
        summary.output_path.display()
    );
    Ok(summary)
}

/// Loads CPC titles only when the mode needs them: from `titles_file` if
/// given, otherwise from the API.
pub fn load_titles<T: Transport, S: Sleeper>(
    fetcher: &PagedFetcher<T, S>,
    mode: ExtractionMode,
    titles_file: Option<&Path>,
) -> Result<ClassificationTitles> {
    match (mode, titles_file) {
        (ExtractionMode::Simplified, _) => Ok(ClassificationTitles::empty()),
        (ExtractionMode::Complex, Some(path)) => ClassificationTitles::from_file(path),
        (ExtractionMode::Complex, None) => ClassificationTitles::fetch(fetcher),
    }
}

pub fn run_extraction(
    config: &ApiConfig,
    assignee_ids: &[String],
    output_path: &Path,
    mode: ExtractionMode,
    titles_file: Option<&Path>,
) -> Result<ExtractionSummary> {
    let fetcher = config.fetcher()?;
    let titles = load_titles(&fetcher, mode, titles_file)?;
    extract_with(&fetcher, &titles, assignee_ids, output_path, mode)
}

#[derive(Debug, Clone)]
pub struct MentionReport {
    pub mention: MentionId,
    pub headers: Vec<&'static str>,
    pub rows: Vec<Vec<String>>,
    pub patentsview_url: String,
    pub google_patents_url: String,
}

impl MentionReport {
    /// The value in `column` of the first row, if any.
    pub fn value(&self, column: &str) -> Option<&str> {
        let idx = self.headers.iter().position(|h| *h == column)?;
        self.rows.first().and_then(|r| r.get(idx)).map(String::as_str)
    }
}

/// Looks up the single assignee mention `US<patent>-<sequence>`.
pub fn mention_lookup_with<T: Transport, S: Sleeper>(
    fetcher: &PagedFetcher<T, S>,
    mention: &MentionId,
) -> Result<MentionReport> {
    let request = patents_request(json!({ "patent_id": mention.patent_id }), ExtractionMode::Simplified);
    let records = fetcher.fetch_all(&request)?;
    if records.is_empty() {
        warn!("No patent found for mention {}", mention);
    }

    let titles = ClassificationTitles::empty();
    let selection = AssigneeSelection::by_sequence(mention.sequence);
    let normalizer = Normalizer::new(&titles, &selection);
    let (_, blocks) = build_blocks(records, &normalizer, ExtractionMode::Simplified)?;

    Ok(MentionReport {
        mention: mention.clone(),
        headers: SIMPLIFIED_COLUMNS.to_vec(),
        rows: blocks.into_iter().flat_map(|b| b.rows).collect(),
        patentsview_url: mention.patentsview_url(),
        google_patents_url: mention.google_patents_url(),
    })
}

pub fn mention_lookup(config: &ApiConfig, mention: &MentionId) -> Result<MentionReport> {
    mention_lookup_with(&config.fetcher()?, mention)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::{ok, RecordingSleeper, ScriptedTransport};

    fn fetcher(replies: Vec<crate::fetch::HttpReply>) -> PagedFetcher<ScriptedTransport, RecordingSleeper> {
        PagedFetcher::new(ScriptedTransport::new(replies), RecordingSleeper::default(), DEFAULT_BASE_URL, 100)
    }

    #[test]
    fn complex_request_asks_for_all_dimensions() {
        let request = patents_request(json!({}), ExtractionMode::Complex);
        assert!(request.fields.iter().any(|f| f == "inventors"));
        assert!(request.fields.iter().any(|f| f == "cpc_current"));
        let simple = patents_request(json!({}), ExtractionMode::Simplified);
        assert!(!simple.fields.iter().any(|f| f == "inventors"));
    }

    #[test]
    fn mention_lookup_selects_by_sequence() {
        let f = fetcher(vec![ok(
            "patents",
            json!([{
                "patent_id": "7315019",
                "patent_title": "Arrays of optical confinements",
                "assignees": [
                    { "assignee_sequence": 0, "assignee_type": 2, "assignee_organization": "Pacific Biosciences" },
                    { "assignee_sequence": 1, "assignee_type": 2, "assignee_organization": "Cornell" }
                ]
            }]),
            1,
        )]);
        let mention = MentionId::parse("US7315019-0").unwrap();
        let report = mention_lookup_with(&f, &mention).unwrap();

        assert_eq!(report.rows.len(), 1);
        assert_eq!(report.value("assignee_organization"), Some("Pacific Biosciences"));
        assert_eq!(report.value("assignee_type"), Some("United States company or corporation"));
        assert_eq!(f.transport().param(0, "q").unwrap(), json!({ "patent_id": "7315019" }));
    }

    #[test]
    fn load_titles_skips_work_in_simplified_mode() {
        let f = fetcher(vec![]);
        let titles = load_titles(&f, ExtractionMode::Simplified, None).unwrap();
        assert!(titles.is_empty());
    }
}
