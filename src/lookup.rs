use crate::error::{ExtractError, Result};
use crate::fetch::{PageRequest, PagedFetcher, Sleeper, Transport};
use csv::ReaderBuilder;
use lazy_static::lazy_static;
use log::{info, warn};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::Path;

/// Label used for assignee type codes the table does not know.
pub const UNKNOWN_LABEL: &str = "Unknown";

lazy_static! {
    static ref ASSIGNEE_TYPES: HashMap<u32, &'static str> = {
        let mut table = HashMap::new();
        table.insert(1, "Unassigned");
        table.insert(2, "United States company or corporation");
        table.insert(3, "Foreign company or corporation");
        table.insert(4, "United States individual");
        table.insert(5, "Foreign individual");
        table.insert(6, "U.S. Federal government");
        table.insert(7, "Foreign government");
        table.insert(8, "U.S. county government");
        table.insert(9, "U.S. state government");
        table
    };
}

/// `None` stays `None`; a code outside the table becomes [`UNKNOWN_LABEL`].
pub fn assignee_type_label(code: Option<u32>) -> Option<&'static str> {
    code.map(|c| ASSIGNEE_TYPES.get(&c).copied().unwrap_or(UNKNOWN_LABEL))
}

/// CPC subclass code to title, built once per run and read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct ClassificationTitles {
    titles: HashMap<String, String>,
}

impl ClassificationTitles {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            titles: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    /// Loads `cpc_subclass_id` / `cpc_subclass_title` columns from a CSV
    /// (or TSV, by extension) file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let delimiter = match path.extension().and_then(|e| e.to_str()) {
            Some("tsv") => b'\t',
            _ => b',',
        };
        let mut reader = ReaderBuilder::new().delimiter(delimiter).from_path(path)?;
        let headers = reader.headers()?.clone();
        let column = |name: &str| {
            headers.iter().position(|h| h == name).ok_or_else(|| ExtractError::MissingColumn {
                column: name.to_string(),
                path: path.to_path_buf(),
            })
        };
        let id_col = column("cpc_subclass_id")?;
        let title_col = column("cpc_subclass_title")?;

        let mut titles = HashMap::new();
        for row in reader.records() {
            let row = row?;
            if let (Some(id), Some(title)) = (row.get(id_col), row.get(title_col)) {
                if !id.is_empty() {
                    titles.entry(id.to_string()).or_insert_with(|| title.to_string());
                }
            }
        }
        info!("Loaded {} CPC subclass titles from {}", titles.len(), path.display());
        Ok(Self { titles })
    }

    /// Pulls the whole `cpc_subclass` collection through the paged fetcher.
    pub fn fetch<T: Transport, S: Sleeper>(fetcher: &PagedFetcher<T, S>) -> Result<Self> {
        let request = PageRequest {
            endpoint: "cpc_subclass".to_string(),
            collection: "cpc_subclasses".to_string(),
            query: json!({ "_gte": { "cpc_subclass_id": "A" } }),
            fields: vec!["cpc_subclass_id".to_string(), "cpc_subclass_title".to_string()],
            sort_key: "cpc_subclass_id".to_string(),
        };
        let records = fetcher.fetch_all(&request)?;

        let mut titles = HashMap::with_capacity(records.len());
        for record in &records {
            let id = record.get("cpc_subclass_id").and_then(Value::as_str);
            let title = record.get("cpc_subclass_title").and_then(Value::as_str);
            match (id, title) {
                (Some(id), Some(title)) => {
                    titles.entry(id.to_string()).or_insert_with(|| title.to_string());
                }
                _ => warn!("Skipping CPC subclass record without id/title: {}", record),
            }
        }
        info!("Fetched {} CPC subclass titles", titles.len());
        Ok(Self { titles })
    }

    pub fn title(&self, subclass: &str) -> Option<&str> {
        self.titles.get(subclass).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.titles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.titles.is_empty()
    }
}
