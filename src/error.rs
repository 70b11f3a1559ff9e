use std::path::PathBuf;
use thiserror::Error;

pub type Result<T, E = ExtractError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ExtractError {
    /// The API answered with a status other than 200 or 429.
    #[error("API request failed with status {status} (headers: {headers:?})")]
    Http {
        status: u16,
        headers: Vec<(String, String)>,
    },

    #[error("still rate limited after {attempts} attempts")]
    RateLimitExhausted { attempts: u32 },

    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// An embedded reference URL did not have the expected wrapper.
    #[error("malformed {kind} reference: {value:?}")]
    MalformedReference { kind: &'static str, value: String },

    #[error("invalid mention id {0:?} (expected US<patent_id>-<sequence>)")]
    InvalidMentionId(String),

    #[error("invalid fuzziness {0} (must be 0, 1 or 2)")]
    InvalidFuzziness(u8),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("response is missing field '{0}'")]
    MissingField(String),

    #[error("column '{column}' not found in {path}")]
    MissingColumn { column: String, path: PathBuf },

    #[error("unsupported output format for {0} (use .csv or .xlsx)")]
    UnsupportedOutput(PathBuf),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("XLSX error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("{0} is an empty archive")]
    EmptyArchive(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
