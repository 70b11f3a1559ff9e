//! Extraction of PatentsView assignee mentions into flat CSV or merged-cell
//! XLSX files, plus the small tools used around hand-labeling assignee
//! disambiguation datasets.

pub mod assemble;
pub mod error;
pub mod fetch;
pub mod ids;
pub mod labeling;
pub mod lookup;
pub mod normalize;
pub mod pipeline;
pub mod record;
pub mod search;
pub mod writer;

pub use assemble::ExtractionMode;
pub use error::{ExtractError, Result};
pub use ids::MentionId;
pub use pipeline::{mention_lookup, run_extraction, ApiConfig, ExtractionSummary};
