use anyhow::{bail, Context, Result};
use assignee_extract::fetch::{DEFAULT_BASE_URL, DEFAULT_PAGE_SIZE};
use assignee_extract::labeling::{self, DEFAULT_DISAMBIGUATION_COLUMN};
use assignee_extract::pipeline::{mention_lookup, run_extraction, ApiConfig};
use assignee_extract::search::{self, DEFAULT_INDEX};
use assignee_extract::{ExtractionMode, MentionId};
use clap::{Args, Parser, Subcommand};
use log::{info, warn, LevelFilter};
use simple_logger::SimpleLogger;
use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use time::macros::format_description;

#[derive(Parser)]
#[command(name = "PatentsView Assignee Extractor")]
#[command(about = "Extract and review PatentsView assignee mentions for disambiguation labeling")]
#[command(version = "1.0")]
struct Cli {
    #[arg(short, long, global = true, default_value = "INFO", help = "Logging level (DEBUG, INFO, WARN, ERROR)")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct ApiArgs {
    #[arg(long, env = "PATENTSVIEW_API_KEY", hide_env_values = true, help = "PatentsView API key")]
    api_key: String,

    #[arg(long, env = "PATENTSVIEW_BASE_URL", default_value = DEFAULT_BASE_URL, help = "Search API base URL")]
    base_url: String,

    #[arg(long, env = "PATENTSVIEW_PAGE_SIZE", default_value_t = DEFAULT_PAGE_SIZE, help = "Records requested per page")]
    page_size: usize,

    #[arg(long, env = "PATENTSVIEW_MAX_RETRIES", help = "Give up after this many rate-limit retries of one page (default: never)")]
    max_retries: Option<u32>,

    #[arg(long, default_value = "30", help = "Request timeout in seconds")]
    timeout: u64,
}

impl ApiArgs {
    fn config(&self) -> ApiConfig {
        ApiConfig {
            api_key: self.api_key.clone(),
            base_url: self.base_url.clone(),
            page_size: self.page_size,
            max_retries: self.max_retries,
            timeout: Duration::from_secs(self.timeout),
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Write every mention of the given disambiguated assignees to CSV or XLSX
    Extract {
        #[command(flatten)]
        api: ApiArgs,

        #[arg(short = 'a', long = "assignee-id", value_delimiter = ',', help = "Disambiguated assignee id(s), comma separated or repeated")]
        assignee_ids: Vec<String>,

        #[arg(long, help = "File with one disambiguated assignee id per line")]
        id_file: Option<PathBuf>,

        #[arg(short, long, help = "Output file (.csv or .xlsx)")]
        output: PathBuf,

        #[arg(long, help = "Include inventor and CPC columns")]
        complex: bool,

        #[arg(long, help = "CSV/TSV with cpc_subclass_id,cpc_subclass_title (skips fetching titles)")]
        cpc_titles: Option<PathBuf>,
    },

    /// Show the record behind one mention id (e.g. US7315019-0)
    Mention {
        #[command(flatten)]
        api: ApiArgs,

        mention_id: String,
    },

    /// Print the search request body for an assignee name query
    Query {
        text: String,

        #[arg(long, default_value = "organization", help = "Comma separated: organization, first-name, last-name or full field paths")]
        fields: String,

        #[arg(long, default_value_t = 2, help = "Fuzziness level for matching (0-2)")]
        fuzziness: u8,

        #[arg(long, default_value_t = 50, help = "Number of search results")]
        size: usize,

        #[arg(long, default_value = DEFAULT_INDEX, help = "Index to search in")]
        index: String,
    },

    /// Diff two labelers' files for one seed mention
    Compare {
        mention_id: String,
        labeler1: String,
        labeler2: String,

        #[arg(long, default_value = "data/06 - compare")]
        input_dir: PathBuf,

        #[arg(long, default_value = "data/07 - evaluation")]
        output_dir: PathBuf,
    },

    /// Diff the labeled clusters of two seed mentions
    Dedup {
        mention_id_1: String,
        mention_id_2: String,

        #[arg(long, required = true)]
        input_dir: PathBuf,

        #[arg(long, default_value = "data/08 - deduplication")]
        output_dir: PathBuf,
    },

    /// Check that labeled files contain their seed mention and collect all mention ids
    Check {
        dir: PathBuf,

        #[arg(long, default_value = "data/all_mention_ids.txt")]
        store: PathBuf,
    },

    /// Draw a seeded random sample of disambiguated mention ids
    Sample {
        input: PathBuf,

        #[arg(long, default_value_t = 10000)]
        size: usize,

        #[arg(long, default_value_t = 0)]
        seed: u64,

        #[arg(long, default_value = DEFAULT_DISAMBIGUATION_COLUMN)]
        column: String,

        #[arg(short, long, default_value = "sample.csv")]
        output: PathBuf,
    },
}

fn setup_logging(log_level_str: &str) -> Result<()> {
    let log_level = match log_level_str.to_uppercase().as_str() {
        "DEBUG" => LevelFilter::Debug,
        "INFO" => LevelFilter::Info,
        "WARN" | "WARNING" => LevelFilter::Warn,
        "ERROR" => LevelFilter::Error,
        other => {
            eprintln!("Invalid log level '{}', defaulting to INFO.", other);
            LevelFilter::Info
        }
    };

    SimpleLogger::new()
        .with_level(log_level)
        .with_timestamp_format(format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"))
        .init()?;

    Ok(())
}

fn format_elapsed(elapsed: Duration) -> String {
    let total_secs = elapsed.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    let millis = elapsed.subsec_millis();

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}.{:03}s", seconds, millis)
    }
}

fn collect_assignee_ids(mut ids: Vec<String>, id_file: Option<&PathBuf>) -> Result<Vec<String>> {
    if let Some(path) = id_file {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read id file: {}", path.display()))?;
        ids.extend(contents.lines().map(str::trim).filter(|l| !l.is_empty()).map(str::to_string));
    }
    ids.retain(|id| !id.trim().is_empty());
    ids.sort();
    ids.dedup();
    if ids.is_empty() {
        bail!("No assignee ids given; use --assignee-id or --id-file");
    }
    Ok(ids)
}

fn run(command: Command) -> Result<()> {
    match command {
        Command::Extract { api, assignee_ids, id_file, output, complex, cpc_titles } => {
            let ids = collect_assignee_ids(assignee_ids, id_file.as_ref())?;
            let mode = if complex { ExtractionMode::Complex } else { ExtractionMode::Simplified };
            if cpc_titles.is_some() && mode == ExtractionMode::Simplified {
                warn!("--cpc-titles is only used with --complex; ignoring it");
            }
            let summary = run_extraction(&api.config(), &ids, &output, mode, cpc_titles.as_deref())
                .with_context(|| format!("Extraction to {} failed", output.display()))?;
            info!(
                "Extracted {} patents into {} rows in {}",
                summary.patents,
                summary.rows,
                format_elapsed(summary.elapsed)
            );
        }
        Command::Mention { api, mention_id } => {
            let mention = MentionId::parse(&mention_id)?;
            let report = mention_lookup(&api.config(), &mention)
                .with_context(|| format!("Lookup of {} failed", mention))?;
            if report.rows.is_empty() {
                warn!("No assignee found for {}", mention);
            }
            for row in &report.rows {
                for (header, value) in report.headers.iter().zip(row) {
                    println!("{:<32} {}", header, value);
                }
                println!();
            }
            println!("PatentsView:    {}", report.patentsview_url);
            println!("Google Patents: {}", report.google_patents_url);
        }
        Command::Query { text, fields, fuzziness, size, index } => {
            let fields = search::parse_list(&fields);
            if fields.is_empty() {
                bail!("At least one search field is required");
            }
            let paths: Vec<&str> = fields
                .iter()
                .map(|f| search::field_path(f).unwrap_or(f.as_str()))
                .collect();
            let body = search::search_body(&text, &paths, fuzziness, size)?;
            info!("Search body for index '{}'", index);
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        Command::Compare { mention_id, labeler1, labeler2, input_dir, output_dir } => {
            let mention = MentionId::parse(&mention_id)?;
            let summary = labeling::compare_labelers(&input_dir, &output_dir, &mention, &labeler1, &labeler2)?;
            info!(
                "{}: {} rows only from {}, {} only from {} -> {}",
                mention,
                summary.only_first,
                labeler1,
                summary.only_second,
                labeler2,
                summary.output_path.display()
            );
        }
        Command::Dedup { mention_id_1, mention_id_2, input_dir, output_dir } => {
            let first = MentionId::parse(&mention_id_1)?;
            let second = MentionId::parse(&mention_id_2)?;
            let summary = labeling::dedup_mentions(&input_dir, &output_dir, &first, &second)?;
            info!("Successfully saved the output file: {}", summary.output_path.display());
        }
        Command::Check { dir, store } => {
            let report = labeling::check_labeled_dir(&dir, &store)?;
            if !report.missing_seed.is_empty() || !report.unreadable.is_empty() {
                warn!(
                    "{} file(s) without their seed mention, {} unreadable",
                    report.missing_seed.len(),
                    report.unreadable.len()
                );
            }
        }
        Command::Sample { input, size, seed, column, output } => {
            let picked = labeling::sample_mentions(&input, &column, size, seed, &output)?;
            info!("Sampled {} mentions", picked.len());
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let start_time = Instant::now();
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    setup_logging(&cli.log_level)?;
    run(cli.command)?;

    info!("Finished in {}", format_elapsed(start_time.elapsed()));
    Ok(())
}
