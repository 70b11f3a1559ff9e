//! Helpers for the hand-labeling workflow: comparing two labelers' files,
//! diffing two mention clusters, sanity-checking labeled files and drawing
//! mention samples.

use crate::error::{ExtractError, Result};
use crate::ids::MentionId;
use csv::{ReaderBuilder, WriterBuilder};
use flate2::read::GzDecoder;
use glob::{glob, Pattern};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::{BTreeSet, HashSet};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use zip::ZipArchive;

pub const DEFAULT_DISAMBIGUATION_COLUMN: &str = "disamb_assignee_id_20220929";

/// A labeled CSV held in memory. Columns with an empty header (a saved row
/// index) are dropped on read.
#[derive(Debug, Clone)]
pub struct LabelTable {
    pub path: PathBuf,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl LabelTable {
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = ReaderBuilder::new().flexible(true).from_path(path)?;
        let raw_headers = reader.headers()?.clone();
        let keep: Vec<usize> = raw_headers
            .iter()
            .enumerate()
            .filter(|(_, h)| !h.trim().is_empty())
            .map(|(i, _)| i)
            .collect();

        let headers = keep.iter().map(|&i| raw_headers[i].to_string()).collect();
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(keep.iter().map(|&i| record.get(i).unwrap_or("").to_string()).collect());
        }
        Ok(Self { path: path.to_path_buf(), headers, rows })
    }

    pub fn column(&self, name: &str) -> Result<usize> {
        self.headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| ExtractError::MissingColumn { column: name.to_string(), path: self.path.clone() })
    }

    pub fn patent_ids(&self) -> Result<HashSet<String>> {
        let col = self.column("patent_id")?;
        Ok(self.rows.iter().map(|r| r[col].clone()).collect())
    }

    /// `US<patent_id>-<assignee_sequence>` for every row.
    pub fn mention_ids(&self) -> Result<HashSet<String>> {
        let patent_col = self.column("patent_id")?;
        let sequence_col = self.column("assignee_sequence")?;
        Ok(self
            .rows
            .iter()
            .map(|r| format!("US{}-{}", r[patent_col], r[sequence_col]))
            .collect())
    }

    fn value(&self, row: &[String], column: &str) -> String {
        self.headers
            .iter()
            .position(|h| h == column)
            .and_then(|i| row.get(i).cloned())
            .unwrap_or_default()
    }
}

/// Rows of `first` whose patent is absent from `second`, and the reverse.
pub fn patent_difference<'a>(
    first: &'a LabelTable,
    second: &'a LabelTable,
) -> Result<(Vec<&'a Vec<String>>, Vec<&'a Vec<String>>)> {
    let first_ids = first.patent_ids()?;
    let second_ids = second.patent_ids()?;
    let first_col = first.column("patent_id")?;
    let second_col = second.column("patent_id")?;

    let only_first = first
        .rows
        .iter()
        .filter(|r| !second_ids.contains(&r[first_col]))
        .collect();
    let only_second = second
        .rows
        .iter()
        .filter(|r| !first_ids.contains(&r[second_col]))
        .collect();
    Ok((only_first, only_second))
}

#[derive(Debug, Clone)]
pub struct DiffSummary {
    pub output_path: PathBuf,
    pub only_first: usize,
    pub only_second: usize,
}

/// A tag column and the value it takes for each side of the diff.
struct Tag<'a> {
    column: &'a str,
    first: String,
    second: String,
}

fn write_difference(
    first: &LabelTable,
    second: &LabelTable,
    tags: &[Tag<'_>],
    output_path: &Path,
) -> Result<DiffSummary> {
    let (only_first, only_second) = patent_difference(first, second)?;

    let mut headers: Vec<String> = first.headers.clone();
    for h in &second.headers {
        if !headers.contains(h) {
            headers.push(h.clone());
        }
    }
    headers.extend(tags.iter().map(|t| t.column.to_string()));

    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut writer = WriterBuilder::new().from_path(output_path)?;
    writer.write_record(&headers)?;

    let data_columns = headers.len() - tags.len();
    for (table, rows, is_first) in [(first, &only_first, true), (second, &only_second, false)] {
        for row in rows {
            let mut out: Vec<String> = headers[..data_columns]
                .iter()
                .map(|h| table.value(row, h))
                .collect();
            out.extend(
                tags.iter()
                    .map(|t| if is_first { t.first.clone() } else { t.second.clone() }),
            );
            writer.write_record(&out)?;
        }
    }
    writer.flush()?;

    info!(
        "Wrote {} + {} differing rows to {}",
        only_first.len(),
        only_second.len(),
        output_path.display()
    );
    Ok(DiffSummary {
        output_path: output_path.to_path_buf(),
        only_first: only_first.len(),
        only_second: only_second.len(),
    })
}

/// Diffs two labelers' files for the same seed mention by patent.
pub fn compare_labelers(
    input_dir: &Path,
    output_dir: &Path,
    mention: &MentionId,
    labeler1: &str,
    labeler2: &str,
) -> Result<DiffSummary> {
    let first = LabelTable::read(input_dir.join(format!("{mention}-{labeler1}.csv")))?;
    let second = LabelTable::read(input_dir.join(format!("{mention}-{labeler2}.csv")))?;
    let tags = [Tag { column: "Labeler", first: labeler1.to_string(), second: labeler2.to_string() }];
    write_difference(&first, &second, &tags, &output_dir.join(format!("{mention}-difference.csv")))
}

/// Diffs the labeled clusters of two seed mentions by patent.
pub fn dedup_mentions(
    input_dir: &Path,
    output_dir: &Path,
    first_mention: &MentionId,
    second_mention: &MentionId,
) -> Result<DiffSummary> {
    let first = LabelTable::read(input_dir.join(format!("{first_mention}.csv")))?;
    let second = LabelTable::read(input_dir.join(format!("{second_mention}.csv")))?;
    let tags = [
        Tag { column: "Origin", first: "1".to_string(), second: "2".to_string() },
        Tag { column: "Mention ID", first: first_mention.to_string(), second: second_mention.to_string() },
    ];
    let output = output_dir.join(format!("{first_mention}_{second_mention}.csv"));
    write_difference(&first, &second, &tags, &output)
}

#[derive(Debug, Clone, Default)]
pub struct CheckReport {
    pub files_checked: usize,
    pub missing_seed: Vec<PathBuf>,
    pub unreadable: Vec<PathBuf>,
    pub total_mentions: usize,
}

/// Checks that every `<seed>.csv` in `dir` contains its own seed mention,
/// and adds all mention ids seen to the store file at `store`.
pub fn check_labeled_dir(dir: &Path, store: &Path) -> Result<CheckReport> {
    let mut all_mentions: BTreeSet<String> = BTreeSet::new();
    if store.exists() {
        let reader = BufReader::new(File::open(store)?);
        for line in reader.lines() {
            let line = line?;
            if !line.trim().is_empty() {
                all_mentions.insert(line.trim().to_string());
            }
        }
        info!("Loaded {} known mention ids from {}", all_mentions.len(), store.display());
    }

    let pattern = Path::new(&Pattern::escape(&dir.to_string_lossy())).join("*.csv");
    let pattern_str = pattern.to_string_lossy();
    let mut files: Vec<PathBuf> = glob(&pattern_str)
        .map_err(|e| ExtractError::Io(std::io::Error::new(std::io::ErrorKind::InvalidInput, e)))?
        .filter_map(std::result::Result::ok)
        .collect();
    files.sort();
    if files.is_empty() {
        warn!("No files found matching the pattern: {}", pattern_str);
    }

    let progress = ProgressBar::new(files.len() as u64);
    if let Ok(style) = ProgressStyle::default_bar().template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}") {
        progress.set_style(style.progress_chars("=> "));
    }

    let mut report = CheckReport::default();
    for file in &files {
        progress.inc(1);
        report.files_checked += 1;
        let mentions = match LabelTable::read(file).and_then(|t| t.mention_ids()) {
            Ok(m) => m,
            Err(e) => {
                error!("Could not read {}: {}", file.display(), e);
                report.unreadable.push(file.clone());
                continue;
            }
        };

        let seed = file.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default();
        if !mentions.contains(&seed) {
            error!("{} does not contain its seed mention {}", file.display(), seed);
            report.missing_seed.push(file.clone());
        }
        all_mentions.extend(mentions);
    }
    progress.finish_and_clear();

    if let Some(parent) = store.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut contents = all_mentions.iter().cloned().collect::<Vec<_>>().join("\n");
    contents.push('\n');
    fs::write(store, contents)?;

    report.total_mentions = all_mentions.len();
    info!(
        "Checked {} files; {} missing their seed; {} mention ids stored in {}",
        report.files_checked,
        report.missing_seed.len(),
        report.total_mentions,
        store.display()
    );
    Ok(report)
}

/// Reads the candidate mentions from plain, `.gz` or `.zip` input. A zip
/// archive is read from its first entry.
fn read_candidates(input: &Path, column: &str) -> Result<Vec<String>> {
    let file = File::open(input)?;
    match input.extension().and_then(|e| e.to_str()) {
        Some("gz") => disambiguated_mentions(GzDecoder::new(file), column, input),
        Some("zip") => {
            let mut archive = ZipArchive::new(BufReader::new(file))?;
            if archive.len() == 0 {
                return Err(ExtractError::EmptyArchive(input.to_path_buf()));
            }
            let entry = archive.by_index(0)?;
            info!("Reading {} from {}", entry.name(), input.display());
            disambiguated_mentions(entry, column, input)
        }
        _ => disambiguated_mentions(file, column, input),
    }
}

/// `US<patent_id>-<assignee_sequence>` for every TSV row with `column` filled in.
fn disambiguated_mentions<R: Read>(source: R, column: &str, input: &Path) -> Result<Vec<String>> {
    let mut reader = ReaderBuilder::new()
        .delimiter(b'\t')
        .flexible(true)
        .from_reader(source);
    let headers = reader.headers()?.clone();
    let find = |name: &str| {
        headers.iter().position(|h| h == name).ok_or_else(|| ExtractError::MissingColumn {
            column: name.to_string(),
            path: input.to_path_buf(),
        })
    };
    let patent_col = find("patent_id")?;
    let sequence_col = find("assignee_sequence")?;
    let disamb_col = find(column)?;

    let mut candidates = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.get(disamb_col).is_some_and(|v| !v.trim().is_empty()) {
            let patent = record.get(patent_col).unwrap_or("");
            let sequence = record.get(sequence_col).unwrap_or("");
            candidates.push(format!("US{patent}-{sequence}"));
        }
    }
    Ok(candidates)
}

/// Draws `size` distinct mention ids from a persistent-assignee TSV, keeping
/// only rows where `column` is filled in.
pub fn sample_mentions(input: &Path, column: &str, size: usize, seed: u64, output: &Path) -> Result<Vec<String>> {
    let candidates = read_candidates(input, column)?;
    info!("{} disambiguated mentions eligible for sampling", candidates.len());

    let amount = if size > candidates.len() {
        warn!("Requested {} samples but only {} mentions are eligible", size, candidates.len());
        candidates.len()
    } else {
        size
    };

    let mut rng = StdRng::seed_from_u64(seed);
    let picked: Vec<String> = rand::seq::index::sample(&mut rng, candidates.len(), amount)
        .into_iter()
        .map(|i| candidates[i].clone())
        .collect();

    let mut writer = WriterBuilder::new().from_path(output)?;
    writer.write_record(["mention_id"])?;
    for mention in &picked {
        writer.write_record([mention])?;
    }
    writer.flush()?;
    info!("Wrote {} sampled mentions to {}", picked.len(), output.display());
    Ok(picked)
}
