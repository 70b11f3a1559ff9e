use crate::assemble::GroupBlock;
use crate::error::{ExtractError, Result};
use csv::Writer;
use log::{debug, info};
use rust_xlsxwriter::{Format, FormatAlign, Workbook, Worksheet};
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

pub const SHEET_NAME: &str = "assignees";

/// A vertical run of equal cells in one column, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MergeRange {
    pub first_row: u32,
    pub last_row: u32,
    pub col: u16,
}

/// Runs of two or more identical, non-empty cells within `rows`, which are
/// placed on the sheet starting at `first_row`.
pub fn merge_ranges(rows: &[Vec<String>], first_row: u32) -> Vec<MergeRange> {
    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    let mut ranges = Vec::new();

    for col in 0..width {
        let mut start = 0;
        while start < rows.len() {
            let value = rows[start].get(col);
            let mut end = start;
            while end + 1 < rows.len() && rows[end + 1].get(col) == value {
                end += 1;
            }
            if end > start && value.is_some_and(|v| !v.is_empty()) {
                ranges.push(MergeRange {
                    first_row: first_row + start as u32,
                    last_row: first_row + end as u32,
                    col: col as u16,
                });
            }
            start = end + 1;
        }
    }
    ranges
}

/// The merged regions already on a sheet. Re-applying a range is a no-op.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeLayout {
    ranges: BTreeSet<MergeRange>,
}

impl MergeLayout {
    /// Adds `ranges` and returns only the ones that were not present yet.
    pub fn apply<I: IntoIterator<Item = MergeRange>>(&mut self, ranges: I) -> Vec<MergeRange> {
        ranges.into_iter().filter(|r| self.ranges.insert(*r)).collect()
    }

    pub fn ranges(&self) -> impl Iterator<Item = &MergeRange> {
        self.ranges.iter()
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

pub trait OutputStrategy {
    fn append_group(&mut self, block: &GroupBlock) -> Result<()>;
    fn finish(&mut self) -> Result<()>;
    fn rows_written(&self) -> usize;
}

/// Picks CSV or XLSX from the file extension and writes the header row.
pub fn open_output<P: AsRef<Path>>(path: P, headers: &[&str]) -> Result<Box<dyn OutputStrategy>> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("csv") => Ok(Box::new(CsvOutput::new(path, headers)?)),
        Some("xlsx") => Ok(Box::new(XlsxOutput::new(path, headers)?)),
        _ => Err(ExtractError::UnsupportedOutput(path.to_path_buf())),
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Flat output: every row carries all of its values, nothing is merged.
pub struct CsvOutput {
    writer: Writer<File>,
    file_path: PathBuf,
    rows: usize,
}

impl CsvOutput {
    pub fn new<P: AsRef<Path>>(path: P, headers: &[&str]) -> Result<Self> {
        let file_path = path.as_ref().to_path_buf();
        info!("Initializing CSV output file: {}", file_path.display());
        ensure_parent(&file_path)?;

        let mut writer = Writer::from_path(&file_path)?;
        writer.write_record(headers)?;
        Ok(Self { writer, file_path, rows: 0 })
    }
}

impl OutputStrategy for CsvOutput {
    fn append_group(&mut self, block: &GroupBlock) -> Result<()> {
        for row in &block.rows {
            self.writer.write_record(row)?;
        }
        self.rows += block.rows.len();
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        info!("Flushing {} rows to: {}", self.rows, self.file_path.display());
        self.writer.flush()?;
        Ok(())
    }

    fn rows_written(&self) -> usize {
        self.rows
    }
}

/// Spreadsheet output with repeated values merged inside each group.
pub struct XlsxOutput {
    worksheet: Worksheet,
    file_path: PathBuf,
    layout: MergeLayout,
    merge_format: Format,
    next_row: u32,
}

impl XlsxOutput {
    pub fn new<P: AsRef<Path>>(path: P, headers: &[&str]) -> Result<Self> {
        let file_path = path.as_ref().to_path_buf();
        info!("Initializing XLSX output file: {}", file_path.display());
        ensure_parent(&file_path)?;

        let mut worksheet = Worksheet::new();
        worksheet.set_name(SHEET_NAME)?;
        let header_format = Format::new().set_bold();
        for (col, header) in headers.iter().enumerate() {
            worksheet.write_string_with_format(0, col as u16, *header, &header_format)?;
        }

        Ok(Self {
            worksheet,
            file_path,
            layout: MergeLayout::default(),
            merge_format: Format::new().set_align(FormatAlign::Top),
            next_row: 1,
        })
    }

    pub fn layout(&self) -> &MergeLayout {
        &self.layout
    }
}

impl OutputStrategy for XlsxOutput {
    fn append_group(&mut self, block: &GroupBlock) -> Result<()> {
        let first_row = self.next_row;
        for (offset, row) in block.rows.iter().enumerate() {
            let sheet_row = first_row + offset as u32;
            for (col, value) in row.iter().enumerate() {
                if !value.is_empty() {
                    self.worksheet.write_string(sheet_row, col as u16, value.as_str())?;
                }
            }
        }
        self.next_row += block.rows.len() as u32;

        let ranges = merge_ranges(&block.rows, first_row);
        for range in self.layout.apply(ranges) {
            let value = &block.rows[(range.first_row - first_row) as usize][range.col as usize];
            self.worksheet.merge_range(
                range.first_row,
                range.col,
                range.last_row,
                range.col,
                value,
                &self.merge_format,
            )?;
        }
        debug!(
            "Appended group {}/{:?} at rows {}..{}",
            block.key.patent_id,
            block.key.sequence,
            first_row,
            self.next_row
        );
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        info!(
            "Saving {} rows with {} merged regions to: {}",
            self.rows_written(),
            self.layout.len(),
            self.file_path.display()
        );
        let mut workbook = Workbook::new();
        workbook.push_worksheet(std::mem::replace(&mut self.worksheet, Worksheet::new()));
        workbook.save(&self.file_path)?;
        Ok(())
    }

    fn rows_written(&self) -> usize {
        (self.next_row - 1) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assemble::GroupKey;

    fn rows(data: &[&[&str]]) -> Vec<Vec<String>> {
        data.iter().map(|r| r.iter().map(|c| c.to_string()).collect()).collect()
    }

    fn block(patent_id: &str, sequence: u32, data: &[&[&str]]) -> GroupBlock {
        GroupBlock {
            key: GroupKey { patent_id: patent_id.to_string(), sequence: Some(sequence) },
            rows: rows(data),
        }
    }

    #[test]
    fn merges_contiguous_equal_values_only() {
        let data = rows(&[
            &["123", "0", "A"],
            &["123", "1", "A"],
            &["123", "", "B"],
            &["123", "", "A"],
        ]);
        let ranges = merge_ranges(&data, 5);
        assert_eq!(
            ranges,
            vec![
                MergeRange { first_row: 5, last_row: 8, col: 0 },
                MergeRange { first_row: 5, last_row: 6, col: 2 },
            ]
        );
    }

    #[test]
    fn single_row_groups_never_merge() {
        assert!(merge_ranges(&rows(&[&["123", "0"]]), 1).is_empty());
        assert!(merge_ranges(&[], 1).is_empty());
    }

    #[test]
    fn applying_merge_pass_twice_is_a_noop() {
        let data = rows(&[&["123", "x"], &["123", "x"], &["123", "y"]]);
        let mut layout = MergeLayout::default();
        let first = layout.apply(merge_ranges(&data, 1));
        let snapshot = layout.clone();
        let second = layout.apply(merge_ranges(&data, 1));

        assert_eq!(first.len(), 2);
        assert!(second.is_empty());
        assert_eq!(layout, snapshot);
    }

    #[test]
    fn merges_stay_inside_groups() {
        let dir = tempfile::tempdir().unwrap();
        let headers = ["patent_id", "assignee_sequence"];
        let mut out = XlsxOutput::new(dir.path().join("out.xlsx"), &headers).unwrap();
        out.append_group(&block("123", 0, &[&["123", "0"]])).unwrap();
        out.append_group(&block("123", 1, &[&["123", "1"]])).unwrap();
        out.append_group(&block("456", 0, &[&["456", "0"], &["456", "1"]])).unwrap();

        let merged: Vec<_> = out.layout().ranges().copied().collect();
        assert_eq!(merged, vec![MergeRange { first_row: 3, last_row: 4, col: 0 }]);
        assert_eq!(out.rows_written(), 4);
        out.finish().unwrap();
        assert!(dir.path().join("out.xlsx").exists());
    }

    #[test]
    fn output_kind_follows_extension() {
        let dir = tempfile::tempdir().unwrap();
        assert!(open_output(dir.path().join("a.csv"), &["x"]).is_ok());
        assert!(open_output(dir.path().join("nested/a.XLSX"), &["x"]).is_ok());
        assert!(matches!(
            open_output(dir.path().join("a.json"), &["x"]),
            Err(ExtractError::UnsupportedOutput(_))
        ));
    }

    #[test]
    fn csv_repeats_values_and_writes_header_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let mut out = CsvOutput::new(&path, &["patent_id", "assignee_sequence"]).unwrap();
        out.append_group(&block("123", 0, &[&["123", "0"], &["123", "1"]])).unwrap();
        out.append_group(&block("456", 0, &[&["456", "0"]])).unwrap();
        out.finish().unwrap();

        let written = fs::read_to_string(&path).unwrap();
        assert_eq!(written, "patent_id,assignee_sequence\n123,0\n123,1\n456,0\n");
    }
}
