//! Lines normalized dimensions up into rectangular row blocks.
//!
//! Every selected assignee of a patent gets its own block. In complex mode
//! the block repeats the patent and assignee fields on each row and pairs
//! the Nth inventor with the Nth CPC subclass after sorting each list on its
//! own. The pairing is positional only and does not claim that inventor N
//! relates to subclass N.

use crate::normalize::{AssigneeRow, CpcRow, InventorRow, NormalizedRecord, PatentFields};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionMode {
    /// Patent and assignee columns, one row per selected assignee.
    Simplified,
    /// Adds inventor and CPC columns, one block per selected assignee.
    Complex,
}

pub const SIMPLIFIED_COLUMNS: [&str; 14] = [
    "patent_id",
    "assignee_sequence",
    "patent_title",
    "patent_abstract",
    "patent_date",
    "patent_type",
    "assignee_id",
    "assignee_type",
    "assignee_individual_name_first",
    "assignee_individual_name_last",
    "assignee_organization",
    "assignee_city",
    "assignee_state",
    "assignee_country",
];

pub const INVENTOR_COLUMNS: [&str; 7] = [
    "inventor_sequence",
    "inventor_id",
    "inventor_name_first",
    "inventor_name_last",
    "inventor_city",
    "inventor_state",
    "inventor_country",
];

pub const CPC_COLUMNS: [&str; 2] = ["cpc_subclass_id", "cpc_subclass_title"];

pub fn headers(mode: ExtractionMode) -> Vec<&'static str> {
    let mut columns = SIMPLIFIED_COLUMNS.to_vec();
    if mode == ExtractionMode::Complex {
        columns.extend(INVENTOR_COLUMNS);
        columns.extend(CPC_COLUMNS);
    }
    columns
}

/// Patent id plus the sequence of the block's assignee.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupKey {
    pub patent_id: String,
    pub sequence: Option<u32>,
}

/// Rows that belong together at write time; merges never leave a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupBlock {
    pub key: GroupKey,
    pub rows: Vec<Vec<String>>,
}

pub fn assemble(record: &NormalizedRecord, mode: ExtractionMode) -> Vec<GroupBlock> {
    let mut assignees = record.assignees.clone();
    assignees.sort_by_key(|a| a.sequence);

    let mut inventors = record.inventors.clone();
    inventors.sort_by_key(|i| i.sequence);
    let mut cpcs = record.cpcs.clone();
    cpcs.sort_by(|a, b| a.subclass_id.cmp(&b.subclass_id));

    assignees
        .iter()
        .map(|assignee| {
            let base = simplified_row(&record.patent, assignee);
            let rows = match mode {
                ExtractionMode::Simplified => vec![base],
                ExtractionMode::Complex => complex_rows(&base, &inventors, &cpcs),
            };
            GroupBlock {
                key: GroupKey {
                    patent_id: record.patent.patent_id.clone(),
                    sequence: assignee.sequence,
                },
                rows,
            }
        })
        .collect()
}

fn complex_rows(base: &[String], inventors: &[InventorRow], cpcs: &[CpcRow]) -> Vec<Vec<String>> {
    let height = inventors.len().max(cpcs.len()).max(1);
    let blank_inventor = InventorRow::default();
    let blank_cpc = CpcRow::default();

    (0..height)
        .map(|i| {
            let mut row = base.to_vec();
            row.extend(inventor_cells(inventors.get(i).unwrap_or(&blank_inventor)));
            row.extend(cpc_cells(cpcs.get(i).unwrap_or(&blank_cpc)));
            row
        })
        .collect()
}

fn simplified_row(patent: &PatentFields, assignee: &AssigneeRow) -> Vec<String> {
    vec![
        patent.patent_id.clone(),
        number(assignee.sequence),
        text(&patent.title),
        text(&patent.abstract_text),
        text(&patent.date),
        text(&patent.patent_type),
        text(&assignee.assignee_id),
        text(&assignee.type_label),
        text(&assignee.name_first),
        text(&assignee.name_last),
        text(&assignee.organization),
        text(&assignee.city),
        text(&assignee.state),
        text(&assignee.country),
    ]
}

fn inventor_cells(inventor: &InventorRow) -> [String; 7] {
    [
        number(inventor.sequence),
        text(&inventor.inventor_id),
        text(&inventor.name_first),
        text(&inventor.name_last),
        text(&inventor.city),
        text(&inventor.state),
        text(&inventor.country),
    ]
}

fn cpc_cells(cpc: &CpcRow) -> [String; 2] {
    [text(&cpc.subclass_id), text(&cpc.title)]
}

fn text(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

fn number(value: Option<u32>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(assignees: usize, inventors: usize, cpcs: &[&str]) -> NormalizedRecord {
        let or_blank = |n: usize| n.max(1);
        NormalizedRecord {
            patent: PatentFields {
                patent_id: "123".to_string(),
                title: Some("Widget".to_string()),
                ..Default::default()
            },
            assignees: (0..or_blank(assignees))
                .rev()
                .map(|i| AssigneeRow {
                    sequence: (assignees > 0).then_some(i as u32),
                    organization: (assignees > 0).then(|| format!("Org {i}")),
                    ..Default::default()
                })
                .collect(),
            inventors: (0..or_blank(inventors))
                .rev()
                .map(|i| InventorRow {
                    sequence: (inventors > 0).then_some(i as u32),
                    ..Default::default()
                })
                .collect(),
            cpcs: if cpcs.is_empty() {
                vec![CpcRow::default()]
            } else {
                cpcs.iter()
                    .map(|c| CpcRow { subclass_id: Some(c.to_string()), title: None })
                    .collect()
            },
        }
    }

    fn column(block: &GroupBlock, mode: ExtractionMode, name: &str) -> Vec<String> {
        let idx = headers(mode).iter().position(|h| *h == name).unwrap();
        block.rows.iter().map(|r| r[idx].clone()).collect()
    }

    #[test]
    fn complex_block_height_is_longest_of_inventors_and_cpcs() {
        for (a, i, c) in [(1, 0, vec![]), (2, 5, vec!["A01B"]), (1, 2, vec!["H01L", "A01B", "G06F"])] {
            let blocks = assemble(&record(a, i, &c), ExtractionMode::Complex);
            assert_eq!(blocks.len(), a);
            let expected = i.max(1).max(c.len().max(1));
            for block in &blocks {
                assert_eq!(block.rows.len(), expected);
                assert!(block.rows.iter().all(|r| r.len() == headers(ExtractionMode::Complex).len()));
            }
        }
    }

    #[test]
    fn every_assignee_block_carries_all_inventors_and_cpcs() {
        let blocks = assemble(&record(2, 3, &["H01L", "A01B"]), ExtractionMode::Complex);
        let mode = ExtractionMode::Complex;
        assert_eq!(blocks.len(), 2);

        for (seq, block) in blocks.iter().enumerate() {
            assert_eq!(block.key, GroupKey { patent_id: "123".to_string(), sequence: Some(seq as u32) });
            let seq = seq.to_string();
            assert_eq!(column(block, mode, "patent_id"), ["123", "123", "123"]);
            assert_eq!(column(block, mode, "patent_title"), ["Widget", "Widget", "Widget"]);
            assert_eq!(column(block, mode, "assignee_sequence"), [seq.as_str(), seq.as_str(), seq.as_str()]);
            assert_eq!(column(block, mode, "inventor_sequence"), ["0", "1", "2"]);
            assert_eq!(column(block, mode, "cpc_subclass_id"), ["A01B", "H01L", ""]);
        }
        assert_eq!(column(&blocks[1], mode, "assignee_organization"), ["Org 1", "Org 1", "Org 1"]);
    }

    #[test]
    fn simplified_emits_one_block_per_assignee() {
        let blocks = assemble(&record(2, 4, &["H01L"]), ExtractionMode::Simplified);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].key.sequence, Some(0));
        assert_eq!(blocks[1].key.sequence, Some(1));
        for block in &blocks {
            assert_eq!(block.rows.len(), 1);
            assert_eq!(block.rows[0].len(), SIMPLIFIED_COLUMNS.len());
        }
        assert_eq!(column(&blocks[1], ExtractionMode::Simplified, "assignee_organization"), ["Org 1"]);
    }

    #[test]
    fn single_assignee_without_other_dimensions_is_one_row() {
        let blocks = assemble(&record(1, 0, &[]), ExtractionMode::Complex);
        assert_eq!(blocks[0].rows.len(), 1);
        assert_eq!(column(&blocks[0], ExtractionMode::Complex, "inventor_id"), [""]);
    }
}
