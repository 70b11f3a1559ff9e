use crate::error::Result;
use crate::ids::{unwrap_reference, ReferenceKind};
use crate::lookup::{assignee_type_label, ClassificationTitles};
use crate::record::{Patent, RawAssignee, RawCpc, RawInventor};
use log::debug;
use std::collections::HashSet;

/// Which assignee mentions on a patent are of interest: any whose
/// disambiguated id was requested, or the one at an explicit sequence.
#[derive(Debug, Clone, Default)]
pub struct AssigneeSelection {
    ids: HashSet<String>,
    sequence: Option<u32>,
}

impl AssigneeSelection {
    pub fn by_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { ids: ids.into_iter().map(Into::into).collect(), sequence: None }
    }

    pub fn by_sequence(sequence: u32) -> Self {
        Self { ids: HashSet::new(), sequence: Some(sequence) }
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }

    fn matches(&self, assignee_id: Option<&str>, sequence: Option<u32>) -> bool {
        let id_hit = assignee_id.is_some_and(|id| self.ids.contains(id));
        let seq_hit = self.sequence.is_some() && sequence == self.sequence;
        id_hit || seq_hit
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatentFields {
    pub patent_id: String,
    pub title: Option<String>,
    pub abstract_text: Option<String>,
    pub date: Option<String>,
    pub patent_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssigneeRow {
    pub sequence: Option<u32>,
    pub assignee_id: Option<String>,
    pub type_label: Option<String>,
    pub name_first: Option<String>,
    pub name_last: Option<String>,
    pub organization: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InventorRow {
    pub sequence: Option<u32>,
    pub inventor_id: Option<String>,
    pub name_first: Option<String>,
    pub name_last: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CpcRow {
    pub subclass_id: Option<String>,
    pub title: Option<String>,
}

/// One patent with every dimension holding at least one row; an empty
/// dimension holds a single all-empty placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedRecord {
    pub patent: PatentFields,
    pub assignees: Vec<AssigneeRow>,
    pub inventors: Vec<InventorRow>,
    pub cpcs: Vec<CpcRow>,
}

pub struct Normalizer<'a> {
    titles: &'a ClassificationTitles,
    selection: &'a AssigneeSelection,
}

impl<'a> Normalizer<'a> {
    pub fn new(titles: &'a ClassificationTitles, selection: &'a AssigneeSelection) -> Self {
        Self { titles, selection }
    }

    pub fn normalize(&self, patent: &Patent) -> Result<NormalizedRecord> {
        let assignees = self.assignees(&patent.assignees)?;
        let inventors = self.inventors(&patent.inventors)?;
        let cpcs = self.cpcs(&patent.cpc_current)?;

        Ok(NormalizedRecord {
            patent: PatentFields {
                patent_id: patent.patent_id.clone(),
                title: patent.patent_title.clone(),
                abstract_text: patent.patent_abstract.clone(),
                date: patent.patent_date.clone(),
                patent_type: patent.patent_type.clone(),
            },
            assignees: or_placeholder(assignees),
            inventors: or_placeholder(inventors),
            cpcs: or_placeholder(cpcs),
        })
    }

    fn assignees(&self, raw: &[RawAssignee]) -> Result<Vec<AssigneeRow>> {
        let mut rows = Vec::new();
        for entry in raw {
            let assignee_id = entry
                .assignee
                .as_deref()
                .map(|r| unwrap_reference(ReferenceKind::Assignee, r))
                .transpose()?;
            if !self.selection.matches(assignee_id.as_deref(), entry.assignee_sequence) {
                continue;
            }
            rows.push(AssigneeRow {
                sequence: entry.assignee_sequence,
                assignee_id,
                type_label: assignee_type_label(entry.assignee_type).map(str::to_string),
                name_first: entry.assignee_individual_name_first.clone(),
                name_last: entry.assignee_individual_name_last.clone(),
                organization: entry.assignee_organization.clone(),
                city: entry.assignee_city.clone(),
                state: entry.assignee_state.clone(),
                country: entry.assignee_country.clone(),
            });
        }
        Ok(rows)
    }

    fn inventors(&self, raw: &[RawInventor]) -> Result<Vec<InventorRow>> {
        raw.iter()
            .map(|entry| -> Result<InventorRow> {
                let inventor_id = entry
                    .inventor
                    .as_deref()
                    .map(|r| unwrap_reference(ReferenceKind::Inventor, r))
                    .transpose()?;
                Ok(InventorRow {
                    sequence: entry.inventor_sequence,
                    inventor_id,
                    name_first: entry.inventor_name_first.clone(),
                    name_last: entry.inventor_name_last.clone(),
                    city: entry.inventor_city.clone(),
                    state: entry.inventor_state.clone(),
                    country: entry.inventor_country.clone(),
                })
            })
            .collect()
    }

    /// One row per distinct subclass; the first occurrence wins.
    fn cpcs(&self, raw: &[RawCpc]) -> Result<Vec<CpcRow>> {
        let mut seen = HashSet::new();
        let mut rows = Vec::new();
        for entry in raw {
            let subclass = match (&entry.cpc_subclass_id, &entry.cpc_subclass) {
                (Some(id), _) => id.clone(),
                (None, Some(reference)) => unwrap_reference(ReferenceKind::CpcSubclass, reference)?,
                (None, None) => {
                    debug!("Skipping CPC entry without a subclass: {:?}", entry);
                    continue;
                }
            };
            if !seen.insert(subclass.clone()) {
                continue;
            }
            let title = self.titles.title(&subclass).map(str::to_string);
            rows.push(CpcRow { subclass_id: Some(subclass), title });
        }
        Ok(rows)
    }
}

fn or_placeholder<T: Default>(rows: Vec<T>) -> Vec<T> {
    if rows.is_empty() {
        vec![T::default()]
    } else {
        rows
    }
}
