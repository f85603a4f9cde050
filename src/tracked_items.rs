use crate::importance::Importance;
use anyhow::{anyhow, Result};
use std::fs;
use std::path::Path;

pub static TSV_HEADER: &str = "title\timportance\tqid";

/// One row of the tracked-item table: a talk-page title, its banner
/// importance, and the Wikidata item it resolved to, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedItem {
    pub title: String,
    pub importance: Importance,
    pub qid: Option<String>,
}

impl TrackedItem {
    pub const fn is_resolved(&self) -> bool {
        self.qid.is_some()
    }
}

/// Immutable snapshot of the tracked-item table. Loaded once at startup and
/// only ever read afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackedItemTable {
    items: Vec<TrackedItem>,
}

impl TrackedItemTable {
    pub const fn new(items: Vec<TrackedItem>) -> Self {
        Self { items }
    }

    pub fn from_tsv_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref()).map_err(|e| {
            anyhow!(
                "Could not read tracked-item table {}: {e}",
                path.as_ref().display()
            )
        })?;
        Self::from_tsv(&text)
    }

    pub fn from_tsv(text: &str) -> Result<Self> {
        let mut lines = text.lines();
        let header = lines
            .next()
            .ok_or_else(|| anyhow!("Tracked-item table is empty"))?;
        if header.trim_end() != TSV_HEADER {
            return Err(anyhow!("Unexpected tracked-item table header: {header}"));
        }
        let items = lines
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                let mut columns = line.split('\t');
                let title = columns
                    .next()
                    .ok_or_else(|| anyhow!("Missing title column: {line}"))?
                    .to_string();
                let importance = Importance::from_tag(columns.next().unwrap_or(""));
                let qid = parse_qid(columns.next().unwrap_or(""));
                Ok(TrackedItem {
                    title,
                    importance,
                    qid,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { items })
    }

    pub fn to_tsv(&self) -> String {
        let mut out = String::from(TSV_HEADER);
        out.push('\n');
        for item in &self.items {
            out.push_str(&item.title);
            out.push('\t');
            out.push_str(item.importance.as_str());
            out.push('\t');
            out.push_str(item.qid.as_deref().unwrap_or("N/A"));
            out.push('\n');
        }
        out
    }

    pub fn write_tsv_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path.as_ref(), self.to_tsv()).map_err(|e| {
            anyhow!(
                "Could not write tracked-item table {}: {e}",
                path.as_ref().display()
            )
        })
    }

    pub fn items(&self) -> &[TrackedItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// QIDs of resolved items in the given tier, in table order. Unresolved
    /// rows are dropped here, so no sentinel ever reaches a query.
    pub fn resolved_qids(&self, importance: Importance) -> Vec<String> {
        self.items
            .iter()
            .filter(|item| item.importance == importance)
            .filter_map(|item| item.qid.clone())
            .collect()
    }
}

/// Historical tables used `nan` (pandas) and `N/A` (the build script) to mark
/// unresolved rows; both parse to absent.
fn parse_qid(raw: &str) -> Option<String> {
    match raw.trim() {
        "" | "nan" | "N/A" => None,
        qid => Some(qid.to_string()),
    }
}
