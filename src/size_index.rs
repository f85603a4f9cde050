use crate::missing_articles::MissingArticleRecord;
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Immutable snapshot of the precomputed QID→article-byte-size index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SizeIndex {
    sizes: HashMap<String, u64>,
}

impl SizeIndex {
    pub const fn new(sizes: HashMap<String, u64>) -> Self {
        Self { sizes }
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref()).map_err(|e| {
            anyhow!("Could not read size index {}: {e}", path.as_ref().display())
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let sizes: HashMap<String, u64> =
            serde_json::from_str(text).map_err(|e| anyhow!("Could not parse size index: {e}"))?;
        Ok(Self { sizes })
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(&self.sizes).map_err(|e| anyhow!("Could not encode size index: {e}"))
    }

    pub fn write_json_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path.as_ref(), self.to_json()?).map_err(|e| {
            anyhow!("Could not write size index {}: {e}", path.as_ref().display())
        })
    }

    pub fn get(&self, qid: &str) -> Option<u64> {
        self.sizes.get(qid).copied()
    }

    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }

    /// Fills in `size_bytes` for each record. Pure lookup on already-fetched
    /// data; a QID absent from the index stays `None` and only becomes the
    /// `"unknown"` string at the serialization boundary.
    pub fn annotate(&self, records: &mut [MissingArticleRecord]) {
        for record in records {
            record.size_bytes = self.get(&record.qid);
        }
    }
}
