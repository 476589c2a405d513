use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TallyEntry {
    pub label: String,
    pub count: usize,
}

/// Per-category target counts, filled in once per target after the fetch pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CategoryTally {
    entries: BTreeMap<String, TallyEntry>,
    total: usize,
}

impl CategoryTally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, key: &str, label: &str) {
        self.entries
            .entry(key.to_string())
            .or_insert_with(|| TallyEntry {
                label: label.to_string(),
                count: 0,
            })
            .count += 1;
        self.total += 1;
    }

    pub fn count(&self, key: &str) -> usize {
        self.entries.get(key).map(|e| e.count).unwrap_or(0)
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(|e| e.label.as_str())
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Non-empty categories, ordered by key.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &TallyEntry)> {
        self.entries
            .iter()
            .filter(|(_, e)| e.count > 0)
            .map(|(k, e)| (k.as_str(), e))
    }
}
