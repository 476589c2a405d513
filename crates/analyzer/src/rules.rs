//! Category and default-credential signature rules.
//!
//! Both rule files share one format: one rule per line,
//! `token1[;token2;...]|label`. A rule matches a document when every token
//! occurs in it, compared case-insensitively.

use snaphound_core::UNCATEGORIZED;
use std::{
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{debug, warn};

const TOKEN_SEPARATOR: char = ';';
const LABEL_SEPARATOR: char = '|';

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("reading rule file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    /// Lowercased tokens, all of which must be present.
    tokens: Vec<String>,
    label: String,
}

impl Rule {
    /// Parse one rule line. `None` for anything that is not `tokens|label`.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        let mut parts = line.split(LABEL_SEPARATOR);
        let (patterns, label) = match (parts.next(), parts.next(), parts.next()) {
            (Some(p), Some(l), None) => (p, l.trim()),
            _ => return None,
        };
        let tokens: Vec<String> = patterns
            .split(TOKEN_SEPARATOR)
            .filter(|t| !t.trim().is_empty())
            .map(str::to_lowercase)
            .collect();
        if tokens.is_empty() || label.is_empty() {
            return None;
        }
        Some(Self {
            tokens,
            label: label.to_string(),
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// `lowered_body` must already be lowercased.
    fn matches(&self, lowered_body: &str) -> bool {
        self.tokens.iter().all(|t| lowered_body.contains(t.as_str()))
    }
}

/// An ordered rule table, in file order.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    /// Parse rule text. Blank and malformed lines are skipped.
    pub fn parse(text: &str) -> Self {
        let mut rules = Vec::new();
        for (no, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match Rule::parse(line) {
                Some(rule) => rules.push(rule),
                None => debug!(line = no + 1, "skipping malformed rule line"),
            }
        }
        Self { rules }
    }

    pub fn load(path: &Path) -> Result<Self, RuleError> {
        let text = fs::read_to_string(path).map_err(|source| RuleError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let set = Self::parse(&text);
        debug!(path = %path.display(), rules = set.len(), "loaded rule file");
        Ok(set)
    }

    /// Like `load`, but a missing file yields an empty table and a warning.
    pub fn load_or_empty(path: &Path) -> Self {
        match Self::load(path) {
            Ok(set) => set,
            Err(e) => {
                warn!("{e}; continuing without these rules");
                Self::default()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    fn last_match(&self, lowered_body: &str) -> Option<&str> {
        self.rules
            .iter()
            .rev()
            .find(|r| r.matches(lowered_body))
            .map(Rule::label)
    }

    fn all_matches(&self, lowered_body: &str) -> Vec<&str> {
        self.rules
            .iter()
            .filter(|r| r.matches(lowered_body))
            .map(Rule::label)
            .collect()
    }
}

/// Category for a document: the last rule in file order that fully matches.
pub fn classify<'r>(body: &str, rules: &'r RuleSet) -> Option<&'r str> {
    rules.last_match(&body.to_lowercase())
}

/// Every matching signature label, in file order.
pub fn find_signatures<'r>(body: &str, rules: &'r RuleSet) -> Vec<&'r str> {
    rules.all_matches(&body.to_lowercase())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub category: String,
    pub credentials: Vec<String>,
}

/// Category and signature tables evaluated together against one page.
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    categories: RuleSet,
    signatures: RuleSet,
}

impl Classifier {
    pub fn new(categories: RuleSet, signatures: RuleSet) -> Self {
        Self {
            categories,
            signatures,
        }
    }

    pub fn evaluate(&self, body: &str, title: Option<&str>) -> Classification {
        let lowered = body.to_lowercase();
        let mut category = self
            .categories
            .last_match(&lowered)
            .unwrap_or(UNCATEGORIZED)
            .to_string();
        if let Some(builtin) = title.and_then(title_category) {
            category = builtin.to_string();
        }
        let credentials = self
            .signatures
            .all_matches(&lowered)
            .into_iter()
            .map(str::to_string)
            .collect();
        Classification {
            category,
            credentials,
        }
    }
}

/// Categories implied by well-known server error and listing titles.
/// Later checks override earlier ones.
fn title_category(title: &str) -> Option<&'static str> {
    let mut found = None;
    if title.contains("403 Forbidden") || title.contains("401 Unauthorized") {
        found = Some("unauth");
    }
    if title.contains("Index of /")
        || title.contains("Directory Listing For /")
        || title.contains("Directory of /")
    {
        found = Some("dirlist");
    }
    if title.contains("404 Not Found") {
        found = Some("notfound");
    }
    found
}
