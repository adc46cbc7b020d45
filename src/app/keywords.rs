use std::collections::HashMap;
use std::sync::Mutex;

use regex::Regex;

use super::error::ConfigError;

const PATTERN_PREFIX: &str = "re:";

/// A monitored term. Literals match case-insensitively as substrings,
/// patterns are searched against the case-folded page text.
#[derive(Debug, Clone)]
pub enum Keyword {
    Literal { label: String, folded: String },
    Pattern(Regex),
}

impl Keyword {
    pub fn literal(text: &str) -> Self {
        Keyword::Literal {
            label: text.to_string(),
            folded: text.to_lowercase(),
        }
    }

    pub fn pattern(source: &str) -> Result<Self, ConfigError> {
        Regex::new(source)
            .map(Keyword::Pattern)
            .map_err(|source_err| ConfigError::Pattern {
                pattern: source.to_string(),
                source: source_err,
            })
    }

    /// Parses one configured entry; `re:` selects a pattern.
    pub fn parse(entry: &str) -> Result<Self, ConfigError> {
        match entry.strip_prefix(PATTERN_PREFIX) {
            Some(source) => Keyword::pattern(source),
            None => Ok(Keyword::literal(entry)),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Keyword::Literal { label, .. } => label,
            Keyword::Pattern(regex) => regex.as_str(),
        }
    }

    /// `folded_text` must already be lowercased.
    pub fn matches(&self, folded_text: &str) -> bool {
        match self {
            Keyword::Literal { folded, .. } => folded_text.contains(folded.as_str()),
            Keyword::Pattern(regex) => regex.is_match(folded_text),
        }
    }
}

#[derive(Debug, Default)]
pub struct KeywordTracker {
    counts: Mutex<HashMap<String, u64>>,
}

impl KeywordTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_found(&self, found: &[String]) {
        let mut counts = match self.counts.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        for keyword in found {
            let entry = counts.entry(keyword.clone()).or_insert(0);
            *entry = entry.saturating_add(1);
        }
    }

    pub fn count(&self, keyword: &str) -> u64 {
        let counts = match self.counts.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        counts.get(keyword).copied().unwrap_or(0)
    }

    /// Reorders `found` by descending run-wide count. The sort is stable, so
    /// equal counts keep their input order.
    pub fn prioritize(&self, found: &[String]) -> Vec<String> {
        let snapshot = {
            let counts = match self.counts.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            found
                .iter()
                .map(|keyword| counts.get(keyword).copied().unwrap_or(0))
                .collect::<Vec<_>>()
        };

        let mut ranked = found.iter().zip(snapshot).collect::<Vec<_>>();
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked.into_iter().map(|(keyword, _)| keyword.clone()).collect()
    }
}
