//! Series label strings as used in PromQL results and Grafana CSV headers.
//!
//! A series is named by its attribute string, e.g.
//! `{namespace="ns1", uid="abc", resource="cpu"}`.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::DataError;

fn pair_regex() -> &'static Regex {
    static PAIR: OnceLock<Regex> = OnceLock::new();
    PAIR.get_or_init(|| {
        Regex::new(r#"([A-Za-z_][A-Za-z0-9_]*)\s*=\s*"([^"]*)""#).expect("valid label pattern")
    })
}

/// Ordered `key="value"` pairs of one series.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SeriesLabels {
    pairs: Vec<(String, String)>,
}

impl SeriesLabels {
    pub fn new<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            pairs: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Parse an attribute string. Separators between pairs may be any mix of
    /// commas and whitespace.
    pub fn parse(raw: &str) -> Result<Self, DataError> {
        let trimmed = raw.trim();
        let inner = trimmed
            .strip_prefix('{')
            .and_then(|s| s.strip_suffix('}'))
            .ok_or_else(|| DataError::Label(raw.to_string()))?;

        let mut pairs = Vec::new();
        let mut consumed = 0;
        for captures in pair_regex().captures_iter(inner) {
            let whole = captures.get(0).ok_or_else(|| DataError::Label(raw.to_string()))?;
            let gap = &inner[consumed..whole.start()];
            if !gap.chars().all(|c| c == ',' || c.is_whitespace()) {
                return Err(DataError::Label(raw.to_string()));
            }
            consumed = whole.end();
            pairs.push((captures[1].to_string(), captures[2].to_string()));
        }
        if !inner[consumed..].chars().all(|c| c == ',' || c.is_whitespace()) {
            return Err(DataError::Label(raw.to_string()));
        }

        Ok(Self { pairs })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn namespace(&self) -> Option<&str> {
        self.get("namespace")
    }

    pub fn uid(&self) -> Option<&str> {
        self.get("uid")
    }

    pub fn resource(&self) -> Option<&str> {
        self.get("resource")
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }
}

impl fmt::Display for SeriesLabels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self
            .pairs
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", k, v))
            .collect();
        write!(f, "{{{}}}", rendered.join(", "))
    }
}

/// Extract a single label from a column name without keeping the parse.
pub fn label_of(column: &str, key: &str) -> Option<String> {
    SeriesLabels::parse(column)
        .ok()
        .and_then(|labels| labels.get(key).map(str::to_string))
}
