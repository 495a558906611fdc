//! The table of analyses known to a run.

use std::collections::BTreeMap;

use tracing::debug;

use super::descriptor::Analysis;
use crate::error::AnalysisError;

/// Requesting this name runs every registered analysis.
pub const ALL_ANALYSES: &str = "all";

#[derive(Debug, Default, Clone)]
pub struct AnalysisRegistry {
    analyses: BTreeMap<String, Analysis>,
}

impl AnalysisRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, analysis: Analysis) -> Result<(), AnalysisError> {
        if self.analyses.contains_key(&analysis.name) {
            return Err(AnalysisError::DuplicateAnalysis(analysis.name));
        }
        debug!("Registered {:?}", analysis);
        self.analyses.insert(analysis.name.clone(), analysis);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&Analysis, AnalysisError> {
        self.analyses
            .get(name)
            .ok_or_else(|| AnalysisError::UnknownAnalysis(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.analyses.contains_key(name)
    }

    /// Registered names in lexicographic order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.analyses.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Analysis> {
        self.analyses.values()
    }

    /// Check every prerequisite is registered and that nothing but a
    /// visualization depends on a visualization.
    pub fn validate(&self) -> Result<(), AnalysisError> {
        for analysis in self.analyses.values() {
            for prerequisite in &analysis.prerequisites {
                let Some(required) = self.analyses.get(prerequisite) else {
                    return Err(AnalysisError::UnknownPrerequisite {
                        analysis: analysis.name.clone(),
                        prerequisite: prerequisite.clone(),
                    });
                };
                if required.is_visual() && !analysis.is_visual() {
                    return Err(AnalysisError::VisualPrerequisite {
                        analysis: analysis.name.clone(),
                        prerequisite: prerequisite.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Replace `all` with every registered name and drop repeats.
    pub fn expand_requested<S: AsRef<str>>(&self, requested: &[S]) -> Vec<String> {
        let mut expanded: Vec<String> = Vec::new();
        for name in requested {
            let name = name.as_ref().trim();
            if name.is_empty() {
                continue;
            }
            if name == ALL_ANALYSES {
                expanded.extend(self.names().map(str::to_string));
            } else {
                expanded.push(name.to_string());
            }
        }

        let mut seen = std::collections::HashSet::new();
        expanded.retain(|name| seen.insert(name.clone()));
        expanded
    }
}
