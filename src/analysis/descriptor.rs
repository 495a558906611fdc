//! Descriptions of the analyses the engine can run.

use std::fmt;
use std::sync::Arc;

use crate::data::filters::Filter;
use crate::data::{Data, DataRepository, Identifier};
use crate::error::Result;
use crate::vis::VisSettings;

/// Produces the result of a simple analysis for one matching identifier.
pub type ComputeFn = Arc<dyn Fn(&Identifier, &DataRepository) -> Result<Data> + Send + Sync>;

/// Groups the results of a meta analysis's prerequisites.
pub type KeyFn = Arc<dyn Fn(&Identifier) -> String + Send + Sync>;

/// Checks one result of the verified analysis.
pub type CheckFn = Arc<dyn Fn(&Identifier, &DataRepository) -> Result<bool> + Send + Sync>;

#[derive(Clone)]
pub enum AnalysisKind {
    /// Runs `compute` on every identifier matching `filter`.
    Simple { filter: Filter, compute: ComputeFn },
    /// Tabulates the scalar results of the prerequisites per period.
    Meta { key_method: KeyFn },
    /// Checks every result of `target_analysis`; writes nothing.
    Verification {
        target_analysis: String,
        check: CheckFn,
    },
    /// Renders every identifier matching `filter`.
    Visual { filter: Filter, settings: VisSettings },
}

impl AnalysisKind {
    pub fn label(&self) -> &'static str {
        match self {
            AnalysisKind::Simple { .. } => "simple",
            AnalysisKind::Meta { .. } => "meta",
            AnalysisKind::Verification { .. } => "verification",
            AnalysisKind::Visual { .. } => "visual",
        }
    }
}

#[derive(Clone)]
pub struct Analysis {
    pub name: String,
    pub prerequisites: Vec<String>,
    pub kind: AnalysisKind,
}

impl Analysis {
    pub fn simple(
        name: impl Into<String>,
        filter: Filter,
        compute: impl Fn(&Identifier, &DataRepository) -> Result<Data> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            prerequisites: Vec::new(),
            kind: AnalysisKind::Simple {
                filter,
                compute: Arc::new(compute),
            },
        }
    }

    pub fn meta<S: Into<String>>(
        name: impl Into<String>,
        prerequisites: impl IntoIterator<Item = S>,
        key_method: impl Fn(&Identifier) -> String + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            prerequisites: prerequisites.into_iter().map(Into::into).collect(),
            kind: AnalysisKind::Meta {
                key_method: Arc::new(key_method),
            },
        }
    }

    /// A verification of `target`. The target is always a prerequisite.
    pub fn verification(
        name: impl Into<String>,
        target: impl Into<String>,
        check: impl Fn(&Identifier, &DataRepository) -> Result<bool> + Send + Sync + 'static,
    ) -> Self {
        let target = target.into();
        Self {
            name: name.into(),
            prerequisites: vec![target.clone()],
            kind: AnalysisKind::Verification {
                target_analysis: target,
                check: Arc::new(check),
            },
        }
    }

    pub fn visual(name: impl Into<String>, filter: Filter, settings: VisSettings) -> Self {
        Self {
            name: name.into(),
            prerequisites: Vec::new(),
            kind: AnalysisKind::Visual { filter, settings },
        }
    }

    pub fn requires<S: Into<String>>(mut self, prerequisites: impl IntoIterator<Item = S>) -> Self {
        self.prerequisites
            .extend(prerequisites.into_iter().map(Into::into));
        self
    }

    pub fn is_visual(&self) -> bool {
        matches!(self.kind, AnalysisKind::Visual { .. })
    }
}

impl fmt::Debug for Analysis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Analysis")
            .field("name", &self.name)
            .field("kind", &self.kind.label())
            .field("prerequisites", &self.prerequisites)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::filters::{by_type, shared};
    use crate::data::IdentifierKind;

    #[test]
    fn test_verification_requires_its_target() {
        let analysis = Analysis::verification("cpuhourscheck", "cpuhourstotal", |_, _| Ok(true));
        assert_eq!(analysis.prerequisites, vec!["cpuhourstotal".to_string()]);
        assert!(!analysis.is_visual());
    }

    #[test]
    fn test_debug_names_the_kind() {
        let analysis = Analysis::simple(
            "cpuhours",
            shared(by_type(IdentifierKind::Source, true)),
            |_, _| Ok(Data::Empty),
        )
        .requires(["gpujobs"]);
        let rendered = format!("{:?}", analysis);
        assert!(rendered.contains("cpuhours"));
        assert!(rendered.contains("simple"));
        assert!(rendered.contains("gpujobs"));
    }
}
