//! Error types for the analysis engine.
//!
//! Failures are split by where they come from so the caller can decide what
//! to do with them: configuration problems abort before any data is touched,
//! repository misuse points at a bug in a producer, unfulfilled analyses are
//! reported in one batch, and verification failures halt the run.

use thiserror::Error;

/// Invalid identifier construction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentifierError {
    #[error("invalid period {start}-{end}: end timestamp is before start timestamp")]
    InvalidPeriod { start: i64, end: i64 },
}

/// Misuse of the data repository.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("cannot add data for \"{0}\", it already exists in the repository")]
    Duplicate(String),

    #[error("\"{0}\" is not in the repository")]
    NotFound(String),

    #[error("cannot join repositories, the following identifiers already exist: {}", .0.join(", "))]
    JoinCollision(Vec<String>),

    #[error("found overlapping sources: {first} and {second}")]
    OverlappingPeriods { first: String, second: String },

    #[error("repository contains the non-source identifier \"{0}\"")]
    NotSourceOnly(String),
}

/// Registration, scheduling and execution failures of analyses.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("analysis \"{0}\" is not registered")]
    UnknownAnalysis(String),

    #[error("analysis \"{0}\" is already registered")]
    DuplicateAnalysis(String),

    #[error("prerequisite \"{prerequisite}\" of \"{analysis}\" is not a registered analysis")]
    UnknownPrerequisite {
        analysis: String,
        prerequisite: String,
    },

    #[error("analysis \"{analysis}\" requires \"{prerequisite}\" which was not requested")]
    MissingPrerequisite {
        analysis: String,
        prerequisite: String,
    },

    #[error("analysis \"{analysis}\" cannot depend on the visualization \"{prerequisite}\"")]
    VisualPrerequisite {
        analysis: String,
        prerequisite: String,
    },

    #[error(
        "cycle detected in prerequisite graph ({}), unresolved analyses: {}",
        format_cycles(.cycles),
        .unresolved.join(", ")
    )]
    DependencyCycle {
        /// Members of each cycle, sorted.
        cycles: Vec<Vec<String>>,
        /// Every analysis that could not be ordered, sorted.
        unresolved: Vec<String>,
    },

    #[error("cannot run meta analysis \"{0}\", no periods are registered")]
    NoPeriods(String),

    #[error("failed to fulfill analyses: {} (was all data loaded properly?)", .0.join(", "))]
    Unfulfilled(Vec<String>),

    #[error("verification \"{analysis}\" failed for {identifier}")]
    VerificationFailed { analysis: String, identifier: String },

    #[error("meta analysis \"{analysis}\" expected a number for {identifier}, found {found}")]
    NonScalarResult {
        analysis: String,
        identifier: String,
        found: &'static str,
    },

    #[error(
        "cannot visualize {identifier} for \"{analysis}\", its result is {found} instead of a table"
    )]
    NotVisualizable {
        analysis: String,
        identifier: String,
        found: &'static str,
    },
}

fn format_cycles(cycles: &[Vec<String>]) -> String {
    cycles
        .iter()
        .map(|members| members.join(" <-> "))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Pipeline stages driven in the wrong order.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("pipeline stage \"{requested}\" cannot run while the run is {current}")]
    OutOfOrder {
        requested: &'static str,
        current: &'static str,
    },
}

/// Malformed payloads handed to an analysis.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DataError {
    #[error("table has no column \"{0}\"")]
    MissingColumn(String),

    #[error("row has {found} cells but the table has {expected} columns")]
    RowLength { expected: usize, found: usize },

    #[error("cannot parse series label \"{0}\"")]
    Label(String),

    #[error("{0}")]
    Malformed(String),
}

/// Failures while loading data from outside the process.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected query response: {0}")]
    Response(String),

    #[error("{0}")]
    Invalid(String),
}

/// Top-level error for the engine.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Identifier(#[from] IdentifierError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

/// Coarse grouping of errors by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    RepositoryMisuse,
    Unfulfilled,
    Verification,
    NumericShape,
    Data,
    Ingest,
}

impl Error {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Identifier(_) => ErrorCategory::Configuration,
            Error::Repository(_) => ErrorCategory::RepositoryMisuse,
            Error::Analysis(e) => match e {
                AnalysisError::Unfulfilled(_) => ErrorCategory::Unfulfilled,
                AnalysisError::VerificationFailed { .. } => ErrorCategory::Verification,
                AnalysisError::NonScalarResult { .. } => ErrorCategory::NumericShape,
                AnalysisError::NotVisualizable { .. } => ErrorCategory::Data,
                _ => ErrorCategory::Configuration,
            },
            Error::Data(_) => ErrorCategory::Data,
            Error::Ingest(_) => ErrorCategory::Ingest,
            Error::Pipeline(_) => ErrorCategory::Configuration,
        }
    }

    /// Get the process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self.category() {
            ErrorCategory::Configuration => 2,
            ErrorCategory::Unfulfilled => 3,
            ErrorCategory::Verification => 4,
            ErrorCategory::Ingest => 5,
            ErrorCategory::RepositoryMisuse
            | ErrorCategory::NumericShape
            | ErrorCategory::Data => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        let unfulfilled: Error = AnalysisError::Unfulfilled(vec!["gpuhours".to_string()]).into();
        assert_eq!(unfulfilled.category(), ErrorCategory::Unfulfilled);
        assert_eq!(unfulfilled.exit_code(), 3);

        let cycle: Error = AnalysisError::DependencyCycle {
            cycles: vec![vec!["x".into(), "y".into()]],
            unresolved: vec!["x".into(), "y".into(), "z".into()],
        }
        .into();
        assert_eq!(
            cycle.to_string(),
            "cycle detected in prerequisite graph (x <-> y), unresolved analyses: x, y, z"
        );
        assert_eq!(cycle.category(), ErrorCategory::Configuration);

        let duplicate: Error = RepositoryError::Duplicate("id".to_string()).into();
        assert_eq!(duplicate.category(), ErrorCategory::RepositoryMisuse);
    }

    #[test]
    fn test_unfulfilled_message_lists_names() {
        let err = AnalysisError::Unfulfilled(vec!["cpuhours".into(), "gpuhours".into()]);
        assert!(err.to_string().contains("cpuhours, gpuhours"));
    }
}
