//! Identifiers for every piece of data the engine stores.
//!
//! An [`Identifier`] is a closed sum of the things that can live in a
//! [`DataRepository`](super::repository::DataRepository): raw source data,
//! staged query results, analyses (possibly of other analyses),
//! visualizations, registered periods and period summaries. Equality and
//! hashing are structural and include the variant, so two identifiers of
//! different kinds never compare equal even when their fields match.

use std::fmt;

use crate::error::IdentifierError;

/// A validated `[start, end]` pair of unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Period {
    start_ts: i64,
    end_ts: i64,
}

impl Period {
    pub fn new(start_ts: i64, end_ts: i64) -> Result<Self, IdentifierError> {
        if end_ts < start_ts {
            return Err(IdentifierError::InvalidPeriod {
                start: start_ts,
                end: end_ts,
            });
        }
        Ok(Self { start_ts, end_ts })
    }

    pub fn start_ts(&self) -> i64 {
        self.start_ts
    }

    pub fn end_ts(&self) -> i64 {
        self.end_ts
    }

    pub fn bounds(&self) -> (i64, i64) {
        (self.start_ts, self.end_ts)
    }
}

/// Raw data for one resource kind over one period.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId {
    period: Period,
    resource_kind: String,
}

impl SourceId {
    pub fn period(&self) -> Period {
        self.period
    }

    pub fn resource_kind(&self) -> &str {
        &self.resource_kind
    }
}

/// A staged query result, before it is turned into source data.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceQueryId {
    period: Period,
    resource_kind: Option<String>,
    query_name: String,
}

impl SourceQueryId {
    pub fn period(&self) -> Period {
        self.period
    }

    pub fn resource_kind(&self) -> Option<&str> {
        self.resource_kind.as_deref()
    }

    pub fn query_name(&self) -> &str {
        &self.query_name
    }
}

/// The result of running a named analysis on another identifier.
///
/// `on` is `None` for analyses that do not derive from a single source, such
/// as meta analyses spanning every period.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AnalysisId {
    on: Option<Box<Identifier>>,
    name: String,
}

impl AnalysisId {
    pub fn on(&self) -> Option<&Identifier> {
        self.on.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Walk the `on` chain to the first identifier that is not an analysis.
    ///
    /// Returns `None` when the chain ends without reaching one.
    pub fn find_base(&self) -> Option<&Identifier> {
        let mut current = self.on.as_deref()?;
        while let Some(analysis) = current.as_analysis() {
            current = analysis.on.as_deref()?;
        }
        Some(current)
    }
}

/// An analysis result split by key, produced by meta analyses.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MetaAnalysisId {
    analysis: AnalysisId,
    key: String,
}

impl MetaAnalysisId {
    pub fn analysis(&self) -> &AnalysisId {
        &self.analysis
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

/// A rendered figure of another identifier's data.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VisId {
    of: Box<Identifier>,
    graph_type: String,
}

impl VisId {
    pub fn of(&self) -> &Identifier {
        &self.of
    }

    pub fn graph_type(&self) -> &str {
        &self.graph_type
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Identifier {
    Source(SourceId),
    SourceQuery(SourceQueryId),
    Analysis(AnalysisId),
    MetaAnalysis(MetaAnalysisId),
    Vis(VisId),
    TimeStamp(Period),
    Summary(Period),
}

/// Variant tag of an [`Identifier`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IdentifierKind {
    Source,
    SourceQuery,
    Analysis,
    MetaAnalysis,
    Vis,
    TimeStamp,
    Summary,
}

impl IdentifierKind {
    /// Non-strict kind check: a meta analysis is also an analysis.
    pub fn is_a(self, other: IdentifierKind) -> bool {
        self == other || (self == IdentifierKind::MetaAnalysis && other == IdentifierKind::Analysis)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            IdentifierKind::Source => "source",
            IdentifierKind::SourceQuery => "source query",
            IdentifierKind::Analysis => "analysis",
            IdentifierKind::MetaAnalysis => "meta analysis",
            IdentifierKind::Vis => "visualization",
            IdentifierKind::TimeStamp => "timestamps",
            IdentifierKind::Summary => "summary",
        }
    }
}

impl Identifier {
    pub fn source(
        start_ts: i64,
        end_ts: i64,
        resource_kind: impl Into<String>,
    ) -> Result<Self, IdentifierError> {
        Ok(Identifier::Source(SourceId {
            period: Period::new(start_ts, end_ts)?,
            resource_kind: resource_kind.into(),
        }))
    }

    pub fn source_query(
        start_ts: i64,
        end_ts: i64,
        resource_kind: Option<&str>,
        query_name: impl Into<String>,
    ) -> Result<Self, IdentifierError> {
        Ok(Identifier::SourceQuery(SourceQueryId {
            period: Period::new(start_ts, end_ts)?,
            resource_kind: resource_kind.map(str::to_string),
            query_name: query_name.into(),
        }))
    }

    pub fn analysis(on: Option<Identifier>, name: impl Into<String>) -> Self {
        Identifier::Analysis(AnalysisId {
            on: on.map(Box::new),
            name: name.into(),
        })
    }

    pub fn meta_analysis(
        on: Option<Identifier>,
        name: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Identifier::MetaAnalysis(MetaAnalysisId {
            analysis: AnalysisId {
                on: on.map(Box::new),
                name: name.into(),
            },
            key: key.into(),
        })
    }

    pub fn vis(of: Identifier, graph_type: impl Into<String>) -> Self {
        Identifier::Vis(VisId {
            of: Box::new(of),
            graph_type: graph_type.into(),
        })
    }

    pub fn timestamps(start_ts: i64, end_ts: i64) -> Result<Self, IdentifierError> {
        Ok(Identifier::TimeStamp(Period::new(start_ts, end_ts)?))
    }

    pub fn summary(start_ts: i64, end_ts: i64) -> Result<Self, IdentifierError> {
        Ok(Identifier::Summary(Period::new(start_ts, end_ts)?))
    }

    pub fn kind(&self) -> IdentifierKind {
        match self {
            Identifier::Source(_) => IdentifierKind::Source,
            Identifier::SourceQuery(_) => IdentifierKind::SourceQuery,
            Identifier::Analysis(_) => IdentifierKind::Analysis,
            Identifier::MetaAnalysis(_) => IdentifierKind::MetaAnalysis,
            Identifier::Vis(_) => IdentifierKind::Vis,
            Identifier::TimeStamp(_) => IdentifierKind::TimeStamp,
            Identifier::Summary(_) => IdentifierKind::Summary,
        }
    }

    /// View analyses and meta analyses uniformly.
    pub fn as_analysis(&self) -> Option<&AnalysisId> {
        match self {
            Identifier::Analysis(a) => Some(a),
            Identifier::MetaAnalysis(m) => Some(&m.analysis),
            _ => None,
        }
    }

    pub fn as_source(&self) -> Option<&SourceId> {
        match self {
            Identifier::Source(s) => Some(s),
            _ => None,
        }
    }

    /// The period of period-carrying variants.
    pub fn period(&self) -> Option<Period> {
        match self {
            Identifier::Source(s) => Some(s.period),
            Identifier::SourceQuery(q) => Some(q.period),
            Identifier::TimeStamp(p) | Identifier::Summary(p) => Some(*p),
            _ => None,
        }
    }

    pub fn meta_key(&self) -> Option<&str> {
        match self {
            Identifier::MetaAnalysis(m) => Some(&m.key),
            _ => None,
        }
    }

    /// The base identifier of an analysis, or the identifier itself otherwise.
    pub fn base(&self) -> Option<&Identifier> {
        match self.as_analysis() {
            Some(analysis) => analysis.find_base(),
            None => Some(self),
        }
    }

    /// A name safe to use as a file name.
    pub fn fs_str(&self) -> String {
        match self {
            Identifier::Analysis(a) => analysis_fs_str(a, a.name.clone()),
            Identifier::MetaAnalysis(m) => {
                analysis_fs_str(&m.analysis, format!("{}-{}", m.analysis.name, m.key))
            }
            Identifier::Vis(v) => format!("{}__{}", v.graph_type, v.of.fs_str()).replace('/', "_"),
            other => other.to_string().replace('/', "_"),
        }
    }
}

fn analysis_fs_str(analysis: &AnalysisId, name: String) -> String {
    let rendered = match analysis.find_base() {
        Some(base) => format!("{}__{}", name, base.fs_str()),
        None => name,
    };
    rendered.replace('/', "_")
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identifier::Source(s) => write!(
                f,
                "sourcedata {}:{}-{}",
                s.resource_kind, s.period.start_ts, s.period.end_ts
            ),
            Identifier::SourceQuery(q) => write!(
                f,
                "query {} {}:{}-{}",
                q.query_name,
                q.resource_kind.as_deref().unwrap_or("?"),
                q.period.start_ts,
                q.period.end_ts
            ),
            Identifier::Analysis(a) => write_analysis(f, &a.name, a.on()),
            Identifier::MetaAnalysis(m) => write_analysis(
                f,
                &format!("{}-{}", m.analysis.name, m.key),
                m.analysis.on(),
            ),
            Identifier::Vis(v) => write!(f, "vis of {}", v.of),
            Identifier::TimeStamp(p) => write!(f, "timestamps {}-{}", p.start_ts, p.end_ts),
            Identifier::Summary(p) => write!(f, "summary of {}-{}", p.start_ts, p.end_ts),
        }
    }
}

fn write_analysis(f: &mut fmt::Formatter<'_>, name: &str, on: Option<&Identifier>) -> fmt::Result {
    match on {
        Some(on) => write!(f, "{}({})", name, on),
        None => write!(f, "{}()", name),
    }
}
