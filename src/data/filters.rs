//! Predicates over identifiers.
//!
//! Every constructor returns a plain closure; use [`and`] and [`not`] to
//! combine them and [`shared`] to store one in an analysis descriptor.

use std::sync::Arc;

use super::identifier::{Identifier, IdentifierKind};

/// A predicate that can be stored and shared.
pub type Filter = Arc<dyn Fn(&Identifier) -> bool + Send + Sync>;

pub fn shared(predicate: impl Fn(&Identifier) -> bool + Send + Sync + 'static) -> Filter {
    Arc::new(predicate)
}

/// Identifiers of the given kind. Non-strict matching lets a meta analysis
/// pass as an analysis.
pub fn by_type(
    kind: IdentifierKind,
    strict: bool,
) -> impl Fn(&Identifier) -> bool + Clone + Send + Sync + 'static {
    move |id| {
        if strict {
            id.kind() == kind
        } else {
            id.kind().is_a(kind)
        }
    }
}

/// Source identifiers of one resource kind.
pub fn by_resource_kind(
    kind: impl Into<String>,
) -> impl Fn(&Identifier) -> bool + Clone + Send + Sync + 'static {
    let kind = kind.into();
    move |id| {
        id.as_source()
            .map(|source| source.resource_kind() == kind)
            .unwrap_or(false)
    }
}

/// Registered periods with exactly these bounds.
pub fn by_matching_period(
    start_ts: i64,
    end_ts: i64,
) -> impl Fn(&Identifier) -> bool + Clone + Send + Sync + 'static {
    move |id| match id {
        Identifier::TimeStamp(period) => period.bounds() == (start_ts, end_ts),
        _ => false,
    }
}

/// Analyses (meta analyses included) with this name.
pub fn by_analysis_name(
    name: impl Into<String>,
) -> impl Fn(&Identifier) -> bool + Clone + Send + Sync + 'static {
    let name = name.into();
    move |id| {
        id.as_analysis()
            .map(|analysis| analysis.name() == name)
            .unwrap_or(false)
    }
}

/// Analyses run directly on `target`. Not transitive.
pub fn by_analyses_of(
    target: &Identifier,
) -> impl Fn(&Identifier) -> bool + Clone + Send + Sync + 'static {
    let target = target.clone();
    move |id| {
        id.as_analysis()
            .and_then(|analysis| analysis.on())
            .map(|on| *on == target)
            .unwrap_or(false)
    }
}

/// Staged query results with this query name.
pub fn by_query_name(
    name: impl Into<String>,
) -> impl Fn(&Identifier) -> bool + Clone + Send + Sync + 'static {
    let name = name.into();
    move |id| match id {
        Identifier::SourceQuery(query) => query.query_name() == name,
        _ => false,
    }
}

pub fn and<A, B>(a: A, b: B) -> impl Fn(&Identifier) -> bool + Clone + Send + Sync + 'static
where
    A: Fn(&Identifier) -> bool + Clone + Send + Sync + 'static,
    B: Fn(&Identifier) -> bool + Clone + Send + Sync + 'static,
{
    move |id| a(id) && b(id)
}

pub fn not<A>(a: A) -> impl Fn(&Identifier) -> bool + Clone + Send + Sync + 'static
where
    A: Fn(&Identifier) -> bool + Clone + Send + Sync + 'static,
{
    move |id| !a(id)
}
