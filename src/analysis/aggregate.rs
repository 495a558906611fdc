//! Table aggregation helpers shared by the builtin analyses.
//!
//! Series columns are named by their label string; these helpers group,
//! de-duplicate and rank them by the labels they carry.

use std::collections::{HashMap, HashSet};

use crate::data::labels::label_of;
use crate::data::{Cell, Table, TIME_COLUMN};
use crate::error::DataError;
use crate::models::NamespaceUsage;

/// Group series columns by namespace, keeping first-seen namespace order.
pub fn group_by_namespace(table: &Table) -> Vec<(String, Vec<usize>)> {
    let mut order: Vec<String> = Vec::new();
    let mut grouped: HashMap<String, Vec<usize>> = HashMap::new();

    for (idx, column) in table.columns().iter().enumerate() {
        if column == TIME_COLUMN {
            continue;
        }
        let Some(namespace) = label_of(column, "namespace") else {
            continue;
        };
        if !grouped.contains_key(&namespace) {
            order.push(namespace.clone());
        }
        grouped.entry(namespace).or_default().push(idx);
    }

    order
        .into_iter()
        .map(|namespace| {
            let columns = grouped.remove(&namespace).unwrap_or_default();
            (namespace, columns)
        })
        .collect()
}

/// Total of every value in each namespace's columns.
pub fn sum_by_namespace(table: &Table) -> Vec<(String, f64)> {
    group_by_namespace(table)
        .into_iter()
        .map(|(namespace, columns)| {
            let total: f64 = table
                .rows()
                .iter()
                .flat_map(|row| columns.iter().filter_map(move |&idx| row[idx].as_f64()))
                .sum();
            (namespace, total)
        })
        .collect()
}

/// Number of series columns per namespace, largest first.
pub fn count_by_namespace(table: &Table) -> Vec<(String, usize)> {
    let mut counts: Vec<(String, usize)> = group_by_namespace(table)
        .into_iter()
        .map(|(namespace, columns)| (namespace, columns.len()))
        .collect();
    counts.sort_by_key(|(_, count)| std::cmp::Reverse(*count));
    counts
}

/// Keep only the first column seen for each uid. Columns without a uid and
/// the time column are kept.
pub fn dedupe_uids(table: &Table) -> Table {
    let mut seen: HashSet<String> = HashSet::new();
    let mut deduped = table.clone();
    deduped.retain_columns(|column| match label_of(column, "uid") {
        Some(uid) => seen.insert(uid),
        None => true,
    });
    deduped
}

/// Drop every column whose uid is in `blacklist`.
pub fn drop_blacklisted_uids(table: &Table, blacklist: &HashSet<String>) -> Table {
    let mut kept = table.clone();
    kept.retain_columns(|column| match label_of(column, "uid") {
        Some(uid) => !blacklist.contains(&uid),
        None => true,
    });
    kept
}

/// Drop series columns whose values do not sum to more than zero.
pub fn drop_zero_columns(table: &Table) -> Table {
    let positive: HashSet<String> = table
        .series_sums()
        .into_iter()
        .filter(|(_, sum)| *sum > 0.0)
        .map(|(name, _)| name.to_string())
        .collect();

    let mut kept = table.clone();
    kept.retain_columns(|column| column == TIME_COLUMN || positive.contains(column));
    kept
}

/// Uids of every column with usage above zero.
pub fn uids_with_usage(table: &Table) -> HashSet<String> {
    drop_zero_columns(table)
        .columns()
        .iter()
        .filter_map(|column| label_of(column, "uid"))
        .collect()
}

/// Two-column `Namespace, <value_column>` table from ranked pairs.
pub fn namespace_table(
    value_column: &str,
    rows: impl IntoIterator<Item = (String, f64)>,
) -> Result<Table, DataError> {
    let mut table = Table::new(["Namespace", value_column]);
    for (namespace, value) in rows {
        table.push_row(vec![Cell::Text(namespace), Cell::Number(value)])?;
    }
    Ok(table)
}

/// First `n` rows of a namespace table, skipping blacklisted namespaces.
pub fn top_namespaces(table: &Table, n: usize, blacklist: &[String]) -> Vec<NamespaceUsage> {
    table
        .rows()
        .iter()
        .filter_map(|row| {
            let namespace = row.first()?.as_text()?.to_string();
            let value = row.get(1)?.as_f64()?;
            Some(NamespaceUsage { namespace, value })
        })
        .filter(|usage| !blacklist.contains(&usage.namespace))
        .take(n)
        .collect()
}
