//! Resource hours per namespace.

use tracing::debug;

use super::table_of;
use crate::analysis::aggregate::{namespace_table, sum_by_namespace};
use crate::data::{Data, DataRepository, Identifier};
use crate::error::Result;

pub const HOURS_COLUMN: &str = "Hours";

/// Namespaces below this many hours are left out.
const MIN_HOURS: f64 = 0.001;

/// Hours used by each namespace over the source period, largest first.
pub fn hours_by_namespace(id: &Identifier, repo: &DataRepository) -> Result<Data> {
    let table = table_of(repo, id)?;

    let totals = sum_by_namespace(table)
        .into_iter()
        .filter(|(_, hours)| *hours >= MIN_HOURS);
    let mut hours = namespace_table(HOURS_COLUMN, totals)?;
    hours.sort_desc_by(HOURS_COLUMN)?;

    debug!("{} namespaces with usage in {}", hours.row_count(), id);
    Ok(Data::Table(hours))
}

/// Sum of an hours-by-namespace table.
pub fn hours_total(id: &Identifier, repo: &DataRepository) -> Result<Data> {
    let table = table_of(repo, id)?;
    Ok(Data::Float(table.column_sum(HOURS_COLUMN)?))
}

/// Hour totals must be finite and non-negative.
pub fn check_hours_total(id: &Identifier, repo: &DataRepository) -> Result<bool> {
    let total = super::number_of(repo, id)?;
    Ok(total.is_finite() && total >= 0.0)
}
