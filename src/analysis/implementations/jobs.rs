//! Job counts per namespace.
//!
//! A job is one series column with usage above zero, identified by its pod
//! uid. CPU-only jobs exclude every uid that also used a GPU in the same
//! period.

use tracing::debug;

use super::{number_of, table_of};
use crate::analysis::aggregate::{
    count_by_namespace, dedupe_uids, drop_blacklisted_uids, drop_zero_columns, namespace_table,
    uids_with_usage,
};
use crate::data::{Data, DataRepository, Identifier, Table};
use crate::error::{DataError, Result};

pub const COUNT_COLUMN: &str = "Count";

fn count_table(table: &Table) -> std::result::Result<Table, DataError> {
    let mut cleaned = table.without_time();
    cleaned.fill_missing(0.0);
    let cleaned = drop_zero_columns(&cleaned);

    let counts = count_by_namespace(&cleaned)
        .into_iter()
        .map(|(namespace, count)| (namespace, count as f64));
    namespace_table(COUNT_COLUMN, counts)
}

/// Number of jobs per namespace, largest first.
pub fn jobs_by_namespace(id: &Identifier, repo: &DataRepository) -> Result<Data> {
    let table = table_of(repo, id)?;
    Ok(Data::Table(count_table(&dedupe_uids(table))?))
}

/// Source of `kind` covering exactly the base period of `id`.
fn sibling_source(id: &Identifier, kind: &str) -> Result<Identifier> {
    let period = id
        .base()
        .and_then(|base| base.period())
        .ok_or_else(|| DataError::Malformed(format!("{} has no period", id)))?;
    Ok(Identifier::source(period.start_ts(), period.end_ts(), kind)?)
}

/// Jobs per namespace that never used a GPU in the same period.
pub fn cpu_only_jobs(id: &Identifier, repo: &DataRepository, gpu_kind: &str) -> Result<Data> {
    let gpu_id = sibling_source(id, gpu_kind)?;
    if !repo.contains(&gpu_id) {
        return Err(DataError::Malformed(format!(
            "cannot count cpu-only jobs for {}, {} is missing",
            id, gpu_id
        ))
        .into());
    }

    let mut gpu_table = table_of(repo, &gpu_id)?.without_time();
    gpu_table.fill_missing(0.0);
    let gpu_uids = uids_with_usage(&gpu_table);
    debug!("{} uids used a GPU during {}", gpu_uids.len(), id);

    let cpu_table = drop_blacklisted_uids(&dedupe_uids(table_of(repo, id)?), &gpu_uids);
    Ok(Data::Table(count_table(&cpu_table)?))
}

/// Sum of a jobs-by-namespace table.
pub fn jobs_total(id: &Identifier, repo: &DataRepository) -> Result<Data> {
    let table = table_of(repo, id)?;
    Ok(Data::Integer(table.column_sum(COUNT_COLUMN)?.round() as i64))
}

/// CPU-only plus GPU job totals of the same period. `id` is the cpu total.
pub fn all_jobs_total(
    id: &Identifier,
    repo: &DataRepository,
    gpu_kind: &str,
    gpu_jobs: &str,
    gpu_jobs_total: &str,
) -> Result<Data> {
    let gpu_source = sibling_source(id, gpu_kind)?;
    let gpu_total_id = Identifier::analysis(
        Some(Identifier::analysis(Some(gpu_source), gpu_jobs)),
        gpu_jobs_total,
    );

    let cpu = number_of(repo, id)?;
    let gpu = number_of(repo, &gpu_total_id)?;
    Ok(Data::Integer((cpu + gpu).round() as i64))
}
