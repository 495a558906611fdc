//! Meta analyses: per-period tables of scalar results.
//!
//! For every key produced by the key method, one table is written with a
//! `Period` column and one column per prerequisite, one row per registered
//! period in chronological order.

use std::collections::BTreeSet;

use tracing::debug;

use super::descriptor::KeyFn;
use super::driver::Outcome;
use crate::data::filters::{by_analysis_name, by_type};
use crate::data::{Cell, Data, DataRepository, Identifier, IdentifierKind, Metadata, Period, Table};
use crate::error::{AnalysisError, Result};
use crate::util::time::range_printable;
use crate::vis::plot::{PERIODS_KEY, PERIOD_COLUMN};

/// Grace window when labelling rows as whole months.
const PERIOD_LABEL_WINDOW: i64 = 3600;

/// Result of `sub` with this key whose base covers exactly `period`.
fn cell_for(
    repo: &DataRepository,
    name: &str,
    sub: &str,
    key: &str,
    key_method: &KeyFn,
    period: Period,
) -> Result<Cell> {
    let found = repo.filter_ids(by_analysis_name(sub)).into_iter().find(|id| {
        key_method(id) == key
            && id
                .base()
                .and_then(|base| base.period())
                .map(|p| p == period)
                .unwrap_or(false)
    });

    let Some(id) = found else {
        return Ok(Cell::Number(0.0));
    };
    match repo.get_data(&id)? {
        Data::Empty => Ok(Cell::Number(0.0)),
        Data::Integer(i) => Ok(Cell::Number(*i as f64)),
        Data::Float(f) => Ok(Cell::Number(*f)),
        other => Err(AnalysisError::NonScalarResult {
            analysis: name.to_string(),
            identifier: id.to_string(),
            found: other.type_name(),
        }
        .into()),
    }
}

pub fn run_meta(
    name: &str,
    prerequisites: &[String],
    key_method: &KeyFn,
    repo: &mut DataRepository,
) -> Result<Outcome> {
    let keys: BTreeSet<String> = prerequisites
        .iter()
        .flat_map(|sub| repo.filter_ids(by_analysis_name(sub.as_str())))
        .map(|id| key_method(&id))
        .collect();
    if keys.is_empty() {
        return Ok(Outcome::Unfulfilled);
    }

    let mut periods: Vec<Period> = repo
        .filter_ids(by_type(IdentifierKind::TimeStamp, true))
        .iter()
        .filter_map(Identifier::period)
        .collect();
    if periods.is_empty() {
        return Err(AnalysisError::NoPeriods(name.to_string()).into());
    }
    periods.sort_by_key(|p| p.start_ts());

    let mut columns = vec![PERIOD_COLUMN.to_string()];
    columns.extend(prerequisites.iter().cloned());

    let mut metadata = Metadata::new();
    metadata.insert(
        PERIODS_KEY.to_string(),
        serde_json::json!(periods.iter().map(|p| [p.start_ts(), p.end_ts()]).collect::<Vec<_>>()),
    );

    let mut produced = 0;
    for key in &keys {
        let mut table = Table::new(columns.clone());
        for period in &periods {
            let label = range_printable(period.start_ts(), period.end_ts(), PERIOD_LABEL_WINDOW);
            let mut row = vec![Cell::Text(label)];
            for sub in prerequisites {
                row.push(cell_for(repo, name, sub, key, key_method, *period)?);
            }
            table.push_row(row)?;
        }

        let id = Identifier::meta_analysis(None, name, key.as_str());
        debug!("{} rows for {}", table.row_count(), id);
        repo.add(id, Data::Table(table), Some(metadata.clone()))?;
        produced += 1;
    }

    Ok(Outcome::Fulfilled { produced })
}
