//! Compute functions of the builtin simple analyses.

pub mod hours;
pub mod jobs;

use crate::data::{Data, DataRepository, Identifier, Table};
use crate::error::{DataError, Result};

/// Table stored under `id`, or a data error naming what was found instead.
pub(crate) fn table_of<'a>(repo: &'a DataRepository, id: &Identifier) -> Result<&'a Table> {
    let data = repo.get_data(id)?;
    data.as_table().ok_or_else(|| {
        let found = data.type_name();
        DataError::Malformed(format!("expected a table for {}, found {}", id, found)).into()
    })
}

/// Numeric value stored under `id`; empty results count as zero.
pub(crate) fn number_of(repo: &DataRepository, id: &Identifier) -> Result<f64> {
    match repo.get_data(id)? {
        Data::Empty => Ok(0.0),
        data => data.as_number().ok_or_else(|| {
            let found = data.type_name();
            DataError::Malformed(format!("expected a number for {}, found {}", id, found)).into()
        }),
    }
}
