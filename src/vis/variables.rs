//! `%VAR%` placeholders in plot titles.
//!
//! A placeholder names an analysis; its value is taken from the result of
//! that analysis sharing the same base as the plotted identifier. `%MONTH%`
//! and `%YEAR%` come from the start of the base period.

use std::collections::BTreeMap;

use chrono::{Datelike, TimeZone, Utc};

use crate::data::filters::by_analysis_name;
use crate::data::{Data, DataRepository, Identifier};
use crate::error::{DataError, Result};
use crate::util::time::MONTH_NAMES;

#[derive(Debug, Default)]
pub struct VisVariables {
    values: BTreeMap<String, String>,
}

/// Display form of a scalar result.
pub fn format_value(data: &Data) -> Option<String> {
    match data {
        Data::Integer(i) => Some(i.to_string()),
        Data::Float(f) => Some(format!("{:.2}", f)),
        _ => None,
    }
}

impl VisVariables {
    pub fn resolve(
        repo: &DataRepository,
        id: &Identifier,
        variables: &BTreeMap<String, String>,
    ) -> Result<Self> {
        let base = id.base();
        let mut values = BTreeMap::new();

        for (variable, analysis_name) in variables {
            let source = repo
                .filter_ids(by_analysis_name(analysis_name.as_str()))
                .into_iter()
                .find(|candidate| candidate.base() == base);

            let value = match source {
                Some(source) => format_value(repo.get_data(&source)?),
                None => None,
            };

            let value = value.ok_or_else(|| {
                DataError::Malformed(format!(
                    "failed to resolve %{}% from analysis \"{}\" for {}",
                    variable, analysis_name, id
                ))
            })?;
            values.insert(variable.clone(), value);
        }

        if let Some(start) = base.and_then(|b| b.period()).map(|p| p.start_ts()) {
            if let Some(dt) = Utc.timestamp_opt(start, 0).single() {
                values.insert("MONTH".to_string(), MONTH_NAMES[dt.month0() as usize].to_string());
                values.insert("YEAR".to_string(), dt.year().to_string());
            }
        }

        Ok(Self { values })
    }

    pub fn apply(&self, text: &str) -> String {
        self.values.iter().fold(text.to_string(), |acc, (name, value)| {
            acc.replace(&format!("%{}%", name), value)
        })
    }
}
