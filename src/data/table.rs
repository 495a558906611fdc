//! A small column-named table used for source data and analysis results.

use serde::{Deserialize, Serialize};

use crate::error::DataError;

/// Name of the timestamp column in source tables.
pub const TIME_COLUMN: &str = "Time";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Number(f64),
    Text(String),
    Missing,
}

impl Cell {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Cell::Missing)
    }

    /// Parse a raw CSV field. Empty fields and `NaN` become missing.
    pub fn parse(raw: &str) -> Cell {
        let raw = raw.trim();
        if raw.is_empty() {
            return Cell::Missing;
        }
        match raw.parse::<f64>() {
            Ok(n) if n.is_nan() => Cell::Missing,
            Ok(n) => Cell::Number(n),
            Err(_) => Cell::Text(raw.to_string()),
        }
    }
}

impl std::fmt::Display for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Cell::Number(n) => write!(f, "{}", n),
            Cell::Text(s) => write!(f, "{}", s),
            Cell::Missing => Ok(()),
        }
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::Number(value)
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Text(value.to_string())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Cell::Text(value)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn from_rows<S: Into<String>>(
        columns: impl IntoIterator<Item = S>,
        rows: Vec<Vec<Cell>>,
    ) -> Result<Self, DataError> {
        let mut table = Table::new(columns);
        for row in rows {
            table.push_row(row)?;
        }
        Ok(table)
    }

    pub fn push_row(&mut self, row: Vec<Cell>) -> Result<(), DataError> {
        if row.len() != self.columns.len() {
            return Err(DataError::RowLength {
                expected: self.columns.len(),
                found: row.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    fn require_column(&self, name: &str) -> Result<usize, DataError> {
        self.column_index(name)
            .ok_or_else(|| DataError::MissingColumn(name.to_string()))
    }

    pub fn has_time_column(&self) -> bool {
        self.column_index(TIME_COLUMN).is_some()
    }

    /// Sum of the numeric cells of a column; missing cells count as zero.
    pub fn column_sum(&self, name: &str) -> Result<f64, DataError> {
        let idx = self.require_column(name)?;
        Ok(self.sum_at(idx))
    }

    fn sum_at(&self, idx: usize) -> f64 {
        self.rows.iter().filter_map(|row| row[idx].as_f64()).sum()
    }

    /// Sum of every series column, keyed by column name, in column order.
    /// The time column is skipped.
    pub fn series_sums(&self) -> Vec<(&str, f64)> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, name)| name.as_str() != TIME_COLUMN)
            .map(|(idx, name)| (name.as_str(), self.sum_at(idx)))
            .collect()
    }

    /// Keep only the columns for which `keep` returns true.
    pub fn retain_columns(&mut self, mut keep: impl FnMut(&str) -> bool) {
        let kept: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .filter(|(_, name)| keep(name))
            .map(|(idx, _)| idx)
            .collect();

        self.columns = kept.iter().map(|&idx| self.columns[idx].clone()).collect();
        for row in &mut self.rows {
            *row = kept.iter().map(|&idx| row[idx].clone()).collect();
        }
    }

    /// Drop the time column if present.
    pub fn without_time(&self) -> Table {
        let mut table = self.clone();
        table.retain_columns(|name| name != TIME_COLUMN);
        table
    }

    /// Replace every missing cell with `value`.
    pub fn fill_missing(&mut self, value: f64) {
        for cell in self.rows.iter_mut().flatten() {
            if cell.is_missing() {
                *cell = Cell::Number(value);
            }
        }
    }

    /// Sort rows by a numeric column, largest first. Non-numeric cells sort last.
    pub fn sort_desc_by(&mut self, name: &str) -> Result<(), DataError> {
        let idx = self.require_column(name)?;
        self.rows.sort_by(|a, b| {
            let a = a[idx].as_f64().unwrap_or(f64::NEG_INFINITY);
            let b = b[idx].as_f64().unwrap_or(f64::NEG_INFINITY);
            b.partial_cmp(&a).unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(())
    }

    /// Numeric values of the time column. Rows without a numeric time are skipped.
    pub fn timestamps(&self) -> Result<Vec<i64>, DataError> {
        let idx = self.require_column(TIME_COLUMN)?;
        Ok(self
            .rows
            .iter()
            .filter_map(|row| row[idx].as_f64())
            .map(|ts| ts as i64)
            .collect())
    }
}
