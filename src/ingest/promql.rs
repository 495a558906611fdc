//! Loading data straight from a PromQL range query endpoint.
//!
//! Every configured query is issued once per month of the requested period
//! (and once per resource kind when it contains `%TYPE_STRING%`). Results are
//! staged under query identifiers, then the `status` query of each period is
//! used to keep only the samples of the `truth` queries taken while a pod was
//! running or pending.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Url;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::analysis::aggregate::drop_zero_columns;
use crate::config::{Config, TYPE_STRING_PLACEHOLDER};
use crate::data::filters::{and, by_query_name};
use crate::data::labels::{label_of, SeriesLabels};
use crate::data::{Cell, Data, DataRepository, Identifier, Table, TIME_COLUMN};
use crate::error::{IngestError, Result};
use crate::util::time::{break_period_into_months, range_printable};

pub const STATUS_QUERY: &str = "status";
pub const TRUTH_QUERY: &str = "truth";

/// One range query to issue.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryBlock {
    pub name: String,
    /// Resource kind substituted into the query, if it has a placeholder.
    pub kind: Option<String>,
    pub start_ts: i64,
    pub end_ts: i64,
    pub url: Url,
}

impl std::fmt::Display for QueryBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.name,
            self.kind.as_deref().unwrap_or("ALL").to_uppercase(),
            range_printable(self.start_ts, self.end_ts, 0)
        )
    }
}

/// Build the list of queries covering `period` for the given resource kinds.
pub fn build_query_list(
    config: &Config,
    period: (i64, i64),
    kinds: &[String],
) -> std::result::Result<Vec<QueryBlock>, IngestError> {
    let months = break_period_into_months(period.0, period.1);
    let mut blocks = Vec::new();

    for (name, query) in &config.promql.queries {
        let templated = query.contains(TYPE_STRING_PLACEHOLDER);

        for &(start_ts, end_ts) in &months {
            for kind in kinds {
                let (query_string, block_kind) = if templated {
                    let type_string = config.resources.get(kind).ok_or_else(|| {
                        IngestError::Invalid(format!(
                            "resource kind \"{}\" is not configured under [resources]",
                            kind
                        ))
                    })?;
                    (query.replace(TYPE_STRING_PLACEHOLDER, type_string), Some(kind.clone()))
                } else {
                    (query.clone(), None)
                };

                let url = Url::parse_with_params(
                    &config.promql.base_url,
                    &[
                        ("start", start_ts.to_string()),
                        ("end", end_ts.to_string()),
                        ("step", config.promql.step.to_string()),
                        ("query", query_string),
                    ],
                )
                .map_err(|e| {
                    IngestError::Invalid(format!(
                        "invalid base url {}: {}",
                        config.promql.base_url, e
                    ))
                })?;

                blocks.push(QueryBlock {
                    name: name.clone(),
                    kind: block_kind,
                    start_ts,
                    end_ts,
                    url,
                });

                // the same query for every kind
                if !templated {
                    break;
                }
            }
        }
    }

    Ok(blocks)
}

/// Issue one query and return the `data.result` array.
pub async fn perform_query(
    client: &reqwest::Client,
    url: &Url,
) -> std::result::Result<Vec<Value>, IngestError> {
    let response = client.get(url.clone()).send().await?;

    if !response.status().is_success() {
        return Err(IngestError::Response(format!(
            "query failed with status {} for {}",
            response.status(),
            url
        )));
    }

    let body: Value = response.json().await?;
    body.get("data")
        .and_then(|data| data.get("result"))
        .and_then(Value::as_array)
        .cloned()
        .ok_or_else(|| {
            IngestError::Response(format!("missing data.result in response from {}", url))
        })
}

/// Join the series of a matrix result on their timestamps.
///
/// Each series becomes a column headed by its rendered labels; timestamps
/// missing from a series become missing cells.
pub fn transform_query_response(result: &[Value]) -> std::result::Result<Table, IngestError> {
    let mut columns = vec![TIME_COLUMN.to_string()];
    let mut by_time: BTreeMap<i64, Vec<Cell>> = BTreeMap::new();

    for (series_idx, series) in result.iter().enumerate() {
        let metric = series
            .get("metric")
            .and_then(Value::as_object)
            .ok_or_else(|| IngestError::Response("series without a metric".to_string()))?;
        let labels = SeriesLabels::new(metric.iter().map(|(k, v)| {
            let value = v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string());
            (k.clone(), value)
        }));
        columns.push(labels.to_string());

        let values = series
            .get("values")
            .and_then(Value::as_array)
            .ok_or_else(|| IngestError::Response(format!("series {} has no values", labels)))?;

        for pair in values {
            let (ts, value) = match pair.as_array().map(Vec::as_slice) {
                Some([ts, value]) => (ts, value),
                _ => {
                    return Err(IngestError::Response(format!(
                        "malformed sample {} in {}",
                        pair, labels
                    )))
                }
            };
            let ts = ts
                .as_f64()
                .ok_or_else(|| IngestError::Response(format!("malformed timestamp {}", ts)))?
                as i64;
            let cell = match value {
                Value::String(s) => Cell::parse(s),
                Value::Number(n) => n.as_f64().map(Cell::Number).unwrap_or(Cell::Missing),
                _ => Cell::Missing,
            };

            let row = by_time
                .entry(ts)
                .or_insert_with(|| vec![Cell::Missing; result.len()]);
            row[series_idx] = cell;
        }
    }

    let mut table = Table::new(columns);
    for (ts, cells) in by_time {
        let mut row = Vec::with_capacity(cells.len() + 1);
        row.push(Cell::Number(ts as f64));
        row.extend(cells);
        table
            .push_row(row)
            .map_err(|e| IngestError::Response(e.to_string()))?;
    }
    Ok(table)
}

fn uid_of(column: &str) -> std::result::Result<String, IngestError> {
    label_of(column, "uid")
        .ok_or_else(|| {
            IngestError::Invalid(format!("failed to read uid in column name \"{}\"", column))
        })
}

/// Merge columns sharing a uid by taking the maximum of each row.
///
/// With `preserve_columns` the first column name seen for a uid is kept,
/// otherwise columns are renamed to the bare uid.
fn merge_columns_on_uid(
    table: &Table,
    preserve_columns: bool,
) -> std::result::Result<Table, IngestError> {
    let mut order: Vec<String> = Vec::new();
    let mut members: HashMap<String, Vec<usize>> = HashMap::new();
    let mut names: HashMap<String, String> = HashMap::new();

    let time_idx = table
        .column_index(TIME_COLUMN)
        .ok_or_else(|| IngestError::Invalid("table has no Time column".to_string()))?;

    for (idx, column) in table.columns().iter().enumerate() {
        if idx == time_idx {
            continue;
        }
        let uid = uid_of(column)?;
        if !members.contains_key(&uid) {
            order.push(uid.clone());
            names.insert(uid.clone(), column.clone());
        }
        members.entry(uid).or_default().push(idx);
    }

    let mut columns = vec![TIME_COLUMN.to_string()];
    for uid in &order {
        let name = if preserve_columns {
            names.get(uid).cloned().unwrap_or_else(|| uid.clone())
        } else {
            uid.clone()
        };
        columns.push(name);
    }

    let mut merged = Table::new(columns);
    for row in table.rows() {
        let mut out = vec![row[time_idx].clone()];
        for uid in &order {
            let max = members[uid]
                .iter()
                .filter_map(|&idx| row[idx].as_f64())
                .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.max(v))));
            out.push(max.map(Cell::Number).unwrap_or(Cell::Missing));
        }
        merged
            .push_row(out)
            .map_err(|e| IngestError::Invalid(e.to_string()))?;
    }
    Ok(merged)
}

/// Insert empty rows wherever consecutive timestamps are more than `step` apart.
fn infer_times(table: &Table, step: i64) -> std::result::Result<Table, IngestError> {
    let time_idx = table
        .column_index(TIME_COLUMN)
        .ok_or_else(|| IngestError::Invalid("table has no Time column".to_string()))?;
    let width = table.columns().len();

    let mut filled = Table::new(table.columns().to_vec());
    let rows = table.rows();
    for (i, row) in rows.iter().enumerate() {
        filled
            .push_row(row.clone())
            .map_err(|e| IngestError::Invalid(e.to_string()))?;

        let Some(next) = rows.get(i + 1) else {
            break;
        };
        let (Some(time), Some(next_time)) = (row[time_idx].as_f64(), next[time_idx].as_f64()) else {
            continue;
        };
        let (time, next_time) = (time as i64, next_time as i64);
        let offset = next_time - time;
        if offset <= step {
            continue;
        }

        for j in 1..offset / step {
            let mut gap = vec![Cell::Missing; width];
            gap[time_idx] = Cell::Number((time + j * step) as f64);
            filled
                .push_row(gap)
                .map_err(|e| IngestError::Invalid(e.to_string()))?;
        }
    }
    Ok(filled)
}

fn preprocess(
    table: &Table,
    preserve_columns: bool,
    step: i64,
) -> std::result::Result<Table, IngestError> {
    let nonzero = drop_zero_columns(table);
    let merged = merge_columns_on_uid(&nonzero, preserve_columns)?;
    infer_times(&merged, step)
}

/// Keep a value only where the status table has a `1` for the same uid and
/// time. Columns whose uid never appears in the status table are dropped.
fn apply_status(status: &Table, values: &Table) -> std::result::Result<Table, IngestError> {
    let value_times = values
        .timestamps()
        .map_err(|e| IngestError::Invalid(e.to_string()))?;
    let status_times = status
        .timestamps()
        .map_err(|e| IngestError::Invalid(e.to_string()))?;

    let start_index = value_times
        .first()
        .and_then(|start| status_times.iter().position(|t| t == start))
        .unwrap_or(0);

    let status_columns: HashMap<&str, usize> = status
        .columns()
        .iter()
        .enumerate()
        .map(|(idx, name)| (name.as_str(), idx))
        .collect();

    let mut filtered = values.clone();
    let mut dropped = 0;
    filtered.retain_columns(|column| {
        if column == TIME_COLUMN {
            return true;
        }
        let keep = label_of(column, "uid")
            .map(|uid| status_columns.contains_key(uid.as_str()))
            .unwrap_or(false);
        if !keep {
            dropped += 1;
        }
        keep
    });
    debug!("{} columns without a status dropped", dropped);

    let mut columns: Vec<Option<usize>> = Vec::with_capacity(filtered.columns().len());
    for column in filtered.columns() {
        if column == TIME_COLUMN {
            columns.push(None);
        } else {
            let uid = uid_of(column)?;
            columns.push(status_columns.get(uid.as_str()).copied());
        }
    }

    let mut masked = Table::new(filtered.columns().to_vec());
    for (row_idx, row) in filtered.rows().iter().enumerate() {
        let status_row = status.rows().get(start_index + row_idx);
        let out: Vec<Cell> = row
            .iter()
            .zip(&columns)
            .map(|(cell, status_idx)| match status_idx {
                None => cell.clone(),
                Some(idx) => {
                    let active = status_row
                        .and_then(|r| r[*idx].as_f64())
                        .map(|v| v == 1.0)
                        .unwrap_or(false);
                    if active {
                        cell.clone()
                    } else {
                        Cell::Missing
                    }
                }
            })
            .collect();
        masked
            .push_row(out)
            .map_err(|e| IngestError::Invalid(e.to_string()))?;
    }
    Ok(masked)
}

/// Turn staged query results into source tables.
pub fn filter_to_running_pending(staged: &DataRepository, step: i64) -> Result<DataRepository> {
    let mut out = DataRepository::new();

    for status_id in staged.filter_ids(by_query_name(STATUS_QUERY)) {
        let Some(period) = status_id.period() else {
            continue;
        };
        let status_table = staged
            .get_data(&status_id)?
            .as_table()
            .ok_or_else(|| IngestError::Invalid(format!("{} is not a table", status_id)))?;
        let status = preprocess(status_table, false, step)?;

        let (start, end) = period.bounds();
        let same_period =
            move |id: &Identifier| id.period().map(|p| p.bounds()) == Some((start, end));
        for truth_id in staged.filter_ids(and(by_query_name(TRUTH_QUERY), same_period)) {
            let Identifier::SourceQuery(query) = &truth_id else {
                continue;
            };
            let Some(kind) = query.resource_kind() else {
                warn!("{} has no resource kind, skipping", truth_id);
                continue;
            };
            let values_table = staged
                .get_data(&truth_id)?
                .as_table()
                .ok_or_else(|| IngestError::Invalid(format!("{} is not a table", truth_id)))?;
            let values = preprocess(values_table, true, step)?;
            let masked = apply_status(&status, &values)?;

            let id = Identifier::source(start, end, kind)?;
            if out.contains(&id) {
                warn!("{} was already created for this period, skipping", id);
                continue;
            }
            out.add(id, Data::Table(masked), None)?;
        }
    }

    Ok(out)
}

/// Ingest from a PromQL endpoint.
pub struct PromqlIngest<'a> {
    config: &'a Config,
    period: (i64, i64),
    kinds: Vec<String>,
}

impl<'a> PromqlIngest<'a> {
    pub fn new(config: &'a Config, period: (i64, i64), kinds: Vec<String>) -> Self {
        Self {
            config,
            period,
            kinds,
        }
    }

    pub async fn ingest(&self, show_progress: bool) -> Result<DataRepository> {
        let blocks = build_query_list(self.config, self.period, &self.kinds)?;
        info!("Loading data from {} queries", blocks.len());

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.config.promql.timeout_seconds))
            .build()
            .map_err(IngestError::Http)?;

        let progress = if show_progress {
            let pb = ProgressBar::new(blocks.len() as u64);
            let template =
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}";
            if let Ok(style) = ProgressStyle::default_bar().template(template) {
                pb.set_style(style.progress_chars("#>-"));
            }
            Some(pb)
        } else {
            None
        };

        let mut staged = DataRepository::new();
        for block in &blocks {
            if let Some(ref pb) = progress {
                pb.set_message(block.to_string());
            }
            debug!("Querying {}", block.url);

            let result = perform_query(&client, &block.url).await?;
            let table = transform_query_response(&result)?;

            let id = Identifier::source_query(
                block.start_ts,
                block.end_ts,
                block.kind.as_deref(),
                block.name.as_str(),
            )?;
            staged.add(id, Data::Table(table), None)?;

            if let Some(ref pb) = progress {
                pb.inc(1);
            }
        }
        if let Some(pb) = progress {
            pb.finish_with_message("queries done");
        }

        info!("Applying running/pending filter");
        filter_to_running_pending(&staged, self.config.promql.step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const JAN_2024: (i64, i64) = (1_704_067_200, 1_706_745_599);

    fn kinds() -> Vec<String> {
        vec!["cpu".to_string(), "gpu".to_string()]
    }

    #[test]
    fn test_query_list_substitutes_type_string() {
        let config = Config::default();
        let blocks = build_query_list(&config, (JAN_2024.0, 1_709_251_199), &kinds()).unwrap();

        // status once per month, truth per kind per month
        assert_eq!(blocks.iter().filter(|b| b.name == STATUS_QUERY).count(), 2);
        assert_eq!(blocks.iter().filter(|b| b.name == TRUTH_QUERY).count(), 4);

        let gpu = blocks
            .iter()
            .find(|b| b.kind.as_deref() == Some("gpu"))
            .unwrap();
        let query: String = gpu
            .url
            .query_pairs()
            .find(|(k, _)| k == "query")
            .map(|(_, v)| v.into_owned())
            .unwrap();
        assert!(query.contains("nvidia_com_gpu"));
        assert!(!query.contains(TYPE_STRING_PLACEHOLDER));
        assert!(gpu.url.as_str().contains("step=3600"));
        assert_eq!((gpu.start_ts, gpu.end_ts), JAN_2024);
    }

    #[test]
    fn test_transform_joins_on_time() {
        let result = vec![
            json!({
                "metric": {"uid": "a", "namespace": "ns1"},
                "values": [[100, "1"], [200, "2"]]
            }),
            json!({
                "metric": {"uid": "b", "namespace": "ns2"},
                "values": [[200, "5"], [300, "NaN"]]
            }),
        ];
        let table = transform_query_response(&result).unwrap();
        assert_eq!(
            table.columns(),
            ["Time", "{namespace=\"ns1\", uid=\"a\"}", "{namespace=\"ns2\", uid=\"b\"}"]
        );
        assert_eq!(table.row_count(), 3);
        assert_eq!(table.rows()[0], vec![Cell::Number(100.0), Cell::Number(1.0), Cell::Missing]);
        assert_eq!(
            table.rows()[1],
            vec![Cell::Number(200.0), Cell::Number(2.0), Cell::Number(5.0)]
        );
        assert_eq!(table.rows()[2][2], Cell::Missing);
    }

    #[test]
    fn test_transform_rejects_malformed_samples() {
        let result = vec![json!({"metric": {"uid": "a"}, "values": [[100]]})];
        assert!(transform_query_response(&result).is_err());
    }

    #[test]
    fn test_preprocess_merges_and_fills_gaps() {
        let table = Table::from_rows(
            ["Time", "{uid=\"a\", x=\"1\"}", "{uid=\"a\", x=\"2\"}", "{uid=\"z\"}"],
            vec![
                vec![0.0.into(), 1.0.into(), 3.0.into(), 0.0.into()],
                vec![300.0.into(), Cell::Missing, 2.0.into(), 0.0.into()],
            ],
        )
        .unwrap();

        let processed = preprocess(&table, true, 100).unwrap();
        assert_eq!(processed.columns(), ["Time", "{uid=\"a\", x=\"1\"}"]);
        assert_eq!(processed.row_count(), 4);
        assert_eq!(processed.rows()[0][1], Cell::Number(3.0));
        assert_eq!(processed.rows()[1], vec![Cell::Number(100.0), Cell::Missing]);
        assert_eq!(processed.rows()[3][1], Cell::Number(2.0));

        let bare = preprocess(&table, false, 100).unwrap();
        assert_eq!(bare.columns(), ["Time", "a"]);
    }

    #[test]
    fn test_status_masks_values() {
        let mut staged = DataRepository::new();
        let status = Table::from_rows(
            ["Time", "{uid=\"a\"}", "{uid=\"b\"}"],
            vec![
                vec![0.0.into(), 1.0.into(), 1.0.into()],
                vec![100.0.into(), 0.0.into(), 1.0.into()],
            ],
        )
        .unwrap();
        let truth = Table::from_rows(
            [
                "Time",
                "{namespace=\"ns1\", resource=\"cpu\", uid=\"a\"}",
                "{namespace=\"ns1\", resource=\"cpu\", uid=\"c\"}",
            ],
            vec![
                vec![0.0.into(), 4.0.into(), 1.0.into()],
                vec![100.0.into(), 4.0.into(), 1.0.into()],
            ],
        )
        .unwrap();
        staged
            .add(
                Identifier::source_query(0, 100, None, STATUS_QUERY).unwrap(),
                Data::Table(status),
                None,
            )
            .unwrap();
        staged
            .add(
                Identifier::source_query(0, 100, Some("cpu"), TRUTH_QUERY).unwrap(),
                Data::Table(truth),
                None,
            )
            .unwrap();

        let repo = filter_to_running_pending(&staged, 100).unwrap();
        let id = Identifier::source(0, 100, "cpu").unwrap();
        let table = repo.get_data(&id).unwrap().as_table().unwrap();
        // uid c has no status and is dropped; a only counts while running
        assert_eq!(table.columns().len(), 2);
        assert_eq!(table.rows()[0][1], Cell::Number(4.0));
        assert_eq!(table.rows()[1][1], Cell::Missing);
    }
}
