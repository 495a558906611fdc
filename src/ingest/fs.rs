//! Loading CSV snapshots exported from Grafana.
//!
//! Each file holds one resource kind over one period: a `Time` column
//! followed by one column per series, headed by its label string.

use std::collections::BTreeSet;
use std::path::Path;

use tracing::{debug, info};

use crate::config::Config;
use crate::data::labels::label_of;
use crate::data::periods::align_to_months;
use crate::data::{Cell, Data, DataRepository, Identifier, Metadata, Table, TIME_COLUMN};
use crate::error::{IngestError, Result};
use crate::util::time::to_unix_ts;

/// Metadata key holding the file a source was read from.
pub const SOURCE_FILE_KEY: &str = "source_file";

/// Read a snapshot into a table. Times are converted to unix seconds and
/// every other field to a number where possible.
pub fn read_table(path: &Path) -> std::result::Result<Table, IngestError> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

    let time_idx = headers
        .iter()
        .position(|h| h == TIME_COLUMN)
        .ok_or_else(|| {
            IngestError::Invalid(format!("{} has no \"{}\" column", path.display(), TIME_COLUMN))
        })?;

    let mut table = Table::new(headers);
    for record in reader.records() {
        let record = record?;
        let mut row = Vec::with_capacity(record.len());
        for (idx, field) in record.iter().enumerate() {
            if idx == time_idx {
                let ts = to_unix_ts(field).ok_or_else(|| {
                    IngestError::Invalid(format!(
                        "cannot read time \"{}\" in {}",
                        field,
                        path.display()
                    ))
                })?;
                row.push(Cell::Number(ts as f64));
            } else {
                row.push(Cell::parse(field));
            }
        }
        table
            .push_row(row)
            .map_err(|e| IngestError::Invalid(format!("{}: {}", path.display(), e)))?;
    }
    Ok(table)
}

/// First and last timestamp of a table.
pub fn table_period(table: &Table) -> std::result::Result<(i64, i64), IngestError> {
    let times = table
        .timestamps()
        .map_err(|e| IngestError::Invalid(e.to_string()))?;
    match (times.first(), times.last()) {
        (Some(first), Some(last)) => Ok((*first, *last)),
        _ => Err(IngestError::Invalid("table has no rows".to_string())),
    }
}

/// Resource kind of a table, from the `resource` label of its series.
pub fn resource_kind(table: &Table, config: &Config) -> std::result::Result<String, IngestError> {
    let resources: BTreeSet<String> = table
        .columns()
        .iter()
        .filter(|c| c.as_str() != TIME_COLUMN)
        .filter_map(|c| label_of(c, "resource"))
        .collect();

    let mut iter = resources.iter();
    let (Some(resource), None) = (iter.next(), iter.next()) else {
        return Err(IngestError::Invalid(format!(
            "expected exactly one resource type across series, found [{}]",
            resources.iter().cloned().collect::<Vec<_>>().join(", ")
        )));
    };

    config
        .kind_for_type_string(resource)
        .map(str::to_string)
        .ok_or_else(|| {
            IngestError::Invalid(format!(
                "resource \"{}\" is not configured under [resources]",
                resource
            ))
        })
}

/// Load every file into a source-only repository.
pub fn load_files(paths: &[impl AsRef<Path>], config: &Config) -> Result<DataRepository> {
    let mut repo = DataRepository::new();

    for path in paths {
        let path = path.as_ref();
        let table = read_table(path)?;
        let (start, end) = table_period(&table)?;
        let kind = resource_kind(&table, config)?;

        let id = Identifier::source(start, end, kind)?;
        info!("Loaded {} from {}", id, path.display());
        debug!("{} series, {} rows", table.columns().len() - 1, table.row_count());

        let mut metadata = Metadata::new();
        metadata.insert(
            SOURCE_FILE_KEY.to_string(),
            path.display().to_string().into(),
        );
        repo.add(id, Data::Table(table), Some(metadata))?;
    }

    if config.ingest.align_to_months {
        repo = align_to_months(repo)?;
    }
    Ok(repo)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const CPU_CSV: &str = "\
\"Time\",\"{namespace=\"\"ns1\"\", resource=\"\"cpu\"\", uid=\"\"u1\"\"}\",\"{namespace=\"\"ns2\"\", resource=\"\"cpu\"\", uid=\"\"u2\"\"}\"
1/1/2024 0:00,1,2
1/31/2024 23:00,3,
";

    fn write(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_read_table() {
        let dir = TempDir::new().unwrap();
        let table = read_table(&write(&dir, "cpu.csv", CPU_CSV)).unwrap();

        assert_eq!(table.columns()[1], "{namespace=\"ns1\", resource=\"cpu\", uid=\"u1\"}");
        assert_eq!(table.rows()[0][0], Cell::Number(1_704_067_200.0));
        assert_eq!(table.rows()[1][2], Cell::Missing);
        assert_eq!(table_period(&table).unwrap(), (1_704_067_200, 1_706_742_000));
    }

    #[test]
    fn test_load_aligns_to_month() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "cpu.csv", CPU_CSV);
        let repo = load_files(&[path], &Config::default()).unwrap();

        let expected = Identifier::source(1_704_067_200, 1_706_745_599, "cpu").unwrap();
        assert_eq!(repo.ids(), [expected.clone()]);
        assert!(repo.get_metadata(&expected).unwrap().contains_key(SOURCE_FILE_KEY));
    }

    #[test]
    fn test_gpu_resource_is_mapped() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "gpu.csv",
            "Time,\"{namespace=\"\"ns1\"\", resource=\"\"nvidia_com_gpu\"\", uid=\"\"u1\"\"}\"\n1704067200,1\n",
        );
        let mut config = Config::default();
        config.ingest.align_to_months = false;
        let repo = load_files(&[path], &config).unwrap();
        assert_eq!(
            repo.ids(),
            [Identifier::source(1_704_067_200, 1_704_067_200, "gpu").unwrap()]
        );
    }

    #[test]
    fn test_mixed_resources_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "mixed.csv",
            "Time,\"{resource=\"\"cpu\"\", uid=\"\"a\"\"}\",\"{resource=\"\"nvidia_com_gpu\"\", uid=\"\"b\"\"}\"\n1704067200,1,1\n",
        );
        let err = load_files(&[path], &Config::default()).unwrap_err();
        assert_eq!(err.exit_code(), 5);
    }

    #[test]
    fn test_missing_time_column() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "bad.csv", "When,a\n1,2\n");
        assert!(matches!(read_table(&path), Err(IngestError::Invalid(_))));
    }
}
