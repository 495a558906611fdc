//! Loading source data into the repository.
//!
//! Data comes either from CSV snapshots on disk or from a PromQL endpoint.
//! Whatever the origin, the loaded sources are checked for periods that
//! overlap the main repository, joined into it, and their periods are
//! registered and labelled.

pub mod fs;
pub mod promql;
pub mod scanner;

use std::path::PathBuf;

use tracing::info;

use crate::config::Config;
use crate::data::periods::{attach_period_labels, check_overlaps, register_periods};
use crate::data::DataRepository;
use crate::error::{IngestError, Result};
use promql::PromqlIngest;
use scanner::CsvScanner;

/// Where source data is read from.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestSource {
    /// A CSV file or a directory of them.
    Files(PathBuf),
    /// A PromQL endpoint queried over a period for the given resource kinds.
    Promql { period: (i64, i64), kinds: Vec<String> },
}

impl IngestSource {
    pub fn describe(&self, config: &Config) -> String {
        match self {
            IngestSource::Files(path) => path.display().to_string(),
            IngestSource::Promql { .. } => config.promql.base_url.clone(),
        }
    }
}

/// Read every source `source` describes into a fresh repository.
pub async fn load(
    source: &IngestSource,
    config: &Config,
    show_progress: bool,
) -> Result<DataRepository> {
    match source {
        IngestSource::Files(path) => {
            let files = CsvScanner::new(path).scan()?;
            fs::load_files(&files, config)
        }
        IngestSource::Promql { period, kinds } => {
            PromqlIngest::new(config, *period, kinds.clone())
                .ingest(show_progress)
                .await
        }
    }
}

/// Check freshly loaded sources against `repo`, join them in, then register
/// periods. `repo` is left untouched when the check or the join fails.
pub fn prepare(repo: &mut DataRepository, loaded: DataRepository, config: &Config) -> Result<()> {
    if repo.is_empty() && loaded.is_empty() {
        return Err(IngestError::Invalid("no data was loaded".to_string()).into());
    }

    check_overlaps(&[&*repo, &loaded])?;
    repo.join(loaded)?;
    let periods = register_periods(repo)?;
    attach_period_labels(repo, config.promql.step)?;
    info!("Loaded {} entries covering {} periods", repo.count(), periods);
    Ok(())
}
