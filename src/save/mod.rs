//! Writing run results to the output directory.
//!
//! Layout under the output directory:
//!
//! ```text
//! sources/<kind>-<period>.csv
//! analysis/<period> analysis/<analysis>.csv
//! analysis/meta/<identifier>.csv
//! analysis/text_results.txt
//! visualizations/<kind>-<period> <analysis> <graph>.svg
//! report.md | report.json
//! ```

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, error, info};

use crate::data::filters::by_type;
use crate::data::periods::{fs_compatible, readable_period_of, OUT_FILE_NAME_KEY};
use crate::data::{Data, DataRepository, Identifier, IdentifierKind, Table, TIME_COLUMN};
use crate::models::Report;
use crate::report::ReportFormat;
use crate::util::time::from_unix_ts;

pub const SOURCES_DIR: &str = "sources";
pub const ANALYSIS_DIR: &str = "analysis";
pub const META_DIR: &str = "meta";
pub const VISUALIZATIONS_DIR: &str = "visualizations";
pub const TEXT_RESULTS_FILE: &str = "text_results.txt";

/// Writes one category of repository entries below an output directory.
pub trait Saver {
    fn name(&self) -> &'static str;

    fn save(&self, repo: &DataRepository, outdir: &Path) -> Result<()>;
}

/// Write a table as CSV, creating parent directories. The time column is
/// written in the same format snapshots are read in.
pub fn write_table(table: &Table, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    writer.write_record(table.columns())?;

    let time_idx = table.column_index(TIME_COLUMN);
    for row in table.rows() {
        let record: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(idx, cell)| match cell.as_f64() {
                Some(ts) if Some(idx) == time_idx => from_unix_ts(ts as i64),
                _ => cell.to_string(),
            })
            .collect();
        writer.write_record(&record)?;
    }
    writer.flush()?;

    debug!("Wrote {}", path.display());
    Ok(())
}

/// `out_file_name` metadata of a source, or a name derived from its identifier.
fn out_file_name(repo: &DataRepository, source: &Identifier) -> String {
    repo.get_metadata(source)
        .ok()
        .and_then(|metadata| metadata.get(OUT_FILE_NAME_KEY))
        .and_then(|value| value.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| source.fs_str())
}

/// Saves every source table.
pub struct SourceSaver;

impl Saver for SourceSaver {
    fn name(&self) -> &'static str {
        "sources"
    }

    fn save(&self, repo: &DataRepository, outdir: &Path) -> Result<()> {
        let dir = outdir.join(SOURCES_DIR);
        for id in repo.filter_ids(by_type(IdentifierKind::Source, true)) {
            if let Data::Table(table) = repo.get_data(&id)? {
                let path = dir.join(format!("{}.csv", out_file_name(repo, &id)));
                write_table(table, &path)?;
            }
        }
        Ok(())
    }
}

/// Saves analysis tables and appends scalar results to a text file.
pub struct AnalysisSaver;

impl AnalysisSaver {
    fn table_path(&self, repo: &DataRepository, id: &Identifier, outdir: &Path) -> PathBuf {
        let dir = outdir.join(ANALYSIS_DIR);
        let name = id.as_analysis().map(|a| a.name()).unwrap_or_default();
        match (id.kind(), readable_period_of(repo, id)) {
            (IdentifierKind::Analysis, Some(readable)) => dir
                .join(format!("{} analysis", fs_compatible(&readable)))
                .join(format!("{}.csv", name)),
            _ => dir.join(META_DIR).join(format!("{}.csv", id.fs_str())),
        }
    }

    /// Scalar lines grouped under a header per base source, ordered by start.
    fn text_results(&self, repo: &DataRepository) -> Vec<(String, Vec<String>)> {
        let mut grouped: BTreeMap<(i64, String), Vec<String>> = BTreeMap::new();

        for (id, entry) in repo.iter() {
            if id.kind() != IdentifierKind::Analysis {
                continue;
            }
            let Some(value) = entry.data.as_number() else {
                continue;
            };
            let Some(source) = id.base().and_then(Identifier::as_source) else {
                continue;
            };
            let (start, end) = source.period().bounds();
            let readable = readable_period_of(repo, id)
                .unwrap_or_else(|| format!("{}-{}", from_unix_ts(start), from_unix_ts(end)));
            let header = format!("For {}-{}:", source.resource_kind(), readable);
            let name = id.as_analysis().map(|a| a.name()).unwrap_or_default();
            grouped
                .entry((start, header))
                .or_default()
                .push(format!("  {}: {}", name, value));
        }

        grouped
            .into_iter()
            .map(|((_, header), lines)| (header, lines))
            .collect()
    }
}

impl Saver for AnalysisSaver {
    fn name(&self) -> &'static str {
        "analysis"
    }

    fn save(&self, repo: &DataRepository, outdir: &Path) -> Result<()> {
        for id in repo.filter_ids(by_type(IdentifierKind::Analysis, false)) {
            if let Data::Table(table) = repo.get_data(&id)? {
                write_table(table, &self.table_path(repo, &id, outdir))?;
            }
        }

        let results = self.text_results(repo);
        if results.is_empty() {
            return Ok(());
        }

        let dir = outdir.join(ANALYSIS_DIR);
        fs::create_dir_all(&dir).with_context(|| format!("Failed to create {}", dir.display()))?;
        let path = dir.join(TEXT_RESULTS_FILE);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open {}", path.display()))?;

        let mut content = String::new();
        for (header, lines) in results {
            content.push_str(&header);
            content.push('\n');
            for line in lines {
                content.push_str(&line);
                content.push('\n');
            }
        }
        file.write_all(content.as_bytes())?;
        Ok(())
    }
}

/// Saves every rendered figure as SVG.
pub struct VisSaver;

impl VisSaver {
    fn file_name(&self, repo: &DataRepository, id: &Identifier) -> String {
        let Identifier::Vis(vis) = id else {
            return format!("{}.svg", id.fs_str());
        };
        let of = vis.of();
        let name = of.as_analysis().map(|a| a.name()).unwrap_or("figure");
        let prefix = match of.base() {
            Some(base) if base.kind() == IdentifierKind::Source => out_file_name(repo, base),
            _ => "Entire period".to_string(),
        };
        format!("{} {} {}.svg", prefix, name, vis.graph_type())
    }
}

impl Saver for VisSaver {
    fn name(&self) -> &'static str {
        "visualizations"
    }

    fn save(&self, repo: &DataRepository, outdir: &Path) -> Result<()> {
        let dir = outdir.join(VISUALIZATIONS_DIR);
        for id in repo.filter_ids(by_type(IdentifierKind::Vis, true)) {
            let Data::Figure(figure) = repo.get_data(&id)? else {
                continue;
            };
            fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
            let path = dir.join(self.file_name(repo, &id));
            fs::write(&path, &figure.svg)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            debug!("Wrote {}", path.display());
        }
        Ok(())
    }
}

/// Saves the run report.
pub struct ReportSaver {
    pub report: Report,
    pub format: ReportFormat,
}

impl Saver for ReportSaver {
    fn name(&self) -> &'static str {
        "report"
    }

    fn save(&self, _repo: &DataRepository, outdir: &Path) -> Result<()> {
        let content = self.format.render(&self.report)?;
        let path = outdir.join(self.format.file_name());
        fs::write(&path, content)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        Ok(())
    }
}

/// Run every saver. A failing saver is logged and the rest still run; the
/// first failure is returned.
pub fn run_savers(savers: &[Box<dyn Saver>], repo: &DataRepository, outdir: &Path) -> Result<()> {
    fs::create_dir_all(outdir)
        .with_context(|| format!("Failed to create output directory {}", outdir.display()))?;

    let mut first_error = None;
    for saver in savers {
        info!("Saving {} to {}", saver.name(), outdir.display());
        if let Err(e) = saver.save(repo, outdir) {
            error!("Saver \"{}\" failed: {:#}", saver.name(), e);
            first_error.get_or_insert(e);
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::periods::attach_period_labels;
    use crate::data::Cell;
    use crate::models::ReportMetadata;
    use crate::vis::Figure;
    use chrono::Utc;

    const JAN_2024: (i64, i64) = (1_704_067_200, 1_706_745_599);

    fn saved_repo() -> DataRepository {
        let mut repo = DataRepository::new();
        let source = Identifier::source(JAN_2024.0, JAN_2024.1, "cpu").unwrap();
        let table = Table::from_rows(
            ["Time", "{namespace=\"ns1\", uid=\"a\"}"],
            vec![vec![Cell::Number(JAN_2024.0 as f64), 2.0.into()]],
        )
        .unwrap();
        repo.add(source.clone(), Data::Table(table), None).unwrap();
        attach_period_labels(&mut repo, 3600).unwrap();

        let hours = Identifier::analysis(Some(source), "cpuhours");
        let by_namespace =
            Table::from_rows(["Namespace", "Hours"], vec![vec!["ns1".into(), 2.0.into()]]).unwrap();
        repo.add(hours.clone(), Data::Table(by_namespace), None).unwrap();
        repo.add(
            Identifier::analysis(Some(hours.clone()), "cpuhourstotal"),
            Data::Float(2.0),
            None,
        )
        .unwrap();
        repo.add(
            Identifier::vis(hours, "bar"),
            Data::Figure(Figure {
                title: "Hours".to_string(),
                graph_type: "bar".to_string(),
                svg: "<svg></svg>".to_string(),
            }),
            None,
        )
        .unwrap();

        let history = Identifier::meta_analysis(None, "hourshistory", "all");
        let meta_table = Table::from_rows(
            ["Period", "cpuhourstotal"],
            vec![vec!["January24".into(), 2.0.into()]],
        )
        .unwrap();
        repo.add(history.clone(), Data::Table(meta_table), None).unwrap();
        repo.add(
            Identifier::vis(history, "timeseries"),
            Data::Figure(Figure {
                title: "History".to_string(),
                graph_type: "timeseries".to_string(),
                svg: "<svg/>".to_string(),
            }),
            None,
        )
        .unwrap();
        repo
    }

    #[test]
    fn test_source_saver_round_trips_time() {
        let dir = tempfile::tempdir().unwrap();
        SourceSaver.save(&saved_repo(), dir.path()).unwrap();

        let path = dir.path().join(SOURCES_DIR).join("cpu-January24.csv");
        let table = crate::ingest::fs::read_table(&path).unwrap();
        assert_eq!(table.timestamps().unwrap(), vec![JAN_2024.0]);
        assert_eq!(table.rows()[0][1], Cell::Number(2.0));
    }

    #[test]
    fn test_analysis_saver_layout() {
        let dir = tempfile::tempdir().unwrap();
        let repo = saved_repo();
        AnalysisSaver.save(&repo, dir.path()).unwrap();

        let analysis = dir.path().join(ANALYSIS_DIR);
        assert!(analysis.join("January24 analysis").join("cpuhours.csv").exists());
        assert!(analysis
            .join(META_DIR)
            .join("hourshistory-all.csv")
            .exists());

        let text = fs::read_to_string(analysis.join(TEXT_RESULTS_FILE)).unwrap();
        assert_eq!(text, "For cpu-January24:\n  cpuhourstotal: 2\n");

        // results are appended on later runs
        AnalysisSaver.save(&repo, dir.path()).unwrap();
        let text = fs::read_to_string(analysis.join(TEXT_RESULTS_FILE)).unwrap();
        assert_eq!(text.matches("For cpu-January24:").count(), 2);
    }

    #[test]
    fn test_vis_saver_names() {
        let dir = tempfile::tempdir().unwrap();
        VisSaver.save(&saved_repo(), dir.path()).unwrap();

        let vis = dir.path().join(VISUALIZATIONS_DIR);
        assert_eq!(
            fs::read_to_string(vis.join("cpu-January24 cpuhours bar.svg")).unwrap(),
            "<svg></svg>"
        );
        assert!(vis.join("Entire period hourshistory timeseries.svg").exists());
    }

    struct FailingSaver;

    impl Saver for FailingSaver {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn save(&self, _repo: &DataRepository, _outdir: &Path) -> Result<()> {
            anyhow::bail!("disk full")
        }
    }

    #[test]
    fn test_failing_saver_does_not_stop_others() {
        let dir = tempfile::tempdir().unwrap();
        let report = Report::new(ReportMetadata {
            tool_version: "1.0.0".to_string(),
            analysis_date: Utc::now(),
            input: "test".to_string(),
            period: None,
            sources_loaded: 1,
            figures_rendered: 2,
            duration_seconds: 0.1,
        });
        let savers: Vec<Box<dyn Saver>> = vec![
            Box::new(FailingSaver),
            Box::new(ReportSaver {
                report,
                format: ReportFormat::Json,
            }),
        ];

        let err = run_savers(&savers, &saved_repo(), dir.path()).unwrap_err();
        assert!(err.to_string().contains("disk full"));
        assert!(dir.path().join("report.json").exists());
    }
}
