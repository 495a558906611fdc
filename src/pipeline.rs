//! The staged run: ingest, analyze, visualize, save.
//!
//! A [`RunState`] is created once and moved through each stage function,
//! which hands back the advanced state. Stages only move forward.

use std::path::Path;

use tracing::info;

use crate::analysis::{run_stage, AnalysisRegistry, ExecutionPlan, Stage as Pass};
use crate::config::Config;
use crate::data::{Data, DataRepository};
use crate::error::{PipelineError, Result};
use crate::ingest::{self, IngestSource};
use crate::models::PeriodSummary;
use crate::save::{run_savers, Saver};
use crate::summary::build_summaries;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Empty,
    Ingested,
    Analyzed,
    Visualized,
    Saved,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Empty => "empty",
            Stage::Ingested => "ingested",
            Stage::Analyzed => "analyzed",
            Stage::Visualized => "visualized",
            Stage::Saved => "saved",
        }
    }

    fn previous(self) -> Option<Stage> {
        match self {
            Stage::Empty => None,
            Stage::Ingested => Some(Stage::Empty),
            Stage::Analyzed => Some(Stage::Ingested),
            Stage::Visualized => Some(Stage::Analyzed),
            Stage::Saved => Some(Stage::Visualized),
        }
    }
}

/// Everything a run carries between stages.
#[derive(Debug)]
pub struct RunState {
    stage: Stage,
    pub repo: DataRepository,
    pub plan: ExecutionPlan,
    pub sources_loaded: usize,
    pub summaries: Vec<PeriodSummary>,
}

impl RunState {
    pub fn new(plan: ExecutionPlan) -> Self {
        Self {
            stage: Stage::Empty,
            repo: DataRepository::new(),
            plan,
            sources_loaded: 0,
            summaries: Vec::new(),
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Fail unless the run sits right before `next`.
    fn ensure_next(&self, next: Stage) -> std::result::Result<(), PipelineError> {
        if next.previous() != Some(self.stage) {
            return Err(PipelineError::OutOfOrder {
                requested: next.as_str(),
                current: self.stage.as_str(),
            });
        }
        Ok(())
    }

    fn advance(&mut self, next: Stage) -> std::result::Result<(), PipelineError> {
        self.ensure_next(next)?;
        self.stage = next;
        Ok(())
    }

    /// Load source data.
    pub async fn ingest(
        self,
        source: &IngestSource,
        config: &Config,
        show_progress: bool,
    ) -> Result<Self> {
        self.ensure_next(Stage::Ingested)?;
        let loaded = ingest::load(source, config, show_progress).await?;
        self.ingest_loaded(loaded, config)
    }

    /// Take sources that were loaded elsewhere.
    pub fn ingest_loaded(mut self, loaded: DataRepository, config: &Config) -> Result<Self> {
        self.advance(Stage::Ingested)?;
        self.sources_loaded = loaded.count();
        ingest::prepare(&mut self.repo, loaded, config)?;
        Ok(self)
    }

    /// Run the non-visual analyses of the plan and build period summaries.
    pub fn analyze(mut self, registry: &AnalysisRegistry, config: &Config) -> Result<Self> {
        self.advance(Stage::Analyzed)?;
        let ran = run_stage(&self.plan, registry, &mut self.repo, Pass::Analyze)?;
        info!("Ran {} analyses", ran.len());
        self.summaries = build_summaries(
            &mut self.repo,
            &self.plan,
            config.promql.step,
            &config.summary,
        )?;
        Ok(self)
    }

    /// Render the visual analyses of the plan.
    pub fn visualize(mut self, registry: &AnalysisRegistry) -> Result<Self> {
        self.advance(Stage::Visualized)?;
        let ran = run_stage(&self.plan, registry, &mut self.repo, Pass::Visualize)?;
        info!("Rendered {} visualizations", ran.len());
        Ok(self)
    }

    /// Write results below `outdir`.
    pub fn save(mut self, savers: &[Box<dyn Saver>], outdir: &Path) -> anyhow::Result<Self> {
        self.advance(Stage::Saved)
            .map_err(crate::error::Error::from)?;
        run_savers(savers, &self.repo, outdir)?;
        Ok(self)
    }

    pub fn figures_rendered(&self) -> usize {
        self.repo
            .iter()
            .filter(|(_, entry)| matches!(entry.data, Data::Figure(_)))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::resolve;
    use crate::data::{Identifier, Table, TIME_COLUMN};
    use crate::error::Error;

    const JAN_2024: (i64, i64) = (1_704_067_200, 1_706_745_599);

    fn loaded() -> DataRepository {
        let mut repo = DataRepository::new();
        let table = Table::from_rows(
            vec![
                TIME_COLUMN.to_string(),
                "{namespace=\"ns1\", resource=\"cpu\", uid=\"a\"}".to_string(),
            ],
            vec![vec![1.0.into(), 3.0.into()], vec![2.0.into(), 3.0.into()]],
        )
        .unwrap();
        repo.add(
            Identifier::source(JAN_2024.0, JAN_2024.1, "cpu").unwrap(),
            Data::Table(table),
            None,
        )
        .unwrap();
        repo
    }

    fn setup(requested: &[&str]) -> (AnalysisRegistry, Config, RunState) {
        let config = Config::default();
        let registry = AnalysisRegistry::builtin(&config).unwrap();
        let plan = resolve(requested, &registry, true).unwrap();
        (registry, config, RunState::new(plan))
    }

    #[test]
    fn test_stages_in_order() {
        let (registry, config, state) = setup(&["cpuhoursbar"]);
        assert_eq!(state.stage(), Stage::Empty);

        let state = state.ingest_loaded(loaded(), &config).unwrap();
        assert_eq!(state.sources_loaded, 1);
        let state = state.analyze(&registry, &config).unwrap();
        assert_eq!(state.stage(), Stage::Analyzed);
        assert_eq!(state.figures_rendered(), 0);
        let state = state.visualize(&registry).unwrap();
        assert_eq!(state.figures_rendered(), 1);

        let dir = tempfile::tempdir().unwrap();
        let savers: Vec<Box<dyn Saver>> = vec![Box::new(crate::save::VisSaver)];
        let state = state.save(&savers, dir.path()).unwrap();
        assert_eq!(state.stage(), Stage::Saved);
    }

    #[test]
    fn test_out_of_order_stage_fails() {
        let (registry, config, state) = setup(&["cpuhours"]);
        let err = state.analyze(&registry, &config).unwrap_err();
        assert!(matches!(
            err,
            Error::Pipeline(PipelineError::OutOfOrder {
                requested: "analyzed",
                current: "empty",
            })
        ));

        let (registry, config, state) = setup(&["cpuhours"]);
        let state = state.ingest_loaded(loaded(), &config).unwrap();
        assert!(state.visualize(&registry).is_err());
    }

    #[tokio::test]
    async fn test_ingest_from_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("cpu.csv"),
            concat!(
                "Time,\"{namespace=\"\"ns1\"\", resource=\"\"cpu\"\", uid=\"\"u1\"\"}\"\n",
                "1/1/2024 0:00,1\n1/31/2024 23:00,2\n",
            ),
        )
        .unwrap();
        let source = IngestSource::Files(dir.path().to_path_buf());

        let (_, config, state) = setup(&["cpuhours"]);
        let state = state.ingest(&source, &config, false).await.unwrap();
        assert_eq!(state.stage(), Stage::Ingested);
        assert_eq!(state.sources_loaded, 1);
        assert!(state.repo.contains(&Identifier::timestamps(JAN_2024.0, JAN_2024.1).unwrap()));

        let err = state.ingest(&source, &config, false).await.unwrap_err();
        assert!(matches!(err, Error::Pipeline(PipelineError::OutOfOrder { .. })));
    }

    #[test]
    fn test_no_backward_transitions() {
        let (_, config, state) = setup(&["cpuhours"]);
        let state = state.ingest_loaded(loaded(), &config).unwrap();
        let err = state.ingest_loaded(loaded(), &config).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
