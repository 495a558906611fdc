//! Running analyses against the repository.

use std::collections::BTreeSet;

use tracing::{debug, info, warn};

use super::descriptor::{Analysis, AnalysisKind};
use super::meta::run_meta;
use super::registry::AnalysisRegistry;
use super::resolver::ExecutionPlan;
use crate::data::filters::by_analysis_name;
use crate::data::{Data, DataRepository, Identifier};
use crate::error::{AnalysisError, Result};
use crate::vis;

/// What a single analysis run achieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Ran on at least one identifier; `produced` entries were written.
    Fulfilled { produced: usize },
    /// Nothing in the repository matched.
    Unfulfilled,
}

/// Which analyses a pass of the driver runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Analyze,
    Visualize,
}

impl Stage {
    pub fn includes(self, analysis: &Analysis) -> bool {
        match self {
            Stage::Analyze => !analysis.is_visual(),
            Stage::Visualize => analysis.is_visual(),
        }
    }
}

pub fn run_analysis(analysis: &Analysis, repo: &mut DataRepository) -> Result<Outcome> {
    match &analysis.kind {
        AnalysisKind::Simple { filter, compute } => {
            let ids = repo.filter_ids(|id| filter(id));
            if ids.is_empty() {
                return Ok(Outcome::Unfulfilled);
            }
            for id in &ids {
                let data = compute(id, repo)?;
                let result = Identifier::analysis(Some(id.clone()), analysis.name.as_str());
                repo.add(result, data, None)?;
            }
            Ok(Outcome::Fulfilled { produced: ids.len() })
        }
        AnalysisKind::Meta { key_method } => {
            run_meta(&analysis.name, &analysis.prerequisites, key_method, repo)
        }
        AnalysisKind::Verification {
            target_analysis,
            check,
        } => {
            let ids = repo.filter_ids(by_analysis_name(target_analysis.as_str()));
            if ids.is_empty() {
                return Ok(Outcome::Unfulfilled);
            }
            for id in &ids {
                if !check(id, repo)? {
                    return Err(AnalysisError::VerificationFailed {
                        analysis: analysis.name.clone(),
                        identifier: id.to_string(),
                    }
                    .into());
                }
                debug!("{} passed {}", id, analysis.name);
            }
            Ok(Outcome::Fulfilled { produced: 0 })
        }
        AnalysisKind::Visual { filter, settings } => {
            let ids = repo.filter_ids(|id| filter(id));
            if ids.is_empty() {
                return Ok(Outcome::Unfulfilled);
            }
            for id in &ids {
                let figure = match repo.get_data(id)? {
                    Data::Table(table) => vis::render(id, table, settings, repo)?,
                    other => {
                        return Err(AnalysisError::NotVisualizable {
                            analysis: analysis.name.clone(),
                            identifier: id.to_string(),
                            found: other.type_name(),
                        }
                        .into())
                    }
                };
                let metadata = repo.get_metadata(id)?.clone();
                repo.add(
                    Identifier::vis(id.clone(), settings.graph_type()),
                    Data::Figure(figure),
                    Some(metadata),
                )?;
            }
            Ok(Outcome::Fulfilled { produced: ids.len() })
        }
    }
}

/// Run every analysis of the plan belonging to `stage`, in plan order.
///
/// Analyses that find nothing to run on do not stop the pass; they are
/// reported together once every analysis of the stage has had its turn.
/// Returns the names that ran.
pub fn run_stage(
    plan: &ExecutionPlan,
    registry: &AnalysisRegistry,
    repo: &mut DataRepository,
    stage: Stage,
) -> Result<Vec<String>> {
    let mut fulfilled = Vec::new();
    let mut unfulfilled = BTreeSet::new();

    for name in &plan.order {
        let analysis = registry.get(name)?;
        if !stage.includes(analysis) {
            continue;
        }

        info!("Running {} analysis \"{}\"", analysis.kind.label(), name);
        match run_analysis(analysis, repo)? {
            Outcome::Fulfilled { produced } => {
                debug!("\"{}\" produced {} entries", name, produced);
                fulfilled.push(name.clone());
            }
            Outcome::Unfulfilled => {
                warn!("Analysis \"{}\" found nothing to run on", name);
                unfulfilled.insert(name.clone());
            }
        }
    }

    if !unfulfilled.is_empty() {
        return Err(AnalysisError::Unfulfilled(unfulfilled.into_iter().collect()).into());
    }
    Ok(fulfilled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::resolver::resolve;
    use crate::config::Config;
    use crate::data::{Cell, Table, TIME_COLUMN};
    use crate::error::Error;

    fn cpu_source() -> (Identifier, Table) {
        let id = Identifier::source(0, 10, "cpu").unwrap();
        let table = Table::from_rows(
            [
                TIME_COLUMN,
                "{namespace=\"ns1\",uid=\"u1\",resource=\"cpu\"}",
                "{namespace=\"ns2\",uid=\"u2\",resource=\"cpu\"}",
            ],
            vec![
                vec![1.0.into(), 1.0.into(), 2.0.into()],
                vec![2.0.into(), 3.0.into(), 4.0.into()],
            ],
        )
        .unwrap();
        (id, table)
    }

    #[test]
    fn test_cpuhours_end_to_end() {
        let registry = AnalysisRegistry::builtin(&Config::default()).unwrap();
        let mut repo = DataRepository::new();
        let (src, table) = cpu_source();
        repo.add(src.clone(), Data::Table(table), None).unwrap();

        let plan = resolve(&["cpuhours"], &registry, true).unwrap();
        let ran = run_stage(&plan, &registry, &mut repo, Stage::Analyze).unwrap();
        assert_eq!(ran, vec!["cpuhours"]);

        let result = repo
            .get_data(&Identifier::analysis(Some(src), "cpuhours"))
            .unwrap()
            .as_table()
            .unwrap()
            .clone();
        let value_of = |ns: &str| {
            result
                .rows()
                .iter()
                .find(|row| row[0] == Cell::from(ns))
                .and_then(|row| row[1].as_f64())
        };
        assert_eq!(value_of("ns1"), Some(4.0));
        assert_eq!(value_of("ns2"), Some(6.0));
    }

    #[test]
    fn test_unfulfilled_names_only_the_starved_analysis() {
        let registry = AnalysisRegistry::builtin(&Config::default()).unwrap();
        let mut repo = DataRepository::new();
        let (src, table) = cpu_source();
        repo.add(src, Data::Table(table), None).unwrap();

        let plan = resolve(&["cpuhours", "gpuhours"], &registry, true).unwrap();
        let err = run_stage(&plan, &registry, &mut repo, Stage::Analyze).unwrap_err();
        match err {
            Error::Analysis(AnalysisError::Unfulfilled(names)) => {
                assert_eq!(names, vec!["gpuhours".to_string()])
            }
            other => panic!("unexpected error: {}", other),
        }
        // the fulfilled analysis still ran
        assert_eq!(repo.filter_ids(by_analysis_name("cpuhours")).len(), 1);
    }

    #[test]
    fn test_failed_verification_halts() {
        let mut registry = AnalysisRegistry::new();
        registry
            .register(Analysis::verification("check", "total", |_, _| Ok(false)))
            .unwrap();
        let mut repo = DataRepository::new();
        repo.add(Identifier::analysis(None, "total"), Data::Float(1.0), None).unwrap();

        let err = run_analysis(registry.get("check").unwrap(), &mut repo).unwrap_err();
        assert_eq!(err.exit_code(), 4);
        assert_eq!(repo.count(), 1);
    }

    #[test]
    fn test_visualizing_a_scalar_is_an_error() {
        let registry = AnalysisRegistry::builtin(&Config::default()).unwrap();
        let mut repo = DataRepository::new();
        let src = Identifier::source(0, 10, "cpu").unwrap();
        repo.add(Identifier::analysis(Some(src), "cpuhours"), Data::Integer(3), None)
            .unwrap();

        let err = run_analysis(registry.get("cpuhoursbar").unwrap(), &mut repo).unwrap_err();
        assert!(matches!(
            err,
            Error::Analysis(AnalysisError::NotVisualizable { .. })
        ));
    }

    #[test]
    fn test_stage_filters_by_kind() {
        let registry = AnalysisRegistry::builtin(&Config::default()).unwrap();
        let mut repo = DataRepository::new();
        let plan = resolve(&["cpuhoursbar"], &registry, true).unwrap();
        assert!(plan.contains("cpuhours"));
        // no data and only the visual stage: only the bar chart is reported
        let err = run_stage(&plan, &registry, &mut repo, Stage::Visualize).unwrap_err();
        assert_eq!(
            err.to_string(),
            "failed to fulfill analyses: cpuhoursbar (was all data loaded properly?)"
        );
    }
}
