//! The analyses shipped with the tool.

use std::collections::BTreeMap;

use super::descriptor::Analysis;
use super::implementations::{hours, jobs};
use super::registry::AnalysisRegistry;
use crate::config::Config;
use crate::data::filters::{by_analysis_name, by_resource_kind, shared};
use crate::data::Identifier;
use crate::error::AnalysisError;
use crate::vis::{BarSettings, TimeSeriesSettings, VisSettings};

pub const CPU_KIND: &str = "cpu";
pub const GPU_KIND: &str = "gpu";

/// Key used by the history analyses: every result goes into one table.
const ALL_KEY: &str = "all";

fn variables(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(var, analysis)| (var.to_string(), analysis.to_string()))
        .collect()
}

fn bar(title: &str, subtext: &str, color: &str, vars: &[(&str, &str)]) -> VisSettings {
    VisSettings::Bar(BarSettings {
        title: title.to_string(),
        subtext: subtext.to_string(),
        color: color.to_string(),
        variables: variables(vars),
    })
}

fn history(title: &str, config: &Config) -> VisSettings {
    VisSettings::TimeSeries(TimeSeriesSettings {
        title: title.to_string(),
        colors: config.plots.history_colors.clone(),
        default_color: config.plots.default_color.clone(),
        variables: BTreeMap::new(),
    })
}

impl AnalysisRegistry {
    /// Registry holding every builtin analysis.
    pub fn builtin(config: &Config) -> Result<Self, AnalysisError> {
        let mut registry = AnalysisRegistry::new();

        // Hours
        registry.register(Analysis::simple(
            "cpuhours",
            shared(by_resource_kind(CPU_KIND)),
            hours::hours_by_namespace,
        ))?;
        registry.register(Analysis::simple(
            "gpuhours",
            shared(by_resource_kind(GPU_KIND)),
            hours::hours_by_namespace,
        ))?;
        registry.register(
            Analysis::simple(
                "cpuhourstotal",
                shared(by_analysis_name("cpuhours")),
                hours::hours_total,
            )
            .requires(["cpuhours"]),
        )?;
        registry.register(
            Analysis::simple(
                "gpuhourstotal",
                shared(by_analysis_name("gpuhours")),
                hours::hours_total,
            )
            .requires(["gpuhours"]),
        )?;

        // Jobs
        registry.register(Analysis::simple(
            "gpujobs",
            shared(by_resource_kind(GPU_KIND)),
            jobs::jobs_by_namespace,
        ))?;
        registry.register(
            Analysis::simple(
                "cpujobs",
                shared(by_resource_kind(CPU_KIND)),
                |id: &Identifier, repo: &crate::data::DataRepository| {
                    jobs::cpu_only_jobs(id, repo, GPU_KIND)
                },
            )
            .requires(["gpujobs"]),
        )?;
        registry.register(
            Analysis::simple(
                "cpujobstotal",
                shared(by_analysis_name("cpujobs")),
                jobs::jobs_total,
            )
            .requires(["cpujobs"]),
        )?;
        registry.register(
            Analysis::simple(
                "gpujobstotal",
                shared(by_analysis_name("gpujobs")),
                jobs::jobs_total,
            )
            .requires(["gpujobs"]),
        )?;
        registry.register(
            Analysis::simple(
                "jobstotal",
                shared(by_analysis_name("cpujobstotal")),
                |id: &Identifier, repo: &crate::data::DataRepository| {
                    jobs::all_jobs_total(id, repo, GPU_KIND, "gpujobs", "gpujobstotal")
                },
            )
            .requires(["cpujobstotal", "gpujobstotal"]),
        )?;

        // Checks
        registry.register(Analysis::verification(
            "cpuhourscheck",
            "cpuhourstotal",
            hours::check_hours_total,
        ))?;
        registry.register(Analysis::verification(
            "gpuhourscheck",
            "gpuhourstotal",
            hours::check_hours_total,
        ))?;

        // History
        registry.register(Analysis::meta(
            "hourshistory",
            ["cpuhourstotal", "gpuhourstotal"],
            |_: &Identifier| ALL_KEY.to_string(),
        ))?;
        registry.register(Analysis::meta(
            "jobshistory",
            ["cpujobstotal", "gpujobstotal"],
            |_: &Identifier| ALL_KEY.to_string(),
        ))?;

        // Plots
        let cpu = config.plots.cpu_color.as_str();
        let gpu = config.plots.gpu_color.as_str();
        registry.register(
            Analysis::visual(
                "cpuhoursbar",
                shared(by_analysis_name("cpuhours")),
                bar(
                    "Total CPU Hours by Namespace from %MONTH%",
                    "Total CPU Hours: %TOTCPUHRS%",
                    cpu,
                    &[("TOTCPUHRS", "cpuhourstotal")],
                ),
            )
            .requires(["cpuhours", "cpuhourstotal"]),
        )?;
        registry.register(
            Analysis::visual(
                "gpuhoursbar",
                shared(by_analysis_name("gpuhours")),
                bar(
                    "Total GPU Hours by Namespace from %MONTH%",
                    "Total GPU Hours: %TOTGPUHRS%",
                    gpu,
                    &[("TOTGPUHRS", "gpuhourstotal")],
                ),
            )
            .requires(["gpuhours", "gpuhourstotal"]),
        )?;
        registry.register(
            Analysis::visual(
                "cpujobsbar",
                shared(by_analysis_name("cpujobs")),
                bar(
                    "Total CPU Jobs by Namespace from %MONTH%",
                    "Total CPU Jobs: %TOTCPUJOBS%",
                    cpu,
                    &[("TOTCPUJOBS", "cpujobstotal")],
                ),
            )
            .requires(["cpujobs", "cpujobstotal"]),
        )?;
        registry.register(
            Analysis::visual(
                "gpujobsbar",
                shared(by_analysis_name("gpujobs")),
                bar(
                    "Total GPU Jobs by Namespace from %MONTH%",
                    "Total GPU Jobs: %TOTGPUJOBS%",
                    gpu,
                    &[("TOTGPUJOBS", "gpujobstotal")],
                ),
            )
            .requires(["gpujobs", "gpujobstotal"]),
        )?;
        registry.register(
            Analysis::visual(
                "hourshistoryplot",
                shared(by_analysis_name("hourshistory")),
                history("CPU and GPU Hours per Month", config),
            )
            .requires(["hourshistory"]),
        )?;
        registry.register(
            Analysis::visual(
                "jobshistoryplot",
                shared(by_analysis_name("jobshistory")),
                history("CPU and GPU Jobs per Month", config),
            )
            .requires(["jobshistory"]),
        )?;

        registry.validate()?;
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::driver::{run_stage, Stage};
    use crate::analysis::resolver::resolve;
    use crate::data::{Data, DataRepository, Table, TIME_COLUMN};

    const JAN_2024: (i64, i64) = (1_704_067_200, 1_706_745_599);

    fn column(namespace: &str, uid: &str, resource: &str) -> String {
        format!(
            "{{namespace=\"{}\", resource=\"{}\", uid=\"{}\"}}",
            namespace, resource, uid
        )
    }

    fn loaded_repo() -> DataRepository {
        let mut repo = DataRepository::new();
        let cpu = Identifier::source(JAN_2024.0, JAN_2024.1, CPU_KIND).unwrap();
        let gpu = Identifier::source(JAN_2024.0, JAN_2024.1, GPU_KIND).unwrap();
        let cpu_table = Table::from_rows(
            vec![
                TIME_COLUMN.to_string(),
                column("ns1", "a", "cpu"),
                column("ns1", "b", "cpu"),
                column("ns2", "c", "cpu"),
            ],
            vec![
                vec![1.0.into(), 2.0.into(), 1.0.into(), 4.0.into()],
                vec![2.0.into(), 2.0.into(), 1.0.into(), 4.0.into()],
            ],
        )
        .unwrap();
        let gpu_table = Table::from_rows(
            vec![TIME_COLUMN.to_string(), column("ns2", "c", "nvidia_com_gpu")],
            vec![vec![1.0.into(), 1.0.into()], vec![2.0.into(), 1.0.into()]],
        )
        .unwrap();
        repo.add(cpu, Data::Table(cpu_table), None).unwrap();
        repo.add(gpu, Data::Table(gpu_table), None).unwrap();
        repo.add(Identifier::timestamps(JAN_2024.0, JAN_2024.1).unwrap(), Data::Empty, None)
            .unwrap();
        repo
    }

    #[test]
    fn test_builtin_registry_is_valid() {
        let registry = AnalysisRegistry::builtin(&Config::default()).unwrap();
        assert_eq!(registry.names().count(), 19);
        assert!(registry.get("cpujobs").unwrap().prerequisites.contains(&"gpujobs".to_string()));
    }

    #[test]
    fn test_all_analyses_run() {
        let registry = AnalysisRegistry::builtin(&Config::default()).unwrap();
        let mut repo = loaded_repo();
        let requested = registry.expand_requested(&["all"]);
        let plan = resolve(&requested, &registry, true).unwrap();
        assert!(plan.auto_added.is_empty());

        run_stage(&plan, &registry, &mut repo, Stage::Analyze).unwrap();
        run_stage(&plan, &registry, &mut repo, Stage::Visualize).unwrap();

        let value = |name: &str| {
            let ids = repo.filter_ids(by_analysis_name(name));
            assert_eq!(ids.len(), 1, "{}", name);
            repo.get_data(&ids[0]).unwrap().as_number().unwrap()
        };
        assert_eq!(value("cpuhourstotal"), 14.0);
        assert_eq!(value("gpuhourstotal"), 2.0);
        assert_eq!(value("cpujobstotal"), 2.0);
        assert_eq!(value("gpujobstotal"), 1.0);
        assert_eq!(value("jobstotal"), 3.0);

        let figures = repo
            .iter()
            .filter(|(_, entry)| matches!(entry.data, Data::Figure(_)))
            .count();
        assert_eq!(figures, 6);
    }
}
