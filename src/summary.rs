//! Per-period summaries of the builtin analyses.

use tracing::{debug, info};

use crate::analysis::aggregate::top_namespaces;
use crate::analysis::builtin::{CPU_KIND, GPU_KIND};
use crate::analysis::ExecutionPlan;
use crate::config::SummaryConfig;
use crate::data::filters::by_type;
use crate::data::{Data, DataRepository, Identifier, IdentifierKind, Period};
use crate::error::Result;
use crate::models::{NamespaceUsage, PeriodSummary};
use crate::util::time::range_printable;

/// Analyses a summary is built from.
pub const SUMMARY_ANALYSES: [&str; 7] = [
    "cpuhours",
    "gpuhours",
    "cpuhourstotal",
    "gpuhourstotal",
    "cpujobstotal",
    "gpujobstotal",
    "jobstotal",
];

fn chain(base: &Identifier, names: &[&str]) -> Identifier {
    names
        .iter()
        .fold(base.clone(), |on, name| Identifier::analysis(Some(on), *name))
}

fn number(repo: &DataRepository, id: &Identifier) -> f64 {
    repo.get_data(id)
        .ok()
        .and_then(Data::as_number)
        .unwrap_or(0.0)
}

fn top(repo: &DataRepository, id: &Identifier, config: &SummaryConfig) -> Vec<NamespaceUsage> {
    match repo.get_data(id) {
        Ok(Data::Table(table)) => top_namespaces(table, config.top_n, &config.namespace_blacklist),
        _ => Vec::new(),
    }
}

/// Summary of one period. Missing results count as zero.
pub fn summarize_period(
    repo: &DataRepository,
    period: Period,
    step: i64,
    config: &SummaryConfig,
) -> Result<PeriodSummary> {
    let (start, end) = period.bounds();
    let cpu = Identifier::source(start, end, CPU_KIND)?;
    let gpu = Identifier::source(start, end, GPU_KIND)?;

    let cpu_jobs = number(repo, &chain(&cpu, &["cpujobs", "cpujobstotal"]));
    let jobs_total = number(repo, &chain(&cpu, &["cpujobs", "cpujobstotal", "jobstotal"]));

    Ok(PeriodSummary {
        readable_period: range_printable(start, end, step),
        start_ts: start,
        end_ts: end,
        cpu_only_jobs: cpu_jobs,
        gpu_jobs: number(repo, &chain(&gpu, &["gpujobs", "gpujobstotal"])),
        jobs_total,
        cpu_hours: number(repo, &chain(&cpu, &["cpuhours", "cpuhourstotal"])),
        gpu_hours: number(repo, &chain(&gpu, &["gpuhours", "gpuhourstotal"])),
        top_cpu: top(repo, &chain(&cpu, &["cpuhours"]), config),
        top_gpu: top(repo, &chain(&gpu, &["gpuhours"]), config),
    })
}

/// Add a summary for every registered period when every summary analysis
/// was part of the plan. Returns the summaries added.
pub fn build_summaries(
    repo: &mut DataRepository,
    plan: &ExecutionPlan,
    step: i64,
    config: &SummaryConfig,
) -> Result<Vec<PeriodSummary>> {
    let missing: Vec<&str> = SUMMARY_ANALYSES
        .iter()
        .copied()
        .filter(|name| !plan.contains(name))
        .collect();
    if !missing.is_empty() {
        info!("Skipping summaries, not run: {}", missing.join(", "));
        return Ok(Vec::new());
    }

    let mut periods: Vec<Period> = repo
        .filter_ids(by_type(IdentifierKind::TimeStamp, true))
        .iter()
        .filter_map(Identifier::period)
        .collect();
    periods.sort_by_key(|p| p.start_ts());

    let mut summaries = Vec::with_capacity(periods.len());
    for period in periods {
        let summary = summarize_period(repo, period, step, config)?;
        let id = Identifier::summary(period.start_ts(), period.end_ts())?;
        debug!("Adding {}", id);
        repo.add(id, Data::Summary(summary.clone()), None)?;
        summaries.push(summary);
    }
    Ok(summaries)
}

/// Plain-text rendering for the terminal.
pub fn render_summary(summary: &PeriodSummary) -> String {
    let mut out = String::new();
    out.push_str(&format!("Summary for {}\n", summary.readable_period));
    for (label, value) in summary.totals() {
        out.push_str(&format!("  {:<14} {}\n", format!("{}:", label), format_total(value)));
    }

    for (title, usages) in [("CPU", &summary.top_cpu), ("GPU", &summary.top_gpu)] {
        out.push_str(&format!("  Top {} namespaces:\n", title));
        if usages.is_empty() {
            out.push_str("    (none)\n");
        }
        for (rank, usage) in usages.iter().enumerate() {
            out.push_str(&format!(
                "    {}. {} ({:.2} hours)\n",
                rank + 1,
                usage.namespace,
                usage.value
            ));
        }
    }
    out
}

fn format_total(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{:.2}", value)
    }
}
