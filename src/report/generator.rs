//! Markdown and JSON report generation.
//!
//! This module renders the run report: metadata, the executed plan, one
//! section per period summary and a table of every scalar result.

use crate::models::{PeriodSummary, Report, ReportMetadata, ScalarResult};
use anyhow::Result;

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &Report) -> String {
    let mut output = String::new();

    // Title
    output.push_str("# Tidemetrics Report\n\n");

    output.push_str(&generate_metadata_section(&report.metadata));
    output.push_str(&generate_plan_section(&report.plan, &report.auto_added));
    output.push_str(&generate_summaries_section(&report.summaries));
    output.push_str(&generate_scalars_section(&report.scalars));
    output.push_str(&generate_footer());

    output
}

/// Generate the metadata section.
fn generate_metadata_section(metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Input:** {}\n", metadata.input));
    if let Some(ref period) = metadata.period {
        section.push_str(&format!("- **Period:** {}\n", period));
    }
    section.push_str(&format!(
        "- **Analysis Date:** {}\n",
        metadata.analysis_date.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!(
        "- **Sources Loaded:** {}\n",
        metadata.sources_loaded
    ));
    section.push_str(&format!(
        "- **Figures Rendered:** {}\n",
        metadata.figures_rendered
    ));
    section.push_str(&format!(
        "- **Run Duration:** {:.1}s\n",
        metadata.duration_seconds
    ));
    section.push('\n');

    section
}

/// Generate the executed plan section.
fn generate_plan_section(plan: &[String], auto_added: &[String]) -> String {
    let mut section = String::new();

    section.push_str("## Analyses\n\n");
    if plan.is_empty() {
        section.push_str("No analyses were run.\n\n");
        return section;
    }

    for (i, name) in plan.iter().enumerate() {
        let marker = if auto_added.contains(name) {
            " *(prerequisite)*"
        } else {
            ""
        };
        section.push_str(&format!("{}. `{}`{}\n", i + 1, name, marker));
    }
    section.push('\n');

    section
}

/// Generate one subsection per period summary.
fn generate_summaries_section(summaries: &[PeriodSummary]) -> String {
    if summaries.is_empty() {
        return String::new();
    }

    let mut section = String::new();
    section.push_str("## Summaries\n\n");

    for summary in summaries {
        section.push_str(&format!("### {}\n\n", summary.readable_period));

        section.push_str("| Total | Value |\n");
        section.push_str("|:---|---:|\n");
        for (label, value) in summary.totals() {
            section.push_str(&format!("| {} | {} |\n", label, format_value(value)));
        }
        section.push('\n');

        for (title, usages) in [("CPU", &summary.top_cpu), ("GPU", &summary.top_gpu)] {
            if usages.is_empty() {
                continue;
            }
            section.push_str(&format!("**Top {} namespaces**\n\n", title));
            section.push_str("| Rank | Namespace | Hours |\n");
            section.push_str("|:---:|:---|---:|\n");
            for (rank, usage) in usages.iter().enumerate() {
                section.push_str(&format!(
                    "| {} | `{}` | {:.2} |\n",
                    rank + 1,
                    usage.namespace,
                    usage.value
                ));
            }
            section.push('\n');
        }
    }

    section
}

/// Generate the scalar results table.
fn generate_scalars_section(scalars: &[ScalarResult]) -> String {
    if scalars.is_empty() {
        return String::new();
    }

    let mut section = String::new();
    section.push_str("## Results\n\n");
    section.push_str("| Period | Analysis | Value |\n");
    section.push_str("|:---|:---|---:|\n");

    let mut sorted: Vec<&ScalarResult> = scalars.iter().collect();
    sorted.sort_by(|a, b| {
        a.readable_period
            .cmp(&b.readable_period)
            .then_with(|| a.analysis.cmp(&b.analysis))
    });

    for scalar in sorted {
        section.push_str(&format!(
            "| {} | `{}` | {} |\n",
            scalar.readable_period.as_deref().unwrap_or("-"),
            scalar.analysis,
            format_value(scalar.value)
        ));
    }
    section.push('\n');

    section
}

/// Generate the report footer.
fn generate_footer() -> String {
    let mut footer = String::new();

    footer.push_str("---\n\n");
    footer.push_str(&format!(
        "*Report generated by tidemetrics v{}*\n",
        env!("CARGO_PKG_VERSION")
    ));

    footer
}

/// Whole numbers without decimals, everything else to two places.
fn format_value(value: f64) -> String {
    if value.fract() == 0.0 && value.is_finite() {
        format!("{}", value as i64)
    } else {
        format!("{:.2}", value)
    }
}

/// Generate a JSON report.
pub fn generate_json_report(report: &Report) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}
