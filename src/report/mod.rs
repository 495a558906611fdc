//! Run reports.
//!
//! A [`Report`] collects what a run did: the plan it executed, the period
//! summaries and every scalar result. It is rendered as Markdown or JSON.

pub mod generator;

pub use generator::{generate_json_report, generate_markdown_report};

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::analysis::ExecutionPlan;
use crate::data::periods::readable_period_of;
use crate::data::{Data, DataRepository, IdentifierKind};
use crate::models::{PeriodSummary, Report, ReportMetadata, ScalarResult};

/// Output format of the run report.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    /// Markdown format (default)
    #[default]
    #[serde(alias = "md")]
    #[value(alias = "md")]
    Markdown,
    /// JSON format
    Json,
}

impl ReportFormat {
    pub fn file_name(self) -> &'static str {
        match self {
            ReportFormat::Markdown => "report.md",
            ReportFormat::Json => "report.json",
        }
    }

    pub fn render(self, report: &Report) -> Result<String> {
        match self {
            ReportFormat::Markdown => Ok(generate_markdown_report(report)),
            ReportFormat::Json => generate_json_report(report),
        }
    }
}

/// Every single-number analysis result, in repository order.
pub fn collect_scalars(repo: &DataRepository) -> Vec<ScalarResult> {
    repo.iter()
        .filter(|(id, _)| id.kind() == IdentifierKind::Analysis)
        .filter_map(|(id, entry)| {
            let value = match entry.data {
                Data::Integer(_) | Data::Float(_) => entry.data.as_number()?,
                _ => return None,
            };
            let analysis = id.as_analysis()?.name().to_string();
            Some(ScalarResult {
                analysis,
                identifier: id.to_string(),
                readable_period: readable_period_of(repo, id),
                value,
            })
        })
        .collect()
}

/// Assemble the report of a finished run.
pub fn build_report(
    metadata: ReportMetadata,
    plan: &ExecutionPlan,
    summaries: &[PeriodSummary],
    repo: &DataRepository,
) -> Report {
    let mut report = Report::new(metadata);
    report.plan = plan.order.clone();
    report.auto_added = plan.auto_added.clone();
    report.summaries = summaries.to_vec();
    report.scalars = collect_scalars(repo);
    report
}
