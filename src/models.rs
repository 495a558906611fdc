//! Data models for summaries and run reports.
//!
//! These are the serializable shapes that leave the engine: period
//! summaries printed at the end of a run and the report written to disk.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Usage attributed to one namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamespaceUsage {
    pub namespace: String,
    pub value: f64,
}

/// Totals and heaviest namespaces of one period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodSummary {
    /// Human-readable period, e.g. `January24`.
    pub readable_period: String,
    pub start_ts: i64,
    pub end_ts: i64,
    pub cpu_only_jobs: f64,
    pub gpu_jobs: f64,
    pub jobs_total: f64,
    pub cpu_hours: f64,
    pub gpu_hours: f64,
    /// Heaviest CPU namespaces, largest first.
    pub top_cpu: Vec<NamespaceUsage>,
    /// Heaviest GPU namespaces, largest first.
    pub top_gpu: Vec<NamespaceUsage>,
}

impl PeriodSummary {
    /// Labelled totals in display order.
    pub fn totals(&self) -> [(&'static str, f64); 5] {
        [
            ("CPU Only Jobs", self.cpu_only_jobs),
            ("GPU Jobs", self.gpu_jobs),
            ("Jobs Total", self.jobs_total),
            ("CPU Hours", self.cpu_hours),
            ("GPU Hours", self.gpu_hours),
        ]
    }
}

/// A single-number analysis result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalarResult {
    pub analysis: String,
    pub identifier: String,
    pub readable_period: Option<String>,
    pub value: f64,
}

/// Metadata about a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// Version of the tool that produced the report.
    pub tool_version: String,
    /// Date and time the run finished.
    pub analysis_date: DateTime<Utc>,
    /// Where the data came from (PromQL endpoint or input path).
    pub input: String,
    /// Requested period, when data was queried.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period: Option<String>,
    /// Number of source tables loaded.
    pub sources_loaded: usize,
    /// Number of figures rendered.
    pub figures_rendered: usize,
    /// Duration of the run in seconds.
    pub duration_seconds: f64,
}

/// The complete run report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub metadata: ReportMetadata,
    /// Analyses in execution order.
    pub plan: Vec<String>,
    /// Prerequisites added to the plan without being requested.
    pub auto_added: Vec<String>,
    pub summaries: Vec<PeriodSummary>,
    pub scalars: Vec<ScalarResult>,
}

impl Report {
    pub fn new(metadata: ReportMetadata) -> Self {
        Self {
            metadata,
            plan: Vec::new(),
            auto_added: Vec::new(),
            summaries: Vec::new(),
            scalars: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_totals_order() {
        let summary = PeriodSummary {
            readable_period: "January24".to_string(),
            start_ts: 0,
            end_ts: 10,
            cpu_only_jobs: 1.0,
            gpu_jobs: 2.0,
            jobs_total: 3.0,
            cpu_hours: 4.0,
            gpu_hours: 5.0,
            top_cpu: Vec::new(),
            top_gpu: Vec::new(),
        };
        let labels: Vec<&str> = summary.totals().iter().map(|(label, _)| *label).collect();
        assert_eq!(
            labels,
            vec!["CPU Only Jobs", "GPU Jobs", "Jobs Total", "CPU Hours", "GPU Hours"]
        );
        assert_eq!(summary.totals()[2].1, 3.0);
    }

    #[test]
    fn test_report_serializes_without_period() {
        let report = Report::new(ReportMetadata {
            tool_version: "1.0.0".to_string(),
            analysis_date: Utc::now(),
            input: "data/".to_string(),
            period: None,
            sources_loaded: 2,
            figures_rendered: 0,
            duration_seconds: 0.5,
        });
        let json = serde_json::to_string(&report).unwrap();
        assert!(!json.contains("\"period\""));
        assert!(json.contains("\"sources_loaded\":2"));
    }
}
