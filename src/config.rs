//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.tidemetrics.toml` files.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::report::ReportFormat;

/// Name of the configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = ".tidemetrics.toml";

/// Placeholder in query strings replaced by a resource's metric string.
pub const TYPE_STRING_PLACEHOLDER: &str = "%TYPE_STRING%";

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// PromQL endpoint settings.
    #[serde(default)]
    pub promql: PromqlConfig,

    /// Resource kind to the string it appears as in queries and labels.
    #[serde(default = "default_resources")]
    pub resources: BTreeMap<String, String>,

    /// Ingest settings.
    #[serde(default)]
    pub ingest: IngestConfig,

    /// Period summary settings.
    #[serde(default)]
    pub summary: SummaryConfig,

    /// Plot colours.
    #[serde(default)]
    pub plots: PlotConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            promql: PromqlConfig::default(),
            resources: default_resources(),
            ingest: IngestConfig::default(),
            summary: SummaryConfig::default(),
            plots: PlotConfig::default(),
        }
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Directory outputs are written to. Nothing is saved when unset.
    #[serde(default)]
    pub outdir: Option<PathBuf>,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,

    /// Report format written to the output directory (markdown, json).
    #[serde(default)]
    pub report_format: ReportFormat,

    /// Pull in unrequested prerequisites instead of failing.
    #[serde(default = "default_true")]
    pub auto_prerequisites: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            outdir: None,
            verbose: false,
            report_format: ReportFormat::default(),
            auto_prerequisites: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// PromQL query settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromqlConfig {
    /// Range query endpoint, e.g. `http://prometheus:9090/api/v1/query_range`.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Query resolution in seconds.
    #[serde(default = "default_step")]
    pub step: i64,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Named queries. `status` selects running/pending pods, `truth` holds
    /// the usage values and may contain `%TYPE_STRING%`.
    #[serde(default = "default_queries")]
    pub queries: BTreeMap<String, String>,
}

impl Default for PromqlConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            step: default_step(),
            timeout_seconds: default_timeout(),
            queries: default_queries(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:9090/api/v1/query_range".to_string()
}

fn default_step() -> i64 {
    3600
}

fn default_timeout() -> u64 {
    300
}

fn default_queries() -> BTreeMap<String, String> {
    BTreeMap::from([
        (
            "status".to_string(),
            "sum by (uid) (kube_pod_status_phase{phase=~\"Running|Pending\"})".to_string(),
        ),
        (
            "truth".to_string(),
            "sum by (namespace, uid, resource) (kube_pod_container_resource_requests{resource=\"%TYPE_STRING%\"})"
                .to_string(),
        ),
    ])
}

fn default_resources() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("cpu".to_string(), "cpu".to_string()),
        ("gpu".to_string(), "nvidia_com_gpu".to_string()),
    ])
}

/// Ingest settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Widen every file source period to whole months.
    #[serde(default = "default_true")]
    pub align_to_months: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            align_to_months: true,
        }
    }
}

/// Period summary settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryConfig {
    /// Namespaces listed per resource.
    #[serde(default = "default_top_n")]
    pub top_n: usize,

    /// Namespaces never listed in the summary.
    #[serde(default)]
    pub namespace_blacklist: Vec<String>,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            top_n: default_top_n(),
            namespace_blacklist: Vec::new(),
        }
    }
}

fn default_top_n() -> usize {
    5
}

/// Colours of the builtin plots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlotConfig {
    #[serde(default = "default_cpu_color")]
    pub cpu_color: String,

    #[serde(default = "default_gpu_color")]
    pub gpu_color: String,

    /// Time series line colour per column; unlisted columns use `default_color`.
    #[serde(default = "default_history_colors")]
    pub history_colors: BTreeMap<String, String>,

    #[serde(default = "default_line_color")]
    pub default_color: String,
}

impl Default for PlotConfig {
    fn default() -> Self {
        Self {
            cpu_color: default_cpu_color(),
            gpu_color: default_gpu_color(),
            history_colors: default_history_colors(),
            default_color: default_line_color(),
        }
    }
}

fn default_cpu_color() -> String {
    "skyblue".to_string()
}

fn default_gpu_color() -> String {
    "orange".to_string()
}

fn default_line_color() -> String {
    "blue".to_string()
}

fn default_history_colors() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("cpuhourstotal".to_string(), "red".to_string()),
        ("gpuhourstotal".to_string(), "blue".to_string()),
        ("cpujobstotal".to_string(), "red".to_string()),
        ("gpujobstotal".to_string(), "blue".to_string()),
    ])
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(DEFAULT_CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.promql.step <= 0 {
            bail!("promql.step must be positive, got {}", self.promql.step);
        }
        for required in ["status", "truth"] {
            if !self.promql.queries.contains_key(required) {
                bail!("promql.queries is missing the \"{}\" query", required);
            }
        }
        if self.resources.is_empty() {
            bail!("at least one resource kind must be configured under [resources]");
        }
        Ok(())
    }

    /// Resource kind whose metric string is `type_string`.
    pub fn kind_for_type_string(&self, type_string: &str) -> Option<&str> {
        self.resources
            .iter()
            .find(|(_, value)| value.as_str() == type_string)
            .map(|(kind, _)| kind.as_str())
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref outdir) = args.outdir {
            self.general.outdir = Some(outdir.clone());
        }

        if let Some(format) = args.format {
            self.general.report_format = format;
        }

        if let Some(ref url) = args.promql_url {
            self.promql.base_url = url.clone();
        }

        if let Some(timeout) = args.timeout {
            self.promql.timeout_seconds = timeout;
        }

        // Flags always override
        if args.no_auto_prereqs {
            self.general.auto_prerequisites = false;
        }
        if args.no_align {
            self.ingest.align_to_months = false;
        }
        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> Result<String> {
        let config = Config::default();
        toml::to_string_pretty(&config).context("Failed to serialize the default configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.promql.step, 3600);
        assert_eq!(config.summary.top_n, 5);
        assert!(config.ingest.align_to_months);
        assert_eq!(config.kind_for_type_string("nvidia_com_gpu"), Some("gpu"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[general]
outdir = "out"
verbose = true

[promql]
base_url = "http://prom:9090/api/v1/query_range"
step = 600

[promql.queries]
status = "up"
truth = "usage{resource=\"%TYPE_STRING%\"}"

[resources]
cpu = "cpu"

[summary]
namespace_blacklist = ["kube-system"]
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(config.general.outdir, Some(PathBuf::from("out")));
        assert!(config.general.verbose);
        assert_eq!(config.promql.step, 600);
        assert_eq!(config.promql.timeout_seconds, 300);
        assert_eq!(config.resources.len(), 1);
        assert_eq!(config.summary.namespace_blacklist, vec!["kube-system"]);
        assert_eq!(config.plots.cpu_color, "skyblue");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_missing_query() {
        let mut config = Config::default();
        config.promql.queries.remove("status");
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.promql.step = 0;
        assert!(config.validate().is_err());

        let parsed: std::result::Result<Config, _> =
            toml::from_str("[general]\nreport_format = \"xlsx\"\n");
        assert!(parsed.is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        std::fs::write(&path, "[ingest]\nalign_to_months = false\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert!(!config.ingest.align_to_months);
        assert_eq!(config.resources.get("gpu").map(String::as_str), Some("nvidia_com_gpu"));
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml().unwrap();
        assert!(!toml_str.is_empty());
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[promql]"));
        assert!(toml_str.contains("[resources]"));
        let reparsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(reparsed.promql.queries, Config::default().promql.queries);
        assert_eq!(reparsed.general.report_format, ReportFormat::Markdown);
        assert!(toml_str.contains("report_format = \"markdown\""));
    }

    #[test]
    fn test_merge_with_args() {
        use clap::Parser;

        let mut args = crate::cli::Args::parse_from([
            "tidemetrics",
            "all",
            "-p",
            "2024",
            "--format",
            "json",
            "--no-auto-prereqs",
        ]);
        let mut config: Config = toml::from_str("[general]\nverbose = true\n").unwrap();
        config.merge_with_args(&args);
        assert_eq!(config.general.report_format, ReportFormat::Json);
        assert!(!config.general.auto_prerequisites);
        assert!(config.general.verbose);
        assert_eq!(args.log_level(config.general.verbose), tracing::Level::DEBUG);

        args.quiet = true;
        assert_eq!(args.log_level(config.general.verbose), tracing::Level::ERROR);
    }
}
