//! Analysis modules.
//!
//! Analyses are registered by name in an [`AnalysisRegistry`], ordered by
//! their prerequisites with [`resolve`] and run against the repository in
//! two passes by [`run_stage`]: analyses first, then visualizations.

pub mod aggregate;
pub mod builtin;
pub mod descriptor;
pub mod driver;
pub mod implementations;
pub mod meta;
pub mod registry;
pub mod resolver;

pub use descriptor::{Analysis, AnalysisKind};
pub use driver::{run_analysis, run_stage, Outcome, Stage};
pub use registry::AnalysisRegistry;
pub use resolver::{resolve, ExecutionPlan};
