//! Integration of converter output into alert rule documents

mod artifact;
mod identity;
mod integrator;
mod query_model;
mod template;

pub use artifact::{input_stem, ConversionArtifact, DetectionRule};
pub use identity::{alert_title, conversion_uuid, murmur3_32, rule_uid, MAX_TITLE_CHARS};
pub use integrator::{ArtifactOutcome, ChangeSet, IntegrationReport, Integrator, IntegratorOptions};
pub use query_model::{
    alert_model, datasource_query, explore_link, format_template, reducer_model, threshold_model,
    wrap_log_query,
};
pub use query_test::{process_frame, QueryStats, QueryTestResult, QueryTester};
pub use template::{render, render_all};

use crate::alerting::AlertFileError;
use crate::config::ConfigError;
use crate::grafana::GrafanaError;
use crate::outputs::OutputError;
use crate::workspace::WorkspaceError;

#[derive(Debug, thiserror::Error)]
pub enum IntegrateError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    #[error(transparent)]
    AlertFile(#[from] AlertFileError),

    #[error("Grafana error: {0}")]
    Grafana(#[from] GrafanaError),

    #[error("Output error: {0}")]
    Output(#[from] OutputError),

    #[error("Error parsing conversion output {0}: {1}")]
    InvalidArtifact(String, String),

    #[error("No conversion named {name:?} in config, referenced by {path}")]
    UnknownConversion { name: String, path: String },

    #[error("Conversion {0} has no data source")]
    MissingDatasource(String),

    #[error("Conversion output contains no rules")]
    NoRules,

    #[error("Invalid rule id {0:?}: {1}")]
    InvalidRuleId(String, String),

    #[error("Rule {rule:?} is missing required field {field:?}")]
    MissingRuleField { rule: String, field: String },

    #[error("Query model error: {0}")]
    QueryModel(String),

    #[error("Unsupported template {0:?}, only field references like {{{{.Level}}}} are allowed")]
    Template(String),

    #[error("unsupported datasource type: {0}")]
    UnsupportedDatasource(String),

    #[error("Invalid file pattern: {0}")]
    Glob(String),
}
