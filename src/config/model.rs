//! Configuration document types
//!
//! Mirrors the YAML configuration file. Keys only used by the external
//! converter (`format`, `pipelines`, `file_pattern`, ...) are ignored.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const LOKI: &str = "loki";
pub const ELASTICSEARCH: &str = "elasticsearch";

/// Time window applied when neither the conversion nor the defaults set one
pub const DEFAULT_TIME_WINDOW: &str = "5m";

/// Top-level configuration document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigDocument {
    pub folders: FoldersConfig,
    pub conversion_defaults: ConversionConfig,
    pub conversions: Vec<ConversionConfig>,
    pub integration: IntegrationConfig,
    pub deployment: DeploymentConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FoldersConfig {
    /// Converter output, read by the integrator
    pub conversion_path: String,
    /// Alert rule documents, written by the integrator and read by the deployer
    pub deployment_path: String,
}

/// One conversion entry. Empty fields inherit from `conversion_defaults`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    pub name: String,
    /// Target query language of the converter
    pub target: String,
    /// Data source uid (or name) the queries run against
    pub data_source: String,
    /// Overrides `target` when choosing the query model
    pub data_source_type: String,
    /// Template with three `%s` slots: ref id, data source uid, escaped query
    pub query_model: String,
    pub rule_group: String,
    pub time_window: String,
    pub lookback: String,
    pub required_rule_fields: Vec<String>,
}

impl ConversionConfig {
    /// Fill every empty field from `defaults`
    pub fn merged_with(&self, defaults: &ConversionConfig) -> ConversionConfig {
        fn pick(value: &str, default: &str) -> String {
            if value.is_empty() {
                default.to_string()
            } else {
                value.to_string()
            }
        }

        let mut time_window = pick(&self.time_window, &defaults.time_window);
        if time_window.is_empty() {
            time_window = DEFAULT_TIME_WINDOW.to_string();
        }

        ConversionConfig {
            name: self.name.clone(),
            target: pick(&self.target, &defaults.target),
            data_source: pick(&self.data_source, &defaults.data_source),
            data_source_type: pick(&self.data_source_type, &defaults.data_source_type),
            query_model: pick(&self.query_model, &defaults.query_model),
            rule_group: pick(&self.rule_group, &defaults.rule_group),
            time_window,
            lookback: pick(&self.lookback, &defaults.lookback),
            required_rule_fields: if self.required_rule_fields.is_empty() {
                defaults.required_rule_fields.clone()
            } else {
                self.required_rule_fields.clone()
            },
        }
    }

    /// Data source type used to pick a query model
    pub fn datasource_type(&self) -> &str {
        if self.data_source_type.is_empty() {
            &self.target
        } else {
            &self.data_source_type
        }
    }

    pub fn has_custom_model(&self) -> bool {
        !self.query_model.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrationConfig {
    /// Alerting folder uid rules are provisioned into
    pub folder_id: String,
    pub org_id: i64,
    pub test_queries: bool,
    /// Query test window start, e.g. `now-1h`
    pub from: String,
    /// Query test window end, e.g. `now`
    pub to: String,
    pub show_log_lines: bool,
    pub show_sample_values: bool,
    pub continue_on_query_testing_errors: bool,
    /// Labels added to every rule, values rendered against the detection rule
    pub template_labels: BTreeMap<String, String>,
    /// Annotations added to every rule, rendered like the labels
    pub template_annotations: BTreeMap<String, String>,
    /// Render templates for every rule of an artifact instead of the first
    pub template_all_rules: bool,
}

impl Default for IntegrationConfig {
    fn default() -> Self {
        Self {
            folder_id: String::new(),
            org_id: 1,
            test_queries: false,
            from: "now-1h".to_string(),
            to: "now".to_string(),
            show_log_lines: false,
            show_sample_values: false,
            continue_on_query_testing_errors: false,
            template_labels: BTreeMap::new(),
            template_annotations: BTreeMap::new(),
            template_all_rules: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploymentConfig {
    /// Base URL of the Grafana instance
    pub grafana_instance: String,
    /// Per-request timeout, e.g. `10s`
    pub timeout: String,
}
