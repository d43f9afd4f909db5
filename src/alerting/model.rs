//! Provisioned alert rule documents

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Datasource uid of Grafana server-side expressions
pub const EXPRESSION_DATASOURCE: &str = "__expr__";

/// Ref id of the condition sub-record every generated rule fires on
pub const CONDITION_REF: &str = "C";

/// Alert rule as accepted by the Grafana provisioning API
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProvisionedAlertRule {
    #[serde(default)]
    pub uid: String,
    #[serde(rename = "orgID", alias = "orgId", default)]
    pub org_id: i64,
    #[serde(rename = "folderUID", alias = "folderUid", default)]
    pub folder_uid: String,
    #[serde(rename = "ruleGroup", default)]
    pub rule_group: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub condition: String,
    #[serde(default)]
    pub data: Vec<AlertQuery>,
    #[serde(rename = "noDataState", default)]
    pub no_data_state: NoDataState,
    #[serde(rename = "execErrState", default)]
    pub exec_err_state: ExecErrState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    /// Keys not managed here (`for`, `isPaused`, ...), kept as-is
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ProvisionedAlertRule {
    /// True when both rules carry the same number of queries with equal models
    pub fn same_queries(&self, other: &ProvisionedAlertRule) -> bool {
        self.data.len() == other.data.len()
            && self
                .data
                .iter()
                .zip(other.data.iter())
                .all(|(a, b)| a.model == b.model)
    }
}

/// One query or expression of an alert rule
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertQuery {
    #[serde(rename = "refId")]
    pub ref_id: String,
    #[serde(rename = "queryType", default)]
    pub query_type: String,
    #[serde(rename = "datasourceUid")]
    pub datasource_uid: String,
    #[serde(rename = "relativeTimeRange", default)]
    pub relative_time_range: RelativeTimeRange,
    /// Datasource specific query model
    pub model: serde_json::Value,
}

/// Evaluation range relative to now. Serialized as integer nanoseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelativeTimeRange {
    #[serde(with = "nanos_serde")]
    pub from: Duration,
    #[serde(with = "nanos_serde")]
    pub to: Duration,
}

impl RelativeTimeRange {
    pub fn new(from: Duration, to: Duration) -> Self {
        Self { from, to }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoDataState {
    #[default]
    #[serde(rename = "OK")]
    Ok,
    NoData,
    Alerting,
    KeepLast,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecErrState {
    #[default]
    #[serde(rename = "OK")]
    Ok,
    Error,
    Alerting,
    KeepLast,
}

/// Identity fields of an alert rule, used to compare local and remote rules
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSummary {
    #[serde(default)]
    pub uid: String,
    #[serde(default)]
    pub title: String,
    #[serde(rename = "folderUID", alias = "folderUid", default)]
    pub folder_uid: String,
    #[serde(rename = "ruleGroup", default)]
    pub rule_group: String,
    #[serde(rename = "orgID", alias = "orgId", default)]
    pub org_id: i64,
}

impl RuleSummary {
    /// Two summaries describe the same provisioned rule
    pub fn same_rule(&self, other: &RuleSummary) -> bool {
        self.uid == other.uid && self.folder_uid == other.folder_uid && self.org_id == other.org_id
    }
}

mod nanos_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let nanos = i64::try_from(duration.as_nanos()).map_err(serde::ser::Error::custom)?;
        serializer.serialize_i64(nanos)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let nanos = i64::deserialize(deserializer)?;
        let nanos = u64::try_from(nanos).map_err(serde::de::Error::custom)?;
        Ok(Duration::from_nanos(nanos))
    }
}
