//! Data source lookup and trial queries

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::client::{GrafanaClient, GrafanaError};

/// Data source record returned by `/api/datasources`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataSource {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub uid: String,
    #[serde(rename = "orgId", default)]
    pub org_id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub access: String,
    #[serde(default)]
    pub url: String,
}

/// Response of `/api/ds/query`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub results: BTreeMap<String, QueryResult>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryResult {
    #[serde(default)]
    pub frames: Vec<Frame>,
    #[serde(default)]
    pub error: String,
    #[serde(rename = "errorSource", default)]
    pub error_source: String,
    #[serde(default)]
    pub status: Option<i64>,
}

impl QueryResult {
    /// Error worth reporting, if any. Cancelled queries and empty messages
    /// are not errors.
    pub fn reportable_error(&self) -> Option<&str> {
        if self.error.is_empty() || self.error_source.eq_ignore_ascii_case("cancelled") {
            return None;
        }
        Some(&self.error)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Frame {
    #[serde(default)]
    pub schema: FrameSchema,
    #[serde(default)]
    pub data: FrameData,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FrameSchema {
    #[serde(default)]
    pub fields: Vec<FrameField>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FrameField {
    #[serde(default)]
    pub name: String,
}

/// Column-major frame values
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FrameData {
    #[serde(default)]
    pub values: Vec<Vec<serde_json::Value>>,
}

impl GrafanaClient {
    pub async fn datasource_by_uid(&self, uid: &str) -> Result<DataSource, GrafanaError> {
        let response = self.get(&["api", "datasources", "uid", uid]).await?;
        if !response.status.is_success() {
            return Err(response.unexpected("getting data source by uid"));
        }
        response.json()
    }

    pub async fn datasource_by_name(&self, name: &str) -> Result<DataSource, GrafanaError> {
        let response = self.get(&["api", "datasources", "name", name]).await?;
        if !response.status.is_success() {
            return Err(response.unexpected("getting data source by name"));
        }
        response.json()
    }

    /// Look a data source up by uid, falling back to its name
    pub async fn resolve_datasource(&self, id: &str) -> Result<DataSource, GrafanaError> {
        match self.datasource_by_uid(id).await {
            Ok(datasource) => Ok(datasource),
            Err(e) => {
                tracing::debug!(datasource = %id, error = %e, "Lookup by uid failed, trying name");
                self.datasource_by_name(id).await
            }
        }
    }

    /// Run queries through `/api/ds/query` and return the raw JSON response
    pub async fn query_datasource(
        &self,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, GrafanaError> {
        let encoded =
            serde_json::to_vec(body).map_err(|e| GrafanaError::Deserialization(e.to_string()))?;
        let response = self.post(&["api", "ds", "query"], encoded).await?;

        if !response.status.is_success() {
            return Err(response.unexpected("querying data source"));
        }
        if response.body.trim().is_empty() {
            return Err(GrafanaError::EmptyBody("api/ds/query".to_string()));
        }
        response.json()
    }
}
