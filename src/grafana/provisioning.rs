//! Alert rule provisioning endpoints

use reqwest::StatusCode;

use super::client::{GrafanaClient, GrafanaError};
use crate::alerting::RuleSummary;

const ALERT_RULES: [&str; 4] = ["api", "v1", "provisioning", "alert-rules"];

/// Result of POSTing a new alert rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    /// A rule with the same uid already exists
    Conflict,
}

/// Result of PUTting an alert rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated,
    NotFound,
}

/// Result of deleting an alert rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
}

fn rule_path(uid: &str) -> Vec<&str> {
    let mut segments = ALERT_RULES.to_vec();
    segments.push(uid);
    segments
}

fn group_path<'a>(folder_uid: &'a str, group: &'a str) -> [&'a str; 7] {
    [
        "api",
        "v1",
        "provisioning",
        "folder",
        folder_uid,
        "rule-groups",
        group,
    ]
}

impl GrafanaClient {
    /// POST an alert rule document
    pub async fn create_alert_rule(&self, document: &str) -> Result<CreateOutcome, GrafanaError> {
        let response = self.post(&ALERT_RULES, document.as_bytes().to_vec()).await?;
        match response.status {
            StatusCode::CREATED => Ok(CreateOutcome::Created),
            StatusCode::CONFLICT => Ok(CreateOutcome::Conflict),
            _ => Err(response.unexpected("creating alert rule")),
        }
    }

    /// PUT an alert rule document over the rule with `uid`
    pub async fn update_alert_rule(
        &self,
        uid: &str,
        document: &str,
    ) -> Result<UpdateOutcome, GrafanaError> {
        let response = self.put(&rule_path(uid), document.as_bytes().to_vec()).await?;
        match response.status {
            StatusCode::OK => Ok(UpdateOutcome::Updated),
            StatusCode::NOT_FOUND => Ok(UpdateOutcome::NotFound),
            _ => Err(response.unexpected("updating alert rule")),
        }
    }

    pub async fn delete_alert_rule(&self, uid: &str) -> Result<DeleteOutcome, GrafanaError> {
        let response = self.delete(&rule_path(uid)).await?;
        match response.status {
            StatusCode::NO_CONTENT => Ok(DeleteOutcome::Deleted),
            StatusCode::NOT_FOUND => Ok(DeleteOutcome::NotFound),
            _ => Err(response.unexpected("deleting alert rule")),
        }
    }

    pub async fn get_alert_rule(&self, uid: &str) -> Result<RuleSummary, GrafanaError> {
        let response = self.get(&rule_path(uid)).await?;
        if response.status != StatusCode::OK {
            return Err(response.unexpected("getting alert rule"));
        }
        response.json()
    }

    /// Every alert rule visible to the service account
    pub async fn list_alert_rules(&self) -> Result<Vec<RuleSummary>, GrafanaError> {
        let response = self.get(&ALERT_RULES).await?;
        if response.status != StatusCode::OK {
            return Err(response.unexpected("listing alert rules"));
        }
        response.json()
    }

    /// Fetch a rule group as an opaque document
    pub async fn get_rule_group(
        &self,
        folder_uid: &str,
        group: &str,
    ) -> Result<serde_json::Value, GrafanaError> {
        let response = self.get(&group_path(folder_uid, group)).await?;
        if response.status != StatusCode::OK {
            return Err(response.unexpected("getting rule group"));
        }
        response.json()
    }

    /// Replace a rule group, rules included
    pub async fn put_rule_group(
        &self,
        folder_uid: &str,
        group: &str,
        document: &serde_json::Value,
    ) -> Result<(), GrafanaError> {
        let body =
            serde_json::to_vec(document).map_err(|e| GrafanaError::Deserialization(e.to_string()))?;
        let response = self.put(&group_path(folder_uid, group), body).await?;
        if response.status != StatusCode::OK {
            return Err(response.unexpected("updating rule group"));
        }
        Ok(())
    }
}
