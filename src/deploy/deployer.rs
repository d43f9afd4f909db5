//! Pushes alert rule documents to Grafana
//!
//! Deletions run first, then creations, then updates, so a rule recreated
//! under a new uid never collides with its old title. Rule groups touched by
//! a create or update in the configured folder get their evaluation interval
//! reconciled last.

use std::collections::BTreeSet;
use std::path::Path;

use super::plan::DeploymentPlan;
use super::DeployError;
use crate::alerting::{parse_summary, uid_from_file_name, RuleSummary};
use crate::config::Config;
use crate::grafana::{CreateOutcome, DeleteOutcome, GrafanaClient, UpdateOutcome};
use crate::outputs::{OutputError, OutputWriter};
use crate::workspace::Workspace;

/// Rule uids per result. A uid is only ever in one list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeploymentOutcome {
    pub created: Vec<String>,
    pub updated: Vec<String>,
    pub deleted: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Created,
    Updated,
    Deleted,
}

impl DeploymentOutcome {
    fn record(&mut self, uid: &str, action: Action) {
        for list in [&mut self.created, &mut self.updated, &mut self.deleted] {
            list.retain(|existing| existing != uid);
        }
        let list = match action {
            Action::Created => &mut self.created,
            Action::Updated => &mut self.updated,
            Action::Deleted => &mut self.deleted,
        };
        list.push(uid.to_string());
    }

    /// Write `alerts_created`, `alerts_updated` and `alerts_deleted`
    pub fn write_outputs(&self, writer: &OutputWriter) -> Result<(), OutputError> {
        writer.set("alerts_created", &self.created.join(" "))?;
        writer.set("alerts_updated", &self.updated.join(" "))?;
        writer.set("alerts_deleted", &self.deleted.join(" "))
    }
}

pub struct Deployer<'a> {
    config: &'a Config,
    workspace: &'a Workspace,
    client: &'a GrafanaClient,
    /// Groups of the rules created or updated in the configured folder
    groups: BTreeSet<String>,
}

impl<'a> Deployer<'a> {
    pub fn new(config: &'a Config, workspace: &'a Workspace, client: &'a GrafanaClient) -> Self {
        Self {
            config,
            workspace,
            client,
            groups: BTreeSet::new(),
        }
    }

    /// Execute `plan`, recording every change in `outcome` as it happens so
    /// partial progress is reported on failure
    pub async fn deploy(
        &mut self,
        plan: &DeploymentPlan,
        outcome: &mut DeploymentOutcome,
    ) -> Result<(), DeployError> {
        tracing::info!(
            delete = plan.delete.len(),
            add = plan.add.len(),
            update = plan.update.len(),
            "Deploying alert rules"
        );

        for path in &plan.delete {
            self.delete_rule(path, outcome).await?;
        }
        for path in &plan.add {
            let (summary, document) = self.read_document(path)?;
            self.create_rule(&summary, &document, outcome).await?;
        }
        for path in &plan.update {
            let (summary, document) = self.read_document(path)?;
            self.update_rule(&summary, &document, outcome).await?;
        }
        self.sync_group_intervals().await
    }

    fn read_document(&self, path: &Path) -> Result<(RuleSummary, String), DeployError> {
        let document = self.workspace.read_to_string(path)?;
        let summary = parse_summary(path, &document)?;
        Ok((summary, document))
    }

    async fn delete_rule(
        &self,
        path: &Path,
        outcome: &mut DeploymentOutcome,
    ) -> Result<(), DeployError> {
        let uid = uid_from_file_name(path)
            .ok_or_else(|| DeployError::InvalidFileName(path.display().to_string()))?;

        match self.client.delete_alert_rule(&uid).await? {
            DeleteOutcome::Deleted => {
                tracing::info!(uid = %uid, "Deleted alert rule");
                outcome.record(&uid, Action::Deleted);
            }
            DeleteOutcome::NotFound => {
                tracing::info!(uid = %uid, "Alert rule already absent");
            }
        }
        Ok(())
    }

    /// Create a rule. A conflict with a rule carrying the same identity turns
    /// into an update.
    async fn create_rule(
        &mut self,
        summary: &RuleSummary,
        document: &str,
        outcome: &mut DeploymentOutcome,
    ) -> Result<(), DeployError> {
        match self.client.create_alert_rule(document).await? {
            CreateOutcome::Created => {
                tracing::info!(uid = %summary.uid, title = %summary.title, "Created alert rule");
                self.record(summary, Action::Created, outcome);
                Ok(())
            }
            CreateOutcome::Conflict => {
                let remote = self.client.get_alert_rule(&summary.uid).await?;
                if !remote.same_rule(summary) {
                    return Err(DeployError::Conflict {
                        uid: summary.uid.clone(),
                        title: summary.title.clone(),
                        folder_uid: remote.folder_uid,
                        org_id: remote.org_id,
                    });
                }

                tracing::info!(uid = %summary.uid, "Alert rule already exists, updating instead");
                match self.client.update_alert_rule(&summary.uid, document).await? {
                    UpdateOutcome::Updated => {
                        self.record(summary, Action::Updated, outcome);
                        Ok(())
                    }
                    UpdateOutcome::NotFound => Err(DeployError::Vanished(summary.uid.clone())),
                }
            }
        }
    }

    /// Update a rule, creating it when it is missing remotely
    async fn update_rule(
        &mut self,
        summary: &RuleSummary,
        document: &str,
        outcome: &mut DeploymentOutcome,
    ) -> Result<(), DeployError> {
        match self.client.update_alert_rule(&summary.uid, document).await? {
            UpdateOutcome::Updated => {
                tracing::info!(uid = %summary.uid, title = %summary.title, "Updated alert rule");
                self.record(summary, Action::Updated, outcome);
                Ok(())
            }
            UpdateOutcome::NotFound => {
                tracing::info!(uid = %summary.uid, "Alert rule missing remotely, creating it");
                match self.client.create_alert_rule(document).await? {
                    CreateOutcome::Created => {
                        self.record(summary, Action::Created, outcome);
                        Ok(())
                    }
                    CreateOutcome::Conflict => Err(DeployError::Conflict {
                        uid: summary.uid.clone(),
                        title: summary.title.clone(),
                        folder_uid: summary.folder_uid.clone(),
                        org_id: summary.org_id,
                    }),
                }
            }
        }
    }

    fn record(&mut self, summary: &RuleSummary, action: Action, outcome: &mut DeploymentOutcome) {
        outcome.record(&summary.uid, action);
        if summary.rule_group.is_empty() {
            return;
        }
        if summary.folder_uid != self.config.integration.folder_id {
            tracing::warn!(
                uid = %summary.uid,
                folder = %summary.folder_uid,
                configured = %self.config.integration.folder_id,
                "Alert rule is outside the configured folder, not syncing its group interval"
            );
            return;
        }
        self.groups.insert(summary.rule_group.clone());
    }

    /// Bring the interval of every touched rule group to its configured value.
    /// The group is written back whole, so a rule added to it concurrently
    /// between the GET and the PUT is lost.
    async fn sync_group_intervals(&self) -> Result<(), DeployError> {
        let folder_uid = self.config.integration.folder_id.as_str();
        if folder_uid.is_empty() {
            if !self.groups.is_empty() {
                tracing::warn!("No folder configured, leaving rule group intervals as they are");
            }
            return Ok(());
        }

        for group in &self.groups {
            let interval = match self.config.group_interval(group) {
                Some(interval) => interval,
                None => {
                    tracing::warn!(group = %group, "No interval configured for rule group, leaving it as is");
                    continue;
                }
            };

            let mut document = self.client.get_rule_group(folder_uid, group).await?;
            let current = document.get("interval").and_then(|v| v.as_u64());
            if current == Some(interval) {
                tracing::debug!(group = %group, interval, "Rule group interval up to date");
                continue;
            }

            match document.as_object_mut() {
                Some(fields) => {
                    fields.insert("interval".to_string(), interval.into());
                }
                None => return Err(DeployError::InvalidRuleGroup(group.clone())),
            }
            self.client.put_rule_group(folder_uid, group, &document).await?;
            tracing::info!(
                group = %group,
                from = ?current,
                to = interval,
                "Updated rule group interval"
            );
        }
        Ok(())
    }
}
