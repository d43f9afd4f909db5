//! Which alert rule documents to delete, create and update

use std::path::{Path, PathBuf};

use super::DeployError;
use crate::alerting::placeholder_file_name;
use crate::config::Config;
use crate::grafana::GrafanaClient;
use crate::workspace::{clean, is_direct_child, Workspace};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeploymentPlan {
    pub add: Vec<PathBuf>,
    pub update: Vec<PathBuf>,
    pub delete: Vec<PathBuf>,
}

fn is_document(path: &Path) -> bool {
    path.extension().map(|e| e == "json").unwrap_or(false)
}

/// Keep JSON documents directly inside `folder` that are not in `taken`,
/// without duplicates
fn select(folder: &str, lists: &[&[String]], taken: &[&[PathBuf]]) -> Vec<PathBuf> {
    let mut selected: Vec<PathBuf> = Vec::new();
    for path in lists.iter().flat_map(|list| list.iter()) {
        let path = Path::new(path);
        if !is_direct_child(path, folder) || !is_document(path) {
            tracing::debug!(path = %path.display(), "Ignoring file outside the deployment folder");
            continue;
        }
        let path = clean(path);
        if taken.iter().any(|list| list.contains(&path)) {
            tracing::debug!(path = %path.display(), "Already planned by an earlier step");
            continue;
        }
        if !selected.contains(&path) {
            selected.push(path);
        }
    }
    selected
}

impl DeploymentPlan {
    /// Plan from the CI change lists. Copies are treated as additions.
    ///
    /// A document lands in exactly one list. Deletion wins over addition,
    /// which wins over modification.
    pub fn from_changes(
        deployment_folder: &str,
        added: &[String],
        modified: &[String],
        deleted: &[String],
        copied: &[String],
    ) -> Self {
        let delete = select(deployment_folder, &[deleted], &[]);
        let add = select(deployment_folder, &[added, copied], &[delete.as_slice()]);
        let update = select(deployment_folder, &[modified], &[delete.as_slice(), add.as_slice()]);
        Self { add, update, delete }
    }

    /// Plan that replaces every rule in the configured folder with the local
    /// documents
    pub async fn fresh(
        workspace: &Workspace,
        client: &GrafanaClient,
        config: &Config,
    ) -> Result<Self, DeployError> {
        let integration = &config.integration;
        if integration.folder_id.is_empty() {
            return Err(DeployError::MissingFolder);
        }

        let folder = &config.folders.deployment_path;
        let add = workspace
            .list_files(folder)?
            .into_iter()
            .filter(|path| is_document(path))
            .collect();

        let delete = client
            .list_alert_rules()
            .await?
            .into_iter()
            .filter(|rule| rule.folder_uid == integration.folder_id && rule.org_id == integration.org_id)
            .map(|rule| clean(folder).join(placeholder_file_name(&rule.uid)))
            .collect::<Vec<_>>();

        tracing::info!(
            folder = %integration.folder_id,
            remote_rules = delete.len(),
            "Planned fresh deployment"
        );
        Ok(Self {
            add,
            update: Vec::new(),
            delete,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.update.is_empty() && self.delete.is_empty()
    }
}
