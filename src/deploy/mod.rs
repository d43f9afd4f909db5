//! Deployment of alert rule documents to Grafana

mod deployer;
mod plan;

pub use deployer::{Deployer, DeploymentOutcome};
pub use plan::DeploymentPlan;

use crate::alerting::AlertFileError;
use crate::config::ConfigError;
use crate::grafana::GrafanaError;
use crate::outputs::OutputError;
use crate::workspace::WorkspaceError;

#[derive(Debug, thiserror::Error)]
pub enum DeployError {
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

    #[error("Could not extract alert uid from file name {0}")]
    InvalidFileName(String),

    #[error("Conflict: alert rule {uid} ({title}) already exists in folder {folder_uid} of org {org_id}")]
    Conflict {
        uid: String,
        title: String,
        folder_uid: String,
        org_id: i64,
    },

    #[error("Alert rule {0} reported as existing but could not be updated")]
    Vanished(String),

    #[error("No integration folder_id configured, a fresh deployment needs a target folder")]
    MissingFolder,

    #[error("Rule group {0} is not a JSON object")]
    InvalidRuleGroup(String),
}
