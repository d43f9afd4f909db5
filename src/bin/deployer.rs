//! Deployer CI step
//!
//! Pushes alert rule documents from the deployment folder to Grafana.
//!
//! Environment variables:
//! - CONFIG_PATH: Workspace-relative path of the config file
//! - DEPLOYER_GRAFANA_SA_TOKEN: Service account token
//! - ADDED_FILES / MODIFIED_FILES / DELETED_FILES / COPIED_FILES:
//!   Space-separated paths from the CI host
//! - DEPLOYER_FRESH_DEPLOY: Replace every rule in the configured folder
//! - GITHUB_OUTPUT: File receiving `alerts_created`, `alerts_updated` and
//!   `alerts_deleted`, written even when the deployment fails
//! - RUST_LOG: Log filter (default: info)

use std::process::ExitCode;

use sigma_deploy::config::{Config, DeployerEnv, ProcessEnv};
use sigma_deploy::deploy::{DeployError, Deployer, DeploymentOutcome, DeploymentPlan};
use sigma_deploy::grafana::GrafanaClient;
use sigma_deploy::outputs::OutputWriter;
use sigma_deploy::workspace::Workspace;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

async fn run(outcome: &mut DeploymentOutcome) -> Result<(), DeployError> {
    let env = DeployerEnv::from_env(&ProcessEnv)?;
    let workspace = Workspace::current()?;
    let config = Config::load(&workspace, &env.config_path)?;
    let client = GrafanaClient::new(&config.grafana_url, &env.token, config.timeout)?;

    let plan = if env.fresh_deploy {
        DeploymentPlan::fresh(&workspace, &client, &config).await?
    } else {
        DeploymentPlan::from_changes(
            &config.folders.deployment_path,
            &env.added_files,
            &env.modified_files,
            &env.deleted_files,
            &env.copied_files,
        )
    };
    if plan.is_empty() {
        tracing::info!("No alert rule changes to deploy");
    }

    Deployer::new(&config, &workspace, &client)
        .deploy(&plan, outcome)
        .await
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sigma_deploy=info,integrator=info,deployer=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let outputs = match OutputWriter::from_env() {
        Ok(outputs) => outputs,
        Err(e) => {
            tracing::error!(error = %e, "Deployment failed");
            return ExitCode::FAILURE;
        }
    };

    let mut outcome = DeploymentOutcome::default();
    let result = tokio::select! {
        result = run(&mut outcome) => Some(result),
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupted, stopping deployment");
            None
        }
    };

    let mut failed = false;
    if let Err(e) = outcome.write_outputs(&outputs) {
        tracing::error!(error = %e, "Failed to write step outputs");
        failed = true;
    }
    tracing::info!(
        created = outcome.created.len(),
        updated = outcome.updated.len(),
        deleted = outcome.deleted.len(),
        "Deployment summary"
    );

    match result {
        Some(Ok(())) => {}
        Some(Err(e)) => {
            tracing::error!(error = %e, "Deployment failed");
            failed = true;
        }
        None => failed = true,
    }
    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
