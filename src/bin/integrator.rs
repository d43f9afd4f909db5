//! Integrator CI step
//!
//! Turns converter output into alert rule documents under the deployment
//! folder.
//!
//! Environment variables:
//! - INTEGRATOR_CONFIG_PATH: Workspace-relative path of the config file
//! - INTEGRATOR_GRAFANA_SA_TOKEN: Service account token, used when testing queries
//! - CHANGED_FILES / DELETED_FILES: Space-separated paths from the CI host
//! - ALL_RULES: Integrate every artifact in the conversion folder
//! - PRETTY_PRINT: Indent the written documents
//! - TEST_QUERIES / TEST_FILES / SHOW_LOG_LINES: Query testing controls
//! - GITHUB_OUTPUT: File receiving `rules_integrated` and `test_query_results`
//! - RUST_LOG: Log filter (default: info)

use std::path::PathBuf;
use std::process::ExitCode;

use sigma_deploy::config::{Config, IntegratorEnv, ProcessEnv};
use sigma_deploy::grafana::GrafanaClient;
use sigma_deploy::integrate::{IntegrateError, Integrator, IntegratorOptions};
use sigma_deploy::outputs::OutputWriter;
use sigma_deploy::workspace::Workspace;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

async fn run() -> Result<(), IntegrateError> {
    let env = IntegratorEnv::from_env(&ProcessEnv)?;
    let workspace = Workspace::current()?;
    let config = Config::load(&workspace, &env.config_path)?;
    let outputs = OutputWriter::from_env()?;
    let client = GrafanaClient::new(&config.grafana_url, &env.token, config.timeout)?;

    let options = IntegratorOptions {
        pretty_print: env.pretty_print,
        show_log_lines: env.show_log_lines,
        test_queries: env.test_queries,
        test_files: env
            .test_files
            .map(|files| files.into_iter().map(PathBuf::from).collect()),
    };
    let integrator = Integrator::new(&config, &workspace, options);
    let changes = integrator.select_changes(&env.changed_files, &env.deleted_files, env.all_rules)?;
    tracing::info!(
        changed = changes.changed.len(),
        deleted = changes.deleted.len(),
        all_rules = env.all_rules,
        "Integrating conversion output"
    );

    let report = integrator.run(&changes, &client).await?;
    outputs.set("rules_integrated", &report.rules_integrated())?;
    if let Some(results) = report.test_query_results()? {
        outputs.set("test_query_results", &results)?;
    }
    Ok(())
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

    let result = tokio::select! {
        result = run() => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupted, stopping integration");
            return ExitCode::FAILURE;
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Integration failed");
            ExitCode::FAILURE
        }
    }
}
