//! sigma-deploy: Sigma rule alerts for Grafana
//!
//! Two CI steps built on one library:
//!
//! - **integrator**: reads the JSON artifacts produced by the Sigma converter
//!   and writes one Grafana provisioning alert rule document per artifact,
//!   optionally running each query against its data source
//! - **deployer**: pushes added, modified and deleted alert rule documents to
//!   the Grafana provisioning API and keeps rule group intervals in line with
//!   the configuration
//!
//! # Example
//!
//! ```no_run
//! use sigma_deploy::config::Config;
//! use sigma_deploy::integrate::{Integrator, IntegratorOptions};
//! use sigma_deploy::workspace::Workspace;
//! use std::path::Path;
//!
//! let workspace = Workspace::current().unwrap();
//! let config = Config::load(&workspace, "config/config.yml").unwrap();
//! let integrator = Integrator::new(&config, &workspace, IntegratorOptions::default());
//! integrator
//!     .integrate_artifact(Path::new("conversions/loki_okta_new_admin.json"))
//!     .unwrap();
//! ```

pub mod alerting;
pub mod config;
pub mod deploy;
pub mod grafana;
pub mod integrate;
pub mod outputs;
pub mod workspace;

pub use alerting::{ProvisionedAlertRule, RuleSummary};
pub use config::{Config, ConfigError};
pub use deploy::{DeployError, Deployer, DeploymentOutcome, DeploymentPlan};
pub use grafana::{GrafanaClient, GrafanaError};
pub use integrate::{IntegrateError, Integrator, IntegratorOptions};
pub use outputs::OutputWriter;
pub use workspace::Workspace;
