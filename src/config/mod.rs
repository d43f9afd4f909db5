//! Configuration loading and normalisation

mod env;
mod model;

pub use env::{DeployerEnv, EnvSource, IntegratorEnv, ProcessEnv};
pub use model::{
    ConfigDocument, ConversionConfig, DeploymentConfig, FoldersConfig, IntegrationConfig,
    DEFAULT_TIME_WINDOW, ELASTICSEARCH, LOKI,
};

use std::collections::HashMap;
use std::time::Duration;

use crate::workspace::{is_local, Workspace, WorkspaceError};

/// Request timeout used when the configured one is missing or invalid
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Parse a human-readable duration such as `5m` or `1h30m`
pub fn parse_duration(value: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(value.trim())
        .map_err(|e| ConfigError::InvalidDuration(value.to_string(), e.to_string()))
}

/// Loaded and normalised configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub folders: FoldersConfig,
    /// Conversion entries with defaults applied
    pub conversions: Vec<ConversionConfig>,
    pub integration: IntegrationConfig,
    /// Grafana base URL, always ending in `/`
    pub grafana_url: String,
    pub timeout: Duration,
    /// Rule group name to evaluation interval in seconds
    pub group_intervals: HashMap<String, u64>,
}

impl Config {
    /// Read and normalise the configuration file at a workspace-relative path
    pub fn load(workspace: &Workspace, path: &str) -> Result<Self, ConfigError> {
        if path.is_empty() {
            return Err(ConfigError::MissingPath);
        }
        let contents = workspace.read_to_string(path)?;
        let config = Self::from_yaml(&contents)?;

        tracing::info!(
            path = %path,
            conversions = config.conversions.len(),
            groups = config.group_intervals.len(),
            "Loaded configuration"
        );
        Ok(config)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let document: ConfigDocument =
            serde_yaml::from_str(yaml).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Self::from_document(document)
    }

    pub fn from_document(document: ConfigDocument) -> Result<Self, ConfigError> {
        for (label, folder) in [
            ("conversion", &document.folders.conversion_path),
            ("deployment", &document.folders.deployment_path),
        ] {
            if !is_local(folder) {
                return Err(ConfigError::NonLocalFolder(label, folder.clone()));
            }
        }

        let mut grafana_url = document.deployment.grafana_instance.clone();
        if !grafana_url.ends_with('/') {
            grafana_url.push('/');
        }

        let timeout = match document.deployment.timeout.as_str() {
            "" => DEFAULT_TIMEOUT,
            raw => parse_duration(raw).unwrap_or_else(|e| {
                tracing::warn!(timeout = %raw, error = %e, "Invalid timeout, using default");
                DEFAULT_TIMEOUT
            }),
        };

        let conversions: Vec<ConversionConfig> = document
            .conversions
            .iter()
            .map(|c| c.merged_with(&document.conversion_defaults))
            .collect();

        let mut group_intervals = HashMap::new();
        for conversion in &conversions {
            let seconds = parse_duration(&conversion.time_window)?.as_secs();
            if seconds == 0 {
                return Err(ConfigError::InvalidDuration(
                    conversion.time_window.clone(),
                    "time window must be at least one second".to_string(),
                ));
            }
            if !conversion.lookback.is_empty() {
                parse_duration(&conversion.lookback)?;
            }

            match group_intervals.get(&conversion.rule_group) {
                None => {
                    tracing::debug!(
                        group = %conversion.rule_group,
                        interval = seconds,
                        "Setting rule group interval"
                    );
                    group_intervals.insert(conversion.rule_group.clone(), seconds);
                }
                Some(&existing) if existing != seconds => {
                    return Err(ConfigError::GroupIntervalMismatch(
                        conversion.rule_group.clone(),
                    ));
                }
                Some(_) => {}
            }
        }

        Ok(Self {
            folders: document.folders,
            conversions,
            integration: document.integration,
            grafana_url,
            timeout,
            group_intervals,
        })
    }

    /// Conversion entry by name
    pub fn conversion(&self, name: &str) -> Option<&ConversionConfig> {
        self.conversions.iter().find(|c| c.name == name)
    }

    pub fn group_interval(&self, group: &str) -> Option<u64> {
        self.group_intervals.get(group).copied()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config file path is not set or empty")]
    MissingPath,

    #[error("Environment variable {0} is not set or empty")]
    MissingEnv(String),

    #[error("Error reading config file: {0}")]
    Read(#[from] WorkspaceError),

    #[error("Error parsing config file: {0}")]
    Parse(String),

    #[error("The {0} folder {1:?} is not local to the workspace")]
    NonLocalFolder(&'static str, String),

    #[error("Invalid duration {0:?}: {1}")]
    InvalidDuration(String, String),

    #[error("Time window for rule group {0} is different between conversion configs")]
    GroupIntervalMismatch(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const CONFIG: &str = r#"
folders:
  conversion_path: ./conversions
  deployment_path: ./deployments
conversion_defaults:
  target: loki
  data_source: grafanacloud-logs
  time_window: 1m
conversions:
  - name: conv1
    rule_group: Every 5 Minutes
    time_window: 5m
  - name: conv2
    rule_group: Every 5 Minutes
    time_window: 300s
  - name: conv3
    rule_group: Every Minute
integration:
  folder_id: XXXX
  org_id: 1
deployment:
  grafana_instance: https://example.grafana.net
  timeout: 5s
"#;

    #[test]
    fn test_normalises_document() {
        let config = Config::from_yaml(CONFIG).unwrap();

        assert_eq!(config.grafana_url, "https://example.grafana.net/");
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.group_interval("Every 5 Minutes"), Some(300));
        assert_eq!(config.group_interval("Every Minute"), Some(60));
        assert_eq!(config.conversion("conv3").unwrap().data_source, "grafanacloud-logs");
        assert!(config.conversion("missing").is_none());
    }

    #[test]
    fn test_conflicting_group_intervals() {
        let yaml = CONFIG.replace("time_window: 300s", "time_window: 10m");
        let err = Config::from_yaml(&yaml).unwrap_err();
        assert!(matches!(err, ConfigError::GroupIntervalMismatch(group) if group == "Every 5 Minutes"));
    }

    #[test]
    fn test_invalid_timeout_falls_back() {
        let yaml = CONFIG.replace("timeout: 5s", "timeout: soon");
        let config = Config::from_yaml(&yaml).unwrap();
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
    }

    #[test]
    fn test_default_time_window() {
        let yaml = CONFIG.replace("  time_window: 1m\n", "");
        let config = Config::from_yaml(&yaml).unwrap();
        assert_eq!(config.group_interval("Every Minute"), Some(300));
    }

    #[test]
    fn test_rejects_non_local_folders() {
        let yaml = CONFIG.replace("./deployments", "../deployments");
        assert!(matches!(
            Config::from_yaml(&yaml),
            Err(ConfigError::NonLocalFolder("deployment", _))
        ));

        let yaml = CONFIG.replace("./conversions", "/tmp/conversions");
        assert!(matches!(
            Config::from_yaml(&yaml),
            Err(ConfigError::NonLocalFolder("conversion", _))
        ));
    }

    #[test]
    fn test_invalid_time_window() {
        let yaml = CONFIG.replace("time_window: 5m", "time_window: whenever");
        assert!(matches!(
            Config::from_yaml(&yaml),
            Err(ConfigError::InvalidDuration(..))
        ));
    }

    #[test]
    fn test_load_from_workspace() {
        let temp_dir = TempDir::new().unwrap();
        let workspace = Workspace::new(temp_dir.path());
        workspace.write("config.yml", CONFIG.as_bytes()).unwrap();

        let config = Config::load(&workspace, "config.yml").unwrap();
        assert_eq!(config.integration.folder_id, "XXXX");

        assert!(matches!(Config::load(&workspace, ""), Err(ConfigError::MissingPath)));
        assert!(matches!(
            Config::load(&workspace, "../config.yml"),
            Err(ConfigError::Read(WorkspaceError::NonLocal(_)))
        ));
        assert!(Config::load(&workspace, "missing.yml").is_err());
    }
}
