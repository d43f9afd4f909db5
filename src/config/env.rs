//! Environment inputs supplied by the CI host

use std::collections::HashMap;

use super::ConfigError;

/// Source of environment variables
pub trait EnvSource {
    fn get(&self, name: &str) -> Option<String>;

    /// Whitespace-separated list, empty entries dropped
    fn list(&self, name: &str) -> Vec<String> {
        self.get(name)
            .map(|value| value.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// Case-insensitive `true`
    fn flag(&self, name: &str) -> bool {
        self.get(name)
            .map(|value| value.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }

    fn required(&self, name: &str) -> Result<String, ConfigError> {
        match self.get(name) {
            Some(value) if !value.trim().is_empty() => Ok(value),
            _ => Err(ConfigError::MissingEnv(name.to_string())),
        }
    }
}

/// The process environment
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn get(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

impl EnvSource for HashMap<String, String> {
    fn get(&self, name: &str) -> Option<String> {
        HashMap::get(self, name).cloned()
    }
}

/// Inputs of the integrator binary
#[derive(Debug, Clone, Default)]
pub struct IntegratorEnv {
    pub config_path: String,
    pub token: String,
    pub changed_files: Vec<String>,
    pub deleted_files: Vec<String>,
    /// Explicit list of artifacts whose queries are tested
    pub test_files: Option<Vec<String>>,
    pub all_rules: bool,
    pub pretty_print: bool,
    pub show_log_lines: bool,
    pub test_queries: bool,
}

impl IntegratorEnv {
    pub const CONFIG_PATH: &'static str = "INTEGRATOR_CONFIG_PATH";
    pub const TOKEN: &'static str = "INTEGRATOR_GRAFANA_SA_TOKEN";

    pub fn from_env(env: &impl EnvSource) -> Result<Self, ConfigError> {
        let test_files = env.list("TEST_FILES");

        Ok(Self {
            config_path: env.required(Self::CONFIG_PATH)?,
            token: env.required(Self::TOKEN)?,
            changed_files: env.list("CHANGED_FILES"),
            deleted_files: env.list("DELETED_FILES"),
            test_files: if test_files.is_empty() {
                None
            } else {
                Some(test_files)
            },
            all_rules: env.flag("ALL_RULES"),
            pretty_print: env.flag("PRETTY_PRINT"),
            show_log_lines: env.flag("SHOW_LOG_LINES"),
            test_queries: env.flag("TEST_QUERIES"),
        })
    }
}

/// Inputs of the deployer binary
#[derive(Debug, Clone, Default)]
pub struct DeployerEnv {
    pub config_path: String,
    pub token: String,
    pub fresh_deploy: bool,
    pub added_files: Vec<String>,
    pub modified_files: Vec<String>,
    pub deleted_files: Vec<String>,
    pub copied_files: Vec<String>,
}

impl DeployerEnv {
    pub const CONFIG_PATH: &'static str = "CONFIG_PATH";
    pub const TOKEN: &'static str = "DEPLOYER_GRAFANA_SA_TOKEN";

    pub fn from_env(env: &impl EnvSource) -> Result<Self, ConfigError> {
        Ok(Self {
            config_path: env.required(Self::CONFIG_PATH)?,
            token: env.required(Self::TOKEN)?,
            fresh_deploy: env.flag("DEPLOYER_FRESH_DEPLOY"),
            added_files: env.list("ADDED_FILES"),
            modified_files: env.list("MODIFIED_FILES"),
            deleted_files: env.list("DELETED_FILES"),
            copied_files: env.list("COPIED_FILES"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_list_and_flag() {
        let vars = env(&[
            ("FILES", " a.json  b.json "),
            ("EMPTY", ""),
            ("ON", "TRUE"),
            ("OFF", "yes"),
        ]);

        assert_eq!(vars.list("FILES"), vec!["a.json", "b.json"]);
        assert!(vars.list("EMPTY").is_empty());
        assert!(vars.list("UNSET").is_empty());
        assert!(vars.flag("ON"));
        assert!(!vars.flag("OFF"));
        assert!(!vars.flag("UNSET"));
    }

    #[test]
    fn test_required_rejects_empty() {
        let vars = env(&[("TOKEN", "  ")]);
        assert!(matches!(vars.required("TOKEN"), Err(ConfigError::MissingEnv(_))));
        assert!(vars.required("UNSET").is_err());
    }

    #[test]
    fn test_deployer_env() {
        let vars = env(&[
            ("CONFIG_PATH", "config.yml"),
            ("DEPLOYER_GRAFANA_SA_TOKEN", "my-test-token"),
            ("DEPLOYER_FRESH_DEPLOY", "True"),
            ("ADDED_FILES", "deployments/a.json"),
            ("COPIED_FILES", "deployments/b.json"),
        ]);

        let inputs = DeployerEnv::from_env(&vars).unwrap();
        assert_eq!(inputs.token, "my-test-token");
        assert!(inputs.fresh_deploy);
        assert_eq!(inputs.added_files, vec!["deployments/a.json"]);
        assert_eq!(inputs.copied_files, vec!["deployments/b.json"]);
        assert!(inputs.modified_files.is_empty());
    }

    #[test]
    fn test_integrator_env_requires_token() {
        let vars = env(&[("INTEGRATOR_CONFIG_PATH", "config.yml")]);
        let err = IntegratorEnv::from_env(&vars).unwrap_err();
        assert!(err.to_string().contains("INTEGRATOR_GRAFANA_SA_TOKEN"));

        let vars = env(&[
            ("INTEGRATOR_CONFIG_PATH", "config.yml"),
            ("INTEGRATOR_GRAFANA_SA_TOKEN", "token"),
            ("CHANGED_FILES", "conversions/a.json"),
            ("ALL_RULES", "false"),
        ]);
        let inputs = IntegratorEnv::from_env(&vars).unwrap();
        assert_eq!(inputs.changed_files, vec!["conversions/a.json"]);
        assert!(inputs.test_files.is_none());
        assert!(!inputs.all_rules);
    }
}
