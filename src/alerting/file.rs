//! Alert rule files in the deployment folder
//!
//! Files are named `alert_rule_<conversion>_<input>_<uid>.json`; the rule uid
//! is recovered from the last `_`-separated segment.

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

use super::model::{ProvisionedAlertRule, RuleSummary};
use crate::workspace::{Workspace, WorkspaceError};

static FILE_NAME_UID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"alert_rule_(?:.*)_([^\.]+)\.json").expect("valid regex"));

/// File name of the alert rule generated from `input_stem` by `conversion`
pub fn deployment_file_name(conversion: &str, input_stem: &str, uid: &str) -> String {
    format!("alert_rule_{}_{}_{}.json", conversion, input_stem, uid)
}

/// File name used for rules that only exist on the remote side
pub fn placeholder_file_name(uid: &str) -> String {
    format!("alert_rule_conversion_{}.json", uid)
}

/// Rule uid encoded in an alert rule file name
pub fn uid_from_file_name(path: impl AsRef<Path>) -> Option<String> {
    let name = path.as_ref().file_name()?.to_str()?;
    FILE_NAME_UID
        .captures(name)
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str().to_string())
}

/// Read and parse an alert rule file
pub fn read_rule(
    workspace: &Workspace,
    path: impl AsRef<Path>,
) -> Result<ProvisionedAlertRule, AlertFileError> {
    let path = path.as_ref();
    let contents = workspace.read_to_string(path)?;
    serde_json::from_str(&contents).map_err(|e| AlertFileError::Parse(path.to_path_buf(), e))
}

/// Serialize `rule` to `path`, replacing any previous contents
pub fn write_rule(
    workspace: &Workspace,
    path: impl AsRef<Path>,
    rule: &ProvisionedAlertRule,
    pretty: bool,
) -> Result<(), AlertFileError> {
    let path = path.as_ref();
    let encoded = if pretty {
        serde_json::to_vec_pretty(rule)
    } else {
        serde_json::to_vec(rule)
    }
    .map_err(|e| AlertFileError::Serialize(path.to_path_buf(), e))?;

    workspace.write(path, &encoded)?;
    Ok(())
}

/// Parse the identity fields of an alert rule document, rejecting anything
/// that is not an alert rule
pub fn parse_summary(path: &Path, contents: &str) -> Result<RuleSummary, AlertFileError> {
    let summary: RuleSummary = serde_json::from_str(contents)
        .map_err(|e| AlertFileError::Parse(path.to_path_buf(), e))?;

    if summary.uid.is_empty() || summary.title.is_empty() || summary.folder_uid.is_empty() {
        return Err(AlertFileError::Invalid(path.to_path_buf()));
    }
    Ok(summary)
}

#[derive(Debug, thiserror::Error)]
pub enum AlertFileError {
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    #[error("Error parsing alert rule file {0:?}: {1}")]
    Parse(PathBuf, #[source] serde_json::Error),

    #[error("Error encoding alert rule file {0:?}: {1}")]
    Serialize(PathBuf, #[source] serde_json::Error),

    #[error("Invalid alert rule file {0:?}: uid, title and folderUID are required")]
    Invalid(PathBuf),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerting::model::AlertQuery;
    use tempfile::TempDir;

    #[test]
    fn test_uid_round_trips_through_file_name() {
        for uid in ["5c1c217a", "-3bb06d82", "xyz123"] {
            let name = deployment_file_name("okta", "okta_new_admin", uid);
            assert_eq!(uid_from_file_name(&name).as_deref(), Some(uid));

            let nested = Path::new("deployments").join(&name);
            assert_eq!(uid_from_file_name(nested).as_deref(), Some(uid));
        }

        assert_eq!(
            uid_from_file_name(placeholder_file_name("abcd123")).as_deref(),
            Some("abcd123")
        );
    }

    #[test]
    fn test_uid_from_unrelated_file_names() {
        assert_eq!(uid_from_file_name("deployments/README.md"), None);
        assert_eq!(uid_from_file_name("alert_rule.json"), None);
        assert_eq!(uid_from_file_name("deployments/"), None);
    }

    #[test]
    fn test_write_then_read() {
        let temp_dir = TempDir::new().unwrap();
        let workspace = Workspace::new(temp_dir.path());
        workspace.create_dir_all("deployments").unwrap();

        let rule = ProvisionedAlertRule {
            uid: "5c1c217a".to_string(),
            org_id: 1,
            folder_uid: "folder".to_string(),
            title: "Rule 1".to_string(),
            data: vec![AlertQuery {
                ref_id: "A0".to_string(),
                model: serde_json::json!({"refId": "A0"}),
                ..Default::default()
            }],
            ..Default::default()
        };

        let path = "deployments/alert_rule_conv_file_5c1c217a.json";
        write_rule(&workspace, path, &rule, true).unwrap();
        let pretty = workspace.read_to_string(path).unwrap();
        assert!(pretty.contains('\n'));

        write_rule(&workspace, path, &rule, false).unwrap();
        let compact = workspace.read_to_string(path).unwrap();
        assert!(!compact.contains('\n'));

        assert_eq!(read_rule(&workspace, path).unwrap(), rule);
    }

    #[test]
    fn test_parse_summary_requires_identity() {
        let path = Path::new("deployments/alert.json");
        let summary = parse_summary(
            path,
            r#"{"uid":"abc","title":"Rule","folderUID":"folder","orgID":1,"ruleGroup":"g"}"#,
        )
        .unwrap();
        assert_eq!(summary.rule_group, "g");

        assert!(matches!(
            parse_summary(path, r#"{"uid":"abc","title":"Rule"}"#),
            Err(AlertFileError::Invalid(_))
        ));
        assert!(matches!(
            parse_summary(path, "not json"),
            Err(AlertFileError::Parse(..))
        ));
    }
}
