//! Converter output consumed by the integrator

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::IntegrateError;
use crate::workspace::Workspace;

/// One converted detection rule file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversionArtifact {
    #[serde(default)]
    pub conversion_name: String,
    #[serde(default)]
    pub input_file: String,
    #[serde(default)]
    pub queries: Vec<String>,
    #[serde(default)]
    pub rules: Vec<DetectionRule>,
}

/// Summary of a detection rule as emitted by the converter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionRule {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    /// Remaining rule metadata (level, author, logsource, ...)
    #[serde(flatten)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl DetectionRule {
    /// Whether the rule carries a non-empty value for `field`
    pub fn has_field(&self, field: &str) -> bool {
        let value = match field {
            "id" => return !self.id.is_empty(),
            "title" => return !self.title.is_empty(),
            other => self.metadata.get(other),
        };

        match value {
            None | Some(serde_json::Value::Null) => false,
            Some(serde_json::Value::String(s)) => !s.is_empty(),
            Some(serde_json::Value::Array(a)) => !a.is_empty(),
            Some(serde_json::Value::Object(o)) => !o.is_empty(),
            Some(_) => true,
        }
    }
}

impl ConversionArtifact {
    pub fn read(workspace: &Workspace, path: &Path) -> Result<Self, IntegrateError> {
        let contents = workspace.read_to_string(path)?;
        serde_json::from_str(&contents)
            .map_err(|e| IntegrateError::InvalidArtifact(path.display().to_string(), e.to_string()))
    }

    /// Fail on the first rule missing one of `fields`
    pub fn check_required_fields(&self, fields: &[String]) -> Result<(), IntegrateError> {
        for rule in &self.rules {
            if let Some(field) = fields.iter().find(|field| !rule.has_field(field)) {
                return Err(IntegrateError::MissingRuleField {
                    rule: if rule.title.is_empty() {
                        rule.id.clone()
                    } else {
                        rule.title.clone()
                    },
                    field: field.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Stem used in deployment file names for the artifact at `path`. The
/// converter prefixes artifacts with the conversion name, which is dropped.
pub fn input_stem(path: &Path, conversion_name: &str) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();

    match stem.strip_prefix(conversion_name).and_then(|rest| rest.strip_prefix('_')) {
        Some(rest) if !rest.is_empty() => rest.to_string(),
        _ => stem,
    }
}
