//! Converted artifacts to alert rule documents
//!
//! A run removes the documents of deleted artifacts and the artifacts of
//! conversions no longer configured, converts every changed artifact, drops
//! documents whose artifact no longer exists and finally tests the queries
//! when enabled.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use glob::Pattern;

use super::artifact::{input_stem, ConversionArtifact};
use super::identity::{alert_title, conversion_uuid, rule_uid};
use super::query_test::{QueryStats, QueryTestResult, QueryTester};
use super::query_model::{alert_model, reducer_model, threshold_model, wrap_log_query};
use super::template::render_all;
use super::IntegrateError;
use crate::alerting::{
    deployment_file_name, read_rule, write_rule, AlertQuery, ExecErrState, NoDataState,
    ProvisionedAlertRule, RelativeTimeRange, CONDITION_REF, EXPRESSION_DATASOURCE,
};
use crate::config::{parse_duration, Config, ConversionConfig, LOKI};
use crate::grafana::GrafanaClient;
use crate::workspace::{clean, is_within, Workspace};

/// Run flags supplied by the CI host
#[derive(Debug, Clone, Default)]
pub struct IntegratorOptions {
    pub pretty_print: bool,
    pub show_log_lines: bool,
    pub test_queries: bool,
    /// Artifacts to test instead of the integrated ones
    pub test_files: Option<Vec<PathBuf>>,
}

/// Artifacts the run has to look at
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    pub changed: Vec<PathBuf>,
    pub deleted: Vec<PathBuf>,
}

/// What happened to a single artifact
#[derive(Debug, Clone, PartialEq)]
pub enum ArtifactOutcome {
    /// No queries, nothing produced
    Skipped,
    /// The existing document already carries the same queries
    Unchanged(PathBuf),
    Written(PathBuf),
}

#[derive(Debug, Clone, Default)]
pub struct IntegrationReport {
    /// Artifacts converted in this run
    pub integrated: Vec<PathBuf>,
    /// Artifacts whose documents were removed
    pub removed: Vec<String>,
    /// Documents written
    pub written: Vec<PathBuf>,
    /// Documents deleted
    pub deleted_documents: Vec<PathBuf>,
    pub query_results: Option<BTreeMap<String, Vec<QueryTestResult>>>,
}

impl IntegrationReport {
    /// Value of the `rules_integrated` output
    pub fn rules_integrated(&self) -> String {
        self.integrated
            .iter()
            .map(|p| p.display().to_string())
            .chain(self.removed.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Value of the `test_query_results` output, when queries were tested
    pub fn test_query_results(&self) -> Result<Option<String>, IntegrateError> {
        self.query_results
            .as_ref()
            .map(|results| {
                serde_json::to_string(results).map_err(|e| IntegrateError::QueryModel(e.to_string()))
            })
            .transpose()
    }
}

pub struct Integrator<'a> {
    config: &'a Config,
    workspace: &'a Workspace,
    options: IntegratorOptions,
}

impl<'a> Integrator<'a> {
    pub fn new(config: &'a Config, workspace: &'a Workspace, options: IntegratorOptions) -> Self {
        Self {
            config,
            workspace,
            options,
        }
    }

    fn conversion_folder(&self) -> &str {
        &self.config.folders.conversion_path
    }

    fn deployment_folder(&self) -> &str {
        &self.config.folders.deployment_path
    }

    /// Build the change set from CI file lists. Only JSON files inside the
    /// conversion folder are kept. With `all_rules` every artifact in the
    /// folder counts as changed.
    pub fn select_changes(
        &self,
        changed: &[String],
        deleted: &[String],
        all_rules: bool,
    ) -> Result<ChangeSet, IntegrateError> {
        let keep = |path: &str| {
            let path = Path::new(path);
            is_within(path, self.conversion_folder())
                && path.extension().map(|e| e == "json").unwrap_or(false)
        };

        let changed = if all_rules {
            self.workspace
                .list_files(self.conversion_folder())?
                .into_iter()
                .filter(|p| p.extension().map(|e| e == "json").unwrap_or(false))
                .collect()
        } else {
            changed.iter().filter(|p| keep(p.as_str())).map(PathBuf::from).collect()
        };
        let deleted = deleted
            .iter()
            .filter(|p| keep(p.as_str()))
            .map(PathBuf::from)
            .collect();

        Ok(ChangeSet { changed, deleted })
    }

    /// Remove every document produced from a deleted artifact. Returns the
    /// removed document paths.
    pub fn remove_deleted(&self, deleted: &[PathBuf]) -> Result<Vec<PathBuf>, IntegrateError> {
        if deleted.is_empty() {
            return Ok(Vec::new());
        }

        if !self.workspace.exists(self.deployment_folder()) {
            return Ok(Vec::new());
        }
        let documents = self.workspace.list_files(self.deployment_folder())?;
        let mut removed = Vec::new();
        for artifact in deleted {
            let stem = artifact
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            let prefix = format!("alert_rule_{}_", stem);
            let pattern = Pattern::new(&format!("{}*.json", Pattern::escape(&prefix)))
                .map_err(|e| IntegrateError::Glob(e.to_string()))?;

            for document in &documents {
                // The wildcard must only cover the uid, so `a.json` does not
                // claim documents produced from `a_b.json`
                let matches = document
                    .file_name()
                    .and_then(|name| name.to_str())
                    .filter(|name| pattern.matches(name))
                    .and_then(|name| name.strip_prefix(prefix.as_str()))
                    .and_then(|rest| rest.strip_suffix(".json"))
                    .map(|uid| !uid.is_empty() && !uid.contains('_'))
                    .unwrap_or(false);
                if matches && !removed.contains(document) {
                    self.workspace.remove(document)?;
                    tracing::info!(artifact = %artifact.display(), document = %document.display(), "Removed alert rule");
                    removed.push(document.clone());
                }
            }
        }
        Ok(removed)
    }

    /// Remove artifacts from the conversion folder whose conversion is no
    /// longer configured. Returns the removed artifact paths.
    pub fn remove_unconfigured_artifacts(&self) -> Result<Vec<PathBuf>, IntegrateError> {
        let mut removed = Vec::new();
        if !self.workspace.exists(self.conversion_folder()) {
            return Ok(removed);
        }

        for path in self.workspace.list_files(self.conversion_folder())? {
            if path.extension().map(|e| e != "json").unwrap_or(true) {
                continue;
            }
            let artifact = match ConversionArtifact::read(self.workspace, &path) {
                Ok(artifact) => artifact,
                Err(e) => {
                    tracing::warn!(artifact = %path.display(), error = %e, "Skipping unreadable conversion output");
                    continue;
                }
            };
            if self.config.conversion(&artifact.conversion_name).is_some() {
                continue;
            }

            self.workspace.remove(&path)?;
            tracing::info!(
                artifact = %path.display(),
                conversion = %artifact.conversion_name,
                "Removed conversion output of unconfigured conversion"
            );
            removed.push(path);
        }
        Ok(removed)
    }

    /// Convert one artifact into its alert rule document
    pub fn integrate_artifact(&self, path: &Path) -> Result<ArtifactOutcome, IntegrateError> {
        let artifact = ConversionArtifact::read(self.workspace, path)?;
        let conversion = self.config.conversion(&artifact.conversion_name).ok_or_else(|| {
            IntegrateError::UnknownConversion {
                name: artifact.conversion_name.clone(),
                path: path.display().to_string(),
            }
        })?;

        if artifact.queries.is_empty() {
            tracing::info!(artifact = %path.display(), "No queries in conversion output, skipping");
            return Ok(ArtifactOutcome::Skipped);
        }
        artifact.check_required_fields(&conversion.required_rule_fields)?;

        let conversion_id = conversion_uuid(&artifact.rules)?;
        let uid = rule_uid(&conversion.name, &conversion_id);
        let file_name = deployment_file_name(&conversion.name, &input_stem(path, &conversion.name), &uid);
        let target = clean(self.deployment_folder()).join(file_name);

        let existing = if self.workspace.exists(&target) {
            Some(read_rule(self.workspace, &target)?)
        } else {
            None
        };

        match self.build_rule(&artifact, conversion, path, &uid, existing)? {
            Some(rule) => {
                self.workspace.create_dir_all(self.deployment_folder())?;
                write_rule(self.workspace, &target, &rule, self.options.pretty_print)?;
                tracing::info!(uid = %uid, title = %rule.title, document = %target.display(), "Wrote alert rule");
                Ok(ArtifactOutcome::Written(target))
            }
            None => {
                tracing::info!(uid = %uid, document = %target.display(), "Alert rule unchanged");
                Ok(ArtifactOutcome::Unchanged(target))
            }
        }
    }

    /// Build the rule for `artifact` on top of `existing`. Returns `None`
    /// when the existing rule already has identical queries.
    pub fn build_rule(
        &self,
        artifact: &ConversionArtifact,
        conversion: &ConversionConfig,
        artifact_path: &Path,
        uid: &str,
        existing: Option<ProvisionedAlertRule>,
    ) -> Result<Option<ProvisionedAlertRule>, IntegrateError> {
        if conversion.data_source.is_empty() {
            return Err(IntegrateError::MissingDatasource(conversion.name.clone()));
        }

        let time_window = parse_duration(&conversion.time_window)?;
        let lookback = if conversion.lookback.is_empty() {
            Duration::ZERO
        } else {
            parse_duration(&conversion.lookback)?
        };
        let range = RelativeTimeRange::new(time_window + lookback, lookback);

        let mut data = Vec::with_capacity(artifact.queries.len() + 2);
        let mut refs = Vec::with_capacity(artifact.queries.len());
        for (index, query) in artifact.queries.iter().enumerate() {
            let ref_id = format!("A{}", index);
            let query = if conversion.datasource_type() == LOKI {
                wrap_log_query(query)
            } else {
                query.clone()
            };

            data.push(AlertQuery {
                ref_id: ref_id.clone(),
                query_type: "instant".to_string(),
                datasource_uid: conversion.data_source.clone(),
                relative_time_range: range,
                model: alert_model(conversion, &ref_id, &query)?,
            });
            refs.push(ref_id);
        }
        data.push(expression("B", reducer_model(&refs)));
        data.push(expression(CONDITION_REF, threshold_model()));

        let candidate = ProvisionedAlertRule {
            data,
            ..Default::default()
        };
        if existing
            .as_ref()
            .map(|rule| rule.same_queries(&candidate))
            .unwrap_or(false)
        {
            return Ok(None);
        }

        let mut rule = existing.unwrap_or_default();

        rule.uid = uid.to_string();
        rule.folder_uid = self.config.integration.folder_id.clone();
        rule.org_id = self.config.integration.org_id;
        rule.rule_group = conversion.rule_group.clone();
        rule.no_data_state = NoDataState::Ok;
        rule.exec_err_state = ExecErrState::Ok;
        rule.title = alert_title(&artifact.rules);
        rule.condition = CONDITION_REF.to_string();
        rule.data = candidate.data;
        rule.updated = Some(chrono::Utc::now());

        let integration = &self.config.integration;
        let labels = render_all(
            &integration.template_labels,
            &artifact.rules,
            integration.template_all_rules,
        )?;
        rule.labels
            .extend(labels.into_iter().filter(|(_, value)| !value.is_empty()));
        let annotations = render_all(
            &integration.template_annotations,
            &artifact.rules,
            integration.template_all_rules,
        )?;
        rule.annotations
            .extend(annotations.into_iter().filter(|(_, value)| !value.is_empty()));

        let annotations = &mut rule.annotations;
        annotations.insert("Query".to_string(), artifact.queries.join(" | "));
        annotations.insert("TimeWindow".to_string(), conversion.time_window.clone());
        annotations.insert("LogSourceUid".to_string(), conversion.data_source.clone());
        annotations.insert("LogSourceType".to_string(), conversion.target.clone());
        annotations.insert(
            "ConversionFile".to_string(),
            artifact_path.display().to_string(),
        );
        let lookback = if conversion.lookback.is_empty() {
            "0s"
        } else {
            conversion.lookback.as_str()
        };
        annotations.insert("Lookback".to_string(), lookback.to_string());

        Ok(Some(rule))
    }

    /// Remove documents whose `ConversionFile` no longer exists. Returns the
    /// missing artifact paths.
    pub fn cleanup_orphans(&self) -> Result<(Vec<String>, Vec<PathBuf>), IntegrateError> {
        let mut artifacts = Vec::new();
        let mut documents = Vec::new();
        if !self.workspace.exists(self.deployment_folder()) {
            return Ok((artifacts, documents));
        }

        for document in self.workspace.list_files(self.deployment_folder())? {
            if document.extension().map(|e| e != "json").unwrap_or(true) {
                continue;
            }
            let rule = match read_rule(self.workspace, &document) {
                Ok(rule) => rule,
                Err(e) => {
                    tracing::warn!(document = %document.display(), error = %e, "Skipping unreadable document");
                    continue;
                }
            };

            let source = match rule.annotations.get("ConversionFile") {
                Some(source) if !source.is_empty() => source,
                _ => continue,
            };
            if self.workspace.exists(source) {
                continue;
            }

            self.workspace.remove(&document)?;
            tracing::info!(
                document = %document.display(),
                artifact = %source,
                "Removed alert rule whose conversion output is gone"
            );
            if !artifacts.contains(source) {
                artifacts.push(source.clone());
            }
            documents.push(document);
        }
        Ok((artifacts, documents))
    }

    fn query_testing_enabled(&self) -> bool {
        self.config.integration.test_queries || self.options.test_queries
    }

    /// Test every query of `files`. Results are keyed by artifact path.
    pub async fn test_queries(
        &self,
        client: &GrafanaClient,
        files: &[PathBuf],
    ) -> Result<BTreeMap<String, Vec<QueryTestResult>>, IntegrateError> {
        let integration = &self.config.integration;
        let mut tester = QueryTester::new(client, integration.from.clone(), integration.to.clone())
            .with_org_id(integration.org_id)
            .with_sample_values(integration.show_sample_values)
            .with_log_lines(integration.show_log_lines || self.options.show_log_lines);

        let mut results = BTreeMap::new();
        for path in files {
            let artifact = ConversionArtifact::read(self.workspace, path)?;
            let conversion = self.config.conversion(&artifact.conversion_name).ok_or_else(|| {
                IntegrateError::UnknownConversion {
                    name: artifact.conversion_name.clone(),
                    path: path.display().to_string(),
                }
            })?;
            if artifact.queries.is_empty() {
                continue;
            }

            let mut file_results = Vec::with_capacity(artifact.queries.len());
            for query in &artifact.queries {
                match tester.run(conversion, query).await {
                    Ok(result) => file_results.push(result),
                    Err(e) if integration.continue_on_query_testing_errors => {
                        tracing::warn!(artifact = %path.display(), error = %e, "Query test failed, continuing");
                        file_results.push(QueryTestResult {
                            datasource: conversion.data_source.clone(),
                            stats: QueryStats {
                                errors: vec![e.to_string()],
                                ..Default::default()
                            },
                            ..Default::default()
                        });
                    }
                    Err(e) => return Err(e),
                }
            }
            tracing::info!(artifact = %path.display(), queries = file_results.len(), "Tested queries");
            results.insert(path.display().to_string(), file_results);
        }
        Ok(results)
    }

    /// Apply a change set and test the queries when enabled
    pub async fn run(
        &self,
        changes: &ChangeSet,
        client: &GrafanaClient,
    ) -> Result<IntegrationReport, IntegrateError> {
        let mut report = IntegrationReport {
            deleted_documents: self.remove_deleted(&changes.deleted)?,
            removed: changes
                .deleted
                .iter()
                .map(|p| p.display().to_string())
                .collect(),
            ..Default::default()
        };

        let unconfigured = self.remove_unconfigured_artifacts()?;
        for path in &unconfigured {
            let path = path.display().to_string();
            if !report.removed.contains(&path) {
                report.removed.push(path);
            }
        }

        for path in &changes.changed {
            if unconfigured.iter().any(|removed| clean(removed) == clean(path)) {
                continue;
            }
            match self.integrate_artifact(path)? {
                ArtifactOutcome::Skipped => {}
                ArtifactOutcome::Unchanged(_) => report.integrated.push(path.clone()),
                ArtifactOutcome::Written(document) => {
                    report.integrated.push(path.clone());
                    report.written.push(document);
                }
            }
        }

        let (orphaned, documents) = self.cleanup_orphans()?;
        for artifact in orphaned {
            if !report.removed.contains(&artifact) {
                report.removed.push(artifact);
            }
        }
        report.deleted_documents.extend(documents);

        if self.query_testing_enabled() {
            let files = match &self.options.test_files {
                Some(files) => files.clone(),
                None => report.integrated.clone(),
            };
            report.query_results = Some(self.test_queries(client, &files).await?);
        }

        tracing::info!(
            integrated = report.integrated.len(),
            written = report.written.len(),
            removed = report.deleted_documents.len(),
            "Integration finished"
        );
        Ok(report)
    }
}

fn expression(ref_id: &str, model: serde_json::Value) -> AlertQuery {
    AlertQuery {
        ref_id: ref_id.to_string(),
        query_type: String::new(),
        datasource_uid: EXPRESSION_DATASOURCE.to_string(),
        relative_time_range: RelativeTimeRange::default(),
        model,
    }
}
