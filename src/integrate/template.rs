//! Label and annotation templates
//!
//! Templates reference detection rule fields as `{{.Level}}` or
//! `{{.Logsource.Product}}`. Field names match rule keys ignoring case and
//! missing fields render empty. Nothing else is supported inside `{{ }}`.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use super::artifact::DetectionRule;
use super::IntegrateError;

static FIELD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\s*\.([A-Za-z0-9_]+(?:\.[A-Za-z0-9_]+)*)\s*\}\}").expect("valid regex")
});

/// Render `template` against one detection rule
pub fn render(template: &str, rule: &DetectionRule) -> Result<String, IntegrateError> {
    let mut root = rule.metadata.clone();
    root.insert("id".to_string(), Value::String(rule.id.clone()));
    root.insert("title".to_string(), Value::String(rule.title.clone()));
    let root = Value::Object(root);

    let mut out = String::with_capacity(template.len());
    let mut last = 0;
    for captures in FIELD.captures_iter(template) {
        let (Some(whole), Some(path)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        out.push_str(literal(template, &template[last..whole.start()])?);
        out.push_str(&lookup(&root, path.as_str()).map(display).unwrap_or_default());
        last = whole.end();
    }
    out.push_str(literal(template, &template[last..])?);
    Ok(out)
}

/// Render every template of `templates`. Only the first rule is used unless
/// `all_rules` is set, in which case the distinct non-empty values of all
/// rules are joined with `, `.
pub fn render_all(
    templates: &BTreeMap<String, String>,
    rules: &[DetectionRule],
    all_rules: bool,
) -> Result<BTreeMap<String, String>, IntegrateError> {
    let rules = if all_rules {
        rules
    } else {
        &rules[..rules.len().min(1)]
    };

    let mut rendered = BTreeMap::new();
    for (key, template) in templates {
        let mut values: Vec<String> = Vec::new();
        for rule in rules {
            let value = render(template, rule)?;
            if !value.is_empty() && !values.contains(&value) {
                values.push(value);
            }
        }
        rendered.insert(key.clone(), values.join(", "));
    }
    Ok(rendered)
}

fn literal<'t>(template: &str, text: &'t str) -> Result<&'t str, IntegrateError> {
    if text.contains("{{") {
        return Err(IntegrateError::Template(template.to_string()));
    }
    Ok(text)
}

fn lookup<'v>(root: &'v Value, path: &str) -> Option<&'v Value> {
    path.split('.').try_fold(root, |current, segment| {
        current
            .as_object()?
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(segment))
            .map(|(_, value)| value)
    })
}

fn display(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => format!(
            "[{}]",
            items.iter().map(display).collect::<Vec<_>>().join(" ")
        ),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rule(value: Value) -> DetectionRule {
        serde_json::from_value(value).unwrap()
    }

    fn okta_rule() -> DetectionRule {
        rule(json!({
            "id": "996f8884-9144-40e7-ac63-29090ccde9a0",
            "title": "Okta Admin Role Assigned",
            "level": "high",
            "author": "John Doe",
            "tags": ["attack.persistence", "attack.t1098"],
            "logsource": {"product": "okta", "service": "okta"},
        }))
    }

    #[test]
    fn test_render_fields() {
        let rule = okta_rule();
        assert_eq!(render("{{.Level}}", &rule).unwrap(), "high");
        assert_eq!(render("{{ .Logsource.Product }}", &rule).unwrap(), "okta");
        assert_eq!(render("by {{.Author}} ({{.Title}})", &rule).unwrap(), "by John Doe (Okta Admin Role Assigned)");
        assert_eq!(render("{{.Tags}}", &rule).unwrap(), "[attack.persistence attack.t1098]");
        assert_eq!(render("plain", &rule).unwrap(), "plain");
    }

    #[test]
    fn test_missing_fields_render_empty() {
        let rule = okta_rule();
        assert_eq!(render("{{.Status}}", &rule).unwrap(), "");
        assert_eq!(render("{{.Logsource.Category}}", &rule).unwrap(), "");
        assert_eq!(render("{{.Level.Name}}", &rule).unwrap(), "");
    }

    #[test]
    fn test_unsupported_actions_rejected() {
        let rule = okta_rule();
        for template in ["{{ .Level | upper }}", "{{if .Level}}x{{end}}", "{{.Level"] {
            let err = render(template, &rule).unwrap_err();
            assert!(matches!(err, IntegrateError::Template(t) if t == template));
        }
    }

    #[test]
    fn test_render_all_rules() {
        let rules = vec![
            okta_rule(),
            rule(json!({"id": "b", "title": "Rule 2", "level": "low", "logsource": {"product": "okta"}})),
        ];
        let templates = BTreeMap::from([
            ("Level".to_string(), "{{.Level}}".to_string()),
            ("Product".to_string(), "{{.Logsource.Product}}".to_string()),
        ]);

        let first = render_all(&templates, &rules, false).unwrap();
        assert_eq!(first["Level"], "high");
        assert_eq!(first["Product"], "okta");

        let all = render_all(&templates, &rules, true).unwrap();
        assert_eq!(all["Level"], "high, low");
        assert_eq!(all["Product"], "okta");

        assert!(render_all(&templates, &[], false).unwrap().values().all(String::is_empty));
    }
}
