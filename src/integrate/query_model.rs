//! Query models for alert rules and trial queries
//!
//! The model shape depends on the data source type: Loki and Elasticsearch
//! have dedicated models, anything else gets a generic one unless the
//! conversion supplies its own template.

use reqwest::Url;
use serde_json::{json, Value};

use super::IntegrateError;
use crate::alerting::EXPRESSION_DATASOURCE;
use crate::config::{ConversionConfig, ELASTICSEARCH, LOKI};
use crate::grafana::DataSource;

/// Turn a log query into a metric query suitable for a threshold
pub fn wrap_log_query(query: &str) -> String {
    if query.starts_with("sum") {
        query.to_string()
    } else {
        format!("sum(count_over_time({}[$__auto]))", query)
    }
}

/// Fill a `%s` template with the ref id, data source uid and JSON-escaped
/// query, in that order. `%%` is a literal percent sign.
pub fn format_template(
    template: &str,
    ref_id: &str,
    datasource_uid: &str,
    query: &str,
) -> Result<Value, IntegrateError> {
    let escaped = serde_json::to_string(query)
        .map_err(|e| IntegrateError::QueryModel(e.to_string()))?;
    let escaped = &escaped[1..escaped.len() - 1];
    let mut args = [ref_id, datasource_uid, escaped].into_iter();

    let mut out = String::with_capacity(template.len() + query.len());
    let mut chars = template.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('%') => out.push('%'),
            Some('s') => match args.next() {
                Some(arg) => out.push_str(arg),
                None => {
                    return Err(IntegrateError::QueryModel(
                        "query model template has more than three %s placeholders".to_string(),
                    ))
                }
            },
            other => {
                return Err(IntegrateError::QueryModel(format!(
                    "unsupported placeholder %{} in query model template",
                    other.map(String::from).unwrap_or_default()
                )))
            }
        }
    }

    serde_json::from_str(&out).map_err(|e| {
        IntegrateError::QueryModel(format!("query model template is not valid JSON: {}", e))
    })
}

/// Model stored in the alert rule for query `ref_id`
pub fn alert_model(
    conversion: &ConversionConfig,
    ref_id: &str,
    query: &str,
) -> Result<Value, IntegrateError> {
    let uid = conversion.data_source.as_str();
    if conversion.has_custom_model() {
        return format_template(&conversion.query_model, ref_id, uid, query);
    }

    let model = match conversion.datasource_type() {
        LOKI => json!({
            "refId": ref_id,
            "datasource": {"type": LOKI, "uid": uid},
            "hide": false,
            "expr": query,
            "queryType": "instant",
            "editorMode": "code",
        }),
        ELASTICSEARCH => json!({
            "refId": ref_id,
            "datasource": {"type": ELASTICSEARCH, "uid": uid},
            "query": query,
            "alias": "",
            "metrics": count_metrics(),
            "bucketAggs": date_histogram(),
            "timeField": "@timestamp",
        }),
        other => {
            tracing::warn!(
                conversion = %conversion.name,
                datasource_type = %other,
                "No dedicated query model for data source type, using a generic one"
            );
            json!({
                "refId": ref_id,
                "datasource": {"type": other, "uid": uid},
                "query": query,
            })
        }
    };
    Ok(model)
}

/// Query object sent to `/api/ds/query` when testing a query
pub fn datasource_query(
    conversion: &ConversionConfig,
    datasource: &DataSource,
    ref_id: &str,
    query: &str,
) -> Result<Value, IntegrateError> {
    if conversion.has_custom_model() {
        return format_template(&conversion.query_model, ref_id, &datasource.uid, query);
    }

    match datasource.kind.as_str() {
        LOKI => Ok(json!({
            "refId": ref_id,
            "datasource": {"type": LOKI, "uid": datasource.uid},
            "expr": query,
            "queryType": "range",
            "maxLines": 100,
            "format": "time_series",
            "intervalMs": 2000,
            "maxDataPoints": 100,
        })),
        ELASTICSEARCH => Ok(json!({
            "refId": ref_id,
            "datasource": {"type": ELASTICSEARCH, "uid": datasource.uid},
            "datasourceId": datasource.id,
            "query": query,
            "metrics": count_metrics(),
            "bucketAggs": date_histogram(),
            "timeField": "@timestamp",
        })),
        other => Err(IntegrateError::UnsupportedDatasource(other.to_string())),
    }
}

/// Link opening `query` in Grafana Explore over the `from`..`to` range
pub fn explore_link(
    base_url: &Url,
    org_id: i64,
    datasource: &DataSource,
    query: &str,
    from: &str,
    to: &str,
) -> Result<String, IntegrateError> {
    let target = json!({"type": datasource.kind, "uid": datasource.uid});
    let pane_query = match datasource.kind.as_str() {
        LOKI => json!({
            "refId": "A",
            "datasource": target,
            "expr": query,
            "queryType": "range",
            "editorMode": "code",
            "direction": "backward",
        }),
        ELASTICSEARCH => json!({
            "refId": "A",
            "datasource": target,
            "query": query,
            "metrics": count_metrics(),
            "bucketAggs": date_histogram(),
            "timeField": "@timestamp",
        }),
        _ => json!({
            "refId": "A",
            "datasource": target,
            "query": query,
        }),
    };
    let panes = json!({
        "yyz": {
            "datasource": datasource.uid,
            "queries": [pane_query],
            "range": {"from": from, "to": to},
            "compact": false,
        }
    });

    let mut url = base_url
        .join("explore")
        .map_err(|e| IntegrateError::QueryModel(format!("invalid explore URL: {}", e)))?;
    url.query_pairs_mut()
        .append_pair("schemaVersion", "1")
        .append_pair("orgId", &org_id.to_string())
        .append_pair("panes", &panes.to_string());
    Ok(url.to_string())
}

/// Reduce expression `B` over every query ref
pub fn reducer_model(query_refs: &[String]) -> Value {
    json!({
        "refId": "B",
        "hide": false,
        "type": "reduce",
        "datasource": {"uid": EXPRESSION_DATASOURCE, "type": EXPRESSION_DATASOURCE},
        "conditions": [condition("B", json!([]))],
        "reducer": "last",
        "expression": query_refs.join("||"),
    })
}

/// Threshold expression `C`, firing when `B > 1`
pub fn threshold_model() -> Value {
    json!({
        "refId": "C",
        "hide": false,
        "type": "threshold",
        "datasource": {"uid": EXPRESSION_DATASOURCE, "type": EXPRESSION_DATASOURCE},
        "conditions": [condition("C", json!([1]))],
        "expression": "B",
    })
}

fn condition(ref_id: &str, params: Value) -> Value {
    json!({
        "type": "query",
        "evaluator": {"params": params, "type": "gt"},
        "operator": {"type": "and"},
        "query": {"params": [ref_id]},
        "reducer": {"params": [], "type": "last"},
    })
}

fn count_metrics() -> Value {
    json!([{"type": "count", "id": "1"}])
}

fn date_histogram() -> Value {
    json!([{
        "type": "date_histogram",
        "id": "2",
        "settings": {"interval": "auto"},
        "field": "@timestamp",
    }])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conversion(target: &str) -> ConversionConfig {
        ConversionConfig {
            name: "conv".to_string(),
            target: target.to_string(),
            data_source: "my_data_source".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_wrap_log_query() {
        assert_eq!(
            wrap_log_query(r#"{job=".+"}"#),
            r#"sum(count_over_time({job=".+"}[$__auto]))"#
        );
        let already = "sum(count_over_time({job=`.+`} | json[$__auto]))";
        assert_eq!(wrap_log_query(already), already);
    }

    #[test]
    fn test_loki_model() {
        let model = alert_model(&conversion("loki"), "A0", "{job=`.+`}").unwrap();
        assert_eq!(model["datasource"], json!({"type": "loki", "uid": "my_data_source"}));
        assert_eq!(model["expr"], "{job=`.+`}");
        assert_eq!(model["queryType"], "instant");
    }

    #[test]
    fn test_elasticsearch_model_from_type_override() {
        let mut conv = conversion("esql");
        conv.data_source_type = ELASTICSEARCH.to_string();

        let query = r#"from * | where eventSource=="kms.amazonaws.com""#;
        let model = alert_model(&conv, "A0", query).unwrap();
        assert_eq!(model["query"], query);
        assert_eq!(model["bucketAggs"][0]["type"], "date_histogram");
        assert_eq!(model["metrics"][0]["type"], "count");
        assert_eq!(model["timeField"], "@timestamp");

        // Escaped on the wire
        let encoded = serde_json::to_string(&model).unwrap();
        assert!(encoded.contains(r#"eventSource==\"kms.amazonaws.com\""#));
    }

    #[test]
    fn test_generic_model() {
        let model = alert_model(&conversion("generic"), "A0", "DO MY QUERY").unwrap();
        assert_eq!(
            model,
            json!({
                "refId": "A0",
                "datasource": {"type": "generic", "uid": "my_data_source"},
                "query": "DO MY QUERY",
            })
        );
    }

    #[test]
    fn test_custom_template() {
        let mut conv = conversion("custom");
        conv.query_model =
            r#"{"refId":"%s","datasource":{"type":"custom","uid":"%s"},"queryString":"(%s)","pct":"100%%"}"#
                .to_string();

        let model = alert_model(&conv, "A0", r#"DO "MY" QUERY"#).unwrap();
        assert_eq!(model["refId"], "A0");
        assert_eq!(model["datasource"]["uid"], "my_data_source");
        assert_eq!(model["queryString"], r#"(DO "MY" QUERY)"#);
        assert_eq!(model["pct"], "100%");
    }

    #[test]
    fn test_invalid_templates() {
        let err = format_template(r#"{"refId":"%s"#, "A0", "uid", "q").unwrap_err();
        assert!(err.to_string().contains("not valid JSON"));

        let err = format_template("%s %s %s %s", "A0", "uid", "q").unwrap_err();
        assert!(matches!(err, IntegrateError::QueryModel(_)));

        assert!(format_template(r#"{"n":%d}"#, "A0", "uid", "q").is_err());
    }

    #[test]
    fn test_expression_models() {
        let reducer = reducer_model(&["A0".to_string(), "A1".to_string()]);
        assert_eq!(reducer["expression"], "A0||A1");
        assert_eq!(reducer["type"], "reduce");
        assert_eq!(reducer["datasource"]["uid"], EXPRESSION_DATASOURCE);

        let threshold = threshold_model();
        assert_eq!(threshold["expression"], "B");
        assert_eq!(threshold["conditions"][0]["evaluator"], json!({"params": [1], "type": "gt"}));
    }

    #[test]
    fn test_datasource_queries() {
        let loki = DataSource {
            id: 3,
            uid: "loki-uid".to_string(),
            kind: "loki".to_string(),
            ..Default::default()
        };
        let query = datasource_query(&conversion("loki"), &loki, "A", "{job=`x`}").unwrap();
        assert_eq!(query["expr"], "{job=`x`}");
        assert_eq!(query["queryType"], "range");
        assert_eq!(query["maxLines"], 100);
        assert_eq!(query["intervalMs"], 2000);
        assert_eq!(query["datasource"]["uid"], "loki-uid");

        let es = DataSource {
            id: 7,
            uid: "es-uid".to_string(),
            kind: "elasticsearch".to_string(),
            ..Default::default()
        };
        let query = datasource_query(&conversion("esql"), &es, "A", "from *").unwrap();
        assert_eq!(query["datasourceId"], 7);
        assert_eq!(query["timeField"], "@timestamp");

        let other = DataSource {
            kind: "prometheus".to_string(),
            ..Default::default()
        };
        let err = datasource_query(&conversion("promql"), &other, "A", "up").unwrap_err();
        assert_eq!(err.to_string(), "unsupported datasource type: prometheus");
    }

    fn panes(link: &str) -> Value {
        let url = Url::parse(link).unwrap();
        let (_, panes) = url.query_pairs().find(|(key, _)| key == "panes").unwrap();
        serde_json::from_str(&panes).unwrap()
    }

    #[test]
    fn test_explore_link_for_loki() {
        let base = Url::parse("https://example.grafana.net/grafana/").unwrap();
        let loki = DataSource {
            uid: "loki-uid-123".to_string(),
            kind: "loki".to_string(),
            ..Default::default()
        };
        let query = r#"{job="okta"} |= "admin & more""#;
        let link = explore_link(&base, 2, &loki, query, "now-1h", "now").unwrap();

        assert!(link.starts_with("https://example.grafana.net/grafana/explore?schemaVersion=1&orgId=2&panes="));
        // Pane JSON is encoded, not embedded raw
        assert!(!link.contains(r#"{"yyz":"#));
        assert!(!link.contains(' '));

        let panes = panes(&link);
        let pane = &panes["yyz"];
        assert_eq!(pane["datasource"], "loki-uid-123");
        assert_eq!(pane["range"], json!({"from": "now-1h", "to": "now"}));
        let pane_query = &pane["queries"][0];
        assert_eq!(pane_query["refId"], "A");
        assert_eq!(pane_query["datasource"], json!({"type": "loki", "uid": "loki-uid-123"}));
        assert_eq!(pane_query["expr"], query);
        assert_eq!(pane_query["queryType"], "range");
        assert_eq!(pane_query["direction"], "backward");
        assert!(pane_query.get("metrics").is_none());
    }

    #[test]
    fn test_explore_link_for_other_datasources() {
        let base = Url::parse("http://localhost:3000/").unwrap();
        let es = DataSource {
            uid: "es-uid".to_string(),
            kind: "elasticsearch".to_string(),
            ..Default::default()
        };
        let link = explore_link(&base, 1, &es, "from * | limit 10", "now-24h", "now").unwrap();
        let pane = &panes(&link)["yyz"];
        assert_eq!(pane["compact"], false);
        assert_eq!(pane["queries"][0]["query"], "from * | limit 10");
        assert_eq!(pane["queries"][0]["metrics"][0]["type"], "count");
        assert_eq!(pane["queries"][0]["timeField"], "@timestamp");

        let generic = DataSource {
            uid: "splunk".to_string(),
            kind: "splunk".to_string(),
            ..Default::default()
        };
        let link = explore_link(&base, 1, &generic, "index=main", "now-1h", "now").unwrap();
        assert_eq!(
            panes(&link)["yyz"]["queries"][0],
            json!({"refId": "A", "datasource": {"type": "splunk", "uid": "splunk"}, "query": "index=main"})
        );
    }
}
