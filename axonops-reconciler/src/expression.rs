//! Turns structured alert criteria into the platform's query syntax.

use std::sync::LazyLock;

use regex::Regex;

use crate::model::Operator;

/// `field=~'$var'` clauses left by dashboard template variables.
static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\w+\s*=~\s*'\$[^']*'\s*").expect("valid placeholder regex"));
static REPEATED_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",\s*(,\s*)+").expect("valid comma regex"));

/// Render a threshold without a trailing `.0` for whole numbers.
pub fn format_threshold(value: f64) -> String {
    format!("{}", value)
}

/// Remove templated placeholder clauses and the punctuation they leave behind.
///
/// `rate(foo{consistency=~'$consistency'})` becomes `rate(foo)`.
pub fn strip_placeholders(query: &str) -> String {
    let stripped = PLACEHOLDER.replace_all(query, "");
    let stripped = REPEATED_COMMA.replace_all(&stripped, ",");
    stripped
        .replace("{,", "{")
        .replace(",}", "}")
        .replace("{}", "")
}

/// Metric alert: the chart's query template followed by the comparison.
pub fn metric_expression(template: &str, operator: Operator, warning: f64) -> String {
    format!(
        "{} {} {}",
        strip_placeholders(template),
        operator,
        format_threshold(warning)
    )
}

/// Event-timeline alert: `events{host_id='..',level='..',type='..'} <op> <warning>`.
pub fn event_expression(
    host_ids: &[String],
    levels: &[String],
    types: &[String],
    operator: Operator,
    warning: f64,
) -> String {
    let clauses: Vec<String> = [("host_id", host_ids), ("level", levels), ("type", types)]
        .into_iter()
        .filter(|(_, values)| !values.is_empty())
        .map(|(field, values)| format!("{}='{}'", field, values.join(",")))
        .collect();

    format!(
        "events{{{}}} {} {}",
        clauses.join(","),
        operator,
        format_threshold(warning)
    )
}

/// Log alert: filters on message content, level, type and source.
pub fn log_expression(
    content: &str,
    levels: &[String],
    types: &[String],
    sources: &[String],
    operator: Operator,
    warning: f64,
) -> String {
    let mut clauses = Vec::new();
    if !content.is_empty() {
        clauses.push(format!("message=\"\\\"{}\\\"\"", content));
    }
    for (field, values) in [("level", levels), ("type", types), ("source", sources)] {
        if !values.is_empty() {
            clauses.push(format!("{}=\"{}\"", field, values.join(",")));
        }
    }

    format!(
        "events{{{}}} {} {}",
        clauses.join(","),
        operator,
        format_threshold(warning)
    )
}
