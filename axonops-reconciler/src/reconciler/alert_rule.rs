//! Metric and event alert rules bound to a dashboard chart.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use super::{new_id, same_number, str_field, threshold, Outcome, Reconciler, Session};
use crate::client::ControlPlaneClient;
use crate::error::{Error, Result};
use crate::expression;
use crate::model::{AlertRuleSpec, ClusterContext, Operator, ResourceKind, Route, Severity};

const COLLECTION: &str = "alert-rules";

/// Operator, thresholds and duration; required whenever a rule should exist.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Criteria {
    pub operator: Operator,
    pub warning: f64,
    pub critical: f64,
    pub duration: String,
}

impl Criteria {
    pub(crate) fn require(
        kind: ResourceKind,
        key: &str,
        operator: Option<Operator>,
        warning: Option<f64>,
        critical: Option<f64>,
        duration: Option<&str>,
    ) -> Result<Self> {
        let invalid = |reason: &str| Error::Validation {
            kind,
            key: key.to_string(),
            reason: reason.to_string(),
        };

        Ok(Self {
            operator: operator.ok_or_else(|| invalid("operator is required"))?,
            warning: warning.ok_or_else(|| invalid("warning_value is required"))?,
            critical: critical.ok_or_else(|| invalid("critical_value is required"))?,
            duration: duration
                .filter(|d| !d.is_empty())
                .ok_or_else(|| invalid("duration is required"))?
                .to_string(),
        })
    }

    /// Compare the fields that decide whether a remote rule needs rewriting.
    pub(crate) fn matches(&self, record: &Value, description: &str) -> bool {
        str_field(record, "operator") == self.operator.as_str()
            && same_number(record.get("warningValue"), self.warning)
            && same_number(record.get("criticalValue"), self.critical)
            && str_field(record, "for") == self.duration
            && record
                .pointer("/annotations/description")
                .and_then(Value::as_str)
                .unwrap_or_default()
                == description
    }
}

/// All rules of a cluster; metric and log alerts share the collection.
pub(crate) async fn fetch_rules(
    client: &ControlPlaneClient,
    ctx: &ClusterContext,
) -> Result<Vec<Value>> {
    let body: Option<Value> = client.get(&ctx.path(COLLECTION)).await?;
    match body.as_ref().and_then(|b| b.get("metricrules")) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(rules)) => Ok(rules.clone()),
        Some(other) => Err(Error::decode(
            "alert rules",
            format!("expected an array of rules, got {}", other),
        )),
    }
}

pub(crate) fn find_rule<'a>(rules: &'a [Value], name: &str) -> Option<&'a Value> {
    rules.iter().find(|r| str_field(r, "alert") == name)
}

pub(crate) async fn upsert_rule(
    client: &ControlPlaneClient,
    ctx: &ClusterContext,
    payload: &Value,
) -> Result<()> {
    client.post(&ctx.path(COLLECTION), payload).await?;
    Ok(())
}

/// Delete the named rule if it exists.
pub(crate) async fn delete_rule(
    client: &ControlPlaneClient,
    ctx: &ClusterContext,
    kind: ResourceKind,
    name: &str,
) -> Result<Outcome> {
    let rules = fetch_rules(client, ctx).await?;
    let Some(existing) = find_rule(&rules, name) else {
        debug!("{} {} does not exist in {}, nothing to delete", kind, name, ctx);
        return Ok(Outcome::Absent);
    };

    let id = str_field(existing, "id");
    info!("Deleting {} {} ({}) in {}", kind, name, id, ctx);
    client
        .delete(&format!("{}/{}", ctx.path(COLLECTION), id))
        .await?;
    Ok(Outcome::Deleted)
}

/// Notification routing: integration ids with a severity each.
///
/// The override flags are set for every severity that has at least one route.
pub(crate) async fn routing_payload(
    session: &mut Session,
    ctx: &ClusterContext,
    routes: &[Route],
    default_severity: Severity,
) -> Result<Value> {
    let mut routing = Vec::new();
    let mut severities = Vec::new();

    for route in routes.iter().filter(|r| !r.name().is_empty()) {
        let id = session
            .refs
            .integration_id(&session.client, ctx, route.name())
            .await?;
        let severity = route.severity(default_severity);
        severities.push(severity);
        routing.push(json!({"id": id, "severity": severity.as_str()}));
    }

    if routing.is_empty() {
        return Ok(json!({}));
    }

    Ok(json!({
        "Routing": routing,
        "OverrideInfo": severities.contains(&Severity::Info),
        "OverrideWarning": severities.contains(&Severity::Warning),
        "OverrideError": severities.contains(&Severity::Error),
    }))
}

/// `[{Name, Value}]` entries for every non-empty filter.
pub(crate) fn location_filters(filters: &[(&str, &[String])]) -> Vec<Value> {
    filters
        .iter()
        .filter(|(_, values)| !values.is_empty())
        .map(|(name, values)| json!({"Name": name, "Value": values}))
        .collect()
}

/// Reconciles alert rules tied to a dashboard chart.
pub struct AlertRuleReconciler;

impl AlertRuleReconciler {
    async fn payload(
        &self,
        session: &mut Session,
        ctx: &ClusterContext,
        spec: &AlertRuleSpec,
        criteria: &Criteria,
        id: String,
    ) -> Result<Value> {
        let chart = session
            .refs
            .find_chart(&session.client, ctx, &spec.dashboard, &spec.chart)
            .await?;
        let host_ids = session
            .refs
            .host_ids(&session.client, ctx, &spec.host_id)
            .await?;

        let expr = if chart.is_timeline() {
            expression::event_expression(
                &host_ids,
                &spec.level,
                &spec.event_type,
                criteria.operator,
                criteria.warning,
            )
        } else if let Some(template) = chart.query_template() {
            expression::metric_expression(template, criteria.operator, criteria.warning)
        } else {
            return Err(Error::not_found(
                "chart query",
                format!("{}/{}", spec.dashboard, spec.chart),
            ));
        };
        debug!("Expression for alert rule {}: {}", spec.name, expr);

        let integrations =
            routing_payload(session, ctx, &spec.routing, spec.routing_severity).await?;

        let filters = location_filters(&[
            ("scope", &spec.scope[..]),
            ("dc", &spec.dc[..]),
            ("rack", &spec.rack[..]),
            ("host_id", &host_ids[..]),
            ("keyspace", &spec.keyspace[..]),
            ("percentile", &spec.percentile[..]),
            ("consistency", &spec.consistency[..]),
            ("groupBy", &spec.group_by[..]),
        ]);

        let mut payload = Map::new();
        payload.insert("id".into(), Value::from(id));
        payload.insert("alert".into(), Value::from(spec.name.as_str()));
        payload.insert("for".into(), Value::from(criteria.duration.as_str()));
        payload.insert("operator".into(), Value::from(criteria.operator.as_str()));
        payload.insert("warningValue".into(), threshold(criteria.warning));
        payload.insert("criticalValue".into(), threshold(criteria.critical));
        payload.insert("expr".into(), Value::from(expr));
        payload.insert("correlationId".into(), Value::from(chart.uuid.as_str()));
        payload.insert("clusterName".into(), Value::from(ctx.cluster.as_str()));
        payload.insert(
            "annotations".into(),
            json!({
                "description": spec.description,
                "summary": format!("{} on {} / {}", spec.name, spec.dashboard, spec.chart),
            }),
        );
        payload.insert("integrations".into(), integrations);
        payload.insert("filters".into(), Value::from(filters));
        Ok(Value::Object(payload))
    }
}

#[async_trait]
impl Reconciler for AlertRuleReconciler {
    type Spec = AlertRuleSpec;

    async fn reconcile(
        &self,
        session: &mut Session,
        ctx: &ClusterContext,
        spec: &Self::Spec,
    ) -> Result<Outcome> {
        let criteria = Criteria::require(
            ResourceKind::AlertRule,
            &spec.name,
            spec.operator,
            spec.warning_value,
            spec.critical_value,
            spec.duration.as_deref(),
        )?;
        if spec.dashboard.is_empty() || spec.chart.is_empty() {
            return Err(Error::Validation {
                kind: ResourceKind::AlertRule,
                key: spec.name.clone(),
                reason: "dashboard and chart are required".to_string(),
            });
        }

        let rules = fetch_rules(&session.client, ctx).await?;
        let existing = find_rule(&rules, &spec.name);

        if let Some(record) = existing {
            if criteria.matches(record, &spec.description) {
                debug!("Alert rule {} is up to date in {}", spec.name, ctx);
                return Ok(Outcome::Unchanged);
            }
        }

        let (id, outcome) = match existing {
            Some(record) => (str_field(record, "id").to_string(), Outcome::Updated),
            None => (new_id(), Outcome::Created),
        };

        let payload = self.payload(session, ctx, spec, &criteria, id).await?;
        info!("Alert rule {} {} in {}", spec.name, outcome, ctx);
        upsert_rule(&session.client, ctx, &payload).await?;
        Ok(outcome)
    }

    async fn finalize(
        &self,
        session: &mut Session,
        ctx: &ClusterContext,
        spec: &Self::Spec,
    ) -> Result<Outcome> {
        delete_rule(&session.client, ctx, ResourceKind::AlertRule, &spec.name).await
    }
}
