//! Log alert rules: event filters on message content, level, type and source.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info};

use super::alert_rule::{
    delete_rule, fetch_rules, find_rule, location_filters, routing_payload, upsert_rule, Criteria,
};
use super::{new_id, str_field, threshold, Outcome, Reconciler, Session};
use crate::error::Result;
use crate::expression;
use crate::model::{ClusterContext, LogAlertRuleSpec, ResourceKind};

/// "Log alert 'x' triggered with content '..' from source 'a, b'".
fn summary(spec: &LogAlertRuleSpec) -> String {
    let mut parts = vec![format!("Log alert '{}' triggered", spec.name)];
    if !spec.content.is_empty() {
        parts.push(format!("with content '{}'", spec.content));
    }
    if !spec.source.is_empty() {
        parts.push(format!("from source '{}'", spec.source.join(", ")));
    }
    parts.join(" ")
}

pub struct LogAlertRuleReconciler;

#[async_trait]
impl Reconciler for LogAlertRuleReconciler {
    type Spec = LogAlertRuleSpec;

    async fn reconcile(
        &self,
        session: &mut Session,
        ctx: &ClusterContext,
        spec: &Self::Spec,
    ) -> Result<Outcome> {
        let criteria = Criteria::require(
            ResourceKind::LogAlertRule,
            &spec.name,
            spec.operator,
            spec.warning_value,
            spec.critical_value,
            spec.duration.as_deref(),
        )?;

        let rules = fetch_rules(&session.client, ctx).await?;
        let existing = find_rule(&rules, &spec.name);

        if let Some(record) = existing {
            if criteria.matches(record, &spec.description) {
                debug!("Log alert rule {} is up to date in {}", spec.name, ctx);
                return Ok(Outcome::Unchanged);
            }
        }

        let (id, outcome) = match existing {
            Some(record) => (str_field(record, "id").to_string(), Outcome::Updated),
            None => (new_id(), Outcome::Created),
        };

        let expr = expression::log_expression(
            &spec.content,
            &spec.level,
            &spec.event_type,
            &spec.source,
            criteria.operator,
            criteria.warning,
        );
        debug!("Expression for log alert rule {}: {}", spec.name, expr);

        let host_ids = session
            .refs
            .host_ids(&session.client, ctx, &spec.host_id)
            .await?;
        let integrations =
            routing_payload(session, ctx, &spec.routing, spec.routing_severity).await?;
        let filters = location_filters(&[
            ("dc", &spec.dc[..]),
            ("rack", &spec.rack[..]),
            ("host_id", &host_ids[..]),
        ]);

        let payload = json!({
            "id": id,
            "alert": spec.name,
            "for": criteria.duration,
            "operator": criteria.operator.as_str(),
            "warningValue": threshold(criteria.warning),
            "criticalValue": threshold(criteria.critical),
            "annotations": {
                "description": spec.description,
                "summary": summary(spec),
            },
            "integrations": integrations,
            "expr": expr,
            "clusterName": ctx.cluster,
            "filters": Value::from(filters),
        });

        info!("Log alert rule {} {} in {}", spec.name, outcome, ctx);
        upsert_rule(&session.client, ctx, &payload).await?;
        Ok(outcome)
    }

    async fn finalize(
        &self,
        session: &mut Session,
        ctx: &ClusterContext,
        spec: &Self::Spec,
    ) -> Result<Outcome> {
        delete_rule(&session.client, ctx, ResourceKind::LogAlertRule, &spec.name).await
    }
}
