//! Notification integrations (Slack, PagerDuty, SMTP, ...), unique by name across types.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use super::{Outcome, Reconciler, Session};
use crate::error::{Error, Result};
use crate::model::{ClusterContext, IntegrationSettings, IntegrationSpec};

const COLLECTION: &str = "integrations";

/// `Params` of the remote definition, including the name.
pub fn params(spec: &IntegrationSpec) -> Map<String, Value> {
    let mut params = Map::new();
    params.insert("name".into(), Value::from(spec.name.as_str()));

    let mut put = |key: &str, value: Value| {
        params.insert(key.to_string(), value);
    };
    let text = |value: &str| Value::from(value);

    match &spec.settings {
        IntegrationSettings::Slack {
            webhook_url,
            channel,
            axondash_url,
        } => {
            put("url", text(webhook_url));
            if !channel.is_empty() {
                put("channel", text(channel));
            }
            if !axondash_url.is_empty() {
                put("axondashUrl", text(axondash_url));
            }
        }
        IntegrationSettings::Pagerduty { integration_key } => {
            put("integration_key", text(integration_key));
        }
        IntegrationSettings::MicrosoftTeams { webhook_url } => {
            put("webHookURL", text(webhook_url));
        }
        IntegrationSettings::Smtp {
            username,
            password,
            from,
            receivers,
            subject,
            server,
            port,
            skip_certificate_verify,
            start_tls,
            auth_login,
        } => {
            put("username", text(username));
            put("password", text(password));
            put("from", text(from));
            put("receivers", text(receivers));
            put("subject", text(subject));
            put("server", text(server));
            put("port", text(port));
            put("skipCertificateVerify", Value::Bool(*skip_certificate_verify));
            put("startTLS", Value::Bool(*start_tls));
            put("authLogin", Value::Bool(*auth_login));
        }
        IntegrationSettings::Servicenow {
            instance_url,
            username,
            password,
            client_id,
            client_secret,
        } => {
            put("instance_url", text(instance_url));
            put("username", text(username));
            put("password", text(password));
            if !client_id.is_empty() {
                put("client_id", text(client_id));
            }
            if !client_secret.is_empty() {
                put("client_secret", text(client_secret));
            }
        }
        IntegrationSettings::Opsgenie { api_key, api_url } => {
            put("api_key", text(api_key));
            put("api_url", text(api_url));
        }
        IntegrationSettings::GeneralWebhook { url, headers } => {
            put("url", text(url));
            put("headers", json!(headers));
        }
    }

    params
}

pub struct IntegrationReconciler;

#[async_trait]
impl Reconciler for IntegrationReconciler {
    type Spec = IntegrationSpec;

    async fn reconcile(
        &self,
        session: &mut Session,
        ctx: &ClusterContext,
        spec: &Self::Spec,
    ) -> Result<Outcome> {
        let kind = spec.settings.type_name();
        let catalog = session.refs.integrations(&session.client, ctx).await?;

        let existing = catalog
            .iter()
            .find(|d| d.kind == kind && d.name() == spec.name)
            .cloned();

        if existing.is_none() {
            if let Some(other) = catalog.iter().find(|d| d.name() == spec.name) {
                return Err(Error::NamingConflict {
                    name: spec.name.clone(),
                    existing_type: other.kind.clone(),
                });
            }
        }

        let desired = params(spec);
        let mut payload = Map::new();
        let outcome = match &existing {
            Some(definition) if definition.params == desired => {
                debug!("Integration {} ({}) is up to date in {}", spec.name, kind, ctx);
                return Ok(Outcome::Unchanged);
            }
            Some(definition) => {
                payload.insert("ID".into(), Value::from(definition.id.as_str()));
                Outcome::Updated
            }
            None => Outcome::Created,
        };
        payload.insert("Type".into(), Value::from(kind));
        payload.insert("Params".into(), Value::Object(desired));

        info!("Integration {} ({}) {} in {}", spec.name, kind, outcome, ctx);
        session
            .client
            .post(&ctx.path(COLLECTION), &Value::Object(payload))
            .await?;
        session.refs.invalidate_integrations(ctx);
        Ok(outcome)
    }

    async fn finalize(
        &self,
        session: &mut Session,
        ctx: &ClusterContext,
        spec: &Self::Spec,
    ) -> Result<Outcome> {
        let kind = spec.settings.type_name();
        let Some(existing) = session
            .refs
            .find_integration(&session.client, ctx, kind, &spec.name)
            .await?
        else {
            debug!(
                "Integration {} ({}) does not exist in {}, nothing to delete",
                spec.name, kind, ctx
            );
            return Ok(Outcome::Absent);
        };

        info!("Deleting integration {} ({}) in {}", spec.name, kind, ctx);
        session
            .client
            .delete(&format!("{}/{}", ctx.path(COLLECTION), existing.id))
            .await?;
        session.refs.invalidate_integrations(ctx);
        Ok(Outcome::Deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::WebhookHeader;

    fn spec(name: &str, settings: IntegrationSettings) -> IntegrationSpec {
        IntegrationSpec {
            name: name.to_string(),
            settings,
        }
    }

    #[test]
    fn test_slack_params_skip_empty_optionals() {
        let params = params(&spec(
            "ops",
            IntegrationSettings::Slack {
                webhook_url: "https://hooks.slack.com/x".to_string(),
                channel: String::new(),
                axondash_url: "https://dash".to_string(),
            },
        ));
        assert_eq!(
            Value::Object(params),
            json!({"name": "ops", "url": "https://hooks.slack.com/x", "axondashUrl": "https://dash"})
        );
    }

    #[test]
    fn test_smtp_params() {
        let params = params(&spec(
            "mail",
            IntegrationSettings::Smtp {
                username: "u".to_string(),
                password: "p".to_string(),
                from: "axon@example.com".to_string(),
                receivers: "ops@example.com".to_string(),
                subject: String::new(),
                server: "smtp.example.com".to_string(),
                port: "25".to_string(),
                skip_certificate_verify: false,
                start_tls: true,
                auth_login: true,
            },
        ));
        assert_eq!(params["port"], "25");
        assert_eq!(params["startTLS"], true);
        assert_eq!(params["username"], "u");
    }

    #[test]
    fn test_webhook_headers() {
        let params = params(&spec(
            "hook",
            IntegrationSettings::GeneralWebhook {
                url: "https://hook".to_string(),
                headers: vec![WebhookHeader {
                    header: "X-Token".to_string(),
                    value: "abc".to_string(),
                }],
            },
        ));
        assert_eq!(params["headers"], json!([{"header": "X-Token", "value": "abc"}]));
    }
}
