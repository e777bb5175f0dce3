//! Walks a list of descriptors in order and converges each one.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use tracing::{error, info};

use crate::client::ControlPlaneClient;
use crate::config::{self, ClientConfig};
use crate::error::{Error, Result};
use crate::model::{Connection, HttpCheckSpec, Resource, ResourceKind, ShellCheckSpec, TcpCheckSpec};
use crate::reconciler::{
    AlertRuleReconciler, BackupReconciler, HealthCheckReconciler, IntegrationReconciler,
    LogAlertRuleReconciler, Outcome, Reconciler, Session,
};

/// Source of environment variables used to complete connection settings.
pub type EnvLookup = fn(&str) -> Option<String>;

fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// A resource that converged during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied {
    pub kind: ResourceKind,
    pub key: String,
    pub cluster: String,
    pub outcome: Outcome,
}

/// Result of a run: everything converged before the first failure, and that failure.
#[derive(Debug, Default)]
pub struct RunReport {
    pub applied: Vec<Applied>,
    pub failure: Option<Error>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    /// Number of resources that needed a mutating call.
    pub fn changed(&self) -> usize {
        self.applied.iter().filter(|a| a.outcome.is_mutation()).count()
    }
}

/// Reconciliation engine.
///
/// Each run builds one [`Session`] per distinct connection and drops them all
/// when it ends, so reference caches never outlive a run.
pub struct Engine {
    defaults: Connection,
    env: EnvLookup,
    alert_rules: AlertRuleReconciler,
    log_alert_rules: LogAlertRuleReconciler,
    http_checks: HealthCheckReconciler<HttpCheckSpec>,
    tcp_checks: HealthCheckReconciler<TcpCheckSpec>,
    shell_checks: HealthCheckReconciler<ShellCheckSpec>,
    backups: BackupReconciler,
    integrations: IntegrationReconciler,
}

impl Engine {
    /// Engine whose descriptors inherit `defaults`, completed from the process environment.
    pub fn new(defaults: Connection) -> Self {
        Self::with_env(defaults, process_env)
    }

    pub fn with_env(defaults: Connection, env: EnvLookup) -> Self {
        Self {
            defaults,
            env,
            alert_rules: AlertRuleReconciler,
            log_alert_rules: LogAlertRuleReconciler,
            http_checks: HealthCheckReconciler::new(),
            tcp_checks: HealthCheckReconciler::new(),
            shell_checks: HealthCheckReconciler::new(),
            backups: BackupReconciler,
            integrations: IntegrationReconciler,
        }
    }

    /// Converge `resources` in order, stopping at the first failure.
    ///
    /// Resources converged before the failure stay applied.
    pub async fn run(&self, resources: &[Resource]) -> RunReport {
        let mut sessions: HashMap<ClientConfig, Session> = HashMap::new();
        let mut report = RunReport::default();

        for resource in resources {
            let kind = resource.kind();
            let key = resource.natural_key();

            match self.converge(&mut sessions, resource).await {
                Ok((cluster, outcome)) => {
                    info!("{} {}: {}", kind, key, outcome);
                    report.applied.push(Applied {
                        kind,
                        key,
                        cluster,
                        outcome,
                    });
                }
                Err(e) => {
                    let e = e.in_resource(kind, key);
                    error!("Reconciliation stopped: {}", e);
                    report.failure = Some(e);
                    break;
                }
            }
        }

        info!(
            "Run finished: {} applied, {} changed{}",
            report.applied.len(),
            report.changed(),
            if report.is_success() { "" } else { ", 1 failed" }
        );
        report
    }

    async fn converge(
        &self,
        sessions: &mut HashMap<ClientConfig, Session>,
        resource: &Resource,
    ) -> Result<(String, Outcome)> {
        let connection = self.defaults.overlay(resource.connection());
        let (client_config, ctx) = config::resolve(&connection, self.env)?;

        let session = match sessions.entry(client_config) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                info!("Connecting to {}", entry.key().base_url);
                let client = ControlPlaneClient::new(entry.key().clone())?;
                entry.insert(Session::new(client))
            }
        };

        info!(
            "Reconciling {} {} in {}",
            resource.kind(),
            resource.natural_key(),
            ctx
        );
        let outcome = match resource {
            Resource::AlertRule(d) => self.alert_rules.apply(session, &ctx, d).await?,
            Resource::LogAlertRule(d) => self.log_alert_rules.apply(session, &ctx, d).await?,
            Resource::HttpCheck(d) => self.http_checks.apply(session, &ctx, d).await?,
            Resource::TcpCheck(d) => self.tcp_checks.apply(session, &ctx, d).await?,
            Resource::ShellCheck(d) => self.shell_checks.apply(session, &ctx, d).await?,
            Resource::Backup(d) => self.backups.apply(session, &ctx, d).await?,
            Resource::Integration(d) => self.integrations.apply(session, &ctx, d).await?,
        };

        Ok((ctx.to_string(), outcome))
    }
}
