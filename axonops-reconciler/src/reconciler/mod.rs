//! Reconcilers for the different resource kinds.
//!
//! Each reconciler compares the desired descriptor with the remote record found
//! by natural key and issues the smallest set of mutating calls to converge.

pub mod alert_rule;
pub mod backup;
pub mod health_check;
pub mod integration;
pub mod log_alert_rule;

use std::fmt;

use async_trait::async_trait;
use serde_json::Value;

use crate::client::ControlPlaneClient;
use crate::error::Result;
use crate::model::{ClusterContext, Descriptor, Intent, ResourceSpec};
use crate::resolver::ReferenceCache;

pub use alert_rule::AlertRuleReconciler;
pub use backup::BackupReconciler;
pub use health_check::HealthCheckReconciler;
pub use integration::IntegrationReconciler;
pub use log_alert_rule::LogAlertRuleReconciler;

/// One client plus its reference cache, shared by every resource using the same connection.
pub struct Session {
    pub client: ControlPlaneClient,
    pub refs: ReferenceCache,
}

impl Session {
    pub fn new(client: ControlPlaneClient) -> Self {
        Self {
            client,
            refs: ReferenceCache::new(),
        }
    }
}

/// What a reconciliation pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Created,
    Updated,
    Deleted,
    /// Present and already matching.
    Unchanged,
    /// Absent and nothing to delete.
    Absent,
}

impl Outcome {
    pub fn is_mutation(&self) -> bool {
        matches!(self, Outcome::Created | Outcome::Updated | Outcome::Deleted)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Outcome::Created => "created",
            Outcome::Updated => "updated",
            Outcome::Deleted => "deleted",
            Outcome::Unchanged => "unchanged",
            Outcome::Absent => "absent",
        })
    }
}

/// Trait for resource reconcilers.
#[async_trait]
pub trait Reconciler: Send + Sync {
    /// The desired properties of the resource.
    type Spec: ResourceSpec + Send + Sync;

    /// Converge a resource that should exist.
    async fn reconcile(
        &self,
        session: &mut Session,
        ctx: &ClusterContext,
        spec: &Self::Spec,
    ) -> Result<Outcome>;

    /// Remove a resource that should not exist.
    async fn finalize(
        &self,
        session: &mut Session,
        ctx: &ClusterContext,
        spec: &Self::Spec,
    ) -> Result<Outcome>;

    /// Dispatch on the descriptor's intent and attach the natural key to failures.
    async fn apply(
        &self,
        session: &mut Session,
        ctx: &ClusterContext,
        desired: &Descriptor<Self::Spec>,
    ) -> Result<Outcome> {
        let result = match desired.intent() {
            Intent::Present => self.reconcile(session, ctx, &desired.spec).await,
            Intent::Absent => self.finalize(session, ctx, &desired.spec).await,
        };
        result.map_err(|e| {
            e.in_resource(
                <Self::Spec as ResourceSpec>::KIND,
                desired.spec.natural_key(),
            )
        })
    }
}

/// Fresh identifier for a newly created record.
pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Thresholds go on the wire as integers when they are whole numbers.
pub(crate) fn threshold(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        Value::from(value as i64)
    } else {
        Value::from(value)
    }
}

/// Numeric equality regardless of integer or float encoding.
pub(crate) fn same_number(remote: Option<&Value>, desired: f64) -> bool {
    remote.and_then(Value::as_f64) == Some(desired)
}

/// String field of a remote record, treating missing and null as empty.
pub(crate) fn str_field<'a>(record: &'a Value, field: &str) -> &'a str {
    record.get(field).and_then(Value::as_str).unwrap_or_default()
}
