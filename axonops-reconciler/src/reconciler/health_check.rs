//! HTTP, TCP and shell checks, stored together in one health-check bundle.
//!
//! The bundle is read and written as a whole. Only the array of the kind being
//! reconciled is decoded; the sibling arrays are written back byte for byte.

use std::marker::PhantomData;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::value::{to_raw_value, RawValue};
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use super::{new_id, str_field, Outcome, Reconciler, Session};
use crate::client::ControlPlaneClient;
use crate::error::{Error, Result};
use crate::model::{ClusterContext, HttpCheckSpec, ResourceSpec, ShellCheckSpec, TcpCheckSpec};

const COLLECTION: &str = "healthchecks";

/// The three arrays of the bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckArray {
    Http,
    Tcp,
    Shell,
}

impl CheckArray {
    pub fn field(&self) -> &'static str {
        match self {
            CheckArray::Http => "httpchecks",
            CheckArray::Tcp => "tcpchecks",
            CheckArray::Shell => "shellchecks",
        }
    }
}

/// Bundle with every array kept as raw JSON.
#[derive(Debug, Deserialize, Serialize)]
struct Bundle {
    #[serde(default)]
    httpchecks: Option<Box<RawValue>>,
    #[serde(default)]
    tcpchecks: Option<Box<RawValue>>,
    #[serde(default)]
    shellchecks: Option<Box<RawValue>>,
}

impl Bundle {
    /// Missing or null arrays become `[]` so every write carries all three.
    fn normalized(self) -> Result<Self> {
        let empty = || {
            RawValue::from_string("[]".to_string()).map_err(|e| Error::decode(COLLECTION, e))
        };
        Ok(Self {
            httpchecks: Some(self.httpchecks.map_or_else(empty, Ok)?),
            tcpchecks: Some(self.tcpchecks.map_or_else(empty, Ok)?),
            shellchecks: Some(self.shellchecks.map_or_else(empty, Ok)?),
        })
    }

    fn slot(&mut self, array: CheckArray) -> &mut Option<Box<RawValue>> {
        match array {
            CheckArray::Http => &mut self.httpchecks,
            CheckArray::Tcp => &mut self.tcpchecks,
            CheckArray::Shell => &mut self.shellchecks,
        }
    }

    /// Entries of one array, each still raw.
    fn entries(&mut self, array: CheckArray) -> Result<Vec<Box<RawValue>>> {
        match self.slot(array) {
            Some(raw) => serde_json::from_str(raw.get())
                .map_err(|e| Error::decode(format!("{} array", array.field()), e)),
            None => Ok(Vec::new()),
        }
    }

    fn replace(&mut self, array: CheckArray, entries: &[Box<RawValue>]) -> Result<()> {
        let raw = to_raw_value(entries).map_err(|e| Error::decode(array.field(), e))?;
        *self.slot(array) = Some(raw);
        Ok(())
    }
}

/// Kind-specific side of a health check.
pub trait HealthCheck: ResourceSpec + Send + Sync {
    const ARRAY: CheckArray;

    fn name(&self) -> &str;
    fn interval(&self) -> &str;
    fn timeout(&self) -> &str;

    /// Wire fields beyond the common ones; all of them take part in change detection.
    fn check_fields(&self) -> Map<String, Value>;
}

impl HealthCheck for HttpCheckSpec {
    const ARRAY: CheckArray = CheckArray::Http;

    fn name(&self) -> &str {
        &self.name
    }

    fn interval(&self) -> &str {
        &self.interval
    }

    fn timeout(&self) -> &str {
        &self.timeout
    }

    fn check_fields(&self) -> Map<String, Value> {
        let headers: Map<String, Value> = self
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), Value::from(v.to_vec())))
            .collect();

        let mut fields = Map::new();
        fields.insert("http".into(), Value::from(self.url.as_str()));
        fields.insert("method".into(), Value::from(self.http_method.as_str()));
        fields.insert("headers".into(), Value::Object(headers));
        fields.insert("body".into(), Value::from(self.body.as_str()));
        fields.insert("expectedStatus".into(), Value::from(self.expected_status));
        fields
    }
}

impl HealthCheck for TcpCheckSpec {
    const ARRAY: CheckArray = CheckArray::Tcp;

    fn name(&self) -> &str {
        &self.name
    }

    fn interval(&self) -> &str {
        &self.interval
    }

    fn timeout(&self) -> &str {
        &self.timeout
    }

    fn check_fields(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("tcp".into(), Value::from(self.tcp.as_str()));
        fields
    }
}

impl HealthCheck for ShellCheckSpec {
    const ARRAY: CheckArray = CheckArray::Shell;

    fn name(&self) -> &str {
        &self.name
    }

    fn interval(&self) -> &str {
        &self.interval
    }

    fn timeout(&self) -> &str {
        &self.timeout
    }

    fn check_fields(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("shell".into(), Value::from(self.shell.as_str()));
        fields.insert("script".into(), Value::from(self.script.as_str()));
        fields
    }
}

fn unchanged<C: HealthCheck>(record: &Value, spec: &C) -> bool {
    str_field(record, "interval") == spec.interval()
        && str_field(record, "timeout") == spec.timeout()
        && spec
            .check_fields()
            .iter()
            .all(|(key, desired)| record.get(key) == Some(desired))
}

fn payload<C: HealthCheck>(spec: &C, id: &str) -> Value {
    let mut check = Map::new();
    check.insert("id".into(), Value::from(id));
    check.insert("name".into(), Value::from(spec.name()));
    check.insert("interval".into(), Value::from(spec.interval()));
    check.insert("timeout".into(), Value::from(spec.timeout()));
    check.insert(
        "integrations".into(),
        json!({
            "Type": "",
            "Routing": null,
            "OverrideInfo": false,
            "OverrideWarning": false,
            "OverrideError": false,
        }),
    );
    check.insert("readonly".into(), Value::Bool(false));
    check.extend(spec.check_fields());
    check.insert("serviceCheckType".into(), Value::from(C::ARRAY.field()));
    Value::Object(check)
}

async fn fetch_bundle(client: &ControlPlaneClient, ctx: &ClusterContext) -> Result<Bundle> {
    let bundle: Option<Bundle> = client.get(&ctx.path(COLLECTION)).await?;
    bundle
        .unwrap_or(Bundle {
            httpchecks: None,
            tcpchecks: None,
            shellchecks: None,
        })
        .normalized()
}

/// Position and decoded form of the entry named `name`.
fn locate(entries: &[Box<RawValue>], name: &str) -> Result<Option<(usize, Value)>> {
    for (index, raw) in entries.iter().enumerate() {
        let record: Value = serde_json::from_str(raw.get())
            .map_err(|e| Error::decode("health check record", e))?;
        if str_field(&record, "name") == name {
            return Ok(Some((index, record)));
        }
    }
    Ok(None)
}

/// Reconciles one kind of health check inside the shared bundle.
pub struct HealthCheckReconciler<C> {
    _kind: PhantomData<fn() -> C>,
}

impl<C> HealthCheckReconciler<C> {
    pub fn new() -> Self {
        Self { _kind: PhantomData }
    }
}

impl<C> Default for HealthCheckReconciler<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: HealthCheck> HealthCheckReconciler<C> {
    fn validate(&self, spec: &C) -> Result<()> {
        let missing = match (spec.interval().is_empty(), spec.timeout().is_empty()) {
            (true, true) => "interval and timeout are required",
            (true, false) => "interval is required",
            (false, true) => "timeout is required",
            (false, false) => return Ok(()),
        };
        Err(Error::Validation {
            kind: C::KIND,
            key: spec.natural_key(),
            reason: missing.to_string(),
        })
    }
}

#[async_trait]
impl<C: HealthCheck> Reconciler for HealthCheckReconciler<C> {
    type Spec = C;

    async fn reconcile(
        &self,
        session: &mut Session,
        ctx: &ClusterContext,
        spec: &Self::Spec,
    ) -> Result<Outcome> {
        self.validate(spec)?;

        let mut bundle = fetch_bundle(&session.client, ctx).await?;
        let mut entries = bundle.entries(C::ARRAY)?;

        let outcome = match locate(&entries, spec.name())? {
            Some((_, record)) if unchanged(&record, spec) => {
                debug!("{} {} is up to date in {}", C::KIND, spec.name(), ctx);
                return Ok(Outcome::Unchanged);
            }
            Some((index, record)) => {
                let raw = to_raw_value(&payload(spec, str_field(&record, "id")))
                    .map_err(|e| Error::decode(C::ARRAY.field(), e))?;
                entries[index] = raw;
                Outcome::Updated
            }
            None => {
                let raw = to_raw_value(&payload(spec, &new_id()))
                    .map_err(|e| Error::decode(C::ARRAY.field(), e))?;
                entries.push(raw);
                Outcome::Created
            }
        };

        bundle.replace(C::ARRAY, &entries)?;
        info!("{} {} {} in {}", C::KIND, spec.name(), outcome, ctx);
        session.client.put(&ctx.path(COLLECTION), &bundle).await?;
        Ok(outcome)
    }

    async fn finalize(
        &self,
        session: &mut Session,
        ctx: &ClusterContext,
        spec: &Self::Spec,
    ) -> Result<Outcome> {
        let mut bundle = fetch_bundle(&session.client, ctx).await?;
        let mut entries = bundle.entries(C::ARRAY)?;

        let Some((index, _)) = locate(&entries, spec.name())? else {
            debug!(
                "{} {} does not exist in {}, nothing to delete",
                C::KIND,
                spec.name(),
                ctx
            );
            return Ok(Outcome::Absent);
        };

        entries.remove(index);
        bundle.replace(C::ARRAY, &entries)?;
        info!("Deleting {} {} in {}", C::KIND, spec.name(), ctx);
        session.client.put(&ctx.path(COLLECTION), &bundle).await?;
        Ok(Outcome::Deleted)
    }
}
