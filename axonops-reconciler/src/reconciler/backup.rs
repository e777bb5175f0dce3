//! Scheduled snapshot backups, matched by the tag inside their encoded details.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use super::{Outcome, Reconciler, Session};
use crate::client::ControlPlaneClient;
use crate::error::{Error, Result};
use crate::model::{BackupSpec, ClusterContext, RemoteType};

const SCHEDULES: &str = "cassandraScheduleSnapshot";
const SNAPSHOTS: &str = "cassandraSnapshot";

/// Detail fields that decide whether a schedule has to be recreated.
const COMPARED_FIELDS: [&str; 7] = [
    "LocalRetentionDuration",
    "RemoteRetentionDuration",
    "Remote",
    "remoteType",
    "scheduleExpr",
    "keyspaces",
    "datacenters",
];

/// A remote schedule and its decoded details.
#[derive(Debug, Clone)]
struct Schedule {
    id: Value,
    details: Value,
}

/// Render the rclone remote for the typed settings, one `key = value` per line.
pub fn remote_config(spec: &BackupSpec) -> String {
    if !spec.remote_config.is_empty() {
        return spec.remote_config.clone();
    }

    let mut config: Vec<(&str, String)> = Vec::new();
    match spec.remote_type {
        RemoteType::S3 => {
            let s3 = &spec.s3;
            config.push(("type", "s3".to_string()));
            config.push(("provider", "AWS".to_string()));
            config.push(("storage_class", s3.storage_class.clone()));
            config.push(("region", s3.region.clone()));
            config.push(("acl", s3.acl.clone()));
            config.push(("server_side_encryption", s3.encryption.clone()));
            config.push(("no_check_bucket", s3.no_check_bucket.to_string()));
            config.push(("disable_checksum", s3.disable_checksum.to_string()));
            if !s3.access_key_id.is_empty() && !s3.secret_access_key.is_empty() {
                config.push(("env_auth", "false".to_string()));
                config.push(("access_key_id", s3.access_key_id.clone()));
                config.push(("secret_access_key", s3.secret_access_key.clone()));
            } else {
                config.push(("env_auth", "true".to_string()));
            }
        }
        RemoteType::Sftp => {
            let sftp = &spec.sftp;
            config.push(("type", "sftp".to_string()));
            config.push(("host", sftp.host.clone()));
            config.push(("user", sftp.user.clone()));
            for (key, value) in [
                ("pass", &sftp.pass),
                ("port", &sftp.port),
                ("key_file", &sftp.key_file),
            ] {
                if !value.is_empty() {
                    config.push((key, value.clone()));
                }
            }
        }
        RemoteType::Azure => {
            let azure = &spec.azure;
            config.push(("type", "azureblob".to_string()));
            config.push(("account", azure.account.clone()));
            if azure.use_msi {
                config.push(("use_msi", "true".to_string()));
                for (key, value) in [
                    ("msi_object_id", &azure.msi_object_id),
                    ("msi_client_id", &azure.msi_client_id),
                    ("msi_mi_res_id", &azure.msi_mi_res_id),
                ] {
                    if !value.is_empty() {
                        config.push((key, value.clone()));
                    }
                }
            } else if !azure.key.is_empty() {
                config.push(("key", azure.key.clone()));
            }
        }
        RemoteType::Local => {}
    }

    config
        .iter()
        .map(|(key, value)| format!("{} = {}", key, value))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Full schedule payload, also the shape stored in `BackupDetails`.
pub fn payload(spec: &BackupSpec) -> Map<String, Value> {
    let tables: Vec<Value> = spec.tables.iter().map(|t| json!({"Name": t})).collect();

    let value = json!({
        "LocalRetentionDuration": spec.local_retention_duration,
        "remoteConfig": remote_config(spec),
        "remotePath": spec.remote_path,
        "RemoteRetentionDuration": spec.remote_retention_duration,
        "delegateRemoteRetention": spec.delegate_remote_retention,
        "remoteType": spec.remote_type.as_str(),
        "timeout": spec.timeout,
        "transfers": spec.transfers,
        "Remote": spec.remote,
        "tpslimit": spec.tpslimit,
        "bwlimit": spec.bwlimit,
        "fullBackup": spec.full_backup,
        "dynamicRemoteFields": spec.dynamic_remote_fields,
        "tag": spec.tag(),
        "datacenters": spec.datacenters,
        "racks": spec.racks,
        "nodes": spec.nodes,
        "tables": tables,
        "allTables": spec.all_tables,
        "allNodes": spec.all_nodes,
        "keyspaces": spec.keyspaces,
        "simpleSchedule": spec.simple_schedule,
        "schedule": spec.schedule,
        "scheduleExpr": spec.schedule_expr,
    });

    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn unchanged(details: &Value, desired: &Map<String, Value>) -> bool {
    COMPARED_FIELDS
        .iter()
        .all(|field| details.get(*field) == desired.get(*field))
}

/// Find the schedule whose encoded details carry `tag`.
///
/// Details that do not decode are skipped; they cannot belong to this tag.
/// A listing that is not an array is a decode error.
fn find_schedule(body: Option<&Value>, tag: &str) -> Result<Option<Schedule>> {
    let schedules = match body.and_then(|b| b.get("ScheduledSnapshots")) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Array(schedules)) => schedules,
        Some(other) => {
            return Err(Error::decode(
                "backup schedules",
                format!("expected an array of schedules, got {}", other),
            ))
        }
    };

    for schedule in schedules {
        let params = schedule.get("Params").and_then(Value::as_array);
        for param in params.into_iter().flatten() {
            let Some(encoded) = param.get("BackupDetails").and_then(Value::as_str) else {
                continue;
            };
            let details: Value = match serde_json::from_str(encoded) {
                Ok(details) => details,
                Err(e) => {
                    warn!("Skipping backup schedule with undecodable details: {}", e);
                    continue;
                }
            };
            if details.get("tag").and_then(Value::as_str) == Some(tag) {
                return Ok(Some(Schedule {
                    id: schedule.get("ID").cloned().unwrap_or(Value::Null),
                    details,
                }));
            }
        }
    }
    Ok(None)
}

async fn delete_schedule(
    client: &ControlPlaneClient,
    ctx: &ClusterContext,
    schedule: &Schedule,
) -> Result<()> {
    let empty = match &schedule.id {
        Value::Null => true,
        Value::String(id) => id.is_empty(),
        _ => false,
    };
    if empty {
        return Err(Error::decode("backup schedule", "record has no ID"));
    }
    client
        .delete_with_body(&ctx.path(SCHEDULES), &[&schedule.id])
        .await?;
    Ok(())
}

pub struct BackupReconciler;

#[async_trait]
impl Reconciler for BackupReconciler {
    type Spec = BackupSpec;

    async fn reconcile(
        &self,
        session: &mut Session,
        ctx: &ClusterContext,
        spec: &Self::Spec,
    ) -> Result<Outcome> {
        let tag = spec.tag();
        let body: Option<Value> = session.client.get(&ctx.path(SCHEDULES)).await?;
        let existing = find_schedule(body.as_ref(), tag)?;
        let desired = payload(spec);

        let outcome = match &existing {
            Some(schedule) if unchanged(&schedule.details, &desired) => {
                debug!("Backup {} is up to date in {}", tag, ctx);
                return Ok(Outcome::Unchanged);
            }
            Some(schedule) => {
                // no in-place update: replace the schedule
                info!("Replacing backup {} in {}", tag, ctx);
                delete_schedule(&session.client, ctx, schedule).await?;
                Outcome::Updated
            }
            None => Outcome::Created,
        };

        info!("Backup {} {} in {}", tag, outcome, ctx);
        session
            .client
            .post(&ctx.path(SNAPSHOTS), &Value::Object(desired))
            .await?;
        Ok(outcome)
    }

    async fn finalize(
        &self,
        session: &mut Session,
        ctx: &ClusterContext,
        spec: &Self::Spec,
    ) -> Result<Outcome> {
        let tag = spec.tag();
        let body: Option<Value> = session.client.get(&ctx.path(SCHEDULES)).await?;
        let Some(schedule) = find_schedule(body.as_ref(), tag)? else {
            debug!("Backup {} does not exist in {}, nothing to delete", tag, ctx);
            return Ok(Outcome::Absent);
        };

        info!("Deleting backup {} in {}", tag, ctx);
        delete_schedule(&session.client, ctx, &schedule).await?;
        Ok(Outcome::Deleted)
    }
}
