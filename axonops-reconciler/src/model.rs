//! Desired-state descriptors and the shared vocabulary of the control plane.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Monitored cluster flavour, part of every API path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterType {
    #[default]
    Cassandra,
    Kafka,
}

impl ClusterType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClusterType::Cassandra => "cassandra",
            ClusterType::Kafka => "kafka",
        }
    }
}

impl fmt::Display for ClusterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ClusterType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cassandra" => Ok(ClusterType::Cassandra),
            "kafka" => Ok(ClusterType::Kafka),
            other => Err(format!("unknown cluster type '{}'", other)),
        }
    }
}

/// (organization, cluster, cluster type): scopes every call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClusterContext {
    pub org: String,
    pub cluster: String,
    pub cluster_type: ClusterType,
}

impl ClusterContext {
    pub fn new(org: impl Into<String>, cluster: impl Into<String>, cluster_type: ClusterType) -> Self {
        Self {
            org: org.into(),
            cluster: cluster.into(),
            cluster_type,
        }
    }

    /// Cluster-scoped collection path, e.g. `/api/v1/alert-rules/acme/cassandra/prod`.
    pub fn path(&self, collection: &str) -> String {
        format!(
            "/api/v1/{}/{}/{}/{}",
            collection, self.org, self.cluster_type, self.cluster
        )
    }
}

impl fmt::Display for ClusterContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.org, self.cluster_type, self.cluster)
    }
}

/// The resource families the engine knows how to converge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    AlertRule,
    LogAlertRule,
    HttpCheck,
    TcpCheck,
    ShellCheck,
    Backup,
    Integration,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResourceKind::AlertRule => "alert rule",
            ResourceKind::LogAlertRule => "log alert rule",
            ResourceKind::HttpCheck => "HTTP check",
            ResourceKind::TcpCheck => "TCP check",
            ResourceKind::ShellCheck => "shell check",
            ResourceKind::Backup => "backup",
            ResourceKind::Integration => "integration",
        })
    }
}

/// Whether the resource should exist remotely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Present,
    Absent,
}

/// Per-descriptor overrides of the run's connection defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Deserialize)]
pub struct Connection {
    #[serde(default)]
    pub org: Option<String>,
    #[serde(default)]
    pub cluster: Option<String>,
    #[serde(default)]
    pub cluster_type: Option<ClusterType>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default)]
    pub api_token: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub override_saas: Option<bool>,
}

fn present_by_default() -> bool {
    true
}

/// A desired resource: connection overrides, intent flag and kind-specific properties.
#[derive(Debug, Clone, Deserialize)]
pub struct Descriptor<S> {
    #[serde(flatten)]
    pub connection: Connection,
    #[serde(default = "present_by_default")]
    pub present: bool,
    #[serde(flatten)]
    pub spec: S,
}

impl<S> Descriptor<S> {
    pub fn present(spec: S) -> Self {
        Self {
            connection: Connection::default(),
            present: true,
            spec,
        }
    }

    pub fn absent(spec: S) -> Self {
        Self {
            connection: Connection::default(),
            present: false,
            spec,
        }
    }

    pub fn intent(&self) -> Intent {
        if self.present {
            Intent::Present
        } else {
            Intent::Absent
        }
    }
}

/// Kind-specific properties that know their own natural key.
pub trait ResourceSpec {
    const KIND: ResourceKind;

    /// Identity of the resource across runs, independent of the remote identifier.
    fn natural_key(&self) -> String;
}

/// Every descriptor the engine accepts, tagged by `kind`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Resource {
    AlertRule(Descriptor<AlertRuleSpec>),
    LogAlertRule(Descriptor<LogAlertRuleSpec>),
    HttpCheck(Descriptor<HttpCheckSpec>),
    TcpCheck(Descriptor<TcpCheckSpec>),
    ShellCheck(Descriptor<ShellCheckSpec>),
    Backup(Descriptor<BackupSpec>),
    Integration(Descriptor<IntegrationSpec>),
}

impl Resource {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Resource::AlertRule(_) => ResourceKind::AlertRule,
            Resource::LogAlertRule(_) => ResourceKind::LogAlertRule,
            Resource::HttpCheck(_) => ResourceKind::HttpCheck,
            Resource::TcpCheck(_) => ResourceKind::TcpCheck,
            Resource::ShellCheck(_) => ResourceKind::ShellCheck,
            Resource::Backup(_) => ResourceKind::Backup,
            Resource::Integration(_) => ResourceKind::Integration,
        }
    }

    pub fn natural_key(&self) -> String {
        match self {
            Resource::AlertRule(d) => d.spec.natural_key(),
            Resource::LogAlertRule(d) => d.spec.natural_key(),
            Resource::HttpCheck(d) => d.spec.natural_key(),
            Resource::TcpCheck(d) => d.spec.natural_key(),
            Resource::ShellCheck(d) => d.spec.natural_key(),
            Resource::Backup(d) => d.spec.natural_key(),
            Resource::Integration(d) => d.spec.natural_key(),
        }
    }

    pub fn connection(&self) -> &Connection {
        match self {
            Resource::AlertRule(d) => &d.connection,
            Resource::LogAlertRule(d) => &d.connection,
            Resource::HttpCheck(d) => &d.connection,
            Resource::TcpCheck(d) => &d.connection,
            Resource::ShellCheck(d) => &d.connection,
            Resource::Backup(d) => &d.connection,
            Resource::Integration(d) => &d.connection,
        }
    }
}

// === Alerting ===

/// Comparison operator shared by metric and log alerts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "!=")]
    Ne,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ge => ">=",
            Operator::Gt => ">",
            Operator::Le => "<=",
            Operator::Lt => "<",
            Operator::Ne => "!=",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity attached to a notification route.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    #[default]
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

/// A notification target, either a bare integration name or a name with its own severity.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Route {
    Name(String),
    Detailed {
        name: String,
        #[serde(default)]
        severity: Option<Severity>,
    },
}

impl Route {
    pub fn name(&self) -> &str {
        match self {
            Route::Name(name) => name,
            Route::Detailed { name, .. } => name,
        }
    }

    pub fn severity(&self, default: Severity) -> Severity {
        match self {
            Route::Name(_) => default,
            Route::Detailed { severity, .. } => severity.unwrap_or(default),
        }
    }
}

/// Metric or event alert bound to a dashboard chart.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AlertRuleSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub dashboard: String,
    #[serde(default)]
    pub chart: String,
    #[serde(default)]
    pub operator: Option<Operator>,
    #[serde(default)]
    pub warning_value: Option<f64>,
    #[serde(default)]
    pub critical_value: Option<f64>,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub scope: Vec<String>,
    #[serde(default)]
    pub dc: Vec<String>,
    #[serde(default)]
    pub rack: Vec<String>,
    /// Host names, IPs or host ids; resolved through the node list.
    #[serde(default)]
    pub host_id: Vec<String>,
    #[serde(default)]
    pub group_by: Vec<String>,
    #[serde(default)]
    pub percentile: Vec<String>,
    #[serde(default)]
    pub consistency: Vec<String>,
    #[serde(default)]
    pub keyspace: Vec<String>,
    /// Event level filter, used when the chart is an events timeline.
    #[serde(default)]
    pub level: Vec<String>,
    /// Event type filter, used when the chart is an events timeline.
    #[serde(default, rename = "type")]
    pub event_type: Vec<String>,
    #[serde(default)]
    pub routing: Vec<Route>,
    #[serde(default)]
    pub routing_severity: Severity,
}

impl ResourceSpec for AlertRuleSpec {
    const KIND: ResourceKind = ResourceKind::AlertRule;

    fn natural_key(&self) -> String {
        self.name.clone()
    }
}

fn default_log_operator() -> Option<Operator> {
    Some(Operator::Ge)
}

/// Alert on log events matching content/level/type/source filters.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogAlertRuleSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_log_operator")]
    pub operator: Option<Operator>,
    #[serde(default)]
    pub warning_value: Option<f64>,
    #[serde(default)]
    pub critical_value: Option<f64>,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub level: Vec<String>,
    #[serde(default, rename = "type")]
    pub event_type: Vec<String>,
    #[serde(default)]
    pub source: Vec<String>,
    #[serde(default)]
    pub dc: Vec<String>,
    #[serde(default)]
    pub rack: Vec<String>,
    #[serde(default)]
    pub host_id: Vec<String>,
    #[serde(default)]
    pub routing: Vec<Route>,
    #[serde(default)]
    pub routing_severity: Severity,
}

impl ResourceSpec for LogAlertRuleSpec {
    const KIND: ResourceKind = ResourceKind::LogAlertRule;

    fn natural_key(&self) -> String {
        self.name.clone()
    }
}

// === Health checks ===

/// Header values may be given as a single string or a list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum HeaderValues {
    One(String),
    Many(Vec<String>),
}

impl HeaderValues {
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            HeaderValues::One(value) => vec![value.clone()],
            HeaderValues::Many(values) => values.clone(),
        }
    }
}

fn default_http_method() -> String {
    "GET".to_string()
}

fn default_expected_status() -> u16 {
    200
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpCheckSpec {
    pub name: String,
    #[serde(default)]
    pub interval: String,
    #[serde(default)]
    pub timeout: String,
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_http_method")]
    pub http_method: String,
    #[serde(default)]
    pub headers: BTreeMap<String, HeaderValues>,
    #[serde(default)]
    pub body: String,
    #[serde(default = "default_expected_status")]
    pub expected_status: u16,
}

impl ResourceSpec for HttpCheckSpec {
    const KIND: ResourceKind = ResourceKind::HttpCheck;

    fn natural_key(&self) -> String {
        self.name.clone()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TcpCheckSpec {
    pub name: String,
    #[serde(default)]
    pub interval: String,
    #[serde(default)]
    pub timeout: String,
    #[serde(default)]
    pub tcp: String,
}

impl ResourceSpec for TcpCheckSpec {
    const KIND: ResourceKind = ResourceKind::TcpCheck;

    fn natural_key(&self) -> String {
        self.name.clone()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShellCheckSpec {
    pub name: String,
    #[serde(default)]
    pub interval: String,
    #[serde(default)]
    pub timeout: String,
    #[serde(default)]
    pub shell: String,
    #[serde(default)]
    pub script: String,
}

impl ResourceSpec for ShellCheckSpec {
    const KIND: ResourceKind = ResourceKind::ShellCheck;

    fn natural_key(&self) -> String {
        self.name.clone()
    }
}

// === Backups ===

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteType {
    Local,
    #[default]
    S3,
    Sftp,
    Azure,
}

impl RemoteType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemoteType::Local => "local",
            RemoteType::S3 => "s3",
            RemoteType::Sftp => "sftp",
            RemoteType::Azure => "azure",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct S3Settings {
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub storage_class: String,
    pub acl: String,
    pub encryption: String,
    pub no_check_bucket: bool,
    pub disable_checksum: bool,
}

impl Default for S3Settings {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            access_key_id: String::new(),
            secret_access_key: String::new(),
            storage_class: "STANDARD".to_string(),
            acl: "private".to_string(),
            encryption: "AES256".to_string(),
            no_check_bucket: true,
            disable_checksum: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SftpSettings {
    pub host: String,
    pub user: String,
    pub pass: String,
    pub port: String,
    pub key_file: String,
}

impl Default for SftpSettings {
    fn default() -> Self {
        Self {
            host: String::new(),
            user: String::new(),
            pass: String::new(),
            port: "22".to_string(),
            key_file: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AzureSettings {
    pub account: String,
    pub key: String,
    pub use_msi: bool,
    pub msi_object_id: String,
    pub msi_client_id: String,
    pub msi_mi_res_id: String,
}

/// Scheduled snapshot, identified by its tag.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackupSpec {
    pub name: String,
    /// Natural key; falls back to `name` when unset.
    pub tag: Option<String>,
    pub local_retention_duration: String,
    pub remote_retention_duration: String,
    pub delegate_remote_retention: bool,
    pub remote: bool,
    pub remote_type: RemoteType,
    /// Verbatim rclone remote configuration; rendered from the typed settings when empty.
    pub remote_config: String,
    pub remote_path: String,
    pub s3: S3Settings,
    pub sftp: SftpSettings,
    pub azure: AzureSettings,
    pub timeout: String,
    pub transfers: u32,
    pub tpslimit: u32,
    pub bwlimit: String,
    pub full_backup: bool,
    pub dynamic_remote_fields: Vec<String>,
    pub datacenters: Vec<String>,
    pub racks: Vec<String>,
    pub nodes: Vec<String>,
    pub tables: Vec<String>,
    pub all_tables: bool,
    pub all_nodes: bool,
    pub keyspaces: Vec<String>,
    pub simple_schedule: bool,
    pub schedule: bool,
    pub schedule_expr: String,
}

impl Default for BackupSpec {
    fn default() -> Self {
        Self {
            name: String::new(),
            tag: None,
            local_retention_duration: "10d".to_string(),
            remote_retention_duration: "60d".to_string(),
            delegate_remote_retention: false,
            remote: false,
            remote_type: RemoteType::S3,
            remote_config: String::new(),
            remote_path: String::new(),
            s3: S3Settings::default(),
            sftp: SftpSettings::default(),
            azure: AzureSettings::default(),
            timeout: "1h".to_string(),
            transfers: 1,
            tpslimit: 50,
            bwlimit: "100M".to_string(),
            full_backup: false,
            dynamic_remote_fields: Vec::new(),
            datacenters: Vec::new(),
            racks: Vec::new(),
            nodes: Vec::new(),
            tables: Vec::new(),
            all_tables: false,
            all_nodes: true,
            keyspaces: Vec::new(),
            simple_schedule: false,
            schedule: true,
            schedule_expr: "0 * * * *".to_string(),
        }
    }
}

impl BackupSpec {
    pub fn tag(&self) -> &str {
        match &self.tag {
            Some(tag) if !tag.is_empty() => tag,
            _ => &self.name,
        }
    }
}

impl ResourceSpec for BackupSpec {
    const KIND: ResourceKind = ResourceKind::Backup;

    fn natural_key(&self) -> String {
        self.tag().to_string()
    }
}

// === Integrations ===

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookHeader {
    pub header: String,
    pub value: String,
}

fn default_opsgenie_url() -> String {
    "https://api.opsgenie.com".to_string()
}

fn default_smtp_port() -> String {
    "25".to_string()
}

fn enabled() -> bool {
    true
}

/// Type-specific integration parameters, tagged by `integration_type`.
///
/// SMTP and ServiceNow credentials carry a prefix so they never shadow the
/// control-plane `username`/`password` of the descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "integration_type", rename_all = "snake_case")]
pub enum IntegrationSettings {
    Slack {
        webhook_url: String,
        #[serde(default)]
        channel: String,
        #[serde(default)]
        axondash_url: String,
    },
    Pagerduty {
        integration_key: String,
    },
    MicrosoftTeams {
        webhook_url: String,
    },
    Smtp {
        #[serde(default, rename = "smtp_username")]
        username: String,
        #[serde(default, rename = "smtp_password")]
        password: String,
        from: String,
        receivers: String,
        #[serde(default)]
        subject: String,
        server: String,
        #[serde(default = "default_smtp_port")]
        port: String,
        #[serde(default)]
        skip_certificate_verify: bool,
        #[serde(default = "enabled")]
        start_tls: bool,
        #[serde(default = "enabled")]
        auth_login: bool,
    },
    Servicenow {
        instance_url: String,
        #[serde(rename = "servicenow_username")]
        username: String,
        #[serde(rename = "servicenow_password")]
        password: String,
        #[serde(default)]
        client_id: String,
        #[serde(default)]
        client_secret: String,
    },
    Opsgenie {
        api_key: String,
        #[serde(default = "default_opsgenie_url")]
        api_url: String,
    },
    GeneralWebhook {
        url: String,
        #[serde(default)]
        headers: Vec<WebhookHeader>,
    },
}

impl IntegrationSettings {
    /// Remote `Type` string.
    pub fn type_name(&self) -> &'static str {
        match self {
            IntegrationSettings::Slack { .. } => "slack",
            IntegrationSettings::Pagerduty { .. } => "pagerduty",
            IntegrationSettings::MicrosoftTeams { .. } => "microsoft_teams",
            IntegrationSettings::Smtp { .. } => "smtp",
            IntegrationSettings::Servicenow { .. } => "servicenow",
            IntegrationSettings::Opsgenie { .. } => "opsgenie",
            IntegrationSettings::GeneralWebhook { .. } => "general_webhook",
        }
    }
}

/// Notification integration, identified by name and type.
#[derive(Debug, Clone, Deserialize)]
pub struct IntegrationSpec {
    pub name: String,
    #[serde(flatten)]
    pub settings: IntegrationSettings,
}

impl ResourceSpec for IntegrationSpec {
    const KIND: ResourceKind = ResourceKind::Integration;

    fn natural_key(&self) -> String {
        format!("{}/{}", self.settings.type_name(), self.name)
    }
}
