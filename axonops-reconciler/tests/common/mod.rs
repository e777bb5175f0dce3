//! Shared test utilities: an in-process fake of the AxonOps control plane.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};

use axonops_reconciler::{Connection, Engine, Resource};
use axum::extract::State;
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use serde_json::{json, Value};
use tokio::net::TcpListener;

pub const ORG: &str = "acme";
pub const CLUSTER: &str = "prod";
pub const TOKEN: &str = "static-token";
/// Cluster addressed by [`FakeControlPlane::connection`].
pub const DEFAULT_CLUSTER: &str = "acme/cassandra/prod";

const EMPTY_BUNDLE: &str = r#"{"httpchecks":[],"tcpchecks":[],"shellchecks":[]}"#;

/// Allocate an available port for testing.
pub fn allocate_port() -> u16 {
    portpicker::pick_unused_port().expect("No available port")
}

/// Parse a descriptor document.
pub fn resources(doc: Value) -> Vec<Resource> {
    serde_json::from_value(doc).expect("Invalid descriptor document")
}

/// One request as seen by the fake.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: Method,
    pub path: String,
    pub authorization: Option<String>,
    pub body: String,
}

impl Recorded {
    pub fn json(&self) -> Value {
        serde_json::from_str(&self.body).expect("Request body is not JSON")
    }
}

/// Remote configuration of one `<org>/<type>/<cluster>`.
pub struct ClusterState {
    pub alert_rules: Vec<Value>,
    /// Bundle text exactly as last written.
    pub health_bundle: String,
    pub integrations: Vec<Value>,
    pub schedules: Vec<Value>,
    pub dashboards: Value,
    pub nodes: Value,
}

impl Default for ClusterState {
    fn default() -> Self {
        Self {
            alert_rules: Vec::new(),
            health_bundle: EMPTY_BUNDLE.to_string(),
            integrations: Vec::new(),
            schedules: Vec::new(),
            dashboards: json!({"dashboards": []}),
            nodes: json!([]),
        }
    }
}

impl ClusterState {
    pub fn bundle(&self) -> Value {
        serde_json::from_str(&self.health_bundle).expect("Bundle is not JSON")
    }
}

/// Remote state held by the fake.
#[derive(Default)]
pub struct FakeState {
    pub requests: Vec<Recorded>,
    /// Keyed by `<org>/<type>/<cluster>`.
    pub clusters: HashMap<String, ClusterState>,
    /// Token handed out by `/api/login`; logins are refused when unset.
    pub login_token: Option<String>,
    /// `(method, path prefix, status)` answered instead of the normal behaviour.
    pub fail: Option<(Method, String, StatusCode)>,
    /// `(method, path prefix, body)` answered with 200 and this JSON instead.
    pub canned: Option<(Method, String, Value)>,
    next_id: u32,
}

impl FakeState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }

    /// State of the default cluster.
    pub fn cluster(&mut self) -> &mut ClusterState {
        self.scope(DEFAULT_CLUSTER)
    }

    pub fn scope(&mut self, key: &str) -> &mut ClusterState {
        self.clusters.entry(key.to_string()).or_default()
    }
}

type Shared = Arc<Mutex<FakeState>>;

/// Fake control plane served on an ephemeral port.
pub struct FakeControlPlane {
    pub addr: SocketAddr,
    state: Shared,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl FakeControlPlane {
    pub async fn spawn() -> Self {
        let state: Shared = Arc::new(Mutex::new(FakeState::default()));
        let router = Router::new().fallback(handle).with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().expect("No local address");

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .expect("Server error");
        });

        Self {
            addr,
            state,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().expect("Fake state poisoned")
    }

    /// Connection defaults pointing at this fake with a static bearer token.
    pub fn connection(&self) -> Connection {
        Connection {
            org: Some(ORG.to_string()),
            cluster: Some(CLUSTER.to_string()),
            base_url: Some(self.base_url()),
            auth_token: Some(TOKEN.to_string()),
            ..Default::default()
        }
    }

    /// Engine bound to this fake that ignores the process environment.
    pub fn engine(&self) -> Engine {
        Engine::with_env(self.connection(), |_| None)
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.state().requests.clone()
    }

    /// Every non-GET request except logins.
    pub fn mutations(&self) -> Vec<Recorded> {
        self.state()
            .requests
            .iter()
            .filter(|r| r.method != Method::GET && r.path != "/api/login")
            .cloned()
            .collect()
    }

    pub fn clear_requests(&self) {
        self.state().requests.clear();
    }

    /// A `System` dashboard with a metric chart and an events timeline.
    pub fn seed_dashboards(&self) {
        self.state().cluster().dashboards = json!({
            "dashboards": [{
                "name": "System",
                "panels": [
                    {
                        "title": "CPU usage per host",
                        "type": "line-chart",
                        "uuid": "chart-cpu-empty",
                        "details": {"queries": null}
                    },
                    {
                        "title": "CPU usage per host",
                        "type": "line-chart",
                        "uuid": "chart-cpu",
                        "details": {"queries": [{"query": "host_CPU_Percent_Merge{dc=~'$dc',rack=~'$rack',host_id=~'$host_id'}"}]}
                    },
                    {
                        "title": "Events",
                        "type": "events_timeline",
                        "uuid": "chart-events",
                        "details": {"queries": null}
                    }
                ]
            }]
        });
    }

    pub fn seed_nodes(&self) {
        self.state().cluster().nodes = json!([
            {"host_id": "h-1", "HostIP": "10.0.0.1", "Details": {"human_readable_identifier": "cass-1"}},
            {"host_id": "h-2", "HostIP": "10.0.0.2", "Details": {"human_readable_identifier": "cass-2"}}
        ]);
    }

    pub fn seed_integration(&self, id: &str, kind: &str, name: &str) {
        self.state().cluster().integrations.push(json!({
            "ID": id,
            "Type": kind,
            "Params": {"name": name}
        }));
    }
}

impl Drop for FakeControlPlane {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

fn json_response(status: StatusCode, body: String) -> Response {
    (status, [(header::CONTENT_TYPE, "application/json")], body).into_response()
}

fn ok(body: Value) -> Response {
    json_response(StatusCode::OK, body.to_string())
}

async fn handle(
    State(state): State<Shared>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> Response {
    let path = uri.path().to_string();
    let mut state = state.lock().expect("Fake state poisoned");

    state.requests.push(Recorded {
        method: method.clone(),
        path: path.clone(),
        authorization: headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body: body.clone(),
    });

    if let Some((fail_method, prefix, status)) = &state.fail {
        if *fail_method == method && path.starts_with(prefix.as_str()) {
            return json_response(*status, "injected failure".to_string());
        }
    }
    if let Some((canned_method, prefix, reply)) = &state.canned {
        if *canned_method == method && path.starts_with(prefix.as_str()) {
            return ok(reply.clone());
        }
    }

    if path == "/api/login" {
        return match &state.login_token {
            Some(token) => ok(json!({"token": token})),
            None => json_response(StatusCode::UNAUTHORIZED, "bad credentials".to_string()),
        };
    }

    // /api/v1/<collection>/<org>/<type>/<cluster>[/<id>]
    let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
    if segments.len() < 6 || segments[0] != "api" || segments[1] != "v1" {
        return json_response(StatusCode::NOT_FOUND, "no such route".to_string());
    }
    let collection = segments[2];
    let key = segments[3..6].join("/");
    let id = segments.get(6).map(|s| s.to_string());
    let payload: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
    let generated = match (&method, collection) {
        (&Method::POST, "integrations") if payload.get("ID").is_none() => state.next_id("int"),
        (&Method::POST, "cassandraSnapshot") => state.next_id("bk"),
        _ => String::new(),
    };
    let state = state.scope(&key);

    match (method.clone(), collection) {
        (Method::GET, "alert-rules") => ok(json!({"metricrules": state.alert_rules})),
        (Method::POST, "alert-rules") => {
            let rule_id = payload["id"].clone();
            state.alert_rules.retain(|r| r["id"] != rule_id);
            state.alert_rules.push(payload);
            ok(json!({}))
        }
        (Method::DELETE, "alert-rules") => {
            let id = id.unwrap_or_default();
            state.alert_rules.retain(|r| r["id"] != id.as_str());
            json_response(StatusCode::NO_CONTENT, String::new())
        }

        (Method::GET, "healthchecks") => json_response(StatusCode::OK, state.health_bundle.clone()),
        (Method::PUT, "healthchecks") => {
            state.health_bundle = body;
            ok(json!({}))
        }

        (Method::GET, "integrations") => ok(json!({"Definitions": state.integrations})),
        (Method::POST, "integrations") => {
            let mut definition = payload;
            match definition.get("ID").and_then(Value::as_str).map(str::to_string) {
                Some(existing) => state.integrations.retain(|d| d["ID"] != existing.as_str()),
                None => definition["ID"] = Value::from(generated),
            }
            state.integrations.push(definition);
            ok(json!({}))
        }
        (Method::DELETE, "integrations") => {
            let id = id.unwrap_or_default();
            state.integrations.retain(|d| d["ID"] != id.as_str());
            ok(json!({}))
        }

        (Method::GET, "cassandraScheduleSnapshot") => {
            ok(json!({"ScheduledSnapshots": state.schedules}))
        }
        (Method::DELETE, "cassandraScheduleSnapshot") => {
            let ids = payload.as_array().cloned().unwrap_or_default();
            state.schedules.retain(|s| !ids.contains(&s["ID"]));
            ok(json!({}))
        }
        (Method::POST, "cassandraSnapshot") => {
            state.schedules.push(json!({
                "ID": generated,
                "Params": [{"BackupDetails": body}]
            }));
            // plain-text acknowledgement, not JSON
            json_response(StatusCode::CREATED, "scheduled".to_string())
        }

        (Method::GET, "dashboardtemplate") => ok(state.dashboards.clone()),
        (Method::GET, "nodes") => ok(state.nodes.clone()),

        _ => json_response(StatusCode::NOT_FOUND, "no such route".to_string()),
    }
}
