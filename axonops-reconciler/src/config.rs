//! Connection settings: explicit values, then environment variables, then compiled-in defaults.

use crate::error::{Error, Result};
use crate::model::{ClusterContext, ClusterType, Connection};

/// AxonOps Cloud front-end; the organization slug is appended to it.
pub const CLOUD_URL: &str = "https://dash.axonops.cloud";

pub const ENV_URL: &str = "AXONOPS_URL";
pub const ENV_ORG: &str = "AXONOPS_ORG";
pub const ENV_CLUSTER: &str = "AXONOPS_CLUSTER";
pub const ENV_CLUSTER_TYPE: &str = "AXONOPS_CLUSTER_TYPE";
pub const ENV_TOKEN: &str = "AXONOPS_TOKEN";
pub const ENV_API_TOKEN: &str = "AXONOPS_API_TOKEN";
pub const ENV_USERNAME: &str = "AXONOPS_USERNAME";
pub const ENV_PASSWORD: &str = "AXONOPS_PASSWORD";
pub const ENV_OVERRIDE_SAAS: &str = "AXONOPS_OVERRIDE_SAAS";

/// Fully resolved settings for one client session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientConfig {
    pub base_url: String,
    /// Explicit bearer token.
    pub auth_token: Option<String>,
    /// Static API token, sent on every request.
    pub api_token: Option<String>,
    /// Username/password for the login exchange.
    pub login: Option<Credentials>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl ClientConfig {
    /// Config for a known base URL with no credentials.
    pub fn anonymous(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_token: None,
            api_token: None,
            login: None,
        }
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn with_api_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    pub fn with_login(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.login = Some(Credentials {
            username: username.into(),
            password: password.into(),
        });
        self
    }
}

impl Connection {
    /// Layer `over` on top of `self`; set values in `over` win.
    pub fn overlay(&self, over: &Connection) -> Connection {
        Connection {
            org: over.org.clone().or_else(|| self.org.clone()),
            cluster: over.cluster.clone().or_else(|| self.cluster.clone()),
            cluster_type: over.cluster_type.or(self.cluster_type),
            base_url: over.base_url.clone().or_else(|| self.base_url.clone()),
            auth_token: over.auth_token.clone().or_else(|| self.auth_token.clone()),
            api_token: over.api_token.clone().or_else(|| self.api_token.clone()),
            username: over.username.clone().or_else(|| self.username.clone()),
            password: over.password.clone().or_else(|| self.password.clone()),
            override_saas: over.override_saas.or(self.override_saas),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Accepts `true`, `t`, `1`, `yes`, `y` in any case.
pub fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "t" | "1" | "yes" | "y"
    )
}

/// Base URL precedence: explicit > environment > cloud default with the org slug.
///
/// With `override_saas` an explicit or environment URL is treated as a SaaS
/// front-end and gets the org slug appended too.
pub fn resolve_base_url(
    explicit: Option<&str>,
    env: Option<&str>,
    org: &str,
    override_saas: bool,
) -> String {
    let chosen = explicit
        .filter(|u| !u.is_empty())
        .or_else(|| env.filter(|u| !u.is_empty()));

    match chosen {
        Some(url) if override_saas => format!("{}/{}", url.trim_end_matches('/'), org),
        Some(url) => url.trim_end_matches('/').to_string(),
        None => format!("{}/{}", CLOUD_URL, org),
    }
}

/// Resolve a layered connection into client settings and the cluster it targets.
pub fn resolve<F>(conn: &Connection, env: F) -> Result<(ClientConfig, ClusterContext)>
where
    F: Fn(&str) -> Option<String>,
{
    let pick = |value: &Option<String>, key: &str| {
        non_empty(value.clone()).or_else(|| non_empty(env(key)))
    };

    let org = pick(&conn.org, ENV_ORG)
        .ok_or_else(|| Error::Config(format!("organization is required (set {})", ENV_ORG)))?;
    let cluster = pick(&conn.cluster, ENV_CLUSTER)
        .ok_or_else(|| Error::Config(format!("cluster is required (set {})", ENV_CLUSTER)))?;
    let cluster_type = match conn.cluster_type {
        Some(t) => t,
        None => match non_empty(env(ENV_CLUSTER_TYPE)) {
            Some(raw) => raw.parse::<ClusterType>().map_err(Error::Config)?,
            None => ClusterType::default(),
        },
    };
    let override_saas = conn
        .override_saas
        .or_else(|| env(ENV_OVERRIDE_SAAS).map(|v| parse_bool(&v)))
        .unwrap_or(false);

    let base_url = resolve_base_url(
        conn.base_url.as_deref(),
        env(ENV_URL).as_deref(),
        &org,
        override_saas,
    );

    let username = pick(&conn.username, ENV_USERNAME);
    let password = pick(&conn.password, ENV_PASSWORD);
    let login = match (username, password) {
        (Some(username), Some(password)) => Some(Credentials { username, password }),
        _ => None,
    };

    let config = ClientConfig {
        base_url,
        auth_token: pick(&conn.auth_token, ENV_TOKEN),
        api_token: pick(&conn.api_token, ENV_API_TOKEN),
        login,
    };

    Ok((config, ClusterContext::new(org, cluster, cluster_type)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_base_url_precedence() {
        assert_eq!(
            resolve_base_url(Some("https://onprem:8080/"), Some("https://env"), "acme", false),
            "https://onprem:8080"
        );
        assert_eq!(
            resolve_base_url(None, Some("https://env//"), "acme", false),
            "https://env"
        );
        assert_eq!(
            resolve_base_url(Some(""), None, "acme", false),
            "https://dash.axonops.cloud/acme"
        );
        assert_eq!(
            resolve_base_url(Some("https://saas.example/"), None, "acme", true),
            "https://saas.example/acme"
        );
    }

    #[test]
    fn test_resolve_prefers_explicit_over_env() {
        let conn = Connection {
            org: Some("explicit-org".to_string()),
            cluster: Some("prod".to_string()),
            ..Default::default()
        };
        let env = env_of(&[
            (ENV_ORG, "env-org"),
            (ENV_CLUSTER_TYPE, "kafka"),
            (ENV_TOKEN, "env-token"),
            (ENV_USERNAME, "bob"),
        ]);

        let (config, ctx) = resolve(&conn, env).unwrap();
        assert_eq!(ctx.org, "explicit-org");
        assert_eq!(ctx.cluster_type, ClusterType::Kafka);
        assert_eq!(config.base_url, "https://dash.axonops.cloud/explicit-org");
        assert_eq!(config.auth_token.as_deref(), Some("env-token"));
        // password missing, so no login exchange
        assert!(config.login.is_none());
    }

    #[test]
    fn test_resolve_requires_org_and_cluster() {
        let err = resolve(&Connection::default(), env_of(&[])).unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err = resolve(&Connection::default(), env_of(&[(ENV_ORG, "acme")])).unwrap_err();
        assert!(err.to_string().contains(ENV_CLUSTER));
    }

    #[test]
    fn test_overlay() {
        let defaults = Connection {
            org: Some("acme".to_string()),
            cluster: Some("prod".to_string()),
            username: Some("admin".to_string()),
            ..Default::default()
        };
        let over = Connection {
            cluster: Some("staging".to_string()),
            override_saas: Some(true),
            ..Default::default()
        };
        let merged = defaults.overlay(&over);
        assert_eq!(merged.org.as_deref(), Some("acme"));
        assert_eq!(merged.cluster.as_deref(), Some("staging"));
        assert_eq!(merged.username.as_deref(), Some("admin"));
        assert_eq!(merged.override_saas, Some(true));
    }

    #[test]
    fn test_parse_bool() {
        for v in ["true", "T", "1", "yes", "Y"] {
            assert!(parse_bool(v), "{}", v);
        }
        for v in ["false", "0", "", "nope"] {
            assert!(!parse_bool(v), "{}", v);
        }
    }
}
