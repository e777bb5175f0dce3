//! HTTP client for the AxonOps control-plane REST API.

use std::time::Duration;

use reqwest::header::{HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::{Error, Result};

/// Statuses treated as success; everything else is an `ApiStatus` error.
const OK_STATUSES: [StatusCode; 3] = [StatusCode::OK, StatusCode::CREATED, StatusCode::NO_CONTENT];

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    #[serde(default)]
    token: Option<String>,
}

/// Client bound to one base URL and one set of credentials.
///
/// When username/password are configured the login exchange happens lazily on
/// the first request and its session token is reused for every later call.
pub struct ControlPlaneClient {
    http: reqwest::Client,
    config: ClientConfig,
    session: OnceCell<String>,
}

impl ControlPlaneClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("axonops-reconciler/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::Config(format!("cannot build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            config,
            session: OnceCell::new(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    /// GET and decode. A non-empty body that does not decode is an error.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        let body = self.execute(Method::GET, path, None::<&()>).await?;
        if body.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&body)
            .map(Some)
            .map_err(|e| Error::decode(format!("response of GET {}", path), e))
    }

    pub async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Option<serde_json::Value>> {
        let text = self.execute(Method::POST, path, Some(body)).await?;
        Ok(lenient(&Method::POST, path, &text))
    }

    pub async fn put<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Option<serde_json::Value>> {
        let text = self.execute(Method::PUT, path, Some(body)).await?;
        Ok(lenient(&Method::PUT, path, &text))
    }

    pub async fn delete(&self, path: &str) -> Result<Option<serde_json::Value>> {
        let text = self.execute(Method::DELETE, path, None::<&()>).await?;
        Ok(lenient(&Method::DELETE, path, &text))
    }

    /// DELETE carrying a JSON body, used by collections that take a list of identifiers.
    pub async fn delete_with_body<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Option<serde_json::Value>> {
        let text = self.execute(Method::DELETE, path, Some(body)).await?;
        Ok(lenient(&Method::DELETE, path, &text))
    }

    async fn execute<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<String> {
        let url = self.url(path);
        let mut builder = self
            .http
            .request(method.clone(), &url)
            .header(ACCEPT, "application/json");

        if let Some(auth) = self.authorization().await? {
            builder = builder.header(AUTHORIZATION, auth);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }

        debug!(%method, %url, "sending request");
        let transport = |source| Error::Transport {
            method: method.clone(),
            url: url.clone(),
            source,
        };

        let response = builder.send().await.map_err(transport)?;
        let status = response.status();
        let text = response.text().await.map_err(transport)?;

        if !OK_STATUSES.contains(&status) {
            return Err(Error::ApiStatus {
                method,
                url,
                status,
                body: text,
            });
        }

        debug!(%method, %url, %status, "request completed");
        Ok(text)
    }

    /// `AxonApi <token>` when an API token is set, otherwise the bearer token.
    async fn authorization(&self) -> Result<Option<HeaderValue>> {
        let value = if let Some(api_token) = &self.config.api_token {
            format!("AxonApi {}", api_token)
        } else if self.config.login.is_some() {
            format!("Bearer {}", self.session_token().await?)
        } else if let Some(token) = &self.config.auth_token {
            format!("Bearer {}", token)
        } else {
            return Ok(None);
        };

        HeaderValue::from_str(&value)
            .map(Some)
            .map_err(|_| Error::Config("credentials contain invalid header characters".to_string()))
    }

    async fn session_token(&self) -> Result<&str> {
        self.session
            .get_or_try_init(|| self.login())
            .await
            .map(String::as_str)
    }

    async fn login(&self) -> Result<String> {
        let Some(credentials) = &self.config.login else {
            return Err(Error::Authentication("no credentials configured".to_string()));
        };

        let url = self.url("/api/login");
        debug!(%url, username = %credentials.username, "logging in");

        let response = self
            .http
            .post(&url)
            .header(ACCEPT, "application/json")
            .json(&LoginRequest {
                username: &credentials.username,
                password: &credentials.password,
            })
            .send()
            .await
            .map_err(|source| Error::Transport {
                method: Method::POST,
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if !OK_STATUSES.contains(&status) {
            return Err(Error::Authentication(format!(
                "login returned {}",
                status
            )));
        }

        let login: LoginResponse = response
            .json()
            .await
            .map_err(|e| Error::Authentication(format!("unreadable login response: {}", e)))?;

        match login.token {
            Some(token) if !token.is_empty() => Ok(token),
            _ => Err(Error::Authentication(
                "login response carried no token".to_string(),
            )),
        }
    }
}

/// Mutation responses are informational; an undecodable body is not a failure.
fn lenient(method: &Method, path: &str, text: &str) -> Option<serde_json::Value> {
    if text.trim().is_empty() {
        return None;
    }
    match serde_json::from_str(text) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(%method, path, error = %e, "ignoring undecodable response body");
            None
        }
    }
}
