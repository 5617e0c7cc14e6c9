//! REST API client.
//!
//! `AuthApi` is the abstract collaborator: it fetches the expected token and
//! the node list for an experiment. The gateway only ever compares its
//! results for equality/membership; it never mutates them.

use async_trait::async_trait;
use serde::Deserialize;

use crate::domain::Experiment;
use crate::error::ApiError;

#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn fetch_token(&self, experiment: &Experiment) -> Result<String, ApiError>;
    async fn fetch_nodes(&self, experiment: &Experiment) -> Result<Vec<String>, ApiError>;
}

/// Connection details for the upstream REST API.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// `host:port` (or `http://host:port`) of an HTTP forward proxy.
    pub proxy: Option<String>,
}

impl ApiConfig {
    fn base_url(&self) -> String {
        format!(
            "{}://{}:{}/api/experiments",
            self.protocol, self.host, self.port
        )
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    token: String,
}

#[derive(Deserialize)]
struct NodesResponse {
    nodes: Vec<String>,
}

/// `AuthApi` implementation that talks to a real REST endpoint over HTTP(S).
///
/// Each instance owns its own `reqwest::Client`, configured with the proxy
/// and basic-auth credentials it was built with. The source mutates a
/// process-wide proxy setting; here it is configured per-instance instead.
pub struct HttpAuthApi {
    config: ApiConfig,
    client: reqwest::Client,
}

impl HttpAuthApi {
    pub fn new(config: ApiConfig) -> Result<Self, ApiError> {
        let mut builder = reqwest::Client::builder();
        if let Some(proxy) = config.proxy.as_deref() {
            let proxy_url = normalize_proxy_url(proxy);
            let proxy = reqwest::Proxy::all(&proxy_url)
                .map_err(|e| ApiError::Transport(format!("invalid proxy '{proxy_url}': {e}")))?;
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        Ok(Self { config, client })
    }

    fn request(&self, experiment: &Experiment, resource: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}/{}", self.config.base_url(), experiment, resource);
        let mut req = self
            .client
            .get(url)
            .header("Content-Type", "application/json");
        if !self.config.username.is_empty() && !self.config.password.is_empty() {
            req = req.basic_auth(&self.config.username, Some(&self.config.password));
        }
        req
    }
}

/// Accepts both `host:port` and `http://host:port` forms.
fn normalize_proxy_url(raw: &str) -> String {
    if raw.starts_with("http://") || raw.starts_with("https://") {
        raw.to_owned()
    } else {
        format!("http://{raw}")
    }
}

#[async_trait]
impl AuthApi for HttpAuthApi {
    async fn fetch_token(&self, experiment: &Experiment) -> Result<String, ApiError> {
        let response = self
            .request(experiment, "token")
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ApiError::Status(response.status().as_u16()));
        }
        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))?;
        Ok(body.token)
    }

    async fn fetch_nodes(&self, experiment: &Experiment) -> Result<Vec<String>, ApiError> {
        let response = self
            .request(experiment, "")
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ApiError::Status(response.status().as_u16()));
        }
        let body: NodesResponse = response
            .json()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))?;
        Ok(body.nodes)
    }
}
