//! Command-line surface and derived run configuration.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::api::ApiConfig;
use crate::constants::{DEFAULT_API_HOST, DEFAULT_API_PORT, DEFAULT_APPLICATION_PORT};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ApiProtocol {
    Http,
    Https,
}

impl ApiProtocol {
    fn as_str(self) -> &'static str {
        match self {
            ApiProtocol::Http => "http",
            ApiProtocol::Https => "https",
        }
    }
}

/// Flags accepted by the gateway binary.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "iotlab-ws-gateway",
    about = "WebSocket-to-TCP gateway bridging browser clients to IoT-LAB node serial links"
)]
pub struct CliArgs {
    /// Websocket server port.
    #[arg(long, default_value_t = DEFAULT_APPLICATION_PORT)]
    pub port: u16,

    /// Token used for websocket authentication (only used when the local
    /// API is the auth host).
    #[arg(long, default_value = "")]
    pub token: String,

    /// Protocol used to access the REST API.
    #[arg(long = "api-protocol", value_enum, default_value = "https")]
    pub api_protocol: ApiProtocol,

    /// REST API server host.
    #[arg(long = "api-host", default_value = DEFAULT_API_HOST)]
    pub api_host: String,

    /// REST API server port.
    #[arg(long = "api-port", default_value_t = DEFAULT_API_PORT)]
    pub api_port: u16,

    /// Username used to connect to the REST API.
    #[arg(long = "api-user", env = "API_USER", default_value = "")]
    pub api_user: String,

    /// Password used to connect to the REST API.
    #[arg(long = "api-password", env = "API_PASSWORD", default_value = "")]
    pub api_password: String,

    /// Start and use the in-process local API handler.
    #[arg(long = "use-local-api")]
    pub use_local_api: bool,

    /// Absolute path of the log file.
    #[arg(long = "log-file")]
    pub log_file: Option<PathBuf>,

    /// Print debug messages to console.
    #[arg(long = "log-console")]
    pub log_console: bool,

    /// HTTP proxy to use for API requests (format: host:port or
    /// http://host:port). Falls back to the `http_proxy`/`HTTP_PROXY`
    /// environment variables, in that order, when unset.
    #[arg(long = "http-proxy")]
    pub http_proxy: Option<String>,
}

impl CliArgs {
    /// Resolves the effective HTTP proxy: the flag, else `http_proxy`, else
    /// `HTTP_PROXY` (matches the original `service_cli.main`'s fallback
    /// chain).
    pub fn resolved_http_proxy(&self) -> Option<String> {
        self.http_proxy
            .clone()
            .or_else(|| std::env::var("http_proxy").ok())
            .or_else(|| std::env::var("HTTP_PROXY").ok())
            .filter(|proxy| !proxy.is_empty())
    }

    /// Builds the `ApiConfig` this run's `AuthApi` should use. When
    /// `--use-local-api` is set, the target is rewritten to the in-process
    /// local API mounted on this same server.
    pub fn api_config(&self) -> ApiConfig {
        let proxy = self.resolved_http_proxy();
        if self.use_local_api {
            ApiConfig {
                protocol: "http".to_owned(),
                host: DEFAULT_API_HOST.to_owned(),
                port: self.port,
                username: String::new(),
                password: String::new(),
                proxy,
            }
        } else {
            ApiConfig {
                protocol: self.api_protocol.as_str().to_owned(),
                host: self.api_host.clone(),
                port: self.api_port,
                username: self.api_user.clone(),
                password: self.api_password.clone(),
                proxy,
            }
        }
    }
}
