//! Fixed protocol and policy constants.

/// TCP port every node listens on.
pub const NODE_TCP_PORT: u16 = 20000;

/// Maximum bytes read from a node per `read` call.
pub const CHUNK_SIZE: usize = 1024;

/// Rate-cap accounting window.
pub const CHECK_PERIOD: std::time::Duration = std::time::Duration::from_secs(1);

/// Bytes a node may emit per `CHECK_PERIOD` before it is considered rogue.
pub const MAX_BYTES_PER_PERIOD: usize = 15_000;

/// Upper bound on concurrent WebSocket sessions attached to a single node.
pub const MAX_WS_PER_NODE: usize = 2;

/// Upper bound on concurrent WebSocket sessions held by a single user, across nodes.
pub const MAX_WS_PER_USER: u32 = 10;

/// Default HTTP port the gateway listens on.
pub const DEFAULT_APPLICATION_PORT: u16 = 8000;

/// Host used to reach the in-process local API once it is mounted on this server.
pub const DEFAULT_API_HOST: &str = "localhost";

/// Default port of the upstream REST API (overridden by `--api-port`).
pub const DEFAULT_API_PORT: u16 = 8080;
