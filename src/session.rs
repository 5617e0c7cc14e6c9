//! One live WebSocket attached to a node.
//!
//! A `Session` is a passive carrier: it exposes `send`/`close` and the
//! observable attributes, and knows nothing about any other session or the
//! `Gateway`'s internals. The actual `actix_ws::Session` lives in the task
//! that accepted the WebSocket; this struct only holds a channel to reach
//! it, so `Gateway`, `Session` and `NodeTcp` never form a reference cycle.

use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

use crate::domain::{Experiment, Mode, Node, Site};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// A message destined for the WebSocket peer, queued from the `Gateway` to
/// the task that owns the `actix_ws::Session`.
#[derive(Debug)]
pub enum Outbound {
    Text(String),
    Binary(Vec<u8>),
    Close { code: u16, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl SessionId {
    fn next() -> Self {
        Self(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// A live WebSocket attached to exactly one node.
#[derive(Debug, Clone)]
pub struct Session {
    id: SessionId,
    pub user: String,
    pub site: Site,
    pub experiment: Experiment,
    pub node: Node,
    pub mode: Mode,
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl Session {
    pub fn new(
        user: String,
        site: Site,
        experiment: Experiment,
        node: Node,
        mode: Mode,
        outbound: mpsc::UnboundedSender<Outbound>,
    ) -> Self {
        Self {
            id: SessionId::next(),
            user,
            site,
            experiment,
            node,
            mode,
            outbound,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Deliver a UTF-8 payload as a WS text frame.
    pub fn send_text(&self, payload: String) {
        let _ = self.outbound.send(Outbound::Text(payload));
    }

    /// Deliver raw bytes as a WS binary frame.
    pub fn send_binary(&self, payload: Vec<u8>) {
        let _ = self.outbound.send(Outbound::Binary(payload));
    }

    /// Initiate a server-side close with the given code/reason.
    pub fn close(&self, code: u16, reason: impl Into<String>) {
        let _ = self.outbound.send(Outbound::Close {
            code,
            reason: reason.into(),
        });
    }
}
