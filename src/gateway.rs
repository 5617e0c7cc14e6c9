//! The connection multiplexer, the core of this crate.
//!
//! Three logical maps, all guarded by one `std::sync::Mutex` so every state
//! transition is serialized as if running on a single-threaded event loop,
//! even though the surrounding `actix-web` server is multi-worker. No
//! `.await` ever happens while the lock is held, so the critical sections
//! stay tiny and the mutex never blocks a task mid-I/O.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use crate::constants::{MAX_WS_PER_NODE, MAX_WS_PER_USER};
use crate::domain::{Mode, Node};
use crate::node_tcp::NodeTcp;
use crate::session::{Session, SessionId};

#[derive(Default)]
struct GatewayInner {
    /// Attach-order session lists, keyed by node. A node key is only ever
    /// present while its list is non-empty (no defaultdict-style
    /// auto-insertion on read).
    sessions: HashMap<Node, Vec<Session>>,
    tcp: HashMap<Node, NodeTcp>,
    user_count: HashMap<String, u32>,
}

/// The multiplexer: registry of nodes→(NodeTcp, sessions), per-user counters,
/// admission control, fan-out, teardown.
pub struct Gateway {
    inner: Mutex<GatewayInner>,
}

impl Gateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(GatewayInner::default()),
        })
    }

    /// Node-limit is checked before user-limit; both checks compare against
    /// counts observed before any increment (fixed tie-break). The TCP
    /// connection for a node is only started once a session has actually
    /// been added for it, so a rejected attach never leaks a connection.
    pub fn attach(self: &Arc<Self>, session: Session) {
        let node = session.node.clone();
        let user = session.user.clone();
        let site = session.site.clone();

        let mut inner = self.inner.lock().unwrap();

        let node_count = inner.sessions.get(&node).map(Vec::len).unwrap_or(0);
        if node_count == MAX_WS_PER_NODE {
            drop(inner);
            warn!(%node, %user, "rejecting session: node connection limit reached");
            session.close(
                1000,
                format!("Cannot open more than {MAX_WS_PER_NODE} connections to node {node}."),
            );
            return;
        }

        let user_count = inner.user_count.get(&user).copied().unwrap_or(0);
        if user_count == MAX_WS_PER_USER {
            drop(inner);
            warn!(%user, %site, "rejecting session: user connection limit reached");
            session.close(
                1000,
                format!(
                    "Max number of connections ({MAX_WS_PER_USER}) reached for user {user} on site {site}."
                ),
            );
            return;
        }

        *inner.user_count.entry(user.clone()).or_insert(0) += 1;
        let list = inner.sessions.entry(node.clone()).or_insert_with(Vec::new);
        let first_for_node = list.is_empty();
        list.push(session);

        if first_for_node {
            info!(%node, "first session for node, starting TCP connection");
            let tcp = self.spawn_node_tcp(node.clone());
            inner.tcp.insert(node, tcp);
        }
    }

    /// Idempotent: detaching a session that is not present (already
    /// removed, e.g. by `stop()`) is a no-op rather than an error.
    pub fn detach(&self, session_id: SessionId, node: &Node, user: &str) {
        let mut inner = self.inner.lock().unwrap();

        let mut removed = false;
        if let Some(list) = inner.sessions.get_mut(node) {
            if let Some(pos) = list.iter().position(|s| s.id() == session_id) {
                list.remove(pos);
                removed = true;
            }
        }
        let now_empty = inner.sessions.get(node).map(Vec::is_empty).unwrap_or(true);
        if now_empty {
            inner.sessions.remove(node);
        }

        if removed {
            if let Some(count) = inner.user_count.get_mut(user) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    inner.user_count.remove(user);
                }
            }
        }

        let tcp_to_stop = if now_empty { inner.tcp.remove(node) } else { None };
        drop(inner);

        if let Some(tcp) = tcp_to_stop {
            debug!(%node, "last session for node detached, stopping TCP connection");
            tcp.stop();
        }
    }

    /// Fans a chunk out to every session on `node` in attach order: text
    /// sessions get it iff it decodes as UTF-8 (dropped for that client only
    /// otherwise), binary sessions always get the raw bytes.
    pub fn handle_tcp_data(&self, node: &Node, bytes: Vec<u8>) {
        let inner = self.inner.lock().unwrap();
        let Some(sessions) = inner.sessions.get(node) else {
            return;
        };
        for session in sessions {
            match session.mode {
                Mode::Text => match std::str::from_utf8(&bytes) {
                    Ok(text) => session.send_text(text.to_owned()),
                    Err(_) => debug!(%node, "dropping non-UTF-8 chunk for text-mode session"),
                },
                Mode::Binary => session.send_binary(bytes.clone()),
            }
        }
    }

    /// Closes every session on `node`; detach bookkeeping happens as each
    /// session's close observer runs.
    pub fn handle_tcp_close(&self, node: &Node, reason: String) {
        let inner = self.inner.lock().unwrap();
        if let Some(sessions) = inner.sessions.get(node) {
            for session in sessions {
                session.close(1000, reason.clone());
            }
        }
        // detach() already removes the tcp entry once every session above
        // has detached, so this is only needed if the connect failed, or
        // the rate cap tripped, before any session got the chance to detach.
        drop(inner);
        let mut inner = self.inner.lock().unwrap();
        inner.tcp.remove(node);
    }

    /// Binary frames on a text-mode session (and, symmetrically, text
    /// frames on a binary-mode session) never reach here, the caller drops
    /// those at the WS read loop before normalising the payload.
    pub fn handle_ws_message(&self, session: &Session, bytes: Vec<u8>) {
        let inner = self.inner.lock().unwrap();
        let ready = inner.tcp.get(&session.node).map(|t| t.is_ready()).unwrap_or(false);
        if ready {
            inner.tcp.get(&session.node).unwrap().send(bytes);
            return;
        }
        drop(inner);
        let text = String::from_utf8_lossy(&bytes).into_owned();
        session.send_text(format!(
            "No TCP connection opened, cannot send message '{text}'.\n"
        ));
    }

    /// Closes every live session with code 1001; detach bookkeeping runs as
    /// each close completes.
    pub fn stop(&self) {
        let inner = self.inner.lock().unwrap();
        for sessions in inner.sessions.values() {
            for session in sessions {
                session.close(1001, "server is restarting");
            }
        }
    }

    fn spawn_node_tcp(self: &Arc<Self>, node: Node) -> NodeTcp {
        let gateway_for_data = Arc::clone(self);
        let node_for_data = node.clone();
        let on_data: Box<dyn Fn(Vec<u8>) + Send + Sync> =
            Box::new(move |bytes| gateway_for_data.handle_tcp_data(&node_for_data, bytes));

        let gateway_for_close = Arc::clone(self);
        let node_for_close = node.clone();
        let on_close: Box<dyn FnOnce(String) + Send> =
            Box::new(move |reason| gateway_for_close.handle_tcp_close(&node_for_close, reason));

        NodeTcp::spawn(node, on_data, on_close)
    }

    #[cfg(test)]
    fn node_session_count(&self, node: &Node) -> usize {
        self.inner
            .lock()
            .unwrap()
            .sessions
            .get(node)
            .map(Vec::len)
            .unwrap_or(0)
    }

    #[cfg(test)]
    fn user_count(&self, user: &str) -> u32 {
        self.inner
            .lock()
            .unwrap()
            .user_count
            .get(user)
            .copied()
            .unwrap_or(0)
    }

    #[cfg(test)]
    fn has_tcp(&self, node: &Node) -> bool {
        self.inner.lock().unwrap().tcp.contains_key(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Experiment, Site};
    use tokio::sync::mpsc;

    fn test_session(user: &str, node: &str, mode: Mode) -> (Session, mpsc::UnboundedReceiver<crate::session::Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = Session::new(
            user.to_owned(),
            Site::parse("local").unwrap(),
            Experiment::parse("123").unwrap(),
            Node::parse(node).unwrap(),
            mode,
            tx,
        );
        (session, rx)
    }

    #[tokio::test]
    async fn node_fan_out_cap_rejects_third_session() {
        let gateway = Gateway::new();
        let (s1, _r1) = test_session("alice", "nosuchnode", Mode::Binary);
        let (s2, _r2) = test_session("bob", "nosuchnode", Mode::Binary);
        let (s3, mut r3) = test_session("carol", "nosuchnode", Mode::Binary);

        gateway.attach(s1);
        gateway.attach(s2);
        assert_eq!(gateway.node_session_count(&Node::parse("nosuchnode").unwrap()), 2);

        gateway.attach(s3);
        assert_eq!(gateway.node_session_count(&Node::parse("nosuchnode").unwrap()), 2);

        match r3.try_recv().unwrap() {
            crate::session::Outbound::Close { code, reason } => {
                assert_eq!(code, 1000);
                assert!(reason.contains("Cannot open more than 2 connections to node nosuchnode."));
            }
            other => panic!("expected close, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn user_cap_is_enforced_across_nodes() {
        let gateway = Gateway::new();
        let mut receivers = Vec::new();
        for i in 0..MAX_WS_PER_USER {
            let (s, r) = test_session("alice", &format!("node{i}"), Mode::Binary);
            gateway.attach(s);
            receivers.push(r);
        }
        assert_eq!(gateway.user_count("alice"), MAX_WS_PER_USER);

        let (extra, mut extra_rx) = test_session("alice", "nodeoverflow", Mode::Binary);
        gateway.attach(extra);
        assert_eq!(gateway.user_count("alice"), MAX_WS_PER_USER);
        match extra_rx.try_recv().unwrap() {
            crate::session::Outbound::Close { code, .. } => assert_eq!(code, 1000),
            other => panic!("expected close, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn detach_is_idempotent_and_clears_tcp_on_last_session() {
        let gateway = Gateway::new();
        let node = Node::parse("nosuchnode").unwrap();
        let (s1, _r1) = test_session("alice", "nosuchnode", Mode::Binary);
        let id = s1.id();
        gateway.attach(s1);
        assert!(gateway.has_tcp(&node));

        gateway.detach(id, &node, "alice");
        assert_eq!(gateway.node_session_count(&node), 0);
        assert_eq!(gateway.user_count("alice"), 0);

        // Detaching again must not panic or go negative.
        gateway.detach(id, &node, "alice");
        assert_eq!(gateway.user_count("alice"), 0);
    }

    #[tokio::test]
    async fn tcp_fan_out_respects_mode_and_utf8_validity() {
        let gateway = Gateway::new();
        let node = Node::parse("nosuchnode").unwrap();
        let (text_session, mut text_rx) = test_session("alice", "nosuchnode", Mode::Text);
        let (bin_session, mut bin_rx) = test_session("bob", "nosuchnode", Mode::Binary);
        gateway.attach(text_session);
        gateway.attach(bin_session);

        gateway.handle_tcp_data(&node, b"abc".to_vec());
        match text_rx.try_recv().unwrap() {
            crate::session::Outbound::Text(s) => assert_eq!(s, "abc"),
            other => panic!("expected text, got {other:?}"),
        }
        match bin_rx.try_recv().unwrap() {
            crate::session::Outbound::Binary(b) => assert_eq!(b, b"abc".to_vec()),
            other => panic!("expected binary, got {other:?}"),
        }

        gateway.handle_tcp_data(&node, vec![0xaa, 0xbb, 0xcc, 0xff]);
        assert!(text_rx.try_recv().is_err());
        match bin_rx.try_recv().unwrap() {
            crate::session::Outbound::Binary(b) => assert_eq!(b, vec![0xaa, 0xbb, 0xcc, 0xff]),
            other => panic!("expected binary, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn handle_ws_message_without_tcp_informs_sender_only() {
        let gateway = Gateway::new();
        let (session, mut rx) = test_session("alice", "nosuchnode", Mode::Text);
        gateway.attach(session.clone());

        gateway.handle_ws_message(&session, b"ping".to_vec());
        match rx.try_recv().unwrap() {
            crate::session::Outbound::Text(s) => {
                assert!(s.contains("No TCP connection opened"));
                assert!(s.contains("ping"));
            }
            other => panic!("expected text, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn stop_closes_every_session_with_1001() {
        let gateway = Gateway::new();
        let (s1, mut r1) = test_session("alice", "nosuchnode", Mode::Binary);
        gateway.attach(s1);
        gateway.stop();
        match r1.try_recv().unwrap() {
            crate::session::Outbound::Close { code, reason } => {
                assert_eq!(code, 1001);
                assert_eq!(reason, "server is restarting");
            }
            other => panic!("expected close, got {other:?}"),
        }
    }
}
