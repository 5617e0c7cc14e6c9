//! The single TCP client per node.
//!
//! `NodeTcp` owns one TCP connection to a node and enforces the inbound rate
//! cap. The connect, read loop and write loop run as independent tasks; the
//! handle kept by the `Gateway` only carries a `ready` flag and a channel
//! into the write loop, so `Gateway` and `NodeTcp` never form a reference
//! cycle. `NodeTcp`'s tasks reach back into the `Gateway` only through the
//! `on_data`/`on_close` callbacks it is built with.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use crate::constants::{CHECK_PERIOD, CHUNK_SIZE, MAX_BYTES_PER_PERIOD, NODE_TCP_PORT};
use crate::domain::Node;

type OnData = Box<dyn Fn(Vec<u8>) + Send + Sync>;
type OnClose = Box<dyn FnOnce(String) + Send>;

enum WriteCmd {
    Data(Vec<u8>),
    Stop,
}

/// Handle to one node's TCP connection. Cheap to hold in the `Gateway`'s
/// registry: the connect, read and write loops live in a spawned task.
pub struct NodeTcp {
    ready: Arc<AtomicBool>,
    cmd_tx: mpsc::UnboundedSender<WriteCmd>,
}

impl NodeTcp {
    /// Starts the connection in the background and returns immediately; the
    /// connect proceeds concurrently and acceptance does not wait for it.
    /// `on_close` fires exactly once, whether the connect fails, the rate
    /// cap trips, or the stream is closed remotely; it never fires as a
    /// result of a local `stop()`.
    pub fn spawn(node: Node, on_data: OnData, on_close: OnClose) -> Self {
        let ready = Arc::new(AtomicBool::new(false));
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

        let ready_for_task = Arc::clone(&ready);
        tokio::spawn(run(node, ready_for_task, cmd_rx, on_data, on_close));

        Self { ready, cmd_tx }
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Writes `bytes` to the TCP side iff the connection is ready; otherwise
    /// silently drops them.
    pub fn send(&self, bytes: Vec<u8>) {
        if self.is_ready() {
            let _ = self.cmd_tx.send(WriteCmd::Data(bytes));
        }
    }

    /// Closes the TCP stream iff ready. No `on_close` fires as a result, the
    /// caller (`Gateway::detach`) has already removed this handle from the
    /// registry before calling `stop`.
    pub fn stop(&self) {
        if self.is_ready() {
            let _ = self.cmd_tx.send(WriteCmd::Stop);
        }
    }
}

async fn run(
    node: Node,
    ready: Arc<AtomicBool>,
    mut cmd_rx: mpsc::UnboundedReceiver<WriteCmd>,
    on_data: OnData,
    on_close: OnClose,
) {
    tracing::debug!(%node, port = NODE_TCP_PORT, "opening TCP connection to node");
    let stream = match TcpStream::connect((node.as_str(), NODE_TCP_PORT)).await {
        Ok(stream) => stream,
        Err(err) => {
            tracing::warn!(%node, %err, "cannot open TCP connection to node");
            on_close(format!("Cannot connect to node {node}"));
            return;
        }
    };
    tracing::debug!(%node, "TCP connection is ready");
    ready.store(true, Ordering::Release);

    let (mut read_half, mut write_half) = tokio::io::split(stream);
    let mut on_close = Some(on_close);
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut received: usize = 0;
    let mut window_start = Instant::now();

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(WriteCmd::Data(bytes)) => {
                        let _ = write_half.write_all(&bytes).await;
                    }
                    Some(WriteCmd::Stop) | None => {
                        ready.store(false, Ordering::Release);
                        return;
                    }
                }
            }
            read_result = read_half.read(&mut buf) => {
                match read_result {
                    Ok(0) => {
                        ready.store(false, Ordering::Release);
                        tracing::info!(%node, "TCP connection to node is closed");
                        if let Some(cb) = on_close.take() {
                            cb(format!("Connection to {node} is closed"));
                        }
                        return;
                    }
                    Ok(n) => {
                        received += n;
                        on_data(buf[..n].to_vec());

                        if window_start.elapsed() > CHECK_PERIOD {
                            if received > MAX_BYTES_PER_PERIOD {
                                tracing::warn!(
                                    %node, received, "node is sending too fast, closing"
                                );
                                ready.store(false, Ordering::Release);
                                if let Some(cb) = on_close.take() {
                                    cb(format!("Node {node} is sending too fast"));
                                }
                                return;
                            }
                            received = 0;
                            window_start = Instant::now();
                        }
                    }
                    Err(err) => {
                        ready.store(false, Ordering::Release);
                        tracing::info!(%node, %err, "TCP connection to node is closed");
                        if let Some(cb) = on_close.take() {
                            cb(format!("Connection to {node} is closed"));
                        }
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio::io::AsyncReadExt as _;
    use tokio::net::TcpListener;

    async fn loopback_node() -> (Node, TcpListener) {
        let listener = TcpListener::bind(("127.0.0.1", NODE_TCP_PORT))
            .await
            .expect("bind test node port, requires NODE_TCP_PORT free locally");
        (Node::parse("localhost").unwrap(), listener)
    }

    #[tokio::test]
    async fn connect_failure_reports_close_reason() {
        // No listener bound on NODE_TCP_PORT's loopback test alias: use a
        // node name that can never resolve to force the connect error path.
        let node = Node::parse("nosuchnode").unwrap();
        let reasons: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let reasons_clone = Arc::clone(&reasons);
        let (done_tx, done_rx) = tokio::sync::oneshot::channel();
        let done_tx = Mutex::new(Some(done_tx));
        let on_close: OnClose = Box::new(move |reason| {
            reasons_clone.lock().unwrap().push(reason);
            if let Some(tx) = done_tx.lock().unwrap().take() {
                let _ = tx.send(());
            }
        });
        let on_data: OnData = Box::new(|_| {});
        let _tcp = NodeTcp::spawn(node, on_data, on_close);
        tokio::time::timeout(std::time::Duration::from_secs(5), done_rx)
            .await
            .expect("on_close should fire")
            .unwrap();
        assert!(reasons.lock().unwrap()[0].contains("Cannot connect to node"));
    }

    #[tokio::test]
    async fn data_is_forwarded_and_stop_is_clean() {
        let (node, listener) = loopback_node().await;
        let chunks: Arc<Mutex<Vec<Vec<u8>>>> = Arc::new(Mutex::new(Vec::new()));
        let chunks_clone = Arc::clone(&chunks);
        let on_data: OnData = Box::new(move |bytes| chunks_clone.lock().unwrap().push(bytes));
        let on_close: OnClose = Box::new(|_| {});

        let accept = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            sock.write_all(b"hello").await.unwrap();
            let mut buf = [0u8; 16];
            let n = sock.read(&mut buf).await.unwrap();
            buf[..n].to_vec()
        });

        let tcp = NodeTcp::spawn(node, on_data, on_close);
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(tcp.is_ready());
        tcp.send(b"world".to_vec());

        let echoed = tokio::time::timeout(std::time::Duration::from_secs(2), accept)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(echoed, b"world");

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(chunks.lock().unwrap().as_slice(), [b"hello".to_vec()]);

        tcp.stop();
    }
}
