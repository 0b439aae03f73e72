//! Chrome DevTools Protocol transport over WebSocket.
//!
//! One physical connection carries every command of a run: browser-level
//! commands and commands scoped to any number of attached sessions all share
//! a single monotonically increasing id space. Responses are matched back to
//! callers through a pending map, so any number of commands may be in flight
//! at once without cross-talk.

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, warn};

use feedsift_core::{Error, Result};

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Value>>>>;

/// Per-call options for [`CdpConnection::send`].
#[derive(Debug, Clone, Default)]
pub struct SendOpts {
    /// Scope the command to an attached session.
    pub session_id: Option<String>,
    /// Override the connection's default response deadline.
    pub timeout_ms: Option<u64>,
}

impl SendOpts {
    pub fn session(session_id: &str) -> Self {
        Self {
            session_id: Some(session_id.to_string()),
            timeout_ms: None,
        }
    }

    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }
}

/// A CDP WebSocket connection with request/response correlation.
pub struct CdpConnection {
    /// Sender to write messages to the WebSocket.
    ws_tx: mpsc::Sender<String>,
    /// Pending command responses, keyed by request id.
    pending: PendingMap,
    /// Auto-incrementing command id, shared across all sessions.
    next_id: AtomicU64,
    /// Set by close() and by the reader task on socket loss.
    closed: Arc<AtomicBool>,
    default_timeout: Duration,
    reader_handle: tokio::task::JoinHandle<()>,
    writer_handle: tokio::task::JoinHandle<()>,
}

impl CdpConnection {
    /// Connect to a debugger WebSocket endpoint. Fails with
    /// [`Error::Connection`] when the handshake does not complete within
    /// `connect_timeout`.
    pub async fn connect(
        ws_url: &str,
        connect_timeout: Duration,
        default_timeout: Duration,
    ) -> Result<Self> {
        let connected = tokio::time::timeout(connect_timeout, connect_async(ws_url))
            .await
            .map_err(|_| {
                Error::Connection(format!(
                    "Handshake with {} did not complete within {:?}",
                    ws_url, connect_timeout
                ))
            })?;
        let (ws_stream, _) = connected
            .map_err(|e| Error::Connection(format!("Failed to connect to {}: {}", ws_url, e)))?;

        let (mut ws_sink, mut ws_read) = ws_stream.split();

        // Channel for outgoing messages; the writer task owns the sink.
        let (ws_tx, mut ws_rx) = mpsc::channel::<String>(256);

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));

        let writer_handle = tokio::spawn(async move {
            while let Some(msg) = ws_rx.recv().await {
                if let Err(e) = ws_sink.send(Message::Text(msg)).await {
                    error!("CDP WebSocket write error: {}", e);
                    break;
                }
            }
        });

        // Reader task: dispatches responses to their waiting callers.
        // Events arrive on the same stream; presence of rendered content is
        // polled rather than subscribed to, so they are only traced here.
        let pending_clone = pending.clone();
        let closed_clone = closed.clone();
        let reader_handle = tokio::spawn(async move {
            while let Some(msg_result) = ws_read.next().await {
                match msg_result {
                    Ok(Message::Text(text)) => {
                        let Ok(val) = serde_json::from_str::<Value>(&text) else {
                            continue;
                        };
                        if let Some(id) = val.get("id").and_then(|v| v.as_u64()) {
                            let mut pending = pending_clone.lock().await;
                            if let Some(tx) = pending.remove(&id) {
                                let _ = tx.send(val);
                            }
                        } else if let Some(method) = val.get("method").and_then(|v| v.as_str()) {
                            debug!(method = method, "CDP event");
                        }
                    }
                    Ok(Message::Close(_)) => {
                        debug!("CDP WebSocket closed by remote");
                        break;
                    }
                    Err(e) => {
                        warn!("CDP WebSocket read error: {}", e);
                        break;
                    }
                    _ => {}
                }
            }
            // Socket is gone: every still-pending command must fail with
            // ConnectionClosed instead of running out its timeout.
            closed_clone.store(true, Ordering::SeqCst);
            pending_clone.lock().await.clear();
        });

        Ok(Self {
            ws_tx,
            pending,
            next_id: AtomicU64::new(1),
            closed,
            default_timeout,
            reader_handle,
            writer_handle,
        })
    }

    /// Send a command and wait for its correlated response.
    ///
    /// Fails with [`Error::Timeout`] when no response arrives within the
    /// effective deadline, [`Error::Protocol`] when the remote returns an
    /// error payload, and [`Error::ConnectionClosed`] once the connection is
    /// closed.
    pub async fn send(&self, method: &str, params: Value, opts: SendOpts) -> Result<Value> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::ConnectionClosed);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);

        let mut envelope = json!({
            "id": id,
            "method": method,
            "params": params,
        });
        if let Some(session_id) = &opts.session_id {
            envelope["sessionId"] = json!(session_id);
        }

        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            pending.insert(id, tx);
        }

        if self.ws_tx.send(envelope.to_string()).await.is_err() {
            self.pending.lock().await.remove(&id);
            return Err(Error::ConnectionClosed);
        }

        let timeout = opts
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(self.default_timeout);

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => {
                if let Some(error) = response.get("error") {
                    return Err(Error::Protocol(format!("{}: {}", method, error)));
                }
                Ok(response.get("result").cloned().unwrap_or(Value::Null))
            }
            // Sender dropped: the connection went away underneath us.
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(Error::Timeout(format!(
                    "{} did not answer within {:?}",
                    method, timeout
                )))
            }
        }
    }

    /// Release the socket. Every pending command fails with
    /// [`Error::ConnectionClosed`]; later sends fail the same way.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.reader_handle.abort();
        self.writer_handle.abort();
        self.pending.lock().await.clear();
    }

    // ─── Target / session lifecycle ───────────────────────────────────

    /// All browser targets (pages, iframes, workers).
    pub async fn get_targets(&self) -> Result<Vec<Value>> {
        let result = self
            .send("Target.getTargets", json!({}), SendOpts::default())
            .await?;
        Ok(result
            .get("targetInfos")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default())
    }

    /// Open a new page target at the given URL.
    pub async fn create_target(&self, url: &str) -> Result<String> {
        let result = self
            .send("Target.createTarget", json!({"url": url}), SendOpts::default())
            .await?;
        result
            .get("targetId")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| Error::Protocol("No targetId returned from createTarget".to_string()))
    }

    /// Attach to a target; the returned session id scopes further commands.
    pub async fn attach_to_target(&self, target_id: &str) -> Result<String> {
        let result = self
            .send(
                "Target.attachToTarget",
                json!({"targetId": target_id, "flatten": true}),
                SendOpts::default(),
            )
            .await?;
        result
            .get("sessionId")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| Error::Protocol("No sessionId returned from attachToTarget".to_string()))
    }

    /// Close a target. Its session id is dead afterwards and never reused.
    pub async fn close_target(&self, target_id: &str) -> Result<()> {
        self.send(
            "Target.closeTarget",
            json!({"targetId": target_id}),
            SendOpts::default(),
        )
        .await?;
        Ok(())
    }

    // ─── Session-scoped helpers ───────────────────────────────────────

    /// Enable a CDP domain (e.g. "Page", "Runtime") on a session.
    pub async fn enable_domain(&self, session_id: &str, domain: &str) -> Result<()> {
        self.send(
            &format!("{}.enable", domain),
            json!({}),
            SendOpts::session(session_id),
        )
        .await?;
        Ok(())
    }

    pub async fn navigate(&self, session_id: &str, url: &str) -> Result<Value> {
        self.send(
            "Page.navigate",
            json!({"url": url}),
            SendOpts::session(session_id),
        )
        .await
    }

    /// Evaluate an expression in the page and return its value.
    pub async fn evaluate(&self, session_id: &str, expression: &str) -> Result<Value> {
        let result = self
            .send(
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "returnByValue": true,
                }),
                SendOpts::session(session_id),
            )
            .await?;
        Ok(result
            .pointer("/result/value")
            .cloned()
            .unwrap_or(Value::Null))
    }
}

impl Drop for CdpConnection {
    fn drop(&mut self) {
        self.reader_handle.abort();
        self.writer_handle.abort();
    }
}
