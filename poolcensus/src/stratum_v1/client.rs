//! Stratum v1 client.
//!
//! One client holds one session with one pool. A background reader task owns
//! the read half of the connection: it routes replies to waiting callers
//! through the correlation table and hands notifications to the
//! [`ClientHandler`] supplied at construction. Callers own nothing but the
//! write half, which is guarded by an async mutex.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::oneshot;
use tokio_util::codec::LinesCodecError;
use tokio_util::sync::CancellationToken;

use super::connection::{self, Endpoint, LineReader, LineWriter};
use super::error::{StratumError, StratumResult};
use super::messages::{
    describe_rpc_error, parse_difficulty, parse_extranonce2_size, parse_set_extranonce,
    JobNotification, JsonRpcMessage,
};
use crate::tracing::prelude::*;

/// Receiver of server-initiated events.
///
/// All methods are called from the client's reader task, in wire order, and
/// must not block.
pub trait ClientHandler: Send + Sync + 'static {
    /// A `mining.notify` arrived.
    fn on_notify(&self, job: JobNotification);

    /// A `mining.set_difficulty` with a positive value arrived.
    fn on_difficulty(&self, _difficulty: f64) {}

    /// The reader stopped because the pool closed the connection or the
    /// socket failed. Not called after an explicit [`StratumClient::close`].
    fn on_disconnect(&self, _error: Option<StratumError>) {}
}

/// Connection settings for one client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub endpoint: Endpoint,

    /// Bound on TCP connect and on the TLS handshake, each
    pub dial_timeout: Duration,

    /// Bound on every request/reply round trip
    pub call_timeout: Duration,
}

impl ClientConfig {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            dial_timeout: Duration::from_secs(12),
            call_timeout: Duration::from_secs(20),
        }
    }
}

/// Session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unconnected,
    Connected,
    Subscribed,
    Authorized,
    Closed,
}

/// Values negotiated by `mining.subscribe`, possibly replaced later by
/// `mining.set_extranonce`.
#[derive(Debug, Clone)]
struct Session {
    state: SessionState,
    extranonce1: String,
    extranonce2_size: usize,
}

/// Reply delivered to a waiting caller.
#[derive(Debug)]
struct RpcReply {
    result: Option<Value>,
    error: Option<Value>,
}

/// State shared between callers and the reader task.
struct Shared {
    /// Outstanding calls by request id
    pending: Mutex<HashMap<u64, oneshot::Sender<RpcReply>>>,

    session: Mutex<Session>,

    /// Set exactly once by `close()`
    closed: AtomicBool,
}

impl Shared {
    fn set_state(&self, state: SessionState) {
        let mut session = lock(&self.session);
        if session.state != SessionState::Closed {
            session.state = state;
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Stratum v1 client.
pub struct StratumClient {
    config: ClientConfig,
    handler: Arc<dyn ClientHandler>,
    shared: Arc<Shared>,
    writer: tokio::sync::Mutex<Option<LineWriter>>,
    next_id: AtomicU64,
    shutdown: CancellationToken,
}

impl StratumClient {
    pub fn new(config: ClientConfig, handler: Arc<dyn ClientHandler>) -> Self {
        Self {
            config,
            handler,
            shared: Arc::new(Shared {
                pending: Mutex::new(HashMap::new()),
                session: Mutex::new(Session {
                    state: SessionState::Unconnected,
                    extranonce1: String::new(),
                    extranonce2_size: 0,
                }),
                closed: AtomicBool::new(false),
            }),
            writer: tokio::sync::Mutex::new(None),
            next_id: AtomicU64::new(1),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.config.endpoint
    }

    pub fn state(&self) -> SessionState {
        lock(&self.shared.session).state
    }

    pub fn extranonce1(&self) -> String {
        lock(&self.shared.session).extranonce1.clone()
    }

    pub fn extranonce2_size(&self) -> usize {
        lock(&self.shared.session).extranonce2_size
    }

    /// Dial the pool and start the reader task.
    ///
    /// Returns once the reader is running. Connecting an already connected
    /// client is a no-op; connecting a closed client fails.
    pub async fn connect(&self) -> StratumResult<()> {
        match self.state() {
            SessionState::Unconnected => {}
            SessionState::Closed => return Err(StratumError::NotConnected),
            _ => return Ok(()),
        }

        let stream = connection::dial(&self.config.endpoint, self.config.dial_timeout).await?;
        let (reader, writer) = connection::framed(stream);
        *self.writer.lock().await = Some(writer);

        let (ready_tx, ready_rx) = oneshot::channel();
        tokio::spawn(read_loop(
            reader,
            self.shared.clone(),
            self.handler.clone(),
            self.shutdown.clone(),
            ready_tx,
        ));
        ready_rx.await.map_err(|_| StratumError::Closed)?;

        self.shared.set_state(SessionState::Connected);
        debug!(endpoint = %self.config.endpoint, "Connected");
        Ok(())
    }

    /// Send `mining.subscribe` and record extranonce1 and extranonce2 size.
    pub async fn subscribe(&self, user_agent: &str) -> StratumResult<()> {
        let result = self.call("mining.subscribe", json!([user_agent])).await?;

        // [[subscriptions...], extranonce1, extranonce2_size]
        let arr = result.as_array().ok_or_else(|| {
            StratumError::Protocol("mining.subscribe: result not an array".to_string())
        })?;
        if arr.len() < 3 {
            return Err(StratumError::Protocol(
                "mining.subscribe: unexpected result".to_string(),
            ));
        }

        let extranonce1 = arr[1]
            .as_str()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                StratumError::Protocol("mining.subscribe: missing extranonce1".to_string())
            })?;
        let extranonce2_size = parse_extranonce2_size(&arr[2])
            .map_err(|e| StratumError::Protocol(format!("mining.subscribe: {}", e)))?;

        {
            let mut session = lock(&self.shared.session);
            session.extranonce1 = extranonce1.to_string();
            session.extranonce2_size = extranonce2_size;
        }
        self.shared.set_state(SessionState::Subscribed);

        debug!(
            extranonce1 = %extranonce1,
            extranonce2_size = extranonce2_size,
            "Subscribed"
        );
        Ok(())
    }

    /// Send `mining.authorize`.
    pub async fn authorize(&self, username: &str, password: &str) -> StratumResult<()> {
        let result = match self
            .call("mining.authorize", json!([username, password]))
            .await
        {
            Ok(result) => result,
            Err(StratumError::Rpc { message, .. }) => return Err(StratumError::Auth(message)),
            Err(e) => return Err(e),
        };

        if result.as_bool() != Some(true) {
            return Err(StratumError::Auth(format!("pool returned {}", result)));
        }

        self.shared.set_state(SessionState::Authorized);
        debug!(username = %username, "Authorized");
        Ok(())
    }

    /// Send a request and wait for its correlated reply.
    ///
    /// Any number of calls may be outstanding at once; each has its own id
    /// and its own timeout. A timed-out call leaves the connection open and
    /// its late reply is dropped by the reader.
    pub async fn call(&self, method: &str, params: Value) -> StratumResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (reply_tx, reply_rx) = oneshot::channel();

        {
            // Checked under the table lock so close() cannot miss this entry.
            let mut pending = lock(&self.shared.pending);
            if self.shared.closed.load(Ordering::Acquire) {
                return Err(StratumError::NotConnected);
            }
            pending.insert(id, reply_tx);
        }

        let line = serde_json::to_string(&JsonRpcMessage::request(id, method, params))
            .map_err(|e| StratumError::Protocol(format!("{}: {}", method, e)))?;
        trace!(line = %line, "tx");

        let sent = {
            let mut writer = self.writer.lock().await;
            match writer.as_mut() {
                Some(writer) => writer
                    .send(line)
                    .await
                    .map_err(|e| StratumError::Connection(e.to_string())),
                None => Err(StratumError::NotConnected),
            }
        };
        if let Err(e) = sent {
            lock(&self.shared.pending).remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(self.config.call_timeout, reply_rx).await {
            Ok(Ok(reply)) => {
                if let Some(error) = reply.error.filter(|e| !e.is_null()) {
                    return Err(StratumError::Rpc {
                        method: method.to_string(),
                        message: describe_rpc_error(&error),
                    });
                }
                match reply.result {
                    Some(result) if !result.is_null() => Ok(result),
                    _ => Err(StratumError::Protocol(format!("{}: empty result", method))),
                }
            }
            Ok(Err(_)) => Err(StratumError::Closed),
            Err(_) => {
                lock(&self.shared.pending).remove(&id);
                Err(StratumError::Timeout(method.to_string()))
            }
        }
    }

    /// Close the session.
    ///
    /// Idempotent and safe to call from several places at once; only the
    /// first call does any work. Pending calls fail with
    /// [`StratumError::Closed`].
    pub async fn close(&self) {
        if !self.shut_down() {
            return;
        }

        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = SinkExt::<String>::close(&mut writer).await;
        }
        debug!(endpoint = %self.config.endpoint, "Closed");
    }

    /// Synchronous part of close. Returns true for the caller that won.
    fn shut_down(&self) -> bool {
        let pending = {
            let mut pending = lock(&self.shared.pending);
            if self.shared.closed.swap(true, Ordering::AcqRel) {
                return false;
            }
            std::mem::take(&mut *pending)
        };
        // Dropping the senders wakes every waiting caller.
        drop(pending);

        lock(&self.shared.session).state = SessionState::Closed;
        self.shutdown.cancel();
        true
    }
}

impl Drop for StratumClient {
    fn drop(&mut self) {
        self.shut_down();
    }
}

/// Reader task: one per connection.
async fn read_loop(
    mut reader: LineReader,
    shared: Arc<Shared>,
    handler: Arc<dyn ClientHandler>,
    shutdown: CancellationToken,
    ready: oneshot::Sender<()>,
) {
    let _ = ready.send(());

    // FramedRead yields one `None` after a decode error before reading on.
    let mut resuming = false;

    let disconnect = loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => return,
            line = reader.next() => line,
        };

        match line {
            Some(Ok(line)) => {
                resuming = false;
                dispatch_line(&line, &shared, handler.as_ref());
            }
            Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                warn!("Discarding over-long line from pool");
                resuming = true;
            }
            Some(Err(LinesCodecError::Io(e))) => break Some(StratumError::from(e)),
            None if resuming => resuming = false,
            None => break None,
        }
    };

    if shared.closed.load(Ordering::Acquire) {
        return;
    }

    debug!(error = ?disconnect.as_ref().map(|e| e.to_string()), "Reader stopped");
    // Mark closed and fail pending calls before telling the handler.
    {
        let mut pending = lock(&shared.pending);
        shared.closed.store(true, Ordering::Release);
        pending.clear();
    }
    lock(&shared.session).state = SessionState::Closed;
    shutdown.cancel();
    handler.on_disconnect(disconnect);
}

fn dispatch_line(line: &str, shared: &Shared, handler: &dyn ClientHandler) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }
    trace!(line = %line, "rx");

    let msg: JsonRpcMessage = match serde_json::from_str(line) {
        Ok(msg) => msg,
        Err(e) => {
            debug!(error = %e, "Skipping unparseable line");
            return;
        }
    };

    match msg {
        JsonRpcMessage::Response { id, result, error } => {
            let waiter = lock(&shared.pending).remove(&id);
            match waiter {
                Some(tx) => {
                    let _ = tx.send(RpcReply { result, error });
                }
                None => debug!(msg_id = id, "Dropping reply with no waiting call"),
            }
        }
        JsonRpcMessage::Request {
            id: None,
            method,
            params,
        } => handle_notification(&method, &params, shared, handler),
        JsonRpcMessage::Request {
            id: Some(_), method, ..
        } => {
            debug!(method = %method, "Ignoring request from pool");
        }
    }
}

fn handle_notification(method: &str, params: &Value, shared: &Shared, handler: &dyn ClientHandler) {
    match method {
        "mining.notify" => {
            let parsed = params
                .as_array()
                .ok_or_else(|| "mining.notify params not an array".to_string())
                .and_then(|arr| JobNotification::from_stratum_params(arr));
            match parsed {
                Ok(job) => handler.on_notify(job),
                Err(e) => warn!(error = %e, "Ignoring malformed mining.notify"),
            }
        }
        "mining.set_difficulty" => {
            if let Some(difficulty) = parse_difficulty(params) {
                handler.on_difficulty(difficulty);
            }
        }
        "mining.set_extranonce" => match parse_set_extranonce(params) {
            Ok((extranonce1, extranonce2_size)) => {
                let mut session = lock(&shared.session);
                if !extranonce1.is_empty() {
                    session.extranonce1 = extranonce1;
                }
                if extranonce2_size > 0 {
                    session.extranonce2_size = extranonce2_size;
                }
            }
            Err(e) => warn!(error = %e, "Ignoring malformed mining.set_extranonce"),
        },
        _ => trace!(method = %method, "Unhandled notification"),
    }
}
