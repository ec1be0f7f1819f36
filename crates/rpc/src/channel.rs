//! The JSON-RPC request/notification multiplexer.
//!
//! One channel owns one duplex frame stream. Outbound requests carry a
//! monotonically increasing id and park a oneshot sink until the
//! matching response arrives; unsolicited notifications dispatch by
//! method (and first parameter, for parameterized subscriptions) to the
//! registered subscription sink.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{sleep, Duration};

use electrum_log::{log_debug, log_info, log_warn};

use crate::message::{Connector, Endpoint, MessageChannel};
use crate::RpcChannelError;

const RECONNECT_BASE_DELAY_SECS: u64 = 1;
const RECONNECT_MAX_DELAY_SECS: u64 = 30;

#[derive(Clone, Copy, Debug, Default)]
pub struct ChannelConfig {
    /// Re-dial the endpoint after a transport drop. Pending requests are
    /// never replayed; subscriptions are re-established with fresh
    /// requests.
    pub reconnect: bool,
}

struct Subscription {
    method: String,
    params: Vec<Value>,
    sink: mpsc::UnboundedSender<Value>,
}

struct ChannelState {
    next_id: u64,
    pending: HashMap<u64, oneshot::Sender<Result<Value, RpcChannelError>>>,
    subscriptions: HashMap<String, Subscription>,
    outgoing: Option<mpsc::UnboundedSender<String>>,
    connected: bool,
    closing: bool,
}

struct ChannelInner {
    state: Mutex<ChannelState>,
    closed: watch::Sender<Option<String>>,
    connector: Option<(Arc<dyn Connector>, Endpoint)>,
}

#[derive(Clone)]
pub struct RpcChannel {
    inner: Arc<ChannelInner>,
}

impl RpcChannel {
    /// Multiplexes over an already-open channel. No reconnect: when the
    /// stream ends, the channel is dead.
    pub fn open(channel: MessageChannel) -> Self {
        Self::open_with_token(channel, None)
    }

    /// Like [`RpcChannel::open`], sending the tunnel token as the first
    /// frame so a tunneling proxy can route to the target peer.
    pub fn open_with_token(channel: MessageChannel, tunnel_token: Option<&str>) -> Self {
        let rpc = Self::new(None);
        rpc.attach(channel, tunnel_token);
        rpc
    }

    /// Dials the endpoint through the connector. With
    /// `config.reconnect`, a dropped transport is re-dialed with capped
    /// exponential backoff and subscriptions are re-established.
    pub async fn connect(
        connector: Arc<dyn Connector>,
        endpoint: Endpoint,
        config: ChannelConfig,
    ) -> Result<Self, RpcChannelError> {
        let channel = connector.connect(&endpoint).await?;
        let rpc = Self::new(config.reconnect.then(|| (connector, endpoint.clone())));
        rpc.attach(channel, endpoint.tunnel_token.as_deref());
        Ok(rpc)
    }

    fn new(connector: Option<(Arc<dyn Connector>, Endpoint)>) -> Self {
        let (closed, _) = watch::channel(None);
        Self {
            inner: Arc::new(ChannelInner {
                state: Mutex::new(ChannelState {
                    next_id: 0,
                    pending: HashMap::new(),
                    subscriptions: HashMap::new(),
                    outgoing: None,
                    connected: false,
                    closing: false,
                }),
                closed,
                connector,
            }),
        }
    }

    fn attach(&self, channel: MessageChannel, tunnel_token: Option<&str>) {
        let (sender, receiver) = channel.into_parts();
        if let Some(token) = tunnel_token {
            let _ = sender.send(token.to_string());
        }
        {
            let mut state = self.inner.state.lock().expect("channel state");
            state.outgoing = Some(sender);
            state.connected = true;
        }
        let inner = Arc::clone(&self.inner);
        tokio::spawn(reader_loop(inner, receiver));
    }

    pub fn is_connected(&self) -> bool {
        self.inner.state.lock().expect("channel state").connected
    }

    /// Resolves to the close reason once the channel is torn down.
    pub fn closed(&self) -> watch::Receiver<Option<String>> {
        self.inner.closed.subscribe()
    }

    /// Sends one request and awaits the response with the same id.
    pub async fn request(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<Value, RpcChannelError> {
        let (response_tx, response_rx) = oneshot::channel();
        let (id, sender) = {
            let mut state = self.inner.state.lock().expect("channel state");
            if !state.connected {
                return Err(RpcChannelError::ConnectionLost(
                    "not connected".to_string(),
                ));
            }
            let Some(sender) = state.outgoing.clone() else {
                return Err(RpcChannelError::ConnectionLost(
                    "not connected".to_string(),
                ));
            };
            let id = state.next_id;
            state.next_id += 1;
            state.pending.insert(id, response_tx);
            (id, sender)
        };

        let frame = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        })
        .to_string();

        if sender.send(frame).is_err() {
            let mut state = self.inner.state.lock().expect("channel state");
            state.pending.remove(&id);
            return Err(RpcChannelError::ConnectionLost(
                "connection lost".to_string(),
            ));
        }

        match response_rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(RpcChannelError::ConnectionLost(
                "request abandoned".to_string(),
            )),
        }
    }

    /// Sends the subscription request and returns the initial result
    /// plus the stream of subsequent notifications for the same key. A
    /// key holds at most one active sink; re-subscribing replaces it.
    pub async fn subscribe(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<(Value, mpsc::UnboundedReceiver<Value>), RpcChannelError> {
        let key = subscription_key(method, &params);
        let (sink, stream) = mpsc::unbounded_channel();
        {
            let mut state = self.inner.state.lock().expect("channel state");
            if state.closing {
                return Err(RpcChannelError::ConnectionLost("channel closed".to_string()));
            }
            state.subscriptions.insert(
                key.clone(),
                Subscription {
                    method: method.to_string(),
                    params: params.clone(),
                    sink,
                },
            );
        }

        match self.request(method, params).await {
            Ok(initial) => Ok((initial, stream)),
            Err(err) => {
                let mut state = self.inner.state.lock().expect("channel state");
                state.subscriptions.remove(&key);
                Err(err)
            }
        }
    }

    /// Drops the local sink; server-side unsubscription is best-effort.
    pub async fn unsubscribe(&self, method: &str, params: Vec<Value>) {
        let key = subscription_key(method, &params);
        let removed = {
            let mut state = self.inner.state.lock().expect("channel state");
            state.subscriptions.remove(&key).is_some()
        };
        if !removed {
            return;
        }
        if let Some(base) = method.strip_suffix(".subscribe") {
            let unsub = format!("{base}.unsubscribe");
            if let Err(err) = self.request(&unsub, params).await {
                log_debug!("{unsub} failed: {err}");
            }
        }
    }

    /// Tears the channel down. Pending requests fail with
    /// `ConnectionLost(reason)`; notification streams end. Idempotent.
    pub fn close(&self, reason: &str) {
        fail_channel(
            &self.inner,
            RpcChannelError::ConnectionLost(reason.to_string()),
        );
    }
}

fn subscription_key(method: &str, params: &[Value]) -> String {
    match params.first().and_then(Value::as_str) {
        Some(first) => format!("{method}:{first}"),
        None => method.to_string(),
    }
}

async fn reader_loop(inner: Arc<ChannelInner>, mut receiver: mpsc::UnboundedReceiver<String>) {
    while let Some(frame) = receiver.recv().await {
        if let Err(violation) = handle_frame(&inner, &frame) {
            log_warn!("malformed frame: {violation}");
            fail_channel(&inner, RpcChannelError::Protocol(violation));
            return;
        }
    }

    // Stream ended. An explicit close() already cleaned up; a transport
    // drop either reconnects or kills the channel.
    if inner.state.lock().expect("channel state").closing {
        return;
    }

    if inner.connector.is_some() {
        fail_pending(
            &inner,
            RpcChannelError::ConnectionLost("connection lost".to_string()),
        );
        reconnect_loop(inner).await;
    } else {
        fail_channel(
            &inner,
            RpcChannelError::ConnectionLost("connection lost".to_string()),
        );
    }
}

fn handle_frame(inner: &Arc<ChannelInner>, frame: &str) -> Result<(), String> {
    if frame.is_empty() {
        return Ok(());
    }
    let value: Value =
        serde_json::from_str(frame).map_err(|err| format!("invalid json: {err}"))?;
    let Some(object) = value.as_object() else {
        return Err("frame is not an object".to_string());
    };

    match object.get("id") {
        Some(id_value) if !id_value.is_null() => {
            let Some(id) = id_value.as_u64() else {
                return Err("non-numeric response id".to_string());
            };
            let outcome = if let Some(error) = object.get("error").filter(|e| !e.is_null()) {
                Err(RpcChannelError::Rpc {
                    code: error.get("code").and_then(Value::as_i64).unwrap_or(-1),
                    message: error
                        .get("message")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .unwrap_or_else(|| error.to_string()),
                })
            } else {
                Ok(object.get("result").cloned().unwrap_or(Value::Null))
            };

            let sender = {
                let mut state = inner.state.lock().expect("channel state");
                state.pending.remove(&id)
            };
            match sender {
                Some(sender) => {
                    let _ = sender.send(outcome);
                }
                None => log_debug!("response for unknown id {id}"),
            }
            Ok(())
        }
        Some(_) => {
            // An id of null only appears on server-side parse errors for
            // requests we never sent.
            log_warn!("discarding null-id frame: {frame}");
            Ok(())
        }
        None => {
            let Some(method) = object.get("method").and_then(Value::as_str) else {
                return Err("frame without id or method".to_string());
            };
            let params = object.get("params").cloned().unwrap_or(Value::Null);
            dispatch_notification(inner, method, params);
            Ok(())
        }
    }
}

fn dispatch_notification(inner: &Arc<ChannelInner>, method: &str, params: Value) {
    let keyed = params
        .as_array()
        .and_then(|array| array.first())
        .and_then(Value::as_str)
        .map(|first| format!("{method}:{first}"));

    let mut state = inner.state.lock().expect("channel state");
    let key: &str = match keyed {
        Some(ref with_param) if state.subscriptions.contains_key(with_param) => {
            with_param.as_str()
        }
        _ if state.subscriptions.contains_key(method) => method,
        _ => {
            log_debug!("notification without subscriber: {method}");
            return;
        }
    };

    let delivered = state
        .subscriptions
        .get(key)
        .map(|subscription| subscription.sink.send(params).is_ok())
        .unwrap_or(false);
    if !delivered {
        let key = key.to_string();
        state.subscriptions.remove(&key);
    }
}

fn fail_pending(inner: &Arc<ChannelInner>, error: RpcChannelError) {
    let drained: Vec<_> = {
        let mut state = inner.state.lock().expect("channel state");
        state.connected = false;
        state.outgoing = None;
        state.pending.drain().collect()
    };
    for (_, sender) in drained {
        let _ = sender.send(Err(error.clone()));
    }
}

fn fail_channel(inner: &Arc<ChannelInner>, error: RpcChannelError) {
    {
        let mut state = inner.state.lock().expect("channel state");
        if state.closing {
            return;
        }
        state.closing = true;
    }
    fail_pending(inner, error.clone());
    {
        let mut state = inner.state.lock().expect("channel state");
        state.subscriptions.clear();
    }
    let _ = inner.closed.send(Some(error.to_string()));
}

fn reconnect_loop(
    inner: Arc<ChannelInner>,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> {
    Box::pin(reconnect_loop_inner(inner))
}

async fn reconnect_loop_inner(inner: Arc<ChannelInner>) {
    let Some((connector, endpoint)) = inner.connector.clone() else {
        return;
    };

    let mut delay = RECONNECT_BASE_DELAY_SECS;
    loop {
        sleep(Duration::from_secs(delay)).await;
        if inner.state.lock().expect("channel state").closing {
            return;
        }

        match connector.connect(&endpoint).await {
            Ok(channel) => {
                log_info!("reconnected to {}", endpoint.url);
                let (sender, receiver) = channel.into_parts();
                if let Some(token) = endpoint.tunnel_token.as_deref() {
                    let _ = sender.send(token.to_string());
                }
                {
                    let mut state = inner.state.lock().expect("channel state");
                    state.outgoing = Some(sender);
                    state.connected = true;
                }
                resubscribe_all(&inner);
                tokio::spawn(reader_loop(inner, receiver));
                return;
            }
            Err(err) => {
                log_warn!("reconnect to {} failed: {err}", endpoint.url);
                delay = (delay * 2).min(RECONNECT_MAX_DELAY_SECS);
            }
        }
    }
}

/// Re-sends every registered subscription request and forwards the fresh
/// initial result into the existing sink, shaped like a notification
/// (`params + result`).
fn resubscribe_all(inner: &Arc<ChannelInner>) {
    let snapshot: Vec<(String, Vec<Value>, mpsc::UnboundedSender<Value>)> = {
        let state = inner.state.lock().expect("channel state");
        state
            .subscriptions
            .values()
            .map(|sub| (sub.method.clone(), sub.params.clone(), sub.sink.clone()))
            .collect()
    };

    for (method, params, sink) in snapshot {
        let channel = RpcChannel {
            inner: Arc::clone(inner),
        };
        tokio::spawn(async move {
            match channel.request(&method, params.clone()).await {
                Ok(result) => {
                    let mut synthesized = params;
                    synthesized.push(result);
                    let _ = sink.send(Value::Array(synthesized));
                }
                Err(err) => log_warn!("re-subscription {method} failed: {err}"),
            }
        });
    }
}
