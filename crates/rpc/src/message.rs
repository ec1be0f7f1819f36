//! Line-framed duplex message channels.
//!
//! A `MessageChannel` carries text frames in both directions. The TCP
//! implementation pumps newline-delimited frames over a socket;
//! `MessageChannel::pair` wires two ends together in process for tests
//! and embedders that bring their own transport.

use std::future::Future;
use std::pin::Pin;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};

use electrum_log::{log_debug, log_trace};

use crate::RpcChannelError;

const CONNECT_TIMEOUT_SECS: u64 = 5;
const WRITE_TIMEOUT_SECS: u64 = 10;
const MAX_FRAME_BYTES: usize = 4 * 1024 * 1024;

/// Where a connector should reach the peer, plus the tunnel token for
/// proxied transports.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Endpoint {
    pub url: String,
    pub tunnel_token: Option<String>,
}

impl Endpoint {
    pub fn direct(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            tunnel_token: None,
        }
    }

    pub fn tunneled(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            tunnel_token: Some(token.into()),
        }
    }
}

/// One end of a duplex frame stream. Dropping it (or the peer hanging
/// up) closes the stream: `send` starts failing and `recv` drains then
/// returns `None`.
pub struct MessageChannel {
    sender: mpsc::UnboundedSender<String>,
    receiver: mpsc::UnboundedReceiver<String>,
}

impl MessageChannel {
    pub fn from_parts(
        sender: mpsc::UnboundedSender<String>,
        receiver: mpsc::UnboundedReceiver<String>,
    ) -> Self {
        Self { sender, receiver }
    }

    /// Two in-process ends wired back to back.
    pub fn pair() -> (MessageChannel, MessageChannel) {
        let (left_tx, left_rx) = mpsc::unbounded_channel();
        let (right_tx, right_rx) = mpsc::unbounded_channel();
        (
            MessageChannel::from_parts(left_tx, right_rx),
            MessageChannel::from_parts(right_tx, left_rx),
        )
    }

    pub fn send(&self, frame: impl Into<String>) -> Result<(), RpcChannelError> {
        self.sender
            .send(frame.into())
            .map_err(|_| RpcChannelError::ConnectionLost("channel closed".to_string()))
    }

    pub async fn recv(&mut self) -> Option<String> {
        self.receiver.recv().await
    }

    pub fn into_parts(
        self,
    ) -> (
        mpsc::UnboundedSender<String>,
        mpsc::UnboundedReceiver<String>,
    ) {
        (self.sender, self.receiver)
    }
}

/// Opens a line-framed channel over TCP. Accepts `tcp://host:port` or a
/// bare `host:port`.
pub async fn connect_tcp(url: &str) -> Result<MessageChannel, RpcChannelError> {
    let addr = url.strip_prefix("tcp://").unwrap_or(url);
    let stream = timeout(
        Duration::from_secs(CONNECT_TIMEOUT_SECS),
        TcpStream::connect(addr),
    )
    .await
    .map_err(|_| RpcChannelError::ConnectionLost(format!("connect timeout to {addr}")))?
    .map_err(|err| RpcChannelError::ConnectionLost(format!("connect to {addr} failed: {err}")))?;

    let (read_half, mut write_half) = stream.into_split();
    let (incoming_tx, incoming_rx) = mpsc::unbounded_channel::<String>();
    let (outgoing_tx, mut outgoing_rx) = mpsc::unbounded_channel::<String>();

    tokio::spawn(async move {
        let mut reader = BufReader::new(read_half);
        let mut line = String::new();
        loop {
            line.clear();
            match reader.read_line(&mut line).await {
                Ok(0) => break,
                Ok(_) => {
                    if line.len() > MAX_FRAME_BYTES {
                        log_debug!("dropping oversized frame ({} bytes)", line.len());
                        break;
                    }
                    let frame = line.trim_end_matches(['\r', '\n']).to_string();
                    log_trace!("recv frame: {frame}");
                    if incoming_tx.send(frame).is_err() {
                        break;
                    }
                }
                Err(err) => {
                    log_debug!("socket read failed: {err}");
                    break;
                }
            }
        }
    });

    tokio::spawn(async move {
        while let Some(frame) = outgoing_rx.recv().await {
            log_trace!("send frame: {frame}");
            let mut bytes = frame.into_bytes();
            bytes.push(b'\n');
            let write = timeout(
                Duration::from_secs(WRITE_TIMEOUT_SECS),
                write_half.write_all(&bytes),
            )
            .await;
            match write {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    log_debug!("socket write failed: {err}");
                    break;
                }
                Err(_) => {
                    log_debug!("socket write timed out");
                    break;
                }
            }
        }
        let _ = write_half.shutdown().await;
    });

    Ok(MessageChannel::from_parts(outgoing_tx, incoming_rx))
}

pub type ConnectFuture<'a> =
    Pin<Box<dyn Future<Output = Result<MessageChannel, RpcChannelError>> + Send + 'a>>;

/// Async factory for message channels, used on initial connect and by
/// the reconnect loop. The tunnel token frame is sent by the caller, not
/// the connector.
pub trait Connector: Send + Sync {
    fn connect<'a>(&'a self, endpoint: &'a Endpoint) -> ConnectFuture<'a>;
}

/// Plain TCP connector for `tcp://` endpoints.
#[derive(Clone, Copy, Debug, Default)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    fn connect<'a>(&'a self, endpoint: &'a Endpoint) -> ConnectFuture<'a> {
        Box::pin(connect_tcp(&endpoint.url))
    }
}
