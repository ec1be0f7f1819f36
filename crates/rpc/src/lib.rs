//! JSON-RPC 2.0 multiplexing over line-framed duplex channels.

pub mod channel;
pub mod message;

pub use channel::{ChannelConfig, RpcChannel};
pub use message::{connect_tcp, Connector, Endpoint, MessageChannel, TcpConnector};

/// Channel-level failure modes. Per-call RPC errors are recoverable;
/// connection loss and framing violations end the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RpcChannelError {
    Rpc { code: i64, message: String },
    ConnectionLost(String),
    Protocol(String),
}

impl std::fmt::Display for RpcChannelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RpcChannelError::Rpc { code, message } => {
                write!(f, "rpc error {code}: {message}")
            }
            RpcChannelError::ConnectionLost(reason) => write!(f, "connection lost: {reason}"),
            RpcChannelError::Protocol(reason) => write!(f, "protocol error: {reason}"),
        }
    }
}

impl std::error::Error for RpcChannelError {}
