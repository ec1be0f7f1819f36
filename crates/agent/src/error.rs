//! Client error taxonomy.

use electrum_rpc::RpcChannelError;
use electrum_script::AddressError;
use electrum_storage::StoreError;

/// Agent-fatal variants transition the agent to CLOSED; the rest are
/// per-call and leave agent state untouched.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentError {
    NoSuitableTransport,
    IncompatibleProtocol(String),
    WrongGenesis { expected: String, found: String },
    HandshakeTimeout,
    BlockTimeout,
    PingTimeout,
    ConnectionLost(String),
    Rpc { code: i64, message: String },
    Protocol(String),
    MerkleProofInvalid {
        transaction_hash: String,
        block_height: i32,
    },
    BroadcastRejected(String),
    NotSynced,
    Address(AddressError),
    Store(String),
}

impl std::fmt::Display for AgentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentError::NoSuitableTransport => write!(f, "No suitable transport"),
            AgentError::IncompatibleProtocol(detail) => {
                write!(f, "Incompatible protocol: {detail}")
            }
            AgentError::WrongGenesis { expected, found } => {
                write!(f, "Wrong genesis: expected {expected}, got {found}")
            }
            AgentError::HandshakeTimeout => write!(f, "Handshake timeout"),
            AgentError::BlockTimeout => write!(f, "Block timeout"),
            AgentError::PingTimeout => write!(f, "Ping timeout"),
            AgentError::ConnectionLost(reason) => write!(f, "Connection lost: {reason}"),
            AgentError::Rpc { code, message } => write!(f, "RPC error {code}: {message}"),
            AgentError::Protocol(detail) => write!(f, "Protocol error: {detail}"),
            AgentError::MerkleProofInvalid {
                transaction_hash,
                block_height,
            } => write!(
                f,
                "Merkle proof invalid for {transaction_hash} at height {block_height}"
            ),
            AgentError::BroadcastRejected(message) => {
                write!(f, "Broadcast rejected: {message}")
            }
            AgentError::NotSynced => write!(f, "Not synced"),
            AgentError::Address(err) => write!(f, "Invalid address: {err}"),
            AgentError::Store(detail) => write!(f, "Store error: {detail}"),
        }
    }
}

impl std::error::Error for AgentError {}

impl From<RpcChannelError> for AgentError {
    fn from(error: RpcChannelError) -> Self {
        match error {
            RpcChannelError::Rpc { code, message } => AgentError::Rpc { code, message },
            RpcChannelError::ConnectionLost(reason) => AgentError::ConnectionLost(reason),
            RpcChannelError::Protocol(detail) => AgentError::Protocol(detail),
        }
    }
}

impl From<AddressError> for AgentError {
    fn from(error: AddressError) -> Self {
        AgentError::Address(error)
    }
}

impl From<StoreError> for AgentError {
    fn from(error: StoreError) -> Self {
        AgentError::Store(error.to_string())
    }
}

impl AgentError {
    /// Whether this error ends the agent (CLOSE is emitted) as opposed
    /// to being surfaced to one caller.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AgentError::NoSuitableTransport
                | AgentError::IncompatibleProtocol(_)
                | AgentError::WrongGenesis { .. }
                | AgentError::HandshakeTimeout
                | AgentError::BlockTimeout
                | AgentError::PingTimeout
        )
    }
}
