//! Bitcoin wire types, consensus serialization, and plain boundary structures.

pub mod block;
pub mod encoding;
pub mod hash;
pub mod hex;
pub mod outpoint;
pub mod plain;
pub mod transaction;

pub use block::{BlockHeader, HEADER_SIZE};
pub use hash::{hash160, sha256, sha256d};
pub use outpoint::OutPoint;
pub use plain::{PlainBlockHeader, PlainInput, PlainOutput, PlainTransaction, WitnessItem};
pub use transaction::{Transaction, TransactionDecodeError, TxIn, TxOut};
