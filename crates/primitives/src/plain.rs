//! Plain boundary structures handed to client consumers.
//!
//! These mirror the wire types but carry big-endian hex hashes, derived
//! metadata, and optional confirmation context, and serialize to JSON.

use serde::{Deserialize, Serialize};

use crate::block::{BlockHeader, HEADER_SIZE};
use crate::hex;
use crate::transaction::Transaction;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WitnessItem {
    Number(i64),
    Data(String),
}

impl WitnessItem {
    /// A single-byte stack element in the minimal-push number range is
    /// surfaced as an integer, everything else as hex.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        match bytes {
            [value] if *value <= 16 => Self::Number(i64::from(*value)),
            _ => Self::Data(hex::to_hex(bytes)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlainInput {
    pub script: String,
    pub transaction_hash: String,
    pub address: Option<String>,
    pub witness: Vec<WitnessItem>,
    pub index: u32,
    pub output_index: u32,
    pub sequence: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlainOutput {
    pub script: String,
    pub address: Option<String>,
    pub value: i64,
    pub index: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlainTransaction {
    pub transaction_hash: String,
    pub inputs: Vec<PlainInput>,
    pub outputs: Vec<PlainOutput>,
    pub version: i32,
    pub vsize: u64,
    pub is_coinbase: bool,
    pub weight: u64,
    pub block_hash: Option<String>,
    pub block_height: Option<i32>,
    pub timestamp: Option<u32>,
    pub replace_by_fee: bool,
}

impl PlainTransaction {
    /// Structural conversion; addresses stay unset until a script
    /// classifier fills them in, block fields until a proof attaches them.
    pub fn from_transaction(tx: &Transaction) -> Self {
        let inputs = tx
            .vin
            .iter()
            .enumerate()
            .map(|(index, input)| PlainInput {
                script: hex::to_hex(&input.script_sig),
                transaction_hash: hex::to_hex_reversed(&input.prevout.hash),
                address: None,
                witness: input
                    .witness
                    .iter()
                    .map(|item| WitnessItem::from_bytes(item))
                    .collect(),
                index: index as u32,
                output_index: input.prevout.index,
                sequence: input.sequence,
            })
            .collect();

        let outputs = tx
            .vout
            .iter()
            .enumerate()
            .map(|(index, output)| PlainOutput {
                script: hex::to_hex(&output.script_pubkey),
                address: None,
                value: output.value,
                index: index as u32,
            })
            .collect();

        Self {
            transaction_hash: hex::to_hex_reversed(&tx.txid()),
            inputs,
            outputs,
            version: tx.version,
            vsize: tx.vsize(),
            is_coinbase: tx.is_coinbase(),
            weight: tx.weight(),
            block_hash: None,
            block_height: None,
            timestamp: None,
            replace_by_fee: tx.signals_rbf(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlainBlockHeader {
    pub block_hash: String,
    pub block_height: i32,
    pub timestamp: u32,
    pub bits: u32,
    pub nonce: u32,
    pub version: i32,
    pub weight: u64,
    pub prev_hash: Option<String>,
    pub merkle_root: Option<String>,
}

impl PlainBlockHeader {
    pub fn from_header(header: &BlockHeader, height: i32) -> Self {
        let (prev_hash, merkle_root) = if height == 0 {
            (None, None)
        } else {
            (
                Some(hex::to_hex_reversed(&header.prev_block)),
                Some(hex::to_hex_reversed(&header.merkle_root)),
            )
        };

        Self {
            block_hash: hex::to_hex_reversed(&header.hash()),
            block_height: height,
            timestamp: header.time,
            bits: header.bits,
            nonce: header.nonce,
            version: header.version,
            weight: (HEADER_SIZE * 4) as u64,
            prev_hash,
            merkle_root,
        }
    }
}
