//! Typed Electrum method surface.
//!
//! Each method maps onto exactly one Electrum RPC and converts the raw
//! payload into plain structures at this boundary; below it the channel
//! only moves JSON values.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::mpsc;

use electrum_consensus::ChainParams;
use electrum_log::log_debug;
use electrum_primitives::block::BlockHeader;
use electrum_primitives::hex;
use electrum_primitives::plain::{PlainBlockHeader, PlainTransaction};
use electrum_primitives::transaction::Transaction;
use electrum_rpc::{RpcChannel, RpcChannelError};
use electrum_script::address::address_to_script_hash;
use electrum_script::classify::input_address;
use electrum_script::script_pubkey_to_address;

use crate::error::AgentError;
use crate::merkle::verify_merkle_proof;
use crate::peer::{parse_peers, Peer};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub confirmed: i64,
    pub unconfirmed: i64,
}

/// One history entry for a scripthash: a non-positive height means
/// unconfirmed (-1 when a parent is also unconfirmed), a positive one
/// is the confirmation height.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub block_height: i32,
    pub transaction_hash: String,
    pub fee: Option<i64>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServerFeatures {
    pub genesis_hash: Option<String>,
    pub server_version: Option<String>,
    pub protocol_min: Option<String>,
    pub protocol_max: Option<String>,
    pub hash_function: Option<String>,
    pub pruning: Option<i64>,
}

#[derive(Deserialize)]
struct HistoryEntry {
    height: i64,
    tx_hash: String,
    #[serde(default)]
    fee: Option<i64>,
}

#[derive(Deserialize)]
struct MerkleProof {
    merkle: Vec<String>,
    pos: u64,
}

#[derive(Clone)]
pub struct ElectrumApi {
    rpc: RpcChannel,
    params: ChainParams,
}

impl ElectrumApi {
    pub fn new(rpc: RpcChannel, params: ChainParams) -> Self {
        Self { rpc, params }
    }

    pub fn channel(&self) -> &RpcChannel {
        &self.rpc
    }

    pub fn chain_params(&self) -> &ChainParams {
        &self.params
    }

    /// `server.version` with a protocol range. A server that cannot
    /// satisfy the range answers with an error, surfaced as
    /// `IncompatibleProtocol`.
    pub async fn set_protocol_version(
        &self,
        client_id: &str,
        range: [&str; 2],
    ) -> Result<(String, String), AgentError> {
        let result = self
            .rpc
            .request("server.version", vec![json!(client_id), json!(range)])
            .await
            .map_err(|err| match err {
                RpcChannelError::Rpc { message, .. } => AgentError::IncompatibleProtocol(message),
                other => other.into(),
            })?;

        let pair = result.as_array().ok_or_else(|| {
            AgentError::Protocol("server.version did not return a pair".to_string())
        })?;
        let software = pair.first().and_then(Value::as_str).unwrap_or_default();
        let protocol = pair.get(1).and_then(Value::as_str).ok_or_else(|| {
            AgentError::Protocol("server.version missing protocol".to_string())
        })?;
        Ok((software.to_string(), protocol.to_string()))
    }

    pub async fn get_features(&self) -> Result<ServerFeatures, AgentError> {
        let result = self.rpc.request("server.features", vec![]).await?;
        serde_json::from_value(result)
            .map_err(|err| AgentError::Protocol(format!("server.features: {err}")))
    }

    pub async fn ping(&self) -> Result<(), AgentError> {
        self.rpc.request("server.ping", vec![]).await?;
        Ok(())
    }

    pub async fn get_balance(&self, address: &str) -> Result<Balance, AgentError> {
        let script_hash = address_to_script_hash(address, self.params.network)?;
        let result = self
            .rpc
            .request("blockchain.scripthash.get_balance", vec![json!(script_hash)])
            .await?;
        serde_json::from_value(result)
            .map_err(|err| AgentError::Protocol(format!("get_balance: {err}")))
    }

    pub async fn get_receipts_for_address(
        &self,
        address: &str,
    ) -> Result<Vec<Receipt>, AgentError> {
        let script_hash = address_to_script_hash(address, self.params.network)?;
        self.get_receipts(&script_hash).await
    }

    pub async fn get_receipts(&self, script_hash: &str) -> Result<Vec<Receipt>, AgentError> {
        let result = self
            .rpc
            .request("blockchain.scripthash.get_history", vec![json!(script_hash)])
            .await?;
        let entries: Vec<HistoryEntry> = serde_json::from_value(result)
            .map_err(|err| AgentError::Protocol(format!("get_history: {err}")))?;
        Ok(entries
            .into_iter()
            .map(|entry| Receipt {
                block_height: entry.height as i32,
                transaction_hash: entry.tx_hash,
                fee: entry.fee,
            })
            .collect())
    }

    /// Fetches and decodes a raw transaction. With a block given, the
    /// server must also prove inclusion; block fields are attached only
    /// after the proof checks out.
    pub async fn get_transaction(
        &self,
        transaction_hash: &str,
        block: Option<&PlainBlockHeader>,
    ) -> Result<PlainTransaction, AgentError> {
        let result = self
            .rpc
            .request("blockchain.transaction.get", vec![json!(transaction_hash)])
            .await?;
        let raw = result
            .as_str()
            .ok_or_else(|| AgentError::Protocol("transaction.get: not a string".to_string()))?;
        let bytes = hex::from_hex(raw)
            .map_err(|err| AgentError::Protocol(format!("transaction.get: {err}")))?;
        let tx = Transaction::consensus_decode(&bytes)
            .map_err(|err| AgentError::Protocol(format!("transaction.get: {err}")))?;

        let mut plain = self.plain_transaction(&tx);
        if plain.transaction_hash != transaction_hash {
            return Err(AgentError::Protocol(format!(
                "transaction.get returned {}, requested {transaction_hash}",
                plain.transaction_hash
            )));
        }

        if let Some(block) = block {
            self.proof_transaction(transaction_hash, block).await?;
            plain.block_hash = Some(block.block_hash.clone());
            plain.block_height = Some(block.block_height);
            plain.timestamp = Some(block.timestamp);
        }

        Ok(plain)
    }

    /// Standalone inclusion proof against an already-stored header.
    pub async fn proof_transaction(
        &self,
        transaction_hash: &str,
        block: &PlainBlockHeader,
    ) -> Result<(), AgentError> {
        let result = self
            .rpc
            .request(
                "blockchain.transaction.get_merkle",
                vec![json!(transaction_hash), json!(block.block_height)],
            )
            .await?;
        let proof: MerkleProof = serde_json::from_value(result)
            .map_err(|err| AgentError::Protocol(format!("get_merkle: {err}")))?;

        let merkle_root =
            block
                .merkle_root
                .as_deref()
                .ok_or_else(|| AgentError::MerkleProofInvalid {
                    transaction_hash: transaction_hash.to_string(),
                    block_height: block.block_height,
                })?;
        verify_merkle_proof(
            transaction_hash,
            &proof.merkle,
            proof.pos,
            merkle_root,
            block.block_height,
        )
    }

    pub async fn get_block_header(&self, height: i32) -> Result<PlainBlockHeader, AgentError> {
        let result = self
            .rpc
            .request("blockchain.block.header", vec![json!(height)])
            .await?;
        let raw = result
            .as_str()
            .ok_or_else(|| AgentError::Protocol("block.header: not a string".to_string()))?;
        let bytes = hex::from_hex(raw)
            .map_err(|err| AgentError::Protocol(format!("block.header: {err}")))?;
        let header = BlockHeader::consensus_decode(&bytes)
            .map_err(|err| AgentError::Protocol(format!("block.header: {err}")))?;
        Ok(PlainBlockHeader::from_header(&header, height))
    }

    /// Broadcasts a raw transaction. Electrum 1.0 servers answer a
    /// rejection with the error message in the result slot, so any
    /// response that is not the expected txid is a rejection.
    pub async fn broadcast_transaction(&self, raw: &str) -> Result<String, AgentError> {
        let bytes = hex::from_hex(raw)
            .map_err(|err| AgentError::Protocol(format!("raw transaction: {err}")))?;
        let tx = Transaction::consensus_decode(&bytes)
            .map_err(|err| AgentError::Protocol(format!("raw transaction: {err}")))?;
        let expected = hex::to_hex_reversed(&tx.txid());

        let result = self
            .rpc
            .request("blockchain.transaction.broadcast", vec![json!(raw)])
            .await?;
        let returned = result.as_str().unwrap_or_default();
        if returned != expected {
            return Err(AgentError::BroadcastRejected(returned.to_string()));
        }
        Ok(expected)
    }

    /// `[fee_rate sat/vB, vsize]` buckets of the server mempool.
    pub async fn get_fee_histogram(&self) -> Result<Vec<(f64, u64)>, AgentError> {
        let result = self.rpc.request("mempool.get_fee_histogram", vec![]).await?;
        serde_json::from_value(result)
            .map_err(|err| AgentError::Protocol(format!("fee histogram: {err}")))
    }

    /// Estimated fee in coin-per-kilobyte for confirmation within
    /// `target` blocks; -1 when the server has no estimate.
    pub async fn estimate_fee(&self, target: u32) -> Result<f64, AgentError> {
        let result = self
            .rpc
            .request("blockchain.estimatefee", vec![json!(target)])
            .await?;
        result
            .as_f64()
            .ok_or_else(|| AgentError::Protocol("estimatefee: not a number".to_string()))
    }

    /// Per-target estimates; a failing slot degrades to -1 instead of
    /// failing the batch.
    pub async fn estimate_fees(&self, targets: &[u32]) -> Vec<f64> {
        let mut estimates = Vec::with_capacity(targets.len());
        for target in targets {
            match self.estimate_fee(*target).await {
                Ok(estimate) => estimates.push(estimate),
                Err(err) => {
                    log_debug!("estimatefee({target}) failed: {err}");
                    estimates.push(-1.0);
                }
            }
        }
        estimates
    }

    pub async fn get_relay_fee(&self) -> Result<f64, AgentError> {
        let result = self.rpc.request("blockchain.relayfee", vec![]).await?;
        result
            .as_f64()
            .ok_or_else(|| AgentError::Protocol("relayfee: not a number".to_string()))
    }

    pub async fn get_peers(&self) -> Result<Vec<Peer>, AgentError> {
        let result = self.rpc.request("server.peers.subscribe", vec![]).await?;
        Ok(parse_peers(&result, &self.params))
    }

    /// Header subscription: the parsed tip plus the raw notification
    /// stream (parse follow-ups with
    /// [`ElectrumApi::header_from_notification`]).
    pub async fn subscribe_headers(
        &self,
    ) -> Result<(PlainBlockHeader, mpsc::UnboundedReceiver<Value>), AgentError> {
        let (initial, stream) = self
            .rpc
            .subscribe("blockchain.headers.subscribe", vec![])
            .await?;
        let header = self.header_from_value(&initial)?;
        Ok((header, stream))
    }

    pub fn header_from_notification(&self, params: &Value) -> Result<PlainBlockHeader, AgentError> {
        let object = params
            .as_array()
            .and_then(|array| array.first())
            .unwrap_or(params);
        self.header_from_value(object)
    }

    fn header_from_value(&self, value: &Value) -> Result<PlainBlockHeader, AgentError> {
        let raw = value
            .get("hex")
            .and_then(Value::as_str)
            .ok_or_else(|| AgentError::Protocol("header without hex".to_string()))?;
        let height = value
            .get("height")
            .and_then(Value::as_i64)
            .ok_or_else(|| AgentError::Protocol("header without height".to_string()))?;
        let bytes = hex::from_hex(raw)
            .map_err(|err| AgentError::Protocol(format!("header hex: {err}")))?;
        let header = BlockHeader::consensus_decode(&bytes)
            .map_err(|err| AgentError::Protocol(format!("header: {err}")))?;
        Ok(PlainBlockHeader::from_header(&header, height as i32))
    }

    /// Scripthash subscription for an address. Returns the baseline
    /// receipts snapshot and the raw status-notification stream; each
    /// status change means the history must be re-fetched.
    pub async fn subscribe_receipts(
        &self,
        address: &str,
    ) -> Result<(Vec<Receipt>, mpsc::UnboundedReceiver<Value>, String), AgentError> {
        let script_hash = address_to_script_hash(address, self.params.network)?;
        let (_status, stream) = self
            .rpc
            .subscribe("blockchain.scripthash.subscribe", vec![json!(script_hash)])
            .await?;
        let receipts = self.get_receipts(&script_hash).await?;
        Ok((receipts, stream, script_hash))
    }

    /// Structural decode plus address recovery for inputs and outputs.
    /// A coinbase input pays from nothing; its scriptSig is arbitrary
    /// data and must never be classified as a spend shape.
    pub fn plain_transaction(&self, tx: &Transaction) -> PlainTransaction {
        let network = self.params.network;
        let mut plain = PlainTransaction::from_transaction(tx);
        if !tx.is_coinbase() {
            for (plain_input, input) in plain.inputs.iter_mut().zip(&tx.vin) {
                plain_input.address = input_address(&input.script_sig, &input.witness, network);
            }
        }
        for (plain_output, output) in plain.outputs.iter_mut().zip(&tx.vout) {
            plain_output.address = script_pubkey_to_address(&output.script_pubkey, network);
        }
        plain
    }
}
