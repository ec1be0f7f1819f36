//! Transaction types and serialization.

use electrum_consensus::Hash256;

use crate::encoding::{Decodable, DecodeError, Decoder, Encodable, Encoder};
use crate::hash::sha256d;
use crate::outpoint::OutPoint;

const SEGWIT_MARKER: u8 = 0x00;
const SEGWIT_FLAG: u8 = 0x01;

/// Inputs with a sequence below this opt into replacement (BIP 125).
pub const RBF_SEQUENCE_LIMIT: u32 = 0xffff_fffe;

#[derive(Clone, Debug, PartialEq)]
pub struct TxIn {
    pub prevout: OutPoint,
    pub script_sig: Vec<u8>,
    pub sequence: u32,
    pub witness: Vec<Vec<u8>>,
}

impl Encodable for TxIn {
    fn consensus_encode(&self, encoder: &mut Encoder) {
        self.prevout.consensus_encode(encoder);
        encoder.write_var_bytes(&self.script_sig);
        encoder.write_u32_le(self.sequence);
    }
}

impl Decodable for TxIn {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let prevout = OutPoint::consensus_decode(decoder)?;
        let script_sig = decoder.read_var_bytes()?;
        let sequence = decoder.read_u32_le()?;
        Ok(Self {
            prevout,
            script_sig,
            sequence,
            witness: Vec::new(),
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TxOut {
    pub value: i64,
    pub script_pubkey: Vec<u8>,
}

impl Encodable for TxOut {
    fn consensus_encode(&self, encoder: &mut Encoder) {
        encoder.write_i64_le(self.value);
        encoder.write_var_bytes(&self.script_pubkey);
    }
}

impl Decodable for TxOut {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let value = decoder.read_i64_le()?;
        let script_pubkey = decoder.read_var_bytes()?;
        Ok(Self {
            value,
            script_pubkey,
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Transaction {
    pub version: i32,
    pub vin: Vec<TxIn>,
    pub vout: Vec<TxOut>,
    pub lock_time: u32,
}

impl Transaction {
    pub fn has_witness(&self) -> bool {
        self.vin.iter().any(|input| !input.witness.is_empty())
    }

    /// Full wire serialization (BIP 144 marker/flag form when any input
    /// carries a witness).
    pub fn consensus_encode(&self) -> Vec<u8> {
        self.encode_with_mode(true)
    }

    /// Witness-stripped serialization, the txid preimage.
    pub fn consensus_encode_for_hash(&self) -> Vec<u8> {
        self.encode_with_mode(false)
    }

    pub fn txid(&self) -> Hash256 {
        sha256d(&self.consensus_encode_for_hash())
    }

    /// BIP 141 weight: three times the stripped size plus the full size.
    pub fn weight(&self) -> u64 {
        let base = self.consensus_encode_for_hash().len() as u64;
        let total = if self.has_witness() {
            self.consensus_encode().len() as u64
        } else {
            base
        };
        base * 3 + total
    }

    pub fn vsize(&self) -> u64 {
        self.weight().div_ceil(4)
    }

    pub fn is_coinbase(&self) -> bool {
        self.vin.len() == 1 && self.vin[0].prevout.is_null()
    }

    pub fn signals_rbf(&self) -> bool {
        self.vin
            .iter()
            .any(|input| input.sequence < RBF_SEQUENCE_LIMIT)
    }

    fn encode_with_mode(&self, include_witness: bool) -> Vec<u8> {
        let mut encoder = Encoder::new();
        encoder.write_i32_le(self.version);

        let serialize_witness = include_witness && self.has_witness();
        if serialize_witness {
            encoder.write_u8(SEGWIT_MARKER);
            encoder.write_u8(SEGWIT_FLAG);
        }

        encoder.write_varint(self.vin.len() as u64);
        for input in &self.vin {
            input.consensus_encode(&mut encoder);
        }
        encoder.write_varint(self.vout.len() as u64);
        for output in &self.vout {
            output.consensus_encode(&mut encoder);
        }

        if serialize_witness {
            for input in &self.vin {
                encoder.write_varint(input.witness.len() as u64);
                for item in &input.witness {
                    encoder.write_var_bytes(item);
                }
            }
        }

        encoder.write_u32_le(self.lock_time);
        encoder.into_inner()
    }

    pub fn consensus_decode(bytes: &[u8]) -> Result<Self, TransactionDecodeError> {
        let mut decoder = Decoder::new(bytes);
        let tx = Self::decode_from(&mut decoder)?;
        if !decoder.is_empty() {
            return Err(TransactionDecodeError::Decode(DecodeError::TrailingBytes));
        }
        Ok(tx)
    }

    pub(crate) fn decode_from(decoder: &mut Decoder) -> Result<Self, TransactionDecodeError> {
        let version = decoder.read_i32_le()?;

        // A leading zero byte cannot start a legacy input count, so it is
        // the BIP 144 marker.
        let is_segwit = decoder.peek_u8()? == SEGWIT_MARKER;
        if is_segwit {
            decoder.read_u8()?;
            let flag = decoder.read_u8()?;
            if flag != SEGWIT_FLAG {
                return Err(TransactionDecodeError::InvalidTransactionFormat(
                    "unknown segwit flag",
                ));
            }
        }

        let mut vin: Vec<TxIn> = read_vec(decoder)?;
        if is_segwit && vin.is_empty() {
            return Err(TransactionDecodeError::InvalidTransactionFormat(
                "segwit transaction without inputs",
            ));
        }
        let vout = read_vec(decoder)?;

        if is_segwit {
            for input in &mut vin {
                let count = decoder.read_varint()?;
                let count = usize::try_from(count).map_err(|_| DecodeError::SizeTooLarge)?;
                let mut witness = Vec::with_capacity(count);
                for _ in 0..count {
                    witness.push(decoder.read_var_bytes()?);
                }
                input.witness = witness;
            }
        }

        let lock_time = decoder.read_u32_le()?;

        Ok(Self {
            version,
            vin,
            vout,
            lock_time,
        })
    }
}

fn read_vec<T: Decodable>(decoder: &mut Decoder) -> Result<Vec<T>, DecodeError> {
    let count = decoder.read_varint()?;
    let count = usize::try_from(count).map_err(|_| DecodeError::SizeTooLarge)?;
    let mut values = Vec::with_capacity(count);
    for _ in 0..count {
        values.push(T::consensus_decode(decoder)?);
    }
    Ok(values)
}

#[derive(Debug)]
pub enum TransactionDecodeError {
    Decode(DecodeError),
    InvalidTransactionFormat(&'static str),
}

impl From<DecodeError> for TransactionDecodeError {
    fn from(error: DecodeError) -> Self {
        TransactionDecodeError::Decode(error)
    }
}

impl std::fmt::Display for TransactionDecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionDecodeError::Decode(error) => write!(f, "{error}"),
            TransactionDecodeError::InvalidTransactionFormat(message) => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for TransactionDecodeError {}
