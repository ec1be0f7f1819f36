//! Script classification, address encoding, and scripthash derivation.

pub mod address;
pub mod classify;
pub mod standard;

pub use address::{
    address_to_script_hash, address_to_script_pubkey, script_hash_hex, script_pubkey_to_address,
    AddressError,
};
pub use classify::{classify_input, input_address, InputKind};
pub use standard::{classify_script_pubkey, decompile, ScriptChunk, ScriptType};
