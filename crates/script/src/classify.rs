//! Input-shape classification and paying-address recovery.
//!
//! The spending side of an output does not name an address directly; the
//! shape of `(script_sig chunks, witness items)` determines the template
//! that was spent and lets us rebuild the source address.

use electrum_consensus::Network;
use electrum_primitives::hash::{hash160, sha256};

use crate::address::{p2pkh_address, p2sh_address, segwit_address};
use crate::standard::{decompile, p2wpkh_script, p2wsh_script, parse_multisig, ScriptChunk};

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum InputKind {
    P2Pkh,
    P2ShP2Wpkh,
    P2Wpkh,
    P2ShMultisig { required: usize, total: usize },
    P2ShP2WshMultisig { required: usize, total: usize },
    P2WshMultisig { required: usize, total: usize },
}

/// Classifies an input by its shape. Unmatched shapes are `None`: a
/// non-standard spend, not an error.
pub fn classify_input(script_sig: &[u8], witness: &[Vec<u8>]) -> Option<InputKind> {
    let chunks = decompile(script_sig)?;
    match (chunks.len(), witness.len()) {
        (2, 0) => {
            chunks[1].push_data()?;
            Some(InputKind::P2Pkh)
        }
        (1, 2) => {
            chunks[0].push_data()?;
            Some(InputKind::P2ShP2Wpkh)
        }
        (0, 2) => Some(InputKind::P2Wpkh),
        (script_chunks, 0) if script_chunks > 2 => {
            let redeem = chunks.last()?.push_data()?;
            let multisig = parse_multisig(&decompile(redeem)?)?;
            Some(InputKind::P2ShMultisig {
                required: script_chunks - 2,
                total: multisig.pubkeys.len(),
            })
        }
        (1, witness_items) if witness_items > 2 => {
            chunks[0].push_data()?;
            let multisig = parse_multisig(&decompile(witness.last()?)?)?;
            Some(InputKind::P2ShP2WshMultisig {
                required: witness_items - 2,
                total: multisig.pubkeys.len(),
            })
        }
        (0, witness_items) if witness_items > 2 => {
            let multisig = parse_multisig(&decompile(witness.last()?)?)?;
            Some(InputKind::P2WshMultisig {
                required: witness_items - 2,
                total: multisig.pubkeys.len(),
            })
        }
        _ => None,
    }
}

/// Recovers the address an input is paying from, when the shape allows it.
pub fn input_address(script_sig: &[u8], witness: &[Vec<u8>], network: Network) -> Option<String> {
    let kind = classify_input(script_sig, witness)?;
    match kind {
        InputKind::P2Pkh => {
            let chunks = decompile(script_sig)?;
            let pubkey = chunks[1].push_data()?;
            Some(p2pkh_address(&hash160(pubkey), network))
        }
        InputKind::P2ShP2Wpkh => {
            let pubkey = witness.get(1)?;
            let redeem = p2wpkh_script(&hash160(pubkey));
            Some(p2sh_address(&hash160(&redeem), network))
        }
        InputKind::P2Wpkh => {
            let pubkey = witness.get(1)?;
            Some(segwit_address(&hash160(pubkey), network))
        }
        InputKind::P2ShMultisig { .. } => {
            let chunks = decompile(script_sig)?;
            let redeem = chunks.last()?.push_data()?;
            Some(p2sh_address(&hash160(redeem), network))
        }
        InputKind::P2ShP2WshMultisig { .. } => {
            let witness_script = witness.last()?;
            let redeem = p2wsh_script(&sha256(witness_script));
            Some(p2sh_address(&hash160(&redeem), network))
        }
        InputKind::P2WshMultisig { .. } => {
            let witness_script = witness.last()?;
            Some(segwit_address(&sha256(witness_script), network))
        }
    }
}
