//! Merkle path verification for transaction inclusion proofs.

use electrum_primitives::hash::sha256d;
use electrum_primitives::hex;

use crate::error::AgentError;

/// Folds a `blockchain.transaction.get_merkle` path into the root it
/// implies: walk the siblings leaf-to-root, hashing left or right by
/// the parity of the position at each level.
pub fn merkle_root_from_path(
    transaction_hash: &str,
    merkle: &[String],
    position: u64,
) -> Result<String, AgentError> {
    let mut node = hex::from_hex_reversed(transaction_hash)
        .map_err(|err| AgentError::Protocol(format!("invalid tx hash in proof: {err}")))?;
    if node.len() != 32 {
        return Err(AgentError::Protocol(
            "invalid tx hash length in proof".to_string(),
        ));
    }

    let mut index = position;
    for sibling in merkle {
        let pair = hex::from_hex_reversed(sibling)
            .map_err(|err| AgentError::Protocol(format!("invalid proof node: {err}")))?;
        if pair.len() != 32 {
            return Err(AgentError::Protocol(
                "invalid proof node length".to_string(),
            ));
        }

        let mut preimage = Vec::with_capacity(64);
        if index % 2 == 0 {
            preimage.extend_from_slice(&node);
            preimage.extend_from_slice(&pair);
        } else {
            preimage.extend_from_slice(&pair);
            preimage.extend_from_slice(&node);
        }
        node = sha256d(&preimage).to_vec();
        index >>= 1;
    }

    Ok(hex::to_hex_reversed(&node))
}

/// Checks a server proof against the stored header's Merkle root.
pub fn verify_merkle_proof(
    transaction_hash: &str,
    merkle: &[String],
    position: u64,
    merkle_root: &str,
    block_height: i32,
) -> Result<(), AgentError> {
    let computed = merkle_root_from_path(transaction_hash, merkle, position)?;
    if computed != merkle_root {
        return Err(AgentError::MerkleProofInvalid {
            transaction_hash: transaction_hash.to_string(),
            block_height,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // Block 170: coinbase plus the first coin transfer.
    const TXID: &str = "f4184fc596403b9d638783cf57adfe4c75c605f6356fbc91338530e9831e9e16";
    const SIBLING: &str = "b1fea52486ce0c62bb442b530a3f0132b826c74e473d1f2c220bfa78111c5082";
    const ROOT: &str = "7dac2c5666815c17a3b36427de37bb9d2e2c5ccec3f8633eb91a4205cb4c10ff";

    #[test]
    fn block_170_proof() {
        let computed =
            merkle_root_from_path(TXID, &[SIBLING.to_string()], 1).expect("compute root");
        assert_eq!(computed, ROOT);
        verify_merkle_proof(TXID, &[SIBLING.to_string()], 1, ROOT, 170).expect("valid proof");

        // The coinbase sits at position 0 and pairs to the same root.
        let computed =
            merkle_root_from_path(SIBLING, &[TXID.to_string()], 0).expect("compute root");
        assert_eq!(computed, ROOT);
    }

    #[test]
    fn corrupted_pair_fails() {
        let mut corrupted = SIBLING.to_string();
        corrupted.replace_range(0..2, "00");
        let err = verify_merkle_proof(TXID, &[corrupted], 1, ROOT, 170).expect_err("bad proof");
        assert_eq!(
            err,
            AgentError::MerkleProofInvalid {
                transaction_hash: TXID.to_string(),
                block_height: 170,
            }
        );
    }

    #[test]
    fn malformed_proof_nodes_are_protocol_errors() {
        let err = merkle_root_from_path(TXID, &["zz".to_string()], 1).expect_err("bad hex");
        assert!(matches!(err, AgentError::Protocol(_)));
        let err =
            merkle_root_from_path("abcd", &[SIBLING.to_string()], 1).expect_err("short hash");
        assert!(matches!(err, AgentError::Protocol(_)));
    }

    #[test]
    fn empty_path_is_the_leaf_itself() {
        // A single-transaction block proves inclusion with no siblings.
        let computed = merkle_root_from_path(TXID, &[], 0).expect("compute root");
        assert_eq!(computed, TXID);
    }
}
