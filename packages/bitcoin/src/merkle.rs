use bitcoin::hashes::{sha256d, Hash};

use crate::error::Error;
use crate::{Result, TxMerkleNode, Txid};

const HASH_LEN: usize = 32;

/// MAX_PROOF_DEPTH bounds a proof to the depth of a tree over `u32::MAX` transactions
pub const MAX_PROOF_DEPTH: usize = 32;

/// split_proof splits a flattened Merkle proof into its 32-byte sibling hashes
pub fn split_proof(proof: &[u8]) -> Result<Vec<&[u8]>> {
    if proof.len() % HASH_LEN != 0 {
        return Err(Error::MalformedMerkleProof(proof.len()));
    }
    Ok(proof.chunks(HASH_LEN).collect())
}

/// verify_merkle_proof checks that `txid` sits at `tx_index` of a block whose
/// transactions commit to `root`
pub fn verify_merkle_proof(
    txid: &Txid,
    proof: &[&[u8]],
    tx_index: usize,
    root: &TxMerkleNode,
) -> bool {
    if proof.len() > MAX_PROOF_DEPTH {
        return false;
    }
    let mut current_hash = txid.to_raw_hash();

    for (i, next_hash) in proof.iter().enumerate() {
        let mut concat = Vec::with_capacity(2 * HASH_LEN);
        // extracts the i-th bit of tx idx
        if (tx_index.checked_shr(i as u32).unwrap_or(0) & 1) == 1 {
            // current hash is the right child
            concat.extend_from_slice(next_hash);
            concat.extend_from_slice(&current_hash[..]);
        } else {
            // current hash is the left child
            concat.extend_from_slice(&current_hash[..]);
            concat.extend_from_slice(next_hash);
        }

        current_hash = sha256d::Hash::hash(&concat);
    }

    // the proof must not leave unused index bits
    if tx_index.checked_shr(proof.len() as u32).unwrap_or(0) != 0 {
        return false;
    }

    current_hash == root.to_raw_hash()
}

/// merkle_proof builds the flattened sibling path for the tx at `tx_index`,
/// duplicating the last hash of odd-sized levels as Bitcoin does
pub fn merkle_proof(txids: &[Txid], tx_index: usize) -> Result<(TxMerkleNode, Vec<u8>)> {
    if tx_index >= txids.len() {
        return Err(Error::MerkleIndexOutOfRange(tx_index));
    }
    let mut level: Vec<sha256d::Hash> = txids.iter().map(|t| t.to_raw_hash()).collect();
    let mut idx = tx_index;
    let mut proof = vec![];
    while level.len() > 1 {
        if level.len() % 2 == 1 {
            if let Some(last) = level.last().copied() {
                level.push(last);
            }
        }
        let sibling = idx ^ 1;
        proof.extend_from_slice(&level[sibling][..]);
        level = level
            .chunks(2)
            .map(|pair| {
                let mut concat = Vec::with_capacity(2 * HASH_LEN);
                concat.extend_from_slice(&pair[0][..]);
                concat.extend_from_slice(&pair[1][..]);
                sha256d::Hash::hash(&concat)
            })
            .collect();
        idx >>= 1;
    }
    Ok((TxMerkleNode::from_raw_hash(level[0]), proof))
}
