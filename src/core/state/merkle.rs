// Copyright (c) 2026 Amunchain
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Deterministic Merkle trees.
//!
//! pair leaf = H( "Amunchain-Hybrid-Leaf-v1" || H(key) || H(value) )
//! tx leaf   = H( "Amunchain-Hybrid-Tx-v1" || full_hash )
//! node      = H( "Amunchain-Hybrid-Node-v1" || left || right )
//!
//! An odd node at the end of a level is paired with itself. The empty tree has the zero root.

use crate::core::security::crypto::{sha256, sha256_concat};
use crate::core::types::{FullId, H256};

/// Hash32 type.
pub type Hash32 = [u8; 32];

const LEAF_DOMAIN: &[u8] = b"Amunchain-Hybrid-Leaf-v1";
const TX_DOMAIN: &[u8] = b"Amunchain-Hybrid-Tx-v1";
const NODE_DOMAIN: &[u8] = b"Amunchain-Hybrid-Node-v1";

/// Side of sibling in proof.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Side {
    /// Sibling is left.
    Left,
    /// Sibling is right.
    Right,
}

/// One proof item.
#[derive(Clone, Debug)]
pub struct ProofItem {
    /// Whether sibling is left or right of current hash.
    pub side: Side,
    /// Sibling hash.
    pub sibling: Hash32,
}

/// Merkle inclusion proof.
#[derive(Clone, Debug)]
pub struct MerkleProof {
    /// Leaf hash.
    pub leaf: Hash32,
    /// Path items from leaf to root.
    pub path: Vec<ProofItem>,
}

fn hash_leaf(key: &[u8], value: &[u8]) -> Hash32 {
    sha256_concat(&[LEAF_DOMAIN, &sha256(key), &sha256(value)])
}

fn hash_node(left: Hash32, right: Hash32) -> Hash32 {
    sha256_concat(&[NODE_DOMAIN, &left, &right])
}

fn next_level(level: &[Hash32]) -> Vec<Hash32> {
    level
        .chunks(2)
        .map(|pair| match pair {
            [l, r] => hash_node(*l, *r),
            [l] => hash_node(*l, *l),
            _ => [0u8; 32],
        })
        .collect()
}

fn root_of(mut level: Vec<Hash32>) -> Hash32 {
    if level.is_empty() {
        return [0u8; 32];
    }
    while level.len() > 1 {
        level = next_level(&level);
    }
    level[0]
}

fn proof_of(mut level: Vec<Hash32>, index: usize) -> Option<MerkleProof> {
    if index >= level.len() {
        return None;
    }
    let mut idx = index;
    let leaf = level[idx];
    let mut path = Vec::new();

    while level.len() > 1 {
        let is_right = idx % 2 == 1;
        let sib_idx = if is_right { idx - 1 } else { idx + 1 };
        let sibling = level.get(sib_idx).copied().unwrap_or(level[idx]);
        path.push(ProofItem {
            side: if is_right { Side::Left } else { Side::Right },
            sibling,
        });
        level = next_level(&level);
        idx /= 2;
    }

    Some(MerkleProof { leaf, path })
}

/// Build Merkle root from sorted (key,value) pairs.
/// If empty, returns ZERO hash.
pub fn merkle_root_sorted(pairs: &[(Vec<u8>, Vec<u8>)]) -> Hash32 {
    root_of(pairs.iter().map(|(k, v)| hash_leaf(k, v)).collect())
}

/// Generate inclusion proof for a pair at `index` (pairs must be sorted).
pub fn merkle_proof_sorted(pairs: &[(Vec<u8>, Vec<u8>)], index: usize) -> Option<MerkleProof> {
    proof_of(pairs.iter().map(|(k, v)| hash_leaf(k, v)).collect(), index)
}

/// Verify proof against root.
pub fn verify_proof(root: Hash32, proof: &MerkleProof) -> bool {
    let mut cur = proof.leaf;
    for item in proof.path.iter() {
        cur = match item.side {
            Side::Left => hash_node(item.sibling, cur),
            Side::Right => hash_node(cur, item.sibling),
        };
    }
    cur == root
}

/// Root over transaction full hashes in block order.
pub fn transactions_root(full_hashes: &[H256]) -> H256 {
    let leaves = full_hashes
        .iter()
        .map(|h| sha256_concat(&[TX_DOMAIN, h.as_bytes()]))
        .collect();
    H256::from_bytes(root_of(leaves))
}

/// Leaf pair of the forger-eligibility tree.
pub fn forger_entry(account: FullId, effective_balance: i64) -> (Vec<u8>, Vec<u8>) {
    (
        account.key_bytes().to_vec(),
        effective_balance.to_be_bytes().to_vec(),
    )
}

/// Root over eligible forgers; `entries` are sorted by account before hashing.
pub fn forgers_root(entries: &[(FullId, i64)]) -> H256 {
    let mut pairs: Vec<(Vec<u8>, Vec<u8>)> =
        entries.iter().map(|(id, b)| forger_entry(*id, *b)).collect();
    pairs.sort();
    H256::from_bytes(merkle_root_sorted(&pairs))
}

/// Inclusion proof that `account` with `effective_balance` is in the forger tree.
pub fn forger_proof(entries: &[(FullId, i64)], account: FullId) -> Option<MerkleProof> {
    let mut pairs: Vec<(Vec<u8>, Vec<u8>)> =
        entries.iter().map(|(id, b)| forger_entry(*id, *b)).collect();
    pairs.sort();
    let key = account.key_bytes();
    let index = pairs.iter().position(|(k, _)| k.as_slice() == key)?;
    merkle_proof_sorted(&pairs, index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_roots_are_zero() {
        assert_eq!(transactions_root(&[]), H256::ZERO);
        assert_eq!(forgers_root(&[]), H256::ZERO);
    }

    #[test]
    fn transaction_order_matters() {
        let a = H256::from_bytes([1; 32]);
        let b = H256::from_bytes([2; 32]);
        assert_ne!(transactions_root(&[a, b]), transactions_root(&[b, a]));
    }

    #[test]
    fn forger_root_ignores_input_order_and_proves() {
        let x = (FullId::new(1, 1), 5_000i64);
        let y = (FullId::new(2, 9), 7_000i64);
        let z = (FullId::new(3, 0), 9_000i64);
        let root = forgers_root(&[x, y, z]);
        assert_eq!(root, forgers_root(&[z, x, y]));
        let proof = forger_proof(&[z, x, y], y.0).unwrap();
        assert!(verify_proof(*root.as_bytes(), &proof));
        assert!(forger_proof(&[x], y.0).is_none());
    }
}
