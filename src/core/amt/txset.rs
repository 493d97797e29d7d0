// Copyright (c) 2026 Eonhub
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

//! Plain Merkle tree over an account's per-eon transaction set.
//!
//! Commits the hashes admitted into an `Update.tx_root`; its membership
//! proofs are the inclusion evidence for transfer-delivery challenges.
//! Odd levels duplicate the trailing node.

use serde::{Deserialize, Serialize};

use crate::core::crypto::service::hash;
use crate::core::types::H256;

const LEAF_DOMAIN: &[u8] = b"Eonhub-Txset-Leaf-v1";
const NODE_DOMAIN: &[u8] = b"Eonhub-Txset-Node-v1";

/// Side of the sibling in a proof step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxSide {
    /// Sibling is left.
    Left,
    /// Sibling is right.
    Right,
}

/// One proof step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxPathItem {
    /// Sibling side.
    pub side: TxSide,
    /// Sibling hash.
    pub sibling: H256,
}

/// Inclusion proof for one transaction hash.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxSetProof {
    /// The proven transaction hash.
    pub tx_hash: H256,
    /// Path items from leaf to root.
    pub path: Vec<TxPathItem>,
}

fn tx_leaf(tx_hash: &H256) -> H256 {
    let mut buf = Vec::with_capacity(LEAF_DOMAIN.len() + 32);
    buf.extend_from_slice(LEAF_DOMAIN);
    buf.extend_from_slice(tx_hash.as_bytes());
    hash(&buf)
}

fn tx_node(left: &H256, right: &H256) -> H256 {
    let mut buf = Vec::with_capacity(NODE_DOMAIN.len() + 64);
    buf.extend_from_slice(NODE_DOMAIN);
    buf.extend_from_slice(left.as_bytes());
    buf.extend_from_slice(right.as_bytes());
    hash(&buf)
}

fn next_level(level: &[H256]) -> Vec<H256> {
    let mut next = Vec::with_capacity((level.len() + 1) / 2);
    let mut i = 0usize;
    while i < level.len() {
        let left = level[i];
        let right = if i + 1 < level.len() {
            level[i + 1]
        } else {
            level[i]
        };
        next.push(tx_node(&left, &right));
        i += 2;
    }
    next
}

/// Root over a transaction hash sequence. Empty set commits to ZERO.
pub fn tx_set_root(tx_hashes: &[H256]) -> H256 {
    if tx_hashes.is_empty() {
        return H256::ZERO;
    }
    let mut level: Vec<H256> = tx_hashes.iter().map(tx_leaf).collect();
    while level.len() > 1 {
        level = next_level(&level);
    }
    level[0]
}

/// Inclusion proof for the hash at `index`.
pub fn tx_membership_proof(tx_hashes: &[H256], index: usize) -> Option<TxSetProof> {
    if index >= tx_hashes.len() {
        return None;
    }

    let mut level: Vec<H256> = tx_hashes.iter().map(tx_leaf).collect();
    let mut idx = index;
    let mut path = Vec::new();

    while level.len() > 1 {
        let is_right = idx % 2 == 1;
        let sib_idx = if is_right { idx - 1 } else { idx + 1 };
        let sibling = if sib_idx < level.len() {
            level[sib_idx]
        } else {
            level[idx]
        };
        path.push(TxPathItem {
            side: if is_right { TxSide::Left } else { TxSide::Right },
            sibling,
        });
        level = next_level(&level);
        idx /= 2;
    }

    Some(TxSetProof {
        tx_hash: tx_hashes[index],
        path,
    })
}

/// Verify an inclusion proof against a tx-set root.
pub fn verify_tx_proof(root: &H256, proof: &TxSetProof) -> bool {
    let mut cur = tx_leaf(&proof.tx_hash);
    for item in proof.path.iter() {
        cur = match item.side {
            TxSide::Left => tx_node(&item.sibling, &cur),
            TxSide::Right => tx_node(&cur, &item.sibling),
        };
    }
    cur == *root
}
