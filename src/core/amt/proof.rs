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

//! Augmented Merkle proofs with dual hash/allotment verification.
//!
//! leaf  = H( "Eonhub-Amt-Leaf-v1"  || address || allotment_be )
//! node  = H( "Eonhub-Amt-Node-v1"  || l.hash || r.hash || l.allot_be || r.allot_be )
//! empty = H( "Eonhub-Amt-Empty-v1" )
//!
//! Verification recomputes both the hash chain and the running allotment sum
//! from leaf to root and accepts only if both match the claimed root exactly.
//! Sibling ordering is fixed by tree position, never by value, so proofs are
//! canonical and reproducible.

use serde::{Deserialize, Serialize};

use crate::core::crypto::service::hash;
use crate::core::types::{Address, Amount, H256};

const LEAF_DOMAIN: &[u8] = b"Eonhub-Amt-Leaf-v1";
const NODE_DOMAIN: &[u8] = b"Eonhub-Amt-Node-v1";
const EMPTY_DOMAIN: &[u8] = b"Eonhub-Amt-Empty-v1";

/// Side of the sibling relative to the current node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    /// Sibling is the left child.
    Left,
    /// Sibling is the right child.
    Right,
}

/// One sibling step on the path from a leaf to the root.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmtPathItem {
    /// Whether the sibling is left or right of the running node.
    pub side: Side,
    /// Sibling subtree hash.
    pub sibling_hash: H256,
    /// Sibling subtree allotment.
    pub sibling_allotment: Amount,
}

/// The claimed leaf a proof opens.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmtLeaf {
    /// Account address.
    pub address: Address,
    /// Committed allotment.
    pub allotment: Amount,
}

/// Membership proof for one leaf against a published root.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmtProof {
    /// Eon the proven tree was committed for.
    pub eon: u64,
    /// The opened leaf.
    pub leaf: AmtLeaf,
    /// Sibling items from leaf level to the root.
    pub path: Vec<AmtPathItem>,
}

/// Root summary a proof is checked against.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmtRoot {
    /// Root hash.
    pub hash: H256,
    /// Aggregate allotment over all leaves (solvency sum).
    pub allotment: Amount,
}

/// Hash of a populated leaf.
pub fn leaf_hash(address: &Address, allotment: Amount) -> H256 {
    let mut buf = Vec::with_capacity(LEAF_DOMAIN.len() + 20 + 16);
    buf.extend_from_slice(LEAF_DOMAIN);
    buf.extend_from_slice(address.as_bytes());
    buf.extend_from_slice(&allotment.to_be_bytes());
    hash(&buf)
}

/// Well-known padding leaf hash; padding never distorts the solvency sum.
pub fn empty_leaf_hash() -> H256 {
    hash(EMPTY_DOMAIN)
}

/// Hash of an internal node over both children's hash and allotment.
pub fn node_hash(left: &H256, right: &H256, left_allotment: Amount, right_allotment: Amount) -> H256 {
    let mut buf = Vec::with_capacity(NODE_DOMAIN.len() + 32 + 32 + 16 + 16);
    buf.extend_from_slice(NODE_DOMAIN);
    buf.extend_from_slice(left.as_bytes());
    buf.extend_from_slice(right.as_bytes());
    buf.extend_from_slice(&left_allotment.to_be_bytes());
    buf.extend_from_slice(&right_allotment.to_be_bytes());
    hash(&buf)
}

/// Verify a membership proof against a claimed root.
///
/// Both the recomputed hash and the recomputed allotment sum must match the
/// root exactly; either mismatch is evidence of a wrong-allotment or
/// non-membership claim.
pub fn verify_proof(root: &AmtRoot, proof: &AmtProof) -> bool {
    let mut cur_hash = leaf_hash(&proof.leaf.address, proof.leaf.allotment);
    let mut cur_allotment = proof.leaf.allotment;

    for item in proof.path.iter() {
        let Some(next) = cur_allotment.checked_add(item.sibling_allotment) else {
            return false;
        };
        cur_hash = match item.side {
            Side::Left => node_hash(
                &item.sibling_hash,
                &cur_hash,
                item.sibling_allotment,
                cur_allotment,
            ),
            Side::Right => node_hash(
                &cur_hash,
                &item.sibling_hash,
                cur_allotment,
                item.sibling_allotment,
            ),
        };
        cur_allotment = next;
    }

    cur_hash == root.hash && cur_allotment == root.allotment
}
