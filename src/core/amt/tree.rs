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

//! Augmented Merkle tree over per-eon account allotments.
//!
//! Leaves are ordered by insertion sequence and the leaf level is padded to
//! the next power of two with well-known empty leaves (zero allotment).
//! Nodes live in a flat arena addressed by index; every eon gets a fresh
//! arena, so a node reachable from a published root is never mutated.

use std::collections::BTreeMap;
use thiserror::Error;

use crate::core::amt::proof::{
    empty_leaf_hash, leaf_hash, node_hash, AmtLeaf, AmtPathItem, AmtProof, AmtRoot, Side,
};
use crate::core::types::{Address, Amount, H256};

/// Tree errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AmtError {
    /// No leaf for the requested address.
    #[error("address not present in tree")]
    UnknownAddress,
    /// `compute_root` has not been called since the last mutation.
    #[error("root not computed yet")]
    NotBuilt,
}

#[derive(Clone, Copy, Debug)]
struct ArenaNode {
    hash: H256,
    allotment: Amount,
}

/// Built node arena: one level-ordered flat vector, leaves first.
#[derive(Clone, Debug)]
struct Arena {
    nodes: Vec<ArenaNode>,
    leaf_width: usize,
}

/// Mutable per-eon balance commitment tree.
#[derive(Clone, Debug)]
pub struct AmTree {
    eon: u64,
    leaves: Vec<AmtLeaf>,
    index: BTreeMap<Address, usize>,
    built: Option<Arena>,
}

impl AmTree {
    /// Empty tree for one eon.
    pub fn new(eon: u64) -> Self {
        Self {
            eon,
            leaves: Vec::new(),
            index: BTreeMap::new(),
            built: None,
        }
    }

    /// Eon this tree commits.
    pub fn eon(&self) -> u64 {
        self.eon
    }

    /// Number of populated (non-padding) leaves.
    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    /// True when no leaf has been inserted.
    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// Committed allotment for an address, if present.
    pub fn allotment_of(&self, address: &Address) -> Option<Amount> {
        self.index.get(address).map(|i| self.leaves[*i].allotment)
    }

    /// Insert a new leaf or update the allotment of an existing one.
    /// Returns the stable leaf index (insertion order).
    pub fn insert_or_update(&mut self, address: Address, allotment: Amount) -> usize {
        self.built = None;
        match self.index.get(&address) {
            Some(&i) => {
                self.leaves[i].allotment = allotment;
                i
            }
            None => {
                let i = self.leaves.len();
                self.leaves.push(AmtLeaf { address, allotment });
                self.index.insert(address, i);
                i
            }
        }
    }

    fn padded_width(&self) -> usize {
        self.leaves.len().max(1).next_power_of_two()
    }

    fn build(&mut self) -> &Arena {
        if self.built.is_none() {
            let width = self.padded_width();
            let empty = ArenaNode {
                hash: empty_leaf_hash(),
                allotment: 0,
            };

            let mut nodes: Vec<ArenaNode> = Vec::with_capacity(2 * width - 1);
            for leaf in self.leaves.iter() {
                nodes.push(ArenaNode {
                    hash: leaf_hash(&leaf.address, leaf.allotment),
                    allotment: leaf.allotment,
                });
            }
            nodes.resize(width, empty);

            // Build parents level by level over the arena.
            let mut level_start = 0usize;
            let mut level_len = width;
            while level_len > 1 {
                for i in 0..level_len / 2 {
                    let l = nodes[level_start + 2 * i];
                    let r = nodes[level_start + 2 * i + 1];
                    let allotment = l
                        .allotment
                        .checked_add(r.allotment)
                        .expect("allotment overflow: solvency invariant violated");
                    nodes.push(ArenaNode {
                        hash: node_hash(&l.hash, &r.hash, l.allotment, r.allotment),
                        allotment,
                    });
                }
                level_start += level_len;
                level_len /= 2;
            }

            let root = nodes[nodes.len() - 1];
            let sum: Amount = self
                .leaves
                .iter()
                .map(|l| l.allotment)
                .try_fold(0u128, |a, b| a.checked_add(b))
                .expect("allotment overflow: solvency invariant violated");
            // Root aggregate must equal the sum of populated leaves; anything
            // else means the commitment is insolvent.
            assert_eq!(
                root.allotment, sum,
                "amt root allotment diverged from leaf sum"
            );

            self.built = Some(Arena {
                nodes,
                leaf_width: width,
            });
        }
        self.built.as_ref().expect("just built")
    }

    /// Compute (and cache) the root. Pure in the leaf set: rebuilding after
    /// identical inserts always yields the same root.
    pub fn compute_root(&mut self) -> AmtRoot {
        let arena = self.build();
        let root = arena.nodes[arena.nodes.len() - 1];
        AmtRoot {
            hash: root.hash,
            allotment: root.allotment,
        }
    }

    /// Root, if `compute_root` has run since the last mutation.
    pub fn root(&self) -> Result<AmtRoot, AmtError> {
        let arena = self.built.as_ref().ok_or(AmtError::NotBuilt)?;
        let root = arena.nodes[arena.nodes.len() - 1];
        Ok(AmtRoot {
            hash: root.hash,
            allotment: root.allotment,
        })
    }

    /// Membership proof for an address against the computed root.
    pub fn membership_proof(&self, address: &Address) -> Result<AmtProof, AmtError> {
        let arena = self.built.as_ref().ok_or(AmtError::NotBuilt)?;
        let leaf_idx = *self.index.get(address).ok_or(AmtError::UnknownAddress)?;
        let leaf = self.leaves[leaf_idx];

        let mut path = Vec::new();
        let mut level_start = 0usize;
        let mut level_len = arena.leaf_width;
        let mut idx = leaf_idx;
        while level_len > 1 {
            let is_right = idx % 2 == 1;
            let sib = arena.nodes[level_start + if is_right { idx - 1 } else { idx + 1 }];
            path.push(AmtPathItem {
                side: if is_right { Side::Left } else { Side::Right },
                sibling_hash: sib.hash,
                sibling_allotment: sib.allotment,
            });
            level_start += level_len;
            level_len /= 2;
            idx /= 2;
        }

        Ok(AmtProof {
            eon: self.eon,
            leaf,
            path,
        })
    }
}
