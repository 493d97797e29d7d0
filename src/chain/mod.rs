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

//! Narrow ledger connector interface plus an in-memory chain for dev/test.
//!
//! The hub consumes the underlying ledger only through [`ChainConnector`]:
//! balances, transaction submission, block height, block push, and the
//! settlement contract's commit/challenge entry points.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::core::crypto::service::hash;
use crate::core::types::{encode_canonical, Address, Amount, H256, HubRoot, Signature};

/// Connector errors.
#[derive(Debug, Error)]
pub enum ChainError {
    /// Ledger unreachable or submission rejected.
    #[error("ledger io")]
    Io,
    /// No root committed for the queried eon.
    #[error("no commit for eon")]
    NoCommit,
    /// Transaction could not be canonically encoded.
    #[error("codec")]
    Codec,
}

/// A transaction submitted to the ledger on the hub's behalf.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ChainTransaction {
    /// Commit one eon's root to the settlement contract.
    CommitRoot {
        /// The committed root.
        root: HubRoot,
        /// Hub signature over the root commitment payload.
        signature: Signature,
    },
    /// Pay out an admitted withdrawal.
    Withdrawal {
        /// Receiving address.
        address: Address,
        /// Paid amount.
        amount: Amount,
    },
    /// Submit challenge evidence for on-chain penalty.
    ChallengeEvidence {
        /// Disputed eon.
        eon: u64,
        /// Canonical evidence bytes.
        evidence: Vec<u8>,
    },
}

/// Narrow interface to the underlying ledger and settlement contract.
pub trait ChainConnector: Send + Sync {
    /// On-chain balance of an address.
    fn get_balance(&self, address: &Address) -> Result<Amount, ChainError>;
    /// Submit a transaction; returns its ledger hash.
    fn submit_transaction(&self, tx: ChainTransaction) -> Result<H256, ChainError>;
    /// Current block height.
    fn get_block_number(&self) -> Result<u64, ChainError>;
    /// Subscribe to block-height pushes.
    fn watch_blocks(&self) -> mpsc::Receiver<u64>;
    /// Committed root for an eon, if any.
    fn query_hub_commit(&self, eon: u64) -> Result<Option<HubRoot>, ChainError>;
}

struct InMemoryState {
    balances: BTreeMap<Address, Amount>,
    commits: BTreeMap<u64, HubRoot>,
    txs: Vec<(H256, ChainTransaction)>,
    block_watchers: Vec<mpsc::Sender<u64>>,
}

/// Single-process ledger stub: explicit block production, instant inclusion.
pub struct InMemoryChain {
    height: AtomicU64,
    state: Mutex<InMemoryState>,
}

impl InMemoryChain {
    /// Fresh chain at height 0.
    pub fn new() -> Self {
        Self {
            height: AtomicU64::new(0),
            state: Mutex::new(InMemoryState {
                balances: BTreeMap::new(),
                commits: BTreeMap::new(),
                txs: Vec::new(),
                block_watchers: Vec::new(),
            }),
        }
    }

    /// Mint an on-chain balance (test fixture).
    pub fn fund(&self, address: Address, amount: Amount) {
        let mut st = self.state.lock().expect("chain state poisoned");
        let entry = st.balances.entry(address).or_insert(0);
        *entry = entry.saturating_add(amount);
    }

    /// Produce `n` blocks, pushing each height to all watchers.
    pub fn produce_blocks(&self, n: u64) {
        for _ in 0..n {
            let h = self.height.fetch_add(1, Ordering::SeqCst) + 1;
            let mut st = self.state.lock().expect("chain state poisoned");
            st.block_watchers
                .retain(|w| w.try_send(h).is_ok() || !w.is_closed());
        }
    }

    /// All submitted transactions, oldest first (test inspection).
    pub fn submitted(&self) -> Vec<(H256, ChainTransaction)> {
        self.state.lock().expect("chain state poisoned").txs.clone()
    }
}

impl Default for InMemoryChain {
    fn default() -> Self {
        Self::new()
    }
}

impl ChainConnector for InMemoryChain {
    fn get_balance(&self, address: &Address) -> Result<Amount, ChainError> {
        let st = self.state.lock().expect("chain state poisoned");
        Ok(st.balances.get(address).copied().unwrap_or(0))
    }

    fn submit_transaction(&self, tx: ChainTransaction) -> Result<H256, ChainError> {
        let bytes = encode_canonical(&tx).map_err(|_| ChainError::Codec)?;
        let tx_hash = hash(&bytes);

        let mut st = self.state.lock().expect("chain state poisoned");
        match &tx {
            ChainTransaction::CommitRoot { root, .. } => {
                // First commit per eon wins; the contract rejects re-commits.
                st.commits.entry(root.eon).or_insert(*root);
            }
            ChainTransaction::Withdrawal { address, amount } => {
                let entry = st.balances.entry(*address).or_insert(0);
                *entry = entry.saturating_add(*amount);
            }
            ChainTransaction::ChallengeEvidence { .. } => {}
        }
        st.txs.push((tx_hash, tx));
        Ok(tx_hash)
    }

    fn get_block_number(&self) -> Result<u64, ChainError> {
        Ok(self.height.load(Ordering::SeqCst))
    }

    fn watch_blocks(&self) -> mpsc::Receiver<u64> {
        let (tx, rx) = mpsc::channel(256);
        let mut st = self.state.lock().expect("chain state poisoned");
        st.block_watchers.push(tx);
        rx
    }

    fn query_hub_commit(&self, eon: u64) -> Result<Option<HubRoot>, ChainError> {
        let st = self.state.lock().expect("chain state poisoned");
        Ok(st.commits.get(&eon).copied())
    }
}
