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

//! Durable byte-keyed map over sled for account snapshots and closed roots.
//!
//! Keys: `acct/{eon_be}/{address}`, `root/{eon_be}` and `txs/{eon_be}`. The
//! core treats this as a durable map; nothing here knows about tree or eon
//! semantics. Big-endian eon numbers keep prefix scans in eon order.

use sled::transaction::ConflictableTransactionError;
use thiserror::Error;

use crate::core::types::{
    decode_canonical_limited, encode_canonical, Address, H256, HubAccount, HubRoot,
};

/// Hard cap on a single stored record.
const MAX_RECORD_BYTES: usize = 64 * 1024;
/// Cap for a whole eon's delivered-transaction list.
const MAX_TXSET_BYTES: usize = 1024 * 1024;

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database could not be opened.
    #[error("db open")]
    DbOpen,
    /// Read or write failed.
    #[error("db io")]
    DbIo,
    /// Transactional batch aborted on conflict.
    #[error("tx conflict")]
    TxConflict,
    /// Stored record does not decode.
    #[error("codec")]
    Codec,
    /// Persisted records are mutually inconsistent.
    #[error("corrupt record")]
    Corrupt,
}

/// One batched operation.
#[derive(Clone, Debug)]
pub enum KvOp {
    /// Put key/value.
    Put {
        /// Key bytes.
        key: Vec<u8>,
        /// Value bytes.
        value: Vec<u8>,
    },
    /// Delete key.
    Del {
        /// Key bytes.
        key: Vec<u8>,
    },
}

fn account_key(eon: u64, address: &Address) -> Vec<u8> {
    let mut k = Vec::with_capacity(5 + 8 + 20);
    k.extend_from_slice(b"acct/");
    k.extend_from_slice(&eon.to_be_bytes());
    k.push(b'/');
    k.extend_from_slice(address.as_bytes());
    k
}

fn root_key(eon: u64) -> Vec<u8> {
    let mut k = Vec::with_capacity(5 + 8);
    k.extend_from_slice(b"root/");
    k.extend_from_slice(&eon.to_be_bytes());
    k
}

fn txset_key(eon: u64) -> Vec<u8> {
    let mut k = Vec::with_capacity(4 + 8);
    k.extend_from_slice(b"txs/");
    k.extend_from_slice(&eon.to_be_bytes());
    k
}

/// Persistent hub store.
#[derive(Clone)]
pub struct HubStore {
    db: sled::Db,
}

impl HubStore {
    /// Open sled DB at path (directory).
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let db = sled::open(path).map_err(|_| StoreError::DbOpen)?;
        Ok(Self { db })
    }

    /// Temporary in-memory store (tests, dev mode).
    pub fn open_temporary() -> Result<Self, StoreError> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|_| StoreError::DbOpen)?;
        Ok(Self { db })
    }

    /// Get raw value.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let v = self.db.get(key).map_err(|_| StoreError::DbIo)?;
        Ok(v.map(|iv| iv.to_vec()))
    }

    /// Put raw value.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.db.insert(key, value).map_err(|_| StoreError::DbIo)?;
        Ok(())
    }

    /// Delete key.
    pub fn delete(&self, key: &[u8]) -> Result<(), StoreError> {
        self.db.remove(key).map_err(|_| StoreError::DbIo)?;
        Ok(())
    }

    /// Iterate all pairs under a key prefix.
    pub fn iterate_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        let mut out = Vec::new();
        for item in self.db.scan_prefix(prefix) {
            let kv = item.map_err(|_| StoreError::DbIo)?;
            out.push((kv.0.to_vec(), kv.1.to_vec()));
        }
        Ok(out)
    }

    /// Atomic batch using sled transactions.
    pub fn batch_update(&self, ops: Vec<KvOp>) -> Result<(), StoreError> {
        let tree = &self.db;
        let res: Result<(), ConflictableTransactionError<StoreError>> = (|| {
            tree.transaction(|t| {
                for op in ops.iter() {
                    match op {
                        KvOp::Put { key, value } => {
                            t.insert(key.as_slice(), value.as_slice()).map_err(|_| {
                                ConflictableTransactionError::Abort(StoreError::DbIo)
                            })?;
                        }
                        KvOp::Del { key } => {
                            t.remove(key.as_slice()).map_err(|_| {
                                ConflictableTransactionError::Abort(StoreError::DbIo)
                            })?;
                        }
                    }
                }
                Ok(())
            })
            .map_err(|e| match e {
                sled::transaction::TransactionError::Abort(se) => {
                    ConflictableTransactionError::Abort(se)
                }
                sled::transaction::TransactionError::Storage(_) => {
                    ConflictableTransactionError::Abort(StoreError::DbIo)
                }
            })
        })();

        match res {
            Ok(()) => Ok(()),
            Err(ConflictableTransactionError::Abort(e)) => Err(e),
            Err(ConflictableTransactionError::Conflict) => Err(StoreError::TxConflict),
            Err(ConflictableTransactionError::Storage(_)) => Err(StoreError::DbIo),
        }
    }

    /// Persist an account snapshot keyed by eon + address.
    pub fn put_account(&self, account: &HubAccount) -> Result<(), StoreError> {
        let bytes = encode_canonical(account).map_err(|_| StoreError::Codec)?;
        self.put(&account_key(account.eon, &account.address), &bytes)
    }

    /// Load an account snapshot.
    pub fn get_account(
        &self,
        eon: u64,
        address: &Address,
    ) -> Result<Option<HubAccount>, StoreError> {
        let Some(bytes) = self.get(&account_key(eon, address))? else {
            return Ok(None);
        };
        decode_canonical_limited(&bytes, MAX_RECORD_BYTES)
            .map(Some)
            .map_err(|_| StoreError::Codec)
    }

    /// Persist one closed eon in a single atomic batch: all account
    /// snapshots, the delivered-transaction set, and the root.
    pub fn put_closed_eon(
        &self,
        root: &HubRoot,
        accounts: &[HubAccount],
        delivered_txs: &[H256],
    ) -> Result<(), StoreError> {
        let mut ops = Vec::with_capacity(accounts.len() + 2);
        for account in accounts {
            let bytes = encode_canonical(account).map_err(|_| StoreError::Codec)?;
            ops.push(KvOp::Put {
                key: account_key(account.eon, &account.address),
                value: bytes,
            });
        }
        let txs_bytes =
            encode_canonical(&delivered_txs.to_vec()).map_err(|_| StoreError::Codec)?;
        ops.push(KvOp::Put {
            key: txset_key(root.eon),
            value: txs_bytes,
        });
        let root_bytes = encode_canonical(root).map_err(|_| StoreError::Codec)?;
        ops.push(KvOp::Put {
            key: root_key(root.eon),
            value: root_bytes,
        });
        self.batch_update(ops)
    }

    /// Load a closed eon's root.
    pub fn get_root(&self, eon: u64) -> Result<Option<HubRoot>, StoreError> {
        let Some(bytes) = self.get(&root_key(eon))? else {
            return Ok(None);
        };
        decode_canonical_limited(&bytes, MAX_RECORD_BYTES)
            .map(Some)
            .map_err(|_| StoreError::Codec)
    }

    /// Highest-eon committed root on record, if any. Eon keys are big-endian,
    /// so the last entry under the prefix is the latest.
    pub fn latest_root(&self) -> Result<Option<HubRoot>, StoreError> {
        let mut last: Option<Vec<u8>> = None;
        for item in self.db.scan_prefix(b"root/") {
            let kv = item.map_err(|_| StoreError::DbIo)?;
            last = Some(kv.1.to_vec());
        }
        let Some(bytes) = last else {
            return Ok(None);
        };
        decode_canonical_limited(&bytes, MAX_RECORD_BYTES)
            .map(Some)
            .map_err(|_| StoreError::Codec)
    }

    /// All account snapshots persisted for one eon, in address order.
    pub fn accounts_at(&self, eon: u64) -> Result<Vec<HubAccount>, StoreError> {
        let mut prefix = Vec::with_capacity(5 + 8 + 1);
        prefix.extend_from_slice(b"acct/");
        prefix.extend_from_slice(&eon.to_be_bytes());
        prefix.push(b'/');

        let mut out = Vec::new();
        for (_k, v) in self.iterate_prefix(&prefix)? {
            let account = decode_canonical_limited(&v, MAX_RECORD_BYTES)
                .map_err(|_| StoreError::Codec)?;
            out.push(account);
        }
        Ok(out)
    }

    /// Delivered-transaction set of one closed eon.
    pub fn get_delivered_txs(&self, eon: u64) -> Result<Vec<H256>, StoreError> {
        let Some(bytes) = self.get(&txset_key(eon))? else {
            return Ok(Vec::new());
        };
        decode_canonical_limited(&bytes, MAX_TXSET_BYTES).map_err(|_| StoreError::Codec)
    }
}
