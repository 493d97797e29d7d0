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

//! Deterministic core types and canonical encoding helpers.
//!
//! Entities are plain data records; codecs and signing payloads live in
//! separate modules so no wire format leaks into the data model.

use bincode::Options;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

/// Off-chain balance amount. All arithmetic on amounts is checked or
/// saturating, never wrapping.
pub type Amount = u128;

/// Canonical serialization error.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Value could not be serialized.
    #[error("serialization")]
    Serialize,
    /// Bytes are not a valid encoding of the expected type.
    #[error("deserialization")]
    Deserialize,
    /// Record exceeds the decode size cap.
    #[error("size limit exceeded")]
    TooLarge,
}

/// Canonical bincode options (deterministic).
fn bincode_opts() -> impl Options {
    // Fixint encoding provides a stable integer representation.
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .reject_trailing_bytes()
}

/// Encode with deterministic rules. Requires deterministic container ordering
/// (use BTreeMap/BTreeSet).
pub fn encode_canonical<T: Serialize>(v: &T) -> Result<Vec<u8>, CodecError> {
    bincode_opts()
        .serialize(v)
        .map_err(|_| CodecError::Serialize)
}

/// Decode with a hard size cap.
pub fn decode_canonical_limited<T: DeserializeOwned>(
    bytes: &[u8],
    max: usize,
) -> Result<T, CodecError> {
    if bytes.len() > max {
        return Err(CodecError::TooLarge);
    }
    // Cap inside the deserializer as well so container length prefixes cannot
    // request absurd allocations.
    bincode_opts()
        .with_limit(max as u64)
        .deserialize(bytes)
        .map_err(|_| CodecError::Deserialize)
}

/// 256-bit hash type (32 bytes).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct H256([u8; 32]);

impl H256 {
    /// All-zero hash.
    pub const ZERO: H256 = H256([0u8; 32]);

    /// Construct from raw bytes.
    pub fn from_bytes(b: [u8; 32]) -> Self {
        Self(b)
    }
    /// Return bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Display for H256 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Participant address: 20 opaque bytes (truncated hash of the public key).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address([u8; 20]);

impl Address {
    /// Construct from raw bytes.
    pub fn from_bytes(b: [u8; 20]) -> Self {
        Self(b)
    }
    /// Return bytes.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Ed25519 signature with the signing public key attached, so it can be
/// verified against arbitrary byte payloads without a key registry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// Signer public key (Ed25519, 32 bytes).
    pub signer: [u8; 32],
    /// Signature bytes (expected 64).
    pub bytes: Vec<u8>,
}

/// A registered hub participant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Ledger address.
    pub address: Address,
    /// Ed25519 public key the address is derived from.
    pub public_key: [u8; 32],
}

/// An individual off-chain transfer proposed between two participants.
///
/// `nonce` disambiguates otherwise-identical transfers within one eon so the
/// transaction hash is unique per intent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffchainTransaction {
    /// Eon the transfer belongs to.
    pub eon: u64,
    /// Sender address.
    pub from: Address,
    /// Receiver address.
    pub to: Address,
    /// Transfer amount.
    pub amount: Amount,
    /// Sender-chosen uniqueness nonce.
    pub nonce: u64,
    /// Sender signature over the transaction payload.
    pub signature: Option<Signature>,
}

/// An account's claimed cumulative off-chain activity within an eon.
///
/// Valid only when signed by its owner; binding on the hub once
/// countersigned. `tx_root` commits the account's admitted transaction set
/// for the eon.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Update {
    /// Eon number.
    pub eon: u64,
    /// Monotonically increasing per account per eon.
    pub version: u64,
    /// Cumulative amount sent within the eon.
    pub send_amount: Amount,
    /// Cumulative amount received within the eon.
    pub receive_amount: Amount,
    /// Merkle root over the account's admitted transactions this eon.
    pub tx_root: H256,
    /// Owner signature.
    pub owner_signature: Option<Signature>,
    /// Hub countersignature, present only after hub acceptance.
    pub hub_signature: Option<Signature>,
}

impl Update {
    /// Fresh eon-opening update (version 0, zero activity).
    pub fn opening(eon: u64) -> Self {
        Self {
            eon,
            version: 0,
            send_amount: 0,
            receive_amount: 0,
            tx_root: H256::ZERO,
            owner_signature: None,
            hub_signature: None,
        }
    }

    /// Whether the hub has countersigned this update.
    pub fn is_signed_by_hub(&self) -> bool {
        self.hub_signature.is_some()
    }
}

/// The unit exchanged between two participants before hub admission: a
/// transaction plus the proposing side's next update as evidence.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Iou {
    /// The proposed transfer.
    pub transaction: OffchainTransaction,
    /// The proposing side's next update reflecting the transfer.
    pub update: Update,
}

/// Queryable account record.
///
/// `balance = deposit - withdraw + receive_amount - send_amount`; `allotment`
/// is the amount committed into the AMT leaf at eon close.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubAccount {
    /// Account address.
    pub address: Address,
    /// Owner public key.
    pub public_key: [u8; 32],
    /// Eon this record belongs to.
    pub eon: u64,
    /// On-chain deposits credited this eon (plus carried opening balance).
    pub deposit: Amount,
    /// Withdrawals admitted this eon.
    pub withdraw: Amount,
    /// Last hub-countersigned update.
    pub update: Update,
    /// Amount committed into the AMT leaf; 0 until the eon closes.
    pub allotment: Amount,
}

impl HubAccount {
    /// Derived spendable balance.
    pub fn balance(&self) -> Amount {
        self.deposit
            .saturating_sub(self.withdraw)
            .saturating_add(self.update.receive_amount)
            .saturating_sub(self.update.send_amount)
    }
}

/// The published root hash + aggregate allotment for a closed eon.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubRoot {
    /// Eon number.
    pub eon: u64,
    /// AMT root hash.
    pub root: H256,
    /// Aggregate allotment (solvency sum).
    pub allotment: Amount,
    /// First block height of the eon.
    pub start_height: u64,
    /// Eon length in ledger blocks.
    pub blocks_per_eon: u64,
}

/// Hub readiness snapshot for clients.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubInfo {
    /// True once the first eon is open.
    pub ready: bool,
    /// Current eon number.
    pub eon: u64,
    /// Eon length in ledger blocks.
    pub blocks_per_eon: u64,
    /// Latest committed root, if any eon has closed.
    pub root: Option<HubRoot>,
}

/// An immutable fact broadcast after a hub state change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HubEvent {
    /// An on-chain deposit was credited.
    NewDeposit {
        /// Credited account.
        address: Address,
        /// Deposited amount.
        amount: Amount,
        /// Ledger transaction hash.
        tx_hash: H256,
    },
    /// An off-chain transfer was admitted; delivered to the receiver.
    NewTx(OffchainTransaction),
    /// An account's update was countersigned.
    NewUpdate {
        /// Account the update belongs to.
        address: Address,
        /// The countersigned update.
        update: Update,
    },
    /// A withdrawal was admitted.
    NewWithdrawal {
        /// Withdrawing account.
        address: Address,
        /// Withdrawn amount.
        amount: Amount,
    },
    /// One per eon, on close.
    NewHubRoot(HubRoot),
    /// A challenge was adjudicated. `hub_at_fault` evidence has also been
    /// handed to the ledger connector.
    ChallengeResolved {
        /// Disputed eon.
        eon: u64,
        /// Whether the hub was convicted.
        hub_at_fault: bool,
    },
    /// Terminal event for a watcher whose queue overflowed.
    WatcherOverflow,
}

impl HubEvent {
    /// Address this event targets, if it is account-scoped.
    pub fn address(&self) -> Option<Address> {
        match self {
            HubEvent::NewDeposit { address, .. } => Some(*address),
            HubEvent::NewTx(tx) => Some(tx.to),
            HubEvent::NewUpdate { address, .. } => Some(*address),
            HubEvent::NewWithdrawal { address, .. } => Some(*address),
            HubEvent::NewHubRoot(_)
            | HubEvent::ChallengeResolved { .. }
            | HubEvent::WatcherOverflow => None,
        }
    }
}

/// Synchronously rejected input; no state mutation occurred.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// Zero-amount transfers and withdrawals are never admitted.
    #[error("amount must be positive")]
    NonPositiveAmount,
    /// A required signature is absent or does not verify.
    #[error("bad signature")]
    BadSignature,
    /// Update sums or tx root disagree with the hub's ledger.
    #[error("update does not match hub state (stale or forked)")]
    StaleUpdate,
    /// Update version is not exactly one past the last admitted version.
    #[error("update version must increase by exactly one")]
    BadVersion,
    /// The operation would drive the account balance negative.
    #[error("resulting balance is negative")]
    InsufficientBalance,
    /// The object targets an eon other than the current open one.
    #[error("wrong eon")]
    WrongEon,
    /// The transaction hash was already admitted this eon.
    #[error("transaction already admitted")]
    DuplicateTransaction,
    /// The address already has an account.
    #[error("participant already registered")]
    AlreadyRegistered,
    /// The supplied membership proof is malformed or does not verify.
    #[error("malformed proof")]
    MalformedProof,
}

/// Hub configuration root.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HubConfig {
    /// Data directory (sled store + hub key).
    pub data_dir: String,
    /// Eon length in ledger blocks.
    pub blocks_per_eon: u64,
    /// How many closed eons to retain for challenge evidence.
    pub eon_retention: usize,
    /// Bounded per-watcher event queue depth.
    pub watcher_queue_depth: usize,
    /// Metrics/info HTTP listen address, e.g. 0.0.0.0:9090.
    pub metrics_listen_addr: String,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            data_dir: "./data".to_string(),
            blocks_per_eon: 16,
            eon_retention: 8,
            watcher_queue_depth: 64,
            metrics_listen_addr: "127.0.0.1:9090".to_string(),
        }
    }
}
