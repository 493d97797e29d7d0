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

//! Domain-separated signing bytes for hub protocol objects.
//!
//! Signatures never cover other signatures: transaction payloads exclude the
//! sender signature, update payloads exclude both the owner signature and the
//! hub countersignature, so owner and hub sign the same bytes.

use crate::core::crypto::service::hash;
use crate::core::types::{H256, OffchainTransaction, Update};

/// Transfer payload: domain || eon || from || to || amount || nonce
pub fn tx_signing_bytes(tx: &OffchainTransaction) -> Vec<u8> {
    let mut out = Vec::with_capacity(16 + 8 + 20 + 20 + 16 + 8);
    out.extend_from_slice(b"Eonhub-Tx-v1");
    out.extend_from_slice(&tx.eon.to_be_bytes());
    out.extend_from_slice(tx.from.as_bytes());
    out.extend_from_slice(tx.to.as_bytes());
    out.extend_from_slice(&tx.amount.to_be_bytes());
    out.extend_from_slice(&tx.nonce.to_be_bytes());
    out
}

/// Canonical transaction hash: H(signing bytes).
pub fn tx_hash(tx: &OffchainTransaction) -> H256 {
    hash(&tx_signing_bytes(tx))
}

/// Update payload: domain || eon || version || send || receive || tx_root
pub fn update_signing_bytes(u: &Update) -> Vec<u8> {
    let mut out = Vec::with_capacity(20 + 8 + 8 + 16 + 16 + 32);
    out.extend_from_slice(b"Eonhub-Update-v1");
    out.extend_from_slice(&u.eon.to_be_bytes());
    out.extend_from_slice(&u.version.to_be_bytes());
    out.extend_from_slice(&u.send_amount.to_be_bytes());
    out.extend_from_slice(&u.receive_amount.to_be_bytes());
    out.extend_from_slice(u.tx_root.as_bytes());
    out
}

/// Root commitment payload: domain || eon || root || allotment || start_height
pub fn root_signing_bytes(eon: u64, root: H256, allotment: u128, start_height: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(16 + 8 + 32 + 16 + 8);
    out.extend_from_slice(b"Eonhub-Root-v1");
    out.extend_from_slice(&eon.to_be_bytes());
    out.extend_from_slice(root.as_bytes());
    out.extend_from_slice(&allotment.to_be_bytes());
    out.extend_from_slice(&start_height.to_be_bytes());
    out
}
