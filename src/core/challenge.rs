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
#![deny(missing_docs)]

//! Fraud-proof verification for the three challenge kinds.
//!
//! The engine is pure: it replays supplied evidence against a previously
//! committed root and returns a verdict. A `HubAtFault` verdict is evidence
//! for on-chain penalty and is never silently retried.

use serde::{Deserialize, Serialize};

use crate::core::amt::proof::{verify_proof, AmtProof, AmtRoot};
use crate::core::amt::txset::{verify_tx_proof, TxSetProof};
use crate::core::crypto::service::{address_of, verify_by};
use crate::core::crypto::signing::{tx_hash, tx_signing_bytes, update_signing_bytes};
use crate::core::types::{Address, Amount, H256, HubRoot, OffchainTransaction, Update};

/// Outcome of adjudicating a challenge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    /// The committed state is inconsistent with binding evidence.
    HubAtFault,
    /// The challenger's evidence is invalid or refuted by the commitment.
    ChallengerAtFault,
    /// The evidence neither proves nor refutes fault (e.g. it does not
    /// connect to the committed root, or a window is still open).
    Inconclusive,
}

/// Evidence bundle for a balance-update dispute: the claimant's last
/// hub-countersigned update and the membership path the hub handed out for
/// the disputed eon. Either half may be absent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BalanceUpdateProof {
    /// Hub-countersigned update, if the claimant holds one.
    pub update: Option<Update>,
    /// Membership path into the committed tree.
    pub path: Option<AmtProof>,
}

/// A participant's claim that the committed root does not reflect their
/// hub-countersigned update.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceUpdateChallenge {
    /// Challenged account.
    pub address: Address,
    /// Supporting evidence.
    pub proof: BalanceUpdateProof,
    /// Claimant's public key (authenticates the update's owner signature).
    pub owner_public_key: [u8; 32],
}

/// A sender's claim that an admitted transfer never reached the recipient's
/// committed state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferDeliveryChallenge {
    /// The sender's hub-countersigned update whose `tx_root` admits the
    /// transaction.
    pub update: Update,
    /// The disputed transfer.
    pub transaction: OffchainTransaction,
    /// Inclusion path of the transaction in `update.tx_root`.
    pub path: TxSetProof,
}

/// On-chain-known charges for an account within one eon, used to derive the
/// allotment a countersigned update implies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountCharges {
    /// Deposits credited this eon (incl. carried opening balance).
    pub deposit: Amount,
    /// Withdrawals admitted this eon.
    pub withdraw: Amount,
}

fn expected_allotment(charges: &AccountCharges, update: &Update) -> Option<Amount> {
    charges
        .deposit
        .checked_add(update.receive_amount)?
        .checked_sub(charges.withdraw)?
        .checked_sub(update.send_amount)
}

/// Adjudicate a balance-update challenge against the committed root of the
/// disputed eon.
///
/// The path must recompute to the committed root (it is the hub's own
/// handout); a verifying path whose leaf allotment differs from what the
/// countersigned update implies convicts the hub, unless `committed_update`
/// is a later countersigned update from the same owner that the committed
/// leaf does reflect. Without that counter-evidence a challenger could
/// replay any old countersigned update against an honest commitment.
pub fn verify_balance_update_challenge(
    challenge: &BalanceUpdateChallenge,
    committed: &HubRoot,
    charges: &AccountCharges,
    committed_update: Option<&Update>,
    hub_public_key: &[u8; 32],
) -> Verdict {
    let Some(update) = challenge.proof.update.as_ref() else {
        return Verdict::Inconclusive;
    };
    let Some(path) = challenge.proof.path.as_ref() else {
        return Verdict::Inconclusive;
    };

    // The update must be binding: owner-signed by the claimant and
    // countersigned by the hub, for the disputed eon.
    if update.eon != committed.eon {
        return Verdict::ChallengerAtFault;
    }
    let payload = update_signing_bytes(update);
    let owner_ok = update
        .owner_signature
        .as_ref()
        .is_some_and(|s| verify_by(&payload, s, &challenge.owner_public_key).is_ok());
    let hub_ok = update
        .hub_signature
        .as_ref()
        .is_some_and(|s| verify_by(&payload, s, hub_public_key).is_ok());
    if !owner_ok || !hub_ok {
        return Verdict::ChallengerAtFault;
    }
    if address_of(&challenge.owner_public_key) != challenge.address
        || path.leaf.address != challenge.address
        || path.eon != committed.eon
    {
        return Verdict::ChallengerAtFault;
    }

    // An update implying a negative balance can never have been admitted.
    let Some(expected) = expected_allotment(charges, update) else {
        return Verdict::ChallengerAtFault;
    };

    let root = AmtRoot {
        hash: committed.root,
        allotment: committed.allotment,
    };
    if !verify_proof(&root, path) {
        // Evidence does not connect to what is on chain.
        return Verdict::Inconclusive;
    }

    if path.leaf.allotment == expected {
        return Verdict::ChallengerAtFault;
    }

    // The mismatch convicts only if it is consistent with the supplied update
    // being ignored. A higher-version update, owner-signed and countersigned
    // for the same eon, whose implied allotment the committed leaf matches,
    // proves the challenge update was merely superseded.
    if let Some(later) = committed_update {
        if later.eon == committed.eon && later.version > update.version {
            let later_payload = update_signing_bytes(later);
            let later_owner = later
                .owner_signature
                .as_ref()
                .is_some_and(|s| verify_by(&later_payload, s, &challenge.owner_public_key).is_ok());
            let later_hub = later
                .hub_signature
                .as_ref()
                .is_some_and(|s| verify_by(&later_payload, s, hub_public_key).is_ok());
            if later_owner
                && later_hub
                && expected_allotment(charges, later) == Some(path.leaf.allotment)
            {
                return Verdict::ChallengerAtFault;
            }
        }
    }

    Verdict::HubAtFault
}

/// Adjudicate a transfer-delivery challenge against the closed eon's admitted
/// transaction set.
///
/// `closed_eon_txs` is the full set of transaction hashes the hub admitted in
/// the disputed eon (replayable from the retained closed-eon record).
pub fn verify_transfer_delivery_challenge(
    challenge: &TransferDeliveryChallenge,
    closed_eon_txs: &[H256],
    hub_public_key: &[u8; 32],
) -> Verdict {
    let tx = &challenge.transaction;

    // Sender must have signed the transfer.
    let tx_ok = tx.signature.as_ref().is_some_and(|s| {
        address_of(&s.signer) == tx.from
            && verify_by(&tx_signing_bytes(tx), s, &s.signer).is_ok()
    });
    if !tx_ok {
        return Verdict::ChallengerAtFault;
    }

    // The carrying update must be hub-countersigned for the same eon.
    if challenge.update.eon != tx.eon {
        return Verdict::ChallengerAtFault;
    }
    let payload = update_signing_bytes(&challenge.update);
    let hub_ok = challenge
        .update
        .hub_signature
        .as_ref()
        .is_some_and(|s| verify_by(&payload, s, hub_public_key).is_ok());
    if !hub_ok {
        return Verdict::ChallengerAtFault;
    }

    // The transaction must open the update's tx_root.
    let h = tx_hash(tx);
    if challenge.path.tx_hash != h || !verify_tx_proof(&challenge.update.tx_root, &challenge.path)
    {
        return Verdict::ChallengerAtFault;
    }

    // The hub provably admitted the transfer; if it is absent from the closed
    // eon's delivered set, the recipient's committed state cannot reflect it.
    if closed_eon_txs.contains(&h) {
        Verdict::ChallengerAtFault
    } else {
        Verdict::HubAtFault
    }
}

/// Adjudicate a do-nothing (timeout) challenge.
///
/// A legitimately queued action the hub has not reflected within one full eon
/// window is itself the fault; all timing is measured in block height.
pub fn verify_do_nothing_challenge(
    queued_height: u64,
    serviced_height: Option<u64>,
    current_height: u64,
    blocks_per_eon: u64,
) -> Verdict {
    let deadline = queued_height.saturating_add(blocks_per_eon);
    match serviced_height {
        Some(h) if h <= deadline => Verdict::ChallengerAtFault,
        Some(_) => Verdict::HubAtFault,
        None if current_height > deadline => Verdict::HubAtFault,
        None => Verdict::Inconclusive,
    }
}
