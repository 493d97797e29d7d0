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

//! Hub orchestrator: ties registration, deposits, transfers, withdrawals,
//! eon rollover and challenge adjudication together.
//!
//! Locking discipline: every account-mutating operation holds the freeze
//! barrier in read mode and the per-address entry mutex; eon rollover takes
//! the barrier in write mode, so the snapshot observes no account
//! mid-mutation. Closed eons are immutable and readable without the barrier.

/// Bounded pub-sub event fan-out.
pub mod events;

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Arc, Mutex, RwLock};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::chain::{ChainConnector, ChainError, ChainTransaction};
use crate::core::amt::proof::{verify_proof, AmtProof, AmtRoot};
use crate::core::amt::tree::{AmTree, AmtError};
use crate::core::amt::txset::tx_set_root;
use crate::core::challenge::{
    verify_balance_update_challenge, verify_do_nothing_challenge,
    verify_transfer_delivery_challenge, AccountCharges, BalanceUpdateChallenge,
    TransferDeliveryChallenge, Verdict,
};
use crate::core::crypto::service::{address_of, verify_by, CryptoService};
use crate::core::crypto::signing::{
    root_signing_bytes, tx_hash, tx_signing_bytes, update_signing_bytes,
};
use crate::core::eon::{EonAction, EonController, EonError, EonPhase, EonSpan};
use crate::core::state::store::{HubStore, StoreError};
use crate::core::types::{
    encode_canonical, Address, Amount, CodecError, H256, HubAccount, HubConfig, HubEvent,
    HubInfo, HubRoot, Iou, OffchainTransaction, Participant, Update, ValidationError,
};
use crate::hub::events::{EventBroker, Subscription, WatchFilter};
use crate::monitoring::metrics::Metrics;

/// Hub operation errors.
#[derive(Debug, Error)]
pub enum HubError {
    /// Input rejected synchronously; no state mutated.
    #[error("validation: {0}")]
    Validation(#[from] ValidationError),
    /// Requested entity does not exist; never silently defaulted.
    #[error("not found: {0}")]
    NotFound(&'static str),
    /// Explicit wait deadline exceeded (distinct from rejection).
    #[error("timed out")]
    Timeout,
    /// Eon controller misuse or height regression.
    #[error("eon: {0}")]
    Eon(#[from] EonError),
    /// Tree lookup or proof generation failed.
    #[error("tree: {0}")]
    Amt(#[from] AmtError),
    /// Durable store failure.
    #[error("store: {0}")]
    Store(#[from] StoreError),
    /// Ledger connector failure.
    #[error("chain: {0}")]
    Chain(#[from] ChainError),
    /// Canonical encoding failure.
    #[error("codec: {0}")]
    Codec(#[from] CodecError),
}

/// Deliberate fault injection for exercising the challenge engine end-to-end.
/// Reachable only from debug builds or the `fault-injection` feature.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum MaliciousFlag {
    /// Observe a deposit without crediting the account.
    StealDeposit,
    /// Pay a withdrawal out without debiting the account.
    StealWithdrawal,
    /// Commit a root that ignores all admitted transfers.
    StealTransaction,
    /// Admit the sender side of an IOU but never deliver to the receiver.
    StealTransactionIou,
}

#[derive(Clone, Debug)]
struct PendingWithdrawal {
    amount: Amount,
    queued_height: u64,
    serviced_height: Option<u64>,
}

/// Live per-account state for the current eon.
#[derive(Clone, Debug)]
struct AccountState {
    participant: Participant,
    eon: u64,
    /// Allotment carried from the previous eon close.
    opening: Amount,
    /// On-chain deposits observed this eon (credited or not).
    deposits_chain: Amount,
    /// Deposits actually credited into the off-chain ledger.
    deposits_credited: Amount,
    /// Hub-ledger withdrawal debits this eon.
    withdraw: Amount,
    /// On-chain payouts this eon.
    paid_out: Amount,
    update: Update,
    txs: Vec<OffchainTransaction>,
    tx_hashes: Vec<H256>,
    withdrawals: Vec<PendingWithdrawal>,
    registered_height: u64,
    first_committed_height: Option<u64>,
}

impl AccountState {
    fn ledger_deposit(&self) -> Amount {
        self.opening.saturating_add(self.deposits_credited)
    }

    fn balance(&self) -> Amount {
        self.ledger_deposit()
            .saturating_sub(self.withdraw)
            .saturating_add(self.update.receive_amount)
            .saturating_sub(self.update.send_amount)
    }

    fn snapshot(&self, allotment: Amount) -> HubAccount {
        HubAccount {
            address: self.participant.address,
            public_key: self.participant.public_key,
            eon: self.eon,
            deposit: self.ledger_deposit(),
            withdraw: self.withdraw,
            update: self.update.clone(),
            allotment,
        }
    }
}

/// Immutable record of a closed eon, retained for challenge evidence.
struct ClosedEon {
    root: HubRoot,
    tree: AmTree,
    accounts: BTreeMap<Address, HubAccount>,
    charges: BTreeMap<Address, AccountCharges>,
    delivered_txs: Vec<H256>,
}

/// The payment hub.
pub struct Hub<C: ChainConnector> {
    cfg: HubConfig,
    crypto: CryptoService,
    chain: Arc<C>,
    store: HubStore,
    metrics: Arc<Metrics>,
    events: EventBroker,

    /// Freeze barrier: account ops read, eon rollover writes.
    freeze: RwLock<()>,
    eon: Mutex<EonController>,
    accounts: RwLock<BTreeMap<Address, Arc<Mutex<AccountState>>>>,
    history: RwLock<VecDeque<ClosedEon>>,
    /// Admitted transfers awaiting the receiver's countersignature.
    pending_recv: Mutex<BTreeMap<Address, OffchainTransaction>>,
    /// Bilaterally completed transfer hashes for the current eon.
    delivered: Mutex<Vec<H256>>,
    malicious: Mutex<BTreeSet<MaliciousFlag>>,
}

impl<C: ChainConnector> Hub<C> {
    /// Construct a hub. A fresh store anchors eon 0 at the chain's current
    /// height; a store holding committed roots resumes from the latest one,
    /// so `latest_root` and proof-backed withdrawals survive a restart.
    pub fn new(
        cfg: HubConfig,
        crypto: CryptoService,
        chain: Arc<C>,
        store: HubStore,
        metrics: Arc<Metrics>,
    ) -> Result<Self, HubError> {
        let events = EventBroker::new(cfg.watcher_queue_depth);
        let mut history = VecDeque::new();
        let mut accounts: BTreeMap<Address, Arc<Mutex<AccountState>>> = BTreeMap::new();

        let controller = if let Some(root) = store.latest_root()? {
            // Rebuild the latest closed eon from persisted snapshots. The
            // rebuilt tree must reproduce the committed root exactly.
            let snapshots = store.accounts_at(root.eon)?;
            let mut tree = AmTree::new(root.eon);
            for a in &snapshots {
                tree.insert_or_update(a.address, a.allotment);
            }
            let rebuilt = tree.compute_root();
            if rebuilt.hash != root.root || rebuilt.allotment != root.allotment {
                return Err(StoreError::Corrupt.into());
            }
            let delivered_txs = store.get_delivered_txs(root.eon)?;

            let next = EonSpan {
                number: root.eon + 1,
                start_height: root.start_height + root.blocks_per_eon,
            };
            let mut snapshot_map = BTreeMap::new();
            let mut charges = BTreeMap::new();
            for a in snapshots {
                charges.insert(
                    a.address,
                    AccountCharges {
                        deposit: a.deposit,
                        withdraw: a.withdraw,
                    },
                );
                accounts.insert(
                    a.address,
                    Arc::new(Mutex::new(AccountState {
                        participant: Participant {
                            address: a.address,
                            public_key: a.public_key,
                        },
                        eon: next.number,
                        opening: a.allotment,
                        deposits_chain: 0,
                        deposits_credited: 0,
                        withdraw: 0,
                        paid_out: 0,
                        update: Update::opening(next.number),
                        txs: Vec::new(),
                        tx_hashes: Vec::new(),
                        withdrawals: Vec::new(),
                        registered_height: next.start_height,
                        first_committed_height: Some(next.start_height),
                    })),
                );
                snapshot_map.insert(a.address, a);
            }
            history.push_back(ClosedEon {
                root,
                tree,
                accounts: snapshot_map,
                charges,
                delivered_txs,
            });
            metrics.current_eon.set(next.number as i64);
            info!(eon = next.number, root = %root.root, "hub resuming from persisted root");
            EonController::resume(next, cfg.blocks_per_eon)?
        } else {
            let start_height = chain.get_block_number()?;
            info!(start_height, blocks_per_eon = cfg.blocks_per_eon, "hub starting at eon 0");
            EonController::new(start_height, cfg.blocks_per_eon)?
        };

        Ok(Self {
            cfg,
            crypto,
            chain,
            store,
            metrics,
            events,
            freeze: RwLock::new(()),
            eon: Mutex::new(controller),
            accounts: RwLock::new(accounts),
            history: RwLock::new(history),
            pending_recv: Mutex::new(BTreeMap::new()),
            delivered: Mutex::new(Vec::new()),
            malicious: Mutex::new(BTreeSet::new()),
        })
    }

    /// Hub signing public key.
    pub fn public_key(&self) -> [u8; 32] {
        self.crypto.public_key()
    }

    fn flags(&self) -> BTreeSet<MaliciousFlag> {
        self.malicious.lock().expect("flag set poisoned").clone()
    }

    /// Enable fault injection flags.
    #[cfg(any(debug_assertions, feature = "fault-injection"))]
    pub fn set_malicious_flags(&self, flags: &[MaliciousFlag]) {
        let mut set = self.malicious.lock().expect("flag set poisoned");
        set.extend(flags.iter().copied());
        warn!(?set, "malicious flags enabled (fault injection)");
    }

    /// Clear all fault injection flags.
    #[cfg(any(debug_assertions, feature = "fault-injection"))]
    pub fn reset_malicious_flags(&self) {
        self.malicious.lock().expect("flag set poisoned").clear();
    }

    fn emit(&self, event: HubEvent) {
        let dropped = self.events.publish(&event);
        if dropped > 0 {
            self.metrics.watcher_overflow_total.inc_by(dropped as u64);
            warn!(dropped, "slow watchers dropped with overflow marker");
        }
        self.metrics.watchers.set(self.events.watcher_count() as i64);
    }

    fn countersign(&self, update: &Update) -> Update {
        let mut signed = update.clone();
        signed.hub_signature = Some(self.crypto.sign(&update_signing_bytes(update)));
        signed
    }

    fn current_span(&self) -> (EonSpan, EonPhase) {
        let eon = self.eon.lock().expect("eon controller poisoned");
        (eon.current(), eon.phase())
    }

    fn account_entry(
        &self,
        address: &Address,
        missing: &'static str,
    ) -> Result<Arc<Mutex<AccountState>>, HubError> {
        self.accounts
            .read()
            .expect("account table poisoned")
            .get(address)
            .cloned()
            .ok_or(HubError::NotFound(missing))
    }

    // ---- registration & deposits -------------------------------------------

    /// Register a participant with their signed eon-opening update. Returns
    /// the hub-countersigned update.
    pub fn register_participant(
        &self,
        participant: Participant,
        init_update: Update,
    ) -> Result<Update, HubError> {
        let _barrier = self.freeze.read().expect("freeze barrier poisoned");
        let (span, _) = self.current_span();

        if address_of(&participant.public_key) != participant.address {
            return Err(ValidationError::BadSignature.into());
        }
        if init_update.eon != span.number {
            return Err(ValidationError::WrongEon.into());
        }
        if init_update.version != 0
            || init_update.send_amount != 0
            || init_update.receive_amount != 0
        {
            return Err(ValidationError::BadVersion.into());
        }
        let payload = update_signing_bytes(&init_update);
        let sig_ok = init_update
            .owner_signature
            .as_ref()
            .is_some_and(|s| verify_by(&payload, s, &participant.public_key).is_ok());
        if !sig_ok {
            return Err(ValidationError::BadSignature.into());
        }

        let signed = self.countersign(&init_update);
        let height = self.chain.get_block_number()?;
        let mut accounts = self.accounts.write().expect("account table poisoned");
        if accounts.contains_key(&participant.address) {
            return Err(ValidationError::AlreadyRegistered.into());
        }
        let address = participant.address;
        accounts.insert(
            address,
            Arc::new(Mutex::new(AccountState {
                participant,
                eon: span.number,
                opening: 0,
                deposits_chain: 0,
                deposits_credited: 0,
                withdraw: 0,
                paid_out: 0,
                update: signed.clone(),
                txs: Vec::new(),
                tx_hashes: Vec::new(),
                withdrawals: Vec::new(),
                registered_height: height,
                first_committed_height: None,
            })),
        );
        info!(%address, eon = span.number, "participant registered");
        Ok(signed)
    }

    /// Consume a deposit notification from the ledger connector.
    pub fn on_deposit(
        &self,
        address: Address,
        amount: Amount,
        tx_hash: H256,
    ) -> Result<(), HubError> {
        let _barrier = self.freeze.read().expect("freeze barrier poisoned");
        if amount == 0 {
            return Err(ValidationError::NonPositiveAmount.into());
        }
        let entry = self.account_entry(&address, "unknown account")?;
        let steal = self.flags().contains(&MaliciousFlag::StealDeposit);
        {
            let mut acct = entry.lock().expect("account entry poisoned");
            acct.deposits_chain = acct.deposits_chain.saturating_add(amount);
            if !steal {
                acct.deposits_credited = acct.deposits_credited.saturating_add(amount);
            }
        }
        self.metrics.deposits_total.inc();
        if !steal {
            self.emit(HubEvent::NewDeposit {
                address,
                amount,
                tx_hash,
            });
        }
        Ok(())
    }

    // ---- transfers ---------------------------------------------------------

    fn check_open_eon(&self, eon: u64) -> Result<(), HubError> {
        let (span, phase) = self.current_span();
        if phase != EonPhase::Open || eon != span.number {
            return Err(ValidationError::WrongEon.into());
        }
        Ok(())
    }

    /// Admit the sender side of a transfer. Returns the countersigned sender
    /// update; the receiver is notified asynchronously via `NEW_TX`.
    pub fn send_new_transfer(&self, iou: &Iou) -> Result<Update, HubError> {
        let _barrier = self.freeze.read().expect("freeze barrier poisoned");
        let tx = &iou.transaction;
        self.check_open_eon(tx.eon)?;

        // Receiver must exist before the sender is debited.
        let _ = self.account_entry(&tx.to, "unknown receiver")?;
        let entry = self.account_entry(&tx.from, "unknown sender")?;

        let h = tx_hash(tx);
        let signed = {
            let mut acct = entry.lock().expect("account entry poisoned");
            validate_sender_iou(&acct, iou, h)?;
            let signed = self.countersign(&iou.update);
            acct.txs.push(tx.clone());
            acct.tx_hashes.push(h);
            acct.update = signed.clone();
            signed
        };

        let steal_iou = self.flags().contains(&MaliciousFlag::StealTransactionIou);
        if !steal_iou {
            self.pending_recv
                .lock()
                .expect("pending transfers poisoned")
                .insert(tx.to, tx.clone());
        }

        self.metrics.transfers_total.inc();
        self.emit(HubEvent::NewUpdate {
            address: tx.from,
            update: signed.clone(),
        });
        if !steal_iou {
            self.emit(HubEvent::NewTx(tx.clone()));
        }
        Ok(signed)
    }

    /// Admit the receiver side of a previously sent transfer, completing the
    /// bilateral handshake.
    pub fn receive_new_transfer(&self, iou: &Iou) -> Result<Update, HubError> {
        let _barrier = self.freeze.read().expect("freeze barrier poisoned");
        let tx = &iou.transaction;
        self.check_open_eon(tx.eon)?;

        let h = tx_hash(tx);
        {
            let pending = self.pending_recv.lock().expect("pending transfers poisoned");
            match pending.get(&tx.to) {
                Some(p) if tx_hash(p) == h => {}
                _ => return Err(HubError::NotFound("no pending transfer")),
            }
        }

        let entry = self.account_entry(&tx.to, "unknown receiver")?;
        let signed = {
            let mut acct = entry.lock().expect("account entry poisoned");
            validate_receiver_iou(&acct, iou, h)?;
            let signed = self.countersign(&iou.update);
            acct.txs.push(tx.clone());
            acct.tx_hashes.push(h);
            acct.update = signed.clone();
            signed
        };

        self.pending_recv
            .lock()
            .expect("pending transfers poisoned")
            .remove(&tx.to);
        self.delivered
            .lock()
            .expect("delivered set poisoned")
            .push(h);

        self.emit(HubEvent::NewUpdate {
            address: tx.to,
            update: signed.clone(),
        });
        Ok(signed)
    }

    /// Pending incoming transfer for an address, if one awaits acceptance.
    pub fn query_new_transfer(&self, address: &Address) -> Option<OffchainTransaction> {
        self.pending_recv
            .lock()
            .expect("pending transfers poisoned")
            .get(address)
            .cloned()
    }

    // ---- withdrawals -------------------------------------------------------

    /// Admit a withdrawal backed by a membership proof into the latest
    /// committed root. The payout is submitted at eon close.
    pub fn initiate_withdrawal(
        &self,
        address: Address,
        amount: Amount,
        proof: &AmtProof,
    ) -> Result<(), HubError> {
        let _barrier = self.freeze.read().expect("freeze barrier poisoned");
        if amount == 0 {
            return Err(ValidationError::NonPositiveAmount.into());
        }

        let committed = self
            .latest_root()
            .ok_or(HubError::NotFound("no committed root"))?;
        let root = AmtRoot {
            hash: committed.root,
            allotment: committed.allotment,
        };
        if proof.leaf.address != address
            || proof.eon != committed.eon
            || !verify_proof(&root, proof)
        {
            return Err(ValidationError::MalformedProof.into());
        }
        if amount > proof.leaf.allotment {
            return Err(ValidationError::InsufficientBalance.into());
        }

        let entry = self.account_entry(&address, "unknown account")?;
        let steal = self.flags().contains(&MaliciousFlag::StealWithdrawal);
        let height = self.chain.get_block_number()?;
        {
            let mut acct = entry.lock().expect("account entry poisoned");
            if !steal {
                if amount > acct.balance() {
                    return Err(ValidationError::InsufficientBalance.into());
                }
                acct.withdraw = acct.withdraw.saturating_add(amount);
            }
            acct.withdrawals.push(PendingWithdrawal {
                amount,
                queued_height: height,
                serviced_height: None,
            });
        }

        self.metrics.withdrawals_total.inc();
        self.emit(HubEvent::NewWithdrawal { address, amount });
        Ok(())
    }

    // ---- eon driving -------------------------------------------------------

    /// Observe a new chain height; closes the eon at its boundary.
    ///
    /// A close that failed on an earlier height (ledger outage, store error)
    /// leaves the controller frozen; it is retried here before new heights
    /// are replayed, so a transient failure never stalls eon progression.
    pub fn on_block(&self, height: u64) -> Result<(), HubError> {
        self.metrics.block_height.set(height as i64);
        let pending = {
            let eon = self.eon.lock().expect("eon controller poisoned");
            (eon.phase() == EonPhase::Freeze).then(|| eon.current())
        };
        if let Some(span) = pending {
            self.close_eon(span, height)?;
        }
        let action = {
            let mut eon = self.eon.lock().expect("eon controller poisoned");
            eon.on_height(height)?
        };
        if let Some(EonAction::Freeze(span)) = action {
            self.close_eon(span, height)?;
            // Catch up on heights past the boundary without skipping an eon.
            self.on_block(height)?;
        }
        Ok(())
    }

    fn close_eon(&self, span: EonSpan, height: u64) -> Result<(), HubError> {
        // Global freeze: no account mutation may cross this boundary.
        let _barrier = self.freeze.write().expect("freeze barrier poisoned");
        let flags = self.flags();
        let steal_tx = flags.contains(&MaliciousFlag::StealTransaction);

        let accounts = self.accounts.read().expect("account table poisoned");
        let mut tree = AmTree::new(span.number);
        let mut snapshots: BTreeMap<Address, HubAccount> = BTreeMap::new();
        let mut charges: BTreeMap<Address, AccountCharges> = BTreeMap::new();
        let mut allotments: BTreeMap<Address, Amount> = BTreeMap::new();

        // Payouts first so on-chain charges for this eon are final. A payout
        // is marked serviced only once its submission succeeded, so a retried
        // close neither skips nor double-pays.
        for (address, entry) in accounts.iter() {
            let mut acct = entry.lock().expect("account entry poisoned");
            for i in 0..acct.withdrawals.len() {
                if acct.withdrawals[i].serviced_height.is_some() {
                    continue;
                }
                let amount = acct.withdrawals[i].amount;
                self.chain.submit_transaction(ChainTransaction::Withdrawal {
                    address: *address,
                    amount,
                })?;
                acct.withdrawals[i].serviced_height = Some(height);
                acct.paid_out = acct.paid_out.saturating_add(amount);
            }
        }

        for (address, entry) in accounts.iter() {
            let acct = entry.lock().expect("account entry poisoned");
            let allotment = if steal_tx {
                // Fraud path: pretend no transfer happened.
                acct.ledger_deposit().saturating_sub(acct.withdraw)
            } else {
                acct.balance()
            };
            tree.insert_or_update(*address, allotment);
            allotments.insert(*address, allotment);
            snapshots.insert(*address, acct.snapshot(allotment));
            charges.insert(
                *address,
                AccountCharges {
                    deposit: acct.opening.saturating_add(acct.deposits_chain),
                    withdraw: acct.paid_out,
                },
            );
        }

        let amt_root = tree.compute_root();
        let root = HubRoot {
            eon: span.number,
            root: amt_root.hash,
            allotment: amt_root.allotment,
            start_height: span.start_height,
            blocks_per_eon: self.cfg.blocks_per_eon,
        };

        // Durable hand-off: the root reaches both the ledger and the store
        // before the next eon opens. The commit is signed so the settlement
        // contract can attribute it to this hub key.
        let commit_sig = self.crypto.sign(&root_signing_bytes(
            root.eon,
            root.root,
            root.allotment,
            root.start_height,
        ));
        self.chain.submit_transaction(ChainTransaction::CommitRoot {
            root,
            signature: commit_sig,
        })?;

        // Cloned, not drained: the live set is cleared only once the close
        // has fully succeeded, so a retried close still sees it.
        let mut delivered_txs = self
            .delivered
            .lock()
            .expect("delivered set poisoned")
            .clone();
        if steal_tx {
            delivered_txs.clear();
        }
        let snapshot_vec: Vec<HubAccount> = snapshots.values().cloned().collect();
        self.store
            .put_closed_eon(&root, &snapshot_vec, &delivered_txs)?;

        {
            let mut history = self.history.write().expect("eon history poisoned");
            history.push_back(ClosedEon {
                root,
                tree,
                accounts: snapshots,
                charges,
                delivered_txs,
            });
            while history.len() > self.cfg.eon_retention {
                history.pop_front();
            }
        }

        // Roll every account into the next eon: the committed allotment is
        // the opening balance, updates restart at version 0.
        let next = {
            let mut eon = self.eon.lock().expect("eon controller poisoned");
            eon.root_committed()?
        };
        for (address, entry) in accounts.iter() {
            let mut acct = entry.lock().expect("account entry poisoned");
            let allotment = allotments.get(address).copied().unwrap_or(0);
            acct.eon = next.number;
            acct.opening = allotment;
            acct.deposits_chain = 0;
            acct.deposits_credited = 0;
            acct.withdraw = 0;
            acct.paid_out = 0;
            acct.update = Update::opening(next.number);
            acct.txs.clear();
            acct.tx_hashes.clear();
            acct.withdrawals.retain(|w| w.serviced_height.is_none());
            if acct.first_committed_height.is_none() {
                acct.first_committed_height = Some(height);
            }
        }
        self.pending_recv
            .lock()
            .expect("pending transfers poisoned")
            .clear();
        self.delivered.lock().expect("delivered set poisoned").clear();

        self.metrics.current_eon.set(next.number as i64);
        self.metrics.eons_closed_total.inc();
        info!(
            eon = root.eon,
            root = %root.root,
            allotment = root.allotment,
            next_eon = next.number,
            "eon closed, root committed"
        );
        self.emit(HubEvent::NewHubRoot(root));
        Ok(())
    }

    // ---- challenges --------------------------------------------------------

    fn with_closed_eon<T>(
        &self,
        eon: Option<u64>,
        f: impl FnOnce(&ClosedEon) -> T,
    ) -> Result<T, HubError> {
        let history = self.history.read().expect("eon history poisoned");
        let closed = match eon {
            Some(n) => history.iter().find(|c| c.root.eon == n),
            None => history.back(),
        };
        closed
            .map(f)
            .ok_or(HubError::NotFound("no closed eon at requested number"))
    }

    /// Adjudicate a balance-update challenge and hand the evidence to the
    /// ledger connector. Returns the evidence transaction hash.
    pub fn open_balance_update_challenge(
        &self,
        challenge: &BalanceUpdateChallenge,
    ) -> Result<H256, HubError> {
        let eon = challenge.proof.update.as_ref().map(|u| u.eon);
        let hub_pk = self.crypto.public_key();
        let verdict = self.with_closed_eon(eon, |closed| {
            let charges = closed
                .charges
                .get(&challenge.address)
                .copied()
                .unwrap_or(AccountCharges {
                    deposit: 0,
                    withdraw: 0,
                });
            // The hub's own record of the account's final countersigned
            // update refutes stale-update replays.
            let committed_update = closed.accounts.get(&challenge.address).map(|a| &a.update);
            verify_balance_update_challenge(
                challenge,
                &closed.root,
                &charges,
                committed_update,
                &hub_pk,
            )
        })?;
        self.resolve_challenge(eon, verdict, encode_canonical(challenge)?)
    }

    /// Adjudicate a transfer-delivery challenge. Returns the evidence
    /// transaction hash.
    pub fn open_transfer_delivery_challenge(
        &self,
        challenge: &TransferDeliveryChallenge,
    ) -> Result<H256, HubError> {
        let eon = Some(challenge.update.eon);
        let hub_pk = self.crypto.public_key();
        let verdict = self.with_closed_eon(eon, |closed| {
            verify_transfer_delivery_challenge(challenge, &closed.delivered_txs, &hub_pk)
        })?;
        self.resolve_challenge(eon, verdict, encode_canonical(challenge)?)
    }

    /// Adjudicate a do-nothing (timeout) challenge for an account's oldest
    /// unserviced action.
    pub fn verify_do_nothing(&self, address: &Address) -> Result<Verdict, HubError> {
        let entry = self.account_entry(address, "unknown account")?;
        let height = self.chain.get_block_number()?;
        let blocks_per_eon = self.cfg.blocks_per_eon;

        let acct = entry.lock().expect("account entry poisoned");
        let mut pending: Vec<(u64, Option<u64>)> =
            vec![(acct.registered_height, acct.first_committed_height)];
        for w in acct.withdrawals.iter() {
            pending.push((w.queued_height, w.serviced_height));
        }
        drop(acct);

        let mut verdict = Verdict::ChallengerAtFault;
        for (queued, serviced) in pending {
            match verify_do_nothing_challenge(queued, serviced, height, blocks_per_eon) {
                Verdict::HubAtFault => return Ok(Verdict::HubAtFault),
                Verdict::Inconclusive => verdict = Verdict::Inconclusive,
                Verdict::ChallengerAtFault => {}
            }
        }
        Ok(verdict)
    }

    fn resolve_challenge(
        &self,
        eon: Option<u64>,
        verdict: Verdict,
        evidence: Vec<u8>,
    ) -> Result<H256, HubError> {
        let eon = match eon {
            Some(n) => n,
            None => self.with_closed_eon(None, |c| c.root.eon)?,
        };
        self.metrics.challenges_total.inc();
        let hub_at_fault = verdict == Verdict::HubAtFault;
        if hub_at_fault {
            self.metrics.hub_at_fault_total.inc();
            error!(eon, "challenge verdict: hub at fault; submitting evidence");
        } else {
            info!(eon, ?verdict, "challenge adjudicated");
        }
        let tx = self
            .chain
            .submit_transaction(ChainTransaction::ChallengeEvidence { eon, evidence })?;
        self.emit(HubEvent::ChallengeResolved { eon, hub_at_fault });
        Ok(tx)
    }

    // ---- queries & watchers ------------------------------------------------

    /// Latest committed root, if any eon has closed.
    pub fn latest_root(&self) -> Option<HubRoot> {
        self.history
            .read()
            .expect("eon history poisoned")
            .back()
            .map(|c| c.root)
    }

    /// Current eon span and phase.
    pub fn current_eon(&self) -> (EonSpan, EonPhase) {
        self.current_span()
    }

    /// Readiness snapshot.
    pub fn hub_info(&self) -> HubInfo {
        let (span, _) = self.current_span();
        HubInfo {
            ready: true,
            eon: span.number,
            blocks_per_eon: self.cfg.blocks_per_eon,
            root: self.latest_root(),
        }
    }

    /// Account record: live state for the current eon, or the retained
    /// snapshot of a closed eon.
    pub fn get_hub_account(
        &self,
        address: &Address,
        eon: Option<u64>,
    ) -> Result<HubAccount, HubError> {
        let (span, _) = self.current_span();
        match eon {
            None => {
                let entry = self.account_entry(address, "unknown account")?;
                let acct = entry.lock().expect("account entry poisoned");
                Ok(acct.snapshot(0))
            }
            Some(n) if n == span.number => {
                let entry = self.account_entry(address, "unknown account")?;
                let acct = entry.lock().expect("account entry poisoned");
                Ok(acct.snapshot(0))
            }
            Some(n) => {
                // In-memory history first, durable store as fallback.
                let from_history = self
                    .with_closed_eon(Some(n), |c| c.accounts.get(address).cloned())
                    .ok()
                    .flatten();
                if let Some(a) = from_history {
                    return Ok(a);
                }
                self.store
                    .get_account(n, address)?
                    .ok_or(HubError::NotFound("no account snapshot at requested eon"))
            }
        }
    }

    /// Membership proof for an address against a closed eon's committed tree
    /// (latest closed eon when `eon` is `None`).
    pub fn get_proof(&self, address: &Address, eon: Option<u64>) -> Result<AmtProof, HubError> {
        self.with_closed_eon(eon, |c| c.tree.membership_proof(address))?
            .map_err(HubError::from)
    }

    /// Watch all events scoped to one address.
    pub fn watch_address(&self, address: Address) -> Subscription {
        let sub = self.events.subscribe(WatchFilter::Address(address));
        self.metrics.watchers.set(self.events.watcher_count() as i64);
        sub
    }

    /// Watch events matching an arbitrary predicate.
    pub fn watch_filter(
        &self,
        predicate: impl Fn(&HubEvent) -> bool + Send + Sync + 'static,
    ) -> Subscription {
        let sub = self
            .events
            .subscribe(WatchFilter::Predicate(Arc::new(predicate)));
        self.metrics.watchers.set(self.events.watcher_count() as i64);
        sub
    }

    /// Watch root commitments: exactly one event per eon, monotonically
    /// increasing in eon number.
    pub fn watch_hub_root(&self) -> Subscription {
        let sub = self.events.subscribe(WatchFilter::HubRoot);
        self.metrics.watchers.set(self.events.watcher_count() as i64);
        sub
    }

    /// Release a subscription; stops further delivery.
    pub fn unsubscribe(&self, id: u64) {
        self.events.unsubscribe(id);
        self.metrics.watchers.set(self.events.watcher_count() as i64);
    }
}

/// Sender-side IOU validation, in the fixed policy order; each failure is a
/// hard rejection with no state mutated.
fn validate_sender_iou(
    acct: &AccountState,
    iou: &Iou,
    h: H256,
) -> Result<(), ValidationError> {
    let tx = &iou.transaction;
    let u = &iou.update;

    // (a) positive amount
    if tx.amount == 0 {
        return Err(ValidationError::NonPositiveAmount);
    }
    // (b) sender signatures over transaction and update payloads
    let tx_ok = tx.signature.as_ref().is_some_and(|s| {
        s.signer == acct.participant.public_key
            && verify_by(&tx_signing_bytes(tx), s, &acct.participant.public_key).is_ok()
    });
    let upd_ok = u.owner_signature.as_ref().is_some_and(|s| {
        verify_by(&update_signing_bytes(u), s, &acct.participant.public_key).is_ok()
    });
    if !tx_ok || !upd_ok {
        return Err(ValidationError::BadSignature);
    }
    // Idempotence: an already-admitted transaction is never double-applied.
    if acct.tx_hashes.contains(&h) {
        return Err(ValidationError::DuplicateTransaction);
    }
    // (c) claimed prior state must match the hub's last countersigned update
    let cur = &acct.update;
    let expected_send = cur
        .send_amount
        .checked_add(tx.amount)
        .ok_or(ValidationError::StaleUpdate)?;
    let mut hashes = acct.tx_hashes.clone();
    hashes.push(h);
    if u.eon != cur.eon
        || u.send_amount != expected_send
        || u.receive_amount != cur.receive_amount
        || u.tx_root != tx_set_root(&hashes)
    {
        return Err(ValidationError::StaleUpdate);
    }
    // (d) version must advance by exactly one
    if u.version != cur.version + 1 {
        return Err(ValidationError::BadVersion);
    }
    // (e) resulting balance must be non-negative
    if tx.amount > acct.balance() {
        return Err(ValidationError::InsufficientBalance);
    }
    Ok(())
}

/// Receiver-side IOU validation mirroring the sender policy.
fn validate_receiver_iou(
    acct: &AccountState,
    iou: &Iou,
    h: H256,
) -> Result<(), ValidationError> {
    let tx = &iou.transaction;
    let u = &iou.update;

    if tx.amount == 0 {
        return Err(ValidationError::NonPositiveAmount);
    }
    let upd_ok = u.owner_signature.as_ref().is_some_and(|s| {
        verify_by(&update_signing_bytes(u), s, &acct.participant.public_key).is_ok()
    });
    if !upd_ok {
        return Err(ValidationError::BadSignature);
    }
    if acct.tx_hashes.contains(&h) {
        return Err(ValidationError::DuplicateTransaction);
    }
    let cur = &acct.update;
    let expected_recv = cur
        .receive_amount
        .checked_add(tx.amount)
        .ok_or(ValidationError::StaleUpdate)?;
    let mut hashes = acct.tx_hashes.clone();
    hashes.push(h);
    if u.eon != cur.eon
        || u.receive_amount != expected_recv
        || u.send_amount != cur.send_amount
        || u.tx_root != tx_set_root(&hashes)
    {
        return Err(ValidationError::StaleUpdate);
    }
    if u.version != cur.version + 1 {
        return Err(ValidationError::BadVersion);
    }
    Ok(())
}
