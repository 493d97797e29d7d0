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

use std::sync::Arc;

use eonhub::chain::{ChainConnector, ChainError, ChainTransaction, InMemoryChain};
use eonhub::core::amt::proof::verify_proof;
use eonhub::core::amt::proof::AmtRoot;
use eonhub::core::amt::txset::tx_set_root;
use eonhub::core::crypto::service::{verify_by, CryptoService};
use eonhub::core::crypto::signing::{
    root_signing_bytes, tx_hash, tx_signing_bytes, update_signing_bytes,
};
use eonhub::core::state::store::HubStore;
use eonhub::core::types::{
    Address, Amount, H256, HubConfig, HubEvent, Iou, OffchainTransaction, Participant, Update,
    ValidationError,
};
use eonhub::hub::{Hub, HubError};
use eonhub::monitoring::metrics::Metrics;

const BLOCKS_PER_EON: u64 = 4;

struct Client {
    crypto: CryptoService,
    participant: Participant,
    /// Client-side view of admitted transaction hashes this eon.
    tx_hashes: Vec<H256>,
}

fn client() -> Client {
    let crypto = CryptoService::generate().unwrap();
    let participant = Participant {
        address: crypto.address(),
        public_key: crypto.public_key(),
    };
    Client {
        crypto,
        participant,
        tx_hashes: Vec::new(),
    }
}

fn test_hub() -> (Arc<Hub<InMemoryChain>>, Arc<InMemoryChain>) {
    let cfg = HubConfig {
        blocks_per_eon: BLOCKS_PER_EON,
        ..HubConfig::default()
    };
    let chain = Arc::new(InMemoryChain::new());
    let hub = Hub::new(
        cfg,
        CryptoService::generate().unwrap(),
        Arc::clone(&chain),
        HubStore::open_temporary().unwrap(),
        Arc::new(Metrics::new().unwrap()),
    )
    .unwrap();
    (Arc::new(hub), chain)
}

fn register<C: ChainConnector>(hub: &Hub<C>, c: &Client, eon: u64) -> Update {
    let mut u = Update::opening(eon);
    u.owner_signature = Some(c.crypto.sign(&update_signing_bytes(&u)));
    hub.register_participant(c.participant.clone(), u).unwrap()
}

/// Sender-side IOU: signed transfer plus the next owner-signed update.
fn send_iou(c: &Client, prev: &Update, to: Address, amount: Amount, nonce: u64) -> Iou {
    let mut tx = OffchainTransaction {
        eon: prev.eon,
        from: c.participant.address,
        to,
        amount,
        nonce,
        signature: None,
    };
    tx.signature = Some(c.crypto.sign(&tx_signing_bytes(&tx)));

    let mut hashes = c.tx_hashes.clone();
    hashes.push(tx_hash(&tx));
    let mut u = Update {
        eon: prev.eon,
        version: prev.version + 1,
        send_amount: prev.send_amount + amount,
        receive_amount: prev.receive_amount,
        tx_root: tx_set_root(&hashes),
        owner_signature: None,
        hub_signature: None,
    };
    u.owner_signature = Some(c.crypto.sign(&update_signing_bytes(&u)));
    Iou {
        transaction: tx,
        update: u,
    }
}

/// Receiver-side IOU acknowledging a pending transfer.
fn recv_iou(c: &Client, prev: &Update, tx: &OffchainTransaction) -> Iou {
    let mut hashes = c.tx_hashes.clone();
    hashes.push(tx_hash(tx));
    let mut u = Update {
        eon: prev.eon,
        version: prev.version + 1,
        send_amount: prev.send_amount,
        receive_amount: prev.receive_amount + tx.amount,
        tx_root: tx_set_root(&hashes),
        owner_signature: None,
        hub_signature: None,
    };
    u.owner_signature = Some(c.crypto.sign(&update_signing_bytes(&u)));
    Iou {
        transaction: tx.clone(),
        update: u,
    }
}

fn close_eon(hub: &Hub<InMemoryChain>, chain: &InMemoryChain) {
    chain.produce_blocks(BLOCKS_PER_EON);
    let h = chain.get_block_number().unwrap();
    hub.on_block(h).unwrap();
}

#[test]
fn deposit_credits_balance_and_emits_event() {
    let (hub, _chain) = test_hub();
    let a = client();
    register(&hub, &a, 0);

    let mut watch = hub.watch_address(a.participant.address);
    hub.on_deposit(a.participant.address, 100, H256::ZERO).unwrap();

    let acct = hub.get_hub_account(&a.participant.address, None).unwrap();
    assert_eq!(acct.balance(), 100);
    assert!(matches!(
        watch.try_recv(),
        Some(HubEvent::NewDeposit { amount: 100, .. })
    ));
}

#[test]
fn duplicate_registration_rejected() {
    let (hub, _chain) = test_hub();
    let a = client();
    register(&hub, &a, 0);

    let mut u = Update::opening(0);
    u.owner_signature = Some(a.crypto.sign(&update_signing_bytes(&u)));
    let err = hub.register_participant(a.participant.clone(), u).unwrap_err();
    assert!(matches!(
        err,
        HubError::Validation(ValidationError::AlreadyRegistered)
    ));
}

#[test]
fn transfer_moves_balance_then_allotments_follow_at_close() {
    let (hub, chain) = test_hub();
    let mut a = client();
    let mut b = client();
    let a_open = register(&hub, &a, 0);
    let b_open = register(&hub, &b, 0);
    hub.on_deposit(a.participant.address, 100, H256::ZERO).unwrap();

    let iou = send_iou(&a, &a_open, b.participant.address, 10, 1);
    let a_upd = hub.send_new_transfer(&iou).unwrap();
    a.tx_hashes.push(tx_hash(&iou.transaction));
    assert!(a_upd.is_signed_by_hub());
    assert_eq!(a_upd.send_amount, 10);

    // Receiver sees the pending transfer and countersigns it.
    let pending = hub.query_new_transfer(&b.participant.address).unwrap();
    assert_eq!(tx_hash(&pending), tx_hash(&iou.transaction));
    let ack = recv_iou(&b, &b_open, &pending);
    let b_upd = hub.receive_new_transfer(&ack).unwrap();
    b.tx_hashes.push(tx_hash(&pending));
    assert_eq!(b_upd.receive_amount, 10);

    assert_eq!(
        hub.get_hub_account(&a.participant.address, None).unwrap().balance(),
        90
    );
    assert_eq!(
        hub.get_hub_account(&b.participant.address, None).unwrap().balance(),
        10
    );

    close_eon(&hub, &chain);

    let root = hub.latest_root().unwrap();
    assert_eq!(root.eon, 0);
    assert_eq!(root.allotment, 100);

    let pa = hub.get_proof(&a.participant.address, None).unwrap();
    let pb = hub.get_proof(&b.participant.address, None).unwrap();
    assert_eq!(pa.leaf.allotment, 90);
    assert_eq!(pb.leaf.allotment, 10);
    let amt_root = AmtRoot {
        hash: root.root,
        allotment: root.allotment,
    };
    assert!(verify_proof(&amt_root, &pa));
    assert!(verify_proof(&amt_root, &pb));
}

#[test]
fn duplicate_iou_is_rejected_not_reapplied() {
    let (hub, _chain) = test_hub();
    let a = client();
    let b = client();
    let a_open = register(&hub, &a, 0);
    register(&hub, &b, 0);
    hub.on_deposit(a.participant.address, 100, H256::ZERO).unwrap();

    let iou = send_iou(&a, &a_open, b.participant.address, 10, 1);
    hub.send_new_transfer(&iou).unwrap();
    let err = hub.send_new_transfer(&iou).unwrap_err();
    assert!(matches!(
        err,
        HubError::Validation(ValidationError::DuplicateTransaction)
    ));
    assert_eq!(
        hub.get_hub_account(&a.participant.address, None).unwrap().balance(),
        90
    );
}

#[test]
fn version_must_advance_by_exactly_one() {
    let (hub, _chain) = test_hub();
    let a = client();
    let b = client();
    let a_open = register(&hub, &a, 0);
    register(&hub, &b, 0);
    hub.on_deposit(a.participant.address, 100, H256::ZERO).unwrap();

    let mut iou = send_iou(&a, &a_open, b.participant.address, 10, 1);
    iou.update.version = 5;
    iou.update.owner_signature =
        Some(a.crypto.sign(&update_signing_bytes(&iou.update)));
    let err = hub.send_new_transfer(&iou).unwrap_err();
    assert!(matches!(
        err,
        HubError::Validation(ValidationError::BadVersion)
    ));
}

#[test]
fn stale_update_rejected() {
    let (hub, _chain) = test_hub();
    let a = client();
    let b = client();
    let a_open = register(&hub, &a, 0);
    register(&hub, &b, 0);
    hub.on_deposit(a.participant.address, 100, H256::ZERO).unwrap();

    // Claimed cumulative send does not include this transfer.
    let mut iou = send_iou(&a, &a_open, b.participant.address, 10, 1);
    iou.update.send_amount = 0;
    iou.update.owner_signature =
        Some(a.crypto.sign(&update_signing_bytes(&iou.update)));
    let err = hub.send_new_transfer(&iou).unwrap_err();
    assert!(matches!(
        err,
        HubError::Validation(ValidationError::StaleUpdate)
    ));
}

#[test]
fn overdraft_rejected() {
    let (hub, _chain) = test_hub();
    let a = client();
    let b = client();
    let a_open = register(&hub, &a, 0);
    register(&hub, &b, 0);
    hub.on_deposit(a.participant.address, 10, H256::ZERO).unwrap();

    let iou = send_iou(&a, &a_open, b.participant.address, 20, 1);
    let err = hub.send_new_transfer(&iou).unwrap_err();
    assert!(matches!(
        err,
        HubError::Validation(ValidationError::InsufficientBalance)
    ));
}

#[test]
fn wrong_eon_rejected() {
    let (hub, _chain) = test_hub();
    let a = client();
    let b = client();
    let a_open = register(&hub, &a, 0);
    register(&hub, &b, 0);
    hub.on_deposit(a.participant.address, 100, H256::ZERO).unwrap();

    let mut future = a_open.clone();
    future.eon = 7;
    let iou = send_iou(&a, &future, b.participant.address, 10, 1);
    let err = hub.send_new_transfer(&iou).unwrap_err();
    assert!(matches!(
        err,
        HubError::Validation(ValidationError::WrongEon)
    ));
}

#[test]
fn unknown_receiver_rejected() {
    let (hub, _chain) = test_hub();
    let a = client();
    let ghost = client();
    let a_open = register(&hub, &a, 0);
    hub.on_deposit(a.participant.address, 100, H256::ZERO).unwrap();

    let iou = send_iou(&a, &a_open, ghost.participant.address, 10, 1);
    let err = hub.send_new_transfer(&iou).unwrap_err();
    assert!(matches!(err, HubError::NotFound(_)));
}

#[test]
fn withdrawal_pays_out_at_eon_close() {
    let (hub, chain) = test_hub();
    let a = client();
    register(&hub, &a, 0);
    hub.on_deposit(a.participant.address, 100, H256::ZERO).unwrap();

    close_eon(&hub, &chain);
    let proof = hub.get_proof(&a.participant.address, None).unwrap();
    assert_eq!(proof.leaf.allotment, 100);

    hub.initiate_withdrawal(a.participant.address, 40, &proof).unwrap();
    assert_eq!(
        hub.get_hub_account(&a.participant.address, None).unwrap().balance(),
        60
    );

    close_eon(&hub, &chain);
    let paid = chain
        .submitted()
        .into_iter()
        .any(|(_, tx)| {
            matches!(
                tx,
                ChainTransaction::Withdrawal { address, amount }
                    if address == a.participant.address && amount == 40
            )
        });
    assert!(paid);
    assert_eq!(chain.get_balance(&a.participant.address).unwrap(), 40);

    // Next eon carries the post-withdrawal allotment.
    let proof = hub.get_proof(&a.participant.address, None).unwrap();
    assert_eq!(proof.leaf.allotment, 60);
}

#[test]
fn withdrawal_exceeding_allotment_rejected() {
    let (hub, chain) = test_hub();
    let a = client();
    register(&hub, &a, 0);
    hub.on_deposit(a.participant.address, 100, H256::ZERO).unwrap();
    close_eon(&hub, &chain);

    let proof = hub.get_proof(&a.participant.address, None).unwrap();
    let err = hub
        .initiate_withdrawal(a.participant.address, 101, &proof)
        .unwrap_err();
    assert!(matches!(
        err,
        HubError::Validation(ValidationError::InsufficientBalance)
    ));
}

#[test]
fn one_root_event_per_eon_with_monotonic_numbers() {
    let (hub, chain) = test_hub();
    let a = client();
    register(&hub, &a, 0);
    hub.on_deposit(a.participant.address, 5, H256::ZERO).unwrap();

    let mut watch = hub.watch_hub_root();
    close_eon(&hub, &chain);
    close_eon(&hub, &chain);
    close_eon(&hub, &chain);

    let mut eons = Vec::new();
    while let Some(ev) = watch.try_recv() {
        match ev {
            HubEvent::NewHubRoot(root) => eons.push(root.eon),
            other => panic!("unexpected event on root watch: {other:?}"),
        }
    }
    assert_eq!(eons, vec![0, 1, 2]);

    // The chain saw exactly one commit per eon as well.
    for eon in 0..=2 {
        assert!(chain.query_hub_commit(eon).unwrap().is_some());
    }
}

#[test]
fn updates_restart_at_version_zero_after_rollover() {
    let (hub, chain) = test_hub();
    let a = client();
    register(&hub, &a, 0);
    hub.on_deposit(a.participant.address, 100, H256::ZERO).unwrap();
    close_eon(&hub, &chain);

    let acct = hub.get_hub_account(&a.participant.address, None).unwrap();
    assert_eq!(acct.eon, 1);
    assert_eq!(acct.update.version, 0);
    assert_eq!(acct.update.send_amount, 0);
    assert_eq!(acct.update.receive_amount, 0);
    // Committed allotment carried over as the opening balance.
    assert_eq!(acct.balance(), 100);
}

/// Connector that rejects a set number of root commitments, then heals.
struct FlakyChain {
    inner: InMemoryChain,
    commit_failures_left: std::sync::atomic::AtomicUsize,
}

impl ChainConnector for FlakyChain {
    fn get_balance(&self, address: &Address) -> Result<Amount, ChainError> {
        self.inner.get_balance(address)
    }

    fn submit_transaction(&self, tx: ChainTransaction) -> Result<H256, ChainError> {
        use std::sync::atomic::Ordering;
        if matches!(tx, ChainTransaction::CommitRoot { .. }) {
            let left = self.commit_failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.commit_failures_left.store(left - 1, Ordering::SeqCst);
                return Err(ChainError::Io);
            }
        }
        self.inner.submit_transaction(tx)
    }

    fn get_block_number(&self) -> Result<u64, ChainError> {
        self.inner.get_block_number()
    }

    fn watch_blocks(&self) -> tokio::sync::mpsc::Receiver<u64> {
        self.inner.watch_blocks()
    }

    fn query_hub_commit(&self, eon: u64) -> Result<Option<eonhub::core::types::HubRoot>, ChainError> {
        self.inner.query_hub_commit(eon)
    }
}

#[test]
fn transient_commit_failure_recovers_on_later_blocks() {
    let cfg = HubConfig {
        blocks_per_eon: BLOCKS_PER_EON,
        ..HubConfig::default()
    };
    let chain = Arc::new(FlakyChain {
        inner: InMemoryChain::new(),
        commit_failures_left: std::sync::atomic::AtomicUsize::new(1),
    });
    let hub = Hub::new(
        cfg,
        CryptoService::generate().unwrap(),
        Arc::clone(&chain),
        HubStore::open_temporary().unwrap(),
        Arc::new(Metrics::new().unwrap()),
    )
    .unwrap();

    let a = client();
    register(&hub, &a, 0);
    hub.on_deposit(a.participant.address, 100, H256::ZERO).unwrap();

    // The first boundary observation fails at the ledger and no root lands.
    chain.inner.produce_blocks(BLOCKS_PER_EON);
    assert!(hub.on_block(BLOCKS_PER_EON).is_err());
    assert!(hub.latest_root().is_none());

    // The next block retries the frozen close and commits eon 0.
    chain.inner.produce_blocks(1);
    hub.on_block(BLOCKS_PER_EON + 1).unwrap();
    assert_eq!(hub.latest_root().unwrap().eon, 0);
    assert!(chain.inner.query_hub_commit(0).unwrap().is_some());

    // Progression continues normally afterwards.
    chain.inner.produce_blocks(BLOCKS_PER_EON);
    hub.on_block(2 * BLOCKS_PER_EON + 1).unwrap();
    assert_eq!(hub.latest_root().unwrap().eon, 1);
    assert!(chain.inner.query_hub_commit(1).unwrap().is_some());
}

#[test]
fn root_commitments_are_signed_by_the_hub_key() {
    let (hub, chain) = test_hub();
    let a = client();
    register(&hub, &a, 0);
    hub.on_deposit(a.participant.address, 100, H256::ZERO).unwrap();
    close_eon(&hub, &chain);

    let (root, sig) = chain
        .submitted()
        .into_iter()
        .find_map(|(_, tx)| match tx {
            ChainTransaction::CommitRoot { root, signature } => Some((root, signature)),
            _ => None,
        })
        .unwrap();
    let payload = root_signing_bytes(root.eon, root.root, root.allotment, root.start_height);
    assert!(verify_by(&payload, &sig, &hub.public_key()).is_ok());
}

#[test]
fn restart_resumes_from_persisted_root() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state").to_str().unwrap().to_string();
    let cfg = HubConfig {
        blocks_per_eon: BLOCKS_PER_EON,
        ..HubConfig::default()
    };

    let a = client();
    {
        let chain = Arc::new(InMemoryChain::new());
        let hub = Hub::new(
            cfg.clone(),
            CryptoService::generate().unwrap(),
            Arc::clone(&chain),
            HubStore::open(&path).unwrap(),
            Arc::new(Metrics::new().unwrap()),
        )
        .unwrap();
        register(&hub, &a, 0);
        hub.on_deposit(a.participant.address, 100, H256::ZERO).unwrap();
        close_eon(&hub, &chain);
        assert_eq!(hub.latest_root().unwrap().eon, 0);
    }

    // A fresh process over the same store resumes past the committed eon.
    let chain = Arc::new(InMemoryChain::new());
    let hub = Hub::new(
        cfg,
        CryptoService::generate().unwrap(),
        Arc::clone(&chain),
        HubStore::open(&path).unwrap(),
        Arc::new(Metrics::new().unwrap()),
    )
    .unwrap();

    assert_eq!(hub.latest_root().unwrap().eon, 0);
    let (span, _) = hub.current_eon();
    assert_eq!(span.number, 1);

    // Proof-backed withdrawal works without waiting for a fresh close, and
    // the committed allotment carried over as the opening balance.
    let proof = hub.get_proof(&a.participant.address, None).unwrap();
    assert_eq!(proof.leaf.allotment, 100);
    hub.initiate_withdrawal(a.participant.address, 40, &proof).unwrap();
    assert_eq!(
        hub.get_hub_account(&a.participant.address, None).unwrap().balance(),
        60
    );
}

#[test]
fn slow_watcher_gets_overflow_marker_and_is_dropped() {
    let cfg = HubConfig {
        blocks_per_eon: BLOCKS_PER_EON,
        watcher_queue_depth: 2,
        ..HubConfig::default()
    };
    let chain = Arc::new(InMemoryChain::new());
    let hub = Hub::new(
        cfg,
        CryptoService::generate().unwrap(),
        Arc::clone(&chain),
        HubStore::open_temporary().unwrap(),
        Arc::new(Metrics::new().unwrap()),
    )
    .unwrap();

    let a = client();
    register(&hub, &a, 0);
    let mut watch = hub.watch_address(a.participant.address);

    // Depth 2 keeps one slot in reserve: the second undrained event can only
    // be the overflow marker.
    hub.on_deposit(a.participant.address, 1, H256::ZERO).unwrap();
    hub.on_deposit(a.participant.address, 2, H256::ZERO).unwrap();

    assert!(matches!(
        watch.try_recv(),
        Some(HubEvent::NewDeposit { amount: 1, .. })
    ));
    assert!(matches!(watch.try_recv(), Some(HubEvent::WatcherOverflow)));
    assert!(watch.try_recv().is_none());
}
