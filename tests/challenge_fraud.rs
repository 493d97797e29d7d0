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

//! End-to-end fraud scenarios: a fault-injected hub misbehaves, a client
//! challenges with the evidence it holds, and the engine convicts the hub.

use std::sync::Arc;

use eonhub::chain::{ChainConnector, ChainTransaction, InMemoryChain};
use eonhub::core::amt::txset::{tx_membership_proof, tx_set_root};
use eonhub::core::challenge::{
    verify_balance_update_challenge, verify_do_nothing_challenge, AccountCharges,
    BalanceUpdateChallenge, BalanceUpdateProof, TransferDeliveryChallenge, Verdict,
};
use eonhub::core::crypto::service::CryptoService;
use eonhub::core::crypto::signing::{tx_hash, tx_signing_bytes, update_signing_bytes};
use eonhub::core::state::store::HubStore;
use eonhub::core::types::{
    Address, Amount, H256, HubConfig, HubEvent, Iou, OffchainTransaction, Participant, Update,
};
use eonhub::hub::{Hub, MaliciousFlag};
use eonhub::monitoring::metrics::Metrics;

const BLOCKS_PER_EON: u64 = 4;

struct Client {
    crypto: CryptoService,
    participant: Participant,
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

fn register(hub: &Hub<InMemoryChain>, c: &Client, eon: u64) -> Update {
    let mut u = Update::opening(eon);
    u.owner_signature = Some(c.crypto.sign(&update_signing_bytes(&u)));
    hub.register_participant(c.participant.clone(), u).unwrap()
}

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

fn challenge_events(hub: &Hub<InMemoryChain>) -> eonhub::hub::events::Subscription {
    hub.watch_filter(|e| matches!(e, HubEvent::ChallengeResolved { .. }))
}

fn evidence_submitted(chain: &InMemoryChain, eon: u64) -> bool {
    chain.submitted().into_iter().any(|(_, tx)| {
        matches!(tx, ChainTransaction::ChallengeEvidence { eon: e, .. } if e == eon)
    })
}

#[test]
fn stolen_deposit_is_convicted_by_balance_challenge() {
    let (hub, chain) = test_hub();
    let a = client();
    let signed_open = register(&hub, &a, 0);

    hub.set_malicious_flags(&[MaliciousFlag::StealDeposit]);
    hub.on_deposit(a.participant.address, 100, H256::ZERO).unwrap();
    close_eon(&hub, &chain);

    // The chain saw a 100 deposit; the committed leaf says 0.
    let path = hub.get_proof(&a.participant.address, Some(0)).unwrap();
    assert_eq!(path.leaf.allotment, 0);

    let mut watch = challenge_events(&hub);
    let challenge = BalanceUpdateChallenge {
        address: a.participant.address,
        proof: BalanceUpdateProof {
            update: Some(signed_open),
            path: Some(path),
        },
        owner_public_key: a.participant.public_key,
    };
    hub.open_balance_update_challenge(&challenge).unwrap();

    assert!(matches!(
        watch.try_recv(),
        Some(HubEvent::ChallengeResolved {
            eon: 0,
            hub_at_fault: true
        })
    ));
    assert!(evidence_submitted(&chain, 0));
}

#[test]
fn honest_commitment_refutes_balance_challenge() {
    let (hub, chain) = test_hub();
    let a = client();
    let signed_open = register(&hub, &a, 0);
    hub.on_deposit(a.participant.address, 100, H256::ZERO).unwrap();
    close_eon(&hub, &chain);

    let path = hub.get_proof(&a.participant.address, Some(0)).unwrap();
    assert_eq!(path.leaf.allotment, 100);

    let mut watch = challenge_events(&hub);
    let challenge = BalanceUpdateChallenge {
        address: a.participant.address,
        proof: BalanceUpdateProof {
            update: Some(signed_open),
            path: Some(path),
        },
        owner_public_key: a.participant.public_key,
    };
    hub.open_balance_update_challenge(&challenge).unwrap();

    assert!(matches!(
        watch.try_recv(),
        Some(HubEvent::ChallengeResolved {
            eon: 0,
            hub_at_fault: false
        })
    ));
}

#[test]
fn stolen_withdrawal_is_convicted_by_balance_challenge() {
    let (hub, chain) = test_hub();
    let mut a = client();
    let b = client();
    register(&hub, &a, 0);
    register(&hub, &b, 0);
    hub.on_deposit(a.participant.address, 100, H256::ZERO).unwrap();
    close_eon(&hub, &chain);

    // Eon 1: a countersigned transfer gives the client binding evidence.
    let iou = send_iou(&a, &Update::opening(1), b.participant.address, 10, 1);
    let a_upd = hub.send_new_transfer(&iou).unwrap();
    a.tx_hashes.push(tx_hash(&iou.transaction));

    let eon0_proof = hub.get_proof(&a.participant.address, Some(0)).unwrap();
    hub.set_malicious_flags(&[MaliciousFlag::StealWithdrawal]);
    hub.initiate_withdrawal(a.participant.address, 50, &eon0_proof).unwrap();

    close_eon(&hub, &chain);

    // 50 was paid out on-chain but never debited off-chain: the committed
    // allotment (90) exceeds what the countersigned update implies (40).
    let path = hub.get_proof(&a.participant.address, Some(1)).unwrap();
    assert_eq!(path.leaf.allotment, 90);

    let mut watch = challenge_events(&hub);
    let challenge = BalanceUpdateChallenge {
        address: a.participant.address,
        proof: BalanceUpdateProof {
            update: Some(a_upd),
            path: Some(path),
        },
        owner_public_key: a.participant.public_key,
    };
    hub.open_balance_update_challenge(&challenge).unwrap();

    assert!(matches!(
        watch.try_recv(),
        Some(HubEvent::ChallengeResolved {
            eon: 1,
            hub_at_fault: true
        })
    ));
    assert!(evidence_submitted(&chain, 1));
}

#[test]
fn dropped_transfer_is_convicted_by_delivery_challenge() {
    let (hub, chain) = test_hub();
    let a = client();
    let b = client();
    let a_open = register(&hub, &a, 0);
    let b_open = register(&hub, &b, 0);
    hub.on_deposit(a.participant.address, 100, H256::ZERO).unwrap();

    let iou = send_iou(&a, &a_open, b.participant.address, 10, 1);
    let a_upd = hub.send_new_transfer(&iou).unwrap();
    let h = tx_hash(&iou.transaction);
    let ack = recv_iou(&b, &b_open, &iou.transaction);
    hub.receive_new_transfer(&ack).unwrap();

    // The commitment pretends the transfer never happened.
    hub.set_malicious_flags(&[MaliciousFlag::StealTransaction]);
    close_eon(&hub, &chain);
    assert_eq!(
        hub.get_proof(&a.participant.address, Some(0)).unwrap().leaf.allotment,
        100
    );

    let mut watch = challenge_events(&hub);
    let challenge = TransferDeliveryChallenge {
        update: a_upd,
        transaction: iou.transaction.clone(),
        path: tx_membership_proof(&[h], 0).unwrap(),
    };
    hub.open_transfer_delivery_challenge(&challenge).unwrap();

    assert!(matches!(
        watch.try_recv(),
        Some(HubEvent::ChallengeResolved {
            eon: 0,
            hub_at_fault: true
        })
    ));
    assert!(evidence_submitted(&chain, 0));
}

#[test]
fn delivered_transfer_refutes_delivery_challenge() {
    let (hub, chain) = test_hub();
    let a = client();
    let b = client();
    let a_open = register(&hub, &a, 0);
    let b_open = register(&hub, &b, 0);
    hub.on_deposit(a.participant.address, 100, H256::ZERO).unwrap();

    let iou = send_iou(&a, &a_open, b.participant.address, 10, 1);
    let a_upd = hub.send_new_transfer(&iou).unwrap();
    let h = tx_hash(&iou.transaction);
    let ack = recv_iou(&b, &b_open, &iou.transaction);
    hub.receive_new_transfer(&ack).unwrap();
    close_eon(&hub, &chain);

    let mut watch = challenge_events(&hub);
    let challenge = TransferDeliveryChallenge {
        update: a_upd,
        transaction: iou.transaction.clone(),
        path: tx_membership_proof(&[h], 0).unwrap(),
    };
    hub.open_transfer_delivery_challenge(&challenge).unwrap();

    assert!(matches!(
        watch.try_recv(),
        Some(HubEvent::ChallengeResolved {
            eon: 0,
            hub_at_fault: false
        })
    ));
}

#[test]
fn ignored_iou_never_reaches_receiver() {
    let (hub, _chain) = test_hub();
    let a = client();
    let b = client();
    let a_open = register(&hub, &a, 0);
    register(&hub, &b, 0);
    hub.on_deposit(a.participant.address, 100, H256::ZERO).unwrap();

    hub.set_malicious_flags(&[MaliciousFlag::StealTransactionIou]);
    let mut b_watch = hub.watch_address(b.participant.address);
    let iou = send_iou(&a, &a_open, b.participant.address, 10, 1);
    hub.send_new_transfer(&iou).unwrap();

    // Sender was debited but the receiver never hears about the transfer.
    assert_eq!(
        hub.get_hub_account(&a.participant.address, None).unwrap().balance(),
        90
    );
    assert!(hub.query_new_transfer(&b.participant.address).is_none());
    assert!(b_watch.try_recv().is_none());
}

#[test]
fn missing_evidence_is_inconclusive() {
    let committed = eonhub::core::types::HubRoot {
        eon: 0,
        root: H256::ZERO,
        allotment: 0,
        start_height: 0,
        blocks_per_eon: BLOCKS_PER_EON,
    };
    let charges = AccountCharges {
        deposit: 0,
        withdraw: 0,
    };
    let c = client();
    let challenge = BalanceUpdateChallenge {
        address: c.participant.address,
        proof: BalanceUpdateProof::default(),
        owner_public_key: c.participant.public_key,
    };
    assert_eq!(
        verify_balance_update_challenge(&challenge, &committed, &charges, None, &[0u8; 32]),
        Verdict::Inconclusive
    );
}

#[test]
fn superseded_update_does_not_convict_honest_hub() {
    let (hub, chain) = test_hub();
    let mut a = client();
    let b = client();
    let a_open = register(&hub, &a, 0);
    register(&hub, &b, 0);
    hub.on_deposit(a.participant.address, 100, H256::ZERO).unwrap();

    // Two honest transfers; the client keeps the countersigned v1 update
    // around after obtaining v2.
    let iou1 = send_iou(&a, &a_open, b.participant.address, 10, 1);
    let a_upd_v1 = hub.send_new_transfer(&iou1).unwrap();
    a.tx_hashes.push(tx_hash(&iou1.transaction));
    let iou2 = send_iou(&a, &a_upd_v1, b.participant.address, 10, 2);
    hub.send_new_transfer(&iou2).unwrap();
    a.tx_hashes.push(tx_hash(&iou2.transaction));

    close_eon(&hub, &chain);

    // The commitment reflects v2 (allotment 80), not v1 (would be 90).
    let path = hub.get_proof(&a.participant.address, Some(0)).unwrap();
    assert_eq!(path.leaf.allotment, 80);

    // Replaying the stale v1 update must not convict: the hub holds the
    // later countersigned update the committed leaf matches.
    let mut watch = challenge_events(&hub);
    let challenge = BalanceUpdateChallenge {
        address: a.participant.address,
        proof: BalanceUpdateProof {
            update: Some(a_upd_v1),
            path: Some(path),
        },
        owner_public_key: a.participant.public_key,
    };
    hub.open_balance_update_challenge(&challenge).unwrap();

    assert!(matches!(
        watch.try_recv(),
        Some(HubEvent::ChallengeResolved {
            eon: 0,
            hub_at_fault: false
        })
    ));
}

#[test]
fn do_nothing_windows() {
    // Serviced inside the window.
    assert_eq!(
        verify_do_nothing_challenge(10, Some(12), 20, BLOCKS_PER_EON),
        Verdict::ChallengerAtFault
    );
    // Serviced but late.
    assert_eq!(
        verify_do_nothing_challenge(10, Some(15), 20, BLOCKS_PER_EON),
        Verdict::HubAtFault
    );
    // Unserviced past the deadline.
    assert_eq!(
        verify_do_nothing_challenge(10, None, 15, BLOCKS_PER_EON),
        Verdict::HubAtFault
    );
    // Window still open.
    assert_eq!(
        verify_do_nothing_challenge(10, None, 12, BLOCKS_PER_EON),
        Verdict::Inconclusive
    );
}

#[test]
fn stalled_hub_is_convicted_of_doing_nothing() {
    let (hub, chain) = test_hub();
    let a = client();
    register(&hub, &a, 0);

    // Blocks pass but the hub never services the registration.
    chain.produce_blocks(3 * BLOCKS_PER_EON);
    assert_eq!(
        hub.verify_do_nothing(&a.participant.address).unwrap(),
        Verdict::HubAtFault
    );
}

#[test]
fn live_hub_refutes_do_nothing() {
    let (hub, chain) = test_hub();
    let a = client();
    register(&hub, &a, 0);
    close_eon(&hub, &chain);

    assert_eq!(
        hub.verify_do_nothing(&a.participant.address).unwrap(),
        Verdict::ChallengerAtFault
    );
}
