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

use eonhub::core::challenge::BalanceUpdateProof;
use eonhub::core::state::store::HubStore;
use eonhub::core::types::{
    decode_canonical_limited, encode_canonical, Address, H256, HubAccount, HubRoot, Update,
};

fn addr(i: u8) -> Address {
    Address::from_bytes([i; 20])
}

fn account(eon: u64, i: u8, deposit: u128) -> HubAccount {
    HubAccount {
        address: addr(i),
        public_key: [i; 32],
        eon,
        deposit,
        withdraw: 0,
        update: Update::opening(eon),
        allotment: deposit,
    }
}

#[test]
fn closed_eon_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().to_str().unwrap().to_string();

    let root = HubRoot {
        eon: 3,
        root: H256::from_bytes([7u8; 32]),
        allotment: 30,
        start_height: 12,
        blocks_per_eon: 4,
    };
    let accounts = vec![account(3, 1, 10), account(3, 2, 20)];
    let delivered = vec![H256::from_bytes([9u8; 32])];

    {
        let store = HubStore::open(&path).unwrap();
        store.put_closed_eon(&root, &accounts, &delivered).unwrap();
    }

    let store = HubStore::open(&path).unwrap();
    assert_eq!(store.get_root(3).unwrap(), Some(root));
    assert_eq!(store.get_root(4).unwrap(), None);
    assert_eq!(store.get_account(3, &addr(1)).unwrap(), Some(accounts[0].clone()));
    assert_eq!(store.get_account(3, &addr(2)).unwrap(), Some(accounts[1].clone()));
    assert_eq!(store.get_account(2, &addr(1)).unwrap(), None);
    assert_eq!(store.accounts_at(3).unwrap(), accounts);
    assert_eq!(store.get_delivered_txs(3).unwrap(), delivered);
    assert_eq!(store.get_delivered_txs(2).unwrap(), Vec::<H256>::new());
}

#[test]
fn latest_root_is_the_highest_eon_on_record() {
    let store = HubStore::open_temporary().unwrap();
    assert_eq!(store.latest_root().unwrap(), None);

    for eon in [0u64, 1, 2] {
        let root = HubRoot {
            eon,
            root: H256::from_bytes([eon as u8; 32]),
            allotment: eon as u128,
            start_height: eon * 4,
            blocks_per_eon: 4,
        };
        store.put_closed_eon(&root, &[], &[]).unwrap();
    }

    assert_eq!(store.latest_root().unwrap().map(|r| r.eon), Some(2));
}

#[test]
fn canonical_codec_round_trips_and_rejects_trailing_bytes() {
    let account = account(1, 9, 55);
    let bytes = encode_canonical(&account).unwrap();
    let back: HubAccount = decode_canonical_limited(&bytes, 64 * 1024).unwrap();
    assert_eq!(back, account);

    let mut trailing = bytes.clone();
    trailing.push(0);
    assert!(decode_canonical_limited::<HubAccount>(&trailing, 64 * 1024).is_err());

    assert!(decode_canonical_limited::<HubAccount>(&bytes, 4).is_err());
}

#[test]
fn partial_challenge_evidence_round_trips() {
    // Either half of the evidence may be absent on the wire.
    let proof = BalanceUpdateProof::default();
    let bytes = encode_canonical(&proof).unwrap();
    let back: BalanceUpdateProof = decode_canonical_limited(&bytes, 1024).unwrap();
    assert_eq!(back, proof);

    let with_update = BalanceUpdateProof {
        update: Some(Update::opening(2)),
        path: None,
    };
    let bytes = encode_canonical(&with_update).unwrap();
    let back: BalanceUpdateProof = decode_canonical_limited(&bytes, 1024).unwrap();
    assert_eq!(back, with_update);
}

#[test]
fn prefix_iteration_scopes_by_eon() {
    let store = HubStore::open_temporary().unwrap();
    for eon in 0..3u64 {
        for i in 1..=2u8 {
            store.put_account(&account(eon, i, i as u128)).unwrap();
        }
    }

    let mut prefix = b"acct/".to_vec();
    prefix.extend_from_slice(&1u64.to_be_bytes());
    let pairs = store.iterate_prefix(&prefix).unwrap();
    assert_eq!(pairs.len(), 2);
}
