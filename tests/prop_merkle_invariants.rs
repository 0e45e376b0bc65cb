// Copyright (c) 2026 Amunchain
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use proptest::prelude::*;

use amunchain_hybrid::core::state::merkle::{forger_proof, forgers_root, transactions_root, verify_proof};
use amunchain_hybrid::core::types::{FullId, H256};

fn entries() -> impl Strategy<Value = Vec<(FullId, i64)>> {
    prop::collection::btree_map((any::<u64>(), any::<u32>()), 1i64..i64::MAX, 1..40)
        .prop_map(|m| m.into_iter().map(|((id, id2), b)| (FullId::new(id, id2), b)).collect())
}

proptest! {
    #[test]
    fn every_forger_has_a_verifiable_proof(entries in entries(), rotate in 0usize..40) {
        let root = forgers_root(&entries);
        let mut shuffled = entries.clone();
        let n = shuffled.len();
        shuffled.rotate_left(rotate % n);
        prop_assert_eq!(forgers_root(&shuffled), root);
        for (account, _) in &entries {
            let proof = forger_proof(&shuffled, *account).unwrap();
            prop_assert!(verify_proof(*root.as_bytes(), &proof));
        }
    }

    #[test]
    fn changed_balance_changes_forger_root(entries in entries(), pick in 0usize..40, delta in 1i64..1_000) {
        let mut changed = entries.clone();
        let i = pick % changed.len();
        changed[i].1 = changed[i].1.wrapping_sub(delta).max(0);
        prop_assume!(changed[i].1 != entries[i].1);
        prop_assert_ne!(forgers_root(&changed), forgers_root(&entries));
    }

    #[test]
    fn proof_does_not_verify_against_other_root(a in entries(), b in entries()) {
        prop_assume!(forgers_root(&a) != forgers_root(&b));
        let (account, _) = a[0];
        let proof = forger_proof(&a, account).unwrap();
        prop_assert!(!verify_proof(*forgers_root(&b).as_bytes(), &proof));
    }

    #[test]
    fn transactions_root_commits_to_every_hash(
        hashes in prop::collection::vec(any::<[u8; 32]>(), 1..30),
        pick in 0usize..30,
    ) {
        let hashes: Vec<H256> = hashes.into_iter().map(H256::from_bytes).collect();
        let root = transactions_root(&hashes);
        prop_assert_eq!(transactions_root(&hashes), root);
        let mut changed = hashes.clone();
        let i = pick % changed.len();
        let mut bytes = *changed[i].as_bytes();
        bytes[0] ^= 0x01;
        changed[i] = H256::from_bytes(bytes);
        prop_assert_ne!(transactions_root(&changed), root);
    }
}
