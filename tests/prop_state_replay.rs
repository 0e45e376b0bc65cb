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

//! Pushing blocks and popping them off again must restore every derived table exactly.

mod common;

use std::sync::Arc;

use proptest::prelude::*;

use amunchain_hybrid::core::chain::processor::BlockchainProcessor;
use amunchain_hybrid::core::params::ONE_COIN;
use amunchain_hybrid::core::state::merkle::Hash32;
use amunchain_hybrid::core::state::store::{SledStore, Table, VersionedStore};
use amunchain_hybrid::core::tx::appendix::Attachment;
use amunchain_hybrid::core::tx::transaction::TransactionBuilder;
use amunchain_hybrid::core::types::{Clock, FullId, ManualClock};

use common::{genesis, public_key, secret, settings, GENESIS_TIME};

fn roots(store: &SledStore) -> Vec<(Table, Hash32)> {
    Table::VERSIONED
        .iter()
        .map(|t| (*t, store.table_root(*t).unwrap()))
        .collect()
}

fn replay(blocks: Vec<Vec<(u64, i64)>>) -> Result<(), TestCaseError> {
    let store = Arc::new(SledStore::temporary().unwrap());
    let clock = Arc::new(ManualClock::new(GENESIS_TIME));
    let dyn_store: Arc<dyn VersionedStore> = store.clone();
    let processor = BlockchainProcessor::open(dyn_store, genesis(), settings(), clock.clone()).unwrap();
    let rich = secret("rich");
    let forger = secret("alpha");
    let genesis_id = processor.chain().block_id_at(0).unwrap().unwrap();

    clock.advance(60);
    processor.generate_block(&forger, clock.now()).unwrap();
    let before = roots(&store);
    let head = processor.chain().last_block();

    let mut confirmed = 0usize;
    let mut serial = 0u64;
    for payments in &blocks {
        for (to, amount) in payments {
            serial += 1;
            let tx = TransactionBuilder::new(public_key(&rich), Attachment::OrdinaryPayment)
                .timestamp(clock.now())
                .recipient(FullId::new(1_000 * serial + to, 0))
                .amount(*amount * ONE_COIN)
                .fee(ONE_COIN)
                .ec_block(0, genesis_id)
                .sign(&rich)
                .unwrap();
            processor.add_transaction(tx).unwrap();
        }
        clock.advance(60);
        let linked = processor.generate_block(&forger, clock.now()).unwrap();
        confirmed += linked.block.transactions().len() - 1;
    }
    prop_assert_eq!(confirmed, blocks.iter().map(Vec::len).sum::<usize>());
    for acc in processor.ledger().accounts(None).unwrap() {
        if acc.id != FullId::BURN {
            prop_assert!(0 <= acc.unconfirmed_balance && acc.unconfirmed_balance <= acc.balance);
        }
    }
    if confirmed > 0 {
        prop_assert_ne!(roots(&store), before.clone());
    }

    let popped = processor.pop_off_to(1).unwrap();
    prop_assert_eq!(popped.len(), blocks.len());
    prop_assert_eq!(processor.chain().last_block(), head);
    prop_assert_eq!(roots(&store), before);
    prop_assert_eq!(processor.pool().len(), confirmed);
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn pop_off_restores_state_roots(
        blocks in prop::collection::vec(
            prop::collection::vec((0u64..5, 1i64..50), 0..4),
            1..5,
        )
    ) {
        replay(blocks)?;
    }
}
