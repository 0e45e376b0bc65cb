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

mod common;

use proptest::prelude::*;

use amunchain_hybrid::core::chain::block::Block;
use amunchain_hybrid::core::params::ONE_COIN;
use amunchain_hybrid::core::tx::appendix::Attachment;
use amunchain_hybrid::core::tx::transaction::{Transaction, TransactionBuilder};
use amunchain_hybrid::core::types::{FullId, H256};

use common::{public_key, secret, TestNode};

proptest! {
    #[test]
    fn arbitrary_bytes_never_panic(bytes in prop::collection::vec(any::<u8>(), 0..600)) {
        let _ = Transaction::parse(&bytes);
        let _ = Block::parse(&bytes);
    }

    #[test]
    fn signed_payment_survives_both_encodings(
        recipient in (1u64..u64::MAX, any::<u32>()),
        amount in 1i64..1_000_000,
        timestamp in 0u64..1_000_000_000,
        message in prop::option::of(prop::collection::vec(any::<u8>(), 1..200)),
        ec in any::<u64>(),
    ) {
        let sender = secret("codec");
        let mut builder = TransactionBuilder::new(public_key(&sender), Attachment::OrdinaryPayment)
            .timestamp(timestamp)
            .recipient(FullId::new(recipient.0, recipient.1))
            .amount(amount * ONE_COIN)
            .fee(ONE_COIN)
            .ec_block(1, ec);
        if let Some(m) = message {
            builder = builder.message(m, false);
        }
        let tx = builder.sign(&sender).unwrap();
        prop_assert!(tx.verify_signature());

        let parsed = Transaction::parse(&tx.bytes()).unwrap();
        prop_assert_eq!(&parsed, &tx);
        prop_assert_eq!(parsed.id(), tx.id());
        prop_assert!(parsed.verify_signature());

        let back = Transaction::from_json(&tx.to_json().unwrap()).unwrap();
        prop_assert_eq!(back.bytes(), tx.bytes());
        prop_assert_eq!(back.full_hash(), tx.full_hash());
    }

    #[test]
    fn truncated_transaction_is_rejected(cut in 1usize..64) {
        let sender = secret("codec");
        let tx = TransactionBuilder::new(public_key(&sender), Attachment::OrdinaryPayment)
            .timestamp(10)
            .recipient(FullId::new(3, 0))
            .amount(ONE_COIN)
            .fee(ONE_COIN)
            .referenced(H256::from_bytes([7; 32]))
            .sign(&sender)
            .unwrap();
        let bytes = tx.bytes();
        let cut = cut.min(bytes.len());
        prop_assert!(Transaction::parse(&bytes[..bytes.len() - cut]).is_err());
    }
}

#[test]
fn forged_blocks_round_trip_through_bytes_and_json() {
    let node = TestNode::new();
    let tx = node.payment(&node.rich, FullId::new(41, 0), ONE_COIN);
    node.processor.add_transaction(tx).unwrap();
    let pos = node.forge();
    let key = node.mine_key();
    for linked in [pos, key] {
        let block = linked.block.as_ref();
        let parsed = Block::parse(&block.bytes()).unwrap();
        assert_eq!(&parsed, block);
        assert_eq!(parsed.id(), block.id());
        assert!(parsed.verify_signature());
        let back = Block::from_json(&block.to_json().unwrap()).unwrap();
        assert_eq!(back.bytes(), block.bytes());
    }
}

#[test]
fn trailing_bytes_are_rejected() {
    let node = TestNode::new();
    let block = node.forge().block;
    let mut bytes = block.bytes();
    bytes.push(0);
    assert!(Block::parse(&bytes).is_err());
}
