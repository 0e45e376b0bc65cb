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

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use amunchain_hybrid::core::chain::block::BlockKind;
use amunchain_hybrid::core::chain::errors::BlockError;
use amunchain_hybrid::core::chain::processor::{BlockchainProcessor, ProcessorSettings};
use amunchain_hybrid::core::ledger::phasing::{PhasingParams, VotingModel};
use amunchain_hybrid::core::params::{MAX_TIMEDRIFT, ONE_COIN};
use amunchain_hybrid::core::security::crypto::SecretPhrase;
use amunchain_hybrid::core::state::store::{SledStore, VersionedStore};
use amunchain_hybrid::core::tx::appendix::{Attachment, PhasingAppendix};
use amunchain_hybrid::core::tx::pool::Admission;
use amunchain_hybrid::core::tx::transaction::Transaction;
use amunchain_hybrid::core::types::{Clock, FullId, ManualClock};

use common::{account, genesis, settings, TestNode, GENESIS_TIME, RICH_BALANCE};

#[test]
fn chain_and_balances_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("db");
    let clock = Arc::new(ManualClock::new(GENESIS_TIME));
    let recipient = FullId::new(4242, 0);
    let head_id;
    {
        let store: Arc<dyn VersionedStore> = Arc::new(SledStore::open(path.to_str().unwrap()).unwrap());
        let processor = BlockchainProcessor::open(store, genesis(), settings(), clock.clone()).unwrap();
        let node_alpha = common::secret("alpha");
        let rich = common::secret("rich");
        let genesis_id = processor.chain().block_id_at(0).unwrap().unwrap();
        let tx = amunchain_hybrid::core::tx::transaction::TransactionBuilder::new(
            common::public_key(&rich),
            Attachment::OrdinaryPayment,
        )
        .timestamp(clock.now())
        .recipient(recipient)
        .amount(7 * ONE_COIN)
        .fee(ONE_COIN)
        .ec_block(0, genesis_id)
        .sign(&rich)
        .unwrap();
        processor.add_transaction(tx).unwrap();
        clock.advance(60);
        head_id = processor.generate_block(&node_alpha, clock.now()).unwrap().id();
    }

    let store: Arc<dyn VersionedStore> = Arc::new(SledStore::open(path.to_str().unwrap()).unwrap());
    let processor = BlockchainProcessor::open(store, genesis(), settings(), clock).unwrap();
    assert_eq!(processor.chain().height(), 1);
    assert_eq!(processor.chain().last_block().id(), head_id);
    assert_eq!(processor.ledger().balance(recipient, None).unwrap(), 7 * ONE_COIN);
    assert_eq!(
        processor.ledger().balance(account(&common::secret("rich")), None).unwrap(),
        RICH_BALANCE - 8 * ONE_COIN
    );
}

#[test]
fn reopening_with_another_genesis_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("db");
    let clock = Arc::new(ManualClock::new(GENESIS_TIME));
    {
        let store: Arc<dyn VersionedStore> = Arc::new(SledStore::open(path.to_str().unwrap()).unwrap());
        BlockchainProcessor::open(store, genesis(), settings(), clock.clone()).unwrap();
    }
    let mut other = genesis();
    other.timestamp += 1;
    let store: Arc<dyn VersionedStore> = Arc::new(SledStore::open(path.to_str().unwrap()).unwrap());
    assert!(BlockchainProcessor::open(store, other, settings(), clock).is_err());
}

#[test]
fn zero_fee_transaction_is_refused() {
    let node = TestNode::new();
    let tx = node
        .builder(&node.rich, Attachment::OrdinaryPayment)
        .recipient(FullId::new(5, 0))
        .amount(ONE_COIN)
        .fee(0)
        .sign(&node.rich)
        .unwrap();
    assert!(node.processor.add_transaction(tx).is_err());
    assert!(node.processor.pool().is_empty());
}

#[test]
fn resubmitted_transaction_is_reported_as_known() {
    let node = TestNode::new();
    let tx = node.payment(&node.rich, FullId::new(5, 0), ONE_COIN);
    assert_eq!(node.processor.add_transaction(tx.clone()).unwrap(), Admission::Added);
    assert_ne!(node.processor.add_transaction(tx).unwrap(), Admission::Added);
    assert_eq!(node.processor.pool().len(), 1);
}

#[test]
fn two_assignments_of_one_alias_cannot_share_a_block() {
    let node = TestNode::new();
    let assign = |uri: &str| {
        node.builder(
            &node.rich,
            Attachment::AliasAssignment {
                alias: "market".into(),
                uri: uri.into(),
            },
        )
        .fee(10 * ONE_COIN)
        .sign(&node.rich)
        .unwrap()
    };
    let first = assign("https://one.example");
    let second = assign("https://two.example");
    let block = node.manual_block(&node.alpha, vec![first, second.clone()], 60);
    match node.processor.push_block(block) {
        Err(BlockError::TransactionNotAccepted { id, .. }) => assert_eq!(id, second.id()),
        other => panic!("expected a duplicate rejection, got {other:?}"),
    }
    assert_eq!(node.processor.chain().height(), 0);
}

#[test]
fn block_from_the_future_is_out_of_order() {
    let node = TestNode::new();
    let block = node.manual_block(&node.alpha, Vec::new(), 60 + MAX_TIMEDRIFT + 1);
    node.clock.set(GENESIS_TIME + 60);
    match node.processor.push_block(block.clone()) {
        Err(e @ BlockError::OutOfOrder(_)) => assert!(!e.is_content_error()),
        other => panic!("expected out of order, got {other:?}"),
    }
    node.clock.set(block.timestamp());
    node.processor.push_block(block).unwrap();
    assert_eq!(node.processor.chain().height(), 1);
}

#[test]
fn manual_block_matches_generated_rules() {
    let node = TestNode::new();
    let tx = node.payment(&node.rich, FullId::new(9, 0), 3 * ONE_COIN);
    let block = node.manual_block(&node.beta, vec![tx], 60);
    let linked = node.processor.push_block(block).unwrap();
    assert_eq!(linked.height, 1);
    assert_eq!(node.balance(FullId::new(9, 0)), 3 * ONE_COIN);
    assert_eq!(node.balance(account(&node.beta)), ONE_COIN);
}

#[test]
fn back_fees_are_shared_with_previous_generators() {
    let node = TestNode::new();
    node.forge_after(&node.alpha, 60);
    node.forge_after(&node.beta, 60);
    node.forge_after(&node.alpha, 60);
    node.forge_after(&node.beta, 60);
    assert_eq!(node.balance(account(&node.alpha)), 0);

    let tx = node
        .builder(&node.rich, Attachment::OrdinaryPayment)
        .recipient(FullId::new(11, 0))
        .amount(ONE_COIN)
        .fee(10 * ONE_COIN)
        .sign(&node.rich)
        .unwrap();
    node.processor.add_transaction(tx).unwrap();
    let linked = node.forge_after(&node.alpha, 60);
    assert_eq!(linked.height, 5);

    // Generator keeps 4 of 10; h4 (beta) gets 3, h3 (alpha) 2, h2 (beta) 1.
    assert_eq!(node.balance(account(&node.alpha)), 6 * ONE_COIN);
    assert_eq!(node.balance(account(&node.beta)), 4 * ONE_COIN);
    let coinbase = linked.block.coinbase().unwrap();
    match coinbase.attachment() {
        Attachment::Coinbase { recipients } => {
            assert_eq!(recipients.values().sum::<i64>(), 10 * ONE_COIN);
            assert_eq!(recipients.len(), 2);
        }
        other => panic!("unexpected attachment {other:?}"),
    }
}

#[test]
fn key_block_pays_subsidy_and_carries_no_value() {
    let node = TestNode::new();
    let payment = node.payment(&node.rich, FullId::new(12, 0), 2 * ONE_COIN);
    node.processor.add_transaction(payment.clone()).unwrap();

    let key = node.mine_key();
    assert_eq!(key.block.kind(), BlockKind::Key);
    assert_eq!(key.local_height, 1);
    assert_eq!(key.block.transactions().len(), 1);
    assert!(node.processor.pool().contains(payment.id()));
    assert_eq!(node.balance(account(&node.alpha)), 50 * ONE_COIN);
    assert_eq!(node.processor.chain().last_key_block().unwrap().id(), key.id());

    let pos = node.forge_after(&node.beta, 60);
    assert_eq!(pos.block.header().previous_key_block_id, key.id());
    assert_eq!(pos.local_height, 1);
    assert_eq!(node.balance(FullId::new(12, 0)), 2 * ONE_COIN);
    assert!(pos.cumulative_difficulty > key.cumulative_difficulty);
}

#[test]
fn key_block_with_wrong_target_is_rejected() {
    let node = TestNode::new();
    let key = node.mine_key();
    node.processor.pop_off_to(0).unwrap();
    let mut header = key.block.header().clone();
    header.bits -= 1;
    let tampered = amunchain_hybrid::core::chain::block::Block::sign_sealed(
        header,
        key.block.transactions().to_vec(),
        &node.alpha,
    )
    .unwrap();
    let err = node.processor.push_block(tampered).unwrap_err();
    assert!(err.is_content_error(), "{err}");
    node.processor.push_block(key.block.as_ref().clone()).unwrap();
    assert_eq!(node.processor.chain().height(), 1);
}

#[test]
fn trim_then_deep_rollback_rescans_from_genesis() {
    let node = TestNode::with_settings(ProcessorSettings {
        max_rollback: 2,
        trim_frequency: 2,
        ..settings()
    });
    let recipient = FullId::new(13, 0);
    for i in 0..6 {
        if i == 1 {
            let tx = node.payment(&node.rich, recipient, 5 * ONE_COIN);
            node.processor.add_transaction(tx).unwrap();
        }
        node.forge();
    }
    assert_eq!(node.processor.trim_derived_tables().unwrap(), Some(4));
    assert_eq!(node.processor.trim_derived_tables().unwrap(), None);
    assert_eq!(node.balance(recipient), 5 * ONE_COIN);

    let popped = node.processor.pop_off_to(1).unwrap();
    assert_eq!(popped.len(), 5);
    assert_eq!(node.processor.chain().height(), 1);
    assert_eq!(node.balance(recipient), 0);
    assert_eq!(node.processor.pool().len(), 1);

    let head = node.forge();
    assert_eq!(head.height, 2);
    assert_eq!(node.balance(recipient), 5 * ONE_COIN);
    node.processor.scan(0, true).unwrap();
    assert_eq!(node.balance(recipient), 5 * ONE_COIN);
    assert_eq!(node.processor.chain().last_block().id(), head.id());
}

#[test]
fn events_follow_push_and_pop() {
    use amunchain_hybrid::core::chain::events::ChainEvent;
    let node = TestNode::new();
    let mut rx = node.processor.events().subscribe();
    let linked = node.forge();
    node.processor.pop_off_to(0).unwrap();
    assert_eq!(
        rx.try_recv().unwrap(),
        ChainEvent::BlockPushed {
            height: 1,
            id: linked.id(),
            kind: BlockKind::Pos,
        }
    );
    assert_eq!(
        rx.try_recv().unwrap(),
        ChainEvent::BlockPopped {
            height: 1,
            id: linked.id(),
        }
    );
}

#[test]
fn block_on_a_stale_parent_is_out_of_order() {
    let node = TestNode::new();
    let stale = node.manual_block(&node.beta, Vec::new(), 60);
    let head = node.forge_after(&node.alpha, 61);
    match node.processor.push_block(stale) {
        Err(BlockError::OutOfOrder(_)) => {}
        other => panic!("expected out of order, got {other:?}"),
    }
    assert_eq!(node.processor.chain().last_block(), head);
}

#[test]
fn pop_off_is_idempotent() {
    let node = TestNode::new();
    for _ in 0..3 {
        node.forge();
    }
    assert!(node.processor.pop_off_to(3).unwrap().is_empty());
    assert_eq!(node.processor.pop_off_to(1).unwrap().len(), 2);
    let head = node.processor.chain().last_block();
    assert!(node.processor.pop_off_to(1).unwrap().is_empty());
    assert_eq!(node.processor.chain().last_block(), head);
}

#[test]
fn reapplying_popped_blocks_reproduces_accounts() {
    let node = TestNode::new();
    for i in 0..6u64 {
        let tx = node.payment(&node.rich, FullId::new(100 + i, 0), (i as i64 + 1) * ONE_COIN);
        node.processor.add_transaction(tx).unwrap();
        node.forge_after(if i % 2 == 0 { &node.alpha } else { &node.beta }, 60);
    }
    let before = node.processor.ledger().accounts(None).unwrap();
    let head = node.processor.chain().last_block();

    let popped = node.processor.pop_off_to(1).unwrap();
    assert_eq!(popped.len(), 5);
    assert_ne!(node.processor.ledger().accounts(None).unwrap(), before);
    for block in popped {
        node.processor.push_block(block.as_ref().clone()).unwrap();
    }
    assert_eq!(node.processor.chain().last_block(), head);
    assert_eq!(node.processor.ledger().accounts(None).unwrap(), before);
    assert!(node.processor.pool().is_empty());
}

const PHASED_FEE: i64 = 3 * ONE_COIN;

fn unconditional(finish_height: u32) -> PhasingAppendix {
    PhasingAppendix {
        finish_height,
        params: PhasingParams {
            voting_model: VotingModel::None,
            quorum: 0,
            min_balance: 0,
            whitelist: vec![],
        },
    }
}

fn approved_by(voter: FullId, finish_height: u32) -> PhasingAppendix {
    PhasingAppendix {
        finish_height,
        params: PhasingParams {
            voting_model: VotingModel::Account,
            quorum: 1,
            min_balance: 0,
            whitelist: vec![voter],
        },
    }
}

fn phased_payment(node: &TestNode, to: FullId, amount: i64, phasing: PhasingAppendix) -> Transaction {
    node.builder(&node.rich, Attachment::OrdinaryPayment)
        .recipient(to)
        .amount(amount)
        .fee(PHASED_FEE)
        .phasing(phasing)
        .sign(&node.rich)
        .unwrap()
}

fn phasing_vote(node: &TestNode, voter: &SecretPhrase, phased: &Transaction) -> Transaction {
    node.builder(
        voter,
        Attachment::PhasingVoteCasting {
            transaction_full_hashes: vec![phased.full_hash()],
        },
    )
    .fee(2 * ONE_COIN)
    .sign(voter)
    .unwrap()
}

fn assert_reservations_released(node: &TestNode, who: FullId) {
    let ledger = node.processor.ledger();
    assert_eq!(ledger.unconfirmed_balance(who).unwrap(), ledger.balance(who, None).unwrap());
}

#[test]
fn phased_payment_executes_at_its_finish_height() {
    let node = TestNode::new();
    let rich = account(&node.rich);
    let recipient = FullId::new(501, 0);
    let tx = phased_payment(&node, recipient, 7 * ONE_COIN, unconditional(4));
    let id = tx.id();
    node.processor.add_transaction(tx).unwrap();

    node.forge();
    assert_eq!(node.balance(rich), RICH_BALANCE - PHASED_FEE);
    assert_eq!(node.balance(recipient), 0);
    node.forge();
    node.forge();
    assert_eq!(node.balance(recipient), 0);
    assert!(node.processor.ledger().phasing_result(id).unwrap().is_none());

    assert_eq!(node.forge().height, 4);
    assert_eq!(node.balance(recipient), 7 * ONE_COIN);
    assert_eq!(node.balance(rich), RICH_BALANCE - PHASED_FEE - 7 * ONE_COIN);
    assert_reservations_released(&node, rich);
    let result = node.processor.ledger().phasing_result(id).unwrap().unwrap();
    assert!(result.approved);
    assert_eq!(result.height, 4);
}

#[test]
fn account_quorum_finishes_phasing_early() {
    let node = TestNode::new();
    let voter = common::secret("voter");
    let recipient = FullId::new(502, 0);
    let phased = phased_payment(&node, recipient, 5 * ONE_COIN, approved_by(account(&voter), 20));
    node.processor
        .add_transaction(node.payment(&node.rich, account(&voter), 10 * ONE_COIN))
        .unwrap();
    node.processor.add_transaction(phased.clone()).unwrap();
    node.forge();
    assert_eq!(node.balance(account(&voter)), 10 * ONE_COIN);

    node.processor.add_transaction(phasing_vote(&node, &voter, &phased)).unwrap();
    let voted = node.forge();
    assert_eq!(voted.height, 2);
    assert_eq!(node.balance(recipient), 5 * ONE_COIN);
    let result = node.processor.ledger().phasing_result(phased.id()).unwrap().unwrap();
    assert!(result.approved);
    assert_eq!((result.height, result.result), (2, 1));
    assert!(node.processor.ledger().phasing_polls_finishing_at(20).unwrap().is_empty());
    assert_reservations_released(&node, account(&node.rich));
}

#[test]
fn vote_arriving_at_the_finish_height_executes_once() {
    let node = TestNode::new();
    let rich = account(&node.rich);
    let voter = common::secret("voter");
    let recipient = FullId::new(503, 0);
    let phased = phased_payment(&node, recipient, 4 * ONE_COIN, approved_by(account(&voter), 3));
    node.processor
        .add_transaction(node.payment(&node.rich, account(&voter), 10 * ONE_COIN))
        .unwrap();
    node.processor.add_transaction(phased.clone()).unwrap();
    node.forge();
    node.forge();

    node.processor.add_transaction(phasing_vote(&node, &voter, &phased)).unwrap();
    assert_eq!(node.forge().height, 3);
    assert_eq!(node.balance(recipient), 4 * ONE_COIN);
    assert_eq!(
        node.balance(rich),
        RICH_BALANCE - 11 * ONE_COIN - PHASED_FEE - 4 * ONE_COIN
    );
    assert_reservations_released(&node, rich);
    assert!(node.processor.ledger().phasing_result(phased.id()).unwrap().unwrap().approved);
}

#[test]
fn rejected_phasing_keeps_only_the_fee() {
    let node = TestNode::new();
    let rich = account(&node.rich);
    let recipient = FullId::new(504, 0);
    let phased = phased_payment(&node, recipient, 9 * ONE_COIN, approved_by(account(&node.beta), 3));
    node.processor.add_transaction(phased.clone()).unwrap();
    node.forge();
    assert_eq!(
        node.processor.ledger().unconfirmed_balance(rich).unwrap(),
        RICH_BALANCE - PHASED_FEE - 9 * ONE_COIN
    );
    node.forge();
    node.forge();

    assert_eq!(node.balance(recipient), 0);
    assert_eq!(node.balance(rich), RICH_BALANCE - PHASED_FEE);
    assert_reservations_released(&node, rich);
    let result = node.processor.ledger().phasing_result(phased.id()).unwrap().unwrap();
    assert!(!result.approved);
    assert_eq!((result.height, result.result), (3, 0));
}

#[test]
fn pop_off_across_a_finish_height_replays_phasing() {
    let node = TestNode::new();
    let recipient = FullId::new(505, 0);
    let phased = phased_payment(&node, recipient, 6 * ONE_COIN, unconditional(3));
    node.processor.add_transaction(phased.clone()).unwrap();
    for _ in 0..4 {
        node.forge();
    }
    let before = node.processor.ledger().accounts(None).unwrap();
    assert_eq!(node.balance(recipient), 6 * ONE_COIN);

    let popped = node.processor.pop_off_to(2).unwrap();
    assert_eq!(popped.len(), 2);
    let ledger = node.processor.ledger();
    assert_eq!(node.balance(recipient), 0);
    assert!(ledger.phasing_result(phased.id()).unwrap().is_none());
    assert_eq!(ledger.phasing_polls_finishing_at(3).unwrap().len(), 1);

    for block in popped {
        node.processor.push_block(block.as_ref().clone()).unwrap();
    }
    assert_eq!(node.balance(recipient), 6 * ONE_COIN);
    assert!(ledger.phasing_result(phased.id()).unwrap().unwrap().approved);
    assert_eq!(node.processor.ledger().accounts(None).unwrap(), before);
}

#[test]
fn phased_dividends_for_one_asset_cannot_finish_together() {
    let node = TestNode::new();
    let rich = account(&node.rich);
    let holder = FullId::new(601, 0);
    let issue = node
        .builder(
            &node.rich,
            Attachment::AssetIssuance {
                name: "GOLD".into(),
                description: String::new(),
                quantity: 1_000,
                decimals: 2,
            },
        )
        .fee(1000 * ONE_COIN)
        .sign(&node.rich)
        .unwrap();
    let asset_id = issue.id();
    node.processor.add_transaction(issue).unwrap();
    node.forge();
    let transfer = node
        .builder(&node.rich, Attachment::AssetTransfer { asset_id, quantity: 400 })
        .recipient(holder)
        .sign(&node.rich)
        .unwrap();
    node.processor.add_transaction(transfer).unwrap();
    node.forge();

    let mut dividends = Vec::new();
    for per_unit in [1_000i64, 2_000] {
        let d = node
            .builder(
                &node.rich,
                Attachment::DividendPayment {
                    asset_id,
                    height: 2,
                    amount_per_quantity: per_unit,
                },
            )
            .fee(PHASED_FEE)
            .phasing(unconditional(6))
            .sign(&node.rich)
            .unwrap();
        node.processor.add_transaction(d.clone()).unwrap();
        node.forge();
        dividends.push((d.id(), per_unit));
    }
    node.forge();
    assert_eq!(node.forge().height, 6);

    let ledger = node.processor.ledger();
    let mut approved = Vec::new();
    for (id, per_unit) in &dividends {
        if ledger.phasing_result(*id).unwrap().unwrap().approved {
            approved.push(*per_unit);
        }
    }
    assert_eq!(approved.len(), 1);
    assert_eq!(node.balance(holder), 400 * approved[0]);
    assert_reservations_released(&node, rich);
}

#[test]
fn trimming_alongside_forging_loses_nothing() {
    let node = TestNode::with_settings(ProcessorSettings {
        max_rollback: 2,
        trim_frequency: 1,
        ..settings()
    });
    let recipient = FullId::new(14, 0);
    let done = AtomicBool::new(false);
    std::thread::scope(|s| {
        let trimmer = s.spawn(|| {
            while !done.load(Ordering::SeqCst) {
                node.processor.trim_derived_tables().unwrap();
            }
        });
        for i in 0..12 {
            if i % 3 == 0 {
                let tx = node.payment(&node.rich, recipient, ONE_COIN);
                node.processor.add_transaction(tx).unwrap();
            }
            node.forge();
        }
        done.store(true, Ordering::SeqCst);
        trimmer.join().unwrap();
    });
    assert_eq!(node.processor.chain().height(), 12);
    assert_eq!(node.balance(recipient), 4 * ONE_COIN);
    assert_reservations_released(&node, account(&node.rich));
    node.processor.trim_derived_tables().unwrap();
    assert_eq!(node.processor.chain().trim_floor().unwrap(), 10);
}

