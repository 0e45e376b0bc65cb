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

use amunchain_hybrid::core::chain::block::Block;
use amunchain_hybrid::core::chain::events::ChainEvent;
use amunchain_hybrid::core::params::ONE_COIN;
use amunchain_hybrid::core::types::{Clock, FullId};

use common::TestNode;

fn blocks_above(node: &TestNode, height: u32) -> Vec<Block> {
    let top = node.processor.chain().height();
    (height + 1..=top)
        .map(|h| node.processor.chain().block_at(h).unwrap().unwrap().block.as_ref().clone())
        .collect()
}

#[test]
fn stronger_fork_replaces_head_and_requeues_transactions() {
    let a = TestNode::new();
    let b = TestNode::new();
    assert_eq!(a.genesis_id(), b.genesis_id());

    let tx = a.payment(&a.rich, FullId::new(21, 0), 4 * ONE_COIN);
    a.processor.add_transaction(tx.clone()).unwrap();
    a.forge_after(&a.alpha, 60);
    assert!(a.processor.pool().is_empty());

    b.forge_after(&b.beta, 60);
    b.forge_after(&b.beta, 60);
    let fork = blocks_above(&b, 0);

    let mut rx = a.processor.events().subscribe();
    a.clock.set(b.clock.now());
    let outcome = a.processor.process_fork(0, fork).unwrap();
    assert!(outcome.switched);
    assert!(outcome.rejected.is_none());
    assert_eq!(a.processor.chain().height(), 2);
    assert_eq!(a.processor.chain().last_block().id(), b.processor.chain().last_block().id());
    assert_eq!(
        a.processor.chain().last_block().cumulative_difficulty,
        b.processor.chain().last_block().cumulative_difficulty
    );
    assert!(a.processor.pool().contains(tx.id()));
    assert_eq!(a.balance(FullId::new(21, 0)), 0);

    let events: Vec<ChainEvent> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
    assert!(events.contains(&ChainEvent::Reorganized {
        common_height: 0,
        new_height: 2,
    }));
}

#[test]
fn weaker_fork_leaves_the_chain_untouched() {
    let a = TestNode::new();
    let b = TestNode::new();
    a.forge_after(&a.alpha, 60);
    let head = a.forge_after(&a.alpha, 60);
    b.forge_after(&b.beta, 60);

    let mut rx = a.processor.events().subscribe();
    let fork = blocks_above(&b, 0);
    let rejected_id = fork[0].id();
    let outcome = a.processor.process_fork(0, fork).unwrap();
    assert!(!outcome.switched);
    assert!(outcome.rejected.is_none());
    assert_eq!(a.processor.chain().last_block(), head);

    let events: Vec<ChainEvent> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
    assert!(events
        .iter()
        .any(|e| matches!(e, ChainEvent::BlockRejected { id, .. } if *id == rejected_id)));
}

#[test]
fn fork_with_a_broken_block_reports_it_and_restores() {
    let a = TestNode::new();
    let b = TestNode::new();
    let head = a.forge_after(&a.alpha, 60);
    b.forge_after(&b.beta, 60);
    b.forge_after(&b.beta, 60);
    let mut fork = blocks_above(&b, 0);
    fork.swap(0, 1);
    let broken = fork[0].id();

    a.clock.set(b.clock.now());
    let outcome = a.processor.process_fork(0, fork).unwrap();
    assert!(!outcome.switched);
    let rejected = outcome.rejected.unwrap();
    assert_eq!(rejected.id, broken);
    assert_eq!(a.processor.chain().last_block().id(), head.id());
}

#[test]
fn competing_peer_block_with_more_difficulty_wins() {
    let a = TestNode::new();
    let b = TestNode::new();
    let ours = a.forge_after(&a.alpha, 60);
    // A shorter gap lowers the base target, which raises stake difficulty.
    let theirs = b.forge_after(&b.beta, 30);
    assert!(theirs.cumulative_difficulty > ours.cumulative_difficulty);

    assert!(a.processor.process_peer_block(theirs.block.as_ref().clone()).unwrap());
    assert_eq!(a.processor.chain().last_block().id(), theirs.id());

    assert!(!a.processor.process_peer_block(ours.block.as_ref().clone()).unwrap());
    assert_eq!(a.processor.chain().last_block().id(), theirs.id());
}

#[test]
fn known_peer_block_is_ignored_and_unrelated_one_is_out_of_order() {
    let a = TestNode::new();
    let b = TestNode::new();
    let head = a.forge();
    assert!(!a.processor.process_peer_block(head.block.as_ref().clone()).unwrap());

    b.forge();
    b.forge();
    let far = b.forge();
    a.clock.set(b.clock.now());
    let err = a.processor.process_peer_block(far.block.as_ref().clone()).unwrap_err();
    assert!(!err.is_content_error());
    assert_eq!(a.processor.chain().height(), 1);
}

#[test]
fn peer_block_extending_the_head_is_pushed() {
    let a = TestNode::new();
    let b = TestNode::new();
    let next = b.forge_after(&b.beta, 60);
    a.clock.set(b.clock.now());
    assert!(a.processor.process_peer_block(next.block.as_ref().clone()).unwrap());
    assert_eq!(a.processor.chain().last_block().id(), next.id());
}
