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

#![allow(dead_code)]

use std::collections::BTreeSet;
use std::sync::Arc;

use amunchain_hybrid::core::chain::block::{Block, BlockHeader, BlockKind};
use amunchain_hybrid::core::chain::blockchain::LinkedBlock;
use amunchain_hybrid::core::chain::processor::{BlockchainProcessor, GenesisSpec, ProcessorSettings};
use amunchain_hybrid::core::chain::reward::{distribute, RewardInput};
use amunchain_hybrid::core::chain::target::{generation_sequence, next_base_target};
use amunchain_hybrid::core::params::{pos_block_version, BACK_FEES_NUMERATORS, ONE_COIN};
use amunchain_hybrid::core::security::crypto::SecretPhrase;
use amunchain_hybrid::core::state::store::{SledStore, VersionedStore};
use amunchain_hybrid::core::tx::appendix::Attachment;
use amunchain_hybrid::core::tx::coinbase::build_coinbase;
use amunchain_hybrid::core::tx::transaction::{Transaction, TransactionBuilder};
use amunchain_hybrid::core::types::{Clock, FullId, ManualClock, PublicKey, Signature, H256};

pub const GENESIS_TIME: u64 = 1_000;
pub const RICH_BALANCE: i64 = 1_000_000 * ONE_COIN;

pub fn secret(name: &str) -> SecretPhrase {
    SecretPhrase::new(format!("integration {name}"))
}

pub fn public_key(s: &SecretPhrase) -> PublicKey {
    s.public_key().unwrap()
}

pub fn account(s: &SecretPhrase) -> FullId {
    FullId::from_public_key(&public_key(s))
}

/// One node on a temp-dir sled store with `alpha` and `beta` as unchecked forgers and
/// `rich` funded at genesis.
pub struct TestNode {
    pub processor: Arc<BlockchainProcessor>,
    pub clock: Arc<ManualClock>,
    pub alpha: SecretPhrase,
    pub beta: SecretPhrase,
    pub rich: SecretPhrase,
    _dir: tempfile::TempDir,
}

pub fn settings() -> ProcessorSettings {
    ProcessorSettings {
        fake_forgers: BTreeSet::from([account(&secret("alpha")), account(&secret("beta"))]),
        ..ProcessorSettings::default()
    }
}

pub fn genesis() -> GenesisSpec {
    GenesisSpec {
        timestamp: GENESIS_TIME,
        allocations: vec![(public_key(&secret("rich")), RICH_BALANCE)],
    }
}

impl TestNode {
    pub fn new() -> Self {
        Self::with_settings(settings())
    }

    pub fn with_settings(settings: ProcessorSettings) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn VersionedStore> =
            Arc::new(SledStore::open(dir.path().join("db").to_str().unwrap()).unwrap());
        let clock = Arc::new(ManualClock::new(GENESIS_TIME));
        let processor = BlockchainProcessor::open(store, genesis(), settings, clock.clone()).unwrap();
        Self {
            processor: Arc::new(processor),
            clock,
            alpha: secret("alpha"),
            beta: secret("beta"),
            rich: secret("rich"),
            _dir: dir,
        }
    }

    pub fn genesis_id(&self) -> u64 {
        self.processor.chain().block_id_at(0).unwrap().unwrap()
    }

    /// Forge a PoS block `elapsed` seconds after the head.
    pub fn forge_after(&self, who: &SecretPhrase, elapsed: u64) -> LinkedBlock {
        let ts = self.processor.chain().last_block().timestamp() + elapsed;
        self.clock.set(self.clock.now().max(ts));
        self.processor.generate_block(who, ts).unwrap()
    }

    pub fn forge(&self) -> LinkedBlock {
        self.forge_after(&self.alpha, 60)
    }

    pub fn mine_key(&self) -> LinkedBlock {
        let ts = self.processor.chain().last_block().timestamp() + 60;
        self.clock.set(self.clock.now().max(ts));
        self.processor.generate_key_block(&self.alpha, ts, 1_000_000).unwrap()
    }

    pub fn builder(&self, from: &SecretPhrase, attachment: Attachment) -> TransactionBuilder {
        TransactionBuilder::new(public_key(from), attachment)
            .timestamp(self.clock.now())
            .fee(ONE_COIN)
            .ec_block(0, self.genesis_id())
    }

    pub fn payment(&self, from: &SecretPhrase, to: FullId, amount: i64) -> Transaction {
        self.builder(from, Attachment::OrdinaryPayment)
            .recipient(to)
            .amount(amount)
            .sign(from)
            .unwrap()
    }

    pub fn balance(&self, id: FullId) -> i64 {
        self.processor.ledger().balance(id, None).unwrap()
    }

    /// A correctly formed PoS block over `txs` that bypasses the pool.
    pub fn manual_block(&self, who: &SecretPhrase, txs: Vec<Transaction>, elapsed: u64) -> Block {
        let prev = self.processor.chain().last_block();
        let pk = public_key(who);
        let ts = prev.timestamp() + elapsed;
        self.clock.set(self.clock.now().max(ts));
        let height = prev.height + 1;
        let registry = self.processor.registry();
        let mut previous_generators = Vec::new();
        for back in 1..=BACK_FEES_NUMERATORS.len() as u32 {
            let Some(h) = height.checked_sub(back) else { break };
            match self.processor.chain().block_at(h).unwrap() {
                Some(b) => previous_generators.push(b.block.generator_id()),
                None => break,
            }
        }
        let recipients = distribute(&RewardInput {
            kind: BlockKind::Pos,
            height,
            local_height: prev.local_height,
            generator: FullId::from_public_key(&pk),
            fees: txs.iter().map(|t| t.fee()).sum(),
            pays_back_fees: txs.iter().any(|t| !registry.is_back_fee_exempt(t.kind())),
            previous_generators,
        });
        let mut all = vec![build_coinbase(pk, recipients, ts).unwrap()];
        all.extend(txs);
        let header = BlockHeader {
            kind: BlockKind::Pos,
            version: pos_block_version(prev.local_height),
            timestamp: ts,
            previous_block_id: prev.id(),
            previous_block_hash: prev.block.hash(),
            previous_key_block_id: self.processor.chain().read().last_key_id(),
            base_target: next_base_target(prev.block.header().base_target, elapsed),
            bits: prev.block.header().bits,
            nonce: 0,
            generator_public_key: pk,
            generation_sequence: generation_sequence(&prev.block.header().generation_sequence, &pk),
            transactions_root: H256::ZERO,
            forgers_root: H256::ZERO,
            payload_length: 0,
            total_amount: 0,
            total_fee: 0,
            total_reward: 0,
            signature: Signature::ZERO,
        };
        Block::forge(header, all, who).unwrap()
    }
}
