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

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Blockchain processor: the only component that moves the chain head.
//!
//! Every head transition (push, pop-off, fork switch, rescan) runs under the chain write lock
//! and inside one store transaction, so a failure leaves neither block rows nor ledger versions
//! behind. Events are published after the commit.

use num_bigint::BigUint;
use parking_lot::RwLockUpgradableReadGuard;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::core::config::{ChainConfig, ConfigError};
use crate::core::ledger::phasing::{PhasingResult, VotingModel};
use crate::core::ledger::Ledger;
use crate::core::params::{
    key_block_version, pos_block_version, BACK_FEES_NUMERATORS, FORGER_MERKLE_FIXATION_LOCAL_HEIGHT,
    GENESIS_BLOCK_VERSION, INITIAL_BASE_TARGET, MAX_KEY_PAYLOAD_LENGTH, MAX_POS_PAYLOAD_LENGTH,
    MAX_ROLLBACK, MAX_TIMEDRIFT, MAX_WORK_TARGET_BITS, MIN_FORGING_BALANCE_COIN, ONE_COIN,
};
use crate::core::security::crypto::SecretPhrase;
use crate::core::state::merkle::{forgers_root, transactions_root};
use crate::core::state::store::{Table, VersionedStore};
use crate::core::tx::appendix::Attachment;
use crate::core::tx::coinbase::build_coinbase;
use crate::core::tx::pool::{Admission, UnconfirmedPool};
use crate::core::tx::registry::{ChainLookup, TransactionRegistry, ValidationContext};
use crate::core::tx::transaction::Transaction;
use crate::core::tx::{Duplicates, ValidationError};
use crate::core::types::{Clock, FullId, PublicKey, Signature, H256};
use crate::monitoring::metrics::Metrics;

use super::block::{payload_length, totals, Block, BlockHeader, BlockKind};
use super::blockchain::{Blockchain, ChainHead, LinkedBlock};
use super::errors::BlockError;
use super::events::{ChainEvent, EventBus};
use super::reward::{distribute, RewardInput};
use super::target::{
    generation_sequence, hit, hit_time, is_eligible, meets_target, next_base_target, next_work_required,
    stake_difficulty, window_start, work_difficulty,
};

/// Processor knobs taken from `[chain]`.
#[derive(Clone, Debug)]
pub struct ProcessorSettings {
    /// Generators exempt from the PoS eligibility check.
    pub fake_forgers: BTreeSet<FullId>,
    /// Block ids pinned at heights.
    pub checkpoints: BTreeMap<u32, u64>,
    /// Versioned history is kept this many blocks below the head.
    pub max_rollback: u32,
    /// Minimum advance of the trim floor between two trims (0 disables trimming).
    pub trim_frequency: u32,
    /// Unconfirmed pool capacity.
    pub pool_capacity: usize,
}

impl Default for ProcessorSettings {
    fn default() -> Self {
        Self {
            fake_forgers: BTreeSet::new(),
            checkpoints: BTreeMap::new(),
            max_rollback: MAX_ROLLBACK,
            trim_frequency: 1000,
            pool_capacity: 10_000,
        }
    }
}

impl ProcessorSettings {
    /// Settings from a chain config.
    pub fn from_config(chain: &ChainConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            fake_forgers: chain.fake_forgers()?,
            checkpoints: chain.checkpoint_ids()?,
            max_rollback: chain.max_rollback,
            trim_frequency: chain.trim_frequency,
            ..Self::default()
        })
    }
}

/// Genesis timestamp and allocations.
#[derive(Clone, Debug, Default)]
pub struct GenesisSpec {
    /// Genesis timestamp.
    pub timestamp: u64,
    /// Funded public keys.
    pub allocations: Vec<(PublicKey, i64)>,
}

impl GenesisSpec {
    /// Genesis from a chain config.
    pub fn from_config(chain: &ChainConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            timestamp: chain.genesis_timestamp,
            allocations: chain.genesis_allocations()?,
        })
    }

    /// The genesis block: unsigned, generated by the zero key, paying every allocation.
    pub fn block(&self) -> Result<Block, BlockError> {
        let mut recipients = BTreeMap::new();
        for (pk, amount) in &self.allocations {
            let slot = recipients.entry(FullId::from_public_key(pk)).or_insert(0i64);
            *slot = slot
                .checked_add(*amount)
                .ok_or_else(|| BlockError::Fatal("genesis allocation overflow".into()))?;
        }
        let coinbase = build_coinbase(PublicKey::ZERO, recipients, self.timestamp)
            .map_err(|e| BlockError::Fatal(format!("genesis coinbase: {e}")))?;
        let transactions = vec![coinbase];
        let mut header = BlockHeader {
            kind: BlockKind::Pos,
            version: GENESIS_BLOCK_VERSION,
            timestamp: self.timestamp,
            previous_block_id: 0,
            previous_block_hash: H256::ZERO,
            previous_key_block_id: 0,
            base_target: INITIAL_BASE_TARGET,
            bits: MAX_WORK_TARGET_BITS,
            nonce: 0,
            generator_public_key: PublicKey::ZERO,
            generation_sequence: H256::ZERO,
            transactions_root: H256::ZERO,
            forgers_root: H256::ZERO,
            payload_length: 0,
            total_amount: 0,
            total_fee: 0,
            total_reward: 0,
            signature: Signature::ZERO,
        };
        header.seal(&transactions);
        Ok(Block::new(header, transactions))
    }
}

/// Payload kept free for the coinbase when filling a generated block.
const COINBASE_RESERVE: usize = 512;

fn max_payload(kind: BlockKind) -> u32 {
    match kind {
        BlockKind::Pos => MAX_POS_PAYLOAD_LENGTH,
        BlockKind::Key => MAX_KEY_PAYLOAD_LENGTH,
    }
}

/// Position and cumulative difficulty of `block` on top of `head`.
fn link(head: &ChainHead, block: Arc<Block>) -> LinkedBlock {
    let prev = &head.last;
    let (local_height, added) = match block.kind() {
        BlockKind::Key => (prev.local_height + 1, work_difficulty(block.header().bits)),
        BlockKind::Pos => (prev.local_height, stake_difficulty(block.header().base_target)),
    };
    LinkedBlock {
        height: prev.height + 1,
        local_height,
        cumulative_difficulty: &prev.cumulative_difficulty + added,
        block,
    }
}

fn advance(head: &ChainHead, linked: &LinkedBlock) -> ChainHead {
    ChainHead {
        last: linked.clone(),
        last_key: match linked.block.kind() {
            BlockKind::Key => Some(linked.clone()),
            BlockKind::Pos => head.last_key.clone(),
        },
    }
}

/// A fork block that failed to apply.
#[derive(Debug)]
pub struct RejectedBlock {
    /// Its id.
    pub id: u64,
    /// Why.
    pub error: BlockError,
}

/// Result of offering a fork segment.
#[derive(Debug)]
pub struct ForkOutcome {
    /// True if the segment now forms the head.
    pub switched: bool,
    /// First segment block that failed, if any; blocks after it were not tried.
    pub rejected: Option<RejectedBlock>,
}

/// Validates, applies and detaches blocks.
pub struct BlockchainProcessor {
    chain: Blockchain,
    ledger: Ledger,
    registry: TransactionRegistry,
    pool: UnconfirmedPool,
    clock: Arc<dyn Clock>,
    settings: ProcessorSettings,
    genesis: GenesisSpec,
    events: EventBus,
    metrics: Option<Metrics>,
}

impl BlockchainProcessor {
    /// Open the chain stored in `store`, creating genesis on first start.
    pub fn open(
        store: Arc<dyn VersionedStore>,
        genesis: GenesisSpec,
        settings: ProcessorSettings,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, BlockError> {
        let ledger = Ledger::new(store.clone());
        let genesis_block = genesis.block()?;
        let head = match Blockchain::load_head(&store)? {
            Some(head) => head,
            None => ChainHead {
                last: LinkedBlock {
                    block: Arc::new(genesis_block.clone()),
                    height: 0,
                    local_height: 0,
                    cumulative_difficulty: BigUint::default(),
                },
                last_key: None,
            },
        };
        let fresh = head.height() == 0 && head.last.id() == genesis_block.id();
        let processor = Self {
            chain: Blockchain::new(store, head),
            ledger,
            registry: TransactionRegistry::standard(),
            pool: UnconfirmedPool::new(settings.pool_capacity),
            clock,
            settings,
            genesis,
            events: EventBus::default(),
            metrics: None,
        };
        match processor.chain.block_at(0)? {
            Some(stored) if stored.id() != genesis_block.id() => {
                return Err(BlockError::Fatal(format!(
                    "stored genesis {} differs from configured genesis {}",
                    stored.id(),
                    genesis_block.id()
                )));
            }
            Some(_) => {}
            None if fresh => {
                let genesis = processor.chain.last_block();
                processor.in_transaction(|| processor.apply_genesis(&genesis))?;
                info!(block_id = genesis.id(), "genesis block created");
            }
            None => return Err(BlockError::Fatal("head without genesis".into())),
        }
        info!(height = processor.chain.height(), "blockchain opened");
        Ok(processor)
    }

    /// Report to `metrics` from now on.
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        let head = self.chain.read();
        metrics.block_height.set(i64::from(head.height()));
        metrics.key_block_height.set(i64::from(head.local_height()));
        drop(head);
        self.metrics = Some(metrics);
        self
    }

    /// Chain state.
    pub fn chain(&self) -> &Blockchain {
        &self.chain
    }

    /// Ledger.
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Transaction type registry.
    pub fn registry(&self) -> &TransactionRegistry {
        &self.registry
    }

    /// Unconfirmed pool.
    pub fn pool(&self) -> &UnconfirmedPool {
        &self.pool
    }

    /// Event bus.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Deepest fork point followed, in blocks below the head.
    pub fn max_rollback(&self) -> u32 {
        self.settings.max_rollback
    }

    /// Wall clock.
    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    fn context(&self, height: u32, block_timestamp: u64) -> ValidationContext<'_> {
        ValidationContext {
            ledger: &self.ledger,
            chain: &self.chain,
            height,
            block_timestamp,
        }
    }

    fn in_transaction<T>(&self, f: impl FnOnce() -> Result<T, BlockError>) -> Result<T, BlockError> {
        let store = self.ledger.store();
        store.begin()?;
        let result = f().and_then(|v| {
            store.commit()?;
            Ok(v)
        });
        if result.is_err() {
            if let Err(e) = store.rollback() {
                error!(error = %e, "store rollback failed");
            }
            self.ledger.clear_cache();
        }
        result
    }

    /// Offer a transaction to the unconfirmed pool.
    pub fn add_transaction(&self, tx: Transaction) -> Result<Admission, ValidationError> {
        let head = self.chain.read();
        let ctx = self.context(head.height() + 1, self.clock.now());
        let admission = self.pool.add(tx, &self.registry, &ctx)?;
        if let Some(m) = &self.metrics {
            m.unconfirmed_transactions.set(self.pool.len() as i64);
        }
        Ok(admission)
    }

    /// Validate and apply `block` on top of the head.
    pub fn push_block(&self, block: Block) -> Result<LinkedBlock, BlockError> {
        let mut head = self.chain.write();
        self.push_locked(&mut head, block)
    }

    fn push_locked(&self, head: &mut ChainHead, block: Block) -> Result<LinkedBlock, BlockError> {
        let now = self.clock.now();
        let id = block.id();
        let result = self.validate_header(head, &block, now).and_then(|()| {
            let linked = link(head, Arc::new(block));
            self.validate_transactions(&linked, now)?;
            self.in_transaction(|| self.apply_block(&linked))?;
            Ok(linked)
        });
        let linked = match result {
            Ok(linked) => linked,
            Err(e) => {
                debug!(block_id = id, error = %e, "block not pushed");
                return Err(e);
            }
        };
        *head = advance(head, &linked);

        let txs = linked.block.transactions();
        self.pool.remove_confirmed(txs);
        if let Some(m) = &self.metrics {
            m.block_height.set(i64::from(linked.height));
            m.key_block_height.set(i64::from(linked.local_height));
            m.blocks_pushed_total.inc();
            m.transactions_total.inc_by(txs.len() as u64);
            m.unconfirmed_transactions.set(self.pool.len() as i64);
        }
        info!(
            height = linked.height,
            block_id = linked.id(),
            kind = ?linked.block.kind(),
            txs = txs.len(),
            "block pushed"
        );
        self.events.publish(ChainEvent::BlockPushed {
            height: linked.height,
            id: linked.id(),
            kind: linked.block.kind(),
        });
        Ok(linked)
    }

    fn expected_bits(&self, head: &ChainHead, local_height: u32) -> Result<u32, BlockError> {
        let Some(last_key) = &head.last_key else {
            return Ok(MAX_WORK_TARGET_BITS);
        };
        let first = self
            .chain
            .key_block_at(window_start(last_key.local_height))?
            .ok_or_else(|| BlockError::Fatal("missing key block in retarget window".into()))?;
        Ok(next_work_required(
            local_height,
            last_key.block.header().bits,
            first.timestamp(),
            last_key.timestamp(),
        ))
    }

    fn expected_forgers_root(&self, local_height: u32) -> Result<H256, BlockError> {
        if local_height < FORGER_MERKLE_FIXATION_LOCAL_HEIGHT {
            return Ok(H256::ZERO);
        }
        let root: Option<H256> =
            self.ledger
                .load(Table::ForgerRoot, &(local_height - 1).to_be_bytes(), None)?;
        Ok(root.unwrap_or(H256::ZERO))
    }

    fn validate_header(&self, head: &ChainHead, block: &Block, now: u64) -> Result<(), BlockError> {
        let prev = &head.last;
        let h = block.header();
        let height = prev.height + 1;
        if h.previous_block_id != prev.id() {
            return Err(BlockError::out_of_order(format!(
                "previous block {} is not the head {}",
                h.previous_block_id,
                prev.id()
            )));
        }
        let local_height = match h.kind {
            BlockKind::Key => prev.local_height + 1,
            BlockKind::Pos => prev.local_height,
        };
        let version = match h.kind {
            BlockKind::Key => key_block_version(local_height),
            BlockKind::Pos => pos_block_version(local_height),
        };
        if h.version != version {
            return Err(BlockError::not_accepted(format!("version {} expected {version}", h.version)));
        }
        if h.timestamp <= prev.timestamp() {
            return Err(BlockError::not_accepted("timestamp not after the previous block"));
        }
        if h.timestamp > now.saturating_add(MAX_TIMEDRIFT) {
            return Err(BlockError::out_of_order(format!(
                "timestamp {} ahead of local time {now}",
                h.timestamp
            )));
        }
        if h.previous_block_hash != prev.block.hash() {
            return Err(BlockError::not_accepted("previous block hash"));
        }
        if h.payload_length > max_payload(h.kind) {
            return Err(BlockError::not_accepted("payload too large"));
        }
        if block.transactions().len() > h.kind.max_transactions() {
            return Err(BlockError::not_accepted("too many transactions"));
        }
        if let Some(pinned) = self.settings.checkpoints.get(&height) {
            if *pinned != block.id() {
                return Err(BlockError::not_accepted(format!("checkpoint at height {height}")));
            }
        }
        if h.previous_key_block_id != head.last_key_id() {
            return Err(BlockError::not_accepted("previous key block"));
        }
        let prev_header = prev.block.header();
        if h.generation_sequence != generation_sequence(&prev_header.generation_sequence, &h.generator_public_key) {
            return Err(BlockError::not_accepted("generation sequence"));
        }
        match h.kind {
            BlockKind::Key => {
                if h.base_target != prev_header.base_target {
                    return Err(BlockError::not_accepted("key block changes the base target"));
                }
                if h.bits != self.expected_bits(head, local_height)? {
                    return Err(BlockError::not_accepted("work target"));
                }
                if !meets_target(&h.pow_hash(), h.bits) {
                    return Err(BlockError::not_accepted("insufficient proof of work"));
                }
                if h.forgers_root != self.expected_forgers_root(local_height)? {
                    return Err(BlockError::not_accepted("forgers root"));
                }
            }
            BlockKind::Pos => {
                if h.nonce != 0 {
                    return Err(BlockError::not_accepted("PoS block with a nonce"));
                }
                if h.bits != prev_header.bits {
                    return Err(BlockError::not_accepted("PoS block changes the work target"));
                }
                let elapsed = h.timestamp - prev.timestamp();
                if h.base_target != next_base_target(prev_header.base_target, elapsed) {
                    return Err(BlockError::not_accepted("base target"));
                }
                if !h.forgers_root.is_zero() {
                    return Err(BlockError::not_accepted("PoS block with a forgers root"));
                }
                let generator = block.generator_id();
                if !self.settings.fake_forgers.contains(&generator) {
                    let floor = self.chain.guaranteed_balance_height(prev.height)?;
                    let coins = self.ledger.effective_balance(generator, floor, prev.height)? / ONE_COIN;
                    if coins < MIN_FORGING_BALANCE_COIN {
                        return Err(BlockError::not_accepted(format!(
                            "generator {generator} has {coins} effective coins"
                        )));
                    }
                    if !is_eligible(hit(&h.generation_sequence), coins, prev_header.base_target, elapsed) {
                        return Err(BlockError::not_accepted(format!("generator {generator} not eligible")));
                    }
                }
            }
        }
        if !block.verify_signature() {
            return Err(BlockError::not_accepted("block signature"));
        }
        if !self
            .ledger
            .verify_public_key(block.generator_id(), &h.generator_public_key)?
        {
            return Err(BlockError::not_accepted("generator public key"));
        }
        Ok(())
    }

    fn previous_generators(&self, height: u32) -> Result<Vec<FullId>, BlockError> {
        let mut out = Vec::new();
        for back in 1..=BACK_FEES_NUMERATORS.len() as u32 {
            let Some(h) = height.checked_sub(back) else {
                break;
            };
            match self.chain.block_at(h)? {
                Some(b) => out.push(b.block.generator_id()),
                None => break,
            }
        }
        Ok(out)
    }

    fn reward_input(&self, linked: &LinkedBlock, txs: &[Transaction]) -> Result<RewardInput, BlockError> {
        let paying = txs.iter().filter(|t| !t.kind().is_coinbase());
        let fees = paying.clone().fold(0i64, |acc, t| acc.saturating_add(t.fee()));
        let pays_back_fees = paying
            .into_iter()
            .any(|t| !self.registry.is_back_fee_exempt(t.kind()));
        Ok(RewardInput {
            kind: linked.block.kind(),
            height: linked.height,
            local_height: linked.local_height,
            generator: linked.block.generator_id(),
            fees,
            pays_back_fees,
            previous_generators: self.previous_generators(linked.height)?,
        })
    }

    fn validate_transactions(&self, linked: &LinkedBlock, now: u64) -> Result<(), BlockError> {
        let block = &linked.block;
        let header = block.header();
        let txs = block.transactions();
        let coinbase = block
            .coinbase()
            .ok_or_else(|| BlockError::not_accepted("first transaction must be the coinbase"))?;
        if txs.iter().skip(1).any(|t| t.kind().is_coinbase()) {
            return Err(BlockError::not_accepted("more than one coinbase"));
        }
        if coinbase.sender_public_key() != &header.generator_public_key {
            return Err(BlockError::not_accepted("coinbase not sent by the generator"));
        }

        let ctx = self.context(linked.height, block.timestamp());
        let mut duplicates = Duplicates::new();
        let mut seen = HashSet::new();
        for tx in txs {
            let id = tx.id();
            if !seen.insert(id) {
                return Err(BlockError::transaction(id, ValidationError::not_valid("repeated in block")));
            }
            if !tx.verify_signature() {
                return Err(BlockError::transaction(id, ValidationError::not_valid("signature")));
            }
            if tx.timestamp() > now.saturating_add(MAX_TIMEDRIFT) {
                return Err(BlockError::transaction(
                    id,
                    ValidationError::not_currently_valid("timestamp ahead of local time"),
                ));
            }
            if self.chain.has_transaction(id)? {
                return Err(BlockError::transaction(id, ValidationError::not_valid("already confirmed")));
            }
            self.registry
                .validate(tx, &ctx)
                .map_err(|e| BlockError::transaction(id, e))?;
            if block.kind() == BlockKind::Key && !tx.kind().is_coinbase() && tx.amount() != 0 {
                return Err(BlockError::transaction(
                    id,
                    ValidationError::not_valid("key blocks carry no value transfers"),
                ));
            }
            if self.registry.is_block_duplicate(tx, &mut duplicates)
                || self.registry.is_duplicate(tx, &mut duplicates)
            {
                return Err(BlockError::transaction(
                    id,
                    ValidationError::not_currently_valid("duplicate within block"),
                ));
            }
        }

        let hashes: Vec<H256> = txs.iter().map(|t| t.full_hash()).collect();
        if transactions_root(&hashes) != header.transactions_root {
            return Err(BlockError::not_accepted("transactions root"));
        }
        if payload_length(txs) != header.payload_length {
            return Err(BlockError::not_accepted("payload length"));
        }
        let (amount, fee, reward) = totals(txs);
        if amount != header.total_amount || fee != header.total_fee || reward != header.total_reward {
            return Err(BlockError::not_accepted("header totals"));
        }
        let expected = distribute(&self.reward_input(linked, txs)?);
        match coinbase.attachment() {
            Attachment::Coinbase { recipients } if *recipients == expected => Ok(()),
            _ => Err(BlockError::not_accepted("coinbase does not match the reward distribution")),
        }
    }

    /// Apply a validated block; the caller holds the write lock and a store transaction.
    fn apply_block(&self, linked: &LinkedBlock) -> Result<(), BlockError> {
        let block = &linked.block;
        let height = linked.height;
        let txs = block.transactions();
        for tx in txs {
            if !self.registry.apply_unconfirmed(tx, &self.ledger, height)? {
                return Err(BlockError::DoubleSpending(format!(
                    "transaction {} cannot reserve its funds",
                    tx.id()
                )));
            }
        }
        for tx in txs {
            self.registry.apply(tx, &self.ledger, height)?;
        }
        let generator = block.generator_id();
        let forged = match block.coinbase().map(|c| c.attachment()) {
            Some(Attachment::Coinbase { recipients }) => recipients.get(&generator).copied().unwrap_or(0),
            _ => 0,
        };
        self.ledger.add_to_forged_balance(generator, forged, height)?;
        self.chain.save_block(linked)?;
        self.process_phasing(linked)?;
        self.ledger.process_leases(height)?;
        if block.kind() == BlockKind::Key {
            self.update_forgers_root(linked)?;
        }
        Ok(())
    }

    fn apply_genesis(&self, genesis: &LinkedBlock) -> Result<(), BlockError> {
        for (pk, _) in &self.genesis.allocations {
            self.ledger.apply_public_key(FullId::from_public_key(pk), pk, 0)?;
        }
        if let Some(Attachment::Coinbase { recipients }) = genesis.block.coinbase().map(|c| c.attachment()) {
            for (id, amount) in recipients {
                self.ledger.add_to_balance_and_unconfirmed(*id, *amount, 0, false)?;
            }
        }
        self.chain.save_block(genesis)?;
        Ok(())
    }

    /// Decide the phased transactions finishing at this block: polls whose finish height is
    /// reached and ACCOUNT polls whose approvals reached quorum in this block.
    fn process_phasing(&self, linked: &LinkedBlock) -> Result<(), BlockError> {
        let height = linked.height;
        let mut finishing: BTreeSet<(u32, u64)> = BTreeSet::new();
        for poll in self.ledger.phasing_polls_finishing_at(height)? {
            finishing.insert((poll.finish_height, poll.transaction_id));
        }
        for tx in linked.block.transactions() {
            let Attachment::PhasingVoteCasting {
                transaction_full_hashes,
            } = tx.attachment()
            else {
                continue;
            };
            for full_hash in transaction_full_hashes {
                let Some(poll) = self.ledger.phasing_poll(full_hash.id_prefix())? else {
                    continue;
                };
                // a poll reached by the sweep as well lands on the same set entry
                if poll.params.voting_model != VotingModel::Account || poll.finish_height < height {
                    continue;
                }
                if self.ledger.count_phasing_votes(&poll, height)? >= poll.params.quorum {
                    finishing.insert((poll.finish_height, poll.transaction_id));
                }
            }
        }

        let ctx = self.context(height, linked.block.timestamp());
        let mut duplicates = Duplicates::new();
        for (_, transaction_id) in finishing {
            if self.ledger.phasing_result(transaction_id)?.is_some() {
                continue;
            }
            let Some(poll) = self.ledger.phasing_poll(transaction_id)? else {
                continue;
            };
            let (_, tx) = self
                .chain
                .transaction_by_full_hash(&poll.full_hash)?
                .ok_or_else(|| BlockError::Fatal(format!("phased transaction {transaction_id} not stored")))?;
            let votes = self.ledger.count_phasing_votes(&poll, height)?;
            let mut approved = match poll.params.voting_model {
                VotingModel::None => true,
                _ => votes >= poll.params.quorum,
            };
            if approved {
                if let Err(e) = self.registry.validate_phased(&tx, &ctx) {
                    debug!(tx = transaction_id, error = %e, "approved phased transaction no longer valid");
                    approved = false;
                }
            }
            if approved && self.registry.is_duplicate(&tx, &mut duplicates) {
                debug!(tx = transaction_id, "phased transaction duplicates one finishing earlier");
                approved = false;
            }
            if approved {
                self.registry.apply_phased(&tx, &poll, &self.ledger, height)?;
            } else {
                self.registry.reject_phased(&tx, &poll, &self.ledger, height)?;
            }
            self.ledger.set_phasing_result(&PhasingResult {
                transaction_id,
                approved,
                result: votes,
                height,
            })?;
            debug!(tx = transaction_id, approved, height, "phasing finished");
        }
        Ok(())
    }

    fn update_forgers_root(&self, linked: &LinkedBlock) -> Result<(), BlockError> {
        let height = linked.height;
        let floor = self.chain.guaranteed_balance_height(height)?;
        let minimum = MIN_FORGING_BALANCE_COIN.saturating_mul(ONE_COIN);
        let mut entries = Vec::new();
        for account in self.ledger.accounts(None)? {
            let stake = self.ledger.effective_balance(account.id, floor, height)?;
            if stake >= minimum {
                entries.push((account.id, stake));
            }
        }
        let root = forgers_root(&entries);
        self.ledger.save(
            Table::ForgerRoot,
            &linked.local_height.to_be_bytes(),
            height,
            Some(&root),
        )?;
        Ok(())
    }

    /// Forger eligibility root recorded when the key block at `local_height` was applied.
    pub fn forgers_root_at(&self, local_height: u32) -> Result<Option<H256>, BlockError> {
        Ok(self
            .ledger
            .load(Table::ForgerRoot, &local_height.to_be_bytes(), None)?)
    }

    /// Detach every block above `height`; returns the detached blocks in chain order and
    /// returns their transactions to the pool. A no-op at or above the head.
    pub fn pop_off_to(&self, height: u32) -> Result<Vec<Arc<Block>>, BlockError> {
        let mut head = self.chain.write();
        let popped = self.pop_off_locked(&mut head, height)?;
        self.requeue(&head, &popped);
        Ok(popped)
    }

    fn pop_off_locked(&self, head: &mut ChainHead, height: u32) -> Result<Vec<Arc<Block>>, BlockError> {
        if height >= head.height() {
            return Ok(Vec::new());
        }
        let floor = self.chain.trim_floor()?;
        let (new_head, popped) = if height < floor {
            warn!(height, floor, "rollback below the trim floor, rescanning from genesis");
            self.in_transaction(|| {
                let (_, popped) = self.detach_above(head, height)?;
                Ok((self.rebuild(0, height, false)?, popped))
            })?
        } else {
            self.in_transaction(|| {
                let (last, popped) = self.detach_above(head, height)?;
                Ok((self.chain.head_at(last)?, popped))
            })?
        };
        let top = head.height();
        *head = new_head;
        self.ledger.clear_cache();

        for (i, block) in popped.iter().enumerate().rev() {
            let h = top - (popped.len() - 1 - i) as u32;
            self.events.publish(ChainEvent::BlockPopped { height: h, id: block.id() });
        }
        if let Some(m) = &self.metrics {
            m.block_height.set(i64::from(head.height()));
            m.key_block_height.set(i64::from(head.local_height()));
            m.blocks_popped_total.inc_by(popped.len() as u64);
        }
        info!(height, popped = popped.len(), "popped off");
        Ok(popped)
    }

    fn detach_above(&self, head: &ChainHead, height: u32) -> Result<(LinkedBlock, Vec<Arc<Block>>), BlockError> {
        let mut popped = Vec::new();
        let mut current = head.last.clone();
        while current.height > height {
            let previous = self
                .chain
                .block(current.block.previous_block_id())?
                .ok_or_else(|| BlockError::Fatal(format!("missing parent of block {}", current.id())))?;
            self.chain.remove_block(&current, previous.id())?;
            popped.push(current.block.clone());
            current = previous;
        }
        self.ledger.rollback_to(height)?;
        popped.reverse();
        Ok((current, popped))
    }

    /// Replay the stored blocks from `from` to `to`, rebuilding every derived table.
    /// Runs inside the caller's store transaction.
    fn rebuild(&self, from: u32, to: u32, validate: bool) -> Result<ChainHead, BlockError> {
        let mut blocks = Vec::new();
        for h in from..=to {
            blocks.push(
                self.chain
                    .block_at(h)?
                    .ok_or_else(|| BlockError::Fatal(format!("missing block at height {h}")))?,
            );
        }
        for b in blocks.iter().rev() {
            self.chain.remove_block(b, b.block.previous_block_id())?;
        }
        let mut current = if from == 0 {
            self.ledger.truncate()?;
            self.chain.set_trim_floor(0)?;
            None
        } else {
            self.ledger.rollback_to(from - 1)?;
            let previous = self
                .chain
                .block_at(from - 1)?
                .ok_or_else(|| BlockError::Fatal(format!("missing block at height {}", from - 1)))?;
            Some(self.chain.head_at(previous)?)
        };

        let now = self.clock.now();
        for stored in blocks {
            let next = match &current {
                None => {
                    self.apply_genesis(&stored)?;
                    ChainHead {
                        last: stored,
                        last_key: None,
                    }
                }
                Some(head) => {
                    if validate {
                        self.validate_header(head, &stored.block, now)?;
                    }
                    let linked = link(head, stored.block.clone());
                    if validate {
                        self.validate_transactions(&linked, now)?;
                        check_round_trip(&linked.block)?;
                    }
                    self.apply_block(&linked)?;
                    advance(head, &linked)
                }
            };
            current = Some(next);
        }
        current.ok_or_else(|| BlockError::Fatal("nothing to replay".into()))
    }

    /// Rebuild every derived table from the stored blocks starting at `height`; with
    /// `validate`, every block is re-validated and every transaction must survive a
    /// binary/JSON round trip. All-or-nothing.
    pub fn scan(&self, height: u32, validate: bool) -> Result<(), BlockError> {
        let mut head = self.chain.write();
        let top = head.height();
        let floor = self.chain.trim_floor()?;
        let from = if height == 0 || (floor > 0 && height <= floor) {
            0
        } else {
            height
        };
        if from > top {
            return Ok(());
        }
        let new_head = self.in_transaction(|| self.rebuild(from, top, validate))?;
        *head = new_head;
        self.ledger.clear_cache();
        info!(from_height = from, validate, "rescan finished");
        self.events.publish(ChainEvent::Rescanned { from_height: from });
        Ok(())
    }

    /// Offer a block received from a peer: it is pushed if it extends the head, and replaces
    /// the head if it competes with it and adds more cumulative difficulty. True if the head
    /// changed.
    pub fn process_peer_block(&self, block: Block) -> Result<bool, BlockError> {
        let head = self.chain.upgradable();
        let last = head.last.clone();
        if block.previous_block_id() == last.id() {
            let mut head = RwLockUpgradableReadGuard::upgrade(head);
            self.push_locked(&mut head, block)?;
            return Ok(true);
        }
        if block.id() == last.id() || self.chain.has_block(block.id())? {
            return Ok(false);
        }
        if last.height > 0 && block.previous_block_id() == last.block.previous_block_id() {
            let mut head = RwLockUpgradableReadGuard::upgrade(head);
            let outcome = self.process_fork_locked(&mut head, last.height - 1, vec![block])?;
            return match outcome.rejected {
                Some(rejected) => Err(rejected.error),
                None => Ok(outcome.switched),
            };
        }
        Err(BlockError::out_of_order(format!(
            "block {} neither extends nor competes with the head",
            block.id()
        )))
    }

    /// Switch to `blocks` (a segment starting right above `common_height`) if that yields
    /// strictly more cumulative difficulty; otherwise restore the original chain.
    pub fn process_fork(&self, common_height: u32, blocks: Vec<Block>) -> Result<ForkOutcome, BlockError> {
        let mut head = self.chain.write();
        self.process_fork_locked(&mut head, common_height, blocks)
    }

    fn process_fork_locked(
        &self,
        head: &mut ChainHead,
        common_height: u32,
        blocks: Vec<Block>,
    ) -> Result<ForkOutcome, BlockError> {
        if common_height > head.height() {
            return Err(BlockError::out_of_order("common block above the head"));
        }
        let before = head.last.cumulative_difficulty.clone();
        let original = self.pop_off_locked(head, common_height)?;

        let mut rejected = None;
        for block in blocks {
            let id = block.id();
            if let Err(error) = self.push_locked(head, block) {
                warn!(block_id = id, error = %error, "fork block rejected");
                rejected = Some(RejectedBlock { id, error });
                break;
            }
        }

        if head.last.cumulative_difficulty > before {
            if !original.is_empty() {
                if let Some(m) = &self.metrics {
                    m.reorganizations_total.inc();
                }
                info!(common_height, new_height = head.height(), "switched to fork");
                self.events.publish(ChainEvent::Reorganized {
                    common_height,
                    new_height: head.height(),
                });
                self.requeue(head, &original);
            }
            return Ok(ForkOutcome {
                switched: true,
                rejected,
            });
        }

        let discarded = self.pop_off_locked(head, common_height)?;
        for block in &original {
            let id = block.id();
            if let Err(e) = self.push_locked(head, block.as_ref().clone()) {
                error!(block_id = id, error = %e, "cannot restore the original chain");
                return Err(BlockError::Fatal(format!("cannot restore block {id}: {e}")));
            }
        }
        self.requeue(head, &discarded);
        if let Some(m) = &self.metrics {
            m.blocks_rejected_total.inc();
        }
        let reason = match &rejected {
            Some(r) => r.error.to_string(),
            None => "fork does not add cumulative difficulty".to_string(),
        };
        let id = match (&rejected, discarded.first()) {
            (Some(r), _) => r.id,
            (None, Some(b)) => b.id(),
            (None, None) => 0,
        };
        self.events.publish(ChainEvent::BlockRejected { id, reason });
        Ok(ForkOutcome {
            switched: false,
            rejected,
        })
    }

    fn requeue(&self, head: &ChainHead, blocks: &[Arc<Block>]) {
        if blocks.is_empty() {
            return;
        }
        let txs: Vec<Transaction> = blocks
            .iter()
            .flat_map(|b| b.transactions().iter().filter(|t| !t.kind().is_coinbase()).cloned())
            .collect();
        let ctx = self.context(head.height() + 1, self.clock.now());
        let admitted = self.pool.requeue(txs, &self.registry, &ctx);
        debug!(admitted, "transactions returned to the pool");
    }

    /// Earliest timestamp at which `public_key` may forge on the current head.
    pub fn next_hit_time(&self, public_key: &PublicKey) -> Result<Option<u64>, BlockError> {
        let head = self.chain.read();
        let prev = &head.last;
        let id = FullId::from_public_key(public_key);
        let floor = self.chain.guaranteed_balance_height(prev.height)?;
        let coins = self.ledger.effective_balance(id, floor, prev.height)? / ONE_COIN;
        if coins < MIN_FORGING_BALANCE_COIN {
            return Ok(None);
        }
        let gs = generation_sequence(&prev.block.header().generation_sequence, public_key);
        Ok(hit_time(hit(&gs), coins, prev.block.header().base_target, prev.timestamp()))
    }

    /// Forge and push a PoS block at `timestamp` from the best pool transactions.
    pub fn generate_block(&self, secret: &SecretPhrase, timestamp: u64) -> Result<LinkedBlock, BlockError> {
        let block = {
            let head = self.chain.read();
            self.prepare(&head, BlockKind::Pos, secret, timestamp, 0)?
        };
        self.push_generated(block)
    }

    /// Mine and push a key block at `timestamp`, trying at most `max_attempts` nonces.
    pub fn generate_key_block(
        &self,
        secret: &SecretPhrase,
        timestamp: u64,
        max_attempts: u64,
    ) -> Result<LinkedBlock, BlockError> {
        let block = {
            let head = self.chain.read();
            self.prepare(&head, BlockKind::Key, secret, timestamp, max_attempts)?
        };
        self.push_generated(block)
    }

    fn push_generated(&self, block: Block) -> Result<LinkedBlock, BlockError> {
        match self.push_block(block) {
            Err(BlockError::TransactionNotAccepted { id, reason }) => {
                if self.pool.evict(id).is_some() {
                    warn!(tx = id, error = %reason, "evicted transaction that poisoned a generated block");
                }
                Err(BlockError::TransactionNotAccepted { id, reason })
            }
            other => other,
        }
    }

    fn prepare(
        &self,
        head: &ChainHead,
        kind: BlockKind,
        secret: &SecretPhrase,
        timestamp: u64,
        max_attempts: u64,
    ) -> Result<Block, BlockError> {
        let pk = secret
            .public_key()
            .map_err(|e| BlockError::not_accepted(format!("generator key: {e}")))?;
        let prev = &head.last;
        let prev_header = prev.block.header();
        let height = prev.height + 1;
        let local_height = match kind {
            BlockKind::Key => prev.local_height + 1,
            BlockKind::Pos => prev.local_height,
        };

        let ctx = self.context(height, timestamp);
        let mut selected = Vec::new();
        let candidates = self.pool.select(
            &self.registry,
            kind.max_transactions().saturating_sub(1),
            (max_payload(kind) as usize).saturating_sub(COINBASE_RESERVE),
            timestamp,
        );
        for tx in candidates {
            if kind == BlockKind::Key && tx.amount() != 0 {
                continue;
            }
            match self.registry.validate(&tx, &ctx) {
                Ok(()) => selected.push(tx),
                Err(e) => {
                    debug!(tx = tx.id(), error = %e, "pool transaction dropped during generation");
                    self.pool.evict(tx.id());
                }
            }
        }

        let draft = LinkedBlock {
            block: Arc::new(Block::new(
                BlockHeader {
                    kind,
                    version: 0,
                    timestamp,
                    previous_block_id: prev.id(),
                    previous_block_hash: prev.block.hash(),
                    previous_key_block_id: head.last_key_id(),
                    base_target: 0,
                    bits: 0,
                    nonce: 0,
                    generator_public_key: pk,
                    generation_sequence: H256::ZERO,
                    transactions_root: H256::ZERO,
                    forgers_root: H256::ZERO,
                    payload_length: 0,
                    total_amount: 0,
                    total_fee: 0,
                    total_reward: 0,
                    signature: Signature::ZERO,
                },
                Vec::new(),
            )),
            height,
            local_height,
            cumulative_difficulty: BigUint::default(),
        };
        let recipients = distribute(&self.reward_input(&draft, &selected)?);
        let coinbase = build_coinbase(pk, recipients, timestamp).map_err(|e| BlockError::transaction(0, e))?;
        let mut transactions = Vec::with_capacity(selected.len() + 1);
        transactions.push(coinbase);
        transactions.extend(selected);

        let mut header = draft.block.header().clone();
        header.generation_sequence = generation_sequence(&prev_header.generation_sequence, &pk);
        match kind {
            BlockKind::Pos => {
                header.version = pos_block_version(local_height);
                header.base_target =
                    next_base_target(prev_header.base_target, timestamp.saturating_sub(prev.timestamp()));
                header.bits = prev_header.bits;
                Block::forge(header, transactions, secret)
                    .map_err(|e| BlockError::not_accepted(format!("signing: {e}")))
            }
            BlockKind::Key => {
                header.version = key_block_version(local_height);
                header.base_target = prev_header.base_target;
                header.bits = self.expected_bits(head, local_height)?;
                header.forgers_root = self.expected_forgers_root(local_height)?;
                header.seal(&transactions);
                if !header.mine(max_attempts) {
                    return Err(BlockError::out_of_order("no proof of work found"));
                }
                Block::sign_sealed(header, transactions, secret)
                    .map_err(|e| BlockError::not_accepted(format!("signing: {e}")))
            }
        }
    }

    /// Trim versioned history below `height - max_rollback` once the floor has advanced by
    /// `trim_frequency`, and expire prunable messages. Returns the new floor if trimmed.
    pub fn trim_derived_tables(&self) -> Result<Option<u32>, BlockError> {
        if self.settings.trim_frequency == 0 {
            return Ok(None);
        }
        // store writers hold an upgradable or exclusive guard, so the pending set is never shared
        let head = self.chain.upgradable();
        let height = head.height();
        let floor = height.saturating_sub(self.settings.max_rollback);
        let current = self.chain.trim_floor()?;
        if floor < current.saturating_add(self.settings.trim_frequency) {
            return Ok(None);
        }
        let store = self.ledger.store().clone();
        let removed = self.in_transaction(|| {
            let mut removed = 0usize;
            for table in Table::VERSIONED {
                removed += store.trim(table, floor)?;
            }
            self.ledger.expire_prunable_messages(height, floor)?;
            self.chain.set_trim_floor(floor)?;
            Ok(removed)
        })?;
        drop(head);
        info!(floor, removed, "derived tables trimmed");
        self.events.publish(ChainEvent::Trimmed { floor });
        Ok(Some(floor))
    }
}

fn check_round_trip(block: &Block) -> Result<(), BlockError> {
    for tx in block.transactions() {
        let id = tx.id();
        let json = tx.to_json().map_err(|e| BlockError::transaction(id, e))?;
        let back = Transaction::from_json(&json).map_err(|e| BlockError::transaction(id, e))?;
        if back.bytes() != tx.bytes() {
            return Err(BlockError::transaction(
                id,
                ValidationError::not_valid("JSON round trip changed the transaction"),
            ));
        }
    }
    let back = Block::from_json(&block.to_json()?)?;
    if back.bytes() != block.bytes() {
        return Err(BlockError::not_accepted("JSON round trip changed the block"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::state::store::SledStore;
    use crate::core::tx::transaction::TransactionBuilder;
    use crate::core::types::ManualClock;

    struct Node {
        processor: BlockchainProcessor,
        clock: Arc<ManualClock>,
        forger: SecretPhrase,
        rich: SecretPhrase,
    }

    fn node() -> Node {
        let forger = SecretPhrase::new("processor forger");
        let rich = SecretPhrase::new("processor rich");
        let clock = Arc::new(ManualClock::new(1_000));
        let genesis = GenesisSpec {
            timestamp: 1_000,
            allocations: vec![(rich.public_key().unwrap(), 10_000 * ONE_COIN)],
        };
        let settings = ProcessorSettings {
            fake_forgers: BTreeSet::from([FullId::from_public_key(&forger.public_key().unwrap())]),
            ..ProcessorSettings::default()
        };
        let store: Arc<dyn VersionedStore> = Arc::new(SledStore::temporary().unwrap());
        let processor = BlockchainProcessor::open(store, genesis, settings, clock.clone()).unwrap();
        Node {
            processor,
            clock,
            forger,
            rich,
        }
    }

    impl Node {
        fn forge(&self) -> LinkedBlock {
            self.clock.advance(60);
            self.processor
                .generate_block(&self.forger, self.clock.now())
                .unwrap()
        }

        fn payment(&self, amount: i64) -> Transaction {
            let genesis_id = self.processor.chain().block_id_at(0).unwrap().unwrap();
            TransactionBuilder::new(self.rich.public_key().unwrap(), Attachment::OrdinaryPayment)
                .timestamp(self.clock.now())
                .recipient(FullId::new(77, 0))
                .amount(amount)
                .fee(ONE_COIN)
                .ec_block(0, genesis_id)
                .sign(&self.rich)
                .unwrap()
        }
    }

    #[test]
    fn genesis_funds_allocations() {
        let n = node();
        let rich = FullId::from_public_key(&n.rich.public_key().unwrap());
        assert_eq!(n.processor.chain().height(), 0);
        assert_eq!(n.processor.ledger().balance(rich, None).unwrap(), 10_000 * ONE_COIN);
        assert_eq!(
            n.processor.ledger().public_key(rich).unwrap(),
            Some(n.rich.public_key().unwrap())
        );
    }

    #[test]
    fn payment_is_confirmed_and_fee_paid_to_generator() {
        let n = node();
        let tx = n.payment(5 * ONE_COIN);
        assert_eq!(n.processor.add_transaction(tx.clone()).unwrap(), Admission::Added);
        let linked = n.forge();
        assert_eq!(linked.block.transactions().len(), 2);
        assert!(n.processor.pool().is_empty());

        let ledger = n.processor.ledger();
        assert_eq!(ledger.balance(FullId::new(77, 0), None).unwrap(), 5 * ONE_COIN);
        let generator = FullId::from_public_key(&n.forger.public_key().unwrap());
        assert_eq!(ledger.balance(generator, None).unwrap(), ONE_COIN);
        assert_eq!(n.processor.chain().transaction(tx.id()).unwrap().unwrap().0, 1);
    }

    #[test]
    fn pop_off_returns_transactions_to_pool() {
        let n = node();
        n.forge();
        n.processor.add_transaction(n.payment(ONE_COIN)).unwrap();
        n.forge();
        let popped = n.processor.pop_off_to(1).unwrap();
        assert_eq!(popped.len(), 1);
        assert_eq!(n.processor.chain().height(), 1);
        assert_eq!(n.processor.pool().len(), 1);
        assert_eq!(
            n.processor.ledger().balance(FullId::new(77, 0), None).unwrap(),
            0
        );
        assert!(n.processor.pop_off_to(1).unwrap().is_empty());
    }

    #[test]
    fn tampered_coinbase_is_rejected_and_leaves_no_trace() {
        let n = node();
        n.clock.advance(60);
        let head = n.processor.chain().last_block();
        let pk = n.forger.public_key().unwrap();
        let generator = FullId::from_public_key(&pk);
        let coinbase = build_coinbase(pk, BTreeMap::from([(generator, ONE_COIN)]), n.clock.now()).unwrap();
        let header = BlockHeader {
            kind: BlockKind::Pos,
            version: pos_block_version(0),
            timestamp: n.clock.now(),
            previous_block_id: head.id(),
            previous_block_hash: head.block.hash(),
            previous_key_block_id: 0,
            base_target: next_base_target(head.block.header().base_target, 60),
            bits: head.block.header().bits,
            nonce: 0,
            generator_public_key: pk,
            generation_sequence: generation_sequence(&head.block.header().generation_sequence, &pk),
            transactions_root: H256::ZERO,
            forgers_root: H256::ZERO,
            payload_length: 0,
            total_amount: 0,
            total_fee: 0,
            total_reward: 0,
            signature: Signature::ZERO,
        };
        let block = Block::forge(header, vec![coinbase], &n.forger).unwrap();
        let err = n.processor.push_block(block).unwrap_err();
        assert!(err.is_content_error(), "{err}");
        assert_eq!(n.processor.chain().height(), 0);
        assert_eq!(n.processor.ledger().balance(generator, None).unwrap(), 0);
    }

    #[test]
    fn scan_with_validation_rebuilds_same_state() {
        let n = node();
        n.processor.add_transaction(n.payment(3 * ONE_COIN)).unwrap();
        n.forge();
        n.forge();
        let rich = FullId::from_public_key(&n.rich.public_key().unwrap());
        let before = n.processor.ledger().account(rich, None).unwrap();
        n.processor.scan(0, true).unwrap();
        assert_eq!(n.processor.chain().height(), 2);
        assert_eq!(n.processor.ledger().account(rich, None).unwrap(), before);
    }
}
