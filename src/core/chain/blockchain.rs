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

//! Chain head tracker and block/transaction storage.
//!
//! The head sits behind one `parking_lot::RwLock`: readers share it, the sync loop holds the
//! upgradable guard while it decides, and every head transition takes the write guard. Block
//! and transaction rows live in the plain tables of the store and are read without the lock.

use num_bigint::BigUint;
use parking_lot::{RwLock, RwLockReadGuard, RwLockUpgradableReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::core::ledger::LedgerError;
use crate::core::params::GUARANTEED_BALANCE_KEYBLOCK_CONFIRMATIONS;
use crate::core::state::store::{Table, VersionedStore};
use crate::core::tx::registry::ChainLookup;
use crate::core::tx::transaction::Transaction;
use crate::core::types::{decode_record, encode_canonical, CodecError, H256};

use super::block::{Block, BlockKind};

const HEAD_KEY: &[u8] = b"head";
const TRIM_FLOOR_KEY: &[u8] = b"trim_floor";

/// A block together with its position on the chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkedBlock {
    /// The block.
    pub block: Arc<Block>,
    /// Height (both kinds).
    pub height: u32,
    /// Key blocks up to and including this one.
    pub local_height: u32,
    /// Cumulative difficulty up to and including this one.
    pub cumulative_difficulty: BigUint,
}

impl LinkedBlock {
    /// Block id.
    pub fn id(&self) -> u64 {
        self.block.id()
    }

    /// Block timestamp.
    pub fn timestamp(&self) -> u64 {
        self.block.timestamp()
    }
}

#[derive(Serialize, Deserialize)]
struct StoredBlock {
    bytes: Vec<u8>,
    height: u32,
    local_height: u32,
    cumulative_difficulty: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
struct StoredTransaction {
    height: u32,
    block_id: u64,
    bytes: Vec<u8>,
}

/// Current head and key-block head.
#[derive(Clone, Debug)]
pub struct ChainHead {
    /// Last accepted block.
    pub last: LinkedBlock,
    /// Last accepted key block, if any.
    pub last_key: Option<LinkedBlock>,
}

impl ChainHead {
    /// Head height.
    pub fn height(&self) -> u32 {
        self.last.height
    }

    /// Key-block local height of the head.
    pub fn local_height(&self) -> u32 {
        self.last.local_height
    }

    /// Id of the last key block, 0 if none.
    pub fn last_key_id(&self) -> u64 {
        self.last_key.as_ref().map(|k| k.id()).unwrap_or(0)
    }
}

/// Chain state shared by the processor, the sync loop and readers.
pub struct Blockchain {
    store: Arc<dyn VersionedStore>,
    head: RwLock<ChainHead>,
}

fn id_key(id: u64) -> [u8; 8] {
    id.to_be_bytes()
}

fn height_key(height: u32) -> [u8; 4] {
    height.to_be_bytes()
}

fn decode_id(raw: &[u8]) -> Result<u64, LedgerError> {
    let bytes: [u8; 8] = raw.try_into().map_err(|_| CodecError::Invalid("block id"))?;
    Ok(u64::from_be_bytes(bytes))
}

fn read_id(store: &dyn VersionedStore, table: Table, key: &[u8]) -> Result<Option<u64>, LedgerError> {
    match store.get(table, key)? {
        Some(raw) => Ok(Some(decode_id(&raw)?)),
        None => Ok(None),
    }
}

fn read_block(store: &dyn VersionedStore, id: u64) -> Result<Option<LinkedBlock>, LedgerError> {
    let Some(raw) = store.get(Table::Block, &id_key(id))? else {
        return Ok(None);
    };
    let stored: StoredBlock = decode_record(&raw)?;
    Ok(Some(LinkedBlock {
        block: Arc::new(Block::parse(&stored.bytes)?),
        height: stored.height,
        local_height: stored.local_height,
        cumulative_difficulty: BigUint::from_bytes_be(&stored.cumulative_difficulty),
    }))
}

fn head_for(store: &dyn VersionedStore, last: LinkedBlock) -> Result<ChainHead, LedgerError> {
    let last_key = match (last.local_height, last.block.kind()) {
        (0, _) => None,
        (_, BlockKind::Key) => Some(last.clone()),
        (local, BlockKind::Pos) => match read_id(store, Table::KeyBlock, &height_key(local))? {
            Some(id) => read_block(store, id)?,
            None => return Err(LedgerError::Missing("last key block")),
        },
    };
    Ok(ChainHead { last, last_key })
}

impl Blockchain {
    /// Chain over `store` with `head` as the current head.
    pub fn new(store: Arc<dyn VersionedStore>, head: ChainHead) -> Self {
        Self {
            store,
            head: RwLock::new(head),
        }
    }

    /// Head recorded in `store`, if any block was ever stored.
    pub fn load_head(store: &Arc<dyn VersionedStore>) -> Result<Option<ChainHead>, LedgerError> {
        let store = store.as_ref();
        let Some(head_id) = read_id(store, Table::Meta, HEAD_KEY)? else {
            return Ok(None);
        };
        let last = read_block(store, head_id)?.ok_or(LedgerError::Missing("head block"))?;
        head_for(store, last).map(Some)
    }

    /// Head whose last block is `last`.
    pub(crate) fn head_at(&self, last: LinkedBlock) -> Result<ChainHead, LedgerError> {
        head_for(self.store.as_ref(), last)
    }

    /// Backing store.
    pub fn store(&self) -> &Arc<dyn VersionedStore> {
        &self.store
    }

    /// Shared guard.
    pub fn read(&self) -> RwLockReadGuard<'_, ChainHead> {
        self.head.read()
    }

    /// Upgradable guard; at most one at a time, compatible with readers.
    pub fn upgradable(&self) -> RwLockUpgradableReadGuard<'_, ChainHead> {
        self.head.upgradable_read()
    }

    /// Exclusive guard.
    pub fn write(&self) -> RwLockWriteGuard<'_, ChainHead> {
        self.head.write()
    }

    /// Head height.
    pub fn height(&self) -> u32 {
        self.head.read().height()
    }

    /// Head block.
    pub fn last_block(&self) -> LinkedBlock {
        self.head.read().last.clone()
    }

    /// Last key block.
    pub fn last_key_block(&self) -> Option<LinkedBlock> {
        self.head.read().last_key.clone()
    }

    /// Stored block by id.
    pub fn block(&self, id: u64) -> Result<Option<LinkedBlock>, LedgerError> {
        read_block(self.store.as_ref(), id)
    }

    /// True if `id` is on the chain.
    pub fn has_block(&self, id: u64) -> Result<bool, LedgerError> {
        Ok(self.store.get(Table::Block, &id_key(id))?.is_some())
    }

    /// Id of the block at `height`.
    pub fn block_id_at(&self, height: u32) -> Result<Option<u64>, LedgerError> {
        read_id(self.store.as_ref(), Table::BlockHeight, &height_key(height))
    }

    /// Block at `height`.
    pub fn block_at(&self, height: u32) -> Result<Option<LinkedBlock>, LedgerError> {
        match self.block_id_at(height)? {
            Some(id) => self.block(id),
            None => Ok(None),
        }
    }

    /// Key block at `local_height` (local height 0 is genesis).
    pub fn key_block_at(&self, local_height: u32) -> Result<Option<LinkedBlock>, LedgerError> {
        if local_height == 0 {
            return self.block_at(0);
        }
        match read_id(self.store.as_ref(), Table::KeyBlock, &height_key(local_height))? {
            Some(id) => self.block(id),
            None => Ok(None),
        }
    }

    /// Height of the key block `GUARANTEED_BALANCE_KEYBLOCK_CONFIRMATIONS - 1` local heights
    /// behind the block at `height`; additions above it are not yet guaranteed.
    pub fn guaranteed_balance_height(&self, height: u32) -> Result<u32, LedgerError> {
        let Some(block) = self.block_at(height)? else {
            return Ok(0);
        };
        let back = GUARANTEED_BALANCE_KEYBLOCK_CONFIRMATIONS.saturating_sub(1);
        if block.local_height <= back {
            return Ok(0);
        }
        Ok(self
            .key_block_at(block.local_height - back)?
            .map(|k| k.height)
            .unwrap_or(0))
    }

    /// Confirmed transaction and its height.
    pub fn transaction(&self, id: u64) -> Result<Option<(u32, Transaction)>, LedgerError> {
        let Some(raw) = self.store.get(Table::Transaction, &id_key(id))? else {
            return Ok(None);
        };
        let stored: StoredTransaction = decode_record(&raw)?;
        Ok(Some((stored.height, Transaction::parse(&stored.bytes)?)))
    }

    /// Ids of up to `limit` blocks following `after_id`.
    pub fn next_block_ids(&self, after_id: u64, limit: usize) -> Result<Vec<u64>, LedgerError> {
        let Some(from) = self.block(after_id)? else {
            return Ok(Vec::new());
        };
        let mut out = Vec::new();
        let mut h = from.height + 1;
        while out.len() < limit {
            match self.block_id_at(h)? {
                Some(id) => out.push(id),
                None => break,
            }
            h += 1;
        }
        Ok(out)
    }

    /// Up to `limit` blocks following `after_id`.
    pub fn next_blocks(&self, after_id: u64, limit: usize) -> Result<Vec<Block>, LedgerError> {
        let mut out = Vec::new();
        for id in self.next_block_ids(after_id, limit)? {
            if let Some(b) = self.block(id)? {
                out.push(b.block.as_ref().clone());
            }
        }
        Ok(out)
    }

    /// Ids at the head and at exponentially spaced heights below it, ending at genesis.
    pub fn milestone_block_ids(&self) -> Result<Vec<u64>, LedgerError> {
        let top = self.height();
        let mut out = Vec::new();
        let mut h = top;
        let mut step = 1u32;
        loop {
            if let Some(id) = self.block_id_at(h)? {
                out.push(id);
            }
            if h == 0 {
                break;
            }
            if out.len() >= 10 {
                step = step.saturating_mul(2);
            }
            h = h.saturating_sub(step);
        }
        Ok(out)
    }

    /// Store the rows of `linked` (inside the caller's store transaction).
    pub(crate) fn save_block(&self, linked: &LinkedBlock) -> Result<(), LedgerError> {
        let block = &linked.block;
        let stored = StoredBlock {
            bytes: block.bytes(),
            height: linked.height,
            local_height: linked.local_height,
            cumulative_difficulty: linked.cumulative_difficulty.to_bytes_be(),
        };
        self.store
            .put(Table::Block, &id_key(block.id()), &encode_canonical(&stored)?)?;
        self.store
            .put(Table::BlockHeight, &height_key(linked.height), &id_key(block.id()))?;
        if block.kind() == BlockKind::Key {
            self.store.put(
                Table::KeyBlock,
                &height_key(linked.local_height),
                &id_key(block.id()),
            )?;
        }
        for tx in block.transactions() {
            let stored = StoredTransaction {
                height: linked.height,
                block_id: block.id(),
                bytes: tx.bytes(),
            };
            self.store
                .put(Table::Transaction, &id_key(tx.id()), &encode_canonical(&stored)?)?;
            self.store
                .put(Table::TransactionFullHash, tx.full_hash().as_bytes(), &id_key(tx.id()))?;
        }
        self.store.put(Table::Meta, HEAD_KEY, &id_key(block.id()))?;
        Ok(())
    }

    /// Delete the rows of `linked` and make `previous` the stored head.
    pub(crate) fn remove_block(&self, linked: &LinkedBlock, previous: u64) -> Result<(), LedgerError> {
        let block = &linked.block;
        for tx in block.transactions() {
            self.store.delete(Table::Transaction, &id_key(tx.id()))?;
            self.store
                .delete(Table::TransactionFullHash, tx.full_hash().as_bytes())?;
        }
        if block.kind() == BlockKind::Key {
            self.store
                .delete(Table::KeyBlock, &height_key(linked.local_height))?;
        }
        self.store.delete(Table::BlockHeight, &height_key(linked.height))?;
        self.store.delete(Table::Block, &id_key(block.id()))?;
        self.store.put(Table::Meta, HEAD_KEY, &id_key(previous))?;
        Ok(())
    }

    /// Delete every block row.
    pub(crate) fn truncate(&self) -> Result<(), LedgerError> {
        for table in Table::CHAIN {
            self.store.truncate(table)?;
        }
        self.store.delete(Table::Meta, HEAD_KEY)?;
        self.store.delete(Table::Meta, TRIM_FLOOR_KEY)?;
        Ok(())
    }

    /// Height below which versioned history has been trimmed.
    pub fn trim_floor(&self) -> Result<u32, LedgerError> {
        match self.store.get(Table::Meta, TRIM_FLOOR_KEY)? {
            Some(raw) => {
                let b: [u8; 4] = raw
                    .as_slice()
                    .try_into()
                    .map_err(|_| CodecError::Invalid("trim floor"))?;
                Ok(u32::from_be_bytes(b))
            }
            None => Ok(0),
        }
    }

    pub(crate) fn set_trim_floor(&self, floor: u32) -> Result<(), LedgerError> {
        self.store.put(Table::Meta, TRIM_FLOOR_KEY, &height_key(floor))?;
        Ok(())
    }
}

impl ChainLookup for Blockchain {
    fn block_id_at_height(&self, height: u32) -> Result<Option<u64>, LedgerError> {
        self.block_id_at(height)
    }

    fn transaction_by_full_hash(&self, full_hash: &H256) -> Result<Option<(u32, Transaction)>, LedgerError> {
        match read_id(self.store.as_ref(), Table::TransactionFullHash, full_hash.as_bytes())? {
            Some(id) => self.transaction(id),
            None => Ok(None),
        }
    }

    fn has_transaction(&self, id: u64) -> Result<bool, LedgerError> {
        Ok(self.store.get(Table::Transaction, &id_key(id))?.is_some())
    }
}
