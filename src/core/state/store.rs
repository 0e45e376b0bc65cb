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

//! Versioned key/record store.
//!
//! Plain tables hold blocks and transaction indexes. Versioned tables hold height-stamped
//! records: every write is a new version at a height, reads resolve to the latest version
//! at-or-before a height, and `rollback_to` drops every version above a height.
//!
//! `SledStore` keeps all tables in one sled tree:
//! - plain key     = table_id || key
//! - versioned key = table_id || key || height (u32 BE)
//! - versioned value = 0x01 || record, or 0x00 for a deletion marker
//!
//! While a transaction is open, writes land in a pending set that reads see first;
//! `commit` applies the whole set in one sled transaction.

use parking_lot::Mutex;
use sled::transaction::ConflictableTransactionError;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::core::state::merkle::{merkle_root_sorted, Hash32};

/// State errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("db open")]
    DbOpen,
    #[error("db io")]
    DbIo,
    #[error("tx conflict")]
    TxConflict,
    #[error("corrupt record in {0:?}")]
    Corrupt(Table),
    #[error("table {0:?} is not versioned")]
    NotVersioned(Table),
    #[error("transaction already open")]
    NestedTransaction,
    #[error("no open transaction")]
    NoTransaction,
}

/// Logical tables.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Table {
    /// Node metadata (trim floor, ...).
    Meta = 1,
    /// Block id -> stored block.
    Block = 2,
    /// Height -> block id.
    BlockHeight = 3,
    /// Key-block local height -> block id.
    KeyBlock = 4,
    /// Transaction id -> stored transaction.
    Transaction = 5,
    /// Full hash -> transaction id.
    TransactionFullHash = 6,
    /// Accounts.
    Account = 20,
    /// Per-account asset holdings.
    AccountAsset = 21,
    /// Balance leases by lessor.
    AccountLease = 22,
    /// Account name/description.
    AccountInfo = 23,
    /// Account properties.
    AccountProperty = 24,
    /// Account public keys.
    PublicKey = 25,
    /// Per-height balance additions.
    GuaranteedBalance = 26,
    /// Assets.
    Asset = 27,
    /// Aliases by normalized name.
    Alias = 28,
    /// Alias sale offers.
    AliasOffer = 29,
    /// Polls.
    Poll = 30,
    /// Poll votes.
    Vote = 31,
    /// Phasing polls.
    PhasingPoll = 32,
    /// Phasing votes.
    PhasingVote = 33,
    /// Phasing poll outcomes.
    PhasingResult = 34,
    /// Prunable message bodies.
    PrunableMessage = 35,
    /// Forger-eligibility roots by key-block local height.
    ForgerRoot = 36,
    /// (finish height, transaction id) of undecided phasing polls.
    PhasingFinish = 37,
    /// (lessee, lessor) of every active lease.
    ActiveLease = 38,
}

impl Table {
    /// Every versioned (height-stamped) table.
    pub const VERSIONED: [Table; 19] = [
        Table::Account,
        Table::AccountAsset,
        Table::AccountLease,
        Table::AccountInfo,
        Table::AccountProperty,
        Table::PublicKey,
        Table::GuaranteedBalance,
        Table::Asset,
        Table::Alias,
        Table::AliasOffer,
        Table::Poll,
        Table::Vote,
        Table::PhasingPoll,
        Table::PhasingVote,
        Table::PhasingResult,
        Table::PrunableMessage,
        Table::ForgerRoot,
        Table::PhasingFinish,
        Table::ActiveLease,
    ];

    /// Plain tables holding the block chain itself.
    pub const CHAIN: [Table; 5] = [
        Table::Block,
        Table::BlockHeight,
        Table::KeyBlock,
        Table::Transaction,
        Table::TransactionFullHash,
    ];

    /// Key prefix byte.
    pub fn id(self) -> u8 {
        self as u8
    }

    /// True for height-stamped tables.
    pub fn is_versioned(self) -> bool {
        self.id() >= Table::Account.id()
    }
}

/// State operation.
#[derive(Clone, Debug)]
pub enum KvOp {
    /// Put key/value.
    Put { key: Vec<u8>, value: Vec<u8> },
    /// Delete key.
    Del { key: Vec<u8> },
}

/// Store contract the chain core depends on.
pub trait VersionedStore: Send + Sync {
    /// Open a write transaction.
    fn begin(&self) -> Result<(), StoreError>;
    /// Commit the open transaction atomically.
    fn commit(&self) -> Result<(), StoreError>;
    /// Discard the open transaction.
    fn rollback(&self) -> Result<(), StoreError>;
    /// True while a transaction is open.
    fn in_transaction(&self) -> bool;

    /// Plain get.
    fn get(&self, table: Table, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;
    /// Plain put.
    fn put(&self, table: Table, key: &[u8], value: &[u8]) -> Result<(), StoreError>;
    /// Plain delete.
    fn delete(&self, table: Table, key: &[u8]) -> Result<(), StoreError>;
    /// Ordered plain scan of keys starting at `from` (inclusive) up to `to` (exclusive).
    fn range(
        &self,
        table: Table,
        from: &[u8],
        to: Option<&[u8]>,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError>;

    /// Write a new version of `key` at `height`; `None` marks deletion.
    fn insert_version(
        &self,
        table: Table,
        key: &[u8],
        height: u32,
        value: Option<&[u8]>,
    ) -> Result<(), StoreError>;
    /// Latest version at-or-before `at` (`None` = newest).
    fn latest(&self, table: Table, key: &[u8], at: Option<u32>) -> Result<Option<Vec<u8>>, StoreError>;
    /// Versions of `key` with `after < height <= upto`, ascending.
    fn versions(
        &self,
        table: Table,
        key: &[u8],
        after: u32,
        upto: u32,
    ) -> Result<Vec<(u32, Option<Vec<u8>>)>, StoreError>;
    /// Latest live version at-or-before `at` of every key starting with `prefix`, ordered by key.
    fn latest_all(
        &self,
        table: Table,
        prefix: &[u8],
        at: Option<u32>,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError>;
    /// Delete every version above `height`.
    fn rollback_to(&self, table: Table, height: u32) -> Result<(), StoreError>;
    /// Drop versions older than the latest one at-or-before `floor`; returns how many went.
    fn trim(&self, table: Table, floor: u32) -> Result<usize, StoreError>;
    /// Delete every row of a table.
    fn truncate(&self, table: Table) -> Result<(), StoreError>;
}

type Pending = BTreeMap<Vec<u8>, Option<Vec<u8>>>;

/// Persistent store on sled.
pub struct SledStore {
    db: sled::Db,
    pending: Mutex<Option<Pending>>,
}

fn plain_key(table: Table, key: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + key.len());
    out.push(table.id());
    out.extend_from_slice(key);
    out
}

fn version_key(table: Table, key: &[u8], height: u32) -> Vec<u8> {
    let mut out = plain_key(table, key);
    out.extend_from_slice(&height.to_be_bytes());
    out
}

/// First key after every key starting with `prefix`, or `None` if unbounded.
fn prefix_end(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < u8::MAX {
            end.push(last + 1);
            return Some(end);
        }
    }
    None
}

fn split_version(table: Table, pkey: &[u8]) -> Result<(&[u8], u32), StoreError> {
    if pkey.len() < 5 {
        return Err(StoreError::Corrupt(table));
    }
    let (entity, h) = pkey.split_at(pkey.len() - 4);
    let mut hb = [0u8; 4];
    hb.copy_from_slice(h);
    Ok((&entity[1..], u32::from_be_bytes(hb)))
}

fn decode_version(table: Table, raw: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
    match raw.first() {
        Some(0) => Ok(None),
        Some(1) => Ok(Some(raw[1..].to_vec())),
        _ => Err(StoreError::Corrupt(table)),
    }
}

impl SledStore {
    /// Open sled DB at path (directory).
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let db = sled::open(path).map_err(|_| StoreError::DbOpen)?;
        Ok(Self {
            db,
            pending: Mutex::new(None),
        })
    }

    /// In-memory database, discarded on drop.
    pub fn temporary() -> Result<Self, StoreError> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|_| StoreError::DbOpen)?;
        Ok(Self {
            db,
            pending: Mutex::new(None),
        })
    }

    /// Flush to disk.
    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush().map(|_| ()).map_err(|_| StoreError::DbIo)
    }

    /// Atomic commit using sled transactions.
    pub fn commit_atomic(&self, ops: Vec<KvOp>) -> Result<(), StoreError> {
        let res: Result<(), sled::transaction::TransactionError<StoreError>> =
            self.db.transaction(|t| {
                for op in ops.iter() {
                    match op {
                        KvOp::Put { key, value } => {
                            t.insert(key.as_slice(), value.as_slice())
                                .map_err(|_| ConflictableTransactionError::Abort(StoreError::DbIo))?;
                        }
                        KvOp::Del { key } => {
                            t.remove(key.as_slice())
                                .map_err(|_| ConflictableTransactionError::Abort(StoreError::DbIo))?;
                        }
                    }
                }
                Ok(())
            });

        match res {
            Ok(()) => Ok(()),
            Err(sled::transaction::TransactionError::Abort(e)) => Err(e),
            Err(sled::transaction::TransactionError::Storage(_)) => Err(StoreError::DbIo),
        }
    }

    fn read_raw(&self, pkey: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        if let Some(p) = self.pending.lock().as_ref() {
            if let Some(v) = p.get(pkey) {
                return Ok(v.clone());
            }
        }
        let v = self.db.get(pkey).map_err(|_| StoreError::DbIo)?;
        Ok(v.map(|iv| iv.to_vec()))
    }

    fn write_raw(&self, pkey: Vec<u8>, value: Option<Vec<u8>>) -> Result<(), StoreError> {
        let mut guard = self.pending.lock();
        if let Some(p) = guard.as_mut() {
            p.insert(pkey, value);
            return Ok(());
        }
        drop(guard);
        match value {
            Some(v) => self.db.insert(pkey, v).map(|_| ()),
            None => self.db.remove(pkey).map(|_| ()),
        }
        .map_err(|_| StoreError::DbIo)
    }

    /// Merged (pending over committed) ordered view of `[start, end)`.
    fn scan_raw(&self, start: &[u8], end: Option<&[u8]>) -> Result<BTreeMap<Vec<u8>, Vec<u8>>, StoreError> {
        let mut out = BTreeMap::new();
        let iter = match end {
            Some(e) => self.db.range(start.to_vec()..e.to_vec()),
            None => self.db.range(start.to_vec()..),
        };
        for item in iter {
            let (k, v) = item.map_err(|_| StoreError::DbIo)?;
            out.insert(k.to_vec(), v.to_vec());
        }
        if let Some(p) = self.pending.lock().as_ref() {
            let overlay: Vec<(&Vec<u8>, &Option<Vec<u8>>)> = match end {
                Some(e) => p.range(start.to_vec()..e.to_vec()).collect(),
                None => p.range(start.to_vec()..).collect(),
            };
            for (k, v) in overlay {
                match v {
                    Some(v) => {
                        out.insert(k.clone(), v.clone());
                    }
                    None => {
                        out.remove(k);
                    }
                }
            }
        }
        Ok(out)
    }

    fn scan_table(&self, table: Table) -> Result<BTreeMap<Vec<u8>, Vec<u8>>, StoreError> {
        let start = [table.id()];
        let end = prefix_end(&start);
        self.scan_raw(&start, end.as_deref())
    }

    fn require_versioned(table: Table) -> Result<(), StoreError> {
        if table.is_versioned() {
            Ok(())
        } else {
            Err(StoreError::NotVersioned(table))
        }
    }

    /// Deterministic Merkle root over the live latest versions of `table`.
    pub fn table_root(&self, table: Table) -> Result<Hash32, StoreError> {
        let pairs = self.latest_all(table, &[], None)?;
        Ok(merkle_root_sorted(&pairs))
    }
}

impl VersionedStore for SledStore {
    fn begin(&self) -> Result<(), StoreError> {
        let mut guard = self.pending.lock();
        if guard.is_some() {
            return Err(StoreError::NestedTransaction);
        }
        *guard = Some(BTreeMap::new());
        Ok(())
    }

    fn commit(&self) -> Result<(), StoreError> {
        let pending = self.pending.lock().take().ok_or(StoreError::NoTransaction)?;
        let ops = pending
            .into_iter()
            .map(|(key, value)| match value {
                Some(value) => KvOp::Put { key, value },
                None => KvOp::Del { key },
            })
            .collect();
        self.commit_atomic(ops)
    }

    fn rollback(&self) -> Result<(), StoreError> {
        self.pending.lock().take();
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.pending.lock().is_some()
    }

    fn get(&self, table: Table, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        self.read_raw(&plain_key(table, key))
    }

    fn put(&self, table: Table, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.write_raw(plain_key(table, key), Some(value.to_vec()))
    }

    fn delete(&self, table: Table, key: &[u8]) -> Result<(), StoreError> {
        self.write_raw(plain_key(table, key), None)
    }

    fn range(
        &self,
        table: Table,
        from: &[u8],
        to: Option<&[u8]>,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        let start = plain_key(table, from);
        let end = match to {
            Some(t) => Some(plain_key(table, t)),
            None => prefix_end(&[table.id()]),
        };
        let rows = self.scan_raw(&start, end.as_deref())?;
        Ok(rows.into_iter().map(|(k, v)| (k[1..].to_vec(), v)).collect())
    }

    fn insert_version(
        &self,
        table: Table,
        key: &[u8],
        height: u32,
        value: Option<&[u8]>,
    ) -> Result<(), StoreError> {
        Self::require_versioned(table)?;
        let raw = match value {
            Some(v) => {
                let mut out = Vec::with_capacity(1 + v.len());
                out.push(1);
                out.extend_from_slice(v);
                out
            }
            None => vec![0],
        };
        self.write_raw(version_key(table, key, height), Some(raw))
    }

    fn latest(&self, table: Table, key: &[u8], at: Option<u32>) -> Result<Option<Vec<u8>>, StoreError> {
        Self::require_versioned(table)?;
        let start = version_key(table, key, 0);
        let end = match at {
            Some(h) if h < u32::MAX => Some(version_key(table, key, h + 1)),
            _ => prefix_end(&plain_key(table, key)),
        };
        let rows = self.scan_raw(&start, end.as_deref())?;
        let want = 1 + key.len() + 4;
        match rows.iter().rev().find(|(k, _)| k.len() == want) {
            Some((_, v)) => decode_version(table, v),
            None => Ok(None),
        }
    }

    fn versions(
        &self,
        table: Table,
        key: &[u8],
        after: u32,
        upto: u32,
    ) -> Result<Vec<(u32, Option<Vec<u8>>)>, StoreError> {
        Self::require_versioned(table)?;
        if after >= upto {
            return Ok(Vec::new());
        }
        let start = version_key(table, key, after + 1);
        let end = if upto < u32::MAX {
            Some(version_key(table, key, upto + 1))
        } else {
            prefix_end(&plain_key(table, key))
        };
        let want = 1 + key.len() + 4;
        let mut out = Vec::new();
        for (k, v) in self.scan_raw(&start, end.as_deref())? {
            if k.len() != want {
                continue;
            }
            let (_, h) = split_version(table, &k)?;
            out.push((h, decode_version(table, &v)?));
        }
        Ok(out)
    }

    fn latest_all(
        &self,
        table: Table,
        prefix: &[u8],
        at: Option<u32>,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        Self::require_versioned(table)?;
        let start = plain_key(table, prefix);
        let end = prefix_end(&start);
        let limit = at.unwrap_or(u32::MAX);
        let mut current: BTreeMap<Vec<u8>, Option<Vec<u8>>> = BTreeMap::new();
        for (k, v) in self.scan_raw(&start, end.as_deref())? {
            let (entity, h) = split_version(table, &k)?;
            if h > limit {
                continue;
            }
            // ascending heights per entity: the last write wins
            current.insert(entity.to_vec(), decode_version(table, &v)?);
        }
        Ok(current
            .into_iter()
            .filter_map(|(k, v)| v.map(|v| (k, v)))
            .collect())
    }

    fn rollback_to(&self, table: Table, height: u32) -> Result<(), StoreError> {
        Self::require_versioned(table)?;
        let mut doomed = Vec::new();
        for k in self.scan_table(table)?.into_keys() {
            let (_, h) = split_version(table, &k)?;
            if h > height {
                doomed.push(k);
            }
        }
        for k in doomed {
            self.write_raw(k, None)?;
        }
        Ok(())
    }

    fn trim(&self, table: Table, floor: u32) -> Result<usize, StoreError> {
        Self::require_versioned(table)?;
        let rows = self.scan_table(table)?;
        let mut doomed = Vec::new();
        let mut group: Vec<(Vec<u8>, bool)> = Vec::new();
        let mut group_entity: Option<Vec<u8>> = None;

        let flush = |group: &mut Vec<(Vec<u8>, bool)>, doomed: &mut Vec<Vec<u8>>| {
            if let Some((last_key, last_live)) = group.pop() {
                doomed.extend(group.drain(..).map(|(k, _)| k));
                if !last_live {
                    doomed.push(last_key);
                }
            }
        };

        for (k, v) in rows.iter() {
            let (entity, h) = split_version(table, k)?;
            if group_entity.as_deref() != Some(entity) {
                flush(&mut group, &mut doomed);
                group_entity = Some(entity.to_vec());
            }
            if h <= floor {
                group.push((k.clone(), decode_version(table, v)?.is_some()));
            }
        }
        flush(&mut group, &mut doomed);

        let n = doomed.len();
        for k in doomed {
            self.write_raw(k, None)?;
        }
        Ok(n)
    }

    fn truncate(&self, table: Table) -> Result<(), StoreError> {
        for k in self.scan_table(table)?.into_keys() {
            self.write_raw(k, None)?;
        }
        Ok(())
    }
}
