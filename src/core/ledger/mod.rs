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

//! Height-versioned ledger: accounts and every satellite record keyed off them.
//!
//! Every mutation writes a new version at the height of the block being applied, so a
//! rollback is a `rollback_to` over the versioned tables rather than a replay.

use dashmap::DashMap;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::core::security::crypto::sha256;
use crate::core::state::store::{StoreError, Table, VersionedStore};
use crate::core::types::{decode_record, encode_canonical, CodecError, FullId, PublicKey};

/// Accounts, balances, leases, info, properties and public keys.
pub mod account;
/// Aliases and alias sale offers.
pub mod alias;
/// Assets and per-account holdings.
pub mod asset;
/// Phasing polls, votes and results.
pub mod phasing;
/// Polls and votes.
pub mod poll;
/// Prunable message bodies.
pub mod prunable;

/// Ledger errors.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("store: {0}")]
    Store(#[from] StoreError),
    #[error("codec: {0}")]
    Codec(#[from] CodecError),
    /// Confirmed/unconfirmed invariant broken.
    #[error("double spending by {account}: balance {balance}, unconfirmed {unconfirmed}")]
    DoubleSpending {
        account: FullId,
        balance: i64,
        unconfirmed: i64,
    },
    /// Asset quantity invariant broken.
    #[error("asset double spending by {account} on asset {asset}")]
    AssetDoubleSpending { account: FullId, asset: u64 },
    #[error("public key mismatch for {0}")]
    PublicKeyMismatch(FullId),
    #[error("balance overflow for {0}")]
    Overflow(FullId),
    #[error("missing {0}")]
    Missing(&'static str),
}

/// Versioned ledger over a [`VersionedStore`].
pub struct Ledger {
    store: Arc<dyn VersionedStore>,
    public_keys: DashMap<FullId, PublicKey>,
}

impl Ledger {
    /// Ledger over `store`.
    pub fn new(store: Arc<dyn VersionedStore>) -> Self {
        Self {
            store,
            public_keys: DashMap::new(),
        }
    }

    /// Backing store.
    pub fn store(&self) -> &Arc<dyn VersionedStore> {
        &self.store
    }

    pub(crate) fn load<T: DeserializeOwned>(
        &self,
        table: Table,
        key: &[u8],
        at: Option<u32>,
    ) -> Result<Option<T>, LedgerError> {
        match self.store.latest(table, key, at)? {
            Some(raw) => Ok(Some(decode_record(&raw)?)),
            None => Ok(None),
        }
    }

    pub(crate) fn save<T: Serialize>(
        &self,
        table: Table,
        key: &[u8],
        height: u32,
        value: Option<&T>,
    ) -> Result<(), LedgerError> {
        match value {
            Some(v) => {
                let raw = encode_canonical(v)?;
                self.store.insert_version(table, key, height, Some(&raw))?;
            }
            None => self.store.insert_version(table, key, height, None)?,
        }
        Ok(())
    }

    pub(crate) fn load_all<T: DeserializeOwned>(
        &self,
        table: Table,
        prefix: &[u8],
        at: Option<u32>,
    ) -> Result<Vec<T>, LedgerError> {
        self.store
            .latest_all(table, prefix, at)?
            .iter()
            .map(|(_, raw)| decode_record(raw).map_err(LedgerError::from))
            .collect()
    }

    /// The version written exactly at `height`, if any.
    pub(crate) fn load_exact<T: DeserializeOwned>(
        &self,
        table: Table,
        key: &[u8],
        height: u32,
    ) -> Result<Option<T>, LedgerError> {
        let raw = if height == 0 {
            self.store.latest(table, key, Some(0))?
        } else {
            self.store
                .versions(table, key, height - 1, height)?
                .into_iter()
                .next()
                .and_then(|(_, v)| v)
        };
        match raw {
            Some(raw) => Ok(Some(decode_record(&raw)?)),
            None => Ok(None),
        }
    }

    /// Drop every versioned record above `height`.
    pub fn rollback_to(&self, height: u32) -> Result<(), LedgerError> {
        for table in Table::VERSIONED {
            self.store.rollback_to(table, height)?;
        }
        self.clear_cache();
        Ok(())
    }

    /// Drop every versioned record.
    pub fn truncate(&self) -> Result<(), LedgerError> {
        for table in Table::VERSIONED {
            self.store.truncate(table)?;
        }
        self.clear_cache();
        Ok(())
    }

    /// Invalidate the public-key cache.
    pub fn clear_cache(&self) {
        self.public_keys.clear();
    }
}

/// Fixed-length key for a case-insensitive name.
pub fn name_key(name: &str) -> [u8; 32] {
    sha256(name.to_lowercase().as_bytes())
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;
    use crate::core::state::store::SledStore;

    pub fn ledger() -> Ledger {
        Ledger::new(Arc::new(SledStore::temporary().unwrap()))
    }
}
