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

use serde::{Deserialize, Serialize};

use crate::core::ledger::{name_key, Ledger, LedgerError};
use crate::core::state::store::Table;
use crate::core::types::FullId;

/// A registered alias; names compare case-insensitively.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alias {
    /// Id of the registering transaction.
    pub id: u64,
    /// Owner.
    pub owner: FullId,
    /// Name as registered.
    pub name: String,
    /// Target URI.
    pub uri: String,
    /// Timestamp of the last assignment.
    pub timestamp: u64,
}

/// An alias put up for sale.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasOffer {
    /// Alias name.
    pub name: String,
    /// Asking price (NQT).
    pub price: i64,
    /// Only this account may buy, when set.
    pub buyer: Option<FullId>,
}

impl Ledger {
    /// Alias by name.
    pub fn alias(&self, name: &str) -> Result<Option<Alias>, LedgerError> {
        self.load(Table::Alias, &name_key(name), None)
    }

    /// Write an alias.
    pub fn save_alias(&self, alias: &Alias, height: u32) -> Result<(), LedgerError> {
        self.save(Table::Alias, &name_key(&alias.name), height, Some(alias))
    }

    /// Remove an alias and any open offer.
    pub fn delete_alias(&self, name: &str, height: u32) -> Result<(), LedgerError> {
        let key = name_key(name);
        self.save::<Alias>(Table::Alias, &key, height, None)?;
        if self.alias_offer(name)?.is_some() {
            self.save::<AliasOffer>(Table::AliasOffer, &key, height, None)?;
        }
        Ok(())
    }

    /// Open offer for `name`.
    pub fn alias_offer(&self, name: &str) -> Result<Option<AliasOffer>, LedgerError> {
        self.load(Table::AliasOffer, &name_key(name), None)
    }

    /// Open or replace an offer.
    pub fn set_alias_offer(&self, offer: &AliasOffer, height: u32) -> Result<(), LedgerError> {
        self.save(Table::AliasOffer, &name_key(&offer.name), height, Some(offer))
    }

    /// Hand the alias to `new_owner` and close any offer.
    pub fn change_alias_owner(&self, name: &str, new_owner: FullId, height: u32) -> Result<(), LedgerError> {
        let mut alias = self.alias(name)?.ok_or(LedgerError::Missing("alias"))?;
        alias.owner = new_owner;
        self.save_alias(&alias, height)?;
        if self.alias_offer(name)?.is_some() {
            self.save::<AliasOffer>(Table::AliasOffer, &name_key(name), height, None)?;
        }
        Ok(())
    }
}
