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

//! Accounts and balances.
//!
//! Invariant: `0 <= unconfirmed_balance <= balance` for every account but [`FullId::BURN`].
//! Guaranteed balance at height `h` with confirmation floor `f` is the balance at `h` minus
//! the positive additions recorded in `(f, h]`; the coinbase part of those additions is the
//! locked balance.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::core::ledger::phasing::PhasingParams;
use crate::core::ledger::{name_key, Ledger, LedgerError};
use crate::core::params::LEASING_DELAY;
use crate::core::security::crypto::keys_equal;
use crate::core::state::store::Table;
use crate::core::types::{FullId, PublicKey};

/// Account-level restrictions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ControlType {
    /// Every outgoing transaction must be phased with the account's registered parameters.
    PhasingOnly,
}

/// Account record.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Identity.
    pub id: FullId,
    /// Confirmed balance (NQT).
    pub balance: i64,
    /// Balance minus outstanding reservations.
    pub unconfirmed_balance: i64,
    /// Total collected as block generator.
    pub forged_balance: i64,
    /// Height of the last block that paid this account a generator reward.
    pub last_forged_height: u32,
    /// Lessee currently forging with this account's stake.
    pub active_lessee: Option<FullId>,
    /// Active controls.
    pub controls: BTreeSet<ControlType>,
    /// Parameters enforced under [`ControlType::PhasingOnly`].
    pub phasing_only: Option<PhasingParams>,
}

impl Account {
    /// Fresh, empty account.
    pub fn new(id: FullId) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    /// True when the record carries nothing and is stored as a deletion.
    pub fn is_empty(&self) -> bool {
        self.balance == 0
            && self.unconfirmed_balance == 0
            && self.forged_balance == 0
            && self.active_lessee.is_none()
            && self.controls.is_empty()
    }
}

/// Balance additions recorded at one height.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceAdditions {
    /// All positive additions.
    pub total: i64,
    /// The coinbase part of `total`.
    pub coinbase: i64,
}

/// One lease window `[from, to)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseWindow {
    /// Account forging with the leased stake.
    pub lessee: FullId,
    /// First height of the window.
    pub from: u32,
    /// First height after the window.
    pub to: u32,
}

/// Lease state of one lessor: at most one current and one queued window.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountLease {
    /// Lessor.
    pub lessor: FullId,
    /// Current (possibly not yet started) window.
    pub current: Option<LeaseWindow>,
    /// Window queued behind `current`.
    pub next: Option<LeaseWindow>,
}

/// Account name and description.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
    /// Account.
    pub account: FullId,
    /// Display name.
    pub name: String,
    /// Description.
    pub description: String,
}

/// A property set on `recipient` by `setter`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountProperty {
    /// Account the property is attached to.
    pub recipient: FullId,
    /// Account that set it.
    pub setter: FullId,
    /// Property name.
    pub name: String,
    /// Property value.
    pub value: String,
}

fn property_key(recipient: FullId, setter: FullId, name: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(56);
    key.extend_from_slice(&recipient.key_bytes());
    key.extend_from_slice(&setter.key_bytes());
    key.extend_from_slice(&name_key(name));
    key
}

fn lease_key(lessee: FullId, lessor: FullId) -> Vec<u8> {
    let mut key = lessee.key_bytes().to_vec();
    key.extend_from_slice(&lessor.key_bytes());
    key
}

fn check_balance(acc: &Account) -> Result<(), LedgerError> {
    if acc.id == FullId::BURN {
        return Ok(());
    }
    if acc.balance < 0 || acc.unconfirmed_balance < 0 || acc.unconfirmed_balance > acc.balance {
        return Err(LedgerError::DoubleSpending {
            account: acc.id,
            balance: acc.balance,
            unconfirmed: acc.unconfirmed_balance,
        });
    }
    Ok(())
}

fn checked(id: FullId, a: i64, b: i64) -> Result<i64, LedgerError> {
    a.checked_add(b).ok_or(LedgerError::Overflow(id))
}

impl Ledger {
    /// Account at-or-before `at` (`None` = latest).
    pub fn account(&self, id: FullId, at: Option<u32>) -> Result<Option<Account>, LedgerError> {
        self.load(Table::Account, &id.key_bytes(), at)
    }

    /// Latest account, or an empty one.
    pub fn get_or_create(&self, id: FullId) -> Result<Account, LedgerError> {
        Ok(self.account(id, None)?.unwrap_or_else(|| Account::new(id)))
    }

    /// Confirmed balance at-or-before `at`.
    pub fn balance(&self, id: FullId, at: Option<u32>) -> Result<i64, LedgerError> {
        Ok(self.account(id, at)?.map(|a| a.balance).unwrap_or(0))
    }

    /// Latest unconfirmed balance.
    pub fn unconfirmed_balance(&self, id: FullId) -> Result<i64, LedgerError> {
        Ok(self.account(id, None)?.map(|a| a.unconfirmed_balance).unwrap_or(0))
    }

    /// Every live account at-or-before `at`, ordered by id.
    pub fn accounts(&self, at: Option<u32>) -> Result<Vec<Account>, LedgerError> {
        self.load_all(Table::Account, &[], at)
    }

    /// Write a new version of `acc`; an empty account is stored as a deletion.
    pub fn save_account(&self, acc: &Account, height: u32) -> Result<(), LedgerError> {
        check_balance(acc)?;
        let value = if acc.is_empty() { None } else { Some(acc) };
        self.save(Table::Account, &acc.id.key_bytes(), height, value)
    }

    /// Change the confirmed balance only.
    pub fn add_to_balance(&self, id: FullId, amount: i64, height: u32) -> Result<(), LedgerError> {
        if amount == 0 {
            return Ok(());
        }
        let mut acc = self.get_or_create(id)?;
        acc.balance = checked(id, acc.balance, amount)?;
        self.save_account(&acc, height)?;
        if amount > 0 {
            self.add_to_guaranteed(id, amount, false, height)?;
        }
        Ok(())
    }

    /// Change the unconfirmed balance only.
    pub fn add_to_unconfirmed_balance(
        &self,
        id: FullId,
        amount: i64,
        height: u32,
    ) -> Result<(), LedgerError> {
        if amount == 0 {
            return Ok(());
        }
        let mut acc = self.get_or_create(id)?;
        acc.unconfirmed_balance = checked(id, acc.unconfirmed_balance, amount)?;
        self.save_account(&acc, height)
    }

    /// Change both balances; positive amounts are recorded for the guaranteed balance.
    pub fn add_to_balance_and_unconfirmed(
        &self,
        id: FullId,
        amount: i64,
        height: u32,
        coinbase: bool,
    ) -> Result<(), LedgerError> {
        if amount == 0 {
            return Ok(());
        }
        let mut acc = self.get_or_create(id)?;
        acc.balance = checked(id, acc.balance, amount)?;
        acc.unconfirmed_balance = checked(id, acc.unconfirmed_balance, amount)?;
        self.save_account(&acc, height)?;
        if amount > 0 {
            self.add_to_guaranteed(id, amount, coinbase, height)?;
        }
        Ok(())
    }

    /// Record a generator reward; a zero reward leaves the account untouched.
    pub fn add_to_forged_balance(&self, id: FullId, amount: i64, height: u32) -> Result<(), LedgerError> {
        if amount == 0 {
            return Ok(());
        }
        let mut acc = self.get_or_create(id)?;
        acc.forged_balance = checked(id, acc.forged_balance, amount)?;
        acc.last_forged_height = height;
        self.save_account(&acc, height)
    }

    fn add_to_guaranteed(
        &self,
        id: FullId,
        amount: i64,
        coinbase: bool,
        height: u32,
    ) -> Result<(), LedgerError> {
        let key = id.key_bytes();
        let mut entry: BalanceAdditions = self
            .load_exact(Table::GuaranteedBalance, &key, height)?
            .unwrap_or_default();
        entry.total = checked(id, entry.total, amount)?;
        if coinbase {
            entry.coinbase = checked(id, entry.coinbase, amount)?;
        }
        self.save(Table::GuaranteedBalance, &key, height, Some(&entry))
    }

    fn additions_since(&self, id: FullId, floor: u32, height: u32) -> Result<BalanceAdditions, LedgerError> {
        let mut sum = BalanceAdditions::default();
        for (_, raw) in self
            .store()
            .versions(Table::GuaranteedBalance, &id.key_bytes(), floor, height)?
        {
            if let Some(raw) = raw {
                let e: BalanceAdditions = crate::core::types::decode_record(&raw)?;
                sum.total = sum.total.saturating_add(e.total);
                sum.coinbase = sum.coinbase.saturating_add(e.coinbase);
            }
        }
        Ok(sum)
    }

    /// Balance at `height` excluding additions newer than the confirmation floor.
    pub fn guaranteed_balance(&self, id: FullId, floor: u32, height: u32) -> Result<i64, LedgerError> {
        let balance = self.balance(id, Some(height))?;
        let recent = self.additions_since(id, floor, height)?;
        Ok(balance.saturating_sub(recent.total).max(0))
    }

    /// Coinbase additions not yet past the confirmation floor.
    pub fn locked_balance(&self, id: FullId, floor: u32, height: u32) -> Result<i64, LedgerError> {
        Ok(self.additions_since(id, floor, height)?.coinbase)
    }

    /// Accounts whose stake is currently leased to `lessee`.
    pub fn lessors_of(&self, lessee: FullId, at: Option<u32>) -> Result<Vec<FullId>, LedgerError> {
        self.load_all(Table::ActiveLease, &lessee.key_bytes(), at)
    }

    /// Forging stake (NQT): own guaranteed balance unless leased out, plus leased-in stake.
    pub fn effective_balance(&self, id: FullId, floor: u32, height: u32) -> Result<i64, LedgerError> {
        let own = match self.account(id, Some(height))? {
            Some(acc) if acc.active_lessee.is_none() => self.guaranteed_balance(id, floor, height)?,
            _ => 0,
        };
        let mut total = own;
        for lessor in self.lessors_of(id, Some(height))? {
            total = total.saturating_add(self.guaranteed_balance(lessor, floor, height)?);
        }
        Ok(total)
    }

    /// Public key bound to `id`.
    pub fn public_key(&self, id: FullId) -> Result<Option<PublicKey>, LedgerError> {
        if let Some(pk) = self.public_keys.get(&id) {
            return Ok(Some(*pk));
        }
        let pk: Option<PublicKey> = self.load(Table::PublicKey, &id.key_bytes(), None)?;
        if let Some(pk) = pk {
            self.public_keys.insert(id, pk);
        }
        Ok(pk)
    }

    /// True if `pk` may sign for `id` (unbound, or bound to the same key).
    pub fn verify_public_key(&self, id: FullId, pk: &PublicKey) -> Result<bool, LedgerError> {
        if FullId::from_public_key(pk) != id {
            return Ok(false);
        }
        Ok(match self.public_key(id)? {
            Some(existing) => keys_equal(&existing, pk),
            None => true,
        })
    }

    /// Bind `pk` to `id` on first use; a different existing key is an error.
    pub fn apply_public_key(&self, id: FullId, pk: &PublicKey, height: u32) -> Result<(), LedgerError> {
        match self.public_key(id)? {
            Some(existing) if keys_equal(&existing, pk) => Ok(()),
            Some(_) => Err(LedgerError::PublicKeyMismatch(id)),
            None => {
                if FullId::from_public_key(pk) != id {
                    return Err(LedgerError::PublicKeyMismatch(id));
                }
                self.save(Table::PublicKey, &id.key_bytes(), height, Some(pk))?;
                self.public_keys.insert(id, *pk);
                Ok(())
            }
        }
    }

    /// Lease state of `lessor`.
    pub fn account_lease(&self, lessor: FullId) -> Result<Option<AccountLease>, LedgerError> {
        self.load(Table::AccountLease, &lessor.key_bytes(), None)
    }

    /// Start (or queue behind the current one) a lease of `period` blocks.
    pub fn lease(&self, lessor: FullId, lessee: FullId, period: u32, height: u32) -> Result<(), LedgerError> {
        let mut lease = self.account_lease(lessor)?.unwrap_or(AccountLease {
            lessor,
            current: None,
            next: None,
        });
        let start = height.saturating_add(LEASING_DELAY);
        match lease.current {
            None => {
                lease.current = Some(LeaseWindow {
                    lessee,
                    from: start,
                    to: start.saturating_add(period),
                });
            }
            Some(cur) => {
                let from = cur.to.max(start);
                lease.next = Some(LeaseWindow {
                    lessee,
                    from,
                    to: from.saturating_add(period),
                });
            }
        }
        self.save(Table::AccountLease, &lessor.key_bytes(), height, Some(&lease))
    }

    /// Start and end lease windows at `height`.
    pub fn process_leases(&self, height: u32) -> Result<(), LedgerError> {
        let leases: Vec<AccountLease> = self.load_all(Table::AccountLease, &[], None)?;
        for mut lease in leases {
            let mut acc = self.get_or_create(lease.lessor)?;
            let before = (lease.clone(), acc.active_lessee);

            if let Some(cur) = lease.current {
                if cur.to <= height {
                    acc.active_lessee = None;
                    lease.current = lease.next.take();
                }
            }
            if let Some(cur) = lease.current {
                if cur.from <= height && cur.to > height {
                    acc.active_lessee = Some(cur.lessee);
                }
            }

            if (lease.clone(), acc.active_lessee) == before {
                continue;
            }
            if acc.active_lessee != before.1 {
                if let Some(old) = before.1 {
                    self.save::<FullId>(Table::ActiveLease, &lease_key(old, lease.lessor), height, None)?;
                }
                if let Some(new) = acc.active_lessee {
                    self.save(Table::ActiveLease, &lease_key(new, lease.lessor), height, Some(&lease.lessor))?;
                }
            }
            self.save_account(&acc, height)?;
            let value = if lease.current.is_some() { Some(&lease) } else { None };
            self.save(Table::AccountLease, &lease.lessor.key_bytes(), height, value)?;
        }
        Ok(())
    }

    /// Name and description of `account`.
    pub fn account_info(&self, account: FullId) -> Result<Option<AccountInfo>, LedgerError> {
        self.load(Table::AccountInfo, &account.key_bytes(), None)
    }

    /// Set name and description; both empty removes the record.
    pub fn set_account_info(
        &self,
        account: FullId,
        name: &str,
        description: &str,
        height: u32,
    ) -> Result<(), LedgerError> {
        let info = AccountInfo {
            account,
            name: name.trim().to_string(),
            description: description.trim().to_string(),
        };
        let value = if info.name.is_empty() && info.description.is_empty() {
            None
        } else {
            Some(&info)
        };
        self.save(Table::AccountInfo, &account.key_bytes(), height, value)
    }

    /// Property `name` set on `recipient` by `setter`.
    pub fn account_property(
        &self,
        recipient: FullId,
        setter: FullId,
        name: &str,
    ) -> Result<Option<AccountProperty>, LedgerError> {
        self.load(Table::AccountProperty, &property_key(recipient, setter, name), None)
    }

    /// Set or overwrite a property.
    pub fn set_account_property(&self, prop: &AccountProperty, height: u32) -> Result<(), LedgerError> {
        let key = property_key(prop.recipient, prop.setter, &prop.name);
        self.save(Table::AccountProperty, &key, height, Some(prop))
    }

    /// Remove a property.
    pub fn delete_account_property(
        &self,
        recipient: FullId,
        setter: FullId,
        name: &str,
        height: u32,
    ) -> Result<(), LedgerError> {
        let key = property_key(recipient, setter, name);
        self.save::<AccountProperty>(Table::AccountProperty, &key, height, None)
    }

    /// Set (`Some`) or clear (`None`) the phasing-only control.
    pub fn set_phasing_only(
        &self,
        id: FullId,
        params: Option<PhasingParams>,
        height: u32,
    ) -> Result<(), LedgerError> {
        let mut acc = self.get_or_create(id)?;
        match params {
            Some(p) => {
                acc.controls.insert(ControlType::PhasingOnly);
                acc.phasing_only = Some(p);
            }
            None => {
                acc.controls.remove(&ControlType::PhasingOnly);
                acc.phasing_only = None;
            }
        }
        self.save_account(&acc, height)
    }
}
