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

//! Assets and holdings. Holdings are keyed `asset_id || account` so the holders of an asset
//! are one prefix scan.

use serde::{Deserialize, Serialize};

use crate::core::ledger::{Ledger, LedgerError};
use crate::core::state::store::Table;
use crate::core::types::FullId;

/// An issued asset.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    /// Id (issuing transaction id).
    pub id: u64,
    /// Issuer.
    pub issuer: FullId,
    /// Name.
    pub name: String,
    /// Description.
    pub description: String,
    /// Quantity in circulation (QNT).
    pub quantity: i64,
    /// Quantity at issuance.
    pub initial_quantity: i64,
    /// Decimal places.
    pub decimals: u8,
}

/// Holding of one account in one asset.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountAsset {
    /// Holder.
    pub account: FullId,
    /// Asset.
    pub asset_id: u64,
    /// Confirmed quantity.
    pub quantity: i64,
    /// Quantity minus reservations.
    pub unconfirmed_quantity: i64,
}

fn holding_key(asset_id: u64, account: FullId) -> Vec<u8> {
    let mut key = asset_id.to_be_bytes().to_vec();
    key.extend_from_slice(&account.key_bytes());
    key
}

impl Ledger {
    /// Asset at-or-before `at`.
    pub fn asset(&self, id: u64, at: Option<u32>) -> Result<Option<Asset>, LedgerError> {
        self.load(Table::Asset, &id.to_be_bytes(), at)
    }

    /// Write an asset record.
    pub fn save_asset(&self, asset: &Asset, height: u32) -> Result<(), LedgerError> {
        self.save(Table::Asset, &asset.id.to_be_bytes(), height, Some(asset))
    }

    /// Holding of `account` in `asset_id`.
    pub fn account_asset(
        &self,
        account: FullId,
        asset_id: u64,
        at: Option<u32>,
    ) -> Result<Option<AccountAsset>, LedgerError> {
        self.load(Table::AccountAsset, &holding_key(asset_id, account), at)
    }

    /// Latest unconfirmed quantity held.
    pub fn unconfirmed_asset_balance(&self, account: FullId, asset_id: u64) -> Result<i64, LedgerError> {
        Ok(self
            .account_asset(account, asset_id, None)?
            .map(|h| h.unconfirmed_quantity)
            .unwrap_or(0))
    }

    /// Every holder of `asset_id` at-or-before `at`.
    pub fn asset_holders(&self, asset_id: u64, at: Option<u32>) -> Result<Vec<AccountAsset>, LedgerError> {
        self.load_all(Table::AccountAsset, &asset_id.to_be_bytes(), at)
    }

    fn update_holding(
        &self,
        account: FullId,
        asset_id: u64,
        confirmed: i64,
        unconfirmed: i64,
        height: u32,
    ) -> Result<(), LedgerError> {
        let mut h = self.account_asset(account, asset_id, None)?.unwrap_or(AccountAsset {
            account,
            asset_id,
            quantity: 0,
            unconfirmed_quantity: 0,
        });
        h.quantity = h
            .quantity
            .checked_add(confirmed)
            .ok_or(LedgerError::Overflow(account))?;
        h.unconfirmed_quantity = h
            .unconfirmed_quantity
            .checked_add(unconfirmed)
            .ok_or(LedgerError::Overflow(account))?;
        if h.quantity < 0 || h.unconfirmed_quantity < 0 || h.unconfirmed_quantity > h.quantity {
            return Err(LedgerError::AssetDoubleSpending {
                account,
                asset: asset_id,
            });
        }
        let value = if h.quantity == 0 && h.unconfirmed_quantity == 0 {
            None
        } else {
            Some(&h)
        };
        self.save(Table::AccountAsset, &holding_key(asset_id, account), height, value)
    }

    /// Change the confirmed quantity only.
    pub fn add_to_asset_balance(
        &self,
        account: FullId,
        asset_id: u64,
        quantity: i64,
        height: u32,
    ) -> Result<(), LedgerError> {
        self.update_holding(account, asset_id, quantity, 0, height)
    }

    /// Change the unconfirmed quantity only.
    pub fn add_to_unconfirmed_asset_balance(
        &self,
        account: FullId,
        asset_id: u64,
        quantity: i64,
        height: u32,
    ) -> Result<(), LedgerError> {
        self.update_holding(account, asset_id, 0, quantity, height)
    }

    /// Change both quantities.
    pub fn add_to_asset_and_unconfirmed(
        &self,
        account: FullId,
        asset_id: u64,
        quantity: i64,
        height: u32,
    ) -> Result<(), LedgerError> {
        self.update_holding(account, asset_id, quantity, quantity, height)
    }

    /// Burn `quantity` of `asset_id` held by `account`; the reservation was taken earlier.
    pub fn delete_asset_quantity(
        &self,
        account: FullId,
        asset_id: u64,
        quantity: i64,
        height: u32,
    ) -> Result<(), LedgerError> {
        let mut asset = self.asset(asset_id, None)?.ok_or(LedgerError::Missing("asset"))?;
        self.add_to_asset_balance(account, asset_id, -quantity, height)?;
        asset.quantity = asset.quantity.saturating_sub(quantity);
        self.save_asset(&asset, height)
    }
}
