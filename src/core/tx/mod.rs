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

//! Transactions: model, wire codec, fees, the (type, subtype) behavior registry and the
//! unconfirmed pool.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

use crate::core::ledger::LedgerError;
use crate::core::types::CodecError;

/// Account control transactions.
pub mod account_control;
/// Attachments and optional appendages with their wire encodings.
pub mod appendix;
/// Block reward transaction.
pub mod coinbase;
/// Assets.
pub mod colored_coins;
/// Fee schedules.
pub mod fee;
/// Messaging, aliases, polls, phasing votes, account info and properties.
pub mod messaging;
/// Plain payments.
pub mod payment;
/// Unconfirmed transaction pool.
pub mod pool;
/// Behavior registry and the generic validate/apply pipeline.
pub mod registry;
/// Immutable signed transaction.
pub mod transaction;

/// Transaction validation failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Permanently invalid.
    #[error("not valid: {0}")]
    NotValid(String),
    /// Possibly valid later or on another fork.
    #[error("not currently valid: {0}")]
    NotCurrentlyValid(String),
}

impl ValidationError {
    /// Permanently invalid.
    pub fn not_valid(msg: impl Into<String>) -> Self {
        Self::NotValid(msg.into())
    }

    /// Not valid right now.
    pub fn not_currently_valid(msg: impl Into<String>) -> Self {
        Self::NotCurrentlyValid(msg.into())
    }
}

impl From<CodecError> for ValidationError {
    fn from(e: CodecError) -> Self {
        Self::NotValid(format!("codec: {e}"))
    }
}

impl From<LedgerError> for ValidationError {
    fn from(e: LedgerError) -> Self {
        Self::NotCurrentlyValid(format!("ledger: {e}"))
    }
}

/// (type, subtype) pair.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TxKind {
    /// Type byte.
    #[serde(rename = "type")]
    pub ty: u8,
    /// Subtype (low nibble on the wire).
    pub subtype: u8,
}

impl TxKind {
    pub const ORDINARY_PAYMENT: TxKind = TxKind::new(0, 0);
    pub const ARBITRARY_MESSAGE: TxKind = TxKind::new(1, 0);
    pub const ALIAS_ASSIGNMENT: TxKind = TxKind::new(1, 1);
    pub const POLL_CREATION: TxKind = TxKind::new(1, 2);
    pub const VOTE_CASTING: TxKind = TxKind::new(1, 3);
    pub const PHASING_VOTE_CASTING: TxKind = TxKind::new(1, 4);
    pub const ACCOUNT_INFO: TxKind = TxKind::new(1, 5);
    pub const ALIAS_SELL: TxKind = TxKind::new(1, 6);
    pub const ALIAS_BUY: TxKind = TxKind::new(1, 7);
    pub const ALIAS_DELETE: TxKind = TxKind::new(1, 8);
    pub const ACCOUNT_PROPERTY: TxKind = TxKind::new(1, 10);
    pub const ACCOUNT_PROPERTY_DELETE: TxKind = TxKind::new(1, 11);
    pub const ASSET_ISSUANCE: TxKind = TxKind::new(2, 0);
    pub const ASSET_TRANSFER: TxKind = TxKind::new(2, 1);
    pub const DIVIDEND_PAYMENT: TxKind = TxKind::new(2, 6);
    pub const ASSET_DELETE: TxKind = TxKind::new(2, 7);
    pub const EFFECTIVE_BALANCE_LEASING: TxKind = TxKind::new(4, 0);
    pub const SET_PHASING_ONLY: TxKind = TxKind::new(4, 1);
    pub const COINBASE: TxKind = TxKind::new(9, 0);

    /// Construct.
    pub const fn new(ty: u8, subtype: u8) -> Self {
        Self { ty, subtype }
    }

    /// True for the block reward type.
    pub fn is_coinbase(self) -> bool {
        self == Self::COINBASE
    }
}

impl fmt::Debug for TxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxKind({}:{})", self.ty, self.subtype)
    }
}

/// Uniqueness buckets shared by every transaction of one block (or one generation round).
pub type Duplicates = HashMap<TxKind, HashMap<String, usize>>;

/// Count `key` in `bucket`; true if it had already reached `max_count`.
pub fn is_duplicate(bucket: TxKind, key: &str, duplicates: &mut Duplicates, max_count: usize) -> bool {
    let counts = duplicates.entry(bucket).or_default();
    let seen = counts.entry(key.to_string()).or_insert(0);
    if *seen >= max_count {
        return true;
    }
    *seen += 1;
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_buckets_count_per_key() {
        let mut d = Duplicates::new();
        assert!(!is_duplicate(TxKind::ALIAS_ASSIGNMENT, "amun", &mut d, 1));
        assert!(is_duplicate(TxKind::ALIAS_ASSIGNMENT, "amun", &mut d, 1));
        assert!(!is_duplicate(TxKind::ALIAS_ASSIGNMENT, "other", &mut d, 1));
        assert!(!is_duplicate(TxKind::POLL_CREATION, "amun", &mut d, 1));
    }
}
