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

//! Block processing errors.

use thiserror::Error;

use crate::core::ledger::LedgerError;
use crate::core::state::store::StoreError;
use crate::core::tx::ValidationError;
use crate::core::types::CodecError;

/// Why a block was not accepted.
#[derive(Debug, Error)]
pub enum BlockError {
    /// Structural, signature or content failure; the sender may be blacklisted.
    #[error("block not accepted: {0}")]
    NotAccepted(String),
    /// Ordering or timing problem; the block may be valid later.
    #[error("block out of order: {0}")]
    OutOfOrder(String),
    /// One of the block's transactions is invalid.
    #[error("transaction {id} not accepted: {reason}")]
    TransactionNotAccepted {
        /// Offending transaction.
        id: u64,
        /// Validation failure.
        reason: ValidationError,
    },
    /// Confirmed/unconfirmed balance invariant broken.
    #[error("double spending: {0}")]
    DoubleSpending(String),
    /// Store or ledger failure.
    #[error("ledger: {0}")]
    Ledger(LedgerError),
    /// The chain cannot be restored to a consistent state.
    #[error("fatal: {0}")]
    Fatal(String),
}

impl BlockError {
    pub(crate) fn not_accepted(msg: impl Into<String>) -> Self {
        Self::NotAccepted(msg.into())
    }

    pub(crate) fn out_of_order(msg: impl Into<String>) -> Self {
        Self::OutOfOrder(msg.into())
    }

    pub(crate) fn transaction(id: u64, reason: ValidationError) -> Self {
        Self::TransactionNotAccepted { id, reason }
    }

    /// True for content errors that justify blacklisting the peer that sent the block.
    pub fn is_content_error(&self) -> bool {
        matches!(
            self,
            Self::NotAccepted(_) | Self::TransactionNotAccepted { .. } | Self::DoubleSpending(_)
        )
    }
}

impl From<LedgerError> for BlockError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::DoubleSpending { .. } | LedgerError::AssetDoubleSpending { .. } => {
                Self::DoubleSpending(e.to_string())
            }
            other => Self::Ledger(other),
        }
    }
}

impl From<StoreError> for BlockError {
    fn from(e: StoreError) -> Self {
        Self::Ledger(LedgerError::Store(e))
    }
}

impl From<CodecError> for BlockError {
    fn from(e: CodecError) -> Self {
        Self::NotAccepted(format!("codec: {e}"))
    }
}
