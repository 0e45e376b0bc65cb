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

use crate::core::ledger::{Ledger, LedgerError};
use crate::core::tx::registry::{TransactionBehavior, ValidationContext};
use crate::core::tx::transaction::Transaction;
use crate::core::tx::{TxKind, ValidationError};

/// Plain value transfer; amount and fee are handled by the generic pipeline.
pub struct OrdinaryPayment;

impl TransactionBehavior for OrdinaryPayment {
    fn kind(&self) -> TxKind {
        TxKind::ORDINARY_PAYMENT
    }

    fn name(&self) -> &'static str {
        "OrdinaryPayment"
    }

    fn validate_attachment(&self, tx: &Transaction, _ctx: &ValidationContext<'_>) -> Result<(), ValidationError> {
        if tx.amount() <= 0 {
            return Err(ValidationError::not_valid("payment amount must be positive"));
        }
        Ok(())
    }

    fn apply_attachment(&self, _tx: &Transaction, _ledger: &Ledger, _height: u32) -> Result<(), LedgerError> {
        Ok(())
    }
}

pub(crate) fn behaviors() -> Vec<Box<dyn TransactionBehavior>> {
    vec![Box::new(OrdinaryPayment)]
}
