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

//! Account control type (4): stake leasing and the phasing-only restriction.

use crate::core::ledger::phasing::VotingModel;
use crate::core::ledger::{Ledger, LedgerError};
use crate::core::params::{MAX_LEASING_PERIOD, MIN_LEASING_PERIOD};
use crate::core::tx::appendix::Attachment;
use crate::core::tx::registry::{
    missing_attachment, wrong_attachment, TransactionBehavior, ValidationContext,
};
use crate::core::tx::transaction::Transaction;
use crate::core::tx::{is_duplicate, Duplicates, TxKind, ValidationError};

/// Lease the sender's forging stake to the recipient for `period` blocks.
pub struct EffectiveBalanceLeasing;

impl TransactionBehavior for EffectiveBalanceLeasing {
    fn kind(&self) -> TxKind {
        TxKind::EFFECTIVE_BALANCE_LEASING
    }
    fn name(&self) -> &'static str {
        "EffectiveBalanceLeasing"
    }

    fn validate_attachment(&self, tx: &Transaction, ctx: &ValidationContext<'_>) -> Result<(), ValidationError> {
        let Attachment::EffectiveBalanceLeasing { period } = tx.attachment() else {
            return Err(wrong_attachment());
        };
        if tx.amount() != 0 {
            return Err(ValidationError::not_valid("amount must be zero"));
        }
        let lessee = tx
            .recipient()
            .ok_or_else(|| ValidationError::not_valid("lease needs a recipient"))?;
        if lessee == tx.sender_id() {
            return Err(ValidationError::not_valid("cannot lease to self"));
        }
        let period = *period as u32;
        if !(MIN_LEASING_PERIOD..=MAX_LEASING_PERIOD).contains(&period) {
            return Err(ValidationError::not_valid(format!("lease period {period} out of range")));
        }
        if ctx.ledger.public_key(lessee)?.is_none() && tx.public_key_announcement().is_none() {
            return Err(ValidationError::not_currently_valid("lessee has no public key"));
        }
        Ok(())
    }

    fn apply_attachment(&self, tx: &Transaction, ledger: &Ledger, height: u32) -> Result<(), LedgerError> {
        let Attachment::EffectiveBalanceLeasing { period } = tx.attachment() else {
            return Err(missing_attachment());
        };
        let lessee = tx.recipient().ok_or(LedgerError::Missing("recipient"))?;
        ledger.lease(tx.sender_id(), lessee, *period as u32, height)
    }

    fn is_block_duplicate(&self, tx: &Transaction, duplicates: &mut Duplicates) -> bool {
        is_duplicate(
            TxKind::EFFECTIVE_BALANCE_LEASING,
            &tx.sender_id().to_string(),
            duplicates,
            1,
        )
    }
}

/// Register (or clear, with voting model `None`) mandatory phasing parameters.
pub struct SetPhasingOnly;

impl TransactionBehavior for SetPhasingOnly {
    fn kind(&self) -> TxKind {
        TxKind::SET_PHASING_ONLY
    }
    fn name(&self) -> &'static str {
        "SetPhasingOnly"
    }
    fn can_have_recipient(&self) -> bool {
        false
    }
    fn must_have_recipient(&self) -> bool {
        false
    }
    fn is_phasing_safe(&self) -> bool {
        false
    }

    fn validate_attachment(&self, tx: &Transaction, _ctx: &ValidationContext<'_>) -> Result<(), ValidationError> {
        let Attachment::SetPhasingOnly { params } = tx.attachment() else {
            return Err(wrong_attachment());
        };
        if tx.amount() != 0 {
            return Err(ValidationError::not_valid("amount must be zero"));
        }
        params.validate().map_err(ValidationError::not_valid)
    }

    fn apply_attachment(&self, tx: &Transaction, ledger: &Ledger, height: u32) -> Result<(), LedgerError> {
        let Attachment::SetPhasingOnly { params } = tx.attachment() else {
            return Err(missing_attachment());
        };
        let control = (params.voting_model != VotingModel::None).then(|| params.clone());
        ledger.set_phasing_only(tx.sender_id(), control, height)
    }

    fn is_block_duplicate(&self, tx: &Transaction, duplicates: &mut Duplicates) -> bool {
        is_duplicate(TxKind::SET_PHASING_ONLY, &tx.sender_id().to_string(), duplicates, 1)
    }
}

pub(crate) fn behaviors() -> Vec<Box<dyn TransactionBehavior>> {
    vec![Box::new(EffectiveBalanceLeasing), Box::new(SetPhasingOnly)]
}
