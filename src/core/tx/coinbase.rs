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

//! Coinbase type (9): the first transaction of every block, paying the reward distribution.
//! Whether the map matches the recomputed distribution is a block-level check.

use std::collections::BTreeMap;

use crate::core::ledger::{Ledger, LedgerError};
use crate::core::params::MAX_BALANCE_NQT;
use crate::core::security::crypto::SecretPhrase;
use crate::core::tx::appendix::Attachment;
use crate::core::tx::fee::{Fee, NO_FEE};
use crate::core::tx::registry::{
    missing_attachment, wrong_attachment, TransactionBehavior, ValidationContext,
};
use crate::core::tx::transaction::{Transaction, TransactionBuilder};
use crate::core::tx::{is_duplicate, Duplicates, TxKind, ValidationError};
use crate::core::types::{FullId, PublicKey};

/// Reward distribution; unsigned, fee-free, recipient is the generator.
pub struct Coinbase;

impl TransactionBehavior for Coinbase {
    fn kind(&self) -> TxKind {
        TxKind::COINBASE
    }
    fn name(&self) -> &'static str {
        "Coinbase"
    }
    fn baseline_fee(&self) -> Fee {
        NO_FEE
    }
    fn is_back_fee_exempt(&self) -> bool {
        true
    }
    fn is_phasing_safe(&self) -> bool {
        false
    }

    fn validate_attachment(&self, tx: &Transaction, _ctx: &ValidationContext<'_>) -> Result<(), ValidationError> {
        let Attachment::Coinbase { recipients } = tx.attachment() else {
            return Err(wrong_attachment());
        };
        if tx.recipient() != Some(tx.sender_id()) {
            return Err(ValidationError::not_valid("coinbase recipient must be the generator"));
        }
        let mut total = 0i64;
        for (id, amount) in recipients {
            if *amount <= 0 {
                return Err(ValidationError::not_valid(format!("non-positive coinbase share for {id}")));
            }
            total = total
                .checked_add(*amount)
                .filter(|t| *t <= MAX_BALANCE_NQT)
                .ok_or_else(|| ValidationError::not_valid("coinbase total out of range"))?;
        }
        Ok(())
    }

    fn apply_attachment(&self, tx: &Transaction, ledger: &Ledger, height: u32) -> Result<(), LedgerError> {
        let Attachment::Coinbase { recipients } = tx.attachment() else {
            return Err(missing_attachment());
        };
        for (id, amount) in recipients {
            ledger.add_to_balance_and_unconfirmed(*id, *amount, height, true)?;
        }
        Ok(())
    }

    fn is_block_duplicate(&self, _tx: &Transaction, duplicates: &mut Duplicates) -> bool {
        is_duplicate(TxKind::COINBASE, "", duplicates, 1)
    }
}

/// Unsigned coinbase paying `recipients` at `timestamp`.
pub fn build_coinbase(
    generator: PublicKey,
    recipients: BTreeMap<FullId, i64>,
    timestamp: u64,
) -> Result<Transaction, ValidationError> {
    TransactionBuilder::new(generator, Attachment::Coinbase { recipients })
        .timestamp(timestamp)
        .recipient(FullId::from_public_key(&generator))
        .build_unsigned()
}

/// [`build_coinbase`] for the holder of `secret`.
pub fn build_coinbase_for(
    secret: &SecretPhrase,
    recipients: BTreeMap<FullId, i64>,
    timestamp: u64,
) -> Result<Transaction, ValidationError> {
    let pk = secret
        .public_key()
        .map_err(|_| ValidationError::not_valid("secret phrase"))?;
    build_coinbase(pk, recipients, timestamp)
}

pub(crate) fn behaviors() -> Vec<Box<dyn TransactionBehavior>> {
    vec![Box::new(Coinbase)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ledger::testutil::ledger;
    use crate::core::params::ONE_COIN;
    use crate::core::tx::registry::testutil::MemChain;
    use crate::core::tx::registry::TransactionRegistry;

    #[test]
    fn coinbase_credits_locked_balance() {
        let l = ledger();
        let chain = MemChain::with_blocks(2);
        let reg = TransactionRegistry::standard();
        let generator = SecretPhrase::new("generator");
        let gen_id = FullId::from_public_key(&generator.public_key().unwrap());
        let other = FullId::new(3, 3);
        let tx = build_coinbase_for(
            &generator,
            BTreeMap::from([(gen_id, 40 * ONE_COIN), (other, 10 * ONE_COIN)]),
            100,
        )
        .unwrap();
        assert!(tx.verify_signature());
        let ctx = ValidationContext {
            ledger: &l,
            chain: &chain,
            height: 2,
            block_timestamp: 100,
        };
        reg.validate(&tx, &ctx).unwrap();
        assert!(reg.apply_unconfirmed(&tx, &l, 2).unwrap());
        reg.apply(&tx, &l, 2).unwrap();
        assert_eq!(l.balance(gen_id, None).unwrap(), 40 * ONE_COIN);
        assert_eq!(l.locked_balance(gen_id, 1, 2).unwrap(), 40 * ONE_COIN);
        assert_eq!(l.guaranteed_balance(other, 1, 2).unwrap(), 0);
    }

    #[test]
    fn coinbase_must_stay_unsigned_and_free() {
        let l = ledger();
        let chain = MemChain::with_blocks(2);
        let reg = TransactionRegistry::standard();
        let generator = SecretPhrase::new("generator");
        let pk = generator.public_key().unwrap();
        let paid = TransactionBuilder::new(
            pk,
            Attachment::Coinbase {
                recipients: BTreeMap::new(),
            },
        )
        .timestamp(100)
        .recipient(FullId::from_public_key(&pk))
        .fee(ONE_COIN)
        .build_unsigned()
        .unwrap();
        let ctx = ValidationContext {
            ledger: &l,
            chain: &chain,
            height: 2,
            block_timestamp: 100,
        };
        assert!(matches!(reg.validate(&paid, &ctx), Err(ValidationError::NotValid(_))));
    }
}
