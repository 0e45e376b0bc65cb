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

//! (type, subtype) dispatch and the generic validate / reserve / apply pipeline.
//!
//! Behaviors only describe what is specific to their attachment. Everything every
//! transaction shares (amount and fee reservation, public key binding, phasing deferral,
//! referenced-transaction checks, EC block pin) lives here.

use std::collections::{BTreeMap, HashMap};

use crate::core::ledger::account::ControlType;
use crate::core::ledger::phasing::{HeldFunds, PhasingPoll};
use crate::core::ledger::prunable::PrunableMessage;
use crate::core::ledger::{Ledger, LedgerError};
use crate::core::params::{
    MAX_ARBITRARY_MESSAGE_LENGTH, MAX_BALANCE_NQT, MAX_ENCRYPTED_MESSAGE_LENGTH,
    MAX_PHASING_DURATION, MAX_REFERENCED_TRANSACTION_DEPTH, MAX_REFERENCED_TRANSACTION_TIMESPAN,
    MAX_TIMEDRIFT, MAX_TRANSACTION_BYTES, NEXT_FEE_HEIGHT, TRANSACTION_VERSION,
};
use crate::core::tx::fee::{Fee, DEFAULT_FEE, REFERENCED_TRANSACTION_DEPOSIT};
use crate::core::tx::transaction::Transaction;
use crate::core::tx::{
    account_control, coinbase, colored_coins, messaging, payment, Duplicates, TxKind,
    ValidationError,
};
use crate::core::types::{FullId, H256};

/// Read access to the confirmed chain needed by transaction validation.
pub trait ChainLookup: Send + Sync {
    /// Id of the block at `height` on the current chain.
    fn block_id_at_height(&self, height: u32) -> Result<Option<u64>, LedgerError>;
    /// Confirmed transaction with its inclusion height.
    fn transaction_by_full_hash(&self, full_hash: &H256)
        -> Result<Option<(u32, Transaction)>, LedgerError>;
    /// True if a transaction with `id` is confirmed.
    fn has_transaction(&self, id: u64) -> Result<bool, LedgerError>;
}

/// State a transaction is validated against.
pub struct ValidationContext<'a> {
    /// Ledger at the chain head.
    pub ledger: &'a Ledger,
    /// Confirmed chain.
    pub chain: &'a dyn ChainLookup,
    /// Height of the block the transaction would be included in.
    pub height: u32,
    /// Timestamp of that block.
    pub block_timestamp: u64,
}

/// Resource a transaction holds between inclusion and application.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reservation {
    /// NQT of the sender's unconfirmed balance.
    Balance(i64),
    /// Quantity of one of the sender's assets.
    Asset {
        /// Asset.
        asset_id: u64,
        /// Quantity.
        quantity: i64,
    },
}

/// Behavior of one (type, subtype).
pub trait TransactionBehavior: Send + Sync {
    /// Key in the registry.
    fn kind(&self) -> TxKind;
    /// Display name.
    fn name(&self) -> &'static str;
    /// Fee schedule below [`NEXT_FEE_HEIGHT`].
    fn baseline_fee(&self) -> Fee {
        DEFAULT_FEE
    }
    /// Fee schedule from [`NEXT_FEE_HEIGHT`] on.
    fn next_fee(&self) -> Fee {
        self.baseline_fee()
    }
    /// Whether a recipient is allowed at all.
    fn can_have_recipient(&self) -> bool {
        true
    }
    /// Whether a recipient is required.
    fn must_have_recipient(&self) -> bool {
        true
    }
    /// Blocks made only of exempt types pay no back fees.
    fn is_back_fee_exempt(&self) -> bool {
        false
    }
    /// Whether the type may carry a phasing appendage.
    fn is_phasing_safe(&self) -> bool {
        true
    }

    /// Attachment rules against current state.
    fn validate_attachment(
        &self,
        tx: &Transaction,
        ctx: &ValidationContext<'_>,
    ) -> Result<(), ValidationError>;

    /// Resources held besides amount and fee.
    fn reservations(&self, _tx: &Transaction, _ledger: &Ledger) -> Result<Vec<Reservation>, LedgerError> {
        Ok(Vec::new())
    }

    /// Commit attachment effects.
    fn apply_attachment(&self, tx: &Transaction, ledger: &Ledger, height: u32) -> Result<(), LedgerError>;

    /// Uniqueness that also holds for phased transactions finishing together.
    fn is_duplicate(&self, _tx: &Transaction, _duplicates: &mut Duplicates) -> bool {
        false
    }

    /// Uniqueness within one block.
    fn is_block_duplicate(&self, _tx: &Transaction, _duplicates: &mut Duplicates) -> bool {
        false
    }
}

pub(crate) fn wrong_attachment() -> ValidationError {
    ValidationError::not_valid("attachment does not match type")
}

pub(crate) fn missing_attachment() -> LedgerError {
    LedgerError::Missing("attachment")
}

/// Every known transaction type.
pub struct TransactionRegistry {
    behaviors: HashMap<TxKind, Box<dyn TransactionBehavior>>,
}

impl TransactionRegistry {
    /// Registry with every built-in type.
    pub fn standard() -> Self {
        let mut behaviors: HashMap<TxKind, Box<dyn TransactionBehavior>> = HashMap::new();
        let all = payment::behaviors()
            .into_iter()
            .chain(messaging::behaviors())
            .chain(colored_coins::behaviors())
            .chain(account_control::behaviors())
            .chain(coinbase::behaviors());
        for b in all {
            behaviors.insert(b.kind(), b);
        }
        Self { behaviors }
    }

    /// Behavior for `kind`.
    pub fn get(&self, kind: TxKind) -> Option<&dyn TransactionBehavior> {
        self.behaviors.get(&kind).map(|b| b.as_ref())
    }

    /// Registered kinds, sorted.
    pub fn kinds(&self) -> Vec<TxKind> {
        let mut kinds: Vec<TxKind> = self.behaviors.keys().copied().collect();
        kinds.sort();
        kinds
    }

    fn behavior(&self, kind: TxKind) -> Result<&dyn TransactionBehavior, ValidationError> {
        self.get(kind)
            .ok_or_else(|| ValidationError::not_valid(format!("unknown transaction type {kind:?}")))
    }

    /// True if `kind` pays no back fees.
    pub fn is_back_fee_exempt(&self, kind: TxKind) -> bool {
        self.get(kind).map(|b| b.is_back_fee_exempt()).unwrap_or(true)
    }

    /// Lowest fee `tx` may pay at `height`.
    pub fn minimum_fee(&self, tx: &Transaction, height: u32) -> Result<i64, ValidationError> {
        let b = self.behavior(tx.kind())?;
        let schedule = if height >= NEXT_FEE_HEIGHT {
            b.next_fee()
        } else {
            b.baseline_fee()
        };
        let mut fee = schedule
            .compute(tx.attachment().body_size())
            .saturating_add(tx.appendages_fee());
        if tx.referenced_full_hash().is_some() {
            fee = fee.saturating_add(REFERENCED_TRANSACTION_DEPOSIT);
        }
        Ok(fee)
    }

    /// Full validation of `tx` for inclusion at `ctx.height`.
    pub fn validate(&self, tx: &Transaction, ctx: &ValidationContext<'_>) -> Result<(), ValidationError> {
        let b = self.behavior(tx.kind())?;
        if tx.attachment().kind() != tx.kind() {
            return Err(wrong_attachment());
        }
        if tx.version() != TRANSACTION_VERSION {
            return Err(ValidationError::not_valid("unsupported transaction version"));
        }
        if tx.deadline() < 1 {
            return Err(ValidationError::not_valid("deadline"));
        }
        if tx.amount() < 0 || tx.amount() > MAX_BALANCE_NQT {
            return Err(ValidationError::not_valid("amount out of range"));
        }
        if tx.fee() < 0 || tx.fee() > MAX_BALANCE_NQT {
            return Err(ValidationError::not_valid("fee out of range"));
        }
        if tx.amount_plus_fee().map_or(true, |t| t > MAX_BALANCE_NQT) {
            return Err(ValidationError::not_valid("amount plus fee out of range"));
        }
        if tx.size() > MAX_TRANSACTION_BYTES {
            return Err(ValidationError::not_valid("transaction too large"));
        }

        if tx.kind().is_coinbase() {
            self.validate_coinbase_envelope(tx)?;
        } else {
            let min = self.minimum_fee(tx, ctx.height)?;
            if tx.fee() < min {
                return Err(ValidationError::not_valid(format!(
                    "fee {} below minimum {min}",
                    tx.fee()
                )));
            }
        }

        match (tx.recipient(), b.can_have_recipient(), b.must_have_recipient()) {
            (None, _, true) => return Err(ValidationError::not_valid("recipient required")),
            (Some(_), false, _) => return Err(ValidationError::not_valid("recipient not allowed")),
            _ => {}
        }

        self.validate_appendages(tx, b, ctx)?;
        if !tx.kind().is_coinbase() {
            check_referenced(tx, ctx)?;
            check_ec_block(tx, ctx)?;
        }

        if tx.timestamp() > ctx.block_timestamp.saturating_add(MAX_TIMEDRIFT) {
            return Err(ValidationError::not_currently_valid("timestamp ahead of block"));
        }
        if tx.expiration() < ctx.block_timestamp {
            return Err(ValidationError::not_currently_valid("expired"));
        }

        let sender = tx.sender_id();
        if !ctx.ledger.verify_public_key(sender, tx.sender_public_key())? {
            return Err(ValidationError::not_valid("sender public key mismatch"));
        }

        if tx.kind() != TxKind::SET_PHASING_ONLY {
            if let Some(acc) = ctx.ledger.account(sender, None)? {
                if acc.controls.contains(&ControlType::PhasingOnly) {
                    let ok = match (tx.phasing(), &acc.phasing_only) {
                        (Some(p), Some(required)) => &p.params == required,
                        _ => false,
                    };
                    if !ok {
                        return Err(ValidationError::not_currently_valid(
                            "account requires phasing with its registered parameters",
                        ));
                    }
                }
            }
        }

        b.validate_attachment(tx, ctx)
    }

    fn validate_coinbase_envelope(&self, tx: &Transaction) -> Result<(), ValidationError> {
        if tx.fee() != 0 || tx.amount() != 0 {
            return Err(ValidationError::not_valid("coinbase carries no amount or fee"));
        }
        if !tx.signature().is_zero() {
            return Err(ValidationError::not_valid("coinbase must be unsigned"));
        }
        if tx.referenced_full_hash().is_some()
            || tx.message().is_some()
            || tx.encrypted_message().is_some()
            || tx.public_key_announcement().is_some()
            || tx.phasing().is_some()
            || tx.prunable_plain_message().is_some()
        {
            return Err(ValidationError::not_valid("coinbase carries no appendages"));
        }
        Ok(())
    }

    fn validate_appendages(
        &self,
        tx: &Transaction,
        b: &dyn TransactionBehavior,
        ctx: &ValidationContext<'_>,
    ) -> Result<(), ValidationError> {
        if let Some(m) = tx.message() {
            if m.message.len() > MAX_ARBITRARY_MESSAGE_LENGTH {
                return Err(ValidationError::not_valid("message too long"));
            }
            if m.is_text && std::str::from_utf8(&m.message).is_err() {
                return Err(ValidationError::not_valid("message is not utf-8"));
            }
        }
        if let Some(m) = tx.encrypted_message() {
            if m.data.is_empty() || m.data.len() > MAX_ENCRYPTED_MESSAGE_LENGTH {
                return Err(ValidationError::not_valid("encrypted message length"));
            }
        }
        if let Some(a) = tx.public_key_announcement() {
            let recipient = tx
                .recipient()
                .ok_or_else(|| ValidationError::not_valid("announcement without recipient"))?;
            if FullId::from_public_key(&a.public_key) != recipient {
                return Err(ValidationError::not_valid("announced key does not match recipient"));
            }
            if !ctx.ledger.verify_public_key(recipient, &a.public_key)? {
                return Err(ValidationError::not_currently_valid("recipient bound to another key"));
            }
        }
        if let Some(p) = tx.phasing() {
            if !b.is_phasing_safe() {
                return Err(ValidationError::not_valid(format!("{} cannot be phased", b.name())));
            }
            if p.finish_height <= ctx.height
                || p.finish_height > ctx.height.saturating_add(MAX_PHASING_DURATION)
            {
                return Err(ValidationError::not_currently_valid("phasing finish height"));
            }
            p.params.validate().map_err(ValidationError::not_valid)?;
        }
        if let Some(p) = tx.prunable_plain_message() {
            if let Some(m) = &p.message {
                if p.is_text && std::str::from_utf8(m).is_err() {
                    return Err(ValidationError::not_valid("prunable message is not utf-8"));
                }
            }
        }
        Ok(())
    }

    /// Amount plus fee followed by the behavior's own reservations.
    pub fn reservations(&self, tx: &Transaction, ledger: &Ledger) -> Result<Vec<Reservation>, LedgerError> {
        let total = tx
            .amount_plus_fee()
            .ok_or(LedgerError::Overflow(tx.sender_id()))?;
        let mut out = vec![Reservation::Balance(total)];
        if let Some(b) = self.get(tx.kind()) {
            out.extend(b.reservations(tx, ledger)?);
        }
        Ok(out)
    }

    /// Take every reservation of `tx` from the sender's unconfirmed balances; false if any
    /// does not fit, in which case nothing is taken.
    pub fn apply_unconfirmed(&self, tx: &Transaction, ledger: &Ledger, height: u32) -> Result<bool, LedgerError> {
        let sender = tx.sender_id();
        let Some((balance, assets)) = aggregate(&self.reservations(tx, ledger)?) else {
            return Ok(false);
        };
        if ledger.unconfirmed_balance(sender)? < balance {
            return Ok(false);
        }
        for (asset_id, quantity) in &assets {
            if ledger.unconfirmed_asset_balance(sender, *asset_id)? < *quantity {
                return Ok(false);
            }
        }
        ledger.add_to_unconfirmed_balance(sender, -balance, height)?;
        for (asset_id, quantity) in assets {
            ledger.add_to_unconfirmed_asset_balance(sender, asset_id, -quantity, height)?;
        }
        Ok(true)
    }

    /// Return every reservation of `tx`.
    pub fn undo_unconfirmed(&self, tx: &Transaction, ledger: &Ledger, height: u32) -> Result<(), LedgerError> {
        let sender = tx.sender_id();
        let (balance, assets) =
            aggregate(&self.reservations(tx, ledger)?).ok_or(LedgerError::Overflow(sender))?;
        ledger.add_to_unconfirmed_balance(sender, balance, height)?;
        for (asset_id, quantity) in assets {
            ledger.add_to_unconfirmed_asset_balance(sender, asset_id, quantity, height)?;
        }
        Ok(())
    }

    /// Commit `tx` at `height`; its reservations were taken by [`Self::apply_unconfirmed`].
    /// A phased transaction only pays its fee and opens its poll.
    pub fn apply(&self, tx: &Transaction, ledger: &Ledger, height: u32) -> Result<(), LedgerError> {
        let sender = tx.sender_id();
        ledger.apply_public_key(sender, tx.sender_public_key(), height)?;
        if let (Some(a), Some(recipient)) = (tx.public_key_announcement(), tx.recipient()) {
            ledger.apply_public_key(recipient, &a.public_key, height)?;
        }
        if let Some(p) = tx.prunable_plain_message() {
            if let Some(message) = &p.message {
                ledger.add_prunable_message(&PrunableMessage {
                    transaction_id: tx.id(),
                    message: message.clone(),
                    is_text: p.is_text,
                    height,
                })?;
            }
        }
        if let Some(p) = tx.phasing() {
            let (balance, assets) =
                aggregate(&self.reservations(tx, ledger)?).ok_or(LedgerError::Overflow(sender))?;
            ledger.add_to_balance(sender, -tx.fee(), height)?;
            return ledger.add_phasing_poll(
                &PhasingPoll {
                    transaction_id: tx.id(),
                    full_hash: tx.full_hash(),
                    account: sender,
                    finish_height: p.finish_height,
                    params: p.params.clone(),
                    held: HeldFunds { balance, assets },
                },
                height,
            );
        }
        let total = tx.amount_plus_fee().ok_or(LedgerError::Overflow(sender))?;
        ledger.add_to_balance(sender, -total, height)?;
        self.apply_effects(tx, ledger, height)
    }

    /// Type-specific checks re-run when an approved phased transaction finishes.
    pub fn validate_phased(&self, tx: &Transaction, ctx: &ValidationContext<'_>) -> Result<(), ValidationError> {
        self.behavior(tx.kind())?.validate_attachment(tx, ctx)
    }

    /// Execute an approved phased transaction; only its fee was paid so far. The
    /// unconfirmed balances are settled against what `poll` held, in case the effects
    /// now take a different amount.
    pub fn apply_phased(
        &self,
        tx: &Transaction,
        poll: &PhasingPoll,
        ledger: &Ledger,
        height: u32,
    ) -> Result<(), LedgerError> {
        let sender = tx.sender_id();
        let (balance, assets) =
            aggregate(&self.reservations(tx, ledger)?).ok_or(LedgerError::Overflow(sender))?;
        let mut settle = poll.held.assets.clone();
        for (asset_id, quantity) in assets {
            let slot = settle.entry(asset_id).or_insert(0);
            *slot = slot.saturating_sub(quantity);
        }
        ledger.add_to_unconfirmed_balance(sender, poll.held.balance.saturating_sub(balance), height)?;
        for (asset_id, quantity) in settle {
            if quantity != 0 {
                ledger.add_to_unconfirmed_asset_balance(sender, asset_id, quantity, height)?;
            }
        }
        ledger.add_to_balance(sender, -tx.amount(), height)?;
        self.apply_effects(tx, ledger, height)
    }

    /// Release everything `poll` held for a rejected phased transaction except its fee.
    pub fn reject_phased(
        &self,
        tx: &Transaction,
        poll: &PhasingPoll,
        ledger: &Ledger,
        height: u32,
    ) -> Result<(), LedgerError> {
        let sender = tx.sender_id();
        ledger.add_to_unconfirmed_balance(sender, poll.held.balance.saturating_sub(tx.fee()), height)?;
        for (asset_id, quantity) in &poll.held.assets {
            ledger.add_to_unconfirmed_asset_balance(sender, *asset_id, *quantity, height)?;
        }
        Ok(())
    }

    fn apply_effects(&self, tx: &Transaction, ledger: &Ledger, height: u32) -> Result<(), LedgerError> {
        if let Some(recipient) = tx.recipient() {
            ledger.add_to_balance_and_unconfirmed(recipient, tx.amount(), height, false)?;
        }
        match self.get(tx.kind()) {
            Some(b) => b.apply_attachment(tx, ledger, height),
            None => Err(LedgerError::Missing("transaction type")),
        }
    }

    /// Uniqueness check shared by block validation and generation.
    pub fn is_duplicate(&self, tx: &Transaction, duplicates: &mut Duplicates) -> bool {
        self.get(tx.kind())
            .map(|b| b.is_duplicate(tx, duplicates))
            .unwrap_or(false)
    }

    /// One-per-block check.
    pub fn is_block_duplicate(&self, tx: &Transaction, duplicates: &mut Duplicates) -> bool {
        self.get(tx.kind())
            .map(|b| b.is_block_duplicate(tx, duplicates))
            .unwrap_or(false)
    }
}

type Aggregated = (i64, BTreeMap<u64, i64>);

fn aggregate(reservations: &[Reservation]) -> Option<Aggregated> {
    let mut balance = 0i64;
    let mut assets = BTreeMap::new();
    for r in reservations {
        match *r {
            Reservation::Balance(n) => balance = balance.checked_add(n)?,
            Reservation::Asset { asset_id, quantity } => {
                let slot = assets.entry(asset_id).or_insert(0i64);
                *slot = slot.checked_add(quantity)?;
            }
        }
    }
    Some((balance, assets))
}

fn check_referenced(tx: &Transaction, ctx: &ValidationContext<'_>) -> Result<(), ValidationError> {
    let mut next = tx.referenced_full_hash();
    let mut depth = 0u32;
    while let Some(hash) = next {
        if depth >= MAX_REFERENCED_TRANSACTION_DEPTH {
            return Err(ValidationError::not_valid("referenced transaction chain too deep"));
        }
        let (height, referenced) = ctx
            .chain
            .transaction_by_full_hash(&hash)?
            .ok_or_else(|| ValidationError::not_currently_valid("referenced transaction not confirmed"))?;
        if height >= ctx.height {
            return Err(ValidationError::not_currently_valid("referenced transaction not confirmed"));
        }
        if tx.timestamp().saturating_sub(referenced.timestamp()) > MAX_REFERENCED_TRANSACTION_TIMESPAN {
            return Err(ValidationError::not_valid("referenced transaction too old"));
        }
        next = referenced.referenced_full_hash();
        depth += 1;
    }
    Ok(())
}

fn check_ec_block(tx: &Transaction, ctx: &ValidationContext<'_>) -> Result<(), ValidationError> {
    if tx.ec_block_height() >= ctx.height {
        return Err(ValidationError::not_currently_valid("EC block above inclusion height"));
    }
    match ctx.chain.block_id_at_height(tx.ec_block_height())? {
        Some(id) if id == tx.ec_block_id() => Ok(()),
        _ => Err(ValidationError::not_currently_valid("EC block does not match this chain")),
    }
}


#[cfg(test)]
mod tests {
    use super::testutil::MemChain;
    use super::*;
    use crate::core::ledger::testutil::ledger;
    use crate::core::params::ONE_COIN;
    use crate::core::security::crypto::SecretPhrase;
    use crate::core::tx::appendix::Attachment;
    use crate::core::tx::transaction::TransactionBuilder;

    fn funded(ledger: &Ledger, secret: &SecretPhrase, amount: i64) -> FullId {
        let id = FullId::from_public_key(&secret.public_key().unwrap());
        ledger.add_to_balance_and_unconfirmed(id, amount, 0, false).unwrap();
        id
    }

    fn payment(secret: &SecretPhrase, fee: i64) -> Transaction {
        TransactionBuilder::new(secret.public_key().unwrap(), Attachment::OrdinaryPayment)
            .timestamp(100)
            .recipient(FullId::new(9, 9))
            .amount(5 * ONE_COIN)
            .fee(fee)
            .ec_block(0, 1000)
            .sign(secret)
            .unwrap()
    }

    #[test]
    fn zero_fee_is_rejected_below_minimum() {
        let l = ledger();
        let chain = MemChain::with_blocks(3);
        let secret = SecretPhrase::new("payer");
        funded(&l, &secret, 100 * ONE_COIN);
        let reg = TransactionRegistry::standard();
        let ctx = ValidationContext {
            ledger: &l,
            chain: &chain,
            height: 3,
            block_timestamp: 200,
        };
        let err = reg.validate(&payment(&secret, 0), &ctx).unwrap_err();
        assert!(matches!(err, ValidationError::NotValid(_)));
        reg.validate(&payment(&secret, ONE_COIN), &ctx).unwrap();
    }

    #[test]
    fn ec_block_from_another_fork_is_not_currently_valid() {
        let l = ledger();
        let chain = MemChain::with_blocks(3);
        let secret = SecretPhrase::new("payer");
        funded(&l, &secret, 100 * ONE_COIN);
        let tx = TransactionBuilder::new(secret.public_key().unwrap(), Attachment::OrdinaryPayment)
            .timestamp(100)
            .recipient(FullId::new(9, 9))
            .amount(ONE_COIN)
            .fee(ONE_COIN)
            .ec_block(1, 4242)
            .sign(&secret)
            .unwrap();
        let ctx = ValidationContext {
            ledger: &l,
            chain: &chain,
            height: 3,
            block_timestamp: 200,
        };
        let err = TransactionRegistry::standard().validate(&tx, &ctx).unwrap_err();
        assert!(matches!(err, ValidationError::NotCurrentlyValid(_)));
    }

    #[test]
    fn reservation_fails_without_partial_effect() {
        let l = ledger();
        let secret = SecretPhrase::new("payer");
        let id = funded(&l, &secret, 5 * ONE_COIN);
        let reg = TransactionRegistry::standard();
        let tx = payment(&secret, ONE_COIN);
        assert!(!reg.apply_unconfirmed(&tx, &l, 1).unwrap());
        assert_eq!(l.unconfirmed_balance(id).unwrap(), 5 * ONE_COIN);
    }

    #[test]
    fn payment_moves_amount_and_burns_fee() {
        let l = ledger();
        let secret = SecretPhrase::new("payer");
        let id = funded(&l, &secret, 100 * ONE_COIN);
        let reg = TransactionRegistry::standard();
        let tx = payment(&secret, ONE_COIN);
        assert!(reg.apply_unconfirmed(&tx, &l, 1).unwrap());
        reg.apply(&tx, &l, 1).unwrap();
        assert_eq!(l.balance(id, None).unwrap(), 94 * ONE_COIN);
        assert_eq!(l.unconfirmed_balance(id).unwrap(), 94 * ONE_COIN);
        assert_eq!(l.balance(FullId::new(9, 9), None).unwrap(), 5 * ONE_COIN);
        assert_eq!(l.public_key(id).unwrap(), Some(secret.public_key().unwrap()));
    }

    #[test]
    fn referenced_transaction_must_be_confirmed() {
        let l = ledger();
        let chain = MemChain::with_blocks(3);
        let secret = SecretPhrase::new("payer");
        funded(&l, &secret, 100 * ONE_COIN);
        let first = payment(&secret, ONE_COIN);
        let second = TransactionBuilder::new(secret.public_key().unwrap(), Attachment::OrdinaryPayment)
            .timestamp(150)
            .recipient(FullId::new(9, 9))
            .amount(ONE_COIN)
            .fee(2 * ONE_COIN)
            .referenced(first.full_hash())
            .ec_block(0, 1000)
            .sign(&secret)
            .unwrap();
        let reg = TransactionRegistry::standard();
        let ctx = ValidationContext {
            ledger: &l,
            chain: &chain,
            height: 3,
            block_timestamp: 200,
        };
        assert!(matches!(
            reg.validate(&second, &ctx),
            Err(ValidationError::NotCurrentlyValid(_))
        ));
        chain.txs.lock().push((1, first));
        reg.validate(&second, &ctx).unwrap();
    }
}
