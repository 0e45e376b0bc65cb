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

//! Messaging type (1): arbitrary messages, aliases, polls, phasing votes, account info and
//! account properties.

use crate::core::ledger::account::AccountProperty;
use crate::core::ledger::alias::{Alias, AliasOffer};
use crate::core::ledger::phasing::{PhasingVote, VotingModel};
use crate::core::ledger::poll::{Poll, Vote};
use crate::core::ledger::{Ledger, LedgerError};
use crate::core::params::{
    MAX_ACCOUNT_DESCRIPTION_LENGTH, MAX_ACCOUNT_NAME_LENGTH, MAX_ALIAS_LENGTH,
    MAX_ALIAS_URI_LENGTH, MAX_BALANCE_NQT, MAX_PHASING_VOTE_TRANSACTIONS,
    MAX_POLL_DESCRIPTION_LENGTH, MAX_POLL_DURATION, MAX_POLL_NAME_LENGTH, MAX_POLL_OPTION_COUNT,
    MAX_POLL_OPTION_LENGTH, MAX_PROPERTY_NAME_LENGTH, MAX_PROPERTY_VALUE_LENGTH, ONE_COIN,
};
use crate::core::tx::appendix::Attachment;
use crate::core::tx::fee::Fee;
use crate::core::tx::registry::{
    missing_attachment, wrong_attachment, TransactionBehavior, ValidationContext,
};
use crate::core::tx::transaction::Transaction;
use crate::core::tx::{is_duplicate, Duplicates, TxKind, ValidationError};
use crate::core::types::FullId;

fn require_zero_amount(tx: &Transaction) -> Result<(), ValidationError> {
    if tx.amount() != 0 {
        return Err(ValidationError::not_valid("amount must be zero"));
    }
    Ok(())
}

fn valid_alias_name(name: &str) -> bool {
    !name.is_empty() && name.len() <= MAX_ALIAS_LENGTH && name.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Alias operations share one bucket keyed by the case-folded name.
fn alias_block_duplicate(name: &str, duplicates: &mut Duplicates) -> bool {
    is_duplicate(TxKind::ALIAS_ASSIGNMENT, &name.to_lowercase(), duplicates, 1)
}

fn owned_alias(ctx: &ValidationContext<'_>, name: &str, owner: FullId) -> Result<Alias, ValidationError> {
    let alias = ctx
        .ledger
        .alias(name)?
        .ok_or_else(|| ValidationError::not_currently_valid(format!("alias {name} not registered")))?;
    if alias.owner != owner {
        return Err(ValidationError::not_currently_valid(format!(
            "alias {name} owned by another account"
        )));
    }
    Ok(alias)
}

/// Carrier for message appendages.
pub struct ArbitraryMessage;

impl TransactionBehavior for ArbitraryMessage {
    fn kind(&self) -> TxKind {
        TxKind::ARBITRARY_MESSAGE
    }
    fn name(&self) -> &'static str {
        "ArbitraryMessage"
    }
    fn must_have_recipient(&self) -> bool {
        false
    }
    fn is_back_fee_exempt(&self) -> bool {
        true
    }

    fn validate_attachment(&self, tx: &Transaction, _ctx: &ValidationContext<'_>) -> Result<(), ValidationError> {
        require_zero_amount(tx)?;
        if tx.message().is_none()
            && tx.encrypted_message().is_none()
            && tx.prunable_plain_message().is_none()
        {
            return Err(ValidationError::not_valid("message transaction without a message"));
        }
        Ok(())
    }

    fn apply_attachment(&self, _tx: &Transaction, _ledger: &Ledger, _height: u32) -> Result<(), LedgerError> {
        Ok(())
    }
}

/// Register an alias or update the URI of an owned one.
pub struct AliasAssignment;

impl TransactionBehavior for AliasAssignment {
    fn kind(&self) -> TxKind {
        TxKind::ALIAS_ASSIGNMENT
    }
    fn name(&self) -> &'static str {
        "AliasAssignment"
    }
    fn next_fee(&self) -> Fee {
        Fee::SizeBased {
            constant: 2 * ONE_COIN,
            per_unit: ONE_COIN,
            unit_size: 32,
        }
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

    fn validate_attachment(&self, tx: &Transaction, ctx: &ValidationContext<'_>) -> Result<(), ValidationError> {
        let Attachment::AliasAssignment { alias, uri } = tx.attachment() else {
            return Err(wrong_attachment());
        };
        require_zero_amount(tx)?;
        if !valid_alias_name(alias) {
            return Err(ValidationError::not_valid(format!("invalid alias name {alias:?}")));
        }
        if uri.len() > MAX_ALIAS_URI_LENGTH {
            return Err(ValidationError::not_valid("alias uri too long"));
        }
        if let Some(existing) = ctx.ledger.alias(alias)? {
            if existing.owner != tx.sender_id() {
                return Err(ValidationError::not_currently_valid(format!(
                    "alias {alias} already owned by another account"
                )));
            }
        }
        Ok(())
    }

    fn apply_attachment(&self, tx: &Transaction, ledger: &Ledger, height: u32) -> Result<(), LedgerError> {
        let Attachment::AliasAssignment { alias, uri } = tx.attachment() else {
            return Err(missing_attachment());
        };
        let record = match ledger.alias(alias)? {
            Some(mut existing) => {
                existing.uri = uri.clone();
                existing.timestamp = tx.timestamp();
                existing
            }
            None => Alias {
                id: tx.id(),
                owner: tx.sender_id(),
                name: alias.clone(),
                uri: uri.clone(),
                timestamp: tx.timestamp(),
            },
        };
        ledger.save_alias(&record, height)
    }

    fn is_block_duplicate(&self, tx: &Transaction, duplicates: &mut Duplicates) -> bool {
        match tx.attachment() {
            Attachment::AliasAssignment { alias, .. } => alias_block_duplicate(alias, duplicates),
            _ => false,
        }
    }
}

/// Offer an alias for sale, or with price zero hand it to the recipient.
pub struct AliasSell;

impl TransactionBehavior for AliasSell {
    fn kind(&self) -> TxKind {
        TxKind::ALIAS_SELL
    }
    fn name(&self) -> &'static str {
        "AliasSell"
    }
    fn must_have_recipient(&self) -> bool {
        false
    }
    fn is_phasing_safe(&self) -> bool {
        false
    }

    fn validate_attachment(&self, tx: &Transaction, ctx: &ValidationContext<'_>) -> Result<(), ValidationError> {
        let Attachment::AliasSell { alias, price } = tx.attachment() else {
            return Err(wrong_attachment());
        };
        require_zero_amount(tx)?;
        if !valid_alias_name(alias) {
            return Err(ValidationError::not_valid(format!("invalid alias name {alias:?}")));
        }
        if *price < 0 || *price > MAX_BALANCE_NQT {
            return Err(ValidationError::not_valid("alias price out of range"));
        }
        if *price == 0 && tx.recipient().is_none() {
            return Err(ValidationError::not_valid("alias transfer needs a recipient"));
        }
        owned_alias(ctx, alias, tx.sender_id())?;
        Ok(())
    }

    fn apply_attachment(&self, tx: &Transaction, ledger: &Ledger, height: u32) -> Result<(), LedgerError> {
        let Attachment::AliasSell { alias, price } = tx.attachment() else {
            return Err(missing_attachment());
        };
        match (*price, tx.recipient()) {
            (0, Some(recipient)) => ledger.change_alias_owner(alias, recipient, height),
            _ => ledger.set_alias_offer(
                &AliasOffer {
                    name: alias.clone(),
                    price: *price,
                    buyer: tx.recipient(),
                },
                height,
            ),
        }
    }

    fn is_block_duplicate(&self, tx: &Transaction, duplicates: &mut Duplicates) -> bool {
        match tx.attachment() {
            Attachment::AliasSell { alias, .. } => alias_block_duplicate(alias, duplicates),
            _ => false,
        }
    }
}

/// Buy an offered alias; the amount goes to the owner as the transaction recipient.
pub struct AliasBuy;

impl TransactionBehavior for AliasBuy {
    fn kind(&self) -> TxKind {
        TxKind::ALIAS_BUY
    }
    fn name(&self) -> &'static str {
        "AliasBuy"
    }
    fn is_phasing_safe(&self) -> bool {
        false
    }

    fn validate_attachment(&self, tx: &Transaction, ctx: &ValidationContext<'_>) -> Result<(), ValidationError> {
        let Attachment::AliasBuy { alias } = tx.attachment() else {
            return Err(wrong_attachment());
        };
        let owner = tx
            .recipient()
            .ok_or_else(|| ValidationError::not_valid("alias buy needs the owner as recipient"))?;
        owned_alias(ctx, alias, owner)?;
        let offer = ctx
            .ledger
            .alias_offer(alias)?
            .ok_or_else(|| ValidationError::not_currently_valid(format!("alias {alias} is not for sale")))?;
        if tx.amount() < offer.price {
            return Err(ValidationError::not_currently_valid("amount below alias price"));
        }
        if offer.buyer.is_some_and(|b| b != tx.sender_id()) {
            return Err(ValidationError::not_currently_valid("alias offered to another buyer"));
        }
        Ok(())
    }

    fn apply_attachment(&self, tx: &Transaction, ledger: &Ledger, height: u32) -> Result<(), LedgerError> {
        let Attachment::AliasBuy { alias } = tx.attachment() else {
            return Err(missing_attachment());
        };
        ledger.change_alias_owner(alias, tx.sender_id(), height)
    }

    fn is_block_duplicate(&self, tx: &Transaction, duplicates: &mut Duplicates) -> bool {
        match tx.attachment() {
            Attachment::AliasBuy { alias } => alias_block_duplicate(alias, duplicates),
            _ => false,
        }
    }
}

/// Delete an owned alias.
pub struct AliasDelete;

impl TransactionBehavior for AliasDelete {
    fn kind(&self) -> TxKind {
        TxKind::ALIAS_DELETE
    }
    fn name(&self) -> &'static str {
        "AliasDelete"
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

    fn validate_attachment(&self, tx: &Transaction, ctx: &ValidationContext<'_>) -> Result<(), ValidationError> {
        let Attachment::AliasDelete { alias } = tx.attachment() else {
            return Err(wrong_attachment());
        };
        require_zero_amount(tx)?;
        owned_alias(ctx, alias, tx.sender_id())?;
        Ok(())
    }

    fn apply_attachment(&self, tx: &Transaction, ledger: &Ledger, height: u32) -> Result<(), LedgerError> {
        let Attachment::AliasDelete { alias } = tx.attachment() else {
            return Err(missing_attachment());
        };
        ledger.delete_alias(alias, height)
    }

    fn is_block_duplicate(&self, tx: &Transaction, duplicates: &mut Duplicates) -> bool {
        match tx.attachment() {
            Attachment::AliasDelete { alias } => alias_block_duplicate(alias, duplicates),
            _ => false,
        }
    }
}

/// Create a poll; at most one per block.
pub struct PollCreation;

impl TransactionBehavior for PollCreation {
    fn kind(&self) -> TxKind {
        TxKind::POLL_CREATION
    }
    fn name(&self) -> &'static str {
        "PollCreation"
    }
    fn baseline_fee(&self) -> Fee {
        Fee::Constant(10 * ONE_COIN)
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

    fn validate_attachment(&self, tx: &Transaction, ctx: &ValidationContext<'_>) -> Result<(), ValidationError> {
        let Attachment::PollCreation {
            name,
            description,
            finish_height,
            options,
            min_options,
            max_options,
        } = tx.attachment()
        else {
            return Err(wrong_attachment());
        };
        require_zero_amount(tx)?;
        if name.trim().is_empty() || name.len() > MAX_POLL_NAME_LENGTH {
            return Err(ValidationError::not_valid("poll name"));
        }
        if description.len() > MAX_POLL_DESCRIPTION_LENGTH {
            return Err(ValidationError::not_valid("poll description too long"));
        }
        if options.is_empty() || options.len() > MAX_POLL_OPTION_COUNT {
            return Err(ValidationError::not_valid("poll option count"));
        }
        if options
            .iter()
            .any(|o| o.trim().is_empty() || o.len() > MAX_POLL_OPTION_LENGTH)
        {
            return Err(ValidationError::not_valid("poll option"));
        }
        if *min_options < 1 || max_options < min_options || *max_options as usize > options.len() {
            return Err(ValidationError::not_valid("poll option bounds"));
        }
        if *finish_height <= ctx.height || *finish_height > ctx.height.saturating_add(MAX_POLL_DURATION) {
            return Err(ValidationError::not_currently_valid("poll finish height"));
        }
        Ok(())
    }

    fn apply_attachment(&self, tx: &Transaction, ledger: &Ledger, height: u32) -> Result<(), LedgerError> {
        let Attachment::PollCreation {
            name,
            description,
            finish_height,
            options,
            min_options,
            max_options,
        } = tx.attachment()
        else {
            return Err(missing_attachment());
        };
        ledger.add_poll(
            &Poll {
                id: tx.id(),
                account: tx.sender_id(),
                name: name.clone(),
                description: description.clone(),
                options: options.clone(),
                min_options: *min_options,
                max_options: *max_options,
                finish_height: *finish_height,
            },
            height,
        )
    }

    fn is_block_duplicate(&self, _tx: &Transaction, duplicates: &mut Duplicates) -> bool {
        is_duplicate(TxKind::POLL_CREATION, "", duplicates, 1)
    }
}

/// Ballot in an open poll.
pub struct VoteCasting;

impl TransactionBehavior for VoteCasting {
    fn kind(&self) -> TxKind {
        TxKind::VOTE_CASTING
    }
    fn name(&self) -> &'static str {
        "VoteCasting"
    }
    fn can_have_recipient(&self) -> bool {
        false
    }
    fn must_have_recipient(&self) -> bool {
        false
    }

    fn validate_attachment(&self, tx: &Transaction, ctx: &ValidationContext<'_>) -> Result<(), ValidationError> {
        let Attachment::VoteCasting { poll_id, choices } = tx.attachment() else {
            return Err(wrong_attachment());
        };
        require_zero_amount(tx)?;
        let poll = ctx
            .ledger
            .poll(*poll_id)?
            .ok_or_else(|| ValidationError::not_currently_valid("unknown poll"))?;
        if ctx.height > poll.finish_height {
            return Err(ValidationError::not_currently_valid("poll finished"));
        }
        if choices.len() != poll.options.len() || choices.iter().any(|c| *c > 1) {
            return Err(ValidationError::not_valid("ballot does not match poll options"));
        }
        let selected = choices.iter().filter(|c| **c == 1).count();
        if selected < poll.min_options as usize || selected > poll.max_options as usize {
            return Err(ValidationError::not_valid("ballot selects a wrong number of options"));
        }
        if ctx.ledger.vote(*poll_id, tx.sender_id())?.is_some() {
            return Err(ValidationError::not_currently_valid("already voted"));
        }
        Ok(())
    }

    fn apply_attachment(&self, tx: &Transaction, ledger: &Ledger, height: u32) -> Result<(), LedgerError> {
        let Attachment::VoteCasting { poll_id, choices } = tx.attachment() else {
            return Err(missing_attachment());
        };
        ledger.add_vote(
            &Vote {
                poll_id: *poll_id,
                voter: tx.sender_id(),
                choices: choices.clone(),
            },
            height,
        )
    }

    fn is_duplicate(&self, tx: &Transaction, duplicates: &mut Duplicates) -> bool {
        match tx.attachment() {
            Attachment::VoteCasting { poll_id, .. } => is_duplicate(
                TxKind::VOTE_CASTING,
                &format!("{poll_id}:{}", tx.sender_id()),
                duplicates,
                1,
            ),
            _ => false,
        }
    }
}

/// Approve pending phased transactions.
pub struct PhasingVoteCasting;

impl TransactionBehavior for PhasingVoteCasting {
    fn kind(&self) -> TxKind {
        TxKind::PHASING_VOTE_CASTING
    }
    fn name(&self) -> &'static str {
        "PhasingVoteCasting"
    }
    fn can_have_recipient(&self) -> bool {
        false
    }
    fn must_have_recipient(&self) -> bool {
        false
    }

    fn validate_attachment(&self, tx: &Transaction, ctx: &ValidationContext<'_>) -> Result<(), ValidationError> {
        let Attachment::PhasingVoteCasting {
            transaction_full_hashes,
        } = tx.attachment()
        else {
            return Err(wrong_attachment());
        };
        require_zero_amount(tx)?;
        if transaction_full_hashes.is_empty() || transaction_full_hashes.len() > MAX_PHASING_VOTE_TRANSACTIONS {
            return Err(ValidationError::not_valid("phasing vote count"));
        }
        let mut seen = transaction_full_hashes.clone();
        seen.sort();
        seen.dedup();
        if seen.len() != transaction_full_hashes.len() {
            return Err(ValidationError::not_valid("duplicate phased transaction in vote"));
        }
        let voter = tx.sender_id();
        for hash in transaction_full_hashes {
            let (_, phased) = ctx
                .chain
                .transaction_by_full_hash(hash)?
                .ok_or_else(|| ValidationError::not_currently_valid("phased transaction not confirmed"))?;
            let poll = ctx
                .ledger
                .phasing_poll(phased.id())?
                .ok_or_else(|| ValidationError::not_valid("transaction is not phased"))?;
            if ctx.ledger.phasing_result(poll.transaction_id)?.is_some() || poll.finish_height < ctx.height {
                return Err(ValidationError::not_currently_valid("phasing already finished"));
            }
            if poll.params.voting_model == VotingModel::None {
                return Err(ValidationError::not_valid("phasing poll takes no votes"));
            }
            if !poll.params.whitelist.is_empty() && !poll.params.whitelist.contains(&voter) {
                return Err(ValidationError::not_valid("voter not whitelisted"));
            }
            if ctx.ledger.has_phasing_vote(poll.transaction_id, voter)? {
                return Err(ValidationError::not_currently_valid("already voted on phased transaction"));
            }
        }
        Ok(())
    }

    fn apply_attachment(&self, tx: &Transaction, ledger: &Ledger, height: u32) -> Result<(), LedgerError> {
        let Attachment::PhasingVoteCasting {
            transaction_full_hashes,
        } = tx.attachment()
        else {
            return Err(missing_attachment());
        };
        for hash in transaction_full_hashes {
            ledger.add_phasing_vote(&PhasingVote {
                transaction_id: hash.id_prefix(),
                voter: tx.sender_id(),
                height,
            })?;
        }
        Ok(())
    }

    fn is_duplicate(&self, tx: &Transaction, duplicates: &mut Duplicates) -> bool {
        let Attachment::PhasingVoteCasting {
            transaction_full_hashes,
        } = tx.attachment()
        else {
            return false;
        };
        let voter = tx.sender_id();
        let mut dup = false;
        for hash in transaction_full_hashes {
            dup |= is_duplicate(
                TxKind::PHASING_VOTE_CASTING,
                &format!("{}:{voter}", hash.to_hex()),
                duplicates,
                1,
            );
        }
        dup
    }
}

/// Set account name and description.
pub struct AccountInfo;

impl TransactionBehavior for AccountInfo {
    fn kind(&self) -> TxKind {
        TxKind::ACCOUNT_INFO
    }
    fn name(&self) -> &'static str {
        "AccountInfo"
    }
    fn can_have_recipient(&self) -> bool {
        false
    }
    fn must_have_recipient(&self) -> bool {
        false
    }
    fn is_back_fee_exempt(&self) -> bool {
        true
    }

    fn validate_attachment(&self, tx: &Transaction, _ctx: &ValidationContext<'_>) -> Result<(), ValidationError> {
        let Attachment::AccountInfo { name, description } = tx.attachment() else {
            return Err(wrong_attachment());
        };
        require_zero_amount(tx)?;
        if name.len() > MAX_ACCOUNT_NAME_LENGTH || description.len() > MAX_ACCOUNT_DESCRIPTION_LENGTH {
            return Err(ValidationError::not_valid("account info too long"));
        }
        Ok(())
    }

    fn apply_attachment(&self, tx: &Transaction, ledger: &Ledger, height: u32) -> Result<(), LedgerError> {
        let Attachment::AccountInfo { name, description } = tx.attachment() else {
            return Err(missing_attachment());
        };
        ledger.set_account_info(tx.sender_id(), name, description, height)
    }

    fn is_block_duplicate(&self, tx: &Transaction, duplicates: &mut Duplicates) -> bool {
        is_duplicate(TxKind::ACCOUNT_INFO, &tx.sender_id().to_string(), duplicates, 1)
    }
}

fn valid_property_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_PROPERTY_NAME_LENGTH
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Set a property on the recipient, or on the sender when there is none.
pub struct AccountPropertySet;

impl TransactionBehavior for AccountPropertySet {
    fn kind(&self) -> TxKind {
        TxKind::ACCOUNT_PROPERTY
    }
    fn name(&self) -> &'static str {
        "AccountProperty"
    }
    fn must_have_recipient(&self) -> bool {
        false
    }

    fn validate_attachment(&self, tx: &Transaction, _ctx: &ValidationContext<'_>) -> Result<(), ValidationError> {
        let Attachment::AccountProperty { property, value } = tx.attachment() else {
            return Err(wrong_attachment());
        };
        require_zero_amount(tx)?;
        if !valid_property_name(property) {
            return Err(ValidationError::not_valid(format!("invalid property name {property:?}")));
        }
        if value.len() > MAX_PROPERTY_VALUE_LENGTH {
            return Err(ValidationError::not_valid("property value too long"));
        }
        Ok(())
    }

    fn apply_attachment(&self, tx: &Transaction, ledger: &Ledger, height: u32) -> Result<(), LedgerError> {
        let Attachment::AccountProperty { property, value } = tx.attachment() else {
            return Err(missing_attachment());
        };
        ledger.set_account_property(
            &AccountProperty {
                recipient: tx.recipient().unwrap_or(tx.sender_id()),
                setter: tx.sender_id(),
                name: property.clone(),
                value: value.clone(),
            },
            height,
        )
    }
}

/// Delete a property the sender set.
pub struct AccountPropertyDelete;

impl TransactionBehavior for AccountPropertyDelete {
    fn kind(&self) -> TxKind {
        TxKind::ACCOUNT_PROPERTY_DELETE
    }
    fn name(&self) -> &'static str {
        "AccountPropertyDelete"
    }
    fn must_have_recipient(&self) -> bool {
        false
    }

    fn validate_attachment(&self, tx: &Transaction, ctx: &ValidationContext<'_>) -> Result<(), ValidationError> {
        let Attachment::AccountPropertyDelete { property } = tx.attachment() else {
            return Err(wrong_attachment());
        };
        require_zero_amount(tx)?;
        let recipient = tx.recipient().unwrap_or(tx.sender_id());
        if ctx
            .ledger
            .account_property(recipient, tx.sender_id(), property)?
            .is_none()
        {
            return Err(ValidationError::not_currently_valid(format!("no property {property:?} to delete")));
        }
        Ok(())
    }

    fn apply_attachment(&self, tx: &Transaction, ledger: &Ledger, height: u32) -> Result<(), LedgerError> {
        let Attachment::AccountPropertyDelete { property } = tx.attachment() else {
            return Err(missing_attachment());
        };
        let recipient = tx.recipient().unwrap_or(tx.sender_id());
        ledger.delete_account_property(recipient, tx.sender_id(), property, height)
    }
}

pub(crate) fn behaviors() -> Vec<Box<dyn TransactionBehavior>> {
    vec![
        Box::new(ArbitraryMessage),
        Box::new(AliasAssignment),
        Box::new(AliasSell),
        Box::new(AliasBuy),
        Box::new(AliasDelete),
        Box::new(PollCreation),
        Box::new(VoteCasting),
        Box::new(PhasingVoteCasting),
        Box::new(AccountInfo),
        Box::new(AccountPropertySet),
        Box::new(AccountPropertyDelete),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ledger::testutil::ledger;
    use crate::core::security::crypto::SecretPhrase;
    use crate::core::tx::registry::testutil::MemChain;
    use crate::core::tx::registry::TransactionRegistry;
    use crate::core::tx::transaction::TransactionBuilder;

    fn signed(secret: &SecretPhrase, attachment: Attachment, recipient: Option<FullId>, amount: i64) -> Transaction {
        let mut b = TransactionBuilder::new(secret.public_key().unwrap(), attachment)
            .timestamp(100)
            .amount(amount)
            .fee(3 * ONE_COIN)
            .ec_block(0, 1000);
        if let Some(r) = recipient {
            b = b.recipient(r);
        }
        b.sign(secret).unwrap()
    }

    fn confirm(reg: &TransactionRegistry, l: &Ledger, tx: &Transaction, height: u32) {
        assert!(reg.apply_unconfirmed(tx, l, height).unwrap());
        reg.apply(tx, l, height).unwrap();
    }

    #[test]
    fn alias_operations_share_a_case_insensitive_block_bucket() {
        let reg = TransactionRegistry::standard();
        let a = SecretPhrase::new("a");
        let b = SecretPhrase::new("b");
        let first = signed(
            &a,
            Attachment::AliasAssignment {
                alias: "Amun".into(),
                uri: "x".into(),
            },
            None,
            0,
        );
        let second = signed(
            &b,
            Attachment::AliasAssignment {
                alias: "aMUN".into(),
                uri: "y".into(),
            },
            None,
            0,
        );
        let mut dups = Duplicates::new();
        assert!(!reg.is_block_duplicate(&first, &mut dups));
        assert!(reg.is_block_duplicate(&second, &mut dups));
    }

    #[test]
    fn alias_sale_and_purchase() {
        let l = ledger();
        let chain = MemChain::with_blocks(4);
        let reg = TransactionRegistry::standard();
        let seller = SecretPhrase::new("seller");
        let buyer = SecretPhrase::new("buyer");
        let seller_id = FullId::from_public_key(&seller.public_key().unwrap());
        let buyer_id = FullId::from_public_key(&buyer.public_key().unwrap());
        l.add_to_balance_and_unconfirmed(seller_id, 100 * ONE_COIN, 0, false).unwrap();
        l.add_to_balance_and_unconfirmed(buyer_id, 100 * ONE_COIN, 0, false).unwrap();
        let ctx = ValidationContext {
            ledger: &l,
            chain: &chain,
            height: 2,
            block_timestamp: 200,
        };

        let assign = signed(
            &seller,
            Attachment::AliasAssignment {
                alias: "shop".into(),
                uri: "https://shop".into(),
            },
            None,
            0,
        );
        reg.validate(&assign, &ctx).unwrap();
        confirm(&reg, &l, &assign, 1);

        let sell = signed(
            &seller,
            Attachment::AliasSell {
                alias: "shop".into(),
                price: 10 * ONE_COIN,
            },
            None,
            0,
        );
        reg.validate(&sell, &ctx).unwrap();
        confirm(&reg, &l, &sell, 2);

        let cheap = signed(&buyer, Attachment::AliasBuy { alias: "shop".into() }, Some(seller_id), ONE_COIN);
        assert!(matches!(
            reg.validate(&cheap, &ctx),
            Err(ValidationError::NotCurrentlyValid(_))
        ));
        let buy = signed(
            &buyer,
            Attachment::AliasBuy { alias: "shop".into() },
            Some(seller_id),
            10 * ONE_COIN,
        );
        reg.validate(&buy, &ctx).unwrap();
        confirm(&reg, &l, &buy, 3);

        assert_eq!(l.alias("SHOP").unwrap().unwrap().owner, buyer_id);
        assert!(l.alias_offer("shop").unwrap().is_none());
        assert_eq!(l.balance(seller_id, None).unwrap(), 104 * ONE_COIN);
    }

    #[test]
    fn poll_vote_counts_once_per_voter() {
        let l = ledger();
        let chain = MemChain::with_blocks(4);
        let reg = TransactionRegistry::standard();
        let creator = SecretPhrase::new("creator");
        let creator_id = FullId::from_public_key(&creator.public_key().unwrap());
        l.add_to_balance_and_unconfirmed(creator_id, 100 * ONE_COIN, 0, false).unwrap();
        let ctx = ValidationContext {
            ledger: &l,
            chain: &chain,
            height: 2,
            block_timestamp: 200,
        };
        let poll = TransactionBuilder::new(
            creator.public_key().unwrap(),
            Attachment::PollCreation {
                name: "color".into(),
                description: String::new(),
                finish_height: 50,
                options: vec!["red".into(), "blue".into()],
                min_options: 1,
                max_options: 1,
            },
        )
        .timestamp(100)
        .fee(10 * ONE_COIN)
        .ec_block(0, 1000)
        .sign(&creator)
        .unwrap();
        reg.validate(&poll, &ctx).unwrap();
        confirm(&reg, &l, &poll, 1);

        let vote = signed(
            &creator,
            Attachment::VoteCasting {
                poll_id: poll.id(),
                choices: vec![0, 1],
            },
            None,
            0,
        );
        reg.validate(&vote, &ctx).unwrap();
        let mut dups = Duplicates::new();
        assert!(!reg.is_duplicate(&vote, &mut dups));
        assert!(reg.is_duplicate(&vote, &mut dups));
        confirm(&reg, &l, &vote, 2);
        assert_eq!(l.poll_results(poll.id()).unwrap(), vec![0, 1]);
        assert!(matches!(
            reg.validate(&vote, &ctx),
            Err(ValidationError::NotCurrentlyValid(_))
        ));
    }
}
