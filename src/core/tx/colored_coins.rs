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

//! Colored coins type (2): issuance, transfer, deletion and dividends.

use crate::core::ledger::asset::Asset;
use crate::core::ledger::{Ledger, LedgerError};
use crate::core::params::{
    MAX_ASSET_DECIMALS, MAX_ASSET_DESCRIPTION_LENGTH, MAX_ASSET_NAME_LENGTH,
    MAX_ASSET_QUANTITY_QNT, MAX_BALANCE_NQT, MAX_ROLLBACK, MIN_ASSET_NAME_LENGTH, ONE_COIN,
};
use crate::core::tx::appendix::Attachment;
use crate::core::tx::fee::Fee;
use crate::core::tx::registry::{
    missing_attachment, wrong_attachment, Reservation, TransactionBehavior, ValidationContext,
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

fn existing_asset(ctx: &ValidationContext<'_>, asset_id: u64) -> Result<Asset, ValidationError> {
    ctx.ledger
        .asset(asset_id, None)?
        .ok_or_else(|| ValidationError::not_currently_valid(format!("unknown asset {asset_id}")))
}

fn check_quantity(quantity: i64) -> Result<(), ValidationError> {
    if quantity <= 0 || quantity > MAX_ASSET_QUANTITY_QNT {
        return Err(ValidationError::not_valid("asset quantity out of range"));
    }
    Ok(())
}

/// Dividend share of every holder except the issuer, at the snapshot height.
fn dividend_shares(
    ledger: &Ledger,
    asset_id: u64,
    snapshot: u32,
    issuer: FullId,
    amount_per_quantity: i64,
) -> Result<Vec<(FullId, i64)>, LedgerError> {
    let mut out = Vec::new();
    for holding in ledger.asset_holders(asset_id, Some(snapshot))? {
        if holding.account == issuer || holding.quantity <= 0 {
            continue;
        }
        let share = holding
            .quantity
            .checked_mul(amount_per_quantity)
            .ok_or(LedgerError::Overflow(holding.account))?;
        out.push((holding.account, share));
    }
    Ok(out)
}

fn dividend_total(shares: &[(FullId, i64)], issuer: FullId) -> Result<i64, LedgerError> {
    shares
        .iter()
        .try_fold(0i64, |acc, (_, s)| acc.checked_add(*s))
        .ok_or(LedgerError::Overflow(issuer))
}

/// Issue a new asset to the sender.
pub struct AssetIssuance;

impl TransactionBehavior for AssetIssuance {
    fn kind(&self) -> TxKind {
        TxKind::ASSET_ISSUANCE
    }
    fn name(&self) -> &'static str {
        "AssetIssuance"
    }
    fn baseline_fee(&self) -> Fee {
        Fee::Constant(1000 * ONE_COIN)
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
        let Attachment::AssetIssuance {
            name,
            description,
            quantity,
            decimals,
        } = tx.attachment()
        else {
            return Err(wrong_attachment());
        };
        require_zero_amount(tx)?;
        if name.len() < MIN_ASSET_NAME_LENGTH
            || name.len() > MAX_ASSET_NAME_LENGTH
            || !name.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(ValidationError::not_valid(format!("invalid asset name {name:?}")));
        }
        if description.len() > MAX_ASSET_DESCRIPTION_LENGTH {
            return Err(ValidationError::not_valid("asset description too long"));
        }
        if *decimals > MAX_ASSET_DECIMALS {
            return Err(ValidationError::not_valid("asset decimals"));
        }
        check_quantity(*quantity)
    }

    fn apply_attachment(&self, tx: &Transaction, ledger: &Ledger, height: u32) -> Result<(), LedgerError> {
        let Attachment::AssetIssuance {
            name,
            description,
            quantity,
            decimals,
        } = tx.attachment()
        else {
            return Err(missing_attachment());
        };
        ledger.save_asset(
            &Asset {
                id: tx.id(),
                issuer: tx.sender_id(),
                name: name.clone(),
                description: description.clone(),
                quantity: *quantity,
                initial_quantity: *quantity,
                decimals: *decimals,
            },
            height,
        )?;
        ledger.add_to_asset_and_unconfirmed(tx.sender_id(), tx.id(), *quantity, height)
    }
}

/// Move asset quantity to the recipient.
pub struct AssetTransfer;

impl TransactionBehavior for AssetTransfer {
    fn kind(&self) -> TxKind {
        TxKind::ASSET_TRANSFER
    }
    fn name(&self) -> &'static str {
        "AssetTransfer"
    }

    fn validate_attachment(&self, tx: &Transaction, ctx: &ValidationContext<'_>) -> Result<(), ValidationError> {
        let Attachment::AssetTransfer { asset_id, quantity } = tx.attachment() else {
            return Err(wrong_attachment());
        };
        require_zero_amount(tx)?;
        check_quantity(*quantity)?;
        let asset = existing_asset(ctx, *asset_id)?;
        if *quantity > asset.quantity {
            return Err(ValidationError::not_valid("transfer exceeds asset supply"));
        }
        Ok(())
    }

    fn reservations(&self, tx: &Transaction, _ledger: &Ledger) -> Result<Vec<Reservation>, LedgerError> {
        match tx.attachment() {
            Attachment::AssetTransfer { asset_id, quantity } => Ok(vec![Reservation::Asset {
                asset_id: *asset_id,
                quantity: *quantity,
            }]),
            _ => Err(missing_attachment()),
        }
    }

    fn apply_attachment(&self, tx: &Transaction, ledger: &Ledger, height: u32) -> Result<(), LedgerError> {
        let Attachment::AssetTransfer { asset_id, quantity } = tx.attachment() else {
            return Err(missing_attachment());
        };
        let recipient = tx.recipient().ok_or(LedgerError::Missing("recipient"))?;
        ledger.add_to_asset_balance(tx.sender_id(), *asset_id, -quantity, height)?;
        ledger.add_to_asset_and_unconfirmed(recipient, *asset_id, *quantity, height)
    }
}

/// Burn asset quantity held by the sender.
pub struct AssetDelete;

impl TransactionBehavior for AssetDelete {
    fn kind(&self) -> TxKind {
        TxKind::ASSET_DELETE
    }
    fn name(&self) -> &'static str {
        "AssetDelete"
    }
    fn can_have_recipient(&self) -> bool {
        false
    }
    fn must_have_recipient(&self) -> bool {
        false
    }

    fn validate_attachment(&self, tx: &Transaction, ctx: &ValidationContext<'_>) -> Result<(), ValidationError> {
        let Attachment::AssetDelete { asset_id, quantity } = tx.attachment() else {
            return Err(wrong_attachment());
        };
        require_zero_amount(tx)?;
        check_quantity(*quantity)?;
        existing_asset(ctx, *asset_id)?;
        Ok(())
    }

    fn reservations(&self, tx: &Transaction, _ledger: &Ledger) -> Result<Vec<Reservation>, LedgerError> {
        match tx.attachment() {
            Attachment::AssetDelete { asset_id, quantity } => Ok(vec![Reservation::Asset {
                asset_id: *asset_id,
                quantity: *quantity,
            }]),
            _ => Err(missing_attachment()),
        }
    }

    fn apply_attachment(&self, tx: &Transaction, ledger: &Ledger, height: u32) -> Result<(), LedgerError> {
        let Attachment::AssetDelete { asset_id, quantity } = tx.attachment() else {
            return Err(missing_attachment());
        };
        ledger.delete_asset_quantity(tx.sender_id(), *asset_id, *quantity, height)
    }
}

/// Pay every holder (as of a past height) per unit held; issuer only, one per asset per block
/// or per set of phased transactions finishing together.
pub struct DividendPayment;

impl TransactionBehavior for DividendPayment {
    fn kind(&self) -> TxKind {
        TxKind::DIVIDEND_PAYMENT
    }
    fn name(&self) -> &'static str {
        "DividendPayment"
    }
    fn can_have_recipient(&self) -> bool {
        false
    }
    fn must_have_recipient(&self) -> bool {
        false
    }

    fn validate_attachment(&self, tx: &Transaction, ctx: &ValidationContext<'_>) -> Result<(), ValidationError> {
        let Attachment::DividendPayment {
            asset_id,
            height,
            amount_per_quantity,
        } = tx.attachment()
        else {
            return Err(wrong_attachment());
        };
        require_zero_amount(tx)?;
        if *amount_per_quantity <= 0 || *amount_per_quantity > MAX_BALANCE_NQT {
            return Err(ValidationError::not_valid("dividend per unit out of range"));
        }
        if *height >= ctx.height || *height < ctx.height.saturating_sub(MAX_ROLLBACK) {
            return Err(ValidationError::not_currently_valid("dividend snapshot height"));
        }
        let asset = ctx
            .ledger
            .asset(*asset_id, Some(*height))?
            .ok_or_else(|| ValidationError::not_currently_valid("asset unknown at snapshot height"))?;
        if asset.issuer != tx.sender_id() {
            return Err(ValidationError::not_valid("only the issuer pays dividends"));
        }
        let shares = dividend_shares(ctx.ledger, *asset_id, *height, asset.issuer, *amount_per_quantity)?;
        if dividend_total(&shares, asset.issuer)? > MAX_BALANCE_NQT {
            return Err(ValidationError::not_valid("dividend total out of range"));
        }
        Ok(())
    }

    fn reservations(&self, tx: &Transaction, ledger: &Ledger) -> Result<Vec<Reservation>, LedgerError> {
        let Attachment::DividendPayment {
            asset_id,
            height,
            amount_per_quantity,
        } = tx.attachment()
        else {
            return Err(missing_attachment());
        };
        let shares = dividend_shares(ledger, *asset_id, *height, tx.sender_id(), *amount_per_quantity)?;
        Ok(vec![Reservation::Balance(dividend_total(&shares, tx.sender_id())?)])
    }

    fn apply_attachment(&self, tx: &Transaction, ledger: &Ledger, height: u32) -> Result<(), LedgerError> {
        let Attachment::DividendPayment {
            asset_id,
            height: snapshot,
            amount_per_quantity,
        } = tx.attachment()
        else {
            return Err(missing_attachment());
        };
        let issuer = tx.sender_id();
        let shares = dividend_shares(ledger, *asset_id, *snapshot, issuer, *amount_per_quantity)?;
        let total = dividend_total(&shares, issuer)?;
        for (holder, share) in shares {
            ledger.add_to_balance_and_unconfirmed(holder, share, height, false)?;
        }
        ledger.add_to_balance(issuer, -total, height)
    }

    fn is_duplicate(&self, tx: &Transaction, duplicates: &mut Duplicates) -> bool {
        match tx.attachment() {
            Attachment::DividendPayment { asset_id, .. } => {
                is_duplicate(TxKind::DIVIDEND_PAYMENT, &asset_id.to_string(), duplicates, 1)
            }
            _ => false,
        }
    }
}

pub(crate) fn behaviors() -> Vec<Box<dyn TransactionBehavior>> {
    vec![
        Box::new(AssetIssuance),
        Box::new(AssetTransfer),
        Box::new(AssetDelete),
        Box::new(DividendPayment),
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

    struct World {
        ledger: Ledger,
        chain: MemChain,
        reg: TransactionRegistry,
        issuer: SecretPhrase,
        issuer_id: FullId,
    }

    impl World {
        fn new() -> Self {
            let ledger = ledger();
            let issuer = SecretPhrase::new("issuer");
            let issuer_id = FullId::from_public_key(&issuer.public_key().unwrap());
            ledger
                .add_to_balance_and_unconfirmed(issuer_id, 2000 * ONE_COIN, 0, false)
                .unwrap();
            Self {
                ledger,
                chain: MemChain::with_blocks(10),
                reg: TransactionRegistry::standard(),
                issuer,
                issuer_id,
            }
        }

        fn tx(&self, attachment: Attachment, fee: i64, recipient: Option<FullId>) -> Transaction {
            let mut b = TransactionBuilder::new(self.issuer.public_key().unwrap(), attachment)
                .timestamp(100)
                .fee(fee)
                .ec_block(0, 1000);
            if let Some(r) = recipient {
                b = b.recipient(r);
            }
            b.sign(&self.issuer).unwrap()
        }

        fn push(&self, tx: &Transaction, height: u32) {
            let ctx = ValidationContext {
                ledger: &self.ledger,
                chain: &self.chain,
                height,
                block_timestamp: 200,
            };
            self.reg.validate(tx, &ctx).unwrap();
            assert!(self.reg.apply_unconfirmed(tx, &self.ledger, height).unwrap());
            self.reg.apply(tx, &self.ledger, height).unwrap();
        }
    }

    #[test]
    fn issue_transfer_and_pay_dividend() {
        let w = World::new();
        let holder = FullId::new(77, 1);
        let issue = w.tx(
            Attachment::AssetIssuance {
                name: "GOLD".into(),
                description: String::new(),
                quantity: 1_000,
                decimals: 2,
            },
            1000 * ONE_COIN,
            None,
        );
        w.push(&issue, 1);
        let asset_id = issue.id();
        assert_eq!(w.ledger.asset(asset_id, None).unwrap().unwrap().quantity, 1_000);

        let transfer = w.tx(
            Attachment::AssetTransfer {
                asset_id,
                quantity: 400,
            },
            ONE_COIN,
            Some(holder),
        );
        w.push(&transfer, 2);
        assert_eq!(w.ledger.account_asset(holder, asset_id, None).unwrap().unwrap().quantity, 400);

        let before = w.ledger.balance(w.issuer_id, None).unwrap();
        let dividend = w.tx(
            Attachment::DividendPayment {
                asset_id,
                height: 2,
                amount_per_quantity: 1_000,
            },
            ONE_COIN,
            None,
        );
        w.push(&dividend, 3);
        assert_eq!(w.ledger.balance(holder, None).unwrap(), 400_000);
        assert_eq!(
            w.ledger.balance(w.issuer_id, None).unwrap(),
            before - 400_000 - ONE_COIN
        );
    }

    #[test]
    fn transfer_beyond_holding_cannot_be_reserved() {
        let w = World::new();
        let issue = w.tx(
            Attachment::AssetIssuance {
                name: "SILVER".into(),
                description: String::new(),
                quantity: 10,
                decimals: 0,
            },
            1000 * ONE_COIN,
            None,
        );
        w.push(&issue, 1);
        let transfer = w.tx(
            Attachment::AssetTransfer {
                asset_id: issue.id(),
                quantity: 11,
            },
            ONE_COIN,
            Some(FullId::new(5, 5)),
        );
        assert!(!w.reg.apply_unconfirmed(&transfer, &w.ledger, 2).unwrap());
    }

    #[test]
    fn one_dividend_per_asset_per_duplicates_map() {
        let w = World::new();
        let d = w.tx(
            Attachment::DividendPayment {
                asset_id: 5,
                height: 1,
                amount_per_quantity: 1,
            },
            ONE_COIN,
            None,
        );
        let mut dups = Duplicates::new();
        assert!(!w.reg.is_block_duplicate(&d, &mut dups));
        assert!(!w.reg.is_duplicate(&d, &mut dups));
        assert!(w.reg.is_duplicate(&d, &mut dups));
    }

    #[test]
    fn rejected_phased_dividend_releases_what_it_held() {
        use crate::core::ledger::phasing::{PhasingParams, VotingModel};
        use crate::core::state::store::Table;
        use crate::core::tx::appendix::PhasingAppendix;

        let w = World::new();
        let holder = FullId::new(78, 1);
        let issue = w.tx(
            Attachment::AssetIssuance {
                name: "COPPER".into(),
                description: String::new(),
                quantity: 1_000,
                decimals: 0,
            },
            1000 * ONE_COIN,
            None,
        );
        w.push(&issue, 1);
        let asset_id = issue.id();
        let transfer = w.tx(
            Attachment::AssetTransfer {
                asset_id,
                quantity: 400,
            },
            ONE_COIN,
            Some(holder),
        );
        w.push(&transfer, 2);

        let dividend = TransactionBuilder::new(
            w.issuer.public_key().unwrap(),
            Attachment::DividendPayment {
                asset_id,
                height: 2,
                amount_per_quantity: 1_000,
            },
        )
        .timestamp(100)
        .fee(2 * ONE_COIN)
        .ec_block(0, 1000)
        .phasing(PhasingAppendix {
            finish_height: 9,
            params: PhasingParams {
                voting_model: VotingModel::Account,
                quorum: 1,
                min_balance: 0,
                whitelist: vec![],
            },
        })
        .sign(&w.issuer)
        .unwrap();
        w.push(&dividend, 3);
        let poll = w.ledger.phasing_poll(dividend.id()).unwrap().unwrap();
        assert_eq!(poll.held.balance, 2 * ONE_COIN + 400_000);

        // the snapshot holding disappears once history below the floor is trimmed
        w.ledger.add_to_asset_and_unconfirmed(holder, asset_id, -400, 4).unwrap();
        w.ledger.store().trim(Table::AccountAsset, 5).unwrap();
        assert_eq!(
            w.reg.reservations(&dividend, &w.ledger).unwrap()[1],
            Reservation::Balance(0)
        );

        w.reg.reject_phased(&dividend, &poll, &w.ledger, 9).unwrap();
        assert_eq!(
            w.ledger.unconfirmed_balance(w.issuer_id).unwrap(),
            w.ledger.balance(w.issuer_id, None).unwrap()
        );
        assert_eq!(w.ledger.balance(holder, None).unwrap(), 0);
    }
}
