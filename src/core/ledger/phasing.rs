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

//! Phased (deferred) transactions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::ledger::{Ledger, LedgerError};
use crate::core::params::MAX_PHASING_WHITELIST_SIZE;
use crate::core::state::store::Table;
use crate::core::types::{FullId, H256};

/// How phasing votes are weighted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum VotingModel {
    /// No vote: the transaction executes at its finish height.
    None = 0,
    /// One vote per account.
    Account = 1,
    /// Votes weighted by balance.
    Balance = 2,
}

impl VotingModel {
    /// Wire code.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Parse a wire code.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::None),
            1 => Some(Self::Account),
            2 => Some(Self::Balance),
            _ => None,
        }
    }
}

/// Phasing poll parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhasingParams {
    /// Weighting.
    pub voting_model: VotingModel,
    /// Approving weight needed.
    pub quorum: i64,
    /// Minimum balance (NQT) for a vote to count.
    pub min_balance: i64,
    /// Allowed voters; empty means anyone.
    pub whitelist: Vec<FullId>,
}

impl PhasingParams {
    /// Structural check.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.whitelist.len() > MAX_PHASING_WHITELIST_SIZE {
            return Err("phasing whitelist too long");
        }
        if self.min_balance < 0 {
            return Err("negative phasing min balance");
        }
        let mut sorted = self.whitelist.clone();
        sorted.sort();
        sorted.dedup();
        if sorted.len() != self.whitelist.len() {
            return Err("duplicate phasing whitelist entry");
        }
        match self.voting_model {
            VotingModel::None => {
                if self.quorum != 0 || !self.whitelist.is_empty() {
                    return Err("phasing without voting takes no quorum");
                }
            }
            VotingModel::Account => {
                if self.quorum <= 0 {
                    return Err("phasing quorum must be positive");
                }
                if !self.whitelist.is_empty() && self.quorum > self.whitelist.len() as i64 {
                    return Err("phasing quorum exceeds whitelist");
                }
            }
            VotingModel::Balance => {
                if self.quorum <= 0 {
                    return Err("phasing quorum must be positive");
                }
            }
        }
        Ok(())
    }
}

/// A pending phased transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhasingPoll {
    /// Phased transaction id.
    pub transaction_id: u64,
    /// Its full hash.
    pub full_hash: H256,
    /// Sender.
    pub account: FullId,
    /// Height at which the poll is decided.
    pub finish_height: u32,
    /// Parameters.
    pub params: PhasingParams,
    /// What the sender's unconfirmed balances gave up at inclusion.
    pub held: HeldFunds,
}

/// Unconfirmed balance and asset quantities held by a pending phased transaction.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeldFunds {
    /// NQT, fee included.
    pub balance: i64,
    /// Quantity per asset id.
    pub assets: BTreeMap<u64, i64>,
}

/// One approval.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhasingVote {
    /// Phased transaction id.
    pub transaction_id: u64,
    /// Voter.
    pub voter: FullId,
    /// Vote height.
    pub height: u32,
}

/// Poll outcome.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhasingResult {
    /// Phased transaction id.
    pub transaction_id: u64,
    /// Executed or released.
    pub approved: bool,
    /// Approving weight counted.
    pub result: i64,
    /// Decision height.
    pub height: u32,
}

fn finish_key(finish_height: u32, transaction_id: u64) -> [u8; 12] {
    let mut key = [0u8; 12];
    key[..4].copy_from_slice(&finish_height.to_be_bytes());
    key[4..].copy_from_slice(&transaction_id.to_be_bytes());
    key
}

fn vote_key(transaction_id: u64, voter: FullId) -> Vec<u8> {
    let mut key = transaction_id.to_be_bytes().to_vec();
    key.extend_from_slice(&voter.key_bytes());
    key
}

impl Ledger {
    /// Register a phased transaction.
    pub fn add_phasing_poll(&self, poll: &PhasingPoll, height: u32) -> Result<(), LedgerError> {
        self.save(
            Table::PhasingPoll,
            &poll.transaction_id.to_be_bytes(),
            height,
            Some(poll),
        )?;
        self.save(
            Table::PhasingFinish,
            &finish_key(poll.finish_height, poll.transaction_id),
            height,
            Some(&poll.transaction_id),
        )
    }

    /// Pending or decided poll for `transaction_id`.
    pub fn phasing_poll(&self, transaction_id: u64) -> Result<Option<PhasingPoll>, LedgerError> {
        self.load(Table::PhasingPoll, &transaction_id.to_be_bytes(), None)
    }

    /// Undecided polls finishing at `height`.
    pub fn phasing_polls_finishing_at(&self, height: u32) -> Result<Vec<PhasingPoll>, LedgerError> {
        let ids: Vec<u64> = self.load_all(Table::PhasingFinish, &height.to_be_bytes(), None)?;
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if self.phasing_result(id)?.is_some() {
                continue;
            }
            if let Some(poll) = self.phasing_poll(id)? {
                out.push(poll);
            }
        }
        Ok(out)
    }

    /// Record an approval.
    pub fn add_phasing_vote(&self, vote: &PhasingVote) -> Result<(), LedgerError> {
        let key = vote_key(vote.transaction_id, vote.voter);
        self.save(Table::PhasingVote, &key, vote.height, Some(vote))
    }

    /// True if `voter` already approved.
    pub fn has_phasing_vote(&self, transaction_id: u64, voter: FullId) -> Result<bool, LedgerError> {
        let v: Option<PhasingVote> =
            self.load(Table::PhasingVote, &vote_key(transaction_id, voter), None)?;
        Ok(v.is_some())
    }

    /// Approvals for `transaction_id`.
    pub fn phasing_votes(&self, transaction_id: u64) -> Result<Vec<PhasingVote>, LedgerError> {
        self.load_all(Table::PhasingVote, &transaction_id.to_be_bytes(), None)
    }

    /// Approving weight at `height` under the poll's model.
    pub fn count_phasing_votes(&self, poll: &PhasingPoll, height: u32) -> Result<i64, LedgerError> {
        let mut total = 0i64;
        for vote in self.phasing_votes(poll.transaction_id)? {
            if !poll.params.whitelist.is_empty() && !poll.params.whitelist.contains(&vote.voter) {
                continue;
            }
            let balance = self.balance(vote.voter, Some(height))?;
            if balance < poll.params.min_balance {
                continue;
            }
            total = total.saturating_add(match poll.params.voting_model {
                VotingModel::None => 0,
                VotingModel::Account => 1,
                VotingModel::Balance => balance,
            });
        }
        Ok(total)
    }

    /// Outcome, once decided.
    pub fn phasing_result(&self, transaction_id: u64) -> Result<Option<PhasingResult>, LedgerError> {
        self.load(Table::PhasingResult, &transaction_id.to_be_bytes(), None)
    }

    /// Store an outcome and drop the poll from the finish index.
    pub fn set_phasing_result(&self, result: &PhasingResult) -> Result<(), LedgerError> {
        if let Some(poll) = self.phasing_poll(result.transaction_id)? {
            self.save::<u64>(
                Table::PhasingFinish,
                &finish_key(poll.finish_height, poll.transaction_id),
                result.height,
                None,
            )?;
        }
        self.save(
            Table::PhasingResult,
            &result.transaction_id.to_be_bytes(),
            result.height,
            Some(result),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ledger::testutil::ledger;

    fn poll(model: VotingModel, quorum: i64, whitelist: Vec<FullId>) -> PhasingPoll {
        PhasingPoll {
            transaction_id: 42,
            full_hash: H256::ZERO,
            account: FullId::new(1, 1),
            finish_height: 20,
            params: PhasingParams {
                voting_model: model,
                quorum,
                min_balance: 0,
                whitelist,
            },
            held: HeldFunds::default(),
        }
    }

    #[test]
    fn params_reject_bad_quorum() {
        assert!(poll(VotingModel::Account, 0, vec![]).params.validate().is_err());
        assert!(poll(VotingModel::None, 1, vec![]).params.validate().is_err());
        let wl = vec![FullId::new(2, 0)];
        assert!(poll(VotingModel::Account, 2, wl).params.validate().is_err());
    }

    #[test]
    fn account_votes_respect_whitelist() {
        let l = ledger();
        let a = FullId::new(2, 0);
        let b = FullId::new(3, 0);
        let p = poll(VotingModel::Account, 1, vec![a]);
        l.add_phasing_poll(&p, 5).unwrap();
        for voter in [a, b] {
            l.add_phasing_vote(&PhasingVote {
                transaction_id: 42,
                voter,
                height: 6,
            })
            .unwrap();
        }
        assert_eq!(l.count_phasing_votes(&p, 6).unwrap(), 1);
        assert_eq!(l.phasing_polls_finishing_at(20).unwrap().len(), 1);
        l.set_phasing_result(&PhasingResult {
            transaction_id: 42,
            approved: true,
            result: 1,
            height: 7,
        })
        .unwrap();
        assert!(l.phasing_polls_finishing_at(20).unwrap().is_empty());
    }

    #[test]
    fn finish_index_follows_decisions_and_rollback() {
        let l = ledger();
        let mut early = poll(VotingModel::None, 0, vec![]);
        early.transaction_id = 7;
        early.finish_height = 30;
        let late = poll(VotingModel::Account, 1, vec![]);
        l.add_phasing_poll(&early, 5).unwrap();
        l.add_phasing_poll(&late, 6).unwrap();
        let at_30: Vec<u64> = l
            .phasing_polls_finishing_at(30)
            .unwrap()
            .iter()
            .map(|p| p.transaction_id)
            .collect();
        assert_eq!(at_30, vec![7]);

        l.set_phasing_result(&PhasingResult {
            transaction_id: 42,
            approved: true,
            result: 1,
            height: 9,
        })
        .unwrap();
        assert!(l.phasing_polls_finishing_at(20).unwrap().is_empty());

        l.rollback_to(8).unwrap();
        assert_eq!(l.phasing_polls_finishing_at(20).unwrap().len(), 1);
        l.rollback_to(5).unwrap();
        assert!(l.phasing_polls_finishing_at(20).unwrap().is_empty());
        assert_eq!(l.phasing_polls_finishing_at(30).unwrap().len(), 1);
    }
}
