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

use serde::{Deserialize, Serialize};

use crate::core::ledger::{Ledger, LedgerError};
use crate::core::state::store::Table;
use crate::core::types::FullId;

/// An open or finished poll.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Poll {
    /// Id (creating transaction id).
    pub id: u64,
    /// Creator.
    pub account: FullId,
    /// Name.
    pub name: String,
    /// Description.
    pub description: String,
    /// Options.
    pub options: Vec<String>,
    /// Fewest options a ballot must select.
    pub min_options: u8,
    /// Most options a ballot may select.
    pub max_options: u8,
    /// Last height at which votes are accepted.
    pub finish_height: u32,
}

/// One ballot: a 0/1 flag per option.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    /// Poll.
    pub poll_id: u64,
    /// Voter.
    pub voter: FullId,
    /// Selections.
    pub choices: Vec<u8>,
}

fn vote_key(poll_id: u64, voter: FullId) -> Vec<u8> {
    let mut key = poll_id.to_be_bytes().to_vec();
    key.extend_from_slice(&voter.key_bytes());
    key
}

impl Ledger {
    /// Poll by id.
    pub fn poll(&self, id: u64) -> Result<Option<Poll>, LedgerError> {
        self.load(Table::Poll, &id.to_be_bytes(), None)
    }

    /// Create a poll.
    pub fn add_poll(&self, poll: &Poll, height: u32) -> Result<(), LedgerError> {
        self.save(Table::Poll, &poll.id.to_be_bytes(), height, Some(poll))
    }

    /// Ballot of `voter`.
    pub fn vote(&self, poll_id: u64, voter: FullId) -> Result<Option<Vote>, LedgerError> {
        self.load(Table::Vote, &vote_key(poll_id, voter), None)
    }

    /// Record a ballot.
    pub fn add_vote(&self, vote: &Vote, height: u32) -> Result<(), LedgerError> {
        self.save(Table::Vote, &vote_key(vote.poll_id, vote.voter), height, Some(vote))
    }

    /// Selection count per option.
    pub fn poll_results(&self, poll_id: u64) -> Result<Vec<u64>, LedgerError> {
        let poll = self.poll(poll_id)?.ok_or(LedgerError::Missing("poll"))?;
        let mut counts = vec![0u64; poll.options.len()];
        let votes: Vec<Vote> = self.load_all(Table::Vote, &poll_id.to_be_bytes(), None)?;
        for vote in votes {
            for (slot, choice) in counts.iter_mut().zip(vote.choices.iter()) {
                if *choice != 0 {
                    *slot += 1;
                }
            }
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ledger::testutil::ledger;

    #[test]
    fn results_count_selected_options() {
        let l = ledger();
        l.add_poll(
            &Poll {
                id: 9,
                account: FullId::new(1, 0),
                name: "color".into(),
                description: String::new(),
                options: vec!["red".into(), "blue".into()],
                min_options: 1,
                max_options: 2,
                finish_height: 100,
            },
            1,
        )
        .unwrap();
        for (n, choices) in [(2u64, vec![1, 0]), (3, vec![1, 1])] {
            l.add_vote(
                &Vote {
                    poll_id: 9,
                    voter: FullId::new(n, 0),
                    choices,
                },
                2,
            )
            .unwrap();
        }
        assert_eq!(l.poll_results(9).unwrap(), vec![2, 1]);
    }
}
