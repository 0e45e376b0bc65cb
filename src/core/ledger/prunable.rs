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

use serde::{Deserialize, Serialize};

use crate::core::ledger::{Ledger, LedgerError};
use crate::core::params::MAX_PRUNABLE_LIFETIME;
use crate::core::state::store::Table;

/// Body of a prunable plain message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrunableMessage {
    /// Carrying transaction.
    pub transaction_id: u64,
    /// Body.
    pub message: Vec<u8>,
    /// UTF-8 text flag.
    pub is_text: bool,
    /// Inclusion height.
    pub height: u32,
}

impl Ledger {
    /// Store a message body.
    pub fn add_prunable_message(&self, msg: &PrunableMessage) -> Result<(), LedgerError> {
        self.save(
            Table::PrunableMessage,
            &msg.transaction_id.to_be_bytes(),
            msg.height,
            Some(msg),
        )
    }

    /// Message body, while retained.
    pub fn prunable_message(&self, transaction_id: u64) -> Result<Option<PrunableMessage>, LedgerError> {
        self.load(Table::PrunableMessage, &transaction_id.to_be_bytes(), None)
    }

    /// Mark bodies older than the retention window as deleted at `floor`.
    pub fn expire_prunable_messages(&self, head: u32, floor: u32) -> Result<usize, LedgerError> {
        let cutoff = head.saturating_sub(MAX_PRUNABLE_LIFETIME);
        let all: Vec<PrunableMessage> = self.load_all(Table::PrunableMessage, &[], None)?;
        let mut n = 0;
        for msg in all.into_iter().filter(|m| m.height < cutoff && m.height <= floor) {
            self.save::<PrunableMessage>(
                Table::PrunableMessage,
                &msg.transaction_id.to_be_bytes(),
                floor,
                None,
            )?;
            n += 1;
        }
        Ok(n)
    }
}
