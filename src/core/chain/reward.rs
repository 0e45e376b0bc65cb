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

//! Coinbase reward distribution.
//!
//! A block pays the key-block subsidy (key blocks only) plus the fees it includes. Past
//! `BACK_FEES_HEIGHT`, a PoS block that includes at least one back-fee-paying transaction
//! hands 3/10, 2/10 and 1/10 of its fees to the generators of the three preceding blocks.

use std::collections::BTreeMap;

use crate::core::params::{key_block_subsidy, BACK_FEES_DENOMINATOR, BACK_FEES_HEIGHT, BACK_FEES_NUMERATORS};
use crate::core::types::FullId;

use super::block::BlockKind;

/// Everything the distribution depends on.
#[derive(Clone, Debug)]
pub struct RewardInput {
    /// Kind of the block being paid for.
    pub kind: BlockKind,
    /// Its height.
    pub height: u32,
    /// Its local (key-block) height.
    pub local_height: u32,
    /// Generator.
    pub generator: FullId,
    /// Sum of included fees.
    pub fees: i64,
    /// True if some included transaction is not back-fee exempt.
    pub pays_back_fees: bool,
    /// Generators of the blocks at height-1, height-2, height-3 (as many as exist).
    pub previous_generators: Vec<FullId>,
}

/// Subsidy the block earns.
pub fn subsidy(kind: BlockKind, local_height: u32) -> i64 {
    match kind {
        BlockKind::Key => key_block_subsidy(local_height),
        BlockKind::Pos => 0,
    }
}

/// Recipient map the block's coinbase must carry; zero shares are omitted.
pub fn distribute(input: &RewardInput) -> BTreeMap<FullId, i64> {
    let total = subsidy(input.kind, input.local_height).saturating_add(input.fees);
    let mut out = BTreeMap::new();
    let mut remaining = total;
    if input.kind == BlockKind::Pos && input.height > BACK_FEES_HEIGHT && input.pays_back_fees {
        for (numerator, previous) in BACK_FEES_NUMERATORS.iter().zip(&input.previous_generators) {
            let share = input.fees.saturating_mul(*numerator) / BACK_FEES_DENOMINATOR;
            if share > 0 {
                *out.entry(*previous).or_insert(0) += share;
                remaining -= share;
            }
        }
    }
    if remaining > 0 {
        *out.entry(input.generator).or_insert(0) += remaining;
    }
    out
}

/// Total a recipient map pays.
pub fn total(recipients: &BTreeMap<FullId, i64>) -> i64 {
    recipients.values().fold(0i64, |acc, v| acc.saturating_add(*v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::params::{INITIAL_KEY_BLOCK_SUBSIDY, ONE_COIN};

    fn input(kind: BlockKind, height: u32, fees: i64, pays: bool) -> RewardInput {
        RewardInput {
            kind,
            height,
            local_height: 1,
            generator: FullId::new(1, 0),
            fees,
            pays_back_fees: pays,
            previous_generators: vec![FullId::new(2, 0), FullId::new(3, 0), FullId::new(4, 0)],
        }
    }

    #[test]
    fn back_fees_go_to_previous_generators() {
        let d = distribute(&input(BlockKind::Pos, 10, 10 * ONE_COIN, true));
        assert_eq!(d[&FullId::new(2, 0)], 3 * ONE_COIN);
        assert_eq!(d[&FullId::new(3, 0)], 2 * ONE_COIN);
        assert_eq!(d[&FullId::new(4, 0)], ONE_COIN);
        assert_eq!(d[&FullId::new(1, 0)], 4 * ONE_COIN);
        assert_eq!(total(&d), 10 * ONE_COIN);
    }

    #[test]
    fn no_back_fees_when_exempt_early_or_key() {
        for i in [
            input(BlockKind::Pos, 10, 10 * ONE_COIN, false),
            input(BlockKind::Pos, BACK_FEES_HEIGHT, 10 * ONE_COIN, true),
        ] {
            assert_eq!(distribute(&i), BTreeMap::from([(FullId::new(1, 0), 10 * ONE_COIN)]));
        }
        let key = distribute(&input(BlockKind::Key, 10, ONE_COIN, true));
        assert_eq!(key[&FullId::new(1, 0)], INITIAL_KEY_BLOCK_SUBSIDY + ONE_COIN);
        assert_eq!(key.len(), 1);
    }

    #[test]
    fn empty_block_pays_nothing() {
        assert!(distribute(&input(BlockKind::Pos, 10, 0, false)).is_empty());
    }

    #[test]
    fn repeated_generator_accumulates() {
        let mut i = input(BlockKind::Pos, 10, 10 * ONE_COIN, true);
        i.previous_generators = vec![FullId::new(1, 0); 3];
        assert_eq!(distribute(&i), BTreeMap::from([(FullId::new(1, 0), 10 * ONE_COIN)]));
    }
}
