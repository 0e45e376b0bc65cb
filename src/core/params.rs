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
#![allow(missing_docs)]

//! Consensus parameters: pure constants and height-driven schedules.
//!
//! "Height" is the shared counter of both block kinds; "local height" counts key blocks only
//! and drives block versions, the key-block subsidy and difficulty transitions.

/// Smallest unit per coin.
pub const ONE_COIN: i64 = 100_000_000;
pub const MAX_BALANCE_COIN: i64 = 1_000_000_000;
pub const MAX_BALANCE_NQT: i64 = MAX_BALANCE_COIN * ONE_COIN;

// --- block timing -------------------------------------------------------------------------

/// Target spacing of PoS blocks (seconds).
pub const BLOCK_TIME: u64 = 60;
/// Target spacing of key blocks (seconds).
pub const KEY_BLOCK_SPACING: u64 = 600;
/// Max seconds a block or transaction timestamp may be ahead of local time.
pub const MAX_TIMEDRIFT: u64 = 15;

pub const INITIAL_BASE_TARGET: u64 = 153_722_867;
pub const MAX_BASE_TARGET: u64 = INITIAL_BASE_TARGET * 50;
pub const MIN_BASE_TARGET: u64 = INITIAL_BASE_TARGET * 9 / 10;

// --- block size ---------------------------------------------------------------------------

pub const MAX_NUMBER_OF_POS_TRANSACTIONS: usize = 255;
pub const MAX_NUMBER_OF_KEY_TRANSACTIONS: usize = 32;
pub const MAX_POS_PAYLOAD_LENGTH: u32 = 1024 * 1024;
pub const MAX_KEY_PAYLOAD_LENGTH: u32 = 128 * 1024;
pub const MAX_TRANSACTION_BYTES: usize = 16 * 1024;

// --- proof of work ------------------------------------------------------------------------

/// Easiest permitted key-block target, compact encoded.
pub const MAX_WORK_TARGET_BITS: u32 = 0x207f_ffff;
/// Key-block local heights between target recomputations.
pub const DIFFICULTY_TRANSITION_INTERVAL: u32 = 144;
/// Key-block local heights spanned by the timespan measurement.
pub const DIFFICULTY_CALCULATION_INTERVAL: u32 = 144;
pub const TARGET_TIMESPAN: u64 = DIFFICULTY_CALCULATION_INTERVAL as u64 * KEY_BLOCK_SPACING;

// --- rewards ------------------------------------------------------------------------------

pub const INITIAL_KEY_BLOCK_SUBSIDY: i64 = 50 * ONE_COIN;
pub const SUBSIDY_HALVING_INTERVAL: u32 = 210_000;

/// Back fees are only redistributed above this height.
pub const BACK_FEES_HEIGHT: u32 = 4;
/// Shares (out of [`BACK_FEES_DENOMINATOR`]) for the generators of blocks h-1, h-2, h-3.
pub const BACK_FEES_NUMERATORS: [i64; 3] = [3, 2, 1];
pub const BACK_FEES_DENOMINATOR: i64 = 10;

// --- forging ------------------------------------------------------------------------------

/// Key blocks of confirmation required before a balance addition counts towards stake.
pub const GUARANTEED_BALANCE_KEYBLOCK_CONFIRMATIONS: u32 = 3;
/// Minimum effective balance (whole coins) to appear in the forger-eligibility tree.
pub const MIN_FORGING_BALANCE_COIN: i64 = 1_000;
/// From this local height on, key blocks must pin the forger-eligibility root.
pub const FORGER_MERKLE_FIXATION_LOCAL_HEIGHT: u32 = 8;

pub const LEASING_DELAY: u32 = 3;
pub const MIN_LEASING_PERIOD: u32 = 10;
pub const MAX_LEASING_PERIOD: u32 = u16::MAX as u32;

// --- rollback -----------------------------------------------------------------------------

/// Deepest pop-off a fork may cause.
pub const MAX_ROLLBACK: u32 = 720;

// --- transactions -------------------------------------------------------------------------

pub const TRANSACTION_VERSION: u8 = 1;
pub const MAX_REFERENCED_TRANSACTION_TIMESPAN: u64 = 60 * 24 * 3600;
pub const MAX_REFERENCED_TRANSACTION_DEPTH: u32 = 10;
/// Distance between the chain head and the EC block a new transaction pins.
pub const EC_BLOCK_DISTANCE: u32 = 10;
/// Height from which every type's "next" fee schedule replaces the baseline.
pub const NEXT_FEE_HEIGHT: u32 = 1_000_000;

pub const MAX_ARBITRARY_MESSAGE_LENGTH: usize = 1000;
pub const MAX_ENCRYPTED_MESSAGE_LENGTH: usize = 1024;
pub const MAX_PRUNABLE_MESSAGE_LENGTH: usize = 4096;
/// Blocks a prunable message body is retained after inclusion.
pub const MAX_PRUNABLE_LIFETIME: u32 = 14 * 1440;

pub const MAX_ALIAS_LENGTH: usize = 100;
pub const MAX_ALIAS_URI_LENGTH: usize = 1000;
pub const MAX_ACCOUNT_NAME_LENGTH: usize = 100;
pub const MAX_ACCOUNT_DESCRIPTION_LENGTH: usize = 1000;
pub const MAX_PROPERTY_NAME_LENGTH: usize = 32;
pub const MAX_PROPERTY_VALUE_LENGTH: usize = 160;

pub const MIN_ASSET_NAME_LENGTH: usize = 3;
pub const MAX_ASSET_NAME_LENGTH: usize = 10;
pub const MAX_ASSET_DESCRIPTION_LENGTH: usize = 1000;
pub const MAX_ASSET_DECIMALS: u8 = 8;
pub const MAX_ASSET_QUANTITY_QNT: i64 = 1_000_000_000 * 100_000_000;

pub const MAX_POLL_NAME_LENGTH: usize = 100;
pub const MAX_POLL_DESCRIPTION_LENGTH: usize = 1000;
pub const MAX_POLL_OPTION_LENGTH: usize = 100;
pub const MAX_POLL_OPTION_COUNT: usize = 20;
pub const MAX_POLL_DURATION: u32 = 14 * 1440;

pub const MAX_PHASING_DURATION: u32 = 14 * 1440;
pub const MAX_PHASING_WHITELIST_SIZE: usize = 10;
pub const MAX_PHASING_VOTE_TRANSACTIONS: usize = 10;

// --- block versions -----------------------------------------------------------------------

pub const GENESIS_BLOCK_VERSION: u32 = 0;

/// (first local height, version) schedule for PoS blocks.
pub const POS_BLOCK_VERSIONS: &[(u32, u32)] = &[(0, 3), (2_000_000, 4)];
/// (first local height, version) schedule for key blocks.
pub const KEY_BLOCK_VERSIONS: &[(u32, u32)] = &[(0, 1), (2_000_000, 2)];

fn scheduled(table: &[(u32, u32)], local_height: u32) -> u32 {
    table
        .iter()
        .rev()
        .find(|(from, _)| local_height >= *from)
        .map(|(_, v)| *v)
        .unwrap_or(table[0].1)
}

/// Version a PoS block must carry at `local_height`.
pub fn pos_block_version(local_height: u32) -> u32 {
    scheduled(POS_BLOCK_VERSIONS, local_height)
}

/// Version a key block must carry at `local_height`.
pub fn key_block_version(local_height: u32) -> u32 {
    scheduled(KEY_BLOCK_VERSIONS, local_height)
}

/// Subsidy paid by the key block at `local_height` (first key block is local height 1).
pub fn key_block_subsidy(local_height: u32) -> i64 {
    if local_height == 0 {
        return 0;
    }
    let halvings = (local_height - 1) / SUBSIDY_HALVING_INTERVAL;
    if halvings >= 63 {
        return 0;
    }
    INITIAL_KEY_BLOCK_SUBSIDY >> halvings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subsidy_halves_on_schedule() {
        assert_eq!(key_block_subsidy(0), 0);
        assert_eq!(key_block_subsidy(1), INITIAL_KEY_BLOCK_SUBSIDY);
        assert_eq!(key_block_subsidy(SUBSIDY_HALVING_INTERVAL), INITIAL_KEY_BLOCK_SUBSIDY);
        assert_eq!(
            key_block_subsidy(SUBSIDY_HALVING_INTERVAL + 1),
            INITIAL_KEY_BLOCK_SUBSIDY / 2
        );
    }

    #[test]
    fn versions_follow_local_height() {
        assert_eq!(pos_block_version(0), 3);
        assert_eq!(pos_block_version(1_999_999), 3);
        assert_eq!(pos_block_version(2_000_000), 4);
        assert_eq!(key_block_version(5), 1);
    }
}
