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

//! Work targets for key blocks, stake targets for PoS blocks, and the difficulty each adds.
//!
//! Key-block targets travel in the compact form: the high byte is the size in bytes and the low
//! three bytes are the mantissa, with 0x0080_0000 as a sign bit that no valid target sets.

use num_bigint::BigUint;
use num_traits::{One, ToPrimitive, Zero};

use crate::core::params::{
    BLOCK_TIME, DIFFICULTY_CALCULATION_INTERVAL, DIFFICULTY_TRANSITION_INTERVAL, MAX_BASE_TARGET,
    MAX_WORK_TARGET_BITS, MIN_BASE_TARGET, TARGET_TIMESPAN,
};
use crate::core::security::crypto::sha256_concat;
use crate::core::types::{PublicKey, H256};

const SIGN_BIT: u32 = 0x0080_0000;
const MANTISSA: u32 = 0x007f_ffff;

/// Expand compact bits; `None` for negative encodings.
pub fn compact_to_target(bits: u32) -> Option<BigUint> {
    let size = bits >> 24;
    let word = bits & MANTISSA;
    if word != 0 && bits & SIGN_BIT != 0 {
        return None;
    }
    let word = BigUint::from(word);
    Some(if size <= 3 {
        word >> (8 * (3 - size) as usize)
    } else {
        word << (8 * (size - 3) as usize)
    })
}

/// Compact form of `target`.
pub fn target_to_compact(target: &BigUint) -> u32 {
    let mut size = ((target.bits() + 7) / 8) as u32;
    let mut compact = if size <= 3 {
        (target << (8 * (3 - size) as usize)).to_u32().unwrap_or(0)
    } else {
        (target >> (8 * (size - 3) as usize)).to_u32().unwrap_or(0)
    };
    if compact & SIGN_BIT != 0 {
        compact >>= 8;
        size += 1;
    }
    compact | (size << 24)
}

/// Easiest permitted work target.
pub fn max_work_target() -> BigUint {
    compact_to_target(MAX_WORK_TARGET_BITS).unwrap_or_else(BigUint::zero)
}

/// Scale the target of `last_bits` by how long the last interval actually took.
pub fn retarget(last_bits: u32, actual_timespan: u64) -> u32 {
    let max = max_work_target();
    let timespan = actual_timespan.max(TARGET_TIMESPAN / 4);
    let last = compact_to_target(last_bits).unwrap_or_else(|| max.clone());
    let next = last * timespan / TARGET_TIMESPAN;
    target_to_compact(&next.min(max))
}

/// Local height of the key block whose timestamp opens the measured window ending at
/// `last_local_height`.
pub fn window_start(last_local_height: u32) -> u32 {
    last_local_height.saturating_sub(DIFFICULTY_CALCULATION_INTERVAL)
}

/// Bits a key block at `local_height` must carry.
///
/// `last_bits` is the work target of the previous key block; the timestamps bound the
/// measurement window ([`window_start`] to the previous key block).
pub fn next_work_required(local_height: u32, last_bits: u32, first_timestamp: u64, last_timestamp: u64) -> u32 {
    if local_height < DIFFICULTY_TRANSITION_INTERVAL {
        return MAX_WORK_TARGET_BITS;
    }
    if local_height % DIFFICULTY_TRANSITION_INTERVAL != 0 {
        return last_bits;
    }
    retarget(last_bits, last_timestamp.saturating_sub(first_timestamp))
}

/// True if the proof-of-work hash (little-endian) does not exceed the target of `bits`.
pub fn meets_target(pow_hash: &[u8; 32], bits: u32) -> bool {
    match compact_to_target(bits) {
        Some(target) if !target.is_zero() => BigUint::from_bytes_le(pow_hash) <= target,
        _ => false,
    }
}

/// Difficulty a key block with `bits` adds to the chain.
pub fn work_difficulty(bits: u32) -> BigUint {
    let target = compact_to_target(bits).unwrap_or_else(max_work_target);
    (BigUint::one() << 256usize) / (target + 1u32)
}

/// Difficulty a PoS block with `base_target` adds to the chain.
pub fn stake_difficulty(base_target: u64) -> BigUint {
    (BigUint::one() << 64usize) / BigUint::from(base_target.max(1))
}

/// Next link of the generation-sequence hash chain.
pub fn generation_sequence(previous: &H256, generator: &PublicKey) -> H256 {
    H256::from_bytes(sha256_concat(&[previous.as_bytes(), generator.as_bytes()]))
}

/// Hit of a generation sequence.
pub fn hit(generation_sequence: &H256) -> u64 {
    generation_sequence.id_prefix()
}

/// True if a generator with `effective_coins` of stake may forge `elapsed` seconds after
/// the previous block.
pub fn is_eligible(hit: u64, effective_coins: i64, base_target: u64, elapsed: u64) -> bool {
    if effective_coins <= 0 {
        return false;
    }
    let threshold = effective_coins as u128 * base_target as u128 * elapsed as u128;
    (hit as u128) < threshold
}

/// Earliest timestamp at which [`is_eligible`] holds.
pub fn hit_time(hit: u64, effective_coins: i64, base_target: u64, previous_timestamp: u64) -> Option<u64> {
    if effective_coins <= 0 || base_target == 0 {
        return None;
    }
    let per_second = effective_coins as u128 * base_target as u128;
    let wait = u64::try_from(hit as u128 / per_second).ok()?;
    previous_timestamp.checked_add(wait)?.checked_add(1)
}

/// Base target a PoS block must carry, `elapsed` seconds after the previous block.
pub fn next_base_target(previous: u64, elapsed: u64) -> u64 {
    let elapsed = elapsed.clamp(BLOCK_TIME / 2, BLOCK_TIME * 2);
    let next = previous as u128 * elapsed as u128 / BLOCK_TIME as u128;
    u64::try_from(next)
        .unwrap_or(MAX_BASE_TARGET)
        .clamp(MIN_BASE_TARGET, MAX_BASE_TARGET)
}
