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

use crate::core::params::ONE_COIN;

/// Fee schedule of an attachment or appendage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fee {
    /// Flat fee.
    Constant(i64),
    /// `constant + per_unit * ((size - 1) / unit_size)` for a non-empty payload.
    SizeBased {
        /// Flat part.
        constant: i64,
        /// Charge per started unit after the first.
        per_unit: i64,
        /// Unit size in bytes.
        unit_size: usize,
    },
}

impl Fee {
    /// Fee for a payload of `size` bytes.
    pub fn compute(&self, size: usize) -> i64 {
        match *self {
            Fee::Constant(c) => c,
            Fee::SizeBased {
                constant,
                per_unit,
                unit_size,
            } => {
                if size == 0 || unit_size == 0 {
                    return constant;
                }
                let units = ((size - 1) / unit_size) as i64;
                constant.saturating_add(per_unit.saturating_mul(units))
            }
        }
    }
}

/// Baseline for most types.
pub const DEFAULT_FEE: Fee = Fee::Constant(ONE_COIN);
/// Coinbase and free appendages.
pub const NO_FEE: Fee = Fee::Constant(0);
/// Surcharge for referencing another transaction.
pub const REFERENCED_TRANSACTION_DEPOSIT: i64 = ONE_COIN;

/// Plain and encrypted message appendages.
pub const MESSAGE_FEE: Fee = Fee::SizeBased {
    constant: 0,
    per_unit: ONE_COIN,
    unit_size: 32,
};
/// Prunable message appendage.
pub const PRUNABLE_MESSAGE_FEE: Fee = Fee::SizeBased {
    constant: ONE_COIN / 10,
    per_unit: ONE_COIN / 10,
    unit_size: 1024,
};
/// Phasing appendage.
pub const PHASING_FEE: Fee = Fee::Constant(ONE_COIN);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_based_charges_started_units_after_first() {
        assert_eq!(MESSAGE_FEE.compute(0), 0);
        assert_eq!(MESSAGE_FEE.compute(32), 0);
        assert_eq!(MESSAGE_FEE.compute(33), ONE_COIN);
        assert_eq!(MESSAGE_FEE.compute(65), 2 * ONE_COIN);
        assert_eq!(DEFAULT_FEE.compute(10_000), ONE_COIN);
    }
}
