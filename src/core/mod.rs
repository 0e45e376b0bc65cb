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

//! Core protocol primitives.

/// Blocks, chain head tracking and the blockchain processor.
pub mod chain;
/// Node configuration (TOML).
pub mod config;
/// Versioned account ledger and satellite records.
pub mod ledger;
/// Consensus parameters.
pub mod params;
/// Hashing and signatures.
pub mod security;
/// Versioned store and Merkle structures.
pub mod state;
/// Transactions, appendages, fees and the type registry.
pub mod tx;
/// Deterministic types and canonical encoding helpers.
pub mod types;
