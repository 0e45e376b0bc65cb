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

//! Amunchain hybrid PoW/PoS node - consensus and state-transition engine.
//!
//! This repository provides:
//! - Deterministic types & canonical byte/JSON encodings for blocks and transactions
//! - A versioned account/asset ledger on sled with height-stamped rollback
//! - A transaction type registry driving every state mutation
//! - The blockchain processor: validation, fork choice, pop-off, rescan, difficulty
//! - A peer sync loop against an abstract transport
//! - Monitoring via Prometheus metrics and structured logging

/// Core protocol primitives (types, params, ledger, transactions, chain).
pub mod core;
/// Observability (metrics).
pub mod monitoring;
/// Peer contracts and the block download loop.
pub mod networking;
