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

//! Blocks and the chain built from them.

/// Block header, block and their wire/JSON codecs.
pub mod block;
/// Head tracking and block/transaction storage.
pub mod blockchain;
/// Block rejection reasons.
pub mod errors;
/// Chain event fan-out.
pub mod events;
/// Validation, push/pop, fork choice, generation and trimming.
pub mod processor;
/// Coinbase reward distribution.
pub mod reward;
/// Work and stake targets.
pub mod target;
