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
#![deny(missing_docs)]

//! Peer request/response contract.
//!
//! The transport itself lives outside this crate; it only has to carry [`PeerRequest`] and
//! [`PeerResponse`] (JSON, tagged by `requestType`) and implement [`Peer`]. [`serve`] answers
//! requests from the local chain, and [`LocalPeer`] wires two in-process nodes together.

use futures::future::BoxFuture;
use num_bigint::BigUint;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

use crate::core::chain::block::Block;
use crate::core::chain::errors::BlockError;
use crate::core::chain::processor::BlockchainProcessor;
use crate::core::tx::transaction::Transaction;

/// Most ids returned by one `getNextBlockIds`.
pub const MAX_NEXT_BLOCK_IDS: usize = 1440;
/// Most blocks returned by one `getNextBlocks`.
pub const MAX_NEXT_BLOCKS: usize = 720;
/// Most transactions returned by one `getTransactions`.
pub const MAX_PEER_TRANSACTIONS: usize = 1000;

/// Peer request failure.
#[derive(Debug, Error)]
pub enum PeerError {
    /// No answer within the request timeout.
    #[error("timeout")]
    Timeout,
    /// Transport failure.
    #[error("unreachable: {0}")]
    Unreachable(String),
    /// Answer of the wrong shape.
    #[error("protocol: {0}")]
    Protocol(String),
    /// The remote failed to answer.
    #[error("remote: {0}")]
    Remote(String),
}

/// Request, keyed on the wire by `requestType`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "requestType", rename_all = "camelCase")]
pub enum PeerRequest {
    /// Head summary.
    GetCumulativeDifficulty,
    /// Exponentially spaced ids from the head down to genesis.
    GetMilestoneBlockIds,
    /// Ids following `block_id`.
    #[serde(rename_all = "camelCase")]
    GetNextBlockIds {
        /// Known block.
        block_id: u64,
        /// Requested count.
        limit: usize,
    },
    /// Blocks following `block_id`.
    #[serde(rename_all = "camelCase")]
    GetNextBlocks {
        /// Known block.
        block_id: u64,
        /// Requested count.
        limit: usize,
    },
    /// Unconfirmed transactions.
    GetTransactions,
}

/// Response to a [`PeerRequest`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "responseType", rename_all = "camelCase")]
pub enum PeerResponse {
    /// Head summary.
    #[serde(rename_all = "camelCase")]
    CumulativeDifficulty {
        /// Decimal cumulative difficulty.
        cumulative_difficulty: String,
        /// Head height.
        height: u32,
        /// Head id.
        block_id: u64,
    },
    /// Block ids.
    #[serde(rename_all = "camelCase")]
    BlockIds {
        /// Ids.
        block_ids: Vec<u64>,
    },
    /// Blocks.
    Blocks {
        /// Blocks in chain order.
        blocks: Vec<Block>,
    },
    /// Transactions.
    Transactions {
        /// Unconfirmed transactions.
        transactions: Vec<Transaction>,
    },
}

/// Peer head summary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainInfo {
    /// Cumulative difficulty.
    pub cumulative_difficulty: BigUint,
    /// Head height.
    pub height: u32,
    /// Head id.
    pub block_id: u64,
}

impl PeerResponse {
    /// Unpack a head summary.
    pub fn into_chain_info(self) -> Result<ChainInfo, PeerError> {
        match self {
            Self::CumulativeDifficulty {
                cumulative_difficulty,
                height,
                block_id,
            } => {
                let cumulative_difficulty = BigUint::parse_bytes(cumulative_difficulty.as_bytes(), 10)
                    .ok_or_else(|| PeerError::Protocol("cumulative difficulty".into()))?;
                Ok(ChainInfo {
                    cumulative_difficulty,
                    height,
                    block_id,
                })
            }
            other => Err(unexpected(&other)),
        }
    }

    /// Unpack block ids.
    pub fn into_block_ids(self) -> Result<Vec<u64>, PeerError> {
        match self {
            Self::BlockIds { block_ids } => Ok(block_ids),
            other => Err(unexpected(&other)),
        }
    }

    /// Unpack blocks.
    pub fn into_blocks(self) -> Result<Vec<Block>, PeerError> {
        match self {
            Self::Blocks { blocks } => Ok(blocks),
            other => Err(unexpected(&other)),
        }
    }

    /// Unpack transactions.
    pub fn into_transactions(self) -> Result<Vec<Transaction>, PeerError> {
        match self {
            Self::Transactions { transactions } => Ok(transactions),
            other => Err(unexpected(&other)),
        }
    }
}

fn unexpected(response: &PeerResponse) -> PeerError {
    let name = match response {
        PeerResponse::CumulativeDifficulty { .. } => "cumulativeDifficulty",
        PeerResponse::BlockIds { .. } => "blockIds",
        PeerResponse::Blocks { .. } => "blocks",
        PeerResponse::Transactions { .. } => "transactions",
    };
    PeerError::Protocol(format!("unexpected {name} response"))
}

/// Answer `request` from the local chain.
pub fn serve(processor: &BlockchainProcessor, request: PeerRequest) -> Result<PeerResponse, BlockError> {
    let chain = processor.chain();
    Ok(match request {
        PeerRequest::GetCumulativeDifficulty => {
            let last = chain.last_block();
            PeerResponse::CumulativeDifficulty {
                cumulative_difficulty: last.cumulative_difficulty.to_string(),
                height: last.height,
                block_id: last.id(),
            }
        }
        PeerRequest::GetMilestoneBlockIds => PeerResponse::BlockIds {
            block_ids: chain.milestone_block_ids()?,
        },
        PeerRequest::GetNextBlockIds { block_id, limit } => PeerResponse::BlockIds {
            block_ids: chain.next_block_ids(block_id, limit.min(MAX_NEXT_BLOCK_IDS))?,
        },
        PeerRequest::GetNextBlocks { block_id, limit } => PeerResponse::Blocks {
            blocks: chain.next_blocks(block_id, limit.min(MAX_NEXT_BLOCKS))?,
        },
        PeerRequest::GetTransactions => PeerResponse::Transactions {
            transactions: processor
                .pool()
                .all()
                .into_iter()
                .take(MAX_PEER_TRANSACTIONS)
                .collect(),
        },
    })
}

/// A remote node.
pub trait Peer: Send + Sync {
    /// Display address.
    fn address(&self) -> &str;
    /// Selection weight; heavier peers are asked more often.
    fn weight(&self) -> u64 {
        1
    }
    /// Send one request.
    fn request(&self, request: PeerRequest) -> BoxFuture<'_, Result<PeerResponse, PeerError>>;
    /// Stop talking to this peer because it served invalid content.
    fn blacklist(&self, reason: &str);
    /// Drop the connection; the peer may be retried later.
    fn deactivate(&self);
    /// True once blacklisted.
    fn is_blacklisted(&self) -> bool;
    /// True while connected and not blacklisted.
    fn is_active(&self) -> bool;
}

/// Source of connected peers.
pub trait PeerNetwork: Send + Sync {
    /// Peers currently usable.
    fn connected_peers(&self) -> Vec<Arc<dyn Peer>>;
}

/// Fixed set of peers.
#[derive(Default)]
pub struct StaticPeers {
    peers: RwLock<Vec<Arc<dyn Peer>>>,
}

impl StaticPeers {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a peer.
    pub fn add(&self, peer: Arc<dyn Peer>) {
        self.peers.write().push(peer);
    }
}

impl PeerNetwork for StaticPeers {
    fn connected_peers(&self) -> Vec<Arc<dyn Peer>> {
        self.peers
            .read()
            .iter()
            .filter(|p| p.is_active())
            .cloned()
            .collect()
    }
}

/// In-process peer answering from another node's processor; requests and responses pass
/// through their JSON wire form.
pub struct LocalPeer {
    address: String,
    weight: u64,
    processor: Arc<BlockchainProcessor>,
    blacklisted: AtomicBool,
    active: AtomicBool,
}

impl LocalPeer {
    /// Peer `address` backed by `processor`.
    pub fn new(address: impl Into<String>, processor: Arc<BlockchainProcessor>) -> Self {
        Self {
            address: address.into(),
            weight: 1,
            processor,
            blacklisted: AtomicBool::new(false),
            active: AtomicBool::new(true),
        }
    }

    /// Selection weight.
    pub fn with_weight(mut self, weight: u64) -> Self {
        self.weight = weight;
        self
    }

    /// Reconnect a deactivated peer.
    pub fn reactivate(&self) {
        self.active.store(true, Ordering::SeqCst);
    }
}

impl Peer for LocalPeer {
    fn address(&self) -> &str {
        &self.address
    }

    fn weight(&self) -> u64 {
        self.weight
    }

    fn request(&self, request: PeerRequest) -> BoxFuture<'_, Result<PeerResponse, PeerError>> {
        Box::pin(async move {
            let wire = serde_json::to_vec(&request).map_err(|e| PeerError::Protocol(e.to_string()))?;
            let processor = self.processor.clone();
            let answer = tokio::task::spawn_blocking(move || -> Result<Vec<u8>, PeerError> {
                let request: PeerRequest =
                    serde_json::from_slice(&wire).map_err(|e| PeerError::Protocol(e.to_string()))?;
                let response = serve(&processor, request).map_err(|e| PeerError::Remote(e.to_string()))?;
                serde_json::to_vec(&response).map_err(|e| PeerError::Protocol(e.to_string()))
            })
            .await
            .map_err(|e| PeerError::Unreachable(e.to_string()))??;
            serde_json::from_slice(&answer).map_err(|e| PeerError::Protocol(e.to_string()))
        })
    }

    fn blacklist(&self, reason: &str) {
        if !self.blacklisted.swap(true, Ordering::SeqCst) {
            warn!(peer = %self.address, reason, "peer blacklisted");
        }
    }

    fn deactivate(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    fn is_blacklisted(&self) -> bool {
        self.blacklisted.load(Ordering::SeqCst)
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst) && !self.is_blacklisted()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_are_tagged_by_request_type() {
        let json = serde_json::to_string(&PeerRequest::GetNextBlockIds { block_id: 7, limit: 3 }).unwrap();
        assert_eq!(json, r#"{"requestType":"getNextBlockIds","blockId":7,"limit":3}"#);
        let back: PeerRequest = serde_json::from_str(r#"{"requestType":"getCumulativeDifficulty"}"#).unwrap();
        assert_eq!(back, PeerRequest::GetCumulativeDifficulty);
    }

    #[test]
    fn wrong_response_shape_is_a_protocol_error() {
        let r = PeerResponse::BlockIds { block_ids: vec![1] };
        assert!(matches!(r.clone().into_blocks(), Err(PeerError::Protocol(_))));
        assert_eq!(r.into_block_ids().unwrap(), vec![1]);
        let bad = PeerResponse::CumulativeDifficulty {
            cumulative_difficulty: "x1".into(),
            height: 0,
            block_id: 0,
        };
        assert!(bad.into_chain_info().is_err());
    }
}
