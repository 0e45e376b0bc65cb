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

//! Block download loop.
//!
//! One round: pick a peer (weighted random), compare cumulative difficulty, find the last
//! common block through milestones, list the ids the peer has after it, fetch them in
//! segments concurrently (a failed segment is reassigned to another peer), then hand the
//! contiguous prefix to the processor as a fork. Peer I/O never happens under the chain lock.

use futures::future::join_all;
use parking_lot::Mutex;
use ring::rand::{SecureRandom, SystemRandom};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::core::chain::block::Block;
use crate::core::chain::blockchain::LinkedBlock;
use crate::core::chain::errors::BlockError;
use crate::core::chain::processor::BlockchainProcessor;
use crate::core::config::SyncConfig;
use crate::core::ledger::LedgerError;
use crate::core::tx::transaction::Transaction;
use crate::monitoring::metrics::Metrics;

use super::peer::{ChainInfo, Peer, PeerError, PeerNetwork, PeerRequest, PeerResponse, MAX_NEXT_BLOCK_IDS};
use super::peer_score::{Decision, PeerScore, ScoreParams};

const FAILURE_PENALTY: i32 = 20;
const SLOW_PENALTY: i32 = 10;
const GOOD_ANSWER: i32 = 1;

/// Sync failure.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The running flag was cleared; results in flight are discarded.
    #[error("sync stopped")]
    Stopped,
    /// No usable peer.
    #[error("no connected peers")]
    NoPeers,
    /// A peer request failed.
    #[error("peer {peer}: {source}")]
    Peer {
        /// Peer address.
        peer: String,
        /// Failure.
        #[source]
        source: PeerError,
    },
    /// Local chain failure.
    #[error(transparent)]
    Block(#[from] BlockError),
    /// A blocking chain task panicked or was cancelled.
    #[error("chain task: {0}")]
    Task(String),
}

impl From<LedgerError> for SyncError {
    fn from(e: LedgerError) -> Self {
        Self::Block(e.into())
    }
}

/// Download loop knobs.
#[derive(Clone, Debug)]
pub struct SyncSettings {
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Blocks per segment.
    pub segment_size: usize,
    /// Peers tried per segment.
    pub max_segment_retries: u32,
    /// Pause between rounds.
    pub poll_interval: Duration,
    /// Answers slower than this count against the peer.
    pub slow_peer_latency: Duration,
}

impl From<&SyncConfig> for SyncSettings {
    fn from(c: &SyncConfig) -> Self {
        Self {
            request_timeout: Duration::from_millis(c.request_timeout_ms),
            segment_size: c.segment_size.max(1),
            max_segment_retries: c.max_segment_retries.max(1),
            poll_interval: Duration::from_millis(c.poll_interval_ms),
            slow_peer_latency: Duration::from_millis(c.slow_peer_latency_ms),
        }
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self::from(&SyncConfig::default())
    }
}

/// What one round did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Blocks now on the chain that came from peers.
    pub blocks_applied: usize,
    /// Unconfirmed transactions admitted.
    pub transactions_added: usize,
    /// True if the head moved to a peer's fork.
    pub switched: bool,
}

struct Segment {
    after: u64,
    ids: Vec<u64>,
}

struct Fetched {
    provider: Arc<dyn Peer>,
    blocks: Vec<Block>,
}

/// Pulls blocks and transactions from peers into the local chain.
pub struct BlockDownloader {
    processor: Arc<BlockchainProcessor>,
    network: Arc<dyn PeerNetwork>,
    settings: SyncSettings,
    scores: Mutex<PeerScore>,
    running: Arc<AtomicBool>,
    rng: SystemRandom,
    metrics: Option<Metrics>,
}

impl BlockDownloader {
    /// Downloader feeding `processor` from `network`.
    pub fn new(processor: Arc<BlockchainProcessor>, network: Arc<dyn PeerNetwork>, settings: SyncSettings) -> Self {
        Self {
            processor,
            network,
            settings,
            scores: Mutex::new(PeerScore::new(ScoreParams::default())),
            running: Arc::new(AtomicBool::new(true)),
            rng: SystemRandom::new(),
            metrics: None,
        }
    }

    /// Report peer counts and blacklistings to `metrics`.
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Flag gating the loop; clearing it stops the loop after the current request.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    /// Clear the running flag.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    fn check_running(&self) -> Result<(), SyncError> {
        if self.running.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SyncError::Stopped)
        }
    }

    /// Run rounds until stopped.
    pub async fn run(&self) {
        info!("block download loop started");
        loop {
            match self.sync_once().await {
                Ok(report) if report.blocks_applied > 0 => {
                    info!(
                        blocks = report.blocks_applied,
                        switched = report.switched,
                        height = self.processor.chain().height(),
                        "synced from peer"
                    );
                }
                Ok(_) => {}
                Err(SyncError::Stopped) => break,
                Err(SyncError::NoPeers) => debug!("no peers to sync from"),
                Err(e) => warn!(error = %e, "sync round failed"),
            }
            if self.check_running().is_err() {
                break;
            }
            tokio::time::sleep(self.settings.poll_interval).await;
        }
        info!("block download loop stopped");
    }

    /// One round against one weighted-random peer.
    pub async fn sync_once(&self) -> Result<SyncReport, SyncError> {
        self.check_running()?;
        let peer = self.choose_peer(&[])?;
        let mut report = SyncReport::default();

        let info = self.chain_info(&peer).await?;
        let ours = self.processor.chain().last_block().cumulative_difficulty;
        if info.cumulative_difficulty > ours {
            let (applied, switched) = self.download_from(&peer).await?;
            report.blocks_applied = applied;
            report.switched = switched;
        }

        self.check_running()?;
        report.transactions_added = self.pull_transactions(&peer).await?;
        Ok(report)
    }

    /// Weighted random pick among usable peers; throttled peers weigh a quarter.
    fn choose_peer(&self, exclude: &[String]) -> Result<Arc<dyn Peer>, SyncError> {
        let now = Instant::now();
        let peers = self.network.connected_peers();
        if let Some(m) = &self.metrics {
            m.sync_peers.set(peers.len() as i64);
        }
        let mut scores = self.scores.lock();
        let mut candidates = Vec::new();
        let mut total = 0u64;
        for peer in peers {
            let address = peer.address().to_string();
            if exclude.contains(&address) || peer.is_blacklisted() || scores.is_dropped(&address, now) {
                continue;
            }
            let mut weight = peer.weight().max(1);
            if scores.score(&address, now) < 0 {
                weight = (weight / 4).max(1);
            }
            total = total.saturating_add(weight);
            candidates.push((weight, peer));
        }
        drop(scores);
        if candidates.is_empty() {
            return Err(SyncError::NoPeers);
        }
        let mut pick = self.random_u64() % total;
        for (weight, peer) in &candidates {
            if pick < *weight {
                return Ok(peer.clone());
            }
            pick -= weight;
        }
        Ok(candidates[candidates.len() - 1].1.clone())
    }

    fn random_u64(&self) -> u64 {
        let mut b = [0u8; 8];
        match self.rng.fill(&mut b) {
            Ok(()) => u64::from_le_bytes(b),
            Err(_) => 0,
        }
    }

    /// Send `request` with the timeout, scoring the peer on the outcome and its latency.
    async fn ask(&self, peer: &Arc<dyn Peer>, request: PeerRequest) -> Result<PeerResponse, SyncError> {
        let address = peer.address().to_string();
        let started = Instant::now();
        let outcome = tokio::time::timeout(self.settings.request_timeout, peer.request(request)).await;
        let now = Instant::now();
        let result = match outcome {
            Err(_) => Err(PeerError::Timeout),
            Ok(r) => r,
        };
        let decision = {
            let mut scores = self.scores.lock();
            match &result {
                Err(_) => scores.observe_bad(&address, now, FAILURE_PENALTY),
                Ok(_) if now.duration_since(started) > self.settings.slow_peer_latency => {
                    scores.observe_bad(&address, now, SLOW_PENALTY)
                }
                Ok(_) => scores.observe_good(&address, now, GOOD_ANSWER),
            }
        };
        if decision == Decision::Drop {
            debug!(peer = %address, "deactivating slow or failing peer");
            peer.deactivate();
        }
        result.map_err(|source| SyncError::Peer { peer: address, source })
    }

    fn protocol(peer: &Arc<dyn Peer>, source: PeerError) -> SyncError {
        SyncError::Peer {
            peer: peer.address().to_string(),
            source,
        }
    }

    async fn chain_info(&self, peer: &Arc<dyn Peer>) -> Result<ChainInfo, SyncError> {
        self.ask(peer, PeerRequest::GetCumulativeDifficulty)
            .await?
            .into_chain_info()
            .map_err(|e| Self::protocol(peer, e))
    }

    async fn next_block_ids(&self, peer: &Arc<dyn Peer>, block_id: u64, limit: usize) -> Result<Vec<u64>, SyncError> {
        self.ask(peer, PeerRequest::GetNextBlockIds { block_id, limit })
            .await?
            .into_block_ids()
            .map_err(|e| Self::protocol(peer, e))
    }

    fn blacklist(&self, peer: &Arc<dyn Peer>, reason: &str) {
        peer.blacklist(reason);
        if let Some(m) = &self.metrics {
            m.peers_blacklisted_total.inc();
        }
        warn!(peer = %peer.address(), reason, "blacklisted peer");
    }

    /// Last block shared with `peer`: the newest known milestone, refined forward through
    /// the ids the peer lists after it.
    async fn common_block(&self, peer: &Arc<dyn Peer>) -> Result<LinkedBlock, SyncError> {
        let milestones = self
            .ask(peer, PeerRequest::GetMilestoneBlockIds)
            .await?
            .into_block_ids()
            .map_err(|e| Self::protocol(peer, e))?;
        let chain = self.processor.chain();
        let mut common = None;
        for id in milestones {
            if let Some(block) = chain.block(id)? {
                common = Some(block);
                break;
            }
        }
        let Some(mut common) = common else {
            self.blacklist(peer, "no common milestone block");
            return Err(Self::protocol(peer, PeerError::Protocol("no common milestone".into())));
        };
        loop {
            let ids = self.next_block_ids(peer, common.id(), MAX_NEXT_BLOCK_IDS).await?;
            let mut advanced = false;
            for id in &ids {
                match chain.block(*id)? {
                    Some(block) => {
                        common = block;
                        advanced = true;
                    }
                    None => return Ok(common),
                }
            }
            if !advanced || ids.len() < MAX_NEXT_BLOCK_IDS {
                return Ok(common);
            }
        }
    }

    async fn download_from(&self, peer: &Arc<dyn Peer>) -> Result<(usize, bool), SyncError> {
        let common = self.common_block(peer).await?;
        let head_height = self.processor.chain().height();
        if head_height.saturating_sub(common.height) > self.processor.max_rollback() {
            debug!(peer = %peer.address(), common = common.height, "fork point too deep");
            return Ok((0, false));
        }
        let ids = self.next_block_ids(peer, common.id(), MAX_NEXT_BLOCK_IDS).await?;
        if ids.is_empty() {
            return Ok((0, false));
        }

        let mut segments = Vec::new();
        let mut after = common.id();
        for chunk in ids.chunks(self.settings.segment_size) {
            segments.push(Segment {
                after,
                ids: chunk.to_vec(),
            });
            after = chunk[chunk.len() - 1];
        }
        let fetched = join_all(segments.iter().map(|s| self.fetch_segment(peer.clone(), s))).await;

        let mut providers: HashMap<u64, Arc<dyn Peer>> = HashMap::new();
        let mut blocks = Vec::new();
        for segment in fetched {
            let Some(segment) = segment else {
                break;
            };
            for b in &segment.blocks {
                providers.insert(b.id(), segment.provider.clone());
            }
            blocks.extend(segment.blocks);
        }
        self.check_running()?;
        if blocks.is_empty() {
            return Ok((0, false));
        }

        let count = blocks.len();
        let processor = self.processor.clone();
        let common_height = common.height;
        let outcome = tokio::task::spawn_blocking(move || processor.process_fork(common_height, blocks))
            .await
            .map_err(|e| SyncError::Task(e.to_string()))??;

        if let Some(rejected) = &outcome.rejected {
            match providers.get(&rejected.id) {
                Some(provider) if rejected.error.is_content_error() => {
                    self.blacklist(provider, &rejected.error.to_string());
                }
                _ => debug!(block_id = rejected.id, error = %rejected.error, "downloaded block not applied"),
            }
        }
        if !outcome.switched {
            return Ok((0, false));
        }
        let applied = self.processor.chain().height().saturating_sub(common_height) as usize;
        debug!(offered = count, applied, "fork segment applied");
        Ok((applied, true))
    }

    /// Fetch one segment, reassigning it to another peer after each failure.
    async fn fetch_segment(&self, first: Arc<dyn Peer>, segment: &Segment) -> Option<Fetched> {
        let mut tried: Vec<String> = Vec::new();
        let mut peer = first;
        for attempt in 0..self.settings.max_segment_retries {
            if self.check_running().is_err() {
                return None;
            }
            if attempt > 0 {
                peer = match self.choose_peer(&tried) {
                    Ok(p) => p,
                    Err(_) => return None,
                };
            }
            tried.push(peer.address().to_string());
            let request = PeerRequest::GetNextBlocks {
                block_id: segment.after,
                limit: segment.ids.len(),
            };
            let blocks = match self.ask(&peer, request).await.and_then(|r| {
                r.into_blocks().map_err(|e| Self::protocol(&peer, e))
            }) {
                Ok(blocks) => blocks,
                Err(e) => {
                    debug!(error = %e, after = segment.after, "segment fetch failed");
                    continue;
                }
            };
            let ids: Vec<u64> = blocks.iter().map(Block::id).collect();
            if ids != segment.ids {
                debug!(peer = %peer.address(), after = segment.after, "segment does not match listed ids");
                continue;
            }
            return Some(Fetched { provider: peer, blocks });
        }
        warn!(after = segment.after, "segment abandoned");
        None
    }

    async fn pull_transactions(&self, peer: &Arc<dyn Peer>) -> Result<usize, SyncError> {
        let txs: Vec<Transaction> = self
            .ask(peer, PeerRequest::GetTransactions)
            .await?
            .into_transactions()
            .map_err(|e| Self::protocol(peer, e))?;
        if txs.is_empty() {
            return Ok(0);
        }
        let processor = self.processor.clone();
        let added = tokio::task::spawn_blocking(move || {
            txs.into_iter()
                .filter(|tx| !processor.pool().contains(tx.id()))
                .filter(|tx| match processor.add_transaction(tx.clone()) {
                    Ok(_) => true,
                    Err(e) => {
                        debug!(tx = tx.id(), error = %e, "peer transaction not admitted");
                        false
                    }
                })
                .count()
        })
        .await
        .map_err(|e| SyncError::Task(e.to_string()))?;
        Ok(added)
    }
}
