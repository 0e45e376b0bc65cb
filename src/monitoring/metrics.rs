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

use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use thiserror::Error;

/// Metrics errors.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("prometheus")]
    Prom,
}

/// Metrics container.
#[derive(Clone)]
pub struct Metrics {
    /// Registry.
    pub registry: Registry,

    /// Head height gauge.
    pub block_height: IntGauge,
    /// Key-block (local) height gauge.
    pub key_block_height: IntGauge,
    /// Unconfirmed pool size.
    pub unconfirmed_transactions: IntGauge,
    /// Known sync peers.
    pub sync_peers: IntGauge,

    /// Blocks made head.
    pub blocks_pushed_total: IntCounter,
    /// Blocks detached.
    pub blocks_popped_total: IntCounter,
    /// Peer blocks and forks refused.
    pub blocks_rejected_total: IntCounter,
    /// Forks switched to.
    pub reorganizations_total: IntCounter,
    /// Transactions applied in pushed blocks.
    pub transactions_total: IntCounter,
    /// Peers blacklisted for sending bad blocks.
    pub peers_blacklisted_total: IntCounter,
}

fn gauge(registry: &Registry, name: &str, help: &str) -> Result<IntGauge, MetricsError> {
    let g = IntGauge::new(name, help).map_err(|_| MetricsError::Prom)?;
    registry
        .register(Box::new(g.clone()))
        .map_err(|_| MetricsError::Prom)?;
    Ok(g)
}

fn counter(registry: &Registry, name: &str, help: &str) -> Result<IntCounter, MetricsError> {
    let c = IntCounter::new(name, help).map_err(|_| MetricsError::Prom)?;
    registry
        .register(Box::new(c.clone()))
        .map_err(|_| MetricsError::Prom)?;
    Ok(c)
}

impl Metrics {
    /// Create and register metrics.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let block_height = gauge(&registry, "amunchain_block_height", "Current block height")?;
        let key_block_height = gauge(
            &registry,
            "amunchain_key_block_height",
            "Current key-block local height",
        )?;
        let unconfirmed_transactions = gauge(
            &registry,
            "amunchain_unconfirmed_transactions",
            "Transactions waiting in the unconfirmed pool",
        )?;
        let sync_peers = gauge(&registry, "amunchain_sync_peers", "Peers known to the sync loop")?;

        let blocks_pushed_total =
            counter(&registry, "amunchain_blocks_pushed_total", "Blocks made head")?;
        let blocks_popped_total =
            counter(&registry, "amunchain_blocks_popped_total", "Blocks detached from the head")?;
        let blocks_rejected_total = counter(
            &registry,
            "amunchain_blocks_rejected_total",
            "Peer blocks and forks refused",
        )?;
        let reorganizations_total = counter(
            &registry,
            "amunchain_reorganizations_total",
            "Forks with more cumulative difficulty switched to",
        )?;
        let transactions_total = counter(
            &registry,
            "amunchain_transactions_total",
            "Transactions applied in pushed blocks",
        )?;
        let peers_blacklisted_total = counter(
            &registry,
            "amunchain_peers_blacklisted_total",
            "Peers blacklisted for bad blocks",
        )?;

        Ok(Self {
            registry,
            block_height,
            key_block_height,
            unconfirmed_transactions,
            sync_peers,
            blocks_pushed_total,
            blocks_popped_total,
            blocks_rejected_total,
            reorganizations_total,
            transactions_total,
            peers_blacklisted_total,
        })
    }

    /// Text exposition of every registered metric.
    pub fn render(&self) -> Result<String, MetricsError> {
        let mut buf = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buf)
            .map_err(|_| MetricsError::Prom)?;
        String::from_utf8(buf).map_err(|_| MetricsError::Prom)
    }
}
