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

//! Node configuration (TOML).

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use thiserror::Error;

use crate::core::params::MAX_ROLLBACK;
use crate::core::types::{FullId, PublicKey};

/// Config errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io")]
    Io,
    #[error("parse: {0}")]
    Parse(String),
    #[error("invalid: {0}")]
    Invalid(String),
}

/// Node configuration root.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Node settings.
    #[serde(default)]
    pub node: NodeSettings,
    /// Chain settings.
    #[serde(default)]
    pub chain: ChainConfig,
    /// Sync loop settings.
    #[serde(default)]
    pub sync: SyncConfig,
}

/// Node settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeSettings {
    /// Human-readable name.
    #[serde(default = "default_name")]
    pub name: String,
    /// Data directory (db).
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// Emit JSON log lines instead of compact text.
    #[serde(default)]
    pub log_json: bool,
    /// UNIX seconds at which chain epoch time is zero.
    #[serde(default)]
    pub epoch_beginning_secs: u64,
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            name: default_name(),
            data_dir: default_data_dir(),
            log_json: false,
            epoch_beginning_secs: 0,
        }
    }
}

fn default_name() -> String {
    "amunchain-hybrid".to_string()
}

fn default_data_dir() -> String {
    "./data".to_string()
}

/// One genesis allocation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenesisAllocation {
    /// Recipient public key (hex, 32 bytes).
    pub public_key_hex: String,
    /// Amount in NQT.
    pub amount: i64,
}

/// Chain settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Genesis block timestamp (epoch seconds).
    #[serde(default)]
    pub genesis_timestamp: u64,
    /// Genesis allocations.
    #[serde(default)]
    pub genesis: Vec<GenesisAllocation>,
    /// Public keys (hex) allowed to forge PoS blocks without an eligibility check.
    #[serde(default)]
    pub fake_forging_public_keys: Vec<String>,
    /// Pinned block ids (hex of the u64 id) keyed by decimal height.
    #[serde(default)]
    pub checkpoints: BTreeMap<String, String>,
    /// Deepest permitted rollback; versioned tables are trimmed below `height - max_rollback`.
    #[serde(default = "default_max_rollback")]
    pub max_rollback: u32,
    /// Trim derived tables every this many blocks (0 disables).
    #[serde(default = "default_trim_frequency")]
    pub trim_frequency: u32,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            genesis_timestamp: 0,
            genesis: Vec::new(),
            fake_forging_public_keys: Vec::new(),
            checkpoints: BTreeMap::new(),
            max_rollback: default_max_rollback(),
            trim_frequency: default_trim_frequency(),
        }
    }
}

fn default_max_rollback() -> u32 {
    MAX_ROLLBACK
}

fn default_trim_frequency() -> u32 {
    1000
}

impl ChainConfig {
    /// Decoded genesis allocations.
    pub fn genesis_allocations(&self) -> Result<Vec<(PublicKey, i64)>, ConfigError> {
        self.genesis
            .iter()
            .map(|g| {
                let pk = PublicKey::from_hex(&g.public_key_hex)
                    .map_err(|_| ConfigError::Invalid(format!("genesis key {}", g.public_key_hex)))?;
                if g.amount <= 0 {
                    return Err(ConfigError::Invalid("genesis amount must be positive".into()));
                }
                Ok((pk, g.amount))
            })
            .collect()
    }

    /// Account ids exempt from the PoS eligibility check.
    pub fn fake_forgers(&self) -> Result<BTreeSet<FullId>, ConfigError> {
        self.fake_forging_public_keys
            .iter()
            .map(|h| {
                PublicKey::from_hex(h)
                    .map(|pk| FullId::from_public_key(&pk))
                    .map_err(|_| ConfigError::Invalid(format!("fake forging key {h}")))
            })
            .collect()
    }

    /// Decoded checkpoints.
    pub fn checkpoint_ids(&self) -> Result<BTreeMap<u32, u64>, ConfigError> {
        self.checkpoints
            .iter()
            .map(|(h, id)| {
                let height = h
                    .parse::<u32>()
                    .map_err(|_| ConfigError::Invalid(format!("checkpoint height {h}")))?;
                u64::from_str_radix(id, 16)
                    .map(|v| (height, v))
                    .map_err(|_| ConfigError::Invalid(format!("checkpoint {h}")))
            })
            .collect()
    }
}

/// Sync loop settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Run the download loop.
    #[serde(default)]
    pub enabled: bool,
    /// Per-request timeout.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Blocks per downloaded segment.
    #[serde(default = "default_segment_size")]
    pub segment_size: usize,
    /// Attempts per segment before the download is abandoned.
    #[serde(default = "default_segment_retries")]
    pub max_segment_retries: u32,
    /// Pause between sync rounds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Peers slower than this are deprioritized.
    #[serde(default = "default_slow_peer_latency_ms")]
    pub slow_peer_latency_ms: u64,
    /// Trimmer period.
    #[serde(default = "default_trim_interval_ms")]
    pub trim_interval_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            request_timeout_ms: default_request_timeout_ms(),
            segment_size: default_segment_size(),
            max_segment_retries: default_segment_retries(),
            poll_interval_ms: default_poll_interval_ms(),
            slow_peer_latency_ms: default_slow_peer_latency_ms(),
            trim_interval_ms: default_trim_interval_ms(),
        }
    }
}

fn default_request_timeout_ms() -> u64 {
    10_000
}
fn default_segment_size() -> usize {
    36
}
fn default_segment_retries() -> u32 {
    3
}
fn default_poll_interval_ms() -> u64 {
    2_000
}
fn default_slow_peer_latency_ms() -> u64 {
    5_000
}
fn default_trim_interval_ms() -> u64 {
    60_000
}

/// Parse a config from TOML text.
pub fn parse_config(text: &str) -> Result<NodeConfig, ConfigError> {
    let cfg: NodeConfig = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
    cfg.chain.genesis_allocations()?;
    cfg.chain.fake_forgers()?;
    cfg.chain.checkpoint_ids()?;
    if cfg.sync.segment_size == 0 {
        return Err(ConfigError::Invalid("sync.segment_size must be > 0".into()));
    }
    Ok(cfg)
}

/// Load a config file.
pub fn load_config(path: &Path) -> Result<NodeConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|_| ConfigError::Io)?;
    parse_config(&text)
}
