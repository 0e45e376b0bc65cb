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

//! Amunchain hybrid node entrypoint (systemd-friendly).
//! Opens the chain, then runs the trimmer, the optional forger and the optional sync loop
//! until Ctrl-C.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use amunchain_hybrid::core::chain::errors::BlockError;
use amunchain_hybrid::core::chain::processor::{BlockchainProcessor, GenesisSpec, ProcessorSettings};
use amunchain_hybrid::core::config::{load_config, NodeConfig};
use amunchain_hybrid::core::security::crypto::SecretPhrase;
use amunchain_hybrid::core::state::store::{SledStore, VersionedStore};
use amunchain_hybrid::core::types::{Clock, SystemClock};
use amunchain_hybrid::monitoring::metrics::Metrics;
use amunchain_hybrid::networking::peer::StaticPeers;
use amunchain_hybrid::networking::sync::{BlockDownloader, SyncSettings};

fn env(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn init_logging(json: bool) {
    if json {
        let _ = tracing_subscriber::fmt().json().with_target(false).try_init();
    } else {
        let _ = tracing_subscriber::fmt()
            .with_target(false)
            .with_level(true)
            .compact()
            .try_init();
    }
}

fn read_config(path: &Path) -> Result<NodeConfig> {
    if path.exists() {
        load_config(path).with_context(|| format!("config {}", path.display()))
    } else {
        Ok(NodeConfig::default())
    }
}

/// Forge whenever the configured account's hit time arrives.
async fn forge_loop(processor: Arc<BlockchainProcessor>, secret: SecretPhrase, running: Arc<AtomicBool>) {
    let public_key = match secret.public_key() {
        Ok(pk) => pk,
        Err(e) => {
            warn!(error = %e, "forging disabled: bad secret phrase");
            return;
        }
    };
    let mut tick = tokio::time::interval(Duration::from_secs(1));
    while running.load(Ordering::SeqCst) {
        tick.tick().await;
        let p = processor.clone();
        let s = secret.clone();
        let outcome = tokio::task::spawn_blocking(move || -> Result<Option<u32>, BlockError> {
            let Some(hit) = p.next_hit_time(&public_key)? else {
                return Ok(None);
            };
            let now = p.now();
            if now < hit {
                return Ok(None);
            }
            Ok(Some(p.generate_block(&s, now)?.height))
        })
        .await;
        match outcome {
            Ok(Ok(Some(height))) => info!(height, "forged block"),
            Ok(Ok(None)) => {}
            Ok(Err(e)) => debug!(error = %e, "forging attempt failed"),
            Err(e) => warn!(error = %e, "forging task failed"),
        }
    }
}

async fn trim_loop(processor: Arc<BlockchainProcessor>, period: Duration, running: Arc<AtomicBool>) {
    let mut tick = tokio::time::interval(period);
    while running.load(Ordering::SeqCst) {
        tick.tick().await;
        let p = processor.clone();
        match tokio::task::spawn_blocking(move || p.trim_derived_tables()).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!(error = %e, "trim failed"),
            Err(e) => warn!(error = %e, "trim task failed"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = PathBuf::from(env("AMUN_CONFIG", "./amunchain.toml"));
    let cfg = read_config(&config_path)?;
    init_logging(cfg.node.log_json);

    let data_dir = PathBuf::from(&cfg.node.data_dir);
    std::fs::create_dir_all(&data_dir).with_context(|| format!("data dir {}", data_dir.display()))?;
    let db_path = data_dir.join("chain");
    let store: Arc<dyn VersionedStore> = Arc::new(
        SledStore::open(&db_path.to_string_lossy()).with_context(|| format!("store {}", db_path.display()))?,
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new(cfg.node.epoch_beginning_secs));
    let metrics = Metrics::new().context("metrics")?;
    let processor = Arc::new(
        BlockchainProcessor::open(
            store,
            GenesisSpec::from_config(&cfg.chain).context("genesis")?,
            ProcessorSettings::from_config(&cfg.chain).context("chain settings")?,
            clock,
        )
        .context("open chain")?
        .with_metrics(metrics.clone()),
    );

    info!(
        node = %cfg.node.name,
        data_dir = %data_dir.display(),
        height = processor.chain().height(),
        git = option_env!("VERGEN_GIT_SHA").unwrap_or("unknown"),
        "amunchain hybrid node starting"
    );

    let running = Arc::new(AtomicBool::new(true));
    let mut tasks = Vec::new();
    tasks.push(tokio::spawn(trim_loop(
        processor.clone(),
        Duration::from_millis(cfg.sync.trim_interval_ms.max(1)),
        running.clone(),
    )));

    if let Ok(phrase) = std::env::var("AMUN_SECRET_PHRASE") {
        tasks.push(tokio::spawn(forge_loop(
            processor.clone(),
            SecretPhrase::new(phrase),
            running.clone(),
        )));
    }

    let downloader = if cfg.sync.enabled {
        let d = Arc::new(
            BlockDownloader::new(processor.clone(), Arc::new(StaticPeers::new()), SyncSettings::from(&cfg.sync))
                .with_metrics(metrics.clone()),
        );
        let runner = d.clone();
        tasks.push(tokio::spawn(async move { runner.run().await }));
        Some(d)
    } else {
        None
    };

    tokio::signal::ctrl_c().await.context("signal")?;
    info!("shutting down");
    running.store(false, Ordering::SeqCst);
    if let Some(d) = downloader {
        d.stop();
    }
    for task in tasks {
        task.abort();
    }
    if let Ok(text) = metrics.render() {
        debug!(metrics = %text, "final metrics");
    }
    Ok(())
}
