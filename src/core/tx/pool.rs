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

//! Unconfirmed transaction pool.
//!
//! Reservations of pooled transactions are kept in memory on top of the ledger's unconfirmed
//! balances, which only ever reflect the confirmed chain. A transaction is admitted only if
//! the ledger's unconfirmed balance minus what the pool already holds covers it.

use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::debug;

use crate::core::ledger::LedgerError;
use crate::core::tx::registry::{Reservation, TransactionRegistry, ValidationContext};
use crate::core::tx::transaction::Transaction;
use crate::core::tx::{Duplicates, ValidationError};
use crate::core::types::FullId;

/// Outcome of offering a transaction to the pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    /// Accepted.
    Added,
    /// Already pooled or confirmed.
    Known,
    /// Sender cannot cover it on top of what the pool holds.
    InsufficientFunds,
    /// Pool at capacity and the transaction pays no more than the cheapest entry.
    Full,
}

struct Entry {
    tx: Transaction,
    arrival: u64,
    reservations: Vec<Reservation>,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<u64, Entry>,
    next_arrival: u64,
    balances: HashMap<FullId, i64>,
    assets: HashMap<(FullId, u64), i64>,
}

impl Inner {
    fn hold(&mut self, sender: FullId, reservations: &[Reservation], sign: i64) {
        for r in reservations {
            match *r {
                Reservation::Balance(n) => {
                    let slot = self.balances.entry(sender).or_insert(0);
                    *slot = slot.saturating_add(sign * n);
                    if *slot == 0 {
                        self.balances.remove(&sender);
                    }
                }
                Reservation::Asset { asset_id, quantity } => {
                    let slot = self.assets.entry((sender, asset_id)).or_insert(0);
                    *slot = slot.saturating_add(sign * quantity);
                    if *slot == 0 {
                        self.assets.remove(&(sender, asset_id));
                    }
                }
            }
        }
    }

    fn remove(&mut self, id: u64) -> Option<Transaction> {
        let entry = self.entries.remove(&id)?;
        self.hold(entry.tx.sender_id(), &entry.reservations, -1);
        Some(entry.tx)
    }

    fn cheapest(&self) -> Option<(u64, i64)> {
        self.entries
            .values()
            .min_by_key(|e| (e.tx.fee(), std::cmp::Reverse(e.arrival)))
            .map(|e| (e.tx.id(), e.tx.fee()))
    }
}

/// Validated transactions waiting for a block.
pub struct UnconfirmedPool {
    inner: Mutex<Inner>,
    capacity: usize,
}

impl UnconfirmedPool {
    /// Pool holding at most `capacity` transactions.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            capacity,
        }
    }

    /// Number of pooled transactions.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// True if nothing is pooled.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True if `id` is pooled.
    pub fn contains(&self, id: u64) -> bool {
        self.inner.lock().entries.contains_key(&id)
    }

    /// Pooled transaction by id.
    pub fn get(&self, id: u64) -> Option<Transaction> {
        self.inner.lock().entries.get(&id).map(|e| e.tx.clone())
    }

    /// Every pooled transaction in arrival order.
    pub fn all(&self) -> Vec<Transaction> {
        let inner = self.inner.lock();
        let mut entries: Vec<&Entry> = inner.entries.values().collect();
        entries.sort_by_key(|e| e.arrival);
        entries.into_iter().map(|e| e.tx.clone()).collect()
    }

    /// Validate `tx` against the head and admit it if the sender can cover it.
    pub fn add(
        &self,
        tx: Transaction,
        registry: &TransactionRegistry,
        ctx: &ValidationContext<'_>,
    ) -> Result<Admission, ValidationError> {
        if tx.kind().is_coinbase() {
            return Err(ValidationError::not_valid("coinbase cannot be pooled"));
        }
        if self.contains(tx.id()) || ctx.chain.has_transaction(tx.id())? {
            return Ok(Admission::Known);
        }
        if !tx.verify_signature() {
            return Err(ValidationError::not_valid("bad signature"));
        }
        registry.validate(&tx, ctx)?;
        let reservations = registry.reservations(&tx, ctx.ledger)?;
        let sender = tx.sender_id();

        let mut inner = self.inner.lock();
        if inner.entries.contains_key(&tx.id()) {
            return Ok(Admission::Known);
        }
        if !covers(&inner, ctx, sender, &reservations)? {
            return Ok(Admission::InsufficientFunds);
        }
        if inner.entries.len() >= self.capacity {
            match inner.cheapest() {
                Some((victim, fee)) if fee < tx.fee() => {
                    inner.remove(victim);
                    debug!(evicted = victim, "pool full, dropped cheapest transaction");
                }
                _ => return Ok(Admission::Full),
            }
        }
        inner.hold(sender, &reservations, 1);
        let arrival = inner.next_arrival;
        inner.next_arrival += 1;
        inner.entries.insert(
            tx.id(),
            Entry {
                tx,
                arrival,
                reservations,
            },
        );
        Ok(Admission::Added)
    }

    /// Drop the transactions a new block confirmed.
    pub fn remove_confirmed<'a>(&self, txs: impl IntoIterator<Item = &'a Transaction>) {
        let mut inner = self.inner.lock();
        for tx in txs {
            inner.remove(tx.id());
        }
    }

    /// Drop one transaction, e.g. after it poisoned a generated block.
    pub fn evict(&self, id: u64) -> Option<Transaction> {
        self.inner.lock().remove(id)
    }

    /// Drop transactions expired at `now`.
    pub fn expire(&self, now: u64) -> usize {
        let mut inner = self.inner.lock();
        let expired: Vec<u64> = inner
            .entries
            .values()
            .filter(|e| e.tx.expiration() < now)
            .map(|e| e.tx.id())
            .collect();
        for id in &expired {
            inner.remove(*id);
        }
        expired.len()
    }

    /// Empty the pool, returning what it held in arrival order.
    pub fn drain(&self) -> Vec<Transaction> {
        let txs = self.all();
        *self.inner.lock() = Inner::default();
        txs
    }

    /// Re-offer transactions (from popped blocks, or after a reorganization); returns how many
    /// were admitted.
    pub fn requeue(
        &self,
        txs: impl IntoIterator<Item = Transaction>,
        registry: &TransactionRegistry,
        ctx: &ValidationContext<'_>,
    ) -> usize {
        let mut admitted = 0;
        for tx in txs {
            if tx.kind().is_coinbase() {
                continue;
            }
            let id = tx.id();
            match self.add(tx, registry, ctx) {
                Ok(Admission::Added) => admitted += 1,
                Ok(_) => {}
                Err(e) => debug!(tx = id, error = %e, "requeued transaction dropped"),
            }
        }
        admitted
    }

    /// Candidates for a block: highest fee first, then earliest arrival, skipping transactions
    /// that would duplicate an earlier pick, up to `max_count` and `max_payload` bytes.
    pub fn select(
        &self,
        registry: &TransactionRegistry,
        max_count: usize,
        max_payload: usize,
        block_timestamp: u64,
    ) -> Vec<Transaction> {
        let inner = self.inner.lock();
        let mut entries: Vec<&Entry> = inner.entries.values().collect();
        entries.sort_by(|a, b| b.tx.fee().cmp(&a.tx.fee()).then(a.arrival.cmp(&b.arrival)));

        let mut duplicates = Duplicates::new();
        let mut out = Vec::new();
        let mut payload = 0usize;
        for e in entries {
            if out.len() >= max_count {
                break;
            }
            let tx = &e.tx;
            if tx.expiration() < block_timestamp || payload + tx.size() > max_payload {
                continue;
            }
            if registry.is_duplicate(tx, &mut duplicates) || registry.is_block_duplicate(tx, &mut duplicates) {
                continue;
            }
            payload += tx.size();
            out.push(tx.clone());
        }
        out
    }
}

fn covers(
    inner: &Inner,
    ctx: &ValidationContext<'_>,
    sender: FullId,
    reservations: &[Reservation],
) -> Result<bool, LedgerError> {
    let mut balance_needed = 0i64;
    let mut assets_needed: HashMap<u64, i64> = HashMap::new();
    for r in reservations {
        match *r {
            Reservation::Balance(n) => balance_needed = balance_needed.saturating_add(n),
            Reservation::Asset { asset_id, quantity } => {
                let slot = assets_needed.entry(asset_id).or_insert(0);
                *slot = slot.saturating_add(quantity);
            }
        }
    }
    let held = inner.balances.get(&sender).copied().unwrap_or(0);
    if ctx.ledger.unconfirmed_balance(sender)?.saturating_sub(held) < balance_needed {
        return Ok(false);
    }
    for (asset_id, needed) in assets_needed {
        let held = inner.assets.get(&(sender, asset_id)).copied().unwrap_or(0);
        if ctx
            .ledger
            .unconfirmed_asset_balance(sender, asset_id)?
            .saturating_sub(held)
            < needed
        {
            return Ok(false);
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ledger::testutil::ledger;
    use crate::core::ledger::Ledger;
    use crate::core::params::ONE_COIN;
    use crate::core::security::crypto::SecretPhrase;
    use crate::core::tx::appendix::Attachment;
    use crate::core::tx::registry::testutil::MemChain;
    use crate::core::tx::transaction::TransactionBuilder;

    fn pay(secret: &SecretPhrase, amount: i64, fee: i64, ts: u64) -> Transaction {
        TransactionBuilder::new(secret.public_key().unwrap(), Attachment::OrdinaryPayment)
            .timestamp(ts)
            .recipient(FullId::new(9, 9))
            .amount(amount)
            .fee(fee)
            .ec_block(0, 1000)
            .sign(secret)
            .unwrap()
    }

    fn setup() -> (Ledger, MemChain, TransactionRegistry, SecretPhrase) {
        let l = ledger();
        let secret = SecretPhrase::new("pool sender");
        let id = FullId::from_public_key(&secret.public_key().unwrap());
        l.add_to_balance_and_unconfirmed(id, 10 * ONE_COIN, 0, false).unwrap();
        (l, MemChain::with_blocks(2), TransactionRegistry::standard(), secret)
    }

    #[test]
    fn pool_reservations_prevent_double_spend() {
        let (l, chain, reg, secret) = setup();
        let ctx = ValidationContext {
            ledger: &l,
            chain: &chain,
            height: 2,
            block_timestamp: 200,
        };
        let pool = UnconfirmedPool::new(100);
        let first = pay(&secret, 6 * ONE_COIN, ONE_COIN, 100);
        let second = pay(&secret, 6 * ONE_COIN, ONE_COIN, 101);
        assert_eq!(pool.add(first.clone(), &reg, &ctx).unwrap(), Admission::Added);
        assert_eq!(pool.add(first.clone(), &reg, &ctx).unwrap(), Admission::Known);
        assert_eq!(pool.add(second.clone(), &reg, &ctx).unwrap(), Admission::InsufficientFunds);

        pool.remove_confirmed([&first]);
        assert_eq!(pool.add(second, &reg, &ctx).unwrap(), Admission::Added);
        // the ledger itself was never touched
        let id = FullId::from_public_key(&secret.public_key().unwrap());
        assert_eq!(l.unconfirmed_balance(id).unwrap(), 10 * ONE_COIN);
    }

    #[test]
    fn selection_prefers_fee_then_arrival() {
        let (l, chain, reg, secret) = setup();
        let ctx = ValidationContext {
            ledger: &l,
            chain: &chain,
            height: 2,
            block_timestamp: 200,
        };
        let pool = UnconfirmedPool::new(100);
        let a = pay(&secret, ONE_COIN, ONE_COIN, 100);
        let b = pay(&secret, ONE_COIN, 2 * ONE_COIN, 101);
        let c = pay(&secret, ONE_COIN, ONE_COIN, 102);
        for tx in [&a, &b, &c] {
            assert_eq!(pool.add(tx.clone(), &reg, &ctx).unwrap(), Admission::Added);
        }
        let picked: Vec<u64> = pool
            .select(&reg, 10, usize::MAX, 200)
            .iter()
            .map(|t| t.id())
            .collect();
        assert_eq!(picked, vec![b.id(), a.id(), c.id()]);
        assert_eq!(pool.select(&reg, 1, usize::MAX, 200).len(), 1);
    }

    #[test]
    fn full_pool_keeps_better_paying_transactions() {
        let (l, chain, reg, secret) = setup();
        let ctx = ValidationContext {
            ledger: &l,
            chain: &chain,
            height: 2,
            block_timestamp: 200,
        };
        let pool = UnconfirmedPool::new(1);
        let cheap = pay(&secret, ONE_COIN, ONE_COIN, 100);
        let rich = pay(&secret, ONE_COIN, 2 * ONE_COIN, 101);
        pool.add(cheap.clone(), &reg, &ctx).unwrap();
        assert_eq!(pool.add(rich.clone(), &reg, &ctx).unwrap(), Admission::Added);
        assert!(!pool.contains(cheap.id()));
        assert_eq!(pool.add(cheap, &reg, &ctx).unwrap(), Admission::Full);
    }
}
