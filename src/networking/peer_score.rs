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

//! Download-side peer scoring: slow or failing peers drift negative and are throttled, then
//! dropped for an exponentially growing period.

use std::{
    collections::BTreeMap,
    time::{Duration, Instant},
};

/// Score parameters.
#[derive(Clone, Debug)]
pub struct ScoreParams {
    /// At or below this the peer is dropped.
    pub drop_threshold: i32,
    /// Max clamp.
    pub max_score: i32,
    /// Min clamp.
    pub min_score: i32,
    /// Decay per minute toward 0.
    pub decay_per_min: i32,
    /// First drop period.
    pub drop_base_secs: u64,
    /// Longest drop period.
    pub drop_max_secs: u64,
}

impl Default for ScoreParams {
    fn default() -> Self {
        Self {
            drop_threshold: -100,
            max_score: 200,
            min_score: -200,
            decay_per_min: 2,
            drop_base_secs: 30,
            drop_max_secs: 3600,
        }
    }
}

#[derive(Clone, Debug)]
struct PeerState {
    score: i32,
    last_decay: Instant,
    dropped_until: Option<Instant>,
    drop_level: u32,
}

/// What to do with a peer after an observation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    /// Keep using it.
    Allow,
    /// Prefer other peers.
    Throttle,
    /// Stop asking it for now.
    Drop,
}

/// Scores keyed by peer address.
pub struct PeerScore {
    params: ScoreParams,
    peers: BTreeMap<String, PeerState>,
}

impl PeerScore {
    /// Scorer with `params`.
    pub fn new(params: ScoreParams) -> Self {
        Self {
            params,
            peers: BTreeMap::new(),
        }
    }

    /// True while the peer's drop period lasts.
    pub fn is_dropped(&mut self, peer: &str, now: Instant) -> bool {
        self.decay(peer, now);
        match self.peers.get(peer).and_then(|s| s.dropped_until) {
            None => false,
            Some(t) => now < t,
        }
    }

    /// Record a useful answer.
    pub fn observe_good(&mut self, peer: &str, now: Instant, delta: i32) -> Decision {
        self.apply(peer, now, delta.max(0))
    }

    /// Record a failure or slow answer.
    pub fn observe_bad(&mut self, peer: &str, now: Instant, delta: i32) -> Decision {
        self.apply(peer, now, -delta.abs())
    }

    /// Current score after decay.
    pub fn score(&mut self, peer: &str, now: Instant) -> i32 {
        self.decay(peer, now);
        self.peers.get(peer).map(|s| s.score).unwrap_or(0)
    }

    fn apply(&mut self, peer: &str, now: Instant, delta: i32) -> Decision {
        let st = self.peers.entry(peer.to_string()).or_insert_with(|| PeerState {
            score: 0,
            last_decay: now,
            dropped_until: None,
            drop_level: 0,
        });

        decay_state(self.params.decay_per_min, st, now);

        if let Some(until) = st.dropped_until {
            if now < until {
                return Decision::Drop;
            }
            st.dropped_until = None;
        }

        st.score = st
            .score
            .saturating_add(delta)
            .clamp(self.params.min_score, self.params.max_score);

        if st.score <= self.params.drop_threshold {
            st.drop_level = st.drop_level.saturating_add(1);
            let secs = backoff_secs(self.params.drop_base_secs, self.params.drop_max_secs, st.drop_level);
            st.dropped_until = Some(now + Duration::from_secs(secs));
            return Decision::Drop;
        }

        if st.score < 0 {
            Decision::Throttle
        } else {
            Decision::Allow
        }
    }

    fn decay(&mut self, peer: &str, now: Instant) {
        let per_min = self.params.decay_per_min;
        if let Some(st) = self.peers.get_mut(peer) {
            decay_state(per_min, st, now);
        }
    }
}

fn decay_state(per_min: i32, st: &mut PeerState, now: Instant) {
    let mins = (now.duration_since(st.last_decay).as_secs() / 60) as i32;
    if mins <= 0 {
        return;
    }
    st.last_decay += Duration::from_secs((mins as u64) * 60);
    let d = per_min.saturating_mul(mins);
    if st.score > 0 {
        st.score = (st.score - d).max(0);
    } else if st.score < 0 {
        st.score = (st.score + d).min(0);
    }
}

fn backoff_secs(base: u64, cap: u64, level: u32) -> u64 {
    let pow = level.saturating_sub(1).min(16);
    base.saturating_mul(1u64 << pow).min(cap)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_failures_drop_with_growing_backoff() {
        let mut s = PeerScore::new(ScoreParams::default());
        let t0 = Instant::now();
        assert_eq!(s.observe_bad("a", t0, 50), Decision::Throttle);
        assert_eq!(s.observe_bad("a", t0, 50), Decision::Drop);
        assert!(s.is_dropped("a", t0 + Duration::from_secs(29)));
        assert!(!s.is_dropped("a", t0 + Duration::from_secs(31)));
        assert_eq!(backoff_secs(30, 3600, 2), 60);
        assert_eq!(backoff_secs(30, 3600, 30), 3600);
    }

    #[test]
    fn scores_decay_toward_zero() {
        let mut s = PeerScore::new(ScoreParams::default());
        let t0 = Instant::now();
        s.observe_good("b", t0, 10);
        assert_eq!(s.score("b", t0 + Duration::from_secs(180)), 4);
        assert_eq!(s.score("unknown", t0), 0);
    }
}
