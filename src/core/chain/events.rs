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

//! Chain events, published only after the store commit that caused them.

use tokio::sync::broadcast;

use super::block::BlockKind;

/// Something that happened to the chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChainEvent {
    /// A block became the head.
    BlockPushed {
        /// Height.
        height: u32,
        /// Id.
        id: u64,
        /// Kind.
        kind: BlockKind,
    },
    /// The head was detached.
    BlockPopped {
        /// Height it had.
        height: u32,
        /// Id.
        id: u64,
    },
    /// A peer block or fork was refused.
    BlockRejected {
        /// Id.
        id: u64,
        /// Reason.
        reason: String,
    },
    /// A fork with more cumulative difficulty replaced blocks above `common_height`.
    Reorganized {
        /// Height of the common ancestor.
        common_height: u32,
        /// New head height.
        new_height: u32,
    },
    /// Derived tables were trimmed below `floor`.
    Trimmed {
        /// New trim floor.
        floor: u32,
    },
    /// State was rebuilt from `from_height`.
    Rescanned {
        /// First replayed height.
        from_height: u32,
    },
}

/// Fan-out of [`ChainEvent`]s.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ChainEvent>,
}

impl EventBus {
    /// Bus keeping at most `capacity` undelivered events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// New subscriber; sees events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ChainEvent> {
        self.tx.subscribe()
    }

    /// Publish; dropped if nobody listens.
    pub fn publish(&self, event: ChainEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribers_receive_in_order() {
        let bus = EventBus::new(8);
        bus.publish(ChainEvent::Trimmed { floor: 1 });
        let mut rx = bus.subscribe();
        bus.publish(ChainEvent::Trimmed { floor: 2 });
        bus.publish(ChainEvent::Rescanned { from_height: 0 });
        assert_eq!(rx.try_recv().unwrap(), ChainEvent::Trimmed { floor: 2 });
        assert_eq!(rx.try_recv().unwrap(), ChainEvent::Rescanned { from_height: 0 });
        assert!(rx.try_recv().is_err());
    }
}
