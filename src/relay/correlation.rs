//! Correlation store. Which forwarded message came from whom.
//!
//! Keyed by the handle the platform assigned to the forward in the owner's
//! chat. Bounded: once `capacity` entries are held, the oldest insertion is
//! evicted.

use std::collections::{HashMap, VecDeque};

use tracing::debug;

use crate::relay::types::{MessageHandle, UserId};

/// Default number of retained correlations.
pub const DEFAULT_CORRELATION_CAPACITY: usize = 10_000;

/// Where a forwarded message originally came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Correlation {
    pub source_user: UserId,
    pub original: MessageHandle,
}

/// Insertion-ordered map with a hard size cap.
pub struct CorrelationStore {
    capacity: usize,
    entries: HashMap<MessageHandle, Correlation>,
    order: VecDeque<MessageHandle>,
}

impl Default for CorrelationStore {
    fn default() -> Self {
        Self::new(DEFAULT_CORRELATION_CAPACITY)
    }
}

impl CorrelationStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    /// Record a forward. Re-recording a handle replaces its entry.
    pub fn record(
        &mut self,
        outbound: MessageHandle,
        source_user: UserId,
        original: MessageHandle,
    ) {
        let entry = Correlation {
            source_user,
            original,
        };
        if self.entries.insert(outbound, entry).is_some() {
            self.order.retain(|h| *h != outbound);
        }
        self.order.push_back(outbound);

        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.entries.remove(&evicted);
                debug!(handle = %evicted, "Evicted oldest correlation");
            }
        }
    }

    pub fn resolve(&self, outbound: MessageHandle) -> Option<Correlation> {
        self.entries.get(&outbound).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
