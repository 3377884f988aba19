//! Bounded duplicate and self-echo suppression.
//!
//! The relay replies into the same chat it listens to, so every reply comes
//! back as an inbound event. Without suppression a reply that happens to
//! parse as a command would trigger another reply, forever.

use std::collections::{HashSet, VecDeque};

/// Default number of ids remembered per direction.
pub const DEFAULT_CAPACITY: usize = 1000;

/// Leading glyphs used only by the relay's own replies and status messages.
pub const REPLY_MARKERS: &[&str] = &[
    "🤖", "📊", "💬", "🛑", "✅", "▶️", "🧹", "📁", "📋", "❌", "🎤", "ℹ️", "🆔",
];

/// Insertion-ordered id set that evicts its oldest entry once full.
#[derive(Debug, Clone)]
pub struct BoundedIdSet {
    order: VecDeque<String>,
    index: HashSet<String>,
    capacity: usize,
}

impl BoundedIdSet {
    /// A capacity of zero is bumped to one so the set can hold at least the
    /// most recent id.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            order: VecDeque::with_capacity(capacity),
            index: HashSet::with_capacity(capacity),
            capacity,
        }
    }

    /// Insert an id. Re-inserting a known id does not refresh its position.
    pub fn insert(&mut self, id: &str) {
        if self.index.contains(id) {
            return;
        }
        while self.order.len() >= self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.index.remove(&evicted);
            }
        }
        self.order.push_back(id.to_string());
        self.index.insert(id.to_string());
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Remembers recently handled inbound ids and recently sent reply ids.
#[derive(Debug, Clone)]
pub struct DedupGuard {
    processed_inbound: BoundedIdSet,
    sent_outbound: BoundedIdSet,
}

impl Default for DedupGuard {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl DedupGuard {
    pub fn new(capacity: usize) -> Self {
        Self {
            processed_inbound: BoundedIdSet::new(capacity),
            sent_outbound: BoundedIdSet::new(capacity),
        }
    }

    pub fn record_inbound(&mut self, id: &str) {
        self.processed_inbound.insert(id);
    }

    pub fn is_inbound_processed(&self, id: &str) -> bool {
        self.processed_inbound.contains(id)
    }

    pub fn record_outbound(&mut self, id: &str) {
        self.sent_outbound.insert(id);
    }

    pub fn is_own_outbound(&self, id: &str) -> bool {
        self.sent_outbound.contains(id)
    }

    pub fn inbound_len(&self) -> usize {
        self.processed_inbound.len()
    }

    pub fn outbound_len(&self) -> usize {
        self.sent_outbound.len()
    }
}

/// True when the text starts with one of the relay's reply markers.
///
/// Covers the window where a reply arrives back before its id was recorded,
/// and platforms that rewrite ids on send.
pub fn looks_self_generated(text: &str) -> bool {
    let text = text.trim_start();
    REPLY_MARKERS.iter().any(|marker| text.starts_with(marker))
}
