//! Bounded per-plugin event history

use std::collections::VecDeque;

use super::LogEvent;

/// Default number of events kept per plugin
pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;

/// Ring buffer of log events with fixed event capacity.
///
/// Oldest events are evicted first; eviction is silent.
pub struct EventRing {
    buffer: VecDeque<LogEvent>,
    capacity: usize,
}

impl EventRing {
    /// Create buffer with specified capacity
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(capacity.min(DEFAULT_HISTORY_CAPACITY)),
            capacity,
        }
    }

    /// Append an event, dropping the oldest one if at capacity
    pub fn push(&mut self, event: LogEvent) {
        if self.capacity == 0 {
            return;
        }
        while self.buffer.len() >= self.capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(event);
    }

    /// All buffered events, oldest first
    pub fn snapshot(&self) -> Vec<LogEvent> {
        self.buffer.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventRing {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}
