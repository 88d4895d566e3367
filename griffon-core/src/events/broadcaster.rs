//! Per-plugin log fan-out
//!
//! Every plugin gets its own channel: a sequence counter, a bounded history
//! ring and a list of live subscribers. Each subscriber owns a bounded queue,
//! so a consumer that stops reading only loses its own events and never
//! holds up the plugin, the other subscribers or the history.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::task::{Context, Poll};

use chrono::Utc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_stream::Stream;
use tracing::{debug, warn};

use super::ring::{DEFAULT_HISTORY_CAPACITY, EventRing};
use super::{EventSeq, LogEvent, LogPayload};
use crate::config::DEFAULT_SUBSCRIBER_QUEUE;
use crate::plugins::PluginId;

/// Fans plugin output out to subscribers and keeps a bounded history
#[derive(Clone)]
pub struct LogBroadcaster {
    inner: Arc<Inner>,
}

struct Inner {
    history_capacity: usize,
    queue_len: usize,
    next_subscriber: AtomicU64,
    channels: Mutex<HashMap<PluginId, Arc<Mutex<Channel>>>>,
}

struct Channel {
    next_seq: EventSeq,
    ring: EventRing,
    subscribers: Vec<Subscriber>,
}

struct Subscriber {
    id: u64,
    tx: mpsc::Sender<LogEvent>,
    dropped: Arc<AtomicU64>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panicking publisher must not take logging down with it
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl Inner {
    fn channel(&self, plugin: PluginId) -> Arc<Mutex<Channel>> {
        lock(&self.channels)
            .entry(plugin)
            .or_insert_with(|| {
                Arc::new(Mutex::new(Channel {
                    next_seq: 1,
                    ring: EventRing::new(self.history_capacity),
                    subscribers: Vec::new(),
                }))
            })
            .clone()
    }

    fn existing(&self, plugin: PluginId) -> Option<Arc<Mutex<Channel>>> {
        lock(&self.channels).get(&plugin).cloned()
    }

    fn unsubscribe(&self, plugin: PluginId, id: u64) {
        if let Some(channel) = self.existing(plugin) {
            lock(&channel).subscribers.retain(|s| s.id != id);
        }
    }
}

impl LogBroadcaster {
    pub fn new(history_capacity: usize, queue_len: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                history_capacity,
                // A zero-length mpsc channel is not allowed
                queue_len: queue_len.max(1),
                next_subscriber: AtomicU64::new(1),
                channels: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Record an event and hand it to every live subscriber of `plugin`.
    ///
    /// Never blocks: a subscriber whose queue is full misses this event.
    pub fn publish(&self, plugin: PluginId, payload: LogPayload) -> LogEvent {
        let channel = self.inner.channel(plugin);
        let mut channel = lock(&channel);

        let event = LogEvent {
            plugin,
            seq: channel.next_seq,
            timestamp: Utc::now(),
            payload,
        };
        channel.next_seq += 1;
        channel.ring.push(event.clone());

        channel.subscribers.retain(|sub| match sub.tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                if sub.dropped.fetch_add(1, Ordering::Relaxed) == 0 {
                    warn!(plugin = %plugin, subscriber = sub.id, "Subscriber is lagging, dropping events");
                }
                true
            }
            Err(TrySendError::Closed(_)) => {
                debug!(plugin = %plugin, subscriber = sub.id, "Subscriber gone");
                false
            }
        });

        event
    }

    /// Receive every event `plugin` publishes from now on
    pub fn subscribe(&self, plugin: PluginId) -> LogSubscription {
        let (tx, rx) = mpsc::channel(self.inner.queue_len);
        let id = self.inner.next_subscriber.fetch_add(1, Ordering::Relaxed);
        let dropped = Arc::new(AtomicU64::new(0));

        let channel = self.inner.channel(plugin);
        lock(&channel).subscribers.push(Subscriber {
            id,
            tx,
            dropped: dropped.clone(),
        });
        debug!(plugin = %plugin, subscriber = id, "Subscribed to plugin log");

        LogSubscription {
            plugin,
            id,
            rx,
            dropped,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Buffered events for `plugin`, oldest first
    pub fn history(&self, plugin: PluginId) -> Vec<LogEvent> {
        self.inner
            .existing(plugin)
            .map(|channel| lock(&channel).ring.snapshot())
            .unwrap_or_default()
    }

    /// Sequence number of the latest event published for `plugin` (0 if none)
    pub fn last_seq(&self, plugin: PluginId) -> EventSeq {
        self.inner
            .existing(plugin)
            .map(|channel| lock(&channel).next_seq - 1)
            .unwrap_or(0)
    }

    pub fn subscriber_count(&self, plugin: PluginId) -> usize {
        self.inner
            .existing(plugin)
            .map(|channel| lock(&channel).subscribers.len())
            .unwrap_or(0)
    }
}

impl Default for LogBroadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY, DEFAULT_SUBSCRIBER_QUEUE)
    }
}

/// Live view of one plugin's log.
///
/// Dropping the subscription unregisters it.
pub struct LogSubscription {
    plugin: PluginId,
    id: u64,
    rx: mpsc::Receiver<LogEvent>,
    dropped: Arc<AtomicU64>,
    inner: Weak<Inner>,
}

impl LogSubscription {
    pub fn plugin(&self) -> PluginId {
        self.plugin
    }

    /// Next event, or `None` once the broadcaster itself is gone
    pub async fn recv(&mut self) -> Option<LogEvent> {
        self.rx.recv().await
    }

    /// Next event if one is already queued
    pub fn try_recv(&mut self) -> Option<LogEvent> {
        self.rx.try_recv().ok()
    }

    /// Events this subscriber missed because its queue was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Stream for LogSubscription {
    type Item = LogEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for LogSubscription {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.unsubscribe(self.plugin, self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_stream::StreamExt;

    fn line(n: usize) -> LogPayload {
        LogPayload::Stderr {
            line: format!("line {n}"),
        }
    }

    #[test]
    fn publish_assigns_increasing_seq_per_plugin() {
        let broadcaster = LogBroadcaster::default();
        let a = PluginId::new(1);
        let b = PluginId::new(2);

        assert_eq!(broadcaster.publish(a, line(0)).seq, 1);
        assert_eq!(broadcaster.publish(a, line(1)).seq, 2);
        assert_eq!(broadcaster.publish(b, line(0)).seq, 1);
        assert_eq!(broadcaster.last_seq(a), 2);
        assert_eq!(broadcaster.last_seq(PluginId::new(9)), 0);
    }

    #[tokio::test]
    async fn subscriber_receives_events_in_order() {
        let broadcaster = LogBroadcaster::default();
        let id = PluginId::new(1);
        let mut sub = broadcaster.subscribe(id);

        for n in 0..5 {
            broadcaster.publish(id, line(n));
        }

        for expected in 1..=5 {
            let event = sub.recv().await.unwrap();
            assert_eq!(event.seq, expected);
            assert_eq!(event.plugin, id);
        }
    }

    #[tokio::test]
    async fn subscriber_only_sees_its_plugin() {
        let broadcaster = LogBroadcaster::default();
        let mut sub = broadcaster.subscribe(PluginId::new(1));

        broadcaster.publish(PluginId::new(2), line(0));
        broadcaster.publish(PluginId::new(1), line(1));

        let event = sub.recv().await.unwrap();
        assert_eq!(event.plugin, PluginId::new(1));
        assert!(sub.try_recv().is_none());
    }

    #[test]
    fn late_subscriber_does_not_get_backlog() {
        let broadcaster = LogBroadcaster::default();
        let id = PluginId::new(1);
        broadcaster.publish(id, line(0));

        let mut sub = broadcaster.subscribe(id);
        assert!(sub.try_recv().is_none());

        broadcaster.publish(id, line(1));
        assert_eq!(sub.try_recv().map(|e| e.seq), Some(2));
    }

    #[test]
    fn history_is_bounded() {
        let broadcaster = LogBroadcaster::new(3, 16);
        let id = PluginId::new(1);
        for n in 0..10 {
            broadcaster.publish(id, line(n));
        }

        let seqs: Vec<_> = broadcaster.history(id).iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![8, 9, 10]);
    }

    #[test]
    fn history_of_unknown_plugin_is_empty() {
        let broadcaster = LogBroadcaster::default();
        assert!(broadcaster.history(PluginId::new(5)).is_empty());
    }

    #[test]
    fn slow_subscriber_drops_without_affecting_others() {
        let broadcaster = LogBroadcaster::new(100, 2);
        let id = PluginId::new(1);
        let mut slow = broadcaster.subscribe(id);
        let mut fast = broadcaster.subscribe(id);

        let mut fast_seen = Vec::new();
        for n in 0..6 {
            broadcaster.publish(id, line(n));
            while let Some(event) = fast.try_recv() {
                fast_seen.push(event.seq);
            }
        }

        assert_eq!(fast_seen, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(fast.dropped(), 0);

        // The slow one kept the first two and lost the rest
        assert_eq!(slow.try_recv().map(|e| e.seq), Some(1));
        assert_eq!(slow.try_recv().map(|e| e.seq), Some(2));
        assert!(slow.try_recv().is_none());
        assert_eq!(slow.dropped(), 4);

        // History is unaffected by either subscriber
        assert_eq!(broadcaster.history(id).len(), 6);
    }

    #[test]
    fn dropping_subscription_unregisters_it() {
        let broadcaster = LogBroadcaster::default();
        let id = PluginId::new(1);
        let first = broadcaster.subscribe(id);
        let _second = broadcaster.subscribe(id);
        assert_eq!(broadcaster.subscriber_count(id), 2);

        drop(first);
        assert_eq!(broadcaster.subscriber_count(id), 1);

        broadcaster.publish(id, line(0));
        assert_eq!(broadcaster.subscriber_count(id), 1);
    }

    #[tokio::test]
    async fn subscription_is_a_stream() {
        let broadcaster = LogBroadcaster::default();
        let id = PluginId::new(3);
        let sub = broadcaster.subscribe(id);

        broadcaster.publish(id, line(0));
        broadcaster.publish(id, line(1));

        let events: Vec<_> = sub.take(2).collect().await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].seq, 2);
    }

    #[tokio::test]
    async fn recv_ends_when_broadcaster_dropped() {
        let broadcaster = LogBroadcaster::default();
        let mut sub = broadcaster.subscribe(PluginId::new(1));
        drop(broadcaster);
        assert!(sub.recv().await.is_none());
    }
}
