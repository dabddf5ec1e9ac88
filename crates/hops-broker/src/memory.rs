//! In-process JetStream
//!
//! A single-node stand-in for a networked broker: one stream with at most one
//! message per subject, ordered readers, and durable consumers with
//! ack/nak/term and redelivery.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tracing::{debug, trace, warn};

use crate::error::{BrokerError, BrokerResult};
use crate::jetstream::{
    AckHandle, Consumer, ConsumerConfig, Delivery, JetStream, OrderedConsumer, PubAck, StoredMsg,
};
use crate::subject::subject_matches;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Default)]
struct Stream {
    messages: BTreeMap<u64, StoredMsg>,
    by_subject: HashMap<String, u64>,
    last_seq: u64,
}

impl Stream {
    fn next_matching(&self, filter: &str, after: u64) -> Option<&StoredMsg> {
        self.messages
            .range(after + 1..)
            .map(|(_, msg)| msg)
            .find(|msg| subject_matches(filter, &msg.subject))
    }
}

struct Shared {
    stream: Mutex<Stream>,
    /// Carries the latest stream sequence so readers can wait for appends
    appended: watch::Sender<u64>,
    connected: AtomicBool,
}

/// An in-memory stream for one account
#[derive(Clone)]
pub struct MemoryJetStream {
    shared: Arc<Shared>,
    consumers: Arc<DashMap<String, Arc<MemoryConsumer>>>,
}

impl MemoryJetStream {
    pub fn new() -> Self {
        let (appended, _) = watch::channel(0);
        Self {
            shared: Arc::new(Shared {
                stream: Mutex::new(Stream::default()),
                appended,
                connected: AtomicBool::new(true),
            }),
            consumers: Arc::new(DashMap::new()),
        }
    }

    /// Mark the broker as reachable or not
    pub fn set_connected(&self, connected: bool) {
        self.shared.connected.store(connected, Ordering::SeqCst);
    }

    /// Number of stored messages
    pub fn len(&self) -> usize {
        lock(&self.shared.stream).messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every stored message matching `filter`, oldest first
    pub fn messages(&self, filter: &str) -> Vec<StoredMsg> {
        lock(&self.shared.stream)
            .messages
            .values()
            .filter(|msg| subject_matches(filter, &msg.subject))
            .cloned()
            .collect()
    }

    fn store(&self, subject: &str, data: Vec<u8>, published_at: DateTime<Utc>) -> BrokerResult<PubAck> {
        let stream_seq = {
            let mut stream = lock(&self.shared.stream);
            if stream.by_subject.contains_key(subject) {
                return Err(BrokerError::Duplicate {
                    subject: subject.to_string(),
                });
            }
            stream.last_seq += 1;
            let stream_seq = stream.last_seq;
            stream.by_subject.insert(subject.to_string(), stream_seq);
            stream.messages.insert(
                stream_seq,
                StoredMsg {
                    subject: subject.to_string(),
                    data,
                    stream_seq,
                    published_at,
                },
            );
            stream_seq
        };

        trace!(subject, stream_seq, "Stored message");
        self.shared.appended.send_replace(stream_seq);
        Ok(PubAck { stream_seq })
    }

    /// Store a message with an explicit publish time
    pub fn publish_at(&self, subject: &str, data: Vec<u8>, published_at: DateTime<Utc>) -> BrokerResult<PubAck> {
        self.store(subject, data, published_at)
    }
}

impl Default for MemoryJetStream {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JetStream for MemoryJetStream {
    async fn publish(&self, subject: &str, data: Vec<u8>) -> BrokerResult<PubAck> {
        if !self.is_connected() {
            return Err(BrokerError::Transient("not connected".to_string()));
        }
        self.store(subject, data, Utc::now())
    }

    async fn ordered_consumer(&self, filter: &str) -> BrokerResult<Box<dyn OrderedConsumer>> {
        Ok(Box::new(MemoryOrderedConsumer {
            shared: self.shared.clone(),
            filter: filter.to_string(),
            cursor: 0,
        }))
    }

    async fn consumer(&self, config: ConsumerConfig) -> BrokerResult<Arc<dyn Consumer>> {
        let consumer = self
            .consumers
            .entry(config.name.clone())
            .or_insert_with(|| {
                debug!(name = %config.name, filter = %config.filter, "Creating durable consumer");
                Arc::new(MemoryConsumer {
                    shared: self.shared.clone(),
                    state: Arc::new(ConsumerState {
                        config,
                        cursor: Mutex::new(Cursor::default()),
                        redelivered: Notify::new(),
                    }),
                })
            })
            .clone();
        Ok(consumer)
    }

    async fn last_msg_for_subject(&self, subject: &str) -> BrokerResult<StoredMsg> {
        let stream = lock(&self.shared.stream);
        stream
            .by_subject
            .get(subject)
            .and_then(|seq| stream.messages.get(seq))
            .cloned()
            .ok_or_else(|| BrokerError::NotFound {
                key: subject.to_string(),
            })
    }

    async fn messages_since(&self, filter: &str, start: DateTime<Utc>) -> BrokerResult<Vec<StoredMsg>> {
        if !self.is_connected() {
            return Err(BrokerError::Transient("not connected".to_string()));
        }
        Ok(lock(&self.shared.stream)
            .messages
            .values()
            .filter(|msg| msg.published_at >= start && subject_matches(filter, &msg.subject))
            .cloned()
            .collect())
    }

    async fn purge(&self, filter: &str) -> BrokerResult<u64> {
        let mut stream = lock(&self.shared.stream);
        let doomed: Vec<u64> = stream
            .messages
            .values()
            .filter(|msg| subject_matches(filter, &msg.subject))
            .map(|msg| msg.stream_seq)
            .collect();

        for seq in &doomed {
            if let Some(msg) = stream.messages.remove(seq) {
                stream.by_subject.remove(&msg.subject);
            }
        }
        debug!(filter, purged = doomed.len(), "Purged messages");
        Ok(doomed.len() as u64)
    }

    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }
}

struct MemoryOrderedConsumer {
    shared: Arc<Shared>,
    filter: String,
    cursor: u64,
}

#[async_trait]
impl OrderedConsumer for MemoryOrderedConsumer {
    async fn next(&mut self) -> BrokerResult<StoredMsg> {
        let mut appended = self.shared.appended.subscribe();
        loop {
            appended.borrow_and_update();
            let found = lock(&self.shared.stream)
                .next_matching(&self.filter, self.cursor)
                .cloned();
            if let Some(msg) = found {
                self.cursor = msg.stream_seq;
                return Ok(msg);
            }
            appended.changed().await.map_err(|_| BrokerError::Closed)?;
        }
    }
}

#[derive(Default)]
struct Cursor {
    /// Last stream sequence handed out for the first time
    stream_seq: u64,
    consumer_seq: u64,
    /// Naked messages whose delay has passed: (stream_seq, times delivered)
    ready: VecDeque<(u64, u32)>,
    in_flight: HashMap<u64, (u64, u32)>,
}

struct ConsumerState {
    config: ConsumerConfig,
    cursor: Mutex<Cursor>,
    redelivered: Notify,
}

/// A durable consumer of a [`MemoryJetStream`]
pub struct MemoryConsumer {
    shared: Arc<Shared>,
    state: Arc<ConsumerState>,
}

impl MemoryConsumer {
    /// Next message to hand out, if any is ready
    fn take(&self) -> Option<Delivery> {
        let stream = lock(&self.shared.stream);
        let mut cursor = lock(&self.state.cursor);

        while let Some((seq, delivered)) = cursor.ready.pop_front() {
            let Some(msg) = stream.messages.get(&seq) else {
                continue;
            };
            if delivered >= self.state.config.max_deliver {
                warn!(subject = %msg.subject, delivered, "Giving up on message");
                continue;
            }
            return Some(self.deliver(&mut cursor, msg.clone(), delivered + 1));
        }

        let msg = stream
            .next_matching(&self.state.config.filter, cursor.stream_seq)?
            .clone();
        cursor.stream_seq = msg.stream_seq;
        Some(self.deliver(&mut cursor, msg, 1))
    }

    fn deliver(&self, cursor: &mut Cursor, msg: StoredMsg, delivered: u32) -> Delivery {
        cursor.consumer_seq += 1;
        let consumer_seq = cursor.consumer_seq;
        cursor.in_flight.insert(consumer_seq, (msg.stream_seq, delivered));

        let handle = Arc::new(MemoryAck {
            state: self.state.clone(),
            consumer_seq,
        });
        Delivery::new(msg, consumer_seq, delivered, handle)
    }

    /// Deliveries handed out but not yet settled
    pub fn num_ack_pending(&self) -> usize {
        lock(&self.state.cursor).in_flight.len()
    }
}

#[async_trait]
impl Consumer for MemoryConsumer {
    async fn next(&self) -> BrokerResult<Delivery> {
        let mut appended = self.shared.appended.subscribe();
        loop {
            appended.borrow_and_update();
            let redelivered = self.state.redelivered.notified();
            if let Some(delivery) = self.take() {
                return Ok(delivery);
            }
            tokio::select! {
                changed = appended.changed() => changed.map_err(|_| BrokerError::Closed)?,
                _ = redelivered => {}
            }
        }
    }
}

struct MemoryAck {
    state: Arc<ConsumerState>,
    consumer_seq: u64,
}

impl MemoryAck {
    fn settle(&self) -> Option<(u64, u32)> {
        lock(&self.state.cursor).in_flight.remove(&self.consumer_seq)
    }
}

#[async_trait]
impl AckHandle for MemoryAck {
    async fn ack(&self) -> BrokerResult<()> {
        self.settle();
        Ok(())
    }

    async fn nak_with_delay(&self, delay: Duration) -> BrokerResult<()> {
        let Some(pending) = self.settle() else {
            return Ok(());
        };
        let state = self.state.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            lock(&state.cursor).ready.push_back(pending);
            state.redelivered.notify_one();
        });
        Ok(())
    }

    async fn term(&self) -> BrokerResult<()> {
        self.settle();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(name: &str) -> ConsumerConfig {
        ConsumerConfig {
            name: name.to_string(),
            filter: "acct.notify.>".to_string(),
            max_deliver: 3,
        }
    }

    #[tokio::test]
    async fn test_one_message_per_subject() {
        let js = MemoryJetStream::new();
        let ack = js.publish("acct.notify.s.event", b"1".to_vec()).await.unwrap();
        assert_eq!(ack.stream_seq, 1);

        let err = js.publish("acct.notify.s.event", b"2".to_vec()).await.unwrap_err();
        assert!(err.is_duplicate());

        let stored = js.last_msg_for_subject("acct.notify.s.event").await.unwrap();
        assert_eq!(stored.data, b"1");
        assert!(matches!(
            js.last_msg_for_subject("acct.notify.s.hops").await,
            Err(BrokerError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_ordered_consumer_filters_and_waits() {
        let js = MemoryJetStream::new();
        js.publish("acct.notify.a.event", b"a".to_vec()).await.unwrap();
        js.publish("acct.notify.b.event", b"b".to_vec()).await.unwrap();

        let mut reader = js.ordered_consumer("acct.notify.a.>").await.unwrap();
        assert_eq!(reader.next().await.unwrap().data, b"a");

        let writer = js.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            writer.publish("acct.notify.a.hops", b"h".to_vec()).await.unwrap();
        });
        let next = tokio::time::timeout(Duration::from_secs(1), reader.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(next.subject, "acct.notify.a.hops");
        assert_eq!(next.stream_seq, 3);
    }

    #[tokio::test]
    async fn test_purge_frees_subjects() {
        let js = MemoryJetStream::new();
        js.publish("acct.notify.a.event", vec![]).await.unwrap();
        js.publish("acct.notify.a.hops", vec![]).await.unwrap();
        js.publish("acct.notify.b.event", vec![]).await.unwrap();

        assert_eq!(js.purge("acct.notify.a.>").await.unwrap(), 2);
        assert_eq!(js.len(), 1);
        js.publish("acct.notify.a.event", vec![]).await.unwrap();
    }

    #[tokio::test]
    async fn test_durable_consumer_ack() {
        let js = MemoryJetStream::new();
        js.publish("acct.notify.a.event", b"a".to_vec()).await.unwrap();
        js.publish("acct.request.a.x.app.handler", b"r".to_vec()).await.unwrap();

        let consumer = js.consumer(config("runner")).await.unwrap();
        let delivery = consumer.next().await.unwrap();
        assert_eq!(delivery.msg.subject, "acct.notify.a.event");
        assert_eq!(delivery.num_delivered, 1);
        delivery.ack().await.unwrap();

        // Same name returns the same consumer and position
        let again = js.consumer(config("runner")).await.unwrap();
        js.publish("acct.notify.a.hops", b"h".to_vec()).await.unwrap();
        assert_eq!(again.next().await.unwrap().msg.subject, "acct.notify.a.hops");
    }

    #[tokio::test(start_paused = true)]
    async fn test_nak_redelivers_after_delay() {
        let js = MemoryJetStream::new();
        js.publish("acct.notify.a.event", b"a".to_vec()).await.unwrap();
        let consumer = js.consumer(config("runner")).await.unwrap();

        let first = consumer.next().await.unwrap();
        first.nak_with_delay(Duration::from_secs(3)).await.unwrap();

        let second = consumer.next().await.unwrap();
        assert_eq!(second.msg.stream_seq, first.msg.stream_seq);
        assert_eq!(second.num_delivered, 2);
        assert!(second.consumer_seq > first.consumer_seq);
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_deliver_and_term() {
        let js = MemoryJetStream::new();
        js.publish("acct.notify.a.event", b"a".to_vec()).await.unwrap();
        let consumer = js.consumer(config("runner")).await.unwrap();

        for attempt in 1..=3 {
            let d = consumer.next().await.unwrap();
            assert_eq!(d.msg.subject, "acct.notify.a.event");
            assert_eq!(d.num_delivered, attempt);
            d.nak_with_delay(Duration::from_millis(1)).await.unwrap();
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        js.publish("acct.notify.b.event", b"b".to_vec()).await.unwrap();
        let next = consumer.next().await.unwrap();
        assert_eq!(next.msg.subject, "acct.notify.b.event");
        next.term().await.unwrap();

        let pending = tokio::time::timeout(Duration::from_secs(10), consumer.next()).await;
        assert!(pending.is_err());
    }

    #[tokio::test]
    async fn test_messages_since() {
        let js = MemoryJetStream::new();
        let hour_ago = Utc::now() - chrono::Duration::hours(2);
        js.publish_at("acct.notify.old.event", vec![], hour_ago).unwrap();
        js.publish("acct.notify.new.event", vec![]).await.unwrap();
        js.publish("acct.notify.new.hops", vec![]).await.unwrap();

        let since = Utc::now() - chrono::Duration::hours(1);
        let recent = js.messages_since("acct.notify.*.event", since).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].subject, "acct.notify.new.event");
    }

    #[tokio::test]
    async fn test_disconnected_publish_fails() {
        let js = MemoryJetStream::new();
        js.set_connected(false);
        assert!(!js.is_connected());
        assert!(matches!(
            js.publish("acct.notify.a.event", vec![]).await,
            Err(BrokerError::Transient(_))
        ));
    }
}
