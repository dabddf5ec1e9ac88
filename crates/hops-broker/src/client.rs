//! Sequence-aware client over a [`JetStream`] and an [`ObjectStore`]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hops_core::{
    notify_filter, subject, Channel, MessageBundle, Msg, ResultMsg, HOPS_MESSAGE_ID,
    SOURCE_EVENT_ID,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{debug, error, info, trace, warn};

use crate::error::{BrokerError, BrokerResult, SequenceError};
use crate::jetstream::{Consumer, Delivery, JetStream, StoredMsg};
use crate::object_store::ObjectStore;

/// Delay before a failed message is redelivered
pub const NAK_DELAY: Duration = Duration::from_secs(3);

/// Most events returned by [`Client::get_event_history`]
pub const EVENT_HISTORY_LIMIT: usize = 100;

const DEFAULT_BUNDLE_TIMEOUT: Duration = Duration::from_secs(5);

/// Receives the full history of a sequence each time it gains a message
#[async_trait]
pub trait SequenceHandler: Send + Sync {
    /// Returns whether anything was configured to handle the sequence
    async fn sequence_callback(
        &self,
        sequence_id: &str,
        bundle: MessageBundle,
    ) -> Result<bool, SequenceError>;
}

/// Publishes and reads hops messages for one account
#[derive(Clone)]
pub struct Client {
    jetstream: Arc<dyn JetStream>,
    objects: Arc<dyn ObjectStore>,
    account_id: String,
    bundle_timeout: Duration,
}

impl Client {
    pub fn new(
        jetstream: Arc<dyn JetStream>,
        objects: Arc<dyn ObjectStore>,
        account_id: impl Into<String>,
    ) -> Self {
        Self {
            jetstream,
            objects,
            account_id: account_id.into(),
            bundle_timeout: DEFAULT_BUNDLE_TIMEOUT,
        }
    }

    /// Deadline for reading back a sequence's history
    pub fn with_bundle_timeout(mut self, timeout: Duration) -> Self {
        self.bundle_timeout = timeout;
        self
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn jetstream(&self) -> &Arc<dyn JetStream> {
        &self.jetstream
    }

    /// Subject in this client's account
    pub fn subject(&self, channel: Channel, tokens: &[&str]) -> String {
        subject(&self.account_id, channel, tokens)
    }

    pub fn check_connection(&self) -> bool {
        self.jetstream.is_connected()
    }

    /// Publish `data`, returning whether it was stored
    ///
    /// A subject that already holds a message is not an error: the publish
    /// is skipped and `false` returned.
    pub async fn publish(&self, data: Vec<u8>, subject: &str) -> BrokerResult<bool> {
        match self.jetstream.publish(subject, data).await {
            Ok(_) => {
                debug!(subject, "Message sent");
                Ok(true)
            }
            Err(BrokerError::Duplicate { .. }) => {
                debug!(subject, "Skipping duplicate message");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Publish on a subject built from `channel` and `tokens`
    pub async fn publish_to(&self, data: Vec<u8>, channel: Channel, tokens: &[&str]) -> BrokerResult<bool> {
        self.publish(data, &self.subject(channel, tokens)).await
    }

    /// Publish a [`ResultMsg`] for work that started at `started_at`
    pub async fn publish_result(
        &self,
        started_at: DateTime<Utc>,
        result: Option<Value>,
        error: Option<String>,
        channel: Channel,
        tokens: &[&str],
    ) -> BrokerResult<bool> {
        let msg = ResultMsg::new(started_at, result, error);
        let data = serde_json::to_vec(&msg)?;
        self.publish_to(data, channel, tokens).await
    }

    /// Latest message stored under `subject`
    pub async fn get_msg(&self, subject: &str) -> BrokerResult<StoredMsg> {
        self.jetstream.last_msg_for_subject(subject).await
    }

    pub async fn get_sys_object(&self, key: &str) -> BrokerResult<Vec<u8>> {
        self.objects.get(key).await
    }

    pub async fn put_sys_object(&self, key: &str, data: Vec<u8>) -> BrokerResult<()> {
        self.objects.put(key, data).await
    }

    /// Every message of `incoming`'s sequence up to and including it
    ///
    /// Fails with `MissingOriginal` when the read passes `incoming` without
    /// seeing it and with `Timeout` when the history takes too long to read.
    pub async fn fetch_message_bundle(&self, incoming: &Msg) -> BrokerResult<MessageBundle> {
        let read = async {
            let mut reader = self
                .jetstream
                .ordered_consumer(&incoming.sequence_filter())
                .await?;
            let mut bundle = MessageBundle::new();

            loop {
                let stored = reader.next().await?;
                let msg = stored.to_msg()?;
                if msg.stream_seq > incoming.stream_seq {
                    return Err(BrokerError::MissingOriginal {
                        stream_seq: incoming.stream_seq,
                    });
                }

                bundle.insert(msg.message_id, stored.data);
                if msg.stream_seq == incoming.stream_seq {
                    return Ok(bundle);
                }
            }
        };

        tokio::time::timeout(self.bundle_timeout, read)
            .await
            .map_err(|_| BrokerError::Timeout(self.bundle_timeout))?
    }

    /// Remove every message of `msg`'s sequence
    pub async fn delete_msg_sequence(&self, msg: &Msg) -> BrokerResult<()> {
        let purged = self.jetstream.purge(&msg.sequence_filter()).await?;
        debug!(sequence_id = %msg.sequence_id, purged, "Deleted sequence");
        Ok(())
    }

    /// Events published since `start`, most recent first, at most 100
    ///
    /// With `source_only` only source events are returned.
    pub async fn get_event_history(
        &self,
        start: DateTime<Utc>,
        source_only: bool,
    ) -> BrokerResult<Vec<StoredMsg>> {
        let filter = if source_only {
            self.subject(Channel::Notify, &["*", SOURCE_EVENT_ID])
        } else {
            notify_filter(&self.account_id)
        };

        let mut events = self.jetstream.messages_since(&filter, start).await?;
        if events.len() > EVENT_HISTORY_LIMIT {
            events.drain(..events.len() - EVENT_HISTORY_LIMIT);
        }
        events.reverse();
        Ok(events)
    }

    /// Feed every delivery of `consumer` to `handler` until shutdown
    ///
    /// Deliveries are handled concurrently. On shutdown, in-flight handlers
    /// get `grace` to finish; unfinished messages are redelivered later.
    pub async fn consume_sequences(
        &self,
        consumer: Arc<dyn Consumer>,
        handler: Arc<dyn SequenceHandler>,
        mut shutdown: broadcast::Receiver<()>,
        grace: Duration,
    ) -> BrokerResult<()> {
        let mut tasks = JoinSet::new();
        info!(account_id = %self.account_id, "Consuming sequences");

        loop {
            tokio::select! {
                delivery = consumer.next() => match delivery {
                    Ok(delivery) => {
                        let client = self.clone();
                        let handler = handler.clone();
                        tasks.spawn(async move {
                            client.handle_delivery(delivery, handler.as_ref()).await;
                        });
                    }
                    Err(BrokerError::Closed) => {
                        warn!("Consumer closed");
                        break;
                    }
                    Err(e) => {
                        error!("Unable to receive message: {}", e);
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                },
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        error!("Message handler failed: {}", e);
                    }
                }
                _ = shutdown.recv() => {
                    info!("Received shutdown signal");
                    break;
                }
            }
        }

        let drain = async { while tasks.join_next().await.is_some() {} };
        if tokio::time::timeout(grace, drain).await.is_err() {
            warn!(
                in_flight = tasks.len(),
                "Shutdown grace period elapsed, abandoning in-flight messages"
            );
            tasks.abort_all();
        }
        Ok(())
    }

    /// Handle one delivery and settle it
    pub async fn handle_delivery(&self, delivery: Delivery, handler: &dyn SequenceHandler) {
        let msg = match delivery.to_msg() {
            Ok(msg) => msg,
            Err(e) => {
                error!(subject = %delivery.msg.subject, "Unable to parse message: {}", e);
                settle(delivery.term().await, &delivery);
                return;
            }
        };

        if msg.message_id == HOPS_MESSAGE_ID || msg.done {
            trace!(subject = %msg.subject, "Acknowledging bookkeeping message");
            settle(delivery.ack().await, &delivery);
            return;
        }

        let bundle = match self.fetch_message_bundle(&msg).await {
            Ok(bundle) => bundle,
            Err(e) => {
                error!(sequence_id = %msg.sequence_id, "Unable to fetch message bundle: {}", e);
                settle(delivery.nak_with_delay(NAK_DELAY).await, &delivery);
                return;
            }
        };
        let bundle_len = bundle.len();

        match handler.sequence_callback(&msg.sequence_id, bundle).await {
            Ok(false) if bundle_len <= 2 => {
                // Nothing handles this event: drop the source event and its hops pin
                if let Err(e) = self.delete_msg_sequence(&msg).await {
                    error!(sequence_id = %msg.sequence_id, "Unable to delete sequence: {}", e);
                }
                settle(delivery.ack().await, &delivery);
            }
            Ok(_) => settle(delivery.ack().await, &delivery),
            Err(SequenceError::Fatal(e)) => {
                error!(sequence_id = %msg.sequence_id, "Unable to process sequence: {}", e);
                settle(delivery.ack().await, &delivery);
            }
            Err(SequenceError::Retry(e)) => {
                error!(sequence_id = %msg.sequence_id, "Failed to process message: {}", e);
                settle(delivery.nak_with_delay(NAK_DELAY).await, &delivery);
            }
        }
    }
}

fn settle(result: BrokerResult<()>, delivery: &Delivery) {
    if let Err(e) = result {
        error!(subject = %delivery.msg.subject, "Unable to acknowledge message: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryJetStream;
    use crate::object_store::MemoryObjectStore;

    fn client() -> (Client, MemoryJetStream) {
        let js = MemoryJetStream::new();
        let client = Client::new(Arc::new(js.clone()), Arc::new(MemoryObjectStore::new()), "acct");
        (client, js)
    }

    async fn incoming(js: &MemoryJetStream, subject: &str) -> Msg {
        js.last_msg_for_subject(subject).await.unwrap().to_msg().unwrap()
    }

    #[tokio::test]
    async fn test_publish_reports_duplicates() {
        let (client, _) = client();
        assert!(client.publish_to(b"1".to_vec(), Channel::Notify, &["s", "event"]).await.unwrap());
        assert!(!client.publish_to(b"2".to_vec(), Channel::Notify, &["s", "event"]).await.unwrap());
    }

    #[tokio::test]
    async fn test_bundle_reads_up_to_incoming() {
        let (client, js) = client();
        client.publish(b"e".to_vec(), "acct.notify.s.event").await.unwrap();
        client.publish(b"x".to_vec(), "acct.notify.other.event").await.unwrap();
        client.publish(b"h".to_vec(), "acct.notify.s.hops").await.unwrap();
        client.publish(b"r".to_vec(), "acct.notify.s.later").await.unwrap();

        let msg = incoming(&js, "acct.notify.s.hops").await;
        let bundle = client.fetch_message_bundle(&msg).await.unwrap();
        assert_eq!(bundle.len(), 2);
        assert_eq!(bundle["event"], b"e");
        assert_eq!(bundle["hops"], b"h");
    }

    #[tokio::test]
    async fn test_bundle_missing_original() {
        let (client, js) = client();
        client.publish(b"e".to_vec(), "acct.notify.s.event").await.unwrap();
        client.publish(b"r".to_vec(), "acct.notify.s.result").await.unwrap();

        let mut msg = incoming(&js, "acct.notify.s.event").await;
        msg.stream_seq = 0;
        assert!(matches!(
            client.fetch_message_bundle(&msg).await,
            Err(BrokerError::MissingOriginal { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bundle_times_out() {
        let (client, js) = client();
        let client = client.with_bundle_timeout(Duration::from_millis(100));
        client.publish(b"e".to_vec(), "acct.notify.s.event").await.unwrap();

        let mut msg = incoming(&js, "acct.notify.s.event").await;
        msg.stream_seq = 5;
        assert!(matches!(
            client.fetch_message_bundle(&msg).await,
            Err(BrokerError::Timeout(_))
        ));
    }

    #[tokio::test]
    async fn test_publish_result() {
        let (client, js) = client();
        let started = Utc::now();
        client
            .publish_result(started, Some(Value::Bool(true)), None, Channel::Notify, &["s", "on", "done"])
            .await
            .unwrap();

        let stored = js.last_msg_for_subject("acct.notify.s.on.done").await.unwrap();
        let result: ResultMsg = serde_json::from_slice(&stored.data).unwrap();
        assert!(result.completed);
        assert!(!result.errored);
        assert_eq!(result.hops.started_at, started);
    }

    #[tokio::test]
    async fn test_event_history_most_recent_first() {
        let (client, js) = client();
        for i in 0..105 {
            let subject = format!("acct.notify.s{}.event", i);
            js.publish(&subject, vec![]).await.unwrap();
        }
        js.publish("acct.notify.s0.hops", vec![]).await.unwrap();

        let start = Utc::now() - chrono::Duration::hours(1);
        let events = client.get_event_history(start, true).await.unwrap();
        assert_eq!(events.len(), EVENT_HISTORY_LIMIT);
        assert_eq!(events[0].subject, "acct.notify.s104.event");
        assert_eq!(events[99].subject, "acct.notify.s5.event");

        let all = client.get_event_history(start, false).await.unwrap();
        assert_eq!(all[0].subject, "acct.notify.s0.hops");
    }
}
