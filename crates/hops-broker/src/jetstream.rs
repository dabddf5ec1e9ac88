//! The broker contract
//!
//! One stream per account holding every subject of that account, at most one
//! message per subject. Readers either walk the stream in order through an
//! [`OrderedConsumer`] or pull work from a durable [`Consumer`] that expects
//! each delivery to be acknowledged.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hops_core::{CoreResult, Msg};
use std::sync::Arc;
use std::time::Duration;

use crate::error::BrokerResult;

/// Acknowledgement of a stored publish
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PubAck {
    pub stream_seq: u64,
}

/// A message as stored in the stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMsg {
    pub subject: String,
    pub data: Vec<u8>,
    pub stream_seq: u64,
    pub published_at: DateTime<Utc>,
}

impl StoredMsg {
    /// Parse the subject, carrying over the stream sequence
    pub fn to_msg(&self) -> CoreResult<Msg> {
        Ok(Msg::parse(&self.subject)?.with_sequence(self.stream_seq, 0))
    }
}

/// Settings for a durable consumer
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub name: String,
    pub filter: String,
    /// Deliveries after which a message is given up on
    pub max_deliver: u32,
}

/// Settles one delivery
#[async_trait]
pub trait AckHandle: Send + Sync {
    async fn ack(&self) -> BrokerResult<()>;
    async fn nak_with_delay(&self, delay: Duration) -> BrokerResult<()>;
    /// Stop redelivering this message
    async fn term(&self) -> BrokerResult<()>;
}

/// A message handed out by a durable consumer
pub struct Delivery {
    pub msg: StoredMsg,
    pub consumer_seq: u64,
    pub num_delivered: u32,
    handle: Arc<dyn AckHandle>,
}

impl Delivery {
    pub fn new(msg: StoredMsg, consumer_seq: u64, num_delivered: u32, handle: Arc<dyn AckHandle>) -> Self {
        Self {
            msg,
            consumer_seq,
            num_delivered,
            handle,
        }
    }

    /// Parse the subject, carrying over stream and consumer sequences
    pub fn to_msg(&self) -> CoreResult<Msg> {
        Ok(Msg::parse(&self.msg.subject)?.with_sequence(self.msg.stream_seq, self.consumer_seq))
    }

    pub async fn ack(&self) -> BrokerResult<()> {
        self.handle.ack().await
    }

    pub async fn nak_with_delay(&self, delay: Duration) -> BrokerResult<()> {
        self.handle.nak_with_delay(delay).await
    }

    pub async fn term(&self) -> BrokerResult<()> {
        self.handle.term().await
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("subject", &self.msg.subject)
            .field("stream_seq", &self.msg.stream_seq)
            .field("consumer_seq", &self.consumer_seq)
            .field("num_delivered", &self.num_delivered)
            .finish()
    }
}

/// Reads every message matching a filter, oldest first
#[async_trait]
pub trait OrderedConsumer: Send {
    /// Wait for the next matching message
    async fn next(&mut self) -> BrokerResult<StoredMsg>;
}

/// Hands out messages that must be acknowledged
#[async_trait]
pub trait Consumer: Send + Sync {
    /// Wait for the next message to process
    async fn next(&self) -> BrokerResult<Delivery>;
}

/// A JetStream-compatible stream
#[async_trait]
pub trait JetStream: Send + Sync {
    /// Store a message; fails with `Duplicate` when the subject is taken
    async fn publish(&self, subject: &str, data: Vec<u8>) -> BrokerResult<PubAck>;

    /// Ordered reader over every message matching `filter`
    async fn ordered_consumer(&self, filter: &str) -> BrokerResult<Box<dyn OrderedConsumer>>;

    /// Durable consumer, created on first use
    async fn consumer(&self, config: ConsumerConfig) -> BrokerResult<Arc<dyn Consumer>>;

    /// Latest message stored under exactly `subject`
    async fn last_msg_for_subject(&self, subject: &str) -> BrokerResult<StoredMsg>;

    /// Messages matching `filter` published at or after `start`, oldest first
    async fn messages_since(&self, filter: &str, start: DateTime<Utc>) -> BrokerResult<Vec<StoredMsg>>;

    /// Remove every message matching `filter`, returning how many were removed
    async fn purge(&self, filter: &str) -> BrokerResult<u64>;

    fn is_connected(&self) -> bool;
}
