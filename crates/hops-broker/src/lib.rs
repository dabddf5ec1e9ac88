//! Message broker plumbing for hops
//!
//! Everything hops stores lives in one stream keyed by subject, with at most
//! one message per subject. A sequence is every message sharing a
//! `{account}.notify.{sequence_id}.` prefix; reading them back in order gives
//! the bundle a runner evaluates.
//!
//! # Architecture
//!
//! ```text
//!            publish (dedup by subject)
//! Client ──────────────────────────────► JetStream ◄── ordered reads (bundles)
//!   │                                        │
//!   │ consume_sequences                      │ durable consumer
//!   ▼                                        ▼
//! SequenceHandler ◄──── Delivery ──── ack / nak / term
//!
//! Client ──► ObjectStore (serialized automations)
//! ```
//!
//! # Key Types
//!
//! - [`Client`] - publishing, bundle reads, history and the consume loop
//! - [`JetStream`] - the stream contract; [`MemoryJetStream`] implements it in process
//! - [`ObjectStore`] - byte storage; [`MemoryObjectStore`] implements it in process
//! - [`SequenceHandler`] - receives a bundle per delivered message

mod client;
mod error;
mod jetstream;
mod memory;
mod object_store;
mod subject;

pub use client::{Client, SequenceHandler, EVENT_HISTORY_LIMIT, NAK_DELAY};
pub use error::{BrokerError, BrokerResult, SequenceError};
pub use jetstream::{
    AckHandle, Consumer, ConsumerConfig, Delivery, JetStream, OrderedConsumer, PubAck, StoredMsg,
};
pub use memory::{MemoryConsumer, MemoryJetStream};
pub use object_store::{MemoryObjectStore, ObjectStore};
pub use subject::subject_matches;
