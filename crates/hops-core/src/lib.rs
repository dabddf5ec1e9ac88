//! Core wire types for hops
//!
//! This crate provides the fundamental types shared by every hops crate:
//! subjects and parsed messages, the source event envelope, result messages
//! published by workers, and the slug rules used to derive message ids.
//!
//! # Subject layout
//!
//! ```text
//! {account}.notify.{sequence_id}.{message_id}[.done]
//! {account}.request.{sequence_id}.{call_slug}.{app}.{handler}
//! ```

mod error;
mod msg;
mod result;
mod slug;
mod source;

use std::collections::HashMap;

pub use error::{CoreError, CoreResult};
pub use msg::{notify_filter, notify_subject, request_subject, subject, Channel, Msg};
pub use result::{HopsResultMeta, ResultMsg};
pub use slug::{sanitise_token, slugify, slugify_parts};
pub use source::{create_source_event, event_name, EventName, SourceMeta};

/// Message id carrying the original source event of a sequence
pub const SOURCE_EVENT_ID: &str = "event";

/// Message id carrying the pinned automations hash of a sequence
pub const HOPS_MESSAGE_ID: &str = "hops";

/// Trailing subject token marking a pipeline as done
pub const DONE_MESSAGE_ID: &str = "done";

/// Key of the metadata object inside source events
pub const HOPS_META_KEY: &str = "hops";

/// Source name used for events created by hops itself (schedules, tasks)
pub const HOPS_SOURCE: &str = "hiphops";

/// Message ids that user defined blocks may never resolve to
pub const RESERVED_MESSAGE_IDS: [&str; 3] = [SOURCE_EVENT_ID, HOPS_MESSAGE_ID, DONE_MESSAGE_ID];

/// Raw payloads of one sequence keyed by message id
pub type MessageBundle = HashMap<String, Vec<u8>>;

/// Check whether a message id is reserved for hops' own use
pub fn is_reserved_message_id(id: &str) -> bool {
    RESERVED_MESSAGE_IDS.contains(&id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_message_ids() {
        assert!(is_reserved_message_id("event"));
        assert!(is_reserved_message_id("hops"));
        assert!(is_reserved_message_id("done"));
        assert!(!is_reserved_message_id("change-app_handler"));
    }
}
