//! Subjects and parsed broker messages

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{CoreError, CoreResult};
use crate::DONE_MESSAGE_ID;

/// The two subject namespaces hops publishes on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Source events and results
    Notify,
    /// Call dispatches for worker apps
    Request,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Notify => "notify",
            Channel::Request => "request",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "notify" => Ok(Channel::Notify),
            "request" => Ok(Channel::Request),
            other => Err(other.to_string()),
        }
    }
}

/// Build a subject from an account, channel and trailing tokens
pub fn subject(account_id: &str, channel: Channel, tokens: &[&str]) -> String {
    let mut parts = Vec::with_capacity(tokens.len() + 2);
    parts.push(account_id);
    parts.push(channel.as_str());
    parts.extend_from_slice(tokens);
    parts.join(".")
}

/// `{account}.notify.{sequence_id}.{message_id}`
pub fn notify_subject(account_id: &str, sequence_id: &str, message_id: &str) -> String {
    subject(account_id, Channel::Notify, &[sequence_id, message_id])
}

/// `{account}.request.{sequence_id}.{call_slug}.{app}.{handler}`
pub fn request_subject(
    account_id: &str,
    sequence_id: &str,
    call_slug: &str,
    app: &str,
    handler: &str,
) -> String {
    subject(
        account_id,
        Channel::Request,
        &[sequence_id, call_slug, app, handler],
    )
}

/// Filter matching every notify message of an account
pub fn notify_filter(account_id: &str) -> String {
    subject(account_id, Channel::Notify, &[">"])
}

/// A message received from the broker, with its subject split into tokens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Msg {
    pub subject: String,
    pub account_id: String,
    pub channel: Channel,
    pub sequence_id: String,
    pub message_id: String,
    /// Set for request messages only
    pub app: Option<String>,
    /// Set for request messages only
    pub handler: Option<String>,
    /// Subject carries a trailing `done` token
    pub done: bool,
    pub stream_seq: u64,
    pub consumer_seq: u64,
}

impl Msg {
    /// Parse a subject into its tokens
    ///
    /// Subjects need at least four tokens; request subjects need six.
    pub fn parse(subject: &str) -> CoreResult<Self> {
        let tokens: Vec<&str> = subject.split('.').collect();
        if tokens.len() < 4 || tokens.iter().any(|t| t.is_empty()) {
            return Err(CoreError::InvalidSubject {
                subject: subject.to_string(),
                reason: "too few tokens".to_string(),
            });
        }

        let channel = Channel::from_str(tokens[1]).map_err(|channel| CoreError::UnknownChannel {
            channel,
            subject: subject.to_string(),
        })?;

        let mut msg = Msg {
            subject: subject.to_string(),
            account_id: tokens[0].to_string(),
            channel,
            sequence_id: tokens[2].to_string(),
            message_id: tokens[3].to_string(),
            app: None,
            handler: None,
            done: false,
            stream_seq: 0,
            consumer_seq: 0,
        };

        match channel {
            Channel::Notify => {
                msg.done = tokens.len() == 5 && tokens[4] == DONE_MESSAGE_ID;
            }
            Channel::Request => {
                if tokens.len() < 6 {
                    return Err(CoreError::InvalidSubject {
                        subject: subject.to_string(),
                        reason: "request subject has too few tokens".to_string(),
                    });
                }
                msg.app = Some(tokens[4].to_string());
                msg.handler = Some(tokens[5].to_string());
            }
        }

        Ok(msg)
    }

    /// Attach broker sequence metadata
    pub fn with_sequence(mut self, stream_seq: u64, consumer_seq: u64) -> Self {
        self.stream_seq = stream_seq;
        self.consumer_seq = consumer_seq;
        self
    }

    /// Filter matching every notify message of this message's sequence
    pub fn sequence_filter(&self) -> String {
        subject(&self.account_id, Channel::Notify, &[&self.sequence_id, ">"])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_notify_subject() {
        let msg = Msg::parse("acct.notify.SEQ1.event").unwrap();
        assert_eq!(msg.account_id, "acct");
        assert_eq!(msg.channel, Channel::Notify);
        assert_eq!(msg.sequence_id, "SEQ1");
        assert_eq!(msg.message_id, "event");
        assert!(!msg.done);
        assert!(msg.app.is_none());
    }

    #[test]
    fn test_parse_done_subject() {
        let msg = Msg::parse("acct.notify.SEQ1.change.done").unwrap();
        assert_eq!(msg.message_id, "change");
        assert!(msg.done);
    }

    #[test]
    fn test_parse_request_subject() {
        let msg = Msg::parse("acct.request.SEQ1.change-app_handler.app.handler").unwrap();
        assert_eq!(msg.channel, Channel::Request);
        assert_eq!(msg.message_id, "change-app_handler");
        assert_eq!(msg.app.as_deref(), Some("app"));
        assert_eq!(msg.handler.as_deref(), Some("handler"));
    }

    #[test]
    fn test_parse_rejects_short_subjects() {
        assert!(matches!(
            Msg::parse("acct.notify.SEQ1"),
            Err(CoreError::InvalidSubject { .. })
        ));
        assert!(matches!(
            Msg::parse("acct.request.SEQ1.call.app"),
            Err(CoreError::InvalidSubject { .. })
        ));
        assert!(Msg::parse("acct.notify..event").is_err());
    }

    #[test]
    fn test_parse_rejects_unknown_channel() {
        assert!(matches!(
            Msg::parse("acct.work.SEQ1.event"),
            Err(CoreError::UnknownChannel { .. })
        ));
    }

    #[test]
    fn test_subject_builders() {
        assert_eq!(notify_subject("a", "s", "event"), "a.notify.s.event");
        assert_eq!(
            request_subject("a", "s", "on-call", "app", "handler"),
            "a.request.s.on-call.app.handler"
        );
        assert_eq!(notify_filter("a"), "a.notify.>");

        let msg = Msg::parse("a.notify.s.event").unwrap();
        assert_eq!(msg.sequence_filter(), "a.notify.s.>");
    }
}
