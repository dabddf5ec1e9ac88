//! Source event envelope

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::HOPS_META_KEY;

/// Metadata stored under the `hops` key of every source event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMeta {
    pub source: String,
    pub event: String,
    #[serde(default)]
    pub action: String,
}

/// Wrap a raw payload as a source event and derive its sequence id
///
/// The `hops` key of `raw_event` is replaced by the metadata. The sequence id
/// is a UUIDv5 (DNS namespace) of the serialized event, so identical payloads
/// always land in the same sequence.
pub fn create_source_event(
    mut raw_event: Map<String, Value>,
    meta: SourceMeta,
) -> CoreResult<(Vec<u8>, String)> {
    raw_event.insert(HOPS_META_KEY.to_string(), serde_json::to_value(meta)?);

    let bytes = serde_json::to_vec(&raw_event)?;
    let sequence_id = Uuid::new_v5(&Uuid::NAMESPACE_DNS, &bytes).to_string();

    Ok((bytes, sequence_id))
}

/// Event and optional action extracted from a source event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventName {
    pub event: String,
    pub action: Option<String>,
}

impl EventName {
    /// Index key for `on` blocks labelled `event_action`
    pub fn event_action_key(&self) -> Option<String> {
        self.action
            .as_ref()
            .map(|action| format!("{}_{}", self.event, action))
    }
}

/// Look up `event[meta_key].event` and the optional `action`
pub fn event_name(event: &Value, meta_key: &str) -> CoreResult<EventName> {
    let meta = event
        .get(meta_key)
        .and_then(Value::as_object)
        .ok_or_else(|| CoreError::InvalidSourceEvent {
            reason: format!("missing '{}' metadata object", meta_key),
        })?;

    let name = meta
        .get("event")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| CoreError::InvalidSourceEvent {
            reason: format!("missing '{}.event' value", meta_key),
        })?;

    let action = meta
        .get("action")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    Ok(EventName {
        event: name.to_string(),
        action,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta(event: &str, action: &str) -> SourceMeta {
        SourceMeta {
            source: "hiphops".to_string(),
            event: event.to_string(),
            action: action.to_string(),
        }
    }

    #[test]
    fn test_create_source_event_is_deterministic() {
        let raw = json!({"b": 1, "a": "x"}).as_object().unwrap().clone();
        let (bytes1, seq1) = create_source_event(raw.clone(), meta("task", "deploy")).unwrap();
        let (bytes2, seq2) = create_source_event(raw, meta("task", "deploy")).unwrap();

        assert_eq!(bytes1, bytes2);
        assert_eq!(seq1, seq2);
        assert_eq!(seq1, Uuid::new_v5(&Uuid::NAMESPACE_DNS, &bytes1).to_string());
    }

    #[test]
    fn test_create_source_event_overwrites_meta() {
        let raw = json!({"hops": "spoofed", "x": 1}).as_object().unwrap().clone();
        let (bytes, _) = create_source_event(raw, meta("schedule", "hourly")).unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(value["hops"]["event"], "schedule");
        assert_eq!(value["hops"]["action"], "hourly");
        assert_eq!(value["x"], 1);
    }

    #[test]
    fn test_meta_is_only_source_event_action() {
        let (bytes, seq1) = create_source_event(Map::new(), meta("task", "a")).unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value, json!({"hops": {"source": "hiphops", "event": "task", "action": "a"}}));

        let (_, seq2) = create_source_event(Map::new(), meta("task", "b")).unwrap();
        assert_ne!(seq1, seq2);
    }

    #[test]
    fn test_event_name() {
        let name = event_name(&json!({"hops": {"event": "foo"}}), "hops").unwrap();
        assert_eq!(name.event, "foo");
        assert_eq!(name.action, None);
        assert_eq!(name.event_action_key(), None);

        let name = event_name(&json!({"hops": {"event": "foo", "action": "bar"}}), "hops").unwrap();
        assert_eq!(name.event_action_key().as_deref(), Some("foo_bar"));
    }

    #[test]
    fn test_event_name_missing_event() {
        assert!(event_name(&json!({"hops": {"action": "bar"}}), "hops").is_err());
        assert!(event_name(&json!({"other": {}}), "hops").is_err());
        assert!(event_name(&json!("not an object"), "hops").is_err());
    }
}
