//! Result messages published by workers (and by hops for `done`)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Timing and error metadata at the top level of a result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HopsResultMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub finished_at: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
}

/// Schema of call result messages on the notify channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultMsg {
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub errored: bool,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
    pub hops: HopsResultMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl ResultMsg {
    /// Build a finished result
    ///
    /// String results become `body`, anything else is carried as `json`.
    /// The result is completed unless an error is given.
    pub fn new(
        started_at: DateTime<Utc>,
        result: Option<serde_json::Value>,
        error: Option<String>,
    ) -> Self {
        let (body, json) = match result {
            Some(serde_json::Value::String(s)) => (s, None),
            other => (String::new(), other),
        };

        Self {
            body,
            completed: error.is_none(),
            done: true,
            errored: error.is_some(),
            headers: HashMap::new(),
            hops: HopsResultMeta {
                error,
                finished_at: Utc::now(),
                started_at,
            },
            json,
            status_code: None,
            url: None,
        }
    }
}
