//! Recent source events

use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, warn};

use crate::AppState;

/// How far back `GET /events` looks, in minutes
pub const EVENT_LOOKBACK_MINUTES: i64 = 60;

/// Response body of `GET /events`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventLog {
    pub start_timestamp: DateTime<Utc>,
    pub end_timestamp: DateTime<Utc>,
    pub event_items: Vec<EventItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventItem {
    pub event: Value,
    pub sequence_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ErrorResponse {
    message: String,
}

/// GET /events - Source events of the last hour, most recent first
pub(crate) async fn list_events(
    State(state): State<AppState>,
) -> Result<Json<EventLog>, (StatusCode, Json<ErrorResponse>)> {
    let end = Utc::now();
    let start = end - Duration::minutes(EVENT_LOOKBACK_MINUTES);

    let messages = state
        .client
        .get_event_history(start, true)
        .await
        .map_err(|e| {
            error!("Unable to fetch event history: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    message: "Unable to fetch events".to_string(),
                }),
            )
        })?;

    let event_items = messages
        .into_iter()
        .filter_map(|stored| {
            let msg = stored.to_msg().ok()?;
            match serde_json::from_slice(&stored.data) {
                Ok(event) => Some(EventItem {
                    event,
                    sequence_id: msg.sequence_id,
                    timestamp: stored.published_at,
                }),
                Err(e) => {
                    warn!(subject = %stored.subject, "Skipping undecodable event: {}", e);
                    None
                }
            }
        })
        .collect();

    Ok(Json(EventLog {
        start_timestamp: start,
        end_timestamp: end,
        event_items,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::create_router;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use hops_broker::{Client, MemoryJetStream, MemoryObjectStore};
    use hops_dsl::Automations;
    use serde_json::json;
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn get_events(js: &MemoryJetStream) -> (StatusCode, Vec<u8>) {
        let client = Client::new(Arc::new(js.clone()), Arc::new(MemoryObjectStore::new()), "acct");
        let state = AppState::new(client, Arc::new(Arc::new(Automations::empty())));
        let response = create_router(state)
            .oneshot(Request::builder().uri("/events").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    #[tokio::test]
    async fn test_recent_source_events() {
        let js = MemoryJetStream::new();
        let now = Utc::now();
        js.publish_at("acct.notify.OLD.event", br#"{"n":0}"#.to_vec(), now - Duration::hours(2))
            .unwrap();
        js.publish_at("acct.notify.A.event", br#"{"n":1}"#.to_vec(), now - Duration::minutes(10))
            .unwrap();
        js.publish_at("acct.notify.A.change-call", br#"{}"#.to_vec(), now - Duration::minutes(9))
            .unwrap();
        js.publish_at("acct.notify.B.event", br#"{"n":2}"#.to_vec(), now - Duration::minutes(5))
            .unwrap();

        let (status, body) = get_events(&js).await;
        assert_eq!(status, StatusCode::OK);

        let log: EventLog = serde_json::from_slice(&body).unwrap();
        assert_eq!(log.end_timestamp - log.start_timestamp, Duration::hours(1));
        let items: Vec<(&str, &Value)> = log
            .event_items
            .iter()
            .map(|i| (i.sequence_id.as_str(), &i.event))
            .collect();
        assert_eq!(items, vec![("B", &json!({"n": 2})), ("A", &json!({"n": 1}))]);
    }

    #[tokio::test]
    async fn test_broker_failure_is_500() {
        let js = MemoryJetStream::new();
        js.set_connected(false);
        let (status, body) = get_events(&js).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["message"], "Unable to fetch events");
    }
}
