//! hops HTTP API
//!
//! Lets people trigger tasks by hand and see what has happened recently.
//! Triggering a task only publishes a source event; the runner picks it up
//! like any other event.
//!
//! | route | purpose |
//! |-------|---------|
//! | `GET /tasks` | declared tasks |
//! | `POST /tasks/:name` | validate input and publish a `task` source event |
//! | `GET /events` | source events from the last hour |
//! | `GET\|HEAD /health` | broker connection status |

mod events;
mod tasks;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use hops_broker::Client;
use hops_dsl::Automations;
use hops_runner::AutomationsLoader;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

pub use events::{EventItem, EventLog, EVENT_LOOKBACK_MINUTES};
pub use tasks::TaskRunResponse;

/// Where handlers read the current automations from
pub trait AutomationsSource: Send + Sync {
    fn automations(&self) -> Arc<Automations>;
}

impl AutomationsSource for AutomationsLoader {
    fn automations(&self) -> Arc<Automations> {
        self.current()
    }
}

impl AutomationsSource for Arc<Automations> {
    fn automations(&self) -> Arc<Automations> {
        self.clone()
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub client: Client,
    pub automations: Arc<dyn AutomationsSource>,
}

impl AppState {
    pub fn new(client: Client, automations: Arc<dyn AutomationsSource>) -> Self {
        Self {
            client,
            automations,
        }
    }
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/tasks", get(tasks::list_tasks))
        .route("/tasks/:name", post(tasks::run_task))
        .route("/events", get(events::list_events))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serve the API until `shutdown` fires
pub async fn start_server(
    state: AppState,
    addr: SocketAddr,
    mut shutdown: broadcast::Receiver<()>,
) -> std::io::Result<()> {
    let router = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("API server listening on {}", addr);
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await
}

/// GET|HEAD /health - 200 while the broker is reachable
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let headers = [(header::CONTENT_TYPE, "text/plain")];
    if state.client.check_connection() {
        (StatusCode::OK, headers, "OK")
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, headers, "Not connected to broker")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Method, Request};
    use hops_broker::{MemoryJetStream, MemoryObjectStore};
    use tower::ServiceExt;

    fn create_test_state(js: &MemoryJetStream) -> AppState {
        let client = Client::new(Arc::new(js.clone()), Arc::new(MemoryObjectStore::new()), "acct");
        AppState::new(client, Arc::new(Arc::new(Automations::empty())))
    }

    #[tokio::test]
    async fn test_health_check() {
        let js = MemoryJetStream::new();
        let app = create_router(create_test_state(&js));

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain");

        js.set_connected(false);
        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::HEAD)
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
