//! Task listing and triggering

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use hops_core::{create_source_event, Channel, SourceMeta, HOPS_SOURCE, SOURCE_EVENT_ID};
use hops_dsl::{validate_task_input, InputErrors, TaskAst};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{error, info};

use crate::AppState;

/// Event name of task source events
const TASK_EVENT: &str = "task";

/// Outcome of a task run request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskRunResponse {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<InputErrors>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence_id: Option<String>,
}

type RunResult = Result<Json<TaskRunResponse>, (StatusCode, Json<TaskRunResponse>)>;

fn failure(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<TaskRunResponse>) {
    let message = message.into();
    error!("{}", message);
    (
        status,
        Json(TaskRunResponse {
            message,
            ..Default::default()
        }),
    )
}

/// GET /tasks - Returns the declared tasks
pub(crate) async fn list_tasks(State(state): State<AppState>) -> Json<Vec<TaskAst>> {
    Json(state.automations.automations().tasks().to_vec())
}

/// POST /tasks/{name} - Validates input and publishes a task event
pub(crate) async fn run_task(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Bytes,
) -> RunResult {
    let input: Map<String, Value> = serde_json::from_slice(&body)
        .map_err(|_| failure(StatusCode::BAD_REQUEST, "Unable to parse payload JSON"))?;

    let automations = state.automations.automations();
    let task = automations
        .task(&name)
        .map_err(|_| failure(StatusCode::NOT_FOUND, "Not found"))?;

    let errors = validate_task_input(task, &input);
    if !errors.is_empty() {
        let (status, Json(mut response)) =
            failure(StatusCode::BAD_REQUEST, format!("Invalid inputs for {}", task.name));
        response.errors = Some(errors);
        return Err((status, Json(response)));
    }

    let (event, sequence_id) = create_source_event(
        input,
        SourceMeta {
            source: HOPS_SOURCE.to_string(),
            event: TASK_EVENT.to_string(),
            action: task.name.clone(),
        },
    )
    .map_err(|_| failure(StatusCode::INTERNAL_SERVER_ERROR, "Unable to create event"))?;

    state
        .client
        .publish_to(event, Channel::Notify, &[&sequence_id, SOURCE_EVENT_ID])
        .await
        .map_err(|e| {
            failure(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Unable to publish event: {}", e),
            )
        })?;

    info!(task = %task.name, sequence_id = %sequence_id, "Triggered task");
    Ok(Json(TaskRunResponse {
        message: "OK".to_string(),
        errors: None,
        sequence_id: Some(sequence_id),
    }))
}
