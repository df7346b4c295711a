use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures::FutureExt;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::info;

use crate::application::queue::{TaskHandler, TaskSpec};
use crate::application::registry::TemplateInfo;
use crate::domain::types::{StoredArtifact, TaskId, TaskStatus};

use super::HttpState;
use super::error::ApiError;

pub async fn health() -> StatusCode {
    StatusCode::NO_CONTENT
}

#[derive(Serialize)]
pub(crate) struct TemplateListBody {
    success: bool,
    templates: Vec<TemplateInfo>,
    total: usize,
}

pub async fn list_templates(State(state): State<HttpState>) -> Json<TemplateListBody> {
    let templates = state.registry.list();
    Json(TemplateListBody {
        success: true,
        total: templates.len(),
        templates,
    })
}

#[derive(Serialize)]
struct AcceptedBody {
    success: bool,
    accepted: bool,
    task_id: TaskId,
    message: String,
}

/// Queue a card request and answer immediately; the pipeline runs in the
/// background and its outcome is visible via `GET /tasks/{id}`.
pub async fn generate(
    State(state): State<HttpState>,
    Path(template_type): Path<String>,
    body: Bytes,
) -> Response {
    let props: Value = if body.is_empty() {
        Value::Object(Map::new())
    } else {
        match serde_json::from_slice(&body) {
            Ok(value) => value,
            Err(err) => {
                return ApiError::bad_request("Request body must be JSON", Some(err.to_string()))
                    .into_response();
            }
        }
    };

    info!(
        target: "cartolina::http",
        template = %template_type,
        "queueing card request"
    );

    let registry = Arc::clone(&state.registry);
    let handler: TaskHandler = Arc::new(move |template_type, props| {
        let registry = Arc::clone(&registry);
        async move { registry.dispatch(&template_type, props).await }.boxed()
    });

    let task_id = state.queue.enqueue(TaskSpec {
        template_type,
        props,
        handler,
    });

    (
        StatusCode::ACCEPTED,
        Json(AcceptedBody {
            success: true,
            accepted: true,
            task_id,
            message: format!("Request {task_id} queued"),
        }),
    )
        .into_response()
}

#[derive(Serialize)]
struct TaskStatusBody {
    success: bool,
    task_id: TaskId,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    artifact: Option<StoredArtifact>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

pub async fn task_status(State(state): State<HttpState>, Path(id): Path<TaskId>) -> Response {
    let Some(status) = state.queue.status(id) else {
        return ApiError::not_found("Unknown task id", None).into_response();
    };

    let body = match status {
        TaskStatus::Pending => TaskStatusBody {
            success: true,
            task_id: id,
            status: "pending",
            artifact: None,
            error: None,
        },
        TaskStatus::Completed(artifact) => TaskStatusBody {
            success: true,
            task_id: id,
            status: "completed",
            artifact: Some(artifact),
            error: None,
        },
        TaskStatus::Failed(message) => TaskStatusBody {
            success: true,
            task_id: id,
            status: "failed",
            artifact: None,
            error: Some(message),
        },
    };
    Json(body).into_response()
}

pub async fn not_found() -> Response {
    ApiError::not_found(
        "Endpoint not found",
        Some(
            "available endpoints: GET /healthz, GET /templates, \
             POST /generate/{template_type}, GET /tasks/{id}"
                .to_string(),
        ),
    )
    .into_response()
}
