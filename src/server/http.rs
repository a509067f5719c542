//! HTTP API handlers

use axum::{
    extract::{rejection::JsonRejection, Json, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::error;

use crate::annotation::export::{archive_file_name, export_file_name};
use crate::error::AnnotateError;
use crate::server::ServerState;
use crate::types::{ExampleView, OptionsUpdate, QuestionUpdate, TaskStats};

pub type ApiResult<T> = Result<T, AnnotateError>;

impl IntoResponse for AnnotateError {
    fn into_response(self) -> Response {
        let status = match &self {
            AnnotateError::Validation(_) => StatusCode::BAD_REQUEST,
            AnnotateError::NotFound(_) => StatusCode::NOT_FOUND,
            AnnotateError::Store(msg) => {
                error!("Store error: {}", msg);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct TaskQuery {
    #[serde(default)]
    pub task: Option<String>,
    #[serde(default)]
    pub after: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    #[serde(default)]
    pub task: Option<String>,
    #[serde(default)]
    pub completed: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ZipQuery {
    /// Comma-separated task names; all tasks when absent
    #[serde(default)]
    pub tasks: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub task: String,
    #[serde(rename = "exampleId", alias = "example_id")]
    pub example_id: String,
    pub missing_information: bool,
    #[serde(default)]
    pub human_prediction: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct QuestionRequest {
    pub task: String,
    #[serde(rename = "exampleId", alias = "example_id")]
    pub example_id: String,
    pub question: String,
}

/// An option as sent by the editor: bare text or `{text}`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum OptionInput {
    Text(String),
    Object { text: String },
}

impl OptionInput {
    fn into_text(self) -> String {
        match self {
            OptionInput::Text(text) | OptionInput::Object { text } => text,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct OptionsRequest {
    pub task: String,
    #[serde(rename = "exampleId", alias = "example_id")]
    pub example_id: String,
    pub options: Vec<OptionInput>,
}

#[derive(Debug, Serialize)]
pub struct TasksResponse {
    pub tasks: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ExampleResponse {
    pub example: Option<ExampleView>,
}

/// Status response
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: String,
    pub version: String,
    pub backend: String,
    pub tasks: usize,
}

fn required_task(task: Option<String>) -> ApiResult<String> {
    task.map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AnnotateError::validation("task query parameter required"))
}

fn is_truthy(flag: Option<&str>) -> bool {
    matches!(
        flag.map(|f| f.trim().to_ascii_lowercase()).as_deref(),
        Some("1") | Some("true") | Some("yes") | Some("on")
    )
}

/// Malformed bodies are validation errors, reported as `{"error"}` JSON
fn request_body<T>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    payload
        .map(|Json(req)| req)
        .map_err(|rejection| AnnotateError::validation(rejection.body_text()))
}

fn attachment(name: &str) -> String {
    format!("attachment; filename=\"{}\"", name)
}

pub async fn tasks_handler(State(state): State<ServerState>) -> ApiResult<Json<TasksResponse>> {
    let tasks = state.service.list_tasks().await?;
    Ok(Json(TasksResponse { tasks }))
}

pub async fn next_example_handler(
    State(state): State<ServerState>,
    Query(query): Query<TaskQuery>,
) -> ApiResult<Json<ExampleResponse>> {
    let task = required_task(query.task)?;
    let after = query.after.as_deref().filter(|a| !a.is_empty());
    let example = state.service.next_pending(&task, after).await?;
    Ok(Json(ExampleResponse { example }))
}

pub async fn submit_handler(
    State(state): State<ServerState>,
    payload: Result<Json<SubmitRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let req = request_body(payload)?;
    state
        .service
        .submit(
            &req.task,
            &req.example_id,
            req.missing_information,
            req.human_prediction.as_deref(),
        )
        .await?;
    Ok(Json(json!({ "ok": true })))
}

pub async fn question_handler(
    State(state): State<ServerState>,
    payload: Result<Json<QuestionRequest>, JsonRejection>,
) -> ApiResult<Json<QuestionUpdate>> {
    let req = request_body(payload)?;
    let update = state
        .service
        .update_question(&req.task, &req.example_id, &req.question)
        .await?;
    Ok(Json(update))
}

pub async fn options_handler(
    State(state): State<ServerState>,
    payload: Result<Json<OptionsRequest>, JsonRejection>,
) -> ApiResult<Json<OptionsUpdate>> {
    let req = request_body(payload)?;
    let texts: Vec<String> = req.options.into_iter().map(OptionInput::into_text).collect();
    let update = state
        .service
        .update_options(&req.task, &req.example_id, &texts)
        .await?;
    Ok(Json(update))
}

pub async fn stats_handler(
    State(state): State<ServerState>,
    Query(query): Query<TaskQuery>,
) -> ApiResult<Json<TaskStats>> {
    let task = required_task(query.task)?;
    Ok(Json(state.service.stats(&task).await?))
}

pub async fn export_handler(
    State(state): State<ServerState>,
    Query(query): Query<ExportQuery>,
) -> ApiResult<Response> {
    let task = required_task(query.task)?;
    let completed_only = is_truthy(query.completed.as_deref());
    let docs = state.service.export(&task, completed_only).await?;
    let name = export_file_name(&crate::types::normalize_task(&task), completed_only);

    Ok((
        [(header::CONTENT_DISPOSITION, attachment(&name))],
        Json(Value::Object(docs)),
    )
        .into_response())
}

pub async fn export_zip_handler(
    State(state): State<ServerState>,
    Query(query): Query<ZipQuery>,
) -> ApiResult<Response> {
    let tasks: Option<Vec<String>> = query.tasks.map(|list| {
        list.split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect()
    });
    let bytes = state.service.export_completed_zip(tasks.as_deref()).await?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (header::CONTENT_DISPOSITION, attachment(&archive_file_name())),
        ],
        bytes,
    )
        .into_response())
}

/// Status endpoint
pub async fn status_handler(State(state): State<ServerState>) -> ApiResult<Json<StatusResponse>> {
    let tasks = state.service.list_tasks().await?;
    Ok(Json(StatusResponse {
        status: "running".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        backend: state.service.store().backend_name().to_string(),
        tasks: tasks.len(),
    }))
}
