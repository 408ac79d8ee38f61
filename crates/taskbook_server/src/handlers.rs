//! `/api/task` handlers.
//!
//! # Responsibility
//! - Parse request shapes and the `X-User-Id` caller header.
//! - Run each workflow operation on a blocking thread with its own connection.
//! - Stream downloads from the blob store instead of buffering them.
//!
//! # Invariants
//! - The caller is resolved before any request body is read.
//! - Successful mutations answer with the document snapshot.
//! - Errors answer with `{"error": "<message>"}`.

use crate::app::AppState;
use crate::error::ApiError;
use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::Json;
use log::debug;
use serde::Deserialize;
use std::sync::Arc;
use taskbook_core::db::open_db;
use taskbook_core::{
    sqlite_workflow, ActorDirectory, Caller, ProjectId, ReviewDecision, Slot,
    SqliteActorDirectory, SqliteTaskWorkflow, SubmitKind, TaskDocumentId, TaskDocumentSnapshot,
    UploadRequest, WorkflowError, WorkflowResult,
};
use tokio_util::io::ReaderStream;

const CALLER_HEADER: &str = "x-user-id";

type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitBody {
    #[serde(default)]
    submit_type: String,
    #[serde(default)]
    project_id: Option<ProjectId>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewBody {
    task_id: TaskDocumentId,
    #[serde(default)]
    action: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteFileBody {
    #[serde(default)]
    file_type: String,
    #[serde(default)]
    project_id: Option<ProjectId>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetBody {
    task_id: TaskDocumentId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoQuery {
    project_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    #[serde(rename = "type")]
    file_type: Option<String>,
}

struct UploadForm {
    slot: Slot,
    project_id: Option<ProjectId>,
    file_name: String,
    bytes: Vec<u8>,
}

pub async fn upload(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> ApiResult<Json<TaskDocumentSnapshot>> {
    let caller = authenticate(&state, caller_id(&headers)?).await?;
    let form = read_upload_form(&mut multipart).await?;
    debug!(
        "event=http_upload module=server status=start user_id={} slot={} bytes={}",
        caller.id,
        form.slot.as_str(),
        form.bytes.len()
    );

    run_workflow_as(state, caller, move |workflow, caller| {
        let document = workflow.upload_artifact(
            caller,
            UploadRequest {
                project_id: form.project_id,
                slot: form.slot,
                file_name: &form.file_name,
                bytes: &form.bytes,
            },
        )?;
        workflow.snapshot(&document)
    })
    .await
    .map(Json)
}

pub async fn submit(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Json<SubmitBody>, JsonRejection>,
) -> ApiResult<Json<TaskDocumentSnapshot>> {
    let opaque_id = caller_id(&headers)?;
    let body = json_body(body)?;
    let kind = SubmitKind::parse(&body.submit_type)
        .ok_or_else(|| invalid_input("invalid submit type"))?;

    run_workflow(state, opaque_id, move |workflow, caller| {
        let document = workflow.submit_artifact(caller, body.project_id, kind)?;
        workflow.snapshot(&document)
    })
    .await
    .map(Json)
}

pub async fn info(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<InfoQuery>,
) -> ApiResult<Json<TaskDocumentSnapshot>> {
    let opaque_id = caller_id(&headers)?;
    let project_id = query.project_id.as_deref().and_then(parse_project_id);

    run_workflow(state, opaque_id, move |workflow, caller| {
        workflow.task_info(caller, project_id)
    })
    .await
    .map(Json)
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<TaskDocumentSnapshot>>> {
    let opaque_id = caller_id(&headers)?;

    run_workflow(state, opaque_id, |workflow, caller| {
        workflow
            .list_pending(caller)?
            .iter()
            .map(|document| workflow.snapshot(document))
            .collect::<WorkflowResult<Vec<_>>>()
    })
    .await
    .map(Json)
}

pub async fn review(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Json<ReviewBody>, JsonRejection>,
) -> ApiResult<Json<TaskDocumentSnapshot>> {
    let opaque_id = caller_id(&headers)?;
    let body = json_body(body)?;
    let decision =
        ReviewDecision::parse(&body.action).ok_or_else(|| invalid_input("invalid action"))?;

    run_workflow(state, opaque_id, move |workflow, caller| {
        let document = workflow.review_task_document(caller, body.task_id, decision)?;
        workflow.snapshot(&document)
    })
    .await
    .map(Json)
}

pub async fn delete_file(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Json<DeleteFileBody>, JsonRejection>,
) -> ApiResult<Json<TaskDocumentSnapshot>> {
    let opaque_id = caller_id(&headers)?;
    let body = json_body(body)?;
    let slot = Slot::parse(&body.file_type).ok_or_else(|| invalid_input("invalid file type"))?;

    run_workflow(state, opaque_id, move |workflow, caller| {
        let document = workflow.delete_artifact(caller, body.project_id, slot)?;
        workflow.snapshot(&document)
    })
    .await
    .map(Json)
}

pub async fn reset(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Json<ResetBody>, JsonRejection>,
) -> ApiResult<Json<TaskDocumentSnapshot>> {
    let opaque_id = caller_id(&headers)?;
    let body = json_body(body)?;

    run_workflow(state, opaque_id, move |workflow, caller| {
        let document = workflow.reset_task_document(caller, body.task_id)?;
        workflow.snapshot(&document)
    })
    .await
    .map(Json)
}

pub async fn download(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(task_id): Path<TaskDocumentId>,
    Query(query): Query<DownloadQuery>,
) -> ApiResult<Response> {
    let opaque_id = caller_id(&headers)?;
    let slot = query
        .file_type
        .as_deref()
        .and_then(Slot::parse)
        .ok_or_else(|| invalid_input("invalid file type"))?;

    let download = run_workflow(state, opaque_id, move |workflow, caller| {
        workflow.open_artifact(caller, task_id, slot)
    })
    .await?;

    let disposition = HeaderValue::from_str(&format!(
        "attachment; filename=\"{}\"",
        download.display_name
    ))
    .map_err(|_| ApiError::Internal("invalid download file name".to_string()))?;
    let body = Body::from_stream(ReaderStream::new(tokio::fs::File::from_std(
        download.reader,
    )));
    Ok((
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/octet-stream"),
            ),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}

/// Resolves the caller, builds the workflow and runs `op` off the async runtime.
async fn run_workflow<T, F>(state: Arc<AppState>, opaque_id: String, op: F) -> ApiResult<T>
where
    T: Send + 'static,
    F: FnOnce(&SqliteTaskWorkflow<'_>, &Caller) -> WorkflowResult<T> + Send + 'static,
{
    blocking(state, move |state| {
        let conn = open_db(&state.db_path)?;
        let caller = SqliteActorDirectory::try_new(&conn)?
            .resolve_caller(&opaque_id)?
            .ok_or(WorkflowError::Unauthenticated)?;
        let workflow = sqlite_workflow(&conn, state.store.clone())?;
        Ok(op(&workflow, &caller)?)
    })
    .await
}

/// Runs `op` for an already resolved caller.
async fn run_workflow_as<T, F>(state: Arc<AppState>, caller: Caller, op: F) -> ApiResult<T>
where
    T: Send + 'static,
    F: FnOnce(&SqliteTaskWorkflow<'_>, &Caller) -> WorkflowResult<T> + Send + 'static,
{
    blocking(state, move |state| {
        let conn = open_db(&state.db_path)?;
        let workflow = sqlite_workflow(&conn, state.store.clone())?;
        Ok(op(&workflow, &caller)?)
    })
    .await
}

/// Resolves the caller on its own, before a request body is consumed.
async fn authenticate(state: &Arc<AppState>, opaque_id: String) -> ApiResult<Caller> {
    blocking(Arc::clone(state), move |state| {
        let conn = open_db(&state.db_path)?;
        let caller = SqliteActorDirectory::try_new(&conn)?
            .resolve_caller(&opaque_id)?
            .ok_or(WorkflowError::Unauthenticated)?;
        Ok(caller)
    })
    .await
}

async fn blocking<T, F>(state: Arc<AppState>, f: F) -> ApiResult<T>
where
    T: Send + 'static,
    F: FnOnce(&AppState) -> ApiResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(move || f(&state))
        .await
        .map_err(|err| ApiError::Internal(format!("request task failed: {err}")))?
}

fn caller_id(headers: &HeaderMap) -> ApiResult<String> {
    headers
        .get(CALLER_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or(ApiError::Workflow(WorkflowError::Unauthenticated))
}

fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    body.map(|Json(value)| value)
        .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))
}

fn invalid_input(message: &str) -> ApiError {
    ApiError::Workflow(WorkflowError::InvalidInput(message.to_string()))
}

/// Empty, `null` and non-numeric values mean "no explicit project".
fn parse_project_id(raw: &str) -> Option<ProjectId> {
    match raw.trim() {
        "" | "null" => None,
        value => value.parse().ok(),
    }
}

async fn read_upload_form(multipart: &mut Multipart) -> ApiResult<UploadForm> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut file_type: Option<String> = None;
    let mut project_id: Option<ProjectId> = None;

    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(bad_multipart)?;
                file = Some((file_name, bytes.to_vec()));
            }
            "fileType" => file_type = Some(field.text().await.map_err(bad_multipart)?),
            "projectId" => {
                project_id = parse_project_id(&field.text().await.map_err(bad_multipart)?);
            }
            _ => {}
        }
    }

    let (file_name, bytes) = file.ok_or_else(|| invalid_input("no file provided"))?;
    if file_name.trim().is_empty() {
        return Err(invalid_input("no file selected"));
    }
    let slot = file_type
        .as_deref()
        .and_then(Slot::parse)
        .ok_or_else(|| invalid_input("invalid file type"))?;

    Ok(UploadForm {
        slot,
        project_id,
        file_name,
        bytes,
    })
}

fn bad_multipart(err: axum::extract::multipart::MultipartError) -> ApiError {
    ApiError::BadRequest(err.body_text())
}
