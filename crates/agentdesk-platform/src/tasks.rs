//! Task endpoints: contact-sheet upload and task queries.

use crate::admin::{AdminState, ApiReply, audit, fail, internal_error, reply};
use crate::auth::Claims;
use crate::pipeline::{FileFormat, PipelineError, UploadSummary, distribute_and_store, parser};
use axum::body::Bytes;
use axum::extract::multipart::{Multipart, MultipartError, MultipartRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Extension;
use std::sync::Arc;

/// Multipart field carrying the sheet.
const FILE_FIELD: &str = "file";

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        let status = match &self {
            PipelineError::UnsupportedFormat(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            PipelineError::PersistFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
            PipelineError::NoFile
            | PipelineError::ParseFailure { .. }
            | PipelineError::NoTasks
            | PipelineError::NoAgents => StatusCode::BAD_REQUEST,
        };
        if self.is_user_correctable() {
            tracing::info!("upload rejected: {self}");
        } else {
            tracing::error!("upload failed: {self}");
        }
        fail(status, self.client_message()).into_response()
    }
}

struct UploadedFile {
    name: String,
    bytes: Bytes,
}

/// First `file` part of the form. A part with neither a filename nor
/// content is what browsers send for an empty file input.
async fn read_file_part(multipart: &mut Multipart) -> Result<Option<UploadedFile>, MultipartError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let name = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await?;
        if name.is_empty() && bytes.is_empty() {
            return Ok(None);
        }
        return Ok(Some(UploadedFile { name, bytes }));
    }
    Ok(None)
}

fn success_body(summary: &UploadSummary) -> serde_json::Value {
    serde_json::json!({
        "ok": true,
        "message": format!(
            "Successfully uploaded and distributed {} tasks among {} agents",
            summary.total_tasks, summary.agents_count
        ),
        "totalTasks": summary.total_tasks,
        "agentsCount": summary.agents_count,
        "tasksByAgent": summary.tasks_by_agent,
    })
}

/// `POST /api/tasks/upload`: parse the sheet, spread it over the active
/// roster and return the per-agent grouping.
pub async fn upload_tasks(
    State(state): State<Arc<AdminState>>,
    Extension(claims): Extension<Claims>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let Ok(mut multipart) = multipart else {
        return PipelineError::NoFile.into_response();
    };
    let upload = match read_file_part(&mut multipart).await {
        Ok(Some(upload)) => upload,
        Ok(None) => return PipelineError::NoFile.into_response(),
        Err(e) => {
            tracing::warn!("upload: unreadable multipart body: {e}");
            let message = if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
                "File exceeds the upload size limit"
            } else {
                "Error processing file"
            };
            return fail(e.status(), message).into_response();
        }
    };

    let format = match FileFormat::from_filename(&upload.name) {
        Ok(format) => format,
        Err(e) => return e.into_response(),
    };
    tracing::debug!("upload: {} ({format}, {} bytes) from {}", upload.name, upload.bytes.len(), claims.sub);

    let tenant_id = claims.sub.clone();
    let worker = state.clone();
    let outcome = tokio::task::spawn_blocking(move || -> Result<(UploadSummary, usize), PipelineError> {
        let parsed = parser::parse_as(&upload.bytes, format)?;
        drop(upload);
        let db = worker.db();
        distribute_and_store(&*db, &tenant_id, parsed.tasks).map(|summary| (summary, parsed.dropped))
    })
    .await;

    match outcome {
        Ok(Ok((summary, dropped))) => {
            audit(
                &state,
                "task_batch_uploaded",
                &claims.sub,
                Some(&format!(
                    "tasks={} agents={} dropped={dropped}",
                    summary.total_tasks, summary.agents_count
                )),
            );
            tracing::info!(
                "upload: {} distributed {} tasks over {} agents ({dropped} rows dropped)",
                claims.sub,
                summary.total_tasks,
                summary.agents_count
            );
            reply(StatusCode::OK, success_body(&summary)).into_response()
        }
        Ok(Err(e)) => e.into_response(),
        Err(e) => internal_error("upload_tasks", e).into_response(),
    }
}

/// `GET /api/tasks/agent/{agent_id}`: one agent's tasks, newest first.
pub async fn tasks_by_agent(
    State(state): State<Arc<AdminState>>,
    Extension(claims): Extension<Claims>,
    Path(agent_id): Path<String>,
) -> ApiReply {
    let result = {
        let db = state.db();
        db.get_agent(&claims.sub, &agent_id).and_then(|agent| match agent {
            Some(agent) => db.tasks_for_agent(&agent.id).map(|tasks| Some((agent, tasks))),
            None => Ok(None),
        })
    };
    match result {
        Ok(Some((agent, tasks))) => reply(
            StatusCode::OK,
            serde_json::json!({
                "ok": true,
                "agent": {"id": agent.id, "name": agent.name, "email": agent.email},
                "tasks": tasks,
            }),
        ),
        Ok(None) => fail(StatusCode::NOT_FOUND, "Agent not found"),
        Err(e) => internal_error("tasks_by_agent", e),
    }
}

/// `GET /api/tasks/all`: every task of the tenant's agents, newest first.
pub async fn all_tasks(
    State(state): State<Arc<AdminState>>,
    Extension(claims): Extension<Claims>,
) -> ApiReply {
    let rows = state.db().tasks_for_admin(&claims.sub);
    match rows {
        Ok(rows) => {
            let tasks: Vec<serde_json::Value> = rows
                .into_iter()
                .map(|(task, agent)| {
                    serde_json::json!({
                        "id": task.id,
                        "FirstName": task.first_name,
                        "Phone": task.phone,
                        "Notes": task.notes,
                        "batchId": task.batch_id,
                        "createdAt": task.created_at,
                        "assignedAgent": agent,
                    })
                })
                .collect();
            reply(StatusCode::OK, serde_json::json!({"ok": true, "tasks": tasks}))
        }
        Err(e) => internal_error("all_tasks", e),
    }
}
