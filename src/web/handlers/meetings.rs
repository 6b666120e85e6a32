use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tracing::{error, warn};

use crate::pipeline::types::{Document, Task, TaskStatus};
use crate::web::Pagination;
use crate::AppContext;

pub fn meetings_router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .route("/files", get(list_files))
        .route("/meetings/*object_key", get(meeting_detail))
        .route("/resubmit/*object_key", post(resubmit))
        .with_state(ctx)
}

#[derive(Debug, Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn error(error: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
        }
    }
}

#[derive(Debug, Serialize)]
struct MeetingDetail {
    id: String,
    object_key: String,
    region: String,
    size: i64,
    provider_task_id: String,
    status: TaskStatus,
    result_payload: Document,
    summary: Document,
    chapters: Document,
    transcript: Document,
    url: String,
    created_at: chrono::DateTime<chrono::Utc>,
    last_modified: String,
}

impl MeetingDetail {
    fn from_task(task: Task, url: String) -> Self {
        Self {
            id: task.id,
            object_key: task.object_key,
            region: task.region,
            size: task.size,
            provider_task_id: task.provider_task_id,
            status: task.status,
            result_payload: task.result_payload,
            summary: task.summary,
            chapters: task.chapters,
            transcript: task.transcript,
            url,
            created_at: task.created_at,
            last_modified: task.last_modified,
        }
    }
}

// Sync the bucket into the store, then return the task listing. A sync
// failure degrades to serving whatever is already recorded.
async fn list_files(
    State(ctx): State<Arc<AppContext>>,
    pagination: Option<Query<Pagination>>,
) -> impl IntoResponse {
    let pagination = pagination.map(|Query(p)| p).unwrap_or_default();

    if let Err(e) = ctx.pipeline.sync_bucket().await {
        warn!("Error syncing files: {}", e);
    }

    match ctx.pipeline.list(&pagination).await {
        Ok(tasks) => (StatusCode::OK, Json(ApiResponse::success(tasks))),
        Err(e) => {
            error!("Failed to list tasks: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error(e.to_string())),
            )
        }
    }
}

async fn meeting_detail(
    State(ctx): State<Arc<AppContext>>,
    Path(object_key): Path<String>,
) -> impl IntoResponse {
    let task = match ctx.pipeline.get_by_key(&object_key).await {
        Ok(Some(task)) => task,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(ApiResponse::error("Meeting not found".to_string())),
            )
        }
        Err(e) => {
            error!("Failed to get meeting {}: {}", object_key, e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error(e.to_string())),
            );
        }
    };

    let url = match ctx.pipeline.presign(&object_key).await {
        Ok(url) => url,
        Err(e) => {
            error!("Error getting url for {}: {}", object_key, e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error(e.to_string())),
            );
        }
    };

    (
        StatusCode::OK,
        Json(ApiResponse::success(MeetingDetail::from_task(task, url))),
    )
}

async fn resubmit(
    State(ctx): State<Arc<AppContext>>,
    Path(object_key): Path<String>,
) -> impl IntoResponse {
    match ctx.pipeline.resubmit(&object_key).await {
        Ok(task) => (StatusCode::OK, Json(ApiResponse::success(task))),
        Err(e) => {
            error!("Failed to resubmit {}: {}", object_key, e);
            (
                StatusCode::BAD_REQUEST,
                Json(ApiResponse::error(e.to_string())),
            )
        }
    }
}
