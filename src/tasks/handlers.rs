use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tracing::{info, instrument};
use uuid::Uuid;

use super::{
    dto::{
        check_choice, clean_title, CreateTaskRequest, TaskListQuery, UpdateTaskRequest, DEFAULT_CATEGORY,
        DEFAULT_PRIORITY, PRIORITIES, STATUSES,
    },
    repo::{self, NewTask},
    repo_types::Task,
};
use crate::{
    auth::extractors::AuthUser,
    error::{ApiError, ApiResult},
    state::AppState,
    users::User,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/tasks", get(list_tasks).post(create_task))
        .route("/tasks/:id", get(get_task).put(update_task).delete(delete_task))
}

fn not_found() -> ApiError {
    ApiError::not_found("Task not found")
}

async fn ensure_assignee(state: &AppState, assigned_to: Option<Uuid>) -> ApiResult<()> {
    if let Some(id) = assigned_to {
        if User::find_by_id(&state.db, id).await?.is_none() {
            return Err(ApiError::bad_request("assigned_to does not name a user"));
        }
    }
    Ok(())
}

#[instrument(skip(state, auth, payload))]
pub async fn create_task(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<CreateTaskRequest>,
) -> ApiResult<(StatusCode, Json<Task>)> {
    let title = clean_title(payload.title.as_deref()).ok_or_else(|| ApiError::bad_request("title is required"))?;
    check_choice("priority", payload.priority.as_deref(), PRIORITIES).map_err(ApiError::bad_request)?;
    ensure_assignee(&state, payload.assigned_to).await?;

    let task = repo::insert(
        &state.db,
        auth.user_id,
        NewTask {
            title: &title,
            description: payload.description.as_deref(),
            priority: payload.priority.as_deref().unwrap_or(DEFAULT_PRIORITY),
            category: payload.category.as_deref().unwrap_or(DEFAULT_CATEGORY),
            due_date: payload.due_date,
            assigned_to: payload.assigned_to,
            project_id: payload.project_id,
            tags: &payload.tags,
        },
    )
    .await?;
    info!(user_id = %auth.user_id, task_id = %task.id, "task created");
    Ok((StatusCode::CREATED, Json(task)))
}

#[instrument(skip(state, auth))]
pub async fn list_tasks(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(q): Query<TaskListQuery>,
) -> ApiResult<Json<Vec<Task>>> {
    check_choice("status", q.status.as_deref(), STATUSES).map_err(ApiError::bad_request)?;
    check_choice("priority", q.priority.as_deref(), PRIORITIES).map_err(ApiError::bad_request)?;
    let tasks = repo::list(&state.db, auth.user_id, &q, q.limit.clamp(1, 200)).await?;
    Ok(Json(tasks))
}

#[instrument(skip(state, auth))]
pub async fn get_task(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Task>> {
    let task = repo::find_owned(&state.db, id, auth.user_id)
        .await?
        .ok_or_else(not_found)?;
    Ok(Json(task))
}

#[instrument(skip(state, auth, payload))]
pub async fn update_task(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(mut payload): Json<UpdateTaskRequest>,
) -> ApiResult<Json<Task>> {
    if payload.is_empty() {
        return Err(ApiError::bad_request("No valid fields to update"));
    }
    if payload.title.is_some() {
        payload.title = Some(
            clean_title(payload.title.as_deref()).ok_or_else(|| ApiError::bad_request("title cannot be blank"))?,
        );
    }
    check_choice("priority", payload.priority.as_deref(), PRIORITIES).map_err(ApiError::bad_request)?;
    check_choice("status", payload.status.as_deref(), STATUSES).map_err(ApiError::bad_request)?;
    ensure_assignee(&state, payload.assigned_to).await?;

    let task = repo::update(&state.db, id, auth.user_id, payload)
        .await?
        .ok_or_else(not_found)?;
    info!(user_id = %auth.user_id, task_id = %task.id, status = %task.status, "task updated");
    Ok(Json(task))
}

#[instrument(skip(state, auth))]
pub async fn delete_task(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    if !repo::delete(&state.db, id, auth.user_id).await? {
        return Err(not_found());
    }
    info!(user_id = %auth.user_id, task_id = %id, "task deleted");
    Ok(StatusCode::NO_CONTENT)
}
