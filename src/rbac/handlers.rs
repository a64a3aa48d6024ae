use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::{
    dto::{
        AssignRoleRequest, CheckPermissionRequest, CheckPermissionResponse, CreateRoleRequest,
        MyRolesQuery, RevokeRoleRequest, SetPermissionRequest,
    },
    repo,
    repo_types::{Permission, Role, RoleListItem, UserRole},
    services::{self, RoleWithPermissions, UserAccess},
};
use crate::{
    auth::extractors::AuthUser,
    error::{ApiError, ApiResult},
    state::AppState,
};

const MANAGE_ROLES: &str = "manage_roles";
const READ_USERS: &str = "read_users";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/roles", get(list_roles).post(create_role))
        .route("/roles/:id/permissions", get(role_permissions).post(set_role_permission))
        .route("/roles/assign", post(assign_role))
        .route("/roles/revoke", post(revoke_role))
        .route("/roles/check", post(check_permission))
        .route("/roles/mine", get(user_roles))
        .route("/permissions", get(list_permissions))
}

#[instrument(skip(state, auth))]
pub async fn list_roles(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<Json<Vec<RoleListItem>>> {
    services::require(&state.db, auth.user_id, MANAGE_ROLES, None).await?;
    Ok(Json(repo::list_roles(&state.db).await?))
}

#[instrument(skip(state, auth, payload))]
pub async fn create_role(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<CreateRoleRequest>,
) -> ApiResult<(StatusCode, Json<Role>)> {
    let name = payload.name.trim().to_lowercase();
    if name.is_empty() || payload.display_name.trim().is_empty() {
        return Err(ApiError::bad_request("name and display_name are required"));
    }
    services::require(&state.db, auth.user_id, MANAGE_ROLES, None).await?;

    let role = services::create_role(
        &state.db,
        &name,
        payload.display_name.trim(),
        payload.description.as_deref(),
        payload.level,
        payload.parent_role_id,
    )
    .await?;
    info!(role = %role.name, by = %auth.user_id, "role created");
    Ok((StatusCode::CREATED, Json(role)))
}

#[instrument(skip(state, auth))]
pub async fn role_permissions(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<RoleWithPermissions>> {
    services::require(&state.db, auth.user_id, MANAGE_ROLES, None).await?;
    Ok(Json(services::role_with_permissions(&state.db, id).await?))
}

#[instrument(skip(state, auth, payload))]
pub async fn set_role_permission(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<SetPermissionRequest>,
) -> ApiResult<Json<RoleWithPermissions>> {
    services::require(&state.db, auth.user_id, MANAGE_ROLES, None).await?;
    services::set_role_permission(&state.db, id, payload.permission_id, payload.is_granted).await?;
    Ok(Json(services::role_with_permissions(&state.db, id).await?))
}

#[instrument(skip(state, auth, payload))]
pub async fn assign_role(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<AssignRoleRequest>,
) -> ApiResult<(StatusCode, Json<UserRole>)> {
    services::require(&state.db, auth.user_id, MANAGE_ROLES, None).await?;
    let assignment = services::assign_role(
        &state.db,
        payload.user_id,
        payload.role_name.trim(),
        Some(auth.user_id),
        payload.expires_at,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(assignment)))
}

#[instrument(skip(state, auth, payload))]
pub async fn revoke_role(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<RevokeRoleRequest>,
) -> ApiResult<StatusCode> {
    services::require(&state.db, auth.user_id, MANAGE_ROLES, None).await?;
    services::revoke_role(&state.db, payload.user_id, payload.role_name.trim(), auth.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, auth, payload))]
pub async fn check_permission(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<CheckPermissionRequest>,
) -> ApiResult<Json<CheckPermissionResponse>> {
    let target = payload.user_id.unwrap_or(auth.user_id);
    if target != auth.user_id {
        services::require(&state.db, auth.user_id, MANAGE_ROLES, None).await?;
    }
    let has_permission = services::has_permission(
        &state.db,
        target,
        &payload.permission,
        payload.resource_owner_id,
    )
    .await?;
    Ok(Json(CheckPermissionResponse {
        user_id: target,
        permission: payload.permission,
        has_permission,
    }))
}

#[instrument(skip(state, auth))]
pub async fn user_roles(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(q): Query<MyRolesQuery>,
) -> ApiResult<Json<UserAccess>> {
    let target = q.user_id.unwrap_or(auth.user_id);
    if target != auth.user_id {
        services::require(&state.db, auth.user_id, READ_USERS, None)
            .await
            .map_err(|e| {
                warn!(user_id = %auth.user_id, %target, "roles lookup of another user denied");
                e
            })?;
    }
    let access =
        services::user_roles_and_permissions(&state.db, target, q.include_permissions).await?;
    Ok(Json(access))
}

#[instrument(skip(state, auth))]
pub async fn list_permissions(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<Json<Vec<Permission>>> {
    services::require(&state.db, auth.user_id, MANAGE_ROLES, None).await?;
    Ok(Json(repo::list_permissions(&state.db).await?))
}
