use serde::Serialize;
use serde_json::json;
use sqlx::PgPool;
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    repo,
    repo_types::{AssignedRole, HeldPermission, Role, RolePermission, UserRole},
};
use crate::{error::ApiError, security};

pub const SUPER_ADMIN: &str = "super_admin";

#[derive(Debug, thiserror::Error)]
pub enum RbacError {
    #[error("Role not found")]
    RoleNotFound,
    #[error("Permission not found")]
    PermissionNotFound,
    #[error("User already has this role")]
    AlreadyAssigned,
    #[error("User does not have this role")]
    NotAssigned,
    #[error("Role name already exists")]
    DuplicateRole,
    #[error("Cannot revoke super_admin from yourself")]
    SelfRevoke,
    #[error("Insufficient permissions")]
    Denied,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<RbacError> for ApiError {
    fn from(e: RbacError) -> Self {
        match e {
            RbacError::RoleNotFound | RbacError::PermissionNotFound => ApiError::not_found(e.to_string()),
            RbacError::AlreadyAssigned | RbacError::NotAssigned | RbacError::DuplicateRole => {
                ApiError::conflict(e.to_string())
            }
            RbacError::SelfRevoke | RbacError::Denied => ApiError::forbidden(e.to_string()),
            RbacError::Internal(inner) => ApiError::Internal(inner),
        }
    }
}

/// `all` and `public` grants always apply; `own` only when the caller owns
/// the resource.
pub fn scope_allows<S: AsRef<str>>(scopes: &[S], user_id: Uuid, resource_owner: Option<Uuid>) -> bool {
    scopes.iter().any(|s| match s.as_ref() {
        "all" | "public" => true,
        "own" => resource_owner == Some(user_id),
        _ => false,
    })
}

pub async fn has_permission(
    db: &PgPool,
    user_id: Uuid,
    permission: &str,
    resource_owner: Option<Uuid>,
) -> anyhow::Result<bool> {
    let scopes = repo::granted_scopes(db, user_id, permission).await?;
    Ok(scope_allows(&scopes, user_id, resource_owner))
}

/// Fails with 403 unless the user holds `permission`.
pub async fn require(
    db: &PgPool,
    user_id: Uuid,
    permission: &str,
    resource_owner: Option<Uuid>,
) -> Result<(), RbacError> {
    if has_permission(db, user_id, permission, resource_owner).await? {
        Ok(())
    } else {
        warn!(user_id = %user_id, permission, "permission denied");
        Err(RbacError::Denied)
    }
}

pub async fn assign_role(
    db: &PgPool,
    user_id: Uuid,
    role_name: &str,
    assigned_by: Option<Uuid>,
    expires_at: Option<OffsetDateTime>,
) -> Result<UserRole, RbacError> {
    let role = repo::find_role_by_name(db, role_name)
        .await?
        .filter(|r| r.is_active)
        .ok_or(RbacError::RoleNotFound)?;

    if let Some(existing) = repo::find_user_role(db, user_id, role.id).await? {
        let live = existing.expires_at.map_or(true, |t| t > OffsetDateTime::now_utc());
        if existing.is_active && live {
            return Err(RbacError::AlreadyAssigned);
        }
    }

    let assignment = repo::upsert_user_role(db, user_id, role.id, assigned_by, expires_at).await?;
    security::record(
        db,
        assigned_by.or(Some(user_id)),
        "role_assigned",
        json!({ "target_user_id": user_id, "role": role.name, "expires_at": expires_at }),
        None,
    )
    .await;
    info!(user_id = %user_id, role = %role.name, "role assigned");
    Ok(assignment)
}

pub async fn revoke_role(
    db: &PgPool,
    user_id: Uuid,
    role_name: &str,
    revoked_by: Uuid,
) -> Result<(), RbacError> {
    if role_name == SUPER_ADMIN && user_id == revoked_by {
        return Err(RbacError::SelfRevoke);
    }
    let role = repo::find_role_by_name(db, role_name)
        .await?
        .ok_or(RbacError::RoleNotFound)?;
    let assignment = repo::find_user_role(db, user_id, role.id)
        .await?
        .filter(|ur| ur.is_active)
        .ok_or(RbacError::NotAssigned)?;

    repo::deactivate_user_role(db, assignment.id).await?;
    security::record(
        db,
        Some(revoked_by),
        "role_revoked",
        json!({ "target_user_id": user_id, "role": role.name }),
        None,
    )
    .await;
    info!(user_id = %user_id, role = %role.name, "role revoked");
    Ok(())
}

pub async fn create_role(
    db: &PgPool,
    name: &str,
    display_name: &str,
    description: Option<&str>,
    level: i32,
    parent_role_id: Option<Uuid>,
) -> Result<Role, RbacError> {
    if let Some(parent) = parent_role_id {
        repo::find_role_by_id(db, parent)
            .await?
            .ok_or(RbacError::RoleNotFound)?;
    }
    repo::insert_role(db, name, display_name, description, level, parent_role_id)
        .await?
        .ok_or(RbacError::DuplicateRole)
}

pub async fn set_role_permission(
    db: &PgPool,
    role_id: Uuid,
    permission_id: Uuid,
    is_granted: bool,
) -> Result<(), RbacError> {
    repo::find_role_by_id(db, role_id)
        .await?
        .ok_or(RbacError::RoleNotFound)?;
    if !repo::permission_exists(db, permission_id).await? {
        return Err(RbacError::PermissionNotFound);
    }
    repo::upsert_role_permission(db, role_id, permission_id, is_granted).await?;
    Ok(())
}

#[derive(Debug, Serialize)]
pub struct RoleWithPermissions {
    pub role: Role,
    pub permissions: Vec<RolePermission>,
}

pub async fn role_with_permissions(db: &PgPool, role_id: Uuid) -> Result<RoleWithPermissions, RbacError> {
    let role = repo::find_role_by_id(db, role_id)
        .await?
        .ok_or(RbacError::RoleNotFound)?;
    let permissions = repo::role_permissions(db, role_id).await?;
    Ok(RoleWithPermissions { role, permissions })
}

#[derive(Debug, Serialize)]
pub struct UserAccess {
    pub user_id: Uuid,
    pub roles: Vec<AssignedRole>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Vec<HeldPermission>>,
}

pub async fn user_roles_and_permissions(
    db: &PgPool,
    user_id: Uuid,
    include_permissions: bool,
) -> anyhow::Result<UserAccess> {
    let roles = repo::assigned_roles(db, user_id).await?;
    let permissions = if include_permissions {
        Some(repo::held_permissions(db, user_id).await?)
    } else {
        None
    };
    Ok(UserAccess {
        user_id,
        roles,
        permissions,
    })
}

pub async fn cleanup_expired_roles(db: &PgPool) -> anyhow::Result<u64> {
    repo::deactivate_expired_user_roles(db).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn all_and_public_scopes_always_allow() {
        let me = Uuid::new_v4();
        assert!(scope_allows(&["all"], me, None));
        assert!(scope_allows(&["public"], me, Some(Uuid::new_v4())));
    }

    #[test]
    fn own_scope_requires_ownership() {
        let me = Uuid::new_v4();
        assert!(scope_allows(&["own"], me, Some(me)));
        assert!(!scope_allows(&["own"], me, Some(Uuid::new_v4())));
        assert!(!scope_allows(&["own"], me, None));
        assert!(scope_allows(&["own", "all"], me, Some(Uuid::new_v4())));
        assert!(!scope_allows::<&str>(&[], me, Some(me)));
    }

    #[test]
    fn rbac_errors_map_to_statuses() {
        assert_eq!(ApiError::from(RbacError::RoleNotFound).status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::from(RbacError::AlreadyAssigned).status(), StatusCode::CONFLICT);
        assert_eq!(ApiError::from(RbacError::NotAssigned).status(), StatusCode::CONFLICT);
        assert_eq!(ApiError::from(RbacError::SelfRevoke).status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::from(RbacError::Denied).status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn self_revoke_of_super_admin_rejected_without_db() {
        let state = crate::state::AppState::fake();
        let me = Uuid::new_v4();
        let err = revoke_role(&state.db, me, SUPER_ADMIN, me).await.unwrap_err();
        assert!(matches!(err, RbacError::SelfRevoke));
    }

    async fn permission_id(db: &PgPool, name: &str) -> Uuid {
        repo::list_permissions(db)
            .await
            .unwrap()
            .into_iter()
            .find(|p| p.name == name)
            .unwrap()
            .id
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn child_role_inherits_parent_grants(db: PgPool) {
        crate::rbac::seed::seed(&db).await.unwrap();
        let holder = crate::test_support::user(&db, "curator@x.co", crate::users::ProfileType::Fan).await;
        let other = crate::test_support::user(&db, "plain@x.co", crate::users::ProfileType::Fan).await;

        let parent = create_role(&db, "curator", "Curator", None, 3, None).await.unwrap();
        let child = create_role(&db, "junior_curator", "Junior Curator", Some("trainee"), 4, Some(parent.id))
            .await
            .unwrap();
        let moderate = permission_id(&db, "moderate_content").await;
        set_role_permission(&db, parent.id, moderate, true).await.unwrap();
        assign_role(&db, holder.id, &child.name, None, None).await.unwrap();

        assert!(has_permission(&db, holder.id, "moderate_content", None).await.unwrap());
        assert!(!has_permission(&db, other.id, "moderate_content", None).await.unwrap());

        set_role_permission(&db, parent.id, moderate, false).await.unwrap();
        assert!(!has_permission(&db, holder.id, "moderate_content", None).await.unwrap());
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn expired_assignment_grants_nothing(db: PgPool) {
        crate::rbac::seed::seed(&db).await.unwrap();
        let user = crate::test_support::user(&db, "temp@x.co", crate::users::ProfileType::Fan).await;
        let past = OffsetDateTime::now_utc() - time::Duration::hours(1);
        assign_role(&db, user.id, "moderator", None, Some(past)).await.unwrap();

        assert!(!has_permission(&db, user.id, "moderate_content", None).await.unwrap());
        assert!(has_permission(&db, user.id, "read_tracks", None).await.unwrap());
        assert_eq!(cleanup_expired_roles(&db).await.unwrap(), 1);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn duplicate_assignment_and_role_names_conflict(db: PgPool) {
        crate::rbac::seed::seed(&db).await.unwrap();
        let user = crate::test_support::user(&db, "dup@x.co", crate::users::ProfileType::Artist).await;
        assert!(matches!(
            assign_role(&db, user.id, "artist", None, None).await,
            Err(RbacError::AlreadyAssigned)
        ));
        assert!(matches!(
            create_role(&db, "artist", "Artist", None, 4, None).await,
            Err(RbacError::DuplicateRole)
        ));
        assert!(matches!(
            assign_role(&db, user.id, "no_such_role", None, None).await,
            Err(RbacError::RoleNotFound)
        ));
    }
}
