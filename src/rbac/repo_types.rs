use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    pub display_name: String,
    pub description: Option<String>,
    pub level: i32,
    pub parent_role_id: Option<Uuid>,
    pub is_system: bool,
    pub is_active: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct RoleListItem {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub role: Role,
    pub user_count: i64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Permission {
    pub id: Uuid,
    pub name: String,
    pub display_name: String,
    pub resource: String,
    pub action: String,
    pub scope: String,
    pub is_system: bool,
    pub created_at: OffsetDateTime,
}

/// A permission as attached to a role.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct RolePermission {
    pub permission_id: Uuid,
    pub name: String,
    pub resource: String,
    pub action: String,
    pub scope: String,
    pub is_granted: bool,
}

/// A permission a user holds through one of their roles.
#[derive(Debug, Clone, Serialize, FromRow, PartialEq, Eq)]
pub struct HeldPermission {
    pub name: String,
    pub resource: String,
    pub action: String,
    pub scope: String,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct UserRole {
    pub id: Uuid,
    pub user_id: Uuid,
    pub role_id: Uuid,
    pub assigned_by: Option<Uuid>,
    pub is_active: bool,
    pub expires_at: Option<OffsetDateTime>,
    pub assigned_at: OffsetDateTime,
}

/// Role held by a user, with assignment metadata.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct AssignedRole {
    pub id: Uuid,
    pub name: String,
    pub display_name: String,
    pub level: i32,
    pub assigned_at: OffsetDateTime,
    pub expires_at: Option<OffsetDateTime>,
}
