use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct CreateRoleRequest {
    pub name: String,
    pub display_name: String,
    pub description: Option<String>,
    #[serde(default = "default_level")]
    pub level: i32,
    pub parent_role_id: Option<Uuid>,
}

fn default_level() -> i32 {
    4
}

#[derive(Debug, Deserialize)]
pub struct SetPermissionRequest {
    pub permission_id: Uuid,
    #[serde(default = "granted")]
    pub is_granted: bool,
}

fn granted() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct AssignRoleRequest {
    pub user_id: Uuid,
    pub role_name: String,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,
}

#[derive(Debug, Deserialize)]
pub struct RevokeRoleRequest {
    pub user_id: Uuid,
    pub role_name: String,
}

#[derive(Debug, Deserialize)]
pub struct CheckPermissionRequest {
    pub permission: String,
    pub user_id: Option<Uuid>,
    pub resource_owner_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct CheckPermissionResponse {
    pub user_id: Uuid,
    pub permission: String,
    pub has_permission: bool,
}

#[derive(Debug, Deserialize)]
pub struct MyRolesQuery {
    pub user_id: Option<Uuid>,
    #[serde(default)]
    pub include_permissions: bool,
}
