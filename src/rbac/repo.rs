use sqlx::{postgres::PgExecutor, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::{
    AssignedRole, HeldPermission, Permission, Role, RoleListItem, RolePermission, UserRole,
};

const ROLE_COLUMNS: &str = "r.id, r.name, r.display_name, r.description, r.level, \
     r.parent_role_id, r.is_system, r.is_active, r.created_at, r.updated_at";

/// Roles currently held by a user, plus every ancestor reachable through
/// `parent_role_id`.
const EFFECTIVE_ROLES_CTE: &str = r#"
    WITH RECURSIVE effective_roles AS (
        SELECT r.id, r.parent_role_id
        FROM user_roles ur
        JOIN roles r ON r.id = ur.role_id
        WHERE ur.user_id = $1
          AND ur.is_active
          AND r.is_active
          AND (ur.expires_at IS NULL OR ur.expires_at > now())
        UNION
        SELECT p.id, p.parent_role_id
        FROM roles p
        JOIN effective_roles e ON p.id = e.parent_role_id
        WHERE p.is_active
    )
"#;

pub async fn find_role_by_name(db: &PgPool, name: &str) -> anyhow::Result<Option<Role>> {
    let role = sqlx::query_as::<_, Role>(&format!(
        "SELECT {ROLE_COLUMNS} FROM roles r WHERE r.name = $1"
    ))
    .bind(name)
    .fetch_optional(db)
    .await?;
    Ok(role)
}

pub async fn find_role_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<Role>> {
    let role = sqlx::query_as::<_, Role>(&format!(
        "SELECT {ROLE_COLUMNS} FROM roles r WHERE r.id = $1"
    ))
    .bind(id)
    .fetch_optional(db)
    .await?;
    Ok(role)
}

pub async fn list_roles(db: &PgPool) -> anyhow::Result<Vec<RoleListItem>> {
    let rows = sqlx::query_as::<_, RoleListItem>(&format!(
        r#"
        SELECT {ROLE_COLUMNS},
               COUNT(ur.id) FILTER (
                   WHERE ur.is_active AND (ur.expires_at IS NULL OR ur.expires_at > now())
               ) AS user_count
        FROM roles r
        LEFT JOIN user_roles ur ON ur.role_id = r.id
        GROUP BY r.id
        ORDER BY r.level ASC, r.name ASC
        "#
    ))
    .fetch_all(db)
    .await?;
    Ok(rows)
}

/// `None` when the name is taken.
pub async fn insert_role(
    db: &PgPool,
    name: &str,
    display_name: &str,
    description: Option<&str>,
    level: i32,
    parent_role_id: Option<Uuid>,
) -> anyhow::Result<Option<Role>> {
    let role = sqlx::query_as::<_, Role>(
        r#"
        INSERT INTO roles (name, display_name, description, level, parent_role_id)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (name) DO NOTHING
        RETURNING id, name, display_name, description, level, parent_role_id,
                  is_system, is_active, created_at, updated_at
        "#,
    )
    .bind(name)
    .bind(display_name)
    .bind(description)
    .bind(level)
    .bind(parent_role_id)
    .fetch_optional(db)
    .await?;
    Ok(role)
}

pub async fn list_permissions(db: &PgPool) -> anyhow::Result<Vec<Permission>> {
    let rows = sqlx::query_as::<_, Permission>(
        r#"
        SELECT id, name, display_name, resource, action, scope, is_system, created_at
        FROM permissions
        ORDER BY resource, action, name
        "#,
    )
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn permission_exists(db: &PgPool, id: Uuid) -> anyhow::Result<bool> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM permissions WHERE id = $1)")
        .bind(id)
        .fetch_one(db)
        .await?;
    Ok(exists)
}

pub async fn role_permissions(db: &PgPool, role_id: Uuid) -> anyhow::Result<Vec<RolePermission>> {
    let rows = sqlx::query_as::<_, RolePermission>(
        r#"
        SELECT p.id AS permission_id, p.name, p.resource, p.action, p.scope, rp.is_granted
        FROM role_permissions rp
        JOIN permissions p ON p.id = rp.permission_id
        WHERE rp.role_id = $1
        ORDER BY p.resource, p.name
        "#,
    )
    .bind(role_id)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn upsert_role_permission(
    db: &PgPool,
    role_id: Uuid,
    permission_id: Uuid,
    is_granted: bool,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO role_permissions (role_id, permission_id, is_granted)
        VALUES ($1, $2, $3)
        ON CONFLICT (role_id, permission_id) DO UPDATE SET is_granted = EXCLUDED.is_granted
        "#,
    )
    .bind(role_id)
    .bind(permission_id)
    .bind(is_granted)
    .execute(db)
    .await?;
    Ok(())
}

pub async fn find_user_role<'e, E: PgExecutor<'e>>(
    ex: E,
    user_id: Uuid,
    role_id: Uuid,
) -> anyhow::Result<Option<UserRole>> {
    let row = sqlx::query_as::<_, UserRole>(
        r#"
        SELECT id, user_id, role_id, assigned_by, is_active, expires_at, assigned_at
        FROM user_roles
        WHERE user_id = $1 AND role_id = $2
        "#,
    )
    .bind(user_id)
    .bind(role_id)
    .fetch_optional(ex)
    .await?;
    Ok(row)
}

/// Inserts the assignment or reactivates an existing row for the pair.
pub async fn upsert_user_role(
    db: &PgPool,
    user_id: Uuid,
    role_id: Uuid,
    assigned_by: Option<Uuid>,
    expires_at: Option<OffsetDateTime>,
) -> anyhow::Result<UserRole> {
    let row = sqlx::query_as::<_, UserRole>(
        r#"
        INSERT INTO user_roles (user_id, role_id, assigned_by, expires_at)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (user_id, role_id) DO UPDATE
            SET is_active = TRUE,
                assigned_by = EXCLUDED.assigned_by,
                expires_at = EXCLUDED.expires_at,
                assigned_at = now(),
                updated_at = now()
        RETURNING id, user_id, role_id, assigned_by, is_active, expires_at, assigned_at
        "#,
    )
    .bind(user_id)
    .bind(role_id)
    .bind(assigned_by)
    .bind(expires_at)
    .fetch_one(db)
    .await?;
    Ok(row)
}

pub async fn deactivate_user_role(db: &PgPool, id: Uuid) -> anyhow::Result<()> {
    sqlx::query("UPDATE user_roles SET is_active = FALSE, updated_at = now() WHERE id = $1")
        .bind(id)
        .execute(db)
        .await?;
    Ok(())
}

pub async fn deactivate_expired_user_roles(db: &PgPool) -> anyhow::Result<u64> {
    let res = sqlx::query(
        r#"
        UPDATE user_roles SET is_active = FALSE, updated_at = now()
        WHERE is_active AND expires_at IS NOT NULL AND expires_at <= now()
        "#,
    )
    .execute(db)
    .await?;
    Ok(res.rows_affected())
}

/// Scopes under which the user holds `permission`, through any effective role.
pub async fn granted_scopes(db: &PgPool, user_id: Uuid, permission: &str) -> anyhow::Result<Vec<String>> {
    let scopes = sqlx::query_scalar::<_, String>(&format!(
        r#"
        {EFFECTIVE_ROLES_CTE}
        SELECT DISTINCT p.scope
        FROM effective_roles e
        JOIN role_permissions rp ON rp.role_id = e.id AND rp.is_granted
        JOIN permissions p ON p.id = rp.permission_id
        WHERE p.name = $2
        "#
    ))
    .bind(user_id)
    .bind(permission)
    .fetch_all(db)
    .await?;
    Ok(scopes)
}

pub async fn held_permissions(db: &PgPool, user_id: Uuid) -> anyhow::Result<Vec<HeldPermission>> {
    let rows = sqlx::query_as::<_, HeldPermission>(&format!(
        r#"
        {EFFECTIVE_ROLES_CTE}
        SELECT DISTINCT p.name, p.resource, p.action, p.scope
        FROM effective_roles e
        JOIN role_permissions rp ON rp.role_id = e.id AND rp.is_granted
        JOIN permissions p ON p.id = rp.permission_id
        ORDER BY p.resource, p.name
        "#
    ))
    .bind(user_id)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn assigned_roles(db: &PgPool, user_id: Uuid) -> anyhow::Result<Vec<AssignedRole>> {
    let rows = sqlx::query_as::<_, AssignedRole>(
        r#"
        SELECT r.id, r.name, r.display_name, r.level, ur.assigned_at, ur.expires_at
        FROM user_roles ur
        JOIN roles r ON r.id = ur.role_id
        WHERE ur.user_id = $1
          AND ur.is_active
          AND r.is_active
          AND (ur.expires_at IS NULL OR ur.expires_at > now())
        ORDER BY r.level ASC
        "#,
    )
    .bind(user_id)
    .fetch_all(db)
    .await?;
    Ok(rows)
}
