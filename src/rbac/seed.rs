use sqlx::PgPool;
use tracing::info;

/// (name, display name, description, level)
pub const SYSTEM_ROLES: &[(&str, &str, &str, i32)] = &[
    ("super_admin", "Super Administrator", "Full system access", 0),
    ("admin", "Administrator", "Platform administration", 1),
    ("moderator", "Moderator", "Content moderation", 2),
    ("premium_user", "Premium User", "Paid tier with extended features", 3),
    ("artist", "Artist", "Music creator", 4),
    ("fan", "Fan", "Music listener", 4),
    ("licensor", "Licensor", "Licenses music for commercial use", 4),
    ("service_provider", "Service Provider", "Offers services to artists", 4),
];

/// (name, display name, resource, action, scope)
pub const SYSTEM_PERMISSIONS: &[(&str, &str, &str, &str, &str)] = &[
    ("manage_users", "Manage Users", "users", "MANAGE", "all"),
    ("create_user", "Create User", "users", "CREATE", "all"),
    ("read_users", "Read Users", "users", "READ", "all"),
    ("update_user", "Update User", "users", "UPDATE", "own"),
    ("delete_user", "Delete User", "users", "DELETE", "all"),
    ("create_profile", "Create Profile", "profiles", "CREATE", "own"),
    ("read_profile", "Read Profile", "profiles", "READ", "public"),
    ("update_profile", "Update Profile", "profiles", "UPDATE", "own"),
    ("delete_profile", "Delete Profile", "profiles", "DELETE", "own"),
    ("create_track", "Create Track", "tracks", "CREATE", "own"),
    ("read_tracks", "Read Tracks", "tracks", "READ", "public"),
    ("update_track", "Update Track", "tracks", "UPDATE", "own"),
    ("delete_track", "Delete Track", "tracks", "DELETE", "own"),
    ("download_track", "Download Track", "tracks", "DOWNLOAD", "public"),
    ("upload_track", "Upload Track", "tracks", "UPLOAD", "own"),
    ("moderate_content", "Moderate Content", "content", "MODERATE", "all"),
    ("report_content", "Report Content", "content", "REPORT", "public"),
    ("access_admin", "Access Admin", "admin", "READ", "all"),
    ("manage_roles", "Manage Roles", "roles", "MANAGE", "all"),
    ("comment", "Comment", "comments", "CREATE", "public"),
    ("rate", "Rate", "ratings", "CREATE", "public"),
];

const PROFILE_BASICS: &[&str] = &["create_profile", "read_profile", "update_profile", "delete_profile"];

/// Default grants per role; `None` means every system permission.
pub fn default_grants(role: &str) -> Option<Vec<&'static str>> {
    let extra: &[&'static str] = match role {
        "super_admin" => return None,
        "admin" => &[
            "manage_users", "read_users", "update_user", "create_track", "read_tracks",
            "update_track", "delete_track", "download_track", "upload_track",
            "moderate_content", "report_content", "access_admin", "comment", "rate",
        ],
        "moderator" => {
            return Some(vec![
                "read_users", "read_profile", "read_tracks", "moderate_content",
                "report_content", "comment", "rate",
            ])
        }
        "premium_user" => &[
            "create_track", "read_tracks", "update_track", "delete_track",
            "download_track", "upload_track", "comment", "rate",
        ],
        "artist" => &[
            "create_track", "read_tracks", "update_track", "delete_track", "upload_track",
            "comment", "rate",
        ],
        "fan" => &["read_tracks", "comment", "rate", "report_content"],
        "licensor" => &["read_tracks", "download_track", "comment", "rate"],
        "service_provider" => &["read_tracks", "comment", "rate"],
        _ => &[],
    };
    Some(PROFILE_BASICS.iter().chain(extra.iter()).copied().collect())
}

/// Idempotently installs the system roles, permissions and default grants.
pub async fn seed(db: &PgPool) -> anyhow::Result<()> {
    let mut tx = db.begin().await?;

    for &(name, display_name, description, level) in SYSTEM_ROLES {
        sqlx::query(
            r#"
            INSERT INTO roles (name, display_name, description, level, is_system)
            VALUES ($1, $2, $3, $4, TRUE)
            ON CONFLICT (name) DO NOTHING
            "#,
        )
        .bind(name)
        .bind(display_name)
        .bind(description)
        .bind(level)
        .execute(&mut *tx)
        .await?;
    }

    for &(name, display_name, resource, action, scope) in SYSTEM_PERMISSIONS {
        sqlx::query(
            r#"
            INSERT INTO permissions (name, display_name, resource, action, scope, is_system)
            VALUES ($1, $2, $3, $4, $5, TRUE)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(name)
        .bind(display_name)
        .bind(resource)
        .bind(action)
        .bind(scope)
        .execute(&mut *tx)
        .await?;
    }

    for &(role, ..) in SYSTEM_ROLES {
        let names: Vec<String> = match default_grants(role) {
            Some(list) => list.into_iter().map(String::from).collect(),
            None => SYSTEM_PERMISSIONS.iter().map(|p| p.0.to_string()).collect(),
        };
        sqlx::query(
            r#"
            INSERT INTO role_permissions (role_id, permission_id, is_granted)
            SELECT r.id, p.id, TRUE
            FROM roles r, permissions p
            WHERE r.name = $1 AND p.name = ANY($2)
            ON CONFLICT (role_id, permission_id) DO NOTHING
            "#,
        )
        .bind(role)
        .bind(names)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    info!(
        roles = SYSTEM_ROLES.len(),
        permissions = SYSTEM_PERMISSIONS.len(),
        "rbac seed applied"
    );
    Ok(())
}
