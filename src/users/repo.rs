use sqlx::{postgres::PgExecutor, PgPool};
use uuid::Uuid;

use super::repo_types::{NewUser, User};

const USER_COLUMNS: &str = "id, email, password_hash, profile_type, username, first_name, \
     last_name, email_verified_at, is_active, created_at, updated_at";

impl User {
    /// Find a user by (already normalised) email.
    pub async fn find_by_email(db: &PgPool, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    /// Insert a user; `None` when the email (or username) is already taken.
    pub async fn create(db: &PgPool, new: &NewUser<'_>) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (email, password_hash, profile_type, username, first_name, last_name)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT DO NOTHING
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(new.email)
        .bind(new.password_hash)
        .bind(new.profile_type.as_str())
        .bind(new.username)
        .bind(new.first_name)
        .bind(new.last_name)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    pub async fn update_password<'e, E: PgExecutor<'e>>(
        ex: E,
        id: Uuid,
        password_hash: &str,
    ) -> anyhow::Result<()> {
        sqlx::query("UPDATE users SET password_hash = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(ex)
            .await?;
        Ok(())
    }

    pub async fn mark_email_verified<'e, E: PgExecutor<'e>>(ex: E, id: Uuid) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET email_verified_at = COALESCE(email_verified_at, now()), updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(ex)
        .await?;
        Ok(())
    }
}
