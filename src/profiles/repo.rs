use serde::{de::DeserializeOwned, Serialize};
use sqlx::{
    postgres::{PgArguments, PgRow},
    query::QueryAs,
    FromRow, PgPool, Postgres,
};
use uuid::Uuid;

/// One profile side table: its row type, writable columns and the single
/// required field.
pub trait ProfileInput: DeserializeOwned + Send + 'static {
    type Record: for<'r> FromRow<'r, PgRow> + Serialize + Send + Unpin;
    const TABLE: &'static str;
    /// Writable columns, in the order `bind` pushes them.
    const COLUMNS: &'static [&'static str];
    const REQUIRED: &'static str;

    fn required_value(&self) -> Option<&str>;

    fn bind<'q>(
        self,
        q: QueryAs<'q, Postgres, Self::Record, PgArguments>,
    ) -> QueryAs<'q, Postgres, Self::Record, PgArguments>;
}

pub(crate) fn insert_sql(table: &str, columns: &[&str]) -> String {
    let placeholders: Vec<String> = (2..columns.len() + 2).map(|i| format!("${i}")).collect();
    format!(
        "INSERT INTO {table} (user_id, {}) VALUES ($1, {}) ON CONFLICT (user_id) DO NOTHING RETURNING *",
        columns.join(", "),
        placeholders.join(", ")
    )
}

pub(crate) fn update_sql(table: &str, columns: &[&str]) -> String {
    let sets: Vec<String> = columns
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{c} = ${}", i + 2))
        .collect();
    format!(
        "UPDATE {table} SET {}, updated_at = now() WHERE user_id = $1 RETURNING *",
        sets.join(", ")
    )
}

/// `None` when the user already has a profile of this kind.
pub async fn create<P: ProfileInput>(db: &PgPool, user_id: Uuid, input: P) -> anyhow::Result<Option<P::Record>> {
    let sql = insert_sql(P::TABLE, P::COLUMNS);
    let q = sqlx::query_as::<_, P::Record>(&sql).bind(user_id);
    Ok(input.bind(q).fetch_optional(db).await?)
}

pub async fn find<P: ProfileInput>(db: &PgPool, user_id: Uuid) -> anyhow::Result<Option<P::Record>> {
    let sql = format!("SELECT * FROM {} WHERE user_id = $1", P::TABLE);
    let row = sqlx::query_as::<_, P::Record>(&sql)
        .bind(user_id)
        .fetch_optional(db)
        .await?;
    Ok(row)
}

pub async fn update<P: ProfileInput>(db: &PgPool, user_id: Uuid, input: P) -> anyhow::Result<Option<P::Record>> {
    let sql = update_sql(P::TABLE, P::COLUMNS);
    let q = sqlx::query_as::<_, P::Record>(&sql).bind(user_id);
    Ok(input.bind(q).fetch_optional(db).await?)
}

pub async fn delete<P: ProfileInput>(db: &PgPool, user_id: Uuid) -> anyhow::Result<bool> {
    let sql = format!("DELETE FROM {} WHERE user_id = $1", P::TABLE);
    let res = sqlx::query(&sql).bind(user_id).execute(db).await?;
    Ok(res.rows_affected() > 0)
}

/// Artist profile id for a user, used for track ownership.
pub async fn artist_id_for_user(db: &PgPool, user_id: Uuid) -> anyhow::Result<Option<Uuid>> {
    let id = sqlx::query_scalar::<_, Uuid>("SELECT id FROM artist_profiles WHERE user_id = $1")
        .bind(user_id)
        .fetch_optional(db)
        .await?;
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_sql_numbers_placeholders_after_user_id() {
        assert_eq!(
            insert_sql("fan_profiles", &["display_name", "music_preferences"]),
            "INSERT INTO fan_profiles (user_id, display_name, music_preferences) VALUES ($1, $2, $3) \
             ON CONFLICT (user_id) DO NOTHING RETURNING *"
        );
    }

    #[test]
    fn update_sql_sets_every_column() {
        assert_eq!(
            update_sql("licensor_profiles", &["company_name", "industry"]),
            "UPDATE licensor_profiles SET company_name = $2, industry = $3, updated_at = now() \
             WHERE user_id = $1 RETURNING *"
        );
    }
}
