use anyhow::Context;
use sqlx::PgPool;
use uuid::Uuid;

use super::{dto::TrackInput, repo_types::Track};

const TRACK_COLUMNS: &str = "id, artist_id, title, album_title, genre, mood_tags, instrumentation, \
     tempo_bpm, key_signature, duration_seconds, isrc, iswc, explicit_content, language, \
     release_date, original_release_date, copyright_holder, ai_tags, file_key, cover_art_key, \
     created_at, updated_at";

pub async fn insert(db: &PgPool, artist_id: Uuid, title: &str, input: TrackInput) -> anyhow::Result<Track> {
    let track = sqlx::query_as::<_, Track>(&format!(
        r#"
        INSERT INTO tracks (artist_id, title, album_title, genre, mood_tags, instrumentation,
                            tempo_bpm, key_signature, duration_seconds, isrc, iswc,
                            explicit_content, language, release_date, original_release_date,
                            copyright_holder, ai_tags)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
        RETURNING {TRACK_COLUMNS}
        "#
    ))
    .bind(artist_id)
    .bind(title)
    .bind(input.album_title)
    .bind(input.genre)
    .bind(input.mood_tags)
    .bind(input.instrumentation)
    .bind(input.tempo_bpm)
    .bind(input.key_signature)
    .bind(input.duration_seconds)
    .bind(input.isrc)
    .bind(input.iswc)
    .bind(input.explicit_content)
    .bind(input.language)
    .bind(input.release_date)
    .bind(input.original_release_date)
    .bind(input.copyright_holder)
    .bind(input.ai_tags)
    .fetch_one(db)
    .await
    .context("insert track")?;
    Ok(track)
}

pub async fn find(db: &PgPool, id: Uuid) -> anyhow::Result<Option<Track>> {
    let track = sqlx::query_as::<_, Track>(&format!("SELECT {TRACK_COLUMNS} FROM tracks WHERE id = $1"))
        .bind(id)
        .fetch_optional(db)
        .await?;
    Ok(track)
}

/// User that owns the artist profile behind a track.
pub async fn owner_user_id(db: &PgPool, track_id: Uuid) -> anyhow::Result<Option<Uuid>> {
    let owner = sqlx::query_scalar::<_, Uuid>(
        r#"
        SELECT ap.user_id
          FROM tracks t
          JOIN artist_profiles ap ON ap.id = t.artist_id
         WHERE t.id = $1
        "#,
    )
    .bind(track_id)
    .fetch_optional(db)
    .await?;
    Ok(owner)
}

pub async fn list_by_artist(db: &PgPool, artist_id: Uuid, limit: i64, offset: i64) -> anyhow::Result<Vec<Track>> {
    let rows = sqlx::query_as::<_, Track>(&format!(
        r#"
        SELECT {TRACK_COLUMNS}
          FROM tracks
         WHERE artist_id = $1
         ORDER BY created_at DESC
         LIMIT $2 OFFSET $3
        "#
    ))
    .bind(artist_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(db)
    .await
    .context("list tracks by artist")?;
    Ok(rows)
}

pub async fn update(db: &PgPool, id: Uuid, title: &str, input: TrackInput) -> anyhow::Result<Option<Track>> {
    let track = sqlx::query_as::<_, Track>(&format!(
        r#"
        UPDATE tracks
           SET title = $2, album_title = $3, genre = $4, mood_tags = $5, instrumentation = $6,
               tempo_bpm = $7, key_signature = $8, duration_seconds = $9, isrc = $10, iswc = $11,
               explicit_content = $12, language = $13, release_date = $14,
               original_release_date = $15, copyright_holder = $16, ai_tags = $17,
               updated_at = now()
         WHERE id = $1
        RETURNING {TRACK_COLUMNS}
        "#
    ))
    .bind(id)
    .bind(title)
    .bind(input.album_title)
    .bind(input.genre)
    .bind(input.mood_tags)
    .bind(input.instrumentation)
    .bind(input.tempo_bpm)
    .bind(input.key_signature)
    .bind(input.duration_seconds)
    .bind(input.isrc)
    .bind(input.iswc)
    .bind(input.explicit_content)
    .bind(input.language)
    .bind(input.release_date)
    .bind(input.original_release_date)
    .bind(input.copyright_holder)
    .bind(input.ai_tags)
    .fetch_optional(db)
    .await
    .context("update track")?;
    Ok(track)
}

pub async fn delete(db: &PgPool, id: Uuid) -> anyhow::Result<bool> {
    let res = sqlx::query("DELETE FROM tracks WHERE id = $1")
        .bind(id)
        .execute(db)
        .await?;
    Ok(res.rows_affected() > 0)
}

pub async fn set_file_key(db: &PgPool, id: Uuid, key: &str) -> anyhow::Result<()> {
    sqlx::query("UPDATE tracks SET file_key = $2, updated_at = now() WHERE id = $1")
        .bind(id)
        .bind(key)
        .execute(db)
        .await?;
    Ok(())
}

pub async fn set_cover_art_key(db: &PgPool, id: Uuid, key: &str) -> anyhow::Result<()> {
    sqlx::query("UPDATE tracks SET cover_art_key = $2, updated_at = now() WHERE id = $1")
        .bind(id)
        .bind(key)
        .execute(db)
        .await?;
    Ok(())
}
