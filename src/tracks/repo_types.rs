use serde::Serialize;
use sqlx::FromRow;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Track {
    pub id: Uuid,
    pub artist_id: Uuid,
    pub title: String,
    pub album_title: Option<String>,
    pub genre: Option<String>,
    pub mood_tags: Option<serde_json::Value>,
    pub instrumentation: Option<serde_json::Value>,
    pub tempo_bpm: Option<i32>,
    pub key_signature: Option<String>,
    pub duration_seconds: Option<i32>,
    pub isrc: Option<String>,
    pub iswc: Option<String>,
    pub explicit_content: bool,
    pub language: Option<String>,
    pub release_date: Option<Date>,
    pub original_release_date: Option<Date>,
    pub copyright_holder: Option<String>,
    pub ai_tags: Option<serde_json::Value>,
    pub file_key: Option<String>,
    pub cover_art_key: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}
