use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::Date;
use uuid::Uuid;

/// Body of `POST /tracks` and `PUT /tracks/:id`.
#[derive(Debug, Deserialize)]
pub struct TrackInput {
    pub title: Option<String>,
    pub album_title: Option<String>,
    pub genre: Option<String>,
    pub mood_tags: Option<Value>,
    pub instrumentation: Option<Value>,
    pub tempo_bpm: Option<i32>,
    pub key_signature: Option<String>,
    pub duration_seconds: Option<i32>,
    pub isrc: Option<String>,
    pub iswc: Option<String>,
    #[serde(default)]
    pub explicit_content: bool,
    pub language: Option<String>,
    pub release_date: Option<Date>,
    pub original_release_date: Option<Date>,
    pub copyright_holder: Option<String>,
    pub ai_tags: Option<Value>,
}

impl TrackInput {
    /// Trimmed, non-empty title.
    pub fn title(&self) -> Option<String> {
        self.title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(String::from)
    }
}

#[derive(Debug, Deserialize)]
pub struct TrackListQuery {
    pub artist_id: Option<Uuid>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    20
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub track_id: Uuid,
    pub key: String,
    pub content_type: String,
    pub size: usize,
}
