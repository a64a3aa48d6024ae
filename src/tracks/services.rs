use anyhow::Context;
use bytes::Bytes;
use tracing::{info, warn};
use uuid::Uuid;

use super::{repo, repo_types::Track};
use crate::{
    error::{ApiError, ApiResult},
    rbac,
    state::AppState,
};

const PRESIGN_TTL_SECS: u64 = 10 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    Audio,
    Cover,
}

impl UploadKind {
    /// File extension for an accepted content type; `None` means unsupported.
    pub fn ext_for(self, content_type: &str) -> Option<&'static str> {
        match (self, content_type) {
            (Self::Audio, "audio/mpeg" | "audio/mp3") => Some("mp3"),
            (Self::Audio, "audio/wav" | "audio/x-wav" | "audio/wave") => Some("wav"),
            (Self::Audio, "audio/flac" | "audio/x-flac") => Some("flac"),
            (Self::Audio, "audio/ogg") => Some("ogg"),
            (Self::Audio, "audio/aac") => Some("aac"),
            (Self::Audio, "audio/mp4" | "audio/x-m4a") => Some("m4a"),
            (Self::Cover, "image/jpeg" | "image/jpg") => Some("jpg"),
            (Self::Cover, "image/png") => Some("png"),
            (Self::Cover, "image/webp") => Some("webp"),
            _ => None,
        }
    }

    fn stem(self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Cover => "cover",
        }
    }
}

pub fn object_key(track: &Track, kind: UploadKind, ext: &str) -> String {
    format!(
        "tracks/{}/{}/{}-{}.{}",
        track.artist_id,
        track.id,
        kind.stem(),
        Uuid::new_v4(),
        ext
    )
}

/// Loads a track and checks that `user_id` may apply `permission` to it.
pub async fn load_for_write(
    state: &AppState,
    user_id: Uuid,
    track_id: Uuid,
    permission: &str,
) -> ApiResult<Track> {
    let track = repo::find(&state.db, track_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Track not found"))?;
    let owner = repo::owner_user_id(&state.db, track_id).await?;
    rbac::require(&state.db, user_id, permission, owner).await?;
    Ok(track)
}

/// Stores an uploaded file and points the track at it. The previous
/// object, if any, is removed afterwards.
pub async fn attach_upload(
    state: &AppState,
    track: &Track,
    kind: UploadKind,
    body: Bytes,
    content_type: &str,
) -> ApiResult<String> {
    let ext = kind.ext_for(content_type).ok_or_else(|| {
        ApiError::UnsupportedMediaType(format!("Unsupported content type: {content_type}"))
    })?;
    let key = object_key(track, kind, ext);
    state
        .storage
        .put_object(&key, body, content_type)
        .await
        .with_context(|| format!("put_object {}", key))?;

    let previous = match kind {
        UploadKind::Audio => {
            repo::set_file_key(&state.db, track.id, &key).await?;
            track.file_key.clone()
        }
        UploadKind::Cover => {
            repo::set_cover_art_key(&state.db, track.id, &key).await?;
            track.cover_art_key.clone()
        }
    };
    if let Some(old) = previous {
        if let Err(e) = state.storage.delete_object(&old).await {
            warn!(error = %e, key = %old, "stale object not removed");
        }
    }
    info!(track_id = %track.id, key = %key, "track file stored");
    Ok(key)
}

pub async fn presign_audio(state: &AppState, track: &Track) -> ApiResult<String> {
    let key = track
        .file_key
        .as_deref()
        .ok_or_else(|| ApiError::not_found("Track has no audio"))?;
    let url = state
        .storage
        .presign_get(key, PRESIGN_TTL_SECS)
        .await
        .with_context(|| format!("presign url for {}", key))?;
    Ok(url)
}

/// Removes stored objects of a deleted track; failures are only logged.
pub async fn remove_objects(state: &AppState, track: &Track) {
    for key in [&track.file_key, &track.cover_art_key].into_iter().flatten() {
        if let Err(e) = state.storage.delete_object(key).await {
            warn!(error = %e, key = %key, "track object not removed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStorage, StorageClient};
    use std::sync::Arc;
    use time::OffsetDateTime;

    fn track() -> Track {
        Track {
            id: Uuid::new_v4(),
            artist_id: Uuid::new_v4(),
            title: "Night Drive".into(),
            album_title: None,
            genre: Some("synthwave".into()),
            mood_tags: None,
            instrumentation: None,
            tempo_bpm: Some(98),
            key_signature: None,
            duration_seconds: Some(215),
            isrc: None,
            iswc: None,
            explicit_content: false,
            language: None,
            release_date: None,
            original_release_date: None,
            copyright_holder: None,
            ai_tags: None,
            file_key: None,
            cover_art_key: None,
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn accepted_content_types() {
        assert_eq!(UploadKind::Audio.ext_for("audio/mpeg"), Some("mp3"));
        assert_eq!(UploadKind::Audio.ext_for("audio/x-wav"), Some("wav"));
        assert_eq!(UploadKind::Audio.ext_for("image/png"), None);
        assert_eq!(UploadKind::Cover.ext_for("image/png"), Some("png"));
        assert_eq!(UploadKind::Cover.ext_for("audio/mpeg"), None);
        assert_eq!(UploadKind::Cover.ext_for("application/octet-stream"), None);
    }

    #[test]
    fn object_key_layout() {
        let t = track();
        let key = object_key(&t, UploadKind::Audio, "mp3");
        assert!(key.starts_with(&format!("tracks/{}/{}/audio-", t.artist_id, t.id)));
        assert!(key.ends_with(".mp3"));
    }

    #[tokio::test]
    async fn unsupported_type_rejected_before_storage() {
        let state = AppState::fake();
        let err = attach_upload(&state, &track(), UploadKind::Cover, Bytes::from_static(b"x"), "text/plain")
            .await
            .unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[tokio::test]
    async fn presign_requires_audio() {
        let state = AppState::fake();
        let err = presign_audio(&state, &track()).await.unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::NOT_FOUND);

        let store = Arc::new(MemoryStorage::default());
        let mut t = track();
        let key = object_key(&t, UploadKind::Audio, "mp3");
        store.put_object(&key, Bytes::from_static(b"ID3"), "audio/mpeg").await.unwrap();
        t.file_key = Some(key.clone());
        let mut state = AppState::fake();
        state.storage = store as Arc<dyn StorageClient>;
        let url = presign_audio(&state, &t).await.unwrap();
        assert!(url.contains(&key));
    }
}
