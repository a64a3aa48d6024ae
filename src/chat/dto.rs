use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub const DEFAULT_ROLE: &str = "general";

#[derive(Debug, Default, Deserialize)]
pub struct CreateChatSessionRequest {
    pub role: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PostMessageRequest {
    pub message: String,
    pub response: String,
    pub role: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    50
}

/// `context` has to be sent, but may be `null`. A missing key stays `None`,
/// an explicit `null` becomes `Some(Value::Null)`.
#[derive(Debug, Deserialize)]
pub struct ContextUpdate {
    #[serde(default, deserialize_with = "present")]
    pub context: Option<Value>,
}

fn present<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(d).map(Some)
}

#[derive(Debug, Serialize)]
pub struct ContextResponse {
    pub session_id: Uuid,
    pub context: Option<Value>,
}

/// Trimmed role or the default one.
pub fn role_or_default(role: Option<&str>) -> String {
    role.map(str::trim)
        .filter(|r| !r.is_empty())
        .unwrap_or(DEFAULT_ROLE)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_distinguishes_missing_from_null() {
        let missing: ContextUpdate = serde_json::from_str("{}").unwrap();
        assert!(missing.context.is_none());

        let null: ContextUpdate = serde_json::from_str(r#"{"context": null}"#).unwrap();
        assert_eq!(null.context, Some(Value::Null));

        let set: ContextUpdate = serde_json::from_str(r#"{"context": {"mood": "calm"}}"#).unwrap();
        assert_eq!(set.context.unwrap()["mood"], "calm");
    }

    #[test]
    fn blank_role_falls_back() {
        assert_eq!(role_or_default(None), "general");
        assert_eq!(role_or_default(Some("  ")), "general");
        assert_eq!(role_or_default(Some(" artist ")), "artist");
    }

    #[test]
    fn message_limit_defaults_to_fifty() {
        let q: MessagesQuery = serde_json::from_str("{}").unwrap();
        assert_eq!(q.limit, 50);
    }
}
