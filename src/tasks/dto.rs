use serde::Deserialize;
use time::OffsetDateTime;
use uuid::Uuid;

pub const PRIORITIES: &[&str] = &["low", "medium", "high"];
pub const STATUSES: &[&str] = &["pending", "in_progress", "completed", "cancelled"];
pub const DEFAULT_PRIORITY: &str = "medium";
pub const DEFAULT_CATEGORY: &str = "general";

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<String>,
    pub category: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub due_date: Option<OffsetDateTime>,
    pub assigned_to: Option<Uuid>,
    pub project_id: Option<Uuid>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Partial update: absent fields keep their stored value.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateTaskRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<String>,
    pub category: Option<String>,
    pub status: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub due_date: Option<OffsetDateTime>,
    pub assigned_to: Option<Uuid>,
    pub project_id: Option<Uuid>,
    pub tags: Option<Vec<String>>,
}

impl UpdateTaskRequest {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.priority.is_none()
            && self.category.is_none()
            && self.status.is_none()
            && self.due_date.is_none()
            && self.assigned_to.is_none()
            && self.project_id.is_none()
            && self.tags.is_none()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct TaskListQuery {
    pub status: Option<String>,
    pub priority: Option<String>,
    pub category: Option<String>,
    pub project_id: Option<Uuid>,
    pub assigned_to: Option<Uuid>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

/// `Err` carries the message for a 400.
pub fn check_choice(field: &str, value: Option<&str>, allowed: &[&str]) -> Result<(), String> {
    match value {
        Some(v) if !allowed.contains(&v) => Err(format!("{field} must be one of: {}", allowed.join(", "))),
        _ => Ok(()),
    }
}

/// Trimmed, non-empty title.
pub fn clean_title(title: Option<&str>) -> Option<String> {
    title.map(str::trim).filter(|t| !t.is_empty()).map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn choices_are_checked_only_when_given() {
        assert!(check_choice("priority", None, PRIORITIES).is_ok());
        assert!(check_choice("priority", Some("high"), PRIORITIES).is_ok());
        let err = check_choice("status", Some("done"), STATUSES).unwrap_err();
        assert_eq!(err, "status must be one of: pending, in_progress, completed, cancelled");
    }

    #[test]
    fn empty_update_detected() {
        let empty: UpdateTaskRequest = serde_json::from_str("{}").unwrap();
        assert!(empty.is_empty());
        let some: UpdateTaskRequest = serde_json::from_str(r#"{"tags": []}"#).unwrap();
        assert!(!some.is_empty());
    }

    #[test]
    fn due_date_parses_rfc3339() {
        let req: CreateTaskRequest =
            serde_json::from_str(r#"{"title": "Mix", "due_date": "2026-03-01T12:00:00Z"}"#).unwrap();
        assert_eq!(req.due_date.unwrap().unix_timestamp(), 1_772_366_400);
        assert!(req.tags.is_empty());
    }

    #[test]
    fn blank_titles_rejected() {
        assert_eq!(clean_title(Some("  Master  ")).as_deref(), Some("Master"));
        assert!(clean_title(Some("   ")).is_none());
        assert!(clean_title(None).is_none());
    }
}
