use anyhow::Context;
use serde_json::json;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use super::{
    dto::{TaskListQuery, UpdateTaskRequest},
    repo_types::Task,
};

const TASK_COLUMNS: &str = "id, user_id, title, description, priority, category, status, due_date, \
     completed_at, assigned_to, project_id, tags, created_at, updated_at";

pub struct NewTask<'a> {
    pub title: &'a str,
    pub description: Option<&'a str>,
    pub priority: &'a str,
    pub category: &'a str,
    pub due_date: Option<OffsetDateTime>,
    pub assigned_to: Option<Uuid>,
    pub project_id: Option<Uuid>,
    pub tags: &'a [String],
}

pub async fn insert(db: &PgPool, user_id: Uuid, task: NewTask<'_>) -> anyhow::Result<Task> {
    let row = sqlx::query_as::<_, Task>(&format!(
        r#"
        INSERT INTO tasks (user_id, title, description, priority, category, due_date,
                           assigned_to, project_id, tags)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING {TASK_COLUMNS}
        "#
    ))
    .bind(user_id)
    .bind(task.title)
    .bind(task.description)
    .bind(task.priority)
    .bind(task.category)
    .bind(task.due_date)
    .bind(task.assigned_to)
    .bind(task.project_id)
    .bind(json!(task.tags))
    .fetch_one(db)
    .await
    .context("insert task")?;
    Ok(row)
}

pub async fn find_owned(db: &PgPool, id: Uuid, user_id: Uuid) -> anyhow::Result<Option<Task>> {
    let row = sqlx::query_as::<_, Task>(&format!(
        "SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1 AND user_id = $2"
    ))
    .bind(id)
    .bind(user_id)
    .fetch_optional(db)
    .await?;
    Ok(row)
}

/// High priority first, newest first within a priority.
pub async fn list(db: &PgPool, user_id: Uuid, q: &TaskListQuery, limit: i64) -> anyhow::Result<Vec<Task>> {
    let rows = sqlx::query_as::<_, Task>(&format!(
        r#"
        SELECT {TASK_COLUMNS}
          FROM tasks
         WHERE user_id = $1
           AND ($2::text IS NULL OR status = $2)
           AND ($3::text IS NULL OR priority = $3)
           AND ($4::text IS NULL OR category = $4)
           AND ($5::uuid IS NULL OR project_id = $5)
           AND ($6::uuid IS NULL OR assigned_to = $6)
         ORDER BY CASE priority WHEN 'high' THEN 1 WHEN 'medium' THEN 2 ELSE 3 END,
                  created_at DESC
         LIMIT $7 OFFSET $8
        "#
    ))
    .bind(user_id)
    .bind(q.status.as_deref())
    .bind(q.priority.as_deref())
    .bind(q.category.as_deref())
    .bind(q.project_id)
    .bind(q.assigned_to)
    .bind(limit)
    .bind(q.offset.max(0))
    .fetch_all(db)
    .await?;
    Ok(rows)
}

/// Applies the given fields. Moving to `completed` stamps `completed_at` once,
/// moving to any other status clears it.
pub async fn update(
    db: &PgPool,
    id: Uuid,
    user_id: Uuid,
    changes: UpdateTaskRequest,
) -> anyhow::Result<Option<Task>> {
    let row = sqlx::query_as::<_, Task>(&format!(
        r#"
        UPDATE tasks
           SET title        = COALESCE($3, title),
               description  = COALESCE($4, description),
               priority     = COALESCE($5, priority),
               category     = COALESCE($6, category),
               status       = COALESCE($7, status),
               due_date     = COALESCE($8, due_date),
               assigned_to  = COALESCE($9, assigned_to),
               project_id   = COALESCE($10, project_id),
               tags         = COALESCE($11, tags),
               completed_at = CASE
                                WHEN $7::text IS NULL THEN completed_at
                                WHEN $7::text = 'completed' THEN COALESCE(completed_at, now())
                                ELSE NULL
                              END,
               updated_at   = now()
         WHERE id = $1 AND user_id = $2
        RETURNING {TASK_COLUMNS}
        "#
    ))
    .bind(id)
    .bind(user_id)
    .bind(changes.title)
    .bind(changes.description)
    .bind(changes.priority)
    .bind(changes.category)
    .bind(changes.status)
    .bind(changes.due_date)
    .bind(changes.assigned_to)
    .bind(changes.project_id)
    .bind(changes.tags.map(|t| json!(t)))
    .fetch_optional(db)
    .await
    .context("update task")?;
    Ok(row)
}

pub async fn delete(db: &PgPool, id: Uuid, user_id: Uuid) -> anyhow::Result<bool> {
    let res = sqlx::query("DELETE FROM tasks WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user_id)
        .execute(db)
        .await?;
    Ok(res.rows_affected() == 1)
}
