//! Subject persistence: the entities whose recordings and comments get
//! summarized into versioned artifacts.
//!
//! Recording rows never hold audio bytes. The storage backend owns those;
//! the row stores the opaque key, declared size, content type, and the
//! derived transcript once transcription has run.

use chrono::Utc;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::models::{Comment, Recording, Subject};

fn row_to_subject(row: &sqlx::sqlite::SqliteRow) -> Subject {
    Subject {
        id: row.get("id"),
        title: row.get("title"),
        description: row.get("description"),
        created_by: row.get("created_by"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        deleted_at: row.get("deleted_at"),
    }
}

fn row_to_recording(row: &sqlx::sqlite::SqliteRow) -> Recording {
    Recording {
        id: row.get("id"),
        subject_id: row.get("subject_id"),
        storage_key: row.get("storage_key"),
        original_name: row.get("original_name"),
        file_size: row.get("file_size"),
        content_type: row.get("content_type"),
        transcript: row.get("transcript"),
        created_at: row.get("created_at"),
    }
}

fn row_to_comment(row: &sqlx::sqlite::SqliteRow) -> Comment {
    Comment {
        id: row.get("id"),
        subject_id: row.get("subject_id"),
        author: row.get("author"),
        content: row.get("content"),
        created_at: row.get("created_at"),
    }
}

pub async fn create_subject(
    pool: &SqlitePool,
    title: &str,
    description: Option<&str>,
    created_by: Option<&str>,
) -> Result<Subject> {
    if title.trim().is_empty() {
        return Err(EngineError::ValidationFailed("title must not be empty".into()));
    }

    let id = Uuid::new_v4().to_string();
    let now = Utc::now().timestamp();

    sqlx::query(
        r#"
        INSERT INTO subjects (id, title, description, created_by, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(title)
    .bind(description)
    .bind(created_by)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    get_subject(pool, &id).await
}

/// Fetch a live subject. Soft-deleted rows are invisible here.
pub async fn get_subject(pool: &SqlitePool, id: &str) -> Result<Subject> {
    let row = sqlx::query(
        "SELECT id, title, description, created_by, created_at, updated_at, deleted_at
         FROM subjects WHERE id = ? AND deleted_at IS NULL",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => Ok(row_to_subject(&row)),
        None => Err(EngineError::NotFound(format!("subject: {id}"))),
    }
}

pub async fn list_subjects(pool: &SqlitePool) -> Result<Vec<Subject>> {
    let rows = sqlx::query(
        "SELECT id, title, description, created_by, created_at, updated_at, deleted_at
         FROM subjects WHERE deleted_at IS NULL ORDER BY updated_at DESC",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(row_to_subject).collect())
}

pub async fn soft_delete_subject(pool: &SqlitePool, id: &str) -> Result<()> {
    let result =
        sqlx::query("UPDATE subjects SET deleted_at = ? WHERE id = ? AND deleted_at IS NULL")
            .bind(Utc::now().timestamp())
            .bind(id)
            .execute(pool)
            .await?;

    if result.rows_affected() == 0 {
        return Err(EngineError::NotFound(format!("subject: {id}")));
    }
    Ok(())
}

/// Register an uploaded recording against a subject. The bytes must
/// already be in storage under `storage_key`; if this insert fails the
/// stored object is orphaned (a documented residual risk, see DESIGN.md).
pub async fn add_recording(
    pool: &SqlitePool,
    subject_id: &str,
    storage_key: &str,
    original_name: Option<&str>,
    file_size: i64,
    content_type: &str,
) -> Result<Recording> {
    get_subject(pool, subject_id).await?;

    let id = Uuid::new_v4().to_string();
    let now = Utc::now().timestamp();

    sqlx::query(
        r#"
        INSERT INTO recordings (id, subject_id, storage_key, original_name, file_size, content_type, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(subject_id)
    .bind(storage_key)
    .bind(original_name)
    .bind(file_size)
    .bind(content_type)
    .bind(now)
    .execute(pool)
    .await?;

    get_recording(pool, &id).await
}

pub async fn get_recording(pool: &SqlitePool, id: &str) -> Result<Recording> {
    let row = sqlx::query(
        "SELECT id, subject_id, storage_key, original_name, file_size, content_type, transcript, created_at
         FROM recordings WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => Ok(row_to_recording(&row)),
        None => Err(EngineError::NotFound(format!("recording: {id}"))),
    }
}

/// All recordings for a subject, oldest first.
pub async fn list_recordings(pool: &SqlitePool, subject_id: &str) -> Result<Vec<Recording>> {
    let rows = sqlx::query(
        "SELECT id, subject_id, storage_key, original_name, file_size, content_type, transcript, created_at
         FROM recordings WHERE subject_id = ? ORDER BY created_at ASC, rowid ASC",
    )
    .bind(subject_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(row_to_recording).collect())
}

/// Persist the derived transcript text on a recording row.
pub async fn set_transcript(pool: &SqlitePool, recording_id: &str, transcript: &str) -> Result<()> {
    let result = sqlx::query("UPDATE recordings SET transcript = ? WHERE id = ?")
        .bind(transcript)
        .bind(recording_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(EngineError::NotFound(format!("recording: {recording_id}")));
    }
    Ok(())
}

pub async fn add_comment(
    pool: &SqlitePool,
    subject_id: &str,
    author: Option<&str>,
    content: &str,
) -> Result<Comment> {
    if content.trim().is_empty() {
        return Err(EngineError::ValidationFailed(
            "comment content must not be empty".into(),
        ));
    }
    get_subject(pool, subject_id).await?;

    let id = Uuid::new_v4().to_string();

    sqlx::query(
        r#"
        INSERT INTO comments (id, subject_id, author, content, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(subject_id)
    .bind(author)
    .bind(content)
    .bind(Utc::now().timestamp())
    .execute(pool)
    .await?;

    let row = sqlx::query(
        "SELECT id, subject_id, author, content, created_at FROM comments WHERE id = ?",
    )
    .bind(&id)
    .fetch_one(pool)
    .await?;

    Ok(row_to_comment(&row))
}

/// All comments for a subject, oldest first.
pub async fn list_comments(pool: &SqlitePool, subject_id: &str) -> Result<Vec<Comment>> {
    let rows = sqlx::query(
        "SELECT id, subject_id, author, content, created_at
         FROM comments WHERE subject_id = ? ORDER BY created_at ASC, rowid ASC",
    )
    .bind(subject_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(row_to_comment).collect())
}
