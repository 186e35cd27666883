//! Document persistence and the merge mutation transaction.
//!
//! Documents are soft-deleted only; every read path filters on
//! `deleted_at IS NULL`. The content update and its conversation turn are
//! written inside one SQL transaction so a reader can never observe one
//! without the other.

use chrono::Utc;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::merge::MergeResult;
use crate::models::{ConversationTurn, Document};

fn row_to_document(row: &sqlx::sqlite::SqliteRow) -> Document {
    Document {
        id: row.get("id"),
        title: row.get("title"),
        content: row.get("content"),
        created_by: row.get("created_by"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        deleted_at: row.get("deleted_at"),
    }
}

fn row_to_turn(row: &sqlx::sqlite::SqliteRow) -> ConversationTurn {
    ConversationTurn {
        id: row.get("id"),
        document_id: row.get("document_id"),
        instruction: row.get("instruction"),
        explanation: row.get("explanation"),
        created_at: row.get("created_at"),
    }
}

pub async fn create_document(
    pool: &SqlitePool,
    title: &str,
    content: &str,
    created_by: Option<&str>,
) -> Result<Document> {
    if title.trim().is_empty() {
        return Err(EngineError::ValidationFailed("title must not be empty".into()));
    }

    let id = Uuid::new_v4().to_string();
    let now = Utc::now().timestamp();

    sqlx::query(
        r#"
        INSERT INTO documents (id, title, content, created_by, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(title)
    .bind(content)
    .bind(created_by)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    get_document(pool, &id).await
}

/// Fetch a live document. Soft-deleted rows are invisible here.
pub async fn get_document(pool: &SqlitePool, id: &str) -> Result<Document> {
    let row = sqlx::query(
        "SELECT id, title, content, created_by, created_at, updated_at, deleted_at
         FROM documents WHERE id = ? AND deleted_at IS NULL",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => Ok(row_to_document(&row)),
        None => Err(EngineError::NotFound(format!("document: {id}"))),
    }
}

/// All live documents, most recently updated first.
pub async fn list_documents(pool: &SqlitePool) -> Result<Vec<Document>> {
    let rows = sqlx::query(
        "SELECT id, title, content, created_by, created_at, updated_at, deleted_at
         FROM documents WHERE deleted_at IS NULL ORDER BY updated_at DESC",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(row_to_document).collect())
}

/// Soft-delete: sets `deleted_at`, hiding the document from all reads.
/// The row and its conversation turns stay in place.
pub async fn soft_delete_document(pool: &SqlitePool, id: &str) -> Result<()> {
    let result = sqlx::query(
        "UPDATE documents SET deleted_at = ? WHERE id = ? AND deleted_at IS NULL",
    )
    .bind(Utc::now().timestamp())
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(EngineError::NotFound(format!("document: {id}")));
    }
    Ok(())
}

/// The most recent `limit` conversation turns, returned in chronological
/// order for use as rolling merge context. `rowid` breaks same-second
/// ties in insertion order.
pub async fn recent_turns(
    pool: &SqlitePool,
    document_id: &str,
    limit: i64,
) -> Result<Vec<ConversationTurn>> {
    let rows = sqlx::query(
        "SELECT id, document_id, instruction, explanation, created_at
         FROM conversation_turns WHERE document_id = ?
         ORDER BY created_at DESC, rowid DESC LIMIT ?",
    )
    .bind(document_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    let mut turns: Vec<ConversationTurn> = rows.iter().map(row_to_turn).collect();
    turns.reverse();
    Ok(turns)
}

pub async fn list_turns(pool: &SqlitePool, document_id: &str) -> Result<Vec<ConversationTurn>> {
    let rows = sqlx::query(
        "SELECT id, document_id, instruction, explanation, created_at
         FROM conversation_turns WHERE document_id = ?
         ORDER BY created_at ASC, rowid ASC",
    )
    .bind(document_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(row_to_turn).collect())
}

/// Apply a merge result to a document, atomically.
///
/// Overwrites the content, bumps `updated_at`, and appends the
/// conversation turn in one immediate-mode transaction, so concurrent
/// writers queue on the busy timeout instead of failing on a lock
/// upgrade. Fails with `NotFound` for a missing or soft-deleted document
/// and with `ValidationFailed` (touching nothing) when the merge produced
/// no usable content.
pub async fn apply_merge(
    pool: &SqlitePool,
    document_id: &str,
    instruction: &str,
    merge_result: &MergeResult,
) -> Result<Document> {
    let mut conn = pool.acquire().await?;

    sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;
    match apply_merge_locked(&mut conn, document_id, instruction, merge_result).await {
        Ok(()) => {
            sqlx::query("COMMIT").execute(&mut *conn).await?;
        }
        Err(e) => {
            let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
            return Err(e);
        }
    }
    drop(conn);

    get_document(pool, document_id).await
}

async fn apply_merge_locked(
    conn: &mut sqlx::SqliteConnection,
    document_id: &str,
    instruction: &str,
    merge_result: &MergeResult,
) -> Result<()> {
    let exists = sqlx::query("SELECT id FROM documents WHERE id = ? AND deleted_at IS NULL")
        .bind(document_id)
        .fetch_optional(&mut *conn)
        .await?;
    if exists.is_none() {
        return Err(EngineError::NotFound(format!("document: {document_id}")));
    }

    if merge_result.content.is_empty() {
        return Err(EngineError::ValidationFailed(
            "generation produced no content; the document was left unchanged".into(),
        ));
    }

    let now = Utc::now().timestamp();

    sqlx::query("UPDATE documents SET content = ?, updated_at = ? WHERE id = ?")
        .bind(&merge_result.content)
        .bind(now)
        .bind(document_id)
        .execute(&mut *conn)
        .await?;

    sqlx::query(
        r#"
        INSERT INTO conversation_turns (id, document_id, instruction, explanation, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(document_id)
    .bind(instruction)
    .bind(&merge_result.explanation)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(())
}
