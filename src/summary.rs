//! Versioned summary artifacts over a subject's inputs.
//!
//! Each commit produces an immutable, numbered snapshot; exactly one row
//! per subject is flagged current. The flip-then-insert runs inside a
//! single immediate-mode transaction, so concurrent writers queue on the
//! connection's busy timeout rather than failing on a lock upgrade.
//! Version numbers are additionally guarded by a UNIQUE constraint, and a
//! bounded retry covers both a residual constraint collision and a busy
//! timeout that does expire, so two commits can never both claim the same
//! number or both stay current.
//!
//! Generation is always a fresh synthesis over the subject's transcripts
//! and comments; the add/modify/replace classification used for document
//! chat does not apply here.

use chrono::Utc;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::genai::GenerativeBackend;
use crate::merge;
use crate::models::{format_ts_iso, Subject, SummaryVersion};
use crate::subjects;

/// Attempts before giving up on write contention.
const COMMIT_RETRIES: u32 = 3;

fn row_to_summary(row: &sqlx::sqlite::SqliteRow) -> SummaryVersion {
    SummaryVersion {
        id: row.get("id"),
        subject_id: row.get("subject_id"),
        version: row.get("version"),
        content: row.get("content"),
        transcripts_count: row.get("transcripts_count"),
        comments_count: row.get("comments_count"),
        model_used: row.get("model_used"),
        created_by: row.get("created_by"),
        created_at: row.get("created_at"),
        is_current: row.get::<i64, _>("is_current") != 0,
    }
}

const SELECT_SUMMARY: &str = "SELECT id, subject_id, version, content, transcripts_count, \
     comments_count, model_used, created_by, created_at, is_current FROM summary_versions";

/// Commit a new summary version for a subject.
///
/// Computes the next version number, flips the previous current row, and
/// inserts the new row flagged current, all in one immediate-mode
/// transaction. The subject's `updated_at` is bumped in the same
/// transaction.
pub async fn commit_summary(
    pool: &SqlitePool,
    subject_id: &str,
    content: &str,
    transcripts_count: i64,
    comments_count: i64,
    model_used: &str,
    created_by: Option<&str>,
) -> Result<SummaryVersion> {
    if content.trim().is_empty() {
        return Err(EngineError::ValidationFailed(
            "summary content must not be empty".into(),
        ));
    }
    subjects::get_subject(pool, subject_id).await?;

    let mut last_err: Option<EngineError> = None;

    for _ in 0..COMMIT_RETRIES {
        match try_commit(
            pool,
            subject_id,
            content,
            transcripts_count,
            comments_count,
            model_used,
            created_by,
        )
        .await
        {
            Ok(version) => return Ok(version),
            Err(e) if is_commit_contention(&e) => {
                // Another writer held the lock past the busy timeout or
                // claimed this version number first; recompute and retry.
                last_err = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_err.unwrap_or_else(|| {
        EngineError::Storage("summary commit failed after retries".into())
    }))
}

async fn try_commit(
    pool: &SqlitePool,
    subject_id: &str,
    content: &str,
    transcripts_count: i64,
    comments_count: i64,
    model_used: &str,
    created_by: Option<&str>,
) -> Result<SummaryVersion> {
    let mut conn = pool.acquire().await?;

    // Take the write lock up front. A deferred BEGIN would fail with
    // SQLITE_BUSY on the read-to-write upgrade under contention instead
    // of waiting on the busy timeout.
    sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;
    let id = match commit_locked(
        &mut conn,
        subject_id,
        content,
        transcripts_count,
        comments_count,
        model_used,
        created_by,
    )
    .await
    {
        Ok(id) => {
            sqlx::query("COMMIT").execute(&mut *conn).await?;
            id
        }
        Err(e) => {
            let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
            return Err(e);
        }
    };
    drop(conn);

    let row = sqlx::query(&format!("{SELECT_SUMMARY} WHERE id = ?"))
        .bind(&id)
        .fetch_one(pool)
        .await?;
    Ok(row_to_summary(&row))
}

async fn commit_locked(
    conn: &mut sqlx::SqliteConnection,
    subject_id: &str,
    content: &str,
    transcripts_count: i64,
    comments_count: i64,
    model_used: &str,
    created_by: Option<&str>,
) -> Result<String> {
    let next_version: i64 = sqlx::query_scalar(
        "SELECT COALESCE(MAX(version), 0) + 1 FROM summary_versions WHERE subject_id = ?",
    )
    .bind(subject_id)
    .fetch_one(&mut *conn)
    .await?;

    // Flip before insert so the new row is the only current one.
    sqlx::query("UPDATE summary_versions SET is_current = 0 WHERE subject_id = ? AND is_current = 1")
        .bind(subject_id)
        .execute(&mut *conn)
        .await?;

    let id = Uuid::new_v4().to_string();
    let now = Utc::now().timestamp();

    sqlx::query(
        r#"
        INSERT INTO summary_versions
            (id, subject_id, version, content, transcripts_count, comments_count,
             model_used, created_by, created_at, is_current)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 1)
        "#,
    )
    .bind(&id)
    .bind(subject_id)
    .bind(next_version)
    .bind(content)
    .bind(transcripts_count)
    .bind(comments_count)
    .bind(model_used)
    .bind(created_by)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    sqlx::query("UPDATE subjects SET updated_at = ? WHERE id = ?")
        .bind(now)
        .bind(subject_id)
        .execute(&mut *conn)
        .await?;

    Ok(id)
}

/// Whether a commit failure is worth retrying: a unique-constraint hit on
/// the version number, or SQLITE_BUSY from a lock wait that outlived the
/// busy timeout.
fn is_commit_contention(e: &EngineError) -> bool {
    match e {
        EngineError::Database(sqlx::Error::Database(db_err)) => {
            db_err.is_unique_violation() || db_err.message().contains("database is locked")
        }
        _ => false,
    }
}

/// All versions for a subject, newest first.
pub async fn list_summaries(pool: &SqlitePool, subject_id: &str) -> Result<Vec<SummaryVersion>> {
    let rows = sqlx::query(&format!(
        "{SELECT_SUMMARY} WHERE subject_id = ? ORDER BY version DESC"
    ))
    .bind(subject_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(row_to_summary).collect())
}

/// The single current version, if any exist yet.
pub async fn current_summary(
    pool: &SqlitePool,
    subject_id: &str,
) -> Result<Option<SummaryVersion>> {
    let row = sqlx::query(&format!(
        "{SELECT_SUMMARY} WHERE subject_id = ? AND is_current = 1"
    ))
    .bind(subject_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.as_ref().map(row_to_summary))
}

/// Generate and commit a fresh summary over everything the subject has
/// accumulated so far.
///
/// Collects transcripts (chronological) and comments, sends one synthesis
/// request to the generative backend, normalizes the reply, and commits
/// it as the next version. There is no meaningful fallback body for an
/// artifact, so an unavailable backend surfaces as an explicit failure
/// and nothing is persisted.
pub async fn generate_summary(
    pool: &SqlitePool,
    backend: &dyn GenerativeBackend,
    subject_id: &str,
    preferred_model: Option<&str>,
    created_by: Option<&str>,
) -> Result<SummaryVersion> {
    let subject = subjects::get_subject(pool, subject_id).await?;

    if !backend.enabled() {
        return Err(EngineError::BackendUnavailable(
            "the generative backend is not configured; set GEMINI_API_KEY to generate summaries"
                .into(),
        ));
    }

    let recordings = subjects::list_recordings(pool, subject_id).await?;
    let transcripts: Vec<(i64, String)> = recordings
        .into_iter()
        .filter_map(|r| r.transcript.map(|t| (r.created_at, t)))
        .collect();
    let comments = subjects::list_comments(pool, subject_id).await?;

    let context = build_context(&subject, &transcripts, &comments);
    let prompt = format!("{}\n\n{}", SUMMARY_PROMPT, context);

    let raw = backend.generate(&prompt, preferred_model).await?;
    let parsed = merge::parse_reply(&raw);

    commit_summary(
        pool,
        subject_id,
        &parsed.content,
        transcripts.len() as i64,
        comments.len() as i64,
        &backend.resolve_model(preferred_model),
        created_by,
    )
    .await
}

const SUMMARY_PROMPT: &str = r#"Produce a structured report and analysis of the following subject. Include:

1. Executive summary of the main content
2. Key points and important information
3. Analysis and insights
4. Action items or next steps that were mentioned
5. Keywords and important terms
6. Recommendations for follow-up

Formatting rules:
- Produce valid HTML styled with Tailwind CSS classes. Never use Markdown markers such as **, *, # or leading dashes.
- Headings: <h2 class="text-xl font-bold mb-4">, bold: <strong class="font-bold">, lists: <ul class="list-disc"> with <li> items.

Reply with valid JSON only, no fences:
{
  "content": "the full report as HTML",
  "explanation": "one sentence describing the report"
}"#;

fn build_context(subject: &Subject, transcripts: &[(i64, String)], comments: &[crate::models::Comment]) -> String {
    let mut parts = Vec::new();

    parts.push(format!("Subject title: {}", subject.title));
    if let Some(ref description) = subject.description {
        parts.push(format!("Subject description: {}", description));
    }
    parts.push(format!("Created at: {}", format_ts_iso(subject.created_at)));
    parts.push(format!(
        "Created by: {}",
        subject.created_by.as_deref().unwrap_or("unknown")
    ));

    if !transcripts.is_empty() {
        parts.push("\n--- Transcripts from audio recordings ---".to_string());
        for (i, (created_at, text)) in transcripts.iter().enumerate() {
            parts.push(format!(
                "\nRecording {} ({}):\n{}",
                i + 1,
                format_ts_iso(*created_at),
                text
            ));
        }
    }

    if !comments.is_empty() {
        parts.push("\n--- Comments ---".to_string());
        for (i, comment) in comments.iter().enumerate() {
            parts.push(format!(
                "\nComment {} ({}) by {}:\n{}",
                i + 1,
                format_ts_iso(comment.created_at),
                comment.author.as_deref().unwrap_or("unknown"),
                comment.content
            ));
        }
    }

    parts.join("\n")
}
