//! Versioned schema migrations.
//!
//! Migrations are an ordered list applied exactly once each, tracked in a
//! `schema_migrations` bookkeeping table. Checked at `sdoc init` (and by
//! library callers before first use), never re-probed per request.

use anyhow::Result;
use sqlx::SqlitePool;

/// Ordered schema migrations. Append only; never edit an applied entry.
const MIGRATIONS: &[(i64, &str)] = &[
    (
        1,
        r#"
        CREATE TABLE documents (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            content TEXT NOT NULL DEFAULT '',
            created_by TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            deleted_at INTEGER
        )
        "#,
    ),
    (
        2,
        r#"
        CREATE TABLE conversation_turns (
            id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL,
            instruction TEXT NOT NULL,
            explanation TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            FOREIGN KEY (document_id) REFERENCES documents(id)
        )
        "#,
    ),
    (
        3,
        r#"
        CREATE TABLE subjects (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            description TEXT,
            created_by TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            deleted_at INTEGER
        )
        "#,
    ),
    (
        4,
        r#"
        CREATE TABLE recordings (
            id TEXT PRIMARY KEY,
            subject_id TEXT NOT NULL,
            storage_key TEXT NOT NULL UNIQUE,
            original_name TEXT,
            file_size INTEGER NOT NULL DEFAULT 0,
            content_type TEXT NOT NULL DEFAULT 'audio/webm',
            transcript TEXT,
            created_at INTEGER NOT NULL,
            FOREIGN KEY (subject_id) REFERENCES subjects(id)
        )
        "#,
    ),
    (
        5,
        r#"
        CREATE TABLE comments (
            id TEXT PRIMARY KEY,
            subject_id TEXT NOT NULL,
            author TEXT,
            content TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            FOREIGN KEY (subject_id) REFERENCES subjects(id)
        )
        "#,
    ),
    (
        6,
        r#"
        CREATE TABLE summary_versions (
            id TEXT PRIMARY KEY,
            subject_id TEXT NOT NULL,
            version INTEGER NOT NULL,
            content TEXT NOT NULL,
            transcripts_count INTEGER NOT NULL DEFAULT 0,
            comments_count INTEGER NOT NULL DEFAULT 0,
            model_used TEXT NOT NULL DEFAULT '',
            created_by TEXT,
            created_at INTEGER NOT NULL,
            is_current INTEGER NOT NULL DEFAULT 1,
            UNIQUE(subject_id, version),
            FOREIGN KEY (subject_id) REFERENCES subjects(id)
        )
        "#,
    ),
    (
        7,
        "CREATE INDEX idx_turns_document_id ON conversation_turns(document_id, created_at)",
    ),
    (
        8,
        "CREATE INDEX idx_recordings_subject_id ON recordings(subject_id, created_at)",
    ),
    (
        9,
        "CREATE INDEX idx_comments_subject_id ON comments(subject_id, created_at)",
    ),
    (
        10,
        "CREATE INDEX idx_summaries_subject_id ON summary_versions(subject_id, version DESC)",
    ),
    (
        11,
        "CREATE INDEX idx_summaries_current ON summary_versions(subject_id, is_current)",
    ),
];

/// Apply all pending migrations. Idempotent — safe to run repeatedly.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    let applied: i64 =
        sqlx::query_scalar("SELECT COALESCE(MAX(version), 0) FROM schema_migrations")
            .fetch_one(pool)
            .await?;

    for (version, sql) in MIGRATIONS {
        if *version <= applied {
            continue;
        }
        let mut tx = pool.begin().await?;
        sqlx::query(sql).execute(&mut *tx).await?;
        sqlx::query("INSERT INTO schema_migrations (version, applied_at) VALUES (?, ?)")
            .bind(version)
            .bind(chrono::Utc::now().timestamp())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
    }

    Ok(())
}

/// Highest applied migration version, 0 if the table is missing or empty.
pub async fn current_version(pool: &SqlitePool) -> Result<i64> {
    let version: i64 =
        sqlx::query_scalar("SELECT COALESCE(MAX(version), 0) FROM schema_migrations")
            .fetch_one(pool)
            .await
            .unwrap_or(0);
    Ok(version)
}
