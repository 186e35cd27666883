//! Core data models for the synthesis and versioning engine.
//!
//! Documents are mutable rich-text bodies edited through natural-language
//! instructions; subjects accumulate recordings and comments that get
//! summarized into immutable, numbered summary versions. Timestamps are
//! Unix epoch seconds; formatting happens at the output edge.

use serde::Serialize;

/// A persisted rich-text document, editable via chat instructions.
///
/// `deleted_at` set means the document is invisible to every read path;
/// rows are never physically removed.
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub content: String,
    pub created_by: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub deleted_at: Option<i64>,
}

/// One chat exchange against a document: the user's raw instruction and
/// the system's human-readable explanation (not the raw model output).
/// Append-only.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationTurn {
    pub id: String,
    pub document_id: String,
    pub instruction: String,
    pub explanation: String,
    pub created_at: i64,
}

/// An entity that accumulates raw inputs (recordings, comments) over time
/// and is summarized into versioned artifacts.
#[derive(Debug, Clone, Serialize)]
pub struct Subject {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub created_by: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub deleted_at: Option<i64>,
}

/// A stored audio recording attached to a subject. The storage backend
/// owns the bytes; this row only holds the opaque key, declared size, and
/// the derived transcript once transcription has run.
#[derive(Debug, Clone, Serialize)]
pub struct Recording {
    pub id: String,
    pub subject_id: String,
    pub storage_key: String,
    pub original_name: Option<String>,
    pub file_size: i64,
    pub content_type: String,
    pub transcript: Option<String>,
    pub created_at: i64,
}

/// A free-text comment on a subject.
#[derive(Debug, Clone, Serialize)]
pub struct Comment {
    pub id: String,
    pub subject_id: String,
    pub author: Option<String>,
    pub content: String,
    pub created_at: i64,
}

/// One immutable, numbered snapshot of generated analysis over a subject.
///
/// Versions are 1-based per subject and never reused. At most one row per
/// subject carries `is_current = true`; committing a new version flips the
/// previous one in the same transaction.
#[derive(Debug, Clone, Serialize)]
pub struct SummaryVersion {
    pub id: String,
    pub subject_id: String,
    pub version: i64,
    pub content: String,
    pub transcripts_count: i64,
    pub comments_count: i64,
    pub model_used: String,
    pub created_by: Option<String>,
    pub created_at: i64,
    pub is_current: bool,
}

/// Format an epoch-seconds timestamp as UTC ISO8601.
pub fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ts.to_string())
}
