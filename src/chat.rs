//! Chat orchestration: one natural-language instruction against one
//! document, end to end.
//!
//! Loads the live document, gathers rolling history, runs the merge, and
//! applies the result atomically. A degraded merge (backend down or
//! unconfigured) still flows through the mutation so the renderable
//! failure notice and its conversation turn land in the document like any
//! other edit.

use sqlx::SqlitePool;

use crate::documents;
use crate::error::{EngineError, Result};
use crate::genai::GenerativeBackend;
use crate::merge;
use crate::models::Document;

/// How many prior turns feed the merge prompt.
const HISTORY_WINDOW: i64 = 5;

/// Outcome of one chat turn.
#[derive(Debug)]
pub struct ChatOutcome {
    pub document: Document,
    pub action: &'static str,
    pub explanation: String,
    /// The model the backend actually used, after allow-list substitution.
    pub model_used: String,
}

/// Run one chat turn against a document.
pub async fn chat(
    pool: &SqlitePool,
    backend: &dyn GenerativeBackend,
    document_id: &str,
    instruction: &str,
    preferred_model: Option<&str>,
) -> Result<ChatOutcome> {
    if instruction.trim().is_empty() {
        return Err(EngineError::ValidationFailed(
            "instruction must not be empty".into(),
        ));
    }

    let document = documents::get_document(pool, document_id).await?;
    let history = documents::recent_turns(pool, document_id, HISTORY_WINDOW).await?;

    let result = merge::merge(
        backend,
        &document.content,
        instruction,
        &history,
        preferred_model,
    )
    .await;

    let document = documents::apply_merge(pool, document_id, instruction, &result).await?;

    Ok(ChatOutcome {
        document,
        action: result.action.as_str(),
        explanation: result.explanation,
        model_used: backend.resolve_model(preferred_model),
    })
}
