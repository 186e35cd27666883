//! # SmartDoc CLI (`sdoc`)
//!
//! The `sdoc` binary is the primary interface for SmartDoc. It provides
//! commands for database initialization, document chat editing, subject
//! and recording management, transcription, and summary versioning.
//!
//! ## Usage
//!
//! ```bash
//! sdoc --config ./config/sdoc.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `sdoc init` | Create the SQLite database and run schema migrations |
//! | `sdoc doc new <title>` | Create a document |
//! | `sdoc doc list` | List live documents |
//! | `sdoc doc show <id>` | Print a document and optionally its history |
//! | `sdoc doc rm <id>` | Soft-delete a document |
//! | `sdoc chat <id> "<instruction>"` | Edit a document via natural language |
//! | `sdoc subject new <title>` | Create a subject |
//! | `sdoc subject list` | List live subjects |
//! | `sdoc subject rm <id>` | Soft-delete a subject |
//! | `sdoc comment <subject-id> "<text>"` | Comment on a subject |
//! | `sdoc upload <subject-id> <file>` | Store an audio recording |
//! | `sdoc transcribe <recording-id>` | Transcribe a stored recording |
//! | `sdoc summarize <subject-id>` | Generate and commit a summary version |
//! | `sdoc summaries <subject-id>` | List summary versions |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use smartdoc::models::{format_ts_iso, Document, Subject, SummaryVersion};
use smartdoc::storage::StorageBackend;
use smartdoc::{chat, config, db, documents, genai, migrate, storage, subjects, summary, transcribe};

/// SmartDoc CLI — an AI-assisted document synthesis and versioning engine.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/sdoc.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "sdoc",
    about = "SmartDoc — an AI-assisted document synthesis and versioning engine",
    version,
    long_about = "SmartDoc keeps rich-text documents edited through natural-language chat \
    instructions, plus subjects whose audio recordings and comments get synthesized into \
    immutable, numbered summary versions. Storage is local or S3; generation and \
    speech-to-text run against hosted backends."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/sdoc.toml`. Database, storage, generation,
    /// and speech-to-text settings are read from this file.
    #[arg(long, global = true, default_value = "./config/sdoc.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables. This
    /// command is idempotent — running it multiple times is safe.
    Init,

    /// Manage documents.
    Doc {
        #[command(subcommand)]
        action: DocAction,
    },

    /// Edit a document through a natural-language instruction.
    ///
    /// Classifies the instruction (append by default, replace or modify
    /// only when explicit), applies the merged content atomically, and
    /// records the exchange in the document's conversation history.
    Chat {
        /// Document UUID.
        id: String,
        /// The edit instruction, in any language.
        instruction: String,
        /// Preferred model. Silently replaced by the default if it is not
        /// on the configured allow-list.
        #[arg(long)]
        model: Option<String>,
    },

    /// Manage subjects.
    Subject {
        #[command(subcommand)]
        action: SubjectAction,
    },

    /// Add a comment to a subject.
    Comment {
        /// Subject UUID.
        subject_id: String,
        /// Comment text.
        content: String,
        /// Comment author.
        #[arg(long)]
        author: Option<String>,
    },

    /// Upload an audio recording for a subject.
    ///
    /// Stores the bytes through the configured storage backend (local
    /// filesystem, or S3 when AWS credentials are present) and registers
    /// the recording against the subject.
    Upload {
        /// Subject UUID.
        subject_id: String,
        /// Path to the audio file.
        file: PathBuf,
    },

    /// Transcribe a stored recording.
    ///
    /// Fetches the audio from storage, runs speech-to-text, and persists
    /// the transcript on the recording row.
    Transcribe {
        /// Recording UUID.
        id: String,
    },

    /// Generate and commit a new summary version for a subject.
    ///
    /// Synthesizes all transcripts and comments into a structured report
    /// and commits it as the next version, flipping the previous current
    /// one.
    Summarize {
        /// Subject UUID.
        subject_id: String,
        /// Preferred model. Silently replaced by the default if it is not
        /// on the configured allow-list.
        #[arg(long)]
        model: Option<String>,
        /// Attribution for the committed version.
        #[arg(long)]
        by: Option<String>,
    },

    /// List summary versions for a subject.
    Summaries {
        /// Subject UUID.
        subject_id: String,
        /// Print the full content of the current version instead of the
        /// version listing.
        #[arg(long)]
        current: bool,
    },
}

/// Document subcommands.
#[derive(Subcommand)]
enum DocAction {
    /// Create a document.
    New {
        /// Document title.
        title: String,
        /// Initial content (HTML). Empty by default.
        #[arg(long, default_value = "")]
        content: String,
        /// Attribution for the document.
        #[arg(long)]
        by: Option<String>,
    },
    /// List live documents, most recently updated first.
    List,
    /// Print a document's metadata and content.
    Show {
        /// Document UUID.
        id: String,
        /// Also print the conversation history.
        #[arg(long)]
        turns: bool,
    },
    /// Soft-delete a document. The row and its history stay in place but
    /// become invisible to every read path.
    Rm {
        /// Document UUID.
        id: String,
    },
}

/// Subject subcommands.
#[derive(Subcommand)]
enum SubjectAction {
    /// Create a subject.
    New {
        /// Subject title.
        title: String,
        /// Free-text description.
        #[arg(long)]
        description: Option<String>,
        /// Attribution for the subject.
        #[arg(long)]
        by: Option<String>,
    },
    /// List live subjects, most recently updated first.
    List,
    /// Show a subject with its recordings and comments.
    Show {
        /// Subject UUID.
        id: String,
    },
    /// Soft-delete a subject.
    Rm {
        /// Subject UUID.
        id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    let pool = db::connect(&cfg).await?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&pool).await?;
            println!("Database initialized successfully.");
        }
        Commands::Doc { action } => match action {
            DocAction::New { title, content, by } => {
                let doc =
                    documents::create_document(&pool, &title, &content, by.as_deref()).await?;
                println!("Created document {}", doc.id);
            }
            DocAction::List => {
                let docs = documents::list_documents(&pool).await?;
                if docs.is_empty() {
                    println!("No documents.");
                }
                for doc in docs {
                    print_document_line(&doc);
                }
            }
            DocAction::Show { id, turns } => {
                let doc = documents::get_document(&pool, &id).await?;
                print_document(&doc);
                if turns {
                    let history = documents::list_turns(&pool, &id).await?;
                    println!("\nConversation ({} turns):", history.len());
                    for turn in history {
                        println!("  [{}] {}", format_ts_iso(turn.created_at), turn.instruction);
                        println!("      -> {}", turn.explanation);
                    }
                }
            }
            DocAction::Rm { id } => {
                documents::soft_delete_document(&pool, &id).await?;
                println!("Deleted document {id}");
            }
        },
        Commands::Chat {
            id,
            instruction,
            model,
        } => {
            let backend = genai::GeminiBackend::from_env(&cfg.genai);
            let outcome =
                chat::chat(&pool, &backend, &id, &instruction, model.as_deref()).await?;
            println!("Action: {}", outcome.action);
            println!("Model: {}", outcome.model_used);
            println!("{}", outcome.explanation);
            println!("\n{}", outcome.document.content);
        }
        Commands::Subject { action } => match action {
            SubjectAction::New {
                title,
                description,
                by,
            } => {
                let subject = subjects::create_subject(
                    &pool,
                    &title,
                    description.as_deref(),
                    by.as_deref(),
                )
                .await?;
                println!("Created subject {}", subject.id);
            }
            SubjectAction::List => {
                let list = subjects::list_subjects(&pool).await?;
                if list.is_empty() {
                    println!("No subjects.");
                }
                for subject in list {
                    print_subject_line(&subject);
                }
            }
            SubjectAction::Show { id } => {
                let subject = subjects::get_subject(&pool, &id).await?;
                print_subject(&subject);

                let recordings = subjects::list_recordings(&pool, &id).await?;
                println!("\nRecordings ({}):", recordings.len());
                for rec in recordings {
                    let transcribed = if rec.transcript.is_some() {
                        "transcribed"
                    } else {
                        "not transcribed"
                    };
                    println!(
                        "  {}  {}  {} bytes  {}  [{}]",
                        rec.id,
                        rec.original_name.as_deref().unwrap_or("(unnamed)"),
                        rec.file_size,
                        rec.content_type,
                        transcribed
                    );
                }

                let comments = subjects::list_comments(&pool, &id).await?;
                println!("\nComments ({}):", comments.len());
                for comment in comments {
                    println!(
                        "  [{}] {}: {}",
                        format_ts_iso(comment.created_at),
                        comment.author.as_deref().unwrap_or("anonymous"),
                        comment.content
                    );
                }
            }
            SubjectAction::Rm { id } => {
                subjects::soft_delete_subject(&pool, &id).await?;
                println!("Deleted subject {id}");
            }
        },
        Commands::Comment {
            subject_id,
            content,
            author,
        } => {
            let comment =
                subjects::add_comment(&pool, &subject_id, author.as_deref(), &content).await?;
            println!("Added comment {}", comment.id);
        }
        Commands::Upload { subject_id, file } => {
            let backend = storage::create_backend(&cfg.storage)?;
            let bytes = std::fs::read(&file)?;
            let original_name = file
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("recording")
                .to_string();
            let key = storage::new_storage_key(&original_name);
            let content_type = storage::detect_audio_content_type(&key);

            let put = backend.put(&key, &bytes, &content_type).await?;
            let rec = subjects::add_recording(
                &pool,
                &subject_id,
                &key,
                Some(&original_name),
                put.size as i64,
                &content_type,
            )
            .await?;
            println!("Stored recording {} ({} backend)", rec.id, backend.name());
            println!("URL: {}", put.url);
        }
        Commands::Transcribe { id } => {
            let backend = storage::create_backend(&cfg.storage)?;
            let rec = subjects::get_recording(&pool, &id).await?;

            let local_path = std::env::temp_dir().join(&rec.storage_key);
            backend.get(&rec.storage_key, &local_path).await?;
            let result = transcribe::transcribe_file(&cfg.stt, &local_path).await;
            let _ = std::fs::remove_file(&local_path);
            let transcript = result?;

            subjects::set_transcript(&pool, &id, &transcript.text).await?;
            println!(
                "Transcribed recording {} ({}, p={:.2})",
                id, transcript.language_code, transcript.language_probability
            );
            println!("\n{}", transcript.text);
        }
        Commands::Summarize {
            subject_id,
            model,
            by,
        } => {
            let backend = genai::GeminiBackend::from_env(&cfg.genai);
            let version = summary::generate_summary(
                &pool,
                &backend,
                &subject_id,
                model.as_deref(),
                by.as_deref(),
            )
            .await?;
            println!(
                "Committed summary version {} for subject {} ({} transcripts, {} comments, model {})",
                version.version,
                subject_id,
                version.transcripts_count,
                version.comments_count,
                version.model_used
            );
        }
        Commands::Summaries {
            subject_id,
            current,
        } => {
            if current {
                match summary::current_summary(&pool, &subject_id).await? {
                    Some(version) => {
                        print_summary_header(&version);
                        println!("\n{}", version.content);
                    }
                    None => println!("No summary versions yet."),
                }
            } else {
                let versions = summary::list_summaries(&pool, &subject_id).await?;
                if versions.is_empty() {
                    println!("No summary versions yet.");
                }
                for version in versions {
                    print_summary_header(&version);
                }
            }
        }
    }

    Ok(())
}

fn print_document_line(doc: &Document) {
    println!(
        "{}  {}  (updated {})",
        doc.id,
        doc.title,
        format_ts_iso(doc.updated_at)
    );
}

fn print_document(doc: &Document) {
    println!("Document: {}", doc.id);
    println!("Title: {}", doc.title);
    if let Some(ref by) = doc.created_by {
        println!("Created by: {by}");
    }
    println!("Created: {}", format_ts_iso(doc.created_at));
    println!("Updated: {}", format_ts_iso(doc.updated_at));
    println!("\n{}", doc.content);
}

fn print_subject_line(subject: &Subject) {
    println!(
        "{}  {}  (updated {})",
        subject.id,
        subject.title,
        format_ts_iso(subject.updated_at)
    );
}

fn print_subject(subject: &Subject) {
    println!("Subject: {}", subject.id);
    println!("Title: {}", subject.title);
    if let Some(ref description) = subject.description {
        println!("Description: {description}");
    }
    if let Some(ref by) = subject.created_by {
        println!("Created by: {by}");
    }
    println!("Created: {}", format_ts_iso(subject.created_at));
}

fn print_summary_header(version: &SummaryVersion) {
    let marker = if version.is_current { " [current]" } else { "" };
    println!(
        "v{}{}  {}  model {}  ({} transcripts, {} comments)",
        version.version,
        marker,
        format_ts_iso(version.created_at),
        version.model_used,
        version.transcripts_count,
        version.comments_count
    );
}
