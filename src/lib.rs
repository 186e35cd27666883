//! # SmartDoc
//!
//! An AI-assisted document synthesis and versioning engine.
//!
//! SmartDoc keeps two kinds of artifacts in one SQLite database: rich-text
//! documents edited through natural-language chat instructions, and
//! subjects whose recordings and comments get synthesized into immutable,
//! numbered summary versions. Audio bytes live behind a storage
//! abstraction (local filesystem or S3 with presigned URLs); text
//! generation and speech-to-text are delegated to hosted backends.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌─────────────┐   ┌──────────┐
//! │ Instructions│──▶│ Merge/Chat  │──▶│  SQLite   │
//! │ & Comments │   │  + GenAI    │   │ docs+vers │
//! └────────────┘   └─────────────┘   └────┬─────┘
//!                                         │
//! ┌────────────┐   ┌─────────────┐        ▼
//! │ Audio files │──▶│ Storage      │   ┌──────────┐
//! │            │   │ local / S3   │   │   CLI    │
//! └────────────┘   └─────────────┘   │  (sdoc)  │
//!                                    └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! sdoc init                                 # create database
//! sdoc doc new "Meeting notes"              # create a document
//! sdoc chat <doc-id> "add a summary table"  # edit via instruction
//! sdoc subject new "Q3 planning"            # create a subject
//! sdoc upload <subject-id> call.webm        # store a recording
//! sdoc transcribe <recording-id>            # speech-to-text
//! sdoc summarize <subject-id>               # commit a summary version
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`documents`] | Document persistence and atomic merge application |
//! | [`chat`] | Chat turn orchestration |
//! | [`merge`] | Instruction classification, reply parsing, markup normalization |
//! | [`subjects`] | Subjects, recordings, and comments |
//! | [`summary`] | Versioned summary artifacts |
//! | [`storage`] | Storage backend abstraction |
//! | [`genai`] | Generative text backend |
//! | [`transcribe`] | Speech-to-text |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod chat;
pub mod config;
pub mod db;
pub mod documents;
pub mod error;
pub mod genai;
pub mod merge;
pub mod migrate;
pub mod models;
pub mod storage;
pub mod storage_local;
pub mod storage_s3;
pub mod subjects;
pub mod summary;
pub mod transcribe;
