//! ChartQA Annotate - Human Annotation Library
//!
//! Serves chart question-answering examples to annotators one at a time:
//! - Record store with JSON-file and SQLite backends
//! - Next-pending selection, answer / missing-information submission
//! - Question and option edits with label re-derivation
//! - Per-task export (all or completed) and ZIP of completed records
//! - Bulk ingestion with chart image upload to object storage
//!
//! # Example
//!
//! ```ignore
//! use chartqa_annotate::{AnnotationService, Config, ImageResolver};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let store = chartqa_annotate::store::open(&config).await?;
//!     let service = AnnotationService::new(store, ImageResolver::new(&config.storage), config.aliases);
//!     if let Some(example) = service.next_pending("bar-charts", None).await? {
//!         service.submit("bar-charts", &example.example_id, false, Some("42")).await?;
//!     }
//!     Ok(())
//! }
//! ```

// Core modules
pub mod types;
pub mod error;
pub mod aliases;
pub mod options;
pub mod loader;
pub mod store;
pub mod annotation;
pub mod images;

// Application modules
pub mod config;
pub mod ingest;
pub mod server;
pub mod cli;

// Re-export commonly used types for convenience
pub use annotation::{selection_survives, AnnotationService, Submission};
pub use config::Config;
pub use error::{AnnotateError, AnnotateResult};
pub use images::ImageResolver;
pub use store::{JsonFileStore, RecordStore, SqliteRecordStore};
pub use types::{AnswerOption, ExampleRecord, ExampleView, TaskStats};

pub use server::{build_router, start as start_server, ServerState};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
