//! Gmail Export
//!
//! Exports the messages of a Gmail account within a date range to local
//! per-message `.eml` files, with include/exclude filtering and idempotent
//! re-runs.
//!
//! # Overview
//!
//! - **Query**: date range and label filters become one Gmail search string
//! - **Listing**: cursor-based pagination exposed as a lazy stream of pages
//! - **Filtering**: include-then-exclude decisions on message headers and labels
//! - **MIME**: body selection and attachment extraction from the part tree
//! - **Export**: per-message state machine with per-page concurrency
//!
//! # Example Usage
//!
//! ```no_run
//! use gmail_export::{auth, client::ProductionGmailClient, config::Config};
//! use gmail_export::exporter::Exporter;
//! use gmail_export::storage::FsStorage;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml".as_ref()).await?;
//!
//!     let hub = auth::initialize_gmail_hub(
//!         "credentials.json".as_ref(),
//!         ".gmail-export/token.json".as_ref()
//!     ).await?;
//!     let client = ProductionGmailClient::new(
//!         hub,
//!         &config.api.user_id,
//!         config.api.page_size,
//!         config.api.max_concurrent_requests,
//!     );
//!
//!     let options = config.export_options(chrono::Utc::now().date_naive())?;
//!     let summary = Exporter::new(client, FsStorage, options)?.run().await?;
//!     println!("{}", summary.render());
//!
//!     Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`auth`] - OAuth2 authentication and Gmail API initialization
//! - [`client`] - Mail client trait and the Gmail-backed implementation
//! - [`query`] - Search query construction
//! - [`lister`] - Paginated message listing
//! - [`filter`] - Include/exclude filter engine
//! - [`mime`] - Part tree walking
//! - [`attachments`] - Attachment saving
//! - [`headers`] - Synthetic header folding
//! - [`paths`] - Destination path conventions
//! - [`storage`] - Filesystem access
//! - [`exporter`] - Run orchestration and summary
//! - [`cli`] - Command-line interface
//! - [`config`] - Configuration management
//! - [`error`] - Error types and result aliases
//! - [`models`] - Core data structures

pub mod attachments;
pub mod auth;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod exporter;
pub mod filter;
pub mod headers;
pub mod lister;
pub mod mime;
pub mod models;
pub mod paths;
pub mod query;
pub mod storage;

// Re-export commonly used types for convenience
pub use error::{ExportError, Result};

// Core data models
pub use models::{
    DateRange, ExtractionResult, MessageFilter, MessageOutcome, MessageSummary, PartContent,
    PartNode, RunCounters,
};

// Config types
pub use config::{ApiConfig, Config, ExportConfig};

// Client and storage traits
pub use client::{MailClient, ProductionGmailClient};
pub use storage::{FsStorage, Storage};

// Pipeline
pub use exporter::{ExportOptions, Exporter, RunSummary};
pub use filter::{FilterDecision, FilterEngine};
pub use lister::MessageLister;
pub use mime::{AttachmentSink, MessageContext};
pub use paths::{FilenameOption, OutputStructure, PathLayout};
pub use query::build_query;

// CLI types (for binary usage)
pub use cli::{Cli, Commands, ExportArgs, ProgressReporter};
