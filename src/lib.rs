//! Scribe - distributed, sentence-granular document service.
//!
//! A single Name Server owns the directory: which files exist, who owns them,
//! who may read or write them, and which Storage Server holds each primary
//! and backup copy. Storage Servers hold the content and run the editing
//! engine, where a writer locks one sentence, edits it word by word and
//! commits it back into whatever the file looks like at commit time.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                            Clients                            │
//! └───────────────────────────────────────────────────────────────┘
//!          │ metadata, ACL, "where is it?"        │ content, edits
//! ┌─────────────────────────────┐   ┌─────────────────────────────┐
//! │         Name Server         │   │       Storage Servers       │
//! │ registry │ LRU │ placement  │──▶│ splitter │ locks │ sessions │
//! │ ACL │ users │ metadata JSON │   │ files │ undo snapshots      │
//! └─────────────────────────────┘   └─────────────────────────────┘
//! ```
//!
//! Both sides speak line-delimited JSON over TCP.
//!
//! # Module Organization
//!
//! ## Core
//! - [`core::config`] - Configuration parsing and validation
//! - [`core::runtime`] - Process runtime
//! - [`core::time`] - Timestamp helpers
//! - [`core::error`] - Error types and wire reasons
//!
//! ## Wire and networking
//! - [`protocol`] - Request/response messages and line codec
//! - [`net::tcp`] - Listener with connection ids and metrics
//! - [`net::client`] - Outbound connections and liveness probes
//!
//! ## Servers
//! - [`directory`] - Name Server
//! - [`editing`] - Storage Server
//!
//! ## Clients
//! - [`client`] - Programmatic client
//! - [`cli::commands`] - CLI command implementations
//!
//! # Key Invariants
//!
//! - At most one writer holds a given sentence of a file at a time.
//! - A commit is applied to the file as it is at commit time, never to the
//!   copy seen when the sentence was locked.
//! - Every content write goes through a temp file and rename.
//! - Registry locks are never held across a call to a Storage Server.

// Core infrastructure
pub mod core;

// Wire protocol and networking
pub mod net;
pub mod protocol;

// Name Server
pub mod directory;

// Storage Server
pub mod editing;

// Client library
pub mod client;

// CLI
pub mod cli;

// Re-exports for convenience
pub use self::core::{config, error, runtime, time};
pub use client::ScribeClient;
pub use directory::NameServer;
pub use editing::StorageServer;
