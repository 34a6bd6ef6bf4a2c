//! Storage Server: sentence-granular editing engine.
//!
//! - [`text`] - sentence and word segmentation
//! - [`locks`] - fixed-size sentence lock pool
//! - [`session`] - per-connection WRITE/UPDATE/ETIRW state machine
//! - [`store`] - on-disk content and undo snapshots
//! - [`service`] - command dispatch
//! - [`server`] - accept loop and Name Server registration

pub mod locks;
pub mod server;
pub mod service;
pub mod session;
pub mod store;
pub mod text;

pub use server::StorageServer;
pub use service::{Reply, StorageService};
pub use session::{UpdateMode, WriteSession};
pub use store::FileStore;
