//! Name Server: file directory, access control and placement.
//!
//! - [`record`] - file metadata and ACL rules
//! - [`registry`] / [`cache`] / [`index`] - authoritative map with an LRU in front
//! - [`placement`] - Storage Server registry and round-robin placement
//! - [`users`] - registered client names
//! - [`persist`] - JSON metadata store
//! - [`link`] - outbound requests to Storage Servers
//! - [`exec`] - EXEC shell runner
//! - [`service`] - command handlers
//! - [`server`] - accept loop

pub mod cache;
pub mod exec;
pub mod index;
pub mod link;
pub mod persist;
pub mod placement;
pub mod record;
pub mod registry;
pub mod server;
pub mod service;
pub mod users;

pub use link::{StorageLink, TcpStorageLink};
pub use record::{AccessMode, FileRecord, Location};
pub use server::NameServer;
pub use service::DirectoryService;
