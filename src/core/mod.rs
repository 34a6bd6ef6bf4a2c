//! Core runtime infrastructure.
//!
//! - [`config`] - Configuration parsing and validation
//! - [`runtime`] - Process runtime and role startup
//! - [`time`] - Timestamp helpers
//! - [`error`] - Error types and wire reason mapping

pub mod config;
pub mod error;
pub mod runtime;
pub mod time;
