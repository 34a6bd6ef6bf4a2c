//! Networking layer.
//!
//! - [`tcp`] - TCP listener abstraction shared by both servers
//! - [`client`] - outbound line-protocol connections and liveness probes

pub mod client;
pub mod tcp;
