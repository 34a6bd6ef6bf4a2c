//! Storage Server registry and placement.
//!
//! Servers are kept in registration order and never removed; a server that
//! comes back after a restart reclaims its slot by matching its client port
//! and one of its known IPs. New files are placed round-robin from a cursor
//! that survives restarts through the metadata store.

use super::record::Location;
use crate::core::error::{ScribeError, ScribeResult};
use parking_lot::Mutex;
use std::net::{IpAddr, Ipv4Addr};

/// One registered Storage Server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageServerRecord {
    /// Resolved IP clients connect to.
    pub ip: String,
    /// Port advertised for Name Server traffic.
    pub nm_port: u16,
    /// Client-facing port.
    pub client_port: u16,
    /// Files reported at the last registration.
    pub files: Vec<String>,
    /// Whether the server is eligible for placement.
    pub active: bool,
}

impl StorageServerRecord {
    /// Client-facing address.
    pub fn location(&self) -> Location {
        Location::new(self.ip.clone(), self.client_port)
    }
}

/// A `register_ss` request after transport details are known.
#[derive(Debug, Clone)]
pub struct RegisterRequest {
    /// IP the server advertised (may be empty, unspecified or loopback).
    pub advertised_ip: String,
    /// IP of the registration socket's peer.
    pub observed_ip: Option<IpAddr>,
    /// Advertised Name Server port.
    pub nm_port: u16,
    /// Client-facing port.
    pub client_port: u16,
    /// Files the server holds.
    pub files: Vec<String>,
}

/// Result of a registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    /// Registry slot.
    pub index: usize,
    /// Address now on record.
    pub location: Location,
    /// Address on record before this call, for re-registrations.
    pub previous: Option<Location>,
    /// Whether the observed IP replaced the advertised one.
    pub used_observed_ip: bool,
}

/// Decide which IP to record for a registering server.
///
/// Returns the IP and whether the observed peer IP was used in place of the
/// advertised one.
pub fn resolve_ip(advertised: &str, observed: Option<IpAddr>) -> (String, bool) {
    let parsed = advertised.parse::<IpAddr>().ok();
    let observed_is_remote = observed.is_some_and(|ip| !ip.is_loopback());

    let use_observed = match parsed {
        None => true,
        Some(ip) if ip.is_unspecified() => true,
        Some(ip) if ip.is_loopback() => observed_is_remote,
        Some(_) => false,
    };

    if !use_observed {
        let ip = match parsed {
            Some(ip) => ip.to_string(),
            None => Ipv4Addr::LOCALHOST.to_string(),
        };
        return (ip, false);
    }

    match observed {
        Some(ip) => (ip.to_string(), true),
        None if !advertised.is_empty() => (advertised.to_string(), false),
        None => (Ipv4Addr::LOCALHOST.to_string(), false),
    }
}

#[derive(Debug, Default)]
struct PlacementState {
    servers: Vec<StorageServerRecord>,
    cursor: usize,
}

/// Registry of Storage Servers with a round-robin placement cursor.
#[derive(Debug)]
pub struct StorageRegistry {
    state: Mutex<PlacementState>,
    max_servers: usize,
}

impl StorageRegistry {
    /// Create a registry bounded to `max_servers` entries.
    pub fn new(max_servers: usize) -> Self {
        Self {
            state: Mutex::new(PlacementState::default()),
            max_servers,
        }
    }

    /// Register or re-register a server.
    pub fn register(&self, request: RegisterRequest) -> ScribeResult<Registration> {
        let (resolved, used_observed_ip) = resolve_ip(&request.advertised_ip, request.observed_ip);
        let observed = request.observed_ip.map(|ip| ip.to_string());

        let mut state = self.state.lock();
        let existing = state.servers.iter().position(|server| {
            server.client_port == request.client_port
                && (server.ip == resolved
                    || observed.as_deref() == Some(server.ip.as_str())
                    || (!request.advertised_ip.is_empty() && server.ip == request.advertised_ip))
        });

        let (index, previous) = match existing {
            Some(index) => {
                let server = &mut state.servers[index];
                let previous = server.location();
                server.ip = resolved.clone();
                server.nm_port = request.nm_port;
                server.active = true;
                server.files = request.files;
                (index, Some(previous))
            }
            None => {
                if state.servers.len() >= self.max_servers {
                    return Err(ScribeError::MaxStorageServers {
                        limit: self.max_servers,
                    });
                }
                state.servers.push(StorageServerRecord {
                    ip: resolved.clone(),
                    nm_port: request.nm_port,
                    client_port: request.client_port,
                    files: request.files,
                    active: true,
                });
                (state.servers.len() - 1, None)
            }
        };

        Ok(Registration {
            index,
            location: Location::new(resolved, request.client_port),
            previous,
            used_observed_ip,
        })
    }

    /// Active servers in placement order: starting at the cursor, wrapping.
    pub fn placement_candidates(&self) -> Vec<(usize, Location)> {
        let state = self.state.lock();
        let count = state.servers.len();
        if count == 0 {
            return Vec::new();
        }
        let start = state.cursor % count;
        (0..count)
            .map(|offset| (start + offset) % count)
            .filter(|&i| state.servers[i].active)
            .map(|i| (i, state.servers[i].location()))
            .collect()
    }

    /// Move the cursor past the server that took the last placement.
    pub fn advance_cursor(&self, placed_at: usize) {
        let mut state = self.state.lock();
        let count = state.servers.len().max(1);
        state.cursor = (placed_at + 1) % count;
    }

    /// Current cursor value.
    pub fn cursor(&self) -> usize {
        self.state.lock().cursor
    }

    /// Restore a persisted cursor.
    pub fn set_cursor(&self, cursor: usize) {
        self.state.lock().cursor = cursor;
    }

    /// First active server whose address differs from `primary`.
    pub fn backup_for(&self, primary: &Location) -> Option<Location> {
        self.state
            .lock()
            .servers
            .iter()
            .filter(|server| server.active)
            .map(StorageServerRecord::location)
            .find(|location| location != primary)
    }

    /// Number of servers eligible for placement.
    pub fn active_count(&self) -> usize {
        self.state.lock().servers.iter().filter(|s| s.active).count()
    }

    /// Snapshot of every registered server.
    pub fn servers(&self) -> Vec<StorageServerRecord> {
        self.state.lock().servers.clone()
    }
}
