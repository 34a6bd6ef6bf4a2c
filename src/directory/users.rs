//! Registered client usernames.

use crate::core::error::{ScribeError, ScribeResult};
use crate::core::time::UnixTime;
use parking_lot::Mutex;

/// One registered client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientRecord {
    /// Username.
    pub username: String,
    /// Address of the last registration, when known.
    pub last_ip: Option<String>,
    /// Time of the last registration.
    pub registered_at: UnixTime,
}

/// Bounded, registration-ordered client registry.
#[derive(Debug)]
pub struct ClientRegistry {
    clients: Mutex<Vec<ClientRecord>>,
    max_clients: usize,
}

impl ClientRegistry {
    /// Create a registry bounded to `max_clients` names.
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: Mutex::new(Vec::new()),
            max_clients,
        }
    }

    /// Register `username`, or refresh it if already known.
    ///
    /// Returns true when the name is new.
    pub fn register(&self, username: &str, ip: Option<String>) -> ScribeResult<bool> {
        let mut clients = self.clients.lock();
        if let Some(existing) = clients.iter_mut().find(|c| c.username == username) {
            existing.last_ip = ip;
            existing.registered_at = UnixTime::now();
            return Ok(false);
        }
        if clients.len() >= self.max_clients {
            return Err(ScribeError::MaxClients {
                limit: self.max_clients,
            });
        }
        clients.push(ClientRecord {
            username: username.to_string(),
            last_ip: ip,
            registered_at: UnixTime::now(),
        });
        Ok(true)
    }

    /// Restore persisted names, ignoring duplicates and the size bound.
    pub fn restore(&self, usernames: impl IntoIterator<Item = String>) {
        let mut clients = self.clients.lock();
        for username in usernames {
            if username.is_empty() || clients.iter().any(|c| c.username == username) {
                continue;
            }
            clients.push(ClientRecord {
                username,
                last_ip: None,
                registered_at: UnixTime::now(),
            });
        }
    }

    /// Usernames in registration order.
    pub fn usernames(&self) -> Vec<String> {
        self.clients
            .lock()
            .iter()
            .map(|c| c.username.clone())
            .collect()
    }

    /// Number of registered names.
    pub fn len(&self) -> usize {
        self.clients.lock().len()
    }

    /// True when nobody has registered.
    pub fn is_empty(&self) -> bool {
        self.clients.lock().is_empty()
    }
}
