//! Name Server command handlers.
//!
//! Registry and cache locks are only held for single lookups and field
//! updates. Every call to a Storage Server happens with no lock held, so a
//! slow or dead peer never blocks unrelated requests; state read before such
//! a call is re-checked when the result is written back.

use super::exec::run_shell;
use super::index::FileIndex;
use super::link::{create_file, delete_file, read_file, stat_file, StorageLink};
use super::persist::{MetadataSnapshot, MetadataStore, StoredFile};
use super::placement::{RegisterRequest, StorageRegistry};
use super::record::{AccessMode, FileHandle, FileRecord, Grant, Location};
use super::users::ClientRegistry;
use crate::core::config::NameServerConfig;
use crate::core::error::{ScribeError, ScribeResult};
use crate::editing::store::validate_filename;
use crate::protocol::{Request, Response};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;

/// Name Server state and handlers.
pub struct DirectoryService {
    index: FileIndex,
    servers: StorageRegistry,
    users: ClientRegistry,
    store: MetadataStore,
    link: Arc<dyn StorageLink>,
    exec_enabled: bool,
    persist_lock: Mutex<()>,
    creating: Mutex<HashSet<String>>,
}

/// Claim on a filename while its CREATE talks to Storage Servers.
/// Released on drop.
struct CreateReservation<'a> {
    creating: &'a Mutex<HashSet<String>>,
    filename: String,
}

impl Drop for CreateReservation<'_> {
    fn drop(&mut self) {
        self.creating.lock().remove(&self.filename);
    }
}

impl DirectoryService {
    /// Create an empty service. Call [`DirectoryService::restore`] to load
    /// persisted state.
    pub fn new(config: &NameServerConfig, link: Arc<dyn StorageLink>) -> Self {
        Self {
            index: FileIndex::new(config.cache_capacity),
            servers: StorageRegistry::new(config.max_storage_servers),
            users: ClientRegistry::new(config.max_clients),
            store: MetadataStore::new(config.metadata_path()),
            link,
            exec_enabled: config.exec_enabled,
            persist_lock: Mutex::new(()),
            creating: Mutex::new(HashSet::new()),
        }
    }

    /// File registry and cache.
    pub fn index(&self) -> &FileIndex {
        &self.index
    }

    /// Storage Server registry.
    pub fn servers(&self) -> &StorageRegistry {
        &self.servers
    }

    /// Client registry.
    pub fn users(&self) -> &ClientRegistry {
        &self.users
    }

    /// Load persisted users, files and placement cursor.
    ///
    /// Returns the number of files restored.
    pub fn restore(&self) -> usize {
        let snapshot = self.store.load();
        let count = snapshot.files.len();

        self.users.restore(snapshot.users);
        for (filename, stored) in snapshot.files {
            self.index
                .registry()
                .restore(stored.into_record(&filename).into_handle());
        }
        self.servers.set_cursor(snapshot.next_ss_index);

        tracing::info!(
            path = %self.store.path().display(),
            files = count,
            users = self.users.len(),
            "metadata restored"
        );
        count
    }

    fn snapshot(&self) -> MetadataSnapshot {
        let files = self
            .index
            .registry()
            .active()
            .into_iter()
            .map(|handle| {
                let record = handle.read();
                (record.filename.clone(), StoredFile::from_record(&record))
            })
            .collect();
        MetadataSnapshot {
            users: self.users.usernames(),
            files,
            next_ss_index: self.servers.cursor(),
        }
    }

    /// Write the current state to the metadata store. Failures are logged.
    ///
    /// Called after commands that change metadata. Access times and stats
    /// refreshed by READ, STREAM, EXEC and INFO ride along with the next
    /// such write or the flush on shutdown.
    pub fn persist(&self) {
        let _guard = self.persist_lock.lock();
        if let Err(e) = self.store.save(&self.snapshot()) {
            tracing::error!(path = %self.store.path().display(), error = %e, "failed to persist metadata");
        }
    }

    /// Handle one request from `peer`. Errors become ERR replies.
    pub async fn handle(&self, request: &Request, peer: Option<IpAddr>) -> Response {
        let cmd = request.command().unwrap_or_default();
        tracing::debug!(
            cmd = %cmd,
            username = request.get_string("username").unwrap_or_default(),
            filename = request.get_string("filename").unwrap_or_default(),
            peer = ?peer,
            "directory request"
        );

        match self.dispatch(cmd, request, peer).await {
            Ok(response) => response,
            Err(e) => {
                if e.is_infrastructure() {
                    tracing::warn!(cmd = %cmd, reason = e.reason(), error = %e, "request failed");
                } else {
                    tracing::debug!(cmd = %cmd, reason = e.reason(), error = %e, "request failed");
                }
                Response::from_error(&e)
            }
        }
    }

    async fn dispatch(
        &self,
        cmd: &str,
        request: &Request,
        peer: Option<IpAddr>,
    ) -> ScribeResult<Response> {
        match cmd {
            "register_client" => self.register_client(request, peer),
            "register_ss" => self.register_ss(request, peer),
            "VIEW" | "LIST" | "CREATE" | "INFO" | "ADDACCESS" | "REMACCESS" | "DELETE"
            | "READ" | "WRITE" | "STREAM" | "UNDO" | "EXEC" => {
                let user = request.require_non_empty("username")?;
                match cmd {
                    "VIEW" => self.view(request, user).await,
                    "LIST" => Ok(self.list(user)),
                    "CREATE" => self.create(request, user).await,
                    "INFO" => self.info(request, user).await,
                    "ADDACCESS" => self.add_access(request, user),
                    "REMACCESS" => self.remove_access(request, user),
                    "DELETE" => self.delete(request, user).await,
                    "EXEC" => self.exec(request, user).await,
                    _ => self.file_operation(cmd, request, user).await,
                }
            }
            other => Err(ScribeError::UnknownCommand {
                command: other.to_string(),
            }),
        }
    }

    fn lookup(&self, filename: &str) -> ScribeResult<FileHandle> {
        self.index
            .lookup(filename)
            .ok_or_else(|| ScribeError::file_not_found(filename))
    }

    fn register_client(&self, request: &Request, peer: Option<IpAddr>) -> ScribeResult<Response> {
        let username = request.require_non_empty("username")?;
        let is_new = self.users.register(username, peer.map(|ip| ip.to_string()))?;
        tracing::info!(username, new = is_new, "client registered");
        if is_new {
            self.persist();
        }
        Ok(Response::ok_message("Registered successfully"))
    }

    fn register_ss(&self, request: &Request, peer: Option<IpAddr>) -> ScribeResult<Response> {
        let client_port = port_field(request, "client_port")?;
        let nm_port = match request.get_int("nm_port") {
            Some(_) => port_field(request, "nm_port")?,
            None => client_port,
        };
        let advertised_ip = request.get_string("ip").unwrap_or_default().to_string();

        let registration = self.servers.register(RegisterRequest {
            advertised_ip: advertised_ip.clone(),
            observed_ip: peer,
            nm_port,
            client_port,
            files: request.get_string_list("files"),
        })?;
        let location = registration.location.clone();

        if registration.used_observed_ip {
            tracing::info!(
                advertised = %advertised_ip,
                observed = %location.ip,
                "storage server advertised an unusable address, using observed IP"
            );
        }

        match registration.previous {
            Some(previous) => {
                let updated = self.repoint_files(&previous, &location);
                tracing::info!(
                    server = %location,
                    previous = %previous,
                    files_updated = updated,
                    "storage server re-registered"
                );
                if updated > 0 {
                    self.persist();
                }
            }
            None => {
                tracing::info!(server = %location, index = registration.index, "storage server registered");
            }
        }

        Ok(Response::ok_message("SS Registered successfully"))
    }

    fn repoint_files(&self, previous: &Location, current: &Location) -> usize {
        let mut updated = 0;
        for handle in self.index.registry().active() {
            let filename = {
                let mut record = handle.write();
                if !record.is_hosted_on(previous) {
                    continue;
                }
                if record.primary == *previous {
                    record.primary = current.clone();
                }
                if record.backup.as_ref() == Some(previous) {
                    record.backup = Some(current.clone());
                }
                record.filename.clone()
            };
            self.index.invalidate(&filename);
            tracing::debug!(filename = %filename, server = %current, "file mapping updated");
            updated += 1;
        }
        updated
    }

    async fn view(&self, request: &Request, user: &str) -> ScribeResult<Response> {
        let flags = request.get_string("flags").unwrap_or_default();
        let show_all = flags.contains('a');
        let detailed = flags.contains('l');

        let visible: Vec<FileHandle> = self
            .index
            .registry()
            .active()
            .into_iter()
            .filter(|handle| show_all || handle.read().can_access(user, AccessMode::Read))
            .collect();

        let mut files = Vec::with_capacity(visible.len());
        for handle in visible {
            let (filename, primary) = {
                let record = handle.read();
                (record.filename.clone(), record.primary.clone())
            };

            match stat_file(self.link.as_ref(), &primary, &filename).await {
                Ok(stats) => handle.write().stats = stats,
                Err(e) => {
                    tracing::debug!(filename = %filename, error = %e, "stat refresh failed, using cached stats")
                }
            }

            let record = handle.read();
            files.push(if detailed {
                json!({
                    "filename": record.filename,
                    "owner": record.owner,
                    "words": record.stats.words,
                    "chars": record.stats.chars,
                    "bytes": record.stats.bytes,
                    "last_accessed": record.last_accessed.format_short(),
                })
            } else {
                Value::from(record.filename.clone())
            });
        }

        tracing::info!(username = user, flags, count = files.len(), "VIEW");
        Ok(Response::ok().with("files", files))
    }

    fn list(&self, user: &str) -> Response {
        let users = self.users.usernames();
        tracing::info!(username = user, count = users.len(), "LIST");
        Response::ok().with("users", users)
    }

    /// Claim `filename` for an in-progress CREATE. Fails if the file exists
    /// or another CREATE holds the claim.
    fn reserve(&self, filename: &str) -> ScribeResult<CreateReservation<'_>> {
        let mut creating = self.creating.lock();
        if creating.contains(filename) || self.index.lookup(filename).is_some() {
            return Err(ScribeError::AlreadyExists {
                filename: filename.to_string(),
            });
        }
        creating.insert(filename.to_string());
        Ok(CreateReservation {
            creating: &self.creating,
            filename: filename.to_string(),
        })
    }

    async fn create(&self, request: &Request, user: &str) -> ScribeResult<Response> {
        let filename = filename_field(request)?;
        // Held until the record is indexed, so a racing CREATE is refused
        // before it touches any Storage Server.
        let _reservation = self.reserve(filename)?;

        let candidates = self.servers.placement_candidates();
        if candidates.is_empty() {
            return Err(ScribeError::NoStorageServer);
        }

        let mut placed = None;
        let mut rejected = false;
        let mut last_reason: Option<String> = None;
        for (index, location) in candidates {
            match create_file(self.link.as_ref(), &location, filename).await {
                Ok(response) if response.is_ok() => {
                    placed = Some((index, location));
                    break;
                }
                Ok(response) => {
                    rejected = true;
                    last_reason = response.reason().map(str::to_string);
                    tracing::warn!(filename, server = %location, reason = ?last_reason, "storage server rejected create");
                }
                Err(e) => {
                    tracing::warn!(filename, server = %location, error = %e, "storage server unreachable during create");
                }
            }
        }

        let Some((index, primary)) = placed else {
            return Err(match (rejected, last_reason) {
                (true, Some(reason)) => ScribeError::StorageRejected { reason },
                (true, None) => ScribeError::AllStorageServersFailed,
                (false, _) => ScribeError::AllStorageServersDown,
            });
        };
        self.servers.advance_cursor(index);

        let backup = match self.servers.backup_for(&primary) {
            Some(candidate) => self.replicate(filename, candidate).await,
            None => {
                tracing::info!(filename, "backup skipped, no second storage server");
                None
            }
        };

        let record = FileRecord::new(filename, user, primary.clone(), backup);
        self.index.insert(record.into_handle())?;
        self.persist();

        tracing::info!(filename, owner = user, server = %primary, "file created");
        Ok(Response::ok()
            .with("ss_ip", primary.ip)
            .with("ss_port", primary.port))
    }

    /// Create the backup copy. Failure is logged, never fatal.
    async fn replicate(&self, filename: &str, target: Location) -> Option<Location> {
        let link = self.link.as_ref();
        let first = match create_file(link, &target, filename).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(filename, backup = %target, error = %e, "backup create failed");
                return None;
            }
        };
        if first.is_ok() {
            tracing::info!(filename, backup = %target, "backup created");
            return Some(target);
        }
        if first.reason() != Some("ALREADY_EXISTS") {
            tracing::warn!(filename, backup = %target, reason = ?first.reason(), "backup create rejected");
            return None;
        }

        tracing::info!(filename, backup = %target, "stale backup file exists, deleting and retrying");
        if let Err(e) = delete_file(link, &target, filename).await {
            tracing::warn!(filename, backup = %target, error = %e, "backup cleanup failed");
        }
        match create_file(link, &target, filename).await {
            Ok(response) if response.is_ok() => {
                tracing::info!(filename, backup = %target, "backup created after cleanup");
                Some(target)
            }
            Ok(response) => {
                tracing::warn!(filename, backup = %target, reason = ?response.reason(), "backup retry rejected");
                None
            }
            Err(e) => {
                tracing::warn!(filename, backup = %target, error = %e, "backup retry failed");
                None
            }
        }
    }

    async fn info(&self, request: &Request, user: &str) -> ScribeResult<Response> {
        let filename = filename_field(request)?;
        let handle = self.lookup(filename)?;
        let primary = handle.read().primary.clone();

        match stat_file(self.link.as_ref(), &primary, filename).await {
            Ok(stats) => handle.write().stats = stats,
            Err(e) => {
                tracing::debug!(filename, error = %e, "stat refresh failed, using cached stats");
            }
        }

        let record = handle.read().clone();
        let mut access = Vec::with_capacity(record.access.len() + 1);
        access.push(json!({"user": record.owner, "mode": "RW"}));
        for entry in &record.access {
            access.push(json!({"user": entry.user, "mode": entry.mode.as_str()}));
        }

        tracing::info!(username = user, filename, "INFO");
        Ok(Response::ok()
            .with("filename", record.filename.as_str())
            .with("owner", record.owner.as_str())
            .with("created_at", record.created_at.format_full())
            .with("last_modified", record.last_modified.format_full())
            .with("last_accessed", record.last_accessed.format_full())
            .with("last_accessed_by", record.last_accessed_by.as_str())
            .with("words", record.stats.words)
            .with("chars", record.stats.chars)
            .with("bytes", record.stats.bytes)
            .with("access", access)
            .with("ss_ip", record.primary.ip.as_str())
            .with("ss_port", record.primary.port))
    }

    fn add_access(&self, request: &Request, user: &str) -> ScribeResult<Response> {
        let filename = filename_field(request)?;
        let target = request.require_non_empty("target")?;
        let mode = AccessMode::parse(request.get_string("mode").unwrap_or_default())?;

        let handle = self.lookup(filename)?;
        let grant = {
            let mut record = handle.write();
            if record.owner != user {
                return Err(ScribeError::unauthorized(user, filename));
            }
            record.grant(target, mode)
        };
        self.persist();

        tracing::info!(owner = user, filename, target, mode = mode.as_str(), "access granted");
        Ok(Response::ok_message(match grant {
            Grant::Added => "Access granted",
            Grant::Updated => "Access updated",
        }))
    }

    fn remove_access(&self, request: &Request, user: &str) -> ScribeResult<Response> {
        let filename = filename_field(request)?;
        let target = request.require_non_empty("target")?;

        let handle = self.lookup(filename)?;
        {
            let mut record = handle.write();
            if record.owner != user {
                return Err(ScribeError::unauthorized(user, filename));
            }
            if !record.revoke(target) {
                return Err(ScribeError::AccessNotFound {
                    username: target.to_string(),
                    filename: filename.to_string(),
                });
            }
        }
        self.persist();

        tracing::info!(owner = user, filename, target, "access removed");
        Ok(Response::ok_message("Access removed"))
    }

    /// READ / WRITE / STREAM / UNDO: authorize and point the client at a
    /// live Storage Server.
    async fn file_operation(&self, cmd: &str, request: &Request, user: &str) -> ScribeResult<Response> {
        let filename = filename_field(request)?;
        let handle = self.lookup(filename)?;

        let modifies = matches!(cmd, "WRITE" | "UNDO");
        let required = if modifies { AccessMode::Write } else { AccessMode::Read };
        let (primary, backup) = {
            let mut record = handle.write();
            if !record.can_access(user, required) {
                return Err(ScribeError::unauthorized(user, filename));
            }
            record.touch(user, modifies);
            (record.primary.clone(), record.backup.clone())
        };
        if modifies {
            self.persist();
        }

        let target = self.resolve_live(filename, primary, backup).await?;
        tracing::info!(cmd = %cmd, filename, username = user, server = %target, "file operation dispatched");
        Ok(Response::ok()
            .with("ss_ip", target.ip)
            .with("ss_port", target.port))
    }

    /// Primary if it answers a probe, else the backup if it does.
    async fn resolve_live(
        &self,
        filename: &str,
        primary: Location,
        backup: Option<Location>,
    ) -> ScribeResult<Location> {
        if self.link.probe(&primary).await {
            return Ok(primary);
        }
        let Some(backup) = backup else {
            tracing::warn!(filename, primary = %primary, "primary storage server down and no backup recorded");
            return Err(ScribeError::AllStorageServersDown);
        };
        if self.link.probe(&backup).await {
            tracing::warn!(filename, primary = %primary, backup = %backup, "primary storage server down, using backup");
            return Ok(backup);
        }
        tracing::warn!(filename, primary = %primary, backup = %backup, "primary and backup storage servers down");
        Err(ScribeError::AllStorageServersDown)
    }

    async fn delete(&self, request: &Request, user: &str) -> ScribeResult<Response> {
        let filename = filename_field(request)?;
        let handle = self.lookup(filename)?;

        let (primary, backup) = {
            let record = handle.read();
            if record.owner != user {
                return Err(ScribeError::unauthorized(user, filename));
            }
            (record.primary.clone(), record.backup.clone())
        };
        self.index.remove(&handle);
        self.persist();

        for target in std::iter::once(primary).chain(backup) {
            match delete_file(self.link.as_ref(), &target, filename).await {
                Ok(response) if response.is_ok() => {}
                Ok(response) => {
                    tracing::warn!(filename, server = %target, reason = ?response.reason(), "physical delete rejected")
                }
                Err(e) => tracing::warn!(filename, server = %target, error = %e, "physical delete failed"),
            }
        }

        tracing::info!(filename, owner = user, "file deleted");
        Ok(Response::ok_message("File deleted"))
    }

    async fn exec(&self, request: &Request, user: &str) -> ScribeResult<Response> {
        let filename = filename_field(request)?;
        let handle = self.lookup(filename)?;
        let primary = {
            let mut record = handle.write();
            if !record.can_access(user, AccessMode::Read) {
                return Err(ScribeError::unauthorized(user, filename));
            }
            record.touch(user, false);
            record.primary.clone()
        };

        if !self.exec_enabled {
            return Err(ScribeError::ExecDisabled);
        }

        let content = read_file(self.link.as_ref(), &primary, filename).await?;
        if content.is_empty() {
            return Err(ScribeError::EmptyFile {
                filename: filename.to_string(),
            });
        }

        tracing::warn!(filename, username = user, "executing file content as shell command");
        let result = run_shell(&content).await?;
        tracing::info!(filename, username = user, exit_code = result.exit_code, "EXEC finished");

        Ok(Response::ok()
            .with("output", result.output)
            .with("exit_code", result.exit_code))
    }
}

fn filename_field(request: &Request) -> ScribeResult<&str> {
    let filename = request.require_non_empty("filename")?;
    validate_filename(filename)?;
    Ok(filename)
}

fn port_field(request: &Request, key: &str) -> ScribeResult<u16> {
    let value = request.require_int(key)?;
    u16::try_from(value)
        .map_err(|_| ScribeError::bad_request(format!("{} out of range: {}", key, value)))
}
