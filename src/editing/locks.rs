//! Sentence lock table.
//!
//! A fixed pool of slots, each claiming one `(filename, sentence_index)` pair
//! for one connection. Different sentences of the same file can be locked by
//! different connections at the same time; one sentence never has two
//! owners. Slots are freed explicitly on commit/abort, or in bulk when the
//! owning connection goes away.

use crate::net::tcp::ConnectionId;
use parking_lot::Mutex;

/// Index of a claimed slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LockSlot(pub usize);

/// One claimed sentence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentenceLock {
    /// Locked file.
    pub filename: String,
    /// Locked sentence index.
    pub sentence_index: usize,
    /// Connection holding the lock.
    pub owner: ConnectionId,
}

/// Why a lock could not be acquired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    /// Another connection holds this sentence.
    HeldBy(ConnectionId),
    /// Every slot is in use.
    TableFull,
}

/// Fixed-size lock pool with linear scan.
#[derive(Debug)]
pub struct LockTable {
    slots: Mutex<Vec<Option<SentenceLock>>>,
}

impl LockTable {
    /// Create a table with `capacity` slots.
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Mutex::new(vec![None; capacity]),
        }
    }

    /// Number of slots.
    pub fn capacity(&self) -> usize {
        self.slots.lock().len()
    }

    /// Number of slots currently held.
    pub fn active_count(&self) -> usize {
        self.slots.lock().iter().filter(|s| s.is_some()).count()
    }

    /// Claim `(filename, sentence_index)` for `owner`.
    ///
    /// Re-acquiring a lock the same connection already holds returns the
    /// existing slot.
    pub fn acquire(
        &self,
        filename: &str,
        sentence_index: usize,
        owner: ConnectionId,
    ) -> Result<LockSlot, LockError> {
        let mut slots = self.slots.lock();

        for (i, slot) in slots.iter().enumerate() {
            if let Some(lock) = slot {
                if lock.filename == filename && lock.sentence_index == sentence_index {
                    return if lock.owner == owner {
                        Ok(LockSlot(i))
                    } else {
                        Err(LockError::HeldBy(lock.owner))
                    };
                }
            }
        }

        let free = slots
            .iter()
            .position(Option::is_none)
            .ok_or(LockError::TableFull)?;
        slots[free] = Some(SentenceLock {
            filename: filename.to_string(),
            sentence_index,
            owner,
        });
        Ok(LockSlot(free))
    }

    /// Free one slot. Out-of-range or already-free slots are ignored.
    pub fn release(&self, slot: LockSlot) {
        if let Some(entry) = self.slots.lock().get_mut(slot.0) {
            *entry = None;
        }
    }

    /// Free every slot held by `owner`. Returns how many were freed.
    pub fn release_all(&self, owner: ConnectionId) -> usize {
        let mut freed = 0;
        for slot in self.slots.lock().iter_mut() {
            if slot.as_ref().is_some_and(|lock| lock.owner == owner) {
                *slot = None;
                freed += 1;
            }
        }
        freed
    }

    /// Check whether any sentence of `filename` is locked.
    pub fn file_has_active_lock(&self, filename: &str) -> bool {
        self.slots
            .lock()
            .iter()
            .flatten()
            .any(|lock| lock.filename == filename)
    }

    /// Snapshot of one slot, for diagnostics and tests.
    pub fn get(&self, slot: LockSlot) -> Option<SentenceLock> {
        self.slots.lock().get(slot.0).cloned().flatten()
    }
}
