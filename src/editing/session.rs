//! Per-connection write session.
//!
//! A session moves `Idle -> Locked` on WRITE, stays `Locked` across UPDATEs,
//! and returns to `Idle` on ETIRW whatever the outcome. Dropping a session
//! (connection teardown) aborts it and frees its lock, discarding any
//! uncommitted word edits.
//!
//! Edits are buffered as a [`WordList`]; the file is only touched at commit.
//! Commit re-reads the file and re-locates the edited sentence by its text
//! as captured at lock time (the baseline), so edits committed meanwhile by
//! other connections to other sentences do not shift this edit onto the
//! wrong sentence.

use super::locks::{LockError, LockSlot, LockTable};
use super::store::FileStore;
use super::text::{
    ends_with_terminator, find_sentence, join_sentences, split_sentences, WordList,
};
use crate::core::error::{ScribeError, ScribeResult};
use crate::net::tcp::ConnectionId;
use std::sync::Arc;

/// How UPDATE splices its words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    /// Insert before `word_index` (may equal the word count).
    Insert,
    /// Replace exactly the word at `word_index`.
    Replace,
}

impl UpdateMode {
    /// Parse the optional `mode` request field. Only `"replace"` selects
    /// replace mode.
    pub fn from_wire(mode: Option<&str>) -> Self {
        match mode {
            Some("replace") => Self::Replace,
            _ => Self::Insert,
        }
    }
}

/// Observable session phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// No edit in progress.
    Idle,
    /// A sentence lock is held and edits are buffered.
    Locked,
}

/// Result of a successful commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitOutcome {
    /// Committed file.
    pub filename: String,
    /// Sentence index the edit landed on.
    pub sentence_index: usize,
    /// Sentences the edited text expanded to.
    pub sentences_written: usize,
    /// Whether the file changed between WRITE and ETIRW.
    pub resynchronized: bool,
}

#[derive(Debug)]
struct ActiveWrite {
    slot: LockSlot,
    filename: String,
    sentence_index: usize,
    append: bool,
    original_content: String,
    baseline: String,
    words: WordList,
    dirty: bool,
}

/// Write session owned by one connection.
#[derive(Debug)]
pub struct WriteSession {
    conn: ConnectionId,
    locks: Arc<LockTable>,
    active: Option<ActiveWrite>,
}

impl WriteSession {
    /// Create an idle session for `conn`.
    pub fn new(conn: ConnectionId, locks: Arc<LockTable>) -> Self {
        Self {
            conn,
            locks,
            active: None,
        }
    }

    /// Owning connection.
    pub fn connection(&self) -> ConnectionId {
        self.conn
    }

    /// Current phase.
    pub fn phase(&self) -> SessionPhase {
        if self.active.is_some() {
            SessionPhase::Locked
        } else {
            SessionPhase::Idle
        }
    }

    /// The edited sentence as it would be committed now.
    pub fn preview(&self) -> Option<String> {
        self.active.as_ref().map(|w| w.words.join())
    }

    /// WRITE: lock a sentence and start buffering edits.
    pub fn begin(
        &mut self,
        store: &FileStore,
        filename: &str,
        sentence_index: i64,
    ) -> ScribeResult<()> {
        if sentence_index < 0 {
            return Err(ScribeError::invalid_index(sentence_index));
        }
        let index = sentence_index as usize;

        if self.active.is_some() {
            return Err(ScribeError::SentenceLocked {
                filename: filename.to_string(),
                sentence_index: index,
            });
        }

        let content = store.load(filename)?;
        let sentences = split_sentences(&content);
        let count = sentences.len();

        let append = if index < count {
            false
        } else if index == count && (count == 0 || ends_with_terminator(&sentences[count - 1])) {
            true
        } else {
            return Err(ScribeError::invalid_index(sentence_index));
        };

        let slot = self
            .locks
            .acquire(filename, index, self.conn)
            .map_err(|e| {
                match e {
                    LockError::HeldBy(owner) => {
                        tracing::debug!(filename, sentence_index = index, holder = %owner, "sentence already locked")
                    }
                    LockError::TableFull => {
                        tracing::warn!(filename, sentence_index = index, "lock table is full")
                    }
                }
                ScribeError::SentenceLocked {
                    filename: filename.to_string(),
                    sentence_index: index,
                }
            })?;

        let baseline = if append {
            String::new()
        } else {
            sentences[index].clone()
        };

        self.active = Some(ActiveWrite {
            slot,
            filename: filename.to_string(),
            sentence_index: index,
            append,
            original_content: content,
            words: WordList::split(&baseline),
            baseline,
            dirty: false,
        });
        Ok(())
    }

    /// UPDATE: splice words into the buffered sentence.
    pub fn update(&mut self, word_index: i64, content: &str, mode: UpdateMode) -> ScribeResult<()> {
        let write = self.active.as_mut().ok_or(ScribeError::NoActiveWrite)?;
        if word_index < 0 {
            return Err(ScribeError::invalid_index(word_index));
        }
        let index = word_index as usize;

        // The payload's own terminator travels with its last word; the
        // refresh below moves it back out if that word ends the sentence.
        let new_words = WordList::split(content).into_attached_words();
        let words = &mut write.words.words;

        match mode {
            UpdateMode::Insert => {
                if new_words.is_empty() {
                    return Err(ScribeError::bad_request("nothing to insert"));
                }
                if index > words.len() {
                    return Err(ScribeError::invalid_index(word_index));
                }
                words.splice(index..index, new_words);
            }
            UpdateMode::Replace => {
                if index >= words.len() {
                    return Err(ScribeError::invalid_index(word_index));
                }
                words.splice(index..index + 1, new_words);
            }
        }

        write.words.refresh_punctuation();
        write.dirty = true;
        Ok(())
    }

    /// ETIRW: merge the edited sentence into the current file.
    ///
    /// The session is idle afterwards and its lock released, on success and
    /// on failure alike.
    pub fn commit(&mut self, store: &FileStore) -> ScribeResult<CommitOutcome> {
        let mut write = self.active.take().ok_or(ScribeError::NoActiveWrite)?;
        let result = apply_commit(&mut write, store);
        self.locks.release(write.slot);
        result
    }

    /// Drop buffered edits and release the lock.
    pub fn abort(&mut self) -> bool {
        match self.active.take() {
            Some(write) => {
                self.locks.release(write.slot);
                tracing::debug!(
                    conn_id = %self.conn,
                    filename = %write.filename,
                    dirty = write.dirty,
                    "write session aborted"
                );
                true
            }
            None => false,
        }
    }
}

impl Drop for WriteSession {
    fn drop(&mut self) {
        self.abort();
    }
}

fn apply_commit(write: &mut ActiveWrite, store: &FileStore) -> ScribeResult<CommitOutcome> {
    write.words.refresh_punctuation();
    let edited = write.words.join();
    let mut replacement = split_sentences(&edited);
    if replacement.is_empty() {
        replacement.push(edited);
    }

    let current_text = store.load(&write.filename)?;
    let resynchronized = current_text != write.original_content;
    let current = split_sentences(&current_text);
    let count = current.len();

    let target = if write.append {
        count
    } else {
        find_sentence(&current, &write.baseline, write.sentence_index)
            .unwrap_or_else(|| write.sentence_index.min(count))
    };
    let consumed = usize::from(!write.append && target < count);

    if resynchronized {
        tracing::debug!(
            filename = %write.filename,
            locked_index = write.sentence_index,
            target,
            "file changed since WRITE, re-located target sentence"
        );
    }

    let sentences_written = replacement.len();
    let mut merged: Vec<String> = Vec::with_capacity(count + sentences_written);
    merged.extend_from_slice(&current[..target]);
    merged.extend(replacement);
    merged.extend_from_slice(&current[target + consumed..]);

    store.save_snapshot(&write.filename, &current_text)?;
    store.save(&write.filename, &join_sentences(&merged))?;

    Ok(CommitOutcome {
        filename: write.filename.clone(),
        sentence_index: target,
        sentences_written,
        resynchronized,
    })
}
