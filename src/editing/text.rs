//! Sentence and word segmentation.
//!
//! Pure functions shared by the write session and the commit merge. A
//! sentence ends at `.`, `!` or `?` and keeps its terminator; words are
//! whitespace-delimited, with the sentence terminator tracked separately so
//! word edits never have to special-case it.
//!
//! Segmentation is lossy on inter-sentence whitespace: joining sentences
//! always uses a single space.

/// Characters that end a sentence.
pub const TERMINATORS: [char; 3] = ['.', '!', '?'];

/// Check whether `c` ends a sentence.
pub fn is_terminator(c: char) -> bool {
    TERMINATORS.contains(&c)
}

/// Check whether `s` ends with a sentence terminator.
pub fn ends_with_terminator(s: &str) -> bool {
    s.chars().last().is_some_and(is_terminator)
}

/// Split a document into sentences.
///
/// Whitespace directly after a terminator is dropped; leading whitespace of
/// the first sentence is kept. A non-empty unterminated tail becomes the last
/// sentence. Empty input yields no sentences.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        if is_terminator(c) {
            sentences.push(std::mem::take(&mut current));
            while chars.peek().is_some_and(|next| next.is_whitespace()) {
                chars.next();
            }
        }
    }

    if !current.is_empty() {
        sentences.push(current);
    }
    sentences
}

/// Join sentences with single spaces.
pub fn join_sentences<S: AsRef<str>>(sentences: &[S]) -> String {
    sentences
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(" ")
}

/// A sentence broken into words plus its trailing terminator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WordList {
    /// Whitespace-delimited words, terminator stripped from the last one.
    pub words: Vec<String>,
    /// Sentence terminator, if the sentence had one.
    pub punctuation: Option<char>,
}

impl WordList {
    /// Split a sentence into words.
    pub fn split(sentence: &str) -> Self {
        let mut words: Vec<String> = sentence.split_whitespace().map(str::to_string).collect();
        let punctuation = sentence.chars().last().filter(|c| is_terminator(*c));

        if let (Some(p), Some(last)) = (punctuation, words.last_mut()) {
            if last.ends_with(p) {
                last.pop();
            }
        }

        Self { words, punctuation }
    }

    /// Number of words.
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// True when there are no words.
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Words with the punctuation glued back onto the last one.
    ///
    /// Used for UPDATE payloads, whose punctuation belongs to the inserted
    /// text rather than to the surrounding sentence.
    pub fn into_attached_words(self) -> Vec<String> {
        let mut words = self.words;
        if let (Some(p), Some(last)) = (self.punctuation, words.last_mut()) {
            last.push(p);
        }
        words
    }

    /// Re-derive the tracked punctuation from the current last word.
    ///
    /// Empty trailing words are dropped first. The tracked value is only
    /// ever replaced, never cleared.
    pub fn refresh_punctuation(&mut self) {
        while self.words.last().is_some_and(|w| w.is_empty()) {
            self.words.pop();
        }
        if let Some(c) = self.words.last().and_then(|w| w.chars().last()) {
            if is_terminator(c) {
                self.punctuation = Some(c);
            }
        }
    }

    /// Reassemble the sentence.
    pub fn join(&self) -> String {
        let mut sentence = self.words.join(" ");
        if let Some(p) = self.punctuation {
            let needs_punct = match self.words.last() {
                None => true,
                Some(last) => last.is_empty() || !last.ends_with(p),
            };
            if needs_punct {
                sentence.push(p);
            }
        }
        sentence
    }
}

/// Locate `target` among `sentences`, starting at `hint`.
///
/// An in-range hint is checked first, then the search expands outward one
/// step at a time, checking `hint + offset` before `hint - offset`. An
/// out-of-range hint falls back to a forward scan. Empty targets never match.
pub fn find_sentence(sentences: &[String], target: &str, hint: usize) -> Option<usize> {
    if target.is_empty() || sentences.is_empty() {
        return None;
    }

    if hint >= sentences.len() {
        return sentences.iter().position(|s| s == target);
    }

    if sentences[hint] == target {
        return Some(hint);
    }

    for offset in 1..sentences.len() {
        if let Some(forward) = hint.checked_add(offset) {
            if forward < sentences.len() && sentences[forward] == target {
                return Some(forward);
            }
        }
        if let Some(backward) = hint.checked_sub(offset) {
            if sentences[backward] == target {
                return Some(backward);
            }
        }
    }
    None
}

/// Word, character and byte counts for STAT.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TextStats {
    /// Whitespace-delimited tokens.
    pub words: usize,
    /// Non-whitespace characters.
    pub chars: usize,
    /// Length in bytes.
    pub bytes: usize,
}

impl TextStats {
    /// Compute stats for `text`.
    pub fn of(text: &str) -> Self {
        Self {
            words: text.split_whitespace().count(),
            chars: text.chars().filter(|c| !c.is_whitespace()).count(),
            bytes: text.len(),
        }
    }
}
