//! Wall-clock timestamps for file metadata.
//!
//! Metadata timestamps are whole Unix seconds. They are persisted as plain
//! integers and rendered in local time for INFO and VIEW replies.

use chrono::{Local, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// A wall-clock instant with one-second resolution.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct UnixTime(pub i64);

impl UnixTime {
    /// The current time.
    pub fn now() -> Self {
        Self(Utc::now().timestamp())
    }

    /// Seconds since the Unix epoch.
    pub const fn seconds(self) -> i64 {
        self.0
    }

    /// Render as `%Y-%m-%d %H:%M:%S` in local time (INFO).
    pub fn format_full(self) -> String {
        self.format_with("%Y-%m-%d %H:%M:%S")
    }

    /// Render as `%Y-%m-%d %H:%M` in local time (VIEW -l).
    pub fn format_short(self) -> String {
        self.format_with("%Y-%m-%d %H:%M")
    }

    fn format_with(self, pattern: &str) -> String {
        match Local.timestamp_opt(self.0, 0).single() {
            Some(dt) => dt.format(pattern).to_string(),
            None => String::from("-"),
        }
    }
}

impl std::fmt::Display for UnixTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.format_full())
    }
}
