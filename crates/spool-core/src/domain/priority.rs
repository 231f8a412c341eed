//! Priority labels and pop modes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Name of a priority bucket.
///
/// Not a closed enum: any caller-defined string is a valid priority and the
/// bucket is created on first push.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Priority(String);

impl Priority {
    pub const CRITICAL: &'static str = "critical";
    pub const HIGH: &'static str = "high";
    pub const MEDIUM: &'static str = "medium";
    pub const LOW: &'static str = "low";

    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Rank used by the standard bucket ordering (lower drains first).
    ///
    /// critical → high → custom buckets → medium → low
    pub fn rank(name: &str) -> u8 {
        match name {
            Self::CRITICAL => 0,
            Self::HIGH => 1,
            Self::MEDIUM => 3,
            Self::LOW => 4,
            _ => 2,
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::new(Self::MEDIUM)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for Priority {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Priority {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Which end of a bucket `pop` takes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PopMode {
    /// Oldest first (head of the bucket).
    #[default]
    Fifo,
    /// Newest first (tail of the bucket).
    Lifo,
}

#[derive(Debug, thiserror::Error)]
#[error("unknown pop mode: {0} (expected FIFO or LIFO)")]
pub struct ParsePopModeError(String);

impl FromStr for PopMode {
    type Err = ParsePopModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "FIFO" => Ok(PopMode::Fifo),
            "LIFO" => Ok(PopMode::Lifo),
            _ => Err(ParsePopModeError(s.to_string())),
        }
    }
}

impl fmt::Display for PopMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PopMode::Fifo => f.write_str("FIFO"),
            PopMode::Lifo => f.write_str("LIFO"),
        }
    }
}
