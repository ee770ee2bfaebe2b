//! Core types shared across Quire components.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What a challenge guards.
///
/// Each purpose gets its own independent challenge within a session, so a
/// user can solve the merge and split puzzles on the same page in any order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Purpose {
    /// Joining several PDFs into one
    Merge,
    /// Splitting one PDF into single pages
    Split,
}

impl Purpose {
    pub const ALL: [Purpose; 2] = [Purpose::Merge, Purpose::Split];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Merge => "merge",
            Self::Split => "split",
        }
    }
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Purpose {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "merge" | "join" => Ok(Self::Merge),
            "split" => Ok(Self::Split),
            other => Err(format!("unknown purpose: {other}")),
        }
    }
}

/// CAPTCHA challenge data sent to the client.
///
/// Only the rendering leaves the server; the code itself never does.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuedChallenge {
    /// Which action this challenge guards
    pub purpose: Purpose,

    /// Data URI of the rendered image (PNG or SVG)
    pub image_data: String,

    /// Challenge expiry timestamp (Unix epoch seconds)
    pub expires_at: i64,
}

impl IssuedChallenge {
    /// Seconds until the challenge expires (zero once expired)
    pub fn expires_in_secs(&self) -> i64 {
        (self.expires_at - chrono::Utc::now().timestamp()).max(0)
    }
}

/// A single field-level validation failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Outcome of one retention sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Regular files examined
    pub scanned: usize,

    /// Files deleted because they outlived the retention window
    pub removed: usize,

    /// Stale files that could not be deleted
    pub failed: usize,
}

/// Result of a successful split
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitOutcome {
    /// Generated file names, in page order
    pub files: Vec<String>,
}
