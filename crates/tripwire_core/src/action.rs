//! Closed vocabularies carried by a packet.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Operation requested from a service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Create a new item
    Create,
    /// Read a single item
    Read,
    /// Update an existing item
    Update,
    /// Delete an item
    Delete,
    /// List items
    List,
    /// Search items
    Search,
}

impl Action {
    /// Every action, in canonical order
    pub const ALL: [Action; 6] = [
        Action::Create,
        Action::Read,
        Action::Update,
        Action::Delete,
        Action::List,
        Action::Search,
    ];

    /// Wire name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::List => "list",
            Self::Search => "search",
        }
    }

    /// Comma separated list of every wire name
    #[must_use]
    pub fn vocabulary() -> String {
        Self::ALL.iter().map(Action::as_str).collect::<Vec<_>>().join(", ")
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| CoreError::UnknownVariant {
                kind: "action",
                value: s.to_string(),
            })
    }
}

/// Advisory priority. Recorded on the packet, never used for ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Low
    Low,
    /// Normal
    #[default]
    Normal,
    /// High
    High,
    /// Critical
    Critical,
}

impl Priority {
    /// Every priority, lowest first
    pub const ALL: [Priority; 4] = [
        Priority::Low,
        Priority::Normal,
        Priority::High,
        Priority::Critical,
    ];

    /// Wire name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| CoreError::UnknownVariant {
                kind: "priority",
                value: s.to_string(),
            })
    }
}

/// Packet lifecycle: `pending -> processing -> {success | error | timeout}`.
///
/// A packet may also go straight from `pending` to `error` when it fails
/// validation before any dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PacketStatus {
    /// Accepted, not yet validated
    #[default]
    Pending,
    /// Validated and dispatched
    Processing,
    /// Service returned a result
    Success,
    /// Validation or execution failed
    Error,
    /// Dispatch exceeded its deadline
    Timeout,
}

impl PacketStatus {
    /// Wire name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Success => "success",
            Self::Error => "error",
            Self::Timeout => "timeout",
        }
    }

    /// Terminal states accept no further transitions
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Error | Self::Timeout)
    }

    /// Whether `self -> next` is a legal lifecycle step
    #[must_use]
    pub const fn can_transition_to(&self, next: PacketStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Processing)
                | (Self::Pending, Self::Error)
                | (Self::Processing, Self::Success)
                | (Self::Processing, Self::Error)
                | (Self::Processing, Self::Timeout)
        )
    }
}

impl fmt::Display for PacketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
