//! Identifiers for TRIPWIRE entities.
//!
//! Packet ids are UUIDs in canonical hyphenated form. Descriptor ids are
//! deterministic composite keys built from the routing triple.

use crate::action::Action;
use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Packet identifier - unique per submitted packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PacketId(Uuid);

impl PacketId {
    /// Create a new random PacketId
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a hyphenated UUID string
    ///
    /// # Errors
    ///
    /// Returns error if the string is not `xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx`
    pub fn parse(value: &str) -> CoreResult<Self> {
        // Uuid::parse_str also accepts simple/braced/urn forms; the envelope only allows hyphenated.
        if value.len() != 36 {
            return Err(CoreError::InvalidId {
                reason: format!("expected 36 characters, got {}", value.len()),
            });
        }
        Uuid::parse_str(value)
            .map(Self)
            .map_err(|e| CoreError::InvalidId {
                reason: e.to_string(),
            })
    }

    /// Get as UUID
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for PacketId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PacketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for PacketId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Descriptor identifier - `service:action:item_type`
///
/// Services that do not distinguish item types use `*` in the last slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DescriptorId(String);

impl DescriptorId {
    /// Placeholder used when the service has a single implicit item type
    pub const ANY_ITEM: &'static str = "*";

    /// Build the composite key
    #[must_use]
    pub fn new(service: &str, action: Action, item_type: Option<&str>) -> Self {
        Self(format!(
            "{}:{}:{}",
            service,
            action.as_str(),
            item_type.unwrap_or(Self::ANY_ITEM)
        ))
    }

    /// Get as string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Service component
    #[must_use]
    pub fn service(&self) -> &str {
        self.0.split(':').next().unwrap_or_default()
    }

    /// Item type component, `None` for [`Self::ANY_ITEM`]
    #[must_use]
    pub fn item_type(&self) -> Option<&str> {
        self.0
            .rsplit(':')
            .next()
            .filter(|item| *item != Self::ANY_ITEM)
    }
}

impl fmt::Display for DescriptorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DescriptorId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_id_unique() {
        assert_ne!(PacketId::new(), PacketId::new());
    }

    #[test]
    fn test_packet_id_parse_roundtrip() {
        let id = PacketId::new();
        let parsed = PacketId::parse(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_packet_id_parse_rejects_garbage() {
        assert!(PacketId::parse("not-a-uuid").is_err());
        assert!(PacketId::parse("").is_err());
        // simple form is valid for uuid but not for the envelope
        assert!(PacketId::parse("67e5504410b1426f9247bb680e5fe0c8").is_err());
        assert!(PacketId::parse("67e55044-10b1-426f-9247-bb680e5fe0c8").is_ok());
    }

    #[test]
    fn test_packet_id_serde_transparent() {
        let id = PacketId::parse("67e55044-10b1-426f-9247-bb680e5fe0c8").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"67e55044-10b1-426f-9247-bb680e5fe0c8\"");
    }

    #[test]
    fn test_descriptor_id_format() {
        let id = DescriptorId::new("todoist", Action::Create, Some("task"));
        assert_eq!(id.as_str(), "todoist:create:task");
        assert_eq!(id.service(), "todoist");

        let id = DescriptorId::new("notes", Action::List, None);
        assert_eq!(id.as_str(), "notes:list:*");
    }

    #[test]
    fn test_descriptor_id_deterministic() {
        let a = DescriptorId::new("gmail", Action::Search, Some("email"));
        let b = DescriptorId::new("gmail", Action::Search, Some("email"));
        assert_eq!(a, b);
    }

    #[test]
    fn test_descriptor_item_type() {
        let typed = DescriptorId::new("todoist", Action::Create, Some("task"));
        assert_eq!(typed.service(), "todoist");
        assert_eq!(typed.item_type(), Some("task"));

        let untyped = DescriptorId::new("gmail", Action::Search, None);
        assert_eq!(untyped.as_str(), "gmail:search:*");
        assert_eq!(untyped.item_type(), None);
    }
}
