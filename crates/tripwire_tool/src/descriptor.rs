//! Tool descriptors: one per (service, action, item type).

use serde::Serialize;
use tripwire_core::{Action, DescriptorId, LogicalTime, Timestamp};

/// Trackable unit of capability.
///
/// Usage fields only move forward. A descriptor is never removed from the
/// catalog; eviction clears `loaded` and nothing else.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDescriptor {
    id: DescriptorId,
    service: String,
    action: Action,
    #[serde(skip_serializing_if = "Option::is_none")]
    item_type: Option<String>,
    usage_count: u64,
    last_used: LogicalTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_used_at: Option<Timestamp>,
    loaded: bool,
    registered_at: Timestamp,
}

impl ToolDescriptor {
    /// Create an unused, unloaded descriptor
    #[must_use]
    pub fn new(service: &str, action: Action, item_type: Option<&str>) -> Self {
        Self {
            id: DescriptorId::new(service, action, item_type),
            service: service.to_string(),
            action,
            item_type: item_type.map(str::to_string),
            usage_count: 0,
            last_used: LogicalTime::zero(),
            last_used_at: None,
            loaded: false,
            registered_at: Timestamp::now(),
        }
    }

    /// Descriptor id
    #[must_use]
    pub fn id(&self) -> &DescriptorId {
        &self.id
    }

    /// Owning service
    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Action
    #[must_use]
    pub const fn action(&self) -> Action {
        self.action
    }

    /// Item type, if the service distinguishes them
    #[must_use]
    pub fn item_type(&self) -> Option<&str> {
        self.item_type.as_deref()
    }

    /// Number of uses
    #[must_use]
    pub const fn usage_count(&self) -> u64 {
        self.usage_count
    }

    /// Logical time of last use (zero if never used)
    #[must_use]
    pub const fn last_used(&self) -> LogicalTime {
        self.last_used
    }

    /// Wall clock time of last use
    #[must_use]
    pub const fn last_used_at(&self) -> Option<Timestamp> {
        self.last_used_at
    }

    /// Whether resident in the loaded set
    #[must_use]
    pub const fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Catalog registration time
    #[must_use]
    pub const fn registered_at(&self) -> Timestamp {
        self.registered_at
    }

    /// Count one use at `tick`
    pub fn record_use(&mut self, tick: LogicalTime, now: Timestamp) {
        self.usage_count = self.usage_count.saturating_add(1);
        if tick > self.last_used {
            self.last_used = tick;
        }
        self.last_used_at = Some(now);
    }

    /// Set residency
    pub fn set_loaded(&mut self, loaded: bool) {
        self.loaded = loaded;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_new() {
        let d = ToolDescriptor::new("gmail", Action::Search, Some("email"));
        assert_eq!(d.id().as_str(), "gmail:search:email");
        assert_eq!(d.usage_count(), 0);
        assert!(!d.is_loaded());
        assert!(d.last_used_at().is_none());
    }

    #[test]
    fn test_record_use_is_monotonic() {
        let mut d = ToolDescriptor::new("gcal", Action::Create, Some("event"));
        d.record_use(LogicalTime::from_raw(5), Timestamp::now());
        d.record_use(LogicalTime::from_raw(3), Timestamp::now());
        assert_eq!(d.usage_count(), 2);
        assert_eq!(d.last_used(), LogicalTime::from_raw(5));
    }

    #[test]
    fn test_unload_keeps_stats() {
        let mut d = ToolDescriptor::new("todoist", Action::List, Some("task"));
        d.set_loaded(true);
        d.record_use(LogicalTime::from_raw(1), Timestamp::now());
        d.set_loaded(false);
        assert_eq!(d.usage_count(), 1);
        assert!(!d.is_loaded());
    }
}
