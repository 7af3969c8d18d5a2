//! The packet: a self-describing unit of requested work.
//!
//! The request half (`PacketRequest`) is fixed at construction and has no
//! mutators. Only the lifecycle half (status, validation results,
//! processing log, error) changes, and only by appending.

use crate::action::{Action, PacketStatus, Priority};
use crate::checksum::Checksum;
use crate::error::{CoreError, CoreResult};
use crate::id::{DescriptorId, PacketId};
use crate::report::{ErrorRecord, ProcessingLogEntry, ValidationResult};
use crate::time::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Routing header and payload of a packet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacketRequest {
    /// Target service
    pub tool_type: String,
    /// Requested action
    pub action: Action,
    /// Domain object discriminator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_type: Option<String>,
    /// Opaque service parameters
    pub payload: Map<String, Value>,
    /// Advisory priority
    #[serde(default)]
    pub priority: Priority,
    /// Caller user context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Caller session context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl PacketRequest {
    /// Create a request with default priority and no context
    #[must_use]
    pub fn new(tool_type: impl Into<String>, action: Action, payload: Map<String, Value>) -> Self {
        Self {
            tool_type: tool_type.into(),
            action,
            item_type: None,
            payload,
            priority: Priority::Normal,
            user_id: None,
            session_id: None,
        }
    }

    /// Set item type
    #[must_use]
    pub fn with_item_type(mut self, item_type: impl Into<String>) -> Self {
        self.item_type = Some(item_type.into());
        self
    }

    /// Set priority
    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Set user and session context
    #[must_use]
    pub fn with_context(mut self, user_id: Option<String>, session_id: Option<String>) -> Self {
        self.user_id = user_id;
        self.session_id = session_id;
        self
    }

    /// Checksum over the routing triple and payload
    #[must_use]
    pub fn checksum(&self) -> Checksum {
        Checksum::compute(
            &self.tool_type,
            self.action.as_str(),
            self.item_type.as_deref(),
            &self.payload,
        )
    }
}

/// A packet and its processing record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Packet {
    packet_id: PacketId,
    timestamp: Timestamp,
    #[serde(flatten)]
    request: PacketRequest,
    checksum: Checksum,
    status: PacketStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    validation_results: Option<ValidationResult>,
    #[serde(default)]
    processing_log: Vec<ProcessingLogEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<ErrorRecord>,
}

impl Packet {
    /// Create a pending packet
    #[must_use]
    pub fn new(packet_id: PacketId, timestamp: Timestamp, request: PacketRequest) -> Self {
        let checksum = request.checksum();
        Self {
            packet_id,
            timestamp,
            request,
            checksum,
            status: PacketStatus::Pending,
            validation_results: None,
            processing_log: Vec::new(),
            error: None,
        }
    }

    /// Create a pending packet with a fresh id and the current time
    #[must_use]
    pub fn from_request(request: PacketRequest) -> Self {
        Self::new(PacketId::new(), Timestamp::now(), request)
    }

    /// Packet id
    #[must_use]
    pub const fn id(&self) -> PacketId {
        self.packet_id
    }

    /// Creation time
    #[must_use]
    pub const fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Request header and payload
    #[must_use]
    pub const fn request(&self) -> &PacketRequest {
        &self.request
    }

    /// Target service
    #[must_use]
    pub fn tool_type(&self) -> &str {
        &self.request.tool_type
    }

    /// Requested action
    #[must_use]
    pub const fn action(&self) -> Action {
        self.request.action
    }

    /// Item type, if any
    #[must_use]
    pub fn item_type(&self) -> Option<&str> {
        self.request.item_type.as_deref()
    }

    /// Service payload
    #[must_use]
    pub const fn payload(&self) -> &Map<String, Value> {
        &self.request.payload
    }

    /// Integrity checksum
    #[must_use]
    pub const fn checksum(&self) -> &Checksum {
        &self.checksum
    }

    /// Current status
    #[must_use]
    pub const fn status(&self) -> PacketStatus {
        self.status
    }

    /// Validation results, once the pipeline ran
    #[must_use]
    pub const fn validation_results(&self) -> Option<&ValidationResult> {
        self.validation_results.as_ref()
    }

    /// Processing log in append order
    #[must_use]
    pub fn processing_log(&self) -> &[ProcessingLogEntry] {
        &self.processing_log
    }

    /// Terminal error, if any
    #[must_use]
    pub const fn error(&self) -> Option<&ErrorRecord> {
        self.error.as_ref()
    }

    /// `tool_type:action:item_type`
    #[must_use]
    pub fn routing_key(&self) -> DescriptorId {
        DescriptorId::new(&self.request.tool_type, self.request.action, self.item_type())
    }

    /// Advance the lifecycle
    ///
    /// # Errors
    ///
    /// Returns error if the transition is not part of the lifecycle
    pub fn transition(&mut self, next: PacketStatus) -> CoreResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(CoreError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Attach or extend validation results
    pub fn record_validation(&mut self, results: ValidationResult) {
        match self.validation_results.as_mut() {
            Some(existing) => existing.merge(results),
            None => self.validation_results = Some(results),
        }
    }

    /// Append a processing step
    pub fn log_step(&mut self, entry: ProcessingLogEntry) {
        self.processing_log.push(entry);
    }

    /// Record the terminal error
    pub fn record_error(&mut self, error: ErrorRecord) {
        self.error = Some(error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{StepStatus, StepType};
    use serde_json::json;
    use std::time::Duration;

    fn make_request() -> PacketRequest {
        let payload = json!({"content": "Buy milk"}).as_object().cloned().unwrap();
        PacketRequest::new("todoist", Action::Create, payload).with_item_type("task")
    }

    #[test]
    fn test_packet_new_is_pending() {
        let packet = Packet::from_request(make_request());
        assert_eq!(packet.status(), PacketStatus::Pending);
        assert!(packet.validation_results().is_none());
        assert!(packet.processing_log().is_empty());
        assert_eq!(packet.checksum(), &make_request().checksum());
    }

    #[test]
    fn test_routing_key() {
        let packet = Packet::from_request(make_request());
        assert_eq!(packet.routing_key().as_str(), "todoist:create:task");
    }

    #[test]
    fn test_transition_rules() {
        let mut packet = Packet::from_request(make_request());
        assert!(packet.transition(PacketStatus::Success).is_err());
        packet.transition(PacketStatus::Processing).unwrap();
        packet.transition(PacketStatus::Timeout).unwrap();
        assert!(packet.transition(PacketStatus::Success).is_err());
        assert_eq!(packet.status(), PacketStatus::Timeout);
    }

    #[test]
    fn test_log_is_append_only() {
        let mut packet = Packet::from_request(make_request());
        packet.log_step(ProcessingLogEntry::new(
            "format",
            StepType::Validation,
            StepStatus::Passed,
            Duration::from_millis(1),
        ));
        packet.log_step(ProcessingLogEntry::new(
            "dispatch",
            StepType::Dispatch,
            StepStatus::Passed,
            Duration::from_millis(2),
        ));
        let names: Vec<_> = packet.processing_log().iter().map(|e| e.step_name.as_str()).collect();
        assert_eq!(names, vec!["format", "dispatch"]);
    }

    #[test]
    fn test_record_validation_merges() {
        let mut packet = Packet::from_request(make_request());
        let mut first = ValidationResult::new();
        first.pass("format");
        packet.record_validation(first);

        let mut second = ValidationResult::new();
        second.pass("execution");
        packet.record_validation(second);

        let results = packet.validation_results().unwrap();
        assert_eq!(results.passed_checks, vec!["format", "execution"]);
    }

    #[test]
    fn test_packet_serializes_flat() {
        let packet = Packet::from_request(make_request());
        let value = serde_json::to_value(&packet).unwrap();
        assert_eq!(value["tool_type"], "todoist");
        assert_eq!(value["action"], "create");
        assert_eq!(value["status"], "pending");
        assert_eq!(value["priority"], "normal");
        assert_eq!(value["packet_id"], packet.id().to_string());
    }
}
