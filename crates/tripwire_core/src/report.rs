//! Structured outcomes: error records, validation results, the processing
//! log, and the response envelope returned to callers.

use crate::action::PacketStatus;
use crate::id::PacketId;
use crate::packet::Packet;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;

/// Error taxonomy, one kind per pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Structural or type violation in the packet (layer 1)
    FormatError,
    /// Unknown or unregistered service (layer 2)
    ServiceUnavailable,
    /// Service lacks the requested action (layer 3)
    ActionUnsupported,
    /// Service/action lacks the requested item type (layer 4)
    ItemTypeUnsupported,
    /// The handler raised a fault (layer 5)
    ExecutionError,
    /// Dispatch exceeded its deadline
    Timeout,
}

impl ErrorKind {
    /// Wire name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::FormatError => "FORMAT_ERROR",
            Self::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            Self::ActionUnsupported => "ACTION_UNSUPPORTED",
            Self::ItemTypeUnsupported => "ITEM_TYPE_UNSUPPORTED",
            Self::ExecutionError => "EXECUTION_ERROR",
            Self::Timeout => "TIMEOUT",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured, caller-facing failure or warning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// Taxonomy kind
    pub error_type: ErrorKind,
    /// Stable machine-readable code, e.g. `INVALID_ACTION`
    pub error_code: String,
    /// Human readable message
    pub error_message: String,
    /// Dotted path to the offending value, e.g. `payload.id`
    pub field_path: String,
    /// What a valid value looks like
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_format: Option<String>,
    /// The value actually supplied
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_value: Option<Value>,
    /// Remediation hints
    #[serde(default)]
    pub suggestions: Vec<String>,
}

impl ErrorRecord {
    /// Create a record with no expected/actual values or suggestions
    #[must_use]
    pub fn new(
        error_type: ErrorKind,
        error_code: impl Into<String>,
        error_message: impl Into<String>,
        field_path: impl Into<String>,
    ) -> Self {
        Self {
            error_type,
            error_code: error_code.into(),
            error_message: error_message.into(),
            field_path: field_path.into(),
            expected_format: None,
            actual_value: None,
            suggestions: Vec::new(),
        }
    }

    /// Set expected format
    #[must_use]
    pub fn expected(mut self, expected: impl Into<String>) -> Self {
        self.expected_format = Some(expected.into());
        self
    }

    /// Set actual value
    #[must_use]
    pub fn actual(mut self, actual: impl Into<Value>) -> Self {
        self.actual_value = Some(actual.into());
        self
    }

    /// Add a suggestion
    #[must_use]
    pub fn suggest(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    /// `CODE: message`, used in processing log entries
    #[must_use]
    pub fn summary(&self) -> String {
        format!("{}: {}", self.error_code, self.error_message)
    }
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} at {}: {}",
            self.error_type, self.error_code, self.field_path, self.error_message
        )
    }
}

/// Accumulated result of the validation layers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// No fatal error recorded
    pub is_valid: bool,
    /// Names of checks that passed, in run order
    pub passed_checks: Vec<String>,
    /// Fatal errors
    pub errors: Vec<ErrorRecord>,
    /// Non-fatal warnings
    pub warnings: Vec<ErrorRecord>,
}

impl ValidationResult {
    /// Empty, valid result
    #[must_use]
    pub fn new() -> Self {
        Self {
            is_valid: true,
            passed_checks: Vec::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Record a passed check
    pub fn pass(&mut self, check: impl Into<String>) {
        self.passed_checks.push(check.into());
    }

    /// Record a fatal error
    pub fn fail(&mut self, error: ErrorRecord) {
        self.is_valid = false;
        self.errors.push(error);
    }

    /// Record a warning
    pub fn warn(&mut self, warning: ErrorRecord) {
        self.warnings.push(warning);
    }

    /// First fatal error, if any
    #[must_use]
    pub fn first_error(&self) -> Option<&ErrorRecord> {
        self.errors.first()
    }

    /// Append another result's checks, errors and warnings
    pub fn merge(&mut self, other: ValidationResult) {
        self.is_valid &= other.is_valid;
        self.passed_checks.extend(other.passed_checks);
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

/// Which component performed a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    /// A pre-dispatch validation layer
    Validation,
    /// Tool manager load/hit
    Cache,
    /// Handler invocation
    Dispatch,
}

/// Outcome of a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Step succeeded
    Passed,
    /// Step succeeded with warnings
    Warning,
    /// Step failed
    Failed,
    /// Step did not finish before its deadline
    TimedOut,
}

/// One processing log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingLogEntry {
    /// Step name
    pub step_name: String,
    /// Step type
    pub step_type: StepType,
    /// Outcome
    pub status: StepStatus,
    /// Wall clock duration in milliseconds
    pub duration_ms: f64,
    /// Error summary when the step failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProcessingLogEntry {
    /// Create an entry
    #[must_use]
    pub fn new(
        step_name: impl Into<String>,
        step_type: StepType,
        status: StepStatus,
        duration: Duration,
    ) -> Self {
        Self {
            step_name: step_name.into(),
            step_type,
            status,
            duration_ms: duration_to_ms(duration),
            error: None,
        }
    }

    /// Attach an error summary
    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Response envelope for one packet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacketResponse {
    /// Packet id
    pub packet_id: PacketId,
    /// Final status
    pub status: PacketStatus,
    /// Whether the handler produced a result
    pub success: bool,
    /// Handler result (present iff success)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Terminal error (present iff not success)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorRecord>,
    /// Validation results
    pub validation_results: ValidationResult,
    /// Processing log
    pub processing_log: Vec<ProcessingLogEntry>,
    /// Total elapsed time in milliseconds
    pub elapsed_ms: f64,
}

impl PacketResponse {
    /// Assemble the envelope from a finished packet
    #[must_use]
    pub fn from_packet(packet: &Packet, data: Option<Value>, elapsed: Duration) -> Self {
        let success = packet.status() == PacketStatus::Success;
        Self {
            packet_id: packet.id(),
            status: packet.status(),
            success,
            data: if success { data } else { None },
            error: if success { None } else { packet.error().cloned() },
            validation_results: packet.validation_results().cloned().unwrap_or_default(),
            processing_log: packet.processing_log().to_vec(),
            elapsed_ms: duration_to_ms(elapsed),
        }
    }
}

/// Milliseconds with microsecond resolution
pub fn duration_to_ms(duration: Duration) -> f64 {
    (duration.as_micros() as f64) / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Action;
    use crate::packet::PacketRequest;
    use proptest::prelude::*;
    use serde_json::{json, Map};

    #[test]
    fn test_error_kind_wire_names() {
        assert_eq!(
            serde_json::to_string(&ErrorKind::ItemTypeUnsupported).unwrap(),
            "\"ITEM_TYPE_UNSUPPORTED\""
        );
        assert_eq!(ErrorKind::Timeout.to_string(), "TIMEOUT");
    }

    #[test]
    fn test_error_record_builder() {
        let record = ErrorRecord::new(
            ErrorKind::FormatError,
            "INVALID_ACTION",
            "Invalid action 'upsert'",
            "action",
        )
        .expected(Action::vocabulary())
        .actual("upsert")
        .suggest("Use one of: create, read, update, delete, list, search");

        assert_eq!(record.actual_value, Some(json!("upsert")));
        assert_eq!(record.suggestions.len(), 1);
        assert_eq!(record.summary(), "INVALID_ACTION: Invalid action 'upsert'");
    }

    #[test]
    fn test_validation_result_fail_marks_invalid() {
        let mut result = ValidationResult::new();
        result.pass("format");
        assert!(result.is_valid);
        result.fail(ErrorRecord::new(
            ErrorKind::ServiceUnavailable,
            "SERVICE_NOT_AVAILABLE",
            "unknown",
            "tool_type",
        ));
        assert!(!result.is_valid);
        assert_eq!(result.first_error().unwrap().error_code, "SERVICE_NOT_AVAILABLE");
    }

    #[test]
    fn test_duration_to_ms() {
        assert_eq!(duration_to_ms(Duration::from_micros(1500)), 1.5);
        assert_eq!(duration_to_ms(Duration::ZERO), 0.0);
    }

    #[test]
    fn test_response_from_failed_packet_has_no_data() {
        let request = PacketRequest::new("todoist", Action::Create, Map::new());
        let mut packet = Packet::from_request(request);
        packet.transition(PacketStatus::Error).unwrap();
        packet.record_error(ErrorRecord::new(
            ErrorKind::FormatError,
            "MISSING_REQUIRED_FIELDS",
            "missing",
            "payload",
        ));

        let response = PacketResponse::from_packet(&packet, Some(json!({"x": 1})), Duration::ZERO);
        assert!(!response.success);
        assert!(response.data.is_none());
        assert_eq!(response.error.unwrap().error_code, "MISSING_REQUIRED_FIELDS");
    }

    fn arb_kind() -> impl Strategy<Value = ErrorKind> {
        prop_oneof![
            Just(ErrorKind::FormatError),
            Just(ErrorKind::ServiceUnavailable),
            Just(ErrorKind::ActionUnsupported),
            Just(ErrorKind::ItemTypeUnsupported),
            Just(ErrorKind::ExecutionError),
            Just(ErrorKind::Timeout),
        ]
    }

    fn arb_record() -> impl Strategy<Value = ErrorRecord> {
        (
            arb_kind(),
            "[A-Z_]{3,20}",
            ".{0,40}",
            "[a-z_.]{0,20}",
            proptest::option::of("[a-z ]{1,20}"),
            proptest::collection::vec(".{1,20}", 0..3),
        )
            .prop_map(|(kind, code, message, path, expected, suggestions)| {
                let mut record = ErrorRecord::new(kind, code, message, path);
                record.expected_format = expected;
                record.suggestions = suggestions;
                record
            })
    }

    fn arb_data() -> impl Strategy<Value = Value> {
        (any::<i64>(), ".{0,20}")
            .prop_map(|(n, s)| json!({ "id": n, "text": s, "nested": {"ok": true} }))
    }

    proptest::proptest! {
        #[test]
        fn prop_response_json_roundtrip(
            success in any::<bool>(),
            data in arb_data(),
            error in arb_record(),
            warnings in proptest::collection::vec(arb_record(), 0..3),
            checks in proptest::collection::vec("[a-z_]{1,20}", 0..5),
            durations in proptest::collection::vec(0u32..10_000, 0..4),
        ) {
            let mut validation_results = ValidationResult::new();
            for check in checks {
                validation_results.pass(check);
            }
            for warning in warnings {
                validation_results.warn(warning);
            }
            if !success {
                validation_results.fail(error.clone());
            }
            let processing_log = durations
                .iter()
                .map(|ms| ProcessingLogEntry::new(
                    "step",
                    StepType::Validation,
                    StepStatus::Passed,
                    Duration::from_millis(u64::from(*ms)),
                ))
                .collect();

            let response = PacketResponse {
                packet_id: PacketId::new(),
                status: if success { PacketStatus::Success } else { PacketStatus::Error },
                success,
                data: success.then(|| data.clone()),
                error: (!success).then(|| error.clone()),
                validation_results,
                processing_log,
                elapsed_ms: 12.5,
            };

            let json = serde_json::to_string(&response).unwrap();
            let back: PacketResponse = serde_json::from_str(&json).unwrap();
            prop_assert_eq!(back.success, response.success);
            prop_assert_eq!(&back.data, &response.data);
            prop_assert_eq!(&back.error, &response.error);
            prop_assert_eq!(&back.validation_results, &response.validation_results);
            prop_assert_eq!(back, response);
        }
    }
}
