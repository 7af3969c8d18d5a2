//! Pre-dispatch validation layers.
//!
//! Layers run in a fixed order and stop at the first fatal failure:
//!
//! 1. format: envelope shape, field types, vocabularies, id/timestamp/checksum
//! 2. service availability: `tool_type` is registered
//! 3. action support: the service accepts `action`
//! 4. item type support: the service accepts `item_type` for `action`
//!
//! Nothing here has side effects. Dispatch (layer 5) lives in the runtime.

use crate::capability::CapabilitySet;
use crate::registry::ServiceRegistry;
use serde_json::{Map, Value};
use std::time::{Duration, Instant};
use tripwire_core::{
    Action, Checksum, DescriptorId, ErrorKind, ErrorRecord, Packet, PacketId, PacketRequest,
    PacketStatus, Priority, ProcessingLogEntry, StepStatus, StepType, Timestamp, ValidationResult,
};

/// Envelope keys understood by the format layer
const KNOWN_FIELDS: [&str; 11] = [
    "tool_type",
    "action",
    "item_type",
    "payload",
    "priority",
    "packet_id",
    "timestamp",
    "status",
    "checksum",
    "user_id",
    "session_id",
];

/// Keys that must be present
const REQUIRED_FIELDS: [&str; 3] = ["tool_type", "action", "payload"];

/// One validation layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationLayer {
    /// Layer 1
    Format,
    /// Layer 2
    ServiceAvailability,
    /// Layer 3
    ActionSupport,
    /// Layer 4
    ItemTypeSupport,
}

impl ValidationLayer {
    /// Name recorded in `passed_checks` and the processing log
    #[must_use]
    pub const fn check_name(&self) -> &'static str {
        match self {
            Self::Format => "format",
            Self::ServiceAvailability => "service_availability",
            Self::ActionSupport => "action_support",
            Self::ItemTypeSupport => "item_type_support",
        }
    }

    /// Error kind raised by this layer
    #[must_use]
    pub const fn error_kind(&self) -> ErrorKind {
        match self {
            Self::Format => ErrorKind::FormatError,
            Self::ServiceAvailability => ErrorKind::ServiceUnavailable,
            Self::ActionSupport => ErrorKind::ActionUnsupported,
            Self::ItemTypeSupport => ErrorKind::ItemTypeUnsupported,
        }
    }

    /// Error record of this layer's kind
    fn error(&self, code: &str, message: impl Into<String>, field_path: &str) -> ErrorRecord {
        ErrorRecord::new(self.error_kind(), code, message, field_path)
    }
}

/// Result of running layers 1-4
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    /// Every layer passed. The packet is still `pending` and carries its
    /// validation results and log entries.
    Admitted {
        /// The packet
        packet: Packet,
        /// Descriptor to load and dispatch
        descriptor: DescriptorId,
    },
    /// Layer 1 failed, so there is no packet
    Malformed {
        /// Caller supplied id if it was well formed, otherwise a fresh one
        packet_id: PacketId,
        /// Validation results
        validation: ValidationResult,
        /// Log entries
        log: Vec<ProcessingLogEntry>,
    },
    /// A later layer failed. The packet is in `error`.
    Rejected {
        /// The packet
        packet: Packet,
    },
}

/// The validation pipeline
#[derive(Debug, Clone)]
pub struct ValidationPipeline {
    warn_unknown_fields: bool,
}

impl ValidationPipeline {
    /// Create a pipeline that warns on unknown envelope keys
    #[must_use]
    pub fn new() -> Self {
        Self {
            warn_unknown_fields: true,
        }
    }

    /// Toggle `UNKNOWN_FIELD` warnings
    #[must_use]
    pub fn with_unknown_field_warnings(mut self, enabled: bool) -> Self {
        self.warn_unknown_fields = enabled;
        self
    }

    /// Run layers 1-4 against a raw envelope
    #[must_use]
    pub fn run(&self, raw: &Value, registry: &ServiceRegistry) -> PipelineOutcome {
        let mut results = ValidationResult::new();
        let mut log = Vec::new();

        let started = Instant::now();
        let parsed = self.check_format(raw, &mut results);
        let elapsed = started.elapsed();

        let mut packet = match parsed {
            Some(packet) if results.is_valid => packet,
            _ => {
                log.push(failed_entry(ValidationLayer::Format, elapsed, &results));
                tracing::debug!(errors = results.errors.len(), "Format layer failed");
                return PipelineOutcome::Malformed {
                    packet_id: supplied_packet_id(raw).unwrap_or_default(),
                    validation: results,
                    log,
                };
            }
        };
        pass(ValidationLayer::Format, elapsed, &mut results, &mut log, 0);

        let (descriptor, failure) = self.check_routing(&packet, registry, &mut results, &mut log);

        packet.record_validation(results);
        for entry in log {
            packet.log_step(entry);
        }

        match failure {
            None => PipelineOutcome::Admitted { packet, descriptor },
            Some(error) => {
                if let Err(err) = packet.transition(PacketStatus::Error) {
                    tracing::error!(packet_id = %packet.id(), error = %err, "Illegal packet transition");
                }
                packet.record_error(error);
                PipelineOutcome::Rejected { packet }
            }
        }
    }

    /// Layers 2-4. Returns the descriptor to dispatch and the first fatal error.
    fn check_routing(
        &self,
        packet: &Packet,
        registry: &ServiceRegistry,
        results: &mut ValidationResult,
        log: &mut Vec<ProcessingLogEntry>,
    ) -> (DescriptorId, Option<ErrorRecord>) {
        let fallback = packet.routing_key();

        let started = Instant::now();
        let Some(caps) = registry.capabilities(packet.tool_type()) else {
            let error = service_unavailable(packet.tool_type(), &registry.names());
            return (fallback, Some(fail(ValidationLayer::ServiceAvailability, started.elapsed(), error, results, log)));
        };
        pass(ValidationLayer::ServiceAvailability, started.elapsed(), results, log, 0);

        let started = Instant::now();
        if !caps.supports_action(packet.action()) {
            let error = action_unsupported(packet.tool_type(), packet.action(), caps);
            return (fallback, Some(fail(ValidationLayer::ActionSupport, started.elapsed(), error, results, log)));
        }
        pass(ValidationLayer::ActionSupport, started.elapsed(), results, log, 0);

        let started = Instant::now();
        match check_item_type(packet, caps) {
            Ok((item_type, warning)) => {
                let warnings = usize::from(warning.is_some());
                if let Some(warning) = warning {
                    results.warn(warning);
                }
                pass(ValidationLayer::ItemTypeSupport, started.elapsed(), results, log, warnings);
                let descriptor =
                    DescriptorId::new(packet.tool_type(), packet.action(), item_type.as_deref());
                (descriptor, None)
            }
            Err(error) => (
                fallback,
                Some(fail(ValidationLayer::ItemTypeSupport, started.elapsed(), error, results, log)),
            ),
        }
    }

    /// Layer 1. Records every format error found; returns the packet only
    /// if none were.
    fn check_format(&self, raw: &Value, results: &mut ValidationResult) -> Option<Packet> {
        let Some(envelope) = raw.as_object() else {
            results.fail(
                format_error("INVALID_ENVELOPE", "Packet must be a JSON object", "")
                    .expected("object")
                    .actual(json_type(raw))
                    .suggest("Send the packet as a JSON object with tool_type, action and payload"),
            );
            return None;
        };

        let missing: Vec<&str> = REQUIRED_FIELDS
            .iter()
            .copied()
            .filter(|f| envelope.get(*f).is_none_or(Value::is_null))
            .collect();
        if !missing.is_empty() {
            results.fail(
                format_error(
                    "MISSING_REQUIRED_FIELDS",
                    format!("Missing required fields: {}", missing.join(", ")),
                    missing[0],
                )
                .expected(REQUIRED_FIELDS.join(", "))
                .suggest(format!("Add the missing fields: {}", missing.join(", "))),
            );
        }

        let tool_type = check_tool_type(envelope, results);
        let action = check_action(envelope, results);
        let item_type = optional_string(envelope, "item_type", results, false);
        let payload = check_payload(envelope, results);
        let priority = check_priority(envelope, results);
        let packet_id = check_packet_id(envelope, results);
        let timestamp = check_timestamp(envelope, results);
        let user_id = optional_string(envelope, "user_id", results, true);
        let session_id = optional_string(envelope, "session_id", results, true);

        if envelope.contains_key("status") {
            results.warn(
                format_error(
                    "STATUS_IGNORED",
                    "status is managed by the router and was ignored",
                    "status",
                )
                .actual(envelope["status"].clone())
                .suggest("Omit status from submitted packets"),
            );
        }

        if self.warn_unknown_fields {
            for key in envelope.keys().filter(|k| !KNOWN_FIELDS.contains(&k.as_str())) {
                results.warn(
                    format_error("UNKNOWN_FIELD", format!("Unknown field '{}' was ignored", key), key.as_str())
                        .suggest("Put service parameters inside payload"),
                );
            }
        }

        let request = PacketRequest {
            tool_type: tool_type?,
            action: action?,
            item_type,
            payload: payload?,
            priority: priority.unwrap_or_default(),
            user_id,
            session_id,
        };

        check_checksum(envelope, &request, results);

        if !results.is_valid {
            return None;
        }

        Some(Packet::new(
            packet_id.unwrap_or_default(),
            timestamp.unwrap_or_else(Timestamp::now),
            request,
        ))
    }
}

impl Default for ValidationPipeline {
    fn default() -> Self {
        Self::new()
    }
}

fn format_error(code: &str, message: impl Into<String>, field_path: &str) -> ErrorRecord {
    ValidationLayer::Format.error(code, message, field_path)
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn invalid_type(field: &str, expected: &str, value: &Value) -> ErrorRecord {
    format_error(
        "INVALID_FIELD_TYPE",
        format!("{} must be a {}, got {}", field, expected, json_type(value)),
        field,
    )
    .expected(expected)
    .actual(value.clone())
    .suggest(format!("Send {} as a {}", field, expected))
}

fn check_tool_type(envelope: &Map<String, Value>, results: &mut ValidationResult) -> Option<String> {
    match envelope.get("tool_type")? {
        Value::String(s) if s.trim().is_empty() => {
            results.fail(
                format_error("EMPTY_TOOL_TYPE", "tool_type must not be empty", "tool_type")
                    .expected("registered service name")
                    .actual(s.as_str())
                    .suggest("Set tool_type to a registered service, e.g. 'todoist'"),
            );
            None
        }
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => {
            results.fail(invalid_type("tool_type", "string", other));
            None
        }
    }
}

fn check_action(envelope: &Map<String, Value>, results: &mut ValidationResult) -> Option<Action> {
    match envelope.get("action")? {
        Value::String(s) => match s.parse::<Action>() {
            Ok(action) => Some(action),
            Err(_) => {
                results.fail(
                    format_error("INVALID_ACTION", format!("Invalid action '{}'", s), "action")
                        .expected(Action::vocabulary())
                        .actual(s.as_str())
                        .suggest(format!("Use one of: {}", Action::vocabulary())),
                );
                None
            }
        },
        Value::Null => None,
        other => {
            results.fail(invalid_type("action", "string", other));
            None
        }
    }
}

fn check_payload(
    envelope: &Map<String, Value>,
    results: &mut ValidationResult,
) -> Option<Map<String, Value>> {
    match envelope.get("payload")? {
        Value::Object(map) => {
            if map.is_empty() {
                results.warn(
                    format_error("EMPTY_PAYLOAD", "payload is empty", "payload")
                        .suggest("Most operations need parameters in payload"),
                );
            }
            Some(map.clone())
        }
        Value::Null => None,
        other => {
            results.fail(
                format_error(
                    "INVALID_PAYLOAD_TYPE",
                    format!("payload must be an object, got {}", json_type(other)),
                    "payload",
                )
                .expected("object")
                .actual(other.clone())
                .suggest("Wrap service parameters in a JSON object"),
            );
            None
        }
    }
}

fn check_priority(envelope: &Map<String, Value>, results: &mut ValidationResult) -> Option<Priority> {
    match envelope.get("priority")? {
        Value::Null => None,
        Value::String(s) => match s.parse::<Priority>() {
            Ok(p) => Some(p),
            Err(_) => {
                let allowed: Vec<&str> = Priority::ALL.iter().map(Priority::as_str).collect();
                results.fail(
                    format_error("INVALID_PRIORITY", format!("Invalid priority '{}'", s), "priority")
                        .expected(allowed.join(", "))
                        .actual(s.as_str())
                        .suggest("Omit priority to use 'normal'"),
                );
                None
            }
        },
        other => {
            results.fail(invalid_type("priority", "string", other));
            None
        }
    }
}

fn check_packet_id(envelope: &Map<String, Value>, results: &mut ValidationResult) -> Option<PacketId> {
    match envelope.get("packet_id")? {
        Value::Null => None,
        Value::String(s) => match PacketId::parse(s) {
            Ok(id) => Some(id),
            Err(e) => {
                results.fail(
                    format_error("INVALID_UUID_FORMAT", format!("Invalid packet_id: {}", e), "packet_id")
                        .expected("xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx")
                        .actual(s.as_str())
                        .suggest("Omit packet_id to have one generated"),
                );
                None
            }
        },
        other => {
            results.fail(invalid_type("packet_id", "string", other));
            None
        }
    }
}

fn check_timestamp(envelope: &Map<String, Value>, results: &mut ValidationResult) -> Option<Timestamp> {
    match envelope.get("timestamp")? {
        Value::Null => None,
        Value::String(s) => match Timestamp::parse(s) {
            Ok(ts) => Some(ts),
            Err(_) => {
                results.fail(
                    format_error("INVALID_TIMESTAMP_FORMAT", format!("Invalid timestamp '{}'", s), "timestamp")
                        .expected("ISO-8601, e.g. 2024-01-15T10:30:00Z")
                        .actual(s.as_str())
                        .suggest("Omit timestamp to use the current time"),
                );
                None
            }
        },
        other => {
            results.fail(invalid_type("timestamp", "string", other));
            None
        }
    }
}

/// Absent or null is `None`. Empty strings are rejected unless `allow_empty`.
fn optional_string(
    envelope: &Map<String, Value>,
    field: &str,
    results: &mut ValidationResult,
    allow_empty: bool,
) -> Option<String> {
    match envelope.get(field)? {
        Value::Null => None,
        Value::String(s) if s.is_empty() && !allow_empty => {
            results.fail(
                format_error("INVALID_FIELD_TYPE", format!("{} must not be empty", field), field)
                    .expected("non-empty string")
                    .actual("")
                    .suggest(format!("Omit {} or give it a value", field)),
            );
            None
        }
        Value::String(s) => Some(s.clone()),
        other => {
            results.fail(invalid_type(field, "string", other));
            None
        }
    }
}

fn check_checksum(envelope: &Map<String, Value>, request: &PacketRequest, results: &mut ValidationResult) {
    let supplied = match envelope.get("checksum") {
        None | Some(Value::Null) => return,
        Some(Value::String(s)) => s,
        Some(other) => {
            results.fail(invalid_type("checksum", "string", other));
            return;
        }
    };

    let supplied = match Checksum::parse(supplied) {
        Ok(sum) => sum,
        Err(e) => {
            results.fail(
                format_error("INVALID_CHECKSUM_FORMAT", format!("Invalid checksum: {}", e), "checksum")
                    .expected("8 lowercase hex characters")
                    .actual(supplied.as_str())
                    .suggest("Omit checksum to have it computed"),
            );
            return;
        }
    };

    let computed = request.checksum();
    if supplied != computed {
        results.fail(
            format_error(
                "CHECKSUM_MISMATCH",
                "checksum does not match tool_type, action, item_type and payload",
                "checksum",
            )
            .expected(computed.to_string())
            .actual(supplied.to_string())
            .suggest("Recompute the checksum after the last payload change"),
        );
    }
}

/// Packet id from the raw envelope, if present and well formed
fn supplied_packet_id(raw: &Value) -> Option<PacketId> {
    raw.get("packet_id")
        .and_then(Value::as_str)
        .and_then(|s| PacketId::parse(s).ok())
}

fn service_unavailable(tool_type: &str, available: &[String]) -> ErrorRecord {
    let mut error = ValidationLayer::ServiceAvailability.error(
        "SERVICE_NOT_AVAILABLE",
        format!(
            "Service '{}' is not available. Available services: {}",
            tool_type,
            available.join(", ")
        ),
        "tool_type",
    )
    .expected(format!("one of: {}", available.join(", ")))
    .actual(tool_type);

    if let Some(close) = closest_name(tool_type, available) {
        error = error.suggest(format!("Did you mean '{}'?", close));
    }
    error.suggest(format!("Use one of the registered services: {}", available.join(", ")))
}

/// A registered name equal ignoring case, or sharing a prefix or substring
fn closest_name<'a>(wanted: &str, available: &'a [String]) -> Option<&'a str> {
    let wanted = wanted.to_ascii_lowercase();
    if wanted.is_empty() {
        return None;
    }
    available
        .iter()
        .find(|name| **name == wanted)
        .or_else(|| {
            available
                .iter()
                .find(|name| name.contains(&wanted) || wanted.contains(name.as_str()))
        })
        .or_else(|| {
            available
                .iter()
                .find(|name| name.chars().take(3).eq(wanted.chars().take(3)))
        })
        .map(String::as_str)
}

fn action_unsupported(tool_type: &str, action: Action, caps: &CapabilitySet) -> ErrorRecord {
    let supported: Vec<&str> = caps.supported_actions().iter().map(Action::as_str).collect();
    ValidationLayer::ActionSupport.error(
        "ACTION_NOT_SUPPORTED",
        format!(
            "Action '{}' is not supported by {}. Supported actions: {}",
            action,
            tool_type,
            supported.join(", ")
        ),
        "action",
    )
    .expected(supported.join(", "))
    .actual(action.as_str())
    .suggest(format!("Use one of: {}", supported.join(", ")))
}

/// Effective item type for the descriptor, plus an optional warning
fn check_item_type(
    packet: &Packet,
    caps: &CapabilitySet,
) -> Result<(Option<String>, Option<ErrorRecord>), ErrorRecord> {
    let action = packet.action();

    if !caps.distinguishes_item_types(action) {
        let warning = packet.item_type().map(|item| {
            ValidationLayer::ItemTypeSupport.error(
                "ITEM_TYPE_IGNORED",
                format!("{} does not distinguish item types; '{}' was ignored", packet.tool_type(), item),
                "item_type",
            )
            .actual(item)
            .suggest("Omit item_type for this service")
        });
        return Ok((None, warning));
    }

    let valid = caps.item_types_for(action);
    match packet.item_type() {
        Some(item) if caps.supports_item_type(action, item) => Ok((Some(item.to_string()), None)),
        Some(item) => Err(ValidationLayer::ItemTypeSupport.error(
            "ITEM_TYPE_NOT_SUPPORTED",
            format!(
                "Item type '{}' is not supported for {} {}. Valid item types: {}",
                item,
                packet.tool_type(),
                action,
                valid.join(", ")
            ),
            "item_type",
        )
        .expected(valid.join(", "))
        .actual(item)
        .suggest(format!("Use one of: {}", valid.join(", ")))),
        None => Err(ValidationLayer::ItemTypeSupport.error(
            "ITEM_TYPE_REQUIRED",
            format!(
                "{} {} requires an item_type. Valid item types: {}",
                packet.tool_type(),
                action,
                valid.join(", ")
            ),
            "item_type",
        )
        .expected(valid.join(", "))
        .suggest(format!("Add item_type, one of: {}", valid.join(", ")))),
    }
}

fn pass(
    layer: ValidationLayer,
    elapsed: Duration,
    results: &mut ValidationResult,
    log: &mut Vec<ProcessingLogEntry>,
    layer_warnings: usize,
) {
    results.pass(layer.check_name());
    let status = if layer_warnings > 0 || (layer == ValidationLayer::Format && !results.warnings.is_empty()) {
        StepStatus::Warning
    } else {
        StepStatus::Passed
    };
    tracing::debug!(layer = layer.check_name(), ?status, "Validation layer passed");
    log.push(ProcessingLogEntry::new(layer.check_name(), StepType::Validation, status, elapsed));
}

fn fail(
    layer: ValidationLayer,
    elapsed: Duration,
    error: ErrorRecord,
    results: &mut ValidationResult,
    log: &mut Vec<ProcessingLogEntry>,
) -> ErrorRecord {
    tracing::debug!(layer = layer.check_name(), code = %error.error_code, "Validation layer failed");
    results.fail(error.clone());
    log.push(failed_entry(layer, elapsed, results));
    error
}

fn failed_entry(layer: ValidationLayer, elapsed: Duration, results: &ValidationResult) -> ProcessingLogEntry {
    let entry = ProcessingLogEntry::new(layer.check_name(), StepType::Validation, StepStatus::Failed, elapsed);
    match results.first_error() {
        Some(error) => entry.with_error(error.summary()),
        None => entry,
    }
}
