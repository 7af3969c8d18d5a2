//! Service handler contract

use crate::capability::CapabilitySet;
use crate::schema::ServiceSchema;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tripwire_core::Action;

/// Whether a handler talks to a real backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceMode {
    /// Backed by an external client
    Live,
    /// Degraded, in-process sample data
    Mock,
}

/// A fault raised by a handler during execution
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceFault {
    /// A payload key the operation needs is absent
    #[error("'{field}' is required for {action} operations")]
    MissingField {
        /// Payload key
        field: String,
        /// Operation
        action: Action,
    },
    /// A payload value has the wrong shape
    #[error("invalid value for '{field}': {reason}")]
    InvalidField {
        /// Payload key
        field: String,
        /// What is wrong
        reason: String,
    },
    /// The handler does not implement this operation
    #[error("{service} cannot {action} {item_type}")]
    Unsupported {
        /// Service name
        service: String,
        /// Action
        action: Action,
        /// Item type, `*` when absent
        item_type: String,
    },
    /// The backend reported an error
    #[error("{message}")]
    Backend {
        /// Backend message
        message: String,
    },
}

impl ServiceFault {
    /// Create a backend fault
    #[must_use]
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    /// Dotted path of the offending value
    #[must_use]
    pub fn field_path(&self) -> String {
        match self {
            Self::MissingField { field, .. } | Self::InvalidField { field, .. } => {
                format!("payload.{}", field)
            }
            Self::Unsupported { .. } => "action".to_string(),
            Self::Backend { .. } => "payload".to_string(),
        }
    }
}

/// A backend service reachable through the packet envelope.
///
/// The router never inspects payloads; it checks the capability set and
/// calls `execute`. New services are added by implementing this trait.
#[async_trait]
pub trait ServiceHandler: Send + Sync {
    /// Service identifier, used as `tool_type`
    fn name(&self) -> &str;

    /// Supported actions and item types
    fn capabilities(&self) -> &CapabilitySet;

    /// Live or mock
    fn mode(&self) -> ServiceMode {
        ServiceMode::Live
    }

    /// Payload documentation per operation
    fn schema(&self) -> ServiceSchema {
        ServiceSchema::new(self.name())
    }

    /// Perform one operation
    async fn execute(
        &self,
        action: Action,
        payload: &Map<String, Value>,
        item_type: Option<&str>,
    ) -> Result<Value, ServiceFault>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_display() {
        let fault = ServiceFault::MissingField {
            field: "id".to_string(),
            action: Action::Read,
        };
        assert_eq!(fault.to_string(), "'id' is required for read operations");
        assert_eq!(fault.field_path(), "payload.id");
    }

    #[test]
    fn test_backend_fault() {
        let fault = ServiceFault::backend("rate limited");
        assert_eq!(fault.to_string(), "rate limited");
        assert_eq!(fault.field_path(), "payload");
    }

    #[test]
    fn test_mode_serde() {
        assert_eq!(serde_json::to_string(&ServiceMode::Mock).unwrap(), "\"mock\"");
    }
}
