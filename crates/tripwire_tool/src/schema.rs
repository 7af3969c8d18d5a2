//! Service schemas describe payload keys per operation.
//!
//! Schemas are introspection data for callers. The pipeline never
//! enforces them; handlers own payload interpretation.

use crate::capability::CapabilitySet;
use serde::{Deserialize, Serialize};
use tripwire_core::Action;

/// Payload keys for one (action, item type) pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationSchema {
    /// Action
    pub action: Action,
    /// Item type, absent for services without item types
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_type: Option<String>,
    /// Keys the handler requires
    pub required: Vec<String>,
    /// Keys the handler understands
    pub optional: Vec<String>,
}

impl OperationSchema {
    /// Create an operation schema
    #[must_use]
    pub fn new(action: Action, item_type: Option<&str>) -> Self {
        Self {
            action,
            item_type: item_type.map(str::to_string),
            required: Vec::new(),
            optional: Vec::new(),
        }
    }

    /// Add required keys
    #[must_use]
    pub fn required(mut self, keys: &[&str]) -> Self {
        self.required.extend(keys.iter().map(|k| (*k).to_string()));
        self
    }

    /// Add optional keys
    #[must_use]
    pub fn optional(mut self, keys: &[&str]) -> Self {
        self.optional.extend(keys.iter().map(|k| (*k).to_string()));
        self
    }
}

/// Schema for a whole service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSchema {
    /// Service name
    pub service: String,
    /// Short description
    pub description: String,
    /// Operations in declaration order
    pub operations: Vec<OperationSchema>,
}

impl ServiceSchema {
    /// Create an empty schema
    #[must_use]
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            description: String::new(),
            operations: Vec::new(),
        }
    }

    /// Set description
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Add an operation
    #[must_use]
    pub fn with_operation(mut self, operation: OperationSchema) -> Self {
        self.operations.push(operation);
        self
    }

    /// Find the operation for an action and item type
    #[must_use]
    pub fn operation(&self, action: Action, item_type: Option<&str>) -> Option<&OperationSchema> {
        self.operations
            .iter()
            .find(|op| op.action == action && op.item_type.as_deref() == item_type)
    }
}

/// Everything needed to construct a handler variant for one service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSpec {
    /// Service name
    pub name: String,
    /// Capability set
    pub capabilities: CapabilitySet,
    /// Payload schema
    pub schema: ServiceSchema,
}

impl ServiceSpec {
    /// Create a spec with an empty schema
    #[must_use]
    pub fn new(name: impl Into<String>, capabilities: CapabilitySet) -> Self {
        let name = name.into();
        Self {
            schema: ServiceSchema::new(name.clone()),
            name,
            capabilities,
        }
    }

    /// Set schema
    #[must_use]
    pub fn with_schema(mut self, schema: ServiceSchema) -> Self {
        self.schema = schema;
        self
    }
}
