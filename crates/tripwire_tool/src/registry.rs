//! Service registry: service name to handler and capability set.

use crate::capability::CapabilitySet;
use crate::descriptor::ToolDescriptor;
use crate::schema::ServiceSchema;
use crate::service::{ServiceHandler, ServiceMode};
use indexmap::IndexMap;
use serde::Serialize;
use std::sync::Arc;
use tripwire_core::{Action, Timestamp};

/// Error from registry operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Name does not follow the naming convention
    #[error("Invalid service name: '{name}'")]
    InvalidName {
        /// Offending name
        name: String,
    },
    /// Service already registered
    #[error("Service already registered: {name}")]
    AlreadyRegistered {
        /// Service name
        name: String,
    },
    /// Service not found
    #[error("Service not found: {name}")]
    NotFound {
        /// Service name
        name: String,
    },
    /// Service declares no actions
    #[error("Service {name} declares no actions")]
    EmptyCapabilities {
        /// Service name
        name: String,
    },
}

/// Registered service
#[derive(Clone)]
struct ServiceEntry {
    handler: Arc<dyn ServiceHandler>,
    registered_at: Timestamp,
}

/// Serializable summary of a registered service
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceInfo {
    /// Service name
    pub name: String,
    /// Live or mock
    pub mode: ServiceMode,
    /// Supported actions
    pub supported_actions: Vec<Action>,
    /// Union of supported item types
    pub supported_item_types: Vec<String>,
    /// Number of descriptors contributed to the catalog
    pub descriptor_count: usize,
    /// Registration time
    pub registered_at: Timestamp,
}

/// Registry of backend services
///
/// Built once at start-up and owned by the router. Iteration order is
/// registration order.
#[derive(Default)]
pub struct ServiceRegistry {
    services: IndexMap<String, ServiceEntry>,
}

impl ServiceRegistry {
    /// Create a new empty registry
    #[must_use]
    pub fn new() -> Self {
        Self {
            services: IndexMap::new(),
        }
    }

    /// Register a service and return the descriptors it contributes
    ///
    /// # Errors
    ///
    /// Returns error if the name is invalid, the service declares no actions,
    /// or a service with the same name exists
    pub fn register(
        &mut self,
        handler: Arc<dyn ServiceHandler>,
    ) -> Result<Vec<ToolDescriptor>, RegistryError> {
        let name = handler.name().to_string();
        validate_name(&name)?;

        if handler.capabilities().is_empty() {
            return Err(RegistryError::EmptyCapabilities { name });
        }
        if self.services.contains_key(&name) {
            return Err(RegistryError::AlreadyRegistered { name });
        }

        let descriptors = descriptors_for(&name, handler.capabilities());
        tracing::info!(
            service = %name,
            mode = ?handler.mode(),
            descriptors = descriptors.len(),
            "Registered service"
        );
        self.services.insert(
            name,
            ServiceEntry {
                handler,
                registered_at: Timestamp::now(),
            },
        );
        Ok(descriptors)
    }

    /// Get a handler by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn ServiceHandler>> {
        self.services.get(name).map(|e| Arc::clone(&e.handler))
    }

    /// Capability set of a service
    #[must_use]
    pub fn capabilities(&self, name: &str) -> Option<&CapabilitySet> {
        self.services.get(name).map(|e| e.handler.capabilities())
    }

    /// Schema of a service
    ///
    /// # Errors
    ///
    /// Returns error if the service is not registered
    pub fn schema(&self, name: &str) -> Result<ServiceSchema, RegistryError> {
        self.services
            .get(name)
            .map(|e| e.handler.schema())
            .ok_or_else(|| RegistryError::NotFound {
                name: name.to_string(),
            })
    }

    /// Check if a service is registered
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.services.contains_key(name)
    }

    /// Registered names in registration order
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.services.keys().cloned().collect()
    }

    /// Summaries of every service
    #[must_use]
    pub fn list(&self) -> Vec<ServiceInfo> {
        self.services
            .iter()
            .map(|(name, entry)| {
                let caps = entry.handler.capabilities();
                ServiceInfo {
                    name: name.clone(),
                    mode: entry.handler.mode(),
                    supported_actions: caps.supported_actions(),
                    supported_item_types: caps.supported_item_types(),
                    descriptor_count: caps.descriptor_ids(name).len(),
                    registered_at: entry.registered_at,
                }
            })
            .collect()
    }

    /// Number of services
    #[must_use]
    pub fn count(&self) -> usize {
        self.services.len()
    }

    /// Check if registry is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

/// Descriptors derived from a capability set
#[must_use]
pub fn descriptors_for(service: &str, capabilities: &CapabilitySet) -> Vec<ToolDescriptor> {
    capabilities
        .descriptor_ids(service)
        .into_iter()
        .map(|(_, action, item_type)| ToolDescriptor::new(service, action, item_type.as_deref()))
        .collect()
}

/// Service names are lowercase alphanumerics and single underscores,
/// not starting or ending with an underscore.
///
/// # Errors
///
/// Returns error if the name breaks the convention
pub fn validate_name(name: &str) -> Result<(), RegistryError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        && !name.starts_with('_')
        && !name.ends_with('_')
        && !name.contains("__");

    if valid {
        Ok(())
    } else {
        Err(RegistryError::InvalidName {
            name: name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::ServiceFault;
    use async_trait::async_trait;
    use serde_json::{Map, Value};

    struct DummyService {
        name: String,
        capabilities: CapabilitySet,
    }

    #[async_trait]
    impl ServiceHandler for DummyService {
        fn name(&self) -> &str {
            &self.name
        }

        fn capabilities(&self) -> &CapabilitySet {
            &self.capabilities
        }

        async fn execute(
            &self,
            _action: Action,
            _payload: &Map<String, Value>,
            _item_type: Option<&str>,
        ) -> Result<Value, ServiceFault> {
            Ok(Value::Bool(true))
        }
    }

    fn make_service(name: &str) -> Arc<dyn ServiceHandler> {
        Arc::new(DummyService {
            name: name.to_string(),
            capabilities: CapabilitySet::new()
                .with_actions([Action::Create, Action::Read])
                .with_item_types(["note"]),
        })
    }

    #[test]
    fn test_registry_new() {
        let registry = ServiceRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn test_registry_register() {
        let mut registry = ServiceRegistry::new();
        let descriptors = registry.register(make_service("notes")).unwrap();

        assert_eq!(descriptors.len(), 2);
        assert!(registry.contains("notes"));
        assert_eq!(registry.names(), vec!["notes"]);
        assert!(registry.get("notes").is_some());
    }

    #[test]
    fn test_registry_register_duplicate() {
        let mut registry = ServiceRegistry::new();
        registry.register(make_service("notes")).unwrap();
        let result = registry.register(make_service("notes"));
        assert_eq!(
            result.unwrap_err(),
            RegistryError::AlreadyRegistered {
                name: "notes".to_string()
            }
        );
    }

    #[test]
    fn test_registry_rejects_empty_capabilities() {
        let mut registry = ServiceRegistry::new();
        let service = Arc::new(DummyService {
            name: "empty".to_string(),
            capabilities: CapabilitySet::new(),
        });
        assert!(matches!(
            registry.register(service),
            Err(RegistryError::EmptyCapabilities { .. })
        ));
    }

    #[test]
    fn test_registry_get_not_found() {
        let registry = ServiceRegistry::new();
        assert!(registry.get("nonexistent").is_none());
        assert!(registry.schema("nonexistent").is_err());
    }

    #[test]
    fn test_registry_list_and_descriptors() {
        let mut registry = ServiceRegistry::new();
        let notes = registry.register(make_service("notes")).unwrap();
        let journal = registry.register(make_service("journal")).unwrap();

        let infos = registry.list();
        assert_eq!(infos[0].name, "notes");
        assert_eq!(infos[1].supported_item_types, vec!["note"]);
        assert_eq!(infos[1].descriptor_count, 2);
        assert_eq!(notes.len() + journal.len(), 4);
    }

    #[test]
    fn test_validate_name_valid() {
        assert!(validate_name("todoist").is_ok());
        assert!(validate_name("deep_pcb").is_ok());
        assert!(validate_name("gcal2").is_ok());
    }

    #[test]
    fn test_validate_name_invalid() {
        assert!(validate_name("").is_err());
        assert!(validate_name("GCal").is_err());
        assert!(validate_name("_gmail").is_err());
        assert!(validate_name("gmail_").is_err());
        assert!(validate_name("deep__pcb").is_err());
        assert!(validate_name("deep-pcb").is_err());
    }
}
