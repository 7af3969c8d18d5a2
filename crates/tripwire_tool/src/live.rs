//! Live handler variant backed by an injected client.

use crate::capability::CapabilitySet;
use crate::schema::{ServiceSchema, ServiceSpec};
use crate::service::{ServiceFault, ServiceHandler, ServiceMode};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use tripwire_core::Action;

/// Transport to a real backend (HTTP client, SDK wrapper, ...)
#[async_trait]
pub trait ServiceBackend: Send + Sync {
    /// Perform one call against the backend
    async fn call(
        &self,
        service: &str,
        action: Action,
        item_type: Option<&str>,
        payload: &Map<String, Value>,
    ) -> Result<Value, ServiceFault>;
}

/// Handler that forwards every call to a [`ServiceBackend`]
pub struct LiveService {
    spec: ServiceSpec,
    backend: Arc<dyn ServiceBackend>,
}

impl LiveService {
    /// Create from a spec and a backend
    #[must_use]
    pub fn new(spec: ServiceSpec, backend: Arc<dyn ServiceBackend>) -> Self {
        Self { spec, backend }
    }
}

#[async_trait]
impl ServiceHandler for LiveService {
    fn name(&self) -> &str {
        &self.spec.name
    }

    fn capabilities(&self) -> &CapabilitySet {
        &self.spec.capabilities
    }

    fn mode(&self) -> ServiceMode {
        ServiceMode::Live
    }

    fn schema(&self) -> ServiceSchema {
        self.spec.schema.clone()
    }

    async fn execute(
        &self,
        action: Action,
        payload: &Map<String, Value>,
        item_type: Option<&str>,
    ) -> Result<Value, ServiceFault> {
        self.backend
            .call(&self.spec.name, action, item_type, payload)
            .await
    }
}
