//! Chooses the live or mock variant for each service, once, at start-up.

use crate::builtin;
use crate::live::{LiveService, ServiceBackend};
use crate::mock::MockService;
use crate::schema::ServiceSpec;
use crate::service::ServiceHandler;
use std::collections::HashMap;
use std::sync::Arc;

/// Builds handlers from specs
///
/// A service with a configured backend gets a [`LiveService`]; every other
/// service gets a [`MockService`].
#[derive(Default, Clone)]
pub struct ServiceFactory {
    backends: HashMap<String, Arc<dyn ServiceBackend>>,
}

impl ServiceFactory {
    /// Create a factory with no backends (all mock)
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure the backend for one service
    #[must_use]
    pub fn with_backend(mut self, service: impl Into<String>, backend: Arc<dyn ServiceBackend>) -> Self {
        self.backends.insert(service.into(), backend);
        self
    }

    /// Build the handler for a spec
    #[must_use]
    pub fn build(&self, spec: ServiceSpec) -> Arc<dyn ServiceHandler> {
        match self.backends.get(&spec.name) {
            Some(backend) => {
                tracing::debug!(service = %spec.name, "Using live handler");
                Arc::new(LiveService::new(spec, Arc::clone(backend)))
            }
            None => {
                tracing::debug!(service = %spec.name, "No backend configured, using mock handler");
                Arc::new(MockService::new(spec))
            }
        }
    }

    /// Handlers for every built-in service
    #[must_use]
    pub fn build_builtin(&self) -> Vec<Arc<dyn ServiceHandler>> {
        builtin::all().into_iter().map(|spec| self.build(spec)).collect()
    }
}
