//! TRIPWIRE Service System
//!
//! Capability contract for backend services, the service registry and
//! tool descriptor catalog, live and mock handler variants, and the
//! pre-dispatch validation layers.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod builtin;
pub mod capability;
pub mod descriptor;
pub mod factory;
pub mod live;
pub mod mock;
pub mod pipeline;
pub mod registry;
pub mod schema;
pub mod service;

pub use capability::CapabilitySet;
pub use descriptor::ToolDescriptor;
pub use factory::ServiceFactory;
pub use live::{LiveService, ServiceBackend};
pub use mock::MockService;
pub use pipeline::{PipelineOutcome, ValidationLayer, ValidationPipeline};
pub use registry::{RegistryError, ServiceInfo, ServiceRegistry};
pub use schema::{OperationSchema, ServiceSchema, ServiceSpec};
pub use service::{ServiceFault, ServiceHandler, ServiceMode};
