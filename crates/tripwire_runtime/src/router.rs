//! Packet router.
//!
//! Ties validation, the tool manager and dispatch together per packet,
//! and runs batches sequentially or concurrently.

use crate::config::{ConfigError, RouterConfig};
use crate::executor::{DispatchResult, Executor};
use crate::manager::{DynamicToolManager, ManagerError};
use crate::monitor::RouterMetrics;
use crate::store::{PacketSnapshot, StatusStore};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::Instrument;
use tripwire_core::report::duration_to_ms;
use tripwire_core::{
    DescriptorId, ErrorKind, ErrorRecord, Packet, PacketId, PacketResponse, PacketStatus,
    ProcessingLogEntry, StepStatus, StepType, ValidationResult,
};
use tripwire_tool::{
    PipelineOutcome, RegistryError, ServiceFault, ServiceHandler, ServiceInfo, ServiceRegistry,
    ServiceSchema, ValidationPipeline,
};

/// Check name recorded after a successful dispatch
pub const EXECUTION_CHECK: &str = "execution";

const LOAD_STEP: &str = "tool_load";
const DISPATCH_STEP: &str = "execution";

/// Router errors. Packet failures are reported inside [`PacketResponse`],
/// not here.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    /// Service registration or lookup failed
    #[error(transparent)]
    Registry(#[from] RegistryError),
    /// Tool manager rejected the request
    #[error(transparent)]
    Manager(#[from] ManagerError),
    /// Batch above the configured limit
    #[error("Batch of {size} packets exceeds the limit of {max}")]
    BatchTooLarge {
        /// Submitted size
        size: usize,
        /// Configured limit
        max: usize,
    },
}

/// How a batch is executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchMode {
    /// One packet after another, in input order
    #[default]
    Sequential,
    /// All packets concurrently; results still in input order
    Parallel,
}

/// Ordered results of a batch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchResponse {
    /// Execution mode
    pub mode: BatchMode,
    /// One response per input packet, in input order
    pub results: Vec<PacketResponse>,
    /// Packets submitted
    pub total: usize,
    /// Packets that succeeded
    pub succeeded: usize,
    /// Packets that did not
    pub failed: usize,
    /// Wall clock time for the whole batch
    pub elapsed_ms: f64,
}

/// Routes packets to services
pub struct PacketRouter {
    registry: RwLock<ServiceRegistry>,
    manager: DynamicToolManager,
    pipeline: ValidationPipeline,
    executor: Executor,
    store: StatusStore,
    metrics: RouterMetrics,
    config: RouterConfig,
}

impl PacketRouter {
    /// Create a router with no services
    ///
    /// # Errors
    ///
    /// Returns error if the config is invalid
    pub fn new(config: RouterConfig) -> Result<Self, RouterError> {
        Self::with_services(config, Vec::<Arc<dyn ServiceHandler>>::new())
    }

    /// Create a router and register `handlers` in order
    ///
    /// # Errors
    ///
    /// Returns error if the config is invalid or a handler cannot be registered
    pub fn with_services(
        config: RouterConfig,
        handlers: impl IntoIterator<Item = Arc<dyn ServiceHandler>>,
    ) -> Result<Self, RouterError> {
        config.validate()?;

        let mut registry = ServiceRegistry::new();
        let mut catalog = Vec::new();
        for handler in handlers {
            catalog.extend(registry.register(handler)?);
        }

        let manager = DynamicToolManager::with_catalog(
            config.max_loaded_tools,
            config.eviction_policy,
            config.hybrid_weights,
            catalog,
        )?;

        tracing::info!(
            services = registry.count(),
            capacity = config.max_loaded_tools,
            policy = %config.eviction_policy,
            "Packet router ready"
        );

        Ok(Self {
            registry: RwLock::new(registry),
            manager,
            pipeline: ValidationPipeline::new(),
            executor: Executor::new(config.default_timeout(), config.max_timeout()),
            store: StatusStore::new(config.status_capacity),
            metrics: RouterMetrics::new(),
            config,
        })
    }

    /// Use a different validation pipeline
    #[must_use]
    pub fn with_pipeline(mut self, pipeline: ValidationPipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    /// Register a service after start-up. Its descriptors join the catalog
    /// unloaded.
    ///
    /// Returns the number of descriptors added.
    ///
    /// # Errors
    ///
    /// Returns error if the handler cannot be registered
    pub async fn register_service(&self, handler: Arc<dyn ServiceHandler>) -> Result<usize, RouterError> {
        let mut registry = self.registry.write().await;
        let descriptors = registry.register(handler)?;
        Ok(self.manager.register_all(descriptors).await)
    }

    /// Route one raw envelope.
    ///
    /// `timeout` is the caller's dispatch deadline; it is capped at the
    /// configured ceiling and defaults to the configured default.
    pub async fn execute(&self, raw: &Value, timeout: Option<Duration>) -> PacketResponse {
        let started = Instant::now();
        self.metrics.record_received();

        let (outcome, handler) = {
            let registry = self.registry.read().await;
            let outcome = self.pipeline.run(raw, &registry);
            let handler = match &outcome {
                PipelineOutcome::Admitted { packet, .. } => registry.get(packet.tool_type()),
                _ => None,
            };
            (outcome, handler)
        };

        match outcome {
            PipelineOutcome::Malformed {
                packet_id,
                validation,
                log,
            } => self.reject_malformed(packet_id, validation, log, started).await,
            PipelineOutcome::Rejected { packet } => self.reject(packet, started).await,
            PipelineOutcome::Admitted { packet, descriptor } => {
                let span = tracing::info_span!(
                    "packet",
                    packet_id = %packet.id(),
                    tool_type = %packet.tool_type(),
                    action = %packet.action()
                );
                self.dispatch(packet, descriptor, handler, timeout, started)
                    .instrument(span)
                    .await
            }
        }
    }

    /// Route a batch.
    ///
    /// Results are in input order in both modes. A failing packet never
    /// affects its siblings.
    ///
    /// # Errors
    ///
    /// Returns error if the batch exceeds `max_batch_size`
    pub async fn execute_batch(
        &self,
        packets: &[Value],
        mode: BatchMode,
        timeout: Option<Duration>,
    ) -> Result<BatchResponse, RouterError> {
        if packets.len() > self.config.max_batch_size {
            return Err(RouterError::BatchTooLarge {
                size: packets.len(),
                max: self.config.max_batch_size,
            });
        }

        let started = Instant::now();
        let results = match mode {
            BatchMode::Sequential => {
                let mut results = Vec::with_capacity(packets.len());
                for raw in packets {
                    results.push(self.execute(raw, timeout).await);
                }
                results
            }
            BatchMode::Parallel => join_all(packets.iter().map(|raw| self.execute(raw, timeout))).await,
        };

        let succeeded = results.iter().filter(|r| r.success).count();
        tracing::info!(
            mode = ?mode,
            total = results.len(),
            succeeded,
            "Batch finished"
        );
        Ok(BatchResponse {
            mode,
            total: results.len(),
            succeeded,
            failed: results.len() - succeeded,
            results,
            elapsed_ms: duration_to_ms(started.elapsed()),
        })
    }

    /// Last known state of a packet
    pub async fn status(&self, packet_id: &PacketId) -> Option<PacketSnapshot> {
        self.store.get(packet_id).await
    }

    /// Registered services in registration order
    pub async fn list_services(&self) -> Vec<ServiceInfo> {
        self.registry.read().await.list()
    }

    /// Payload schema for one service
    ///
    /// # Errors
    ///
    /// Returns error if the service is not registered
    pub async fn service_schema(&self, name: &str) -> Result<ServiceSchema, RouterError> {
        Ok(self.registry.read().await.schema(name)?)
    }

    /// The tool manager
    #[must_use]
    pub const fn manager(&self) -> &DynamicToolManager {
        &self.manager
    }

    /// Router metrics
    #[must_use]
    pub const fn metrics(&self) -> &RouterMetrics {
        &self.metrics
    }

    /// Active configuration
    #[must_use]
    pub const fn config(&self) -> &RouterConfig {
        &self.config
    }

    async fn reject_malformed(
        &self,
        packet_id: PacketId,
        validation: ValidationResult,
        log: Vec<ProcessingLogEntry>,
        started: Instant,
    ) -> PacketResponse {
        let elapsed = started.elapsed();
        let error = validation.first_error().cloned().unwrap_or_else(|| {
            ErrorRecord::new(
                ErrorKind::FormatError,
                "INVALID_ENVELOPE",
                "Packet could not be parsed",
                "packet",
            )
        });
        tracing::debug!(packet_id = %packet_id, code = %error.error_code, "Malformed packet");

        self.store
            .record(PacketSnapshot::from_malformed(packet_id, validation.clone(), log.clone()))
            .await;
        self.metrics.record_rejected(elapsed);

        PacketResponse {
            packet_id,
            status: PacketStatus::Error,
            success: false,
            data: None,
            error: Some(error),
            validation_results: validation,
            processing_log: log,
            elapsed_ms: duration_to_ms(elapsed),
        }
    }

    async fn reject(&self, packet: Packet, started: Instant) -> PacketResponse {
        let elapsed = started.elapsed();
        if let Some(error) = packet.error() {
            tracing::debug!(
                packet_id = %packet.id(),
                code = %error.error_code,
                "Packet rejected"
            );
        }
        self.store.record(PacketSnapshot::from_packet(&packet)).await;
        self.metrics.record_rejected(elapsed);
        PacketResponse::from_packet(&packet, None, elapsed)
    }

    async fn dispatch(
        &self,
        mut packet: Packet,
        descriptor: DescriptorId,
        handler: Option<Arc<dyn ServiceHandler>>,
        timeout: Option<Duration>,
        started: Instant,
    ) -> PacketResponse {
        let Some(handler) = handler else {
            let error = ErrorRecord::new(
                ErrorKind::ServiceUnavailable,
                "SERVICE_NOT_AVAILABLE",
                format!("Service '{}' has no handler", packet.tool_type()),
                "tool_type",
            )
            .suggest("Call list_services to see registered services");
            packet.record_error(error);
            return self.finish(packet, PacketStatus::Error, None, started).await;
        };

        let load_started = Instant::now();
        match self.manager.ensure_loaded(&descriptor).await {
            Ok(outcome) => {
                tracing::debug!(descriptor = %descriptor, ?outcome, "Descriptor ready");
                packet.log_step(ProcessingLogEntry::new(
                    LOAD_STEP,
                    StepType::Cache,
                    StepStatus::Passed,
                    load_started.elapsed(),
                ));
            }
            Err(err) => {
                let error = ErrorRecord::new(
                    ErrorKind::ExecutionError,
                    "TOOL_LOAD_FAILED",
                    err.to_string(),
                    "tool_type",
                )
                .actual(descriptor.as_str())
                .suggest("Register the service before routing packets to it");
                packet.log_step(
                    ProcessingLogEntry::new(
                        LOAD_STEP,
                        StepType::Cache,
                        StepStatus::Failed,
                        load_started.elapsed(),
                    )
                    .with_error(error.summary()),
                );
                packet.record_error(error);
                return self.finish(packet, PacketStatus::Error, None, started).await;
            }
        }

        advance(&mut packet, PacketStatus::Processing);
        self.store.record(PacketSnapshot::from_packet(&packet)).await;

        let deadline = self.executor.deadline(timeout);
        let request = packet.request();
        let (result, elapsed) = self
            .executor
            .dispatch(
                handler,
                request.action,
                request.payload.clone(),
                descriptor.item_type().map(str::to_string),
                deadline,
            )
            .await;

        let (next, data) = match result {
            DispatchResult::Completed(value) => {
                let mut checks = ValidationResult::new();
                checks.pass(EXECUTION_CHECK);
                packet.record_validation(checks);
                packet.log_step(ProcessingLogEntry::new(
                    DISPATCH_STEP,
                    StepType::Dispatch,
                    StepStatus::Passed,
                    elapsed,
                ));
                (PacketStatus::Success, Some(value))
            }
            DispatchResult::TimedOut { deadline } => {
                let error = timeout_record(deadline, elapsed);
                tracing::warn!(deadline_ms = deadline.as_millis() as u64, "Dispatch timed out");
                packet.log_step(
                    ProcessingLogEntry::new(DISPATCH_STEP, StepType::Dispatch, StepStatus::TimedOut, elapsed)
                        .with_error(error.summary()),
                );
                packet.record_error(error);
                (PacketStatus::Timeout, None)
            }
            DispatchResult::Faulted(fault) => {
                let error = fault_record(&fault, packet.tool_type());
                tracing::warn!(error = %fault, "Service fault");
                fail_dispatch(&mut packet, error, elapsed);
                (PacketStatus::Error, None)
            }
            DispatchResult::Panicked { message } => {
                let error = ErrorRecord::new(
                    ErrorKind::ExecutionError,
                    "HANDLER_PANIC",
                    format!("Handler for '{}' panicked: {}", packet.tool_type(), message),
                    "tool_type",
                )
                .suggest("Report the failure to the service maintainer");
                tracing::warn!(panic = %message, "Handler panicked");
                fail_dispatch(&mut packet, error, elapsed);
                (PacketStatus::Error, None)
            }
            DispatchResult::Cancelled => {
                let error = ErrorRecord::new(
                    ErrorKind::ExecutionError,
                    "HANDLER_CANCELLED",
                    "Handler task was cancelled before completing",
                    "tool_type",
                )
                .suggest("Retry the packet");
                tracing::warn!("Handler cancelled");
                fail_dispatch(&mut packet, error, elapsed);
                (PacketStatus::Error, None)
            }
        };

        self.finish(packet, next, data, started).await
    }

    async fn finish(
        &self,
        mut packet: Packet,
        next: PacketStatus,
        data: Option<Value>,
        started: Instant,
    ) -> PacketResponse {
        advance(&mut packet, next);
        let elapsed = started.elapsed();
        self.store.record(PacketSnapshot::from_packet(&packet)).await;
        self.metrics.record_finished(packet.status(), elapsed);
        tracing::info!(
            status = %packet.status(),
            elapsed_ms = duration_to_ms(elapsed),
            "Packet finished"
        );
        PacketResponse::from_packet(&packet, data, elapsed)
    }
}

fn fail_dispatch(packet: &mut Packet, error: ErrorRecord, elapsed: Duration) {
    packet.log_step(
        ProcessingLogEntry::new(DISPATCH_STEP, StepType::Dispatch, StepStatus::Failed, elapsed)
            .with_error(error.summary()),
    );
    packet.record_error(error);
}

/// Apply a lifecycle step the router knows to be legal
fn advance(packet: &mut Packet, next: PacketStatus) {
    if let Err(err) = packet.transition(next) {
        tracing::error!(packet_id = %packet.id(), error = %err, "Illegal packet transition");
    }
}

fn timeout_record(deadline: Duration, elapsed: Duration) -> ErrorRecord {
    let deadline_ms = deadline.as_millis();
    ErrorRecord::new(
        ErrorKind::Timeout,
        "DISPATCH_TIMEOUT",
        format!(
            "Dispatch exceeded its {} ms deadline after {:.1} ms",
            deadline_ms,
            duration_to_ms(elapsed)
        ),
        "timeout_ms",
    )
    .expected(format!("completion within {} ms", deadline_ms))
    .actual(duration_to_ms(elapsed))
    .suggest("Retry with a longer timeout")
    .suggest("Check the backend service for slowness")
}

fn fault_record(fault: &ServiceFault, service: &str) -> ErrorRecord {
    let mut error = ErrorRecord::new(
        ErrorKind::ExecutionError,
        "SERVICE_FAULT",
        fault.to_string(),
        fault.field_path(),
    );
    error = match fault {
        ServiceFault::MissingField { field, .. } => error
            .expected(format!("payload containing '{}'", field))
            .suggest(format!("Add '{}' to the payload", field)),
        ServiceFault::InvalidField { field, .. } => {
            error.suggest(format!("Correct the value of '{}'", field))
        }
        ServiceFault::Unsupported { .. } | ServiceFault::Backend { .. } => error,
    };
    error.suggest(format!(
        "Call get_service_schema for '{}' to see the expected payload",
        service
    ))
}
