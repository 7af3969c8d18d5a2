//! TRIPWIRE Runtime
//!
//! Routes validated packets to service handlers through a
//! capacity-bounded tool manager, with deadline-bounded dispatch.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod eviction;
pub mod executor;
pub mod manager;
pub mod monitor;
pub mod router;
pub mod store;

pub use config::{ConfigError, EvictionPolicy, HybridWeights, RouterConfig};
pub use eviction::{strategy_for, EvictionStrategy, HybridStrategy, LfuStrategy, LruStrategy};
pub use executor::{DispatchResult, Executor};
pub use manager::{DynamicToolManager, LoadOutcome, ManagerError, ManagerStats, UsageEntry};
pub use monitor::{MetricsSnapshot, RouterMetrics};
pub use router::{BatchMode, BatchResponse, PacketRouter, RouterError};
pub use store::{PacketSnapshot, StatusStore};
