//! TRIPWIRE Server
//!
//! JSON-lines tool-call surface over the packet router.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod api;
pub mod config;

pub use api::{ApiError, ApiServer, TOOL_CALLS};
pub use config::ConfigFileError;
