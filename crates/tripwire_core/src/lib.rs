//! TRIPWIRE Core Types
//!
//! This crate contains the pure packet model with no I/O.
//! Everything here is serializable and safe to share across tasks.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod action;
pub mod checksum;
pub mod error;
pub mod id;
pub mod packet;
pub mod report;
pub mod time;

// Re-exports
pub use action::{Action, PacketStatus, Priority};
pub use checksum::{Checksum, ChecksumError};
pub use error::{CoreError, CoreResult};
pub use id::{DescriptorId, PacketId};
pub use packet::{Packet, PacketRequest};
pub use report::{
    ErrorKind, ErrorRecord, PacketResponse, ProcessingLogEntry, StepStatus, StepType,
    ValidationResult,
};
pub use time::{LogicalClock, LogicalTime, Timestamp};
