//! Core error types for TRIPWIRE.

use crate::action::PacketStatus;
use std::fmt;

/// Core result type
pub type CoreResult<T> = Result<T, CoreError>;

/// Core error type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Invalid ID format
    InvalidId { reason: String },

    /// Invalid timestamp
    InvalidTimestamp { reason: String },

    /// Unknown enum member
    UnknownVariant {
        /// Enum being parsed
        kind: &'static str,
        /// Offending value
        value: String,
    },

    /// Illegal packet lifecycle transition
    InvalidTransition {
        /// Current status
        from: PacketStatus,
        /// Requested status
        to: PacketStatus,
    },
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidId { reason } => write!(f, "Invalid ID: {}", reason),
            Self::InvalidTimestamp { reason } => write!(f, "Invalid timestamp: {}", reason),
            Self::UnknownVariant { kind, value } => write!(f, "Unknown {}: {}", kind, value),
            Self::InvalidTransition { from, to } => {
                write!(f, "Invalid status transition: {} -> {}", from, to)
            }
        }
    }
}

impl std::error::Error for CoreError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::InvalidId {
            reason: "not a uuid".to_string(),
        };
        assert_eq!(format!("{}", err), "Invalid ID: not a uuid");

        let err = CoreError::UnknownVariant {
            kind: "action",
            value: "explode".to_string(),
        };
        assert_eq!(err.to_string(), "Unknown action: explode");
    }

    #[test]
    fn test_transition_error_display() {
        let err = CoreError::InvalidTransition {
            from: PacketStatus::Success,
            to: PacketStatus::Processing,
        };
        assert_eq!(err.to_string(), "Invalid status transition: success -> processing");
    }
}
