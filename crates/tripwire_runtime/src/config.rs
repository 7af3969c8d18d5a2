//! Router configuration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Which loaded descriptor to evict when the loaded set is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionPolicy {
    /// Least frequently used
    #[default]
    Lfu,
    /// Least recently used
    Lru,
    /// Weighted usage and recency
    Hybrid,
}

impl EvictionPolicy {
    /// Wire name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Lfu => "lfu",
            Self::Lru => "lru",
            Self::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for EvictionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EvictionPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lfu" => Ok(Self::Lfu),
            "lru" => Ok(Self::Lru),
            "hybrid" => Ok(Self::Hybrid),
            _ => Err(ConfigError::UnknownPolicy {
                value: s.to_string(),
            }),
        }
    }
}

/// Weights for the hybrid score `usage_weight * usage_count + recency_weight * recency_rank`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HybridWeights {
    /// Weight on usage count
    pub usage_weight: f64,
    /// Weight on recency rank (0 = least recently used)
    pub recency_weight: f64,
}

impl Default for HybridWeights {
    fn default() -> Self {
        Self {
            usage_weight: 1.0,
            recency_weight: 1.0,
        }
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// Loaded set capacity must be at least one
    #[error("max_loaded_tools must be at least 1")]
    ZeroCapacity,
    /// A timeout is zero
    #[error("{field} must be greater than zero")]
    ZeroTimeout {
        /// Offending field
        field: &'static str,
    },
    /// Default timeout above the ceiling
    #[error("default_timeout_ms ({default_ms}) exceeds max_timeout_ms ({max_ms})")]
    TimeoutAboveCeiling {
        /// Default timeout
        default_ms: u64,
        /// Ceiling
        max_ms: u64,
    },
    /// Hybrid weight negative or not finite
    #[error("hybrid weight {field} must be finite and non-negative, got {value}")]
    InvalidWeight {
        /// Offending field
        field: &'static str,
        /// Supplied value
        value: f64,
    },
    /// Status store capacity is zero
    #[error("status_capacity must be at least 1")]
    ZeroStatusCapacity,
    /// Batch size limit is zero
    #[error("max_batch_size must be at least 1")]
    ZeroBatchSize,
    /// Unknown eviction policy name
    #[error("unknown eviction policy '{value}', expected lfu, lru or hybrid")]
    UnknownPolicy {
        /// Supplied value
        value: String,
    },
}

/// Router configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Loaded set capacity
    pub max_loaded_tools: usize,
    /// Active eviction policy
    pub eviction_policy: EvictionPolicy,
    /// Hybrid policy weights
    pub hybrid_weights: HybridWeights,
    /// Dispatch deadline when the caller gives none
    pub default_timeout_ms: u64,
    /// Ceiling on any caller deadline
    pub max_timeout_ms: u64,
    /// Packet snapshots retained for status queries
    pub status_capacity: usize,
    /// Largest accepted batch
    pub max_batch_size: usize,
}

impl RouterConfig {
    /// Create a config with default values
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_loaded_tools: 80,
            eviction_policy: EvictionPolicy::Lfu,
            hybrid_weights: HybridWeights::default(),
            default_timeout_ms: 30_000,
            max_timeout_ms: 300_000,
            status_capacity: 1000,
            max_batch_size: 100,
        }
    }

    /// Set loaded set capacity
    #[must_use]
    pub fn with_max_loaded_tools(mut self, max: usize) -> Self {
        self.max_loaded_tools = max;
        self
    }

    /// Set eviction policy
    #[must_use]
    pub fn with_eviction_policy(mut self, policy: EvictionPolicy) -> Self {
        self.eviction_policy = policy;
        self
    }

    /// Set hybrid weights
    #[must_use]
    pub fn with_hybrid_weights(mut self, weights: HybridWeights) -> Self {
        self.hybrid_weights = weights;
        self
    }

    /// Set default dispatch timeout
    #[must_use]
    pub fn with_default_timeout(mut self, timeout_ms: u64) -> Self {
        self.default_timeout_ms = timeout_ms;
        self
    }

    /// Set timeout ceiling
    #[must_use]
    pub fn with_max_timeout(mut self, timeout_ms: u64) -> Self {
        self.max_timeout_ms = timeout_ms;
        self
    }

    /// Set status store capacity
    #[must_use]
    pub fn with_status_capacity(mut self, capacity: usize) -> Self {
        self.status_capacity = capacity;
        self
    }

    /// Set batch size limit
    #[must_use]
    pub fn with_max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = size;
        self
    }

    /// Default timeout as a duration
    #[must_use]
    pub const fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    /// Timeout ceiling as a duration
    #[must_use]
    pub const fn max_timeout(&self) -> Duration {
        Duration::from_millis(self.max_timeout_ms)
    }

    /// Check every field
    ///
    /// # Errors
    ///
    /// Returns the first invalid field found
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_loaded_tools == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.default_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout {
                field: "default_timeout_ms",
            });
        }
        if self.max_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout {
                field: "max_timeout_ms",
            });
        }
        if self.default_timeout_ms > self.max_timeout_ms {
            return Err(ConfigError::TimeoutAboveCeiling {
                default_ms: self.default_timeout_ms,
                max_ms: self.max_timeout_ms,
            });
        }
        validate_weight("usage_weight", self.hybrid_weights.usage_weight)?;
        validate_weight("recency_weight", self.hybrid_weights.recency_weight)?;
        if self.status_capacity == 0 {
            return Err(ConfigError::ZeroStatusCapacity);
        }
        if self.max_batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        Ok(())
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_weight(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidWeight { field, value })
    }
}
