//! Dynamic tool manager: a capacity-bounded loaded set over the catalog.
//!
//! All load and evict decisions happen under one lock, so concurrent
//! `ensure_loaded` calls never exceed capacity and never load the same
//! descriptor twice.

use crate::config::{EvictionPolicy, HybridWeights};
use crate::eviction::{strategy_for, EvictionStrategy};
use indexmap::{IndexMap, IndexSet};
use serde::Serialize;
use tokio::sync::Mutex;
use tripwire_core::{DescriptorId, LogicalClock, Timestamp};
use tripwire_tool::ToolDescriptor;

/// Tool manager errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ManagerError {
    /// Descriptor is not in the catalog
    #[error("Tool descriptor not registered: {id}")]
    NotRegistered {
        /// Descriptor id
        id: DescriptorId,
    },
    /// Capacity of zero
    #[error("Capacity must be at least 1, got {capacity}")]
    InvalidCapacity {
        /// Requested capacity
        capacity: usize,
    },
}

/// What `ensure_loaded` did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LoadOutcome {
    /// Already loaded
    Hit,
    /// Loaded into a free slot
    Loaded,
    /// Loaded after evicting one descriptor
    Evicted {
        /// The evicted descriptor
        victim: DescriptorId,
    },
}

/// Usage summary for one descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsageEntry {
    /// Descriptor id
    pub id: DescriptorId,
    /// Usage count
    pub usage_count: u64,
}

/// Manager statistics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManagerStats {
    /// Loaded set capacity
    pub capacity: usize,
    /// Loaded descriptors
    pub loaded: usize,
    /// Descriptors in the catalog
    pub registered: usize,
    /// Free slots
    pub available_slots: usize,
    /// Active policy
    pub policy: EvictionPolicy,
    /// `ensure_loaded` calls that found the descriptor loaded
    pub hits: u64,
    /// `ensure_loaded` calls that had to load
    pub misses: u64,
    /// Evictions performed
    pub evictions: u64,
    /// Fraction of calls that were hits
    pub hit_rate: f64,
    /// Most used descriptors, highest first
    pub most_used: Vec<UsageEntry>,
    /// Least used loaded descriptors, lowest first
    pub least_used_loaded: Vec<UsageEntry>,
}

/// Entries reported in `most_used` / `least_used_loaded`
const TOP_N: usize = 5;

struct ManagerState {
    catalog: IndexMap<DescriptorId, ToolDescriptor>,
    loaded: IndexSet<DescriptorId>,
    capacity: usize,
    weights: HybridWeights,
    strategy: Box<dyn EvictionStrategy>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl ManagerState {
    /// Pick and unload one victim among loaded descriptors other than `keep`
    fn evict_one(&mut self, keep: Option<&DescriptorId>) -> Option<DescriptorId> {
        let candidates: Vec<&ToolDescriptor> = self
            .loaded
            .iter()
            .filter(|id| Some(*id) != keep)
            .filter_map(|id| self.catalog.get(id))
            .collect();

        let index = self.strategy.select_victim(&candidates)?;
        let victim = candidates[index].id().clone();
        self.unload(&victim);
        self.evictions += 1;
        tracing::info!(
            victim = %victim,
            policy = %self.strategy.policy(),
            "Evicted tool descriptor"
        );
        Some(victim)
    }

    fn unload(&mut self, id: &DescriptorId) -> bool {
        if !self.loaded.shift_remove(id) {
            return false;
        }
        if let Some(descriptor) = self.catalog.get_mut(id) {
            descriptor.set_loaded(false);
        }
        true
    }
}

/// Capacity-bounded loaded set over the descriptor catalog
pub struct DynamicToolManager {
    state: Mutex<ManagerState>,
    clock: LogicalClock,
}

impl DynamicToolManager {
    /// Create a manager
    ///
    /// # Errors
    ///
    /// Returns error if `capacity` is zero
    pub fn new(
        capacity: usize,
        policy: EvictionPolicy,
        weights: HybridWeights,
    ) -> Result<Self, ManagerError> {
        if capacity == 0 {
            return Err(ManagerError::InvalidCapacity { capacity });
        }
        Ok(Self {
            state: Mutex::new(ManagerState {
                catalog: IndexMap::new(),
                loaded: IndexSet::new(),
                capacity,
                weights,
                strategy: strategy_for(policy, weights),
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
            clock: LogicalClock::new(),
        })
    }

    /// Create a manager with an initial catalog
    ///
    /// # Errors
    ///
    /// Returns error if `capacity` is zero
    pub fn with_catalog(
        capacity: usize,
        policy: EvictionPolicy,
        weights: HybridWeights,
        descriptors: impl IntoIterator<Item = ToolDescriptor>,
    ) -> Result<Self, ManagerError> {
        let mut manager = Self::new(capacity, policy, weights)?;
        let state = manager.state.get_mut();
        for descriptor in descriptors {
            let id = descriptor.id().clone();
            state.catalog.entry(id).or_insert(descriptor);
        }
        Ok(manager)
    }

    /// Add a descriptor to the catalog. Idempotent on id; does not load.
    ///
    /// Returns whether the descriptor was new.
    pub async fn register(&self, descriptor: ToolDescriptor) -> bool {
        let mut state = self.state.lock().await;
        let id = descriptor.id().clone();
        if state.catalog.contains_key(&id) {
            return false;
        }
        tracing::debug!(descriptor = %id, "Registered tool descriptor");
        state.catalog.insert(id, descriptor);
        true
    }

    /// Register many descriptors, returning how many were new
    pub async fn register_all(&self, descriptors: impl IntoIterator<Item = ToolDescriptor>) -> usize {
        let mut state = self.state.lock().await;
        let mut added = 0;
        for descriptor in descriptors {
            let id = descriptor.id().clone();
            if !state.catalog.contains_key(&id) {
                state.catalog.insert(id, descriptor);
                added += 1;
            }
        }
        added
    }

    /// Make a descriptor resident and count one use.
    ///
    /// Evicts at most one other descriptor, chosen by the active policy,
    /// when the loaded set is full.
    ///
    /// # Errors
    ///
    /// Returns error if the descriptor is not registered
    pub async fn ensure_loaded(&self, id: &DescriptorId) -> Result<LoadOutcome, ManagerError> {
        let mut state = self.state.lock().await;
        let tick = self.clock.tick();

        let descriptor = state
            .catalog
            .get_mut(id)
            .ok_or_else(|| ManagerError::NotRegistered { id: id.clone() })?;
        descriptor.record_use(tick, Timestamp::now());

        if descriptor.is_loaded() {
            state.hits += 1;
            tracing::debug!(descriptor = %id, "Tool cache hit");
            return Ok(LoadOutcome::Hit);
        }

        state.misses += 1;
        let victim = if state.loaded.len() >= state.capacity {
            state.evict_one(Some(id))
        } else {
            None
        };

        state.loaded.insert(id.clone());
        if let Some(descriptor) = state.catalog.get_mut(id) {
            descriptor.set_loaded(true);
        }
        tracing::info!(
            descriptor = %id,
            loaded = state.loaded.len(),
            capacity = state.capacity,
            "Loaded tool descriptor"
        );

        Ok(match victim {
            Some(victim) => LoadOutcome::Evicted { victim },
            None => LoadOutcome::Loaded,
        })
    }

    /// Unload a descriptor, keeping its statistics
    ///
    /// Returns whether it was loaded.
    ///
    /// # Errors
    ///
    /// Returns error if the descriptor is not registered
    pub async fn unload(&self, id: &DescriptorId) -> Result<bool, ManagerError> {
        let mut state = self.state.lock().await;
        if !state.catalog.contains_key(id) {
            return Err(ManagerError::NotRegistered { id: id.clone() });
        }
        let was_loaded = state.unload(id);
        if was_loaded {
            tracing::info!(descriptor = %id, "Unloaded tool descriptor");
        }
        Ok(was_loaded)
    }

    /// Change capacity, evicting by the active policy down to the new size
    ///
    /// # Errors
    ///
    /// Returns error if `capacity` is zero
    pub async fn set_capacity(&self, capacity: usize) -> Result<Vec<DescriptorId>, ManagerError> {
        if capacity == 0 {
            return Err(ManagerError::InvalidCapacity { capacity });
        }
        let mut state = self.state.lock().await;
        state.capacity = capacity;
        let mut evicted = Vec::new();
        while state.loaded.len() > capacity {
            match state.evict_one(None) {
                Some(victim) => evicted.push(victim),
                None => break,
            }
        }
        tracing::info!(capacity, evicted = evicted.len(), "Changed tool capacity");
        Ok(evicted)
    }

    /// Switch eviction policy. Loaded set and statistics are kept.
    pub async fn set_policy(&self, policy: EvictionPolicy, weights: Option<HybridWeights>) {
        let mut state = self.state.lock().await;
        if let Some(weights) = weights {
            state.weights = weights;
        }
        state.strategy = strategy_for(policy, state.weights);
        tracing::info!(%policy, "Changed eviction policy");
    }

    /// Unload every loaded descriptor used at most `threshold` times
    pub async fn optimize(&self, threshold: u64) -> Vec<DescriptorId> {
        let mut state = self.state.lock().await;
        let cold: Vec<DescriptorId> = state
            .loaded
            .iter()
            .filter(|id| {
                state
                    .catalog
                    .get(*id)
                    .is_some_and(|d| d.usage_count() <= threshold)
            })
            .cloned()
            .collect();
        for id in &cold {
            state.unload(id);
        }
        tracing::info!(threshold, unloaded = cold.len(), "Optimized tool cache");
        cold
    }

    /// Snapshot of one descriptor
    pub async fn descriptor(&self, id: &DescriptorId) -> Option<ToolDescriptor> {
        self.state.lock().await.catalog.get(id).cloned()
    }

    /// Whether a descriptor is loaded
    pub async fn is_loaded(&self, id: &DescriptorId) -> bool {
        self.state.lock().await.loaded.contains(id)
    }

    /// Loaded descriptors in load order
    pub async fn list_loaded(&self) -> Vec<ToolDescriptor> {
        let state = self.state.lock().await;
        state
            .loaded
            .iter()
            .filter_map(|id| state.catalog.get(id).cloned())
            .collect()
    }

    /// Every registered descriptor in registration order
    pub async fn list_registered(&self) -> Vec<ToolDescriptor> {
        self.state.lock().await.catalog.values().cloned().collect()
    }

    /// Current capacity
    pub async fn capacity(&self) -> usize {
        self.state.lock().await.capacity
    }

    /// Active policy
    pub async fn policy(&self) -> EvictionPolicy {
        self.state.lock().await.strategy.policy()
    }

    /// Statistics snapshot
    pub async fn stats(&self) -> ManagerStats {
        let state = self.state.lock().await;

        let mut by_usage: Vec<&ToolDescriptor> =
            state.catalog.values().filter(|d| d.usage_count() > 0).collect();
        by_usage.sort_by(|a, b| b.usage_count().cmp(&a.usage_count()).then_with(|| a.id().cmp(b.id())));
        let most_used = by_usage.iter().take(TOP_N).map(|d| usage_entry(d)).collect();

        let mut loaded: Vec<&ToolDescriptor> =
            state.loaded.iter().filter_map(|id| state.catalog.get(id)).collect();
        loaded.sort_by(|a, b| a.usage_count().cmp(&b.usage_count()).then_with(|| a.id().cmp(b.id())));
        let least_used_loaded = loaded.iter().take(TOP_N).map(|d| usage_entry(d)).collect();

        let calls = state.hits + state.misses;
        ManagerStats {
            capacity: state.capacity,
            loaded: state.loaded.len(),
            registered: state.catalog.len(),
            available_slots: state.capacity.saturating_sub(state.loaded.len()),
            policy: state.strategy.policy(),
            hits: state.hits,
            misses: state.misses,
            evictions: state.evictions,
            hit_rate: if calls == 0 { 0.0 } else { state.hits as f64 / calls as f64 },
            most_used,
            least_used_loaded,
        }
    }
}

fn usage_entry(descriptor: &ToolDescriptor) -> UsageEntry {
    UsageEntry {
        id: descriptor.id().clone(),
        usage_count: descriptor.usage_count(),
    }
}
