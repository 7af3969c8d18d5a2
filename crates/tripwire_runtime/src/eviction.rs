//! Eviction strategies.
//!
//! Strategies are pure: given the loaded candidates they pick one victim.
//! They never mutate descriptors. Recency is ordered by logical time, so
//! selection is deterministic for a given access sequence.

use crate::config::{EvictionPolicy, HybridWeights};
use std::cmp::Ordering;
use tripwire_tool::ToolDescriptor;

/// Chooses the descriptor to unload when the loaded set is full
pub trait EvictionStrategy: Send + Sync {
    /// Policy implemented by this strategy
    fn policy(&self) -> EvictionPolicy;

    /// Index of the victim in `candidates`, or `None` if it is empty
    fn select_victim(&self, candidates: &[&ToolDescriptor]) -> Option<usize>;
}

/// Smallest usage count, then oldest use, then id
#[derive(Debug, Clone, Copy, Default)]
pub struct LfuStrategy;

impl EvictionStrategy for LfuStrategy {
    fn policy(&self) -> EvictionPolicy {
        EvictionPolicy::Lfu
    }

    fn select_victim(&self, candidates: &[&ToolDescriptor]) -> Option<usize> {
        min_index(candidates, |a, b| {
            a.usage_count()
                .cmp(&b.usage_count())
                .then(a.last_used().cmp(&b.last_used()))
                .then_with(|| a.id().cmp(b.id()))
        })
    }
}

/// Oldest use, then smallest usage count, then id
#[derive(Debug, Clone, Copy, Default)]
pub struct LruStrategy;

impl EvictionStrategy for LruStrategy {
    fn policy(&self) -> EvictionPolicy {
        EvictionPolicy::Lru
    }

    fn select_victim(&self, candidates: &[&ToolDescriptor]) -> Option<usize> {
        min_index(candidates, |a, b| {
            a.last_used()
                .cmp(&b.last_used())
                .then(a.usage_count().cmp(&b.usage_count()))
                .then_with(|| a.id().cmp(b.id()))
        })
    }
}

/// Minimum of `usage_weight * usage_count + recency_weight * recency_rank`,
/// where rank 0 is the least recently used candidate. Ties go to the
/// oldest use, then the id.
#[derive(Debug, Clone, Copy, Default)]
pub struct HybridStrategy {
    weights: HybridWeights,
}

impl HybridStrategy {
    /// Create with weights
    #[must_use]
    pub const fn new(weights: HybridWeights) -> Self {
        Self { weights }
    }

    /// Scores aligned with `candidates`
    #[must_use]
    pub fn scores(&self, candidates: &[&ToolDescriptor]) -> Vec<f64> {
        let mut by_recency: Vec<usize> = (0..candidates.len()).collect();
        by_recency.sort_by(|&a, &b| {
            candidates[a]
                .last_used()
                .cmp(&candidates[b].last_used())
                .then_with(|| candidates[a].id().cmp(candidates[b].id()))
        });

        let mut ranks = vec![0usize; candidates.len()];
        for (rank, index) in by_recency.into_iter().enumerate() {
            ranks[index] = rank;
        }

        candidates
            .iter()
            .zip(ranks)
            .map(|(d, rank)| {
                self.weights.usage_weight * d.usage_count() as f64
                    + self.weights.recency_weight * rank as f64
            })
            .collect()
    }
}

impl EvictionStrategy for HybridStrategy {
    fn policy(&self) -> EvictionPolicy {
        EvictionPolicy::Hybrid
    }

    fn select_victim(&self, candidates: &[&ToolDescriptor]) -> Option<usize> {
        let scores = self.scores(candidates);
        (0..candidates.len()).min_by(|&a, &b| {
            scores[a]
                .partial_cmp(&scores[b])
                .unwrap_or(Ordering::Equal)
                .then(candidates[a].last_used().cmp(&candidates[b].last_used()))
                .then_with(|| candidates[a].id().cmp(candidates[b].id()))
        })
    }
}

/// Build the strategy for a policy
#[must_use]
pub fn strategy_for(policy: EvictionPolicy, weights: HybridWeights) -> Box<dyn EvictionStrategy> {
    match policy {
        EvictionPolicy::Lfu => Box::new(LfuStrategy),
        EvictionPolicy::Lru => Box::new(LruStrategy),
        EvictionPolicy::Hybrid => Box::new(HybridStrategy::new(weights)),
    }
}

fn min_index<F>(candidates: &[&ToolDescriptor], compare: F) -> Option<usize>
where
    F: Fn(&ToolDescriptor, &ToolDescriptor) -> Ordering,
{
    (0..candidates.len()).min_by(|&a, &b| compare(candidates[a], candidates[b]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tripwire_core::{Action, LogicalTime, Timestamp};

    /// Descriptor with `uses` recorded, the last at `last_tick`
    fn used(name: &str, uses: u64, last_tick: u64) -> ToolDescriptor {
        let mut d = ToolDescriptor::new(name, Action::Read, None);
        for i in 0..uses {
            d.record_use(LogicalTime::from_raw(last_tick.saturating_sub(uses - 1 - i)), Timestamp::now());
        }
        d
    }

    fn victim_name(strategy: &dyn EvictionStrategy, descriptors: &[ToolDescriptor]) -> String {
        let refs: Vec<&ToolDescriptor> = descriptors.iter().collect();
        let index = strategy.select_victim(&refs).unwrap();
        descriptors[index].service().to_string()
    }

    #[test]
    fn test_empty_candidates() {
        assert_eq!(LfuStrategy.select_victim(&[]), None);
        assert_eq!(LruStrategy.select_victim(&[]), None);
        assert_eq!(HybridStrategy::default().select_victim(&[]), None);
    }

    #[test]
    fn test_lfu_picks_least_used() {
        let ds = vec![used("a", 3, 10), used("b", 1, 20), used("c", 2, 5)];
        assert_eq!(victim_name(&LfuStrategy, &ds), "b");
    }

    #[test]
    fn test_lfu_tie_breaks_on_oldest_use() {
        let ds = vec![used("a", 2, 10), used("b", 2, 4), used("c", 5, 1)];
        assert_eq!(victim_name(&LfuStrategy, &ds), "b");
    }

    #[test]
    fn test_lru_picks_oldest() {
        let ds = vec![used("a", 1, 10), used("b", 9, 2), used("c", 2, 5)];
        assert_eq!(victim_name(&LruStrategy, &ds), "b");
    }

    #[test]
    fn test_lru_tie_breaks_on_usage() {
        let ds = vec![used("a", 3, 7), used("b", 1, 7)];
        assert_eq!(victim_name(&LruStrategy, &ds), "b");
    }

    #[test]
    fn test_hybrid_scores() {
        // ranks by recency: c(1)=0, a(5)=1, b(9)=2
        let ds = vec![used("a", 1, 5), used("b", 1, 9), used("c", 4, 1)];
        let refs: Vec<&ToolDescriptor> = ds.iter().collect();
        let scores = HybridStrategy::default().scores(&refs);
        assert_eq!(scores, vec![2.0, 3.0, 4.0]);
        assert_eq!(victim_name(&HybridStrategy::default(), &ds), "a");
    }

    #[test]
    fn test_hybrid_weights_change_victim() {
        let ds = vec![used("a", 1, 5), used("b", 1, 9), used("c", 4, 1)];
        let recency_only = HybridStrategy::new(HybridWeights {
            usage_weight: 0.0,
            recency_weight: 1.0,
        });
        assert_eq!(victim_name(&recency_only, &ds), "c");
    }

    #[test]
    fn test_strategy_for_policy() {
        for policy in [EvictionPolicy::Lfu, EvictionPolicy::Lru, EvictionPolicy::Hybrid] {
            assert_eq!(strategy_for(policy, HybridWeights::default()).policy(), policy);
        }
    }
}
