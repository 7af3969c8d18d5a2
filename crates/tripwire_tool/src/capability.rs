//! Capability sets: which actions and item types a service accepts.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tripwire_core::{Action, DescriptorId};

/// Actions supported by a service, and per action the item types it
/// distinguishes. An action with no item types takes none.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CapabilitySet {
    actions: BTreeSet<Action>,
    item_types: BTreeMap<Action, BTreeSet<String>>,
}

impl CapabilitySet {
    /// Create an empty capability set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All six actions, no item types
    #[must_use]
    pub fn all_actions() -> Self {
        Self::new().with_actions(Action::ALL)
    }

    /// Add actions
    #[must_use]
    pub fn with_actions(mut self, actions: impl IntoIterator<Item = Action>) -> Self {
        self.actions.extend(actions);
        self
    }

    /// Add item types to every action declared so far
    #[must_use]
    pub fn with_item_types<I, S>(mut self, item_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let item_types: Vec<String> = item_types.into_iter().map(Into::into).collect();
        for action in &self.actions {
            self.item_types
                .entry(*action)
                .or_default()
                .extend(item_types.iter().cloned());
        }
        self
    }

    /// Add an action restricted to the given item types
    #[must_use]
    pub fn with_action_item_types<I, S>(mut self, action: Action, item_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.actions.insert(action);
        self.item_types
            .entry(action)
            .or_default()
            .extend(item_types.into_iter().map(Into::into));
        self
    }

    /// Check action support
    #[must_use]
    pub fn supports_action(&self, action: Action) -> bool {
        self.actions.contains(&action)
    }

    /// Whether the action requires an item type
    #[must_use]
    pub fn distinguishes_item_types(&self, action: Action) -> bool {
        self.item_types
            .get(&action)
            .is_some_and(|types| !types.is_empty())
    }

    /// Check item type support for an action
    #[must_use]
    pub fn supports_item_type(&self, action: Action, item_type: &str) -> bool {
        self.item_types
            .get(&action)
            .is_some_and(|types| types.contains(item_type))
    }

    /// Supported actions in canonical order
    #[must_use]
    pub fn supported_actions(&self) -> Vec<Action> {
        self.actions.iter().copied().collect()
    }

    /// Union of item types across actions, sorted
    #[must_use]
    pub fn supported_item_types(&self) -> Vec<String> {
        let all: BTreeSet<&String> = self.item_types.values().flatten().collect();
        all.into_iter().cloned().collect()
    }

    /// Item types accepted for one action, sorted
    #[must_use]
    pub fn item_types_for(&self, action: Action) -> Vec<String> {
        self.item_types
            .get(&action)
            .map(|types| types.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Whether nothing is supported
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Every (action, item type) pair as descriptor ids for `service`
    #[must_use]
    pub fn descriptor_ids(&self, service: &str) -> Vec<(DescriptorId, Action, Option<String>)> {
        let mut ids = Vec::new();
        for action in &self.actions {
            let types = self.item_types_for(*action);
            if types.is_empty() {
                ids.push((DescriptorId::new(service, *action, None), *action, None));
            } else {
                for item_type in types {
                    ids.push((
                        DescriptorId::new(service, *action, Some(&item_type)),
                        *action,
                        Some(item_type),
                    ));
                }
            }
        }
        ids
    }
}
