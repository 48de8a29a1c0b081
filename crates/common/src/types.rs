// Core domain types shared across all Atelier crates.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::path::PathAddress;

/// How widely the planner may reach when choosing targets.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScopeMode {
    /// Planner decides; the selection hint is advisory.
    #[default]
    Auto,
    /// Restrict to the paths implicated by the focused UI element.
    Selection,
    /// Any path in the index is eligible.
    Global,
}

/// A mutation-eligible subtree exposed to the planner.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScopeIndexEntry {
    /// Stable catalog identifier, e.g. `button:primary`.
    pub id: String,
    pub path: PathAddress,
}

/// One restricted target inside a plan group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlanTarget {
    pub path: PathAddress,
    /// Leaf keys under `path` the executor may touch. Empty means unrestricted.
    #[serde(rename = "allowedFields", default)]
    pub allowed_fields: Vec<String>,
}

impl PlanTarget {
    pub fn new(path: PathAddress, allowed_fields: &[&str]) -> Self {
        Self { path, allowed_fields: allowed_fields.iter().map(|f| (*f).to_string()).collect() }
    }

    pub fn allows(&self, field: &str) -> bool {
        self.allowed_fields.is_empty() || self.allowed_fields.iter().any(|f| f == field)
    }
}

/// Named plan groups (e.g. `primary`) mapping to ordered target lists.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct MutationPlan {
    pub groups: BTreeMap<String, Vec<PlanTarget>>,
}

impl MutationPlan {
    /// Total number of targets across all groups.
    pub fn len(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn targets(&self) -> impl Iterator<Item = &PlanTarget> {
        self.groups.values().flatten()
    }

    pub fn contains_path(&self, path: &PathAddress) -> bool {
        self.targets().any(|target| &target.path == path)
    }

    /// Insert `target` at the front of `group`, creating the group if needed.
    pub fn prepend(&mut self, group: &str, target: PlanTarget) {
        self.groups.entry(group.to_string()).or_default().insert(0, target);
    }

    /// Drop targets failing `keep`, returning the removed ones. Emptied groups
    /// are removed too.
    pub fn retain_targets<F>(&mut self, mut keep: F) -> Vec<PlanTarget>
    where
        F: FnMut(&PlanTarget) -> bool,
    {
        let mut removed = Vec::new();
        for targets in self.groups.values_mut() {
            let (kept, dropped): (Vec<_>, Vec<_>) = targets.drain(..).partition(|t| keep(t));
            *targets = kept;
            removed.extend(dropped);
        }
        self.groups.retain(|_, targets| !targets.is_empty());
        removed
    }
}
