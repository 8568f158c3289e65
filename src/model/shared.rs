//! Shared reward rules coupling small groups of agents.

use std::collections::{BTreeMap, BTreeSet};

use super::function::RewardFn;

/// Maps sets of local actions to a time-dependent reward function.
///
/// A rule fires whenever its action set is a subset of the actions currently
/// being executed; every matching rule contributes. The container tracks the
/// maximum rule cardinality and carries a scalar weight applied to every
/// evaluation.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SharedRewards<A: Ord> {
    rules: BTreeMap<BTreeSet<A>, RewardFn>,
    weight: f64,
    max_cardinality: usize,
}

impl<A: Ord + Clone> SharedRewards<A> {
    /// Creates an empty rule container with unit weight.
    pub fn new() -> Self {
        Self {
            rules: BTreeMap::new(),
            weight: 1.0,
            max_cardinality: 0,
        }
    }

    /// Adds a rule for the action set.
    ///
    /// Returns `false` if a rule with the same action set is already present;
    /// the container is left unchanged in that case.
    pub fn add_rule(&mut self, actions: BTreeSet<A>, reward: RewardFn) -> bool {
        if self.rules.contains_key(&actions) {
            return false;
        }
        self.max_cardinality = self.max_cardinality.max(actions.len());
        self.rules.insert(actions, reward);
        true
    }

    /// The combined reward of all rules matched by the executing action set
    /// at the given time, scaled by the container weight.
    pub fn reward(&self, executing: &BTreeSet<A>, time: u32, horizon: u32) -> f64 {
        let mut total = 0.0;
        for (rule, function) in &self.rules {
            if rule.iter().all(|a| executing.contains(a)) {
                total += function.eval(time, horizon);
            }
        }
        total * self.weight
    }

    /// Iterates over all rules.
    pub fn rules(&self) -> impl Iterator<Item = (&BTreeSet<A>, &RewardFn)> {
        self.rules.iter()
    }

    /// Number of rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns true if the container holds no rules.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// The largest rule cardinality seen so far.
    pub fn max_cardinality(&self) -> usize {
        self.max_cardinality
    }

    /// The scalar weight applied to every rule evaluation.
    pub fn weight(&self) -> f64 {
        self.weight
    }

    /// Multiplies the container weight by `w`.
    pub fn scale(&mut self, w: f64) {
        self.weight *= w;
    }

    /// Replaces the container weight, returning the previous one.
    pub fn set_weight(&mut self, w: f64) -> f64 {
        std::mem::replace(&mut self.weight, w)
    }
}

impl<A: Ord + Clone> Default for SharedRewards<A> {
    fn default() -> Self {
        Self::new()
    }
}
