//! Reward sets owned by a single agent.

use std::collections::BTreeSet;
use std::rc::Rc;

use crate::domain::CrgReward;
use crate::model::agent::AgentId;
use crate::model::value::StateValue;

use super::transition::CrgTransition;

/// The reward functions assigned to one owner agent, with their combined
/// scope.
pub struct RewardSet<P, A> {
    agent: AgentId,
    rewards: Vec<Rc<dyn CrgReward<P, A>>>,
    scope: BTreeSet<AgentId>,
}

impl<P, A> RewardSet<P, A> {
    /// Creates an empty reward set for the agent.
    pub fn new(agent: AgentId) -> Self {
        Self {
            agent,
            rewards: Vec::new(),
            scope: BTreeSet::new(),
        }
    }

    /// Adds a reward function, widening the combined scope.
    pub fn add(&mut self, reward: Rc<dyn CrgReward<P, A>>) {
        self.scope.extend(reward.scope().iter().copied());
        self.rewards.push(reward);
    }

    /// The owner agent.
    pub fn agent(&self) -> AgentId {
        self.agent
    }

    /// The reward functions in this set.
    pub fn rewards(&self) -> &[Rc<dyn CrgReward<P, A>>] {
        &self.rewards
    }

    /// The union of all reward scopes.
    pub fn scope(&self) -> &BTreeSet<AgentId> {
        &self.scope
    }

    /// Number of reward functions.
    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    /// Returns true if no rewards are assigned.
    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }

    /// The combined reward of all functions for a fully-annotated transition.
    pub fn transition_value(
        &self,
        transition: &CrgTransition<P, A>,
        empty: StateValue,
    ) -> StateValue {
        let mut value = empty;
        for reward in &self.rewards {
            value.add(&reward.reward(transition));
        }
        value
    }
}

impl<P, A> std::fmt::Debug for RewardSet<P, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self.rewards.iter().map(|r| r.name()).collect();
        write!(f, "RewardSet({} -> {:?})", self.agent, names)
    }
}
