//! Joint states, joint actions and joint transitions.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::crg::state::CrgState;
use crate::error::SolverError;
use crate::model::agent::AgentId;
use crate::model::bound::ValueBound;
use crate::model::value::StateValue;

/// A mapping from agents to their local states, all at the same time.
///
/// A joint state may be partial: when the search decouples, its agent set is
/// a subset of the instance's agents. Two joint states can be combined iff
/// their agent sets are disjoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JointState<P> {
    states: BTreeMap<AgentId, Rc<CrgState<P>>>,
}

impl<P> JointState<P> {
    /// Creates an empty joint state.
    pub fn new() -> Self {
        Self {
            states: BTreeMap::new(),
        }
    }

    /// Builds a joint state from local states.
    pub fn from_locals(locals: impl IntoIterator<Item = CrgState<P>>) -> Self {
        let mut state = Self::new();
        for local in locals {
            state.insert(Rc::new(local));
        }
        state
    }

    /// Sets the local state of its agent.
    pub fn insert(&mut self, local: Rc<CrgState<P>>) {
        debug_assert!(
            self.states.values().all(|s| s.time() == local.time()),
            "all local states must share the same time"
        );
        self.states.insert(local.agent(), local);
    }

    /// The local state of the agent.
    pub fn get(&self, agent: AgentId) -> Option<&Rc<CrgState<P>>> {
        self.states.get(&agent)
    }

    /// The local state of the agent, failing with a cache violation when the
    /// agent is not part of this joint state.
    pub fn local(&self, agent: AgentId) -> Result<&Rc<CrgState<P>>, SolverError> {
        self.states.get(&agent).ok_or_else(|| {
            SolverError::CacheViolation(format!("agent {agent} not part of joint state"))
        })
    }

    /// Whether the agent is part of this joint state.
    pub fn contains(&self, agent: AgentId) -> bool {
        self.states.contains_key(&agent)
    }

    /// The agents of this joint state, in ID order.
    pub fn agents(&self) -> impl Iterator<Item = AgentId> + '_ {
        self.states.keys().copied()
    }

    /// Iterates over `(agent, local state)` pairs in ID order.
    pub fn iter(&self) -> impl Iterator<Item = (AgentId, &Rc<CrgState<P>>)> {
        self.states.iter().map(|(a, s)| (*a, s))
    }

    /// The shared time of the joint state.
    pub fn time(&self) -> u32 {
        self.states.values().next().map_or(0, |s| s.time())
    }

    /// Number of agents in the joint state.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Returns true if no agent is part of the joint state.
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Combines this state with a state over a disjoint agent set.
    pub fn combine(&self, other: &JointState<P>) -> JointState<P> {
        debug_assert!(
            other.agents().all(|a| !self.contains(a)),
            "combined joint states must have disjoint agents"
        );
        let mut states = self.states.clone();
        states.extend(other.states.iter().map(|(a, s)| (*a, s.clone())));
        JointState { states }
    }
}

impl<P> Default for JointState<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: fmt::Debug> fmt::Display for JointState<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, state) in self.states.values().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{state}")?;
        }
        write!(f, "}}")
    }
}

/// A joint action: one local action per agent, at a fixed time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JointAction<A> {
    actions: BTreeMap<AgentId, A>,
    time: u32,
}

impl<A> JointAction<A> {
    /// Creates an empty joint action for the given time.
    pub fn new(time: u32) -> Self {
        Self {
            actions: BTreeMap::new(),
            time,
        }
    }

    /// Sets the action of an agent.
    pub fn insert(&mut self, agent: AgentId, action: A) {
        self.actions.insert(agent, action);
    }

    /// The action of the agent.
    pub fn get(&self, agent: AgentId) -> Option<&A> {
        self.actions.get(&agent)
    }

    /// The action of the agent, failing when the agent has none.
    pub fn action(&self, agent: AgentId) -> Result<&A, SolverError> {
        self.actions.get(&agent).ok_or_else(|| {
            SolverError::CacheViolation(format!("no action for agent {agent} in joint action"))
        })
    }

    /// Iterates over `(agent, action)` pairs in ID order.
    pub fn iter(&self) -> impl Iterator<Item = (AgentId, &A)> {
        self.actions.iter().map(|(a, act)| (*a, act))
    }

    /// The agents of the joint action.
    pub fn agents(&self) -> impl Iterator<Item = AgentId> + '_ {
        self.actions.keys().copied()
    }

    /// The time at which the joint action is taken.
    pub fn time(&self) -> u32 {
        self.time
    }

    /// Number of agents.
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Returns true when no agent has an action.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Merges this joint action with one over a disjoint agent set.
    pub fn combine(&self, other: &JointAction<A>) -> JointAction<A>
    where
        A: Clone,
    {
        debug_assert!(
            other.agents().all(|a| !self.actions.contains_key(&a)),
            "combined joint actions must have disjoint agents"
        );
        let mut actions = self.actions.clone();
        actions.extend(other.actions.iter().map(|(a, act)| (*a, act.clone())));
        JointAction {
            actions,
            time: self.time,
        }
    }
}

/// A joint transition between (possibly partial) joint states, with its
/// accumulated reward, probability and future-return bound.
#[derive(Debug, Clone)]
pub struct JointTransition<P, A> {
    from: JointState<P>,
    action: JointAction<A>,
    to: JointState<P>,
    reward: StateValue,
    probability: f64,
    bound: ValueBound,
}

impl<P, A> JointTransition<P, A> {
    /// Creates a fully-specified joint transition.
    pub fn new(
        from: JointState<P>,
        action: JointAction<A>,
        to: JointState<P>,
        reward: StateValue,
        probability: f64,
        bound: ValueBound,
    ) -> Self {
        Self {
            from,
            action,
            to,
            reward,
            probability,
            bound,
        }
    }

    /// The joint start state.
    pub fn from(&self) -> &JointState<P> {
        &self.from
    }

    /// The joint action taken.
    pub fn action(&self) -> &JointAction<A> {
        &self.action
    }

    /// The joint result state.
    pub fn to(&self) -> &JointState<P> {
        &self.to
    }

    /// The accumulated joint reward.
    pub fn reward(&self) -> &StateValue {
        &self.reward
    }

    /// The joint probability (product over agents).
    pub fn probability(&self) -> f64 {
        self.probability
    }

    /// The bound on the future return after this transition.
    pub fn bound(&self) -> &ValueBound {
        &self.bound
    }

    /// Combines with a transition over a disjoint agent set: states and
    /// actions are merged, rewards summed, probabilities multiplied and
    /// bounds added.
    pub fn combine(&self, other: &JointTransition<P, A>) -> JointTransition<P, A>
    where
        A: Clone,
    {
        let mut reward = self.reward.clone();
        reward.add(&other.reward);
        JointTransition {
            from: self.from.combine(&other.from),
            action: self.action.combine(&other.action),
            to: self.to.combine(&other.to),
            reward,
            probability: self.probability * other.probability,
            bound: self.bound.add(&other.bound),
        }
    }
}

/// The record stored per joint state after it has been searched: either a
/// terminal marker with an empty value, or the optimal joint action with its
/// stochastic successor transitions and expected value.
#[derive(Debug, Clone)]
pub enum OptTransition<P, A> {
    /// The state is terminal; only the (empty) value is carried.
    Terminal { value: StateValue },
    /// The best joint action with its successor transitions.
    Optimal {
        value: StateValue,
        action: JointAction<A>,
        transitions: Vec<JointTransition<P, A>>,
    },
}

impl<P, A> OptTransition<P, A> {
    /// The expected value achieved from this state.
    pub fn value(&self) -> &StateValue {
        match self {
            OptTransition::Terminal { value } => value,
            OptTransition::Optimal { value, .. } => value,
        }
    }

    /// True iff this record marks a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OptTransition::Terminal { .. })
    }

    /// The optimal joint action, if the state is not terminal.
    pub fn optimal_action(&self) -> Option<&JointAction<A>> {
        match self {
            OptTransition::Terminal { .. } => None,
            OptTransition::Optimal { action, .. } => Some(action),
        }
    }

    /// The successor transitions of the optimal joint action.
    pub fn transitions(&self) -> &[JointTransition<P, A>] {
        match self {
            OptTransition::Terminal { .. } => &[],
            OptTransition::Optimal { transitions, .. } => transitions,
        }
    }
}
