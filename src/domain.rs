//! The adapter seam between the solver core and a concrete problem.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::Hash;
use std::rc::Rc;

use crate::crg::heuristic::{self, AssignHeuristic};
use crate::crg::rewards::RewardSet;
use crate::crg::state::{CrgState, Influence};
use crate::crg::transition::CrgTransition;
use crate::model::agent::AgentId;
use crate::model::value::StateValue;
use crate::solver::joint::JointState;

/// A single reward function of the problem, as seen by the CRG builder and
/// the policy search.
///
/// A reward carries its scope (the agents it reads). Single-agent rewards
/// have a scope of one; shared rewards couple a small group of agents.
pub trait CrgReward<P, A> {
    /// The agents whose behavior this reward reads.
    fn scope(&self) -> &[AgentId];

    /// The contribution of this reward to a fully-annotated local transition.
    fn reward(&self, transition: &CrgTransition<P, A>) -> StateValue;

    /// State-local independence: returns true iff the reward can no longer be
    /// influenced by any future behavior reachable from the state.
    fn local_cri(&self, state: &CrgState<P>) -> bool;

    /// Global conditional reward independence between two scope agents from
    /// the joint state onward.
    fn cri(&self, a1: AgentId, a2: AgentId, state: &JointState<P>) -> bool;

    /// A stable identifier assigned by the domain when creating the reward.
    ///
    /// The solver never interprets it; adapters may use it to recognize their
    /// own functions when a reward set is handed back to them.
    fn key(&self) -> usize {
        0
    }

    /// Human-readable name, used for debug output only.
    fn name(&self) -> String {
        format!("R{:?}", self.scope())
    }

    /// The scope size.
    fn size(&self) -> usize {
        self.scope().len()
    }

    /// Checks whether an agent is within the scope of this reward.
    fn in_scope(&self, agent: AgentId) -> bool {
        self.scope().contains(&agent)
    }
}

/// Presents a problem instance to the CoRe solver.
///
/// The core never inspects domain state content; everything it needs is
/// obtained through this trait. Implementations must be deterministic: the
/// solver fixes enumeration orders itself, but the returned collections must
/// be stable between calls.
pub trait CrDomain {
    /// The domain payload of a local agent state. Part of state equality.
    type StateData: Clone + Eq + Hash + fmt::Debug;

    /// A local action. Equality identifies the action; the fixed `Ord` gives
    /// the solver a reproducible enumeration order.
    type Action: Clone + Eq + Ord + Hash + fmt::Debug;

    /// The unfactored global state of the problem.
    type GlobalState;

    /// The agents of the instance, with dense IDs `0..N`.
    fn agents(&self) -> &[AgentId];

    /// The planning horizon.
    fn horizon(&self) -> u32;

    /// A zero reward vector with the domain's objective arity.
    fn empty_value(&self) -> StateValue;

    /// The initial global state of the instance.
    fn initial_state(&self) -> Self::GlobalState;

    /// Enumerates all reward functions of the instance, both single-agent
    /// (one per agent) and shared (one per rule).
    fn create_rewards(&self) -> Vec<Rc<dyn CrgReward<Self::StateData, Self::Action>>>;

    /// Assigns each reward to exactly one owner agent.
    ///
    /// The default delegates to the configured assignment heuristic; domains
    /// may override it. Correctness is invariant under any assignment.
    fn assign_rewards(
        &self,
        rewards: &[Rc<dyn CrgReward<Self::StateData, Self::Action>>],
        heuristic: AssignHeuristic,
    ) -> BTreeMap<AgentId, RewardSet<Self::StateData, Self::Action>> {
        heuristic::assign_rewards(heuristic, self.agents(), rewards)
    }

    /// The domain-legal actions from a local state.
    ///
    /// Must be empty iff the state is terminal.
    fn available_actions(&self, state: &CrgState<Self::StateData>) -> Vec<Self::Action>;

    /// All possible successor local states of taking `action` in `state`;
    /// more than one successor expresses stochasticity.
    fn new_states(
        &self,
        state: &CrgState<Self::StateData>,
        action: &Self::Action,
    ) -> Vec<CrgState<Self::StateData>>;

    /// The probability of this exact successor given its start state and
    /// action. Must sum to 1 over all successors of `(from, action)` and must
    /// not depend on the transition's annotation context.
    fn transition_probability(
        &self,
        transition: &CrgTransition<Self::StateData, Self::Action>,
    ) -> f64;

    /// The actions of `agent` that could alter any reward in `rewards` when
    /// this local transition happens. Empty means no action dependency.
    fn dependent_actions(
        &self,
        rewards: &RewardSet<Self::StateData, Self::Action>,
        transition: &CrgTransition<Self::StateData, Self::Action>,
        agent: AgentId,
    ) -> Vec<Self::Action>;

    /// The state-influence tokens of `agent` that could alter any reward in
    /// `rewards`. Empty means no influence.
    fn transition_influence(
        &self,
        rewards: &RewardSet<Self::StateData, Self::Action>,
        transition: &CrgTransition<Self::StateData, Self::Action>,
        agent: AgentId,
    ) -> Vec<Influence<Self::StateData>>;

    /// Projects a global state into the per-agent factored form.
    fn factor_state(&self, state: &Self::GlobalState) -> JointState<Self::StateData>;

    /// Domain terminality test; defaults to the horizon being reached.
    fn is_terminal(&self, state: &CrgState<Self::StateData>) -> bool {
        state.time() == self.horizon()
    }
}
