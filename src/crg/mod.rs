//! Conditional Return Graphs.
//!
//! A CRG is a per-agent graph over local states whose edges are local
//! transitions annotated with the dependency and influence context of other
//! agents. Construction enumerates every local state reachable from the
//! agent's initial state and, per transition, the full tree of dependency and
//! influence combinations, caching rewards, probabilities and return bounds.
//! Once built, the graph answers every query the joint policy search needs
//! without touching the domain again.

pub mod heuristic;
pub mod info;
pub mod rewards;
pub mod state;
pub mod transition;

use std::collections::{BTreeSet, HashMap};
use std::io::Write;
use std::rc::Rc;

use tracing::debug;

use crate::domain::{CrDomain, CrgReward};
use crate::error::SolverError;
use crate::model::agent::AgentId;
use crate::model::bound::ValueBound;
use crate::model::value::StateValue;
use crate::solver::joint::{JointAction, JointState};
use crate::solver::stats::CrgBuildStats;
use crate::solver::Deadline;
use crate::PRECISION;

use info::CrgStateInfo;
use rewards::RewardSet;
use state::{CrgState, Influence};
use transition::CrgTransition;

use crate::factored::FactoredOthers;

/// The Conditional Return Graph of a single agent.
pub struct Crg<P, A> {
    rewards: RewardSet<P, A>,
    all_rewards: Vec<Rc<dyn CrgReward<P, A>>>,
    init: Option<Rc<CrgState<P>>>,
    states: HashMap<Rc<CrgState<P>>, CrgStateInfo<P, A>>,
}

impl<P, A> Crg<P, A>
where
    P: Clone + Eq + std::hash::Hash + std::fmt::Debug,
    A: Clone + Eq + Ord + std::hash::Hash + std::fmt::Debug,
{
    /// Creates an unconstructed CRG for the agent's assigned rewards.
    pub fn new(rewards: RewardSet<P, A>) -> Self {
        Self {
            rewards,
            all_rewards: Vec::new(),
            init: None,
            states: HashMap::new(),
        }
    }

    /// The agent modelled by this CRG.
    pub fn agent(&self) -> AgentId {
        self.rewards.agent()
    }

    /// The rewards assigned to this agent.
    pub fn rewards(&self) -> &RewardSet<P, A> {
        &self.rewards
    }

    /// The agent's initial local state.
    pub fn initial_state(&self) -> Result<&Rc<CrgState<P>>, SolverError> {
        self.init
            .as_ref()
            .ok_or_else(|| SolverError::CacheViolation("CRG not constructed".into()))
    }

    /// Builds the CRG from the agent's initial state and returns the bound on
    /// its expected return.
    ///
    /// `all_rewards` must contain every reward function of the problem; the
    /// ones whose scope contains this agent drive the local-CRI shortcut.
    pub fn construct<D>(
        &mut self,
        domain: &D,
        local_cri: bool,
        deadline: &Deadline,
        stats: &mut CrgBuildStats,
        init: CrgState<P>,
        all_rewards: &[Rc<dyn CrgReward<P, A>>],
    ) -> Result<ValueBound, SolverError>
    where
        D: CrDomain<StateData = P, Action = A>,
    {
        if self.init.is_some() {
            return Err(SolverError::CacheViolation("CRG already constructed".into()));
        }
        let init = Rc::new(init);
        self.init = Some(init.clone());

        if local_cri {
            self.all_rewards = all_rewards
                .iter()
                .filter(|r| r.in_scope(self.agent()))
                .cloned()
                .collect();
        }

        let mut builder = Builder {
            domain,
            local_cri,
            deadline,
            stats,
            crg: self,
        };
        builder.build(init)
    }

    /// The cached info of a known local state.
    pub fn state_info(&self, state: &CrgState<P>) -> Result<&CrgStateInfo<P, A>, SolverError> {
        self.states
            .get(state)
            .ok_or_else(|| SolverError::CacheViolation(format!("unknown state {state}")))
    }

    /// Resolves a state to its interned shared instance, if known.
    pub fn intern(&self, state: &CrgState<P>) -> Option<Rc<CrgState<P>>> {
        self.states.get_key_value(state).map(|(k, _)| k.clone())
    }

    /// The actions available from a local state; empty for terminal states.
    pub fn available_actions(&self, state: &CrgState<P>) -> Result<Vec<A>, SolverError> {
        let info = self.state_info(state)?;
        if info.is_terminal() {
            return Ok(Vec::new());
        }
        let actions: BTreeSet<A> = info
            .transitions()
            .iter()
            .map(|t| t.action().clone())
            .collect();
        Ok(actions.into_iter().collect())
    }

    /// The expected-return bound of a local state.
    pub fn return_bound(&self, state: &CrgState<P>) -> Result<&ValueBound, SolverError> {
        self.state_info(state)?.bounds()
    }

    /// Finds the unique local transition of this agent that matches the joint
    /// step `(from, action, to)`.
    ///
    /// The match requires equal local action and local from/to states, and
    /// per other scope agent: a matching dependency and influence annotation
    /// when the agent is part of the joint state, or the absence of explicit
    /// annotations when it is not (decoupled search). Transitions recorded
    /// below a locally-independent state carry no annotations and match any
    /// context.
    pub fn local_transition(
        &self,
        from: &JointState<P>,
        action: &JointAction<A>,
        to: &JointState<P>,
    ) -> Result<&CrgTransition<P, A>, SolverError> {
        let agent = self.agent();
        let local_from = from.local(agent)?;
        let local_action = action.action(agent)?;
        let local_to = to.local(agent)?;
        let info = self.state_info(local_from)?;

        let mut found: Option<&CrgTransition<P, A>> = None;
        for t in info.transitions() {
            if t.action() != local_action || t.from() != local_from || t.to() != local_to {
                continue;
            }
            if !info.is_independent() && !self.context_matches(t, from, action, to)? {
                continue;
            }
            if !cfg!(debug_assertions) {
                return Ok(t);
            }
            debug_assert!(
                found.is_none(),
                "duplicate transition match for agent {agent}"
            );
            found = Some(t);
        }

        found.ok_or_else(|| {
            SolverError::AdapterViolation(format!(
                "no matching transition for agent {agent} from {local_from}"
            ))
        })
    }

    fn context_matches(
        &self,
        t: &CrgTransition<P, A>,
        from: &JointState<P>,
        action: &JointAction<A>,
        to: &JointState<P>,
    ) -> Result<bool, SolverError> {
        for &g in self.rewards.scope() {
            if g == self.agent() {
                continue;
            }
            if from.contains(g) {
                if !t.deps().matches(g, action.action(g)?) {
                    return Ok(false);
                }
                let influence = Influence::new(from.local(g)?.clone(), to.local(g)?.clone());
                if !t.influences().matches(g, &influence) {
                    return Ok(false);
                }
            } else if t.deps().has(g) || t.influences().has(g) {
                // decoupled from g: transitions that explicitly depend on g
                // cannot apply
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn insert_state(
        &mut self,
        state: Rc<CrgState<P>>,
        info: CrgStateInfo<P, A>,
    ) -> Result<(), SolverError> {
        if self.states.contains_key(&state) {
            return Err(SolverError::CacheViolation(format!(
                "state already in CRG: {state}"
            )));
        }
        self.states.insert(state, info);
        Ok(())
    }

    fn set_bounds(&mut self, state: &CrgState<P>, bounds: ValueBound) -> Result<(), SolverError> {
        self.states
            .get_mut(state)
            .ok_or_else(|| SolverError::CacheViolation(format!("unknown state {state}")))?
            .set_bounds(bounds)
    }

    fn add_transition(
        &mut self,
        state: &CrgState<P>,
        transition: CrgTransition<P, A>,
    ) -> Result<(), SolverError> {
        self.states
            .get_mut(state)
            .ok_or_else(|| SolverError::CacheViolation(format!("unknown state {state}")))?
            .add_transition(transition);
        Ok(())
    }

    fn locally_independent(&self, state: &CrgState<P>) -> bool {
        self.all_rewards.iter().all(|r| r.local_cri(state))
    }

    /// Writes a human-readable dump of the graph, grouped by time step.
    pub fn dump(&self, out: &mut dyn Write, horizon: u32) -> std::io::Result<()> {
        writeln!(out, "CRG for agent {}", self.agent())?;
        for time in 0..=horizon {
            let mut states: Vec<&Rc<CrgState<P>>> = self
                .states
                .keys()
                .filter(|s| s.time() == time)
                .collect();
            states.sort_by_key(|s| format!("{s}"));
            if states.is_empty() {
                continue;
            }
            writeln!(out, "\nStates at t = {time}")?;
            for state in states {
                let info = &self.states[state];
                let status = if info.is_terminal() {
                    "TERM"
                } else if info.is_independent() {
                    "IND"
                } else {
                    ""
                };
                let bounds = info
                    .bounds()
                    .map(|b| b.to_string())
                    .unwrap_or_else(|_| "[]".into());
                writeln!(out, "{state} {status} B={bounds}")?;
                for t in info.transitions() {
                    writeln!(out, "> {t}")?;
                }
            }
        }
        Ok(())
    }
}

/// Recursive CRG construction.
struct Builder<'a, D: CrDomain> {
    domain: &'a D,
    local_cri: bool,
    deadline: &'a Deadline,
    stats: &'a mut CrgBuildStats,
    crg: &'a mut Crg<D::StateData, D::Action>,
}

/// The transition under construction while expanding dependency and
/// influence trees.
struct Frame<P, A> {
    from: Rc<CrgState<P>>,
    action: A,
    to: Rc<CrgState<P>>,
    deps: FactoredOthers<A>,
    influences: FactoredOthers<Influence<P>>,
}

impl<'a, D: CrDomain> Builder<'a, D> {
    fn build(
        &mut self,
        state: Rc<CrgState<D::StateData>>,
    ) -> Result<ValueBound, SolverError> {
        self.deadline.check()?;

        if let Some(info) = self.crg.states.get(&*state) {
            self.stats.duplicates += 1;
            return info.bounds().map(|b| b.clone());
        }
        self.stats.states += 1;

        if self.domain.is_terminal(&state) {
            return self.add_terminal(state);
        }

        if self.local_cri && self.crg.locally_independent(&state) {
            debug!(state = %state, "locally independent state");
            self.stats.independent += 1;
            let value = self.complete_optimally(state)?;
            return Ok(ValueBound::point(value));
        }

        self.crg
            .insert_state(state.clone(), CrgStateInfo::new(false, false))?;

        let mut bound = ValueBound::empty();
        for action in self.actions_checked(&state)? {
            for to in self.successors_checked(&state, &action)? {
                let probe = CrgTransition::new(
                    state.clone(),
                    action.clone(),
                    to.clone(),
                    FactoredOthers::new(),
                    FactoredOthers::new(),
                );
                let deps: Vec<(AgentId, Vec<D::Action>)> = self
                    .scope_others()
                    .map(|g| {
                        let mut actions =
                            self.domain.dependent_actions(&self.crg.rewards, &probe, g);
                        actions.sort();
                        (g, actions)
                    })
                    .collect();

                let mut frame = Frame {
                    from: state.clone(),
                    action: action.clone(),
                    to,
                    deps: FactoredOthers::new(),
                    influences: FactoredOthers::new(),
                };
                bound = bound.update(&self.build_action_tree(&mut frame, &deps, 0)?);
            }
        }

        self.crg.set_bounds(&state, bound.clone())?;
        Ok(bound)
    }

    /// Expands one dependency branch per dependent action of the agent at
    /// `idx`, plus the complement branch for all of its other actions.
    fn build_action_tree(
        &mut self,
        frame: &mut Frame<D::StateData, D::Action>,
        deps: &[(AgentId, Vec<D::Action>)],
        idx: usize,
    ) -> Result<ValueBound, SolverError> {
        if idx == deps.len() {
            let probe = CrgTransition::new(
                frame.from.clone(),
                frame.action.clone(),
                frame.to.clone(),
                frame.deps.clone(),
                frame.influences.clone(),
            );
            let influences: Vec<(AgentId, Vec<Influence<D::StateData>>)> = self
                .scope_others()
                .map(|g| {
                    (
                        g,
                        self.domain
                            .transition_influence(&self.crg.rewards, &probe, g),
                    )
                })
                .collect();
            return self.build_influence_tree(frame, &influences, 0);
        }

        let (agent, actions) = &deps[idx];
        let mut bound = ValueBound::empty();

        for action in actions {
            self.stats.dep_branches += 1;
            frame.deps.insert(*agent, action.clone());
            bound = bound.update(&self.build_action_tree(frame, deps, idx + 1)?);
            frame.deps.remove(*agent);
        }

        frame.deps.set_other(*agent, actions.clone());
        bound = bound.update(&self.build_action_tree(frame, deps, idx + 1)?);
        frame.deps.clear_other(*agent);

        Ok(bound)
    }

    /// Same structure as the dependency tree, over influence tokens.
    fn build_influence_tree(
        &mut self,
        frame: &mut Frame<D::StateData, D::Action>,
        influences: &[(AgentId, Vec<Influence<D::StateData>>)],
        idx: usize,
    ) -> Result<ValueBound, SolverError> {
        if idx == influences.len() {
            return self.build_transition(frame);
        }

        let (agent, tokens) = &influences[idx];
        let mut bound = ValueBound::empty();

        for token in tokens {
            self.stats.infl_branches += 1;
            frame.influences.insert(*agent, token.clone());
            bound = bound.update(&self.build_influence_tree(frame, influences, idx + 1)?);
            frame.influences.remove(*agent);
        }

        frame.influences.set_other(*agent, tokens.clone());
        bound = bound.update(&self.build_influence_tree(frame, influences, idx + 1)?);
        frame.influences.clear_other(*agent);

        Ok(bound)
    }

    /// Completes a fully-specified transition: computes its probability and
    /// reward, records it, and continues the construction below it.
    fn build_transition(
        &mut self,
        frame: &Frame<D::StateData, D::Action>,
    ) -> Result<ValueBound, SolverError> {
        self.stats.transitions += 1;

        let mut transition = CrgTransition::new(
            frame.from.clone(),
            frame.action.clone(),
            frame.to.clone(),
            frame.deps.clone(),
            frame.influences.clone(),
        );
        transition.probability = self.domain.transition_probability(&transition);
        transition.value = self
            .crg
            .rewards
            .transition_value(&transition, self.domain.empty_value());

        let to = frame.to.clone();
        let value = transition.value.clone();
        self.crg.add_transition(&frame.from, transition)?;

        let sub = self.build(to)?;
        Ok(sub.add_value(&value))
    }

    /// Completes the remainder of the CRG from a locally independent state:
    /// the agent is treated as a single-agent MDP, only the optimal action's
    /// transitions are retained and no dependency or influence expansion
    /// occurs.
    fn complete_optimally(
        &mut self,
        state: Rc<CrgState<D::StateData>>,
    ) -> Result<StateValue, SolverError> {
        self.deadline.check()?;

        if let Some(info) = self.crg.states.get(&*state) {
            self.stats.duplicates += 1;
            return info
                .bounds()?
                .lower()
                .cloned()
                .ok_or_else(|| SolverError::CacheViolation("empty bound".into()));
        }
        self.stats.states += 1;

        if self.domain.is_terminal(&state) {
            self.add_terminal(state)?;
            return Ok(self.domain.empty_value());
        }

        self.crg
            .insert_state(state.clone(), CrgStateInfo::new(false, true))?;

        let mut best: Option<(StateValue, Vec<CrgTransition<D::StateData, D::Action>>)> = None;
        for action in self.actions_checked(&state)? {
            let mut transitions = Vec::new();
            let mut expected = self.domain.empty_value();
            for to in self.successors_checked(&state, &action)? {
                let mut transition = CrgTransition::new(
                    state.clone(),
                    action.clone(),
                    to,
                    FactoredOthers::new(),
                    FactoredOthers::new(),
                );
                transition.probability = self.domain.transition_probability(&transition);
                transition.value = self
                    .crg
                    .rewards
                    .transition_value(&transition, self.domain.empty_value());

                let mut value = transition.value.clone();
                value.add(&self.complete_optimally(transition.to().clone())?);
                value.scale(transition.probability);
                expected.add(&value);
                transitions.push(transition);
            }

            let better = match &best {
                None => true,
                Some((value, _)) => expected.total() > value.total() + PRECISION,
            };
            if better {
                best = Some((expected, transitions));
            }
        }

        let (value, transitions) =
            best.ok_or_else(|| SolverError::CacheViolation("no best action".into()))?;
        {
            let info = self
                .crg
                .states
                .get_mut(&*state)
                .ok_or_else(|| SolverError::CacheViolation("state disappeared".into()))?;
            info.set_transitions(transitions);
        }
        self.crg.set_bounds(&state, ValueBound::point(value.clone()))?;
        Ok(value)
    }

    fn add_terminal(
        &mut self,
        state: Rc<CrgState<D::StateData>>,
    ) -> Result<ValueBound, SolverError> {
        if !self.domain.available_actions(&state).is_empty() {
            return Err(SolverError::AdapterViolation(format!(
                "available actions on terminal state {state}"
            )));
        }
        self.stats.terminal += 1;
        let mut info = CrgStateInfo::new(true, true);
        let bound = ValueBound::point(self.domain.empty_value());
        info.set_bounds(bound.clone())?;
        self.crg.insert_state(state, info)?;
        Ok(bound)
    }

    /// The sorted available actions; empty on a non-terminal state is an
    /// adapter violation.
    fn actions_checked(
        &self,
        state: &CrgState<D::StateData>,
    ) -> Result<Vec<D::Action>, SolverError> {
        let mut actions = self.domain.available_actions(state);
        if actions.is_empty() {
            return Err(SolverError::AdapterViolation(format!(
                "no available actions from non-terminal state {state}"
            )));
        }
        actions.sort();
        Ok(actions)
    }

    /// The interned successors of `(state, action)`, verifying that their
    /// probabilities sum to one.
    fn successors_checked(
        &self,
        state: &Rc<CrgState<D::StateData>>,
        action: &D::Action,
    ) -> Result<Vec<Rc<CrgState<D::StateData>>>, SolverError> {
        let mut successors = Vec::new();
        let mut total = 0.0;
        for to in self.domain.new_states(state, action) {
            let to = Rc::new(to);
            let probe = CrgTransition::new(
                state.clone(),
                action.clone(),
                to.clone(),
                FactoredOthers::new(),
                FactoredOthers::new(),
            );
            total += self.domain.transition_probability(&probe);
            successors.push(to);
        }
        if (total - 1.0).abs() >= PRECISION {
            return Err(SolverError::AdapterViolation(format!(
                "transition probabilities should sum to 1 (is {total:.6}) for action {action:?}"
            )));
        }
        Ok(successors)
    }

    fn scope_others(&self) -> impl Iterator<Item = AgentId> + '_ {
        let agent = self.crg.agent();
        self.crg
            .rewards
            .scope()
            .iter()
            .copied()
            .filter(move |&g| g != agent)
    }
}
