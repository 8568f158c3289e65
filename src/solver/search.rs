//! Depth-first branch-and-bound policy search over CRGs.

use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use tracing::debug;

use crate::crg::Crg;
use crate::domain::CrDomain;
use crate::error::SolverError;
use crate::model::agent::AgentId;
use crate::model::bound::ValueBound;
use crate::model::value::StateValue;
use crate::PRECISION;

use super::coord::CoordGraph;
use super::joint::{JointAction, JointState, JointTransition, OptTransition};
use super::progress::ProgressBar;
use super::settings::Settings;
use super::stats::Stats;
use super::Deadline;

type TransMap<D> = HashMap<
    JointState<<D as CrDomain>::StateData>,
    Option<OptTransition<<D as CrDomain>::StateData, <D as CrDomain>::Action>>,
>;

/// One solve run: owns the search map, the decoupling map and the
/// coordination graph.
pub(super) struct Search<'a, D: CrDomain> {
    domain: &'a D,
    settings: &'a Settings,
    deadline: &'a Deadline,
    stats: &'a mut Stats,
    crgs: &'a BTreeMap<AgentId, Crg<D::StateData, D::Action>>,
    pub(super) trans_map: TransMap<D>,
    pub(super) decouple_map:
        HashMap<JointState<D::StateData>, Vec<JointState<D::StateData>>>,
    pub(super) init_states: Vec<JointState<D::StateData>>,
    coord: Option<CoordGraph<D::StateData, D::Action>>,
    progress: Option<ProgressBar>,
}

impl<'a, D: CrDomain> Search<'a, D> {
    pub(super) fn new(
        domain: &'a D,
        settings: &'a Settings,
        deadline: &'a Deadline,
        stats: &'a mut Stats,
        crgs: &'a BTreeMap<AgentId, Crg<D::StateData, D::Action>>,
    ) -> Self {
        Self {
            domain,
            settings,
            deadline,
            stats,
            crgs,
            trans_map: HashMap::new(),
            decouple_map: HashMap::new(),
            init_states: Vec::new(),
            coord: None,
            progress: None,
        }
    }

    /// Runs the full search from the factored initial state and returns the
    /// optimal expected policy value.
    pub(super) fn run(
        &mut self,
        initial: &JointState<D::StateData>,
    ) -> Result<StateValue, SolverError> {
        if self.settings.decouple_cri {
            let rewards: Vec<_> = self
                .crgs
                .values()
                .flat_map(|crg| crg.rewards().rewards().iter().cloned())
                .collect();
            self.coord = Some(CoordGraph::new(&rewards));
        } else {
            self.init_states.push(initial.clone());
        }

        let value = self.decouple(initial)?;

        self.stats.decoupled = self.decouple_map.len() as u64;
        self.stats.decouple_total = self
            .decouple_map
            .values()
            .map(|states| states.len() as u64)
            .sum();

        debug!(value = %value, "search completed");
        Ok(value)
    }

    /// Re-tests the coordination graph against the new joint state, searches
    /// every connected component independently and sums their values. Edges
    /// flagged here are restored before returning (stack discipline).
    fn decouple(
        &mut self,
        state: &JointState<D::StateData>,
    ) -> Result<StateValue, SolverError> {
        if self.coord.is_none() {
            return self.find_optimal(state);
        }

        let components_before = self.coord.as_ref().map_or(0, CoordGraph::size);
        let force = self.init_states.is_empty();
        let flagged = match self.coord.as_mut() {
            Some(coord) => coord.update(state, force),
            None => Vec::new(),
        };
        let substates = match self.coord.as_ref() {
            Some(coord) => coord.connected_components(state),
            None => vec![state.clone()],
        };

        if self.coord.as_ref().map_or(0, CoordGraph::size) > components_before {
            debug!(state = %state, components = substates.len(), "decoupled search");
            self.decouple_map.insert(state.clone(), substates.clone());
        }
        if self.init_states.is_empty() {
            self.init_states = substates.clone();
        }

        let result = (|| -> Result<StateValue, SolverError> {
            let mut value = self.domain.empty_value();
            for substate in &substates {
                value.add(&self.find_optimal(substate)?);
            }
            Ok(value)
        })();

        if let Some(coord) = self.coord.as_mut() {
            coord.restore(&flagged);
        }
        result
    }

    /// Finds the optimal joint transition from the joint state.
    fn find_optimal(
        &mut self,
        state: &JointState<D::StateData>,
    ) -> Result<StateValue, SolverError> {
        self.deadline.check()?;
        self.stats.states += 1;
        self.stats.state_size += state.len() as u64;

        // known state?
        if let Some(entry) = self.trans_map.get(state) {
            return match entry {
                Some(record) => {
                    self.stats.visited += 1;
                    Ok(record.value().clone())
                }
                None => Err(SolverError::CacheViolation(format!(
                    "re-entered state under evaluation: {state}"
                ))),
            };
        }

        if self.is_terminal(state)? {
            self.stats.terminal += 1;
            let value = self.domain.empty_value();
            self.trans_map.insert(
                state.clone(),
                Some(OptTransition::Terminal {
                    value: value.clone(),
                }),
            );
            return Ok(value);
        }

        // placeholder to detect illegal cycles
        self.trans_map.insert(state.clone(), None);

        let joint_actions = self.enum_joint_actions(state)?;
        let mut transitions = self.joint_transitions(state, joint_actions)?;

        let (mut lmax, bounds) = self.compute_bounds(&transitions);
        self.stats.pruned_outer += self.prune(&mut transitions, &bounds, lmax.as_ref());

        let order: Vec<JointAction<D::Action>> = transitions.keys().cloned().collect();
        let show = self.settings.show_progress && self.progress.is_none();
        if show {
            self.progress = Some(ProgressBar::new("CoRe", order.len()));
        }

        let mut best: Option<OptTransition<D::StateData, D::Action>> = None;
        for (index, action) in order.iter().enumerate() {
            if show {
                if let Some(bar) = self.progress.as_mut() {
                    bar.step(1);
                }
            }

            // pruned in a tightening round?
            let Some(successors) = transitions.remove(action) else {
                continue;
            };
            self.stats.joint_actions += 1;

            let mut value = self.domain.empty_value();
            for transition in &successors {
                let mut outcome = transition.reward().clone();
                outcome.add(&self.decouple(transition.to())?);
                outcome.scale(transition.probability());
                value.add(&outcome);
            }

            let better = match &best {
                None => true,
                Some(current) => value.total() > current.value().total() + PRECISION,
            };
            if better {
                // tighten the pruning threshold with the running best
                if self.settings.pruning_enabled()
                    && self.settings.bb_tightening
                    && index + 1 < order.len()
                {
                    if let Some(current_max) = lmax.as_ref() {
                        if current_max.total() - value.total() < PRECISION {
                            lmax = Some(value.clone());
                            self.stats.pruned_inner +=
                                self.prune(&mut transitions, &bounds, lmax.as_ref());
                        }
                    }
                }
                best = Some(OptTransition::Optimal {
                    value,
                    action: action.clone(),
                    transitions: successors,
                });
            }
        }

        if show {
            if let Some(bar) = self.progress.as_mut() {
                bar.finish();
            }
        }

        let best = best.ok_or_else(|| {
            SolverError::AdapterViolation(format!("no joint actions for state {state}"))
        })?;
        let value = best.value().clone();
        let previous = self.trans_map.insert(state.clone(), Some(best));
        if !matches!(previous, Some(None)) {
            return Err(SolverError::CacheViolation(format!(
                "overwrote a finalized record for state {state}"
            )));
        }
        Ok(value)
    }

    /// A joint state is terminal iff every agent's local state is terminal in
    /// its CRG.
    fn is_terminal(&self, state: &JointState<D::StateData>) -> Result<bool, SolverError> {
        for (agent, local) in state.iter() {
            if !self.crg(agent)?.state_info(local)?.is_terminal() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// The Cartesian product over agents of their available local actions.
    fn enum_joint_actions(
        &self,
        state: &JointState<D::StateData>,
    ) -> Result<Vec<JointAction<D::Action>>, SolverError> {
        let mut joint_actions = vec![JointAction::new(state.time())];
        for (agent, local) in state.iter() {
            let actions = self.crg(agent)?.available_actions(local)?;
            if actions.is_empty() {
                return Err(SolverError::AdapterViolation(format!(
                    "no joint actions for state {state}"
                )));
            }
            let mut extended = Vec::with_capacity(joint_actions.len() * actions.len());
            for joint in &joint_actions {
                for action in &actions {
                    let mut next = joint.clone();
                    next.insert(agent, action.clone());
                    extended.push(next);
                }
            }
            joint_actions = extended;
        }
        Ok(joint_actions)
    }

    /// Builds all joint transitions per joint action: per successor state the
    /// matching CRG transition of every agent supplies its reward (vector
    /// sum), probability (product) and future bound (vector add).
    fn joint_transitions(
        &self,
        state: &JointState<D::StateData>,
        joint_actions: Vec<JointAction<D::Action>>,
    ) -> Result<
        BTreeMap<JointAction<D::Action>, Vec<JointTransition<D::StateData, D::Action>>>,
        SolverError,
    > {
        let mut map = BTreeMap::new();
        for action in joint_actions {
            let mut transitions = Vec::new();
            let mut total_probability = 0.0;

            for to in self.enum_new_states(state, &action)? {
                let mut reward = self.domain.empty_value();
                let mut bound = ValueBound::empty();
                let mut probability = 1.0;

                for (agent, _) in state.iter() {
                    let crg = self.crg(agent)?;
                    let local = crg.local_transition(state, &action, &to)?;
                    reward.add(local.value());
                    probability *= local.probability();
                    bound = bound.add(crg.return_bound(local.to())?);
                }

                total_probability += probability;
                transitions.push(JointTransition::new(
                    state.clone(),
                    action.clone(),
                    to,
                    reward,
                    probability,
                    bound,
                ));
            }

            if (total_probability - 1.0).abs() >= PRECISION {
                return Err(SolverError::AdapterViolation(format!(
                    "Joint action probabilities should sum to 1 (is {total_probability:.6})"
                )));
            }
            map.insert(action, transitions);
        }
        Ok(map)
    }

    /// The Cartesian product over agents of the domain's successor states
    /// under the chosen local actions.
    fn enum_new_states(
        &self,
        state: &JointState<D::StateData>,
        action: &JointAction<D::Action>,
    ) -> Result<Vec<JointState<D::StateData>>, SolverError> {
        let mut states = vec![JointState::new()];
        for (agent, local) in state.iter() {
            let crg = self.crg(agent)?;
            let successors: Vec<Rc<_>> = self
                .domain
                .new_states(local, action.action(agent)?)
                .into_iter()
                .map(|s| crg.intern(&s).unwrap_or_else(|| Rc::new(s)))
                .collect();

            let mut extended = Vec::with_capacity(states.len() * successors.len());
            for joint in &states {
                for successor in &successors {
                    let mut next = joint.clone();
                    next.insert(successor.clone());
                    extended.push(next);
                }
            }
            states = extended;
        }
        Ok(states)
    }

    /// Computes, per joint action, the probability-weighted bound over its
    /// successors, and returns the maximum lower bound seen. `None` when
    /// pruning is disabled.
    #[allow(clippy::type_complexity)]
    fn compute_bounds(
        &self,
        transitions: &BTreeMap<
            JointAction<D::Action>,
            Vec<JointTransition<D::StateData, D::Action>>,
        >,
    ) -> (
        Option<StateValue>,
        BTreeMap<JointAction<D::Action>, ValueBound>,
    ) {
        if !self.settings.pruning_enabled() {
            return (None, BTreeMap::new());
        }

        let mut lmax: Option<StateValue> = None;
        let mut bounds = BTreeMap::new();

        for (action, successors) in transitions {
            let mut bound = ValueBound::empty();
            for transition in successors {
                let b = ValueBound::point(transition.reward().clone())
                    .add(transition.bound())
                    .scale(transition.probability());
                bound = bound.add(&b);
            }

            if let Some(lower) = bound.lower() {
                let is_new_max = match &lmax {
                    None => true,
                    Some(current) => current.total() - lower.total() < PRECISION,
                };
                if is_new_max {
                    lmax = Some(lower.clone());
                }
            }
            bounds.insert(action.clone(), bound);
        }

        (lmax, bounds)
    }

    /// Removes every joint action whose upper bound falls below
    /// `lmax - PRECISION`. The argmax action is never removed.
    fn prune(
        &mut self,
        transitions: &mut BTreeMap<
            JointAction<D::Action>,
            Vec<JointTransition<D::StateData, D::Action>>,
        >,
        bounds: &BTreeMap<JointAction<D::Action>, ValueBound>,
        lmax: Option<&StateValue>,
    ) -> u64 {
        let Some(lmax) = lmax else {
            return 0;
        };
        if transitions.len() <= 1 {
            return 0;
        }
        self.stats.prunes += 1;

        let threshold = lmax.total() - PRECISION;
        let doomed: Vec<JointAction<D::Action>> = transitions
            .keys()
            .filter(|&action| match bounds.get(action).and_then(ValueBound::upper) {
                Some(upper) => upper.total() - threshold < 0.0,
                None => false,
            })
            .cloned()
            .collect();

        for action in &doomed {
            transitions.remove(action);
        }
        doomed.len() as u64
    }

    fn crg(&self, agent: AgentId) -> Result<&Crg<D::StateData, D::Action>, SolverError> {
        self.crgs
            .get(&agent)
            .ok_or_else(|| SolverError::CacheViolation(format!("no CRG for agent {agent}")))
    }
}
