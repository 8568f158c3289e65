//! The policy produced by a solve run.

use std::collections::HashMap;
use std::io::Write;

use crate::domain::CrDomain;
use crate::error::SolverError;
use crate::model::value::StateValue;

use super::joint::{JointAction, JointState, JointTransition, OptTransition};

/// An optimal joint policy: a mapping from every reachable joint state to its
/// optimal joint action.
///
/// The map is total over the reachable set: decoupled search results have
/// been recombined into full-agent states, so a query only needs to factor
/// the global state and look it up.
pub struct Policy<'a, D: CrDomain> {
    domain: &'a D,
    initial: JointState<D::StateData>,
    state_map: HashMap<JointState<D::StateData>, OptTransition<D::StateData, D::Action>>,
}

impl<'a, D: CrDomain> Policy<'a, D> {
    /// The optimal joint action for a global state.
    ///
    /// Fails with [`SolverError::NoOptimalAction`] when the state lies
    /// outside the policy's reachable set or is terminal.
    pub fn query(
        &self,
        state: &D::GlobalState,
    ) -> Result<&JointAction<D::Action>, SolverError> {
        let factored = self.domain.factor_state(state);
        self.state_map
            .get(&factored)
            .and_then(OptTransition::optimal_action)
            .ok_or(SolverError::NoOptimalAction)
    }

    /// The expected cumulative value of following this policy from the
    /// initial state.
    pub fn expected_value(&self) -> &StateValue {
        self.state_map[&self.initial].value()
    }

    /// The initial joint state of the policy.
    pub fn initial_state(&self) -> &JointState<D::StateData> {
        &self.initial
    }

    /// The full policy record of a factored joint state.
    pub fn record(
        &self,
        state: &JointState<D::StateData>,
    ) -> Option<&OptTransition<D::StateData, D::Action>> {
        self.state_map.get(state)
    }

    /// Number of joint states in the policy map.
    pub fn len(&self) -> usize {
        self.state_map.len()
    }

    /// Returns true if the map is empty (never the case after a successful
    /// solve).
    pub fn is_empty(&self) -> bool {
        self.state_map.is_empty()
    }

    /// Iterates over all `(state, record)` entries.
    pub fn iter(
        &self,
    ) -> impl Iterator<
        Item = (
            &JointState<D::StateData>,
            &OptTransition<D::StateData, D::Action>,
        ),
    > {
        self.state_map.iter()
    }

    /// Writes the policy per time step.
    pub fn dump(&self, out: &mut dyn Write, horizon: u32) -> std::io::Result<()> {
        for time in 0..=horizon {
            let mut entries: Vec<_> = self
                .state_map
                .iter()
                .filter(|(state, _)| state.time() == time)
                .collect();
            entries.sort_by_key(|(state, _)| format!("{state}"));
            if entries.is_empty() {
                continue;
            }
            writeln!(out, "States at t = {time}")?;
            for (state, record) in entries {
                writeln!(out, "{state}")?;
                match record.optimal_action() {
                    None => writeln!(out, "> terminal")?,
                    Some(action) => {
                        writeln!(out, "> A={action:?} -> V={}", record.value())?;
                        for transition in record.transitions() {
                            writeln!(
                                out,
                                ">> {} p={:.3} R={}",
                                transition.to(),
                                transition.probability(),
                                transition.reward()
                            )?;
                        }
                    }
                }
            }
            writeln!(out)?;
        }
        Ok(())
    }
}

/// Builds the policy from the raw search maps.
///
/// Decoupled states are recombined top-down: the optimal joint actions of the
/// decoupled substates merge via disjoint agent union, and their successor
/// transition sets combine pairwise. The initial state of the policy is the
/// combination of all initially decoupled components, so its stored value is
/// the full expected optimum.
pub(super) fn reconstruct<'a, D: CrDomain>(
    domain: &'a D,
    horizon: u32,
    trans_map: &HashMap<
        JointState<D::StateData>,
        Option<OptTransition<D::StateData, D::Action>>,
    >,
    decouple_map: &HashMap<JointState<D::StateData>, Vec<JointState<D::StateData>>>,
    init_states: &[JointState<D::StateData>],
) -> Result<Policy<'a, D>, SolverError> {
    if init_states.is_empty() {
        return Err(SolverError::CacheViolation(
            "no solve run has been performed".into(),
        ));
    }

    let mut initial = init_states[0].clone();
    for state in &init_states[1..] {
        initial = initial.combine(state);
    }

    let mut state_map = HashMap::new();
    build(
        domain,
        horizon,
        trans_map,
        decouple_map,
        init_states.to_vec(),
        &mut state_map,
    )?;

    Ok(Policy {
        domain,
        initial,
        state_map,
    })
}

/// Recursively enters the combination of `states` and all its successor
/// combinations into the policy map.
fn build<D: CrDomain>(
    domain: &D,
    horizon: u32,
    trans_map: &HashMap<
        JointState<D::StateData>,
        Option<OptTransition<D::StateData, D::Action>>,
    >,
    decouple_map: &HashMap<JointState<D::StateData>, Vec<JointState<D::StateData>>>,
    states: Vec<JointState<D::StateData>>,
    state_map: &mut HashMap<JointState<D::StateData>, OptTransition<D::StateData, D::Action>>,
) -> Result<(), SolverError> {
    let mut combined = states[0].clone();
    for state in &states[1..] {
        combined = combined.combine(state);
    }
    // shared subtrees are rebuilt identically; walk them once
    if state_map.contains_key(&combined) {
        return Ok(());
    }

    if combined.time() == horizon {
        state_map.insert(
            combined,
            OptTransition::Terminal {
                value: domain.empty_value(),
            },
        );
        return Ok(());
    }

    // resolve every (possibly decoupled) component to its optimal record
    let mut records = Vec::new();
    for state in &states {
        let components = match decouple_map.get(state) {
            Some(components) => components.clone(),
            None => vec![state.clone()],
        };
        for component in components {
            let record = trans_map
                .get(&component)
                .and_then(Option::as_ref)
                .ok_or_else(|| {
                    SolverError::CacheViolation(format!(
                        "missing search record for state {component}"
                    ))
                })?;
            if !record.is_terminal() {
                records.push(record);
            }
        }
    }

    if records.is_empty() {
        state_map.insert(
            combined,
            OptTransition::Terminal {
                value: domain.empty_value(),
            },
        );
        return Ok(());
    }

    state_map.insert(combined, combine_records(domain, &records));

    // all combinations of successor states across the decoupled records
    let successor_sets: Vec<Vec<JointState<D::StateData>>> = records
        .iter()
        .map(|record| {
            record
                .transitions()
                .iter()
                .map(|t| t.to().clone())
                .collect()
        })
        .collect();

    let mut combos: Vec<Vec<JointState<D::StateData>>> = vec![Vec::new()];
    for set in &successor_sets {
        let mut extended = Vec::with_capacity(combos.len() * set.len());
        for combo in &combos {
            for successor in set {
                let mut next = combo.clone();
                next.push(successor.clone());
                extended.push(next);
            }
        }
        combos = extended;
    }

    for combo in combos {
        build(domain, horizon, trans_map, decouple_map, combo, state_map)?;
    }
    Ok(())
}

/// Merges decoupled optimal records into a single record over the union of
/// their agents.
fn combine_records<D: CrDomain>(
    domain: &D,
    records: &[&OptTransition<D::StateData, D::Action>],
) -> OptTransition<D::StateData, D::Action> {
    let mut value = domain.empty_value();
    let mut action: Option<JointAction<D::Action>> = None;
    let mut transitions: Vec<JointTransition<D::StateData, D::Action>> = Vec::new();

    for record in records {
        value.add(record.value());
        let record_action = record
            .optimal_action()
            .expect("terminal records are filtered before combining");
        action = Some(match action {
            None => record_action.clone(),
            Some(current) => current.combine(record_action),
        });

        if transitions.is_empty() {
            transitions = record.transitions().to_vec();
        } else {
            let mut combined = Vec::with_capacity(transitions.len() * record.transitions().len());
            for existing in &transitions {
                for addition in record.transitions() {
                    combined.push(existing.combine(addition));
                }
            }
            transitions = combined;
        }
    }

    OptTransition::Optimal {
        value,
        action: action.expect("at least one non-terminal record"),
        transitions,
    }
}
