//! End-to-end solver scenarios and optimality invariance checks.

use std::rc::Rc;
use std::time::Duration;

use crate::crg::heuristic::AssignHeuristic;
use crate::crg::rewards::RewardSet;
use crate::crg::state::{CrgState, Influence};
use crate::crg::transition::CrgTransition;
use crate::crg::Crg;
use crate::domain::{CrDomain, CrgReward};
use crate::error::SolverError;
use crate::maintenance::{MaintAction, MaintDomain, MaintInstance, MaintState, Task};
use crate::model::agent::AgentId;
use crate::model::function::RewardFn;
use crate::model::value::StateValue;
use crate::solver::joint::JointState;
use crate::solver::settings::Settings;
use crate::solver::{CoRe, Deadline};
use crate::PRECISION;

fn solve(instance: MaintInstance, settings: Settings) -> (f64, crate::solver::stats::Stats) {
    let domain = MaintDomain::new(instance);
    let mut solver = CoRe::with_settings(&domain, settings);
    let policy = solver.solve().expect("solve failed");
    (policy.expected_value().total(), solver.stats().clone())
}

fn singleton_instance() -> MaintInstance {
    let mut instance = MaintInstance::new(1);
    instance.add_agent(vec![Task::fixed(
        AgentId(0),
        0,
        5.0,
        RewardFn::Constant(0.0),
        1,
    )]);
    instance
}

fn independent_pair_instance() -> MaintInstance {
    let mut instance = MaintInstance::new(1);
    instance.add_agent(vec![Task::fixed(
        AgentId(0),
        0,
        3.0,
        RewardFn::Constant(0.0),
        1,
    )]);
    instance.add_agent(vec![Task::fixed(
        AgentId(1),
        0,
        7.0,
        RewardFn::Constant(0.0),
        1,
    )]);
    instance
}

fn shared_penalty_instance() -> MaintInstance {
    let mut instance = MaintInstance::new(1);
    instance.add_agent(vec![
        Task::fixed(AgentId(0), 0, 5.0, RewardFn::Constant(0.0), 1),
        Task::fixed(AgentId(0), 1, 0.0, RewardFn::Constant(0.0), 1),
    ]);
    instance.add_agent(vec![
        Task::fixed(AgentId(1), 0, 5.0, RewardFn::Constant(0.0), 1),
        Task::fixed(AgentId(1), 1, 0.0, RewardFn::Constant(0.0), 1),
    ]);
    instance.add_rule(&[(AgentId(0), 0), (AgentId(1), 0)], RewardFn::Constant(-8.0));
    instance
}

fn delayed_single_instance() -> MaintInstance {
    let mut instance = MaintInstance::new(3);
    instance.add_agent(vec![Task::delayable(
        AgentId(0),
        0,
        100.0,
        RewardFn::Constant(-10.0),
        2,
        0.3,
        1,
    )]);
    instance
}

/// Two coupled agents with delays, used for the invariance checks.
fn coupled_instance() -> MaintInstance {
    let mut instance = MaintInstance::new(4);
    instance.add_agent(vec![
        Task::fixed(AgentId(0), 0, 20.0, RewardFn::Constant(-2.0), 1),
        Task::delayable(AgentId(0), 1, 30.0, RewardFn::Constant(-5.0), 2, 0.4, 1),
    ]);
    instance.add_agent(vec![
        Task::fixed(AgentId(1), 0, 15.0, RewardFn::Constant(-1.0), 2),
        Task::fixed(AgentId(1), 1, 10.0, RewardFn::Linear { a: -1.0, b: -1.0 }, 1),
    ]);
    instance.add_rule(&[(AgentId(0), 0), (AgentId(1), 0)], RewardFn::Constant(-12.0));
    instance.add_rule(&[(AgentId(0), 1), (AgentId(1), 1)], RewardFn::Constant(-6.0));
    instance
}

#[test]
fn singleton_trivial() {
    let domain = MaintDomain::new(singleton_instance());
    let mut solver = CoRe::new(&domain);
    let policy = solver.solve().unwrap();

    assert!((policy.expected_value().total() - 5.0).abs() < PRECISION);

    // exactly one non-terminal state, mapped to starting the task
    let non_terminal: Vec<_> = policy
        .iter()
        .filter(|(_, record)| !record.is_terminal())
        .collect();
    assert_eq!(non_terminal.len(), 1);

    let action = policy.query(&MaintState::initial()).unwrap();
    assert_eq!(action.get(AgentId(0)), Some(&MaintAction::Execute(0)));
}

#[test]
fn two_independent_agents_decouple() {
    let (value, stats) = solve(independent_pair_instance(), Settings::default());
    assert!((value - 10.0).abs() < PRECISION);
    assert_eq!(stats.decoupled, 1);
    assert!((stats.average_split_size() - 2.0).abs() < PRECISION);
}

#[test]
fn binary_shared_penalty_avoids_the_rule() {
    let domain = MaintDomain::new(shared_penalty_instance());
    let mut solver = CoRe::new(&domain);
    let policy = solver.solve().unwrap();

    assert!((policy.expected_value().total() - 5.0).abs() < PRECISION);

    let action = policy.query(&MaintState::initial()).unwrap();
    let both_rule_tasks = action.get(AgentId(0)) == Some(&MaintAction::Execute(0))
        && action.get(AgentId(1)) == Some(&MaintAction::Execute(0));
    assert!(!both_rule_tasks, "optimal action must avoid the penalty rule");
}

#[test]
fn stochastic_delay_expectation() {
    let (value, _) = solve(delayed_single_instance(), Settings::default());
    // 100 - 10*2*0.7 - 10*3*0.3
    assert!((value - 77.0).abs() < PRECISION);
}

#[test]
fn timeout_aborts_without_a_policy() {
    let mut instance = MaintInstance::new(12);
    for agent in 0..3 {
        let id = AgentId(agent);
        instance.add_agent(vec![
            Task::delayable(id, 0, 50.0, RewardFn::Constant(-5.0), 2, 0.5, 1),
            Task::delayable(id, 1, 40.0, RewardFn::Constant(-4.0), 2, 0.5, 1),
            Task::fixed(id, 2, 30.0, RewardFn::Constant(-3.0), 3),
        ]);
    }
    instance.add_rule(&[(AgentId(0), 0), (AgentId(1), 0)], RewardFn::Constant(-20.0));
    instance.add_rule(&[(AgentId(1), 1), (AgentId(2), 1)], RewardFn::Constant(-20.0));

    let domain = MaintDomain::new(instance);
    let mut solver = CoRe::with_settings(
        &domain,
        Settings {
            max_runtime: Some(Duration::from_millis(10)),
            ..Settings::default()
        },
    );
    assert!(matches!(solver.solve(), Err(SolverError::Timeout)));
}

#[test]
fn optimality_is_invariant_under_branch_and_bound() {
    let baseline = solve(coupled_instance(), Settings::default()).0;
    for (pruning, tightening) in [(false, false), (true, false)] {
        let value = solve(
            coupled_instance(),
            Settings {
                bb_pruning: pruning,
                bb_tightening: tightening,
                ..Settings::default()
            },
        )
        .0;
        assert!(
            (value - baseline).abs() < PRECISION,
            "bb_pruning={pruning} bb_tightening={tightening} changed the value"
        );
    }
}

#[test]
fn optimality_is_invariant_under_cri() {
    let baseline = solve(coupled_instance(), Settings::default()).0;
    for (local, decouple) in [(false, false), (true, false), (false, true)] {
        let value = solve(
            coupled_instance(),
            Settings {
                local_cri: local,
                decouple_cri: decouple,
                ..Settings::default()
            },
        )
        .0;
        assert!(
            (value - baseline).abs() < PRECISION,
            "local_cri={local} decouple_cri={decouple} changed the value"
        );
    }
}

#[test]
fn optimality_is_invariant_under_assignment() {
    let baseline = solve(coupled_instance(), Settings::default()).0;
    for heuristic in [
        AssignHeuristic::Balanced,
        AssignHeuristic::LowestDegree,
        AssignHeuristic::HighestDegree,
        AssignHeuristic::Random { seed: 1 },
        AssignHeuristic::Random { seed: 99 },
    ] {
        let value = solve(
            coupled_instance(),
            Settings {
                assign_heuristic: heuristic,
                ..Settings::default()
            },
        )
        .0;
        assert!(
            (value - baseline).abs() < PRECISION,
            "{heuristic:?} changed the value"
        );
    }
}

#[test]
fn repeated_solves_are_deterministic() {
    let first = solve(coupled_instance(), Settings::default()).0;
    let second = solve(coupled_instance(), Settings::default()).0;
    assert!((first - second).abs() < PRECISION);
}

#[test]
fn policy_is_closed_under_its_own_transitions() {
    let domain = MaintDomain::new(coupled_instance());
    let mut solver = CoRe::new(&domain);
    let policy = solver.solve().unwrap();

    let mut pending = vec![policy.initial_state().clone()];
    let mut seen = Vec::new();
    while let Some(state) = pending.pop() {
        if seen.contains(&state) {
            continue;
        }
        let record = policy
            .record(&state)
            .unwrap_or_else(|| panic!("state {state} missing from policy map"));
        for transition in record.transitions() {
            pending.push(transition.to().clone());
        }
        seen.push(state);
    }
    assert!(seen.len() > 1);
}

#[test]
fn every_non_terminal_policy_state_has_an_action() {
    let domain = MaintDomain::new(coupled_instance());
    let mut solver = CoRe::new(&domain);
    let policy = solver.solve().unwrap();

    for (state, record) in policy.iter() {
        if record.is_terminal() {
            continue;
        }
        let action = record.optimal_action().expect("non-terminal without action");
        assert_eq!(action.len(), state.len());
        assert!(!record.transitions().is_empty());
    }
}

#[test]
fn crg_bounds_contain_the_optimal_return() {
    let domain = MaintDomain::new(delayed_single_instance());
    let rewards = domain.create_rewards();
    let mut assignment = domain.assign_rewards(&rewards, AssignHeuristic::HighestDegree);
    let initial = domain.factor_state(&domain.initial_state());
    let local = initial.local(AgentId(0)).unwrap().as_ref().clone();

    let deadline = Deadline::new(None);
    let mut stats = crate::solver::stats::CrgBuildStats::default();
    let mut crg = Crg::new(assignment.remove(&AgentId(0)).unwrap());
    let bound = crg
        .construct(&domain, false, &deadline, &mut stats, local, &rewards)
        .unwrap();

    // the exact single-agent optimum is 77
    assert!(bound.lower().unwrap().total() <= 77.0 + PRECISION);
    assert!(bound.upper().unwrap().total() >= 77.0 - PRECISION);
}

// --- adapter violation surfacing -----------------------------------------

/// An adapter whose successor probabilities sum to 0.9.
struct BrokenDomain;

struct ZeroReward;

impl CrgReward<u32, u8> for ZeroReward {
    fn scope(&self) -> &[AgentId] {
        static SCOPE: [AgentId; 1] = [AgentId(0)];
        &SCOPE
    }

    fn reward(&self, _t: &CrgTransition<u32, u8>) -> StateValue {
        StateValue::zeros(1)
    }

    fn local_cri(&self, _s: &CrgState<u32>) -> bool {
        true
    }

    fn cri(&self, _a1: AgentId, _a2: AgentId, _s: &JointState<u32>) -> bool {
        true
    }
}

impl CrDomain for BrokenDomain {
    type StateData = u32;
    type Action = u8;
    type GlobalState = ();

    fn agents(&self) -> &[AgentId] {
        static AGENTS: [AgentId; 1] = [AgentId(0)];
        &AGENTS
    }

    fn horizon(&self) -> u32 {
        1
    }

    fn empty_value(&self) -> StateValue {
        StateValue::zeros(1)
    }

    fn initial_state(&self) {}

    fn create_rewards(&self) -> Vec<Rc<dyn CrgReward<u32, u8>>> {
        vec![Rc::new(ZeroReward)]
    }

    fn available_actions(&self, state: &CrgState<u32>) -> Vec<u8> {
        if state.time() < 1 {
            vec![0]
        } else {
            Vec::new()
        }
    }

    fn new_states(&self, state: &CrgState<u32>, _action: &u8) -> Vec<CrgState<u32>> {
        vec![
            CrgState::new(state.agent(), state.time() + 1, 1),
            CrgState::new(state.agent(), state.time() + 1, 2),
        ]
    }

    fn transition_probability(&self, _transition: &CrgTransition<u32, u8>) -> f64 {
        0.45
    }

    fn dependent_actions(
        &self,
        _rewards: &RewardSet<u32, u8>,
        _transition: &CrgTransition<u32, u8>,
        _agent: AgentId,
    ) -> Vec<u8> {
        Vec::new()
    }

    fn transition_influence(
        &self,
        _rewards: &RewardSet<u32, u8>,
        _transition: &CrgTransition<u32, u8>,
        _agent: AgentId,
    ) -> Vec<Influence<u32>> {
        Vec::new()
    }

    fn factor_state(&self, _state: &()) -> JointState<u32> {
        JointState::from_locals([CrgState::new(AgentId(0), 0, 0u32)])
    }
}

#[test]
fn probability_sum_violation_surfaces() {
    let domain = BrokenDomain;
    let mut solver = CoRe::new(&domain);
    match solver.solve() {
        Err(SolverError::AdapterViolation(message)) => {
            assert!(message.contains("sum to 1"), "unexpected message: {message}");
        }
        Err(other) => panic!("expected an adapter violation, got {other}"),
        Ok(_) => panic!("expected an adapter violation, got a policy"),
    }
}
