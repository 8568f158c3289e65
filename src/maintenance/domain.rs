//! The maintenance planning domain adapter.

use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use crate::crg::rewards::RewardSet;
use crate::crg::state::{CrgState, Influence};
use crate::crg::transition::CrgTransition;
use crate::domain::{CrDomain, CrgReward};
use crate::model::agent::AgentId;
use crate::model::function::RewardFn;
use crate::model::value::StateValue;
use crate::solver::joint::JointState;

use super::instance::MaintInstance;
use super::state::{MaintLocal, MaintState};
use super::task::{MaintAction, Task, TaskId};

/// Objective positions of the maintenance value vector.
pub const OBJECTIVES: [&str; 3] = ["revenue", "cost", "network"];

/// Builds a maintenance value from its named objectives.
pub fn value(revenue: f64, cost: f64, network: f64) -> StateValue {
    StateValue::from_values(vec![revenue, cost, network])
}

/// Presents a [`MaintInstance`] to the CoRe solver.
pub struct MaintDomain {
    instance: MaintInstance,
    agents: Vec<AgentId>,
    tasks: BTreeMap<AgentId, Rc<BTreeMap<TaskId, Task>>>,
}

impl MaintDomain {
    /// Wraps an instance for solving.
    pub fn new(instance: MaintInstance) -> Self {
        let agents: Vec<AgentId> = instance.agents.iter().map(|a| a.id).collect();
        let tasks = instance
            .agents
            .iter()
            .map(|a| {
                let table: BTreeMap<TaskId, Task> =
                    a.tasks.iter().map(|t| (t.id, t.clone())).collect();
                (a.id, Rc::new(table))
            })
            .collect();
        Self {
            instance,
            agents,
            tasks,
        }
    }

    /// The wrapped instance.
    pub fn instance(&self) -> &MaintInstance {
        &self.instance
    }

    fn agent_tasks(&self, agent: AgentId) -> &Rc<BTreeMap<TaskId, Task>> {
        &self.tasks[&agent]
    }

    /// True iff the task still fits in the horizon when started at `time`,
    /// assuming the worst-case delay.
    fn can_complete(&self, task: &Task, time: u32) -> bool {
        time + task.worst_case_duration() <= self.instance.horizon
    }

    /// True iff after taking the action there is still enough time to finish
    /// every remaining task of the agent.
    fn can_complete_all(&self, agent: AgentId, local: &MaintLocal, time: u32, idle: bool) -> bool {
        let mut required = u32::from(idle);
        for task in self.agent_tasks(agent).values() {
            if !local.has_completed(task.id) {
                required += task.worst_case_duration();
            }
        }
        time + required <= self.instance.horizon
    }

    /// The network rule behind a shared reward, identified by its key.
    fn rule_actions(&self, key: usize) -> Option<&BTreeSet<(AgentId, TaskId)>> {
        let index = key.checked_sub(self.agents.len())?;
        self.instance.shared.rules().nth(index).map(|(actions, _)| actions)
    }
}

impl CrDomain for MaintDomain {
    type StateData = MaintLocal;
    type Action = MaintAction;
    type GlobalState = MaintState;

    fn agents(&self) -> &[AgentId] {
        &self.agents
    }

    fn horizon(&self) -> u32 {
        self.instance.horizon
    }

    fn empty_value(&self) -> StateValue {
        StateValue::zeros(OBJECTIVES.len())
    }

    fn initial_state(&self) -> MaintState {
        MaintState::initial()
    }

    fn create_rewards(&self) -> Vec<Rc<dyn CrgReward<MaintLocal, MaintAction>>> {
        let mut rewards: Vec<Rc<dyn CrgReward<MaintLocal, MaintAction>>> = Vec::new();

        for &agent in &self.agents {
            rewards.push(Rc::new(MaintReward {
                key: rewards.len(),
                scope: vec![agent],
                horizon: self.instance.horizon,
                kind: RewardKind::Individual {
                    tasks: self.agent_tasks(agent).clone(),
                },
            }));
        }

        for (actions, function) in self.instance.shared.rules() {
            let scope: Vec<AgentId> = {
                let mut agents: Vec<AgentId> = actions.iter().map(|(a, _)| *a).collect();
                agents.dedup();
                agents
            };
            rewards.push(Rc::new(MaintReward {
                key: rewards.len(),
                scope,
                horizon: self.instance.horizon,
                kind: RewardKind::Network {
                    actions: actions.clone(),
                    reward: function.with_weight(self.instance.shared.weight()),
                },
            }));
        }

        rewards
    }

    fn available_actions(&self, state: &CrgState<MaintLocal>) -> Vec<MaintAction> {
        if state.time() == self.instance.horizon {
            return Vec::new();
        }
        let local = state.data();
        if let Some(current) = local.current {
            return vec![MaintAction::Continue(current)];
        }

        let agent = state.agent();
        let mut actions = Vec::new();
        for task in self.agent_tasks(agent).values() {
            if local.has_completed(task.id) {
                continue;
            }
            if !self.can_complete(task, state.time()) {
                continue;
            }
            if self.instance.must_complete
                && !self.can_complete_all(agent, local, state.time(), false)
            {
                continue;
            }
            actions.push(MaintAction::Execute(task.id));
        }

        let idle_fits = state.time() + 1 <= self.instance.horizon;
        if idle_fits
            && (!self.instance.must_complete
                || self.can_complete_all(agent, local, state.time(), true))
        {
            actions.push(MaintAction::Idle);
        }

        actions
    }

    fn new_states(
        &self,
        state: &CrgState<MaintLocal>,
        action: &MaintAction,
    ) -> Vec<CrgState<MaintLocal>> {
        let agent = state.agent();
        let time = state.time();
        let local = state.data();
        let tasks = self.agent_tasks(agent);

        if !local.is_idle() {
            return vec![CrgState::new(
                agent,
                time + 1,
                local.after_continue(tasks, time + 1),
            )];
        }

        match action {
            MaintAction::Idle => vec![CrgState::new(agent, time + 1, local.after_idle())],
            MaintAction::Execute(id) => {
                let task = &tasks[id];
                let mut states = vec![CrgState::new(
                    agent,
                    time + 1,
                    local.after_start(task, time, false),
                )];
                if task.can_delay() {
                    states.push(CrgState::new(
                        agent,
                        time + 1,
                        local.after_start(task, time, true),
                    ));
                }
                states
            }
            MaintAction::Continue(_) => {
                vec![CrgState::new(
                    agent,
                    time + 1,
                    local.after_continue(tasks, time + 1),
                )]
            }
        }
    }

    fn transition_probability(&self, transition: &CrgTransition<MaintLocal, MaintAction>) -> f64 {
        let MaintAction::Execute(id) = transition.action() else {
            return 1.0;
        };
        let task = &self.agent_tasks(transition.agent())[id];
        if !task.can_delay() {
            return 1.0;
        }
        if transition.to().data().planned[id].delayed {
            task.delay_probability
        } else {
            1.0 - task.delay_probability
        }
    }

    fn dependent_actions(
        &self,
        rewards: &RewardSet<MaintLocal, MaintAction>,
        transition: &CrgTransition<MaintLocal, MaintAction>,
        agent: AgentId,
    ) -> Vec<MaintAction> {
        let Some(real_task) = transition.action().real_task() else {
            return Vec::new();
        };
        let own = transition.agent();

        let mut actions = BTreeSet::new();
        for reward in rewards.rewards() {
            if reward.size() < 2 || !reward.in_scope(agent) {
                continue;
            }
            let Some(rule) = self.rule_actions(reward.key()) else {
                continue;
            };
            if !rule.contains(&(own, real_task)) {
                continue;
            }
            for &(rule_agent, rule_task) in rule {
                if rule_agent != agent {
                    continue;
                }
                actions.insert(MaintAction::Execute(rule_task));
                if self.agent_tasks(agent)[&rule_task].worst_case_duration() > 1 {
                    actions.insert(MaintAction::Continue(rule_task));
                }
            }
        }

        actions.into_iter().collect()
    }

    fn transition_influence(
        &self,
        _rewards: &RewardSet<MaintLocal, MaintAction>,
        _transition: &CrgTransition<MaintLocal, MaintAction>,
        _agent: AgentId,
    ) -> Vec<Influence<MaintLocal>> {
        // maintenance rewards couple through concurrent actions only
        Vec::new()
    }

    fn factor_state(&self, state: &MaintState) -> JointState<MaintLocal> {
        JointState::from_locals(self.agents.iter().map(|&agent| {
            CrgState::new(
                agent,
                state.time,
                state.locals.get(&agent).cloned().unwrap_or_default(),
            )
        }))
    }
}

enum RewardKind {
    Individual {
        tasks: Rc<BTreeMap<TaskId, Task>>,
    },
    Network {
        actions: BTreeSet<(AgentId, TaskId)>,
        reward: RewardFn,
    },
}

/// A maintenance reward function: either the private revenue/cost stream of
/// one agent, or a shared network penalty rule.
struct MaintReward {
    key: usize,
    scope: Vec<AgentId>,
    horizon: u32,
    kind: RewardKind,
}

impl MaintReward {
    fn rule_task(&self, agent: AgentId) -> Option<TaskId> {
        match &self.kind {
            RewardKind::Individual { .. } => None,
            RewardKind::Network { actions, .. } => actions
                .iter()
                .find(|(a, _)| *a == agent)
                .map(|(_, task)| *task),
        }
    }
}

impl CrgReward<MaintLocal, MaintAction> for MaintReward {
    fn scope(&self) -> &[AgentId] {
        &self.scope
    }

    fn key(&self) -> usize {
        self.key
    }

    fn reward(&self, transition: &CrgTransition<MaintLocal, MaintAction>) -> StateValue {
        let time = transition.from().time();
        match &self.kind {
            RewardKind::Individual { tasks } => match transition.action() {
                MaintAction::Idle => value(0.0, 0.0, 0.0),
                MaintAction::Execute(id) => {
                    let task = &tasks[id];
                    value(task.revenue, task.cost.eval(time, self.horizon), 0.0)
                }
                MaintAction::Continue(id) => {
                    value(0.0, tasks[id].cost.eval(time, self.horizon), 0.0)
                }
            },
            RewardKind::Network { actions, reward } => {
                // the tasks executing concurrently in this annotated step
                let mut executing = BTreeSet::new();
                if let Some(task) = transition.action().real_task() {
                    executing.insert((transition.agent(), task));
                }
                for (agent, action) in transition.deps().members() {
                    if let Some(task) = action.real_task() {
                        executing.insert((agent, task));
                    }
                }

                if actions.iter().all(|a| executing.contains(a)) {
                    value(0.0, 0.0, reward.eval(time, self.horizon))
                } else {
                    value(0.0, 0.0, 0.0)
                }
            }
        }
    }

    fn local_cri(&self, state: &CrgState<MaintLocal>) -> bool {
        match self.rule_task(state.agent()) {
            None => true,
            Some(task) => state.data().has_completed(task),
        }
    }

    fn cri(&self, a1: AgentId, a2: AgentId, state: &JointState<MaintLocal>) -> bool {
        let first = state.get(a1).map_or(false, |s| self.local_cri(s));
        let second = state.get(a2).map_or(false, |s| self.local_cri(s));
        first || second
    }

    fn name(&self) -> String {
        match &self.kind {
            RewardKind::Individual { .. } => format!("R({})", self.scope[0]),
            RewardKind::Network { actions, .. } => format!("R({actions:?})"),
        }
    }
}
