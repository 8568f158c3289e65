//! Maintenance problem instances.

use std::collections::BTreeSet;

use thiserror::Error;

use crate::model::agent::AgentId;
use crate::model::function::{FunctionParseError, RewardFn};
use crate::model::shared::SharedRewards;

use super::task::{Task, TaskId};

/// A shared-rule action: one task of one agent.
pub type RuleAction = (AgentId, TaskId);

/// An agent of a maintenance instance with the tasks it is responsible for.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MaintAgent {
    pub id: AgentId,
    pub tasks: Vec<Task>,
}

/// A complete maintenance planning instance.
///
/// With `must_complete` set, agents may only take actions that leave enough
/// time to finish all of their remaining tasks within the horizon.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MaintInstance {
    pub horizon: u32,
    pub must_complete: bool,
    pub agents: Vec<MaintAgent>,
    pub shared: SharedRewards<RuleAction>,
}

impl MaintInstance {
    /// Creates an instance without agents or shared rules.
    pub fn new(horizon: u32) -> Self {
        Self {
            horizon,
            must_complete: false,
            agents: Vec::new(),
            shared: SharedRewards::new(),
        }
    }

    /// Adds an agent with its tasks; IDs must be dense and in order.
    pub fn add_agent(&mut self, tasks: Vec<Task>) -> AgentId {
        let id = AgentId(self.agents.len());
        debug_assert!(tasks.iter().all(|t| t.agent == id), "task owned by another agent");
        self.agents.push(MaintAgent { id, tasks });
        id
    }

    /// Adds a shared penalty rule over tasks of distinct agents.
    ///
    /// Returns `false` when a rule over the same action set already exists.
    pub fn add_rule(&mut self, actions: &[RuleAction], reward: RewardFn) -> bool {
        let set: BTreeSet<RuleAction> = actions.iter().copied().collect();
        self.shared.add_rule(set, reward)
    }

    /// Looks up a task.
    pub fn task(&self, agent: AgentId, task: TaskId) -> Option<&Task> {
        self.agents
            .get(agent.index())
            .and_then(|a| a.tasks.iter().find(|t| t.id == task))
    }
}

/// Errors raised when parsing a serialized shared reward model.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SharedRewardParseError {
    #[error("invalid weight '{0}'")]
    InvalidWeight(String),

    #[error("malformed rule '{0}', expected 'agent:task+...=function'")]
    MalformedRule(String),

    #[error("invalid rule function: {0}")]
    InvalidFunction(#[from] FunctionParseError),
}

/// Serializes a shared reward model as `w=<weight>;rule|rule|...` with each
/// rule written as `agent:task+agent:task=<function>`.
pub fn serialize_shared(shared: &SharedRewards<RuleAction>) -> String {
    let rules: Vec<String> = shared
        .rules()
        .map(|(actions, function)| {
            let keys: Vec<String> = actions
                .iter()
                .map(|(agent, task)| format!("{}:{}", agent.index(), task))
                .collect();
            format!("{}={}", keys.join("+"), function.serialize())
        })
        .collect();
    format!("w={};{}", shared.weight(), rules.join("|"))
}

/// Parses a shared reward model.
///
/// Accepts the weight prefix with either separator (`w=1.5;rules` or
/// `w=1.5|rules`) as well as the bare historical form without a weight.
pub fn deserialize_shared(
    input: &str,
) -> Result<SharedRewards<RuleAction>, SharedRewardParseError> {
    let (weight, rules) = match input.strip_prefix("w=") {
        Some(rest) => {
            let split = rest
                .find([';', '|'])
                .ok_or_else(|| SharedRewardParseError::InvalidWeight(input.to_string()))?;
            let weight: f64 = rest[..split]
                .parse()
                .map_err(|_| SharedRewardParseError::InvalidWeight(rest[..split].to_string()))?;
            (weight, &rest[split + 1..])
        }
        None => (1.0, input),
    };

    let mut shared = SharedRewards::new();
    for rule in rules.split('|').filter(|r| !r.is_empty()) {
        let (keys, function) = rule
            .split_once('=')
            .ok_or_else(|| SharedRewardParseError::MalformedRule(rule.to_string()))?;
        let mut actions = BTreeSet::new();
        for key in keys.split('+') {
            let (agent, task) = key
                .split_once(':')
                .ok_or_else(|| SharedRewardParseError::MalformedRule(rule.to_string()))?;
            let agent: usize = agent
                .parse()
                .map_err(|_| SharedRewardParseError::MalformedRule(rule.to_string()))?;
            let task: TaskId = task
                .parse()
                .map_err(|_| SharedRewardParseError::MalformedRule(rule.to_string()))?;
            actions.insert((AgentId(agent), task));
        }
        shared.add_rule(actions, RewardFn::deserialize(function)?);
    }
    shared.set_weight(weight);
    Ok(shared)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SharedRewards<RuleAction> {
        let mut shared = SharedRewards::new();
        shared.add_rule(
            [(AgentId(0), 1), (AgentId(1), 0)].into(),
            RewardFn::Constant(-8.0),
        );
        shared.add_rule(
            [(AgentId(0), 0), (AgentId(2), 2)].into(),
            RewardFn::Linear { a: 1.0, b: -2.0 },
        );
        shared.scale(1.5);
        shared
    }

    #[test]
    fn shared_round_trip() {
        let shared = sample();
        let parsed = deserialize_shared(&serialize_shared(&shared)).unwrap();
        assert_eq!(parsed, shared);
    }

    #[test]
    fn bare_format_defaults_to_unit_weight() {
        let parsed = deserialize_shared("0:1+1:0=const;-8").unwrap();
        assert_eq!(parsed.len(), 1);
        assert!((parsed.weight() - 1.0).abs() < 1e-10);
    }

    #[test]
    fn pipe_separated_weight_prefix_is_accepted() {
        let parsed = deserialize_shared("w=2|0:1+1:0=const;-8").unwrap();
        assert!((parsed.weight() - 2.0).abs() < 1e-10);
        assert_eq!(parsed.len(), 1);
    }

    #[test]
    fn malformed_rules_are_rejected() {
        assert!(deserialize_shared("0:1+1:0").is_err());
        assert!(deserialize_shared("0:1=notafunction").is_err());
        assert!(deserialize_shared("w=abc;0:1=const;1").is_err());
    }

    #[test]
    fn instance_task_lookup() {
        let mut instance = MaintInstance::new(3);
        let a = instance.add_agent(vec![Task::fixed(
            AgentId(0),
            0,
            5.0,
            RewardFn::Constant(0.0),
            1,
        )]);
        assert!(instance.task(a, 0).is_some());
        assert!(instance.task(a, 1).is_none());
        assert!(instance.task(AgentId(9), 0).is_none());
    }
}
