//! Maintenance tasks and the actions over them.

use crate::model::agent::AgentId;
use crate::model::function::RewardFn;

/// Identifies a task within its agent.
pub type TaskId = u32;

/// A maintenance task owned by a single agent.
///
/// Executing the task yields its revenue on the starting step and charges the
/// cost function at every step it occupies. With positive delay probability
/// the realized duration is extended by `delay_duration`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Task {
    pub id: TaskId,
    pub agent: AgentId,
    pub revenue: f64,
    pub cost: RewardFn,
    pub duration: u32,
    pub delay_probability: f64,
    pub delay_duration: u32,
}

impl Task {
    /// Creates a task without delay risk.
    pub fn fixed(agent: AgentId, id: TaskId, revenue: f64, cost: RewardFn, duration: u32) -> Self {
        Self {
            id,
            agent,
            revenue,
            cost,
            duration,
            delay_probability: 0.0,
            delay_duration: 0,
        }
    }

    /// Creates a task that may be delayed.
    pub fn delayable(
        agent: AgentId,
        id: TaskId,
        revenue: f64,
        cost: RewardFn,
        duration: u32,
        delay_probability: f64,
        delay_duration: u32,
    ) -> Self {
        Self {
            id,
            agent,
            revenue,
            cost,
            duration,
            delay_probability,
            delay_duration,
        }
    }

    /// True iff the task has a chance of being delayed.
    pub fn can_delay(&self) -> bool {
        self.delay_probability > 0.0 && self.delay_duration > 0
    }

    /// The realized duration for a delay outcome.
    pub fn realized_duration(&self, delayed: bool) -> u32 {
        if delayed {
            self.duration + self.delay_duration
        } else {
            self.duration
        }
    }

    /// The duration when everything goes wrong.
    pub fn worst_case_duration(&self) -> u32 {
        self.duration + if self.can_delay() { self.delay_duration } else { 0 }
    }
}

/// A local action of a maintenance agent.
///
/// Continuing is identified by the task being continued, which keeps CRG
/// transition matching unambiguous between concurrently running tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MaintAction {
    /// Do nothing for one step.
    Idle,
    /// Start executing the task.
    Execute(TaskId),
    /// Keep executing the running task for another step.
    Continue(TaskId),
}

impl MaintAction {
    /// The task actually being executed during this step, if any.
    pub fn real_task(&self) -> Option<TaskId> {
        match self {
            MaintAction::Idle => None,
            MaintAction::Execute(task) | MaintAction::Continue(task) => Some(*task),
        }
    }

    /// True iff this action starts a task.
    pub fn is_start(&self) -> bool {
        matches!(self, MaintAction::Execute(_))
    }
}
