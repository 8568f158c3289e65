//! Local and global maintenance states.

use std::collections::BTreeMap;

use crate::model::agent::AgentId;

use super::task::{Task, TaskId};

/// The realisation of a started task: its start time and whether it was
/// delayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Planned {
    pub start: u32,
    pub delayed: bool,
}

impl Planned {
    /// The last time step the task occupies.
    pub fn end(&self, task: &Task) -> u32 {
        self.start + task.realized_duration(self.delayed) - 1
    }
}

/// The local state payload of one maintenance agent: every started task with
/// its realisation, plus the currently running task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MaintLocal {
    pub planned: BTreeMap<TaskId, Planned>,
    pub current: Option<TaskId>,
}

impl MaintLocal {
    /// True iff the agent is not executing a task.
    pub fn is_idle(&self) -> bool {
        self.current.is_none()
    }

    /// True iff the task has been fully completed (started and no longer
    /// running).
    pub fn has_completed(&self, task: TaskId) -> bool {
        if self.current == Some(task) {
            return false;
        }
        self.planned.contains_key(&task)
    }

    /// The payload after idling for one step.
    pub fn after_idle(&self) -> MaintLocal {
        debug_assert!(self.is_idle(), "cannot idle while a task is running");
        self.clone()
    }

    /// The payload after starting `task` at `time` with the given delay
    /// outcome.
    pub fn after_start(&self, task: &Task, time: u32, delayed: bool) -> MaintLocal {
        debug_assert!(self.is_idle(), "cannot start a task while busy");
        let mut next = self.clone();
        let planned = Planned {
            start: time,
            delayed,
        };
        next.planned.insert(task.id, planned);
        if task.realized_duration(delayed) > 1 {
            next.current = Some(task.id);
        }
        next
    }

    /// The payload after continuing the running task into `new_time`.
    pub fn after_continue(&self, tasks: &BTreeMap<TaskId, Task>, new_time: u32) -> MaintLocal {
        let mut next = self.clone();
        if let Some(current) = self.current {
            let planned = self.planned[&current];
            if planned.end(&tasks[&current]) < new_time {
                next.current = None;
            }
        }
        next
    }
}

/// The global state of a maintenance instance: the shared time and every
/// agent's local payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MaintState {
    pub time: u32,
    pub locals: BTreeMap<AgentId, MaintLocal>,
}

impl MaintState {
    /// The initial global state at time zero.
    pub fn initial() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::function::RewardFn;

    fn task(id: TaskId, duration: u32) -> Task {
        Task::fixed(AgentId(0), id, 10.0, RewardFn::Constant(-1.0), duration)
    }

    fn table(tasks: &[Task]) -> BTreeMap<TaskId, Task> {
        tasks.iter().map(|t| (t.id, t.clone())).collect()
    }

    #[test]
    fn starting_a_long_task_keeps_the_agent_busy() {
        let local = MaintLocal::default();
        let next = local.after_start(&task(1, 2), 0, false);
        assert_eq!(next.current, Some(1));
        assert!(!next.has_completed(1));
    }

    #[test]
    fn starting_a_unit_task_completes_it_immediately() {
        let local = MaintLocal::default();
        let next = local.after_start(&task(1, 1), 0, false);
        assert!(next.is_idle());
        assert!(next.has_completed(1));
    }

    #[test]
    fn continuing_clears_the_task_at_its_end() {
        let tasks = table(&[task(1, 2)]);
        let local = MaintLocal::default().after_start(&tasks[&1], 0, false);
        // at time 1 the task occupies its final step; at time 2 it is done
        let still_busy = local.after_continue(&tasks, 1);
        assert_eq!(still_busy.current, Some(1));
        let done = local.after_continue(&tasks, 2);
        assert!(done.is_idle());
        assert!(done.has_completed(1));
    }

    #[test]
    fn delay_extends_the_occupancy() {
        let t = Task::delayable(AgentId(0), 1, 0.0, RewardFn::Constant(0.0), 2, 0.5, 1);
        let tasks: BTreeMap<TaskId, Task> = [(1, t.clone())].into();
        let local = MaintLocal::default().after_start(&t, 0, true);
        assert_eq!(local.planned[&1].end(&t), 2);
        assert_eq!(local.after_continue(&tasks, 2).current, Some(1));
        assert!(local.after_continue(&tasks, 3).is_idle());
    }
}
