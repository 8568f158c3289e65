//! Sample domain: multi-agent maintenance planning.
//!
//! Agents plan maintenance tasks with revenues, per-step costs and stochastic
//! delays over a finite horizon, while shared "network" rules penalize
//! combinations of tasks executed concurrently. The adapter in this module
//! plugs the domain into the CoRe solver and doubles as a reference for
//! writing adapters over other problems.

pub mod domain;
pub mod instance;
pub mod state;
pub mod task;

pub use domain::{value, MaintDomain, OBJECTIVES};
pub use instance::{
    deserialize_shared, serialize_shared, MaintAgent, MaintInstance, RuleAction,
    SharedRewardParseError,
};
pub use state::{MaintLocal, MaintState, Planned};
pub use task::{MaintAction, Task, TaskId};
