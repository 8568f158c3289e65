//! Core problem model: agents, multi-objective values, return bounds,
//! time-dependent reward functions and shared reward rules.

pub mod agent;
pub mod bound;
pub mod function;
pub mod shared;
pub mod value;

pub use agent::AgentId;
pub use bound::ValueBound;
pub use function::RewardFn;
pub use shared::SharedRewards;
pub use value::StateValue;
