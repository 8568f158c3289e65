//! coreplan - Conditional Return policy search for cooperative multi-agent
//! planning.
//!
//! Solves transition-independent multi-agent Markov decision processes with
//! sparse reward interactions. Per agent, a Conditional Return Graph (CRG)
//! caches local transitions annotated with the action dependencies and state
//! influences of other agents, together with reward, probability and return
//! bounds. A depth-first branch-and-bound search over joint states then reuses
//! the CRGs to find an optimal joint policy without materializing the full
//! joint MDP, decoupling the search whenever agents become conditionally
//! reward independent.
//!
//! Problems are presented through the [`CrDomain`] adapter trait; any domain
//! satisfying its contract plugs into the solver. A sample maintenance
//! planning domain is bundled in [`maintenance`].

pub mod crg;
pub mod domain;
pub mod error;
pub mod factored;
pub mod maintenance;
pub mod model;
pub mod solver;

pub use crg::heuristic::AssignHeuristic;
pub use domain::{CrDomain, CrgReward};
pub use error::SolverError;
pub use model::agent::AgentId;
pub use model::bound::ValueBound;
pub use model::function::RewardFn;
pub use model::value::StateValue;
pub use solver::policy::Policy;
pub use solver::settings::Settings;
pub use solver::stats::Stats;
pub use solver::CoRe;

/// Solver precision for probability and value comparisons.
pub const PRECISION: f64 = 1e-8;
