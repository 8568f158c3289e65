//! Solver statistics.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use crate::model::agent::AgentId;

/// Per-CRG construction counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct CrgBuildStats {
    /// Local states created.
    pub states: u64,
    /// Annotated transitions created.
    pub transitions: u64,
    /// Terminal states encountered.
    pub terminal: u64,
    /// Locally independent states encountered.
    pub independent: u64,
    /// Previously encountered states revisited.
    pub duplicates: u64,
    /// Action dependency branches expanded.
    pub dep_branches: u64,
    /// Transition influence branches expanded.
    pub infl_branches: u64,
}

/// Counters and timings of a full solve run.
#[derive(Debug, Clone, Default)]
pub struct Stats {
    /// Wall-clock spent building the CRGs.
    pub preprocess_time: Duration,
    /// Wall-clock spent in the policy search.
    pub solve_time: Duration,
    /// Wall-clock spent reconstructing the policy.
    pub postprocess_time: Duration,

    /// Joint states evaluated (including revisits).
    pub states: u64,
    /// Previously optimized states revisited.
    pub visited: u64,
    /// Terminal joint states encountered.
    pub terminal: u64,
    /// Joint actions fully evaluated.
    pub joint_actions: u64,

    /// Branch-and-bound prune attempts.
    pub prunes: u64,
    /// Joint actions pruned before the evaluation loop.
    pub pruned_outer: u64,
    /// Joint actions pruned during the evaluation loop.
    pub pruned_inner: u64,

    /// Joint states that were decoupled into components.
    pub decoupled: u64,
    /// Total number of components produced by decoupling.
    pub decouple_total: u64,
    /// Accumulated joint state sizes, for the average state size.
    pub state_size: u64,

    /// Construction counters per CRG.
    pub crg: BTreeMap<AgentId, CrgBuildStats>,
}

impl Stats {
    /// The average number of components per decoupled state.
    pub fn average_split_size(&self) -> f64 {
        if self.decoupled == 0 {
            return 0.0;
        }
        self.decouple_total as f64 / self.decoupled as f64
    }

    /// The average number of agents per evaluated joint state.
    pub fn average_state_size(&self) -> f64 {
        if self.states == 0 {
            return 0.0;
        }
        self.state_size as f64 / self.states as f64
    }

    /// The construction counters of one CRG, creating them on first use.
    pub fn for_crg(&mut self, agent: AgentId) -> &mut CrgBuildStats {
        self.crg.entry(agent).or_default()
    }
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Timing:")?;
        writeln!(f, "> Pre-processing: {:?}", self.preprocess_time)?;
        writeln!(f, "> Solving: {:?}", self.solve_time)?;
        writeln!(f, "> Post-processing: {:?}", self.postprocess_time)?;
        writeln!(f, "CoRe statistics:")?;
        writeln!(f, "> States evaluated: {}", self.states)?;
        writeln!(f, "> ... previously visited: {}", self.visited)?;
        writeln!(f, "> ... terminal: {}", self.terminal)?;
        writeln!(f, "> Actions evaluated: {}", self.joint_actions)?;
        writeln!(f, "B&B:")?;
        writeln!(f, "> Prune attempts: {}", self.prunes)?;
        writeln!(f, "> Actions pruned (outer): {}", self.pruned_outer)?;
        writeln!(f, "> Actions pruned (inner): {}", self.pruned_inner)?;
        writeln!(f, "CRI:")?;
        writeln!(f, "> States decoupled: {}", self.decoupled)?;
        writeln!(f, "> Average split size: {:.2}", self.average_split_size())?;
        writeln!(f, "> Average state size: {:.2}", self.average_state_size())?;
        for (agent, crg) in &self.crg {
            writeln!(
                f,
                "CRG {agent}: {} states ({} terminal, {} independent, {} duplicates), \
                 {} transitions, {} dependency branches, {} influence branches",
                crg.states,
                crg.terminal,
                crg.independent,
                crg.duplicates,
                crg.transitions,
                crg.dep_branches,
                crg.infl_branches
            )?;
        }
        Ok(())
    }
}
