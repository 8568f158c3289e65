//! The CoRe solver: preprocessing, policy search and policy reconstruction.

pub mod coord;
pub mod joint;
pub mod policy;
pub mod progress;
mod search;
pub mod settings;
pub mod stats;

#[cfg(test)]
mod tests;

use std::collections::BTreeMap;
use std::fs;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::crg::Crg;
use crate::domain::CrDomain;
use crate::error::SolverError;
use crate::model::agent::AgentId;

use policy::Policy;
use settings::Settings;
use stats::Stats;

/// Cooperative timeout: polled at the entry of every CRG-build and policy
/// search recursion.
#[derive(Debug, Clone)]
pub struct Deadline {
    start: Instant,
    budget: Option<Duration>,
}

impl Deadline {
    /// Starts the clock with an optional budget.
    pub fn new(budget: Option<Duration>) -> Self {
        Self {
            start: Instant::now(),
            budget,
        }
    }

    /// Fails with [`SolverError::Timeout`] once the budget is exhausted.
    pub fn check(&self) -> Result<(), SolverError> {
        match self.budget {
            Some(budget) if self.start.elapsed() > budget => Err(SolverError::Timeout),
            _ => Ok(()),
        }
    }
}

/// The Conditional Return policy search solver.
///
/// Preprocessing assigns every reward function to an owner agent and builds
/// one CRG per agent; the search then finds the optimal joint policy over the
/// CRGs, and postprocessing recombines the (possibly decoupled) search
/// results into a queryable [`Policy`].
pub struct CoRe<'a, D: CrDomain> {
    domain: &'a D,
    settings: Settings,
    stats: Stats,
}

impl<'a, D: CrDomain> CoRe<'a, D> {
    /// Creates a solver with default settings.
    pub fn new(domain: &'a D) -> Self {
        Self::with_settings(domain, Settings::default())
    }

    /// Creates a solver with explicit settings.
    pub fn with_settings(domain: &'a D, settings: Settings) -> Self {
        Self {
            domain,
            settings,
            stats: Stats::default(),
        }
    }

    /// The solver configuration.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Mutable access to the solver configuration.
    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    /// The statistics of the last solve run.
    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// Runs the full solve: preprocess, search, postprocess.
    ///
    /// On failure no partial policy is exposed.
    pub fn solve(&mut self) -> Result<Policy<'a, D>, SolverError> {
        self.stats = Stats::default();
        let deadline = Deadline::new(self.settings.max_runtime);

        if let Some(dir) = self.settings.debug_dir.clone() {
            fs::create_dir_all(&dir)?;
        }

        info!("CoRe solver starting");

        let started = Instant::now();
        let (crgs, initial) = self.preprocess(&deadline)?;
        self.stats.preprocess_time = started.elapsed();
        debug!(elapsed = ?self.stats.preprocess_time, "preprocessing completed");

        let started = Instant::now();
        let mut search = search::Search::new(
            self.domain,
            &self.settings,
            &deadline,
            &mut self.stats,
            &crgs,
        );
        let value = search.run(&initial)?;
        let (trans_map, decouple_map, init_states) =
            (search.trans_map, search.decouple_map, search.init_states);
        self.stats.solve_time = started.elapsed();
        debug!(elapsed = ?self.stats.solve_time, value = %value, "solve completed");

        let started = Instant::now();
        let policy = policy::reconstruct(
            self.domain,
            self.domain.horizon(),
            &trans_map,
            &decouple_map,
            &init_states,
        )?;
        self.stats.postprocess_time = started.elapsed();
        debug!(elapsed = ?self.stats.postprocess_time, "postprocessing completed");

        if let Some(dir) = self.settings.debug_dir.clone() {
            let mut out = Vec::new();
            policy.dump(&mut out, self.domain.horizon())?;
            fs::write(dir.join("policy.crg"), out)?;
        }

        Ok(policy)
    }

    /// Creates the reward functions, assigns them to owner agents and builds
    /// one CRG per agent from the factored initial state.
    #[allow(clippy::type_complexity)]
    fn preprocess(
        &mut self,
        deadline: &Deadline,
    ) -> Result<
        (
            BTreeMap<AgentId, Crg<D::StateData, D::Action>>,
            crate::solver::joint::JointState<D::StateData>,
        ),
        SolverError,
    > {
        let rewards = self.domain.create_rewards();
        debug!(count = rewards.len(), "created domain reward functions");

        let assignment = self
            .domain
            .assign_rewards(&rewards, self.settings.assign_heuristic);
        for (agent, set) in &assignment {
            debug!(agent = %agent, rewards = set.len(), "assigned rewards");
        }

        let initial = self
            .domain
            .factor_state(&self.domain.initial_state());

        let mut crgs = BTreeMap::new();
        for (agent, set) in assignment {
            let local = initial.local(agent)?.as_ref().clone();
            let mut crg = Crg::new(set);
            crg.construct(
                self.domain,
                self.settings.local_cri,
                deadline,
                self.stats.for_crg(agent),
                local,
                &rewards,
            )?;
            debug!(agent = %agent, "CRG constructed");

            if let Some(dir) = self.settings.debug_dir.clone() {
                let mut out = Vec::new();
                crg.dump(&mut out, self.domain.horizon())?;
                fs::write(dir.join(format!("{agent}.crg")), out)?;
            }
            crgs.insert(agent, crg);
        }

        Ok((crgs, initial))
    }
}
