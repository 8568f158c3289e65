//! Solver configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::crg::heuristic::AssignHeuristic;

/// Configuration of the CoRe solver.
///
/// All switches are purely about performance and reporting; the solved policy
/// value is invariant under any combination of `bb_pruning`, `bb_tightening`,
/// `local_cri`, `decouple_cri` and `assign_heuristic`.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Prune joint actions whose upper bound falls below the best known
    /// lower bound before evaluating them.
    pub bb_pruning: bool,

    /// Re-prune remaining joint actions with the running best value during
    /// the evaluation loop. Implies `bb_pruning`.
    pub bb_tightening: bool,

    /// Complete a CRG with a single-agent optimal continuation as soon as a
    /// state becomes locally reward independent.
    pub local_cri: bool,

    /// Decouple the search into independent connected components of the
    /// coordination graph.
    pub decouple_cri: bool,

    /// Emit a text progress bar over the top-level joint-action iteration.
    pub show_progress: bool,

    /// The reward assignment heuristic.
    pub assign_heuristic: AssignHeuristic,

    /// Cooperative timeout budget; `None` means unbounded.
    pub max_runtime: Option<Duration>,

    /// If set, one human-readable dump per CRG and one for the final policy
    /// are written into this directory.
    pub debug_dir: Option<PathBuf>,
}

impl Settings {
    /// True iff outer branch-and-bound pruning is active (tightening implies
    /// pruning).
    pub fn pruning_enabled(&self) -> bool {
        self.bb_pruning || self.bb_tightening
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bb_pruning: true,
            bb_tightening: true,
            local_cri: true,
            decouple_cri: true,
            show_progress: false,
            assign_heuristic: AssignHeuristic::HighestDegree,
            max_runtime: None,
            debug_dir: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tightening_implies_pruning() {
        let settings = Settings {
            bb_pruning: false,
            bb_tightening: true,
            ..Settings::default()
        };
        assert!(settings.pruning_enabled());
    }

    #[test]
    fn defaults_enable_all_optimizations() {
        let settings = Settings::default();
        assert!(settings.bb_pruning && settings.bb_tightening);
        assert!(settings.local_cri && settings.decouple_cri);
        assert!(!settings.show_progress);
        assert!(settings.max_runtime.is_none());
    }
}
