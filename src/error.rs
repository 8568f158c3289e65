//! Solver failure kinds.

use thiserror::Error;

/// Errors raised by the CoRe solver.
///
/// Nothing is retried automatically: the search is deterministic and a failed
/// solve is fatal for that invocation. `Timeout` is a dedicated kind so that
/// callers can distinguish an exhausted budget from a bug.
#[derive(Debug, Error)]
pub enum SolverError {
    /// The cooperative runtime budget was exceeded.
    #[error("solver timed out")]
    Timeout,

    /// The domain adapter violated its contract (non-normalized
    /// probabilities, actions on a terminal state, unmatched CRG transition).
    #[error("adapter violation: {0}")]
    AdapterViolation(String),

    /// A realized joint action led into a state the domain reports as
    /// impossible to complete.
    #[error("infeasible state: {0}")]
    InfeasibleState(String),

    /// A write-once cache invariant was breached; indicates a programming
    /// error in the solver or the adapter.
    #[error("cache violation: {0}")]
    CacheViolation(String),

    /// A policy was queried with a state outside its reachable set.
    #[error("no optimal action for state")]
    NoOptimalAction,

    /// Writing debug output failed.
    #[error("debug output failed: {0}")]
    DebugOutput(#[from] std::io::Error),
}
