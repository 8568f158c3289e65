//! Per-state bookkeeping inside a CRG.

use crate::error::SolverError;
use crate::model::bound::ValueBound;

use super::transition::CrgTransition;

/// Cached characteristics of a single CRG state: terminality, local
/// independence, the expected-return bound and the outgoing transitions.
///
/// Bounds and transitions are written exactly once during construction.
#[derive(Debug, Clone)]
pub struct CrgStateInfo<P, A> {
    terminal: bool,
    independent: bool,
    bounds: Option<ValueBound>,
    transitions: Vec<CrgTransition<P, A>>,
}

impl<P, A: PartialEq> CrgStateInfo<P, A> {
    pub(crate) fn new(terminal: bool, independent: bool) -> Self {
        Self {
            terminal,
            independent,
            bounds: None,
            transitions: Vec::new(),
        }
    }

    /// True iff the state is terminal.
    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    /// True iff the state was completed as locally reward independent.
    pub fn is_independent(&self) -> bool {
        self.independent
    }

    /// The expected-return bound of the state.
    pub fn bounds(&self) -> Result<&ValueBound, SolverError> {
        self.bounds
            .as_ref()
            .ok_or_else(|| SolverError::CacheViolation("no bounds set for state".into()))
    }

    /// Sets the return bound; may only be called once per state.
    pub(crate) fn set_bounds(&mut self, bounds: ValueBound) -> Result<(), SolverError> {
        if self.bounds.is_some() {
            return Err(SolverError::CacheViolation(
                "bounds for the state already set".into(),
            ));
        }
        self.bounds = Some(bounds);
        Ok(())
    }

    /// The outgoing transitions of the state.
    pub fn transitions(&self) -> &[CrgTransition<P, A>] {
        &self.transitions
    }

    pub(crate) fn add_transition(&mut self, transition: CrgTransition<P, A>)
    where
        P: PartialEq,
    {
        debug_assert!(
            !self.transitions.iter().any(|t| t.same_step(&transition)),
            "transition already added for state"
        );
        self.transitions.push(transition);
    }

    pub(crate) fn set_transitions(&mut self, transitions: Vec<CrgTransition<P, A>>) {
        debug_assert!(
            self.transitions.is_empty(),
            "transitions already set for the state"
        );
        self.transitions = transitions;
    }
}
