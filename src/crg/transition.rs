//! Annotated local transitions.

use std::fmt;
use std::rc::Rc;

use crate::factored::FactoredOthers;
use crate::model::agent::AgentId;
use crate::model::value::StateValue;

use super::state::{CrgState, Influence};

/// A local transition annotated with the dependency and influence context it
/// is valid under.
///
/// `deps` holds, per other scope agent, either a specific dependent action or
/// a complement marker ("any action outside the dependent set"); `influences`
/// is the analogous collection over state-influence tokens. Together they
/// pin down exactly one reward and probability for the transition in any
/// coherent joint context.
#[derive(Debug, Clone)]
pub struct CrgTransition<P, A> {
    from: Rc<CrgState<P>>,
    action: A,
    to: Rc<CrgState<P>>,
    deps: FactoredOthers<A>,
    influences: FactoredOthers<Influence<P>>,
    pub(crate) value: StateValue,
    pub(crate) probability: f64,
}

impl<P, A: PartialEq> CrgTransition<P, A> {
    /// Creates a transition with the given annotations. Reward and
    /// probability are filled in by the CRG builder.
    pub(crate) fn new(
        from: Rc<CrgState<P>>,
        action: A,
        to: Rc<CrgState<P>>,
        deps: FactoredOthers<A>,
        influences: FactoredOthers<Influence<P>>,
    ) -> Self {
        Self {
            from,
            action,
            to,
            deps,
            influences,
            value: StateValue::zeros(0),
            probability: 1.0,
        }
    }

    /// The local start state.
    pub fn from(&self) -> &Rc<CrgState<P>> {
        &self.from
    }

    /// The local action taken.
    pub fn action(&self) -> &A {
        &self.action
    }

    /// The local result state.
    pub fn to(&self) -> &Rc<CrgState<P>> {
        &self.to
    }

    /// The agent performing this transition.
    pub fn agent(&self) -> AgentId {
        self.from.agent()
    }

    /// The dependent actions of other agents this transition is valid under.
    pub fn deps(&self) -> &FactoredOthers<A> {
        &self.deps
    }

    /// The state influences of other agents this transition is valid under.
    pub fn influences(&self) -> &FactoredOthers<Influence<P>> {
        &self.influences
    }

    /// The cached transition reward.
    pub fn value(&self) -> &StateValue {
        &self.value
    }

    /// The local transition probability, valid under any matching context.
    pub fn probability(&self) -> f64 {
        self.probability
    }

    /// Tests whether this transition describes the same annotated step as
    /// `other` (reward and probability excluded).
    pub fn same_step(&self, other: &Self) -> bool
    where
        P: PartialEq,
    {
        self.from == other.from
            && self.action == other.action
            && self.to == other.to
            && self.deps == other.deps
            && self.influences == other.influences
    }
}

impl<P: fmt::Debug, A: fmt::Debug> fmt::Display for CrgTransition<P, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "T({}, {:?}, {}) A={:?} p={:.3} V={}",
            self.from, self.action, self.to, self.deps, self.probability, self.value
        )
    }
}
