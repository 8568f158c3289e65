//! Local agent states and state influences.

use std::fmt;
use std::rc::Rc;

use crate::model::agent::AgentId;

/// A local state of a single agent at a given time.
///
/// The payload `P` is defined by the domain and is part of state equality;
/// states of distinct agents are never equal. States are shared via `Rc`
/// throughout the solver: transitions advance time strictly, so the state
/// graph is a DAG and reference counting cannot form cycles.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CrgState<P> {
    agent: AgentId,
    time: u32,
    data: P,
}

impl<P> CrgState<P> {
    /// Creates a new local state.
    pub fn new(agent: AgentId, time: u32, data: P) -> Self {
        Self { agent, time, data }
    }

    /// The agent this state belongs to.
    pub fn agent(&self) -> AgentId {
        self.agent
    }

    /// The time of this state.
    pub fn time(&self) -> u32 {
        self.time
    }

    /// The domain payload.
    pub fn data(&self) -> &P {
        &self.data
    }
}

impl<P: fmt::Debug> fmt::Display for CrgState<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S_{}_{}:{:?}", self.agent, self.time, self.data)
    }
}

/// A state influence token of another agent: the pair of its local states
/// before and after one time step.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Influence<P> {
    from: Rc<CrgState<P>>,
    to: Rc<CrgState<P>>,
}

impl<P> Influence<P> {
    /// Creates a new influence token.
    ///
    /// Both states must belong to the same agent and be one time step apart.
    pub fn new(from: Rc<CrgState<P>>, to: Rc<CrgState<P>>) -> Self {
        debug_assert_eq!(from.agent(), to.agent(), "influence states of different agents");
        debug_assert_eq!(from.time() + 1, to.time(), "influence states not sequential");
        Self { from, to }
    }

    /// The agent this influence belongs to.
    pub fn agent(&self) -> AgentId {
        self.from.agent()
    }

    /// The state before the step.
    pub fn from(&self) -> &Rc<CrgState<P>> {
        &self.from
    }

    /// The state after the step.
    pub fn to(&self) -> &Rc<CrgState<P>> {
        &self.to
    }
}
