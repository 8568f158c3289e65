//! Agent identifiers.

use std::fmt;

/// Identifies a decision-making agent.
///
/// IDs must be numbered densely from `0` to `N - 1`; the solver relies on
/// them for indexing and for a stable enumeration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AgentId(pub usize);

impl AgentId {
    /// Returns the dense index of this agent.
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "A{}", self.0)
    }
}
