//! Coordination graph driving CRI decoupling.

use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableGraph};
use petgraph::Undirected;
use tracing::debug;

use crate::domain::CrgReward;
use crate::model::agent::AgentId;

use super::joint::JointState;

struct RewardEdge<P, A> {
    reward: Rc<dyn CrgReward<P, A>>,
    cri: bool,
}

/// Graph of agents connected by not-yet-CRI shared reward functions.
///
/// For every reward of scope two or more there is one edge per ordered pair
/// of scope agents, carrying a back-pointer to the reward. Edges flagged CRI
/// are ignored by the connected-components computation; flags are set during
/// the descent of the search and restored in strict stack discipline.
pub struct CoordGraph<P, A> {
    graph: StableGraph<AgentId, RewardEdge<P, A>, Undirected>,
    nodes: BTreeMap<AgentId, NodeIndex>,
    components: Vec<BTreeSet<AgentId>>,
}

impl<P, A> CoordGraph<P, A> {
    /// Builds the graph from all reward functions of the problem.
    pub fn new(rewards: &[Rc<dyn CrgReward<P, A>>]) -> Self {
        let mut graph = StableGraph::default();
        let mut nodes = BTreeMap::new();

        let agents: BTreeSet<AgentId> = rewards
            .iter()
            .flat_map(|r| r.scope().iter().copied())
            .collect();
        for &agent in &agents {
            nodes.insert(agent, graph.add_node(agent));
        }

        for reward in rewards {
            // local rewards never couple agents
            if reward.size() < 2 {
                continue;
            }
            let scope = reward.scope();
            for (i, &a) in scope.iter().enumerate() {
                for &b in &scope[i + 1..] {
                    graph.add_edge(
                        nodes[&a],
                        nodes[&b],
                        RewardEdge {
                            reward: reward.clone(),
                            cri: false,
                        },
                    );
                }
            }
        }

        let mut cg = Self {
            graph,
            nodes,
            components: Vec::new(),
        };
        cg.components = vec![agents];
        cg
    }

    /// Tests every not-yet-CRI edge whose endpoints are both in the state's
    /// scope and flags those whose reward reports the two agents CRI. Returns
    /// the newly flagged edges, for restoration.
    ///
    /// Components are recomputed when anything changed, or when `force` is
    /// set.
    pub fn update(&mut self, state: &JointState<P>, force: bool) -> Vec<EdgeIndex> {
        let mut flagged = Vec::new();
        let indices: Vec<EdgeIndex> = self.graph.edge_indices().collect();
        for index in indices {
            let (na, nb) = match self.graph.edge_endpoints(index) {
                Some(endpoints) => endpoints,
                None => continue,
            };
            let (a, b) = (self.graph[na], self.graph[nb]);
            let edge = &self.graph[index];
            if edge.cri || !state.contains(a) || !state.contains(b) {
                continue;
            }
            if edge.reward.cri(a, b, state) {
                self.graph[index].cri = true;
                flagged.push(index);
            }
        }

        if force || !flagged.is_empty() {
            self.recompute_components();
        }
        flagged
    }

    /// Unflags the supplied edges and reconnects the components.
    pub fn restore(&mut self, edges: &[EdgeIndex]) {
        for &index in edges {
            self.graph[index].cri = false;
        }
        self.recompute_components();
    }

    /// The connected components restricted to the state's agents, as partial
    /// joint states. Components containing agents outside the state are
    /// skipped.
    pub fn connected_components(&self, state: &JointState<P>) -> Vec<JointState<P>> {
        let mut states = Vec::new();
        for component in &self.components {
            let mut sub = JointState::new();
            let mut complete = true;
            for &agent in component {
                match state.get(agent) {
                    Some(local) => sub.insert(local.clone()),
                    None => {
                        complete = false;
                        break;
                    }
                }
            }
            if complete {
                states.push(sub);
            }
        }
        states
    }

    /// The current connected components of agents.
    pub fn components(&self) -> &[BTreeSet<AgentId>] {
        &self.components
    }

    /// The number of connected components.
    pub fn size(&self) -> usize {
        self.components.len()
    }

    /// Walks only not-yet-CRI edges.
    fn recompute_components(&mut self) {
        let mut components = Vec::new();
        let mut seen: BTreeSet<AgentId> = BTreeSet::new();

        for (&agent, &start) in &self.nodes {
            if seen.contains(&agent) {
                continue;
            }
            let mut component = BTreeSet::new();
            let mut next = vec![start];
            while let Some(node) = next.pop() {
                let a = self.graph[node];
                if !component.insert(a) {
                    continue;
                }
                seen.insert(a);
                let mut walker = self.graph.neighbors(node).detach();
                while let Some((edge, neighbor)) = walker.next(&self.graph) {
                    if !self.graph[edge].cri {
                        next.push(neighbor);
                    }
                }
            }
            components.push(component);
        }

        debug!(components = components.len(), "coordination graph updated");
        self.components = components;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crg::state::CrgState;
    use crate::crg::transition::CrgTransition;
    use crate::model::value::StateValue;
    use std::cell::Cell;

    /// A binary reward whose CRI answer is controlled by a flag.
    struct ToggleReward {
        scope: Vec<AgentId>,
        cri: Cell<bool>,
    }

    impl CrgReward<u8, u32> for ToggleReward {
        fn scope(&self) -> &[AgentId] {
            &self.scope
        }

        fn reward(&self, _t: &CrgTransition<u8, u32>) -> StateValue {
            StateValue::zeros(1)
        }

        fn local_cri(&self, _s: &CrgState<u8>) -> bool {
            self.cri.get()
        }

        fn cri(&self, _a1: AgentId, _a2: AgentId, _s: &JointState<u8>) -> bool {
            self.cri.get()
        }
    }

    fn joint(agents: &[usize]) -> JointState<u8> {
        JointState::from_locals(agents.iter().map(|&a| CrgState::new(AgentId(a), 0, 0u8)))
    }

    fn setup(cri: bool) -> (Rc<ToggleReward>, CoordGraph<u8, u32>) {
        let shared = Rc::new(ToggleReward {
            scope: vec![AgentId(0), AgentId(1)],
            cri: Cell::new(cri),
        });
        let rewards: Vec<Rc<dyn CrgReward<u8, u32>>> = vec![shared.clone()];
        let graph = CoordGraph::new(&rewards);
        (shared, graph)
    }

    #[test]
    fn starts_with_one_component() {
        let (_, graph) = setup(false);
        assert_eq!(graph.size(), 1);
    }

    #[test]
    fn update_splits_when_reward_is_cri() {
        let (_, mut graph) = setup(true);
        let flagged = graph.update(&joint(&[0, 1]), false);
        assert_eq!(flagged.len(), 1);
        assert_eq!(graph.size(), 2);
    }

    #[test]
    fn restore_reconnects() {
        let (_, mut graph) = setup(true);
        let flagged = graph.update(&joint(&[0, 1]), false);
        graph.restore(&flagged);
        assert_eq!(graph.size(), 1);
    }

    #[test]
    fn update_skips_agents_outside_the_state() {
        let (_, mut graph) = setup(true);
        let flagged = graph.update(&joint(&[0]), false);
        assert!(flagged.is_empty());
    }

    #[test]
    fn force_update_recomputes_components_without_new_cri() {
        let (_, mut graph) = setup(false);
        let flagged = graph.update(&joint(&[0, 1]), true);
        assert!(flagged.is_empty());
        assert_eq!(graph.size(), 1);
    }

    #[test]
    fn components_become_partial_joint_states() {
        let (_, mut graph) = setup(true);
        graph.update(&joint(&[0, 1]), false);
        let components = graph.connected_components(&joint(&[0, 1]));
        assert_eq!(components.len(), 2);
        assert!(components.iter().all(|c| c.len() == 1));
    }
}
