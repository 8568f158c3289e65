//! Reward assignment heuristics.

use std::collections::BTreeMap;
use std::rc::Rc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::domain::CrgReward;
use crate::model::agent::AgentId;

use super::rewards::RewardSet;

/// Policy for mapping each reward function to exactly one owner agent.
///
/// The assignment is purely a performance lever; the solved policy value is
/// invariant under any choice. Single-agent rewards always go to their
/// unique scope member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignHeuristic {
    /// Owner with the fewest currently-assigned rewards within the scope.
    Balanced,
    /// Owner with the minimum total scope-degree across all rewards.
    LowestDegree,
    /// Owner with the maximum total scope-degree across all rewards.
    HighestDegree,
    /// Owner drawn uniformly from the scope with a seeded generator.
    Random { seed: u64 },
}

/// Assigns every reward to one owner agent according to the heuristic.
pub fn assign_rewards<P, A>(
    heuristic: AssignHeuristic,
    agents: &[AgentId],
    rewards: &[Rc<dyn CrgReward<P, A>>],
) -> BTreeMap<AgentId, RewardSet<P, A>> {
    let mut map: BTreeMap<AgentId, RewardSet<P, A>> = agents
        .iter()
        .map(|&a| (a, RewardSet::new(a)))
        .collect();

    match heuristic {
        AssignHeuristic::Balanced => {
            for reward in rewards {
                let owner = first_min(reward.scope(), |a| map[&a].len());
                assign_to(&mut map, owner, reward);
            }
        }
        AssignHeuristic::LowestDegree | AssignHeuristic::HighestDegree => {
            let mut degree: BTreeMap<AgentId, usize> =
                agents.iter().map(|&a| (a, 0)).collect();
            for reward in rewards {
                for agent in reward.scope() {
                    *degree.entry(*agent).or_insert(0) += 1;
                }
            }
            for reward in rewards {
                let owner = if heuristic == AssignHeuristic::LowestDegree {
                    first_min(reward.scope(), |a| degree[&a])
                } else {
                    first_min(reward.scope(), |a| usize::MAX - degree[&a])
                };
                assign_to(&mut map, owner, reward);
            }
        }
        AssignHeuristic::Random { seed } => {
            let mut rng = StdRng::seed_from_u64(seed);
            for reward in rewards {
                let scope = reward.scope();
                let owner = if scope.len() == 1 {
                    scope[0]
                } else {
                    scope[rng.gen_range(0..scope.len())]
                };
                assign_to(&mut map, owner, reward);
            }
        }
    }

    map
}

/// The first scope agent attaining the minimum key; ties go to the earliest
/// agent in the fixed scope order.
fn first_min(scope: &[AgentId], key: impl Fn(AgentId) -> usize) -> AgentId {
    let mut best = scope[0];
    let mut best_key = key(best);
    for &agent in &scope[1..] {
        let k = key(agent);
        if k < best_key {
            best = agent;
            best_key = k;
        }
    }
    best
}

fn assign_to<P, A>(
    map: &mut BTreeMap<AgentId, RewardSet<P, A>>,
    owner: AgentId,
    reward: &Rc<dyn CrgReward<P, A>>,
) {
    map.get_mut(&owner)
        .expect("reward scope agent not part of the instance")
        .add(reward.clone());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crg::state::CrgState;
    use crate::crg::transition::CrgTransition;
    use crate::model::value::StateValue;
    use crate::solver::joint::JointState;

    struct StubReward {
        scope: Vec<AgentId>,
    }

    impl CrgReward<(), u32> for StubReward {
        fn scope(&self) -> &[AgentId] {
            &self.scope
        }

        fn reward(&self, _transition: &CrgTransition<(), u32>) -> StateValue {
            StateValue::zeros(1)
        }

        fn local_cri(&self, _state: &CrgState<()>) -> bool {
            true
        }

        fn cri(&self, _a1: AgentId, _a2: AgentId, _state: &JointState<()>) -> bool {
            true
        }
    }

    fn reward(scope: &[usize]) -> Rc<dyn CrgReward<(), u32>> {
        Rc::new(StubReward {
            scope: scope.iter().map(|&i| AgentId(i)).collect(),
        })
    }

    fn agents(n: usize) -> Vec<AgentId> {
        (0..n).map(AgentId).collect()
    }

    #[test]
    fn single_agent_rewards_go_to_their_scope_member() {
        let rewards = vec![reward(&[0]), reward(&[1])];
        for heuristic in [
            AssignHeuristic::Balanced,
            AssignHeuristic::LowestDegree,
            AssignHeuristic::HighestDegree,
            AssignHeuristic::Random { seed: 7 },
        ] {
            let map = assign_rewards(heuristic, &agents(2), &rewards);
            assert_eq!(map[&AgentId(0)].len(), 1);
            assert_eq!(map[&AgentId(1)].len(), 1);
        }
    }

    #[test]
    fn balanced_spreads_shared_rewards() {
        // two shared rewards over the same pair: balanced gives one each
        let rewards = vec![reward(&[0, 1]), reward(&[0, 1])];
        let map = assign_rewards(AssignHeuristic::Balanced, &agents(2), &rewards);
        assert_eq!(map[&AgentId(0)].len(), 1);
        assert_eq!(map[&AgentId(1)].len(), 1);
    }

    #[test]
    fn degree_heuristics_pick_extremes() {
        // agent 1 participates in two rewards, agent 0 and 2 in one each
        let rewards = vec![reward(&[0, 1]), reward(&[1, 2])];
        let low = assign_rewards(AssignHeuristic::LowestDegree, &agents(3), &rewards);
        assert_eq!(low[&AgentId(0)].len(), 1);
        assert_eq!(low[&AgentId(2)].len(), 1);
        assert_eq!(low[&AgentId(1)].len(), 0);

        let high = assign_rewards(AssignHeuristic::HighestDegree, &agents(3), &rewards);
        assert_eq!(high[&AgentId(1)].len(), 2);
    }

    #[test]
    fn random_is_deterministic_under_a_seed() {
        let rewards = vec![reward(&[0, 1]), reward(&[1, 2]), reward(&[0, 2])];
        let a = assign_rewards(AssignHeuristic::Random { seed: 42 }, &agents(3), &rewards);
        let b = assign_rewards(AssignHeuristic::Random { seed: 42 }, &agents(3), &rewards);
        for agent in agents(3) {
            assert_eq!(a[&agent].len(), b[&agent].len());
        }
    }

    #[test]
    fn scope_is_the_union_of_assigned_reward_scopes() {
        let rewards = vec![reward(&[0]), reward(&[0, 1])];
        let map = assign_rewards(AssignHeuristic::HighestDegree, &agents(2), &rewards);
        let owner = if map[&AgentId(0)].len() == 2 {
            AgentId(0)
        } else {
            AgentId(1)
        };
        assert!(map[&owner].scope().contains(&AgentId(0)));
        assert!(map[&owner].scope().contains(&AgentId(1)));
    }
}
