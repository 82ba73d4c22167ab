use crate::tree::Forest;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TreeMetrics {
    pub total_contributions: usize,
    /// Top-level nodes, orphan-promoted roots included.
    pub root_contributions: usize,
    pub branch_count: usize,
    pub max_depth: u32,
}

impl TreeMetrics {
    pub fn from_forest(forest: &Forest) -> Self {
        let mut metrics = TreeMetrics::default();
        for node in forest.iter() {
            metrics.total_contributions += 1;
            if node.level == 0 {
                metrics.root_contributions += 1;
            }
            if node.contribution.is_branch {
                metrics.branch_count += 1;
            }
            metrics.max_depth = metrics.max_depth.max(node.level);
        }
        metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::tests::{acyclic_input, contribution};
    use crate::tree::{ContributionNode, ContributionTreeBuilder};
    use proptest::prelude::*;

    #[test]
    fn empty_forest_has_zero_metrics() {
        let forest = ContributionTreeBuilder::build(Vec::new()).unwrap();
        assert_eq!(TreeMetrics::from_forest(&forest), TreeMetrics::default());
    }

    #[test]
    fn counts_roots_orphans_and_branches() {
        let mut branch = contribution(3, 1, 2);
        branch.is_branch = true;
        let forest = ContributionTreeBuilder::build(vec![
            contribution(1, 0, 0),
            contribution(2, 1, 1),
            branch,
            contribution(4, 3, 3),
            contribution(10, 77, 4),
        ])
        .unwrap();

        let metrics = TreeMetrics::from_forest(&forest);
        assert_eq!(
            metrics,
            TreeMetrics {
                total_contributions: 5,
                root_contributions: 2,
                branch_count: 1,
                max_depth: 2,
            }
        );
    }

    fn reachable(forest: &Forest) -> Vec<&ContributionNode> {
        let mut seen = Vec::new();
        let mut stack: Vec<&ContributionNode> = forest.roots().collect();
        while let Some(node) = stack.pop() {
            seen.push(node);
            stack.extend(forest.children(node));
        }
        seen
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]

        #[test]
        fn metrics_match_direct_traversal(records in acyclic_input()) {
            let input_len = records.len();
            let forest = ContributionTreeBuilder::build(records)
                .unwrap_or_else(|e| panic!("build failed: {e}"));
            let metrics = TreeMetrics::from_forest(&forest);
            let nodes = reachable(&forest);

            prop_assert_eq!(metrics.total_contributions, nodes.len());
            prop_assert_eq!(metrics.total_contributions, input_len);
            prop_assert_eq!(metrics.root_contributions, forest.roots().count());
            prop_assert_eq!(
                metrics.max_depth,
                nodes.iter().map(|node| node.level).max().unwrap_or(0)
            );
            prop_assert_eq!(
                metrics.branch_count,
                nodes.iter().filter(|node| node.contribution.is_branch).count()
            );
        }
    }
}
