//! Forest construction over a story's flat contribution set.
//!
//! Nodes live in an arena indexed by position; parent and child links are
//! arena indices, so the forest carries no ownership cycles. Arena order is
//! ascending contribution id, which makes the output independent of the
//! order the records arrived in.

use crate::database::models::{Contribution, ContributionId};
use crate::error::{CoreError, CoreResult, Entity};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContributionNode {
    pub contribution: Contribution,
    /// Arena index of the parent; `None` for roots, including orphans.
    pub parent: Option<usize>,
    /// Arena indices, ordered by `(created_at, id)`.
    pub children: Vec<usize>,
    pub level: u32,
    /// Dot-joined ids from the root down to this node.
    pub path: String,
    /// Declared a parent that is not in the input set.
    pub orphaned: bool,
}

impl ContributionNode {
    pub fn id(&self) -> ContributionId {
        self.contribution.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Forest {
    nodes: Vec<ContributionNode>,
    index: HashMap<ContributionId, usize>,
    roots: Vec<usize>,
}

/// Nested, serialisable rendition of a subtree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributionTreeView {
    #[serde(flatten)]
    pub contribution: Contribution,
    pub level: u32,
    pub path: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub orphaned: bool,
    pub children: Vec<ContributionTreeView>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    Visiting,
    Done,
}

pub struct ContributionTreeBuilder;

impl ContributionTreeBuilder {
    /// Builds the forest for `contributions`.
    ///
    /// Fails with `DuplicateId` when two records share an id and with
    /// `CyclicContributionGraph` when a record is its own ancestor; no
    /// partial forest is returned in either case. A record whose parent is
    /// absent from the set becomes a root.
    pub fn build<I>(contributions: I) -> CoreResult<Forest>
    where
        I: IntoIterator<Item = Contribution>,
    {
        let mut records: Vec<Contribution> = contributions.into_iter().collect();
        records.sort_unstable_by_key(|record| record.id);

        let mut index = HashMap::with_capacity(records.len());
        for (position, record) in records.iter().enumerate() {
            if index.insert(record.id, position).is_some() {
                return Err(CoreError::DuplicateId {
                    entity: Entity::Contribution,
                    id: record.id,
                });
            }
        }

        let mut orphans = 0usize;
        let parents: Vec<Option<usize>> = records
            .iter()
            .map(|record| {
                if record.is_root() {
                    return None;
                }
                let parent = index.get(&record.parent_id).copied();
                if parent.is_none() {
                    orphans += 1;
                }
                parent
            })
            .collect();

        detect_cycle(&records, &parents)?;

        let mut nodes: Vec<ContributionNode> = records
            .into_iter()
            .zip(parents.iter())
            .map(|(contribution, parent)| ContributionNode {
                orphaned: parent.is_none() && !contribution.is_root(),
                contribution,
                parent: *parent,
                children: Vec::new(),
                level: 0,
                path: String::new(),
            })
            .collect();

        let mut roots = Vec::new();
        for (position, parent) in parents.iter().enumerate() {
            match parent {
                Some(parent) => nodes[*parent].children.push(position),
                None => roots.push(position),
            }
        }

        roots.sort_by_key(|&position| nodes[position].contribution.sibling_key());
        for position in 0..nodes.len() {
            let mut children = std::mem::take(&mut nodes[position].children);
            children.sort_by_key(|&child| nodes[child].contribution.sibling_key());
            nodes[position].children = children;
        }

        let mut stack: Vec<usize> = roots.iter().rev().copied().collect();
        while let Some(position) = stack.pop() {
            let (level, path) = match nodes[position].parent {
                Some(parent) => (
                    nodes[parent].level + 1,
                    format!("{}.{}", nodes[parent].path, nodes[position].id()),
                ),
                None => (0, nodes[position].id().to_string()),
            };
            nodes[position].level = level;
            nodes[position].path = path;
            stack.extend(nodes[position].children.iter().rev().copied());
        }

        tracing::debug!(
            nodes = nodes.len(),
            roots = roots.len(),
            orphans,
            "built contribution forest"
        );

        Ok(Forest {
            nodes,
            index,
            roots,
        })
    }
}

/// Walks every ancestry chain once; a chain that re-enters itself is a cycle.
fn detect_cycle(records: &[Contribution], parents: &[Option<usize>]) -> CoreResult<()> {
    let mut marks = vec![Mark::Unvisited; records.len()];
    let mut trail = Vec::new();
    for start in 0..records.len() {
        let mut cursor = Some(start);
        while let Some(position) = cursor {
            match marks[position] {
                Mark::Done => break,
                Mark::Visiting => {
                    return Err(CoreError::CyclicContributionGraph {
                        id: records[position].id,
                    })
                }
                Mark::Unvisited => {
                    marks[position] = Mark::Visiting;
                    trail.push(position);
                    cursor = parents[position];
                }
            }
        }
        for position in trail.drain(..) {
            marks[position] = Mark::Done;
        }
    }
    Ok(())
}

impl Forest {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn roots(&self) -> impl Iterator<Item = &ContributionNode> + '_ {
        self.roots.iter().map(|&position| &self.nodes[position])
    }

    pub fn get(&self, id: ContributionId) -> Option<&ContributionNode> {
        self.index.get(&id).map(|&position| &self.nodes[position])
    }

    pub fn children<'a>(
        &'a self,
        node: &'a ContributionNode,
    ) -> impl Iterator<Item = &'a ContributionNode> + 'a {
        node.children.iter().map(|&position| &self.nodes[position])
    }

    pub fn children_of(&self, id: ContributionId) -> CoreResult<Vec<&ContributionNode>> {
        let node = self
            .get(id)
            .ok_or_else(|| CoreError::contribution_not_found(id))?;
        Ok(self.children(node).collect())
    }

    /// Ids from the root down to `id`, inclusive.
    pub fn ancestors(&self, id: ContributionId) -> CoreResult<Vec<ContributionId>> {
        let mut position = *self
            .index
            .get(&id)
            .ok_or_else(|| CoreError::contribution_not_found(id))?;
        let mut chain = vec![self.nodes[position].id()];
        while let Some(parent) = self.nodes[position].parent {
            chain.push(self.nodes[parent].id());
            position = parent;
        }
        chain.reverse();
        Ok(chain)
    }

    /// Number of nodes strictly below `id`.
    pub fn descendants_count(&self, id: ContributionId) -> CoreResult<usize> {
        let start = *self
            .index
            .get(&id)
            .ok_or_else(|| CoreError::contribution_not_found(id))?;
        let mut stack = self.nodes[start].children.clone();
        let mut count = 0;
        while let Some(position) = stack.pop() {
            count += 1;
            stack.extend_from_slice(&self.nodes[position].children);
        }
        Ok(count)
    }

    pub fn branches(&self) -> impl Iterator<Item = &ContributionNode> + '_ {
        self.iter().filter(|node| node.contribution.is_branch)
    }

    /// Depth-first pre-order over every tree, roots in sibling order.
    pub fn iter(&self) -> impl Iterator<Item = &ContributionNode> + '_ {
        self.preorder().into_iter().map(|position| &self.nodes[position])
    }

    pub fn to_view(&self) -> Vec<ContributionTreeView> {
        let order = self.preorder();
        let mut built: Vec<Option<ContributionTreeView>> = vec![None; self.nodes.len()];
        // reverse pre-order finishes every child before its parent
        for &position in order.iter().rev() {
            let node = &self.nodes[position];
            let children = node
                .children
                .iter()
                .filter_map(|&child| built[child].take())
                .collect();
            built[position] = Some(ContributionTreeView {
                contribution: node.contribution.clone(),
                level: node.level,
                path: node.path.clone(),
                orphaned: node.orphaned,
                children,
            });
        }
        self.roots
            .iter()
            .filter_map(|&root| built[root].take())
            .collect()
    }

    fn preorder(&self) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<usize> = self.roots.iter().rev().copied().collect();
        while let Some(position) = stack.pop() {
            order.push(position);
            stack.extend(self.nodes[position].children.iter().rev().copied());
        }
        order
    }
}
