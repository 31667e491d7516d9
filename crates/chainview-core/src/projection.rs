//! Stateless view projections over a resolved chain
//!
//! Everything here is computed on read from a [`ChainNode`] tree and never
//! stored: linear root-to-target paths, breadcrumb collapsing, highlight
//! classification for a selection, and the tree-vs-linear render decision.

use std::collections::HashMap;

use crate::types::{ChainNode, HighlightRole, SessionId, SessionMeta};

/// One step on a linear root-to-target path
#[derive(Debug, Clone, PartialEq)]
pub struct PathStep {
    pub session: SessionMeta,
    pub is_branch_point: bool,
}

/// Ordered root-to-target path plus the branch points crossed on the way
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LinearPath {
    pub steps: Vec<PathStep>,
    pub branch_points: Vec<SessionId>,
}

/// Breadcrumb segment after collapsing a long path
#[derive(Debug, Clone, PartialEq)]
pub enum BreadcrumbSegment {
    Node {
        session_id: SessionId,
        is_branch_point: bool,
    },
    /// Stand-in for `hidden` collapsed middle nodes
    Collapsed { hidden: usize },
}

/// Index every node of the tree and its parent, iteratively.
///
/// Returns `(nodes, parents)` keyed by session id. Chains can be deep, so no
/// recursion here.
fn index_tree<'a>(
    root: &'a ChainNode,
) -> (
    HashMap<&'a str, &'a ChainNode>,
    HashMap<&'a str, &'a str>,
) {
    let mut nodes: HashMap<&str, &ChainNode> = HashMap::new();
    let mut parents: HashMap<&str, &str> = HashMap::new();
    let mut stack: Vec<&ChainNode> = vec![root];

    while let Some(node) = stack.pop() {
        nodes.insert(node.session_id(), node);
        for child in &node.children {
            parents.insert(child.session_id(), node.session_id());
            stack.push(child);
        }
    }

    (nodes, parents)
}

/// Compute the ordered path from the tree root to `target_id`.
///
/// Returns `None` when the target is not part of the tree.
pub fn linear_path(root: &ChainNode, target_id: &str) -> Option<LinearPath> {
    let (nodes, parents) = index_tree(root);
    nodes.get(target_id)?;

    let mut ids: Vec<&str> = Vec::new();
    let mut current = target_id;
    loop {
        ids.push(current);
        match parents.get(current) {
            Some(parent) => current = parent,
            None => break,
        }
    }
    ids.reverse();

    let mut path = LinearPath::default();
    for id in ids {
        let node = nodes[id];
        if node.is_branch_point {
            path.branch_points.push(node.session.session_id.clone());
        }
        path.steps.push(PathStep {
            session: node.session.clone(),
            is_branch_point: node.is_branch_point,
        });
    }
    Some(path)
}

/// Collapse a linear path to a breadcrumb that fits `visible_budget` segments.
///
/// A path that fits the budget is returned whole. Otherwise the root,
/// immediate parent, and target stay visible and the middle collapses into a
/// single marker carrying the hidden count.
pub fn collapse_path(path: &LinearPath, visible_budget: usize) -> Vec<BreadcrumbSegment> {
    let steps = &path.steps;
    let as_node = |step: &PathStep| BreadcrumbSegment::Node {
        session_id: step.session.session_id.clone(),
        is_branch_point: step.is_branch_point,
    };

    if steps.len() <= visible_budget || steps.len() <= 3 {
        return steps.iter().map(as_node).collect();
    }

    let mut segments = Vec::with_capacity(4);
    segments.push(as_node(&steps[0]));
    segments.push(BreadcrumbSegment::Collapsed {
        hidden: steps.len() - 3,
    });
    segments.push(as_node(&steps[steps.len() - 2]));
    segments.push(as_node(&steps[steps.len() - 1]));
    segments
}

/// Classify `candidate_id` relative to `selected_id` within one tree.
///
/// Sessions outside the tree, and selections outside the tree, are `None`.
pub fn highlight_role(root: &ChainNode, selected_id: &str, candidate_id: &str) -> HighlightRole {
    let (nodes, parents) = index_tree(root);
    if !nodes.contains_key(selected_id) || !nodes.contains_key(candidate_id) {
        return HighlightRole::None;
    }
    if selected_id == candidate_id {
        return HighlightRole::Clicked;
    }

    // Ancestor: candidate appears on the selected node's parent chain
    let mut current = selected_id;
    while let Some(parent) = parents.get(current) {
        if *parent == candidate_id {
            return HighlightRole::Ancestor;
        }
        current = parent;
    }

    // Descendant: selected appears on the candidate's parent chain
    let mut current = candidate_id;
    while let Some(parent) = parents.get(current) {
        if *parent == selected_id {
            return HighlightRole::Descendant;
        }
        current = parent;
    }

    if parents.get(selected_id) == parents.get(candidate_id) && parents.contains_key(selected_id) {
        return HighlightRole::Sibling;
    }

    HighlightRole::None
}

/// Render decision: a subtree renders as a branching tree iff any node in it
/// is a branch point, otherwise as a flat chronological list.
pub fn has_branching(root: &ChainNode) -> bool {
    let mut stack: Vec<&ChainNode> = vec![root];
    while let Some(node) = stack.pop() {
        if node.is_branch_point {
            return true;
        }
        stack.extend(node.children.iter());
    }
    false
}

/// Depth-first flattened list of the tree, children in chronological order
pub fn flatten(root: &ChainNode) -> Vec<&ChainNode> {
    let mut out = Vec::new();
    let mut stack: Vec<&ChainNode> = vec![root];
    while let Some(node) = stack.pop() {
        out.push(node);
        // Reversed so the first child is visited first
        for child in node.children.iter().rev() {
            stack.push(child);
        }
    }
    out
}
