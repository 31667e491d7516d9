//! Pure chain resolution over an edge-list snapshot
//!
//! Resolution is deterministic for a fixed snapshot and never mutates shared
//! state: every pass produces a fresh tree. Traversal is iterative so a deep
//! chain cannot exhaust the stack, and a visited set turns cyclic data into a
//! warning instead of a hang.

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::warn;

use chainview_core::{ChainNode, ChainSnapshot, ChainStats, ContinuationEdge, SessionId};

/// Integrity conditions encountered while resolving; the offending edge is
/// dropped and the rest of the tree stays correct.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolveWarning {
    /// Edge would revisit an already-attached session
    CycleDropped {
        child_id: SessionId,
        parent_id: SessionId,
    },
    /// Edge references a child absent from the session index
    MissingSession { session_id: SessionId },
}

/// One resolution pass: the tree for a root plus its stats and warnings
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedChain {
    pub root_id: SessionId,
    pub tree: ChainNode,
    pub stats: ChainStats,
    pub warnings: Vec<ResolveWarning>,
}

/// Walk child-to-parent references up to the resolution root.
///
/// A session whose parent fails the existence check is itself a root (orphan
/// root); a cyclic parent reference stops the walk at the last sound node.
pub fn find_root(session_id: &str, snapshot: &ChainSnapshot) -> SessionId {
    let parent_of: HashMap<&str, &ContinuationEdge> = snapshot
        .edges
        .iter()
        .map(|e| (e.child_id.as_str(), e))
        .collect();

    let mut visited: HashSet<&str> = HashSet::new();
    let mut current = session_id;
    visited.insert(current);

    while let Some(edge) = parent_of.get(current) {
        let parent = edge.parent_id.as_str();
        if !snapshot.contains_session(parent) {
            break;
        }
        if !visited.insert(parent) {
            warn!(session_id, parent, "cyclic parent reference while finding root");
            break;
        }
        current = parent;
    }

    current.to_string()
}

/// Resolve the tree rooted at `root_id`.
///
/// Returns `None` when the root is not a known session (no continuation data
/// rather than an error). Runs in a single O(nodes + edges) pass; stats are
/// accumulated during the same traversal.
pub fn resolve_chain(root_id: &str, snapshot: &ChainSnapshot) -> Option<ResolvedChain> {
    snapshot.sessions.get(root_id)?;

    let mut children_edges: HashMap<&str, Vec<&ContinuationEdge>> = HashMap::new();
    for edge in &snapshot.edges {
        children_edges
            .entry(edge.parent_id.as_str())
            .or_default()
            .push(edge);
    }
    for group in children_edges.values_mut() {
        group.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.child_id.cmp(&b.child_id)));
    }

    let mut warnings: Vec<ResolveWarning> = Vec::new();
    let mut visited: HashSet<&str> = HashSet::new();
    let mut accepted_children: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut depth_of: HashMap<&str, usize> = HashMap::new();
    let mut visit_order: Vec<&str> = Vec::new();
    let mut max_depth = 0usize;

    visited.insert(root_id);
    let mut queue: VecDeque<(&str, usize)> = VecDeque::new();
    queue.push_back((root_id, 0));

    while let Some((id, depth)) = queue.pop_front() {
        visit_order.push(id);
        depth_of.insert(id, depth);
        max_depth = max_depth.max(depth);

        let Some(group) = children_edges.get(id) else {
            continue;
        };
        for edge in group {
            let child = edge.child_id.as_str();
            if visited.contains(child) {
                warnings.push(ResolveWarning::CycleDropped {
                    child_id: child.to_string(),
                    parent_id: id.to_string(),
                });
                warn!(child, parent = id, "dropping cycle-closing edge");
                continue;
            }
            if !snapshot.contains_session(child) {
                warnings.push(ResolveWarning::MissingSession {
                    session_id: child.to_string(),
                });
                continue;
            }
            visited.insert(child);
            accepted_children.entry(id).or_default().push(child);
            queue.push_back((child, depth + 1));
        }
    }

    // The root's own broken parent link is the only orphan condition a tree
    // can carry; descendants always have their parent in the tree.
    let is_orphan_root = snapshot
        .edge_for_child(root_id)
        .map(|e| e.is_orphaned || !snapshot.contains_session(&e.parent_id))
        .unwrap_or(false);

    // Build nodes bottom-up in reverse visit order so children exist before
    // their parent.
    let mut built: HashMap<&str, ChainNode> = HashMap::new();
    let mut branch_count = 0usize;
    for id in visit_order.iter().rev() {
        let children: Vec<ChainNode> = accepted_children
            .get(id)
            .map(|ids| ids.iter().filter_map(|c| built.remove(*c)).collect())
            .unwrap_or_default();
        let is_branch_point = children.len() > 1;
        if is_branch_point {
            branch_count += 1;
        }
        let session = snapshot.sessions.get(*id)?.clone();
        built.insert(
            *id,
            ChainNode {
                session,
                children,
                is_branch_point,
                is_orphan_root: false,
                depth: *depth_of.get(id).unwrap_or(&0),
            },
        );
    }

    let mut tree = built.remove(root_id)?;
    tree.is_orphan_root = is_orphan_root;

    let stats = ChainStats {
        total_count: visit_order.len(),
        branch_count,
        orphan_count: usize::from(is_orphan_root),
        max_depth,
    };

    Some(ResolvedChain {
        root_id: root_id.to_string(),
        tree,
        stats,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainview_core::SessionMeta;

    fn meta(id: &str) -> SessionMeta {
        SessionMeta {
            session_id: id.to_string(),
            file_path: format!("/tmp/{}.jsonl", id),
            mtime_ms: 0,
            file_size: 0,
            message_count: 1,
            first_timestamp: None,
            last_timestamp: None,
            indexed_at: "2024-05-01T00:00:00Z".to_string(),
        }
    }

    fn edge(child: &str, parent: &str, order: i64) -> ContinuationEdge {
        ContinuationEdge {
            child_id: child.to_string(),
            parent_id: parent.to_string(),
            order,
            split_reason: None,
            split_timestamp: None,
            child_started_at: Some(format!("2024-05-01T10:{:02}:00Z", order)),
            has_child_marker: true,
            has_parent_marker: false,
            is_orphaned: false,
            is_active_continuation: false,
        }
    }

    fn snapshot(ids: &[&str], edges: Vec<ContinuationEdge>) -> ChainSnapshot {
        ChainSnapshot {
            sessions: ids.iter().map(|id| (id.to_string(), meta(id))).collect(),
            edges,
        }
    }

    #[test]
    fn test_find_root_walks_to_top() {
        let snap = snapshot(&["a", "b", "c"], vec![edge("b", "a", 0), edge("c", "b", 0)]);
        assert_eq!(find_root("c", &snap), "a");
        assert_eq!(find_root("b", &snap), "a");
        assert_eq!(find_root("a", &snap), "a");
    }

    #[test]
    fn test_find_root_stops_at_missing_parent() {
        let snap = snapshot(&["b", "c"], vec![edge("b", "gone", 0), edge("c", "b", 0)]);
        assert_eq!(find_root("c", &snap), "b");
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let snap = snapshot(
            &["a", "b", "c", "d"],
            vec![edge("b", "a", 0), edge("c", "a", 1), edge("d", "b", 0)],
        );
        let first = resolve_chain("a", &snap).unwrap();
        let second = resolve_chain("a", &snap).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_branch_point_appears_with_second_child() {
        let one_child = snapshot(&["a", "b"], vec![edge("b", "a", 0)]);
        let resolved = resolve_chain("a", &one_child).unwrap();
        assert!(!resolved.tree.is_branch_point);
        assert_eq!(resolved.stats.branch_count, 0);

        let two_children = snapshot(
            &["a", "b", "c"],
            vec![edge("b", "a", 0), edge("c", "a", 1)],
        );
        let resolved = resolve_chain("a", &two_children).unwrap();
        assert!(resolved.tree.is_branch_point);
        assert_eq!(resolved.stats.branch_count, 1);
        let child_ids: Vec<&str> = resolved
            .tree
            .children
            .iter()
            .map(|c| c.session_id())
            .collect();
        assert_eq!(child_ids, vec!["b", "c"]);
    }

    #[test]
    fn test_cycle_terminates_and_drops_exactly_one_edge() {
        // a and b reference each other as parents
        let snap = snapshot(&["a", "b"], vec![edge("b", "a", 0), edge("a", "b", 0)]);
        let root = find_root("a", &snap);
        let resolved = resolve_chain(&root, &snap).unwrap();

        assert_eq!(resolved.stats.total_count, 2);
        let dropped: Vec<&ResolveWarning> = resolved
            .warnings
            .iter()
            .filter(|w| matches!(w, ResolveWarning::CycleDropped { .. }))
            .collect();
        assert_eq!(dropped.len(), 1);
    }

    #[test]
    fn test_twenty_node_chain_stats() {
        let ids: Vec<String> = (0..20).map(|i| format!("n{:02}", i)).collect();
        let id_refs: Vec<&str> = ids.iter().map(|s| s.as_str()).collect();
        let edges: Vec<ContinuationEdge> = (1..20)
            .map(|i| edge(&ids[i], &ids[i - 1], 0))
            .collect();
        let snap = snapshot(&id_refs, edges);

        let resolved = resolve_chain("n00", &snap).unwrap();
        assert_eq!(resolved.stats.total_count, 20);
        assert_eq!(resolved.stats.max_depth, 19);
        assert_eq!(resolved.stats.branch_count, 0);
        assert!(resolved.warnings.is_empty());
    }

    #[test]
    fn test_orphan_root_flagged_but_descendants_are_not() {
        let mut broken = edge("x", "gone", 0);
        broken.is_orphaned = true;
        let snap = snapshot(&["x", "y"], vec![broken, edge("y", "x", 0)]);

        assert_eq!(find_root("y", &snap), "x");
        let resolved = resolve_chain("x", &snap).unwrap();
        assert!(resolved.tree.is_orphan_root);
        assert_eq!(resolved.stats.orphan_count, 1);
        assert!(!resolved.tree.children[0].is_orphan_root);
    }

    #[test]
    fn test_unknown_root_resolves_to_none() {
        let snap = snapshot(&["a"], vec![]);
        assert!(resolve_chain("missing", &snap).is_none());
    }

    #[test]
    fn test_edge_to_unknown_child_dropped_with_warning() {
        let snap = snapshot(&["a"], vec![edge("ghost", "a", 0)]);
        let resolved = resolve_chain("a", &snap).unwrap();
        assert_eq!(resolved.stats.total_count, 1);
        assert_eq!(
            resolved.warnings,
            vec![ResolveWarning::MissingSession {
                session_id: "ghost".to_string()
            }]
        );
    }

    #[test]
    fn test_children_ordered_and_depths_set() {
        let snap = snapshot(
            &["a", "b", "c", "d"],
            vec![edge("c", "a", 1), edge("b", "a", 0), edge("d", "c", 0)],
        );
        let resolved = resolve_chain("a", &snap).unwrap();
        assert_eq!(resolved.tree.depth, 0);
        assert_eq!(resolved.tree.children[0].session_id(), "b");
        assert_eq!(resolved.tree.children[1].session_id(), "c");
        assert_eq!(resolved.tree.children[1].children[0].depth, 2);
        assert_eq!(resolved.stats.max_depth, 2);
    }
}
