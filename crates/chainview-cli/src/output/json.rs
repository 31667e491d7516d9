//! JSON formatting

use chainview_core::{BreadcrumbSegment, ChainStats, SessionMeta};
use chainview_engine::CachedChain;

/// Chain root summary as JSON
pub fn root_to_json(
    meta: &SessionMeta,
    stats: &ChainStats,
    is_orphan_root: bool,
) -> serde_json::Value {
    serde_json::json!({
        "root_id": meta.session_id,
        "file_path": meta.file_path,
        "last_timestamp": meta.last_timestamp,
        "total_count": stats.total_count,
        "branch_count": stats.branch_count,
        "orphan_count": stats.orphan_count,
        "max_depth": stats.max_depth,
        "is_orphan_root": is_orphan_root,
    })
}

/// Cached chain (tree plus cache state) as JSON
pub fn chain_to_json(chain: &CachedChain) -> serde_json::Value {
    serde_json::json!({
        "root_id": chain.root_id,
        "generation": chain.generation,
        "is_loading": chain.is_loading,
        "is_stale": chain.is_stale,
        "last_error": chain.last_error,
        "stats": chain.stats(),
        "tree": chain.tree(),
    })
}

/// Breadcrumb segments as JSON
pub fn segments_to_json(segments: &[BreadcrumbSegment]) -> serde_json::Value {
    let items: Vec<serde_json::Value> = segments
        .iter()
        .map(|segment| match segment {
            BreadcrumbSegment::Node {
                session_id,
                is_branch_point,
            } => serde_json::json!({
                "kind": "node",
                "session_id": session_id,
                "is_branch_point": is_branch_point,
            }),
            BreadcrumbSegment::Collapsed { hidden } => serde_json::json!({
                "kind": "collapsed",
                "hidden": hidden,
            }),
        })
        .collect();
    serde_json::Value::Array(items)
}
