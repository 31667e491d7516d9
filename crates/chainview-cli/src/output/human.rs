//! Human-readable formatting

use chainview_core::{BreadcrumbSegment, ChainNode, ChainStats, SessionMeta};

use super::colors;

/// One-line summary of a chain root
pub fn format_root(meta: &SessionMeta, stats: &ChainStats, is_orphan_root: bool) -> String {
    let mut line = format!(
        "{}  {} sessions, depth {}",
        colors::session(&meta.session_id),
        stats.total_count,
        stats.max_depth,
    );
    if stats.branch_count > 0 {
        line.push_str(&format!(", {} branches", stats.branch_count));
    }
    if let Some(last) = &meta.last_timestamp {
        line.push_str(&format!("  {}", colors::label(last)));
    }
    if is_orphan_root {
        line.push_str(&format!("  {}", colors::orphan_marker()));
    }
    line
}

/// One-line description of a tree node
fn describe_node(node: &ChainNode) -> String {
    let mut line = colors::session(node.session_id());
    line.push_str(&format!(
        " {}",
        colors::label(&format!("({} messages)", node.session.message_count))
    ));
    if node.is_branch_point {
        line.push_str(&format!(" {}", colors::branch_marker()));
    }
    if node.is_orphan_root {
        line.push_str(&format!(" {}", colors::orphan_marker()));
    }
    line
}

/// Render a chain as an ASCII tree, children in chronological order
pub fn render_tree(root: &ChainNode) -> String {
    let mut out = String::new();
    let mut stack: Vec<(&ChainNode, String, bool)> = vec![(root, String::new(), true)];

    while let Some((node, prefix, is_last)) = stack.pop() {
        if node.depth == 0 {
            out.push_str(&describe_node(node));
            out.push('\n');
        } else {
            let connector = if is_last { "└─" } else { "├─" };
            out.push_str(&format!("{}{} {}\n", prefix, connector, describe_node(node)));
        }

        let child_prefix = if node.depth == 0 {
            String::new()
        } else if is_last {
            format!("{}   ", prefix)
        } else {
            format!("{}│  ", prefix)
        };
        let count = node.children.len();
        for (i, child) in node.children.iter().enumerate().rev() {
            stack.push((child, child_prefix.clone(), i == count - 1));
        }
    }

    out
}

/// Render a collapsed breadcrumb like `a › … (+4) › f › g`
pub fn format_breadcrumb(segments: &[BreadcrumbSegment]) -> String {
    let parts: Vec<String> = segments
        .iter()
        .map(|segment| match segment {
            BreadcrumbSegment::Node {
                session_id,
                is_branch_point,
            } => {
                if *is_branch_point {
                    format!("{} {}", colors::session(session_id), colors::branch_marker())
                } else {
                    colors::session(session_id)
                }
            }
            BreadcrumbSegment::Collapsed { hidden } => {
                colors::label(&format!("… (+{})", hidden))
            }
        })
        .collect();
    parts.join(" › ")
}

/// Render chain statistics
pub fn format_stats(stats: &ChainStats) -> String {
    format!(
        "  {}: {}\n  {}: {}\n  {}: {}\n  {}: {}",
        colors::label("Sessions"),
        stats.total_count,
        colors::label("Branch points"),
        stats.branch_count,
        colors::label("Broken links"),
        stats.orphan_count,
        colors::label("Max depth"),
        stats.max_depth,
    )
}
