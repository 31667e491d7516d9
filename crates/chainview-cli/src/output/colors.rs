//! ANSI color helpers for terminal output

use colored::Colorize;

/// Get colored header
pub fn header(text: &str) -> String {
    text.bold().underline().to_string()
}

/// Get colored label
pub fn label(text: &str) -> String {
    text.white().dimmed().to_string()
}

/// Get colored value
pub fn value(text: &str) -> String {
    text.white().to_string()
}

/// Get colored session id
pub fn session(id: &str) -> String {
    id.cyan().to_string()
}

/// Get colored success message
pub fn success(text: &str) -> String {
    format!("{} {}", "✓".green(), text)
}

/// Get colored warning message
pub fn warning(text: &str) -> String {
    format!("{} {}", "⚠".yellow(), text)
}

/// Get colored error message
pub fn error(text: &str) -> String {
    format!("{} {}", "✗".red(), text)
}

/// Marker for a branch point
pub fn branch_marker() -> String {
    "[branch]".magenta().to_string()
}

/// Marker for a broken parent link
pub fn orphan_marker() -> String {
    "[broken parent link]".yellow().to_string()
}

/// Marker for stale cached data
pub fn stale_marker() -> String {
    "(stale)".white().dimmed().to_string()
}

/// Extract the time portion (HH:MM:SS) from an ISO timestamp
pub fn short_time(timestamp: &str) -> String {
    if let Some(t_pos) = timestamp.find('T') {
        let time_part = &timestamp[t_pos + 1..];
        time_part.split('.').next().unwrap_or(time_part).to_string()
    } else {
        timestamp.to_string()
    }
}
