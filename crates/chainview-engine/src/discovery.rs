//! Transcript file discovery

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use chainview_core::SessionId;

/// Default transcripts directory (~/.claude/projects)
pub fn default_transcripts_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
    PathBuf::from(home).join(".claude").join("projects")
}

/// Find all transcript JSONL files under a directory
pub fn find_transcript_files(dir: Option<&Path>) -> Vec<PathBuf> {
    let dir = dir
        .map(PathBuf::from)
        .unwrap_or_else(default_transcripts_dir);

    if !dir.exists() {
        return Vec::new();
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(&dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if path.is_file() {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                if name.ends_with(".jsonl") {
                    files.push(path.to_path_buf());
                }
            }
        }
    }

    files.sort();
    files
}

/// Session id implied by a transcript path (the file stem)
pub fn session_id_for_path(path: &Path) -> Option<SessionId> {
    let stem = path.file_stem()?.to_str()?;
    if stem.is_empty() {
        None
    } else {
        Some(stem.to_string())
    }
}

/// Locate the transcript file for a session under a directory
pub fn locate_transcript(dir: &Path, session_id: &str) -> Option<PathBuf> {
    let file_name = format!("{}.jsonl", session_id);
    find_transcript_files(Some(dir))
        .into_iter()
        .find(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n == file_name)
                .unwrap_or(false)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_find_transcript_files_empty_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let files = find_transcript_files(Some(tmp.path()));
        assert!(files.is_empty());
    }

    #[test]
    fn test_find_transcript_files_recursive() {
        let tmp = tempfile::tempdir().unwrap();
        let project_dir = tmp.path().join("project1");
        fs::create_dir_all(&project_dir).unwrap();

        fs::write(project_dir.join("abc.jsonl"), "{}").unwrap();
        fs::write(project_dir.join("notes.txt"), "hello").unwrap();

        let files = find_transcript_files(Some(tmp.path()));
        assert_eq!(files.len(), 1);
        assert!(files[0].to_string_lossy().ends_with("abc.jsonl"));
    }

    #[test]
    fn test_find_transcript_files_nonexistent_dir() {
        let files = find_transcript_files(Some(Path::new("/nonexistent/path")));
        assert!(files.is_empty());
    }

    #[test]
    fn test_session_id_for_path() {
        assert_eq!(
            session_id_for_path(Path::new("/a/b/sess-1.jsonl")),
            Some("sess-1".to_string())
        );
        assert_eq!(session_id_for_path(Path::new("/")), None);
    }

    #[test]
    fn test_locate_transcript() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("deep").join("er");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("sess-1.jsonl"), "{}").unwrap();

        let found = locate_transcript(tmp.path(), "sess-1").unwrap();
        assert!(found.ends_with("deep/er/sess-1.jsonl"));
        assert!(locate_transcript(tmp.path(), "missing").is_none());
    }
}
