//! Discovery Module for stories files
//!
//! Recursively scans directories for `*.stories.svelte` files and reads them
//! into compile inputs.

#[cfg(feature = "napi")]
use napi_derive::napi;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::diagnostics::{CompilerError, IO_ERROR};

pub const STORIES_SUFFIX: &str = ".stories.svelte";

/// Check if a path names a stories file
pub fn is_stories_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.len() > STORIES_SUFFIX.len() && name.ends_with(STORIES_SUFFIX))
}

fn is_ignored_dir(entry: &walkdir::DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| name == "node_modules" || name.starts_with('.'))
}

/// Recursively find all stories files under `base_dir`, sorted by path.
/// `node_modules` and hidden directories are skipped.
pub fn discover_story_files(base_dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(base_dir)
        .follow_links(true)
        .into_iter()
        .filter_entry(|entry| !is_ignored_dir(entry))
    {
        match entry {
            Ok(entry) => {
                let path = entry.path();
                if path.is_file() && is_stories_file(path) {
                    files.push(path.to_path_buf());
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable directory entry");
            }
        }
    }

    files.sort();
    files
}

/// Read a stories file as UTF-8.
pub fn read_stories_file(path: &Path) -> Result<String, CompilerError> {
    fs::read_to_string(path).map_err(|e| {
        CompilerError::new(
            IO_ERROR,
            &format!("Failed to read file: {}", e),
            &path.to_string_lossy(),
            0,
            0,
        )
    })
}

#[cfg(feature = "napi")]
#[napi]
pub fn discover_story_files_native(base_dir: String) -> Vec<String> {
    discover_story_files(Path::new(&base_dir))
        .into_iter()
        .map(|path| path.to_string_lossy().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(root: &Path, relative: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "<script module></script>").unwrap();
    }

    #[test]
    fn test_is_stories_file() {
        assert!(is_stories_file(Path::new("src/Button.stories.svelte")));
        assert!(!is_stories_file(Path::new("src/Button.svelte")));
        assert!(!is_stories_file(Path::new("src/.stories.svelte")));
        assert!(!is_stories_file(Path::new("src/Button.stories.ts")));
    }

    #[test]
    fn test_discover_story_files() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "src/Button.stories.svelte");
        touch(dir.path(), "src/forms/Input.stories.svelte");
        touch(dir.path(), "src/Button.svelte");
        touch(dir.path(), "node_modules/pkg/Dep.stories.svelte");
        touch(dir.path(), ".cache/Old.stories.svelte");

        let files = discover_story_files(dir.path());
        let relative: Vec<String> = files
            .iter()
            .map(|p| {
                p.strip_prefix(dir.path())
                    .unwrap()
                    .to_string_lossy()
                    .replace('\\', "/")
            })
            .collect();
        assert_eq!(
            relative,
            vec!["src/Button.stories.svelte", "src/forms/Input.stories.svelte"]
        );
    }

    #[test]
    fn test_discover_missing_dir_is_empty() {
        let dir = TempDir::new().unwrap();
        let files = discover_story_files(&dir.path().join("missing"));
        assert!(files.is_empty());
    }

    #[test]
    fn test_read_stories_file_error_names_file() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("Missing.stories.svelte");
        let err = read_stories_file(&missing).unwrap_err();
        assert_eq!(err.code, IO_ERROR);
        assert!(err.file.ends_with("Missing.stories.svelte"));
    }
}
