//! Recursive file discovery

use std::fs;
use std::path::{Path, PathBuf};

use super::IngestError;

/// Extension shared by song metadata and log files
pub const DATA_FILE_EXTENSION: &str = "json";

/// A discovered input file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFile {
    /// Absolute path to the file
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
}

impl DiscoveredFile {
    pub fn new(path: PathBuf, size: u64) -> Self {
        Self { path, size }
    }
}

/// Find every file below `root` whose extension is `extension`
///
/// A missing root yields an empty list rather than an error: the caller
/// treats it as nothing to process. Results are sorted by path, which is the
/// file-visit order used by the mergers.
pub fn discover_files(root: &Path, extension: &str) -> Result<Vec<DiscoveredFile>, IngestError> {
    if !root.exists() {
        tracing::warn!("Input root {} does not exist", root.display());
        return Ok(Vec::new());
    }

    let root = fs::canonicalize(root)?;
    let full_pattern = format!(
        "{}/**/*.{}",
        glob::Pattern::escape(&root.to_string_lossy()),
        extension
    );

    let entries = glob::glob(&full_pattern)
        .map_err(|e| IngestError::InvalidPattern(format!("{}: {}", full_pattern, e)))?;

    let mut files = Vec::new();
    for entry in entries {
        match entry {
            Ok(path) => {
                if !path.is_file() {
                    continue;
                }
                match fs::metadata(&path) {
                    Ok(metadata) => files.push(DiscoveredFile::new(path, metadata.len())),
                    Err(e) => {
                        tracing::warn!("Skipping unreadable {}: {}", path.display(), e);
                    }
                }
            }
            Err(e) => {
                tracing::warn!("Error accessing path: {}", e);
            }
        }
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    tracing::debug!("Discovered {} files under {}", files.len(), root.display());

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_discover_nested_files() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("A").join("B");
        fs::create_dir_all(&nested).unwrap();
        fs::write(dir.path().join("top.json"), "{}").unwrap();
        fs::write(nested.join("deep.json"), "{}").unwrap();
        fs::write(nested.join("notes.txt"), "ignored").unwrap();

        let files = discover_files(dir.path(), DATA_FILE_EXTENSION).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| f.path.is_absolute()));
        assert!(files.iter().all(|f| f.path.extension().unwrap() == "json"));
    }

    #[test]
    fn test_discover_sorted_by_path() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("b.json"), "{}").unwrap();
        fs::write(dir.path().join("a.json"), "{}").unwrap();
        fs::write(dir.path().join("c.json"), "{}").unwrap();

        let files = discover_files(dir.path(), "json").unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|f| f.path.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.json", "b.json", "c.json"]);
    }

    #[test]
    fn test_discover_missing_root_is_empty() {
        let dir = TempDir::new().unwrap();
        let files = discover_files(&dir.path().join("does-not-exist"), "json").unwrap();
        assert!(files.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_discover_skips_unreadable_entries() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let locked = dir.path().join("locked");
        fs::create_dir_all(&locked).unwrap();
        fs::write(locked.join("hidden.json"), "{}").unwrap();
        fs::write(dir.path().join("open.json"), "{}").unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        let result = discover_files(dir.path(), "json");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        let files = result.unwrap();
        assert!(files.iter().any(|f| f.path.ends_with("open.json")));
    }

    #[test]
    fn test_discover_empty_directory() {
        let dir = TempDir::new().unwrap();
        assert!(discover_files(dir.path(), "json").unwrap().is_empty());
    }
}
