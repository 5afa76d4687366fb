//! Source provider abstraction for filesystem-independent harvesting.
//!
//! The [`SourceProvider`] trait abstracts file reads and directory walks so
//! the whole pipeline can run against an in-memory corpus in tests.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

/// Trait that abstracts corpus I/O for the harvesting pipeline.
///
/// Implementations provide source text reading, directory listing and path
/// canonicalization. The default [`FileSystemProvider`] delegates to
/// `std::fs`; [`InMemoryProvider`] enables testing without a checkout.
pub trait SourceProvider {
    /// Read the source text for a given path.
    fn read_source(&self, path: &Path) -> Result<String, std::io::Error>;

    /// Whether the path names a directory.
    fn is_dir(&self, path: &Path) -> bool;

    /// Immediate entries of a directory, sorted for determinism.
    fn list_dir(&self, path: &Path) -> Result<Vec<PathBuf>, std::io::Error>;

    /// Canonicalize a path for identity comparisons.
    fn canonicalize(&self, path: &Path) -> Result<PathBuf, std::io::Error>;

    /// All files under `root`, recursively, sorted for determinism.
    fn walk_files(&self, root: &Path) -> Result<Vec<PathBuf>, std::io::Error> {
        let mut files = Vec::new();
        let mut stack = vec![root.to_path_buf()];
        while let Some(dir) = stack.pop() {
            for entry in self.list_dir(&dir)? {
                if self.is_dir(&entry) {
                    stack.push(entry);
                } else {
                    files.push(entry);
                }
            }
        }
        files.sort();
        Ok(files)
    }
}

/// Default filesystem-backed source provider.
pub struct FileSystemProvider;

impl SourceProvider for FileSystemProvider {
    fn read_source(&self, path: &Path) -> Result<String, std::io::Error> {
        std::fs::read_to_string(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn list_dir(&self, path: &Path) -> Result<Vec<PathBuf>, std::io::Error> {
        let mut entries: Vec<PathBuf> = std::fs::read_dir(path)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .collect();
        entries.sort();
        Ok(entries)
    }

    fn canonicalize(&self, path: &Path) -> Result<PathBuf, std::io::Error> {
        path.canonicalize()
    }
}

/// In-memory source provider for tests.
///
/// Maps paths to source text strings; directories exist implicitly as
/// prefixes of stored paths.
#[derive(Default)]
pub struct InMemoryProvider {
    files: HashMap<PathBuf, String>,
}

impl InMemoryProvider {
    pub fn new() -> Self {
        InMemoryProvider {
            files: HashMap::new(),
        }
    }

    /// Builder-style insertion of a file.
    pub fn with(mut self, path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        self.files
            .insert(Self::normalize_path(&path.into()), text.into());
        self
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, text: impl Into<String>) {
        self.files
            .insert(Self::normalize_path(&path.into()), text.into());
    }

    /// Normalize a path by resolving `.` and `..` components without
    /// touching the filesystem.
    fn normalize_path(path: &Path) -> PathBuf {
        let mut components = Vec::new();
        for component in path.components() {
            match component {
                Component::CurDir => {}
                Component::ParentDir => {
                    if !components.is_empty() {
                        components.pop();
                    }
                }
                other => components.push(other),
            }
        }
        components.iter().collect()
    }
}

impl SourceProvider for InMemoryProvider {
    fn read_source(&self, path: &Path) -> Result<String, std::io::Error> {
        let normalized = Self::normalize_path(path);
        self.files.get(&normalized).cloned().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("file not found in memory: {}", normalized.display()),
            )
        })
    }

    fn is_dir(&self, path: &Path) -> bool {
        let normalized = Self::normalize_path(path);
        !self.files.contains_key(&normalized)
            && self.files.keys().any(|k| k.starts_with(&normalized))
    }

    fn list_dir(&self, path: &Path) -> Result<Vec<PathBuf>, std::io::Error> {
        let normalized = Self::normalize_path(path);
        if !self.is_dir(&normalized) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("not a directory in memory: {}", normalized.display()),
            ));
        }
        let depth = normalized.components().count();
        let mut entries: Vec<PathBuf> = self
            .files
            .keys()
            .filter(|k| k.starts_with(&normalized))
            .map(|k| k.components().take(depth + 1).collect())
            .collect();
        entries.sort();
        entries.dedup();
        Ok(entries)
    }

    fn canonicalize(&self, path: &Path) -> Result<PathBuf, std::io::Error> {
        let normalized = Self::normalize_path(path);
        if self.files.contains_key(&normalized) || self.is_dir(&normalized) {
            Ok(normalized)
        } else {
            Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("path not found in memory: {}", normalized.display()),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_path_resolves_dot_and_dotdot() {
        let p = Path::new("/a/b/../c/./d");
        assert_eq!(
            InMemoryProvider::normalize_path(p),
            PathBuf::from("/a/c/d")
        );
    }

    #[test]
    fn in_memory_read_source() {
        let provider = InMemoryProvider::new().with("/mh/repo/source/a.tex", "x");
        assert_eq!(
            provider
                .read_source(Path::new("/mh/repo/source/a.tex"))
                .unwrap(),
            "x"
        );
        assert!(provider.read_source(Path::new("/missing.tex")).is_err());
    }

    #[test]
    fn in_memory_dirs_exist_as_prefixes() {
        let provider = InMemoryProvider::new().with("/mh/repo/source/a.tex", "x");
        assert!(provider.is_dir(Path::new("/mh/repo")));
        assert!(provider.is_dir(Path::new("/mh/repo/source")));
        assert!(!provider.is_dir(Path::new("/mh/repo/source/a.tex")));
        assert!(!provider.is_dir(Path::new("/mh/other")));
    }

    #[test]
    fn in_memory_list_dir_is_sorted_and_unique() {
        let provider = InMemoryProvider::new()
            .with("/mh/r/source/b.tex", "")
            .with("/mh/r/source/a.tex", "")
            .with("/mh/r/source/sub/c.tex", "");
        let entries = provider.list_dir(Path::new("/mh/r/source")).unwrap();
        assert_eq!(
            entries,
            vec![
                PathBuf::from("/mh/r/source/a.tex"),
                PathBuf::from("/mh/r/source/b.tex"),
                PathBuf::from("/mh/r/source/sub"),
            ]
        );
    }

    #[test]
    fn walk_files_returns_all_files_sorted() {
        let provider = InMemoryProvider::new()
            .with("/mh/r/source/sub/c.tex", "")
            .with("/mh/r/source/a.tex", "");
        let files = provider.walk_files(Path::new("/mh/r")).unwrap();
        assert_eq!(
            files,
            vec![
                PathBuf::from("/mh/r/source/a.tex"),
                PathBuf::from("/mh/r/source/sub/c.tex"),
            ]
        );
    }
}
