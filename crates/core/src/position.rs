//! Logical positions inside the corpus.
//!
//! A [`Position`] identifies a place by repository, directory and filename
//! rather than by raw path, so that the same logical file is recognized no
//! matter which checkout it came from. Positions are immutable values;
//! derived positions (with an added offset) are copies.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

/// A character offset inside a file, with 1-based line and column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Offset {
    pub index: usize,
    pub line: u32,
    pub col: u32,
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// Logical identity of a repository, file, or place inside a file.
///
/// All fields are optional: a bare repository-scoped position has only
/// `repo` set; a position outside any module tree keeps the raw `path`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Position {
    pub repo: Option<String>,
    pub directory: Option<String>,
    pub filename: Option<String>,
    pub offset: Option<Offset>,
    pub path: Option<PathBuf>,
}

impl Position {
    pub fn repo_only(repo: impl Into<String>) -> Self {
        Position {
            repo: Some(repo.into()),
            ..Position::default()
        }
    }

    /// Copy of this position with the given offset attached.
    pub fn with_offset(&self, offset: Offset) -> Self {
        Position {
            offset: Some(offset),
            ..self.clone()
        }
    }

    /// Copy of this position with the raw path attached.
    pub fn with_path(&self, path: &Path) -> Self {
        Position {
            path: Some(path.to_path_buf()),
            ..self.clone()
        }
    }

    /// The filemap key (repo, directory-or-empty, filename), when this
    /// position identifies a file inside a module tree.
    pub fn key(&self) -> Option<(String, String, String)> {
        match (&self.repo, &self.filename) {
            (Some(repo), Some(filename)) => Some((
                repo.clone(),
                self.directory.clone().unwrap_or_default(),
                filename.clone(),
            )),
            _ => None,
        }
    }

    /// Human-readable rendering. The short form prefers the logical
    /// repo/directory/filename identity; the long form prefers the raw
    /// path when one is known.
    pub fn display(&self, short: bool) -> String {
        let off = self
            .offset
            .map(|o| format!(":{}", o))
            .unwrap_or_default();
        if (!short && self.path.is_some()) || self.repo.is_none() {
            let path = self
                .path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            return format!("{}{}", path, off);
        }
        let repo = self.repo.as_deref().unwrap_or_default();
        match (&self.directory, &self.filename) {
            (Some(dir), Some(name)) => format!("{}/{}/{}{}", repo, dir, name, off),
            (None, Some(name)) => format!("{}/{}{}", repo, name, off),
            _ => repo.to_owned(),
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display(false))
    }
}

/// Per-file table of line start offsets, computed once after comment
/// stripping and threaded wherever positions are derived from match
/// offsets.
#[derive(Debug)]
pub struct LineIndex {
    line_starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(text: &str) -> Self {
        let mut line_starts = vec![0];
        for (i, b) in text.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }
        LineIndex { line_starts }
    }

    /// Offset (line/column) for a byte index into the indexed text.
    pub fn offset_at(&self, index: usize) -> Offset {
        let line = self.line_starts.partition_point(|&s| s <= index) - 1;
        Offset {
            index,
            line: (line + 1) as u32,
            col: (index - self.line_starts[line] + 1) as u32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_index_maps_offsets() {
        let idx = LineIndex::new("ab\ncd\n\nef");
        assert_eq!(idx.offset_at(0), Offset { index: 0, line: 1, col: 1 });
        assert_eq!(idx.offset_at(3), Offset { index: 3, line: 2, col: 1 });
        assert_eq!(idx.offset_at(4), Offset { index: 4, line: 2, col: 2 });
        assert_eq!(idx.offset_at(6), Offset { index: 6, line: 3, col: 1 });
        assert_eq!(idx.offset_at(7), Offset { index: 7, line: 4, col: 1 });
    }

    #[test]
    fn display_prefers_logical_identity_in_short_form() {
        let pos = Position {
            repo: Some("smglom/numbers".into()),
            directory: Some("nat".into()),
            filename: Some("natarith".into()),
            offset: None,
            path: Some(PathBuf::from("/mh/smglom/numbers/source/nat/natarith.tex")),
        };
        assert_eq!(pos.display(true), "smglom/numbers/nat/natarith");
        assert_eq!(
            pos.display(false),
            "/mh/smglom/numbers/source/nat/natarith.tex"
        );
    }

    #[test]
    fn display_includes_offset() {
        let pos = Position::repo_only("repo").with_offset(Offset {
            index: 10,
            line: 3,
            col: 4,
        });
        // repo-only positions have no filename, so only the repo renders
        assert_eq!(pos.display(true), "repo");
        let pos = Position {
            repo: Some("repo".into()),
            filename: Some("mod".into()),
            ..Position::default()
        }
        .with_offset(Offset {
            index: 10,
            line: 3,
            col: 4,
        });
        assert_eq!(pos.display(true), "repo/mod:3:4");
    }

    #[test]
    fn key_requires_repo_and_filename() {
        let pos = Position::repo_only("r");
        assert!(pos.key().is_none());
        let pos = Position {
            repo: Some("r".into()),
            directory: None,
            filename: Some("f".into()),
            ..Position::default()
        };
        assert_eq!(pos.key(), Some(("r".into(), "".into(), "f".into())));
    }
}
