//! Corpus harvester: enumerates repository source trees and loads each
//! document file (comment stripping, line indexing, tokenization, tree
//! building), registering it with the referencer as it goes.
//!
//! Processing is strictly sequential and batch-oriented; an unexpected
//! fault while loading one file is logged fatal and that file skipped,
//! every other file is still processed.

use std::path::{Path, PathBuf};

use regex::Regex;

use crate::error::HarvestError;
use crate::grammar::Grammar;
use crate::position::{LineIndex, Position};
use crate::referencer::{Referencer, SymbolId};
use crate::repo::Corpus;
use crate::report::Report;
use crate::source::SourceProvider;
use crate::tree::{self, FileId, FileKind, FileTree};

/// One loaded and parsed document file.
#[derive(Debug)]
pub struct SourceFile {
    pub path: PathBuf,
    pub position: Position,
    pub kind: FileKind,
    pub tree: FileTree,
    /// Symbols declared by nodes in this file; filled by the referencer
    /// so that "what is declared in file F" is an O(1) lookup.
    pub declared_symbols: Vec<SymbolId>,
    /// For language bindings, the linked signature file.
    pub signature: Option<FileId>,
}

/// Drives the whole batch: discovery, loading, resolution.
pub struct Harvester<'p> {
    provider: &'p dyn SourceProvider,
    pub grammar: Grammar,
    pub corpus: Corpus,
    pub files: Vec<SourceFile>,
    pub referencer: Referencer,
}

impl<'p> Harvester<'p> {
    /// Discover the repositories under `corpus_root`.
    pub fn new(
        provider: &'p dyn SourceProvider,
        corpus_root: &Path,
        report: &mut Report,
    ) -> Result<Self, HarvestError> {
        let grammar = Grammar::new();
        let corpus = Corpus::discover(provider, corpus_root, &grammar, report)?;
        Ok(Harvester {
            provider,
            grammar,
            corpus,
            files: Vec::new(),
            referencer: Referencer::new(),
        })
    }

    /// Load every `.tex` file under the `source/` tree of every
    /// repository whose id matches `filter` (all repositories when no
    /// filter is given). Generated aggregation files are skipped.
    pub fn load_all(&mut self, filter: Option<&Regex>, report: &mut Report) {
        let mut paths = Vec::new();
        for repo in &self.corpus.repos {
            if let Some(f) = filter {
                if !f.is_match(&repo.id) {
                    continue;
                }
            }
            let source_dir = repo.root.join("source");
            let Ok(walked) = self.provider.walk_files(&source_dir) else {
                // repository without a source tree
                continue;
            };
            for path in walked {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                if !name.ends_with(".tex") {
                    continue;
                }
                if self.grammar.is_skipped_filename(&name) {
                    report.skip(
                        format!("skipping {}", path.display()),
                        Some(Position::repo_only(repo.id.as_str())),
                    );
                    continue;
                }
                paths.push(path);
            }
        }
        for path in paths {
            self.load_file(&path, report);
        }
    }

    /// Load and parse a single file.
    pub fn load_file(&mut self, path: &Path, report: &mut Report) -> Option<FileId> {
        let text = match self.provider.read_source(path) {
            Ok(text) => text,
            Err(e) => {
                report.fatal(
                    format!("failed to read {}: {}", path.display(), e),
                    None,
                );
                return None;
            }
        };
        let position = match self.corpus.resolve_path(path) {
            Ok(position) => position.with_path(path),
            Err(e) => {
                report.fatal(e.to_string(), None);
                return None;
            }
        };
        let stripped = self.grammar.strip_comments(&text);
        let lines = LineIndex::new(&stripped);
        let tokens = self.grammar.tokenize(&stripped);
        let file_tree = tree::build(
            &self.grammar,
            &tokens,
            &self.corpus,
            &position,
            &lines,
            report,
        );
        let kind = tree::file_kind(&file_tree);

        let id = FileId(self.files.len());
        self.referencer.add_file(id, &position, report);
        self.files.push(SourceFile {
            path: path.to_path_buf(),
            position,
            kind,
            tree: file_tree,
            declared_symbols: Vec::new(),
            signature: None,
        });
        Some(id)
    }

    /// Run the five resolution passes over everything loaded so far.
    pub fn compile(&mut self, report: &mut Report) {
        self.referencer.compile(&mut self.files, report);
    }

    /// Find a loaded file by its on-disk path.
    pub fn find_loaded(&self, path: &Path) -> Option<FileId> {
        let canon = self
            .provider
            .canonicalize(path)
            .unwrap_or_else(|_| path.to_path_buf());
        self.files
            .iter()
            .position(|f| f.path == canon || f.path == path)
            .map(FileId)
    }
}
