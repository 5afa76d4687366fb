//! Repository discovery and logical path resolution.
//!
//! Repositories are independently-versioned checkouts below the corpus
//! root. Each one gets a logical id -- its path relative to the corpus
//! root, unless a manifest overrides it -- and absolute file paths resolve
//! to [`Position`]s through the set of discovered repository roots.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::HarvestError;
use crate::grammar::Grammar;
use crate::position::Position;
use crate::report::{DiagnosticKind, Report, Severity};
use crate::source::SourceProvider;

/// Name of the directory that marks the corpus root when inferring it
/// from a document path.
pub const CORPUS_ROOT_NAME: &str = "MathHub";

/// A single discovered repository.
#[derive(Debug)]
pub struct Repository {
    /// Logical id, `/`-joined. Defaults to the path relative to the
    /// corpus root; overridden by the manifest `id` entry.
    pub id: String,
    pub root: PathBuf,
    pub dependencies: Vec<String>,
    pub namespace: Option<String>,
    pub manifest: BTreeMap<String, String>,
}

impl Repository {
    fn load(
        root: PathBuf,
        corpus_root: &Path,
        grammar: &Grammar,
        provider: &dyn SourceProvider,
        report: &mut Report,
    ) -> Repository {
        let id = root
            .strip_prefix(corpus_root)
            .unwrap_or(&root)
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .filter(|c| !c.is_empty())
            .collect::<Vec<_>>()
            .join("/");
        let mut repo = Repository {
            id,
            root,
            dependencies: Vec::new(),
            namespace: None,
            manifest: BTreeMap::new(),
        };
        repo.read_manifest(provider, report);
        repo.read_namespace(grammar, provider);
        repo
    }

    fn read_manifest(&mut self, provider: &dyn SourceProvider, report: &mut Report) {
        let path = self.root.join("META-INF").join("MANIFEST.MF");
        let position = Position::repo_only(self.id.as_str());
        let text = match provider.read_source(&path) {
            Ok(text) => text,
            Err(_) => {
                report.log(
                    Severity::Warn,
                    DiagnosticKind::MissingManifest,
                    "failed to find META-INF/MANIFEST.MF",
                    Some(position),
                );
                return;
            }
        };

        for line in text.lines() {
            let Some((key, val)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim();
            let val = val.trim();
            if self.manifest.contains_key(key) {
                report.log(
                    Severity::Error,
                    DiagnosticKind::ManifestError,
                    format!("two entries for \"{}\" in {}", key, path.display()),
                    Some(position.clone()),
                );
            }
            self.manifest.insert(key.to_owned(), val.to_owned());
        }

        if let Some(deps) = self.manifest.get("dependencies") {
            self.dependencies = deps
                .split(',')
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_owned)
                .collect();
        }
        match self.manifest.get("id") {
            Some(id) => self.id = id.clone(),
            None => report.log(
                Severity::Error,
                DiagnosticKind::ManifestError,
                format!("missing entry for \"id\" in {}", path.display()),
                Some(position),
            ),
        }
    }

    fn read_namespace(&mut self, grammar: &Grammar, provider: &dyn SourceProvider) {
        let path = self.root.join("lib").join("preamble.tex");
        if let Ok(text) = provider.read_source(&path) {
            self.namespace = grammar.namespace(&text);
        }
    }
}

/// The set of discovered repositories under one corpus root.
#[derive(Debug)]
pub struct Corpus {
    pub root: PathBuf,
    pub repos: Vec<Repository>,
}

impl Corpus {
    /// Walk the corpus root and collect every directory that is an
    /// independent version-control root. Directories below a repository
    /// root are not searched further; `meta-inf` directories are skipped.
    pub fn discover(
        provider: &dyn SourceProvider,
        root: &Path,
        grammar: &Grammar,
        report: &mut Report,
    ) -> Result<Corpus, HarvestError> {
        let root = provider
            .canonicalize(root)
            .unwrap_or_else(|_| root.to_path_buf());
        if !provider.is_dir(&root) {
            return Err(HarvestError::CorpusRoot(root));
        }
        let mut repos = Vec::new();
        Self::collect(provider, &root, &root, grammar, report, &mut repos);
        Ok(Corpus { root, repos })
    }

    fn collect(
        provider: &dyn SourceProvider,
        dir: &Path,
        corpus_root: &Path,
        grammar: &Grammar,
        report: &mut Report,
        out: &mut Vec<Repository>,
    ) {
        if provider.is_dir(&dir.join(".git")) {
            out.push(Repository::load(
                dir.to_path_buf(),
                corpus_root,
                grammar,
                provider,
                report,
            ));
            return;
        }
        let entries = match provider.list_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                report.fatal(format!("cannot list directory {}: {}", dir.display(), e), None);
                return;
            }
        };
        for entry in entries {
            let name = entry
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            if name.eq_ignore_ascii_case("meta-inf") {
                report.skip(format!("skipping directory {}", entry.display()), None);
                continue;
            }
            if provider.is_dir(&entry) {
                Self::collect(provider, &entry, corpus_root, grammar, report, out);
            }
        }
    }

    pub fn find_repo(&self, id: &str) -> Option<&Repository> {
        self.repos.iter().find(|r| r.id == id)
    }

    /// Resolve an absolute path to a logical position.
    ///
    /// The longest matching repository root wins. Below it, a `source`
    /// segment is required for the path to resolve into the module tree;
    /// without one only a bare repository-scoped position (keeping the raw
    /// path) is returned. The final segment minus the `.tex` extension is
    /// the filename, intermediate segments form the directory.
    pub fn resolve_path(&self, path: &Path) -> Result<Position, HarvestError> {
        let repo = self
            .repos
            .iter()
            .filter(|r| path.starts_with(&r.root))
            .max_by_key(|r| r.root.components().count())
            .ok_or_else(|| HarvestError::OutsideCorpus(path.to_path_buf()))?;

        let rest: Vec<String> = path
            .strip_prefix(&repo.root)
            .expect("prefix was checked above")
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();

        if rest.is_empty() {
            return Ok(Position::repo_only(repo.id.as_str()));
        }
        if rest[0] != "source" {
            return Ok(Position {
                repo: Some(repo.id.clone()),
                path: Some(path.to_path_buf()),
                ..Position::default()
            });
        }
        let rest = &rest[1..];
        let Some(last) = rest.last() else {
            return Err(HarvestError::MissingFilename(path.to_path_buf()));
        };
        let filename = last.strip_suffix(".tex").unwrap_or(last).to_owned();
        let directory = rest[..rest.len() - 1].join("/");
        Ok(Position {
            repo: Some(repo.id.clone()),
            directory: (!directory.is_empty()).then_some(directory),
            filename: Some(filename),
            offset: None,
            path: Some(path.to_path_buf()),
        })
    }
}

/// Infer the corpus root from a document path by walking parent
/// directories until one literally named [`CORPUS_ROOT_NAME`] is found.
/// Retried once on the symlink-resolved path.
pub fn infer_corpus_root(
    path: &Path,
    provider: &dyn SourceProvider,
) -> Result<PathBuf, HarvestError> {
    fn walk_up(start: &Path) -> Option<PathBuf> {
        let mut current = start.to_path_buf();
        loop {
            if current
                .file_name()
                .is_some_and(|n| n == CORPUS_ROOT_NAME)
            {
                return Some(current);
            }
            if !current.pop() {
                return None;
            }
        }
    }

    if let Some(root) = walk_up(path) {
        return Ok(root);
    }
    if let Ok(real) = provider.canonicalize(path) {
        if let Some(root) = walk_up(&real) {
            return Ok(root);
        }
    }
    Err(HarvestError::RootNotFound(
        path.to_path_buf(),
        CORPUS_ROOT_NAME,
    ))
}
