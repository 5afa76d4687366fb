//! Symbol table and reference resolution.
//!
//! Five ordered passes over the complete set of parsed files:
//!
//! 1. link include macros to actual file entries,
//! 2. collect declared symbols (symi/symdef, plus defis directly inside
//!    modules),
//! 3. index declared symbols per file,
//! 4. link language bindings to their signature files,
//! 5. resolve every defi/trefi to exactly one symbol and back-link the
//!    resolution into the nodes.
//!
//! Pass order is strict: later passes depend on invariants established by
//! earlier ones.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::Serialize;

use crate::grammar::{is_lang, EnvKind};
use crate::harvester::SourceFile;
use crate::position::Position;
use crate::report::{DiagnosticKind, Report, Severity};
use crate::tree::{FileId, FileKind, MacroData, NodeData, NodeId, NodeRef};

/// Index into the symbol table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SymbolId(pub usize);

/// A uniquely-identified declared concept.
///
/// Identity is (name, repo, directory, module); two declarations with
/// equal identity merge into one symbol, never duplicate. `directory` is
/// the empty string when the declaring position has none.
#[derive(Debug, Serialize)]
pub struct Symbol {
    pub name: String,
    pub repo: String,
    pub directory: String,
    pub module: String,
    /// Declaring nodes (symi/symdef/module-defi).
    pub declared: Vec<NodeRef>,
    /// Referencing nodes (defi/trefi) that resolved to this symbol.
    pub used: Vec<NodeRef>,
}

/// The global filemap and symbol table, plus the resolution passes.
pub struct Referencer {
    filemap: HashMap<(String, String, String), FileId>,
    symbols: Vec<Symbol>,
    by_name: HashMap<String, Vec<SymbolId>>,
    compiled: bool,
}

impl Default for Referencer {
    fn default() -> Self {
        Self::new()
    }
}

impl Referencer {
    pub fn new() -> Self {
        Referencer {
            filemap: HashMap::new(),
            symbols: Vec::new(),
            by_name: HashMap::new(),
            compiled: false,
        }
    }

    /// Register a loaded file under its (repo, directory, filename) key.
    /// The first registration wins; a second file with the same key is a
    /// duplicate-declaration error.
    pub fn add_file(&mut self, id: FileId, position: &Position, report: &mut Report) {
        debug_assert!(
            !self.compiled,
            "files cannot be added after symbol generation"
        );
        let Some(key) = position.key() else {
            return;
        };
        if self.filemap.contains_key(&key) {
            report.log(
                Severity::Error,
                DiagnosticKind::DuplicateDeclaration,
                format!("there is already an entry for {}", position.display(true)),
                Some(position.clone()),
            );
            return;
        }
        self.filemap.insert(key, id);
    }

    /// Look a declared target position up in the filemap.
    pub fn find_file(&self, position: &Position) -> Option<FileId> {
        position.key().and_then(|key| self.filemap.get(&key).copied())
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    /// Run all five passes.
    pub fn compile(&mut self, files: &mut [SourceFile], report: &mut Report) {
        self.compiled = true;
        self.link_includes(files);
        self.collect_declarations(files, report);
        self.index_declared(files);
        self.link_bindings(files, report);
        self.resolve_references(files, report);
    }

    // ── Pass 1 ───────────────────────────────────────────────────────

    /// Resolve every include macro's declared target position to an
    /// actual file. Unresolved targets stay `None` and are reported when
    /// consumption is attempted.
    fn link_includes(&self, files: &mut [SourceFile]) {
        for fi in 0..files.len() {
            let tree = &files[fi].tree;
            let includes = tree.collect(tree.root(), &|n| {
                matches!(&n.data, NodeData::Macro(m) if m.target().is_some())
            });
            for id in includes {
                let resolved = match &files[fi].tree.node(id).data {
                    NodeData::Macro(m) => {
                        m.target().and_then(|t| self.find_file(&t.position))
                    }
                    _ => None,
                };
                if let NodeData::Macro(m) = &mut files[fi].tree.node_mut(id).data {
                    if let Some(target) = m.target_mut() {
                        target.file = resolved;
                    }
                }
            }
        }
    }

    // ── Pass 2 ───────────────────────────────────────────────────────

    /// Create or merge a symbol for every symi/symdef with an enclosing
    /// signature or module, and for every defi sitting directly inside a
    /// module (not inside a language binding).
    fn collect_declarations(&mut self, files: &[SourceFile], report: &mut Report) {
        for fi in 0..files.len() {
            let file = &files[fi];
            let tree = &file.tree;

            let declarations = tree.collect(tree.root(), &|n| {
                matches!(
                    &n.data,
                    NodeData::Macro(MacroData::Symi { .. } | MacroData::Symdef { .. })
                )
            });
            for id in declarations {
                let node = tree.node(id);
                let Some(env_id) =
                    tree.nearest_ancestor(id, &[EnvKind::ModSig, EnvKind::Module])
                else {
                    report.log(
                        Severity::Error,
                        DiagnosticKind::ParseError,
                        format!("\"{}\" is not inside a modsig or module", node.text),
                        Some(node.position.clone()),
                    );
                    continue;
                };
                let name = match &node.data {
                    NodeData::Macro(
                        MacroData::Symi { name, .. } | MacroData::Symdef { name, .. },
                    ) => name.clone(),
                    _ => continue,
                };
                let module = tree
                    .env(env_id)
                    .and_then(|env| env.module.clone())
                    .unwrap_or_default();
                self.put_symbol(
                    name,
                    file.position.repo.clone().unwrap_or_default(),
                    file.position.directory.clone().unwrap_or_default(),
                    module,
                    NodeRef {
                        file: FileId(fi),
                        node: id,
                    },
                );
            }

            let defis = tree.collect(tree.root(), &|n| {
                matches!(&n.data, NodeData::Macro(MacroData::Defi { .. }))
            });
            for id in defis {
                let Some(env_id) = tree.nearest_ancestor(
                    id,
                    &[
                        EnvKind::Module,
                        EnvKind::ModSig,
                        EnvKind::LangBinding,
                        EnvKind::ViewSig,
                        EnvKind::ViewBinding,
                    ],
                ) else {
                    continue;
                };
                let env = tree.env(env_id);
                if env.map(|e| e.kind) != Some(EnvKind::Module) {
                    // defis in language bindings only verbalize; they do
                    // not declare
                    continue;
                }
                let name = match &tree.node(id).data {
                    NodeData::Macro(MacroData::Defi { name, .. }) => name.clone(),
                    _ => continue,
                };
                let module = env.and_then(|e| e.module.clone()).unwrap_or_default();
                self.put_symbol(
                    name,
                    file.position.repo.clone().unwrap_or_default(),
                    file.position.directory.clone().unwrap_or_default(),
                    module,
                    NodeRef {
                        file: FileId(fi),
                        node: id,
                    },
                );
            }
        }
    }

    fn put_symbol(
        &mut self,
        name: String,
        repo: String,
        directory: String,
        module: String,
        declared: NodeRef,
    ) -> SymbolId {
        let mut found = None;
        if let Some(ids) = self.by_name.get(&name) {
            for &sid in ids {
                let s = &self.symbols[sid.0];
                if s.repo == repo && s.directory == directory && s.module == module {
                    found = Some(sid);
                    break;
                }
            }
        }
        if let Some(sid) = found {
            let s = &mut self.symbols[sid.0];
            if !s.declared.contains(&declared) {
                s.declared.push(declared);
            }
            return sid;
        }
        let sid = SymbolId(self.symbols.len());
        self.symbols.push(Symbol {
            name: name.clone(),
            repo,
            directory,
            module,
            declared: vec![declared],
            used: Vec::new(),
        });
        self.by_name.entry(name).or_default().push(sid);
        sid
    }

    // ── Pass 3 ───────────────────────────────────────────────────────

    fn index_declared(&self, files: &mut [SourceFile]) {
        for (i, symbol) in self.symbols.iter().enumerate() {
            let sid = SymbolId(i);
            for d in &symbol.declared {
                let declared = &mut files[d.file.0].declared_symbols;
                if !declared.contains(&sid) {
                    declared.push(sid);
                }
            }
        }
    }

    // ── Pass 4 ───────────────────────────────────────────────────────

    /// Link every language binding to the signature file obtained by
    /// stripping the trailing language suffix from its filename.
    fn link_bindings(&self, files: &mut [SourceFile], report: &mut Report) {
        for fi in 0..files.len() {
            if files[fi].kind != FileKind::LangBinding {
                continue;
            }
            let position = &files[fi].position;
            let mut linked = None;
            if let Some(filename) = &position.filename {
                if let Some((stem, lang)) = filename.rsplit_once('.') {
                    if is_lang(lang) {
                        let signature_position = Position {
                            repo: position.repo.clone(),
                            directory: position.directory.clone(),
                            filename: Some(stem.to_owned()),
                            offset: None,
                            path: None,
                        };
                        if let Some(sig) = self.find_file(&signature_position) {
                            if files[sig.0].kind == FileKind::Signature {
                                linked = Some(sig);
                            }
                        }
                    }
                }
            }
            match linked {
                Some(sig) => files[fi].signature = Some(sig),
                None => report.log(
                    Severity::Error,
                    DiagnosticKind::BindingLinkError,
                    "file appears to be a language binding, but there is no corresponding signature file",
                    Some(files[fi].position.clone()),
                ),
            }
        }
    }

    // ── Pass 5 ───────────────────────────────────────────────────────

    /// Resolve every defi/trefi to a symbol, record it in the symbol's
    /// using-set and back-link the resolution into the nodes. Resolutions
    /// are computed first and applied afterwards, so every node mutates
    /// exactly once.
    fn resolve_references(&mut self, files: &mut [SourceFile], report: &mut Report) {
        let mut resolutions: Vec<(NodeRef, SymbolId)> = Vec::new();
        let shared: &[SourceFile] = files;
        for fi in 0..shared.len() {
            let tree = &shared[fi].tree;
            let references = tree.collect(tree.root(), &|n| {
                matches!(
                    &n.data,
                    NodeData::Macro(MacroData::Defi { .. } | MacroData::Trefi { .. })
                )
            });
            for id in references {
                let node = tree.node(id);
                let resolved = match &node.data {
                    NodeData::Macro(MacroData::Trefi {
                        name, target_mod, ..
                    }) => self.resolve_trefi(shared, FileId(fi), name, target_mod),
                    NodeData::Macro(MacroData::Defi { name, .. }) => {
                        self.resolve_declaration(shared, FileId(fi), id, name, report)
                    }
                    _ => None,
                };
                match resolved {
                    Some(sid) => resolutions.push((
                        NodeRef {
                            file: FileId(fi),
                            node: id,
                        },
                        sid,
                    )),
                    None => report.log(
                        Severity::Error,
                        DiagnosticKind::UnresolvedReference,
                        format!("failed to link \"{}\" to a symbol", node.text),
                        Some(node.position.clone()),
                    ),
                }
            }
        }

        for (nref, sid) in &resolutions {
            let symbol = &mut self.symbols[sid.0];
            if !symbol.used.contains(nref) {
                symbol.used.push(*nref);
            }
        }

        for (i, symbol) in self.symbols.iter().enumerate() {
            for nref in symbol.declared.iter().chain(symbol.used.iter()) {
                if let NodeData::Macro(m) =
                    &mut files[nref.file.0].tree.node_mut(nref.node).data
                {
                    if let Some(slot) = m.symbol_slot() {
                        if slot.is_none() {
                            *slot = Some(SymbolId(i));
                        }
                    }
                }
            }
        }
    }

    /// Breadth-first search for a trefi target.
    ///
    /// At each dequeued file: check its own declared symbols; for a
    /// language binding additionally check the linked signature (one
    /// extra, non-enqueued check). Then check use-edge targets directly
    /// (one hop only -- use is not transitive), and enqueue import-edge
    /// targets (import is transitive).
    fn resolve_trefi(
        &self,
        files: &[SourceFile],
        start: FileId,
        name: &str,
        module: &str,
    ) -> Option<SymbolId> {
        if !self.by_name.contains_key(name) {
            return None;
        }
        let mut queue = VecDeque::new();
        let mut visited: HashSet<FileId> = HashSet::new();
        queue.push_back(start);
        visited.insert(start);

        while let Some(f) = queue.pop_front() {
            if let Some(sid) = self.declared_match(files, f, name, module) {
                return Some(sid);
            }
            if files[f.0].kind == FileKind::LangBinding {
                if let Some(sig) = files[f.0].signature {
                    if let Some(sid) = self.declared_match(files, sig, name, module) {
                        return Some(sid);
                    }
                }
            }
            let tree = &files[f.0].tree;
            let includes = tree.collect(tree.root(), &|n| {
                matches!(&n.data, NodeData::Macro(m) if m.is_use() || m.is_import())
            });
            for &id in &includes {
                let NodeData::Macro(m) = &tree.node(id).data else {
                    continue;
                };
                if !m.is_use() {
                    continue;
                }
                if let Some(target) = m.target().and_then(|t| t.file) {
                    if let Some(sid) = self.declared_match(files, target, name, module) {
                        return Some(sid);
                    }
                }
            }
            for &id in &includes {
                let NodeData::Macro(m) = &tree.node(id).data else {
                    continue;
                };
                if !m.is_import() {
                    continue;
                }
                if let Some(target) = m.target().and_then(|t| t.file) {
                    if visited.insert(target) {
                        queue.push_back(target);
                    }
                }
            }
        }
        None
    }

    fn declared_match(
        &self,
        files: &[SourceFile],
        file: FileId,
        name: &str,
        module: &str,
    ) -> Option<SymbolId> {
        files[file.0].declared_symbols.iter().copied().find(|sid| {
            let s = &self.symbols[sid.0];
            s.module == module && s.name == name
        })
    }

    /// Resolve a defi (or symi/symdef used as its own reference target)
    /// by walking to the nearest enclosing module-like environment and
    /// matching repo, module name and empty-or-equal directory.
    fn resolve_declaration(
        &self,
        files: &[SourceFile],
        file: FileId,
        node: NodeId,
        name: &str,
        report: &mut Report,
    ) -> Option<SymbolId> {
        let tree = &files[file.0].tree;
        let Some(env_id) = tree.nearest_ancestor(
            node,
            &[EnvKind::LangBinding, EnvKind::ModSig, EnvKind::Module],
        ) else {
            report.log(
                Severity::Error,
                DiagnosticKind::ParseError,
                "failed to find surrounding module",
                Some(tree.node(node).position.clone()),
            );
            return None;
        };
        let module = tree
            .env(env_id)
            .and_then(|env| env.module.clone())
            .unwrap_or_default();
        let repo = files[file.0].position.repo.clone().unwrap_or_default();
        let directory = files[file.0]
            .position
            .directory
            .clone()
            .unwrap_or_default();
        self.by_name.get(name)?.iter().copied().find(|sid| {
            let s = &self.symbols[sid.0];
            s.repo == repo
                && s.module == module
                && (s.directory.is_empty() || s.directory == directory)
        })
    }
}
