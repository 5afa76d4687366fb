//! Typed node trees for parsed files.
//!
//! Each file parses into a [`FileTree`]: an arena of nodes addressed by
//! index, with parent back-references and ordered child lists. The closed
//! [`NodeData`] variant set makes unhandled node kinds a compile-time
//! concern, and index-based links keep ancestor search cheap without
//! reference counting.

use std::path::PathBuf;

use serde::Serialize;

use crate::grammar::{EnvKind, Grammar, Payload, Token, TokenKind};
use crate::position::{LineIndex, Position};
use crate::referencer::SymbolId;
use crate::repo::Corpus;
use crate::report::{DiagnosticKind, Report, Severity};

/// Index of a node within its file's tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct NodeId(pub usize);

/// Index of a file within the harvested file list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct FileId(pub usize);

/// Global address of a node: file plus node index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct NodeRef {
    pub file: FileId,
    pub node: NodeId,
}

/// Data of an environment node.
#[derive(Debug, Clone)]
pub struct EnvData {
    pub kind: EnvKind,
    /// Module name: the `id` parameter for modules, the name argument for
    /// signatures and bindings, the `id` parameter for omgroups.
    pub module: Option<String>,
    /// Language of a binding; the mono marker for modules.
    pub lang: Option<String>,
    /// Omgroup title argument.
    pub title: Option<String>,
    pub blind: bool,
}

/// Marker language value for monolingual modules.
pub const LANG_MONO: &str = "mono";

/// Declared target of an include-like macro, resolved to an actual file
/// by the referencer's first pass.
#[derive(Debug, Clone)]
pub struct TargetRef {
    pub position: Position,
    pub file: Option<FileId>,
}

/// Data of a macro (leaf) node.
#[derive(Debug, Clone)]
pub enum MacroData {
    /// Verbalization, declaring a symbol when directly inside a module.
    Defi {
        name: String,
        display: String,
        lang: Option<String>,
        symbol: Option<SymbolId>,
    },
    /// Reference to a symbol in a target module.
    Trefi {
        name: String,
        display: String,
        target_mod: String,
        drefi: bool,
        symbol: Option<SymbolId>,
    },
    /// Symbol declaration inside a signature.
    Symi {
        name: String,
        symbol: Option<SymbolId>,
    },
    /// Symbol declaration with notation definition.
    Symdef {
        name: String,
        symbol: Option<SymbolId>,
    },
    /// Transitive module import.
    ImportModule { target: TargetRef },
    /// Non-transitive module use.
    UseModule { target: TargetRef },
    /// Transitive repository-level import.
    GImport { target: TargetRef },
    /// Non-transitive repository-level use.
    GUse { target: TargetRef },
    /// Document inclusion.
    InputRef { target: TargetRef },
    /// Coverage truncation sentinel.
    CoverageMarker,
}

impl MacroData {
    /// Target of an include-like macro, if this is one.
    pub fn target(&self) -> Option<&TargetRef> {
        match self {
            MacroData::ImportModule { target }
            | MacroData::UseModule { target }
            | MacroData::GImport { target }
            | MacroData::GUse { target }
            | MacroData::InputRef { target } => Some(target),
            _ => None,
        }
    }

    pub fn target_mut(&mut self) -> Option<&mut TargetRef> {
        match self {
            MacroData::ImportModule { target }
            | MacroData::UseModule { target }
            | MacroData::GImport { target }
            | MacroData::GUse { target }
            | MacroData::InputRef { target } => Some(target),
            _ => None,
        }
    }

    /// Import edges propagate transitively; use edges do not.
    pub fn is_import(&self) -> bool {
        matches!(
            self,
            MacroData::ImportModule { .. } | MacroData::GImport { .. }
        )
    }

    pub fn is_use(&self) -> bool {
        matches!(self, MacroData::UseModule { .. } | MacroData::GUse { .. })
    }

    /// The resolution back-link slot for declaring/referencing macros.
    pub fn symbol_slot(&mut self) -> Option<&mut Option<SymbolId>> {
        match self {
            MacroData::Defi { symbol, .. }
            | MacroData::Trefi { symbol, .. }
            | MacroData::Symi { symbol, .. }
            | MacroData::Symdef { symbol, .. } => Some(symbol),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum NodeData {
    /// The file root; owns the top-level children.
    File,
    Env(EnvData),
    Macro(MacroData),
}

#[derive(Debug, Clone)]
pub struct Node {
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub position: Position,
    /// Raw matched text of the begin token or macro; empty for the root.
    pub text: String,
    pub data: NodeData,
}

/// Arena of nodes for one parsed file. The root (index 0) is the File
/// node; children are appended exactly once, during the single top-down
/// parse, so the tree is acyclic by construction.
#[derive(Debug)]
pub struct FileTree {
    nodes: Vec<Node>,
}

impl FileTree {
    pub fn new(file_position: &Position) -> Self {
        FileTree {
            nodes: vec![Node {
                parent: None,
                children: Vec::new(),
                position: file_position.clone(),
                text: String::new(),
                data: NodeData::File,
            }],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn alloc(&mut self, parent: NodeId, position: Position, text: String, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            parent: Some(parent),
            children: Vec::new(),
            position,
            text,
            data,
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    /// Nearest ancestor (including `from` itself) that is an environment
    /// of one of the requested kinds.
    pub fn nearest_ancestor(&self, from: NodeId, kinds: &[EnvKind]) -> Option<NodeId> {
        let mut current = Some(from);
        while let Some(id) = current {
            if let NodeData::Env(env) = &self.node(id).data {
                if kinds.contains(&env.kind) {
                    return Some(id);
                }
            }
            current = self.node(id).parent;
        }
        None
    }

    /// Environment data of a node, if it is an environment.
    pub fn env(&self, id: NodeId) -> Option<&EnvData> {
        match &self.node(id).data {
            NodeData::Env(env) => Some(env),
            _ => None,
        }
    }

    /// Collect descendants matching `pred`, in document order. A matching
    /// node is returned without descending into it, so nested matches are
    /// reported at their outermost level only.
    pub fn collect(&self, from: NodeId, pred: &dyn Fn(&Node) -> bool) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.collect_into(from, pred, &mut out);
        out
    }

    fn collect_into(&self, id: NodeId, pred: &dyn Fn(&Node) -> bool, out: &mut Vec<NodeId>) {
        let node = self.node(id);
        if pred(node) {
            out.push(id);
            return;
        }
        for &child in &node.children {
            self.collect_into(child, pred, out);
        }
    }
}

/// What a file is, judged by its single top-level environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Module,
    Signature,
    LangBinding,
    ViewSignature,
    ViewBinding,
    /// No relevant macro content at all.
    Empty,
    /// Anything else (plain text documents, multiple top-level
    /// environments, outline files).
    Unknown,
}

pub fn file_kind(tree: &FileTree) -> FileKind {
    let root_children = &tree.node(tree.root()).children;
    if root_children.is_empty() {
        return FileKind::Empty;
    }
    if root_children.len() == 1 {
        if let NodeData::Env(env) = &tree.node(root_children[0]).data {
            return match env.kind {
                EnvKind::Module => FileKind::Module,
                EnvKind::ModSig => FileKind::Signature,
                EnvKind::LangBinding => FileKind::LangBinding,
                EnvKind::ViewSig => FileKind::ViewSignature,
                EnvKind::ViewBinding => FileKind::ViewBinding,
                EnvKind::OmGroup => FileKind::Unknown,
            };
        }
    }
    FileKind::Unknown
}

/// First character uppercased, the rest lowercased.
fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        None => String::new(),
    }
}

/// Build the typed tree for one file from its token stream.
pub fn build(
    grammar: &Grammar,
    tokens: &[Token],
    corpus: &Corpus,
    file_position: &Position,
    lines: &LineIndex,
    report: &mut Report,
) -> FileTree {
    let mut builder = Builder {
        grammar,
        corpus,
        file_position,
        lines,
        report,
        tree: FileTree::new(file_position),
    };
    let root = builder.tree.root();
    let mut i = 0;
    builder.parse_children(root, tokens, &mut i, None);
    builder.tree
}

/// Control value returned up the recursive descent.
enum Flow {
    /// The matching end token was consumed (or the top level finished).
    Done,
    /// An unexpected end token aborted the current subtree; propagates so
    /// no further children are parsed on this path.
    Abort,
    /// The stream ran out inside an open environment; already reported at
    /// the innermost level, propagates silently.
    Eof,
}

struct Builder<'a> {
    grammar: &'a Grammar,
    corpus: &'a Corpus,
    file_position: &'a Position,
    lines: &'a LineIndex,
    report: &'a mut Report,
    tree: FileTree,
}

impl<'a> Builder<'a> {
    fn pos_at(&self, index: usize) -> Position {
        self.file_position.with_offset(self.lines.offset_at(index))
    }

    fn parse_children(
        &mut self,
        parent: NodeId,
        tokens: &[Token],
        i: &mut usize,
        closing: Option<(usize, EnvKind, bool)>,
    ) -> Flow {
        while *i < tokens.len() {
            let tok = &tokens[*i];
            *i += 1;
            match tok.kind {
                TokenKind::EnvEnd(kind) => {
                    let blind = matches!(tok.payload, Payload::End { blind: true });
                    if let Some((_, open_kind, open_blind)) = closing {
                        if open_kind == kind && open_blind == blind {
                            return Flow::Done;
                        }
                    }
                    let position = self.pos_at(tok.start);
                    self.report.log(
                        Severity::Error,
                        DiagnosticKind::ParseError,
                        format!("unexpected environment end: {}", tok.text),
                        Some(position),
                    );
                    return Flow::Abort;
                }
                TokenKind::EnvBegin(kind) => {
                    let begin_idx = *i - 1;
                    let blind = matches!(tok.payload, Payload::Env { blind: true, .. });
                    let child = self.env_node(parent, kind, tok);
                    match self.parse_children(child, tokens, i, Some((begin_idx, kind, blind))) {
                        Flow::Done => {}
                        other => return other,
                    }
                }
                _ => self.macro_node(parent, tok),
            }
        }
        if let Some((begin_idx, _, _)) = closing {
            let begin = &tokens[begin_idx];
            let position = self.pos_at(begin.start);
            self.report.log(
                Severity::Error,
                DiagnosticKind::ParseError,
                format!("environment started but not closed: {}", begin.text),
                Some(position),
            );
            return Flow::Eof;
        }
        Flow::Done
    }

    fn env_node(&mut self, parent: NodeId, kind: EnvKind, tok: &Token) -> NodeId {
        let position = self.pos_at(tok.start);
        let (name, lang, params, title, blind) = match &tok.payload {
            Payload::Env {
                name,
                lang,
                params,
                title,
                blind,
            } => (
                name.clone(),
                lang.clone(),
                params.clone(),
                title.clone(),
                *blind,
            ),
            _ => (None, None, None, None, false),
        };
        let data = match kind {
            EnvKind::Module => {
                let params = self.grammar.params(params.as_deref());
                let module = match params.get("id") {
                    Some(id) => Some(id.to_owned()),
                    None => {
                        self.report.log(
                            Severity::Error,
                            DiagnosticKind::ParseError,
                            "module doesn't have \"id\" parameter",
                            Some(position.clone()),
                        );
                        self.file_position.filename.clone()
                    }
                };
                EnvData {
                    kind,
                    module,
                    lang: Some(LANG_MONO.to_owned()),
                    title: None,
                    blind: false,
                }
            }
            EnvKind::ModSig | EnvKind::ViewSig => EnvData {
                kind,
                module: name,
                lang: None,
                title: None,
                blind: false,
            },
            EnvKind::LangBinding | EnvKind::ViewBinding => EnvData {
                kind,
                module: name,
                lang,
                title: None,
                blind: false,
            },
            EnvKind::OmGroup => {
                let params = self.grammar.params(params.as_deref());
                EnvData {
                    kind,
                    module: params.get("id").map(str::to_owned),
                    lang: None,
                    title,
                    blind,
                }
            }
        };
        self.tree
            .alloc(parent, position, tok.text.clone(), NodeData::Env(data))
    }

    fn macro_node(&mut self, parent: NodeId, tok: &Token) {
        let position = self.pos_at(tok.start);
        let data = match tok.kind {
            TokenKind::Defi => self.defi_data(parent, tok, &position),
            TokenKind::Trefi => self.trefi_data(parent, tok, &position),
            TokenKind::Symi => self.symi_data(tok, &position),
            TokenKind::Symdef => self.symdef_data(tok),
            TokenKind::ImportModule => MacroData::ImportModule {
                target: self.module_target(tok, &position),
            },
            TokenKind::UseModule => MacroData::UseModule {
                target: self.module_target(tok, &position),
            },
            TokenKind::GImport => MacroData::GImport {
                target: self.repo_target(tok),
            },
            TokenKind::GUse => MacroData::GUse {
                target: self.repo_target(tok),
            },
            TokenKind::InputRef => MacroData::InputRef {
                target: self.input_target(tok),
            },
            TokenKind::CoverageMarker => MacroData::CoverageMarker,
            TokenKind::EnvBegin(_) | TokenKind::EnvEnd(_) => {
                unreachable!("environment tokens are handled by the parser loop")
            }
        };
        self.tree
            .alloc(parent, position, tok.text.clone(), NodeData::Macro(data));
    }

    /// Positional arguments of a defi/trefi/symi token, with the leading
    /// display argument split off for `a...` forms and the arity checked
    /// against the macro suffix.
    fn ref_args(&mut self, tok: &Token, position: &Position) -> (Vec<String>, Option<String>) {
        let (arity, mut args, has_lead) = match &tok.payload {
            Payload::RefMacro {
                prefix,
                arity,
                args,
                ..
            } => (*arity, args.clone(), prefix.starts_with('a')),
            Payload::SymMacro { arity, args, .. } => (*arity, args.clone(), false),
            _ => (0, Vec::new(), false),
        };
        let mut lead = None;
        if has_lead && !args.is_empty() {
            lead = Some(args.remove(0));
        }
        let one_plus = if has_lead { "1+" } else { "" };
        if args.len() != arity {
            self.report.log(
                Severity::Error,
                DiagnosticKind::ParseError,
                format!(
                    "arity mismatch (needs {}{} arguments, but found {}{}): '{}'",
                    one_plus,
                    arity,
                    one_plus,
                    args.len(),
                    tok.text
                ),
                Some(position.clone()),
            );
        }
        (args, lead)
    }

    fn defi_data(&mut self, parent: NodeId, tok: &Token, position: &Position) -> MacroData {
        let (prefix, plural, raw_params) = match &tok.payload {
            Payload::RefMacro {
                prefix,
                plural,
                params,
                ..
            } => (prefix.clone(), *plural, params.clone()),
            _ => (String::new(), false, None),
        };
        let (args, lead) = self.ref_args(tok, position);
        let params = self.grammar.params(raw_params.as_deref());
        let name = params
            .get("name")
            .map(str::to_owned)
            .unwrap_or_else(|| args.join("-"));
        let mut display = lead.unwrap_or_else(|| args.join(" "));
        if prefix.starts_with('D') {
            display = capitalize(&display);
        }
        if plural {
            display.push('s');
        }
        let lang = self
            .tree
            .nearest_ancestor(
                parent,
                &[EnvKind::LangBinding, EnvKind::Module, EnvKind::ViewBinding],
            )
            .and_then(|id| self.tree.env(id))
            .and_then(|env| env.lang.clone());
        MacroData::Defi {
            name,
            display,
            lang,
            symbol: None,
        }
    }

    fn trefi_data(&mut self, parent: NodeId, tok: &Token, position: &Position) -> MacroData {
        let (prefix, plural, raw_params) = match &tok.payload {
            Payload::RefMacro {
                prefix,
                plural,
                params,
                ..
            } => (prefix.clone(), *plural, params.clone()),
            _ => (String::new(), false, None),
        };
        let (args, lead) = self.ref_args(tok, position);

        let mut display = if prefix.starts_with('a') {
            self.report.log(
                Severity::Error,
                DiagnosticKind::ParseError,
                "use of atrefi is deprecated (and may result in errors)",
                Some(position.clone()),
            );
            lead.unwrap_or_default()
        } else {
            args.join(" ")
        };
        if !prefix.is_empty() && prefix.chars().all(char::is_uppercase) {
            display = capitalize(&display);
        }
        if plural {
            display.push('s');
        }
        let drefi = prefix
            .chars()
            .next()
            .is_some_and(|c| c.to_ascii_lowercase() == 'd');

        let mut name = args.join("-");
        let mut target_mod = None;
        if let Some(p) = raw_params.as_deref().filter(|p| !p.is_empty()) {
            if let Some((module, symbol_name)) = p.split_once('?') {
                target_mod = Some(module.to_owned());
                name = symbol_name.to_owned();
                let first = prefix.chars().next().map(|c| c.to_ascii_lowercase());
                if !matches!(first, Some('m') | Some('d')) {
                    self.report.log(
                        Severity::Error,
                        DiagnosticKind::ParseError,
                        format!("expected trefi or drefi for \"{}\"", tok.text),
                        Some(position.clone()),
                    );
                }
            } else {
                target_mod = Some(p.to_owned());
            }
        }
        // default target is the enclosing module, falling back to the
        // filename
        let target_mod = target_mod.unwrap_or_else(|| {
            self.tree
                .nearest_ancestor(parent, &[EnvKind::Module, EnvKind::LangBinding])
                .and_then(|id| self.tree.env(id))
                .and_then(|env| env.module.clone())
                .or_else(|| self.file_position.filename.clone())
                .unwrap_or_default()
        });
        MacroData::Trefi {
            name,
            display,
            target_mod,
            drefi,
            symbol: None,
        }
    }

    fn symi_data(&mut self, tok: &Token, position: &Position) -> MacroData {
        let (args, _) = self.ref_args(tok, position);
        MacroData::Symi {
            name: args.join("-"),
            symbol: None,
        }
    }

    fn symdef_data(&mut self, tok: &Token) -> MacroData {
        let (raw_params, arg) = match &tok.payload {
            Payload::TargetMacro { params, arg } => (params.clone(), arg.clone()),
            _ => (None, String::new()),
        };
        let params = self.grammar.params(raw_params.as_deref());
        let name = params
            .get("name")
            .map(str::to_owned)
            .unwrap_or(arg);
        MacroData::Symdef { name, symbol: None }
    }

    /// Target of `\importmhmodule` / `\usemhmodule`: repository from the
    /// `mhrepos` parameter (deprecated spelling `repos`), directory from
    /// `dir`, module name from the argument.
    fn module_target(&mut self, tok: &Token, position: &Position) -> TargetRef {
        let (raw_params, arg) = match &tok.payload {
            Payload::TargetMacro { params, arg } => (params.clone(), arg.clone()),
            _ => (None, String::new()),
        };
        let params = self.grammar.params(raw_params.as_deref());
        let mut repo_id = self.file_position.repo.clone();
        if let Some(r) = params.get("repos") {
            self.report.log(
                Severity::Warn,
                DiagnosticKind::ParseError,
                "\"repos\" is deprecated - use \"mhrepos\" instead",
                Some(position.clone()),
            );
            repo_id = Some(r.to_owned());
        }
        if let Some(r) = params.get("mhrepos") {
            repo_id = Some(r.to_owned());
        }
        let directory = params.get("dir").map(str::to_owned);
        let repo = repo_id.as_deref().and_then(|r| self.corpus.find_repo(r));
        if repo.is_none() {
            self.report.log(
                Severity::Error,
                DiagnosticKind::ParseError,
                format!(
                    "failed to find repo \"{}\" for \"{}\"",
                    repo_id.as_deref().unwrap_or(""),
                    tok.text
                ),
                Some(position.clone()),
            );
        }
        let path: Option<PathBuf> = match (repo, params.get("path")) {
            (Some(r), Some(p)) => Some(
                r.root
                    .join("source")
                    .join(p)
                    .join(format!("{}.tex", arg)),
            ),
            _ => None,
        };
        TargetRef {
            position: Position {
                repo: repo.map(|r| r.id.clone()),
                directory,
                filename: Some(arg),
                offset: None,
                path,
            },
            file: None,
        }
    }

    /// Target of `\gimport` / `\guse`: the optional bracket parameter is
    /// the repository id, the argument the module name.
    fn repo_target(&mut self, tok: &Token) -> TargetRef {
        let (raw_params, arg) = match &tok.payload {
            Payload::TargetMacro { params, arg } => (params.clone(), arg.clone()),
            _ => (None, String::new()),
        };
        let repo = raw_params
            .filter(|p| !p.is_empty())
            .or_else(|| self.file_position.repo.clone());
        TargetRef {
            position: Position {
                repo,
                directory: None,
                filename: Some(arg),
                offset: None,
                path: None,
            },
            file: None,
        }
    }

    /// Target of `\mhinputref` / `\input`: the argument may carry a
    /// directory prefix.
    fn input_target(&mut self, tok: &Token) -> TargetRef {
        let (raw_params, arg) = match &tok.payload {
            Payload::TargetMacro { params, arg } => (params.clone(), arg.clone()),
            _ => (None, String::new()),
        };
        let repo = raw_params
            .filter(|p| !p.is_empty())
            .or_else(|| self.file_position.repo.clone());
        let mut parts: Vec<&str> = arg.split('/').collect();
        let filename = parts.pop().unwrap_or_default().to_owned();
        let directory = (!parts.is_empty()).then(|| parts.join("/"));
        TargetRef {
            position: Position {
                repo,
                directory,
                filename: Some(filename),
                offset: None,
                path: None,
            },
            file: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_str(src: &str) -> (FileTree, Report) {
        let grammar = Grammar::new();
        let corpus = Corpus {
            root: "/mh".into(),
            repos: Vec::new(),
        };
        let file_position = Position {
            repo: Some("r".into()),
            directory: None,
            filename: Some("f".into()),
            offset: None,
            path: None,
        };
        let stripped = grammar.strip_comments(src);
        let lines = LineIndex::new(&stripped);
        let tokens = grammar.tokenize(&stripped);
        let mut report = Report::new();
        let tree = build(
            &grammar,
            &tokens,
            &corpus,
            &file_position,
            &lines,
            &mut report,
        );
        (tree, report)
    }

    fn parse_errors(report: &Report) -> usize {
        report.count_kind(DiagnosticKind::ParseError)
    }

    #[test]
    fn nested_environment_with_children() {
        let (tree, report) = build_str("\\begin{modsig}{sig}\\symi{foo}\\symi{bar}\\end{modsig}");
        assert_eq!(parse_errors(&report), 0);
        let root_children = &tree.node(tree.root()).children;
        assert_eq!(root_children.len(), 1);
        let sig = root_children[0];
        assert_eq!(tree.env(sig).unwrap().kind, EnvKind::ModSig);
        assert_eq!(tree.env(sig).unwrap().module.as_deref(), Some("sig"));
        assert_eq!(tree.node(sig).children.len(), 2);
        assert_eq!(file_kind(&tree), FileKind::Signature);
    }

    #[test]
    fn unexpected_end_aborts_subtree() {
        let (tree, report) = build_str("\\symi{a}\\end{modsig}\\symi{b}");
        assert_eq!(parse_errors(&report), 1);
        // the symi before the stray end is kept, nothing after it is
        assert_eq!(tree.node(tree.root()).children.len(), 1);
    }

    #[test]
    fn unterminated_environment_reports_once() {
        let (tree, report) = build_str("\\begin{modsig}{sig}\\symi{a}");
        assert_eq!(parse_errors(&report), 1);
        let sig = tree.node(tree.root()).children[0];
        assert_eq!(tree.node(sig).children.len(), 1);
    }

    #[test]
    fn end_tokens_match_by_value() {
        // \end{module} cannot close a modsig
        let (_, report) = build_str("\\begin{modsig}{sig}\\end{module}");
        assert!(parse_errors(&report) >= 1);
    }

    #[test]
    fn module_without_id_parameter_is_an_error() {
        let (tree, report) = build_str("\\begin{module}\\end{module}");
        assert_eq!(parse_errors(&report), 1);
        let module = tree.node(tree.root()).children[0];
        // falls back to the filename
        assert_eq!(tree.env(module).unwrap().module.as_deref(), Some("f"));
        let (tree, report) = build_str("\\begin{module}[id=doc]\\end{module}");
        assert_eq!(parse_errors(&report), 0);
        let module = tree.node(tree.root()).children[0];
        assert_eq!(tree.env(module).unwrap().module.as_deref(), Some("doc"));
    }

    #[test]
    fn defi_name_and_display() {
        let (tree, _) = build_str(
            "\\begin{mhmodnl}{sig}{en}\\defii{natural}{number}\\end{mhmodnl}",
        );
        let binding = tree.node(tree.root()).children[0];
        let defi = tree.node(binding).children[0];
        match &tree.node(defi).data {
            NodeData::Macro(MacroData::Defi {
                name,
                display,
                lang,
                ..
            }) => {
                assert_eq!(name, "natural-number");
                assert_eq!(display, "natural number");
                assert_eq!(lang.as_deref(), Some("en"));
            }
            other => panic!("expected Defi, got {:?}", other),
        }
    }

    #[test]
    fn defi_name_parameter_overrides_args() {
        let (tree, _) = build_str(
            "\\begin{module}[id=doc]\\Defis[name=nat]{natural}\\end{module}",
        );
        let module = tree.node(tree.root()).children[0];
        let defi = tree.node(module).children[0];
        match &tree.node(defi).data {
            NodeData::Macro(MacroData::Defi { name, display, lang, .. }) => {
                assert_eq!(name, "nat");
                assert_eq!(display, "Naturals");
                assert_eq!(lang.as_deref(), Some(LANG_MONO));
            }
            other => panic!("expected Defi, got {:?}", other),
        }
    }

    #[test]
    fn trefi_target_module_from_parameter() {
        let (tree, report) = build_str(
            "\\begin{module}[id=doc]\\mtrefi[sig?foo]{foo}\\end{module}",
        );
        assert_eq!(parse_errors(&report), 0);
        let module = tree.node(tree.root()).children[0];
        let trefi = tree.node(module).children[0];
        match &tree.node(trefi).data {
            NodeData::Macro(MacroData::Trefi {
                name, target_mod, ..
            }) => {
                assert_eq!(name, "foo");
                assert_eq!(target_mod, "sig");
            }
            other => panic!("expected Trefi, got {:?}", other),
        }
    }

    #[test]
    fn plain_trefi_with_module_parameter_is_flagged() {
        // a '?' target requires the mtrefi/drefi forms
        let (_, report) = build_str(
            "\\begin{module}[id=doc]\\trefi[sig?foo]{foo}\\end{module}",
        );
        assert_eq!(parse_errors(&report), 1);
    }

    #[test]
    fn trefi_defaults_to_enclosing_module() {
        let (tree, _) = build_str(
            "\\begin{module}[id=doc]\\trefi{foo}\\end{module}",
        );
        let module = tree.node(tree.root()).children[0];
        let trefi = tree.node(module).children[0];
        match &tree.node(trefi).data {
            NodeData::Macro(MacroData::Trefi { target_mod, .. }) => {
                assert_eq!(target_mod, "doc");
            }
            other => panic!("expected Trefi, got {:?}", other),
        }
    }

    #[test]
    fn arity_mismatch_is_reported() {
        let (_, report) = build_str("\\begin{module}[id=doc]\\defii{one}\\end{module}");
        assert!(parse_errors(&report) >= 1);
    }

    #[test]
    fn gimport_defaults_to_current_repo() {
        let (tree, _) = build_str("\\begin{modsig}{s}\\gimport{other}\\end{modsig}");
        let sig = tree.node(tree.root()).children[0];
        let imp = tree.node(sig).children[0];
        match &tree.node(imp).data {
            NodeData::Macro(MacroData::GImport { target }) => {
                assert_eq!(target.position.repo.as_deref(), Some("r"));
                assert_eq!(target.position.filename.as_deref(), Some("other"));
            }
            other => panic!("expected GImport, got {:?}", other),
        }
    }

    #[test]
    fn inputref_splits_directory() {
        let (tree, _) = build_str("\\mhinputref[other/repo]{course/notes}");
        let node = tree.node(tree.root()).children[0];
        match &tree.node(node).data {
            NodeData::Macro(MacroData::InputRef { target }) => {
                assert_eq!(target.position.repo.as_deref(), Some("other/repo"));
                assert_eq!(target.position.directory.as_deref(), Some("course"));
                assert_eq!(target.position.filename.as_deref(), Some("notes"));
            }
            other => panic!("expected InputRef, got {:?}", other),
        }
    }

    #[test]
    fn ancestor_search_finds_enclosing_kinds() {
        let (tree, _) = build_str(
            "\\begin{modsig}{sig}\\symi{foo}\\end{modsig}",
        );
        let sig = tree.node(tree.root()).children[0];
        let symi = tree.node(sig).children[0];
        assert_eq!(
            tree.nearest_ancestor(symi, &[EnvKind::ModSig, EnvKind::Module]),
            Some(sig)
        );
        assert_eq!(tree.nearest_ancestor(symi, &[EnvKind::Module]), None);
    }

    #[test]
    fn collect_stops_at_matches() {
        let (tree, _) = build_str(
            "\\begin{omgroup}{Outer}\\begin{omgroup}{Inner}\\input{x}\\end{omgroup}\\end{omgroup}",
        );
        let outer = tree.node(tree.root()).children[0];
        // collecting omgroups from the root returns only the outer one
        let pred = |n: &Node| matches!(&n.data, NodeData::Env(e) if e.kind == EnvKind::OmGroup);
        let found = tree.collect(tree.root(), &pred);
        assert_eq!(found, vec![outer]);
    }
}
