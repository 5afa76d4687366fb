//! stexmap-core: harvests a cross-referenced symbol model from sTeX
//! corpora.
//!
//! The pipeline, leaf-first:
//!
//! - [`grammar`] -- regex tokenizer over comment-stripped source text
//! - [`position`] / [`repo`] -- logical identities and path resolution
//!   across discovered repositories
//! - [`tree`] -- token stream to typed node tree (files, environments,
//!   macros) with parent back-references
//! - [`referencer`] -- five global passes resolving every reference
//!   macro to exactly one declared symbol
//! - [`coverage`] -- covered/uncovered import graph from a root document
//! - [`harvester`] -- batch driver tying the above together
//!
//! Everything runs single-threaded over an in-memory model; diagnostics
//! accumulate in a [`report::Report`] and never abort the batch.
//!
//! # Example
//!
//! ```ignore
//! use stexmap_core::{FileSystemProvider, Harvester, Report};
//!
//! let provider = FileSystemProvider;
//! let mut report = Report::new();
//! let mut harvester = Harvester::new(&provider, "/data/MathHub".as_ref(), &mut report)?;
//! harvester.load_all(None, &mut report);
//! harvester.compile(&mut report);
//! for symbol in harvester.referencer.symbols() {
//!     println!("{}/{}?{}", symbol.repo, symbol.module, symbol.name);
//! }
//! ```

pub mod coverage;
pub mod error;
pub mod grammar;
pub mod harvester;
pub mod position;
pub mod referencer;
pub mod repo;
pub mod report;
pub mod source;
pub mod tree;

// ── Convenience re-exports: key types ────────────────────────────────

pub use coverage::{build_graph, CoverageMode, CyclePolicy, Graph, GraphOptions};
pub use error::HarvestError;
pub use grammar::{EnvKind, Grammar, TokenKind};
pub use harvester::{Harvester, SourceFile};
pub use position::{LineIndex, Offset, Position};
pub use referencer::{Referencer, Symbol, SymbolId};
pub use repo::{infer_corpus_root, Corpus, Repository, CORPUS_ROOT_NAME};
pub use report::{Diagnostic, DiagnosticKind, Report, Severity};
pub use source::{FileSystemProvider, InMemoryProvider, SourceProvider};
pub use tree::{FileId, FileKind, FileTree, MacroData, NodeData, NodeId, NodeRef};
