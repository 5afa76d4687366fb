//! Diagnostics report -- severity-tagged entries with optional file
//! positions, accumulated across the whole batch and filtered by
//! verbosity at render time.
//!
//! Nothing in the pipeline aborts on a diagnostic; hard environmental
//! failures use [`crate::error::HarvestError`] instead.

use crate::position::Position;
use serde_json::Value;

/// Severity of a diagnostic, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Debug => "debug",
            Severity::Info => "info",
            Severity::Warn => "warn",
            Severity::Error => "error",
            Severity::Fatal => "fatal",
        }
    }
}

/// What kind of problem a diagnostic describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// Skipping something as expected (meta-inf directories, all.tex, ...)
    Skip,
    /// An unexpected fault while processing a single file or repository;
    /// the unit is skipped, the batch continues.
    UnexpectedFault,
    /// META-INF/MANIFEST.MF is absent.
    MissingManifest,
    /// META-INF/MANIFEST.MF is malformed (duplicate key, missing id).
    ManifestError,
    /// Tokenizer/tree-builder level problem (mismatched environment,
    /// arity mismatch, deprecated macro form, ...).
    ParseError,
    /// Two files map to the same logical (repo, directory, name) key.
    DuplicateDeclaration,
    /// A defi/trefi could not be linked to any symbol.
    UnresolvedReference,
    /// A language binding without a matching signature file.
    BindingLinkError,
    /// A referenced file does not exist in the corpus.
    MissingFile,
    /// A document-inclusion cycle, fatal to the affected traversal branch.
    CycleError,
}

impl DiagnosticKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticKind::Skip => "skip",
            DiagnosticKind::UnexpectedFault => "unexpected-fault",
            DiagnosticKind::MissingManifest => "missing-manifest",
            DiagnosticKind::ManifestError => "manifest-error",
            DiagnosticKind::ParseError => "parse-error",
            DiagnosticKind::DuplicateDeclaration => "duplicate-declaration",
            DiagnosticKind::UnresolvedReference => "unresolved-reference",
            DiagnosticKind::BindingLinkError => "binding-link-error",
            DiagnosticKind::MissingFile => "missing-file",
            DiagnosticKind::CycleError => "cycle-error",
        }
    }
}

/// A single accumulated diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: DiagnosticKind,
    pub message: String,
    pub position: Option<Position>,
}

impl Diagnostic {
    pub fn to_json_value(&self) -> Value {
        serde_json::json!({
            "severity": self.severity.as_str(),
            "kind": self.kind.as_str(),
            "message": self.message,
            "position": self.position.as_ref().map(|p| p.display(false)),
        })
    }
}

/// Accumulates diagnostics for one batch run.
///
/// Entries are kept unconditionally; verbosity only controls rendering,
/// so tests and downstream consumers can inspect everything that happened.
#[derive(Debug, Default)]
pub struct Report {
    entries: Vec<Diagnostic>,
}

/// Minimum severity rendered for a CLI verbosity level (0..=4).
pub fn min_severity(verbosity: u8) -> Severity {
    match verbosity {
        0 => Severity::Fatal,
        1 => Severity::Error,
        2 => Severity::Warn,
        3 => Severity::Info,
        _ => Severity::Debug,
    }
}

impl Report {
    pub fn new() -> Self {
        Report {
            entries: Vec::new(),
        }
    }

    pub fn log(
        &mut self,
        severity: Severity,
        kind: DiagnosticKind,
        message: impl Into<String>,
        position: Option<Position>,
    ) {
        self.entries.push(Diagnostic {
            severity,
            kind,
            message: message.into(),
            position,
        });
    }

    /// Debug-severity entry for something skipped on purpose.
    pub fn skip(&mut self, message: impl Into<String>, position: Option<Position>) {
        self.log(Severity::Debug, DiagnosticKind::Skip, message, position);
    }

    /// Fatal-severity entry for an unexpected fault; the offending unit is
    /// skipped and the batch continues.
    pub fn fatal(&mut self, message: impl Into<String>, position: Option<Position>) {
        self.log(
            Severity::Fatal,
            DiagnosticKind::UnexpectedFault,
            message,
            position,
        );
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn count_kind(&self, kind: DiagnosticKind) -> usize {
        self.entries.iter().filter(|e| e.kind == kind).count()
    }

    pub fn has_severity(&self, severity: Severity) -> bool {
        self.entries.iter().any(|e| e.severity >= severity)
    }

    /// Render entries at or above the severity implied by `verbosity`,
    /// one line each, in accumulation order.
    pub fn render(&self, verbosity: u8) -> Vec<String> {
        let min = min_severity(verbosity);
        self.entries
            .iter()
            .filter(|e| e.severity >= min)
            .map(|e| match &e.position {
                Some(p) => format!("[{}] {}: {}", e.severity.as_str(), p.display(false), e.message),
                None => format!("[{}] {}", e.severity.as_str(), e.message),
            })
            .collect()
    }

    pub fn to_json_value(&self, verbosity: u8) -> Value {
        let min = min_severity(verbosity);
        Value::Array(
            self.entries
                .iter()
                .filter(|e| e.severity >= min)
                .map(Diagnostic::to_json_value)
                .collect(),
        )
    }
}
