use std::path::PathBuf;

/// Hard environmental failures that prevent an operation from proceeding
/// at all. Per-construct problems are diagnostics (see [`crate::report`])
/// and never abort the batch.
#[derive(Debug, thiserror::Error)]
pub enum HarvestError {
    /// A file or directory could not be read.
    #[error("cannot read '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The corpus root does not exist or is not a directory.
    #[error("corpus root '{0}' is not a directory")]
    CorpusRoot(PathBuf),

    /// A path does not fall under any discovered repository root.
    #[error("no known repository contains '{0}'")]
    OutsideCorpus(PathBuf),

    /// A path resolves inside a repository's source tree but has no
    /// filename component.
    #[error("cannot determine filename in '{0}'")]
    MissingFilename(PathBuf),

    /// No parent directory with the corpus root name was found.
    #[error("failed to infer corpus root from '{0}': no parent directory named '{1}'")]
    RootNotFound(PathBuf, &'static str),
}
