//! Build error taxonomy.
//!
//! Recoverable problems (unresolved edge rows, filter removals) never show up
//! here; they are counted in the stage reports. Everything in this module
//! halts the build.

use biokg_graph::{EquivalenceTableError, InvalidIdentifierError, UnresolvedReferenceError};
use biokg_ingest_tabular::TabularError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Config,
    Ingest,
    EdgeList,
    Merge,
    Assemble,
    Prune,
    Closure,
    Filter,
    Serialize,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Config => "config",
            Stage::Ingest => "ingest",
            Stage::EdgeList => "edge_list",
            Stage::Merge => "merge",
            Stage::Assemble => "assemble",
            Stage::Prune => "prune",
            Stage::Closure => "closure",
            Stage::Filter => "filter",
            Stage::Serialize => "serialize",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("merge conflict on {}: {detail}", subject_ids.join(", "))]
pub struct MergeConflictError {
    /// Classes involved (cycle members for subclass cycles).
    pub subject_ids: Vec<String>,
    /// Human-readable rendering of the conflicting axioms/edges with sources.
    pub axioms: Vec<String>,
    pub detail: String,
}

#[derive(Debug, Error)]
pub enum ClosureError {
    #[error("reasoner `{reasoner}` failed (exit={code:?}): {stderr}")]
    ReasonerFailed {
        reasoner: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("failed to start reasoner `{reasoner}`: {source}")]
    Launch {
        reasoner: String,
        #[source]
        source: std::io::Error,
    },

    #[error("reasoner `{reasoner}` produced malformed output: {detail}")]
    MalformedOutput { reasoner: String, detail: String },

    #[error("closure work file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("reasoner `{reasoner}` did not finish within {}s", timeout.as_secs_f64())]
pub struct ClosureTimeoutError {
    pub reasoner: String,
    pub timeout: Duration,
}

/// Failure of one reasoner run: either it broke, or it ran out of time.
#[derive(Debug, Error)]
pub enum ClosureFailure {
    #[error(transparent)]
    Failed(#[from] ClosureError),
    #[error(transparent)]
    TimedOut(#[from] ClosureTimeoutError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("input file not found: {}", .0.display())]
    MissingFile(PathBuf),
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("ontology `{source_name}`: {error:#}")]
    Ontology {
        source_name: String,
        error: anyhow::Error,
    },

    #[error(transparent)]
    Tabular(#[from] TabularError),

    #[error(transparent)]
    Equivalence(#[from] EquivalenceTableError),

    #[error("`{source_name}`: {source}")]
    InvalidIdentifier {
        source_name: String,
        #[source]
        source: InvalidIdentifierError,
    },
}

/// A dangling reference met after `edges_assembled` edges were in place.
#[derive(Debug, Error)]
#[error("{source} (after {edges_assembled} assembled edges)")]
pub struct AssemblyError {
    pub edges_assembled: usize,
    #[source]
    pub source: UnresolvedReferenceError,
}

#[derive(Debug, Error)]
#[error("failed to write {}: {source}", path.display())]
pub struct OutputError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

impl OutputError {
    pub fn new(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self {
            path: path.into(),
            source,
        }
    }
}

#[derive(Debug, Error)]
pub enum StageErrorKind {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Unresolved(#[from] UnresolvedReferenceError),

    #[error(transparent)]
    MergeConflict(#[from] MergeConflictError),

    #[error(transparent)]
    Closure(#[from] ClosureError),

    #[error(transparent)]
    ClosureTimeout(#[from] ClosureTimeoutError),

    #[error(transparent)]
    Output(#[from] OutputError),
}

impl From<ClosureFailure> for StageErrorKind {
    fn from(value: ClosureFailure) -> Self {
        match value {
            ClosureFailure::Failed(e) => StageErrorKind::Closure(e),
            ClosureFailure::TimedOut(e) => StageErrorKind::ClosureTimeout(e),
        }
    }
}

/// A halted build: which stage, how far it got, and why.
#[derive(Debug, Error)]
#[error("stage `{stage}` failed after {processed} processed items: {kind}")]
pub struct PipelineError {
    pub stage: Stage,
    pub processed: usize,
    #[source]
    pub kind: StageErrorKind,
}

impl PipelineError {
    pub fn new(stage: Stage, processed: usize, kind: impl Into<StageErrorKind>) -> Self {
        Self {
            stage,
            processed,
            kind: kind.into(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.kind, StageErrorKind::ClosureTimeout(_))
    }
}
