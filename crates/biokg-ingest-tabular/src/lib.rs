//! Tabular sources for biokg.
//!
//! Data preparation hands the pipeline delimiter-separated files:
//!
//! - node tables (`identifier<TAB>kind[<TAB>label]`) that seed the registry,
//! - relation lookup tables (`label<TAB>iri`, `iri<TAB>inverse_iri`),
//! - edge sources (subject/predicate/object rows) that become class–instance
//!   and instance–instance edges.
//!
//! Nothing here creates identifiers for edge endpoints: edge rows are only
//! resolved against the registry, and rows that do not resolve are counted
//! in a [`RejectionReport`].

pub mod classifier;
pub mod edges;
pub mod nodes;
pub mod table;

use std::path::PathBuf;
use thiserror::Error;

pub use classifier::RelationClassifier;
pub use edges::{EdgeBatch, EdgeListBuilder, EdgeSourceSpec, OnUnresolved, RejectionReport};
pub use nodes::{register_node_table, register_node_table_file, NodeTableReport, NodeTableSpec};
pub use table::{Row, TableFormat, TableReader};

#[derive(Debug, Error)]
pub enum TabularError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{table} line {line}: {message}")]
    Malformed {
        table: String,
        line: usize,
        message: String,
    },

    #[error("{table} line {line}: {source} ({processed} rows processed)")]
    Unresolved {
        table: String,
        line: usize,
        processed: usize,
        #[source]
        source: biokg_graph::UnresolvedReferenceError,
    },
}

impl TabularError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TabularError::Io {
            path: path.into(),
            source,
        }
    }
}
