//! biokg build pipeline
//!
//! Turns ontologies and tabular edge sources into one knowledge graph:
//!
//! 1. **Ingest**: ontology files are decoded and every identifier is
//!    registered; node tables seed the registry with kinds and labels.
//! 2. **Edge lists**: tabular sources become typed edges, unresolved rows are
//!    counted rather than dropped silently.
//! 3. **Merge**: ontologies are combined; conflicting class definitions are
//!    settled by the configured source priority or fail the build.
//! 4. **Assemble**: merged ontology and edge batches become one graph.
//! 5. **Prune**: configured axiom kinds (disjointness by default) are removed
//!    before reasoning.
//! 6. **Closure**: an external reasoner computes entailments under a
//!    watchdog timeout; inferred edges and equivalences are folded back in.
//! 7. **Filter**: pluggable relevance rules drop what downstream consumers
//!    should not see.
//! 8. **Serialize**: triples, edge list, integer mappings and the build
//!    report are staged and then renamed into place together.
//!
//! ## Module Organization
//!
//! - `config`: TOML build configuration
//! - `error`: per-stage error types and [`PipelineError`]
//! - `pipeline`: [`BuildPipeline`] wiring the stages together

pub mod assemble;
pub mod closure;
pub mod config;
pub mod error;
pub mod filter;
pub mod ingest;
pub mod merge;
pub mod pipeline;
pub mod prune;
pub mod report;
pub mod serialize;

pub use assemble::{AssemblyReport, GraphAssembler};
pub use closure::{ClosureInvoker, ClosureReport, ProcessReasoner, Reasoner};
pub use config::BuildConfig;
pub use error::{
    AssemblyError, ClosureError, ClosureFailure, ClosureTimeoutError, ConfigError, IngestError,
    MergeConflictError, OutputError, PipelineError, Stage, StageErrorKind,
};
pub use filter::{ClinicalRelevanceFilter, FilterContext, FilterReport, RelevanceRule};
pub use ingest::{ingest_ontology, OntologyGraph};
pub use merge::{MergeReport, MergedOntology, OntologyMerger};
pub use pipeline::{BuildOutcome, BuildPipeline};
pub use prune::{PrunePolicy, PruneReport};
pub use report::{BuildReport, BUILD_REPORT_FILE};
pub use serialize::{
    ArtifactStager, IdentifierMappingTable, RelationMappingTable, SerializedGraph, Serializer,
};
