//! biokg graph model
//!
//! Shared vocabulary for every pipeline stage:
//!
//! - `registry`: the identifier registry (source identifier → stable internal id),
//!   including the injectable equivalence table used to collapse cross-source
//!   naming collisions.
//! - `model`: nodes, edges, axioms and the `WorkingGraph` that is handed from
//!   stage to stage.
//! - `iri`: identifier normalization (CURIE expansion, local names).
//! - `vocab`: RDF/RDFS/OWL/OBO IRIs.
//! - `digest`: deterministic non-cryptographic fingerprints for artifacts.

pub mod digest;
pub mod iri;
pub mod model;
pub mod registry;
pub mod vocab;

pub use iri::PrefixMap;
pub use model::{
    Axiom, AxiomKey, AxiomKind, Edge, EdgeKey, EdgeKind, Restriction, WorkingGraph,
};
pub use registry::{
    EquivalenceTable, EquivalenceTableError, IdentifierRegistry, InvalidIdentifierError, Node,
    NodeId, NodeKind, UnresolvedReferenceError,
};
