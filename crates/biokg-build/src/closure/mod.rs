//! Closure Invoker: run an OWL reasoner over the pruned graph and fold the
//! entailed edges and equivalences back in.
//!
//! The reasoner sits behind the [`Reasoner`] trait. The invoker owns the
//! work directory, the N-Triples encoding of the graph, the wall-clock
//! budget and the decoding of whatever the reasoner wrote. Results may only
//! mention nodes the registry already knows; anything else is counted and
//! dropped, as are statements about `owl:Thing` / `owl:Nothing`.

pub mod encode;
pub mod process;

use biokg_graph::vocab::{
    OWL_EQUIVALENT_CLASS, OWL_NOTHING, OWL_THING, RDFS_SUBCLASS_OF, RDF_TYPE,
};
use biokg_graph::{
    Axiom, AxiomKind, Edge, EdgeKind, IdentifierRegistry, NodeId, NodeKind, WorkingGraph,
};
use biokg_ingest_rdfowl::{read_rdf_file, OntologyDocument, OwlAxiom, RdfStatement};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

pub use encode::{encode_graph, EncodeStats};
pub use process::ProcessReasoner;

use crate::error::{ClosureError, ClosureFailure, ClosureTimeoutError};

/// Extra time the watchdog allows past the reasoner's own budget before it
/// stops waiting.
const WATCHDOG_GRACE: Duration = Duration::from_millis(500);

/// An OWL reasoner that materializes entailments of `input` into `output`.
///
/// Implementations should stop on their own once `timeout` has elapsed;
/// the invoker gives up waiting shortly after either way. A call the
/// invoker stopped waiting for keeps running on its thread, and the work
/// directory holding `input` and `output` stays on disk until it returns.
pub trait Reasoner: Send + Sync {
    fn name(&self) -> &str;

    fn input_file_name(&self) -> &str {
        "closure_input.nt"
    }

    /// The extension selects the RDF parser used on the result.
    fn output_file_name(&self) -> &str {
        "closure_output.owl"
    }

    fn infer(&self, input: &Path, output: &Path, timeout: Duration) -> Result<(), ClosureFailure>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosureReport {
    pub reasoner: String,
    pub input: EncodeStats,
    pub output_statements: usize,
    pub inferred_edges_added: usize,
    pub equivalences_added: usize,
    /// Entailments the graph already had.
    pub already_present: usize,
    pub skipped_builtin: usize,
    pub skipped_unregistered: usize,
    pub skipped_annotation: usize,
    pub skipped_reflexive: usize,
    /// Non-equivalence axioms in the output.
    pub axioms_ignored: usize,
}

pub struct ClosureInvoker {
    reasoner: Arc<dyn Reasoner>,
    timeout: Duration,
    pruned: BTreeSet<AxiomKind>,
}

impl ClosureInvoker {
    pub fn new(reasoner: Arc<dyn Reasoner>, timeout: Duration) -> Self {
        Self {
            reasoner,
            timeout,
            pruned: BTreeSet::new(),
        }
    }

    /// Axiom kinds removed by pruning; the same kinds are not re-admitted
    /// from the reasoner's output.
    pub fn with_pruned_kinds(mut self, kinds: impl IntoIterator<Item = AxiomKind>) -> Self {
        self.pruned = kinds.into_iter().collect();
        self
    }

    pub fn reasoner_name(&self) -> &str {
        self.reasoner.name()
    }

    pub fn close(
        &self,
        graph: &mut WorkingGraph,
        registry: &IdentifierRegistry,
    ) -> Result<ClosureReport, ClosureFailure> {
        let work = Arc::new(
            tempfile::Builder::new()
                .prefix("biokg-closure-")
                .tempdir()
                .map_err(|source| ClosureError::Io {
                    path: std::env::temp_dir(),
                    source,
                })?,
        );
        let input = work.path().join(self.reasoner.input_file_name());
        let output = work.path().join(self.reasoner.output_file_name());

        let mut report = ClosureReport {
            reasoner: self.reasoner.name().to_string(),
            ..Default::default()
        };
        report.input = write_input(graph, &input)?;
        tracing::info!(
            reasoner = %report.reasoner,
            triples = report.input.triples,
            timeout_secs = self.timeout.as_secs(),
            "running closure"
        );

        self.run_with_watchdog(Arc::clone(&work), input, output.clone())?;

        if !output.exists() {
            return Err(self.malformed(format!("no output written to {}", output.display())));
        }
        let statements =
            read_rdf_file(&output).map_err(|e| self.malformed(format!("{e:#}")))?;
        report.output_statements = statements.len();
        report.skipped_builtin = statements.iter().filter(|st| mentions_top_or_bottom(st)).count();

        let provenance = format!("closure:{}", self.reasoner.name());
        let doc = OntologyDocument::from_statements(&provenance, &statements);
        self.integrate(graph, registry, &doc, &mut report);

        tracing::info!(
            reasoner = %report.reasoner,
            edges_added = report.inferred_edges_added,
            equivalences_added = report.equivalences_added,
            already_present = report.already_present,
            skipped_unregistered = report.skipped_unregistered,
            "closure integrated"
        );
        Ok(report)
    }

    fn malformed(&self, detail: String) -> ClosureFailure {
        ClosureError::MalformedOutput {
            reasoner: self.reasoner.name().to_string(),
            detail,
        }
        .into()
    }

    /// The worker holds its own handle on `work`, so an abandoned reasoner
    /// never writes into a removed directory.
    fn run_with_watchdog(
        &self,
        work: Arc<TempDir>,
        input: PathBuf,
        output: PathBuf,
    ) -> Result<(), ClosureFailure> {
        let (tx, rx) = mpsc::channel();
        let reasoner = Arc::clone(&self.reasoner);
        let timeout = self.timeout;
        thread::Builder::new()
            .name("biokg-closure".to_string())
            .spawn(move || {
                let _ = tx.send(reasoner.infer(&input, &output, timeout));
                drop(work);
            })
            .map_err(|source| ClosureError::Launch {
                reasoner: self.reasoner.name().to_string(),
                source,
            })?;

        match rx.recv_timeout(timeout + WATCHDOG_GRACE) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(ClosureTimeoutError {
                reasoner: self.reasoner.name().to_string(),
                timeout,
            }
            .into()),
            Err(RecvTimeoutError::Disconnected) => Err(ClosureError::ReasonerFailed {
                reasoner: self.reasoner.name().to_string(),
                code: None,
                stderr: "reasoner thread exited without reporting a result".to_string(),
            }
            .into()),
        }
    }

    fn integrate(
        &self,
        graph: &mut WorkingGraph,
        registry: &IdentifierRegistry,
        doc: &OntologyDocument,
        report: &mut ClosureReport,
    ) {
        let resolve = |iri: &str| registry.resolve(iri).ok();
        let kind = |id: &NodeId| registry.kind_of(id).unwrap_or(NodeKind::Class);

        for e in &doc.edges {
            if graph.is_annotation_property(&e.predicate)
                || doc.annotation_properties.contains(&e.predicate)
            {
                report.skipped_annotation += 1;
                continue;
            }
            let (Some(s), Some(o)) = (resolve(e.subject.as_str()), resolve(e.object.as_str())) else {
                report.skipped_unregistered += 1;
                continue;
            };
            if s == o && e.predicate == RDFS_SUBCLASS_OF {
                report.skipped_reflexive += 1;
                continue;
            }
            let edge_kind = EdgeKind::from_kinds(kind(&s), kind(&o));
            graph.insert_node(s.clone(), kind(&s));
            graph.insert_node(o.clone(), kind(&o));
            if graph.add_edge(Edge::new(s, e.predicate.clone(), o, doc.source.clone(), edge_kind)) {
                report.inferred_edges_added += 1;
            } else {
                report.already_present += 1;
            }
        }

        for axiom in &doc.axioms {
            let OwlAxiom::EquivalentClasses(iris) = axiom else {
                report.axioms_ignored += 1;
                continue;
            };
            if self.pruned.contains(&AxiomKind::EquivalentClasses) {
                report.axioms_ignored += 1;
                continue;
            }
            let Some(ids) = iris.iter().map(|i| resolve(i.as_str())).collect::<Option<Vec<_>>>() else {
                report.skipped_unregistered += 1;
                continue;
            };
            let axiom = Axiom::new(AxiomKind::EquivalentClasses, ids, Vec::new(), doc.source.clone());
            if axiom.operands.len() < 2 {
                report.skipped_reflexive += 1;
            } else if graph.add_axiom(axiom) {
                report.equivalences_added += 1;
            } else {
                report.already_present += 1;
            }
        }
    }
}

fn write_input(graph: &WorkingGraph, path: &Path) -> Result<EncodeStats, ClosureFailure> {
    let io_error = |source| ClosureError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = File::create(path).map_err(io_error)?;
    Ok(encode_graph(graph, BufWriter::new(file)).map_err(io_error)?)
}

/// Subclass/type/equivalence statements involving `owl:Thing` or `owl:Nothing`.
fn mentions_top_or_bottom(st: &RdfStatement) -> bool {
    let structural = matches!(
        st.predicate.as_str(),
        RDFS_SUBCLASS_OF | RDF_TYPE | OWL_EQUIVALENT_CLASS
    );
    let is_top_or_bottom = |iri: Option<&str>| matches!(iri, Some(OWL_THING) | Some(OWL_NOTHING));
    structural && (is_top_or_bottom(st.subject.as_iri()) || is_top_or_bottom(st.object.as_iri()))
}
