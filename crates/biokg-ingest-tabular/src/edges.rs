//! Edge List Builder: tabular rows → typed edges.
//!
//! Rows are resolved against the registry; nothing is registered here. A row
//! whose subject or object does not resolve is skipped and counted (or, with
//! [`OnUnresolved::Halt`], stops the source).

use biokg_graph::{Edge, EdgeKey, EdgeKind, IdentifierRegistry, NodeId, UnresolvedReferenceError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::classifier::RelationClassifier;
use crate::table::{Row, TableFormat, TableReader};
use crate::TabularError;

/// Rejected identifiers kept per source for the report.
pub const MAX_REJECTION_SAMPLES: usize = 20;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnUnresolved {
    #[default]
    Skip,
    Halt,
}

/// Column layout of one edge source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeSourceSpec {
    /// Provenance recorded on every edge.
    pub name: String,
    pub subject_column: usize,
    /// Ignored when `predicate` is set.
    pub predicate_column: usize,
    pub object_column: usize,
    /// Fixed predicate for every row.
    pub predicate: Option<String>,
    pub format: TableFormat,
}

impl Default for EdgeSourceSpec {
    fn default() -> Self {
        Self {
            name: String::new(),
            subject_column: 0,
            predicate_column: 1,
            object_column: 2,
            predicate: None,
            format: TableFormat::default(),
        }
    }
}

impl EdgeSourceSpec {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Per-source accounting of what the builder kept and what it skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectionReport {
    pub source: String,
    pub rows_read: usize,
    pub edges_emitted: usize,
    pub inverse_edges_emitted: usize,
    pub duplicates_dropped: usize,
    pub unresolved_subject: usize,
    pub unresolved_object: usize,
    pub malformed: usize,
    /// First rejected identifiers (bounded by [`MAX_REJECTION_SAMPLES`]).
    pub samples: Vec<String>,
}

impl RejectionReport {
    pub fn rejected(&self) -> usize {
        self.unresolved_subject + self.unresolved_object + self.malformed
    }

    fn sample(&mut self, identifier: &str) {
        if self.samples.len() < MAX_REJECTION_SAMPLES {
            self.samples.push(identifier.to_string());
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EdgeBatch {
    pub source: String,
    /// Input-row order; inverse edges follow the edge they were derived from.
    pub edges: Vec<Edge>,
    pub report: RejectionReport,
}

enum RowOutcome {
    Edge {
        subject: NodeId,
        predicate: String,
        object: NodeId,
    },
    Malformed,
    UnresolvedSubject(UnresolvedReferenceError),
    UnresolvedObject(UnresolvedReferenceError),
}

pub struct EdgeListBuilder<'a> {
    registry: &'a IdentifierRegistry,
    classifier: &'a RelationClassifier,
    on_unresolved: OnUnresolved,
}

impl<'a> EdgeListBuilder<'a> {
    pub fn new(registry: &'a IdentifierRegistry, classifier: &'a RelationClassifier) -> Self {
        Self {
            registry,
            classifier,
            on_unresolved: OnUnresolved::Skip,
        }
    }

    pub fn on_unresolved(mut self, policy: OnUnresolved) -> Self {
        self.on_unresolved = policy;
        self
    }

    pub fn build_file(&self, spec: &EdgeSourceSpec, path: &Path) -> Result<EdgeBatch, TabularError> {
        let file = File::open(path).map_err(|e| TabularError::io(path, e))?;
        self.build(spec, BufReader::new(file))
    }

    pub fn build<R: BufRead>(&self, spec: &EdgeSourceSpec, reader: R) -> Result<EdgeBatch, TabularError> {
        let mut batch = EdgeBatch {
            source: spec.name.clone(),
            edges: Vec::new(),
            report: RejectionReport {
                source: spec.name.clone(),
                ..Default::default()
            },
        };
        let mut seen: HashSet<EdgeKey> = HashSet::new();

        for row in TableReader::new(reader, spec.format.clone()) {
            let row = row.map_err(|e| TabularError::io(&spec.name, e))?;
            batch.report.rows_read += 1;

            match self.resolve_row(spec, &row) {
                RowOutcome::Edge {
                    subject,
                    predicate,
                    object,
                } => {
                    let inverse = self.classifier.inverse_of(&predicate).map(str::to_string);
                    if self.push_edge(&mut batch, &mut seen, spec, subject.clone(), predicate, object.clone()) {
                        batch.report.edges_emitted += 1;
                    }
                    if let Some(inverse) = inverse {
                        if self.push_edge(&mut batch, &mut seen, spec, object, inverse, subject) {
                            batch.report.inverse_edges_emitted += 1;
                        }
                    }
                }
                RowOutcome::Malformed => {
                    batch.report.malformed += 1;
                }
                RowOutcome::UnresolvedSubject(err) | RowOutcome::UnresolvedObject(err)
                    if self.on_unresolved == OnUnresolved::Halt =>
                {
                    return Err(TabularError::Unresolved {
                        table: spec.name.clone(),
                        line: row.line,
                        processed: batch.report.rows_read - 1,
                        source: err,
                    });
                }
                RowOutcome::UnresolvedSubject(err) => {
                    batch.report.unresolved_subject += 1;
                    batch.report.sample(&err.identifier);
                }
                RowOutcome::UnresolvedObject(err) => {
                    batch.report.unresolved_object += 1;
                    batch.report.sample(&err.identifier);
                }
            }
        }

        if batch.report.rejected() > 0 {
            tracing::warn!(
                source = %spec.name,
                rejected = batch.report.rejected(),
                unresolved_subject = batch.report.unresolved_subject,
                unresolved_object = batch.report.unresolved_object,
                malformed = batch.report.malformed,
                "edge rows rejected"
            );
        }
        Ok(batch)
    }

    fn resolve_row(&self, spec: &EdgeSourceSpec, row: &Row) -> RowOutcome {
        let predicate_raw = match &spec.predicate {
            Some(fixed) => Some(fixed.as_str()),
            None => row.field(spec.predicate_column),
        };
        let (Some(subject_raw), Some(predicate_raw), Some(object_raw)) = (
            row.field(spec.subject_column),
            predicate_raw,
            row.field(spec.object_column),
        ) else {
            return RowOutcome::Malformed;
        };
        let Some(predicate) = self.classifier.classify(predicate_raw) else {
            return RowOutcome::Malformed;
        };

        let subject = match self.registry.resolve(subject_raw) {
            Ok(id) => id,
            Err(err) => return RowOutcome::UnresolvedSubject(err),
        };
        let object = match self.registry.resolve(object_raw) {
            Ok(id) => id,
            Err(err) => return RowOutcome::UnresolvedObject(err),
        };
        RowOutcome::Edge {
            subject,
            predicate,
            object,
        }
    }

    fn push_edge(
        &self,
        batch: &mut EdgeBatch,
        seen: &mut HashSet<EdgeKey>,
        spec: &EdgeSourceSpec,
        subject: NodeId,
        predicate: String,
        object: NodeId,
    ) -> bool {
        let kind = match (self.registry.kind_of(&subject), self.registry.kind_of(&object)) {
            (Some(s), Some(o)) => EdgeKind::from_kinds(s, o),
            _ => EdgeKind::ClassInstance,
        };
        let edge = Edge::new(subject, predicate, object, spec.name.clone(), kind);
        if !seen.insert(edge.key()) {
            batch.report.duplicates_dropped += 1;
            return false;
        }
        batch.edges.push(edge);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use biokg_graph::NodeKind;

    fn registry() -> IdentifierRegistry {
        let registry = IdentifierRegistry::new();
        for gene in ["NCBIGene:672", "NCBIGene:675"] {
            registry.register(gene, NodeKind::Instance).unwrap();
        }
        registry.register("GO:0006281", NodeKind::Class).unwrap();
        registry
    }

    #[test]
    fn unresolved_instance_row_is_skipped_and_counted_once() {
        let registry = registry();
        let classifier = RelationClassifier::default();
        let builder = EdgeListBuilder::new(&registry, &classifier);

        let rows = "NCBIGene:672\tRO:0002434\tNCBIGene:675\nNCBIGene:999\tRO:0002434\tNCBIGene:675\nNCBIGene:672\tRO:0000056\tGO:0006281\n";
        let batch = builder
            .build(&EdgeSourceSpec::named("ppi.tsv"), rows.as_bytes())
            .unwrap();

        assert_eq!(batch.edges.len(), 2);
        assert_eq!(batch.report.rejected(), 1);
        assert_eq!(batch.report.unresolved_subject, 1);
        assert_eq!(batch.report.samples, vec!["NCBIGene:999".to_string()]);
        assert_eq!(batch.edges[0].kind, EdgeKind::InstanceInstance);
        assert_eq!(batch.edges[1].kind, EdgeKind::ClassInstance);
        assert!(batch.edges.iter().all(|e| e.provenance == "ppi.tsv"));
    }

    #[test]
    fn duplicates_keep_first_and_inverse_edges_follow() {
        let registry = registry();
        let classifier = RelationClassifier::default()
            .with_label("interacts with", "RO:0002434")
            .with_inverse("RO:0002434", "RO:0002434");
        let builder = EdgeListBuilder::new(&registry, &classifier);

        let rows = "NCBIGene:672\tinteracts with\tNCBIGene:675\nNCBIGene:672\tRO:0002434\tNCBIGene:675\n";
        let batch = builder
            .build(&EdgeSourceSpec::named("ppi.tsv"), rows.as_bytes())
            .unwrap();

        assert_eq!(batch.edges.len(), 2);
        assert_eq!(batch.edges[1].subject, batch.edges[0].object);
        assert_eq!(batch.report.edges_emitted, 1);
        assert_eq!(batch.report.inverse_edges_emitted, 1);
        assert_eq!(batch.report.duplicates_dropped, 2);
    }

    #[test]
    fn fixed_predicate_and_short_rows() {
        let registry = registry();
        let classifier = RelationClassifier::default();
        let builder = EdgeListBuilder::new(&registry, &classifier);
        let spec = EdgeSourceSpec {
            name: "gene2go.tsv".to_string(),
            object_column: 1,
            predicate: Some("RO:0000056".to_string()),
            ..Default::default()
        };

        let batch = builder
            .build(&spec, "NCBIGene:672\tGO:0006281\nNCBIGene:675\n".as_bytes())
            .unwrap();
        assert_eq!(batch.edges.len(), 1);
        assert_eq!(batch.edges[0].predicate, "http://purl.obolibrary.org/obo/RO_0000056");
        assert_eq!(batch.report.malformed, 1);
    }

    #[test]
    fn halt_policy_turns_unresolved_into_an_error() {
        let registry = registry();
        let classifier = RelationClassifier::default();
        let builder = EdgeListBuilder::new(&registry, &classifier).on_unresolved(OnUnresolved::Halt);

        let rows = "NCBIGene:672\tRO:0002434\tNCBIGene:675\nNCBIGene:672\tRO:0002434\tNCBIGene:404\n";
        let err = builder
            .build(&EdgeSourceSpec::named("ppi.tsv"), rows.as_bytes())
            .unwrap_err();
        match err {
            TabularError::Unresolved {
                line, processed, source, ..
            } => {
                assert_eq!(line, 2);
                assert_eq!(processed, 1);
                assert_eq!(source.identifier, "NCBIGene:404");
            }
            other => panic!("expected unresolved error, got {other:?}"),
        }
    }

    #[test]
    fn build_file_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("edges.tsv");
        std::fs::write(&path, "NCBIGene:672\tRO:0002434\tNCBIGene:675\n").unwrap();

        let registry = registry();
        let classifier = RelationClassifier::default();
        let batch = EdgeListBuilder::new(&registry, &classifier)
            .build_file(&EdgeSourceSpec::named("edges.tsv"), &path)
            .unwrap();
        assert_eq!(batch.edges.len(), 1);

        let missing = EdgeListBuilder::new(&registry, &classifier)
            .build_file(&EdgeSourceSpec::named("x"), &dir.path().join("missing.tsv"));
        assert!(matches!(missing, Err(TabularError::Io { .. })));
    }
}
