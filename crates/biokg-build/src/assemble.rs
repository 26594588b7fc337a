//! Graph Assembler: merged class graph + tabular edge batches → one graph.
//!
//! Edge kinds are recomputed from the registry, since a node may have been
//! registered as an instance by one source and promoted to a class by a
//! later one. Every referenced id must resolve; a dangling reference here
//! means an earlier stage let an unregistered id through.

use biokg_graph::{
    EdgeKind, IdentifierRegistry, NodeId, NodeKind, UnresolvedReferenceError, WorkingGraph,
};
use biokg_ingest_tabular::EdgeBatch;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::AssemblyError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Ontology,
    EdgeSource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceContribution {
    pub source: String,
    pub kind: SourceKind,
    /// Distinct nodes this source's surviving edges touch.
    pub nodes: usize,
    pub edges_added: usize,
    /// Edges already present from an earlier source.
    pub duplicates: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssemblyReport {
    pub sources: Vec<SourceContribution>,
    pub nodes: usize,
    pub edges: usize,
    pub axioms: usize,
    pub edges_by_kind: BTreeMap<EdgeKind, usize>,
}

pub struct GraphAssembler<'a> {
    registry: &'a IdentifierRegistry,
}

impl<'a> GraphAssembler<'a> {
    pub fn new(registry: &'a IdentifierRegistry) -> Self {
        Self { registry }
    }

    /// `graph` is the partial result, for the error's progress count.
    fn kind(&self, id: &NodeId, graph: &WorkingGraph) -> Result<NodeKind, AssemblyError> {
        self.registry.kind_of(id).ok_or_else(|| AssemblyError {
            edges_assembled: graph.edge_count(),
            source: UnresolvedReferenceError {
                identifier: id.to_string(),
            },
        })
    }

    pub fn assemble(
        &self,
        merged: &WorkingGraph,
        batches: &[EdgeBatch],
    ) -> Result<(WorkingGraph, AssemblyReport), AssemblyError> {
        let mut graph = WorkingGraph::new();
        let mut report = AssemblyReport::default();

        // Ontology edges grouped by provenance, in first-seen order.
        let mut ontology_order: Vec<&str> = Vec::new();
        let mut ontology_stats: BTreeMap<&str, (usize, BTreeSet<&NodeId>)> = BTreeMap::new();
        for original in merged.edges() {
            let mut edge = original.clone();
            edge.kind = EdgeKind::from_kinds(
                self.kind(&edge.subject, &graph)?,
                self.kind(&edge.object, &graph)?,
            );
            let provenance = original.provenance.as_str();
            let stats = ontology_stats.entry(provenance).or_insert_with(|| {
                ontology_order.push(provenance);
                (0, BTreeSet::new())
            });
            stats.1.insert(&original.subject);
            stats.1.insert(&original.object);
            if graph.add_edge(edge) {
                stats.0 += 1;
            }
        }
        for source in ontology_order {
            let (edges_added, nodes) = &ontology_stats[source];
            report.sources.push(SourceContribution {
                source: source.to_string(),
                kind: SourceKind::Ontology,
                nodes: nodes.len(),
                edges_added: *edges_added,
                duplicates: 0,
            });
        }

        for batch in batches {
            let mut contribution = SourceContribution {
                source: batch.source.clone(),
                kind: SourceKind::EdgeSource,
                nodes: 0,
                edges_added: 0,
                duplicates: 0,
            };
            let mut touched: BTreeSet<&NodeId> = BTreeSet::new();
            for edge in &batch.edges {
                let mut edge = edge.clone();
                edge.kind = EdgeKind::from_kinds(
                    self.kind(&edge.subject, &graph)?,
                    self.kind(&edge.object, &graph)?,
                );
                if graph.add_edge(edge) {
                    contribution.edges_added += 1;
                } else {
                    contribution.duplicates += 1;
                }
            }
            touched.extend(batch.edges.iter().flat_map(|e| [&e.subject, &e.object]));
            contribution.nodes = touched.len();
            tracing::debug!(
                source = %batch.source,
                added = contribution.edges_added,
                duplicates = contribution.duplicates,
                "assembled edge source"
            );
            report.sources.push(contribution);
        }

        for axiom in merged.axioms() {
            graph.add_axiom(axiom.clone());
        }
        for p in merged.annotation_properties() {
            graph.declare_annotation_property(p.clone());
        }

        let referenced: BTreeSet<NodeId> = graph
            .edges()
            .iter()
            .flat_map(|e| [&e.subject, &e.object])
            .chain(graph.axioms().iter().flat_map(|a| a.node_ids()))
            .cloned()
            .collect();
        for id in referenced {
            let kind = self.kind(&id, &graph)?;
            graph.insert_node(id, kind);
        }
        graph
            .check_references(self.registry)
            .map_err(|source| AssemblyError {
                edges_assembled: graph.edge_count(),
                source,
            })?;

        report.nodes = graph.node_count();
        report.edges = graph.edge_count();
        report.axioms = graph.axiom_count();
        for edge in graph.edges() {
            *report.edges_by_kind.entry(edge.kind).or_default() += 1;
        }
        tracing::info!(
            nodes = report.nodes,
            edges = report.edges,
            axioms = report.axioms,
            "assembled graph"
        );
        Ok((graph, report))
    }
}
