//! Edges, axioms and the working graph handed from stage to stage.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

use crate::registry::{IdentifierRegistry, NodeId, NodeKind, UnresolvedReferenceError};

// ============================================================================
// Edges
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EdgeKind {
    #[serde(rename = "class-class")]
    ClassClass,
    #[serde(rename = "class-instance")]
    ClassInstance,
    #[serde(rename = "instance-instance")]
    InstanceInstance,
}

impl EdgeKind {
    pub fn from_kinds(subject: NodeKind, object: NodeKind) -> Self {
        match (subject, object) {
            (NodeKind::Class, NodeKind::Class) => EdgeKind::ClassClass,
            (NodeKind::Instance, NodeKind::Instance) => EdgeKind::InstanceInstance,
            _ => EdgeKind::ClassInstance,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeKind::ClassClass => "class-class",
            EdgeKind::ClassInstance => "class-instance",
            EdgeKind::InstanceInstance => "instance-instance",
        }
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub subject: NodeId,
    pub predicate: String,
    pub object: NodeId,
    /// Originating source document.
    pub provenance: String,
    pub kind: EdgeKind,
}

impl Edge {
    pub fn new(
        subject: NodeId,
        predicate: impl Into<String>,
        object: NodeId,
        provenance: impl Into<String>,
        kind: EdgeKind,
    ) -> Self {
        Self {
            subject,
            predicate: predicate.into(),
            object,
            provenance: provenance.into(),
            kind,
        }
    }

    pub fn key(&self) -> EdgeKey {
        EdgeKey {
            subject: self.subject.clone(),
            predicate: self.predicate.clone(),
            object: self.object.clone(),
        }
    }
}

/// Identity of an edge: provenance and kind do not take part.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeKey {
    pub subject: NodeId,
    pub predicate: String,
    pub object: NodeId,
}

// ============================================================================
// Axioms
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AxiomKind {
    EquivalentClasses,
    DisjointClasses,
    ComplementOf,
    UnionOf,
    IntersectionOf,
}

impl AxiomKind {
    pub const ALL: [AxiomKind; 5] = [
        AxiomKind::EquivalentClasses,
        AxiomKind::DisjointClasses,
        AxiomKind::ComplementOf,
        AxiomKind::UnionOf,
        AxiomKind::IntersectionOf,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AxiomKind::EquivalentClasses => "equivalent_classes",
            AxiomKind::DisjointClasses => "disjoint_classes",
            AxiomKind::ComplementOf => "complement_of",
            AxiomKind::UnionOf => "union_of",
            AxiomKind::IntersectionOf => "intersection_of",
        }
    }

    pub fn parse(s: &str) -> Option<AxiomKind> {
        Self::ALL.into_iter().find(|k| k.as_str() == s.trim())
    }

    /// Operand order carries no meaning for these kinds.
    pub fn is_symmetric(&self) -> bool {
        matches!(self, AxiomKind::EquivalentClasses | AxiomKind::DisjointClasses)
    }
}

impl fmt::Display for AxiomKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Existential conjunct of a class definition (`∃ property . filler`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Restriction {
    pub property: String,
    pub filler: NodeId,
}

/// A logical statement over classes.
///
/// Operand layout:
/// - `equivalent_classes`, `disjoint_classes`: sorted, deduplicated set.
/// - `complement_of`: `[class, complement]`.
/// - `union_of`, `intersection_of`: `[defined_class, members...]` with the
///   members sorted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Axiom {
    pub kind: AxiomKind,
    pub operands: Vec<NodeId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub restrictions: Vec<Restriction>,
    pub provenance: String,
}

impl Axiom {
    pub fn new(
        kind: AxiomKind,
        mut operands: Vec<NodeId>,
        mut restrictions: Vec<Restriction>,
        provenance: impl Into<String>,
    ) -> Self {
        if kind.is_symmetric() {
            operands.sort();
            operands.dedup();
        } else if matches!(kind, AxiomKind::UnionOf | AxiomKind::IntersectionOf)
            && operands.len() > 1
        {
            let mut members = operands.split_off(1);
            members.sort();
            members.dedup();
            operands.extend(members);
        }
        restrictions.sort();
        restrictions.dedup();
        Self {
            kind,
            operands,
            restrictions,
            provenance: provenance.into(),
        }
    }

    /// Binary symmetric axiom (`equivalent_classes` / `disjoint_classes`).
    pub fn pair(kind: AxiomKind, a: NodeId, b: NodeId, provenance: impl Into<String>) -> Self {
        Self::new(kind, vec![a, b], Vec::new(), provenance)
    }

    pub fn key(&self) -> AxiomKey {
        AxiomKey {
            kind: self.kind,
            operands: self.operands.clone(),
            restrictions: self.restrictions.clone(),
        }
    }

    /// The class a union/intersection/complement axiom defines.
    pub fn defined_class(&self) -> Option<&NodeId> {
        match self.kind {
            AxiomKind::UnionOf | AxiomKind::IntersectionOf | AxiomKind::ComplementOf => {
                self.operands.first()
            }
            _ => None,
        }
    }

    /// Every node id the axiom references (operands and restriction fillers).
    pub fn node_ids(&self) -> impl Iterator<Item = &NodeId> {
        self.operands
            .iter()
            .chain(self.restrictions.iter().map(|r| &r.filler))
    }

    pub fn mentions(&self, id: &NodeId) -> bool {
        self.node_ids().any(|n| n == id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AxiomKey {
    pub kind: AxiomKind,
    pub operands: Vec<NodeId>,
    pub restrictions: Vec<Restriction>,
}

// ============================================================================
// Working graph
// ============================================================================

/// Nodes, edges and axioms at one pipeline stage.
///
/// Edges and axioms keep insertion order; a duplicate insert is a no-op that
/// keeps the first provenance.
#[derive(Debug, Clone, Default)]
pub struct WorkingGraph {
    nodes: BTreeMap<NodeId, NodeKind>,
    edges: Vec<Edge>,
    edge_index: HashSet<EdgeKey>,
    axioms: Vec<Axiom>,
    axiom_index: HashSet<AxiomKey>,
    annotation_properties: BTreeSet<String>,
}

impl WorkingGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_node(&mut self, id: NodeId, kind: NodeKind) {
        self.nodes
            .entry(id)
            .and_modify(|k| *k = k.merge(kind))
            .or_insert(kind);
    }

    pub fn node_kind(&self, id: &NodeId) -> Option<NodeKind> {
        self.nodes.get(id).copied()
    }

    pub fn nodes(&self) -> impl Iterator<Item = (&NodeId, NodeKind)> {
        self.nodes.iter().map(|(id, kind)| (id, *kind))
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn axioms(&self) -> &[Axiom] {
        &self.axioms
    }

    /// Returns false if an edge with the same key is already present.
    pub fn add_edge(&mut self, edge: Edge) -> bool {
        if !self.edge_index.insert(edge.key()) {
            return false;
        }
        self.edges.push(edge);
        true
    }

    pub fn contains_edge(&self, key: &EdgeKey) -> bool {
        self.edge_index.contains(key)
    }

    pub fn add_axiom(&mut self, axiom: Axiom) -> bool {
        if !self.axiom_index.insert(axiom.key()) {
            return false;
        }
        self.axioms.push(axiom);
        true
    }

    pub fn contains_axiom(&self, key: &AxiomKey) -> bool {
        self.axiom_index.contains(key)
    }

    /// Keep edges for which `keep` returns true; returns the removed edges in
    /// their original order.
    pub fn retain_edges<F>(&mut self, mut keep: F) -> Vec<Edge>
    where
        F: FnMut(&Edge) -> bool,
    {
        let (kept, removed): (Vec<Edge>, Vec<Edge>) =
            std::mem::take(&mut self.edges).into_iter().partition(|e| keep(e));
        for edge in &removed {
            self.edge_index.remove(&edge.key());
        }
        self.edges = kept;
        removed
    }

    pub fn retain_axioms<F>(&mut self, mut keep: F) -> Vec<Axiom>
    where
        F: FnMut(&Axiom) -> bool,
    {
        let (kept, removed): (Vec<Axiom>, Vec<Axiom>) =
            std::mem::take(&mut self.axioms).into_iter().partition(|a| keep(a));
        for axiom in &removed {
            self.axiom_index.remove(&axiom.key());
        }
        self.axioms = kept;
        removed
    }

    pub fn declare_annotation_property(&mut self, iri: impl Into<String>) {
        self.annotation_properties.insert(iri.into());
    }

    pub fn is_annotation_property(&self, iri: &str) -> bool {
        self.annotation_properties.contains(iri)
    }

    pub fn annotation_properties(&self) -> &BTreeSet<String> {
        &self.annotation_properties
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn axiom_count(&self) -> usize {
        self.axioms.len()
    }

    /// Node ids referenced by at least one edge.
    pub fn edge_nodes(&self) -> BTreeSet<&NodeId> {
        self.edges
            .iter()
            .flat_map(|e| [&e.subject, &e.object])
            .collect()
    }

    /// No-dangling check: every node, edge endpoint and axiom operand must
    /// be registered.
    pub fn check_references(
        &self,
        registry: &IdentifierRegistry,
    ) -> Result<(), UnresolvedReferenceError> {
        let ids = self
            .nodes
            .keys()
            .chain(self.edges.iter().flat_map(|e| [&e.subject, &e.object]))
            .chain(self.axioms.iter().flat_map(|a| a.node_ids()));
        for id in ids {
            if !registry.contains(id) {
                return Err(UnresolvedReferenceError {
                    identifier: id.to_string(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> NodeId {
        NodeId::from_iri(format!("http://purl.obolibrary.org/obo/{s}"))
    }

    #[test]
    fn duplicate_edge_keeps_first_provenance() {
        let mut g = WorkingGraph::new();
        let e1 = Edge::new(id("A"), "p", id("B"), "first.owl", EdgeKind::ClassClass);
        let e2 = Edge::new(id("A"), "p", id("B"), "second.owl", EdgeKind::ClassClass);
        assert!(g.add_edge(e1));
        assert!(!g.add_edge(e2));
        assert_eq!(g.edge_count(), 1);
        assert_eq!(g.edges()[0].provenance, "first.owl");
    }

    #[test]
    fn symmetric_axioms_share_a_key_regardless_of_operand_order() {
        let a = Axiom::pair(AxiomKind::DisjointClasses, id("A"), id("B"), "x");
        let b = Axiom::pair(AxiomKind::DisjointClasses, id("B"), id("A"), "y");
        assert_eq!(a.key(), b.key());

        let c = Axiom::new(
            AxiomKind::UnionOf,
            vec![id("C"), id("Z"), id("A")],
            Vec::new(),
            "x",
        );
        assert_eq!(c.operands, vec![id("C"), id("A"), id("Z")]);
        assert_eq!(c.defined_class(), Some(&id("C")));
    }

    #[test]
    fn retain_edges_returns_removed_and_frees_the_key() {
        let mut g = WorkingGraph::new();
        g.add_edge(Edge::new(id("A"), "keep", id("B"), "s", EdgeKind::ClassClass));
        g.add_edge(Edge::new(id("A"), "drop", id("B"), "s", EdgeKind::ClassClass));
        let removed = g.retain_edges(|e| e.predicate == "keep");
        assert_eq!(removed.len(), 1);
        assert_eq!(g.edge_count(), 1);
        assert!(g.add_edge(Edge::new(id("A"), "drop", id("B"), "t", EdgeKind::ClassClass)));
    }

    #[test]
    fn check_references_reports_dangling_endpoint() {
        let registry = IdentifierRegistry::new();
        let a = registry.register("HP:1", NodeKind::Class).unwrap();
        let mut g = WorkingGraph::new();
        g.add_edge(Edge::new(a, "p", id("HP_2"), "s", EdgeKind::ClassClass));
        let err = g.check_references(&registry).unwrap_err();
        assert_eq!(err.identifier, "http://purl.obolibrary.org/obo/HP_2");
    }

    #[test]
    fn edge_kind_from_node_kinds() {
        assert_eq!(
            EdgeKind::from_kinds(NodeKind::Instance, NodeKind::Class),
            EdgeKind::ClassInstance
        );
        assert_eq!(
            EdgeKind::from_kinds(NodeKind::Instance, NodeKind::Instance),
            EdgeKind::InstanceInstance
        );
    }
}
