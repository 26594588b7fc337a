//! OWL decoding: RDF statements → classes, plain edges and class axioms.
//!
//! Anonymous class expressions are rewritten into labeled edges in the
//! OWL-NETS manner:
//!
//! - `C ⊑ ∃p.D`, `C ⊑ ∀p.D`, `C ⊑ p:{d}` (hasValue) → `(C, p, D)`
//! - `C ⊑ ∃p.Self` → `(C, p, C)`
//! - `C ⊑ (≥n p.D)` with `owl:onClass` → `(C, p, D)`, counted as cardinality
//! - `C ≡ A ⊓ ∃p.D` → `(C, subClassOf, A)`, `(C, p, D)`; when `C` is not a
//!   PATO class and `A` is, `(C, has_quality, A)` instead
//! - `C ≡ A ⊔ B` → `(A, subClassOf, C)`, `(B, subClassOf, C)`
//!
//! Set constructors whose parts are all named classes or simple existential
//! restrictions are also kept as `union_of` / `intersection_of` axioms so the
//! reasoner sees the full definition. Expressions that cannot be rewritten
//! are listed in the [`DecodeReport`] and never fail the read.

use biokg_graph::iri::local_name;
use biokg_graph::vocab::*;
use biokg_graph::NodeKind;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::{RdfNode, RdfObject, RdfStatement};

/// Nesting bound for anonymous class expressions (guards against cyclic lists).
const MAX_EXPR_DEPTH: usize = 32;

// ============================================================================
// Output types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OwlEdge {
    pub subject: String,
    pub predicate: String,
    pub object: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OwlAxiom {
    EquivalentClasses(Vec<String>),
    DisjointClasses(Vec<String>),
    ComplementOf {
        class: String,
        complement: String,
    },
    UnionOf {
        class: String,
        members: Vec<String>,
    },
    IntersectionOf {
        class: String,
        members: Vec<String>,
        /// `(property, filler)` existential conjuncts.
        restrictions: Vec<(String, String)>,
    },
}

impl OwlAxiom {
    pub fn iris(&self) -> Vec<&str> {
        match self {
            OwlAxiom::EquivalentClasses(cs) | OwlAxiom::DisjointClasses(cs) => {
                cs.iter().map(String::as_str).collect()
            }
            OwlAxiom::ComplementOf { class, complement } => vec![class, complement],
            OwlAxiom::UnionOf { class, members } => std::iter::once(class.as_str())
                .chain(members.iter().map(String::as_str))
                .collect(),
            OwlAxiom::IntersectionOf {
                class,
                members,
                restrictions,
            } => std::iter::once(class.as_str())
                .chain(members.iter().map(String::as_str))
                .chain(restrictions.iter().map(|(_, f)| f.as_str()))
                .collect(),
        }
    }
}

/// What the decoder rewrote and what it had to leave out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodeReport {
    pub restrictions_decoded: usize,
    pub constructors_decoded: usize,
    /// Classes whose definitions use cardinality restrictions.
    pub cardinality: BTreeSet<String>,
    /// Classes defined with `owl:complementOf` / negation.
    pub complement: BTreeSet<String>,
    /// Classes with expressions that could not be rewritten into edges.
    pub unsupported: BTreeSet<String>,
}

/// One ontology file, decoded.
#[derive(Debug, Clone, Default)]
pub struct OntologyDocument {
    pub source: String,
    pub ontology_iri: Option<String>,
    /// Every named node the document mentions, with its kind.
    pub nodes: BTreeMap<String, NodeKind>,
    pub object_properties: BTreeSet<String>,
    pub annotation_properties: BTreeSet<String>,
    pub labels: BTreeMap<String, BTreeSet<String>>,
    pub edges: Vec<OwlEdge>,
    pub axioms: Vec<OwlAxiom>,
    pub decode: DecodeReport,
}

// ============================================================================
// Class expressions
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum ClassExpr {
    Named(String),
    Some { property: String, filler: Box<ClassExpr> },
    All { property: String, filler: Box<ClassExpr> },
    HasValue { property: String, value: String },
    HasSelf { property: String },
    /// Qualified cardinality (`owl:onClass`).
    Qualified { property: String, filler: Box<ClassExpr> },
    /// Unqualified cardinality; nothing to point an edge at.
    Cardinality,
    Union(Vec<ClassExpr>),
    Intersection(Vec<ClassExpr>),
    Complement(Box<ClassExpr>),
    Unsupported,
}

impl ClassExpr {
    fn named(&self) -> Option<&str> {
        match self {
            ClassExpr::Named(iri) => Some(iri),
            _ => None,
        }
    }

    /// `∃p.D` with a named `D`.
    fn simple_existential(&self) -> Option<(&str, &str)> {
        match self {
            ClassExpr::Some { property, filler } => {
                filler.named().map(|f| (property.as_str(), f))
            }
            _ => None,
        }
    }
}

fn is_pato(iri: &str) -> bool {
    local_name(iri).starts_with("PATO_")
}

// ============================================================================
// Decoder
// ============================================================================

struct Decoder<'a> {
    statements: &'a [RdfStatement],
    by_subject: HashMap<&'a RdfNode, Vec<usize>>,
    doc: OntologyDocument,
    edge_index: HashSet<OwlEdge>,
}

impl OntologyDocument {
    pub fn from_statements(source: &str, statements: &[RdfStatement]) -> Self {
        let mut by_subject: HashMap<&RdfNode, Vec<usize>> = HashMap::new();
        for (i, st) in statements.iter().enumerate() {
            by_subject.entry(&st.subject).or_default().push(i);
        }

        let mut decoder = Decoder {
            statements,
            by_subject,
            doc: OntologyDocument {
                source: source.to_string(),
                ..Default::default()
            },
            edge_index: HashSet::new(),
        };
        decoder.collect_declarations();
        decoder.decode_statements();
        decoder.finish()
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.nodes
            .iter()
            .filter(|(_, k)| **k == NodeKind::Class)
            .map(|(iri, _)| iri.as_str())
    }

    pub fn individuals(&self) -> impl Iterator<Item = &str> {
        self.nodes
            .iter()
            .filter(|(_, k)| **k == NodeKind::Instance)
            .map(|(iri, _)| iri.as_str())
    }
}

impl<'a> Decoder<'a> {
    fn objects(&self, subject: &RdfNode, predicate: &str) -> Vec<&'a RdfObject> {
        self.by_subject
            .get(subject)
            .map(|idxs| {
                idxs.iter()
                    .map(|&i| &self.statements[i])
                    .filter(|st| st.predicate == predicate)
                    .map(|st| &st.object)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn object(&self, subject: &RdfNode, predicate: &str) -> Option<&'a RdfObject> {
        self.objects(subject, predicate).into_iter().next()
    }

    fn has_type(&self, subject: &RdfNode, type_iri: &str) -> bool {
        self.objects(subject, RDF_TYPE)
            .iter()
            .any(|o| o.as_iri() == Some(type_iri))
    }

    /// Items of an RDF collection; stops at `rdf:nil`, a repeated cell or a
    /// malformed cell.
    fn rdf_list(&self, head: &RdfNode) -> Vec<&'a RdfObject> {
        let mut out = Vec::new();
        let mut seen: HashSet<RdfNode> = HashSet::new();
        let mut cell = head.clone();
        loop {
            if cell.as_iri() == Some(RDF_NIL) || !seen.insert(cell.clone()) {
                break;
            }
            let Some(first) = self.object(&cell, RDF_FIRST) else {
                break;
            };
            out.push(first);
            match self.object(&cell, RDF_REST).and_then(RdfObject::as_node) {
                Some(next) => cell = next.clone(),
                None => break,
            }
        }
        out
    }

    fn collect_declarations(&mut self) {
        for st in self.statements {
            let Some(subject) = st.subject.as_iri() else {
                continue;
            };
            match st.predicate.as_str() {
                RDF_TYPE => match st.object.as_iri() {
                    Some(OWL_CLASS) => self.note_node(subject, NodeKind::Class),
                    Some(OWL_NAMED_INDIVIDUAL) => self.note_node(subject, NodeKind::Instance),
                    Some(OWL_OBJECT_PROPERTY) => {
                        self.doc.object_properties.insert(subject.to_string());
                    }
                    Some(OWL_ANNOTATION_PROPERTY) => {
                        self.doc.annotation_properties.insert(subject.to_string());
                    }
                    Some(OWL_ONTOLOGY) => {
                        self.doc.ontology_iri.get_or_insert_with(|| subject.to_string());
                    }
                    _ => {}
                },
                RDFS_LABEL => {
                    if let RdfObject::Literal(lit) = &st.object {
                        self.doc
                            .labels
                            .entry(subject.to_string())
                            .or_default()
                            .insert(lit.lexical.clone());
                    }
                }
                _ => {}
            }
        }
    }

    fn decode_statements(&mut self) {
        for st in self.statements {
            match &st.subject {
                RdfNode::Iri(subject) => self.decode_named_statement(subject, st),
                RdfNode::BlankNode(_) => {
                    if st.predicate == RDF_TYPE
                        && st.object.as_iri() == Some(OWL_ALL_DISJOINT_CLASSES)
                    {
                        self.decode_all_disjoint(&st.subject);
                    }
                }
            }
        }
    }

    fn decode_named_statement(&mut self, subject: &str, st: &RdfStatement) {
        let predicate = st.predicate.as_str();
        let RdfObject::Node(object) = &st.object else {
            return;
        };

        match (predicate, object) {
            (RDFS_SUBCLASS_OF, RdfNode::Iri(sup)) => {
                self.note_node(subject, NodeKind::Class);
                if !is_builtin(sup) {
                    self.note_node(sup, NodeKind::Class);
                    self.push_edge(subject, RDFS_SUBCLASS_OF, sup);
                }
            }
            (RDFS_SUBCLASS_OF, RdfNode::BlankNode(_)) => {
                self.note_node(subject, NodeKind::Class);
                let expr = self.decode_expr(object, 0);
                self.superclass_edges(subject, RDFS_SUBCLASS_OF, &expr, false);
            }
            (OWL_EQUIVALENT_CLASS, _) => {
                self.note_node(subject, NodeKind::Class);
                let expr = self.decode_expr(object, 0);
                self.equivalence(subject, &expr);
            }
            (OWL_DISJOINT_WITH, RdfNode::Iri(other)) => {
                self.note_node(subject, NodeKind::Class);
                self.note_node(other, NodeKind::Class);
                self.doc.axioms.push(OwlAxiom::DisjointClasses(vec![
                    subject.to_string(),
                    other.clone(),
                ]));
            }
            (OWL_DISJOINT_WITH, RdfNode::BlankNode(_)) => {
                self.doc.decode.unsupported.insert(subject.to_string());
            }
            (OWL_COMPLEMENT_OF, RdfNode::Iri(other)) => {
                self.note_node(subject, NodeKind::Class);
                self.note_node(other, NodeKind::Class);
                self.doc.decode.complement.insert(subject.to_string());
                self.doc.axioms.push(OwlAxiom::ComplementOf {
                    class: subject.to_string(),
                    complement: other.clone(),
                });
            }
            (RDF_TYPE, RdfNode::Iri(ty)) if !is_builtin(ty) => {
                self.note_node(subject, NodeKind::Instance);
                self.note_node(ty, NodeKind::Class);
                self.push_edge(subject, RDF_TYPE, ty);
            }
            (RDF_TYPE, RdfNode::BlankNode(_)) => {
                // Class assertion with an anonymous type: `i ∈ ∃p.D` → (i, p, D).
                self.note_node(subject, NodeKind::Instance);
                let expr = self.decode_expr(object, 0);
                self.superclass_edges(subject, RDF_TYPE, &expr, false);
            }
            (_, RdfNode::Iri(target)) if !is_builtin(predicate) && !is_builtin(target) => {
                self.note_node_default(subject);
                self.note_node_default(target);
                self.push_edge(subject, predicate, target);
            }
            _ => {}
        }
    }

    fn decode_all_disjoint(&mut self, head: &RdfNode) {
        let Some(list) = self.object(head, OWL_MEMBERS).and_then(RdfObject::as_node) else {
            return;
        };
        let members: Vec<String> = self
            .rdf_list(list)
            .into_iter()
            .filter_map(|o| o.as_iri().map(str::to_string))
            .collect();
        for m in &members {
            self.note_node(m, NodeKind::Class);
        }
        if members.len() > 1 {
            self.doc.axioms.push(OwlAxiom::DisjointClasses(members));
        }
    }

    fn decode_expr(&self, node: &RdfNode, depth: usize) -> ClassExpr {
        if let RdfNode::Iri(iri) = node {
            return ClassExpr::Named(iri.clone());
        }
        if depth >= MAX_EXPR_DEPTH {
            return ClassExpr::Unsupported;
        }

        let as_expr = |o: &RdfObject| match o {
            RdfObject::Node(n) => self.decode_expr(n, depth + 1),
            RdfObject::Literal(_) => ClassExpr::Unsupported,
        };

        if let Some(list) = self.object(node, OWL_UNION_OF).and_then(RdfObject::as_node) {
            return ClassExpr::Union(self.rdf_list(list).into_iter().map(as_expr).collect());
        }
        if let Some(list) = self
            .object(node, OWL_INTERSECTION_OF)
            .and_then(RdfObject::as_node)
        {
            return ClassExpr::Intersection(
                self.rdf_list(list).into_iter().map(as_expr).collect(),
            );
        }
        if let Some(inner) = self.object(node, OWL_COMPLEMENT_OF) {
            return ClassExpr::Complement(Box::new(as_expr(inner)));
        }

        let Some(property) = self
            .object(node, OWL_ON_PROPERTY)
            .and_then(RdfObject::as_iri)
            .map(str::to_string)
        else {
            return ClassExpr::Unsupported;
        };

        if let Some(filler) = self.object(node, OWL_SOME_VALUES_FROM) {
            return ClassExpr::Some {
                property,
                filler: Box::new(as_expr(filler)),
            };
        }
        if let Some(filler) = self.object(node, OWL_ALL_VALUES_FROM) {
            return ClassExpr::All {
                property,
                filler: Box::new(as_expr(filler)),
            };
        }
        if let Some(value) = self.object(node, OWL_HAS_VALUE) {
            return match value.as_iri() {
                Some(v) => ClassExpr::HasValue {
                    property,
                    value: v.to_string(),
                },
                None => ClassExpr::Unsupported,
            };
        }
        if self.object(node, OWL_HAS_SELF).is_some() {
            return ClassExpr::HasSelf { property };
        }
        if let Some(filler) = self.object(node, OWL_ON_CLASS) {
            return ClassExpr::Qualified {
                property,
                filler: Box::new(as_expr(filler)),
            };
        }
        ClassExpr::Cardinality
    }

    /// Edges for `subject ⊑ expr` (or `subject rdf:type expr` for individuals).
    ///
    /// `in_intersection` turns on the PATO rule for named conjuncts.
    fn superclass_edges(&mut self, subject: &str, link: &str, expr: &ClassExpr, in_intersection: bool) {
        match expr {
            ClassExpr::Named(target) => {
                if is_builtin(target) {
                    return;
                }
                self.note_node(target, NodeKind::Class);
                if in_intersection && is_pato(target) && !is_pato(subject) {
                    self.push_edge(subject, RO_HAS_QUALITY, target);
                } else {
                    self.push_edge(subject, link, target);
                }
            }
            ClassExpr::Some { property, filler }
            | ClassExpr::All { property, filler }
            | ClassExpr::Qualified { property, filler } => {
                if matches!(expr, ClassExpr::Qualified { .. }) {
                    self.doc.decode.cardinality.insert(subject.to_string());
                }
                let targets = self.filler_targets(filler);
                if targets.is_empty() {
                    self.doc.decode.unsupported.insert(subject.to_string());
                    return;
                }
                self.doc.decode.restrictions_decoded += 1;
                for target in targets {
                    self.note_node(&target, NodeKind::Class);
                    self.push_edge(subject, property, &target);
                }
            }
            ClassExpr::HasValue { property, value } => {
                self.doc.decode.restrictions_decoded += 1;
                self.note_node(value, NodeKind::Instance);
                self.push_edge(subject, property, value);
            }
            ClassExpr::HasSelf { property } => {
                self.doc.decode.restrictions_decoded += 1;
                self.push_edge(subject, property, subject);
            }
            ClassExpr::Cardinality => {
                self.doc.decode.cardinality.insert(subject.to_string());
            }
            ClassExpr::Intersection(parts) => {
                self.doc.decode.constructors_decoded += 1;
                for part in parts {
                    self.superclass_edges(subject, link, part, true);
                }
            }
            ClassExpr::Complement(_) => {
                self.doc.decode.complement.insert(subject.to_string());
            }
            ClassExpr::Union(_) | ClassExpr::Unsupported => {
                self.doc.decode.unsupported.insert(subject.to_string());
            }
        }
    }

    /// Named classes a restriction filler points at: the class itself, or
    /// the named members of a union/intersection filler.
    fn filler_targets(&self, filler: &ClassExpr) -> Vec<String> {
        match filler {
            ClassExpr::Named(iri) if !is_builtin(iri) => vec![iri.clone()],
            ClassExpr::Union(parts) | ClassExpr::Intersection(parts) => parts
                .iter()
                .filter_map(ClassExpr::named)
                .filter(|iri| !is_builtin(iri))
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        }
    }

    fn equivalence(&mut self, class: &str, expr: &ClassExpr) {
        match expr {
            ClassExpr::Named(other) => {
                if is_builtin(other) || other == class {
                    return;
                }
                self.note_node(other, NodeKind::Class);
                self.doc.axioms.push(OwlAxiom::EquivalentClasses(vec![
                    class.to_string(),
                    other.clone(),
                ]));
            }
            ClassExpr::Intersection(parts) => {
                self.superclass_edges(class, RDFS_SUBCLASS_OF, expr, false);
                let members: Vec<String> = parts
                    .iter()
                    .filter_map(ClassExpr::named)
                    .map(str::to_string)
                    .collect();
                let restrictions: Vec<(String, String)> = parts
                    .iter()
                    .filter_map(ClassExpr::simple_existential)
                    .map(|(p, f)| (p.to_string(), f.to_string()))
                    .collect();
                if members.len() + restrictions.len() == parts.len() && !parts.is_empty() {
                    self.doc.axioms.push(OwlAxiom::IntersectionOf {
                        class: class.to_string(),
                        members,
                        restrictions,
                    });
                }
            }
            ClassExpr::Union(parts) => {
                self.doc.decode.constructors_decoded += 1;
                let mut members = Vec::new();
                for part in parts {
                    match part.named() {
                        Some(m) if !is_builtin(m) => {
                            self.note_node(m, NodeKind::Class);
                            self.push_edge(m, RDFS_SUBCLASS_OF, class);
                            members.push(m.to_string());
                        }
                        _ => {
                            self.doc.decode.unsupported.insert(class.to_string());
                        }
                    }
                }
                if members.len() == parts.len() && !parts.is_empty() {
                    self.doc.axioms.push(OwlAxiom::UnionOf {
                        class: class.to_string(),
                        members,
                    });
                }
            }
            ClassExpr::Complement(inner) => {
                self.doc.decode.complement.insert(class.to_string());
                if let Some(other) = inner.named() {
                    self.note_node(other, NodeKind::Class);
                    self.doc.axioms.push(OwlAxiom::ComplementOf {
                        class: class.to_string(),
                        complement: other.to_string(),
                    });
                }
            }
            _ => self.superclass_edges(class, RDFS_SUBCLASS_OF, expr, false),
        }
    }

    fn note_node(&mut self, iri: &str, kind: NodeKind) {
        if is_builtin(iri) {
            return;
        }
        self.doc
            .nodes
            .entry(iri.to_string())
            .and_modify(|k| *k = k.merge(kind))
            .or_insert(kind);
    }

    /// Nodes seen only as endpoints of plain edges default to classes unless
    /// declared otherwise.
    fn note_node_default(&mut self, iri: &str) {
        if !self.doc.nodes.contains_key(iri) {
            self.note_node(iri, NodeKind::Class);
        }
    }

    fn push_edge(&mut self, subject: &str, predicate: &str, object: &str) {
        let edge = OwlEdge {
            subject: subject.to_string(),
            predicate: predicate.to_string(),
            object: object.to_string(),
        };
        if self.edge_index.insert(edge.clone()) {
            self.doc.edges.push(edge);
        }
    }

    fn finish(self) -> OntologyDocument {
        self.doc
    }
}
