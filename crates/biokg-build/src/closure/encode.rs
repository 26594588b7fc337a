//! Working graph → OWL in N-Triples, the reasoner's input.
//!
//! Class-level edges other than `rdfs:subClassOf` become existential
//! restrictions so an EL reasoner can use them:
//!
//! | subject  | object   | encoding                         |
//! |----------|----------|----------------------------------|
//! | class    | class    | `s ⊑ ∃p.o`                       |
//! | class    | instance | `s ⊑ ∃p.{o}` (`owl:hasValue`)    |
//! | instance | class    | `s rdf:type ∃p.o`                |
//! | instance | instance | plain object property assertion  |

use biokg_graph::vocab::*;
use biokg_graph::{Axiom, AxiomKind, NodeId, NodeKind, WorkingGraph};
use biokg_ingest_rdfowl::ntriples::{NTriplesWriter, Term};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::io::{self, Write};

pub const CLOSURE_ONTOLOGY_IRI: &str = "https://biokg.local/closure-input";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodeStats {
    pub triples: usize,
    pub classes: usize,
    pub individuals: usize,
    pub edges: usize,
    pub axioms: usize,
    /// Annotation-property edges; they carry nothing a reasoner can use.
    pub skipped_annotation: usize,
    /// `rdfs:subClassOf` / `rdf:type` edges whose endpoint kinds do not fit.
    pub skipped_mismatched: usize,
}

pub fn encode_graph<W: Write>(graph: &WorkingGraph, out: W) -> io::Result<EncodeStats> {
    let mut w = NTriplesWriter::new(out);
    let mut stats = EncodeStats::default();

    w.iri_triple(CLOSURE_ONTOLOGY_IRI, RDF_TYPE, OWL_ONTOLOGY)?;

    for (id, kind) in graph.nodes() {
        match kind {
            NodeKind::Class => {
                w.iri_triple(id.as_str(), RDF_TYPE, OWL_CLASS)?;
                stats.classes += 1;
            }
            NodeKind::Instance => {
                w.iri_triple(id.as_str(), RDF_TYPE, OWL_NAMED_INDIVIDUAL)?;
                stats.individuals += 1;
            }
        }
    }

    let properties: BTreeSet<&str> = graph
        .edges()
        .iter()
        .map(|e| e.predicate.as_str())
        .filter(|p| !is_builtin(p) && !graph.is_annotation_property(p))
        .collect();
    for p in &properties {
        w.iri_triple(p, RDF_TYPE, OWL_OBJECT_PROPERTY)?;
    }

    let kind_of = |id: &NodeId| graph.node_kind(id).unwrap_or(NodeKind::Class);
    for edge in graph.edges() {
        if graph.is_annotation_property(&edge.predicate) {
            stats.skipped_annotation += 1;
            continue;
        }
        let s = edge.subject.as_str();
        let o = edge.object.as_str();
        let p = edge.predicate.as_str();
        let kinds = (kind_of(&edge.subject), kind_of(&edge.object));

        match p {
            RDFS_SUBCLASS_OF => {
                if kinds != (NodeKind::Class, NodeKind::Class) {
                    stats.skipped_mismatched += 1;
                    continue;
                }
                w.iri_triple(s, RDFS_SUBCLASS_OF, o)?;
            }
            RDF_TYPE => {
                if kinds != (NodeKind::Instance, NodeKind::Class) {
                    stats.skipped_mismatched += 1;
                    continue;
                }
                w.iri_triple(s, RDF_TYPE, o)?;
            }
            _ => match kinds {
                (NodeKind::Class, NodeKind::Class) => {
                    let r = restriction(&mut w, p, OWL_SOME_VALUES_FROM, o)?;
                    w.triple(&Term::iri(s), RDFS_SUBCLASS_OF, &r)?;
                }
                (NodeKind::Class, NodeKind::Instance) => {
                    let r = restriction(&mut w, p, OWL_HAS_VALUE, o)?;
                    w.triple(&Term::iri(s), RDFS_SUBCLASS_OF, &r)?;
                }
                (NodeKind::Instance, NodeKind::Class) => {
                    let r = restriction(&mut w, p, OWL_SOME_VALUES_FROM, o)?;
                    w.triple(&Term::iri(s), RDF_TYPE, &r)?;
                }
                (NodeKind::Instance, NodeKind::Instance) => {
                    w.iri_triple(s, p, o)?;
                }
            },
        }
        stats.edges += 1;
    }

    for axiom in graph.axioms() {
        encode_axiom(&mut w, axiom)?;
        stats.axioms += 1;
    }

    stats.triples = w.triples_written();
    w.finish()?;
    Ok(stats)
}

/// `[ a owl:Restriction ; owl:onProperty p ; <value_predicate> value ]`
fn restriction<W: Write>(
    w: &mut NTriplesWriter<W>,
    property: &str,
    value_predicate: &str,
    value: &str,
) -> io::Result<Term> {
    let node = w.fresh_blank();
    w.triple(&node, RDF_TYPE, &Term::iri(OWL_RESTRICTION))?;
    w.triple(&node, OWL_ON_PROPERTY, &Term::iri(property))?;
    w.triple(&node, value_predicate, &Term::iri(value))?;
    Ok(node)
}

fn encode_axiom<W: Write>(w: &mut NTriplesWriter<W>, axiom: &Axiom) -> io::Result<()> {
    let ops = &axiom.operands;
    match axiom.kind {
        AxiomKind::EquivalentClasses => {
            for pair in ops.windows(2) {
                w.iri_triple(pair[0].as_str(), OWL_EQUIVALENT_CLASS, pair[1].as_str())?;
            }
        }
        AxiomKind::DisjointClasses => {
            if ops.len() == 2 {
                w.iri_triple(ops[0].as_str(), OWL_DISJOINT_WITH, ops[1].as_str())?;
            } else if ops.len() > 2 {
                let items: Vec<Term> = ops.iter().map(|id| Term::iri(id.as_str())).collect();
                let head = w.list(&items)?;
                let node = w.fresh_blank();
                w.triple(&node, RDF_TYPE, &Term::iri(OWL_ALL_DISJOINT_CLASSES))?;
                w.triple(&node, OWL_MEMBERS, &head)?;
            }
        }
        AxiomKind::ComplementOf => {
            if let [class, complement] = ops.as_slice() {
                w.iri_triple(class.as_str(), OWL_COMPLEMENT_OF, complement.as_str())?;
            }
        }
        AxiomKind::UnionOf | AxiomKind::IntersectionOf => {
            let Some((class, members)) = ops.split_first() else {
                return Ok(());
            };
            let mut items: Vec<Term> = members.iter().map(|m| Term::iri(m.as_str())).collect();
            for r in &axiom.restrictions {
                items.push(restriction(
                    w,
                    &r.property,
                    OWL_SOME_VALUES_FROM,
                    r.filler.as_str(),
                )?);
            }
            let head = w.list(&items)?;
            let constructor = if axiom.kind == AxiomKind::UnionOf {
                OWL_UNION_OF
            } else {
                OWL_INTERSECTION_OF
            };
            let node = w.fresh_blank();
            w.triple(&node, RDF_TYPE, &Term::iri(OWL_CLASS))?;
            w.triple(&node, constructor, &head)?;
            w.triple(&Term::iri(class.as_str()), OWL_EQUIVALENT_CLASS, &node)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use biokg_graph::{Edge, EdgeKind, Restriction};
    use biokg_ingest_rdfowl::{parse_rdf_statements, OntologyDocument, OwlEdge, RdfFormat};

    fn id(s: &str) -> NodeId {
        NodeId::from_iri(format!("{OBO_NS}{s}"))
    }

    #[test]
    fn encoded_graph_decodes_to_the_same_edges() {
        let mut g = WorkingGraph::new();
        g.insert_node(id("HP_1"), NodeKind::Class);
        g.insert_node(id("HP_0"), NodeKind::Class);
        g.insert_node(id("UBERON_1"), NodeKind::Class);
        g.insert_node(id("GENE_1"), NodeKind::Instance);
        g.insert_node(id("GENE_2"), NodeKind::Instance);
        let edges = [
            (id("HP_1"), RDFS_SUBCLASS_OF, id("HP_0")),
            (id("HP_1"), "http://purl.obolibrary.org/obo/RO_1", id("UBERON_1")),
            (id("GENE_1"), "http://purl.obolibrary.org/obo/RO_2", id("GENE_2")),
            (id("GENE_1"), RDF_TYPE, id("HP_0")),
        ];
        for (s, p, o) in edges {
            g.add_edge(Edge::new(s, p, o, "t", EdgeKind::ClassClass));
        }
        g.add_axiom(Axiom::new(
            AxiomKind::IntersectionOf,
            vec![id("HP_2"), id("HP_0")],
            vec![Restriction {
                property: "http://purl.obolibrary.org/obo/RO_1".to_string(),
                filler: id("UBERON_1"),
            }],
            "t",
        ));

        let mut buf = Vec::new();
        let stats = encode_graph(&g, &mut buf).unwrap();
        assert_eq!(stats.classes, 3);
        assert_eq!(stats.individuals, 2);
        assert_eq!(stats.edges, 4);

        let statements = parse_rdf_statements(&buf, RdfFormat::NTriples).unwrap();
        assert_eq!(statements.len(), stats.triples);
        let doc = OntologyDocument::from_statements("closure", &statements);
        let has = |s: &NodeId, p: &str, o: &NodeId| {
            doc.edges.contains(&OwlEdge {
                subject: s.to_string(),
                predicate: p.to_string(),
                object: o.to_string(),
            })
        };
        assert!(has(&id("HP_1"), RDFS_SUBCLASS_OF, &id("HP_0")));
        assert!(has(&id("HP_1"), "http://purl.obolibrary.org/obo/RO_1", &id("UBERON_1")));
        assert!(has(&id("GENE_1"), "http://purl.obolibrary.org/obo/RO_2", &id("GENE_2")));
        assert!(has(&id("GENE_1"), RDF_TYPE, &id("HP_0")));
        assert_eq!(doc.axioms.len(), 1);
    }

    #[test]
    fn annotation_edges_are_not_encoded() {
        let mut g = WorkingGraph::new();
        g.insert_node(id("HP_1"), NodeKind::Class);
        g.insert_node(id("HP_2"), NodeKind::Class);
        g.declare_annotation_property("http://purl.obolibrary.org/obo/IAO_0000115");
        g.add_edge(Edge::new(
            id("HP_1"),
            "http://purl.obolibrary.org/obo/IAO_0000115",
            id("HP_2"),
            "t",
            EdgeKind::ClassClass,
        ));
        let stats = encode_graph(&g, Vec::new()).unwrap();
        assert_eq!(stats.skipped_annotation, 1);
        assert_eq!(stats.edges, 0);
    }
}
