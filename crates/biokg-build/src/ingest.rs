//! Ontology ingestion: decoded documents → registered per-source graphs.

use biokg_graph::{Axiom, AxiomKind, Edge, EdgeKind, IdentifierRegistry, NodeId, NodeKind, Restriction};
use biokg_ingest_rdfowl::{DecodeReport, OntologyDocument, OwlAxiom};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use crate::error::IngestError;

/// One ontology after registration: edges and axioms over internal ids.
#[derive(Debug, Clone, Default)]
pub struct OntologyGraph {
    pub source: String,
    pub edges: Vec<Edge>,
    pub axioms: Vec<Axiom>,
    pub annotation_properties: BTreeSet<String>,
    pub report: OntologyIngestReport,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OntologyIngestReport {
    pub source: String,
    pub nodes: usize,
    pub edges: usize,
    pub axioms: usize,
    pub labels: usize,
    /// Identifiers the registry refused (edges/axioms touching them dropped).
    pub invalid_identifiers: usize,
    pub decode: DecodeReport,
}

/// Read an ontology file and register it.
pub fn ingest_ontology(
    registry: &IdentifierRegistry,
    name: &str,
    path: &Path,
) -> Result<OntologyGraph, IngestError> {
    let doc = biokg_ingest_rdfowl::read_ontology(path, name).map_err(|error| {
        IngestError::Ontology {
            source_name: name.to_string(),
            error,
        }
    })?;
    Ok(register_ontology(registry, &doc))
}

/// Register every node of `doc` and translate its edges and axioms to ids.
pub fn register_ontology(registry: &IdentifierRegistry, doc: &OntologyDocument) -> OntologyGraph {
    let mut report = OntologyIngestReport {
        source: doc.source.clone(),
        decode: doc.decode.clone(),
        ..Default::default()
    };
    let mut ids: HashMap<&str, (NodeId, NodeKind)> = HashMap::with_capacity(doc.nodes.len());

    for (iri, kind) in &doc.nodes {
        match registry.register(iri, *kind) {
            Ok(id) => {
                ids.insert(iri.as_str(), (id, *kind));
                report.nodes += 1;
            }
            Err(err) => {
                report.invalid_identifiers += 1;
                tracing::debug!(source = %doc.source, error = %err, "skipping invalid ontology identifier");
            }
        }
    }

    for (iri, labels) in &doc.labels {
        if let Some((id, _)) = ids.get(iri.as_str()) {
            for label in labels {
                registry.add_label(id, label);
                report.labels += 1;
            }
        }
    }

    let mut edges = Vec::with_capacity(doc.edges.len());
    for e in &doc.edges {
        let (Some((s, sk)), Some((o, ok))) = (ids.get(e.subject.as_str()), ids.get(e.object.as_str()))
        else {
            report.invalid_identifiers += 1;
            continue;
        };
        edges.push(Edge::new(
            s.clone(),
            e.predicate.clone(),
            o.clone(),
            doc.source.clone(),
            EdgeKind::from_kinds(*sk, *ok),
        ));
    }

    let lookup = |iri: &str| ids.get(iri).map(|(id, _)| id.clone());
    let mut axioms = Vec::with_capacity(doc.axioms.len());
    for a in &doc.axioms {
        match translate_axiom(a, &doc.source, &lookup) {
            Some(axiom) => axioms.push(axiom),
            None => report.invalid_identifiers += 1,
        }
    }

    report.edges = edges.len();
    report.axioms = axioms.len();

    OntologyGraph {
        source: doc.source.clone(),
        edges,
        axioms,
        annotation_properties: doc.annotation_properties.clone(),
        report,
    }
}

fn translate_axiom<F>(axiom: &OwlAxiom, source: &str, lookup: &F) -> Option<Axiom>
where
    F: Fn(&str) -> Option<NodeId>,
{
    let ids = |iris: &[String]| iris.iter().map(|i| lookup(i.as_str())).collect::<Option<Vec<_>>>();
    let axiom = match axiom {
        OwlAxiom::EquivalentClasses(cs) => {
            Axiom::new(AxiomKind::EquivalentClasses, ids(cs)?, Vec::new(), source)
        }
        OwlAxiom::DisjointClasses(cs) => {
            Axiom::new(AxiomKind::DisjointClasses, ids(cs)?, Vec::new(), source)
        }
        OwlAxiom::ComplementOf { class, complement } => Axiom::new(
            AxiomKind::ComplementOf,
            vec![lookup(class.as_str())?, lookup(complement.as_str())?],
            Vec::new(),
            source,
        ),
        OwlAxiom::UnionOf { class, members } => {
            let mut operands = vec![lookup(class.as_str())?];
            operands.extend(ids(members)?);
            Axiom::new(AxiomKind::UnionOf, operands, Vec::new(), source)
        }
        OwlAxiom::IntersectionOf {
            class,
            members,
            restrictions,
        } => {
            let mut operands = vec![lookup(class.as_str())?];
            operands.extend(ids(members)?);
            let restrictions = restrictions
                .iter()
                .map(|(p, f)| {
                    lookup(f.as_str()).map(|filler| Restriction {
                        property: p.clone(),
                        filler,
                    })
                })
                .collect::<Option<Vec<_>>>()?;
            Axiom::new(AxiomKind::IntersectionOf, operands, restrictions, source)
        }
    };
    // Equivalence/disjointness between a class and itself carries nothing.
    if axiom.kind.is_symmetric() && axiom.operands.len() < 2 {
        return None;
    }
    Some(axiom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use biokg_ingest_rdfowl::{parse_rdf_statements, RdfFormat};

    #[test]
    fn registers_nodes_and_translates_axioms() {
        let ttl = r#"
@prefix obo: <http://purl.obolibrary.org/obo/> .
@prefix owl: <http://www.w3.org/2002/07/owl#> .
@prefix rdfs: <http://www.w3.org/2000/01/rdf-schema#> .
obo:HP_1 a owl:Class ; rdfs:label "one" ; rdfs:subClassOf obo:HP_0 ; owl:disjointWith obo:HP_2 .
obo:HP_3 a owl:Class ; owl:equivalentClass [ owl:intersectionOf ( obo:HP_1
    [ a owl:Restriction ; owl:onProperty obo:RO_1 ; owl:someValuesFrom obo:UBERON_1 ] ) ] .
"#;
        let statements = parse_rdf_statements(ttl.as_bytes(), RdfFormat::Turtle).unwrap();
        let doc = OntologyDocument::from_statements("hp", &statements);

        let registry = IdentifierRegistry::new();
        let graph = register_ontology(&registry, &doc);

        assert_eq!(graph.report.invalid_identifiers, 0);
        assert!(registry.resolve("HP:1").is_ok());
        assert!(registry.resolve("UBERON:1").is_ok());
        assert_eq!(
            registry
                .display_label(&registry.resolve("HP:1").unwrap())
                .as_deref(),
            Some("one")
        );
        assert!(graph.edges.iter().all(|e| e.kind == EdgeKind::ClassClass));
        let kinds: Vec<_> = graph.axioms.iter().map(|a| a.kind).collect();
        assert!(kinds.contains(&AxiomKind::DisjointClasses));
        assert!(kinds.contains(&AxiomKind::IntersectionOf));
        assert!(graph.axioms.iter().all(|a| a.provenance == "hp"));
    }
}
