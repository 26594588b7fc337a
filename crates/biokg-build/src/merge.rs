//! Ontology Merger: N per-source ontology graphs → one class graph.
//!
//! Nodes are already unified by the registry, so merging is a union of
//! edges and axioms plus two consistency checks across sources:
//!
//! 1. Axiom conflicts. Each source's equivalences are closed transitively
//!    first. Two sources conflict on a class when neither entailed
//!    equivalence set contains the other, when their union/intersection
//!    definitions differ, or when one entails `A ≡ B` and another says `A`
//!    and `B` are disjoint/complementary. The highest-priority source wins;
//!    the others' axioms about the class are dropped.
//! 2. Subclass cycles. Inside a strongly connected component of the merged
//!    `rdfs:subClassOf` graph, an edge is pre-existing when some source that
//!    asserts it also has both endpoints strongly connected on its own. A
//!    component made only of such edges is kept. Otherwise its new edges
//!    asserted only by the lowest-priority source are dropped, until no new
//!    cycle remains.
//!
//! A conflict that involves a source missing from the priority list is a
//! [`MergeConflictError`].

use biokg_graph::vocab::RDFS_SUBCLASS_OF;
use biokg_graph::{Axiom, AxiomKey, AxiomKind, Edge, EdgeKey, NodeId, WorkingGraph};
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::error::MergeConflictError;
use crate::ingest::OntologyGraph;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedConflict {
    pub class: String,
    pub winner: String,
    pub overridden: Vec<String>,
    pub dropped_axioms: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeReport {
    pub sources: Vec<String>,
    pub edges: usize,
    pub axioms: usize,
    pub duplicate_edges: usize,
    pub duplicate_axioms: usize,
    pub conflicts: Vec<ResolvedConflict>,
    /// Subclass cycles present in a single source; kept as-is.
    pub tolerated_cycles: Vec<Vec<String>>,
    /// Edges removed to break cycles that only appear after merging.
    pub dropped_cycle_edges: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct MergedOntology {
    pub graph: WorkingGraph,
    pub report: MergeReport,
}

#[derive(Debug, Default)]
struct ClassConflict {
    sources: BTreeSet<String>,
    details: Vec<String>,
}

struct MergedEdge {
    edge: Edge,
    contributors: BTreeSet<String>,
}

#[derive(Debug, Clone, Default)]
pub struct OntologyMerger {
    priority: Vec<String>,
}

impl OntologyMerger {
    /// `priority` lists source names, highest priority first.
    pub fn new(priority: Vec<String>) -> Self {
        Self { priority }
    }

    fn rank(&self, source: &str) -> Option<usize> {
        self.priority.iter().position(|p| p == source)
    }

    pub fn merge(&self, sources: &[OntologyGraph]) -> Result<MergedOntology, MergeConflictError> {
        let mut report = MergeReport {
            sources: sources.iter().map(|s| s.source.clone()).collect(),
            ..Default::default()
        };

        // Edge union; the first source to assert an edge keeps provenance.
        let mut slots: HashMap<EdgeKey, usize> = HashMap::new();
        let mut edges: Vec<MergedEdge> = Vec::new();
        for src in sources {
            for edge in &src.edges {
                match slots.entry(edge.key()) {
                    Entry::Occupied(slot) => {
                        edges[*slot.get()].contributors.insert(src.source.clone());
                        report.duplicate_edges += 1;
                    }
                    Entry::Vacant(slot) => {
                        slot.insert(edges.len());
                        edges.push(MergedEdge {
                            edge: edge.clone(),
                            contributors: BTreeSet::from([src.source.clone()]),
                        });
                    }
                }
            }
        }

        let dropped = self.resolve_axiom_conflicts(sources, &mut report)?;
        let alive = self.break_new_cycles(&edges, &mut report)?;

        let mut graph = WorkingGraph::new();
        for (merged, keep) in edges.into_iter().zip(alive) {
            if keep {
                graph.add_edge(merged.edge);
            }
        }
        for (si, src) in sources.iter().enumerate() {
            for (ai, axiom) in src.axioms.iter().enumerate() {
                if dropped.contains(&(si, ai)) {
                    continue;
                }
                if !graph.add_axiom(axiom.clone()) {
                    report.duplicate_axioms += 1;
                }
            }
            for p in &src.annotation_properties {
                graph.declare_annotation_property(p.clone());
            }
        }

        report.edges = graph.edge_count();
        report.axioms = graph.axiom_count();
        tracing::info!(
            sources = sources.len(),
            edges = report.edges,
            axioms = report.axioms,
            conflicts = report.conflicts.len(),
            dropped_cycle_edges = report.dropped_cycle_edges.len(),
            "merged ontologies"
        );
        Ok(MergedOntology { graph, report })
    }

    /// Returns the `(source index, axiom index)` pairs to drop.
    fn resolve_axiom_conflicts(
        &self,
        sources: &[OntologyGraph],
        report: &mut MergeReport,
    ) -> Result<HashSet<(usize, usize)>, MergeConflictError> {
        let conflicts = detect_conflicts(sources);
        let mut dropped = HashSet::new();

        for (class, conflict) in conflicts {
            let unranked: Vec<&str> = conflict
                .sources
                .iter()
                .filter(|s| self.rank(s).is_none())
                .map(String::as_str)
                .collect();
            if !unranked.is_empty() {
                return Err(MergeConflictError {
                    subject_ids: vec![class.to_string()],
                    axioms: conflict.details,
                    detail: format!(
                        "sources {} disagree and {} not ranked in merge.priority",
                        join(conflict.sources.iter()),
                        join(unranked.iter())
                    ),
                });
            }

            let Some(winner) = conflict
                .sources
                .iter()
                .min_by_key(|s| self.rank(s))
                .cloned()
            else {
                continue;
            };

            let mut resolved = ResolvedConflict {
                class: class.to_string(),
                winner: winner.clone(),
                ..Default::default()
            };
            for (si, src) in sources.iter().enumerate() {
                if src.source == winner || !conflict.sources.contains(&src.source) {
                    continue;
                }
                resolved.overridden.push(src.source.clone());
                for (ai, axiom) in src.axioms.iter().enumerate() {
                    if axiom.operands.contains(&class) && dropped.insert((si, ai)) {
                        resolved.dropped_axioms.push(describe_axiom(axiom));
                    }
                }
            }
            tracing::warn!(
                class = %class,
                winner = %winner,
                dropped = resolved.dropped_axioms.len(),
                "resolved axiom conflict by source priority"
            );
            report.conflicts.push(resolved);
        }
        Ok(dropped)
    }

    /// Returns which merged edges survive cycle breaking.
    fn break_new_cycles(
        &self,
        edges: &[MergedEdge],
        report: &mut MergeReport,
    ) -> Result<Vec<bool>, MergeConflictError> {
        let mut alive = vec![true; edges.len()];
        let mut tolerated: BTreeSet<Vec<String>> = BTreeSet::new();

        'search: loop {
            let subclass: Vec<usize> = (0..edges.len())
                .filter(|&i| {
                    alive[i]
                        && edges[i].edge.predicate == RDFS_SUBCLASS_OF
                        && edges[i].edge.subject != edges[i].edge.object
                })
                .collect();

            let components = strongly_connected(
                subclass
                    .iter()
                    .map(|&i| (&edges[i].edge.subject, &edges[i].edge.object)),
            );

            for component in components {
                let members: HashSet<&NodeId> = component.iter().copied().collect();
                let intra: Vec<usize> = subclass
                    .iter()
                    .copied()
                    .filter(|&i| {
                        members.contains(&edges[i].edge.subject)
                            && members.contains(&edges[i].edge.object)
                    })
                    .collect();
                let ids: Vec<String> = component.iter().map(|id| id.to_string()).collect();

                let fresh = new_cycle_edges(edges, &intra);
                if fresh.is_empty() {
                    tolerated.insert(ids);
                    continue;
                }

                let contributors: BTreeSet<&str> = fresh
                    .iter()
                    .flat_map(|&i| edges[i].contributors.iter().map(String::as_str))
                    .collect();
                let described: Vec<String> = fresh
                    .iter()
                    .map(|&i| describe_edge(&edges[i]))
                    .collect();
                let unranked: Vec<&str> = contributors
                    .iter()
                    .copied()
                    .filter(|s| self.rank(s).is_none())
                    .collect();
                if !unranked.is_empty() {
                    return Err(MergeConflictError {
                        subject_ids: ids,
                        axioms: described,
                        detail: format!(
                            "subclass cycle created by merging {}; {} not ranked in merge.priority",
                            join(contributors.iter()),
                            join(unranked.iter())
                        ),
                    });
                }

                // Lowest-priority source that is the only asserter of some new edge.
                let lowest = fresh
                    .iter()
                    .filter(|&&i| edges[i].contributors.len() == 1)
                    .filter_map(|&i| edges[i].contributors.iter().next())
                    .max_by_key(|s| self.rank(s));
                let Some(lowest) = lowest else {
                    return Err(MergeConflictError {
                        subject_ids: ids,
                        axioms: described,
                        detail: "subclass cycle where every new edge is asserted by several sources"
                            .to_string(),
                    });
                };

                for &i in &fresh {
                    let c = &edges[i].contributors;
                    if c.len() == 1 && c.contains(lowest) {
                        alive[i] = false;
                        report.dropped_cycle_edges.push(describe_edge(&edges[i]));
                    }
                }
                tracing::warn!(
                    cycle = %ids.join(", "),
                    source = %lowest,
                    "broke subclass cycle created by merge"
                );
                continue 'search;
            }
            break;
        }

        report.tolerated_cycles = tolerated.into_iter().collect();
        Ok(alive)
    }
}

/// Non-trivial strongly connected components, members sorted, components
/// sorted by their smallest member.
fn strongly_connected<'a, I>(edges: I) -> Vec<Vec<&'a NodeId>>
where
    I: IntoIterator<Item = (&'a NodeId, &'a NodeId)>,
{
    let mut graph: DiGraph<&'a NodeId, ()> = DiGraph::new();
    let mut index: HashMap<&'a NodeId, NodeIndex> = HashMap::new();
    for (s, o) in edges {
        let si = *index.entry(s).or_insert_with(|| graph.add_node(s));
        let oi = *index.entry(o).or_insert_with(|| graph.add_node(o));
        graph.add_edge(si, oi, ());
    }
    let mut components: Vec<Vec<&NodeId>> = tarjan_scc(&graph)
        .into_iter()
        .filter(|c| c.len() > 1)
        .map(|c| {
            let mut ids: Vec<&NodeId> = c.into_iter().map(|n| graph[n]).collect();
            ids.sort();
            ids
        })
        .collect();
    components.sort();
    components
}

/// Edges among `intra` that no asserting source closes into a cycle on its
/// own: neither endpoint pair shares a strongly connected component of that
/// source's edges.
fn new_cycle_edges(edges: &[MergedEdge], intra: &[usize]) -> Vec<usize> {
    let sources: BTreeSet<&str> = intra
        .iter()
        .flat_map(|&i| edges[i].contributors.iter().map(String::as_str))
        .collect();
    let own_components: HashMap<&str, HashMap<&NodeId, usize>> = sources
        .into_iter()
        .map(|src| {
            let own = intra
                .iter()
                .filter(|&&i| edges[i].contributors.contains(src))
                .map(|&i| (&edges[i].edge.subject, &edges[i].edge.object));
            let mut membership = HashMap::new();
            for (ci, component) in strongly_connected(own).into_iter().enumerate() {
                for id in component {
                    membership.insert(id, ci);
                }
            }
            (src, membership)
        })
        .collect();

    intra
        .iter()
        .copied()
        .filter(|&i| {
            let edge = &edges[i].edge;
            !edges[i].contributors.iter().any(|src| {
                own_components.get(src.as_str()).is_some_and(|m| {
                    matches!(
                        (m.get(&edge.subject), m.get(&edge.object)),
                        (Some(a), Some(b)) if a == b
                    )
                })
            })
        })
        .collect()
}

fn detect_conflicts(sources: &[OntologyGraph]) -> BTreeMap<NodeId, ClassConflict> {
    type PerSource<T> = BTreeMap<NodeId, BTreeMap<String, BTreeSet<T>>>;
    let mut equivalents: PerSource<NodeId> = BTreeMap::new();
    let mut definitions: PerSource<AxiomKey> = BTreeMap::new();
    let mut positive: BTreeMap<(NodeId, NodeId), BTreeSet<String>> = BTreeMap::new();
    let mut negative: BTreeMap<(NodeId, NodeId), BTreeSet<String>> = BTreeMap::new();

    for src in sources {
        // Equivalence links in both directions; components are the source's
        // entailed equivalence classes.
        let links = src
            .axioms
            .iter()
            .filter(|a| a.kind == AxiomKind::EquivalentClasses)
            .flat_map(|a| a.operands.windows(2).flat_map(|w| [(&w[0], &w[1]), (&w[1], &w[0])]));
        for component in strongly_connected(links) {
            let members: Vec<NodeId> = component.into_iter().cloned().collect();
            for c in &members {
                let others = members.iter().filter(|o| *o != c).cloned();
                equivalents
                    .entry(c.clone())
                    .or_default()
                    .entry(src.source.clone())
                    .or_default()
                    .extend(others);
            }
            for pair in pairs(&members) {
                positive.entry(pair).or_default().insert(src.source.clone());
            }
        }

        for axiom in &src.axioms {
            match axiom.kind {
                AxiomKind::EquivalentClasses => {}
                AxiomKind::DisjointClasses | AxiomKind::ComplementOf => {
                    for pair in pairs(&axiom.operands) {
                        negative.entry(pair).or_default().insert(src.source.clone());
                    }
                }
                AxiomKind::UnionOf | AxiomKind::IntersectionOf => {
                    if let Some(defined) = axiom.defined_class() {
                        definitions
                            .entry(defined.clone())
                            .or_default()
                            .entry(src.source.clone())
                            .or_default()
                            .insert(axiom.key());
                    }
                }
            }
        }
    }

    let mut conflicts: BTreeMap<NodeId, ClassConflict> = BTreeMap::new();

    for (class, per_source) in &equivalents {
        let sets: Vec<&BTreeSet<NodeId>> = per_source.values().collect();
        let incompatible = sets.iter().enumerate().any(|(i, a)| {
            sets[i + 1..]
                .iter()
                .any(|b| !a.is_subset(b) && !b.is_subset(a))
        });
        if incompatible {
            let entry = conflicts.entry(class.clone()).or_default();
            for (source, set) in per_source {
                entry.sources.insert(source.clone());
                entry.details.push(format!(
                    "equivalent_classes({class} ≡ {}) [{source}]",
                    join(set.iter())
                ));
            }
        }
    }

    for (class, per_source) in &definitions {
        let distinct: BTreeSet<&BTreeSet<AxiomKey>> = per_source.values().collect();
        if distinct.len() > 1 {
            let entry = conflicts.entry(class.clone()).or_default();
            for (source, keys) in per_source {
                entry.sources.insert(source.clone());
                for key in keys {
                    entry.details.push(format!(
                        "{}({}) [{source}]",
                        key.kind,
                        join(key.operands.iter())
                    ));
                }
            }
        }
    }

    for (pair, pos_sources) in &positive {
        let Some(neg_sources) = negative.get(pair) else {
            continue;
        };
        let involved: BTreeSet<String> = pos_sources.union(neg_sources).cloned().collect();
        if involved.len() < 2 {
            continue;
        }
        let detail = format!(
            "{} ≡ {} [{}] contradicts disjointness/complement [{}]",
            pair.0,
            pair.1,
            join(pos_sources.iter()),
            join(neg_sources.iter())
        );
        for class in [&pair.0, &pair.1] {
            let entry = conflicts.entry(class.clone()).or_default();
            entry.sources.extend(involved.iter().cloned());
            entry.details.push(detail.clone());
        }
    }

    conflicts
}

fn pairs(ids: &[NodeId]) -> Vec<(NodeId, NodeId)> {
    let mut out = Vec::new();
    for (i, a) in ids.iter().enumerate() {
        for b in &ids[i + 1..] {
            if a == b {
                continue;
            }
            let (lo, hi) = if a < b { (a, b) } else { (b, a) };
            out.push((lo.clone(), hi.clone()));
        }
    }
    out
}

fn join<T: std::fmt::Display>(items: impl Iterator<Item = T>) -> String {
    items.map(|t| t.to_string()).collect::<Vec<_>>().join(", ")
}

pub(crate) fn describe_axiom(axiom: &Axiom) -> String {
    let mut parts: Vec<String> = axiom.operands.iter().map(|o| o.to_string()).collect();
    parts.extend(
        axiom
            .restrictions
            .iter()
            .map(|r| format!("∃{}.{}", r.property, r.filler)),
    );
    format!("{}({}) [{}]", axiom.kind, parts.join(", "), axiom.provenance)
}

fn describe_edge(merged: &MergedEdge) -> String {
    format!(
        "{} {} {} [{}]",
        merged.edge.subject,
        merged.edge.predicate,
        merged.edge.object,
        join(merged.contributors.iter())
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use biokg_graph::EdgeKind;

    fn id(s: &str) -> NodeId {
        NodeId::from_iri(format!("http://purl.obolibrary.org/obo/{s}"))
    }

    fn source(name: &str, subclass: &[(&str, &str)], axioms: Vec<Axiom>) -> OntologyGraph {
        OntologyGraph {
            source: name.to_string(),
            edges: subclass
                .iter()
                .map(|(s, o)| Edge::new(id(s), RDFS_SUBCLASS_OF, id(o), name, EdgeKind::ClassClass))
                .collect(),
            axioms,
            ..Default::default()
        }
    }

    fn equiv(a: &str, b: &str, src: &str) -> Axiom {
        Axiom::pair(AxiomKind::EquivalentClasses, id(a), id(b), src)
    }

    #[test]
    fn shared_edges_are_unioned_once_with_first_provenance() {
        let a = source("a", &[("C_1", "C_0")], vec![]);
        let b = source("b", &[("C_1", "C_0"), ("C_2", "C_0")], vec![]);
        let merged = OntologyMerger::default().merge(&[a, b]).unwrap();
        assert_eq!(merged.graph.edge_count(), 2);
        assert_eq!(merged.graph.edges()[0].provenance, "a");
        assert_eq!(merged.report.duplicate_edges, 1);
    }

    #[test]
    fn priority_keeps_the_higher_ranked_sources_axioms() {
        let a = source("a", &[], vec![equiv("C_1", "X_1", "a")]);
        let b = source("b", &[], vec![equiv("C_1", "Y_1", "b")]);
        let merged = OntologyMerger::new(vec!["a".into(), "b".into()])
            .merge(&[a, b])
            .unwrap();

        let axioms = merged.graph.axioms();
        assert_eq!(axioms.len(), 1);
        assert_eq!(axioms[0].provenance, "a");
        assert!(axioms[0].mentions(&id("X_1")));

        let conflict = &merged.report.conflicts[0];
        assert_eq!(conflict.winner, "a");
        assert_eq!(conflict.overridden, vec!["b".to_string()]);
    }

    #[test]
    fn equivalence_contradicted_by_disjointness_follows_priority() {
        let a = source("a", &[], vec![equiv("C_1", "C_2", "a")]);
        let b = source(
            "b",
            &[],
            vec![Axiom::pair(AxiomKind::DisjointClasses, id("C_1"), id("C_2"), "b")],
        );
        let merged = OntologyMerger::new(vec!["b".into(), "a".into()])
            .merge(&[a, b])
            .unwrap();
        let kinds: Vec<_> = merged.graph.axioms().iter().map(|a| a.kind).collect();
        assert_eq!(kinds, vec![AxiomKind::DisjointClasses]);
    }

    #[test]
    fn unranked_conflict_is_fatal_and_names_the_class() {
        let a = source("a", &[], vec![equiv("C_1", "X_1", "a")]);
        let b = source("b", &[], vec![equiv("C_1", "Y_1", "b")]);
        let err = OntologyMerger::new(vec!["a".into()])
            .merge(&[a, b])
            .unwrap_err();
        assert!(err.subject_ids.contains(&id("C_1").to_string()));
        assert_eq!(err.axioms.len(), 2);
    }

    #[test]
    fn new_cycle_is_broken_by_dropping_the_lowest_priority_edge() {
        let a = source("a", &[("X_1", "Y_1")], vec![]);
        let b = source("b", &[("Y_1", "X_1")], vec![]);
        let merged = OntologyMerger::new(vec!["a".into(), "b".into()])
            .merge(&[a, b])
            .unwrap();
        assert_eq!(merged.graph.edge_count(), 1);
        assert_eq!(merged.graph.edges()[0].subject, id("X_1"));
        assert_eq!(merged.report.dropped_cycle_edges.len(), 1);
    }

    #[test]
    fn new_cycle_from_unranked_sources_is_a_merge_conflict() {
        let a = source("a", &[("X_1", "Y_1"), ("Y_1", "Z_1")], vec![]);
        let b = source("b", &[("Z_1", "X_1")], vec![]);
        let err = OntologyMerger::default().merge(&[a, b]).unwrap_err();
        assert_eq!(
            err.subject_ids,
            vec![id("X_1").to_string(), id("Y_1").to_string(), id("Z_1").to_string()]
        );
        assert_eq!(err.axioms.len(), 3);
    }

    #[test]
    fn cycles_from_different_sources_sharing_a_node_are_tolerated() {
        let a = source("a", &[("X_1", "Y_1"), ("Y_1", "X_1")], vec![]);
        let b = source("b", &[("X_1", "Z_1"), ("Z_1", "X_1")], vec![]);
        let merged = OntologyMerger::default().merge(&[a, b]).unwrap();
        assert_eq!(merged.graph.edge_count(), 4);
        assert_eq!(
            merged.report.tolerated_cycles,
            vec![vec![id("X_1").to_string(), id("Y_1").to_string(), id("Z_1").to_string()]]
        );
        assert!(merged.report.dropped_cycle_edges.is_empty());
    }

    #[test]
    fn only_new_edges_are_dropped_from_a_mixed_component() {
        let a = source("a", &[("X_1", "Y_1"), ("Y_1", "X_1")], vec![]);
        let b = source("b", &[("Y_1", "Z_1"), ("Z_1", "X_1")], vec![]);
        let merged = OntologyMerger::new(vec!["a".into(), "b".into()])
            .merge(&[a, b])
            .unwrap();
        assert_eq!(merged.graph.edge_count(), 2);
        assert!(merged.graph.edges().iter().all(|e| e.provenance == "a"));
        assert_eq!(merged.report.dropped_cycle_edges.len(), 2);
    }

    #[test]
    fn entailed_equivalence_that_agrees_is_not_a_conflict() {
        let a = source("a", &[], vec![equiv("C_1", "X_1", "a"), equiv("X_1", "Y_1", "a")]);
        let b = source("b", &[], vec![equiv("C_1", "Y_1", "b")]);
        let merged = OntologyMerger::default().merge(&[a, b]).unwrap();
        assert!(merged.report.conflicts.is_empty());
        assert_eq!(merged.graph.axiom_count(), 3);
    }

    #[test]
    fn entailed_equivalence_contradicted_by_disjointness_is_a_conflict() {
        let a = source("a", &[], vec![equiv("C_1", "X_1", "a"), equiv("X_1", "Y_1", "a")]);
        let b = source(
            "b",
            &[],
            vec![Axiom::pair(AxiomKind::DisjointClasses, id("C_1"), id("Y_1"), "b")],
        );
        let err = OntologyMerger::default().merge(&[a, b]).unwrap_err();
        assert!(err.subject_ids.contains(&id("C_1").to_string())
            || err.subject_ids.contains(&id("Y_1").to_string()));
    }

    #[test]
    fn cycle_present_in_one_source_is_tolerated() {
        let a = source("a", &[("X_1", "Y_1"), ("Y_1", "X_1")], vec![]);
        let b = source("b", &[("X_1", "Z_1")], vec![]);
        let merged = OntologyMerger::default().merge(&[a, b]).unwrap();
        assert_eq!(merged.graph.edge_count(), 3);
        assert_eq!(merged.report.tolerated_cycles.len(), 1);
    }
}
