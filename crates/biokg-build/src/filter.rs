//! Clinical Relevance Filter: drop edges and axioms that do not belong in
//! the final knowledge graph.
//!
//! What counts as relevant is a deployment decision, so the filter is a list
//! of [`RelevanceRule`]s. Built-in rules are selected in the `[filter]`
//! config section; callers can append their own. Rules run in order and a
//! removal is attributed to the first rule that rejects the item.

use biokg_graph::iri::local_name;
use biokg_graph::vocab::{is_builtin, is_structural_predicate, OBO_NS};
use biokg_graph::{Axiom, AxiomKind, Edge, PrefixMap, WorkingGraph};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

use crate::config::{FilterConfig, RuleConfig};

/// Graph-wide facts a rule may consult.
pub struct FilterContext<'a> {
    pub annotation_properties: &'a BTreeSet<String>,
}

pub trait RelevanceRule: Send + Sync {
    fn name(&self) -> &str;

    fn keeps_edge(&self, _edge: &Edge, _ctx: &FilterContext<'_>) -> bool {
        true
    }

    fn keeps_axiom(&self, _axiom: &Axiom, _ctx: &FilterContext<'_>) -> bool {
        true
    }
}

// ============================================================================
// Built-in rules
// ============================================================================

/// Predicates given as IRIs, CURIEs or bare local names.
struct PredicateSet {
    iris: HashSet<String>,
    names: HashSet<String>,
}

impl PredicateSet {
    fn new(predicates: &[String], prefixes: &PrefixMap) -> Self {
        let mut iris = HashSet::new();
        let mut names = HashSet::new();
        for p in predicates {
            let p = p.trim();
            if let Some(iri) = prefixes.normalize(p) {
                iris.insert(iri);
            }
            names.insert(p.to_string());
        }
        Self { iris, names }
    }

    fn contains(&self, predicate: &str) -> bool {
        self.iris.contains(predicate)
            || self.names.contains(predicate)
            || self.names.contains(local_name(predicate))
    }
}

pub struct PredicateBlockList(PredicateSet);

impl RelevanceRule for PredicateBlockList {
    fn name(&self) -> &str {
        "predicate_block_list"
    }

    fn keeps_edge(&self, edge: &Edge, _ctx: &FilterContext<'_>) -> bool {
        !self.0.contains(&edge.predicate)
    }
}

pub struct PredicateAllowList(PredicateSet);

impl RelevanceRule for PredicateAllowList {
    fn name(&self) -> &str {
        "predicate_allow_list"
    }

    fn keeps_edge(&self, edge: &Edge, _ctx: &FilterContext<'_>) -> bool {
        self.0.contains(&edge.predicate)
    }
}

pub struct AxiomKindBlockList(BTreeSet<AxiomKind>);

impl RelevanceRule for AxiomKindBlockList {
    fn name(&self) -> &str {
        "axiom_kind_block_list"
    }

    fn keeps_axiom(&self, axiom: &Axiom, _ctx: &FilterContext<'_>) -> bool {
        !self.0.contains(&axiom.kind)
    }
}

/// Keep only items whose every node lies in one of the namespaces.
/// A bare prefix such as `HP` stands for `http://purl.obolibrary.org/obo/HP_`.
pub struct NamespaceAllowList(Vec<String>);

impl NamespaceAllowList {
    pub fn new(namespaces: &[String]) -> Self {
        Self(
            namespaces
                .iter()
                .map(|ns| {
                    let ns = ns.trim();
                    if ns.contains("://") || ns.starts_with("urn:") {
                        ns.to_string()
                    } else {
                        format!("{OBO_NS}{}_", ns.trim_end_matches(['_', ':']))
                    }
                })
                .collect(),
        )
    }

    fn allows(&self, iri: &str) -> bool {
        self.0.iter().any(|ns| iri.starts_with(ns.as_str()))
    }
}

impl RelevanceRule for NamespaceAllowList {
    fn name(&self) -> &str {
        "namespace_allow_list"
    }

    fn keeps_edge(&self, edge: &Edge, _ctx: &FilterContext<'_>) -> bool {
        self.allows(edge.subject.as_str()) && self.allows(edge.object.as_str())
    }

    fn keeps_axiom(&self, axiom: &Axiom, _ctx: &FilterContext<'_>) -> bool {
        axiom.node_ids().all(|id| self.allows(id.as_str()))
    }
}

/// Drop OWL plumbing that carries no biomedical meaning: edges touching
/// RDF/RDFS/OWL terms, annotation-property edges and non-structural
/// built-in predicates.
pub struct OwlSemanticSupport;

impl RelevanceRule for OwlSemanticSupport {
    fn name(&self) -> &str {
        "owl_semantic_support"
    }

    fn keeps_edge(&self, edge: &Edge, ctx: &FilterContext<'_>) -> bool {
        !is_builtin(edge.subject.as_str())
            && !is_builtin(edge.object.as_str())
            && !ctx.annotation_properties.contains(&edge.predicate)
            && is_structural_predicate(&edge.predicate)
    }

    fn keeps_axiom(&self, axiom: &Axiom, _ctx: &FilterContext<'_>) -> bool {
        !axiom.node_ids().any(|id| is_builtin(id.as_str()))
    }
}

pub fn builtin_rule(config: &RuleConfig, prefixes: &PrefixMap) -> Box<dyn RelevanceRule> {
    match config {
        RuleConfig::PredicateBlockList { predicates } => {
            Box::new(PredicateBlockList(PredicateSet::new(predicates, prefixes)))
        }
        RuleConfig::PredicateAllowList { predicates } => {
            Box::new(PredicateAllowList(PredicateSet::new(predicates, prefixes)))
        }
        RuleConfig::AxiomKindBlockList { kinds } => {
            Box::new(AxiomKindBlockList(kinds.iter().copied().collect()))
        }
        RuleConfig::NamespaceAllowList { namespaces } => {
            Box::new(NamespaceAllowList::new(namespaces))
        }
        RuleConfig::OwlSemanticSupport => Box::new(OwlSemanticSupport),
    }
}

// ============================================================================
// Filter
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleReport {
    pub rule: String,
    pub edges_removed: usize,
    pub axioms_removed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterReport {
    pub rules: Vec<RuleReport>,
    pub edges_before: usize,
    pub edges_after: usize,
    pub axioms_before: usize,
    pub axioms_after: usize,
}

#[derive(Default)]
pub struct ClinicalRelevanceFilter {
    rules: Vec<Box<dyn RelevanceRule>>,
}

impl ClinicalRelevanceFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &FilterConfig, prefixes: &PrefixMap) -> Self {
        Self {
            rules: config
                .rules
                .iter()
                .map(|rule| builtin_rule(rule, prefixes))
                .collect(),
        }
    }

    pub fn with_rule(mut self, rule: Box<dyn RelevanceRule>) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    pub fn apply(&self, graph: &mut WorkingGraph) -> FilterReport {
        let mut report = FilterReport {
            rules: self
                .rules
                .iter()
                .map(|r| RuleReport {
                    rule: r.name().to_string(),
                    ..Default::default()
                })
                .collect(),
            edges_before: graph.edge_count(),
            axioms_before: graph.axiom_count(),
            ..Default::default()
        };

        let annotation_properties = graph.annotation_properties().clone();
        let ctx = FilterContext {
            annotation_properties: &annotation_properties,
        };

        let rules = &self.rules;
        let counts = &mut report.rules;
        graph.retain_edges(|edge| {
            match rules.iter().position(|r| !r.keeps_edge(edge, &ctx)) {
                Some(i) => {
                    counts[i].edges_removed += 1;
                    false
                }
                None => true,
            }
        });
        graph.retain_axioms(|axiom| {
            match rules.iter().position(|r| !r.keeps_axiom(axiom, &ctx)) {
                Some(i) => {
                    counts[i].axioms_removed += 1;
                    false
                }
                None => true,
            }
        });

        report.edges_after = graph.edge_count();
        report.axioms_after = graph.axiom_count();
        for rule in &report.rules {
            tracing::info!(
                rule = %rule.rule,
                edges_removed = rule.edges_removed,
                axioms_removed = rule.axioms_removed,
                "relevance rule applied"
            );
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use biokg_graph::vocab::{OWL_THING, RDFS_SUBCLASS_OF};
    use biokg_graph::{EdgeKind, NodeId};

    fn id(s: &str) -> NodeId {
        NodeId::from_iri(format!("{OBO_NS}{s}"))
    }

    fn edge(s: &str, p: &str, o: &str) -> Edge {
        Edge::new(id(s), p, id(o), "t", EdgeKind::ClassClass)
    }

    fn filter(rules: Vec<RuleConfig>) -> ClinicalRelevanceFilter {
        ClinicalRelevanceFilter::from_config(&FilterConfig { rules }, &PrefixMap::new())
    }

    #[test]
    fn block_list_removes_exactly_the_listed_predicate() {
        let mut g = WorkingGraph::new();
        for i in 0..7 {
            g.add_edge(edge(&format!("HP_{i}"), "experimental", "HP_100"));
        }
        for i in 0..5 {
            g.add_edge(edge(&format!("HP_{i}"), RDFS_SUBCLASS_OF, "HP_100"));
        }

        let report = filter(vec![RuleConfig::PredicateBlockList {
            predicates: vec!["experimental".to_string()],
        }])
        .apply(&mut g);

        assert_eq!(report.rules[0].edges_removed, 7);
        assert_eq!(report.edges_before, 12);
        assert_eq!(report.edges_after, 5);
        assert!(g.edges().iter().all(|e| e.predicate != "experimental"));
    }

    #[test]
    fn predicates_match_by_curie_or_local_name() {
        let ro = format!("{OBO_NS}RO_0002200");
        let mut g = WorkingGraph::new();
        g.add_edge(edge("HP_1", &ro, "HP_2"));
        g.add_edge(edge("HP_1", RDFS_SUBCLASS_OF, "HP_2"));

        let by_curie = filter(vec![RuleConfig::PredicateAllowList {
            predicates: vec!["RO:0002200".to_string()],
        }])
        .apply(&mut g.clone());
        assert_eq!(by_curie.edges_after, 1);

        let by_name = filter(vec![RuleConfig::PredicateBlockList {
            predicates: vec!["subClassOf".to_string()],
        }])
        .apply(&mut g);
        assert_eq!(by_name.edges_after, 1);
        assert_eq!(g.edges()[0].predicate, ro);
    }

    #[test]
    fn removal_is_attributed_to_the_first_rejecting_rule() {
        let mut g = WorkingGraph::new();
        g.add_edge(Edge::new(
            id("HP_1"),
            RDFS_SUBCLASS_OF,
            NodeId::from_iri(OWL_THING),
            "t",
            EdgeKind::ClassClass,
        ));
        g.add_edge(edge("MONDO_1", RDFS_SUBCLASS_OF, "MONDO_2"));
        g.add_axiom(Axiom::pair(AxiomKind::EquivalentClasses, id("HP_1"), id("MONDO_1"), "t"));

        let report = filter(vec![
            RuleConfig::OwlSemanticSupport,
            RuleConfig::NamespaceAllowList {
                namespaces: vec!["HP".to_string()],
            },
        ])
        .apply(&mut g);

        assert_eq!(report.rules[0].edges_removed, 1);
        assert_eq!(report.rules[1].edges_removed, 1);
        assert_eq!(report.rules[1].axioms_removed, 1);
        assert_eq!(g.edge_count(), 0);
    }

    struct DropPredicate(&'static str);

    impl RelevanceRule for DropPredicate {
        fn name(&self) -> &str {
            "custom"
        }

        fn keeps_edge(&self, edge: &Edge, _ctx: &FilterContext<'_>) -> bool {
            edge.predicate != self.0
        }
    }

    #[test]
    fn custom_rules_run_after_configured_ones() {
        let mut g = WorkingGraph::new();
        g.add_edge(edge("HP_1", "a", "HP_2"));
        g.add_edge(edge("HP_1", "b", "HP_2"));
        let f = filter(vec![]).with_rule(Box::new(DropPredicate("b")));
        assert_eq!(f.rule_names(), vec!["custom"]);
        let report = f.apply(&mut g);
        assert_eq!(report.rules[0].edges_removed, 1);
        assert_eq!(g.edges()[0].predicate, "a");
    }
}
