//! Axiom Pruner: drop axiom kinds the closure reasoner should not see.
//!
//! Disjointness is removed by default; an incoherent merge would otherwise
//! make the reasoner derive `owl:Nothing` for large parts of the graph.

use biokg_graph::{Axiom, AxiomKind, WorkingGraph};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::config::PruneConfig;
use crate::merge::describe_axiom;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrunePolicy {
    remove: BTreeSet<AxiomKind>,
}

impl Default for PrunePolicy {
    fn default() -> Self {
        Self::from_config(&PruneConfig::default())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PruneReport {
    pub removed_by_kind: BTreeMap<AxiomKind, usize>,
    pub axioms_before: usize,
    pub axioms_after: usize,
    /// Rendered removed axioms, in graph order.
    pub removed: Vec<String>,
}

impl PruneReport {
    pub fn removed_total(&self) -> usize {
        self.removed_by_kind.values().sum()
    }
}

impl PrunePolicy {
    pub fn new(remove: impl IntoIterator<Item = AxiomKind>) -> Self {
        Self {
            remove: remove.into_iter().collect(),
        }
    }

    pub fn from_config(config: &PruneConfig) -> Self {
        Self::new(config.remove.iter().copied())
    }

    pub fn removes(&self, kind: AxiomKind) -> bool {
        self.remove.contains(&kind)
    }

    pub fn removed_kinds(&self) -> &BTreeSet<AxiomKind> {
        &self.remove
    }

    /// Remove matching axioms in place. Edges are never touched.
    pub fn prune(&self, graph: &mut WorkingGraph) -> PruneReport {
        let axioms_before = graph.axiom_count();
        let removed: Vec<Axiom> = graph.retain_axioms(|a| !self.removes(a.kind));

        let mut report = PruneReport {
            axioms_before,
            axioms_after: graph.axiom_count(),
            ..Default::default()
        };
        for axiom in &removed {
            *report.removed_by_kind.entry(axiom.kind).or_default() += 1;
            report.removed.push(describe_axiom(axiom));
        }
        tracing::info!(
            removed = removed.len(),
            remaining = report.axioms_after,
            "pruned axioms"
        );
        report
    }
}
