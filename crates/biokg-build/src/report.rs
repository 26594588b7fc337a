//! Build report: every stage's counts in one document (`build_report.json`).

use biokg_ingest_tabular::{NodeTableReport, RejectionReport};
use serde::{Deserialize, Serialize};
use std::io::{self, Write};

use crate::assemble::AssemblyReport;
use crate::closure::ClosureReport;
use crate::filter::FilterReport;
use crate::ingest::OntologyIngestReport;
use crate::merge::MergeReport;
use crate::prune::PruneReport;
use crate::serialize::{ArtifactInfo, GraphStatistics};

pub const BUILD_REPORT_FILE: &str = "build_report.json";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildReport {
    pub registry_nodes: usize,
    pub equivalence_entries: usize,
    pub relation_labels: usize,
    pub ontologies: Vec<OntologyIngestReport>,
    pub node_tables: Vec<NodeTableReport>,
    pub edge_sources: Vec<RejectionReport>,
    pub merge: MergeReport,
    pub assembly: AssemblyReport,
    pub prune: PruneReport,
    pub closure: ClosureReport,
    pub filter: FilterReport,
    pub statistics: GraphStatistics,
    pub artifacts: Vec<ArtifactInfo>,
}

impl BuildReport {
    /// Edge-source rows skipped for any reason.
    pub fn rejected_rows(&self) -> usize {
        self.edge_sources.iter().map(RejectionReport::rejected).sum()
    }

    pub fn write_json(&self, w: &mut dyn Write) -> io::Result<()> {
        serde_json::to_writer_pretty(&mut *w, self).map_err(io::Error::from)?;
        writeln!(w)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_round_trips_through_json() {
        let report = BuildReport {
            registry_nodes: 3,
            edge_sources: vec![RejectionReport {
                source: "genes.tsv".to_string(),
                rows_read: 4,
                unresolved_object: 1,
                ..Default::default()
            }],
            ..Default::default()
        };
        let mut buf = Vec::new();
        report.write_json(&mut buf).unwrap();
        let back: BuildReport = serde_json::from_slice(&buf).unwrap();
        assert_eq!(back, report);
        assert_eq!(back.rejected_rows(), 1);
    }
}
