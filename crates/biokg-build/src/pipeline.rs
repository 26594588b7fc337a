//! The build pipeline: config → ingest → edge lists ∥ merge → assemble →
//! prune → closure → filter → serialize.
//!
//! Ontology files and edge sources are processed in parallel with rayon;
//! from assembly on, one `WorkingGraph` is handed from stage to stage. A
//! fatal error stops the run with a [`PipelineError`] naming the stage and
//! how many items it had processed. Output files are only renamed into
//! place once every artifact was written.

use biokg_graph::{EquivalenceTable, IdentifierRegistry, WorkingGraph};
use biokg_ingest_tabular::{register_node_table_file, EdgeListBuilder, RelationClassifier};
use rayon::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;

use crate::assemble::GraphAssembler;
use crate::closure::{ClosureInvoker, ProcessReasoner, Reasoner};
use crate::config::BuildConfig;
use crate::error::{ConfigError, IngestError, OutputError, PipelineError, Stage, StageErrorKind};
use crate::filter::{ClinicalRelevanceFilter, RelevanceRule};
use crate::ingest::ingest_ontology;
use crate::merge::OntologyMerger;
use crate::prune::PrunePolicy;
use crate::report::{BuildReport, BUILD_REPORT_FILE};
use crate::serialize::{ArtifactStager, IdentifierMappingTable, Serializer};

/// What a successful run leaves behind besides the files.
pub struct BuildOutcome {
    pub report: BuildReport,
    pub graph: WorkingGraph,
    pub node_map: IdentifierMappingTable,
    pub output_dir: PathBuf,
}

pub struct BuildPipeline {
    config: BuildConfig,
    reasoner: Option<Arc<dyn Reasoner>>,
    extra_rules: Vec<Box<dyn RelevanceRule>>,
}

impl BuildPipeline {
    pub fn new(config: BuildConfig) -> Self {
        Self {
            config,
            reasoner: None,
            extra_rules: Vec::new(),
        }
    }

    /// Use `reasoner` instead of the configured external program.
    pub fn with_reasoner(mut self, reasoner: Arc<dyn Reasoner>) -> Self {
        self.reasoner = Some(reasoner);
        self
    }

    /// Append a relevance rule after the configured ones.
    pub fn with_rule(mut self, rule: Box<dyn RelevanceRule>) -> Self {
        self.extra_rules.push(rule);
        self
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    pub fn run(self) -> Result<BuildOutcome, PipelineError> {
        let BuildPipeline {
            config,
            reasoner,
            extra_rules,
        } = self;
        let mut report = BuildReport::default();

        {
            let _span = tracing::info_span!("stage", stage = %Stage::Config).entered();
            config
                .validate_settings()
                .map_err(|e| PipelineError::new(Stage::Config, 0, e))?;
            for (checked, path) in config.input_files().enumerate() {
                if !path.is_file() {
                    let missing = ConfigError::MissingFile(path.clone());
                    return Err(PipelineError::new(Stage::Config, checked, missing));
                }
            }
        }

        // --- registry, lookup tables, ontologies and node tables ---
        let ingest_span = tracing::info_span!("stage", stage = %Stage::Ingest).entered();
        let prefixes = config.registry.prefix_map();
        let equivalences = match &config.registry.equivalence_table {
            Some(path) => EquivalenceTable::from_tsv_file(&prefixes, path)
                .map_err(|e| PipelineError::new(Stage::Ingest, 0, IngestError::from(e)))?,
            None => EquivalenceTable::new(),
        };
        report.equivalence_entries = equivalences.len();
        let registry = IdentifierRegistry::with_config(prefixes.clone(), equivalences);

        let mut classifier = RelationClassifier::new(prefixes.clone());
        if let Some(path) = &config.relations.labels {
            classifier
                .load_labels_file(path)
                .map_err(|e| PipelineError::new(Stage::Ingest, 0, IngestError::from(e)))?;
        }
        if let Some(path) = &config.relations.inverses {
            classifier
                .load_inverses_file(path)
                .map_err(|e| PipelineError::new(Stage::Ingest, 0, IngestError::from(e)))?;
        }
        report.relation_labels = classifier.label_count();

        let (ontologies, node_tables) = rayon::join(
            || {
                config
                    .ontologies
                    .par_iter()
                    .map(|o| ingest_ontology(&registry, &o.name, &o.path))
                    .collect::<Vec<_>>()
            },
            || {
                config
                    .node_tables
                    .iter()
                    .map(|t| {
                        register_node_table_file(&registry, &t.spec(), &t.path)
                            .map_err(IngestError::from)
                    })
                    .collect::<Vec<_>>()
            },
        );
        let node_tables = all_ok(Stage::Ingest, node_tables)?;
        let ontologies = all_ok(Stage::Ingest, ontologies)?;
        report.node_tables = node_tables;
        report.ontologies = ontologies.iter().map(|o| o.report.clone()).collect();
        report.registry_nodes = registry.len();
        tracing::info!(
            ontologies = ontologies.len(),
            node_tables = report.node_tables.len(),
            registry_nodes = report.registry_nodes,
            "ingested sources"
        );
        drop(ingest_span);

        // --- edge lists ∥ ontology merge ---
        let builder = EdgeListBuilder::new(&registry, &classifier)
            .on_unresolved(config.registry.on_unresolved);
        let merger = OntologyMerger::new(config.merge.priority.clone());
        let (batches, merged) = rayon::join(
            || {
                let _span = tracing::info_span!("stage", stage = %Stage::EdgeList).entered();
                config
                    .edge_sources
                    .par_iter()
                    .map(|s| builder.build_file(&s.spec(), &s.path).map_err(IngestError::from))
                    .collect::<Vec<_>>()
            },
            || {
                let _span = tracing::info_span!("stage", stage = %Stage::Merge).entered();
                merger.merge(&ontologies)
            },
        );
        let batches = all_ok(Stage::EdgeList, batches)?;
        for batch in &batches {
            if batch.report.rejected() > 0 {
                tracing::warn!(
                    source = %batch.source,
                    rejected = batch.report.rejected(),
                    unresolved_subject = batch.report.unresolved_subject,
                    unresolved_object = batch.report.unresolved_object,
                    malformed = batch.report.malformed,
                    "skipped edge rows"
                );
            }
        }
        report.edge_sources = batches.iter().map(|b| b.report.clone()).collect();
        let merged = merged.map_err(|e| PipelineError::new(Stage::Merge, ontologies.len(), e))?;
        report.merge = merged.report;

        // --- assemble ---
        let mut graph = {
            let _span = tracing::info_span!("stage", stage = %Stage::Assemble).entered();
            let (graph, assembly) = GraphAssembler::new(&registry)
                .assemble(&merged.graph, &batches)
                .map_err(|e| PipelineError::new(Stage::Assemble, e.edges_assembled, e.source))?;
            report.assembly = assembly;
            graph
        };
        drop(batches);

        // --- prune ---
        let policy = PrunePolicy::from_config(&config.prune);
        {
            let _span = tracing::info_span!("stage", stage = %Stage::Prune).entered();
            report.prune = policy.prune(&mut graph);
        }

        // --- closure ---
        {
            let _span = tracing::info_span!("stage", stage = %Stage::Closure).entered();
            let reasoner: Arc<dyn Reasoner> = match reasoner {
                Some(reasoner) => reasoner,
                None => Arc::new(ProcessReasoner::from_config(&config.closure)),
            };
            let invoker = ClosureInvoker::new(reasoner, config.closure.timeout())
                .with_pruned_kinds(policy.removed_kinds().iter().copied());
            let processed = graph.edge_count();
            let closure = invoker
                .close(&mut graph, &registry)
                .map_err(|e| PipelineError::new(Stage::Closure, processed, e))?;
            report.closure = closure;
        }

        // --- filter ---
        {
            let _span = tracing::info_span!("stage", stage = %Stage::Filter).entered();
            let filter = extra_rules.into_iter().fold(
                ClinicalRelevanceFilter::from_config(&config.filter, &prefixes),
                |filter, rule| filter.with_rule(rule),
            );
            report.filter = filter.apply(&mut graph);
        }

        // --- serialize ---
        let _span = tracing::info_span!("stage", stage = %Stage::Serialize).entered();
        let output_dir = config.output.directory.clone();
        // `processed` is the number of artifacts staged before the failure.
        let serialize_err = |staged: usize, e: OutputError| {
            PipelineError::new(Stage::Serialize, staged, StageErrorKind::Output(e))
        };
        let mut stager = ArtifactStager::new(&output_dir).map_err(|e| serialize_err(0, e))?;
        let serializer = Serializer::new(&config.output, &registry);
        let serialized = match serializer.stage(&graph, &mut stager) {
            Ok(serialized) => serialized,
            Err(e) => return Err(serialize_err(stager.artifacts().len(), e)),
        };
        report.statistics = serialized.statistics;
        report.artifacts = stager.artifacts().to_vec();
        if let Err(e) = stager.stage(BUILD_REPORT_FILE, |w| report.write_json(w)) {
            return Err(serialize_err(stager.artifacts().len(), e));
        }
        let staged = stager.artifacts().len();
        stager.commit().map_err(|e| serialize_err(staged, e))?;

        tracing::info!(
            output = %output_dir.display(),
            triples = report.statistics.triples,
            nodes = report.statistics.unique_nodes,
            "build complete"
        );
        Ok(BuildOutcome {
            report,
            graph,
            node_map: serialized.node_map,
            output_dir,
        })
    }
}

/// Unwrap per-item results in order; the first failure becomes a
/// `PipelineError` carrying how many items before it succeeded.
fn all_ok<T, E>(stage: Stage, results: Vec<Result<T, E>>) -> Result<Vec<T>, PipelineError>
where
    E: Into<StageErrorKind>,
{
    let mut out = Vec::with_capacity(results.len());
    for result in results {
        match result {
            Ok(item) => out.push(item),
            Err(e) => return Err(PipelineError::new(stage, out.len(), e)),
        }
    }
    Ok(out)
}
