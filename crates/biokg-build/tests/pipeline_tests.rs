//! End-to-end runs of the build pipeline over small on-disk inputs.

use biokg_build::config::{EdgeSource, NodeTableSource, OntologySource};
use biokg_build::{
    BuildConfig, BuildPipeline, ClosureError, ClosureFailure, Reasoner, Stage, StageErrorKind,
    BUILD_REPORT_FILE,
};
use biokg_graph::{AxiomKind, EdgeKind, NodeId};
use biokg_ingest_tabular::{EdgeSourceSpec, OnUnresolved};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const OBO: &str = "http://purl.obolibrary.org/obo/";
const GENE_NS: &str = "http://www.ncbi.nlm.nih.gov/gene/";
const SUBCLASS_OF: &str = "http://www.w3.org/2000/01/rdf-schema#subClassOf";

const PREFIXES: &str = r#"
@prefix obo: <http://purl.obolibrary.org/obo/> .
@prefix owl: <http://www.w3.org/2002/07/owl#> .
@prefix rdfs: <http://www.w3.org/2000/01/rdf-schema#> .
"#;

const HP: &str = r#"
obo:HP_1 a owl:Class ; rdfs:label "Phenotypic abnormality" .
obo:HP_2 a owl:Class ; rdfs:subClassOf obo:HP_1 ; owl:disjointWith obo:HP_3 .
obo:HP_3 a owl:Class ; rdfs:subClassOf obo:HP_1 .
"#;

const GENES: &str = "NCBIGene:672\tinstance\tBRCA1\nNCBIGene:675\tinstance\tBRCA2\n";

const GENE_PHENOTYPE: &str = "\
NCBIGene:672\tRO:0002200\tHP:2
NCBIGene:675\tRO:0002200\tHP:3
NCBIGene:999\tRO:0002200\tHP:2
";

fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

fn gene_phenotype_config(dir: &TempDir) -> BuildConfig {
    let root = dir.path();
    let mut config = BuildConfig::default();
    config
        .registry
        .prefixes
        .insert("NCBIGene".to_string(), GENE_NS.to_string());
    config.ontologies.push(OntologySource {
        name: "hp".to_string(),
        path: write(root, "hp.ttl", &format!("{PREFIXES}{HP}")),
    });
    config.node_tables.push(NodeTableSource {
        path: write(root, "genes.tsv", GENES),
        name: None,
        default_kind: None,
        format: Default::default(),
    });
    config.edge_sources.push(EdgeSource {
        path: write(root, "gene_phenotype.tsv", GENE_PHENOTYPE),
        spec: EdgeSourceSpec::named("gene_phenotype"),
    });
    config.output.directory = root.join("out");
    config
}

fn read_lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

/// Writes a fixed N-Triples body after an optional delay.
struct StubReasoner {
    body: String,
    delay: Duration,
}

impl Reasoner for StubReasoner {
    fn name(&self) -> &str {
        "stub"
    }

    fn output_file_name(&self) -> &str {
        "closure_output.nt"
    }

    fn infer(&self, _input: &Path, output: &Path, _timeout: Duration) -> Result<(), ClosureFailure> {
        std::thread::sleep(self.delay);
        std::fs::write(output, &self.body).map_err(|source| ClosureError::Io {
            path: output.to_path_buf(),
            source,
        })?;
        Ok(())
    }
}

/// A pipeline whose reasoner entails nothing new.
fn pipeline(config: BuildConfig) -> BuildPipeline {
    BuildPipeline::new(config).with_reasoner(Arc::new(StubReasoner {
        body: String::new(),
        delay: Duration::ZERO,
    }))
}

#[test]
fn builds_graph_and_writes_every_artifact() {
    let dir = TempDir::new().unwrap();
    let config = gene_phenotype_config(&dir);

    let outcome = pipeline(config).run().unwrap();
    let report = &outcome.report;

    assert_eq!(report.rejected_rows(), 1);
    assert_eq!(report.edge_sources[0].unresolved_subject, 1);
    assert_eq!(report.edge_sources[0].samples, vec!["NCBIGene:999".to_string()]);
    assert_eq!(report.prune.removed_by_kind.get(&AxiomKind::DisjointClasses), Some(&1));
    assert_eq!(report.closure.reasoner, "stub");
    assert_eq!(report.closure.inferred_edges_added, 0);
    assert_eq!(report.statistics.triples, 4);
    assert_eq!(report.statistics.unique_nodes, 5);
    assert_eq!(report.statistics.edges_by_kind.get(&EdgeKind::ClassInstance), Some(&2));
    assert_eq!(report.statistics.edges_by_kind.get(&EdgeKind::ClassClass), Some(&2));

    let out = &outcome.output_dir;
    for file in [
        "biokg_triples.tsv",
        "biokg_edge_list.txt",
        "biokg_node_map.tsv",
        BUILD_REPORT_FILE,
    ] {
        assert!(out.join(file).is_file(), "missing {file}");
    }
    assert!(!out.join("biokg_relation_map.tsv").exists());
    let leftovers: Vec<_> = std::fs::read_dir(out)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty());

    let triples = read_lines(&out.join("biokg_triples.tsv"));
    assert_eq!(triples.len(), 4);
    assert!(triples.contains(&format!("{OBO}HP_2\t{SUBCLASS_OF}\t{OBO}HP_1")));
    assert!(triples.contains(&format!("{GENE_NS}672\t{OBO}RO_0002200\t{OBO}HP_2")));

    // Codes are dense from 0 over the sorted identifiers.
    let hp1 = NodeId::from_iri(format!("{OBO}HP_1"));
    assert_eq!(outcome.node_map.code(&hp1), Some(0));
    assert_eq!(read_lines(&out.join("biokg_node_map.tsv")).len(), 5);

    let edge_list = read_lines(&out.join("biokg_edge_list.txt"));
    assert_eq!(edge_list.len(), 4);
    for line in &edge_list {
        let codes: Vec<u64> = line.split(' ').map(|c| c.parse().unwrap()).collect();
        assert_eq!(codes.len(), 2);
        assert!(codes.iter().all(|c| *c < 5));
    }

    let written: serde_json::Value =
        serde_json::from_slice(&std::fs::read(out.join(BUILD_REPORT_FILE)).unwrap()).unwrap();
    assert_eq!(written["statistics"]["triples"], 4);
    assert_eq!(written["registry_nodes"], report.registry_nodes);
}

#[test]
fn label_form_and_predicate_codes_change_the_artifacts() {
    let dir = TempDir::new().unwrap();
    let mut config = gene_phenotype_config(&dir);
    config.output.label_form = biokg_build::config::LabelForm::Label;
    config.output.include_predicates = true;

    let outcome = pipeline(config).run().unwrap();
    let out = &outcome.output_dir;

    let triples = read_lines(&out.join("biokg_triples.tsv"));
    assert!(triples.contains(&format!("BRCA1\tRO_0002200\t{OBO}HP_2")));
    assert!(triples.iter().any(|t| t.ends_with("Phenotypic abnormality")));

    let relations = read_lines(&out.join("biokg_relation_map.tsv"));
    assert_eq!(relations.len(), 2);
    for line in read_lines(&out.join("biokg_edge_list.txt")) {
        assert_eq!(line.split(' ').count(), 3);
    }
}

#[test]
fn closure_results_are_folded_into_the_output() {
    let dir = TempDir::new().unwrap();
    let config = gene_phenotype_config(&dir);

    // HP_2 ⊑ HP_1 is already asserted; the gene edge is new.
    let body = [
        format!("<{OBO}HP_2> <{SUBCLASS_OF}> <{OBO}HP_1> .\n"),
        format!("<{GENE_NS}672> <{OBO}RO_0002200> <{OBO}HP_1> .\n"),
    ]
    .concat();
    let stub = StubReasoner {
        body,
        delay: Duration::ZERO,
    };

    let outcome = BuildPipeline::new(config)
        .with_reasoner(Arc::new(stub))
        .run()
        .unwrap();
    let closure = &outcome.report.closure;
    assert_eq!(closure.reasoner, "stub");
    assert_eq!(closure.already_present, 1);
    assert_eq!(closure.inferred_edges_added, 1);
    assert_eq!(outcome.report.statistics.triples, 5);
    assert!(outcome
        .graph
        .edges()
        .iter()
        .any(|e| e.provenance == "closure:stub" && e.object.as_str() == format!("{OBO}HP_1")));
}

#[test]
fn reasoner_timeout_halts_without_writing_outputs() {
    let dir = TempDir::new().unwrap();
    let mut config = gene_phenotype_config(&dir);
    config.closure.timeout_secs = 1;
    let out = config.output.directory.clone();

    let stub = StubReasoner {
        body: String::new(),
        delay: Duration::from_secs(10),
    };
    let err = BuildPipeline::new(config)
        .with_reasoner(Arc::new(stub))
        .run()
        .err()
        .unwrap();

    assert!(err.is_timeout());
    assert_eq!(err.stage, Stage::Closure);
    assert_eq!(err.processed, 4);
    assert!(!out.exists());
}

#[test]
fn conflicting_equivalences_follow_merge_priority() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    let a = format!("{PREFIXES}obo:MONDO_1 a owl:Class ; owl:equivalentClass obo:DOID_1 .\n");
    let b = format!("{PREFIXES}obo:MONDO_1 a owl:Class ; owl:equivalentClass obo:DOID_2 .\n");

    let mut config = BuildConfig::default();
    config.ontologies = vec![
        OntologySource {
            name: "a".to_string(),
            path: write(root, "a.ttl", &a),
        },
        OntologySource {
            name: "b".to_string(),
            path: write(root, "b.ttl", &b),
        },
    ];
    config.output.directory = root.join("out");

    let err = pipeline(config.clone()).run().err().unwrap();
    assert_eq!(err.stage, Stage::Merge);
    match &err.kind {
        StageErrorKind::MergeConflict(conflict) => {
            assert_eq!(conflict.subject_ids, vec![format!("{OBO}MONDO_1")]);
        }
        other => panic!("unexpected: {other:?}"),
    }
    assert!(!root.join("out").exists());

    config.merge.priority = vec!["b".to_string(), "a".to_string()];
    let outcome = pipeline(config).run().unwrap();
    let conflicts = &outcome.report.merge.conflicts;
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].winner, "b");
    assert_eq!(conflicts[0].overridden, vec!["a".to_string()]);

    let axioms = outcome.graph.axioms();
    assert_eq!(axioms.len(), 1);
    assert!(axioms[0]
        .operands
        .iter()
        .any(|o| o.as_str() == format!("{OBO}DOID_2")));
}

#[test]
fn halting_on_unresolved_rows_reports_the_edge_list_stage() {
    let dir = TempDir::new().unwrap();
    let mut config = gene_phenotype_config(&dir);
    config.registry.on_unresolved = OnUnresolved::Halt;

    let err = pipeline(config).run().err().unwrap();
    assert_eq!(err.stage, Stage::EdgeList);
    assert!(matches!(err.kind, StageErrorKind::Ingest(_)));
}

#[test]
fn missing_input_file_is_a_config_error() {
    let dir = TempDir::new().unwrap();
    let mut config = gene_phenotype_config(&dir);
    config.edge_sources[0].path = dir.path().join("nope.tsv");

    let err = pipeline(config).run().err().unwrap();
    assert_eq!(err.stage, Stage::Config);
    assert!(matches!(err.kind, StageErrorKind::Config(_)));
    // hp.ttl and genes.tsv were found first.
    assert_eq!(err.processed, 2);
}

#[test]
fn failed_artifact_write_counts_staged_artifacts_and_leaves_no_outputs() {
    let dir = TempDir::new().unwrap();
    let config = gene_phenotype_config(&dir);
    let out = config.output.directory.clone();
    // A directory squatting on the edge list's staging path.
    std::fs::create_dir_all(out.join("biokg_edge_list.txt.tmp")).unwrap();

    let err = pipeline(config).run().err().unwrap();
    assert_eq!(err.stage, Stage::Serialize);
    assert!(matches!(err.kind, StageErrorKind::Output(_)));
    assert_eq!(err.processed, 1);
    assert!(!out.join("biokg_triples.tsv").exists());
    assert!(!out.join("biokg_triples.tsv.tmp").exists());
}
