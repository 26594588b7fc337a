//! Build configuration (TOML).
//!
//! ```toml
//! [registry]
//! equivalence_table = "mappings/equivalences.tsv"
//! on_unresolved = "skip"
//! prefixes = { NCBIGene = "http://www.ncbi.nlm.nih.gov/gene/" }
//!
//! [[ontologies]]
//! name = "hp"
//! path = "ontologies/hp.owl"
//!
//! [[edge_sources]]
//! path = "edges/gene_gene.tsv"
//!
//! [merge]
//! priority = ["mondo", "hp"]
//!
//! [closure]
//! timeout_secs = 7200
//!
//! [[filter.rules]]
//! rule = "predicate_block_list"
//! predicates = ["experimental"]
//! ```
//!
//! Relative paths are resolved against the directory of the config file.

use biokg_graph::{AxiomKind, NodeKind, PrefixMap};
use biokg_ingest_tabular::{EdgeSourceSpec, NodeTableSpec, OnUnresolved, TableFormat};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    pub registry: RegistryConfig,
    pub ontologies: Vec<OntologySource>,
    pub node_tables: Vec<NodeTableSource>,
    pub edge_sources: Vec<EdgeSource>,
    pub relations: RelationsConfig,
    pub merge: MergeConfig,
    pub prune: PruneConfig,
    pub closure: ClosureConfig,
    pub filter: FilterConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// CURIE prefix → namespace IRI, on top of the built-in OBO expansion.
    pub prefixes: BTreeMap<String, String>,
    /// Two-column TSV of equivalent identifiers.
    pub equivalence_table: Option<PathBuf>,
    pub on_unresolved: OnUnresolved,
}

impl RegistryConfig {
    pub fn prefix_map(&self) -> PrefixMap {
        let mut map = PrefixMap::new();
        for (prefix, ns) in &self.prefixes {
            map.insert(prefix, ns);
        }
        map
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OntologySource {
    /// Source name used for provenance and merge priority.
    pub name: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeTableSource {
    pub path: PathBuf,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub default_kind: Option<NodeKind>,
    #[serde(default)]
    pub format: TableFormat,
}

impl NodeTableSource {
    pub fn spec(&self) -> NodeTableSpec {
        NodeTableSpec {
            name: self.name.clone().unwrap_or_else(|| file_label(&self.path)),
            default_kind: self.default_kind,
            format: self.format.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeSource {
    pub path: PathBuf,
    #[serde(flatten)]
    pub spec: EdgeSourceSpec,
}

impl EdgeSource {
    /// Column spec with the source name defaulted to the file name.
    pub fn spec(&self) -> EdgeSourceSpec {
        let mut spec = self.spec.clone();
        if spec.name.trim().is_empty() {
            spec.name = file_label(&self.path);
        }
        spec
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelationsConfig {
    /// `label<TAB>iri`
    pub labels: Option<PathBuf>,
    /// `iri<TAB>inverse_iri`
    pub inverses: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Ontology names, highest priority first.
    pub priority: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PruneConfig {
    pub remove: BTreeSet<AxiomKind>,
}

impl Default for PruneConfig {
    fn default() -> Self {
        Self {
            remove: BTreeSet::from([AxiomKind::DisjointClasses]),
        }
    }
}

pub const DEFAULT_REASONER_ARGS: [&str; 7] = [
    "{input}",
    "--reasoner",
    "{reasoner}",
    "--run-reasoner",
    "--assert-implied",
    "-o",
    "{output}",
];

/// The reasoner always runs; there is no switch to skip it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClosureConfig {
    pub program: String,
    /// Argument template; `{input}`, `{output}` and `{reasoner}` are substituted.
    pub args: Vec<String>,
    pub reasoner: String,
    pub timeout_secs: u64,
}

impl Default for ClosureConfig {
    fn default() -> Self {
        Self {
            program: "owltools".to_string(),
            args: DEFAULT_REASONER_ARGS.iter().map(|s| s.to_string()).collect(),
            reasoner: "elk".to_string(),
            timeout_secs: 3600,
        }
    }
}

impl ClosureConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// One built-in relevance rule, selected by its `rule` name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum RuleConfig {
    PredicateBlockList { predicates: Vec<String> },
    PredicateAllowList { predicates: Vec<String> },
    AxiomKindBlockList { kinds: Vec<AxiomKind> },
    NamespaceAllowList { namespaces: Vec<String> },
    OwlSemanticSupport,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Evaluated in order; a removal is attributed to the first rule that rejects.
    pub rules: Vec<RuleConfig>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripleFormat {
    #[default]
    Delimited,
    Ntriples,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelForm {
    #[default]
    Iri,
    Label,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub directory: PathBuf,
    /// File name stem for every artifact.
    pub name: String,
    pub triple_format: TripleFormat,
    /// Delimiter for the `delimited` triple store.
    pub delimiter: String,
    pub label_form: LabelForm,
    /// Emit `(subject, predicate, object)` integer triples instead of pairs.
    pub include_predicates: bool,
    pub integer_delimiter: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("output"),
            name: "biokg".to_string(),
            triple_format: TripleFormat::Delimited,
            delimiter: "\t".to_string(),
            label_form: LabelForm::Iri,
            include_predicates: false,
            integer_delimiter: " ".to_string(),
        }
    }
}

impl BuildConfig {
    /// Load, resolve relative paths against the file's directory, validate.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&content)?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        config.validate()?;
        Ok(config)
    }

    /// Parse without touching the filesystem.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        if let Some(p) = self.registry.equivalence_table.as_mut() {
            resolve(p);
        }
        for o in &mut self.ontologies {
            resolve(&mut o.path);
        }
        for t in &mut self.node_tables {
            resolve(&mut t.path);
        }
        for e in &mut self.edge_sources {
            resolve(&mut e.path);
        }
        if let Some(p) = self.relations.labels.as_mut() {
            resolve(p);
        }
        if let Some(p) = self.relations.inverses.as_mut() {
            resolve(p);
        }
        resolve(&mut self.output.directory);
    }

    /// Settings checks plus the existence of every input file.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_settings()?;
        for path in self.input_files() {
            if !path.is_file() {
                return Err(ConfigError::MissingFile(path.clone()));
            }
        }
        Ok(())
    }

    /// Every input file, in ingest order.
    pub fn input_files(&self) -> impl Iterator<Item = &PathBuf> + '_ {
        self.ontologies
            .iter()
            .map(|o| &o.path)
            .chain(self.node_tables.iter().map(|t| &t.path))
            .chain(self.edge_sources.iter().map(|e| &e.path))
            .chain(self.registry.equivalence_table.iter())
            .chain(self.relations.labels.iter())
            .chain(self.relations.inverses.iter())
    }

    /// Checks that need no filesystem access.
    pub fn validate_settings(&self) -> Result<(), ConfigError> {
        let mut names = BTreeSet::new();
        for o in &self.ontologies {
            if o.name.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "ontology {} has an empty name",
                    o.path.display()
                )));
            }
            if !names.insert(o.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate ontology name `{}`",
                    o.name
                )));
            }
        }

        for p in &self.merge.priority {
            if !names.contains(p.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "merge.priority names unknown ontology `{p}`"
                )));
            }
        }

        if self.closure.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "closure.timeout_secs must be > 0".to_string(),
            ));
        }
        if self.closure.program.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "closure.program must not be empty".to_string(),
            ));
        }

        if self.output.name.trim().is_empty() {
            return Err(ConfigError::Invalid("output.name must not be empty".to_string()));
        }
        if self.output.delimiter.is_empty() || self.output.integer_delimiter.is_empty() {
            return Err(ConfigError::Invalid(
                "output delimiters must not be empty".to_string(),
            ));
        }

        for rule in &self.filter.rules {
            if let RuleConfig::NamespaceAllowList { namespaces } = rule {
                if namespaces.is_empty() {
                    return Err(ConfigError::Invalid(
                        "namespace_allow_list needs at least one namespace".to_string(),
                    ));
                }
            }
        }

        Ok(())
    }
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .and_then(|s| s.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_owltools_invocation() {
        let config = BuildConfig::from_toml_str("").unwrap();
        assert_eq!(config.closure.program, "owltools");
        assert_eq!(config.closure.args.len(), 7);
        assert_eq!(config.prune.remove, BTreeSet::from([AxiomKind::DisjointClasses]));
        assert_eq!(config.output.delimiter, "\t");
        assert_eq!(config.registry.on_unresolved, OnUnresolved::Skip);
    }

    #[test]
    fn parses_sections_and_rules() {
        let config = BuildConfig::from_toml_str(
            r#"
[registry]
on_unresolved = "halt"
prefixes = { NCBIGene = "http://www.ncbi.nlm.nih.gov/gene/" }

[[ontologies]]
name = "hp"
path = "hp.owl"

[[edge_sources]]
path = "gene_gene.tsv"
predicate = "RO:0002434"
object_column = 1
format = { has_header = true }

[merge]
priority = ["hp"]

[prune]
remove = ["disjoint_classes", "complement_of"]

[closure]
timeout_secs = 2

[[filter.rules]]
rule = "predicate_block_list"
predicates = ["experimental"]

[[filter.rules]]
rule = "owl_semantic_support"

[output]
triple_format = "ntriples"
include_predicates = true
"#,
        )
        .unwrap();

        assert_eq!(config.registry.on_unresolved, OnUnresolved::Halt);
        assert_eq!(
            config.registry.prefix_map().namespace("NCBIGene"),
            Some("http://www.ncbi.nlm.nih.gov/gene/")
        );
        let spec = config.edge_sources[0].spec();
        assert_eq!(spec.name, "gene_gene.tsv");
        assert_eq!(spec.object_column, 1);
        assert!(spec.format.has_header);
        assert_eq!(config.prune.remove.len(), 2);
        assert_eq!(config.closure.timeout(), Duration::from_secs(2));
        assert_eq!(config.filter.rules.len(), 2);
        assert_eq!(config.filter.rules[1], RuleConfig::OwlSemanticSupport);
        assert_eq!(config.output.triple_format, TripleFormat::Ntriples);
    }

    #[test]
    fn unknown_rule_name_is_a_parse_error() {
        let err = BuildConfig::from_toml_str("[[filter.rules]]\nrule = \"clinical_magic\"\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn closure_cannot_be_switched_off() {
        let err = BuildConfig::from_toml_str("[closure]\nenabled = false\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn validate_rejects_unknown_priority_and_zero_timeout() {
        let mut config = BuildConfig::default();
        config.merge.priority = vec!["go".to_string()];
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = BuildConfig::default();
        config.closure.timeout_secs = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn from_file_resolves_relative_paths_and_checks_inputs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("hp.ttl"), "").unwrap();
        let cfg = dir.path().join("build.toml");
        std::fs::write(
            &cfg,
            "[[ontologies]]\nname = \"hp\"\npath = \"hp.ttl\"\n[output]\ndirectory = \"out\"\n",
        )
        .unwrap();

        let config = BuildConfig::from_file(&cfg).unwrap();
        assert_eq!(config.ontologies[0].path, dir.path().join("hp.ttl"));
        assert_eq!(config.output.directory, dir.path().join("out"));

        std::fs::write(
            &cfg,
            "[[ontologies]]\nname = \"go\"\npath = \"go.owl\"\n",
        )
        .unwrap();
        assert!(matches!(
            BuildConfig::from_file(&cfg),
            Err(ConfigError::MissingFile(_))
        ));
    }
}
