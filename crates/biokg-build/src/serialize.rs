//! Serializer: final graph → triple store, integer edge list, mapping tables.
//!
//! Artifacts (all under the output directory, `{name}` from `[output]`):
//!
//! | file                      | content                                      |
//! |---------------------------|----------------------------------------------|
//! | `{name}_triples.tsv`      | one delimited edge per line (`delimited`)    |
//! | `{name}_triples.nt`       | one N-Triples statement per edge (`ntriples`)|
//! | `{name}_edge_list.txt`    | integer pairs, or triples with relation codes|
//! | `{name}_node_map.tsv`     | `internal_id<TAB>integer`                    |
//! | `{name}_relation_map.tsv` | `predicate<TAB>integer` (with predicates)    |
//!
//! Edges are written sorted by `(subject, predicate, object)`, so the bytes
//! depend only on the graph and the output config. Each artifact is staged as
//! `<file>.tmp` and renamed into place by [`ArtifactStager::commit`].

use biokg_graph::digest::Fnv1a64;
use biokg_graph::iri::local_name;
use biokg_graph::{Edge, EdgeKind, IdentifierRegistry, NodeId, WorkingGraph};
use biokg_ingest_rdfowl::ntriples::{NTriplesWriter, Term};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::config::{LabelForm, OutputConfig, TripleFormat};
use crate::error::OutputError;

// ============================================================================
// Integer mapping tables
// ============================================================================

/// Sorted keys → `0..n`. A bijection by construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegerMap<K: Ord> {
    codes: BTreeMap<K, u64>,
    keys: Vec<K>,
}

impl<K: Ord + Clone> IntegerMap<K> {
    pub fn new(keys: impl IntoIterator<Item = K>) -> Self {
        let keys: Vec<K> = keys.into_iter().collect::<BTreeSet<K>>().into_iter().collect();
        let codes = keys
            .iter()
            .enumerate()
            .map(|(i, k)| (k.clone(), i as u64))
            .collect();
        Self { codes, keys }
    }

    pub fn code(&self, key: &K) -> Option<u64> {
        self.codes.get(key).copied()
    }

    pub fn key(&self, code: u64) -> Option<&K> {
        usize::try_from(code).ok().and_then(|i| self.keys.get(i))
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// `(code, key)` in code order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, &K)> {
        self.keys.iter().enumerate().map(|(i, k)| (i as u64, k))
    }
}

pub type IdentifierMappingTable = IntegerMap<NodeId>;
pub type RelationMappingTable = IntegerMap<String>;

impl IntegerMap<NodeId> {
    /// Every node that appears in an edge of `graph`.
    pub fn from_graph(graph: &WorkingGraph) -> Self {
        Self::new(graph.edge_nodes().into_iter().cloned())
    }
}

impl IntegerMap<String> {
    pub fn from_graph(graph: &WorkingGraph) -> Self {
        Self::new(graph.edges().iter().map(|e| e.predicate.clone()))
    }
}

// ============================================================================
// Staged artifacts
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactInfo {
    pub file: String,
    pub bytes: u64,
    pub digest: String,
}

struct StagedFile {
    tmp: PathBuf,
    target: PathBuf,
}

/// Writes artifacts as `<file>.tmp` and renames them all at once.
///
/// Dropping a stager that was not committed removes every staged file.
pub struct ArtifactStager {
    dir: PathBuf,
    staged: Vec<StagedFile>,
    artifacts: Vec<ArtifactInfo>,
    committed: bool,
}

struct HashingWriter<W> {
    inner: W,
    digest: Fnv1a64,
    bytes: u64,
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.digest.update(&buf[..n]);
        self.bytes += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl ArtifactStager {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, OutputError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| OutputError::new(&dir, e))?;
        Ok(Self {
            dir,
            staged: Vec::new(),
            artifacts: Vec::new(),
            committed: false,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn artifacts(&self) -> &[ArtifactInfo] {
        &self.artifacts
    }

    pub fn stage<F>(&mut self, file_name: &str, write: F) -> Result<ArtifactInfo, OutputError>
    where
        F: FnOnce(&mut dyn Write) -> io::Result<()>,
    {
        let target = self.dir.join(file_name);
        let tmp = self.dir.join(format!("{file_name}.tmp"));
        let file = fs::File::create(&tmp).map_err(|e| OutputError::new(&tmp, e))?;
        self.staged.push(StagedFile {
            tmp: tmp.clone(),
            target,
        });

        let mut out = HashingWriter {
            inner: BufWriter::new(file),
            digest: Fnv1a64::new(),
            bytes: 0,
        };
        write(&mut out)
            .and_then(|()| out.flush())
            .map_err(|e| OutputError::new(&tmp, e))?;

        let info = ArtifactInfo {
            file: file_name.to_string(),
            bytes: out.bytes,
            digest: out.digest.finish_hex(),
        };
        tracing::debug!(file = %info.file, bytes = info.bytes, digest = %info.digest, "staged artifact");
        self.artifacts.push(info.clone());
        Ok(info)
    }

    /// Rename every staged file into place. On failure, files already
    /// renamed are removed again and the rest are cleaned up on drop.
    pub fn commit(mut self) -> Result<Vec<ArtifactInfo>, OutputError> {
        let mut renamed: Vec<&Path> = Vec::new();
        for file in &self.staged {
            if let Err(e) = fs::rename(&file.tmp, &file.target) {
                for done in renamed {
                    let _ = fs::remove_file(done);
                }
                return Err(OutputError::new(&file.target, e));
            }
            renamed.push(&file.target);
        }
        self.committed = true;
        tracing::info!(dir = %self.dir.display(), artifacts = self.artifacts.len(), "committed artifacts");
        Ok(std::mem::take(&mut self.artifacts))
    }
}

impl Drop for ArtifactStager {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        for file in &self.staged {
            let _ = fs::remove_file(&file.tmp);
        }
    }
}

// ============================================================================
// Serializer
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStatistics {
    pub triples: usize,
    pub unique_nodes: usize,
    pub unique_relations: usize,
    pub axioms: usize,
    pub edges_by_kind: BTreeMap<EdgeKind, usize>,
}

#[derive(Debug, Clone)]
pub struct SerializedGraph {
    pub node_map: IdentifierMappingTable,
    pub relation_map: RelationMappingTable,
    pub statistics: GraphStatistics,
}

pub struct Serializer<'a> {
    config: &'a OutputConfig,
    registry: &'a IdentifierRegistry,
}

impl<'a> Serializer<'a> {
    pub fn new(config: &'a OutputConfig, registry: &'a IdentifierRegistry) -> Self {
        Self { config, registry }
    }

    pub fn triples_file_name(&self) -> String {
        match self.config.triple_format {
            TripleFormat::Delimited => format!("{}_triples.tsv", self.config.name),
            TripleFormat::Ntriples => format!("{}_triples.nt", self.config.name),
        }
    }

    pub fn edge_list_file_name(&self) -> String {
        format!("{}_edge_list.txt", self.config.name)
    }

    pub fn node_map_file_name(&self) -> String {
        format!("{}_node_map.tsv", self.config.name)
    }

    pub fn relation_map_file_name(&self) -> String {
        format!("{}_relation_map.tsv", self.config.name)
    }

    /// Stage every artifact for `graph`. Nothing is visible in the output
    /// directory until the stager is committed.
    pub fn stage(
        &self,
        graph: &WorkingGraph,
        stager: &mut ArtifactStager,
    ) -> Result<SerializedGraph, OutputError> {
        let mut edges: Vec<&Edge> = graph.edges().iter().collect();
        edges.sort_by(|a, b| {
            (&a.subject, &a.predicate, &a.object).cmp(&(&b.subject, &b.predicate, &b.object))
        });

        let node_map = IdentifierMappingTable::from_graph(graph);
        let relation_map = RelationMappingTable::from_graph(graph);

        stager.stage(&self.triples_file_name(), |w| match self.config.triple_format {
            TripleFormat::Delimited => self.write_delimited(&edges, w),
            TripleFormat::Ntriples => write_ntriples(&edges, w),
        })?;
        stager.stage(&self.edge_list_file_name(), |w| {
            self.write_edge_list(&edges, &node_map, &relation_map, w)
        })?;
        stager.stage(&self.node_map_file_name(), |w| {
            write_mapping(node_map.iter().map(|(code, id)| (code, id.as_str())), w)
        })?;
        if self.config.include_predicates {
            stager.stage(&self.relation_map_file_name(), |w| {
                write_mapping(relation_map.iter().map(|(code, p)| (code, p.as_str())), w)
            })?;
        }

        let mut statistics = GraphStatistics {
            triples: edges.len(),
            unique_nodes: node_map.len(),
            unique_relations: relation_map.len(),
            axioms: graph.axiom_count(),
            ..Default::default()
        };
        for edge in &edges {
            *statistics.edges_by_kind.entry(edge.kind).or_default() += 1;
        }
        tracing::info!(
            triples = statistics.triples,
            nodes = statistics.unique_nodes,
            relations = statistics.unique_relations,
            "serialized graph"
        );

        Ok(SerializedGraph {
            node_map,
            relation_map,
            statistics,
        })
    }

    fn node_text(&self, id: &NodeId) -> String {
        match self.config.label_form {
            LabelForm::Iri => id.to_string(),
            LabelForm::Label => self
                .registry
                .display_label(id)
                .unwrap_or_else(|| id.to_string()),
        }
    }

    fn predicate_text<'p>(&self, predicate: &'p str) -> &'p str {
        match self.config.label_form {
            LabelForm::Iri => predicate,
            LabelForm::Label => local_name(predicate),
        }
    }

    fn write_delimited(&self, edges: &[&Edge], w: &mut dyn Write) -> io::Result<()> {
        let d = self.config.delimiter.as_str();
        for edge in edges {
            writeln!(
                w,
                "{}{d}{}{d}{}",
                clean_field(&self.node_text(&edge.subject), d),
                clean_field(self.predicate_text(&edge.predicate), d),
                clean_field(&self.node_text(&edge.object), d)
            )?;
        }
        Ok(())
    }

    fn write_edge_list(
        &self,
        edges: &[&Edge],
        nodes: &IdentifierMappingTable,
        relations: &RelationMappingTable,
        w: &mut dyn Write,
    ) -> io::Result<()> {
        let d = self.config.integer_delimiter.as_str();
        for edge in edges {
            let s = code_of(nodes, &edge.subject)?;
            let o = code_of(nodes, &edge.object)?;
            if self.config.include_predicates {
                let p = code_of(relations, &edge.predicate)?;
                writeln!(w, "{s}{d}{p}{d}{o}")?;
            } else {
                writeln!(w, "{s}{d}{o}")?;
            }
        }
        Ok(())
    }
}

/// Control characters and the column delimiter become spaces, so a label
/// never splits a row or adds a column.
fn clean_field(text: &str, delimiter: &str) -> String {
    let line: String = text
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    if delimiter.is_empty() || !line.contains(delimiter) {
        line
    } else {
        line.replace(delimiter, " ")
    }
}

fn code_of<K: Ord + Clone + std::fmt::Display>(map: &IntegerMap<K>, key: &K) -> io::Result<u64> {
    map.code(key).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("{key} missing from mapping table"),
        )
    })
}

fn write_ntriples(edges: &[&Edge], w: &mut dyn Write) -> io::Result<()> {
    let mut nt = NTriplesWriter::new(w);
    for edge in edges {
        nt.triple(
            &Term::iri(edge.subject.as_str()),
            &edge.predicate,
            &Term::iri(edge.object.as_str()),
        )?;
    }
    nt.finish()?;
    Ok(())
}

fn write_mapping<'k>(
    entries: impl Iterator<Item = (u64, &'k str)>,
    w: &mut dyn Write,
) -> io::Result<()> {
    for (code, key) in entries {
        writeln!(w, "{key}\t{code}")?;
    }
    Ok(())
}
