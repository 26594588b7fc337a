//! Identifier registry: source identifier → stable internal id.
//!
//! Every node in the build passes through here exactly once per source that
//! mentions it. Registration is idempotent and order-independent: the
//! internal id is the canonical IRI of the identifier (after CURIE expansion
//! and equivalence resolution), so two runs that register the same
//! identifiers in a different interleaving end up with identical ids.
//!
//! Storage follows the usual interner layout: a sharded `DashMap` so that
//! registering one identifier only locks the shard that owns it.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::iri::PrefixMap;

// ============================================================================
// Ids and nodes
// ============================================================================

/// Stable internal node identifier (the canonical IRI).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Wrap an already-canonical IRI. This does not register anything; use
    /// [`IdentifierRegistry::register`] for identifiers coming from sources.
    pub fn from_iri(iri: impl Into<String>) -> Self {
        Self(iri.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NodeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Class,
    Instance,
}

impl NodeKind {
    /// Combine two registrations of the same node. A node that any source
    /// treats as a class stays a class.
    pub fn merge(self, other: NodeKind) -> NodeKind {
        match (self, other) {
            (NodeKind::Instance, NodeKind::Instance) => NodeKind::Instance,
            _ => NodeKind::Class,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Class => "class",
            NodeKind::Instance => "instance",
        }
    }

    pub fn parse(s: &str) -> Option<NodeKind> {
        match s.trim().to_ascii_lowercase().as_str() {
            "class" => Some(NodeKind::Class),
            "instance" | "individual" => Some(NodeKind::Instance),
            _ => None,
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    /// Normalized identifiers that resolved to this node.
    pub source_identifiers: BTreeSet<String>,
    pub labels: BTreeSet<String>,
}

impl Node {
    fn new(id: NodeId, kind: NodeKind, source_identifier: String) -> Self {
        let mut source_identifiers = BTreeSet::new();
        source_identifiers.insert(source_identifier);
        Self {
            id,
            kind,
            source_identifiers,
            labels: BTreeSet::new(),
        }
    }

    /// Label used in human-readable outputs; falls back to the id.
    pub fn display_label(&self) -> &str {
        self.labels
            .iter()
            .next()
            .map(String::as_str)
            .unwrap_or_else(|| self.id.as_str())
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unresolved reference: `{identifier}` is not in the identifier registry")]
pub struct UnresolvedReferenceError {
    pub identifier: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid identifier {identifier:?}")]
pub struct InvalidIdentifierError {
    pub identifier: String,
}

#[derive(Debug, Error)]
pub enum EquivalenceTableError {
    #[error("failed to read equivalence table {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("equivalence table line {line}: expected two tab-separated identifiers, got {content:?}")]
    Malformed { line: usize, content: String },
    #[error("equivalence table line {line}: {source}")]
    InvalidIdentifier {
        line: usize,
        #[source]
        source: InvalidIdentifierError,
    },
}

// ============================================================================
// Equivalence table
// ============================================================================

/// Declared identifier equivalences, closed transitively.
///
/// Each equivalence class is represented by its lexicographically smallest
/// normalized member, so the representative does not depend on the order in
/// which pairs were declared.
#[derive(Debug, Clone, Default)]
pub struct EquivalenceTable {
    representative: HashMap<String, String>,
}

impl EquivalenceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(identifier, equivalent_identifier)` pairs, normalizing
    /// both sides with `prefixes`.
    pub fn from_pairs<I, A, B>(prefixes: &PrefixMap, pairs: I) -> Result<Self, InvalidIdentifierError>
    where
        I: IntoIterator<Item = (A, B)>,
        A: AsRef<str>,
        B: AsRef<str>,
    {
        let mut uf = UnionFind::default();
        for (a, b) in pairs {
            let a = normalize_or_err(prefixes, a.as_ref())?;
            let b = normalize_or_err(prefixes, b.as_ref())?;
            uf.union(a, b);
        }
        Ok(Self {
            representative: uf.into_representatives(),
        })
    }

    /// Parse a two-column TSV (`identifier<TAB>equivalent_identifier`).
    /// Blank lines and `#` comments are skipped.
    pub fn from_tsv<R: BufRead>(prefixes: &PrefixMap, reader: R) -> Result<Self, EquivalenceTableError> {
        let mut uf = UnionFind::default();
        for (idx, line) in reader.lines().enumerate() {
            let line_no = idx + 1;
            let line = line.map_err(|source| EquivalenceTableError::Io {
                path: PathBuf::from("<reader>"),
                source,
            })?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let mut cols = trimmed.split('\t');
            let (Some(a), Some(b)) = (cols.next(), cols.next()) else {
                return Err(EquivalenceTableError::Malformed {
                    line: line_no,
                    content: line.clone(),
                });
            };
            let a = normalize_or_err(prefixes, a)
                .map_err(|source| EquivalenceTableError::InvalidIdentifier { line: line_no, source })?;
            let b = normalize_or_err(prefixes, b)
                .map_err(|source| EquivalenceTableError::InvalidIdentifier { line: line_no, source })?;
            uf.union(a, b);
        }
        Ok(Self {
            representative: uf.into_representatives(),
        })
    }

    pub fn from_tsv_file(prefixes: &PrefixMap, path: &Path) -> Result<Self, EquivalenceTableError> {
        let file = std::fs::File::open(path).map_err(|source| EquivalenceTableError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_tsv(prefixes, std::io::BufReader::new(file)).map_err(|e| match e {
            EquivalenceTableError::Io { source, .. } => EquivalenceTableError::Io {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    /// Representative of `iri`'s equivalence class (`iri` itself if it has no
    /// declared equivalents).
    pub fn canonical<'a>(&'a self, iri: &'a str) -> &'a str {
        self.representative
            .get(iri)
            .map(String::as_str)
            .unwrap_or(iri)
    }

    /// Number of identifiers that belong to a non-trivial class.
    pub fn len(&self) -> usize {
        self.representative.len()
    }

    pub fn is_empty(&self) -> bool {
        self.representative.is_empty()
    }
}

fn normalize_or_err(prefixes: &PrefixMap, raw: &str) -> Result<String, InvalidIdentifierError> {
    prefixes.normalize(raw).ok_or_else(|| InvalidIdentifierError {
        identifier: raw.to_string(),
    })
}

#[derive(Default)]
struct UnionFind {
    index: HashMap<String, usize>,
    names: Vec<String>,
    parent: Vec<usize>,
}

impl UnionFind {
    fn slot(&mut self, name: String) -> usize {
        if let Some(&i) = self.index.get(&name) {
            return i;
        }
        let i = self.names.len();
        self.index.insert(name.clone(), i);
        self.names.push(name);
        self.parent.push(i);
        i
    }

    fn find(&mut self, mut i: usize) -> usize {
        while self.parent[i] != i {
            self.parent[i] = self.parent[self.parent[i]];
            i = self.parent[i];
        }
        i
    }

    fn union(&mut self, a: String, b: String) {
        let a = self.slot(a);
        let b = self.slot(b);
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent[rb] = ra;
        }
    }

    fn into_representatives(mut self) -> HashMap<String, String> {
        let mut smallest: BTreeMap<usize, usize> = BTreeMap::new();
        for i in 0..self.names.len() {
            let root = self.find(i);
            let best = smallest.entry(root).or_insert(i);
            if self.names[i] < self.names[*best] {
                *best = i;
            }
        }
        let mut out = HashMap::with_capacity(self.names.len());
        for i in 0..self.names.len() {
            let root = self.find(i);
            let rep = smallest[&root];
            out.insert(self.names[i].clone(), self.names[rep].clone());
        }
        out
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Concurrent identifier registry shared by all ingestion stages.
#[derive(Debug, Default)]
pub struct IdentifierRegistry {
    prefixes: PrefixMap,
    equivalences: EquivalenceTable,
    /// Raw source spelling → id, so repeated lookups skip normalization.
    aliases: DashMap<String, NodeId>,
    nodes: DashMap<NodeId, Node>,
}

impl IdentifierRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(prefixes: PrefixMap, equivalences: EquivalenceTable) -> Self {
        Self {
            prefixes,
            equivalences,
            aliases: DashMap::new(),
            nodes: DashMap::new(),
        }
    }

    pub fn prefixes(&self) -> &PrefixMap {
        &self.prefixes
    }

    pub fn equivalences(&self) -> &EquivalenceTable {
        &self.equivalences
    }

    /// Canonical id for `source_identifier` without registering it.
    pub fn canonical_id(&self, source_identifier: &str) -> Option<NodeId> {
        let iri = self.prefixes.normalize(source_identifier)?;
        Some(NodeId(self.equivalences.canonical(&iri).to_string()))
    }

    /// Register `source_identifier` as a node of `kind`, returning its
    /// internal id. Registering again returns the same id; a `class`
    /// registration upgrades an existing `instance`.
    pub fn register(
        &self,
        source_identifier: &str,
        kind: NodeKind,
    ) -> Result<NodeId, InvalidIdentifierError> {
        let iri = normalize_or_err(&self.prefixes, source_identifier)?;
        let id = NodeId(self.equivalences.canonical(&iri).to_string());

        self.nodes
            .entry(id.clone())
            .and_modify(|node| {
                node.kind = node.kind.merge(kind);
                if !node.source_identifiers.contains(&iri) {
                    node.source_identifiers.insert(iri.clone());
                }
            })
            .or_insert_with(|| Node::new(id.clone(), kind, iri.clone()));

        let raw = source_identifier.trim();
        if !self.aliases.contains_key(raw) {
            self.aliases.insert(raw.to_string(), id.clone());
        }
        Ok(id)
    }

    /// Resolve a source identifier to the id of an already-registered node.
    pub fn resolve(&self, source_identifier: &str) -> Result<NodeId, UnresolvedReferenceError> {
        if let Some(id) = self.aliases.get(source_identifier.trim()) {
            return Ok(id.clone());
        }
        match self.canonical_id(source_identifier) {
            Some(id) if self.nodes.contains_key(&id) => Ok(id),
            _ => Err(UnresolvedReferenceError {
                identifier: source_identifier.to_string(),
            }),
        }
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn node(&self, id: &NodeId) -> Option<Node> {
        self.nodes.get(id).map(|n| n.clone())
    }

    pub fn kind_of(&self, id: &NodeId) -> Option<NodeKind> {
        self.nodes.get(id).map(|n| n.kind)
    }

    /// Attach a human-readable label. Returns false if the node is unknown.
    pub fn add_label(&self, id: &NodeId, label: &str) -> bool {
        let label = label.trim();
        match self.nodes.get_mut(id) {
            Some(mut node) => {
                if !label.is_empty() {
                    node.labels.insert(label.to_string());
                }
                true
            }
            None => false,
        }
    }

    pub fn display_label(&self, id: &NodeId) -> Option<String> {
        self.nodes.get(id).map(|n| n.display_label().to_string())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All nodes, sorted by id.
    pub fn snapshot(&self) -> Vec<Node> {
        let mut nodes: Vec<Node> = self.nodes.iter().map(|n| n.value().clone()).collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        nodes
    }
}
