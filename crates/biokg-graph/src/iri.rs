//! Identifier normalization.
//!
//! Sources name the same entity in several ways (`HP:0000118`, `HP_0000118`,
//! `<http://purl.obolibrary.org/obo/HP_0000118>`). Every identifier is
//! normalized to one IRI string before it touches the registry.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::vocab::OBO_NS;

/// CURIE prefix → namespace IRI.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrefixMap {
    prefixes: BTreeMap<String, String>,
}

impl PrefixMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(mut self, prefix: &str, namespace: &str) -> Self {
        self.insert(prefix, namespace);
        self
    }

    pub fn insert(&mut self, prefix: &str, namespace: &str) {
        self.prefixes
            .insert(prefix.to_string(), namespace.to_string());
    }

    pub fn len(&self) -> usize {
        self.prefixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }

    pub fn namespace(&self, prefix: &str) -> Option<&str> {
        self.prefixes.get(prefix).map(String::as_str)
    }

    /// Normalize a source identifier to its IRI form.
    ///
    /// Rules, first match wins:
    /// 1. `<iri>` and absolute IRIs (`scheme://`, `urn:`) are kept verbatim.
    /// 2. `prefix:local` with a configured prefix expands to `namespace + local`.
    /// 3. OBO-style CURIEs (`HP:0000118`, `HP_0000118`) expand into the OBO
    ///    PURL namespace as `HP_0000118`.
    /// 4. Anything else without whitespace is kept verbatim.
    ///
    /// Returns `None` for empty identifiers and identifiers containing whitespace.
    pub fn normalize(&self, raw: &str) -> Option<String> {
        let s = raw.trim();
        let s = s
            .strip_prefix('<')
            .and_then(|t| t.strip_suffix('>'))
            .unwrap_or(s);
        if s.is_empty() || s.chars().any(char::is_whitespace) {
            return None;
        }

        if s.contains("://") || s.starts_with("urn:") {
            return Some(s.to_string());
        }

        if let Some((prefix, local)) = s.split_once(':') {
            if let Some(ns) = self.prefixes.get(prefix) {
                return Some(format!("{ns}{local}"));
            }
        }

        if let Some((prefix, local)) = obo_curie_parts(s) {
            return Some(format!("{OBO_NS}{prefix}_{local}"));
        }

        Some(s.to_string())
    }
}

/// Split an OBO-style CURIE into `(PREFIX, local)`.
///
/// The prefix must start with an ASCII letter and contain only ASCII
/// alphanumerics; the local part must be non-empty alphanumerics/underscores.
fn obo_curie_parts(s: &str) -> Option<(&str, &str)> {
    let split = s.find([':', '_'])?;
    let (prefix, rest) = s.split_at(split);
    let local = &rest[1..];

    let mut prefix_chars = prefix.chars();
    let first = prefix_chars.next()?;
    if !first.is_ascii_alphabetic() || !prefix_chars.all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    if local.is_empty() || !local.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    Some((prefix, local))
}

/// Last path or fragment segment of an IRI.
pub fn local_name(iri: &str) -> &str {
    iri.rsplit(['#', '/']).next().unwrap_or(iri)
}
