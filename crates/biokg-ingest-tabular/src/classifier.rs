//! Relation-type classifier: row predicate → canonical predicate IRI.

use biokg_graph::PrefixMap;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::table::{TableFormat, TableReader};
use crate::TabularError;

/// Maps predicate labels (`"interacts with"`), CURIEs (`RO:0002434`) and IRIs
/// to a canonical predicate IRI, and knows which relations have an inverse.
#[derive(Debug, Clone, Default)]
pub struct RelationClassifier {
    prefixes: PrefixMap,
    /// Lower-cased label → IRI.
    labels: HashMap<String, String>,
    inverses: HashMap<String, String>,
}

impl RelationClassifier {
    pub fn new(prefixes: PrefixMap) -> Self {
        Self {
            prefixes,
            ..Default::default()
        }
    }

    pub fn with_label(mut self, label: &str, iri: &str) -> Self {
        self.insert_label(label, iri);
        self
    }

    pub fn with_inverse(mut self, relation: &str, inverse: &str) -> Self {
        self.insert_inverse(relation, inverse);
        self
    }

    pub fn insert_label(&mut self, label: &str, iri: &str) {
        let iri = self.prefixes.normalize(iri).unwrap_or_else(|| iri.trim().to_string());
        self.labels.insert(label.trim().to_lowercase(), iri);
    }

    /// Declares `relation` and `inverse` as inverses of each other.
    pub fn insert_inverse(&mut self, relation: &str, inverse: &str) {
        let (Some(a), Some(b)) = (self.classify(relation), self.classify(inverse)) else {
            return;
        };
        self.inverses.insert(a.clone(), b.clone());
        self.inverses.insert(b, a);
    }

    /// Load a `label<TAB>iri` table. Returns the number of labels read.
    pub fn load_labels<R: BufRead>(&mut self, reader: R, table: &str) -> Result<usize, TabularError> {
        let mut n = 0;
        for row in TableReader::new(reader, TableFormat::tsv()) {
            let row = row.map_err(|e| TabularError::io(table, e))?;
            let (Some(label), Some(iri)) = (row.field(0), row.field(1)) else {
                return Err(TabularError::Malformed {
                    table: table.to_string(),
                    line: row.line,
                    message: "expected `label<TAB>iri`".to_string(),
                });
            };
            self.insert_label(label, iri);
            n += 1;
        }
        Ok(n)
    }

    /// Load an `iri<TAB>inverse_iri` table. Returns the number of pairs read.
    pub fn load_inverses<R: BufRead>(&mut self, reader: R, table: &str) -> Result<usize, TabularError> {
        let mut n = 0;
        for row in TableReader::new(reader, TableFormat::tsv()) {
            let row = row.map_err(|e| TabularError::io(table, e))?;
            let (Some(rel), Some(inv)) = (row.field(0), row.field(1)) else {
                return Err(TabularError::Malformed {
                    table: table.to_string(),
                    line: row.line,
                    message: "expected `iri<TAB>inverse_iri`".to_string(),
                });
            };
            self.insert_inverse(rel, inv);
            n += 1;
        }
        Ok(n)
    }

    pub fn load_labels_file(&mut self, path: &Path) -> Result<usize, TabularError> {
        let file = File::open(path).map_err(|e| TabularError::io(path, e))?;
        self.load_labels(BufReader::new(file), &path.display().to_string())
    }

    pub fn load_inverses_file(&mut self, path: &Path) -> Result<usize, TabularError> {
        let file = File::open(path).map_err(|e| TabularError::io(path, e))?;
        self.load_inverses(BufReader::new(file), &path.display().to_string())
    }

    /// Canonical predicate IRI, or `None` for an empty/invalid predicate.
    pub fn classify(&self, raw: &str) -> Option<String> {
        let key = raw.trim().to_lowercase();
        if let Some(iri) = self.labels.get(&key) {
            return Some(iri.clone());
        }
        self.prefixes.normalize(raw)
    }

    pub fn inverse_of(&self, predicate_iri: &str) -> Option<&str> {
        self.inverses.get(predicate_iri).map(String::as_str)
    }

    pub fn label_count(&self) -> usize {
        self.labels.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RO_INTERACTS: &str = "http://purl.obolibrary.org/obo/RO_0002434";

    #[test]
    fn labels_curies_and_iris_classify_to_the_same_predicate() {
        let classifier = RelationClassifier::default().with_label("Interacts With", "RO:0002434");
        assert_eq!(classifier.classify("interacts with").as_deref(), Some(RO_INTERACTS));
        assert_eq!(classifier.classify("RO_0002434").as_deref(), Some(RO_INTERACTS));
        assert_eq!(classifier.classify(RO_INTERACTS).as_deref(), Some(RO_INTERACTS));
        assert_eq!(classifier.classify("  "), None);
    }

    #[test]
    fn inverses_are_symmetric() {
        let tsv = "RO:0002436\tRO:0002436\nRO:0000056\tRO:0000057\n";
        let mut classifier = RelationClassifier::default();
        assert_eq!(classifier.load_inverses(tsv.as_bytes(), "inverses.tsv").unwrap(), 2);
        assert_eq!(
            classifier.inverse_of("http://purl.obolibrary.org/obo/RO_0000057"),
            Some("http://purl.obolibrary.org/obo/RO_0000056")
        );
        assert_eq!(
            classifier.inverse_of("http://purl.obolibrary.org/obo/RO_0002436"),
            Some("http://purl.obolibrary.org/obo/RO_0002436")
        );
    }

    #[test]
    fn label_table_with_one_column_is_malformed() {
        let mut classifier = RelationClassifier::default();
        let err = classifier
            .load_labels("interacts with\n".as_bytes(), "labels.tsv")
            .unwrap_err();
        assert!(matches!(err, TabularError::Malformed { line: 1, .. }));
    }
}
