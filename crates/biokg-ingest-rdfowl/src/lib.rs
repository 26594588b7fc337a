//! RDF/OWL ontology reader for biokg.
//!
//! Parses an ontology file with Sophia, then decodes it into a flat
//! [`owl::OntologyDocument`]: named classes and individuals, plain edges and
//! the class axioms the rest of the pipeline understands.
//!
//! Supported serializations (picked by file extension):
//! - N-Triples (`.nt`)
//! - Turtle (`.ttl`)
//! - N-Quads (`.nq`, graph names are ignored)
//! - TriG (`.trig`, graph names are ignored)
//! - RDF/XML (`.rdf`, `.owl`, `.xml`)
//!
//! The same reader parses the reasoner's output during closure, and
//! [`ntriples`] writes the reasoner's input.

pub mod ntriples;
pub mod owl;

use anyhow::{anyhow, Result};
use sophia::api::prelude::*;
use std::path::Path;

pub use owl::{DecodeReport, OntologyDocument, OwlAxiom, OwlEdge};

// ============================================================================
// RDF term model
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RdfNode {
    Iri(String),
    BlankNode(String),
}

impl RdfNode {
    pub fn as_iri(&self) -> Option<&str> {
        match self {
            RdfNode::Iri(iri) => Some(iri),
            RdfNode::BlankNode(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RdfLiteral {
    pub lexical: String,
    pub datatype: Option<String>,
    pub language: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RdfObject {
    Node(RdfNode),
    Literal(RdfLiteral),
}

impl RdfObject {
    pub fn as_node(&self) -> Option<&RdfNode> {
        match self {
            RdfObject::Node(node) => Some(node),
            RdfObject::Literal(_) => None,
        }
    }

    pub fn as_iri(&self) -> Option<&str> {
        self.as_node().and_then(RdfNode::as_iri)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RdfStatement {
    pub subject: RdfNode,
    pub predicate: String,
    pub object: RdfObject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RdfFormat {
    NTriples,
    Turtle,
    NQuads,
    TriG,
    RdfXml,
}

impl RdfFormat {
    pub fn from_path(path: &Path) -> Result<RdfFormat> {
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_lowercase();
        match ext.as_str() {
            "nt" | "ntriples" => Ok(RdfFormat::NTriples),
            "ttl" | "turtle" => Ok(RdfFormat::Turtle),
            "nq" | "nquads" => Ok(RdfFormat::NQuads),
            "trig" => Ok(RdfFormat::TriG),
            "rdf" | "owl" | "xml" => Ok(RdfFormat::RdfXml),
            other => Err(anyhow!(
                "unsupported RDF format: .{other} ({})",
                path.display()
            )),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{message}")]
struct RdfSinkError {
    message: String,
}

impl From<anyhow::Error> for RdfSinkError {
    fn from(value: anyhow::Error) -> Self {
        Self {
            message: value.to_string(),
        }
    }
}

// ============================================================================
// Term parsing (Sophia display form)
// ============================================================================

fn unescape_rdf_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

fn parse_term_display(term: &str) -> Result<RdfObject> {
    let s = term.trim();

    if let Some(rest) = s.strip_prefix('<').and_then(|t| t.strip_suffix('>')) {
        return Ok(RdfObject::Node(RdfNode::Iri(rest.to_string())));
    }

    if let Some(rest) = s.strip_prefix("_:") {
        return Ok(RdfObject::Node(RdfNode::BlankNode(rest.to_string())));
    }

    if s.starts_with('"') {
        let mut end_quote = None;
        let mut escaped = false;
        for (i, ch) in s.char_indices().skip(1) {
            if ch == '"' && !escaped {
                end_quote = Some(i);
                break;
            }
            escaped = ch == '\\' && !escaped;
        }
        let Some(end) = end_quote else {
            return Err(anyhow!("invalid literal term (missing closing quote): {s}"));
        };

        let lexical = unescape_rdf_string(&s[1..end]);
        let rest = s[end + 1..].trim();

        let mut language = None;
        let mut datatype = None;
        if let Some(lang) = rest.strip_prefix('@') {
            language = Some(lang.to_string());
        } else if let Some(dt) = rest.strip_prefix("^^") {
            let dt = dt.trim();
            let dt = dt
                .strip_prefix('<')
                .and_then(|t| t.strip_suffix('>'))
                .unwrap_or(dt);
            if !dt.is_empty() {
                datatype = Some(dt.to_string());
            }
        }

        return Ok(RdfObject::Literal(RdfLiteral {
            lexical,
            datatype,
            language,
        }));
    }

    Err(anyhow!("unsupported RDF term form: {s}"))
}

fn parse_node_term_display(term: &str) -> Result<RdfNode> {
    match parse_term_display(term)? {
        RdfObject::Node(node) => Ok(node),
        RdfObject::Literal(_) => Err(anyhow!("expected IRI/blank node, got literal: {term}")),
    }
}

/// Append one statement given the display forms of its terms. Statements
/// whose predicate is not an IRI are dropped.
fn push_statement(
    out: &mut Vec<RdfStatement>,
    s: &str,
    p: &str,
    o: &str,
) -> std::result::Result<(), RdfSinkError> {
    let subject = parse_node_term_display(s)?;
    let RdfNode::Iri(predicate) = parse_node_term_display(p)? else {
        return Ok(());
    };
    let object = parse_term_display(o)?;
    out.push(RdfStatement {
        subject,
        predicate,
        object,
    });
    Ok(())
}

// ============================================================================
// Entry points
// ============================================================================

pub fn parse_rdf_statements(bytes: &[u8], format: RdfFormat) -> Result<Vec<RdfStatement>> {
    let reader = std::io::BufReader::new(std::io::Cursor::new(bytes));
    let mut out: Vec<RdfStatement> = Vec::new();

    match format {
        RdfFormat::NTriples => {
            let mut parser = sophia::turtle::parser::nt::parse_bufread(reader);
            parser
                .try_for_each_triple(|t| -> std::result::Result<(), RdfSinkError> {
                    push_statement(
                        &mut out,
                        &t.s().to_string(),
                        &t.p().to_string(),
                        &t.o().to_string(),
                    )
                })
                .map_err(|e| anyhow!("failed to parse N-Triples: {e}"))?;
        }
        RdfFormat::Turtle => {
            let mut parser = sophia::turtle::parser::turtle::parse_bufread(reader);
            parser
                .try_for_each_triple(|t| -> std::result::Result<(), RdfSinkError> {
                    push_statement(
                        &mut out,
                        &t.s().to_string(),
                        &t.p().to_string(),
                        &t.o().to_string(),
                    )
                })
                .map_err(|e| anyhow!("failed to parse Turtle: {e}"))?;
        }
        RdfFormat::NQuads => {
            let mut parser = sophia::turtle::parser::nq::parse_bufread(reader);
            parser
                .try_for_each_quad(|q| -> std::result::Result<(), RdfSinkError> {
                    push_statement(
                        &mut out,
                        &q.s().to_string(),
                        &q.p().to_string(),
                        &q.o().to_string(),
                    )
                })
                .map_err(|e| anyhow!("failed to parse N-Quads: {e}"))?;
        }
        RdfFormat::TriG => {
            let mut parser = sophia::turtle::parser::trig::parse_bufread(reader);
            parser
                .try_for_each_quad(|q| -> std::result::Result<(), RdfSinkError> {
                    push_statement(
                        &mut out,
                        &q.s().to_string(),
                        &q.p().to_string(),
                        &q.o().to_string(),
                    )
                })
                .map_err(|e| anyhow!("failed to parse TriG: {e}"))?;
        }
        RdfFormat::RdfXml => {
            let mut parser = sophia::xml::parser::parse_bufread(reader);
            parser
                .try_for_each_triple(|t| -> std::result::Result<(), RdfSinkError> {
                    push_statement(
                        &mut out,
                        &t.s().to_string(),
                        &t.p().to_string(),
                        &t.o().to_string(),
                    )
                })
                .map_err(|e| anyhow!("failed to parse RDF/XML: {e}"))?;
        }
    }

    Ok(out)
}

pub fn read_rdf_file(path: &Path) -> Result<Vec<RdfStatement>> {
    let format = RdfFormat::from_path(path)?;
    let bytes =
        std::fs::read(path).map_err(|e| anyhow!("failed to read {}: {e}", path.display()))?;
    parse_rdf_statements(&bytes, format).map_err(|e| anyhow!("{}: {e}", path.display()))
}

/// Read and decode one ontology file. `source` is recorded as provenance.
pub fn read_ontology(path: &Path, source: &str) -> Result<OntologyDocument> {
    let statements = read_rdf_file(path)?;
    let doc = OntologyDocument::from_statements(source, &statements);
    tracing::debug!(
        source,
        path = %path.display(),
        statements = statements.len(),
        edges = doc.edges.len(),
        axioms = doc.axioms.len(),
        "decoded ontology"
    );
    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_NT: &str = r#"
<http://purl.obolibrary.org/obo/HP_0001250> <http://www.w3.org/2000/01/rdf-schema#subClassOf> <http://purl.obolibrary.org/obo/HP_0000118> .
<http://purl.obolibrary.org/obo/HP_0001250> <http://www.w3.org/2000/01/rdf-schema#label> "Seizure"@en .
_:b0 <http://www.w3.org/2002/07/owl#onProperty> <http://purl.obolibrary.org/obo/RO_0002573> .
"#;

    #[test]
    fn parses_ntriples_statements() {
        let statements = parse_rdf_statements(SAMPLE_NT.as_bytes(), RdfFormat::NTriples).unwrap();
        assert_eq!(statements.len(), 3);
        assert_eq!(
            statements[0].object.as_iri(),
            Some("http://purl.obolibrary.org/obo/HP_0000118")
        );
        match &statements[1].object {
            RdfObject::Literal(lit) => {
                assert_eq!(lit.lexical, "Seizure");
                assert_eq!(lit.language.as_deref(), Some("en"));
            }
            other => panic!("expected literal, got {other:?}"),
        }
        assert!(matches!(statements[2].subject, RdfNode::BlankNode(_)));
    }

    #[test]
    fn parses_turtle() {
        let turtle = r#"
@prefix obo: <http://purl.obolibrary.org/obo/> .
@prefix rdfs: <http://www.w3.org/2000/01/rdf-schema#> .
obo:GO_0005694 rdfs:subClassOf obo:GO_0043232 .
"#;
        let statements = parse_rdf_statements(turtle.as_bytes(), RdfFormat::Turtle).unwrap();
        assert_eq!(statements.len(), 1);
        assert_eq!(
            statements[0].subject,
            RdfNode::Iri("http://purl.obolibrary.org/obo/GO_0005694".to_string())
        );
    }

    #[test]
    fn truncated_input_is_an_error() {
        let err = parse_rdf_statements(b"<http://a> <http://b> ", RdfFormat::NTriples);
        assert!(err.is_err());
    }

    #[test]
    fn format_is_chosen_by_extension() {
        assert_eq!(
            RdfFormat::from_path(Path::new("hp.owl")).unwrap(),
            RdfFormat::RdfXml
        );
        assert_eq!(
            RdfFormat::from_path(Path::new("closure.NT")).unwrap(),
            RdfFormat::NTriples
        );
        assert!(RdfFormat::from_path(Path::new("hp.obo")).is_err());
    }

    #[test]
    fn literal_display_with_escaped_quote() {
        let parsed = parse_term_display(r#""a \"quoted\" word"@en"#).unwrap();
        match parsed {
            RdfObject::Literal(lit) => assert_eq!(lit.lexical, "a \"quoted\" word"),
            other => panic!("expected literal, got {other:?}"),
        }
    }
}
