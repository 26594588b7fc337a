//! Minimal N-Triples writer.
//!
//! Output is deterministic: blank nodes are numbered in write order, so the
//! same sequence of calls always produces the same bytes.

use biokg_graph::vocab::{RDF_FIRST, RDF_NIL, RDF_REST};
use std::io::{self, Write};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    Iri(String),
    Blank(u64),
    Literal(String),
}

impl Term {
    pub fn iri(iri: impl Into<String>) -> Self {
        Term::Iri(iri.into())
    }
}

pub struct NTriplesWriter<W: Write> {
    out: W,
    next_blank: u64,
    triples: usize,
}

impl<W: Write> NTriplesWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            next_blank: 0,
            triples: 0,
        }
    }

    pub fn fresh_blank(&mut self) -> Term {
        let b = Term::Blank(self.next_blank);
        self.next_blank += 1;
        b
    }

    pub fn triple(&mut self, subject: &Term, predicate: &str, object: &Term) -> io::Result<()> {
        write_term(&mut self.out, subject)?;
        self.out.write_all(b" ")?;
        write_iri(&mut self.out, predicate)?;
        self.out.write_all(b" ")?;
        write_term(&mut self.out, object)?;
        self.out.write_all(b" .\n")?;
        self.triples += 1;
        Ok(())
    }

    /// Shorthand for a triple whose three terms are IRIs.
    pub fn iri_triple(&mut self, subject: &str, predicate: &str, object: &str) -> io::Result<()> {
        self.triple(&Term::iri(subject), predicate, &Term::iri(object))
    }

    /// Write an RDF collection and return its head (`rdf:nil` when empty).
    pub fn list(&mut self, items: &[Term]) -> io::Result<Term> {
        if items.is_empty() {
            return Ok(Term::iri(RDF_NIL));
        }
        let cells: Vec<Term> = items.iter().map(|_| self.fresh_blank()).collect();
        for (i, item) in items.iter().enumerate() {
            self.triple(&cells[i], RDF_FIRST, item)?;
            let rest = cells.get(i + 1).cloned().unwrap_or_else(|| Term::iri(RDF_NIL));
            self.triple(&cells[i], RDF_REST, &rest)?;
        }
        Ok(cells[0].clone())
    }

    pub fn triples_written(&self) -> usize {
        self.triples
    }

    pub fn finish(mut self) -> io::Result<W> {
        self.out.flush()?;
        Ok(self.out)
    }
}

fn write_term<W: Write>(out: &mut W, term: &Term) -> io::Result<()> {
    match term {
        Term::Iri(iri) => write_iri(out, iri),
        Term::Blank(n) => write!(out, "_:b{n}"),
        Term::Literal(lexical) => {
            out.write_all(b"\"")?;
            for c in lexical.chars() {
                match c {
                    '"' => out.write_all(b"\\\"")?,
                    '\\' => out.write_all(b"\\\\")?,
                    '\n' => out.write_all(b"\\n")?,
                    '\r' => out.write_all(b"\\r")?,
                    '\t' => out.write_all(b"\\t")?,
                    c => write!(out, "{c}")?,
                }
            }
            out.write_all(b"\"")
        }
    }
}

/// IRIREF with the characters N-Triples forbids written as `\uXXXX`.
fn write_iri<W: Write>(out: &mut W, iri: &str) -> io::Result<()> {
    out.write_all(b"<")?;
    for c in iri.chars() {
        if matches!(c, '<' | '>' | '"' | '{' | '}' | '|' | '^' | '`' | '\\') || c <= ' ' {
            write!(out, "\\u{:04X}", c as u32)?;
        } else {
            write!(out, "{c}")?;
        }
    }
    out.write_all(b">")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{parse_rdf_statements, RdfFormat};

    #[test]
    fn output_parses_back() {
        let mut w = NTriplesWriter::new(Vec::new());
        w.iri_triple("http://ex/a", "http://ex/p", "http://ex/b").unwrap();
        let head = w
            .list(&[Term::iri("http://ex/x"), Term::iri("http://ex/y")])
            .unwrap();
        w.triple(&Term::iri("http://ex/a"), "http://ex/members", &head)
            .unwrap();
        w.triple(
            &Term::iri("http://ex/a"),
            "http://ex/label",
            &Term::Literal("say \"hi\"\n".to_string()),
        )
        .unwrap();
        assert_eq!(w.triples_written(), 6);

        let bytes = w.finish().unwrap();
        let statements = parse_rdf_statements(&bytes, RdfFormat::NTriples).unwrap();
        assert_eq!(statements.len(), 6);
    }

    #[test]
    fn empty_list_is_nil() {
        let mut w = NTriplesWriter::new(Vec::new());
        assert_eq!(w.list(&[]).unwrap(), Term::iri(RDF_NIL));
        assert_eq!(w.triples_written(), 0);
    }
}
