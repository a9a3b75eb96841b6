//! Append-only collection of additions and retractions, rendered as RDF/XML.

use std::fmt::Write as _;

use anyhow::{Context, Result};
use grant_core::{Triple, NAMESPACES};
use oxigraph::io::{RdfFormat, RdfSerializer};

/// Collects the two RDF streams of a run. Triples are only ever appended.
#[derive(Debug, Default)]
pub struct DeltaCollector {
    additions: Vec<Triple>,
    retractions: Vec<Triple>,
}

impl DeltaCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, triples: impl IntoIterator<Item = Triple>) {
        self.additions.extend(triples);
    }

    pub fn retract(&mut self, triples: impl IntoIterator<Item = Triple>) {
        self.retractions.extend(triples);
    }

    pub fn additions(&self) -> &[Triple] {
        &self.additions
    }

    pub fn retractions(&self) -> &[Triple] {
        &self.retractions
    }

    pub fn finalize(self) -> FinalizedDelta {
        FinalizedDelta {
            additions: self.additions,
            retractions: self.retractions,
        }
    }
}

/// The closed delta of a run.
#[derive(Debug, Clone, Default)]
pub struct FinalizedDelta {
    pub additions: Vec<Triple>,
    pub retractions: Vec<Triple>,
}

impl FinalizedDelta {
    pub fn additions_document(&self) -> Result<String> {
        render_document(&self.additions)
    }

    pub fn retractions_document(&self) -> Result<String> {
        render_document(&self.retractions)
    }
}

/// RDF/XML with the ingest's namespace prefixes declared on the root element.
/// Non-ASCII characters leave as numeric character references.
pub fn render_document(triples: &[Triple]) -> Result<String> {
    let mut serializer = RdfSerializer::from_format(RdfFormat::RdfXml);
    for (prefix, ns) in NAMESPACES.iter().filter(|(prefix, _)| *prefix != "rdf") {
        serializer = serializer
            .with_prefix(*prefix, *ns)
            .with_context(|| format!("declaring prefix {prefix}"))?;
    }
    let mut writer = serializer.for_writer(Vec::new());
    for triple in triples {
        writer
            .serialize_triple(triple)
            .with_context(|| format!("serializing {triple}"))?;
    }
    let bytes = writer.finish().context("closing RDF/XML document")?;
    let text = String::from_utf8(bytes).context("RDF/XML output is not UTF-8")?;
    Ok(ascii_charrefs(&text))
}

/// Numeric character references for non-ASCII only; used for the text logs.
pub fn ascii_charrefs(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        if ch.is_ascii() {
            out.push(ch);
        } else {
            let _ = write!(out, "&#{};", ch as u32);
        }
    }
    out
}
