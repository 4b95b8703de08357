//! Named-graph publication to a SPARQL triple store.
//!
//! Each source repository owns exactly one named graph, identified by the
//! repository URL. A harvest clears that graph and then loads the graphs of
//! every asset found in the repository into it. Nothing outside the named
//! graph is ever touched.

mod memory;
mod sparql;

use std::collections::HashMap;

use async_trait::async_trait;
use harvester_shared::{HarvesterError, Result};
use oxigraph::model::{Graph, NamedNode};

pub use memory::MemoryTripleStore;
pub use sparql::{SparqlTripleStore, parse_select_json};

// ---------------------------------------------------------------------------
// Select results
// ---------------------------------------------------------------------------

/// Value bound to a variable in a SELECT solution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectValue {
    Iri(String),
    Literal {
        value: String,
        datatype: Option<String>,
        language: Option<String>,
    },
    BlankNode(String),
}

impl SelectValue {
    /// The lexical value regardless of term kind.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Iri(s) | Self::BlankNode(s) => s,
            Self::Literal { value, .. } => value,
        }
    }
}

impl std::fmt::Display for SelectValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Iri(iri) => write!(f, "<{iri}>"),
            Self::BlankNode(id) => write!(f, "_:{id}"),
            Self::Literal {
                value,
                language: Some(lang),
                ..
            } => write!(f, "{value:?}@{lang}"),
            Self::Literal {
                value,
                datatype: Some(datatype),
                ..
            } => write!(f, "{value:?}^^<{datatype}>"),
            Self::Literal { value, .. } => write!(f, "{value:?}"),
        }
    }
}

/// One solution of a SELECT query. Unbound variables are absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectRow {
    pub bindings: HashMap<String, SelectValue>,
}

impl SelectRow {
    pub fn get(&self, var: &str) -> Option<&SelectValue> {
        self.bindings.get(var)
    }

    pub fn get_str(&self, var: &str) -> Option<&str> {
        self.bindings.get(var).map(SelectValue::as_str)
    }
}

// ---------------------------------------------------------------------------
// Gateway trait
// ---------------------------------------------------------------------------

/// Named-graph operations against a triple store.
#[async_trait]
pub trait TripleStore: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &'static str;

    /// Removes every triple of the named graph. Clearing a graph that does
    /// not exist succeeds.
    async fn clear_existing_named_graph(&self, graph_id: &str) -> Result<()>;

    /// Adds every triple of `graph` to the named graph in one update.
    async fn save(&self, graph_id: &str, graph: &Graph) -> Result<()>;

    /// Runs a SELECT query.
    async fn select(&self, query: &str) -> Result<Vec<SelectRow>>;
}

// ---------------------------------------------------------------------------
// Update builders
// ---------------------------------------------------------------------------

/// Parses a graph identifier, rejecting anything that is not an absolute IRI.
///
/// The identifier is used verbatim: no trailing-slash or scheme
/// normalisation is applied.
pub fn graph_name(graph_id: &str) -> Result<NamedNode> {
    NamedNode::new(graph_id).map_err(|e| {
        HarvesterError::validation(format!("invalid graph identifier '{graph_id}': {e}"))
    })
}

/// `CLEAR SILENT GRAPH <graph_id>`
pub fn clear_graph_update(graph_id: &str) -> Result<String> {
    let graph = graph_name(graph_id)?;
    Ok(format!("CLEAR SILENT GRAPH {graph}"))
}

/// A single `INSERT DATA` carrying the whole graph, or `None` when the graph
/// is empty.
///
/// Blank nodes keep their identity across the graph because they share one
/// request.
pub fn insert_data_update(graph_id: &str, graph: &Graph) -> Result<Option<String>> {
    let name = graph_name(graph_id)?;
    if graph.is_empty() {
        return Ok(None);
    }

    let mut update = format!("INSERT DATA {{ GRAPH {name} {{\n");
    for triple in graph {
        update.push_str(&triple.to_string());
        update.push_str(" .\n");
    }
    update.push_str("} }");
    Ok(Some(update))
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxigraph::model::{BlankNode, Literal, NamedNode, Triple};

    #[test]
    fn graph_names_must_be_absolute_iris() {
        assert!(graph_name("https://github.com/italia/dati-semantic-assets").is_ok());
        for bad in ["", "not an iri", "relative/path", "https://example.org/a b"] {
            let err = graph_name(bad).unwrap_err();
            assert!(matches!(err, HarvesterError::Validation { .. }), "{bad}");
        }
    }

    #[test]
    fn clear_update_uses_exact_graph_name() {
        assert_eq!(
            clear_graph_update("https://github.com/org/repo/").unwrap(),
            "CLEAR SILENT GRAPH <https://github.com/org/repo/>"
        );
    }

    #[test]
    fn insert_update_for_empty_graph_is_none() {
        let update = insert_data_update("https://example.org/g", &Graph::new()).unwrap();
        assert!(update.is_none());
    }

    #[test]
    fn insert_update_carries_every_triple() {
        let subject = NamedNode::new("https://example.org/s").unwrap();
        let predicate = NamedNode::new("https://example.org/p").unwrap();
        let mut graph = Graph::new();
        graph.insert(&Triple::new(
            subject.clone(),
            predicate.clone(),
            Literal::new_language_tagged_literal_unchecked("caf\u{e9} \"quoted\"", "it"),
        ));
        graph.insert(&Triple::new(subject, predicate, BlankNode::new_unchecked("b0")));

        let update = insert_data_update("https://example.org/g", &graph)
            .unwrap()
            .unwrap();
        assert!(update.starts_with("INSERT DATA { GRAPH <https://example.org/g> {\n"));
        assert!(update.contains(r#""café \"quoted\""@it"#));
        assert!(update.contains("_:b0"));
        assert_eq!(update.matches(" .\n").count(), 2);
    }

    #[test]
    fn select_value_display() {
        assert_eq!(SelectValue::Iri("https://a".into()).to_string(), "<https://a>");
        let lit = SelectValue::Literal {
            value: "x".into(),
            datatype: None,
            language: Some("en".into()),
        };
        assert_eq!(lit.to_string(), "\"x\"@en");
        assert_eq!(lit.as_str(), "x");
    }
}
