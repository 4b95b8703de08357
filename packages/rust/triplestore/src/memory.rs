use async_trait::async_trait;
use harvester_shared::{HarvesterError, Result};
use oxigraph::model::vocab::xsd;
use oxigraph::model::{Graph, GraphNameRef, Term};
use oxigraph::sparql::{QueryResults, SparqlEvaluator};
use oxigraph::store::Store;
use tracing::debug;

use crate::{SelectRow, SelectValue, TripleStore, clear_graph_update, graph_name, insert_data_update};

/// Embedded in-memory triple store.
///
/// Runs the same SPARQL updates as [`SparqlTripleStore`](crate::SparqlTripleStore),
/// so dry runs and tests exercise the real request bodies.
#[derive(Clone)]
pub struct MemoryTripleStore {
    store: Store,
}

impl MemoryTripleStore {
    pub fn new() -> Result<Self> {
        let store = Store::new()
            .map_err(|e| HarvesterError::store(format!("failed to create in-memory store: {e}")))?;
        Ok(Self { store })
    }

    /// Direct access to the underlying store.
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Number of triples currently in the named graph.
    pub fn triple_count(&self, graph_id: &str) -> Result<usize> {
        let name = graph_name(graph_id)?;
        let mut count = 0;
        for quad in self.store.quads_for_pattern(
            None,
            None,
            None,
            Some(GraphNameRef::NamedNode(name.as_ref())),
        ) {
            quad.map_err(|e| HarvesterError::store(e.to_string()))?;
            count += 1;
        }
        Ok(count)
    }

    async fn run_update(&self, update: String) -> Result<()> {
        let prepared = SparqlEvaluator::new()
            .parse_update(&update)
            .map_err(|e| HarvesterError::validation(format!("invalid SPARQL update: {e}")))?;

        let store = self.store.clone();
        tokio::task::spawn_blocking(move || {
            prepared
                .on_store(&store)
                .execute()
                .map_err(|e| HarvesterError::store(format!("SPARQL update failed: {e}")))
        })
        .await
        .map_err(|e| HarvesterError::store(format!("task join error: {e}")))?
    }
}

fn select_value(term: &Term) -> SelectValue {
    match term {
        Term::NamedNode(node) => SelectValue::Iri(node.as_str().to_owned()),
        Term::BlankNode(node) => SelectValue::BlankNode(node.as_str().to_owned()),
        Term::Literal(literal) => {
            let language = literal.language().map(str::to_owned);
            let datatype = (language.is_none() && literal.datatype() != xsd::STRING)
                .then(|| literal.datatype().as_str().to_owned());
            SelectValue::Literal {
                value: literal.value().to_owned(),
                datatype,
                language,
            }
        }
        #[allow(unreachable_patterns)]
        other => SelectValue::Literal {
            value: other.to_string(),
            datatype: None,
            language: None,
        },
    }
}

#[async_trait]
impl TripleStore for MemoryTripleStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn clear_existing_named_graph(&self, graph_id: &str) -> Result<()> {
        let update = clear_graph_update(graph_id)?;
        self.run_update(update).await?;
        debug!(graph = graph_id, "cleared in-memory graph");
        Ok(())
    }

    async fn save(&self, graph_id: &str, graph: &Graph) -> Result<()> {
        match insert_data_update(graph_id, graph)? {
            Some(update) => self.run_update(update).await,
            None => Ok(()),
        }
    }

    /// Unscoped patterns match across every named graph, as on the remote
    /// endpoint's union view.
    async fn select(&self, query: &str) -> Result<Vec<SelectRow>> {
        let mut prepared = SparqlEvaluator::new()
            .parse_query(query)
            .map_err(|e| HarvesterError::validation(format!("invalid SPARQL query: {e}")))?;
        prepared.dataset_mut().set_default_graph_as_union();

        let store = self.store.clone();
        tokio::task::spawn_blocking(move || {
            let results = prepared
                .on_store(&store)
                .execute()
                .map_err(|e| HarvesterError::store(format!("SPARQL query failed: {e}")))?;

            let QueryResults::Solutions(solutions) = results else {
                return Err(HarvesterError::validation("only SELECT queries are supported"));
            };

            let mut rows = Vec::new();
            for solution in solutions {
                let solution = solution.map_err(|e| HarvesterError::store(e.to_string()))?;
                let bindings = solution
                    .iter()
                    .map(|(var, term)| (var.as_str().to_owned(), select_value(term)))
                    .collect();
                rows.push(SelectRow { bindings });
            }
            Ok(rows)
        })
        .await
        .map_err(|e| HarvesterError::store(format!("task join error: {e}")))?
    }
}
