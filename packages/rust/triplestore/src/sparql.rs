use std::collections::HashMap;

use async_trait::async_trait;
use harvester_shared::{HarvesterError, Result, TripleStoreConfig};
use oxigraph::model::Graph;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, instrument};
use url::Url;

use crate::{SelectRow, SelectValue, TripleStore, clear_graph_update, insert_data_update};

/// Triple store reached over the SPARQL 1.1 protocol.
pub struct SparqlTripleStore {
    client: Client,
    query_endpoint: Url,
    update_endpoint: Url,
    username: Option<String>,
    password: Option<String>,
}

impl SparqlTripleStore {
    pub fn new(config: &TripleStoreConfig) -> Result<Self> {
        let query_endpoint = parse_endpoint(&config.endpoint)?;
        let update_endpoint = parse_endpoint(&config.update_endpoint)?;

        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("ndc-harvester/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| HarvesterError::store(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            query_endpoint,
            update_endpoint,
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.username {
            Some(user) => builder.basic_auth(user, self.password.as_ref()),
            None => builder,
        }
    }

    async fn update(&self, update: String) -> Result<()> {
        let response = self
            .authorize(self.client.post(self.update_endpoint.clone()))
            .header("Content-Type", "application/sparql-update")
            .body(update)
            .send()
            .await
            .map_err(|e| HarvesterError::store(format!("update request failed: {e}")))?;

        check_status(response).await.map(|_| ())
    }
}

fn parse_endpoint(endpoint: &str) -> Result<Url> {
    Url::parse(endpoint)
        .map_err(|e| HarvesterError::config(format!("invalid SPARQL endpoint '{endpoint}': {e}")))
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    Err(HarvesterError::store(format!(
        "triple store returned {}: {}",
        status.as_u16(),
        message.trim()
    )))
}

#[async_trait]
impl TripleStore for SparqlTripleStore {
    fn name(&self) -> &'static str {
        "sparql"
    }

    #[instrument(skip(self), fields(endpoint = %self.update_endpoint))]
    async fn clear_existing_named_graph(&self, graph_id: &str) -> Result<()> {
        let update = clear_graph_update(graph_id)?;
        self.update(update).await?;
        info!("cleared named graph");
        Ok(())
    }

    #[instrument(skip(self, graph), fields(endpoint = %self.update_endpoint, triples = graph.len()))]
    async fn save(&self, graph_id: &str, graph: &Graph) -> Result<()> {
        let Some(update) = insert_data_update(graph_id, graph)? else {
            debug!("empty graph, nothing to save");
            return Ok(());
        };
        self.update(update).await?;
        debug!("saved graph");
        Ok(())
    }

    #[instrument(skip_all, fields(endpoint = %self.query_endpoint))]
    async fn select(&self, query: &str) -> Result<Vec<SelectRow>> {
        let response = self
            .authorize(self.client.post(self.query_endpoint.clone()))
            .header("Accept", "application/sparql-results+json")
            .form(&[("query", query)])
            .send()
            .await
            .map_err(|e| HarvesterError::store(format!("query request failed: {e}")))?;

        let body = check_status(response)
            .await?
            .text()
            .await
            .map_err(|e| HarvesterError::store(format!("failed to read query response: {e}")))?;

        parse_select_json(&body)
    }
}

// ---------------------------------------------------------------------------
// SPARQL 1.1 Query Results JSON
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct SparqlResults {
    results: SparqlBindings,
}

#[derive(Deserialize)]
struct SparqlBindings {
    bindings: Vec<HashMap<String, JsonTerm>>,
}

#[derive(Deserialize)]
struct JsonTerm {
    #[serde(rename = "type")]
    kind: String,
    value: String,
    datatype: Option<String>,
    #[serde(rename = "xml:lang")]
    language: Option<String>,
}

impl TryFrom<JsonTerm> for SelectValue {
    type Error = HarvesterError;

    fn try_from(term: JsonTerm) -> Result<Self> {
        match term.kind.as_str() {
            "uri" => Ok(Self::Iri(term.value)),
            "bnode" => Ok(Self::BlankNode(term.value)),
            "literal" | "typed-literal" => Ok(Self::Literal {
                value: term.value,
                datatype: term.datatype,
                language: term.language,
            }),
            other => Err(HarvesterError::store(format!(
                "unknown term type '{other}' in query results"
            ))),
        }
    }
}

/// Decodes a `application/sparql-results+json` document.
pub fn parse_select_json(json: &str) -> Result<Vec<SelectRow>> {
    let results: SparqlResults = serde_json::from_str(json)
        .map_err(|e| HarvesterError::store(format!("failed to parse query results: {e}")))?;

    results
        .results
        .bindings
        .into_iter()
        .map(|solution| {
            let bindings = solution
                .into_iter()
                .map(|(var, term)| Ok((var, SelectValue::try_from(term)?)))
                .collect::<Result<HashMap<_, _>>>()?;
            Ok(SelectRow { bindings })
        })
        .collect()
}
