//! Loads asset description files into typed models.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use harvester_shared::{HarvesterError, Result};
use oxigraph::io::{RdfFormat, RdfParser};
use oxigraph::model::{Graph, Triple};
use tracing::{debug, instrument};
use url::Url;

use crate::model::{ControlledVocabularyModel, OntologyModel};

/// Builds asset models from files on disk.
#[derive(Debug, Default, Clone, Copy)]
pub struct RdfModelFactory;

impl RdfModelFactory {
    pub fn new() -> Self {
        Self
    }

    pub fn create_ontology(&self, path: &Path, repo_url: &str) -> Result<OntologyModel> {
        let graph = load_graph(path)?;
        Ok(OntologyModel::new(graph, path, repo_url))
    }

    pub fn create_controlled_vocabulary(
        &self,
        path: &Path,
        repo_url: &str,
    ) -> Result<ControlledVocabularyModel> {
        let graph = load_graph(path)?;
        Ok(ControlledVocabularyModel::new(graph, path, repo_url))
    }
}

/// Parses one RDF file into a graph.
///
/// The serialization is chosen from the file extension. Relative IRIs are
/// resolved against the file's own `file://` URL. Named graphs in quad
/// formats are flattened into the default graph.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn load_graph(path: &Path) -> Result<Graph> {
    let format = path
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(RdfFormat::from_extension)
        .ok_or_else(|| HarvesterError::parse(path, "unrecognised RDF file extension"))?;

    let file = File::open(path).map_err(|e| HarvesterError::io(path, e))?;

    let mut parser = RdfParser::from_format(format);
    if let Some(base) = base_iri(path) {
        parser = parser
            .with_base_iri(base)
            .map_err(|e| HarvesterError::parse(path, e.to_string()))?;
    }

    let mut graph = Graph::new();
    for quad in parser.for_reader(BufReader::new(file)) {
        let quad = quad.map_err(|e| HarvesterError::parse(path, e.to_string()))?;
        graph.insert(&Triple::new(quad.subject, quad.predicate, quad.object));
    }

    debug!(triples = graph.len(), format = format.name(), "parsed RDF file");
    Ok(graph)
}

fn base_iri(path: &Path) -> Option<String> {
    let absolute = std::fs::canonicalize(path)
        .or_else(|_| std::path::absolute(path))
        .ok()?;
    Url::from_file_path(absolute).ok().map(String::from)
}
