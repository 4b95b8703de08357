//! Per-path processing: load the model, validate it, publish it.

use std::sync::Arc;

use async_trait::async_trait;
use harvester_rdf::{ControlledVocabularyModel, RdfModelFactory, SemanticAssetModel};
use harvester_shared::{HarvesterError, Result, SemanticAssetPath, SemanticAssetType};
use harvester_storage::{MetadataIndexer, VocabularyIndexer};
use harvester_triplestore::TripleStore;
use tracing::{debug, instrument};

use crate::csv::{CsvOutcome, CsvParser};

/// What a successfully processed path produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedAsset {
    /// IRI of the asset's main resource.
    pub iri: String,
    /// Triples sent to the triple store.
    pub triples: usize,
    /// Vocabulary rows indexed, for controlled vocabularies.
    pub rows: Option<usize>,
    /// Data rows skipped as malformed.
    pub skipped_rows: usize,
}

/// Handles every discovered path of one asset kind.
#[async_trait]
pub trait AssetPathProcessor: Send + Sync {
    fn asset_type(&self) -> SemanticAssetType;

    async fn process(&self, repo_url: &str, path: &SemanticAssetPath) -> Result<ProcessedAsset>;
}

/// Collaborators shared by both processors.
#[derive(Clone)]
pub struct Publishers {
    pub triple_store: Arc<dyn TripleStore>,
    pub metadata: Arc<dyn MetadataIndexer>,
}

impl Publishers {
    /// Sends the graph to the repository's named graph and records the
    /// extracted metadata.
    async fn publish(
        &self,
        repo_url: &str,
        model: &(dyn SemanticAssetModel + Sync),
    ) -> Result<ProcessedAsset> {
        let metadata = model.extract_metadata()?;
        self.triple_store.save(repo_url, model.graph()).await?;
        self.metadata.save_metadata(&metadata).await?;
        Ok(ProcessedAsset {
            iri: metadata.iri,
            triples: model.graph().len(),
            rows: None,
            skipped_rows: 0,
        })
    }
}

// ---------------------------------------------------------------------------
// Ontologies
// ---------------------------------------------------------------------------

pub struct OntologyPathProcessor {
    factory: RdfModelFactory,
    publishers: Publishers,
}

impl OntologyPathProcessor {
    pub fn new(factory: RdfModelFactory, publishers: Publishers) -> Self {
        Self {
            factory,
            publishers,
        }
    }
}

#[async_trait]
impl AssetPathProcessor for OntologyPathProcessor {
    fn asset_type(&self) -> SemanticAssetType {
        SemanticAssetType::Ontology
    }

    #[instrument(skip_all, fields(path = %path))]
    async fn process(&self, repo_url: &str, path: &SemanticAssetPath) -> Result<ProcessedAsset> {
        let model = self.factory.create_ontology(path.ttl_path(), repo_url)?;
        let processed = self.publishers.publish(repo_url, &model).await?;
        debug!(iri = %processed.iri, triples = processed.triples, "ontology published");
        Ok(processed)
    }
}

// ---------------------------------------------------------------------------
// Controlled vocabularies
// ---------------------------------------------------------------------------

pub struct ControlledVocabularyPathProcessor {
    factory: RdfModelFactory,
    csv: CsvParser,
    publishers: Publishers,
    indexer: Arc<dyn VocabularyIndexer>,
}

impl ControlledVocabularyPathProcessor {
    pub fn new(
        factory: RdfModelFactory,
        csv: CsvParser,
        publishers: Publishers,
        indexer: Arc<dyn VocabularyIndexer>,
    ) -> Self {
        Self {
            factory,
            csv,
            publishers,
            indexer,
        }
    }

    /// Resolves the index key and reads the data file.
    fn prepare_rows(
        &self,
        model: &ControlledVocabularyModel,
        path: &SemanticAssetPath,
    ) -> Result<VocabularyRows> {
        let csv_path = path
            .csv_path()
            .ok_or_else(|| HarvesterError::MissingDataFile {
                ttl_path: path.ttl_path().to_path_buf(),
            })?;
        Ok(VocabularyRows {
            rights_holder_id: model.rights_holder_id()?,
            key_concept: model.key_concept()?,
            outcome: self.csv.convert_csv_to_json(csv_path)?,
        })
    }
}

struct VocabularyRows {
    rights_holder_id: String,
    key_concept: String,
    outcome: CsvOutcome,
}

#[async_trait]
impl AssetPathProcessor for ControlledVocabularyPathProcessor {
    fn asset_type(&self) -> SemanticAssetType {
        SemanticAssetType::ControlledVocabulary
    }

    #[instrument(skip_all, fields(path = %path))]
    async fn process(&self, repo_url: &str, path: &SemanticAssetPath) -> Result<ProcessedAsset> {
        let model = self
            .factory
            .create_controlled_vocabulary(path.ttl_path(), repo_url)?;
        let data = self.prepare_rows(&model, path)?;
        let mut processed = self.publishers.publish(repo_url, &model).await?;

        let indexed = self
            .indexer
            .index_data(&data.rights_holder_id, &data.key_concept, &data.outcome.rows)
            .await?;
        debug!(
            rights_holder_id = %data.rights_holder_id,
            key_concept = %data.key_concept,
            indexed,
            skipped = data.outcome.errors.len(),
            "vocabulary rows indexed"
        );
        processed.rows = Some(indexed);
        processed.skipped_rows = data.outcome.errors.len();
        Ok(processed)
    }
}
