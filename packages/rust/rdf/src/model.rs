//! Typed asset models over a parsed RDF graph.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use harvester_shared::{HarvesterError, NodeSummary, Result, SemanticAssetMetadata, SemanticAssetType};
use oxigraph::model::vocab::rdf;
use oxigraph::model::{Graph, NamedNodeRef, NamedOrBlankNode, NamedOrBlankNodeRef};
use tracing::debug;

use crate::extract::{Resource, describe};
use crate::vocab::{dcat, dcterms, ndc, owl, vcard};

// ---------------------------------------------------------------------------
// Shared base
// ---------------------------------------------------------------------------

/// A parsed asset description: the graph, where it came from, and the
/// kind of asset it is expected to describe.
#[derive(Debug)]
pub struct AssetGraph {
    kind: SemanticAssetType,
    graph: Graph,
    source: PathBuf,
    repo_url: String,
    main_resource: OnceLock<NamedOrBlankNode>,
}

impl AssetGraph {
    pub fn new(
        kind: SemanticAssetType,
        graph: Graph,
        source: impl Into<PathBuf>,
        repo_url: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            graph,
            source: source.into(),
            repo_url: repo_url.into(),
            main_resource: OnceLock::new(),
        }
    }

    pub fn kind(&self) -> SemanticAssetType {
        self.kind
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn repo_url(&self) -> &str {
        &self.repo_url
    }

    /// The single resource typed with the kind's canonical IRI.
    ///
    /// Looked up once; later calls return the cached node. A failed lookup
    /// is not cached.
    pub fn main_resource(&self) -> Result<NamedOrBlankNodeRef<'_>> {
        if let Some(node) = self.main_resource.get() {
            return Ok(node.as_ref());
        }
        let node = self.find_unique_resource()?;
        Ok(self.main_resource.get_or_init(|| node).as_ref())
    }

    fn find_unique_resource(&self) -> Result<NamedOrBlankNode> {
        let type_iri = self.kind.type_iri();
        let candidates: Vec<NamedOrBlankNodeRef<'_>> = self
            .graph
            .subjects_for_predicate_object(rdf::TYPE, NamedNodeRef::new_unchecked(type_iri))
            .collect();

        match candidates.as_slice() {
            [node] => Ok(node.into_owned()),
            [] => Err(HarvesterError::invalid_model(format!(
                "No statement for a node whose type is '{type_iri}' in '{}'",
                self.source.display()
            ))),
            many => Err(HarvesterError::invalid_model(format!(
                "Found {} statements for nodes whose type is '{type_iri}' in '{}', expecting only 1",
                many.len(),
                self.source.display()
            ))),
        }
    }

    /// The main resource as a lookup handle.
    pub fn main(&self) -> Result<Resource<'_>> {
        let node = self.main_resource()?;
        Ok(Resource::new(&self.graph, node, &self.source))
    }

    /// Projects the main resource onto the catalog record.
    pub fn extract_metadata(&self) -> Result<SemanticAssetMetadata> {
        let main = self.main()?;
        let iri = main.iri().ok_or_else(|| {
            HarvesterError::invalid_model(format!(
                "Main resource '{}' of type '{}' in '{}' must be an IRI",
                describe(main.node()),
                self.kind.type_iri(),
                self.source.display()
            ))
        })?;

        let metadata = SemanticAssetMetadata {
            iri: iri.to_owned(),
            repo_url: self.repo_url.clone(),
            asset_type: self.kind,
            rights_holder: main.required_summary(dcterms::RIGHTS_HOLDER)?,
            title: main.required_literal(dcterms::TITLE)?.to_owned(),
            description: main.required_literal(dcterms::DESCRIPTION)?.to_owned(),
            modified_on: main.required_date(dcterms::MODIFIED)?,
            themes: main.iris(dcat::THEME),
            accrual_periodicity: main.required_iri(dcterms::ACCRUAL_PERIODICITY)?.to_owned(),
            subjects: main.iris(dcterms::SUBJECT),
            contact_point: contact_point(main),
            publishers: main.summaries(dcterms::PUBLISHER),
            creators: main.summaries(dcterms::CREATOR),
            version_info: main.literal(owl::VERSION_INFO).map(str::to_owned),
            issued_on: main.date(dcterms::ISSUED)?,
            languages: main.iris(dcterms::LANGUAGE),
            keywords: main.literals(dcat::KEYWORD),
            temporal: main.literal(dcterms::TEMPORAL).map(str::to_owned),
            conforms_to: main.summaries(dcterms::CONFORMS_TO),
        };
        debug!(iri = %metadata.iri, kind = %self.kind, "extracted metadata");
        Ok(metadata)
    }
}

/// Contact point IRI labelled with its email, one hop further.
fn contact_point(main: Resource<'_>) -> Option<NodeSummary> {
    let contact = main.object(dcat::CONTACT_POINT)?;
    let iri = contact.iri()?;
    let email = contact
        .iri_value(vcard::HAS_EMAIL)
        .or_else(|| contact.literal(vcard::HAS_EMAIL))?;
    Some(NodeSummary::new(iri, Some(email.to_owned())))
}

// ---------------------------------------------------------------------------
// Capability trait
// ---------------------------------------------------------------------------

/// Behaviour shared by every asset kind.
pub trait SemanticAssetModel {
    fn asset(&self) -> &AssetGraph;

    fn asset_type(&self) -> SemanticAssetType {
        self.asset().kind()
    }

    fn graph(&self) -> &Graph {
        self.asset().graph()
    }

    fn main_resource(&self) -> Result<NamedOrBlankNodeRef<'_>> {
        self.asset().main_resource()
    }

    fn extract_metadata(&self) -> Result<SemanticAssetMetadata> {
        self.asset().extract_metadata()
    }
}

// ---------------------------------------------------------------------------
// Kinds
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct OntologyModel {
    asset: AssetGraph,
}

impl OntologyModel {
    pub fn new(graph: Graph, source: impl Into<PathBuf>, repo_url: impl Into<String>) -> Self {
        Self {
            asset: AssetGraph::new(SemanticAssetType::Ontology, graph, source, repo_url),
        }
    }
}

impl SemanticAssetModel for OntologyModel {
    fn asset(&self) -> &AssetGraph {
        &self.asset
    }
}

#[derive(Debug)]
pub struct ControlledVocabularyModel {
    asset: AssetGraph,
}

impl ControlledVocabularyModel {
    pub fn new(graph: Graph, source: impl Into<PathBuf>, repo_url: impl Into<String>) -> Self {
        Self {
            asset: AssetGraph::new(
                SemanticAssetType::ControlledVocabulary,
                graph,
                source,
                repo_url,
            ),
        }
    }

    /// Name of the concept the vocabulary's rows are indexed under.
    pub fn key_concept(&self) -> Result<String> {
        let main = self.asset.main()?;
        Ok(main.required_literal(ndc::KEY_CONCEPT)?.to_owned())
    }

    /// Short identifier of the rights holder, used with the key concept
    /// as the index key.
    pub fn rights_holder_id(&self) -> Result<String> {
        let main = self.asset.main()?;
        let holder = main.required_object(dcterms::RIGHTS_HOLDER)?;
        Ok(holder.required_literal(dcterms::IDENTIFIER)?.to_owned())
    }
}

impl SemanticAssetModel for ControlledVocabularyModel {
    fn asset(&self) -> &AssetGraph {
        &self.asset
    }
}
