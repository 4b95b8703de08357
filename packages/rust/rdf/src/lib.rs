//! RDF models for harvested semantic assets.
//!
//! Files are parsed into an in-memory [`oxigraph`] graph by
//! [`RdfModelFactory`] and wrapped in a typed model per asset kind. Models
//! locate their single main resource and project it onto a
//! [`SemanticAssetMetadata`](harvester_shared::SemanticAssetMetadata) record.

pub mod extract;
pub mod factory;
pub mod model;
pub mod vocab;

pub use extract::{Resource, parse_date};
pub use factory::{RdfModelFactory, load_graph};
pub use model::{AssetGraph, ControlledVocabularyModel, OntologyModel, SemanticAssetModel};

/// Re-exported so callers can name graph types without a direct dependency.
pub use oxigraph::model::Graph;
