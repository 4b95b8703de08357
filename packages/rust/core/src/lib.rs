//! Harvest pipeline for semantic assets.
//!
//! Ties together cloning, discovery, RDF model extraction, the triple store
//! and the index into one harvest per repository (see [`Harvester`]).

pub mod csv;
pub mod harvester;
pub mod processors;

#[cfg(test)]
mod testing;

pub use crate::csv::{CsvOutcome, CsvParser, RowError};
pub use harvester::{
    AssetOutcome, AssetStatus, HarvestReport, HarvestState, Harvester, HarvesterParts,
    ProgressReporter, SilentProgress,
};
pub use processors::{
    AssetPathProcessor, ControlledVocabularyPathProcessor, OntologyPathProcessor, ProcessedAsset,
    Publishers,
};
