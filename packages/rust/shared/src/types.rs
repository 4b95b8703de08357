//! Core domain types for harvested semantic assets.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// SemanticAssetType
// ---------------------------------------------------------------------------

/// The kinds of semantic asset the harvester understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SemanticAssetType {
    Ontology,
    ControlledVocabulary,
}

impl SemanticAssetType {
    /// All asset kinds, in processing order.
    pub const ALL: [SemanticAssetType; 2] = [Self::Ontology, Self::ControlledVocabulary];

    /// Canonical RDF type IRI of the asset's main resource.
    pub fn type_iri(self) -> &'static str {
        match self {
            Self::Ontology => "http://www.w3.org/2002/07/owl#Ontology",
            Self::ControlledVocabulary => "http://www.w3.org/2004/02/skos/core#ConceptScheme",
        }
    }

    /// Reverse lookup from a canonical type IRI.
    pub fn from_iri(iri: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.type_iri() == iri)
    }

    /// Short name used in logs and index rows.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ontology => "ONTOLOGY",
            Self::ControlledVocabulary => "CONTROLLED_VOCABULARY",
        }
    }
}

impl std::fmt::Display for SemanticAssetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SemanticAssetType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown semantic asset type: {s}"))
    }
}

// ---------------------------------------------------------------------------
// SemanticAssetPath
// ---------------------------------------------------------------------------

/// One asset occurrence inside a cloned repository.
///
/// Ontologies only carry the description file. Controlled vocabularies also
/// carry their tabular data file when discovery could pair one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SemanticAssetPath {
    ttl_path: PathBuf,
    csv_path: Option<PathBuf>,
}

impl SemanticAssetPath {
    /// A description-only asset (ontology).
    pub fn ontology(ttl_path: impl Into<PathBuf>) -> Self {
        Self {
            ttl_path: ttl_path.into(),
            csv_path: None,
        }
    }

    /// A vocabulary asset with its (possibly missing) data file.
    pub fn vocabulary(ttl_path: impl Into<PathBuf>, csv_path: Option<PathBuf>) -> Self {
        Self {
            ttl_path: ttl_path.into(),
            csv_path,
        }
    }

    /// Path to the RDF description file.
    pub fn ttl_path(&self) -> &Path {
        &self.ttl_path
    }

    /// Path to the paired data file, if any.
    pub fn csv_path(&self) -> Option<&Path> {
        self.csv_path.as_deref()
    }
}

impl std::fmt::Display for SemanticAssetPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.csv_path {
            Some(csv) => write!(f, "{} + {}", self.ttl_path.display(), csv.display()),
            None => write!(f, "{}", self.ttl_path.display()),
        }
    }
}

// ---------------------------------------------------------------------------
// Metadata record
// ---------------------------------------------------------------------------

/// A referenced resource shown without full traversal: its IRI and a
/// human-readable label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSummary {
    pub iri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl NodeSummary {
    pub fn new(iri: impl Into<String>, summary: Option<String>) -> Self {
        Self {
            iri: iri.into(),
            summary,
        }
    }
}

/// The catalog record extracted from one asset description.
///
/// Field names and their optionality are a published contract with
/// downstream catalog consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SemanticAssetMetadata {
    pub iri: String,
    pub repo_url: String,
    #[serde(rename = "type")]
    pub asset_type: SemanticAssetType,
    pub rights_holder: NodeSummary,
    pub title: String,
    pub description: String,
    pub modified_on: NaiveDate,
    pub themes: Vec<String>,
    pub accrual_periodicity: String,
    #[serde(default)]
    pub subjects: Vec<String>,
    #[serde(default)]
    pub contact_point: Option<NodeSummary>,
    #[serde(default)]
    pub publishers: Vec<NodeSummary>,
    #[serde(default)]
    pub creators: Vec<NodeSummary>,
    #[serde(default)]
    pub version_info: Option<String>,
    #[serde(default)]
    pub issued_on: Option<NaiveDate>,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub temporal: Option<String>,
    #[serde(default)]
    pub conforms_to: Vec<NodeSummary>,
}

// ---------------------------------------------------------------------------
// Vocabulary data rows
// ---------------------------------------------------------------------------

/// One row of a vocabulary data file: column name to value, in header
/// order. Values are kept as strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataRow {
    fields: Vec<(String, String)>,
}

impl DataRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, column: impl Into<String>, value: impl Into<String>) {
        self.fields.push((column.into(), value.into()));
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value.as_str())
    }

    /// Value of the first column, which identifies the row.
    pub fn first_value(&self) -> Option<&str> {
        self.fields.first().map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for DataRow {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl Serialize for DataRow {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (column, value) in &self.fields {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for DataRow {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RowVisitor;

        impl<'de> serde::de::Visitor<'de> for RowVisitor {
            type Value = DataRow;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("a map of column names to string values")
            }

            fn visit_map<A: serde::de::MapAccess<'de>>(
                self,
                mut access: A,
            ) -> Result<DataRow, A::Error> {
                let mut row = DataRow::new();
                while let Some((column, value)) = access.next_entry::<String, String>()? {
                    row.push(column, value);
                }
                Ok(row)
            }
        }

        deserializer.deserialize_map(RowVisitor)
    }
}
