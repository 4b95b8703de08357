//! In-memory collaborators for pipeline tests.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use harvester_discovery::{ClonedRepository, RepositoryCloner};
use harvester_rdf::Graph;
use harvester_shared::{DataRow, HarvesterError, Result, SemanticAssetMetadata};
use harvester_storage::{MetadataIndexer, VocabularyIndexer};
use harvester_triplestore::{SelectRow, TripleStore};

pub fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../../../fixtures")
        .join(name)
}

/// Store and index calls in the order they happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Clear(String),
    Save(String, usize),
    DeleteMetadata(String),
    SaveMetadata(String),
    Index(String, String),
}

pub type CallLog = std::sync::Arc<Mutex<Vec<Call>>>;

#[derive(Default)]
pub struct RecordingStore {
    pub calls: CallLog,
    pub fail_clear: bool,
}

impl RecordingStore {
    pub fn with_log(calls: CallLog) -> Self {
        Self {
            calls,
            fail_clear: false,
        }
    }

    pub fn saves(&self) -> Vec<(String, usize)> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|call| match call {
                Call::Save(graph, triples) => Some((graph.clone(), *triples)),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl TripleStore for RecordingStore {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn clear_existing_named_graph(&self, graph_id: &str) -> Result<()> {
        if self.fail_clear {
            return Err(HarvesterError::store("connection refused"));
        }
        self.calls.lock().unwrap().push(Call::Clear(graph_id.into()));
        Ok(())
    }

    async fn save(&self, graph_id: &str, graph: &Graph) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Save(graph_id.into(), graph.len()));
        Ok(())
    }

    async fn select(&self, _query: &str) -> Result<Vec<SelectRow>> {
        Ok(Vec::new())
    }
}

#[derive(Default)]
pub struct RecordingIndex {
    pub calls: CallLog,
    records: Mutex<Vec<SemanticAssetMetadata>>,
    indexed: Mutex<Vec<(String, String, Vec<DataRow>)>>,
}

impl RecordingIndex {
    pub fn with_log(calls: CallLog) -> Self {
        Self {
            calls,
            ..Self::default()
        }
    }

    pub fn records(&self) -> Vec<SemanticAssetMetadata> {
        self.records.lock().unwrap().clone()
    }

    pub fn indexed(&self) -> Vec<(String, String, Vec<DataRow>)> {
        self.indexed.lock().unwrap().clone()
    }
}

#[async_trait]
impl VocabularyIndexer for RecordingIndex {
    async fn index_data(
        &self,
        rights_holder_id: &str,
        key_concept: &str,
        rows: &[DataRow],
    ) -> Result<usize> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Index(rights_holder_id.into(), key_concept.into()));
        self.indexed.lock().unwrap().push((
            rights_holder_id.into(),
            key_concept.into(),
            rows.to_vec(),
        ));
        Ok(rows.len())
    }
}

#[async_trait]
impl MetadataIndexer for RecordingIndex {
    async fn delete_metadata_for_repo(&self, repo_url: &str) -> Result<u64> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::DeleteMetadata(repo_url.into()));
        let mut records = self.records.lock().unwrap();
        let before = records.len();
        records.retain(|r| r.repo_url != repo_url);
        Ok((before - records.len()) as u64)
    }

    async fn save_metadata(&self, metadata: &SemanticAssetMetadata) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::SaveMetadata(metadata.iri.clone()));
        self.records.lock().unwrap().push(metadata.clone());
        Ok(())
    }
}

/// Serves a fixed directory, or fails every clone when none is set.
/// Tracks how many clones overlap in time.
#[derive(Default)]
pub struct FakeCloner {
    pub root: Option<PathBuf>,
    pub delay: Duration,
    pub active: AtomicUsize,
    pub max_active: AtomicUsize,
    pub clones: AtomicUsize,
}

impl FakeCloner {
    pub fn serving(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
            ..Self::default()
        }
    }
}

#[async_trait]
impl RepositoryCloner for FakeCloner {
    async fn clone_repo(&self, repo_url: &str) -> Result<ClonedRepository> {
        self.clones.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.active.fetch_sub(1, Ordering::SeqCst);

        match &self.root {
            Some(root) => Ok(ClonedRepository::existing(root)),
            None => Err(HarvesterError::clone_failed(repo_url, "repository not found")),
        }
    }
}
