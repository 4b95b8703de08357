//! End-to-end harvest: clone → clear graph → discover → process each path.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use harvester_discovery::{PathDiscovery, RepositoryCloner};
use harvester_rdf::RdfModelFactory;
use harvester_shared::{Result, SemanticAssetPath, SemanticAssetType};
use harvester_storage::{MetadataIndexer, VocabularyIndexer};
use harvester_triplestore::TripleStore;
use serde::Serialize;
use tracing::{debug, error, info, instrument};

use crate::csv::CsvParser;
use crate::processors::{
    AssetPathProcessor, ControlledVocabularyPathProcessor, OntologyPathProcessor, ProcessedAsset,
    Publishers,
};

// ---------------------------------------------------------------------------
// State and report
// ---------------------------------------------------------------------------

/// Steps of one harvest, in order. `Failed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HarvestState {
    Idle,
    Cloned,
    GraphCleared,
    Discovering,
    ProcessingOntologies,
    ProcessingVocabularies,
    Done,
    Failed,
}

impl std::fmt::Display for HarvestState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Idle => "Idle",
            Self::Cloned => "Cloned",
            Self::GraphCleared => "Graph cleared",
            Self::Discovering => "Discovering assets",
            Self::ProcessingOntologies => "Processing ontologies",
            Self::ProcessingVocabularies => "Processing controlled vocabularies",
            Self::Done => "Done",
            Self::Failed => "Failed",
        };
        f.write_str(label)
    }
}

/// Result of one asset path.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AssetStatus {
    Published {
        iri: String,
        triples: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        rows: Option<usize>,
        skipped_rows: usize,
    },
    Failed {
        error: String,
    },
}

impl From<ProcessedAsset> for AssetStatus {
    fn from(asset: ProcessedAsset) -> Self {
        Self::Published {
            iri: asset.iri,
            triples: asset.triples,
            rows: asset.rows,
            skipped_rows: asset.skipped_rows,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AssetOutcome {
    pub asset_type: SemanticAssetType,
    pub path: String,
    #[serde(flatten)]
    pub status: AssetStatus,
}

impl AssetOutcome {
    pub fn is_published(&self) -> bool {
        matches!(self.status, AssetStatus::Published { .. })
    }
}

/// Per-path outcomes of a completed harvest.
#[derive(Debug, Clone, Serialize)]
pub struct HarvestReport {
    pub repo_url: String,
    pub assets: Vec<AssetOutcome>,
    /// Catalog records dropped when the repository was cleared.
    pub removed_records: u64,
    #[serde(serialize_with = "serialize_millis")]
    pub elapsed: Duration,
}

impl HarvestReport {
    pub fn published(&self) -> usize {
        self.assets.iter().filter(|a| a.is_published()).count()
    }

    pub fn failed(&self) -> usize {
        self.assets.len() - self.published()
    }

    /// True when at least one asset could not be published.
    pub fn is_degraded(&self) -> bool {
        self.failed() > 0
    }
}

fn serialize_millis<S: serde::Serializer>(
    elapsed: &Duration,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_u64(elapsed.as_millis() as u64)
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Progress callback for reporting harvest status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new state.
    fn phase(&self, state: HarvestState);
    /// Called after each asset path.
    fn asset_done(&self, outcome: &AssetOutcome, current: usize, total: usize);
    /// Called when the harvest completes.
    fn done(&self, report: &HarvestReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _state: HarvestState) {}
    fn asset_done(&self, _outcome: &AssetOutcome, _current: usize, _total: usize) {}
    fn done(&self, _report: &HarvestReport) {}
}

// ---------------------------------------------------------------------------
// Harvester
// ---------------------------------------------------------------------------

/// Everything a [`Harvester`] talks to.
pub struct HarvesterParts {
    pub cloner: Arc<dyn RepositoryCloner>,
    pub discovery: PathDiscovery,
    pub csv: CsvParser,
    pub triple_store: Arc<dyn TripleStore>,
    pub vocabulary_index: Arc<dyn VocabularyIndexer>,
    pub metadata_index: Arc<dyn MetadataIndexer>,
}

/// Harvests repositories into the triple store and the index.
///
/// Harvests of the same repository URL run one at a time; different URLs
/// may be harvested concurrently through a shared `Harvester`.
pub struct Harvester {
    cloner: Arc<dyn RepositoryCloner>,
    discovery: PathDiscovery,
    triple_store: Arc<dyn TripleStore>,
    metadata_index: Arc<dyn MetadataIndexer>,
    ontologies: OntologyPathProcessor,
    vocabularies: ControlledVocabularyPathProcessor,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl Harvester {
    pub fn new(parts: HarvesterParts) -> Self {
        let factory = RdfModelFactory::new();
        let publishers = Publishers {
            triple_store: parts.triple_store.clone(),
            metadata: parts.metadata_index.clone(),
        };
        Self {
            cloner: parts.cloner,
            discovery: parts.discovery,
            ontologies: OntologyPathProcessor::new(factory, publishers.clone()),
            vocabularies: ControlledVocabularyPathProcessor::new(
                factory,
                parts.csv,
                publishers,
                parts.vocabulary_index,
            ),
            triple_store: parts.triple_store,
            metadata_index: parts.metadata_index,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Replaces everything published for `repo_url` with the repository's
    /// current content.
    ///
    /// Clone and graph-clear failures abort the harvest and are
    /// returned. Failures of single assets are logged and listed in the
    /// report; the harvest still returns `Ok`.
    #[instrument(skip_all, fields(repo_url = %repo_url))]
    pub async fn harvest(
        &self,
        repo_url: &str,
        progress: &dyn ProgressReporter,
    ) -> Result<HarvestReport> {
        let lock = self.lock_for(repo_url);
        let _guard = lock.lock().await;

        progress.phase(HarvestState::Idle);
        match self.run(repo_url, progress).await {
            Ok(report) => {
                progress.phase(HarvestState::Done);
                info!(
                    published = report.published(),
                    failed = report.failed(),
                    elapsed_ms = report.elapsed.as_millis() as u64,
                    "harvest complete"
                );
                progress.done(&report);
                Ok(report)
            }
            Err(e) => {
                progress.phase(HarvestState::Failed);
                error!(error = %e, "harvest aborted");
                Err(e)
            }
        }
    }

    async fn run(&self, repo_url: &str, progress: &dyn ProgressReporter) -> Result<HarvestReport> {
        let start = Instant::now();

        let repo = self.cloner.clone_repo(repo_url).await?;
        debug!(path = %repo.path().display(), "working copy ready");
        progress.phase(HarvestState::Cloned);

        self.triple_store.clear_existing_named_graph(repo_url).await?;
        let removed_records = self.metadata_index.delete_metadata_for_repo(repo_url).await?;
        debug!(store = self.triple_store.name(), removed_records, "previous harvest cleared");
        progress.phase(HarvestState::GraphCleared);

        progress.phase(HarvestState::Discovering);
        let ontologies = self.discovery.discover_ontologies(repo.path());
        let vocabularies = self.discovery.discover_vocabularies(repo.path());
        let total = ontologies.len() + vocabularies.len();

        let mut assets = Vec::with_capacity(total);

        progress.phase(HarvestState::ProcessingOntologies);
        for path in &ontologies {
            let outcome = self.process_path(&self.ontologies, repo_url, path).await;
            assets.push(outcome);
            progress.asset_done(&assets[assets.len() - 1], assets.len(), total);
        }

        progress.phase(HarvestState::ProcessingVocabularies);
        for path in &vocabularies {
            let outcome = self.process_path(&self.vocabularies, repo_url, path).await;
            assets.push(outcome);
            progress.asset_done(&assets[assets.len() - 1], assets.len(), total);
        }

        Ok(HarvestReport {
            repo_url: repo_url.to_owned(),
            assets,
            removed_records,
            elapsed: start.elapsed(),
        })
    }

    async fn process_path(
        &self,
        processor: &dyn AssetPathProcessor,
        repo_url: &str,
        path: &SemanticAssetPath,
    ) -> AssetOutcome {
        let asset_type = processor.asset_type();
        let status = match processor.process(repo_url, path).await {
            Ok(processed) => AssetStatus::from(processed),
            Err(e) => {
                error!(
                    repo_url,
                    path = %path,
                    asset_type = %asset_type,
                    error = %e,
                    "failed to process asset"
                );
                AssetStatus::Failed {
                    error: e.to_string(),
                }
            }
        };
        AssetOutcome {
            asset_type,
            path: path.to_string(),
            status,
        }
    }

    fn lock_for(&self, repo_url: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks.entry(repo_url.to_owned()).or_default().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Call, CallLog, FakeCloner, RecordingIndex, RecordingStore, fixture};
    use std::path::{Path, PathBuf};
    use std::sync::atomic::Ordering;
    use harvester_shared::HarvesterError;
    use uuid::Uuid;

    const REPO: &str = "https://github.com/italia/dati-semantic-assets";

    struct TempRepo(PathBuf);

    impl TempRepo {
        fn new() -> Self {
            let root = std::env::temp_dir().join(format!("harvester_repo_{}", Uuid::now_v7()));
            std::fs::create_dir_all(&root).unwrap();
            Self(root)
        }

        fn copy(self, fixture_name: &str, relative: &str) -> Self {
            let target = self.0.join(relative);
            std::fs::create_dir_all(target.parent().unwrap()).unwrap();
            std::fs::copy(fixture(fixture_name), target).unwrap();
            self
        }

        fn path(&self) -> &Path {
            &self.0
        }
    }

    impl Drop for TempRepo {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.0);
        }
    }

    struct Setup {
        harvester: Harvester,
        calls: CallLog,
        index: Arc<RecordingIndex>,
    }

    fn setup(cloner: FakeCloner, fail_clear: bool) -> Setup {
        let calls = CallLog::default();
        let store = Arc::new(RecordingStore {
            fail_clear,
            ..RecordingStore::with_log(calls.clone())
        });
        let index = Arc::new(RecordingIndex::with_log(calls.clone()));
        let harvester = Harvester::new(HarvesterParts {
            cloner: Arc::new(cloner),
            discovery: PathDiscovery::default(),
            csv: CsvParser::default(),
            triple_store: store,
            vocabulary_index: index.clone(),
            metadata_index: index.clone(),
        });
        Setup {
            harvester,
            calls,
            index,
        }
    }

    fn calls(log: &CallLog) -> Vec<Call> {
        log.lock().unwrap().clone()
    }

    #[tokio::test]
    async fn malformed_ontology_is_skipped() {
        let repo = TempRepo::new()
            .copy("ontologies/cultural-heritage.ttl", "assets/ontologies/CH/latest/CH.ttl")
            .copy("ontologies/malformed.ttl", "assets/ontologies/Bad/latest/Bad.ttl");
        let setup = setup(FakeCloner::serving(repo.path()), false);

        let report = setup.harvester.harvest(REPO, &SilentProgress).await.unwrap();

        assert_eq!(report.assets.len(), 2);
        assert_eq!(report.published(), 1);
        assert_eq!(report.failed(), 1);
        assert!(report.is_degraded());

        let failed = report.assets.iter().find(|a| !a.is_published()).unwrap();
        assert!(failed.path.ends_with("Bad.ttl"));

        let saves: Vec<_> = calls(&setup.calls)
            .into_iter()
            .filter(|c| matches!(c, Call::Save(..)))
            .collect();
        assert_eq!(saves.len(), 1);
        assert_eq!(
            setup.index.records()[0].iri,
            "https://w3id.org/italia/onto/CulturalHeritage"
        );
    }

    #[tokio::test]
    async fn graph_is_cleared_once_before_any_save() {
        let repo = TempRepo::new()
            .copy("ontologies/cultural-heritage.ttl", "assets/ontologies/CH/latest/CH.ttl")
            .copy("ontologies/minimal.ttl", "assets/ontologies/Min/latest/Min.ttl");
        let setup = setup(FakeCloner::serving(repo.path()), false);

        setup.harvester.harvest(REPO, &SilentProgress).await.unwrap();

        let calls = calls(&setup.calls);
        assert_eq!(calls[0], Call::Clear(REPO.into()));
        assert_eq!(calls[1], Call::DeleteMetadata(REPO.into()));
        assert_eq!(
            calls.iter().filter(|c| matches!(c, Call::Clear(_))).count(),
            1
        );
        assert!(
            calls
                .iter()
                .filter_map(|c| match c {
                    Call::Save(graph, _) => Some(graph.as_str()),
                    _ => None,
                })
                .all(|graph| graph == REPO)
        );
    }

    #[tokio::test]
    async fn ontologies_are_processed_before_vocabularies() {
        let repo = TempRepo::new()
            .copy(
                "vocabularies/licences.ttl",
                "assets/controlled-vocabularies/licences/licences.ttl",
            )
            .copy(
                "vocabularies/licences.csv",
                "assets/controlled-vocabularies/licences/licences.csv",
            )
            .copy("ontologies/minimal.ttl", "assets/ontologies/Min/latest/Min.ttl");
        let setup = setup(FakeCloner::serving(repo.path()), false);

        let report = setup.harvester.harvest(REPO, &SilentProgress).await.unwrap();
        assert!(!report.is_degraded());

        let kinds: Vec<_> = report.assets.iter().map(|a| a.asset_type).collect();
        assert_eq!(
            kinds,
            vec![SemanticAssetType::Ontology, SemanticAssetType::ControlledVocabulary]
        );

        let calls = calls(&setup.calls);
        let last = calls.last().unwrap();
        assert_eq!(last, &Call::Index("agid".into(), "licences".into()));
        assert_eq!(setup.index.indexed()[0].2.len(), 3);
    }

    #[tokio::test]
    async fn vocabulary_without_data_file_is_reported() {
        let repo = TempRepo::new().copy(
            "vocabularies/licences.ttl",
            "assets/controlled-vocabularies/licences/licences.ttl",
        );
        let setup = setup(FakeCloner::serving(repo.path()), false);

        let report = setup.harvester.harvest(REPO, &SilentProgress).await.unwrap();

        assert_eq!(report.failed(), 1);
        match &report.assets[0].status {
            AssetStatus::Failed { error } => assert!(error.contains("no data file")),
            other => panic!("expected failure, got {other:?}"),
        }
        assert!(setup.index.indexed().is_empty());
    }

    #[tokio::test]
    async fn empty_repository_makes_no_asset_calls() {
        let repo = TempRepo::new();
        let setup = setup(FakeCloner::serving(repo.path()), false);

        let report = setup.harvester.harvest(REPO, &SilentProgress).await.unwrap();

        assert!(report.assets.is_empty());
        assert!(!report.is_degraded());
        assert_eq!(
            calls(&setup.calls),
            vec![Call::Clear(REPO.into()), Call::DeleteMetadata(REPO.into())]
        );
    }

    #[tokio::test]
    async fn clone_failure_aborts_before_clearing() {
        let setup = setup(FakeCloner::default(), false);

        let err = setup.harvester.harvest(REPO, &SilentProgress).await.unwrap_err();

        assert!(matches!(err, HarvesterError::Clone { .. }));
        assert!(calls(&setup.calls).is_empty());
    }

    #[tokio::test]
    async fn clear_failure_aborts_the_harvest() {
        let repo = TempRepo::new()
            .copy("ontologies/minimal.ttl", "assets/ontologies/Min/latest/Min.ttl");
        let setup = setup(FakeCloner::serving(repo.path()), true);

        let err = setup.harvester.harvest(REPO, &SilentProgress).await.unwrap_err();

        assert!(matches!(err, HarvesterError::StoreUnavailable(_)));
        assert!(calls(&setup.calls).is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn symlink_loop_does_not_abort_the_harvest() {
        let repo = TempRepo::new()
            .copy("ontologies/cultural-heritage.ttl", "assets/ontologies/CH/latest/CH.ttl");
        let ontologies = repo.path().join("assets/ontologies");
        std::os::unix::fs::symlink(&ontologies, ontologies.join("CH/loop")).unwrap();
        let setup = setup(FakeCloner::serving(repo.path()), false);

        let report = setup.harvester.harvest(REPO, &SilentProgress).await.unwrap();

        assert_eq!(report.assets.len(), 1);
        assert_eq!(report.published(), 1);
        assert!(
            calls(&setup.calls)
                .iter()
                .any(|c| matches!(c, Call::Save(graph, _) if graph == REPO))
        );
    }

    #[tokio::test]
    async fn harvests_of_one_url_are_serialised() {
        let repo = TempRepo::new();
        let cloner = Arc::new(FakeCloner {
            delay: Duration::from_millis(30),
            ..FakeCloner::serving(repo.path())
        });
        let store = Arc::new(RecordingStore::default());
        let index = Arc::new(RecordingIndex::default());
        let harvester = Harvester::new(HarvesterParts {
            cloner: cloner.clone(),
            discovery: PathDiscovery::default(),
            csv: CsvParser::default(),
            triple_store: store,
            vocabulary_index: index.clone(),
            metadata_index: index,
        });

        let (a, b) = tokio::join!(
            harvester.harvest(REPO, &SilentProgress),
            harvester.harvest(REPO, &SilentProgress)
        );
        a.unwrap();
        b.unwrap();
        assert_eq!(cloner.max_active.load(Ordering::SeqCst), 1);

        let (a, b) = tokio::join!(
            harvester.harvest(REPO, &SilentProgress),
            harvester.harvest("https://github.com/italia/other", &SilentProgress)
        );
        a.unwrap();
        b.unwrap();
        assert_eq!(cloner.max_active.load(Ordering::SeqCst), 2);
        assert_eq!(cloner.clones.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn progress_sees_every_state_in_order() {
        struct StateLog(Mutex<Vec<HarvestState>>);

        impl ProgressReporter for StateLog {
            fn phase(&self, state: HarvestState) {
                self.0.lock().unwrap().push(state);
            }
            fn asset_done(&self, _outcome: &AssetOutcome, _current: usize, _total: usize) {}
            fn done(&self, _report: &HarvestReport) {}
        }

        let repo = TempRepo::new();
        let setup = setup(FakeCloner::serving(repo.path()), false);
        let log = StateLog(Mutex::new(Vec::new()));

        setup.harvester.harvest(REPO, &log).await.unwrap();
        assert_eq!(
            *log.0.lock().unwrap(),
            vec![
                HarvestState::Idle,
                HarvestState::Cloned,
                HarvestState::GraphCleared,
                HarvestState::Discovering,
                HarvestState::ProcessingOntologies,
                HarvestState::ProcessingVocabularies,
                HarvestState::Done,
            ]
        );

        let failing = setup_failing_clone();
        let log = StateLog(Mutex::new(Vec::new()));
        let _ = failing.harvester.harvest(REPO, &log).await;
        assert_eq!(
            *log.0.lock().unwrap(),
            vec![HarvestState::Idle, HarvestState::Failed]
        );
    }

    fn setup_failing_clone() -> Setup {
        setup(FakeCloner::default(), false)
    }

    #[test]
    fn report_serializes_outcomes() {
        let report = HarvestReport {
            repo_url: REPO.into(),
            assets: vec![AssetOutcome {
                asset_type: SemanticAssetType::Ontology,
                path: "assets/ontologies/Bad/latest/Bad.ttl".into(),
                status: AssetStatus::Failed {
                    error: "parse error".into(),
                },
            }],
            removed_records: 0,
            elapsed: Duration::from_millis(12),
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["elapsed"], 12);
        assert_eq!(json["assets"][0]["status"], "failed");
        assert_eq!(json["assets"][0]["asset_type"], "ONTOLOGY");
    }
}
