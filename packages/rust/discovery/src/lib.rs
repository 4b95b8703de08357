//! Semantic asset discovery inside a cloned repository.
//!
//! Repositories follow a fixed layout: ontologies live under
//! `assets/ontologies` with the current release in a `latest` folder, and
//! controlled vocabularies live under `assets/controlled-vocabularies` with
//! their tabular data next to the description file. Both roots are
//! configurable through [`DiscoveryConfig`].

mod clone;

use std::path::{Path, PathBuf};

use harvester_shared::{DiscoveryConfig, SemanticAssetPath};
use tracing::{debug, info, instrument, warn};

pub use clone::{ClonedRepository, GitCloner, LocalCheckout, RepositoryCloner};

const RDF_EXTENSION: &str = "ttl";
const DATA_EXTENSION: &str = "csv";

// ---------------------------------------------------------------------------
// PathDiscovery
// ---------------------------------------------------------------------------

/// Finds asset files under a repository root.
#[derive(Debug, Clone, Default)]
pub struct PathDiscovery {
    config: DiscoveryConfig,
}

impl PathDiscovery {
    pub fn new(config: DiscoveryConfig) -> Self {
        Self { config }
    }

    /// Ontology description files, sorted by path.
    ///
    /// When a latest folder is configured only files directly inside a
    /// folder with that name qualify. A missing ontology root yields an
    /// empty list. Symlinks are not followed and unreadable folders are
    /// skipped with a warning.
    #[instrument(skip(self), fields(root = %root.display()))]
    pub fn discover_ontologies(&self, root: &Path) -> Vec<SemanticAssetPath> {
        let base = root.join(&self.config.ontology_dir);
        let files = self.rdf_files(&base);

        let paths: Vec<SemanticAssetPath> = files
            .into_iter()
            .filter(|file| match &self.config.latest_folder {
                Some(latest) => parent_name(file) == Some(latest.as_str()),
                None => true,
            })
            .map(SemanticAssetPath::ontology)
            .collect();

        info!(count = paths.len(), "discovered ontologies");
        paths
    }

    /// Controlled vocabulary description files paired with their data file,
    /// sorted by path.
    ///
    /// The data file is the `.csv` with the same stem in the same folder, or
    /// failing that the only `.csv` in the folder. Vocabularies without a
    /// data file are still returned so the failure is reported per asset.
    #[instrument(skip(self), fields(root = %root.display()))]
    pub fn discover_vocabularies(&self, root: &Path) -> Vec<SemanticAssetPath> {
        let base = root.join(&self.config.vocabulary_dir);
        let files = self.rdf_files(&base);

        let mut paths = Vec::with_capacity(files.len());
        for ttl in files {
            let csv = self.pair_data_file(&ttl);
            if csv.is_none() {
                debug!(ttl = %ttl.display(), "no data file next to vocabulary");
            }
            paths.push(SemanticAssetPath::vocabulary(ttl, csv));
        }

        info!(count = paths.len(), "discovered controlled vocabularies");
        paths
    }

    fn rdf_files(&self, base: &Path) -> Vec<PathBuf> {
        if !base.is_dir() {
            debug!(base = %base.display(), "asset root not present");
            return Vec::new();
        }
        let mut files = Vec::new();
        self.collect(base, RDF_EXTENSION, true, &mut files);
        files.sort();
        files
    }

    fn pair_data_file(&self, ttl: &Path) -> Option<PathBuf> {
        let same_stem = ttl.with_extension(DATA_EXTENSION);
        if same_stem.is_file() {
            return Some(same_stem);
        }

        let dir = ttl.parent()?;
        let mut candidates = Vec::new();
        self.collect(dir, DATA_EXTENSION, false, &mut candidates);
        if candidates.len() == 1 {
            candidates.pop()
        } else {
            None
        }
    }

    /// Gathers regular files with `extension` under `dir`, skipping any
    /// entry whose name contains a skip word. Symlinks are never followed.
    fn collect(&self, dir: &Path, extension: &str, recursive: bool, out: &mut Vec<PathBuf>) {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "unreadable directory skipped");
                return;
            }
        };
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "unreadable entry skipped");
                    continue;
                }
            };
            let path = entry.path();
            let name = entry.file_name();
            if self.is_skipped(&name.to_string_lossy()) {
                debug!(path = %path.display(), "skipped");
                continue;
            }

            let file_type = match entry.file_type() {
                Ok(file_type) => file_type,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "unreadable entry skipped");
                    continue;
                }
            };
            if file_type.is_dir() {
                if recursive {
                    self.collect(&path, extension, recursive, out);
                }
            } else if file_type.is_file() && has_extension(&path, extension) {
                out.push(path);
            } else if file_type.is_symlink() {
                debug!(path = %path.display(), "symlink not followed");
            }
        }
    }

    fn is_skipped(&self, name: &str) -> bool {
        let name = name.to_lowercase();
        self.config
            .skip_words
            .iter()
            .any(|word| !word.is_empty() && name.contains(&word.to_lowercase()))
    }
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
}

fn parent_name(path: &Path) -> Option<&str> {
    path.parent()?.file_name()?.to_str()
}
