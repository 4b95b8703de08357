//! Application configuration for the harvester.
//!
//! User config lives at `~/.ndc-harvester/harvester.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{HarvesterError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "harvester.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".ndc-harvester";

// ---------------------------------------------------------------------------
// Config structs (matching harvester.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// SPARQL endpoint settings.
    #[serde(default)]
    pub triple_store: TripleStoreSection,

    /// Search index settings.
    #[serde(default)]
    pub index: IndexSection,

    /// Asset discovery conventions.
    #[serde(default)]
    pub discovery: DiscoverySection,

    /// Tabular vocabulary data settings.
    #[serde(default)]
    pub vocabulary: VocabularySection,

    /// Repository cloning settings.
    #[serde(default)]
    pub git: GitSection,

    /// Repositories harvested by `harvest-all`.
    #[serde(default)]
    pub repositories: Vec<RepositoryEntry>,
}

/// `[triple_store]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripleStoreSection {
    /// SPARQL query endpoint.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// SPARQL update endpoint; the query endpoint is used when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_endpoint: Option<String>,

    /// Basic-auth user name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Name of the env var holding the password (never store the password itself).
    #[serde(default = "default_password_env")]
    pub password_env: String,

    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for TripleStoreSection {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            update_endpoint: None,
            username: None,
            password_env: default_password_env(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_endpoint() -> String {
    "http://localhost:8890/sparql".into()
}
fn default_password_env() -> String {
    "HARVESTER_TRIPLE_STORE_PASSWORD".into()
}
fn default_timeout_secs() -> u64 {
    60
}

/// `[index]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSection {
    /// Path of the libSQL database holding vocabulary rows and asset records.
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

impl Default for IndexSection {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    "~/.ndc-harvester/index.db".into()
}

/// `[discovery]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoverySection {
    /// Ontology root, relative to the repository root.
    #[serde(default = "default_ontology_dir")]
    pub ontology_dir: String,

    /// Controlled vocabulary root, relative to the repository root.
    #[serde(default = "default_vocabulary_dir")]
    pub vocabulary_dir: String,

    /// Only ontology files directly inside a folder with this name are
    /// harvested. An empty string means every ontology file qualifies.
    #[serde(default = "default_latest_folder")]
    pub latest_folder: Option<String>,

    /// Files and folders whose name contains one of these words are skipped.
    #[serde(default = "default_skip_words")]
    pub skip_words: Vec<String>,
}

impl Default for DiscoverySection {
    fn default() -> Self {
        Self {
            ontology_dir: default_ontology_dir(),
            vocabulary_dir: default_vocabulary_dir(),
            latest_folder: default_latest_folder(),
            skip_words: default_skip_words(),
        }
    }
}

fn default_ontology_dir() -> String {
    "assets/ontologies".into()
}
fn default_vocabulary_dir() -> String {
    "assets/controlled-vocabularies".into()
}
fn default_latest_folder() -> Option<String> {
    Some("latest".into())
}
fn default_skip_words() -> Vec<String> {
    vec!["aligns".into(), "example".into(), "deprecated".into()]
}

/// `[vocabulary]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VocabularySection {
    /// Field delimiter of vocabulary data files.
    #[serde(default = "default_delimiter")]
    pub csv_delimiter: char,
}

impl Default for VocabularySection {
    fn default() -> Self {
        Self {
            csv_delimiter: default_delimiter(),
        }
    }
}

fn default_delimiter() -> char {
    ','
}

/// `[git]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitSection {
    /// Directory receiving clones; the system temp dir when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_dir: Option<String>,

    /// Clone depth passed to `git clone --depth`.
    #[serde(default = "default_depth")]
    pub depth: u32,
}

impl Default for GitSection {
    fn default() -> Self {
        Self {
            work_dir: None,
            depth: default_depth(),
        }
    }
}

fn default_depth() -> u32 {
    1
}

/// `[[repositories]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryEntry {
    /// Clone URL; also the named graph identifier.
    pub url: String,
    /// Optional display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

// ---------------------------------------------------------------------------
// Runtime configs (merged from config + environment)
// ---------------------------------------------------------------------------

/// Runtime triple store configuration with the password resolved.
#[derive(Debug, Clone)]
pub struct TripleStoreConfig {
    /// SPARQL query endpoint.
    pub endpoint: String,
    /// SPARQL update endpoint.
    pub update_endpoint: String,
    /// Basic-auth user name.
    pub username: Option<String>,
    /// Basic-auth password.
    pub password: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl From<&AppConfig> for TripleStoreConfig {
    fn from(config: &AppConfig) -> Self {
        let section = &config.triple_store;
        Self {
            endpoint: section.endpoint.clone(),
            update_endpoint: section
                .update_endpoint
                .clone()
                .unwrap_or_else(|| section.endpoint.clone()),
            username: section.username.clone(),
            password: std::env::var(&section.password_env)
                .ok()
                .filter(|p| !p.is_empty()),
            timeout: Duration::from_secs(section.timeout_secs),
        }
    }
}

/// Runtime discovery configuration.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Ontology root, relative to the repository root.
    pub ontology_dir: PathBuf,
    /// Controlled vocabulary root, relative to the repository root.
    pub vocabulary_dir: PathBuf,
    /// Required parent folder name for ontology files.
    pub latest_folder: Option<String>,
    /// Name fragments that exclude a file or folder.
    pub skip_words: Vec<String>,
}

impl From<&AppConfig> for DiscoveryConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            ontology_dir: PathBuf::from(&config.discovery.ontology_dir),
            vocabulary_dir: PathBuf::from(&config.discovery.vocabulary_dir),
            latest_folder: config
                .discovery
                .latest_folder
                .clone()
                .filter(|folder| !folder.is_empty()),
            skip_words: config.discovery.skip_words.clone(),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.ndc-harvester/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| HarvesterError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.ndc-harvester/harvester.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| HarvesterError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        HarvesterError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| HarvesterError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| HarvesterError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| HarvesterError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_home(path: &str) -> Result<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| HarvesterError::config("could not determine home directory"))?;
            Ok(home.join(rest))
        }
        None => Ok(PathBuf::from(path)),
    }
}

/// Check that the SPARQL endpoints are URLs and that credentials are complete.
pub fn validate_triple_store(config: &AppConfig) -> Result<()> {
    let section = &config.triple_store;
    for endpoint in std::iter::once(&section.endpoint).chain(section.update_endpoint.iter()) {
        Url::parse(endpoint).map_err(|e| {
            HarvesterError::config(format!("invalid SPARQL endpoint '{endpoint}': {e}"))
        })?;
    }

    if section.username.is_some() {
        let var_name = &section.password_env;
        match std::env::var(var_name) {
            Ok(val) if !val.is_empty() => {}
            _ => {
                return Err(HarvesterError::config(format!(
                    "triple store password not found. Set the {var_name} environment variable."
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("endpoint"));
        assert!(toml_str.contains("HARVESTER_TRIPLE_STORE_PASSWORD"));
        assert!(toml_str.contains("assets/ontologies"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.triple_store.timeout_secs, 60);
        assert_eq!(parsed.discovery.latest_folder.as_deref(), Some("latest"));
        assert_eq!(parsed.vocabulary.csv_delimiter, ',');
    }

    #[test]
    fn config_with_repositories() {
        let toml_str = r#"
[triple_store]
endpoint = "http://virtuoso:8890/sparql"
username = "dba"

[vocabulary]
csv_delimiter = ";"

[[repositories]]
url = "https://github.com/italia/dati-semantic-assets"
name = "agid"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.repositories.len(), 1);
        assert_eq!(config.repositories[0].name.as_deref(), Some("agid"));
        assert_eq!(config.triple_store.username.as_deref(), Some("dba"));
        assert_eq!(config.vocabulary.csv_delimiter, ';');
        assert_eq!(config.index.db_path, "~/.ndc-harvester/index.db");
    }

    #[test]
    fn triple_store_config_from_app_config() {
        let mut app = AppConfig::default();
        app.triple_store.password_env = "HARVESTER_TEST_NONEXISTENT_PASSWORD_12345".into();
        let store = TripleStoreConfig::from(&app);
        assert_eq!(store.endpoint, "http://localhost:8890/sparql");
        assert_eq!(store.update_endpoint, store.endpoint);
        assert!(store.password.is_none());
        assert_eq!(store.timeout, Duration::from_secs(60));
    }

    #[test]
    fn discovery_config_from_app_config() {
        let discovery = DiscoveryConfig::default();
        assert_eq!(discovery.ontology_dir, PathBuf::from("assets/ontologies"));
        assert_eq!(
            discovery.vocabulary_dir,
            PathBuf::from("assets/controlled-vocabularies")
        );
        assert_eq!(discovery.skip_words.len(), 3);
    }

    #[test]
    fn missing_password_is_rejected() {
        let mut config = AppConfig::default();
        config.triple_store.username = Some("dba".into());
        // Use a unique env var name to avoid interfering with other tests
        config.triple_store.password_env = "HARVESTER_TEST_NONEXISTENT_PASSWORD_12345".into();
        let result = validate_triple_store(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("password not found"));
    }

    #[test]
    fn invalid_endpoint_is_rejected() {
        let mut config = AppConfig::default();
        config.triple_store.endpoint = "not a url".into();
        assert!(validate_triple_store(&config).is_err());
    }

    #[test]
    fn expand_home_leaves_plain_paths() {
        assert_eq!(
            expand_home("/var/lib/harvester/index.db").unwrap(),
            PathBuf::from("/var/lib/harvester/index.db")
        );
    }
}
