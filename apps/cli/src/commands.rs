//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use harvester_core::{
    AssetStatus, CsvParser, HarvestReport, HarvestState, Harvester, HarvesterParts,
    ProgressReporter,
};
use harvester_discovery::{GitCloner, LocalCheckout, PathDiscovery, RepositoryCloner};
use harvester_shared::{
    AppConfig, DiscoveryConfig, TripleStoreConfig, expand_home, init_config, load_config,
    load_config_from, validate_triple_store,
};
use harvester_storage::Storage;
use harvester_triplestore::{MemoryTripleStore, SparqlTripleStore, TripleStore};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info, warn};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Harvest semantic assets into a triple store and a search index.
#[derive(Parser)]
#[command(
    name = "harvester",
    version,
    about = "Harvest ontologies and controlled vocabularies from public administration repositories.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ~/.ndc-harvester/harvester.toml.
    #[arg(long, global = true, env = "HARVESTER_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Flags shared by the harvest commands.
#[derive(clap::Args, Clone, Copy)]
pub(crate) struct HarvestFlags {
    /// Publish into an in-memory store and a scratch index instead of the
    /// configured ones.
    #[arg(long)]
    pub dry_run: bool,

    /// Print the harvest report as JSON.
    #[arg(long)]
    pub json: bool,

    /// Exit with an error when any asset failed.
    #[arg(long)]
    pub strict: bool,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Harvest one repository, replacing what was published for it.
    Harvest {
        /// Repository URL; also the named graph identifier.
        repo_url: String,

        /// Use an existing checkout instead of cloning.
        #[arg(long)]
        local_path: Option<PathBuf>,

        #[command(flatten)]
        flags: HarvestFlags,
    },

    /// Harvest every repository listed in the config file.
    HarvestAll {
        #[command(flatten)]
        flags: HarvestFlags,
    },

    /// Run a SPARQL SELECT query against the triple store.
    Query {
        /// The SELECT query.
        query: String,
    },

    /// Search the local index.
    Search {
        #[command(subcommand)]
        target: SearchTarget,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Search subcommands.
#[derive(Subcommand)]
pub(crate) enum SearchTarget {
    /// Rows of one controlled vocabulary.
    Vocab {
        /// Rights holder identifier of the vocabulary.
        #[arg(long)]
        rights_holder: String,

        /// Key concept of the vocabulary.
        #[arg(long)]
        key_concept: String,

        /// Words to look for.
        text: String,

        #[arg(long, default_value = "20")]
        limit: u32,
    },
    /// Catalog records of harvested assets.
    Assets {
        /// Words to look for.
        text: String,

        #[arg(long, default_value = "20")]
        limit: u32,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "harvester=info",
        1 => "harvester=debug",
        _ => "harvester=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    if let Command::Config { action } = &cli.command {
        return match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(cli.config.as_deref()),
        };
    }

    let config = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };

    match cli.command {
        Command::Harvest {
            repo_url,
            local_path,
            flags,
        } => cmd_harvest(&config, &repo_url, local_path, flags).await,
        Command::HarvestAll { flags } => cmd_harvest_all(&config, flags).await,
        Command::Query { query } => cmd_query(&config, &query).await,
        Command::Search { target } => match target {
            SearchTarget::Vocab {
                rights_holder,
                key_concept,
                text,
                limit,
            } => cmd_search_vocab(&config, &rights_holder, &key_concept, &text, limit).await,
            SearchTarget::Assets { text, limit } => cmd_search_assets(&config, &text, limit).await,
        },
        Command::Config { .. } => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Publication backends
// ---------------------------------------------------------------------------

/// Triple store and index a harvest publishes into.
struct Backend {
    triple_store: Arc<dyn TripleStore>,
    memory: Option<MemoryTripleStore>,
    storage: Arc<Storage>,
    scratch_db: Option<PathBuf>,
}

impl Backend {
    async fn open(config: &AppConfig, dry_run: bool) -> Result<Self> {
        if dry_run {
            let memory = MemoryTripleStore::new()?;
            let scratch = std::env::temp_dir()
                .join(format!("harvester_dry_run_{}.db", Uuid::now_v7()));
            let storage = Arc::new(Storage::open(&scratch).await?);
            info!(index = %scratch.display(), "dry run: publishing in memory");
            return Ok(Self {
                triple_store: Arc::new(memory.clone()),
                memory: Some(memory),
                storage,
                scratch_db: Some(scratch),
            });
        }

        validate_triple_store(config)?;
        let store = SparqlTripleStore::new(&TripleStoreConfig::from(config))?;
        let db_path = expand_home(&config.index.db_path)?;
        let storage = Arc::new(Storage::open(&db_path).await?);
        Ok(Self {
            triple_store: Arc::new(store),
            memory: None,
            storage,
            scratch_db: None,
        })
    }

    fn harvester(&self, config: &AppConfig, cloner: Arc<dyn RepositoryCloner>) -> Result<Harvester> {
        Ok(Harvester::new(HarvesterParts {
            cloner,
            discovery: PathDiscovery::new(DiscoveryConfig::from(config)),
            csv: CsvParser::new(config.vocabulary.csv_delimiter)?,
            triple_store: self.triple_store.clone(),
            vocabulary_index: self.storage.clone(),
            metadata_index: self.storage.clone(),
        }))
    }

    /// Triples held in memory for `repo_url` during a dry run.
    fn dry_run_triples(&self, repo_url: &str) -> Result<Option<usize>> {
        match &self.memory {
            Some(memory) => Ok(Some(memory.triple_count(repo_url)?)),
            None => Ok(None),
        }
    }
}

impl Drop for Backend {
    fn drop(&mut self) {
        if let Some(scratch) = &self.scratch_db {
            let _ = std::fs::remove_file(scratch);
        }
    }
}

// ---------------------------------------------------------------------------
// Harvest commands
// ---------------------------------------------------------------------------

async fn cmd_harvest(
    config: &AppConfig,
    repo_url: &str,
    local_path: Option<PathBuf>,
    flags: HarvestFlags,
) -> Result<()> {
    let cloner: Arc<dyn RepositoryCloner> = match local_path {
        Some(path) => Arc::new(LocalCheckout::new(path)),
        None => Arc::new(GitCloner::from_config(config)?),
    };
    let backend = Backend::open(config, flags.dry_run).await?;
    let harvester = backend.harvester(config, cloner)?;

    info!(repo_url, dry_run = flags.dry_run, "harvesting repository");
    let progress = CliProgress::new(!flags.json);
    let report = harvester.harvest(repo_url, &progress).await?;

    print_report(&report, flags.json)?;
    if let Some(triples) = backend.dry_run_triples(repo_url)? {
        if !flags.json {
            println!("  Triples:    {triples} (in memory, discarded)");
            println!();
        }
    }
    check_strict(std::slice::from_ref(&report), flags.strict)
}

async fn cmd_harvest_all(config: &AppConfig, flags: HarvestFlags) -> Result<()> {
    if config.repositories.is_empty() {
        return Err(eyre!(
            "no repositories configured: add [[repositories]] entries to the config file"
        ));
    }

    let backend = Backend::open(config, flags.dry_run).await?;
    let harvester = backend.harvester(config, Arc::new(GitCloner::from_config(config)?))?;

    let mut reports = Vec::new();
    let mut aborted = 0usize;
    for repo in &config.repositories {
        let label = repo.name.as_deref().unwrap_or(&repo.url);
        info!(repo_url = %repo.url, name = label, "harvesting repository");

        let progress = CliProgress::new(!flags.json);
        match harvester.harvest(&repo.url, &progress).await {
            Ok(report) => {
                if !flags.json {
                    print_report(&report, false)?;
                }
                reports.push(report);
            }
            Err(e) => {
                error!(repo_url = %repo.url, error = %e, "harvest failed");
                aborted += 1;
            }
        }
    }

    if flags.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    }
    if aborted > 0 {
        return Err(eyre!(
            "{aborted} of {} repositories could not be harvested",
            config.repositories.len()
        ));
    }
    check_strict(&reports, flags.strict)
}

fn print_report(report: &HarvestReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!();
    println!("  Repository: {}", report.repo_url);
    println!("  Published:  {}", report.published());
    println!("  Failed:     {}", report.failed());
    for asset in &report.assets {
        if let AssetStatus::Failed { error } = &asset.status {
            println!("    {} ({}): {error}", asset.path, asset.asset_type);
        }
    }
    println!("  Time:       {:.1}s", report.elapsed.as_secs_f64());
    println!();
    Ok(())
}

fn check_strict(reports: &[HarvestReport], strict: bool) -> Result<()> {
    let degraded = reports.iter().filter(|r| r.is_degraded()).count();
    if degraded > 0 {
        warn!(degraded, "some assets could not be published");
        if strict {
            return Err(eyre!("{degraded} harvest(s) completed with failed assets"));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new(visible: bool) -> Self {
        if !visible {
            return Self {
                spinner: ProgressBar::hidden(),
            };
        }
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, state: HarvestState) {
        if state == HarvestState::Failed {
            self.spinner.finish_and_clear();
        } else {
            self.spinner.set_message(state.to_string());
        }
    }

    fn asset_done(&self, outcome: &harvester_core::AssetOutcome, current: usize, total: usize) {
        self.spinner
            .set_message(format!("[{current}/{total}] {}", outcome.path));
        if let AssetStatus::Failed { error } = &outcome.status {
            self.spinner.println(format!("  skipped {}: {error}", outcome.path));
        }
    }

    fn done(&self, _report: &HarvestReport) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// Query and search
// ---------------------------------------------------------------------------

async fn cmd_query(config: &AppConfig, query: &str) -> Result<()> {
    validate_triple_store(config)?;
    let store = SparqlTripleStore::new(&TripleStoreConfig::from(config))?;
    let rows = store.select(query).await?;

    for row in &rows {
        let mut vars: Vec<_> = row.bindings.iter().collect();
        vars.sort_by(|a, b| a.0.cmp(b.0));
        let line: Vec<String> = vars
            .into_iter()
            .map(|(var, value)| format!("?{var} = {value}"))
            .collect();
        println!("{}", line.join("\t"));
    }
    info!(rows = rows.len(), "query complete");
    Ok(())
}

async fn cmd_search_vocab(
    config: &AppConfig,
    rights_holder: &str,
    key_concept: &str,
    text: &str,
    limit: u32,
) -> Result<()> {
    let storage = Storage::open_readonly(&expand_home(&config.index.db_path)?).await?;
    let matches = storage
        .search_rows(rights_holder, key_concept, text, limit)
        .await?;

    if matches.is_empty() {
        println!("No rows match '{text}' in {rights_holder}/{key_concept}.");
        return Ok(());
    }
    for m in &matches {
        println!(
            "{:>5}  {:<12} {}",
            m.position,
            m.row_id.as_deref().unwrap_or("-"),
            serde_json::to_string(&m.row)?
        );
    }
    Ok(())
}

async fn cmd_search_assets(config: &AppConfig, text: &str, limit: u32) -> Result<()> {
    let storage = Storage::open_readonly(&expand_home(&config.index.db_path)?).await?;
    let matches = storage.search_assets(text, limit).await?;

    if matches.is_empty() {
        println!("No assets match '{text}'.");
        return Ok(());
    }
    for m in &matches {
        println!("{}  [{}]", m.title, m.asset_type);
        println!("    {}", m.iri);
        println!("    from {}", m.repo_url);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(path: Option<&std::path::Path>) -> Result<()> {
    let config: AppConfig = match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn harvest_flags_parse() {
        let cli = Cli::try_parse_from([
            "harvester",
            "harvest",
            "https://github.com/italia/dati-semantic-assets",
            "--local-path",
            "/tmp/checkout",
            "--dry-run",
            "-vv",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Harvest {
                repo_url,
                local_path,
                flags,
            } => {
                assert_eq!(repo_url, "https://github.com/italia/dati-semantic-assets");
                assert_eq!(local_path, Some(PathBuf::from("/tmp/checkout")));
                assert!(flags.dry_run);
                assert!(!flags.strict);
            }
            _ => panic!("expected harvest"),
        }
    }

    #[test]
    fn search_vocab_requires_its_keys() {
        assert!(Cli::try_parse_from(["harvester", "search", "vocab", "licenza"]).is_err());
        assert!(
            Cli::try_parse_from([
                "harvester",
                "search",
                "vocab",
                "--rights-holder",
                "agid",
                "--key-concept",
                "licences",
                "licenza",
            ])
            .is_ok()
        );
    }
}
