mod display;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use ossfit_core::error::FitError;
use ossfit_core::hardware::{HardwareForm, HardwareInput, HostSpecs};
use ossfit_core::models::Catalog;
use ossfit_core::offline::{self, HttpNetwork, MemoryCacheStorage, Network, OfflineCache};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ossfit")]
#[command(about = "Check whether your hardware can run the GPT-OSS models", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output results as JSON (for tool integration)
    #[arg(long, global = true)]
    json: bool,

    /// Model/GPU catalog file to use instead of the built-in one.
    /// Falls back to OSSFIT_CATALOG if not set.
    #[arg(long, global = true, value_name = "PATH")]
    catalog: Option<PathBuf>,

    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Assess a hardware profile against every model
    Check {
        /// System memory (e.g. "32", "32GB", "1TB")
        #[arg(long, value_name = "SIZE")]
        memory: Option<String>,

        /// GPU id from `ossfit gpus`, or "none"
        #[arg(long, value_name = "ID")]
        gpu: Option<String>,

        /// Free storage (e.g. "100", "100GB", "2T")
        #[arg(long, value_name = "SIZE")]
        storage: Option<String>,

        /// Intended usage: chat, development, research, production
        #[arg(long, default_value = "chat")]
        usage: String,

        /// Fill in missing values from this machine's hardware
        #[arg(long)]
        detect: bool,

        /// Only show models whose id or name matches
        #[arg(long, value_name = "QUERY")]
        model: Option<String>,
    },

    /// List model requirements
    List,

    /// List known GPU profiles
    Gpus,

    /// Show detected system hardware
    System,

    /// Check that a site origin serves every offline asset.
    /// Only the install step runs; nothing is persisted.
    Precache {
        /// Site origin, e.g. https://example.org
        #[arg(long)]
        origin: String,

        /// Cache version tag
        #[arg(long, default_value = offline::DEFAULT_VERSION_TAG)]
        version_tag: String,
    },
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Build the form from flags, pre-filling blanks from the host when asked.
fn build_form(
    catalog: &Catalog,
    memory: Option<String>,
    gpu: Option<String>,
    storage: Option<String>,
    usage: String,
    detect: bool,
) -> HardwareForm {
    let mut form = HardwareForm {
        memory: memory.unwrap_or_default(),
        gpu: gpu.unwrap_or_default(),
        storage: storage.unwrap_or_default(),
        usage,
    };

    if detect && (form.memory.is_empty() || form.gpu.is_empty() || form.storage.is_empty()) {
        let host = HostSpecs::detect();
        if form.memory.is_empty() {
            form.memory = host.total_memory_gb.to_string();
        }
        if form.storage.is_empty() {
            form.storage = host.free_storage_gb.to_string();
        }
        if form.gpu.is_empty() {
            form.gpu = host.suggest_gpu_id(catalog);
        }
        tracing::info!(
            memory = %form.memory,
            gpu = %form.gpu,
            storage = %form.storage,
            "filled hardware profile from host"
        );
    }

    form
}

fn run_check(
    catalog: &Catalog,
    form: &HardwareForm,
    model_query: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    let input = HardwareInput::from_form(form)?;
    let mut report = catalog.assess(&input)?;

    if let Some(query) = model_query {
        let wanted: Vec<&str> = catalog
            .find_models(query)
            .iter()
            .map(|m| m.id.as_str())
            .collect();
        if wanted.is_empty() {
            anyhow::bail!("no model found matching '{}'", query);
        }
        report
            .results
            .retain(|r| wanted.contains(&r.model_id.as_str()));
    }

    if json {
        display::display_json_report(&report)
    } else {
        let gpu_label = catalog
            .gpu(&input.gpu_id)
            .map(|g| g.label().to_string())
            .unwrap_or_else(|| input.gpu_id.clone());
        display::display_report(&report, &gpu_label);
        Ok(())
    }
}

/// Install the asset set into a throwaway store and return the cached paths.
/// Activation is not run here: a fresh store has no older versions to purge.
fn precache_assets<N: Network>(network: &N, version_tag: &str) -> anyhow::Result<Vec<String>> {
    let cache = OfflineCache::new(
        version_tag,
        offline::DEFAULT_PRECACHE
            .iter()
            .map(|p| p.to_string())
            .collect(),
    );
    let mut storage = MemoryCacheStorage::new();
    cache.install(&mut storage, network)?;
    Ok(storage.paths(cache.version_tag()))
}

fn run_precache(origin: &str, version_tag: &str, json: bool) -> anyhow::Result<()> {
    let network = HttpNetwork::new(origin);
    let cached = precache_assets(&network, version_tag)
        .with_context(|| format!("offline cache install failed for {}", network.origin()))?;

    if json {
        display::display_json_precache(network.origin(), version_tag, &cached)
    } else {
        display::display_precache(network.origin(), version_tag, &cached);
        Ok(())
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Check {
            memory,
            gpu,
            storage,
            usage,
            detect,
            model,
        } => {
            let catalog = Catalog::load(cli.catalog.as_deref())?;
            let form = build_form(&catalog, memory, gpu, storage, usage, detect);
            run_check(&catalog, &form, model.as_deref(), cli.json)
        }

        Commands::List => {
            let catalog = Catalog::load(cli.catalog.as_deref())?;
            if cli.json {
                display::display_json_models(catalog.models())
            } else {
                display::display_models(catalog.models());
                Ok(())
            }
        }

        Commands::Gpus => {
            let catalog = Catalog::load(cli.catalog.as_deref())?;
            if cli.json {
                display::display_json_gpus(catalog.gpus())
            } else {
                display::display_gpus(catalog.gpus());
                Ok(())
            }
        }

        Commands::System => {
            let specs = HostSpecs::detect();
            if cli.json {
                display::display_json_system(&specs)
            } else {
                specs.display();
                Ok(())
            }
        }

        Commands::Precache {
            origin,
            version_tag,
        } => run_precache(&origin, &version_tag, cli.json),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::debug!(error = ?e, "command failed");
            eprintln!("Error: {:#}", e);
            let is_validation = e
                .downcast_ref::<FitError>()
                .is_some_and(FitError::is_validation);
            if is_validation {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}
