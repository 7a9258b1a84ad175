//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use siteforge_catalog::CatalogClient;
use siteforge_core::llm::CompletionClient;
use siteforge_core::orchestrator::{GenerationOrchestrator, StagePolicy};
use siteforge_core::publish;
use siteforge_core::queue::{GenerationService, TriggerRequest};
use siteforge_core::stages::{LlmArchitecturePlanner, LlmContentGenerator, LlmPatchPlanner};
use siteforge_patch::PatchEngine;
use siteforge_shared::{
    AppConfig, Blueprint, GenerationStatus, VersionId, config_file_path, init_config,
    load_config, validate_api_key,
};
use siteforge_storage::Storage;
use tracing::info;

use crate::cms::{CmsClient, CmsPublisher};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// SiteForge — generate, edit, and deploy marketing websites.
#[derive(Parser)]
#[command(
    name = "siteforge",
    version,
    about = "Generate complete marketing websites and edit them with validated patches.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Trigger a website generation and follow it to completion.
    Generate {
        /// Property to generate a website for.
        #[arg(long)]
        property: String,

        /// Organization triggering the generation.
        #[arg(long)]
        org: String,
    },

    /// Show the latest generation status for a property.
    Status {
        /// Property to inspect.
        #[arg(long)]
        property: String,

        /// List every version instead of only the latest.
        #[arg(long)]
        history: bool,
    },

    /// List generations whose heartbeat went quiet.
    Stalled,

    /// Apply a natural-language edit to a blueprint file.
    Patch {
        /// Path to the blueprint JSON file.
        blueprint: PathBuf,

        /// Id of the section being edited.
        #[arg(long)]
        section: String,

        /// What the edit should accomplish.
        #[arg(long)]
        intent: String,

        /// Optional brand-context JSON file threaded into the edit.
        #[arg(long)]
        context: Option<PathBuf>,

        /// Capability-catalog source id.
        #[arg(long, default_value = "default")]
        source: String,

        /// Write the patched blueprint here instead of stdout.
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Fetch and display the capability catalog.
    Catalog {
        /// Catalog source id.
        #[arg(long, default_value = "default")]
        source: String,

        /// Bypass the cache and refetch.
        #[arg(long)]
        refresh: bool,
    },

    /// Deploy a ready version through the CMS.
    Deploy {
        /// Version id (UUID) to deploy.
        version: String,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
    /// Print the config file path.
    Path,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "siteforge=info",
        1 => "siteforge=debug",
        _ => "siteforge=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt().with_env_filter(env_filter).with_target(false).init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Generate { property, org } => cmd_generate(&property, &org).await,
        Command::Status { property, history } => cmd_status(&property, history).await,
        Command::Stalled => cmd_stalled().await,
        Command::Patch {
            blueprint,
            section,
            intent,
            context,
            source,
            out,
        } => cmd_patch(&blueprint, &section, &intent, context.as_deref(), &source, out.as_deref())
            .await,
        Command::Catalog { source, refresh } => cmd_catalog(&source, refresh).await,
        Command::Deploy { version } => cmd_deploy(&version).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
            ConfigAction::Path => cmd_config_path().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn expand_path(raw: &str) -> PathBuf {
    match raw.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(rest),
        None => PathBuf::from(raw),
    }
}

async fn open_storage(config: &AppConfig) -> Result<Arc<Storage>> {
    let path = expand_path(&config.defaults.db_path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| eyre!("cannot create '{}': {e}", parent.display()))?;
    }
    Ok(Arc::new(Storage::open(&path).await?))
}

fn print_version_row(row: &siteforge_shared::WebsiteVersion) {
    println!("  Version:  {}", row.version);
    println!("  Job:      {}", row.id);
    println!("  Website:  {}", row.website_id);
    println!("  Status:   {} ({}%)", row.status.as_str(), row.progress);
    println!("  Step:     {}", row.current_step);
    if let Some(error) = &row.error_message {
        println!("  Error:    {error}");
    }
    if let Some(duration) = row.duration_seconds {
        println!("  Duration: {duration}s");
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_generate(property: &str, org: &str) -> Result<()> {
    let config = load_config()?;
    validate_api_key(&config)?;
    let storage = open_storage(&config).await?;

    let cms = Arc::new(CmsClient::new(&config.cms.base_url)?);
    let planner = Arc::new(LlmArchitecturePlanner::new(CompletionClient::from_config(
        &config.llm,
    )?));
    let generator = Arc::new(LlmContentGenerator::new(CompletionClient::from_config(
        &config.llm,
    )?));

    let orchestrator = Arc::new(GenerationOrchestrator::new(
        storage.clone(),
        cms.clone(),
        planner,
        generator,
        cms.clone(),
        StagePolicy {
            // Slightly above the HTTP timeout so transport errors win
            timeout: Duration::from_secs(config.llm.timeout_secs + 5),
            transient_retries: 1,
        },
    ));
    let service = GenerationService::new(
        storage,
        orchestrator,
        cms,
        config.defaults.workers,
        config.defaults.queue_capacity,
        config.defaults.estimated_time_seconds,
    );

    let response = service
        .trigger(TriggerRequest {
            property_id: property.to_string(),
            organization_id: org.to_string(),
            preferences: None,
        })
        .await?;
    info!(
        job_id = %response.job_id,
        version = response.version,
        "generation queued"
    );

    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::with_template("{bar:32.cyan/dim} {pos:>3}% {msg}")
            .expect("static template"),
    );

    let row = loop {
        let row = service.status(property).await?;
        bar.set_position(u64::from(row.progress));
        bar.set_message(row.current_step.clone());
        if row.status.is_terminal() {
            break row;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    };
    bar.finish_and_clear();

    if row.status == GenerationStatus::Failed {
        println!();
        print_version_row(&row);
        return Err(eyre!(
            "generation failed: {}",
            row.error_message.as_deref().unwrap_or("unknown error")
        ));
    }

    println!();
    println!("  Website generated successfully!");
    print_version_row(&row);
    println!();
    Ok(())
}

async fn cmd_status(property: &str, history: bool) -> Result<()> {
    let config = load_config()?;
    let storage = open_storage(&config).await?;

    if history {
        let versions = storage.list_versions(property).await?;
        if versions.is_empty() {
            return Err(eyre!("no generations found for property {property}"));
        }
        for row in versions {
            println!(
                "  v{:<3} {:<22} {:>3}%  {}",
                row.version,
                row.status.as_str(),
                row.progress,
                row.started_at.format("%Y-%m-%d %H:%M:%S"),
            );
        }
        return Ok(());
    }

    let row = storage
        .latest_version(property)
        .await?
        .ok_or_else(|| eyre!("no generations found for property {property}"))?;
    println!();
    print_version_row(&row);
    println!();
    Ok(())
}

async fn cmd_stalled() -> Result<()> {
    let config = load_config()?;
    let storage = open_storage(&config).await?;

    let threshold = chrono::Duration::seconds((config.defaults.stall_threshold_minutes * 60) as i64);
    let stalled = storage.find_stalled(threshold).await?;
    if stalled.is_empty() {
        println!(
            "No generations stalled longer than {} minutes.",
            config.defaults.stall_threshold_minutes
        );
        return Ok(());
    }

    println!("  {} stalled generation(s):", stalled.len());
    for row in stalled {
        println!(
            "  {}  property={}  {} ({}%)  last heartbeat {}",
            row.id,
            row.property_id,
            row.status.as_str(),
            row.progress,
            row.updated_at.format("%Y-%m-%d %H:%M:%S"),
        );
    }
    Ok(())
}

async fn cmd_patch(
    blueprint_path: &Path,
    section: &str,
    intent: &str,
    context_path: Option<&Path>,
    source: &str,
    out: Option<&Path>,
) -> Result<()> {
    let config = load_config()?;
    validate_api_key(&config)?;
    let storage = open_storage(&config).await?;

    let raw = std::fs::read_to_string(blueprint_path)
        .map_err(|e| eyre!("cannot read '{}': {e}", blueprint_path.display()))?;
    let blueprint: Blueprint = serde_json::from_str(&raw)
        .map_err(|e| eyre!("'{}' is not a blueprint: {e}", blueprint_path.display()))?;

    let brand_context = match context_path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .map_err(|e| eyre!("cannot read '{}': {e}", path.display()))?;
            serde_json::from_str(&raw)
                .map_err(|e| eyre!("'{}' is not valid JSON: {e}", path.display()))?
        }
        None => serde_json::json!({}),
    };

    let catalog = CatalogClient::new(&config.catalog.base_url, config.catalog.ttl_hours)?
        .fetch(&storage, source, false)
        .await?;
    let planner = LlmPatchPlanner::new(CompletionClient::from_config(&config.llm)?);

    let outcome = PatchEngine::new(&planner)
        .patch(&blueprint, section, intent, &brand_context, &catalog)
        .await?;

    println!();
    println!("  Applied {} operation(s):", outcome.operations.len());
    for op in &outcome.operations {
        println!("    - {}", op.kind());
    }

    let json = serde_json::to_string_pretty(&outcome.blueprint)?;
    match out {
        Some(path) => {
            std::fs::write(path, json).map_err(|e| eyre!("cannot write '{}': {e}", path.display()))?;
            println!("  Patched blueprint written to {}", path.display());
        }
        None => println!("{json}"),
    }
    println!();
    Ok(())
}

async fn cmd_catalog(source: &str, refresh: bool) -> Result<()> {
    let config = load_config()?;
    let storage = open_storage(&config).await?;

    let catalog = CatalogClient::new(&config.catalog.base_url, config.catalog.ttl_hours)?
        .fetch(&storage, source, refresh)
        .await?;

    println!();
    println!("  Catalog '{source}' — {} block type(s):", catalog.blocks.len());
    for block in &catalog.blocks {
        let variants = if block.variants.is_empty() {
            String::new()
        } else {
            format!("  [{}]", block.variants.join(", "))
        };
        println!("    {:<24} {}{variants}", block.slug, block.name);
    }
    println!();
    Ok(())
}

async fn cmd_deploy(version: &str) -> Result<()> {
    let config = load_config()?;
    let storage = open_storage(&config).await?;

    let version_id: VersionId = version
        .parse()
        .map_err(|e| eyre!("'{version}' is not a version id: {e}"))?;
    let row = storage
        .get_version(&version_id)
        .await?
        .ok_or_else(|| eyre!("website version {version_id} not found"))?;

    let adapter = Arc::new(CmsPublisher::new(&config.cms.base_url, row.website_id)?);
    let published = publish::deploy(&storage, adapter, &version_id).await?;

    println!();
    println!("  Deployed version {} ({} pages):", row.version, published.len());
    for page in published {
        println!("    {:<16} {}", page.slug, page.url);
    }
    println!();
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

async fn cmd_config_path() -> Result<()> {
    println!("{}", config_file_path()?.display());
    Ok(())
}
