//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;
use indicatif::{ProgressBar, ProgressStyle};
use sitefilter_core::{MergeReport, MergeReporter};
use sitefilter_harvester::SearchOptions;
use sitefilter_shared::{
    AppConfig, MergeConfig, RejectedDomain, RejectionPolicy, candidates_path, init_config,
    load_config, load_config_from,
};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// SiteFilter — keep a curated domain registry growing without duplicates.
#[derive(Parser)]
#[command(
    name = "sitefilter",
    version,
    about = "Merge harvested candidate domains into a curated site registry.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ~/.sitefilter/sitefilter.toml).
    #[arg(long, global = true, env = "SITEFILTER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
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
    /// Merge the candidate hand-off file into the registry (run once).
    Merge {
        /// What to do after a rejection: skip (default) or halt.
        #[arg(long)]
        policy: Option<RejectionPolicy>,
    },

    /// Search the web and append result hosts to the hand-off file.
    Search {
        /// Search terms.
        #[arg(required = true)]
        terms: Vec<String>,

        /// Number of result pages to request (overrides config).
        #[arg(long)]
        pages: Option<u32>,

        /// Print the hosts without touching the hand-off file.
        #[arg(long)]
        dry_run: bool,
    },

    /// Domain cache management.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Cache subcommands.
#[derive(Subcommand)]
pub(crate) enum CacheAction {
    /// Rebuild the accepted/excluded cache from the curated sources.
    Rebuild,
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
        0 => "sitefilter=info",
        1 => "sitefilter=debug",
        _ => "sitefilter=trace",
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
    let config = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };

    match cli.command {
        Command::Merge { policy } => cmd_merge(&config, policy).await,
        Command::Search {
            terms,
            pages,
            dry_run,
        } => cmd_search(&config, &terms, pages, dry_run).await,
        Command::Cache { action } => match action {
            CacheAction::Rebuild => cmd_cache_rebuild(&config).await,
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(&config),
        },
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_merge(config: &AppConfig, policy: Option<RejectionPolicy>) -> Result<()> {
    let mut merge_config = MergeConfig::try_from(config)?;
    if let Some(policy) = policy {
        merge_config.rejection_policy = policy;
    }

    info!(
        candidates = %merge_config.candidates.display(),
        registry = %merge_config.registry.display(),
        policy = %merge_config.rejection_policy,
        "merging candidates"
    );

    let reporter = CliProgress::new();
    let report = match sitefilter_core::run_merge(&merge_config, &reporter).await {
        Ok(report) => report,
        Err(e) => {
            reporter.spinner.finish_and_clear();
            return Err(e.into());
        }
    };

    println!();
    println!("  Merge complete.");
    if report.cache_rebuilt {
        println!("  Cache:      rebuilt from {} sources", merge_config.sources.len());
    }
    println!("  Candidates: {}", report.candidates);
    println!("  Eligible:   {}", report.eligible);
    println!("  Added:      {}", report.accepted.len());
    println!("  Rejected:   {}", report.rejected.len());
    if report.halted {
        println!("  Halted at first rejection (policy: halt)");
    }
    println!("  Registry:   {}", merge_config.registry.display());
    println!("  Time:       {:.1}s", report.elapsed.as_secs_f64());
    println!();

    Ok(())
}

async fn cmd_search(
    config: &AppConfig,
    terms: &[String],
    pages: Option<u32>,
    dry_run: bool,
) -> Result<()> {
    let mut opts = SearchOptions::from_config(&config.search)?;
    if let Some(pages) = pages {
        opts.max_pages = pages;
    }

    let spinner = spinner();
    spinner.set_message(format!("Searching up to {} pages", opts.max_pages));
    let result = sitefilter_harvester::harvest(terms, &opts).await;
    spinner.finish_and_clear();
    let result = result?;

    for (site, title) in &result.sites {
        println!("  {site:<40} {title}");
    }

    if dry_run {
        println!();
        println!("  {} sites found (dry run, hand-off file untouched)", result.sites.len());
        return Ok(());
    }

    let handoff = candidates_path(config)?;
    let written =
        sitefilter_harvester::write_handoff(&handoff, result.sites.keys().map(String::as_str))
            .await?;

    println!();
    println!("  Pages:    {}", result.pages_fetched);
    println!("  Sites:    {written}");
    println!("  Hand-off: {}", handoff.display());
    println!();

    Ok(())
}

async fn cmd_cache_rebuild(config: &AppConfig) -> Result<()> {
    let merge_config = MergeConfig::try_from(config)?;

    let spinner = spinner();
    spinner.set_message(format!(
        "Reading {} curated sources",
        merge_config.sources.len()
    ));
    let rebuilt = sitefilter_core::rebuild_cache(&merge_config).await;
    spinner.finish_and_clear();
    let rebuilt = rebuilt?;

    println!();
    println!("  Cache rebuilt.");
    println!(
        "  Accepted: {} -> {}",
        rebuilt.accepted.len(),
        merge_config.cache.accepted.display()
    );
    println!(
        "  Excluded: {} -> {}",
        rebuilt.excluded.len(),
        merge_config.cache.excluded.display()
    );
    println!();

    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config: &AppConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

fn spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
    spinner.set_style(style);
    spinner.enable_steady_tick(std::time::Duration::from_millis(80));
    spinner
}

/// Merge reporter using an indicatif spinner; per-domain lines go above it.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        Self { spinner: spinner() }
    }
}

impl MergeReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn accepted(&self, domain: &str) {
        self.spinner.println(format!("[+] {domain}"));
    }

    fn rejected(&self, rejected: &RejectedDomain) {
        self.spinner
            .println(format!("[-] {} ({})", rejected.domain, rejected.reason));
    }

    fn done(&self, _report: &MergeReport) {
        self.spinner.finish_and_clear();
    }
}
