//! CLI command definitions, routing, and tracing setup.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use macroharvest_classify::SignatureClassifier;
use macroharvest_core::{
    CancelHandle, HarvestOutcome, HttpFetcher, ProgressReporter, WorkerId, candidates_from_urls,
    report,
};
use macroharvest_shared::{AppConfig, HarvestConfig, init_config, load_config, load_config_from};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// macroharvest: collect macro-enabled Office documents from candidate URLs.
#[derive(Parser)]
#[command(
    name = "macroharvest",
    version,
    about = "Fetch candidate URLs and keep new macro-bearing Office documents in a content-addressed store.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ~/.macroharvest/macroharvest.toml.
    #[arg(long, global = true, env = "MACROHARVEST_CONFIG")]
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

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Fetch every URL in a candidate list and store new macro samples.
    Harvest(HarvestArgs),

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Flags for `harvest`; each overrides the matching config value.
#[derive(clap::Args, Debug, Default)]
pub(crate) struct HarvestArgs {
    /// Candidate list: one URL per line, `-` for stdin. `#` starts a comment.
    #[arg(short, long)]
    pub input: String,

    /// Report path (defaults to <storage-root>/harvest-<timestamp>.json).
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Content store root directory.
    #[arg(long)]
    pub storage_root: Option<PathBuf>,

    /// Candidates per batch.
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Workers per CPU.
    #[arg(long)]
    pub workers_per_cpu: Option<usize>,

    /// Fixed worker count (overrides --workers-per-cpu).
    #[arg(long)]
    pub workers: Option<usize>,

    /// Per-request timeout in seconds.
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Largest response body to accept, in bytes.
    #[arg(long)]
    pub max_body_bytes: Option<u64>,

    /// Accept invalid TLS certificates.
    #[arg(long)]
    pub insecure: bool,
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
        0 => "macroharvest=info",
        1 => "macroharvest=debug",
        _ => "macroharvest=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

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
        Command::Harvest(args) => cmd_harvest(&config, args).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(&config).await,
        },
    }
}

// ---------------------------------------------------------------------------
// harvest
// ---------------------------------------------------------------------------

async fn cmd_harvest(config: &AppConfig, args: HarvestArgs) -> Result<()> {
    let harvest_config = resolve_config(config, &args);

    let urls = read_candidates(&args.input)?;
    if urls.is_empty() {
        return Err(eyre!("no candidate URLs found in '{}'", args.input));
    }
    let candidates = candidates_from_urls(urls);

    let report_path = args.out.clone().unwrap_or_else(|| {
        let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%SZ");
        harvest_config
            .storage_root
            .join(format!("harvest-{stamp}.json"))
    });

    info!(
        input = %args.input,
        candidates = candidates.len(),
        storage_root = %harvest_config.storage_root.display(),
        "harvesting candidates"
    );

    let fetcher = HttpFetcher::new(&harvest_config)?;

    let cancel = CancelHandle::new();
    let ctrl_c = tokio::spawn(watch_interrupts(cancel.clone()));
    let reporter = CliProgress::new();

    let result = macroharvest_core::harvest(
        &harvest_config,
        candidates,
        fetcher,
        Arc::new(SignatureClassifier::new()),
        cancel,
        &reporter,
    )
    .await;
    ctrl_c.abort();
    let outcome = settle(result, &reporter)?;

    report::write_json(&outcome, &report_path)?;
    print_summary(&outcome, &report_path);

    Ok(())
}

/// First interrupt cancels the run gracefully; a second one exits at once.
async fn watch_interrupts(cancel: CancelHandle) {
    if tokio::signal::ctrl_c().await.is_err() {
        return;
    }
    warn!("interrupt received, finishing in-flight batches (Ctrl-C again to quit)");
    cancel.cancel();

    if tokio::signal::ctrl_c().await.is_ok() {
        warn!("second interrupt, exiting without a report");
        std::process::exit(130);
    }
}

/// Unwrap a harvest result, leaving the progress bar in place on failure.
fn settle<T>(result: macroharvest_shared::Result<T>, progress: &CliProgress) -> Result<T> {
    result.map_err(|e| {
        progress.abandon();
        color_eyre::eyre::Report::from(e)
    })
}

/// Merge CLI overrides over the loaded config.
fn resolve_config(config: &AppConfig, args: &HarvestArgs) -> HarvestConfig {
    let mut resolved = HarvestConfig::from(config);

    if let Some(root) = &args.storage_root {
        resolved.storage_root = root.clone();
    }
    if let Some(batch_size) = args.batch_size {
        resolved.batch_size = batch_size;
    }
    if let Some(per_cpu) = args.workers_per_cpu {
        resolved.workers_per_cpu = per_cpu;
    }
    if args.workers.is_some() {
        resolved.workers = args.workers;
    }
    if let Some(secs) = args.timeout {
        resolved.fetch_timeout = std::time::Duration::from_secs(secs);
    }
    if let Some(bytes) = args.max_body_bytes {
        resolved.max_body_bytes = bytes;
    }
    if args.insecure {
        resolved.accept_invalid_certs = true;
    }

    resolved
}

/// Read candidate URLs from a file or stdin.
fn read_candidates(input: &str) -> Result<Vec<String>> {
    let text = if input == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .wrap_err("failed to read candidates from stdin")?;
        buf
    } else {
        std::fs::read_to_string(input)
            .wrap_err_with(|| format!("failed to read candidate list '{input}'"))?
    };

    Ok(parse_candidates(&text))
}

fn parse_candidates(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(String::from)
        .collect()
}

fn print_summary(outcome: &HarvestOutcome, report_path: &Path) {
    println!();
    println!("  Harvest finished{}", if outcome.cancelled { " (cancelled)" } else { "" });
    println!("  Candidates: {}", outcome.candidates);
    println!("  Workers:    {}", outcome.workers);
    println!("  Batches:    {}", outcome.batches);
    for (kind, count) in outcome.summary() {
        println!("  {:<11} {count}", format!("{kind:?}:"));
    }
    if outcome.unprocessed() > 0 {
        println!("  Skipped:    {} (not reached before cancel)", outcome.unprocessed());
    }
    println!("  Report:     {}", report_path.display());
    println!("  Time:       {:.1}s", outcome.elapsed.as_secs_f64());
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif bar over batches.
struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        Self::with_bar(ProgressBar::new(0))
    }

    fn with_bar(bar: ProgressBar) -> Self {
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} [{bar:30}] {pos}/{len} batches {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        bar.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { bar }
    }

    /// Stop ticking and keep the last state on screen.
    fn abandon(&self) {
        self.bar.abandon_with_message("harvest failed");
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.bar.set_message(name.to_string());
    }

    fn batch_completed(&self, worker: WorkerId, completed: usize, total: usize, items: usize) {
        self.bar.set_length(total as u64);
        self.bar.set_position(completed as u64);
        self.bar
            .set_message(format!("worker {worker} finished {items} item(s)"));
    }

    fn done(&self, _outcome: &HarvestOutcome) {
        self.bar.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config: &AppConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");
    Ok(())
}
