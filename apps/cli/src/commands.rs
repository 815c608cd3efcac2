//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::Result;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use marginalia_catalog::HardcoverClient;
use marginalia_core::{
    ReadResult, RecordOutcome, SendResult, StoreState, SyncProgress, SyncReport,
    read_annotations, send_annotations, set_deleted, store_status,
};
use marginalia_shared::{
    AnnotationRecord, AppConfig, CatalogSettings, MarginaliaError, init_config, load_config,
};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Marginalia: sync Kobo highlights to your Hardcover reading journal.
#[derive(Parser)]
#[command(
    name = "marginalia",
    version,
    about = "Sync Kobo highlights and notes to your Hardcover reading journal.",
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

/// Location of the annotation store.
#[derive(Args, Clone, Debug)]
pub(crate) struct StoreArgs {
    /// Annotation store file (defaults to the configured `annotations_file`).
    #[arg(short, long, env = "ANNOTATIONS_FILE")]
    pub out: Option<PathBuf>,
}

/// Where to read annotations from.
#[derive(Args, Clone, Debug)]
pub(crate) struct SourceArgs {
    /// Kobo database (defaults to the configured path, then device detection).
    #[arg(short, long, env = "KOBO_DB")]
    pub input: Option<PathBuf>,

    /// Only read annotations created at or after this date.
    #[arg(long)]
    pub since: Option<String>,
}

/// Catalog credentials and endpoint.
#[derive(Args, Clone, Debug)]
pub(crate) struct CatalogArgs {
    /// Hardcover API token.
    #[arg(long, env = "HARDCOVER_API_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Hardcover GraphQL endpoint.
    #[arg(long, env = "HARDCOVER_API_URL")]
    pub api: Option<String>,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Read annotations from the device into the local store.
    Read {
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        store: StoreArgs,
    },

    /// Send pending annotations to Hardcover.
    Send {
        #[command(flatten)]
        store: StoreArgs,
        #[command(flatten)]
        catalog: CatalogArgs,
        /// Print the sync report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Read from the device, then send.
    Sync {
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        store: StoreArgs,
        #[command(flatten)]
        catalog: CatalogArgs,
        /// Print the sync report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show record counts in the local store.
    Status {
        #[command(flatten)]
        store: StoreArgs,
        /// Print counts as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Never send this annotation.
    Ignore {
        /// Annotation id.
        id: String,
        #[command(flatten)]
        store: StoreArgs,
    },

    /// Allow a previously ignored annotation to be sent again.
    Unignore {
        /// Annotation id.
        id: String,
        #[command(flatten)]
        store: StoreArgs,
    },

    /// Look for a connected Kobo and print its database path.
    Detect,

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
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "marginalia=info",
        1 => "marginalia=debug",
        _ => "marginalia=trace",
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
    match cli.command {
        Command::Read { source, store } => cmd_read(&source, &store).await,
        Command::Send {
            store,
            catalog,
            json,
        } => cmd_send(&store, &catalog, json).await,
        Command::Sync {
            source,
            store,
            catalog,
            json,
        } => cmd_sync(&source, &store, &catalog, json).await,
        Command::Status { store, json } => cmd_status(&store, json),
        Command::Ignore { id, store } => cmd_set_deleted(&store, &id, true),
        Command::Unignore { id, store } => cmd_set_deleted(&store, &id, false),
        Command::Detect => cmd_detect(),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(),
        },
    }
}

// ---------------------------------------------------------------------------
// Path & settings resolution
// ---------------------------------------------------------------------------

fn store_path(args: &StoreArgs, config: &AppConfig) -> PathBuf {
    args.out
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.paths.annotations_file))
}

fn source_path(args: &SourceArgs, config: &AppConfig) -> Result<PathBuf> {
    if let Some(path) = &args.input {
        return Ok(path.clone());
    }
    if let Some(path) = &config.paths.kobo_db {
        return Ok(PathBuf::from(path));
    }
    let detected = marginalia_kobo::detect_device().ok_or_else(|| {
        MarginaliaError::config(
            "no Kobo database found. Connect your Kobo, pass --input, or set paths.kobo_db",
        )
    })?;
    info!(path = %detected.display(), "detected Kobo device");
    Ok(detected)
}

fn catalog_client(args: &CatalogArgs, config: &AppConfig) -> Result<HardcoverClient> {
    let settings = CatalogSettings::resolve(config, args.token.as_deref(), args.api.as_deref())?;
    Ok(HardcoverClient::new(&settings)?)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_read(source: &SourceArgs, store: &StoreArgs) -> Result<()> {
    let config = load_config()?;
    let source_path = source_path(source, &config)?;
    let store_path = store_path(store, &config);
    let since = source.since.as_deref().unwrap_or(&config.extraction.since);

    info!(source = %source_path.display(), store = %store_path.display(), since, "reading annotations");

    let spinner = spinner("Reading annotations from device");
    let result = read_annotations(&source_path, &store_path, since).await;
    spinner.finish_and_clear();

    print_read(&result?, &store_path);
    Ok(())
}

async fn cmd_send(store: &StoreArgs, catalog: &CatalogArgs, json: bool) -> Result<()> {
    let config = load_config()?;
    let client = catalog_client(catalog, &config)?;
    let store_path = store_path(store, &config);

    send_with(&client, &store_path, json).await
}

async fn cmd_sync(
    source: &SourceArgs,
    store: &StoreArgs,
    catalog: &CatalogArgs,
    json: bool,
) -> Result<()> {
    let config = load_config()?;
    let client = catalog_client(catalog, &config)?;
    let source_path = source_path(source, &config)?;
    let store_path = store_path(store, &config);
    let since = source.since.as_deref().unwrap_or(&config.extraction.since);

    let spinner = spinner("Reading annotations from device");
    let read = read_annotations(&source_path, &store_path, since).await;
    spinner.finish_and_clear();
    print_read(&read?, &store_path);

    send_with(&client, &store_path, json).await
}

async fn send_with(client: &HardcoverClient, store_path: &Path, json: bool) -> Result<()> {
    info!(store = %store_path.display(), api = %client.api_url(), "sending annotations");

    let reporter = CliProgress::new();
    let result = send_annotations(store_path, client, &reporter).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result.report)?);
    } else {
        print_send(&result, store_path);
    }
    Ok(())
}

fn cmd_status(store: &StoreArgs, json: bool) -> Result<()> {
    let config = load_config()?;
    let store_path = store_path(store, &config);
    let status = store_status(&store_path)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!();
    println!("  Store:      {}", store_path.display());
    println!("  Total:      {}", status.total);
    println!("  Pending:    {}", status.pending);
    println!("  Synced:     {}", status.synced);
    println!("  Ignored:    {}", status.deleted);
    println!("  Off device: {}", status.off_device);
    println!("  With notes: {}", status.with_notes);
    println!();
    Ok(())
}

fn cmd_set_deleted(store: &StoreArgs, id: &str, deleted: bool) -> Result<()> {
    let config = load_config()?;
    let store_path = store_path(store, &config);
    let changed = set_deleted(&store_path, id, deleted)?;

    let verb = if deleted { "ignored" } else { "unignored" };
    if changed {
        println!("Annotation {id} {verb}.");
    } else {
        println!("Annotation {id} was already {verb}.");
    }
    Ok(())
}

fn cmd_detect() -> Result<()> {
    match marginalia_kobo::detect_device() {
        Some(path) => println!("{}", path.display()),
        None => {
            return Err(MarginaliaError::config(format!(
                "no Kobo found under {}",
                marginalia_kobo::default_mount_roots()
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ))
            .into());
        }
    }
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn print_read(result: &ReadResult, store_path: &Path) {
    let summary = &result.summary;
    println!();
    println!("  Annotations read.");
    println!("  Found:      {}", summary.extracted);
    println!("  New:        {}", summary.added);
    println!("  Off device: {}", summary.missing);
    println!("  Total:      {}", summary.total);
    println!("  Store:      {}", store_path.display());
    if let Some(backup) = &result.backup {
        println!("  Unreadable store kept at {}", backup.display());
    }
    println!("  Time:       {:.1}s", result.elapsed.as_secs_f64());
    println!();
}

fn print_send(result: &SendResult, store_path: &Path) {
    match result.store_state {
        StoreState::Loaded => {}
        StoreState::Missing => {
            println!("No annotation store at {}. Run `marginalia read` first.", store_path.display());
            return;
        }
        StoreState::Corrupt => {
            println!("Annotation store at {} is unreadable; nothing sent.", store_path.display());
            return;
        }
    }

    let report: &SyncReport = &result.report;
    println!();
    println!("  Sync complete.");
    println!("  Synced:     {}", report.synced);
    println!("  Unresolved: {}", report.unresolved);
    println!("  Failed:     {}", report.failed);
    println!("  Skipped:    {}", report.skipped);
    println!("  Time:       {:.1}s", result.elapsed.as_secs_f64());
    println!();

    for (id, outcome) in &report.outcomes {
        if let RecordOutcome::Failed { error } = outcome {
            println!("  ! {id}: {error}");
        }
    }
}

fn spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .expect("valid progress template")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    spinner.enable_steady_tick(std::time::Duration::from_millis(80));
    spinner.set_message(message.to_string());
    spinner
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// Sync progress on an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        Self {
            spinner: spinner("Sending annotations"),
        }
    }
}

impl SyncProgress for CliProgress {
    fn started(&self, pending: usize) {
        self.spinner
            .set_message(format!("Sending {pending} pending annotations"));
    }

    fn record_done(
        &self,
        record: &AnnotationRecord,
        outcome: &RecordOutcome,
        current: usize,
        total: usize,
    ) {
        if *outcome == RecordOutcome::Skipped {
            return;
        }
        self.spinner
            .set_message(format!("[{current}/{total}] {}", record.title));
    }

    fn finished(&self, _report: &SyncReport) {
        self.spinner.finish_and_clear();
    }
}
