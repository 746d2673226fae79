//! Binary entry point for frannie-backup.
//!
//! Operator CLI over the backup service: run the scheduler, serve the
//! backup API, trigger captures and reconciliation, export, list, restore,
//! and inspect statistics.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// CLI output goes to stdout/stderr by design
#![allow(clippy::print_stdout)]
#![allow(clippy::print_stderr)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use frannie_backup::api::{ApiState, FileRoster, RosterProvider, StaticRoster};
use frannie_backup::{
    BackupConfig, BackupService, CaptureOutcome, ExportFormat, HttpRemoteStore, LogNotifier,
    LocalStore, Notifier, RemoteStore,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

/// Frannie NAILS client roster backup and reconciliation.
#[derive(Parser)]
#[command(name = "frannie-backup")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON.
    #[arg(long, global = true)]
    json: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true, env = "FRANNIE_BACKUP_CONFIG_PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Run the backup scheduler until interrupted.
    Run,

    /// Serve the backup API.
    Serve {
        /// Port to listen on.
        #[arg(short, long, default_value = "5000", env = "FRANNIE_BACKUP_PORT")]
        port: u16,

        /// Directory for the server's backup files (default: data dir).
        #[arg(long)]
        backup_dir: Option<PathBuf>,

        /// JSON seed file serving as the client roster.
        #[arg(long)]
        roster: Option<PathBuf>,
    },

    /// Run one capture cycle now.
    Backup,

    /// Reconcile the local history with the server.
    Sync,

    /// Export the newest local snapshot.
    Export {
        /// Output format.
        #[arg(short, long, value_enum, default_value = "json")]
        format: ExportFormat,

        /// Write to a file instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List the backups stored on the server.
    List,

    /// Fetch a server backup by file name.
    Restore {
        /// Backup file name (clients-backup-*.json).
        file_name: String,

        /// Write the fetched snapshot into the local history.
        #[arg(long)]
        apply: bool,
    },

    /// Show local and remote backup statistics.
    Stats,

    /// Show configuration, local history, and database health.
    Status,

    /// Generate shell completions.
    Completions {
        /// Target shell.
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Main entry point.
#[tokio::main]
async fn main() -> ExitCode {
    // Load .env before anything reads the environment.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.json);

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        },
    };

    match run_command(cli.command, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        },
    }
}

/// Initializes the tracing subscriber.
fn init_tracing(verbose: bool, json: bool) {
    use tracing_subscriber::EnvFilter;

    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Loads configuration from the explicit path or the default locations.
fn load_config(path: Option<&std::path::Path>) -> anyhow::Result<BackupConfig> {
    let config = match path {
        Some(path) => BackupConfig::load_from_file(path)?,
        None => BackupConfig::load_default()?,
    };
    Ok(config)
}

/// Builds the service from configuration.
fn build_service(config: BackupConfig) -> anyhow::Result<Arc<BackupService>> {
    let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier::new());
    let local = LocalStore::new(&config.data_dir, config.local_retention)
        .context("cannot open local snapshot store")?;
    let remote = Arc::new(
        HttpRemoteStore::new(&config.api_base_url, config.retry.clone())
            .with_notifier(Arc::clone(&notifier)),
    );
    Ok(Arc::new(BackupService::new(
        config, local, remote, notifier,
    )))
}

/// Builds a bare remote store handle for server-side commands.
fn build_remote(config: &BackupConfig) -> HttpRemoteStore {
    HttpRemoteStore::new(&config.api_base_url, config.retry.clone())
}

/// Runs the selected command.
async fn run_command(command: Commands, config: BackupConfig) -> anyhow::Result<()> {
    match command {
        Commands::Run => cmd_run(config).await,
        Commands::Serve {
            port,
            backup_dir,
            roster,
        } => cmd_serve(config, port, backup_dir, roster).await,
        Commands::Backup => cmd_backup(config).await,
        Commands::Sync => cmd_sync(config).await,
        Commands::Export { format, output } => cmd_export(config, format, output),
        Commands::List => cmd_list(config).await,
        Commands::Restore { file_name, apply } => cmd_restore(config, file_name, apply).await,
        Commands::Stats => cmd_stats(config).await,
        Commands::Status => cmd_status(config).await,
        Commands::Completions { shell } => {
            cmd_completions(shell);
            Ok(())
        },
    }
}

/// Run command: scheduler until ctrl-c.
async fn cmd_run(config: BackupConfig) -> anyhow::Result<()> {
    let service = build_service(config)?;

    let outcome = service.start().await?;
    println!("{}", outcome.summary());
    println!(
        "Scheduler attivo: backup ogni {}s, controllo database ogni {}s. Ctrl-C per uscire.",
        service.config().backup_interval_secs,
        service.config().health_check_interval_secs
    );

    tokio::signal::ctrl_c()
        .await
        .context("cannot listen for ctrl-c")?;

    service.stop().await;
    println!("Scheduler fermato.");
    Ok(())
}

/// Serve command: the backup API itself.
async fn cmd_serve(
    config: BackupConfig,
    port: u16,
    backup_dir: Option<PathBuf>,
    roster: Option<PathBuf>,
) -> anyhow::Result<()> {
    let backup_dir = backup_dir.unwrap_or_else(|| config.data_dir.join("server-backups"));
    let roster_provider: Arc<dyn RosterProvider> = match roster {
        Some(path) => Arc::new(FileRoster::new(path)),
        None => Arc::new(StaticRoster::default()),
    };

    let state = Arc::new(ApiState::new(
        backup_dir,
        roster_provider,
        config.remote_retention,
    )?);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    frannie_backup::api::serve(addr, state).await?;
    Ok(())
}

/// Backup command: one manual capture.
async fn cmd_backup(config: BackupConfig) -> anyhow::Result<()> {
    let service = build_service(config)?;
    let outcome = service.capture().await?;
    println!("{}", outcome.summary());

    if let CaptureOutcome::Failed { error } = outcome {
        anyhow::bail!("backup failed: {error}");
    }
    Ok(())
}

/// Sync command: one reconciliation run.
async fn cmd_sync(config: BackupConfig) -> anyhow::Result<()> {
    let service = build_service(config)?;
    let outcome = service.sync_with_server().await?;
    println!("{}", outcome.message());
    Ok(())
}

/// Export command.
fn cmd_export(
    config: BackupConfig,
    format: ExportFormat,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let local = LocalStore::new(&config.data_dir, config.local_retention)?;
    let snapshot = local
        .latest()?
        .ok_or_else(|| anyhow::anyhow!("no backup available"))?;
    let rendered = frannie_backup::service::render_snapshot(&snapshot, format)?;

    match output {
        Some(path) => {
            std::fs::write(&path, rendered)
                .with_context(|| format!("cannot write {}", path.display()))?;
            println!(
                "Esportati {} clienti in {}",
                snapshot.clients_count(),
                path.display()
            );
        },
        None => print!("{rendered}"),
    }
    Ok(())
}

/// List command: remote backup table.
async fn cmd_list(config: BackupConfig) -> anyhow::Result<()> {
    let remote = build_remote(&config);
    let backups = remote.list_snapshots().await?;

    if backups.is_empty() {
        println!("Nessun backup sul server.");
        return Ok(());
    }

    println!(
        "{:<50} {:<25} {:>8} {:>10}  {}",
        "File", "Timestamp", "Clienti", "Bytes", "Origine"
    );
    for entry in backups {
        println!(
            "{:<50} {:<25} {:>8} {:>10}  {}",
            entry.file_name,
            entry.timestamp.to_rfc3339(),
            entry.clients_count,
            entry.file_size,
            entry.source
        );
    }
    Ok(())
}

/// Restore command.
async fn cmd_restore(config: BackupConfig, file_name: String, apply: bool) -> anyhow::Result<()> {
    let remote = build_remote(&config);
    let snapshot = remote.restore_snapshot(&file_name).await?;

    println!(
        "Backup {} del {}: {} clienti",
        file_name,
        snapshot.timestamp.to_rfc3339(),
        snapshot.clients_count()
    );

    if apply {
        let local = LocalStore::new(&config.data_dir, config.local_retention)?;
        let stored = local.push(&snapshot)?;
        println!("Scritto nella cronologia locale ({stored} backup presenti).");
    } else {
        println!("Usa --apply per scriverlo nella cronologia locale.");
    }
    Ok(())
}

/// Stats command: local and remote statistics.
async fn cmd_stats(config: BackupConfig) -> anyhow::Result<()> {
    let local = LocalStore::new(&config.data_dir, config.local_retention)?;
    let local_stats = local.stats()?;

    println!("Backup locali:");
    println!("  {}", local_stats.summary());

    let remote = build_remote(&config);
    match remote.backup_stats().await {
        Ok(stats) => {
            println!("Backup sul server:");
            println!("  Totale: {}", stats.total_backups);
            if let Some(latest) = stats.latest_backup {
                println!("  Più recente: {}", latest.to_rfc3339());
            }
            if let Some(oldest) = stats.oldest_backup {
                println!("  Più vecchio: {}", oldest.to_rfc3339());
            }
            println!("  Dimensione: {} MB", stats.total_size_mb);
        },
        Err(e) => println!("Backup sul server: non disponibili ({e})"),
    }
    Ok(())
}

/// Status command.
async fn cmd_status(config: BackupConfig) -> anyhow::Result<()> {
    println!("frannie-backup {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("API: {}", config.api_base_url);
    println!("Dati: {}", config.data_dir.display());
    println!(
        "Intervalli: backup {}s, controllo database {}s",
        config.backup_interval_secs, config.health_check_interval_secs
    );
    println!(
        "Retention: {} locali, {} sul server",
        config.local_retention, config.remote_retention
    );
    println!();

    let local = LocalStore::new(&config.data_dir, config.local_retention)?;
    println!("Cronologia locale: {}", local.stats()?.summary());

    let remote = build_remote(&config);
    match remote.database_health().await {
        Ok(report) if report.healthy => println!("Database: raggiungibile"),
        Ok(_) => println!("Database: NON raggiungibile"),
        Err(e) => println!("Database: NON raggiungibile ({e})"),
    }
    Ok(())
}

/// Completions command.
fn cmd_completions(shell: clap_complete::Shell) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    clap_complete::generate(shell, &mut cmd, name, &mut std::io::stdout());
}
