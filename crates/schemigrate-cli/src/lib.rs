//! schemigrate command-line front end.
//!
//! Migrations are compiled in, so applications ship their own binary:
//!
//! ```rust,ignore
//! #[tokio::main]
//! async fn main() -> std::process::ExitCode {
//!     let loader = MigrationLoader::new().with(CreateUsers).with(AddEmailIndex);
//!     schemigrate_cli::run_cli(loader).await
//! }
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use schemigrate::{
    Config, DriverCatalog, MigrateError, MigrationLoader, MigrationReport, MigrationTarget,
    Migrator, TransformationProvider,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser, Debug)]
#[command(name = "schemigrate")]
#[command(about = "Versioned database schema migrations")]
#[command(version)]
pub struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "schemigrate.yaml")]
    pub config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    pub output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    pub log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    pub verbosity: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Apply pending migrations
    Up {
        /// Stop at this version instead of the configured target
        #[arg(long)]
        to: Option<String>,

        /// Show the plan without executing it
        #[arg(long)]
        dry_run: bool,
    },

    /// Revert applied migrations down to a version
    Down {
        /// Version to end at ("zero" reverts everything)
        #[arg(long)]
        to: String,

        /// Show the plan without executing it
        #[arg(long)]
        dry_run: bool,
    },

    /// Show applied and pending migrations
    Status,

    /// Check the configuration file without connecting
    Validate,
}

/// Parse arguments, run the command and map the outcome to an exit status.
pub async fn run_cli(loader: MigrationLoader) -> ExitCode {
    let cli = Cli::parse();
    match run(cli, loader).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

pub async fn run(cli: Cli, loader: MigrationLoader) -> Result<(), MigrateError> {
    setup_logging(&cli.verbosity, &cli.log_format);

    let config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    if let Commands::Validate = cli.command {
        println!(
            "Configuration is valid ({} database, ledger table {})",
            config.database.r#type, config.migration.ledger_table
        );
        return Ok(());
    }

    let provider = TransformationProvider::connect_with(
        &DriverCatalog::with_builtins(),
        &config.database.r#type,
        &config.database.connection_string,
        config.database.connect_options(),
    )
    .await?
    .with_ledger_table(config.migration.ledger_table.clone());

    let dry_run = matches!(
        cli.command,
        Commands::Up { dry_run: true, .. } | Commands::Down { dry_run: true, .. }
    );
    let mut migrator = Migrator::new(provider, loader)
        .transactional_ddl(config.migration.transactional_ddl)
        .dry_run(dry_run)
        .with_cancellation(setup_signal_handler());

    let outcome = match cli.command {
        Commands::Validate => Ok(()),
        Commands::Status => status(&mut migrator, cli.output_json).await,
        Commands::Up { to, .. } => {
            let target = match to {
                Some(to) => to.parse(),
                None => config.migration.target(),
            };
            match target {
                Ok(target) => migrate(&mut migrator, target, cli.output_json).await,
                Err(e) => Err(e),
            }
        }
        Commands::Down { to, .. } => match to.parse::<MigrationTarget>() {
            Ok(target) => migrate(&mut migrator, target, cli.output_json).await,
            Err(e) => Err(e),
        },
    };

    let close = migrator.into_provider().close().await;
    outcome?;
    close
}

async fn status(migrator: &mut Migrator, output_json: bool) -> Result<(), MigrateError> {
    let status = migrator.status().await?;
    if output_json {
        println!("{}", status.to_json()?);
    } else {
        println!("Current version: {}", status.current_version);
        println!("  Applied: {:?}", status.applied);
        println!("  Pending: {:?}", status.pending);
    }
    Ok(())
}

async fn migrate(
    migrator: &mut Migrator,
    target: MigrationTarget,
    output_json: bool,
) -> Result<(), MigrateError> {
    let report = migrator.migrate_to(target).await?;
    if output_json {
        println!("{}", report.to_json()?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn print_report(report: &MigrationReport) {
    let status_msg = if report.dry_run {
        "Dry run completed!"
    } else {
        "Migration completed!"
    };
    println!("\n{}", status_msg);
    println!("  Direction: {}", report.direction);
    println!(
        "  Version: {} -> {}",
        report.from_version, report.to_version
    );
    if !report.applied.is_empty() {
        println!("  Applied: {:?}", report.applied);
    }
    if !report.reverted.is_empty() {
        println!("  Reverted: {:?}", report.reverted);
    }
    println!("  Duration: {:.2}s", report.duration_seconds);
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false);

    // Ignore the error when embedding code already installed a subscriber.
    let _ = if format == "json" {
        subscriber.json().try_init()
    } else {
        subscriber.try_init()
    };
}

/// Cancel the run on SIGINT or SIGTERM.
#[cfg(unix)]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();

    for (kind, label) in [
        (SignalKind::interrupt(), "SIGINT"),
        (SignalKind::terminate(), "SIGTERM"),
    ] {
        let token = cancel_token.clone();
        match signal(kind) {
            Ok(mut stream) => {
                tokio::spawn(async move {
                    stream.recv().await;
                    eprintln!("\nReceived {}. Rolling back...", label);
                    token.cancel();
                });
            }
            Err(e) => tracing::warn!("Cannot listen for {}: {}", label, e),
        }
    }

    cancel_token
}

/// Cancel the run on Ctrl-C.
#[cfg(not(unix))]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nReceived Ctrl-C. Rolling back...");
            token.cancel();
        }
    });

    cancel_token
}
