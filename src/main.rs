use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{debug, error, trace};

use config_transform::apply::{backup_path, SafeTransformApplier};
use config_transform::config::{Config, ConfigLoader};
use config_transform::engine::XdtEngine;
use config_transform::error::{describe_error_code, ErrorCode, TransformError};
use config_transform::interaction::DefaultUserInteraction;
use config_transform::resolver::ConventionResolver;
use config_transform::workflow::{
    ApplyTransformCommand, CommandStatus, ConfirmOptions, RestoreCommand,
};

/// Apply environment transforms onto web.config / app.config
#[derive(Parser)]
#[command(name = "config-transform")]
#[command(about = "Apply environment-specific config transforms with backup and rollback", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace, -vvv for all)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to configuration file
    #[arg(short = 'c', long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply a transform file onto the base config next to it
    Apply {
        /// Transform file, e.g. web.staging-HLG.config
        transform: PathBuf,

        /// Do not ask before overwriting the base file
        #[arg(short = 'y', long)]
        yes: bool,

        /// Apply even if the file name does not look like a transform
        #[arg(long)]
        force: bool,
    },
    /// Show which base file and environment a transform resolves to
    Resolve {
        transform: PathBuf,
    },
    /// List transform files in a directory
    List {
        /// Directory to scan (default: current directory)
        dir: Option<PathBuf>,
    },
    /// Restore a base file from its .backup copy
    Restore {
        /// Base file, e.g. web.config
        base: PathBuf,

        /// Do not ask before overwriting the base file
        #[arg(short = 'y', long)]
        yes: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let config = ConfigLoader::new()
        .with_explicit_path(cli.config.clone())
        .load();

    let log_level = match cli.verbose {
        0 => config
            .as_ref()
            .ok()
            .and_then(|c| c.log_level.clone())
            .unwrap_or_else(|| "info".to_string()),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    };

    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_writer(std::io::stderr)
        .with_target(cli.verbose >= 2) // Show target module for -vv and above
        .with_thread_ids(cli.verbose >= 3) // Show thread IDs for -vvv
        .with_line_number(cli.verbose >= 3) // Show line numbers for -vvv
        .init();

    debug!("config-transform started with verbosity level: {}", cli.verbose);
    trace!("Full CLI args: {:?}", std::env::args().collect::<Vec<_>>());

    let result = config.and_then(|config| run(cli.command, &config));

    match result {
        Ok(status) => std::process::exit(status.exit_code()),
        Err(e) => handle_fatal_error(e, cli.verbose),
    }
}

/// Print a fatal error and exit with the failure code
///
/// Coded errors lead with the registry description; the full chain follows.
fn handle_fatal_error(error: anyhow::Error, verbose: u8) -> ! {
    error!("Fatal error: {:#}", error);

    match error.downcast_ref::<TransformError>() {
        Some(err) => {
            eprintln!("Error: {}", describe_error_code(err.code()));
            eprintln!("{error:#}");
        }
        None => eprintln!("Error: {error:#}"),
    }

    if verbose >= 1 {
        eprintln!("\nError chain:");
        for (i, cause) in error.chain().enumerate() {
            eprintln!("  {}: {}", i, cause);
        }
    }

    std::process::exit(CommandStatus::Failed.exit_code())
}

fn run(command: Commands, config: &Config) -> Result<CommandStatus> {
    let resolver = config.resolver();

    match command {
        Commands::Apply {
            transform,
            yes,
            force,
        } => {
            let applier = SafeTransformApplier::with_options(XdtEngine::new(), config.apply_options());
            let ui = DefaultUserInteraction::new();
            let reload = config.reload_hook()?;
            let command = ApplyTransformCommand::new(&resolver, &applier, &ui, reload.as_ref());
            Ok(command.execute(
                &transform,
                ConfirmOptions {
                    assume_yes: yes,
                    force,
                },
            ))
        }
        Commands::Resolve { transform } => Ok(run_resolve(&resolver, &transform)),
        Commands::List { dir } => run_list(&resolver, dir.as_deref().unwrap_or(Path::new("."))),
        Commands::Restore { base, yes } => {
            let ui = DefaultUserInteraction::new();
            let reload = config.reload_hook()?;
            let command = RestoreCommand::new(&ui, reload.as_ref(), config.lock_base_file);
            Ok(command.execute(
                &base,
                ConfirmOptions {
                    assume_yes: yes,
                    force: false,
                },
            ))
        }
    }
}

fn run_resolve(resolver: &ConventionResolver, transform: &Path) -> CommandStatus {
    match resolver.resolve(transform) {
        Ok(resolved) => {
            println!("Transform:   {}", resolved.transform.display());
            println!("Base file:   {}", resolved.base.display());
            println!("Environment: {}", resolved.environment);
            println!(
                "Eligible:    {}",
                if resolver.is_transform_candidate(transform) {
                    "yes"
                } else {
                    "no (use --force to apply)"
                }
            );
            println!("Backup:      {}", backup_path(&resolved.base).display());
            CommandStatus::Completed
        }
        Err(e) if e.code() == ErrorCode::RESOLVE_TRANSFORM_MISSING => {
            eprintln!("{}", e.user_message());
            CommandStatus::TransformMissing
        }
        Err(e) => {
            eprintln!("{}", e.user_message());
            CommandStatus::BaseNotFound
        }
    }
}

fn run_list(resolver: &ConventionResolver, dir: &Path) -> Result<CommandStatus> {
    if !dir.is_dir() {
        eprintln!("Directory not found: {}", dir.display());
        return Ok(CommandStatus::BaseNotFound);
    }

    let candidates = resolver.list_candidates(dir)?;
    if candidates.is_empty() {
        println!("No transform files found in {}", dir.display());
    }
    for path in candidates {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        println!("{:<12} {}", ConventionResolver::environment_label(&path).as_str(), name);
    }
    Ok(CommandStatus::Completed)
}
