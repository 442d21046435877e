mod commands;
mod formatting;

use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use memberkit_core::config::{EnvConfig, LOG_LEVEL_ENV};
use memberkit_core::readme::DEFAULT_README;
use memberkit_core::scaffold::DEFAULT_PARENT;
use tracing::{debug, Level};

#[derive(Parser)]
#[command(name = "memberkit")]
#[command(about = "Keeps uv workspace members consistent")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Run as if started in this directory
    #[arg(short = 'w', long, global = true)]
    working_directory: Option<PathBuf>,

    /// Log level name (error, warn, info, debug, trace)
    #[arg(long, global = true, env = LOG_LEVEL_ENV)]
    log_level: Option<String>,

    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[arg(short, long, global = true, action)]
    quiet: bool,

    /// Write manifests without running taplo or tombi
    #[arg(long, global = true, action)]
    no_format: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Scaffold a new workspace member
    Create {
        name: String,
        /// Parent directory, relative to the workspace root
        #[arg(short, long, default_value = DEFAULT_PARENT)]
        path: PathBuf,
        /// Workspace projects the new member depends on
        #[arg(short = 'd', long = "dependency")]
        dependencies: Vec<String>,
    },
    /// Propagate root configuration and versions into members
    Sync {
        /// Members to sync; all when empty
        members: Vec<String>,
        /// Baseline version, overriding stored settings and git tags
        #[arg(long)]
        version: Option<String>,
        /// Also format the root manifest
        #[arg(long, action)]
        format_root: bool,
    },
    /// README maintenance
    Readme {
        #[command(subcommand)]
        command: ReadmeCommands,
    },
}

#[derive(Subcommand)]
enum ReadmeCommands {
    /// Refresh `<!-- BEGIN:cmd ... -->` blocks with command output
    UpdateCmd {
        #[arg(long, default_value = DEFAULT_README)]
        readme: PathBuf,
        /// Log the result instead of writing it
        #[arg(long, action)]
        no_write: bool,
        /// Parallel command workers
        #[arg(short = 'j', long)]
        jobs: Option<usize>,
        /// Only refresh blocks whose command matches this regex
        #[arg(long)]
        filter: Option<String>,
    },
}

fn main() -> Result<()> {
    let env = EnvConfig::load();
    let cli = Cli::parse();

    let log_level = match cli.log_level.as_deref().filter(|level| !level.trim().is_empty()) {
        Some(level) => Level::from_str(level.trim())
            .with_context(|| format!("Invalid log level: {}", level))?,
        None if cli.quiet => Level::ERROR,
        None => match cli.verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        },
    };

    tracing_subscriber::fmt().with_max_level(log_level).init();
    for path in &env.loaded {
        debug!("Loaded environment file: {}", path.display());
    }

    let workspace = commands::open_workspace(cli.working_directory, cli.no_format)?;

    match cli.command {
        Commands::Create {
            name,
            path,
            dependencies,
        } => commands::cmd_create(&workspace, name, path, dependencies)?,
        Commands::Sync {
            members,
            version,
            format_root,
        } => commands::cmd_sync(&workspace, members, version, format_root)?,
        Commands::Readme { command } => match command {
            ReadmeCommands::UpdateCmd {
                readme,
                no_write,
                jobs,
                filter,
            } => commands::cmd_readme_update(&workspace, readme, !no_write, jobs, filter)?,
        },
    }

    Ok(())
}
