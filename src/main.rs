use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use modhost::builtin::register_builtins;
use modhost::config::HostConfig;
use modhost::modules::{Catalog, Descriptor, HostSymbols, ModuleRegistry};

/// Host for archive-packaged extension modules.
#[derive(Parser, Debug)]
#[command(name = "modhost", version, about)]
struct Cli {
    /// Configuration file (default: modhost.toml in the platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load and enable every module, then wait for Enter before shutting down
    Run {
        /// Modules directory (overrides `modules_dir` from the config)
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Show the descriptor of every module archive without loading it
    List {
        /// Modules directory (overrides `modules_dir` from the config)
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

#[derive(Serialize)]
struct Listing {
    path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    descriptor: Option<Descriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = HostConfig::load_or_default(cli.config.as_deref())?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_filter))
        .with_context(|| format!("Invalid log filter {:?}", config.log_filter))?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Command::Run { dir } => run(&config, dir),
        Command::List { dir, json } => list(&config, dir, json),
    }
}

fn modules_dir(config: &HostConfig, dir: Option<PathBuf>) -> Result<PathBuf> {
    match dir {
        Some(dir) => Ok(dir),
        None => config.modules_dir(),
    }
}

fn registry(config: &HostConfig) -> Result<ModuleRegistry> {
    let catalog = Arc::new(Catalog::new());
    register_builtins(&catalog);
    ModuleRegistry::from_config(config, catalog, Arc::new(HostSymbols::new()))
}

fn run(config: &HostConfig, dir: Option<PathBuf>) -> Result<()> {
    let dir = modules_dir(config, dir)?;
    let registry = registry(config)?;

    let modules = registry
        .discover_and_load(&dir)
        .with_context(|| format!("Failed to load modules from {}", dir.display()))?;
    for module in &modules {
        registry.notify_loaded(module);
    }
    for module in &modules {
        registry.enable(module);
    }
    tracing::info!(
        dir = %dir.display(),
        enabled = registry.enabled_count(),
        skipped = registry.last_diagnostics().len(),
        "Modules running, press Enter to stop"
    );

    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read from stdin")?;

    tracing::info!("Shutting down");
    registry.disable_all();
    Ok(())
}

fn list(config: &HostConfig, dir: Option<PathBuf>, json: bool) -> Result<()> {
    let dir = modules_dir(config, dir)?;
    let listings: Vec<Listing> = registry(config)?
        .describe(&dir)
        .with_context(|| format!("Failed to scan {}", dir.display()))?
        .into_iter()
        .map(|(path, descriptor)| match descriptor {
            Ok(descriptor) => Listing {
                path,
                descriptor: Some(descriptor),
                error: None,
            },
            Err(e) => Listing {
                path,
                descriptor: None,
                error: Some(e.to_string()),
            },
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&listings)?);
        return Ok(());
    }

    if listings.is_empty() {
        println!("No module archives in {}", dir.display());
    }
    for listing in &listings {
        let file = file_name(&listing.path);
        match (&listing.descriptor, &listing.error) {
            (Some(d), _) => println!("{file}: {} by {} ({})", d.full_name(), d.author(), d.main()),
            (None, Some(error)) => println!("{file}: invalid: {error}"),
            (None, None) => {}
        }
    }
    Ok(())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
