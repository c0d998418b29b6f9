//! # vend CLI Entry Point
//!
//! Parses arguments with clap and routes each command to the reconciler.
//!
//! ## Command Structure
//!
//! - **Dependencies**: `add`, `remove`, `update`, `install`
//! - **Inspection**: `list`, `lock --check`
//! - **Shell**: `completion`

use anyhow::{Context, Result, bail};
use clap::{ArgAction, CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use colored::*;
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use vend::config::Project;
use vend::deps::{InstallOptions, Reconciler};
use vend::ui;
use vend::vcs::GitBackend;

#[derive(Parser)]
#[command(name = "vend")]
#[command(about = "Git-sourced dependency manager", version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// More logging: -v for info, -vv for debug (VEND_LOG takes precedence)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Directory containing vend.json [default: current directory]
    #[arg(long, global = true, value_name = "DIR")]
    manifest_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a dependency (owner/repo[@tag|#branch], github:, git:, path:)
    Add {
        spec: String,
        /// Declare under devDependencies
        #[arg(long)]
        dev: bool,
    },
    /// Remove a dependency and its working copy
    Remove { name: String },
    /// Move locked commits to the latest of their tag or branch
    Update {
        /// Only update this dependency
        name: Option<String>,
        /// Show what would change without writing anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Install every declared dependency
    Install {
        /// Fail unless every dependency is already pinned in vend.lock
        #[arg(long)]
        frozen: bool,
    },
    /// List declared dependencies and their state
    List,
    /// Inspect the lockfile
    Lock {
        /// Report manifest/lockfile mismatches and exit non-zero if any
        #[arg(long)]
        check: bool,
    },
    /// Generate shell completion scripts
    Completion { shell: Shell },
}

#[cfg(windows)]
#[link(name = "kernel32")]
unsafe extern "system" {
    fn SetConsoleOutputCP(wCodePageID: u32) -> i32;
}

/// Status lines use emoji and box drawing.
#[cfg(windows)]
fn enable_utf8_console() {
    unsafe {
        SetConsoleOutputCP(65001);
    }
}

#[cfg(not(windows))]
fn enable_utf8_console() {}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("VEND_LOG").unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let root = match cli.manifest_dir {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to read current directory")?,
    };
    debug!("project root: {}", root.display());
    let project = Project::new(root);
    let git = GitBackend::new();
    let reconciler = Reconciler::new(&project, &git);

    match cli.command {
        Commands::Add { spec, dev } => reconciler.add(&spec, dev)?,
        Commands::Remove { name } => reconciler.remove(&name)?,
        Commands::Update { name, dry_run } => {
            reconciler.update(name.as_deref(), dry_run)?;
        }
        Commands::Install { frozen } => {
            reconciler.install(InstallOptions { frozen })?;
        }
        Commands::List => {
            let entries = reconciler.list()?;
            if entries.is_empty() {
                println!("{} No dependencies declared in vend.json.", "ℹ".blue());
            } else {
                ui::dependency_table(&entries).print();
            }
        }
        Commands::Lock { check } => {
            if !check {
                bail!("nothing to do (did you mean 'vend lock --check'?)");
            }
            let problems = reconciler.verify()?;
            if !problems.is_empty() {
                for problem in &problems {
                    println!("{} {}", "x".red(), problem);
                }
                bail!("vend.lock is out of date ({} problems)", problems.len());
            }
            println!("{} vend.lock is up to date.", "✓".green());
        }
        Commands::Completion { shell } => {
            let mut cmd = Cli::command();
            let bin_name = cmd.get_name().to_string();
            generate(shell, &mut cmd, bin_name, &mut std::io::stdout());
        }
    }
    Ok(())
}

fn main() {
    enable_utf8_console();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("{} {:#}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}
