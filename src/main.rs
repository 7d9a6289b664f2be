mod backup;
mod config;
mod cron;
mod restic;
mod restore;
mod setup;
mod telegram;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "resticron")]
#[command(about = "Configure, run and schedule restic backups")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Install the binary and seed a configuration file
    Install,
    /// Interactive configuration editor
    Config {
        /// Print the current configuration (passwords masked) and exit
        #[arg(short, long)]
        show: bool,
    },
    /// Initialize restic repositories (all of them if none is named)
    Init {
        /// Repository name
        repo: Option<String>,
    },
    /// Run backups (all repositories if none is named)
    Backup {
        /// Repository name
        repo: Option<String>,
        /// Hook to run before each backup, overriding the configured one
        #[arg(long = "pre-backup", value_name = "PATH")]
        pre_backup: Option<PathBuf>,
        /// Hook to run after each backup, overriding the configured one
        #[arg(long = "post-backup", value_name = "PATH")]
        post_backup: Option<PathBuf>,
    },
    /// Restore a snapshot
    Restore {
        /// Repository name
        repo: String,
        /// Snapshot id, or `latest`
        snapshot: String,
        /// Restore only these files
        #[arg(short, long, value_name = "FILE", num_args = 1..)]
        files: Vec<String>,
        /// Restore in place, over the original paths
        #[arg(short = 'g', long = "in-place")]
        in_place: bool,
        /// Restore into this directory
        #[arg(short, long, value_name = "DIR")]
        path: Option<PathBuf>,
    },
    /// List snapshots (all repositories if none is named)
    List {
        /// Repository name
        repo: Option<String>,
        /// Also show hostname, tags and backed-up paths
        #[arg(short, long)]
        verbose: bool,
    },
    /// Manage the scheduled backup entry in the crontab
    Crontab {
        /// Show the current entry
        #[arg(short, long)]
        show: bool,
        /// Delete the entry
        #[arg(short, long, conflicts_with = "show")]
        delete: bool,
    },
    /// Update the restic binary
    Update,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let cfg = config::Config::load()?;

    match cli.command {
        Commands::Install => {
            setup::install(&cfg)?;
        }
        Commands::Config { show } => {
            if show {
                println!("{}", cfg.show()?);
            } else {
                config::menu().await?;
            }
        }
        Commands::Init { repo } => {
            backup::init(&cfg, repo.as_deref())?;
        }
        Commands::Backup {
            repo,
            pre_backup,
            post_backup,
        } => {
            let overrides = backup::HookOverrides {
                pre: pre_backup,
                post: post_backup,
            };
            backup::run(&cfg, repo.as_deref(), &overrides).await?;
        }
        Commands::Restore {
            repo,
            snapshot,
            files,
            in_place,
            path,
        } => {
            restore::restore(&cfg, &repo, &snapshot, &files, in_place, path)?;
        }
        Commands::List { repo, verbose } => {
            backup::list(&cfg, repo.as_deref(), verbose)?;
        }
        Commands::Crontab { show, delete } => {
            if show {
                cron::show()?;
            } else if delete {
                cron::remove_entry()?;
            } else {
                cron::set(&cfg)?;
            }
        }
        Commands::Update => {
            setup::update(&cfg)?;
        }
    }

    Ok(())
}
