// src/cli.rs
//! CLI definitions for goalpost
//!
//! This module only holds the clap definitions; the handlers live in the
//! `commands` module.
//!
//! Package commands:
//! - `install` / `remove` / `reinstall`
//! - `upgrade` / `downgrade` / `distro-sync`
//!
//! History:
//! - `history list` / `history info` / `history undo`

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "goalpost")]
#[command(author, version)]
#[command(about = "Resolve, apply and undo package transactions", long_about = None)]
pub struct Cli {
    /// Configuration file (default: /etc/goalpost/goalpost.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Answer yes to the confirmation prompt
    #[arg(short = 'y', long = "assumeyes", global = true)]
    pub assume_yes: bool,

    /// Only print warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Require the newest version of every requested package
    #[arg(long, global = true)]
    pub best: bool,

    /// Allow removing installed packages to resolve conflicts
    #[arg(long = "allowerasing", global = true)]
    pub allow_erasing: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Install packages
    Install {
        /// Package names or patterns (foo, foo-2.0, 'lib*')
        #[arg(required = true)]
        packages: Vec<String>,

        /// Allow installing a lower version than the installed one
        #[arg(long)]
        allow_downgrade: bool,

        /// Reinstall packages that are already installed
        #[arg(long)]
        force: bool,
    },

    /// Remove packages
    Remove {
        #[arg(required = true)]
        packages: Vec<String>,

        /// Also remove dependencies nothing else needs
        #[arg(long)]
        clean_deps: bool,
    },

    /// Upgrade packages (all installed packages when none are given)
    Upgrade { packages: Vec<String> },

    /// Downgrade packages to the next lower available version
    Downgrade {
        #[arg(required = true)]
        packages: Vec<String>,
    },

    /// Reinstall the installed version of packages
    Reinstall {
        #[arg(required = true)]
        packages: Vec<String>,
    },

    /// Synchronize packages to the versions offered by repositories
    DistroSync { packages: Vec<String> },

    /// Transaction history
    #[command(subcommand)]
    History(HistoryCommands),
}

#[derive(Subcommand, Debug)]
pub enum HistoryCommands {
    /// List recent transactions
    List {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Show one transaction
    Info {
        id: u64,

        /// Print the stored record as JSON
        #[arg(long)]
        json: bool,
    },

    /// Revert a transaction
    Undo { id: u64 },
}

impl Commands {
    /// Name used to look up the handler
    pub fn name(&self) -> &'static str {
        match self {
            Self::Install { .. } => "install",
            Self::Remove { .. } => "remove",
            Self::Upgrade { .. } => "upgrade",
            Self::Downgrade { .. } => "downgrade",
            Self::Reinstall { .. } => "reinstall",
            Self::DistroSync { .. } => "distro-sync",
            Self::History(_) => "history",
        }
    }
}
