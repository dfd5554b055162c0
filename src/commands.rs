// src/commands.rs
//! Command handlers for the goalpost CLI

mod history;
mod packages;
pub mod progress;

use crate::cli::Commands;
use anyhow::{Context as _, Result, anyhow, bail};
use goalpost::{
    EngineConfig, HistoryStore, MemoryIndex, ProblemReporter, Resolution, SilentProgress,
    Transaction, TransactionAction, TransactionExecutor, TransactionPackage, TransactionProgress,
};
use progress::TransactionBar;
use std::collections::BTreeMap;
use std::io::{self, BufRead, Write};
use tracing::info;

/// State shared by every handler
pub struct Context {
    pub config: EngineConfig,
    pub index: MemoryIndex,
    pub history: HistoryStore,
    pub assume_yes: bool,
    pub quiet: bool,
}

impl Context {
    /// Load the universe and open the history database named by `config`
    pub fn open(config: EngineConfig, assume_yes: bool, quiet: bool) -> Result<Self> {
        let mut index = if config.universe_path.exists() {
            MemoryIndex::load(&config.universe_path).with_context(|| {
                format!("Failed to load universe {}", config.universe_path.display())
            })?
        } else {
            info!(
                "No universe at {}, starting empty",
                config.universe_path.display()
            );
            MemoryIndex::new()
        };
        index.set_excludes(&config.excludes)?;

        let history = HistoryStore::open(&config.history_path).with_context(|| {
            format!("Failed to open history {}", config.history_path.display())
        })?;

        Ok(Self {
            config,
            index,
            history,
            assume_yes,
            quiet,
        })
    }
}

pub type Handler = fn(&mut Context, &Commands) -> Result<()>;

/// Command name to handler
const HANDLERS: &[(&str, Handler)] = &[
    ("install", packages::cmd_install),
    ("remove", packages::cmd_remove),
    ("upgrade", packages::cmd_upgrade),
    ("downgrade", packages::cmd_downgrade),
    ("reinstall", packages::cmd_reinstall),
    ("distro-sync", packages::cmd_distro_sync),
    ("history", history::cmd_history),
];

pub fn dispatch(ctx: &mut Context, command: &Commands) -> Result<()> {
    let name = command.name();
    let handler = HANDLERS
        .iter()
        .find(|(candidate, _)| *candidate == name)
        .map(|(_, handler)| *handler)
        .ok_or_else(|| anyhow!("No handler registered for '{}'", name))?;
    handler(ctx, command)
}

/// Report, confirm, execute and persist a resolution
fn apply_resolution(ctx: &mut Context, resolution: Resolution) -> Result<()> {
    let transaction = match resolution {
        Resolution::Problems(problems) => {
            eprint!("{}", ProblemReporter::format(&problems));
            if problems.iter().any(|p| p.is_blocking()) {
                bail!("Failed to resolve the transaction");
            }
            println!("Nothing to do.");
            return Ok(());
        }
        Resolution::Solved {
            transaction,
            advisories,
        } => {
            if !advisories.is_empty() && !ctx.quiet {
                eprint!("{}", ProblemReporter::format(&advisories));
            }
            transaction
        }
    };

    if transaction.is_empty() {
        println!("Nothing to do.");
        return Ok(());
    }

    print_transaction(&transaction);
    if !ctx.assume_yes && !confirm("Is this ok [y/N]: ")? {
        let mut transaction = transaction;
        transaction.cancel()?;
        println!("Operation aborted.");
        return Ok(());
    }

    let executor = TransactionExecutor::new(&ctx.config.lock_path)
        .with_lock_timeout(ctx.config.lock_timeout());
    let execution = executor
        .start(transaction)
        .context("Failed to start the transaction")?;

    let bar = (!ctx.quiet).then(|| TransactionBar::new(execution.transaction().len() as u64));
    let progress: &dyn TransactionProgress = match bar {
        Some(ref bar) => bar,
        None => &SilentProgress,
    };
    let report = execution.run(&mut ctx.index, progress, &mut ctx.history)?;
    if let Some(ref bar) = bar {
        bar.finish();
    }

    ctx.index
        .save(&ctx.config.universe_path)
        .with_context(|| format!("Failed to save {}", ctx.config.universe_path.display()))?;

    if let Some(cause) = report.failure {
        bail!("Transaction {} failed: {}", report.record.id, cause);
    }
    if let Some(e) = report.history_error {
        bail!(
            "Transaction {} was applied but could not be recorded: {}",
            report.record.id,
            e
        );
    }
    println!("Complete!");
    Ok(())
}

/// Print the transaction grouped by action, in execution order within groups
fn print_transaction(transaction: &Transaction) {
    let mut groups: BTreeMap<TransactionAction, Vec<&TransactionPackage>> = BTreeMap::new();
    for item in transaction.items() {
        groups.entry(item.action).or_default().push(item);
    }

    let name_width = transaction
        .items()
        .iter()
        .map(|i| i.package.name().len())
        .max()
        .unwrap_or(0)
        .max("Package".len());
    let version_width = transaction
        .items()
        .iter()
        .map(|i| i.package.evr().to_string().len())
        .max()
        .unwrap_or(0)
        .max("Version".len());

    println!(
        " {:<name_width$}  {:<8}  {:<version_width$}  Repository",
        "Package", "Arch", "Version"
    );
    for (action, items) in &groups {
        println!("{}:", action.label());
        for item in items {
            println!(
                " {:<name_width$}  {:<8}  {:<version_width$}  {}",
                item.package.name(),
                item.package.arch(),
                item.package.evr().to_string(),
                item.package.repo()
            );
            if let Some(ref old) = item.replaces {
                println!("     replacing {}", old);
            }
        }
    }
    println!();
    println!("Transaction Summary: {} packages", transaction.len());
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{}", prompt);
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}
