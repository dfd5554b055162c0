// src/commands/history.rs
//! Transaction history commands

use super::{Context, apply_resolution};
use crate::cli::{Commands, HistoryCommands};
use anyhow::{Context as _, Result, anyhow, bail};
use chrono::DateTime;
use goalpost::history::{self, HistoryRecord};
use goalpost::{ItemOutcome, TransactionAction};
use std::collections::BTreeMap;

pub fn cmd_history(ctx: &mut Context, command: &Commands) -> Result<()> {
    let Commands::History(sub) = command else {
        bail!("history handler called for '{}'", command.name());
    };
    match sub {
        HistoryCommands::List { limit } => cmd_history_list(ctx, *limit),
        HistoryCommands::Info { id, json } => cmd_history_info(ctx, *id, *json),
        HistoryCommands::Undo { id } => cmd_history_undo(ctx, *id),
    }
}

fn format_epoch(epoch: i64) -> String {
    DateTime::from_timestamp(epoch, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| epoch.to_string())
}

/// `Install, Upgrade` style summary of the actions in a record
fn action_summary(record: &HistoryRecord) -> String {
    let mut counts: BTreeMap<TransactionAction, usize> = BTreeMap::new();
    for item in &record.items {
        *counts.entry(item.action).or_default() += 1;
    }
    counts
        .keys()
        .map(|action| action.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn load_record(ctx: &Context, id: u64) -> Result<HistoryRecord> {
    ctx.history
        .get(id)
        .with_context(|| format!("Failed to read transaction {}", id))?
        .ok_or_else(|| anyhow!("No transaction with id {}", id))
}

fn cmd_history_list(ctx: &mut Context, limit: usize) -> Result<()> {
    let records = ctx.history.list_recent(limit)?;
    if records.is_empty() {
        println!("No transactions recorded.");
        return Ok(());
    }

    println!("{:>6} | {:<16} | {:<10} | {:<30} | Altered", "ID", "Date", "State", "Actions");
    for record in &records {
        println!(
            "{:>6} | {:<16} | {:<10} | {:<30} | {}",
            record.id,
            format_epoch(record.start_epoch),
            record.state.as_str(),
            action_summary(record),
            record.items.len()
        );
    }
    Ok(())
}

fn cmd_history_info(ctx: &mut Context, id: u64, json: bool) -> Result<()> {
    let record = load_record(ctx, id)?;
    if json {
        println!("{}", record.to_json()?);
        return Ok(());
    }

    println!("Transaction ID : {}", record.id);
    println!("Begin time     : {}", format_epoch(record.start_epoch));
    println!("End time       : {}", format_epoch(record.end_epoch));
    println!("State          : {}", record.state);
    println!("Packages altered:");
    for item in &record.items {
        let marker = match item.outcome {
            ItemOutcome::Applied => "",
            ItemOutcome::Failed => " [FAILED]",
            ItemOutcome::Unattempted => " [not attempted]",
        };
        let previous = item
            .previous_evr
            .as_ref()
            .map(|evr| format!(" (from {})", evr))
            .unwrap_or_default();
        println!(
            "    {:<12} {} @{}{}{}",
            item.action.label(),
            item.package(),
            item.repo,
            previous,
            marker
        );
        if let Some(ref cause) = item.cause {
            println!("                 {}", cause);
        }
    }
    Ok(())
}

fn cmd_history_undo(ctx: &mut Context, id: u64) -> Result<()> {
    let record = load_record(ctx, id)?;
    let resolution = {
        let goal = history::invert(&record, &ctx.index, ctx.config.goal_policy())
            .with_context(|| format!("Cannot undo transaction {}", id))?;
        goal.resolve()?
    };
    apply_resolution(ctx, resolution)
}
